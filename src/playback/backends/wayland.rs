use std::collections::HashMap;
use std::io::Write;
use std::os::fd::{AsFd, OwnedFd};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use memfd::MemfdOptions;
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{wl_registry, wl_seat};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle};

use crate::keyboard::KeyState;
use crate::keymap::us_qwerty_keymap;
use crate::playback::VirtualKeyboard;
use crate::protocols::virtual_keyboard_unstable_v1::zwp_virtual_keyboard_manager_v1::ZwpVirtualKeyboardManagerV1;
use crate::protocols::virtual_keyboard_unstable_v1::zwp_virtual_keyboard_v1::ZwpVirtualKeyboardV1;

use super::COMMON_MODIFIER_KEYCODES;

#[derive(Debug, Clone)]
struct SeatData {
    global_name: u32,
}

#[derive(Debug, Default)]
struct State {
    seat_names_by_global: HashMap<u32, String>,
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for State {
    fn event(
        _state: &mut Self,
        _proxy: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_seat::WlSeat, SeatData> for State {
    fn event(
        state: &mut Self,
        _proxy: &wl_seat::WlSeat,
        event: wl_seat::Event,
        data: &SeatData,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Name { name } = event {
            state.seat_names_by_global.insert(data.global_name, name);
        }
    }
}

impl Dispatch<ZwpVirtualKeyboardManagerV1, ()> for State {
    fn event(
        _state: &mut Self,
        _proxy: &ZwpVirtualKeyboardManagerV1,
        _event: <ZwpVirtualKeyboardManagerV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<ZwpVirtualKeyboardV1, ()> for State {
    fn event(
        _state: &mut Self,
        _proxy: &ZwpVirtualKeyboardV1,
        _event: <ZwpVirtualKeyboardV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

fn key_state_to_u32(state: KeyState) -> u32 {
    match state {
        KeyState::Released => 0,
        KeyState::Pressed => 1,
    }
}

fn make_keymap_fd(keymap: &str) -> Result<(OwnedFd, u32)> {
    let memfd = MemfdOptions::default()
        .allow_sealing(true)
        .create("keycadence-xkb-keymap")
        .context("failed to create memfd for keymap")?;

    let mut file = memfd.as_file();
    file.write_all(keymap.as_bytes())?;
    file.write_all(&[0])?;

    let size = (keymap.len() + 1)
        .try_into()
        .map_err(|_| anyhow!("keymap too large"))?;

    Ok((OwnedFd::from(memfd.into_file()), size))
}

fn bind_seat(
    globals: &wayland_client::globals::GlobalList,
    event_queue: &mut EventQueue<State>,
    state: &mut State,
    seat_name: Option<&str>,
) -> Result<wl_seat::WlSeat> {
    let qh = event_queue.handle();
    let seat_globals: Vec<_> = globals
        .contents()
        .clone_list()
        .into_iter()
        .filter(|g| g.interface == wl_seat::WlSeat::interface().name)
        .collect();

    let Some(requested) = seat_name else {
        let g = seat_globals
            .first()
            .ok_or_else(|| anyhow!("wl_seat not available (no seats advertised)"))?;
        return Ok(globals.registry().bind(
            g.name,
            g.version.min(7),
            &qh,
            SeatData {
                global_name: g.name,
            },
        ));
    };

    let seats: Vec<(u32, wl_seat::WlSeat)> = seat_globals
        .iter()
        .map(|g| {
            let seat = globals.registry().bind(
                g.name,
                g.version.min(7),
                &qh,
                SeatData {
                    global_name: g.name,
                },
            );
            (g.name, seat)
        })
        .collect();

    event_queue
        .roundtrip(state)
        .context("Wayland roundtrip (seat discovery) failed")?;

    let found = seats.iter().find_map(|(global_name, seat)| {
        state
            .seat_names_by_global
            .get(global_name)
            .filter(|n| n.as_str() == requested)
            .map(|_| seat.clone())
    });
    if let Some(seat) = found {
        return Ok(seat);
    }

    let mut names: Vec<_> = state.seat_names_by_global.values().cloned().collect();
    names.sort();
    names.dedup();
    if names.is_empty() {
        return Err(anyhow!(
            "requested seat {requested:?}, but the compositor did not advertise any seat names"
        ));
    }
    Err(anyhow!(
        "requested seat {requested:?} not found; available seats: {}",
        names.join(", ")
    ))
}

/// `zwp_virtual_keyboard_v1` device with a US keymap.
pub struct WaylandKeyboard {
    conn: Connection,
    // Owns the proxies' queue for the lifetime of the device.
    _event_queue: EventQueue<State>,
    keyboard: ZwpVirtualKeyboardV1,
    shift_mask: u32,
    start: Instant,
}

impl WaylandKeyboard {
    pub fn connect(seat_name: Option<&str>) -> Result<Self> {
        let conn = Connection::connect_to_env().context("failed to connect to Wayland")?;
        let (globals, mut event_queue) =
            registry_queue_init(&conn).context("failed to init Wayland registry")?;
        let qh = event_queue.handle();
        let mut state = State::default();

        let manager: ZwpVirtualKeyboardManagerV1 = globals
            .bind(&qh, 1..=1, ())
            .context("zwp_virtual_keyboard_manager_v1 not available (is the compositor wlroots-based?)")?;

        let seat = bind_seat(&globals, &mut event_queue, &mut state, seat_name)?;
        let keyboard = manager.create_virtual_keyboard(&seat, &qh, ());

        event_queue
            .roundtrip(&mut state)
            .context("Wayland roundtrip failed")?;

        let keymap = us_qwerty_keymap()?;
        let (keymap_fd, keymap_size) = make_keymap_fd(&keymap.keymap)?;
        keyboard.keymap(keymap.keymap_format, keymap_fd.as_fd(), keymap_size);
        conn.flush().context("Wayland flush failed")?;

        log::debug!("Wayland virtual keyboard ready (seat {seat_name:?})");
        Ok(Self {
            conn,
            _event_queue: event_queue,
            keyboard,
            shift_mask: keymap.shift_mask,
            start: Instant::now(),
        })
    }

    fn time_ms(&self) -> u32 {
        self.start
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u32::MAX)
    }
}

impl VirtualKeyboard for WaylandKeyboard {
    fn key(&mut self, keycode: u32, state: KeyState) -> Result<()> {
        self.keyboard
            .key(self.time_ms(), keycode, key_state_to_u32(state));
        self.conn
            .flush()
            .with_context(|| format!("Wayland flush failed (key {keycode} {state:?})"))
    }

    fn set_shift(&mut self, held: bool) -> Result<()> {
        let depressed = if held { self.shift_mask } else { 0 };
        self.keyboard.modifiers(depressed, 0, 0, 0);
        self.conn
            .flush()
            .context("Wayland flush failed (modifiers)")
    }

    fn release_modifiers(&mut self) {
        self.keyboard.modifiers(0, 0, 0, 0);
        let time_ms = self.time_ms();
        for keycode in COMMON_MODIFIER_KEYCODES {
            self.keyboard.key(time_ms, keycode, 0);
        }
        if let Err(err) = self.conn.flush() {
            log::warn!("failed to flush modifier release: {err}");
        }
    }
}

impl Drop for WaylandKeyboard {
    fn drop(&mut self) {
        self.keyboard.destroy();
        let _ = self.conn.flush();
    }
}
