use anyhow::{anyhow, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, GetInputFocusReply};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::protocol::{xproto, xtest};
use x11rb::rust_connection::RustConnection;

use crate::keyboard::{self, KeyState};
use crate::playback::VirtualKeyboard;

use super::COMMON_MODIFIER_KEYCODES;

// X11 special focus value: the focused window follows the pointer.
const POINTER_ROOT: xproto::Window = 1;

fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    // On Xorg with the evdev driver, X11 keycodes are evdev + 8.
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}

fn key_state_to_x11_event_type(state: KeyState) -> u8 {
    match state {
        KeyState::Pressed => xproto::KEY_PRESS_EVENT,
        KeyState::Released => xproto::KEY_RELEASE_EVENT,
    }
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 typing requires the XTEST extension (not present on this X server)"
        ));
    }
    Ok(())
}

fn get_focus(conn: &impl Connection) -> Result<GetInputFocusReply> {
    conn.get_input_focus()
        .context("failed to request input focus")?
        .reply()
        .context("failed to read input focus reply")
}

fn keysyms_for_keycode(
    conn: &impl Connection,
    keycode: u8,
) -> Result<(xproto::Keysym, xproto::Keysym)> {
    let reply = conn
        .get_keyboard_mapping(keycode, 1)
        .context("failed to request keyboard mapping")?
        .reply()
        .context("failed to read keyboard mapping")?;

    if reply.keysyms_per_keycode == 0 {
        return Err(anyhow!("X server returned 0 keysyms per keycode"));
    }

    let at = |i: usize| reply.keysyms.get(i).copied().unwrap_or(x11rb::NO_SYMBOL);
    Ok((at(0), at(1)))
}

/// Check a few representative keys: we only emit US QWERTY keycodes.
fn validate_us_keymap(conn: &impl Connection) -> Result<()> {
    let checks = [
        (keyboard::KEY_A, 'a', 'A'),
        (keyboard::KEY_Q, 'q', 'Q'),
        (keyboard::KEY_1, '1', '!'),
        (keyboard::KEY_MINUS, '-', '_'),
        (keyboard::KEY_APOSTROPHE, '\'', '"'),
        (keyboard::KEY_SEMICOLON, ';', ':'),
        (keyboard::KEY_LEFTBRACE, '[', '{'),
    ];

    for (evdev, plain, shifted) in checks {
        let keycode = evdev_to_x11_keycode(evdev)?;
        // Latin-1 keysyms equal their code points.
        let (got_plain, got_shifted) = keysyms_for_keycode(conn, keycode)?;

        if got_plain == x11rb::NO_SYMBOL || got_shifted == x11rb::NO_SYMBOL {
            return Err(anyhow!(
                "could not validate the X server keymap: keycode {keycode} has no symbol. \
                 Keycodes are assumed to be evdev+8 with a US layout."
            ));
        }
        if got_plain != plain as u32 || got_shifted != shifted as u32 {
            return Err(anyhow!(
                "X11 typing requires a US keyboard layout, but keycode {keycode} maps to \
                 {got_plain:#x}/{got_shifted:#x}. Try `setxkbmap us`."
            ));
        }
    }

    Ok(())
}

/// XTEST-backed keyboard on the focused X11 window.
pub struct X11Keyboard {
    conn: RustConnection,
    root: xproto::Window,
}

impl X11Keyboard {
    /// Connect and check the server is usable: XTEST present, US keymap,
    /// and an explicitly focused window.
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X11")?;
        query_xtest(&conn)?;
        validate_us_keymap(&conn)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?
            .root;

        let focus = get_focus(&conn)?;
        if focus.focus == x11rb::NONE {
            return Err(anyhow!(
                "no X11 input focus detected; click into the target window before starting"
            ));
        }
        if focus.focus == POINTER_ROOT {
            return Err(anyhow!(
                "X11 input focus follows the pointer; click into the target window to give it explicit focus"
            ));
        }

        let mut keyboard = Self { conn, root };
        // No per-client modifier state on X11; start from released modifiers.
        keyboard.release_modifiers();
        log::debug!("X11 XTEST keyboard ready on screen {screen_num}");
        Ok(keyboard)
    }

    fn fake_key(&self, keycode: u8, state: KeyState) -> Result<()> {
        let type_ = key_state_to_x11_event_type(state);
        self.conn
            .xtest_fake_input(type_, keycode, x11rb::CURRENT_TIME, self.root, 0, 0, 0)
            .context("failed to send XTEST fake input")?;
        Ok(())
    }
}

impl VirtualKeyboard for X11Keyboard {
    fn key(&mut self, keycode: u32, state: KeyState) -> Result<()> {
        let x11_keycode = evdev_to_x11_keycode(keycode)?;
        self.fake_key(x11_keycode, state)?;
        self.conn.flush().context("failed to flush X11 connection")?;
        Ok(())
    }

    fn set_shift(&mut self, _held: bool) -> Result<()> {
        // The server derives modifier state from the Shift key events.
        Ok(())
    }

    fn release_modifiers(&mut self) {
        for keycode in COMMON_MODIFIER_KEYCODES {
            if let Ok(code) = evdev_to_x11_keycode(keycode) {
                let _ = self.fake_key(code, KeyState::Released);
            }
        }
        if let Err(err) = self.conn.flush() {
            log::warn!("failed to flush modifier release: {err}");
        }
    }
}
