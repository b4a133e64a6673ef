//! Live keystroke delivery through a virtual keyboard device.

pub mod backends;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::keyboard::{
    keystroke_for_output_char, KeyState, KeyStroke, KEY_BACKSPACE, KEY_ENTER, KEY_LEFTSHIFT,
};
use crate::sink::KeystrokeSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackBackend {
    Auto,
    Wayland,
    X11,
}

fn env_is_set(name: &str) -> bool {
    std::env::var_os(name)
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

fn auto_backend() -> PlaybackBackend {
    let wayland_env = env_is_set("WAYLAND_DISPLAY") || env_is_set("WAYLAND_SOCKET");
    let x11_env = env_is_set("DISPLAY");

    // Prefer Wayland if both are present (common in Wayland sessions with Xwayland).
    if wayland_env {
        if cfg!(feature = "wayland") {
            return PlaybackBackend::Wayland;
        }

        // If Wayland is detected but not supported in this build, fall back to X11 if available.
        // Otherwise return Wayland so the caller can surface a helpful "detected but disabled"
        // error.
        if cfg!(feature = "x11") && x11_env {
            return PlaybackBackend::X11;
        }
        return PlaybackBackend::Wayland;
    }

    if x11_env {
        return PlaybackBackend::X11;
    }

    // Unknown/unsupported environment.
    PlaybackBackend::Auto
}

fn backend_unavailable_message() -> String {
    let xdg_session_type = std::env::var("XDG_SESSION_TYPE").unwrap_or_else(|_| "".to_string());

    let mut parts = Vec::new();

    if env_is_set("WAYLAND_DISPLAY") {
        parts.push("WAYLAND_DISPLAY is set".to_string());
    }
    if env_is_set("WAYLAND_SOCKET") {
        parts.push("WAYLAND_SOCKET is set".to_string());
    }
    if env_is_set("DISPLAY") {
        parts.push("DISPLAY is set".to_string());
    }
    if !xdg_session_type.is_empty() {
        parts.push(format!("XDG_SESSION_TYPE={xdg_session_type}"));
    }

    if parts.is_empty() {
        "No display session detected (expected Wayland or X11 environment variables).".to_string()
    } else {
        format!("Detected environment: {}", parts.join(", "))
    }
}

fn require_supported_backend(
    #[allow(unused_variables)] selected: PlaybackBackend,
    resolved: PlaybackBackend,
) -> Result<()> {
    match resolved {
        PlaybackBackend::Wayland => {
            #[cfg(feature = "wayland")]
            {
                Ok(())
            }

            #[cfg(not(feature = "wayland"))]
            {
                let how = match selected {
                    PlaybackBackend::Auto => "detected",
                    _ => "requested",
                };
                Err(anyhow!(
                    "Wayland backend {how} but is disabled in this build. (Rebuild with `--features wayland`.) {details}",
                    how = how,
                    details = backend_unavailable_message()
                ))
            }
        }
        PlaybackBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(())
            }

            #[cfg(not(feature = "x11"))]
            {
                let how = match selected {
                    PlaybackBackend::Auto => "detected",
                    _ => "requested",
                };
                Err(anyhow!(
                    "X11 backend {how} but is disabled in this build. (Rebuild with `--features x11`.) {details}",
                    how = how,
                    details = backend_unavailable_message()
                ))
            }
        }
        PlaybackBackend::Auto => {
            let mut forced = Vec::new();
            if cfg!(feature = "wayland") {
                forced.push("--backend wayland");
            }
            if cfg!(feature = "x11") {
                forced.push("--backend x11");
            }
            let hint = if forced.is_empty() {
                "This build has no typing backends enabled."
            } else if forced.len() == 1 {
                "Try passing the available backend flag to force it."
            } else {
                "Try forcing a backend."
            };

            Err(anyhow!(
                "No supported typing backend detected. {details}\n\
                 {hint} {}",
                forced.join(" or "),
                details = backend_unavailable_message(),
                hint = hint,
            ))
        }
    }
}

pub fn resolve_backend(requested: PlaybackBackend) -> Result<PlaybackBackend> {
    let resolved = match requested {
        PlaybackBackend::Auto => auto_backend(),
        other => other,
    };

    require_supported_backend(requested, resolved)?;
    Ok(resolved)
}

pub fn preflight_backend(
    requested: PlaybackBackend,
    seat_name: Option<&str>,
) -> Result<PlaybackBackend> {
    if let Some(name) = seat_name {
        if name.trim().is_empty() {
            return Err(anyhow!("--seat must not be empty"));
        }
    }

    let resolved = resolve_backend(requested)?;

    if seat_name.is_some() && resolved == PlaybackBackend::X11 {
        return Err(anyhow!(
            "--seat is Wayland-only and is not supported on X11"
        ));
    }

    Ok(resolved)
}

/// The device-level primitive the backends implement. Keycodes are evdev.
pub trait VirtualKeyboard {
    fn key(&mut self, keycode: u32, state: KeyState) -> Result<()>;

    /// Tell the target whether Shift is logically held, for backends that
    /// carry modifier state separately from key events.
    fn set_shift(&mut self, held: bool) -> Result<()>;

    /// Best-effort release of every common modifier.
    fn release_modifiers(&mut self);
}

pub(crate) const SHIFT_KEYCODE: u32 = KEY_LEFTSHIFT;

// Some clients drop a release that arrives in the same frame as its press.
const KEY_HOLD: Duration = Duration::from_millis(4);

/// Open the device for an already-preflighted backend.
pub fn open_keyboard(
    backend: PlaybackBackend,
    seat_name: Option<&str>,
) -> Result<Box<dyn VirtualKeyboard>> {
    #[cfg(all(not(feature = "wayland"), not(feature = "x11")))]
    let _ = seat_name;

    match backend {
        PlaybackBackend::Wayland => {
            #[cfg(feature = "wayland")]
            {
                Ok(Box::new(backends::wayland::WaylandKeyboard::connect(
                    seat_name,
                )?))
            }

            #[cfg(not(feature = "wayland"))]
            {
                Err(anyhow!(
                    "Wayland backend is disabled in this build (rebuild with `--features wayland`)."
                ))
            }
        }
        PlaybackBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(Box::new(backends::x11::X11Keyboard::connect()?))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        PlaybackBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}

/// Keystroke sink that taps real keys on a [`VirtualKeyboard`].
///
/// Modifiers are released when the sink is dropped, including after an
/// interrupt or a failed keystroke.
pub struct KeyboardSink {
    device: Box<dyn VirtualKeyboard>,
    hold: Duration,
}

impl KeyboardSink {
    pub fn new(device: Box<dyn VirtualKeyboard>) -> Self {
        Self {
            device,
            hold: KEY_HOLD,
        }
    }

    /// Override the press-to-release hold.
    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    fn tap(&mut self, stroke: KeyStroke) -> Result<()> {
        if stroke.shift {
            self.device.key(SHIFT_KEYCODE, KeyState::Pressed)?;
            self.device.set_shift(true)?;
        }

        self.device.key(stroke.keycode, KeyState::Pressed)?;
        if !self.hold.is_zero() {
            std::thread::sleep(self.hold);
        }
        self.device.key(stroke.keycode, KeyState::Released)?;

        if stroke.shift {
            self.device.key(SHIFT_KEYCODE, KeyState::Released)?;
            self.device.set_shift(false)?;
        }
        Ok(())
    }
}

impl KeystrokeSink for KeyboardSink {
    fn press_enter(&mut self) -> Result<()> {
        self.tap(KeyStroke {
            keycode: KEY_ENTER,
            shift: false,
        })
    }

    fn press_backspace(&mut self) -> Result<()> {
        self.tap(KeyStroke {
            keycode: KEY_BACKSPACE,
            shift: false,
        })
    }

    fn insert_text(&mut self, c: char) -> Result<()> {
        let stroke = keystroke_for_output_char(c)
            .ok_or_else(|| anyhow!("no US keyboard keystroke produces {c:?}"))?;
        self.tap(stroke)
            .with_context(|| format!("failed to type {c:?}"))
    }
}

impl Drop for KeyboardSink {
    fn drop(&mut self) {
        self.device.release_modifiers();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::keyboard::KEY_A;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Key(u32, KeyState),
        Shift(bool),
        ReleaseAll,
    }

    #[derive(Clone, Default)]
    struct FakeKeyboard {
        events: Arc<Mutex<Vec<Event>>>,
        fail_on: Option<u32>,
    }

    impl VirtualKeyboard for FakeKeyboard {
        fn key(&mut self, keycode: u32, state: KeyState) -> Result<()> {
            if self.fail_on == Some(keycode) {
                return Err(anyhow!("device gone"));
            }
            self.events.lock().unwrap().push(Event::Key(keycode, state));
            Ok(())
        }

        fn set_shift(&mut self, held: bool) -> Result<()> {
            self.events.lock().unwrap().push(Event::Shift(held));
            Ok(())
        }

        fn release_modifiers(&mut self) {
            self.events.lock().unwrap().push(Event::ReleaseAll);
        }
    }

    fn sink(device: &FakeKeyboard) -> KeyboardSink {
        KeyboardSink::new(Box::new(device.clone())).with_hold(Duration::ZERO)
    }

    #[test]
    fn uppercase_is_wrapped_in_shift() {
        let device = FakeKeyboard::default();
        sink(&device).insert_text('A').unwrap();

        assert_eq!(
            *device.events.lock().unwrap(),
            vec![
                Event::Key(KEY_LEFTSHIFT, KeyState::Pressed),
                Event::Shift(true),
                Event::Key(KEY_A, KeyState::Pressed),
                Event::Key(KEY_A, KeyState::Released),
                Event::Key(KEY_LEFTSHIFT, KeyState::Released),
                Event::Shift(false),
                Event::ReleaseAll,
            ]
        );
    }

    #[test]
    fn enter_and_backspace_tap_their_keys() {
        let device = FakeKeyboard::default();
        {
            let mut sink = sink(&device);
            sink.press_enter().unwrap();
            sink.press_backspace().unwrap();
        }

        assert_eq!(
            *device.events.lock().unwrap(),
            vec![
                Event::Key(KEY_ENTER, KeyState::Pressed),
                Event::Key(KEY_ENTER, KeyState::Released),
                Event::Key(KEY_BACKSPACE, KeyState::Pressed),
                Event::Key(KEY_BACKSPACE, KeyState::Released),
                Event::ReleaseAll,
            ]
        );
    }

    #[test]
    fn unsupported_chars_and_device_failures_are_errors() {
        let device = FakeKeyboard {
            fail_on: Some(KEY_A),
            ..Default::default()
        };
        let mut sink = sink(&device);

        assert!(sink.insert_text('é').is_err());
        let err = sink.insert_text('a').unwrap_err();
        assert!(format!("{err:#}").contains("device gone"));
    }
}
