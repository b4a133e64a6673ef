#[cfg(feature = "wayland")]
pub mod wayland;

#[cfg(feature = "x11")]
pub mod x11;

// Released on connect and when a sink is dropped, so an aborted run never
// leaves a modifier held. Only Shift is ever pressed by the sink itself.
#[cfg(any(feature = "wayland", feature = "x11"))]
pub(crate) const COMMON_MODIFIER_KEYCODES: [u32; 6] = [
    crate::keyboard::KEY_LEFTSHIFT,
    crate::keyboard::KEY_RIGHTSHIFT,
    crate::keyboard::KEY_LEFTCTRL,
    crate::keyboard::KEY_RIGHTCTRL,
    crate::keyboard::KEY_LEFTALT,
    crate::keyboard::KEY_RIGHTALT,
];

#[cfg(all(test, any(feature = "wayland", feature = "x11")))]
mod tests {
    use super::COMMON_MODIFIER_KEYCODES;

    #[test]
    fn release_list_covers_the_shift_the_sink_presses() {
        assert!(COMMON_MODIFIER_KEYCODES.contains(&crate::playback::SHIFT_KEYCODE));
        assert!(COMMON_MODIFIER_KEYCODES.contains(&crate::keyboard::KEY_RIGHTSHIFT));
        assert!(COMMON_MODIFIER_KEYCODES.contains(&crate::keyboard::KEY_RIGHTALT));
    }
}
