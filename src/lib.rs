pub mod config;
pub mod console;
pub mod control;
pub mod delay;
pub mod error;
pub mod keyboard;
pub mod keymap;
pub mod model;
pub mod pipeline;
pub mod playback;

#[cfg(feature = "wayland")]
pub mod protocols;
pub mod sim;
pub mod sink;
pub mod stream;
pub mod typo;
