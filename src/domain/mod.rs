//! Domain layer - Pure feed and playback logic.

pub mod catalog;
pub mod errors;
pub mod hashtags;
pub mod mutation;
pub mod playback;
pub mod window;
