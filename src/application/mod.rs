//! Application layer - Generic services that use ports.

pub mod blob_resolver;
pub mod engagement;
pub mod feed;
pub mod playback_cache;
pub mod player;
pub mod timer;
