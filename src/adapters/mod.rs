//! Adapters - Concrete implementations of ports.

pub mod stream;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "http")]
pub mod http;
