//! Local adapters: a directory of videos, an in-memory catalog, in-memory
//! engagement and a decoder that plays nothing.

pub mod catalog;
pub mod decoder;
pub mod engagement;
pub mod fs;

pub use catalog::{CatalogManifest, MemoryCatalog};
pub use decoder::HeadlessDecoder;
pub use engagement::MemoryEngagement;
pub use fs::FsBlobStore;
