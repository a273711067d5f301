//! Ports - Trait definitions for the collaborators the feed core consumes.

pub mod catalog;
pub mod decoder;
pub mod engagement;
pub mod storage;
