//! Filesystem module.
//!
//! Provides per-OS-safe filename construction from media metadata.

pub mod naming;

pub use naming::{build_filename, media_extension, sanitize};
