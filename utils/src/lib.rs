//! Shared infrastructure utilities for Revision Desk.
//!
//! This crate provides cross-cutting filesystem helpers that the store, the
//! artifact renderers and the web layer all need but that don't belong in the
//! domain-pure `revdesk-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`file_names`**: Safe on-disk names for user-supplied upload names

pub mod atomic_write;
pub mod file_names;

pub use atomic_write::{AtomicWriteOptions, FileSyncPolicy, atomic_write, atomic_write_with_options};
pub use file_names::{UPLOAD_FALLBACK_NAME, sanitize_upload_name};
