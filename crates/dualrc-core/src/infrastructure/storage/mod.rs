//! Storage infrastructure: the backing file and its path.
//!
//! The store depends only on the [`Backing`] trait, so the file format
//! logic can be exercised against a mock without touching a disk.

use std::path::PathBuf;

use thiserror::Error;

pub mod backing;
pub mod path;

pub use backing::{Backing, FileBacking};
pub use path::{expand_home, resolve_config_path};

/// Error type for backing-file operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
