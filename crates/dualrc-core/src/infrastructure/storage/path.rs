//! Backing-path resolution.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Expands a leading `~/` against `home`, falling back to `/` when the home
/// directory is unknown.  Any other path is returned unchanged.
pub fn expand_home(raw: &str, home: Option<&OsStr>) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = home.map_or_else(|| Path::new("/"), Path::new);
            home.join(rest)
        }
        None => PathBuf::from(raw),
    }
}

/// Resolves a user-supplied config path using the `HOME` environment variable.
pub fn resolve_config_path(raw: &str) -> PathBuf {
    expand_home(raw, std::env::var_os("HOME").as_deref())
}
