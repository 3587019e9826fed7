//! # dualrc-core
//!
//! A persistent key/value configuration store whose file is either a plain
//! JSON document or a Rhai script.
//!
//! # How it works
//!
//! A store is bound to one file.  On first access the file is read once:
//!
//! - a file whose first non-whitespace character is `{` is parsed as JSON;
//! - anything else is run as a sandboxed script, which fills the store by
//!   calling `set_config(#{ ... })` and may register named override bundles
//!   with `set_profile(name, #{ ... })`.
//!
//! Every `set` merges into the in-memory map and rewrites only a delimited
//! *autogenerated section* of the file, so the hand-written parts of a script
//! survive:
//!
//! ```text
//! let base = 4000;
//! set_config(#{ port: base + 5 });
//!
//! // @@@AUTOGENERATED SECTION, DON'T EDIT@@@
//! set_config(
//! {
//!   "verbose": true
//! }
//! );
//! // @@@/AUTOGENERATED SECTION@@@
//! ```
//!
//! # Layers
//!
//! - **`domain`** – Key queries, the autogenerated section, profiles.  No I/O.
//! - **`infrastructure`** – The backing file and the two file codecs.
//! - **`application`** – [`ConfigStore`], [`FakeStore`] and the
//!   [`ConfigSource`] trait they share.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::fake::FakeStore;
pub use application::source::ConfigSource;
pub use application::store::{ConfigStore, LoadPolicy, StoreError};
pub use domain::config_map::{ConfigMap, KeyQuery, Lookup};
pub use infrastructure::codec::{CodecError, ScriptSandbox};
pub use infrastructure::storage::{Backing, FileBacking, StorageError};
