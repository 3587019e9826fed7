//! Application layer: the stores callers actually use.
//!
//! This layer ties the pure domain rules (key queries, the autogenerated
//! section, profiles) to the infrastructure (the backing file and the script
//! sandbox).
//!
//! # Sub-modules
//!
//! - **`store`**  – [`ConfigStore`](store::ConfigStore), the file-backed store
//!   with lazy, single-flight loading and save-on-set.
//!
//! - **`source`** – The [`ConfigSource`](source::ConfigSource) trait shared by
//!   both stores, so consumers can be tested without a file.
//!
//! - **`fake`**   – [`FakeStore`](fake::FakeStore), a purely in-memory store.

pub mod fake;
pub mod source;
pub mod store;
