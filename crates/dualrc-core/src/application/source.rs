//! The surface shared by the real store and its in-memory stand-in.
//!
//! Code that only needs to read and write settings should take a
//! `&dyn ConfigSource` (or a generic `S: ConfigSource`) so tests can hand it a
//! [`FakeStore`](super::fake::FakeStore) instead of a file-backed
//! [`ConfigStore`](super::store::ConfigStore).

use async_trait::async_trait;
use serde_json::Value;

use super::store::StoreError;
use crate::domain::config_map::{ConfigMap, Lookup};

/// Read/write access to a key/value configuration with profiles.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Returns a copy of the whole map.
    async fn load_config(&self) -> Result<ConfigMap, StoreError>;

    /// Answers a key query: one key, or a comma-separated list of keys.
    async fn get(&self, query: &str) -> Result<Lookup, StoreError>;

    /// Returns the value stored under exactly `key`.
    async fn get_one(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Stores a single value.
    async fn set_one(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Merges every key of `values`, overwriting collisions.
    async fn set_many(&self, values: ConfigMap) -> Result<(), StoreError>;

    /// Registers (or replaces) a profile.
    fn set_profile(&self, name: &str, overrides: &ConfigMap);

    /// Returns the bundle registered under `name`.
    async fn profile(&self, name: &str) -> Result<Option<ConfigMap>, StoreError>;

    /// Registered profile names, sorted.
    async fn profile_names(&self) -> Result<Vec<String>, StoreError>;

    /// Applies the profile `name` through [`ConfigSource::set_many`].
    ///
    /// An unknown name is a silent no-op, never an error.
    async fn use_profile(&self, name: &str) -> Result<(), StoreError> {
        match self.profile(name).await? {
            Some(overrides) => self.set_many(overrides).await,
            None => {
                tracing::debug!("profile {name:?} is not registered; nothing to apply");
                Ok(())
            }
        }
    }
}
