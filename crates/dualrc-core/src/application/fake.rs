//! In-memory [`ConfigSource`] for tests.
//!
//! `FakeStore` never touches a file or runs a script.  Besides the async
//! trait methods it has synchronous `get_now`/`set_now` shortcuts so test
//! setup does not need a runtime.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::source::ConfigSource;
use super::store::StoreError;
use crate::domain::config_map::{merge_into, ConfigMap, KeyQuery, Lookup};
use crate::domain::profile::ProfileRegistry;

#[derive(Debug, Default)]
pub struct FakeStore {
    config: Mutex<ConfigMap>,
    profiles: Mutex<ProfileRegistry>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fake pre-filled with `values`.
    pub fn with_values(values: ConfigMap) -> Self {
        Self {
            config: Mutex::new(values),
            profiles: Mutex::new(ProfileRegistry::new()),
        }
    }

    pub fn get_now(&self, key: &str) -> Option<Value> {
        lock(&self.config).get(key).cloned()
    }

    pub fn set_now(&self, key: impl Into<String>, value: Value) {
        lock(&self.config).insert(key.into(), value);
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> ConfigMap {
        lock(&self.config).clone()
    }
}

#[async_trait]
impl ConfigSource for FakeStore {
    async fn load_config(&self) -> Result<ConfigMap, StoreError> {
        Ok(self.snapshot())
    }

    async fn get(&self, query: &str) -> Result<Lookup, StoreError> {
        Ok(KeyQuery::parse(query).resolve(&lock(&self.config)))
    }

    async fn get_one(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.get_now(key))
    }

    async fn set_one(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.set_now(key, value);
        Ok(())
    }

    async fn set_many(&self, values: ConfigMap) -> Result<(), StoreError> {
        merge_into(&mut lock(&self.config), values);
        Ok(())
    }

    fn set_profile(&self, name: &str, overrides: &ConfigMap) {
        lock(&self.profiles).set_profile(name, overrides);
    }

    async fn profile(&self, name: &str) -> Result<Option<ConfigMap>, StoreError> {
        Ok(lock(&self.profiles).get(name).cloned())
    }

    async fn profile_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.profiles).profile_names())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
