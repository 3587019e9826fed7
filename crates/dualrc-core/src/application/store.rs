//! The file-backed configuration store.
//!
//! A [`ConfigStore`] loads its file lazily, at most once, and then serves
//! every `get` from the cached map.  Every `set` merges into the cached map
//! and saves straight away by regenerating the file's autogenerated section.
//!
//! # Load state
//!
//! ```text
//! Unloaded ──► Loading ──► Loaded
//!    ▲                       │
//!    └── invalidate() / reevaluate()
//! ```
//!
//! `Loading` is not stored anywhere: it is the time during which the first
//! caller holds the state lock while reading and decoding the file.  Callers
//! that arrive meanwhile queue on the same lock and find the store `Loaded`
//! when they get it, so the file is read, and its script run, only once.
//!
//! # Failure policy
//!
//! A missing file is always an empty map.  Other read failures, malformed
//! documents and failing scripts follow [`LoadPolicy`]; the default,
//! [`LoadPolicy::UseEmptyMap`], logs them and carries on with an empty map.
//! Write failures are logged and never returned: a `set` completes once the
//! save has been attempted.
//!
//! A file that exists but could not be read is never written back: after such
//! a load, values are only kept in memory until a later load succeeds.
//!
//! # Script evaluation
//!
//! Scripts run on tokio's blocking pool, so a long script does not stall the
//! executor.  The state lock stays held until it finishes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::source::ConfigSource;
use crate::domain::autogen;
use crate::domain::config_map::{merge_into, ConfigMap, KeyQuery, Lookup};
use crate::domain::profile::ProfileRegistry;
use crate::infrastructure::codec::{self, CodecError, FileForm, ScriptHooks, ScriptSandbox};
use crate::infrastructure::storage::{resolve_config_path, Backing, FileBacking, StorageError};

/// Error type for store operations.
///
/// Only returned under [`LoadPolicy::Strict`]; the default policy turns every
/// load failure into an empty map.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
}

/// What a load does when the file cannot be read or understood.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Log the failure and continue with an empty map.
    #[default]
    UseEmptyMap,
    /// Return the failure; the store stays unloaded and retries next time.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPhase {
    Unloaded,
    Loaded,
}

#[derive(Debug)]
struct StoreState {
    phase: LoadPhase,
    config: ConfigMap,
    /// File text outside the autogenerated section (the whole script for
    /// script-form files, empty for document-form files).
    surrounding: String,
    /// Set until a script-form file has been evaluated successfully.
    needs_eval: bool,
    /// Set when the last load recovered from a read error; saves are skipped.
    read_failed: bool,
}

/// Persistent key/value store backed by a document- or script-form file.
pub struct ConfigStore<B = FileBacking> {
    backing: B,
    sandbox: ScriptSandbox,
    policy: LoadPolicy,
    profiles: Arc<Mutex<ProfileRegistry>>,
    state: tokio::sync::Mutex<StoreState>,
}

impl ConfigStore<FileBacking> {
    /// Creates a store for the file at `path`; a leading `~/` is expanded
    /// against `HOME`.  Nothing is read until the first access.
    pub fn open(path: &str) -> Self {
        Self::with_backing(FileBacking::new(resolve_config_path(path)))
    }
}

impl<B: Backing> ConfigStore<B> {
    pub fn with_backing(backing: B) -> Self {
        Self {
            backing,
            sandbox: ScriptSandbox::default(),
            policy: LoadPolicy::default(),
            profiles: Arc::new(Mutex::new(ProfileRegistry::new())),
            state: tokio::sync::Mutex::new(StoreState {
                phase: LoadPhase::Unloaded,
                config: ConfigMap::new(),
                surrounding: String::new(),
                needs_eval: true,
                read_failed: false,
            }),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_sandbox(mut self, sandbox: ScriptSandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.backing.location()
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.phase == LoadPhase::Loaded
    }

    /// Returns the whole map, loading the file first if needed.
    ///
    /// # Errors
    ///
    /// Only under [`LoadPolicy::Strict`], when the file cannot be read or
    /// decoded.
    pub async fn load_config(&self) -> Result<ConfigMap, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(state.config.clone())
    }

    /// Writes the current map into the file's autogenerated section.
    ///
    /// Does nothing if the store was never loaded.  A failed write is logged
    /// and otherwise ignored.
    pub async fn save_config(&self) {
        let state = self.state.lock().await;
        self.persist(&state).await;
    }

    /// Answers a key query (see [`KeyQuery`] for the splitting rules).
    ///
    /// # Errors
    ///
    /// Only under [`LoadPolicy::Strict`].
    pub async fn get(&self, query: &str) -> Result<Lookup, StoreError> {
        let query = KeyQuery::parse(query);
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(query.resolve(&state.config))
    }

    /// Returns the value stored under exactly `key`.
    ///
    /// # Errors
    ///
    /// Only under [`LoadPolicy::Strict`].
    pub async fn get_one(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(state.config.get(key).cloned())
    }

    /// Stores one value and saves.
    ///
    /// # Errors
    ///
    /// Only under [`LoadPolicy::Strict`], when the initial load fails.
    pub async fn set_one(&self, key: impl Into<String>, value: Value) -> Result<(), StoreError> {
        let mut values = ConfigMap::new();
        values.insert(key.into(), value);
        self.set_many(values).await
    }

    /// Merges `values` into the map and saves.
    ///
    /// The merge happens in memory before any I/O, so the map never holds a
    /// partial merge.
    ///
    /// # Errors
    ///
    /// Only under [`LoadPolicy::Strict`], when the initial load fails.
    pub async fn set_many(&self, values: ConfigMap) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        merge_into(&mut state.config, values);
        self.persist(&state).await;
        Ok(())
    }

    /// Registers (or replaces) a profile directly.
    pub fn set_profile(&self, name: &str, overrides: &ConfigMap) {
        lock(&self.profiles).set_profile(name, overrides);
    }

    /// Returns the bundle registered under `name`, loading first so that
    /// profiles registered by a script are visible.
    ///
    /// # Errors
    ///
    /// Only under [`LoadPolicy::Strict`].
    pub async fn profile(&self, name: &str) -> Result<Option<ConfigMap>, StoreError> {
        self.load_config().await?;
        Ok(lock(&self.profiles).get(name).cloned())
    }

    /// Registered profile names, sorted, loading first.
    ///
    /// # Errors
    ///
    /// Only under [`LoadPolicy::Strict`].
    pub async fn profile_names(&self) -> Result<Vec<String>, StoreError> {
        self.load_config().await?;
        Ok(lock(&self.profiles).profile_names())
    }

    /// Drops the cached map so the next access re-reads the file.
    ///
    /// A script that has already run is not run again: its values are kept
    /// and only the surrounding text is refreshed.
    pub async fn invalidate(&self) {
        self.state.lock().await.phase = LoadPhase::Unloaded;
    }

    /// Drops the cached map and re-arms script evaluation, so the next access
    /// re-reads the file and runs its script again.
    pub async fn reevaluate(&self) {
        let mut state = self.state.lock().await;
        state.phase = LoadPhase::Unloaded;
        state.needs_eval = true;
    }

    async fn ensure_loaded(&self, state: &mut StoreState) -> Result<(), StoreError> {
        if state.phase == LoadPhase::Loaded {
            return Ok(());
        }

        let path = self.backing.location();
        state.read_failed = false;
        let text = match self.backing.read().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("no config file at {}; starting empty", path.display());
                state.config = ConfigMap::new();
                state.surrounding.clear();
                state.phase = LoadPhase::Loaded;
                return Ok(());
            }
            Err(e) => {
                state.read_failed = true;
                return self.recover(state, e.into(), String::new());
            }
        };

        match codec::detect(&text) {
            FileForm::Document => match codec::decode_document(&text) {
                Ok(config) => {
                    state.config = config;
                    state.surrounding.clear();
                }
                Err(source) => {
                    return self.recover(state, StoreError::Decode { path, source }, String::new());
                }
            },
            FileForm::Script if state.needs_eval => {
                let sink = Arc::new(LoadSink {
                    origin: path.clone(),
                    config: Mutex::new(ConfigMap::new()),
                    profiles: Arc::clone(&self.profiles),
                });
                let hooks: Arc<dyn ScriptHooks> = Arc::clone(&sink) as Arc<dyn ScriptHooks>;
                if let Err(source) = self.evaluate(&text, &path, hooks).await {
                    return self.recover(state, StoreError::Decode { path, source }, text);
                }
                state.config = std::mem::take(&mut *lock(&sink.config));
                state.needs_eval = false;
                state.surrounding = text;
            }
            FileForm::Script => {
                debug!(
                    "script at {} already evaluated; keeping current values",
                    path.display()
                );
                state.surrounding = text;
            }
        }

        debug!("loaded {} key(s) from {}", state.config.len(), path.display());
        state.phase = LoadPhase::Loaded;
        Ok(())
    }

    /// Runs the script off the async executor.
    async fn evaluate(
        &self,
        text: &str,
        path: &Path,
        hooks: Arc<dyn ScriptHooks>,
    ) -> Result<(), CodecError> {
        let sandbox = self.sandbox.clone();
        let source = text.to_string();
        let origin = path.to_path_buf();
        tokio::task::spawn_blocking(move || sandbox.evaluate(&source, &origin, hooks))
            .await
            .map_err(|e| CodecError::Script(format!("script evaluation did not finish: {e}")))?
    }

    fn recover(
        &self,
        state: &mut StoreState,
        error: StoreError,
        surrounding: String,
    ) -> Result<(), StoreError> {
        match self.policy {
            LoadPolicy::Strict => Err(error),
            LoadPolicy::UseEmptyMap => {
                warn!("{error}; continuing with an empty config");
                state.config = ConfigMap::new();
                state.surrounding = surrounding;
                state.phase = LoadPhase::Loaded;
                Ok(())
            }
        }
    }

    async fn persist(&self, state: &StoreState) {
        if state.phase != LoadPhase::Loaded {
            return;
        }
        if state.read_failed {
            warn!(
                "not saving {}: the existing file could not be read",
                self.backing.location().display()
            );
            return;
        }
        let text = autogen::replace(&state.surrounding, &state.config);
        if let Err(e) = self.backing.write(text).await {
            warn!("error writing config file: {e}");
        }
    }
}

#[async_trait]
impl<B: Backing> ConfigSource for ConfigStore<B> {
    async fn load_config(&self) -> Result<ConfigMap, StoreError> {
        ConfigStore::load_config(self).await
    }

    async fn get(&self, query: &str) -> Result<Lookup, StoreError> {
        ConfigStore::get(self, query).await
    }

    async fn get_one(&self, key: &str) -> Result<Option<Value>, StoreError> {
        ConfigStore::get_one(self, key).await
    }

    async fn set_one(&self, key: &str, value: Value) -> Result<(), StoreError> {
        ConfigStore::set_one(self, key, value).await
    }

    async fn set_many(&self, values: ConfigMap) -> Result<(), StoreError> {
        ConfigStore::set_many(self, values).await
    }

    fn set_profile(&self, name: &str, overrides: &ConfigMap) {
        ConfigStore::set_profile(self, name, overrides);
    }

    async fn profile(&self, name: &str) -> Result<Option<ConfigMap>, StoreError> {
        ConfigStore::profile(self, name).await
    }

    async fn profile_names(&self) -> Result<Vec<String>, StoreError> {
        ConfigStore::profile_names(self).await
    }
}

/// Collects hook calls while a script-form file is evaluated.
struct LoadSink {
    origin: PathBuf,
    config: Mutex<ConfigMap>,
    profiles: Arc<Mutex<ProfileRegistry>>,
}

impl ScriptHooks for LoadSink {
    fn set_config(&self, values: ConfigMap) {
        let shown = Value::Object(values.clone());
        debug!("{}: set_config {shown}", self.origin.display());
        merge_into(&mut lock(&self.config), values);
    }

    fn set_profile(&self, name: &str, overrides: ConfigMap) {
        debug!("{}: set_profile {name:?}", self.origin.display());
        lock(&self.profiles).set_profile(name, &overrides);
    }
}

/// Locks a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
