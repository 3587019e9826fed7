//! Named override bundles ("profiles").
//!
//! A profile is a [`ConfigMap`] fragment registered under a name, either
//! directly through [`ProfileRegistry::set_profile`] or by a script-form
//! config file calling `set_profile(name, #{ ... })` while it is evaluated.
//! Applying a profile merges its bundle into the store's map; that part
//! lives on the stores because it has to save.

use std::collections::BTreeMap;

use super::config_map::ConfigMap;

/// Registry of profiles keyed by name.
///
/// Backed by a `BTreeMap` so names come out sorted without extra work.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, ConfigMap>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a copy of `overrides` under `name`, replacing any previous
    /// profile of that name.
    pub fn set_profile(&mut self, name: impl Into<String>, overrides: &ConfigMap) {
        self.profiles.insert(name.into(), overrides.clone());
    }

    /// Registered names in lexicographic order.
    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Returns the bundle registered under `name`.
    pub fn get(&self, name: &str) -> Option<&ConfigMap> {
        self.profiles.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
