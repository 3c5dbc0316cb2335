//! Layered property values.
//!
//! For a given key the value is taken from the first layer that has
//! one, highest precedence first:
//!
//! 1. runtime values set through `Configuration::set`,
//! 2. values loaded from the site file,
//! 3. the key's declared default.

use std::collections::HashMap;

use super::keys::PropertyKey;

/// Which layer supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Runtime,
    SiteFile,
    Default,
}

/// Raw (unresolved) values per layer.
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    runtime: HashMap<PropertyKey, String>,
    site: HashMap<PropertyKey, String>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value of `key` and the layer it came from.
    pub fn get_with_source<'a>(&'a self, key: &'a PropertyKey) -> Option<(&'a str, Source)> {
        if let Some(v) = self.runtime.get(key) {
            return Some((v.as_str(), Source::Runtime));
        }
        if let Some(v) = self.site.get(key) {
            return Some((v.as_str(), Source::SiteFile));
        }
        key.default_value().map(|v| (v, Source::Default))
    }

    pub fn get<'a>(&'a self, key: &'a PropertyKey) -> Option<&'a str> {
        self.get_with_source(key).map(|(v, _)| v)
    }

    pub fn put(&mut self, key: PropertyKey, value: String) {
        self.runtime.insert(key, value);
    }

    pub fn put_site(&mut self, key: PropertyKey, value: String) {
        self.site.insert(key, value);
    }

    /// Drop any user-supplied value; a declared default still applies.
    pub fn remove(&mut self, key: &PropertyKey) {
        self.runtime.remove(key);
        self.site.remove(key);
    }

    pub fn is_set(&self, key: &PropertyKey) -> bool {
        self.get(key).is_some()
    }

    pub fn is_set_by_user(&self, key: &PropertyKey) -> bool {
        matches!(
            self.get_with_source(key),
            Some((_, Source::Runtime | Source::SiteFile))
        )
    }

    /// Keys with a runtime or site-file value.
    pub fn user_keys(&self) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = self.runtime.keys().cloned().collect();
        for key in self.site.keys() {
            if !self.runtime.contains_key(key) {
                keys.push(key.clone());
            }
        }
        keys.sort_by(|a, b| a.name().cmp(b.name()));
        keys
    }
}
