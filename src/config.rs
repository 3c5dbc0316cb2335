//! Layered shell configuration.
//!
//! [`Configuration`] combines the key registry, the layered
//! [`PropertyStore`] and `${key}` substitution.  Values are stored raw and
//! resolved on every read, so a reference picks up whichever layer
//! currently supplies the referenced key.

pub mod keys;
pub mod properties;
pub mod site;

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::errors::ConfigError;
use keys::{KeyRegistry, KeyTemplate, PropertyKey};
use properties::{PropertyStore, Source};

/// Matches one `${key}` reference.
const REFERENCE_PATTERN: &str = r"\$\{([^{}]*)\}";

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(REFERENCE_PATTERN).expect("reference pattern is valid"))
}

/// Property lookup with typed getters and recursive substitution.
#[derive(Debug, Default)]
pub struct Configuration {
    registry: KeyRegistry,
    properties: PropertyStore,
    site_file: Option<PathBuf>,
}

impl Configuration {
    /// Declared defaults only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus the site file.
    ///
    /// An explicit `site_file` must exist; otherwise the standard
    /// directories are searched and a missing file is not an error.
    pub fn load(site_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut conf = Self::new();
        let path = match site_file {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let conf_dir = conf.get(&keys::CONF_DIR).ok();
                site::find_site_file(&site::search_dirs(conf_dir.as_deref()))
            }
        };
        if let Some(path) = path {
            let entries = site::load_site_file(&path)?;
            conf.merge(entries);
            info!("Loaded site properties from {}", path.display());
            conf.site_file = Some(path);
        } else {
            debug!("No site properties file found, using defaults");
        }
        Ok(conf)
    }

    /// Path of the site file this configuration was loaded from.
    pub fn site_file(&self) -> Option<&Path> {
        self.site_file.as_deref()
    }

    // -- Keys ----------------------------------------------------------------

    /// Key for `name`, if declared, templated or already known.
    pub fn key(&self, name: &str) -> Option<PropertyKey> {
        self.registry.lookup(name)
    }

    /// Instantiate a template key for a service id.
    pub fn template_key(&self, template: &KeyTemplate, service_id: &str) -> PropertyKey {
        self.registry.format(template, service_id)
    }

    pub fn keys(&self) -> Vec<PropertyKey> {
        self.registry.keys()
    }

    pub fn user_keys(&self) -> Vec<PropertyKey> {
        self.properties.user_keys()
    }

    // -- Mutation ------------------------------------------------------------

    /// Set a runtime value.  Empty values are rejected; use [`Self::unset`].
    pub fn set(&mut self, key: &PropertyKey, value: impl ToString) -> Result<(), ConfigError> {
        let value = value.to_string();
        if value.is_empty() {
            return Err(ConfigError::EmptyValue {
                key: key.name().to_string(),
            });
        }
        self.properties.put(key.clone(), value);
        Ok(())
    }

    /// Remove user values for `key`; its default, if any, applies again.
    pub fn unset(&mut self, key: &PropertyKey) {
        self.properties.remove(key);
    }

    /// Merge site-file entries.  Unknown names become custom keys.
    pub fn merge<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (k, v) in entries {
            let name = k.as_ref().trim();
            let value = v.as_ref().trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            let key = self.registry.get_or_register(name);
            self.properties.put_site(key, value.to_string());
        }
    }

    // -- Lookup --------------------------------------------------------------

    /// Fully resolved value of `key`.
    pub fn get(&self, key: &PropertyKey) -> Result<String, ConfigError> {
        let raw = self
            .properties
            .get(key)
            .ok_or_else(|| ConfigError::UndefinedKey {
                key: key.name().to_string(),
            })?;
        let mut chain = vec![key.name().to_string()];
        self.resolve(raw, &mut chain)
    }

    /// Layer that supplies `key`, if any.
    pub fn source(&self, key: &PropertyKey) -> Option<Source> {
        self.properties.get_with_source(key).map(|(_, s)| s)
    }

    /// Whether `key` has a value and that value resolves.
    pub fn is_set(&self, key: &PropertyKey) -> bool {
        self.properties.is_set(key) && self.get(key).is_ok()
    }

    /// Like [`Self::is_set`] but ignores declared defaults.
    pub fn is_set_by_user(&self, key: &PropertyKey) -> bool {
        self.properties.is_set_by_user(key) && self.get(key).is_ok()
    }

    pub fn get_int(&self, key: &PropertyKey) -> Result<i32, ConfigError> {
        self.parse(key, "integer")
    }

    pub fn get_long(&self, key: &PropertyKey) -> Result<i64, ConfigError> {
        self.parse(key, "long")
    }

    pub fn get_double(&self, key: &PropertyKey) -> Result<f64, ConfigError> {
        self.parse(key, "double")
    }

    pub fn get_bool(&self, key: &PropertyKey) -> Result<bool, ConfigError> {
        let raw = self.get(key)?;
        if raw.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(mismatch(key, raw, "boolean"))
        }
    }

    /// Parse the upper-cased value with `T::from_str`.
    pub fn get_enum<T: FromStr>(&self, key: &PropertyKey) -> Result<T, ConfigError> {
        let raw = self.get(key)?;
        raw.to_ascii_uppercase()
            .parse::<T>()
            .map_err(|_| mismatch(key, raw, std::any::type_name::<T>()))
    }

    /// Split on `delimiter`, trimming entries and dropping empty ones.
    pub fn get_list(&self, key: &PropertyKey, delimiter: &str) -> Result<Vec<String>, ConfigError> {
        let raw = self.get(key)?;
        Ok(raw
            .split(delimiter)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }

    /// Millisecond value as a [`Duration`]; negative values are an error.
    pub fn get_duration_ms(&self, key: &PropertyKey) -> Result<Duration, ConfigError> {
        let ms = self.get_long(key)?;
        u64::try_from(ms)
            .map(Duration::from_millis)
            .map_err(|_| mismatch(key, ms.to_string(), "non-negative duration in milliseconds"))
    }

    fn parse<T: FromStr>(&self, key: &PropertyKey, expected: &'static str) -> Result<T, ConfigError> {
        let raw = self.get(key)?;
        raw.trim().parse::<T>().map_err(|_| mismatch(key, raw, expected))
    }

    /// Replace `${key}` references in `base` until none remain.
    ///
    /// `chain` holds the keys currently being resolved; meeting one of
    /// them again is a cycle.
    fn resolve(&self, base: &str, chain: &mut Vec<String>) -> Result<String, ConfigError> {
        let mut resolved = base.to_string();
        while let Some((range, name)) = next_reference(&resolved) {
            if chain.contains(&name) {
                return Err(ConfigError::CircularDependency {
                    key: name,
                    chain: chain.clone(),
                });
            }
            let key = self
                .registry
                .lookup(&name)
                .ok_or_else(|| ConfigError::InvalidKey { key: name.clone() })?;
            let raw = self
                .properties
                .get(&key)
                .ok_or_else(|| ConfigError::UndefinedKey { key: name.clone() })?;
            chain.push(name);
            let value = self.resolve(raw, chain)?;
            chain.pop();
            resolved.replace_range(range, &value);
        }
        Ok(resolved)
    }
}

/// Byte range and trimmed name of the first `${key}` in `text`.
fn next_reference(text: &str) -> Option<(Range<usize>, String)> {
    let caps = reference_regex().captures(text)?;
    let whole = caps.get(0)?;
    let inner = caps.get(1)?;
    Some((whole.range(), inner.as_str().trim().to_string()))
}

fn mismatch(key: &PropertyKey, value: String, expected: &'static str) -> ConfigError {
    ConfigError::TypeMismatch {
        key: key.name().to_string(),
        value,
        expected,
    }
}
