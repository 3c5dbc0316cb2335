//! Property key declarations.
//!
//! Keys come in three flavours: statically declared keys with a default
//! and a description, template keys parameterised by a service id, and
//! custom keys that only exist because a site file mentions them.  The
//! [`KeyRegistry`] knows all three and caches template instantiations.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// A named configuration property.
///
/// Equality and hashing only consider the name.
#[derive(Debug, Clone)]
pub struct PropertyKey {
    name: Cow<'static, str>,
    default: Option<Cow<'static, str>>,
    description: Cow<'static, str>,
}

impl PropertyKey {
    /// A statically declared key.
    pub const fn declared(
        name: &'static str,
        default: Option<&'static str>,
        description: &'static str,
    ) -> Self {
        let default = match default {
            Some(d) => Some(Cow::Borrowed(d)),
            None => None,
        };
        Self {
            name: Cow::Borrowed(name),
            default,
            description: Cow::Borrowed(description),
        }
    }

    /// A key with no default, built at runtime.
    fn dynamic(name: String, description: String) -> Self {
        Self {
            name: Cow::Owned(name),
            default: None,
            description: Cow::Owned(description),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// -- Declared keys -----------------------------------------------------------

pub static HOME: PropertyKey = PropertyKey::declared(
    "quorumsh.home",
    Some("."),
    "Base directory other defaults are relative to.",
);

pub static CONF_DIR: PropertyKey = PropertyKey::declared(
    "quorumsh.conf.dir",
    Some("${quorumsh.home}/conf"),
    "Directory searched for the site properties file.",
);

pub static RPC_SCHEME: PropertyKey = PropertyKey::declared(
    "quorumsh.rpc.scheme",
    Some("http"),
    "URL scheme used to reach the cluster RPC endpoint.",
);

pub static RPC_REQUEST_TIMEOUT_MS: PropertyKey = PropertyKey::declared(
    "quorumsh.rpc.request.timeout.ms",
    Some("15000"),
    "Timeout of a single cluster RPC, in milliseconds.",
);

pub static ELECT_SETTLE_DELAY_MS: PropertyKey = PropertyKey::declared(
    "quorumsh.elect.settle.delay.ms",
    Some("3000"),
    "Wait between applying new priorities and requesting a leadership transfer.",
);

pub static ELECT_TRANSFER_TIMEOUT_MS: PropertyKey = PropertyKey::declared(
    "quorumsh.elect.transfer.timeout.ms",
    Some("60000"),
    "Timeout handed to the cluster for a leadership transfer, in milliseconds.",
);

pub static LOGGER_LEVEL: PropertyKey = PropertyKey::declared(
    "quorumsh.logger.level",
    Some("warn"),
    "Log filter used when RUST_LOG is not set.",
);

pub static LOGGER_FORMAT: PropertyKey = PropertyKey::declared(
    "quorumsh.logger.format",
    Some("text"),
    "Log output format: text or json.",
);

/// Every statically declared key.
pub static DECLARED_KEYS: [&PropertyKey; 8] = [
    &HOME,
    &CONF_DIR,
    &RPC_SCHEME,
    &RPC_REQUEST_TIMEOUT_MS,
    &ELECT_SETTLE_DELAY_MS,
    &ELECT_TRANSFER_TIMEOUT_MS,
    &LOGGER_LEVEL,
    &LOGGER_FORMAT,
];

// -- Templates ---------------------------------------------------------------

/// A key family parameterised by a service id: `{prefix}{service}{suffix}`.
#[derive(Debug)]
pub struct KeyTemplate {
    prefix: &'static str,
    suffix: &'static str,
    description: &'static str,
}

impl KeyTemplate {
    pub const fn new(prefix: &'static str, suffix: &'static str, description: &'static str) -> Self {
        Self {
            prefix,
            suffix,
            description,
        }
    }

    /// Concrete key name for `service_id`.
    pub fn key_name(&self, service_id: &str) -> String {
        format!("{}{}{}", self.prefix, service_id, self.suffix)
    }

    /// Whether `name` is an instantiation of this template.
    pub fn matches(&self, name: &str) -> bool {
        name.len() > self.prefix.len() + self.suffix.len()
            && name.starts_with(self.prefix)
            && name.ends_with(self.suffix)
    }

    fn instantiate(&self, name: String) -> PropertyKey {
        let description = self.description.to_string();
        PropertyKey::dynamic(name, description)
    }
}

/// Default `-peers` for a service id.
pub static SERVICE_PEERS: KeyTemplate = KeyTemplate::new(
    "quorumsh.",
    ".peers",
    "Comma separated HOST:PORT list of the service's raft peers.",
);

/// Default `-groupid` for a service id.
pub static SERVICE_GROUP_ID: KeyTemplate = KeyTemplate::new(
    "quorumsh.",
    ".groupid",
    "Raft group id (UUID) of the service.",
);

pub static TEMPLATES: [&KeyTemplate; 2] = [&SERVICE_PEERS, &SERVICE_GROUP_ID];

// -- Registry ----------------------------------------------------------------

/// Name-to-key lookup over declared, template and custom keys.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    dynamic: Mutex<HashMap<String, PropertyKey>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate `template` for `service_id`, reusing a cached key.
    pub fn format(&self, template: &KeyTemplate, service_id: &str) -> PropertyKey {
        let name = template.key_name(service_id);
        let mut dynamic = self.dynamic.lock().expect("key registry mutex poisoned");
        dynamic
            .entry(name.clone())
            .or_insert_with(|| template.instantiate(name))
            .clone()
    }

    /// Resolve a key name, instantiating templates on demand.
    pub fn lookup(&self, name: &str) -> Option<PropertyKey> {
        if let Some(key) = DECLARED_KEYS.iter().find(|k| k.name() == name) {
            return Some((*key).clone());
        }
        let mut dynamic = self.dynamic.lock().expect("key registry mutex poisoned");
        if let Some(key) = dynamic.get(name) {
            return Some(key.clone());
        }
        let template = TEMPLATES.iter().find(|t| t.matches(name))?;
        let key = template.instantiate(name.to_string());
        dynamic.insert(name.to_string(), key.clone());
        Some(key)
    }

    /// Look up `name`, registering it as a custom key if unknown.
    pub fn get_or_register(&self, name: &str) -> PropertyKey {
        if let Some(key) = self.lookup(name) {
            return key;
        }
        let key = PropertyKey::dynamic(name.to_string(), String::new());
        self.dynamic
            .lock()
            .expect("key registry mutex poisoned")
            .insert(name.to_string(), key.clone());
        key
    }

    /// Whether `name` may appear inside a `${...}` reference.
    pub fn is_valid(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Declared keys followed by every runtime-known key.
    pub fn keys(&self) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = DECLARED_KEYS.iter().map(|k| (*k).clone()).collect();
        let dynamic = self.dynamic.lock().expect("key registry mutex poisoned");
        let mut extra: Vec<PropertyKey> = dynamic.values().cloned().collect();
        extra.sort_by(|a, b| a.name().cmp(b.name()));
        keys.extend(extra);
        keys
    }
}
