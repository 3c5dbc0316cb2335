//! Site file discovery and parsing.
//!
//! The site file supplies per-installation defaults such as the peer
//! list and group id of each service.  It is only ever read.  Two
//! formats are accepted: Java-style `.properties` (the default name)
//! and, for files ending in `.yaml`/`.yml`, a YAML mapping whose nested
//! keys are joined with dots.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use crate::errors::ConfigError;

/// File name looked up in every configuration directory.
pub const SITE_PROPERTIES: &str = "quorumsh-site.properties";

/// Environment variable naming an extra configuration directory.
pub const CONF_DIR_ENV: &str = "QUORUMSH_CONF_DIR";

/// Directories searched for [`SITE_PROPERTIES`], in order.
pub fn search_dirs(conf_dir: Option<&str>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(dir) = std::env::var(CONF_DIR_ENV) {
        if !dir.is_empty() {
            dirs.push(PathBuf::from(dir));
        }
    }
    if let Some(dir) = conf_dir {
        dirs.push(PathBuf::from(dir));
    }
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(Path::new(&home).join(".quorumsh"));
    }
    dirs.push(PathBuf::from("/etc/quorumsh"));
    dirs
}

/// First existing site file under `dirs`.
pub fn find_site_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|d| d.join(SITE_PROPERTIES))
        .find(|p| p.is_file())
}

/// Read `path` into `(key, value)` pairs in file order.
pub fn load_site_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let shown = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::SiteIo {
        path: shown.clone(),
        source,
    })?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let entries = if is_yaml {
        parse_yaml(&shown, &contents)?
    } else {
        parse_properties(&shown, &contents)?
    };
    debug!("Loaded {} entries from site file {}", entries.len(), shown);
    Ok(entries)
}

/// Parse `key=value` / `key: value` lines.  `#` and `!` start comments.
pub fn parse_properties(path: &str, contents: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut entries = Vec::new();
    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let sep = line
            .find(['=', ':'])
            .ok_or_else(|| ConfigError::SiteSyntax {
                path: path.to_string(),
                line: idx + 1,
            })?;
        let key = line[..sep].trim();
        if key.is_empty() {
            return Err(ConfigError::SiteSyntax {
                path: path.to_string(),
                line: idx + 1,
            });
        }
        entries.push((key.to_string(), line[sep + 1..].trim().to_string()));
    }
    Ok(entries)
}

/// Parse a YAML mapping, flattening nested mappings into dotted keys.
pub fn parse_yaml(path: &str, contents: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let root: Value = serde_yaml::from_str(contents).map_err(|source| ConfigError::SiteYaml {
        path: path.to_string(),
        source,
    })?;
    let mut entries = Vec::new();
    match root {
        Value::Null => {}
        Value::Mapping(_) => flatten(path, "", &root, &mut entries)?,
        _ => {
            return Err(ConfigError::SiteSyntax {
                path: path.to_string(),
                line: 1,
            })
        }
    }
    Ok(entries)
}

fn flatten(
    path: &str,
    prefix: &str,
    value: &Value,
    out: &mut Vec<(String, String)>,
) -> Result<(), ConfigError> {
    let syntax = || ConfigError::SiteSyntax {
        path: path.to_string(),
        line: 0,
    };
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let k = scalar(k).ok_or_else(syntax)?;
                let name = if prefix.is_empty() {
                    k
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(path, &name, v, out)?;
            }
        }
        Value::Sequence(items) => {
            let parts: Option<Vec<String>> = items.iter().map(scalar).collect();
            out.push((prefix.to_string(), parts.ok_or_else(syntax)?.join(",")));
        }
        Value::Null => {}
        other => out.push((prefix.to_string(), scalar(other).ok_or_else(syntax)?)),
    }
    Ok(())
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
