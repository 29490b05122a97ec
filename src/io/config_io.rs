use std::fs;
use std::path::{Path, PathBuf};

use crate::io::recovery::atomic_write;
use crate::model::config::{CONFIG_KEYS, ClientConfig};

pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "TODO_SYNC_HOME";
/// Environment variable overriding `api.base_url`
pub const API_ENV: &str = "TODO_SYNC_API";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config.toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not edit config.toml: {0}")]
    Edit(#[from] toml_edit::TomlError),
    #[error("unknown config key '{0}' (known keys: {keys})", keys = CONFIG_KEYS.join(", "))]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// Resolve the data directory: explicit flag, `TODO_SYNC_HOME`,
/// `$XDG_DATA_HOME/todo-sync`, then `$HOME/.local/share/todo-sync`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var(HOME_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    let data_home = std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".local").join("share"));
    data_home.join("todo-sync")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Read config.toml. A missing file yields defaults.
pub fn read_config(data_dir: &Path) -> Result<ClientConfig, ConfigError> {
    let path = config_path(data_dir);
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

/// Read config.toml and apply environment overrides.
pub fn load_config(data_dir: &Path) -> Result<ClientConfig, ConfigError> {
    let mut config = read_config(data_dir)?;
    if let Ok(url) = std::env::var(API_ENV)
        && !url.is_empty()
    {
        config.api.base_url = url;
    }
    Ok(config)
}

/// Set a dotted key in config.toml, preserving comments and layout.
pub fn set_config_value(data_dir: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
    let path = config_path(data_dir);
    let text = if path.exists() {
        fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?
    } else {
        String::new()
    };

    let mut doc: toml_edit::DocumentMut = text.parse()?;
    apply_value(&mut doc, key, value)?;

    // Validate the edited document still deserializes
    toml::from_str::<ClientConfig>(&doc.to_string())?;

    fs::create_dir_all(data_dir).map_err(|source| ConfigError::Write {
        path: data_dir.to_path_buf(),
        source,
    })?;
    atomic_write(&path, doc.to_string().as_bytes())
        .map_err(|source| ConfigError::Write { path, source })
}

fn apply_value(doc: &mut toml_edit::DocumentMut, key: &str, value: &str) -> Result<(), ConfigError> {
    let (section, field) = key
        .split_once('.')
        .filter(|_| CONFIG_KEYS.contains(&key))
        .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

    let item = match key {
        "api.base_url" => toml_edit::value(value),
        "sync.offline" => {
            let flag: bool = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                expected: "true or false",
            })?;
            toml_edit::value(flag)
        }
        _ => {
            let n: i64 = value
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    expected: "a positive integer",
                })?;
            toml_edit::value(n)
        }
    };

    if !doc.contains_key(section) {
        doc[section] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc[section][field] = item;
    Ok(())
}
