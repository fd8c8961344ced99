use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A configuration layer that can be overlaid by a later one.
///
/// `other` wins for every value it sets; unset values fall through to `self`.
pub trait Merge: Sized {
    fn merge(self, other: Self) -> Self;
}

/// Reads a JSON configuration layer.
///
/// A missing file is not an error (`Ok(None)`); an unreadable or malformed one is.
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    let layer = serde_json::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(layer))
}

/// Folds layers over `defaults` in order; later layers take precedence.
pub fn layer_configs<T, I>(defaults: T, layers: I) -> T
where
    T: Merge,
    I: IntoIterator<Item = Option<T>>,
{
    layers
        .into_iter()
        .flatten()
        .fold(defaults, |acc, layer| acc.merge(layer))
}

/// Default config file for an application: `<app_name>.conf` in the working directory.
pub fn default_config_path(app_name: &str) -> PathBuf {
    PathBuf::from(format!("{}.conf", app_name))
}
