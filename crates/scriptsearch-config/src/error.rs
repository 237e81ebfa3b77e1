//! Configuration error types.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading, validating or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file exists but cannot be read
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::ScriptSearchConfig`]
    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create config directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No home directory, so no global config location
    #[error("could not determine home directory")]
    NoHomeDir,

    /// A single key holds an out-of-range value
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Sections are inconsistent with each other
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.into(),
            source,
        }
    }

    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// File the error refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::ReadFile { path, .. }
            | Self::ParseToml { path, .. }
            | Self::WriteFile { path, .. }
            | Self::CreateDir { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::NoHomeDir;
        assert_eq!(err.to_string(), "could not determine home directory");

        let err = ConfigError::invalid_value("search.max_limit", "must be at least 1");
        assert!(err.to_string().contains("search.max_limit"));
        assert!(err.to_string().contains("at least 1"));
        assert!(err.path().is_none());
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let source = toml::from_str::<toml::Value>("[search\nlimit = ").unwrap_err();
        let err = ConfigError::parse_toml("/home/user/.scriptsearch/config.toml", source);
        assert!(err.to_string().contains(".scriptsearch/config.toml"));
        assert_eq!(
            err.path(),
            Some(Path::new("/home/user/.scriptsearch/config.toml"))
        );
    }
}
