use crate::config::schema::FileConfig;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        message: String,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation {
                path: None,
                message,
            } => ConfigError::Validation {
                path: Some(path),
                message,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(f, "failed to parse config TOML ({}): {}", path.display(), source),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Validation { path, message } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), message),
                None => write!(f, "invalid config: {}", message),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<FileConfig, ConfigError> {
    let config: FileConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;

    if matches!(&config.steps, Some(steps) if steps.is_empty()) {
        return Err(ConfigError::Validation {
            path: None,
            message: "steps must list at least one step".to_string(),
        });
    }
    if matches!(&config.port_name, Some(name) if name.trim().is_empty()) {
        return Err(ConfigError::Validation {
            path: None,
            message: "port_name must not be empty".to_string(),
        });
    }

    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<FileConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}
