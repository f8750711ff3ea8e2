use crate::config::ConfigError;
use crate::edit::EditError;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure a run can end with. None of them are retried.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{name} is required")]
    MissingArgument { name: &'static str },

    #[error("{file}: malformed document: {reason}")]
    MalformedDocument { file: PathBuf, reason: String },

    #[error("{file}: REF line not found")]
    PatternNotFound { file: PathBuf },

    #[error("{file}: REF line matched {count} times (expected 1)")]
    AmbiguousPattern { file: PathBuf, count: usize },

    #[error("{name} has invalid shape {value:?}: expected {expected}")]
    InvalidValueShape {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("`{command}` failed: {reason}")]
    ExternalToolFailure { command: String, reason: String },

    #[error("refusing to touch {path}: {reason}")]
    UnsafePath { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("edit error: {0}")]
    Edit(#[from] EditError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PatchError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PatchError::MissingArgument { .. } => "missing_argument",
            PatchError::MalformedDocument { .. } => "malformed_document",
            PatchError::PatternNotFound { .. } => "pattern_not_found",
            PatchError::AmbiguousPattern { .. } => "ambiguous_pattern",
            PatchError::InvalidValueShape { .. } => "invalid_value_shape",
            PatchError::ExternalToolFailure { .. } => "external_tool_failure",
            PatchError::UnsafePath { .. } => "unsafe_path",
            PatchError::Io { .. } => "io",
            PatchError::Edit(_) => "edit",
            PatchError::Config(_) => "config",
        }
    }
}

/// Fails with `MissingArgument` when `value` is empty or whitespace.
pub(crate) fn require<'a>(name: &'static str, value: &'a str) -> Result<&'a str, PatchError> {
    if value.trim().is_empty() {
        return Err(PatchError::MissingArgument { name });
    }
    Ok(value)
}
