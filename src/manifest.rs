//! Structured field updates for port manifests (`vcpkg.json`).
//!
//! The manifest is parsed into an insertion-ordered JSON map, one field is
//! set, and the document is written back with 2-space indentation. Keys keep
//! the order they were read in, so the resulting diff touches only the
//! updated line.

use crate::edit::{atomic_write, EditResult};
use crate::error::{require, PatchError};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the manifest file inside a port directory.
pub const MANIFEST_FILE: &str = "vcpkg.json";

/// Field holding the port version.
pub const VERSION_FIELD: &str = "version";

/// Confirmation of a structured field update.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestUpdate {
    pub file: PathBuf,
    pub field: String,
    pub value: String,
    /// Value the field held before, `None` if it was created
    pub previous: Option<Value>,
    pub result: EditResult,
}

/// New manifest text for an in-memory update.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub content: String,
    pub previous: Option<Value>,
}

/// Compute the manifest text with `field` set to `value`.
///
/// Pure: nothing is read from or written to disk. `file` is only used for
/// error messages.
pub fn render(file: &Path, content: &str, field: &str, value: &str) -> Result<Rendered, PatchError> {
    require("field", field)?;
    require("value", value)?;

    let mut document: Map<String, Value> = match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(PatchError::MalformedDocument {
                file: file.to_path_buf(),
                reason: format!("expected a JSON object at top level, found {}", kind_of(&other)),
            })
        }
        Err(e) => {
            return Err(PatchError::MalformedDocument {
                file: file.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let previous = document.insert(field.to_string(), Value::String(value.to_string()));

    let mut rendered = serde_json::to_string_pretty(&Value::Object(document)).map_err(|e| {
        PatchError::MalformedDocument {
            file: file.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    if content.ends_with('\n') {
        rendered.push('\n');
    }

    Ok(Rendered {
        content: rendered,
        previous,
    })
}

/// Set `field` to `value` in the manifest at `path`, creating the field if
/// it is absent.
pub fn set_field(path: &Path, field: &str, value: &str) -> Result<ManifestUpdate, PatchError> {
    if path.as_os_str().is_empty() {
        return Err(PatchError::MissingArgument { name: "path" });
    }
    require("field", field)?;
    require("value", value)?;

    let content = fs::read_to_string(path).map_err(|e| PatchError::io(path, e))?;
    let rendered = render(path, &content, field, value)?;

    let result = if rendered.content == content {
        debug!(file = %path.display(), field, "manifest already up to date");
        EditResult::AlreadyApplied {
            file: path.to_path_buf(),
        }
    } else {
        atomic_write(path, rendered.content.as_bytes())?;
        info!(file = %path.display(), field, value, "manifest field updated");
        EditResult::Applied {
            file: path.to_path_buf(),
            bytes_changed: rendered.content.len(),
        }
    };

    Ok(ManifestUpdate {
        file: path.to_path_buf(),
        field: field.to_string(),
        value: value.to_string(),
        previous: rendered.previous,
        result,
    })
}

/// Set the `version` field.
pub fn update_version(path: &Path, version: &str) -> Result<ManifestUpdate, PatchError> {
    require("portVersion", version)?;
    set_field(path, VERSION_FIELD, version)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
