//! Commit pin updates for build recipes (`portfile.cmake`).
//!
//! A recipe pins its upstream source with a marked reference line:
//!
//! ```text
//! vcpkg_from_github(
//!     OUT_SOURCE_PATH SOURCE_PATH
//!     REPO owner/project
//!     REF 0123456789abcdef0123456789abcdef01234567 # CICD Replace
//! )
//! ```
//!
//! Only the 40-character hash is rewritten; every other byte of the file is
//! kept as is.

use crate::edit::{Edit, EditResult};
use crate::error::{require, PatchError};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Name of the recipe file inside a port directory.
pub const RECIPE_FILE: &str = "portfile.cmake";

const REF_PATTERN: &str = r"REF\s+([a-f0-9]{40})\s+#\s+CICD\sReplace";

fn ref_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(REF_PATTERN).expect("REF pattern is a valid regex"))
}

/// A full git commit id: exactly 40 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitRef(String);

impl GitRef {
    pub fn parse(value: &str) -> Result<Self, PatchError> {
        let valid = value.len() == 40
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(PatchError::InvalidValueShape {
                name: "portGitSHA",
                value: value.to_string(),
                expected: "exactly 40 lowercase hex characters",
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for GitRef {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GitRef::parse(s)
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confirmation of a reference line update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeUpdate {
    pub file: PathBuf,
    /// Hash the reference line held before
    pub previous: String,
    pub git_ref: GitRef,
    pub result: EditResult,
}

/// Locate the single reference line in `content` and build the edit that
/// swaps its hash for `new_ref`.
pub fn plan_ref(file: &Path, content: &str, new_ref: &GitRef) -> Result<Edit, PatchError> {
    let mut spans = ref_line()
        .captures_iter(content)
        .filter_map(|caps| caps.get(1));

    let Some(hash) = spans.next() else {
        return Err(PatchError::PatternNotFound {
            file: file.to_path_buf(),
        });
    };

    let extra = spans.count();
    if extra > 0 {
        return Err(PatchError::AmbiguousPattern {
            file: file.to_path_buf(),
            count: extra + 1,
        });
    }

    Ok(Edit::new(
        file,
        hash.start(),
        hash.end(),
        new_ref.as_str(),
        hash.as_str(),
    ))
}

/// Rewrite the reference line of the recipe at `path` to pin `new_ref`.
pub fn replace_ref(path: &Path, new_ref: &str) -> Result<RecipeUpdate, PatchError> {
    if path.as_os_str().is_empty() {
        return Err(PatchError::MissingArgument { name: "path" });
    }
    require("portGitSHA", new_ref)?;
    let git_ref = GitRef::parse(new_ref)?;

    let content = fs::read_to_string(path).map_err(|e| PatchError::io(path, e))?;
    let edit = plan_ref(path, &content, &git_ref)?;
    let previous = edit.expected_before.clone();

    debug!(file = %path.display(), from = %previous, to = %git_ref, "reference line located");
    let result = edit.apply()?;
    info!(file = %path.display(), git_ref = %git_ref, "reference line updated");

    Ok(RecipeUpdate {
        file: path.to_path_buf(),
        previous,
        git_ref,
        result,
    })
}
