use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Byte-span replacement with before-text verification.
///
/// The recipe updater locates the commit hash and hands the span to an
/// `Edit`; the edit refuses to touch the file if the bytes under the span
/// changed between planning and application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until apply() is called"]
pub struct Edit {
    /// File the span belongs to
    pub file: PathBuf,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// Text to put at [byte_start, byte_end)
    pub new_text: String,
    /// Text expected at [byte_start, byte_end) before applying
    pub expected_before: String,
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at {file}:{byte_start} (expected {expected:?}, found {found:?})")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        expected: String,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in file of length {file_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        file_len: usize,
    },

    #[error("byte offset {byte_offset} in {file} is not on a UTF-8 character boundary")]
    NotCharBoundary { file: PathBuf, byte_offset: usize },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for applied/already-applied"]
pub enum EditResult {
    Applied { file: PathBuf, bytes_changed: usize },
    /// Current text already equals `new_text`
    AlreadyApplied { file: PathBuf },
}

impl Edit {
    pub fn new(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: expected_before.into(),
        }
    }

    /// Returns the current text under the span if the edit may be applied.
    fn validate<'a>(&self, content: &'a [u8]) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                file_len: content.len(),
            });
        }

        for byte_offset in [self.byte_start, self.byte_end] {
            if !is_char_boundary(content, byte_offset) {
                return Err(EditError::NotCharBoundary {
                    file: self.file.clone(),
                    byte_offset,
                });
            }
        }

        let current = std::str::from_utf8(&content[self.byte_start..self.byte_end])?;

        if current != self.new_text && current != self.expected_before {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                expected: self.expected_before.clone(),
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Splice the edit into `content` without touching the file system.
    pub fn splice(&self, content: &str) -> Result<String, EditError> {
        self.validate(content.as_bytes())?;

        let mut out = String::with_capacity(
            content.len() + self.new_text.len() - (self.byte_end - self.byte_start),
        );
        out.push_str(&content[..self.byte_start]);
        out.push_str(&self.new_text);
        out.push_str(&content[self.byte_end..]);
        Ok(out)
    }

    /// Apply this edit to the file atomically.
    pub fn apply(&self) -> Result<EditResult, EditError> {
        let original = fs::read(&self.file)?;
        let current = self.validate(&original)?;

        if current == self.new_text {
            return Ok(EditResult::AlreadyApplied {
                file: self.file.clone(),
            });
        }

        let mut new_content = Vec::with_capacity(
            original.len() + self.new_text.len() - (self.byte_end - self.byte_start),
        );
        new_content.extend_from_slice(&original[..self.byte_start]);
        new_content.extend_from_slice(self.new_text.as_bytes());
        new_content.extend_from_slice(&original[self.byte_end..]);

        atomic_write(&self.file, &new_content)?;

        Ok(EditResult::Applied {
            file: self.file.clone(),
            bytes_changed: self.new_text.len(),
        })
    }
}

/// Same rule as `str::is_char_boundary`, on raw bytes: the offset is the
/// end of input or does not point at a UTF-8 continuation byte.
fn is_char_boundary(content: &[u8], offset: usize) -> bool {
    offset == content.len() || content.get(offset).is_some_and(|b| (*b as i8) >= -0x40)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// The tempfile lives next to the target so the rename stays on one
/// filesystem. Readers observe either the old or the new content.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(EditError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no parent directory",
            )))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the permissions of the file being replaced.
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp.path(), meta.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_invalid_range() {
        let edit = Edit::new("test.txt", 5, 20, "replacement", "");
        let result = edit.validate(b"hello world");
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
    }

    #[test]
    fn test_validate_inverted_range() {
        let edit = Edit::new("test.txt", 10, 5, "replacement", "");
        let result = edit.validate(b"hello world");
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
    }

    #[test]
    fn test_validate_before_text_mismatch() {
        let edit = Edit::new("test.txt", 0, 5, "HELLO", "howdy");
        let result = edit.validate(b"hello world");
        assert!(matches!(result, Err(EditError::BeforeTextMismatch { .. })));
    }

    #[test]
    fn test_splice_rejects_offset_inside_multibyte_char() {
        let edit = Edit::new("test.txt", 1, 1, "x", "");
        let result = edit.splice("é");
        assert!(matches!(
            result,
            Err(EditError::NotCharBoundary { byte_offset: 1, .. })
        ));
    }

    #[test]
    fn test_apply_rejects_split_char_without_writing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, "naïve").unwrap();

        // byte 3 is the second byte of 'ï'
        let edit = Edit::new(&file_path, 0, 3, "xyz", "na");
        let result = edit.apply();

        assert!(matches!(result, Err(EditError::NotCharBoundary { byte_offset: 3, .. })));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "naïve");
    }

    #[test]
    fn test_splice_in_memory() {
        let edit = Edit::new("test.txt", 6, 11, "there", "world");
        assert_eq!(edit.splice("hello world!").unwrap(), "hello there!");
    }

    #[test]
    fn test_apply_writes_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, b"original content").unwrap();

        let edit = Edit::new(&file_path, 0, 8, "modified", "original");
        let result = edit.apply().unwrap();

        assert!(matches!(result, EditResult::Applied { .. }));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified content");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, b"modified content").unwrap();

        let edit = Edit::new(&file_path, 0, 8, "modified", "original");
        let result = edit.apply().unwrap();

        assert!(matches!(result, EditResult::AlreadyApplied { .. }));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified content");
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("out.json");
        fs::write(&file_path, b"old").unwrap();

        atomic_write(&file_path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "new");
        let leftovers = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
