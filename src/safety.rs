use crate::error::PatchError;
use std::path::{Component, Path, PathBuf};

/// Keeps every touched file inside `<registry>/ports`.
///
/// Port names come straight from CI inputs, so a name like `../../etc`
/// or a symlinked port directory must not redirect writes outside the
/// registry.
#[derive(Debug, Clone)]
pub struct RegistryGuard {
    /// Canonical registry root
    registry_root: PathBuf,
}

impl RegistryGuard {
    /// The registry root is canonicalized to handle symlinks correctly.
    pub fn new(registry_root: impl AsRef<Path>) -> Result<Self, PatchError> {
        let root = registry_root.as_ref();
        let registry_root = root.canonicalize().map_err(|e| PatchError::io(root, e))?;
        if !registry_root.is_dir() {
            return Err(PatchError::UnsafePath {
                path: registry_root,
                reason: "registry path is not a directory".to_string(),
            });
        }
        Ok(Self { registry_root })
    }

    pub fn registry_root(&self) -> &Path {
        &self.registry_root
    }

    pub fn ports_root(&self) -> PathBuf {
        self.registry_root.join("ports")
    }

    pub fn versions_root(&self) -> PathBuf {
        self.registry_root.join("versions")
    }

    /// Resolve `ports/<port_name>` and check it stays inside the registry.
    pub fn port_dir(&self, port_name: &str) -> Result<PathBuf, PatchError> {
        check_port_name(port_name)?;
        let dir = self.ports_root().join(port_name);
        self.validate_path(&dir)
    }

    /// Canonicalize `path` and require it to lie under the registry root.
    ///
    /// Relative paths are resolved against the registry root.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, PatchError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.registry_root.join(path)
        };

        let canonical = absolute
            .canonicalize()
            .map_err(|e| PatchError::io(&absolute, e))?;

        if !canonical.starts_with(&self.registry_root) {
            return Err(PatchError::UnsafePath {
                path: canonical,
                reason: format!("outside registry {}", self.registry_root.display()),
            });
        }

        Ok(canonical)
    }
}

/// A port name must be exactly one normal path component.
pub fn check_port_name(port_name: &str) -> Result<(), PatchError> {
    let mut components = Path::new(port_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !port_name.contains(['/', '\\']) => Ok(()),
        _ => Err(PatchError::UnsafePath {
            path: PathBuf::from(port_name),
            reason: "port name must be a single directory name".to_string(),
        }),
    }
}
