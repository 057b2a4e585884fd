use sdk::errors::EngineError;
use std::path::{Path, PathBuf};

/// FileSystemGuard confines the read-only file-system tools to `core.source_root`.
///
/// Paths pass four gates:
/// 1. Check deny list before canonicalization
/// 2. Canonicalize path to resolve symlinks and .. patterns
/// 3. Check deny list after canonicalization
/// 4. Verify path is within the source root
///
/// Relative paths are resolved against the source root, so the model can pass
/// the same `path` it sees in chunk metadata.
#[derive(Debug, Clone)]
pub struct FileSystemGuard {
    root: PathBuf,
    deny_list: Vec<PathBuf>,
}

impl FileSystemGuard {
    /// Creates a guard rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathCanonicalization` if the root does not exist.
    pub fn new(root: PathBuf) -> Result<Self, EngineError> {
        // Canonicalize root to handle symlinks (e.g., /var -> /private/var on macOS)
        let root = root
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(root.clone(), e.to_string()))?;

        let deny_list = vec![
            PathBuf::from(".ssh"),
            PathBuf::from(".env"),
            PathBuf::from(".aws/credentials"),
            PathBuf::from(".config/gcloud"),
            PathBuf::from("id_rsa"),
            PathBuf::from("id_ed25519"),
            PathBuf::from(".gnupg"),
            PathBuf::from(".git"),
            PathBuf::from("credentials"),
            PathBuf::from(".npmrc"),
            PathBuf::from(".pypirc"),
        ];

        Ok(Self { root, deny_list })
    }

    /// Validates a path through the four gates and returns its canonical form.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathDenied` if the path matches the deny list.
    /// Returns `EngineError::PathCanonicalization` if canonicalization fails.
    /// Returns `EngineError::PathOutsideRoot` if the path escapes the source root.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, EngineError> {
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        // Gate 1
        if self.is_denied(&candidate) {
            return Err(EngineError::PathDenied(candidate));
        }

        // Gate 2
        let canonical = candidate
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(candidate.clone(), e.to_string()))?;

        // Gate 3: catches symlink bypasses
        if self.is_denied(&canonical) {
            return Err(EngineError::PathDenied(canonical));
        }

        // Gate 4
        if !canonical.starts_with(&self.root) {
            return Err(EngineError::PathOutsideRoot(canonical));
        }

        Ok(canonical)
    }

    /// Checks if any component of the path matches a deny list entry.
    fn is_denied(&self, path: &Path) -> bool {
        self.deny_list.iter().any(|denied| {
            path.ends_with(denied)
                || path.components().any(|c| {
                    c.as_os_str()
                        .to_str()
                        .zip(denied.as_os_str().to_str())
                        .is_some_and(|(component, d)| component == d)
                })
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the root, for display back to the model
    pub fn relative<'a>(&self, canonical: &'a Path) -> &'a Path {
        canonical.strip_prefix(&self.root).unwrap_or(canonical)
    }
}
