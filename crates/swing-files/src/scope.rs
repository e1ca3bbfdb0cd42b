//! Ledger scoping.
//!
//! A ledger describes only files at or below its own directory. The
//! ledger key of a file is its path relative to that directory, with `/`
//! separators on every platform. The same key is the object key in the
//! bucket.
//!
//! Absolute paths are computed lexically (joined onto the working
//! directory, `.` and `..` folded) and symlinks are not resolved.

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Separator used in ledger keys and object keys
pub const KEY_SEPARATOR: char = '/';

/// Errors raised while scoping a path to a ledger
#[derive(Debug, Error)]
pub enum ScopeError {
    /// The absolute path of an input could not be computed
    #[error("Can't get absolute path to file {}: {source}", path.display())]
    Absolute {
        /// Path as given
        path: PathBuf,
        /// Underlying error (working directory lookup)
        #[source]
        source: io::Error,
    },

    /// The file lives outside the ledger's directory
    #[error("{} is not in same or below level of {}", path.display(), root.display())]
    OutsideRoot {
        /// Absolute path of the rejected file
        path: PathBuf,
        /// Ledger directory
        root: PathBuf,
    },

    /// The path cannot be represented as a UTF-8 key
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8(PathBuf),

    /// A ledger key that would escape the ledger directory or is malformed
    #[error("invalid ledger key '{key}': {reason}")]
    InvalidKey {
        /// The offending key
        key: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// Scope of a ledger: its absolute path and the directory it governs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    root: PathBuf,
    ledger_path: PathBuf,
}

impl Scope {
    /// Build the scope of the ledger at `ledger_path`
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined
    /// for a relative path.
    pub fn for_ledger<P: AsRef<Path>>(ledger_path: P) -> Result<Self, ScopeError> {
        let ledger_path = absolute(ledger_path.as_ref())?;
        let root = ledger_path
            .parent()
            .map_or_else(|| ledger_path.clone(), Path::to_path_buf);

        Ok(Self { root, ledger_path })
    }

    /// Directory governed by the ledger
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the ledger itself
    #[must_use]
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Whether `path` names the ledger file itself
    #[must_use]
    pub fn is_ledger<P: AsRef<Path>>(&self, path: P) -> bool {
        absolute(path.as_ref()).is_ok_and(|abs| abs == self.ledger_path)
    }

    /// Check that `path` is in scope and return its absolute form
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::OutsideRoot`] when the directory containing
    /// the file is not at or below the ledger directory.
    pub fn contain<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, ScopeError> {
        let abs = absolute(path.as_ref())?;

        let inside = abs.parent().is_some_and(|dir| dir.starts_with(&self.root));
        if !inside {
            return Err(ScopeError::OutsideRoot {
                path: abs,
                root: self.root.clone(),
            });
        }

        Ok(abs)
    }

    /// Ledger key for `path`
    ///
    /// # Errors
    ///
    /// Fails if the path is out of scope or not valid UTF-8.
    pub fn key_for<P: AsRef<Path>>(&self, path: P) -> Result<String, ScopeError> {
        let abs = self.contain(path)?;

        let relative = abs
            .strip_prefix(&self.root)
            .map_err(|_| ScopeError::OutsideRoot {
                path: abs.clone(),
                root: self.root.clone(),
            })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(
                    segment
                        .to_str()
                        .ok_or_else(|| ScopeError::NonUtf8(abs.clone()))?,
                ),
                _ => {
                    return Err(ScopeError::InvalidKey {
                        key: relative.display().to_string(),
                        reason: "unexpected path component",
                    });
                }
            }
        }

        let key = segments.join("/");
        validate_key(&key)?;
        Ok(key)
    }

    /// Local path a ledger key refers to
    ///
    /// # Errors
    ///
    /// Fails if the key is malformed or would escape the ledger directory.
    pub fn local_path(&self, key: &str) -> Result<PathBuf, ScopeError> {
        validate_key(key)?;

        let mut path = self.root.clone();
        for segment in key.split(KEY_SEPARATOR) {
            path.push(segment);
        }
        Ok(path)
    }
}

/// Validate a ledger key
///
/// Keys are non-empty, relative, `/` separated, and contain no empty,
/// `.` or `..` segments.
///
/// # Errors
///
/// Returns [`ScopeError::InvalidKey`] describing the first violation.
pub fn validate_key(key: &str) -> Result<(), ScopeError> {
    let invalid = |reason| ScopeError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.starts_with(KEY_SEPARATOR) {
        return Err(invalid("leading '/'"));
    }
    if key.contains('\0') {
        return Err(invalid("NUL byte"));
    }

    for segment in key.split(KEY_SEPARATOR) {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("relative path segment")),
            s if s.contains('\\') && cfg!(windows) => return Err(invalid("backslash in segment")),
            _ => {}
        }
    }

    Ok(())
}

/// Absolute form of `path`, computed lexically
///
/// Relative paths are joined onto the working directory; `.` segments are
/// dropped and `..` removes the previous segment. Symlinks are left alone.
///
/// # Errors
///
/// Returns an error if the working directory cannot be determined.
pub fn absolute(path: &Path) -> Result<PathBuf, ScopeError> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| ScopeError::Absolute {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };

    Ok(normalize(&joined))
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(segment) => normalized.push(segment),
        }
    }

    normalized
}
