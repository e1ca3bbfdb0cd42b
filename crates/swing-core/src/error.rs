//! Error types for Swing operations
//!
//! Errors fall in two groups that decide how a run reacts to them:
//!
//! - **Per-file**: scoping, local I/O and transfer failures. The file is
//!   reported and skipped, the rest of the batch continues.
//! - **Global**: ledger, session, configuration and prompt failures. The
//!   run stops and the process exits non-zero.
//!
//! # Example
//!
//! ```
//! use swing_core::SwingError;
//!
//! let err = SwingError::transfer("a.txt", "connection reset");
//! assert!(err.is_per_file());
//! assert!(!SwingError::MissingRegion.is_per_file());
//! ```

use std::borrow::Cow;
use std::io;
use std::path::PathBuf;
use swing_files::{LedgerError, ScopeError};
use thiserror::Error;

/// Errors that can occur in Swing operations
#[derive(Debug, Error)]
pub enum SwingError {
    // ============ Local Errors ============
    /// Input is out of the ledger's scope or its key is malformed
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Opening, reading or writing a local file failed
    #[error("File I/O error on {}: {source}", path.display())]
    FileIo {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Hashing a local file failed
    #[error("Can't calculate MD5 hash of file {}: {source}", path.display())]
    Hash {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    // ============ Ledger Errors ============
    /// Reading or writing the ledger failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Uploads went through but the ledger could not be rewritten
    #[error("Files are uploaded but Swing file can't be updated ({uploaded} uploaded): {source}")]
    LedgerNotUpdated {
        /// Number of files already uploaded
        uploaded: usize,
        /// Why the ledger could not be updated
        #[source]
        source: LedgerError,
    },

    // ============ Transfer Errors ============
    /// Upload or download failed
    #[error("Transfer of {key} failed: {reason}")]
    Transfer {
        /// Object key
        key: String,
        /// Failure description
        reason: Cow<'static, str>,
    },

    /// Object or version does not exist
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Credentials lack access to the object
    #[error("Access denied for key: {0}")]
    Forbidden(String),

    /// Bucket returned no version id, usually because versioning is off
    #[error("Bucket {bucket} returned no version id for {key}; is versioning enabled?")]
    MissingVersionId {
        /// Bucket name
        bucket: String,
        /// Object key
        key: String,
    },

    /// A transfer task ended without reporting a result
    #[error("Transfer task failed: {0}")]
    TaskFailed(String),

    // ============ Session Errors ============
    /// No region could be resolved for uploads
    #[error("Missing AWS region configuration")]
    MissingRegion,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    // ============ Interaction Errors ============
    /// Reading the answer to a prompt failed
    #[error("Error reading input: {0}")]
    Prompt(#[source] io::Error),
}

impl SwingError {
    /// Create a transfer error
    pub fn transfer(key: impl Into<String>, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Transfer {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a local file I/O error
    pub fn file_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error only affects one file of a batch
    #[must_use]
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::Scope(_)
                | Self::FileIo { .. }
                | Self::Hash { .. }
                | Self::Transfer { .. }
                | Self::NotFound(_)
                | Self::Forbidden(_)
                | Self::MissingVersionId { .. }
                | Self::TaskFailed(_)
        )
    }
}

/// Result type for Swing operations
pub type Result<T> = std::result::Result<T, SwingError>;
