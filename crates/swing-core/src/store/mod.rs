//! Object store clients.
//!
//! Swing needs very little from the bucket: store bytes under a key and get
//! back a server-assigned version id, then fetch exactly those bytes again
//! by key and version id. Connection pooling, retries and multipart
//! chunking are the client's business.
//!
//! - [`S3Store`] talks to Amazon S3 or any S3-compatible endpoint
//!   (`s3` feature, on by default).
//! - [`MemoryStore`] keeps versions in process, for tests and dry runs.

pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::{S3Settings, S3Store};

use crate::error::Result;
use async_trait::async_trait;
use tokio::fs::File;

/// Parameters of an upload
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// Target bucket
    pub bucket: &'a str,
    /// Object key (the ledger key)
    pub key: &'a str,
    /// Lowercase hex MD5 of the body, checked by the server when supported
    pub md5_hex: &'a str,
    /// Body length in bytes
    pub size: u64,
}

/// Parameters of a download
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    /// Source bucket
    pub bucket: &'a str,
    /// Object key (the ledger key)
    pub key: &'a str,
    /// Version to fetch
    pub version_id: &'a str,
}

/// A versioned object store
///
/// Implementations are cheap to clone and safe to share between tasks.
#[async_trait]
pub trait ObjectStore: Clone + Send + Sync + 'static {
    /// Region requests go to, if one is known
    fn region(&self) -> Option<&str>;

    /// A client for the same store pinned to `region`
    #[must_use]
    fn with_region(&self, region: &str) -> Self;

    /// Upload `body` from its current offset to the end
    ///
    /// Returns the version id the store assigned. The handle is consumed
    /// and closed when the upload finishes.
    async fn upload(&self, request: UploadRequest<'_>, body: File) -> Result<String>;

    /// Write the bytes of one object version into `sink` from offset zero
    ///
    /// Returns the number of bytes written.
    async fn download(&self, request: DownloadRequest<'_>, sink: &mut File) -> Result<u64>;
}
