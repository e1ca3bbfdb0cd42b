//! In-process versioned object store.
//!
//! Every upload appends a new version with a fresh id, like a bucket with
//! versioning enabled. Clones share the same objects; [`MemoryStore::with_region`]
//! only changes the region recorded for later calls.

use super::{DownloadRequest, ObjectStore, UploadRequest};
use crate::error::{Result, SwingError};
use crate::transfer::TransferDirection;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use swing_files::hasher;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

/// A request the store has served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Upload or download
    pub direction: TransferDirection,
    /// Bucket
    pub bucket: String,
    /// Object key
    pub key: String,
    /// Region of the client that made the call
    pub region: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    /// (bucket, key) -> versions, oldest first
    objects: DashMap<(String, String), Vec<(String, Vec<u8>)>>,
    next_version: AtomicU64,
    failing_keys: DashSet<String>,
    calls: Mutex<Vec<StoreCall>>,
}

/// Versioned object store kept in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    region: Option<String>,
}

impl MemoryStore {
    /// Create an empty store with a default region
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            shared: Arc::default(),
            region: Some(region.into()),
        }
    }

    /// Store `bytes` as a new version and return its id
    pub fn put(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) -> String {
        let version_id = format!(
            "{:016x}",
            self.shared.next_version.fetch_add(1, Ordering::Relaxed) + 1
        );

        self.shared
            .objects
            .entry((bucket.to_string(), key.to_string()))
            .or_default()
            .push((version_id.clone(), bytes.into()));

        version_id
    }

    /// Bytes of one version, if it exists
    #[must_use]
    pub fn get(&self, bucket: &str, key: &str, version_id: &str) -> Option<Vec<u8>> {
        self.shared
            .objects
            .get(&(bucket.to_string(), key.to_string()))?
            .iter()
            .find(|(id, _)| id == version_id)
            .map(|(_, bytes)| bytes.clone())
    }

    /// Version ids stored under a key, oldest first
    #[must_use]
    pub fn versions(&self, bucket: &str, key: &str) -> Vec<String> {
        self.shared
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|versions| versions.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    /// Make every transfer of `key` fail
    pub fn fail_key(&self, key: &str) {
        self.shared.failing_keys.insert(key.to_string());
    }

    /// Calls served so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.shared
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Number of calls served in `direction`
    #[must_use]
    pub fn call_count(&self, direction: TransferDirection) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.direction == direction)
            .count()
    }

    fn record(&self, direction: TransferDirection, bucket: &str, key: &str) -> Result<()> {
        if let Ok(mut calls) = self.shared.calls.lock() {
            calls.push(StoreCall {
                direction,
                bucket: bucket.to_string(),
                key: key.to_string(),
                region: self.region.clone(),
            });
        }

        if self.shared.failing_keys.contains(key) {
            return Err(SwingError::transfer(key.to_string(), "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    fn with_region(&self, region: &str) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            region: Some(region.to_string()),
        }
    }

    async fn upload(&self, request: UploadRequest<'_>, mut body: File) -> Result<String> {
        self.record(TransferDirection::Upload, request.bucket, request.key)?;

        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)
            .await
            .map_err(|e| SwingError::transfer(request.key.to_string(), e.to_string()))?;

        // Mirrors the Content-MD5 check a real bucket performs
        if !hasher::digest_matches(&hasher::hash_bytes(&bytes), request.md5_hex) {
            return Err(SwingError::transfer(
                request.key.to_string(),
                "content digest mismatch",
            ));
        }

        Ok(self.put(request.bucket, request.key, bytes))
    }

    async fn download(&self, request: DownloadRequest<'_>, sink: &mut File) -> Result<u64> {
        self.record(TransferDirection::Download, request.bucket, request.key)?;

        let bytes = self
            .get(request.bucket, request.key, request.version_id)
            .ok_or_else(|| {
                SwingError::NotFound(format!("{}@{}", request.key, request.version_id))
            })?;

        let write_err = |e: std::io::Error| SwingError::transfer(request.key.to_string(), e.to_string());
        sink.seek(SeekFrom::Start(0)).await.map_err(write_err)?;
        sink.write_all(&bytes).await.map_err(write_err)?;
        sink.flush().await.map_err(write_err)?;

        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_assigns_distinct_versions() {
        let store = MemoryStore::new("eu-west-1");
        let v1 = store.put("bucket", "a.txt", b"A".to_vec());
        let v2 = store.put("bucket", "a.txt", b"AA".to_vec());

        assert_ne!(v1, v2);
        assert_eq!(store.versions("bucket", "a.txt"), vec![v1.clone(), v2.clone()]);
        assert_eq!(store.get("bucket", "a.txt", &v1), Some(b"A".to_vec()));
        assert_eq!(store.get("bucket", "a.txt", &v2), Some(b"AA".to_vec()));
        assert_eq!(store.get("other", "a.txt", &v1), None);
    }

    #[test]
    fn test_with_region_shares_objects() {
        let store = MemoryStore::new("eu-west-1");
        let pinned = store.with_region("us-east-1");
        let version = pinned.put("bucket", "k", b"x".to_vec());

        assert_eq!(store.region(), Some("eu-west-1"));
        assert_eq!(pinned.region(), Some("us-east-1"));
        assert!(store.get("bucket", "k", &version).is_some());
    }

    #[tokio::test]
    async fn test_upload_download() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        tokio::fs::write(&src, b"BB").await.unwrap();
        tokio::fs::write(&dst, b"previous contents").await.unwrap();

        let store = MemoryStore::new("eu-west-1");
        let version = store
            .upload(
                UploadRequest {
                    bucket: "bucket",
                    key: "sub/b.txt",
                    md5_hex: "2c0439ec1e0b36016ae42f11ba5d0e44",
                    size: 2,
                },
                File::open(&src).await.unwrap(),
            )
            .await
            .unwrap();

        let mut sink = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&dst)
            .await
            .unwrap();
        let written = store
            .download(
                DownloadRequest {
                    bucket: "bucket",
                    key: "sub/b.txt",
                    version_id: &version,
                },
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.call_count(TransferDirection::Upload), 1);
        assert_eq!(store.call_count(TransferDirection::Download), 1);
    }

    #[tokio::test]
    async fn test_upload_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        tokio::fs::write(&src, b"A").await.unwrap();

        let store = MemoryStore::new("eu-west-1");
        let result = store
            .upload(
                UploadRequest {
                    bucket: "bucket",
                    key: "a.txt",
                    md5_hex: "00000000000000000000000000000000",
                    size: 1,
                },
                File::open(&src).await.unwrap(),
            )
            .await;

        assert!(matches!(result, Err(SwingError::Transfer { .. })));
        assert!(store.versions("bucket", "a.txt").is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_and_missing_version() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("dst");
        let mut sink = File::create(&dst).await.unwrap();

        let store = MemoryStore::new("eu-west-1");
        let request = DownloadRequest {
            bucket: "bucket",
            key: "missing",
            version_id: "v1",
        };
        assert!(matches!(
            store.download(request, &mut sink).await,
            Err(SwingError::NotFound(_))
        ));

        store.fail_key("missing");
        assert!(matches!(
            store.download(request, &mut sink).await,
            Err(SwingError::Transfer { .. })
        ));
    }
}
