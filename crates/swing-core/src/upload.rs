//! Upload orchestration.
//!
//! Inputs outside the ledger's directory are rejected up front. Every other
//! file is hashed and uploaded by its own task; results come back over a
//! channel in completion order. Once all tasks have reported, the new
//! records are merged into the ledger (new wins, other paths untouched) and
//! the ledger is rewritten in path order.
//!
//! The ledger is parsed before anything is sent, so a malformed ledger
//! stops the run while the bucket is still untouched. Uploaded objects are
//! never rolled back: if the ledger cannot be updated afterwards the run
//! fails with [`SwingError::LedgerNotUpdated`].

use crate::error::{Result, SwingError};
use crate::store::{ObjectStore, UploadRequest};
use crate::transfer::{Batch, ConcurrencyLimit, InputFile, Reporter, TransferDirection};
use std::path::PathBuf;
use swing_files::{LedgerFile, LedgerRecord, Scope, hasher};

/// Outcome of an upload run
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Records produced by successful uploads, in completion order
    pub uploaded: Vec<LedgerRecord>,
    /// Inputs rejected before upload
    pub rejected: Vec<(PathBuf, SwingError)>,
    /// Inputs whose hash or upload failed
    pub failed: Vec<(PathBuf, SwingError)>,
    /// Whether the ledger was rewritten
    pub ledger_written: bool,
}

/// An input accepted by the scoper, with its ledger key
#[derive(Debug)]
pub struct ScopedInput {
    /// Ledger key (also the object key)
    pub key: String,
    /// The opened file
    pub input: InputFile,
}

/// Uploads files to one bucket and records their versions in the ledger
#[derive(Debug, Clone)]
pub struct Uploader<S> {
    store: S,
    scope: Scope,
    bucket: String,
    region: String,
    limit: ConcurrencyLimit,
}

impl<S: ObjectStore> Uploader<S> {
    /// Create an uploader
    ///
    /// The store's region is what gets recorded in the ledger.
    ///
    /// # Errors
    ///
    /// Fails if the bucket is empty or the store has no region.
    pub fn new(store: S, scope: Scope, bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(SwingError::invalid_config("[-b|--bucket] is required"));
        }

        let region = store
            .region()
            .filter(|r| !r.is_empty())
            .ok_or(SwingError::MissingRegion)?
            .to_string();

        Ok(Self {
            store,
            scope,
            bucket,
            region,
            limit: ConcurrencyLimit::default(),
        })
    }

    /// Bound the number of uploads in flight
    #[must_use]
    pub fn with_max_concurrent(mut self, max: Option<usize>) -> Self {
        self.limit = ConcurrencyLimit::new(max);
        self
    }

    /// Region recorded for uploaded files
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Split inputs into those in the ledger's scope and those rejected
    pub fn partition(
        &self,
        inputs: Vec<InputFile>,
    ) -> (Vec<ScopedInput>, Vec<(PathBuf, SwingError)>) {
        let mut accepted = Vec::with_capacity(inputs.len());
        let mut rejected = Vec::new();

        for input in inputs {
            match self.scope.key_for(&input.path) {
                Ok(key) => accepted.push(ScopedInput { key, input }),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", input.path.display(), e);
                    rejected.push((input.path, e.into()));
                }
            }
        }

        (accepted, rejected)
    }

    /// Upload `inputs` and merge the results into `ledger`
    ///
    /// Per-file failures are reported and collected in the report; they
    /// never abort the batch. The ledger is left alone when nothing was
    /// uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`SwingError::Ledger`] if the ledger cannot be read before
    /// the uploads, and [`SwingError::LedgerNotUpdated`] if it cannot be
    /// read or written after them.
    pub async fn upload(
        &self,
        inputs: Vec<InputFile>,
        ledger: &mut LedgerFile,
        reporter: &dyn Reporter,
    ) -> Result<UploadReport> {
        let (accepted, rejected) = self.partition(inputs);
        if !rejected.is_empty() {
            reporter.rejected(&rejected);
        }

        let mut report = UploadReport {
            rejected,
            ..UploadReport::default()
        };

        if !accepted.is_empty() {
            ledger.read()?;
        }

        tracing::info!(
            "Uploading {} file(s) to {} ({})",
            accepted.len(),
            self.bucket,
            self.region
        );
        reporter.started(TransferDirection::Upload, accepted.len());

        let mut batch = Batch::new(accepted.len());
        for scoped in accepted {
            let path = scoped.input.path.clone();
            batch.spawn(
                path,
                upload_one(
                    self.store.clone(),
                    self.bucket.clone(),
                    self.region.clone(),
                    scoped,
                    self.limit.clone(),
                ),
            );
        }

        batch
            .join(|path, result| match result {
                Ok((record, bytes)) => {
                    tracing::debug!("Uploaded {} as version {}", record.path, record.version_id);
                    reporter.uploaded(&record, bytes);
                    report.uploaded.push(record);
                }
                Err(e) => {
                    tracing::warn!("Upload error for {}: {}", path.display(), e);
                    reporter.failed(TransferDirection::Upload, &path, &e);
                    report.failed.push((path, e));
                }
            })
            .await;

        reporter.finished(
            TransferDirection::Upload,
            report.uploaded.len(),
            report.failed.len(),
        );

        if report.uploaded.is_empty() {
            tracing::info!("Nothing uploaded, Swing file left unchanged");
            return Ok(report);
        }

        let uploaded = report.uploaded.len();
        let not_updated = |source| SwingError::LedgerNotUpdated { uploaded, source };

        let mut current = ledger.read().map_err(not_updated)?;
        let replaced = current.merge(report.uploaded.iter().cloned());
        ledger.write(&current).map_err(not_updated)?;

        tracing::info!(
            "Updated Swing file: {} new, {} replaced, {} total",
            uploaded - replaced,
            replaced,
            current.len()
        );
        reporter.ledger_updated(ledger.path(), current.len());
        report.ledger_written = true;

        Ok(report)
    }
}

/// Hash then upload one file; the handle is closed when this returns
async fn upload_one<S: ObjectStore>(
    store: S,
    bucket: String,
    region: String,
    scoped: ScopedInput,
    limit: ConcurrencyLimit,
) -> Result<(LedgerRecord, u64)> {
    let _permit = limit.acquire().await;
    let ScopedInput { key, input } = scoped;
    let InputFile { path, mut file } = input;

    let md5 = hasher::hash_file(&mut file)
        .await
        .map_err(|source| SwingError::Hash {
            path: path.clone(),
            source,
        })?;
    let bytes = file
        .metadata()
        .await
        .map_err(|e| SwingError::file_io(&path, e))?
        .len();

    let version_id = store
        .upload(
            UploadRequest {
                bucket: &bucket,
                key: &key,
                md5_hex: &md5,
                size: bytes,
            },
            file,
        )
        .await?;

    if version_id.is_empty() {
        return Err(SwingError::MissingVersionId { bucket, key });
    }

    Ok((
        LedgerRecord {
            path: key,
            region,
            bucket,
            md5,
            version_id,
        },
        bytes,
    ))
}
