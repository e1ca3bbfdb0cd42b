//! Download orchestration.
//!
//! The ledger is compared with the working tree first: a record is pending
//! when its local file is missing or hashes differently. Pending records are
//! listed, confirmed, then fetched concurrently, each with a client pinned
//! to the record's region.
//!
//! Files are written in place. A failed download can leave a partially
//! written file behind; the next run sees the digest mismatch and fetches
//! it again.

use crate::error::{Result, SwingError};
use crate::prompt::{Confirm, OVERWRITE_QUESTION};
use crate::store::{DownloadRequest, ObjectStore};
use crate::transfer::{Batch, ConcurrencyLimit, Reporter, TransferDirection};
use std::io;
use std::path::{Path, PathBuf};
use swing_files::{Ledger, LedgerFile, LedgerRecord, Scope, hasher};
use tokio::fs::OpenOptions;

/// A record whose local copy must be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDownload {
    /// The ledger record
    pub record: LedgerRecord,
    /// Where the file lives locally
    pub local_path: PathBuf,
}

/// Result of comparing the ledger with the working tree
#[derive(Debug, Default)]
pub struct DownloadPlan {
    /// Records to fetch, in ledger order
    pub pending: Vec<PlannedDownload>,
    /// Number of records whose local file already matches
    pub current: usize,
    /// Records that could not be checked, by ledger key
    pub skipped: Vec<(String, SwingError)>,
}

impl DownloadPlan {
    /// Ledger keys of the pending records
    #[must_use]
    pub fn pending_paths(&self) -> Vec<&str> {
        self.pending.iter().map(|p| p.record.path.as_str()).collect()
    }
}

/// How a download run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Every local file already matched the ledger
    NothingToDownload,
    /// The user declined to overwrite
    Aborted,
    /// Transfers were attempted
    Completed,
}

/// Outcome of a download run
#[derive(Debug)]
pub struct DownloadReport {
    /// How the run ended
    pub outcome: DownloadOutcome,
    /// Records already current
    pub current: usize,
    /// Local paths written
    pub downloaded: Vec<PathBuf>,
    /// Local paths whose download failed
    pub failed: Vec<(PathBuf, SwingError)>,
    /// Records that could not be checked
    pub skipped: Vec<(String, SwingError)>,
}

/// Restores the working tree to the versions recorded in the ledger
#[derive(Debug, Clone)]
pub struct Downloader<S> {
    store: S,
    scope: Scope,
    limit: ConcurrencyLimit,
}

impl<S: ObjectStore> Downloader<S> {
    /// Create a downloader for the ledger scoped by `scope`
    pub fn new(store: S, scope: Scope) -> Self {
        Self {
            store,
            scope,
            limit: ConcurrencyLimit::default(),
        }
    }

    /// Bound the number of downloads in flight
    #[must_use]
    pub fn with_max_concurrent(mut self, max: Option<usize>) -> Self {
        self.limit = ConcurrencyLimit::new(max);
        self
    }

    /// Decide which records need downloading
    pub async fn plan(&self, ledger: &Ledger) -> DownloadPlan {
        let mut plan = DownloadPlan::default();

        for record in ledger {
            let local_path = match self.scope.local_path(&record.path) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Skipping ledger entry {}: {}", record.path, e);
                    plan.skipped.push((record.path.clone(), e.into()));
                    continue;
                }
            };

            match check_local(&local_path, &record.md5).await {
                Ok(true) => {
                    tracing::debug!("{} is up to date", record.path);
                    plan.current += 1;
                }
                Ok(false) => plan.pending.push(PlannedDownload {
                    record: record.clone(),
                    local_path,
                }),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", record.path, e);
                    plan.skipped.push((record.path.clone(), e));
                }
            }
        }

        plan
    }

    /// Bring every file in `ledger` to its recorded version
    ///
    /// # Errors
    ///
    /// Fails if the ledger cannot be read or the confirmation cannot be
    /// answered. Per-file failures are collected in the report.
    pub async fn download(
        &self,
        ledger: &mut LedgerFile,
        confirm: &mut dyn Confirm,
        reporter: &dyn Reporter,
    ) -> Result<DownloadReport> {
        let records = ledger.read()?;
        let plan = self.plan(&records).await;
        for (path, error) in &plan.skipped {
            reporter.skipped(path, error);
        }

        let mut report = DownloadReport {
            outcome: DownloadOutcome::Completed,
            current: plan.current,
            downloaded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        };

        if plan.pending.is_empty() {
            tracing::info!("Nothing to download, {} file(s) current", plan.current);
            reporter.nothing_to_download();
            report.outcome = DownloadOutcome::NothingToDownload;
            report.skipped = plan.skipped;
            return Ok(report);
        }

        reporter.will_overwrite(&plan.pending_paths());
        if !confirm.confirm(OVERWRITE_QUESTION)? {
            tracing::info!("Download aborted by user");
            report.outcome = DownloadOutcome::Aborted;
            report.skipped = plan.skipped;
            return Ok(report);
        }

        tracing::info!("Downloading {} file(s)", plan.pending.len());
        reporter.started(TransferDirection::Download, plan.pending.len());

        let mut batch = Batch::new(plan.pending.len());
        for planned in plan.pending {
            let path = planned.local_path.clone();
            batch.spawn(
                path,
                download_one(self.store.clone(), planned, self.limit.clone()),
            );
        }

        batch
            .join(|path, result| match result {
                Ok(bytes) => {
                    tracing::debug!("Downloaded {} ({} bytes)", path.display(), bytes);
                    reporter.downloaded(&path, bytes);
                    report.downloaded.push(path);
                }
                Err(e) => {
                    tracing::warn!("Download error for {}: {}", path.display(), e);
                    reporter.failed(TransferDirection::Download, &path, &e);
                    report.failed.push((path, e));
                }
            })
            .await;

        reporter.finished(
            TransferDirection::Download,
            report.downloaded.len(),
            report.failed.len(),
        );
        report.skipped = plan.skipped;

        Ok(report)
    }
}

/// `Ok(true)` if the file at `path` hashes to `md5`, `Ok(false)` if it
/// differs or does not exist
async fn check_local(path: &Path, md5: &str) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(SwingError::file_io(path, e)),
    }

    let digest = hasher::hash_path(path)
        .await
        .map_err(|source| SwingError::Hash {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(hasher::digest_matches(&digest, md5))
}

async fn download_one<S: ObjectStore>(
    store: S,
    planned: PlannedDownload,
    limit: ConcurrencyLimit,
) -> Result<u64> {
    let _permit = limit.acquire().await;
    let PlannedDownload { record, local_path } = planned;

    let mut options = OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    options.mode(swing_files::FILE_MODE);

    let mut file = options
        .open(&local_path)
        .await
        .map_err(|e| SwingError::file_io(&local_path, e))?;

    let store = if record.region.is_empty() {
        store
    } else {
        store.with_region(&record.region)
    };

    let written = store
        .download(
            DownloadRequest {
                bucket: &record.bucket,
                key: &record.path,
                version_id: &record.version_id,
            },
            &mut file,
        )
        .await?;

    file.set_len(written)
        .await
        .map_err(|e| SwingError::file_io(&local_path, e))?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::AssumeYes;
    use crate::store::MemoryStore;
    use crate::transfer::SilentReporter;
    use std::fs;

    struct Refuse(usize);

    impl Confirm for Refuse {
        fn confirm(&mut self, _question: &str) -> Result<bool> {
            self.0 += 1;
            Ok(false)
        }
    }

    fn record(store: &MemoryStore, path: &str, bytes: &[u8]) -> LedgerRecord {
        let version_id = store.put("bucket", path, bytes.to_vec());
        LedgerRecord {
            path: path.to_string(),
            region: "eu-west-1".to_string(),
            bucket: "bucket".to_string(),
            md5: hasher::hash_bytes(bytes),
            version_id,
        }
    }

    fn setup(records: Vec<LedgerRecord>) -> (tempfile::TempDir, LedgerFile, Scope) {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("swing.csv");
        let mut ledger = LedgerFile::open(&ledger_path).unwrap();
        ledger
            .write(&records.into_iter().collect::<Ledger>())
            .unwrap();
        let scope = Scope::for_ledger(&ledger_path).unwrap();
        (dir, ledger, scope)
    }

    #[tokio::test]
    async fn test_plan_classifies_records() {
        let store = MemoryStore::new("eu-west-1");
        let records = vec![
            record(&store, "current.txt", b"same"),
            record(&store, "changed.txt", b"new"),
            record(&store, "missing.txt", b"gone"),
        ];
        let (dir, mut ledger, scope) = setup(records);
        fs::write(dir.path().join("current.txt"), "same").unwrap();
        fs::write(dir.path().join("changed.txt"), "old").unwrap();

        let plan = Downloader::new(store, scope)
            .plan(&ledger.read().unwrap())
            .await;

        assert_eq!(plan.current, 1);
        assert_eq!(plan.pending_paths(), vec!["changed.txt", "missing.txt"]);
        assert!(plan.skipped.is_empty());
        assert_eq!(plan.pending[0].local_path, dir.path().join("changed.txt"));
    }

    #[tokio::test]
    async fn test_plan_rejects_escaping_keys() {
        let store = MemoryStore::new("eu-west-1");
        let mut bad = record(&store, "ok.txt", b"x");
        bad.path = "../outside.txt".to_string();
        let (_dir, mut ledger, scope) = setup(vec![bad]);

        let plan = Downloader::new(store, scope)
            .plan(&ledger.read().unwrap())
            .await;

        assert!(plan.pending.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert!(matches!(plan.skipped[0].1, SwingError::Scope(_)));
    }

    #[tokio::test]
    async fn test_download_overwrites_and_truncates() {
        let store = MemoryStore::new("us-east-1");
        let records = vec![
            record(&store, "a.txt", b"A"),
            record(&store, "new.txt", b"fresh"),
        ];
        let (dir, mut ledger, scope) = setup(records);
        fs::write(dir.path().join("a.txt"), "much longer local contents").unwrap();

        let report = Downloader::new(store.clone(), scope)
            .download(&mut ledger, &mut AssumeYes, &SilentReporter)
            .await
            .unwrap();

        assert_eq!(report.outcome, DownloadOutcome::Completed);
        assert_eq!(report.downloaded.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"A");
        assert_eq!(fs::read(dir.path().join("new.txt")).unwrap(), b"fresh");

        // Each download used a client pinned to the record's region
        assert!(
            store
                .calls()
                .iter()
                .filter(|c| c.direction == TransferDirection::Download)
                .all(|c| c.region.as_deref() == Some("eu-west-1"))
        );
    }

    #[tokio::test]
    async fn test_nothing_to_download_skips_prompt() {
        let store = MemoryStore::new("eu-west-1");
        let (dir, mut ledger, scope) = setup(vec![record(&store, "a.txt", b"A")]);
        fs::write(dir.path().join("a.txt"), "A").unwrap();

        let mut refuse = Refuse(0);
        let report = Downloader::new(store.clone(), scope)
            .download(&mut ledger, &mut refuse, &SilentReporter)
            .await
            .unwrap();

        assert_eq!(report.outcome, DownloadOutcome::NothingToDownload);
        assert_eq!(report.current, 1);
        assert_eq!(refuse.0, 0);
        assert_eq!(store.call_count(TransferDirection::Download), 0);
    }

    #[tokio::test]
    async fn test_declined_prompt_writes_nothing() {
        let store = MemoryStore::new("eu-west-1");
        let (dir, mut ledger, scope) = setup(vec![record(&store, "a.txt", b"A")]);
        fs::write(dir.path().join("a.txt"), "local edit").unwrap();

        let mut refuse = Refuse(0);
        let report = Downloader::new(store.clone(), scope)
            .download(&mut ledger, &mut refuse, &SilentReporter)
            .await
            .unwrap();

        assert_eq!(report.outcome, DownloadOutcome::Aborted);
        assert_eq!(refuse.0, 1);
        assert_eq!(store.call_count(TransferDirection::Download), 0);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "local edit");
    }

    #[tokio::test]
    async fn test_failed_download_does_not_abort_batch() {
        let store = MemoryStore::new("eu-west-1");
        let records = vec![
            record(&store, "good.txt", b"good"),
            record(&store, "bad.txt", b"bad"),
        ];
        let (dir, mut ledger, scope) = setup(records);
        store.fail_key("bad.txt");

        let report = Downloader::new(store, scope)
            .with_max_concurrent(Some(1))
            .download(&mut ledger, &mut AssumeYes, &SilentReporter)
            .await
            .unwrap();

        assert_eq!(report.downloaded, vec![dir.path().join("good.txt")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, dir.path().join("bad.txt"));
    }

    #[tokio::test]
    async fn test_missing_parent_directory_is_per_file() {
        let store = MemoryStore::new("eu-west-1");
        let (_dir, mut ledger, scope) = setup(vec![record(&store, "sub/dir/a.txt", b"A")]);

        let report = Downloader::new(store, scope)
            .download(&mut ledger, &mut AssumeYes, &SilentReporter)
            .await
            .unwrap();

        assert!(report.downloaded.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, SwingError::FileIo { .. }));
    }
}
