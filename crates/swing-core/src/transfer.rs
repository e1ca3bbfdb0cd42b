//! Shared pieces of the upload and download loops.
//!
//! Both directions fan out one task per file and fan the results back in
//! over a channel: each task sends exactly one message, and the aggregator
//! waits for exactly as many messages as it spawned tasks.

use crate::error::{Result, SwingError};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swing_files::LedgerRecord;
use tokio::fs::File;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// Local file to bucket
    Upload,
    /// Bucket to local file
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// A file selected for upload, opened for reading
///
/// Owned by exactly one upload task and closed when that task ends.
#[derive(Debug)]
pub struct InputFile {
    /// Path as the user gave it
    pub path: PathBuf,
    /// Open handle
    pub file: File,
}

impl InputFile {
    /// Open `path` for reading
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened or is not a regular file.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| SwingError::file_io(&path, e))?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| SwingError::file_io(&path, e))?;
        if !metadata.is_file() {
            return Err(SwingError::file_io(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        Ok(Self { path, file })
    }
}

/// Progress hooks for the orchestrators
///
/// Every method has an empty default so implementations pick what they
/// display. Calls arrive in the order results arrive, not input order.
pub trait Reporter: Send + Sync {
    /// Inputs rejected before any transfer (out of scope, bad key)
    fn rejected(&self, _inputs: &[(PathBuf, SwingError)]) {}

    /// A batch of `total` transfers is starting
    fn started(&self, _direction: TransferDirection, _total: usize) {}

    /// A file was uploaded
    fn uploaded(&self, _record: &LedgerRecord, _bytes: u64) {}

    /// A file was downloaded to `path`
    fn downloaded(&self, _path: &Path, _bytes: u64) {}

    /// A transfer failed; the batch goes on
    fn failed(&self, _direction: TransferDirection, _path: &Path, _error: &SwingError) {}

    /// A ledger entry was skipped while deciding what to download
    fn skipped(&self, _path: &str, _error: &SwingError) {}

    /// The files listed are about to be overwritten
    fn will_overwrite(&self, _paths: &[&str]) {}

    /// Every local file already matches the ledger
    fn nothing_to_download(&self) {}

    /// A batch is over
    fn finished(&self, _direction: TransferDirection, _succeeded: usize, _failed: usize) {}

    /// The ledger was rewritten with `records` records
    fn ledger_updated(&self, _path: &Path, _records: usize) {}
}

/// Reporter that displays nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// Optional bound on in-flight transfers
///
/// Unbounded by default: one running task per file.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyLimit {
    max: Option<usize>,
    semaphore: Option<Arc<Semaphore>>,
}

impl ConcurrencyLimit {
    /// Create a limit; `None` or `Some(0)` means unbounded
    #[must_use]
    pub fn new(max: Option<usize>) -> Self {
        let max = max.filter(|&n| n > 0);
        Self {
            max,
            semaphore: max.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Configured bound, if any
    #[must_use]
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Wait for a slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        }
    }
}

/// Result message sent by one transfer task
type Message<T> = (PathBuf, Result<T>);

/// Fan-out/fan-in of per-file transfer tasks
pub(crate) struct Batch<T> {
    tx: mpsc::Sender<Message<T>>,
    rx: mpsc::Receiver<Message<T>>,
    handles: Vec<(PathBuf, JoinHandle<()>)>,
}

impl<T: Send + 'static> Batch<T> {
    /// Create a batch expecting about `capacity` tasks
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx,
            handles: Vec::with_capacity(capacity),
        }
    }

    /// Spawn the task for `path`
    pub(crate) fn spawn<F>(&mut self, path: PathBuf, task: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let tx = self.tx.clone();
        let reported = path.clone();

        let handle = tokio::spawn(async move {
            let result = task.await;
            // The receiver only goes away if the aggregator is gone
            let _ = tx.send((reported, result)).await;
        });

        self.handles.push((path, handle));
    }

    /// Wait for one message per spawned task, calling `on_result` as each arrives
    ///
    /// A task that died without sending (panic) is reported as
    /// [`SwingError::TaskFailed`] for its path. This relies on panics
    /// unwinding; the release profile keeps the default `panic = "unwind"`.
    pub(crate) async fn join<C>(self, mut on_result: C)
    where
        C: FnMut(PathBuf, Result<T>),
    {
        let Self {
            tx,
            mut rx,
            handles,
        } = self;
        drop(tx);

        let expected = handles.len();
        let mut received = 0;
        while received < expected {
            match rx.recv().await {
                Some((path, result)) => {
                    received += 1;
                    on_result(path, result);
                }
                None => break,
            }
        }

        if received == expected {
            return;
        }

        tracing::warn!(
            "{} transfer task(s) ended without a result",
            expected - received
        );
        for (path, handle) in handles {
            if let Err(e) = handle.await {
                on_result(path, Err(SwingError::TaskFailed(e.to_string())));
            }
        }
    }
}
