//! Fixtures shared by the Swing integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use swing_core::{
    AssumeYes, Confirm, DownloadReport, Downloader, InputFile, MemoryStore, SilentReporter,
    UploadReport, Uploader,
};
use swing_files::{Ledger, LedgerFile, Scope};
use tempfile::TempDir;

/// Bucket used by every fixture
pub const BUCKET: &str = "swing-test";

/// Region used by every fixture
pub const REGION: &str = "eu-west-1";

/// A scratch working tree with a ledger at its root and an in-memory bucket
pub struct Repo {
    dir: TempDir,
    /// Bucket shared by every run against this repo
    pub store: MemoryStore,
}

impl Repo {
    /// Empty working tree; the ledger does not exist yet
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
            store: MemoryStore::new(REGION),
        }
    }

    /// Root of the working tree
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `relative` inside the tree
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Absolute path of the ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.path("swing.csv")
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    /// Read a file of the tree
    pub fn read(&self, relative: &str) -> Vec<u8> {
        fs::read(self.path(relative)).expect("read file")
    }

    /// Raw ledger text, if the ledger exists
    pub fn ledger_text(&self) -> Option<String> {
        fs::read_to_string(self.ledger_path()).ok()
    }

    /// Parsed ledger
    pub fn ledger(&self) -> Ledger {
        Ledger::parse(&self.ledger_text().unwrap_or_default()).expect("parse ledger")
    }

    fn scope(&self) -> Scope {
        Scope::for_ledger(self.ledger_path()).expect("ledger scope")
    }

    /// Upload `paths` as a `swing -b BUCKET paths...` run would
    pub async fn try_upload(&self, paths: &[PathBuf]) -> swing_core::Result<UploadReport> {
        let mut inputs = Vec::new();
        for path in paths {
            inputs.push(InputFile::open(path).await.expect("open input"));
        }

        let mut ledger = LedgerFile::open(self.ledger_path()).expect("open ledger");
        Uploader::new(self.store.clone(), self.scope(), BUCKET)
            .expect("uploader")
            .upload(inputs, &mut ledger, &SilentReporter)
            .await
    }

    /// Upload run that is expected to succeed
    pub async fn upload(&self, paths: &[PathBuf]) -> UploadReport {
        self.try_upload(paths).await.expect("upload run")
    }

    /// Download with `confirm` answering the overwrite question
    pub async fn try_download_with(
        &self,
        confirm: &mut dyn Confirm,
    ) -> swing_core::Result<DownloadReport> {
        let mut ledger = LedgerFile::open(self.ledger_path()).expect("open ledger");
        Downloader::new(self.store.clone(), self.scope())
            .download(&mut ledger, confirm, &SilentReporter)
            .await
    }

    /// Download run that is expected to succeed
    pub async fn download_with(&self, confirm: &mut dyn Confirm) -> DownloadReport {
        self.try_download_with(confirm).await.expect("download run")
    }

    /// Download in batch mode (`swing -d -y`)
    pub async fn download(&self) -> DownloadReport {
        self.download_with(&mut AssumeYes).await
    }
}

impl Default for Repo {
    fn default() -> Self {
        Self::new()
    }
}

/// Confirmation that always answers no, counting the questions asked
#[derive(Debug, Default)]
pub struct AnswerNo {
    /// Number of questions asked
    pub asked: usize,
}

impl Confirm for AnswerNo {
    fn confirm(&mut self, _question: &str) -> swing_core::Result<bool> {
        self.asked += 1;
        Ok(false)
    }
}
