//! Swing transfer orchestration.
//!
//! Swing pins files of a working tree to object versions in a versioned
//! bucket. The pinning lives in a small ledger file (see [`swing_files`])
//! that is committed next to the files it describes.
//!
//! - [`Uploader`] hashes and uploads files, then merges the returned
//!   version ids into the ledger.
//! - [`Downloader`] restores every file whose local digest differs from
//!   the ledger, after confirmation.
//! - [`ObjectStore`] abstracts the bucket: [`S3Store`] for S3, and
//!   [`MemoryStore`] in process.
//!
//! # Example
//!
//! ```no_run
//! use swing_core::{MemoryStore, SilentReporter, Uploader};
//! use swing_core::transfer::InputFile;
//! use swing_files::{LedgerFile, Scope};
//!
//! # async fn run() -> swing_core::Result<()> {
//! let mut ledger = LedgerFile::open("swing.csv")?;
//! let scope = Scope::for_ledger("swing.csv")?;
//! let uploader = Uploader::new(MemoryStore::new("eu-west-1"), scope, "my-bucket")?;
//!
//! let inputs = vec![InputFile::open("assets/logo.png").await?];
//! let report = uploader.upload(inputs, &mut ledger, &SilentReporter).await?;
//! println!("{} file(s) uploaded", report.uploaded.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod download;
pub mod error;
pub mod prompt;
pub mod store;
pub mod transfer;
pub mod upload;

pub use download::{DownloadOutcome, DownloadPlan, DownloadReport, Downloader, PlannedDownload};
pub use error::{Result, SwingError};
pub use prompt::{AssumeYes, Confirm, Prompt};
pub use store::{DownloadRequest, MemoryStore, ObjectStore, UploadRequest};
#[cfg(feature = "s3")]
pub use store::{S3Settings, S3Store};
pub use transfer::{ConcurrencyLimit, InputFile, Reporter, SilentReporter, TransferDirection};
pub use upload::{ScopedInput, UploadReport, Uploader};
