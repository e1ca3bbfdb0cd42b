//! Swing CLI
//!
//! Pins files of a working tree to versions in a versioned S3 bucket and
//! restores them later.

mod config;
mod progress;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use swing_core::{
    AssumeYes, Confirm, DownloadOutcome, Downloader, InputFile, Prompt, S3Settings, S3Store,
    Uploader,
};
use swing_files::{LedgerFile, Scope};
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::ConsoleReporter;

/// Swing - pin files to versions in an S3 bucket
///
/// Uploads the given files and records their version ids in the Swing file.
/// With --download, brings local files back to the recorded versions.
#[derive(Parser, Debug)]
#[command(name = "swing")]
#[command(about, long_about = None)]
#[command(disable_version_flag = true, arg_required_else_help = true)]
struct Cli {
    /// Target bucket (required for upload)
    #[arg(short, long)]
    bucket: Option<String>,

    /// Default region, used when the AWS configuration has none
    #[arg(short, long)]
    region: Option<String>,

    /// Swing file path [default: swing.csv]
    #[arg(short, long = "swing-file", value_name = "PATH")]
    swing_file: Option<PathBuf>,

    /// Download the versions recorded in the Swing file
    #[arg(short, long)]
    download: bool,

    /// Don't ask before overwriting local files
    #[arg(short, long)]
    yes: bool,

    /// Print version
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// Configuration file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Files to upload
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,
}

/// What a run does, once arguments are checked
#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Upload { bucket: String, files: Vec<PathBuf> },
    Download,
}

impl Cli {
    /// Check flag combinations and resolve the mode
    ///
    /// Runs before any session is set up.
    fn mode(&self, config: &Config) -> anyhow::Result<Mode> {
        if self.download {
            if !self.files.is_empty() {
                anyhow::bail!("You can't specify both files and -d|--download");
            }
            return Ok(Mode::Download);
        }

        let bucket = self
            .bucket
            .clone()
            .or_else(|| config.storage.bucket.clone())
            .filter(|b| !b.is_empty())
            .context("[-b|--bucket] is required")?;

        Ok(Mode::Upload {
            bucket,
            files: self.files.clone(),
        })
    }

    fn ledger_path(&self, config: &Config) -> PathBuf {
        self.swing_file
            .clone()
            .unwrap_or_else(|| config.ledger.file.clone())
    }
}

/// Line printed for `-v|--version`
fn version_line() -> String {
    format!("Swing version {}", env!("CARGO_PKG_VERSION"))
}

/// Runs a blocking confirmation without stalling the runtime's other tasks
///
/// Requires the multi-threaded runtime.
struct BlockingConfirm<C>(C);

impl<C: Confirm> Confirm for BlockingConfirm<C> {
    fn confirm(&mut self, question: &str) -> swing_core::Result<bool> {
        tokio::task::block_in_place(|| self.0.confirm(question))
    }
}

/// Exit code for a failed parse: help is not a failure
fn parse_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

fn init_logging(verbose: bool, level: &str) {
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(parse_exit_code(e.kind()));
        }
    };

    if cli.version {
        println!("{}", version_line());
        return Ok(());
    }

    let config = Config::load_or_default(cli.config.as_deref())?;
    config.validate()?;

    init_logging(cli.verbose, &config.logging.level);

    let mode = cli.mode(&config)?;
    let ledger_path = cli.ledger_path(&config);
    let scope = Scope::for_ledger(&ledger_path)?;
    let mut ledger = LedgerFile::open(&ledger_path)
        .with_context(|| format!("Can't open Swing file {}", ledger_path.display()))?;
    tracing::debug!("Using Swing file {}", scope.ledger_path().display());

    let settings = config.s3_settings(cli.region.as_deref());
    let reporter = ConsoleReporter::new();

    match mode {
        Mode::Upload { bucket, files } => {
            upload(
                &bucket, files, scope, &mut ledger, settings, &config, &reporter,
            )
            .await
        }
        Mode::Download => {
            download(scope, &mut ledger, settings, &config, cli.yes, &reporter).await
        }
    }
}

/// Upload `files` and record them in the ledger
async fn upload(
    bucket: &str,
    files: Vec<PathBuf>,
    scope: Scope,
    ledger: &mut LedgerFile,
    settings: S3Settings,
    config: &Config,
    reporter: &ConsoleReporter,
) -> anyhow::Result<()> {
    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        if scope.is_ledger(&path) {
            tracing::warn!("Not uploading the Swing file itself: {}", path.display());
            println!("Skipping Swing file {}", path.display());
            continue;
        }

        match InputFile::open(&path).await {
            Ok(input) => inputs.push(input),
            Err(e) => {
                tracing::warn!("{}", e);
                println!("Error opening file {}, skipping: {e}", path.display());
            }
        }
    }

    if inputs.is_empty() {
        tracing::info!("No files to upload");
        println!("No files to upload");
        return Ok(());
    }

    let store = S3Store::connect(settings).await;
    let uploader = Uploader::new(store, scope, bucket)?
        .with_max_concurrent(config.transfer.max_concurrent);

    let report = uploader.upload(inputs, ledger, reporter).await?;
    tracing::info!(
        "Upload finished: {} uploaded, {} rejected, {} failed",
        report.uploaded.len(),
        report.rejected.len(),
        report.failed.len()
    );

    Ok(())
}

/// Bring local files to the versions recorded in the ledger
async fn download(
    scope: Scope,
    ledger: &mut LedgerFile,
    settings: S3Settings,
    config: &Config,
    assume_yes: bool,
    reporter: &ConsoleReporter,
) -> anyhow::Result<()> {
    let store = S3Store::connect(settings).await;
    let downloader =
        Downloader::new(store, scope).with_max_concurrent(config.transfer.max_concurrent);

    let mut confirm: Box<dyn Confirm> = if assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(BlockingConfirm(Prompt::stdio()))
    };

    let report = downloader
        .download(ledger, confirm.as_mut(), reporter)
        .await?;

    if report.outcome == DownloadOutcome::Aborted {
        println!("Aborted, no files were changed");
    }

    Ok(())
}
