//! Console output and progress bars.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use swing_core::{Reporter, SwingError, TransferDirection};
use swing_files::LedgerRecord;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// Reporter printing to stdout, with a file-count progress bar on terminals
pub struct ConsoleReporter {
    interactive: bool,
    batch: Mutex<Option<(ProgressBar, Instant)>>,
}

impl ConsoleReporter {
    /// Reporter for the current stdout
    #[must_use]
    pub fn new() -> Self {
        Self::with_progress_bar(console::Term::stdout().is_term())
    }

    /// Reporter with the progress bar forced on or off
    #[must_use]
    pub fn with_progress_bar(interactive: bool) -> Self {
        Self {
            interactive,
            batch: Mutex::new(None),
        }
    }

    fn bar(&self) -> Option<ProgressBar> {
        self.batch
            .lock()
            .ok()
            .and_then(|batch| batch.as_ref().map(|(bar, _)| bar.clone()))
    }

    /// Print a line without tearing the progress bar
    fn line(&self, msg: impl AsRef<str>) {
        match self.bar() {
            Some(bar) if !bar.is_hidden() => bar.println(msg),
            _ => println!("{}", msg.as_ref()),
        }
    }

    fn tick(&self, msg: &str) {
        if let Some(bar) = self.bar() {
            bar.set_message(msg.to_string());
            bar.inc(1);
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn rejected(&self, inputs: &[(PathBuf, SwingError)]) {
        for (_, error) in inputs {
            self.line(format!("{} {error}, skipping", style("warning:").yellow()));
        }
    }

    fn started(&self, direction: TransferDirection, total: usize) {
        let bar = if self.interactive {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(format!("{direction}ing"));

        if let Ok(mut batch) = self.batch.lock() {
            *batch = Some((bar, Instant::now()));
        }
    }

    fn uploaded(&self, record: &LedgerRecord, bytes: u64) {
        self.line(format!(
            "Uploaded file: {} ({}, version {})",
            record.path,
            format_bytes(bytes),
            record.version_id
        ));
        self.tick(&record.path);
    }

    fn downloaded(&self, path: &Path, bytes: u64) {
        self.line(format!(
            "Downloaded file: {} ({})",
            path.display(),
            format_bytes(bytes)
        ));
        self.tick(&path.display().to_string());
    }

    fn failed(&self, direction: TransferDirection, path: &Path, error: &SwingError) {
        self.line(format!(
            "{} Error during {direction} of {}: {error}",
            style("error:").red().bold(),
            path.display()
        ));
        self.tick(&path.display().to_string());
    }

    fn skipped(&self, path: &str, error: &SwingError) {
        self.line(format!("{} {path}: {error}, skipping", style("warning:").yellow()));
    }

    fn will_overwrite(&self, paths: &[&str]) {
        self.line("The following files will be overwritten:");
        for path in paths {
            self.line(format!("  {path}"));
        }
    }

    fn nothing_to_download(&self) {
        self.line("Nothing to download, files already updated");
    }

    fn finished(&self, direction: TransferDirection, succeeded: usize, failed: usize) {
        let batch = self.batch.lock().ok().and_then(|mut batch| batch.take());
        let elapsed = batch.map(|(bar, started)| {
            bar.finish_and_clear();
            started.elapsed()
        });

        let summary = summary(direction, succeeded, failed, elapsed);
        if failed == 0 {
            self.line(style(summary).green().to_string());
        } else {
            self.line(style(summary).yellow().to_string());
        }
    }

    fn ledger_updated(&self, path: &Path, records: usize) {
        self.line(format!(
            "Updated Swing file {} ({records} entries)",
            path.display()
        ));
    }
}

/// One-line summary of a finished batch
#[must_use]
pub fn summary(
    direction: TransferDirection,
    succeeded: usize,
    failed: usize,
    elapsed: Option<Duration>,
) -> String {
    let verb = match direction {
        TransferDirection::Upload => "Upload",
        TransferDirection::Download => "Download",
    };

    let mut line = format!("{verb} completed: {succeeded} succeeded");
    if failed > 0 {
        line.push_str(&format!(", {failed} failed"));
    }
    if let Some(elapsed) = elapsed {
        line.push_str(&format!(" in {}", format_duration(elapsed)));
    }
    line
}

/// Format bytes in human-readable format
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit_idx])
    }
}

/// Format duration in human-readable format
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
