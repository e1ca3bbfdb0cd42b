//! The ledger ("swing file").
//!
//! A `;` separated text file with one header row followed by one row per
//! versioned file:
//!
//! ```text
//! file;region;bucket;md5;version_id
//! a.txt;eu-west-1;my-bucket;7fc56270e7a70fa81a5935b72eacbe29;3HL4kqtJlcpXroDTDmJ+rmSpXd3dIbrHY
//! sub/b.txt;eu-west-1;my-bucket;2c0439ec1e0b36016ae42f11ba5d0e44;0Xk2.Aj0fSNNxUhdZ8ih1xCKVTBSMiqk
//! ```
//!
//! Rows are keyed by path (at most one row per path) and always written in
//! ascending path order, so the file diffs cleanly under source control.
//! There is no quoting: a field may not contain `;` or a line break.

use crate::FILE_MODE;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column names of the header row, in schema order
pub const LEDGER_HEADER: [&str; FIELD_COUNT] = ["file", "region", "bucket", "md5", "version_id"];

/// Field separator
pub const FIELD_SEPARATOR: char = ';';

/// Number of fields per row
pub const FIELD_COUNT: usize = 5;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading or writing the ledger file failed
    #[error("ledger I/O error: {0}")]
    Io(#[from] io::Error),

    /// A row does not have exactly five fields
    #[error("Error reading Swing file: line {line}: expected 5 fields, found {found}")]
    FieldCount {
        /// 1-based line number in the file
        line: usize,
        /// Number of fields found
        found: usize,
    },

    /// A row leaves the path or the version id empty
    #[error("Error reading Swing file: line {line}: {field} is empty")]
    EmptyField {
        /// 1-based line number in the file
        line: usize,
        /// Column name
        field: &'static str,
    },

    /// A record field cannot be written without corrupting the file
    #[error("can't write {field} of '{path}' to Swing file: {reason}")]
    InvalidField {
        /// Path of the offending record
        path: String,
        /// Column name
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// One ledger row: where the pinned version of a file lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerRecord {
    /// Ledger-relative path with `/` separators; also the object key
    pub path: String,
    /// Region the object was written to
    pub region: String,
    /// Bucket holding the object
    pub bucket: String,
    /// Lowercase hex MD5 of the uploaded bytes
    pub md5: String,
    /// Server-assigned version id
    pub version_id: String,
}

impl LedgerRecord {
    /// Fields in schema order
    #[must_use]
    pub fn fields(&self) -> [&str; FIELD_COUNT] {
        [
            &self.path,
            &self.region,
            &self.bucket,
            &self.md5,
            &self.version_id,
        ]
    }

    fn from_fields(fields: [&str; FIELD_COUNT]) -> Self {
        let [path, region, bucket, md5, version_id] = fields.map(str::to_string);
        Self {
            path,
            region,
            bucket,
            md5,
            version_id,
        }
    }

    /// Check that every field survives a write/read cycle unchanged
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidField`] for the first bad field.
    pub fn check_writable(&self) -> Result<(), LedgerError> {
        let invalid = |field, reason| LedgerError::InvalidField {
            path: self.path.clone(),
            field,
            reason,
        };

        if self.path.is_empty() {
            return Err(invalid("file", "empty path"));
        }
        if self.version_id.is_empty() {
            return Err(invalid("version_id", "empty version id"));
        }

        for (&name, value) in LEDGER_HEADER.iter().zip(self.fields()) {
            if value.contains(FIELD_SEPARATOR) {
                return Err(invalid(name, "contains ';'"));
            }
            if value.contains(['\n', '\r']) {
                return Err(invalid(name, "contains a line break"));
            }
            if value.starts_with(char::is_whitespace) {
                return Err(invalid(name, "starts with whitespace"));
            }
        }

        Ok(())
    }
}

/// In-memory ledger, keyed and ordered by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: BTreeMap<String, LedgerRecord>,
}

impl Ledger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for `path`, if any
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&LedgerRecord> {
        self.records.get(path)
    }

    /// Records in ascending path order
    pub fn iter(&self) -> impl Iterator<Item = &LedgerRecord> {
        self.records.values()
    }

    /// Insert a record, replacing any record with the same path
    pub fn insert(&mut self, record: LedgerRecord) -> Option<LedgerRecord> {
        self.records.insert(record.path.clone(), record)
    }

    /// Overlay `updates` onto the ledger; new records win over existing ones
    ///
    /// Records for other paths are left untouched. Returns how many
    /// records replaced an existing one.
    pub fn merge<I>(&mut self, updates: I) -> usize
    where
        I: IntoIterator<Item = LedgerRecord>,
    {
        updates
            .into_iter()
            .filter_map(|record| self.insert(record))
            .count()
    }

    /// Parse ledger text
    ///
    /// The first non-blank line is the header and is discarded without
    /// validation. Blank lines are ignored, leading whitespace in fields is
    /// trimmed, and a later row for a path replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::FieldCount`] for a row without exactly five
    /// fields and [`LedgerError::EmptyField`] for a row with an empty path
    /// or version id.
    pub fn parse(input: &str) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        let mut header_seen = false;

        for (index, line) in input.lines().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            if !header_seen {
                header_seen = true;
                continue;
            }

            let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim_start).collect();
            let fields: [&str; FIELD_COUNT] =
                fields
                    .try_into()
                    .map_err(|fields: Vec<&str>| LedgerError::FieldCount {
                        line: index + 1,
                        found: fields.len(),
                    })?;

            let record = LedgerRecord::from_fields(fields);
            let empty = |field| LedgerError::EmptyField {
                line: index + 1,
                field,
            };
            if record.path.is_empty() {
                return Err(empty("file"));
            }
            if record.version_id.is_empty() {
                return Err(empty("version_id"));
            }

            ledger.insert(record);
        }

        Ok(ledger)
    }

    /// Read and parse a ledger from `reader`
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, non UTF-8 content or malformed rows.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, LedgerError> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }

    /// Write the header and every record in path order to `writer`
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be represented or the writer fails. Nothing
    /// is written when a record is invalid.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), LedgerError> {
        for record in self.iter() {
            record.check_writable()?;
        }

        writeln!(writer, "{}", LEDGER_HEADER.join(";"))?;
        for record in self.iter() {
            writeln!(writer, "{}", record.fields().join(";"))?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Render the ledger as text
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be represented.
    pub fn render(&self) -> Result<String, LedgerError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| LedgerError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

impl FromIterator<LedgerRecord> for Ledger {
    fn from_iter<I: IntoIterator<Item = LedgerRecord>>(iter: I) -> Self {
        let mut ledger = Self::new();
        ledger.merge(iter);
        ledger
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a LedgerRecord;
    type IntoIter = std::collections::btree_map::Values<'a, String, LedgerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}

/// The ledger file on disk, held open for the duration of a run
///
/// Writes replace the file atomically: the new contents go to a temporary
/// sibling which is then renamed over the ledger, so a crash leaves either
/// the old or the new ledger, never a truncated one.
#[derive(Debug)]
pub struct LedgerFile {
    path: PathBuf,
    file: File,
}

impl LedgerFile {
    /// Open the ledger for reading and writing, creating it if absent
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let file = open_options().open(&path)?;

        tracing::debug!("Opened Swing file {}", path.display());

        Ok(Self { path, file })
    }

    /// Path the ledger was opened with
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole ledger
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or malformed rows.
    pub fn read(&mut self) -> Result<Ledger, LedgerError> {
        self.file.seek(SeekFrom::Start(0))?;
        Ledger::read_from(&mut self.file)
    }

    /// Replace the ledger contents with `ledger`
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be represented or the file cannot be
    /// replaced. The previous contents stay in place on failure.
    pub fn write(&mut self, ledger: &Ledger) -> Result<(), LedgerError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp = tempfile::Builder::new()
            .prefix(".swing-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            ledger.write_to(&mut writer)?;
        }

        // Keep the permissions of the file being replaced (0644 when Swing created it)
        let permissions = self.file.metadata()?.permissions();
        fs::set_permissions(temp.path(), permissions)?;
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| LedgerError::Io(e.error))?;
        self.file = open_options().open(&self.path)?;

        tracing::debug!(
            "Wrote {} records to Swing file {}",
            ledger.len(),
            self.path.display()
        );

        Ok(())
    }
}

fn open_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    options
}
