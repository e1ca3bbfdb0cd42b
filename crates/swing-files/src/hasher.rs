//! MD5 content hashing for change detection.
//!
//! The digest recorded in the ledger is the lowercase hex MD5 of the exact
//! bytes sent to the bucket. Hashing a handle leaves it rewound to offset
//! zero so the same handle can then be streamed to the object store.

use md5::{Digest, Md5};
use std::io::{self, Read};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

/// Read buffer size used while hashing
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Length of a hex encoded MD5 digest
pub const MD5_HEX_LEN: usize = 32;

/// Hash a byte slice
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Hash everything a reader yields
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash an open file from its start, then rewind it
///
/// The handle is not closed.
///
/// # Errors
///
/// Returns an error if seeking or reading the file fails.
pub async fn hash_file(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0)).await?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    file.seek(SeekFrom::Start(0)).await?;

    Ok(hex::encode(hasher.finalize()))
}

/// Open and hash the file at `path`
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn hash_path<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut file = File::open(path).await?;
    hash_file(&mut file).await
}

/// MD5 fed piece by piece, for bodies sent in several parts
#[derive(Debug, Clone, Default)]
pub struct RunningDigest {
    hasher: Md5,
}

impl RunningDigest {
    /// Start an empty digest
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Lowercase hex digest of everything fed so far
    #[must_use]
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Compare a computed digest with a recorded one
///
/// Recorded digests are lowercase, but a hand edited ledger may not be.
#[must_use]
pub fn digest_matches(computed: &str, recorded: &str) -> bool {
    computed.eq_ignore_ascii_case(recorded.trim())
}
