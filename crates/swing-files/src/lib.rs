//! # Swing Files
//!
//! Local side of the Swing file versioning tool.
//!
//! This crate provides:
//! - Path scoping: which files a ledger may describe and their ledger keys
//! - The ledger ("swing file") codec: a `;` separated, path sorted manifest
//! - MD5 content hashing of local files

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hasher;
pub mod ledger;
pub mod scope;

pub use ledger::{LEDGER_HEADER, Ledger, LedgerError, LedgerFile, LedgerRecord};
pub use scope::{Scope, ScopeError};

/// Default ledger file name, relative to the working directory
pub const DEFAULT_LEDGER_FILE: &str = "swing.csv";

/// Permission bits for files Swing creates (ledger and downloaded files)
pub const FILE_MODE: u32 = 0o644;
