//! File persistence: alert files, filter settings, alert discovery.
//!
//! Two on-disk encodings are supported, selected from the file extension:
//! a line-oriented KST text format (`.vsa`, `.vpefs`) and XML (`.vsax`,
//! `.xml`).

mod alert;
mod discovery;
mod filter;
mod kst;

pub use alert::{load_alert, parse_alert, serialize_alert, write_alert};
pub use discovery::discover_alert_files;
pub use filter::{FilterSettings, FilterState, GROUND_TRUTH_FILTER};

use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed file: {0}")]
    Malformed(String),

    #[error("XML error: {0}")]
    Xml(String),
}

impl PersistenceError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Encoding of a persisted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Kst,
    Xml,
}

impl FileFormat {
    /// XML when the extension contains an `x` (`.vsax`, `.xml`), KST otherwise.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.to_ascii_lowercase().contains('x') => FileFormat::Xml,
            _ => FileFormat::Kst,
        }
    }
}
