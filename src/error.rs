//! Crate-wide error type.
//!
//! Only the Fatal tier of the error taxonomy in spec §7 is represented here
//! (byte-source I/O, cancellation). Record-local and speculative failures never
//! propagate as `Result::Err` - they are recorded into the scan result or silently
//! dropped; see [`crate::diagnostics::Diagnostic`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("byte source read failed at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("scan cancelled")]
    Cancelled,

    #[error("byte source too small to contain a header ({len} bytes)")]
    TooSmall { len: u64 },

    #[error("endianness could not be detected from the first 4 bytes")]
    UnknownEndian,

    #[error("game module not found in captured memory")]
    ModuleNotFound,
}

pub type ScanResult<T> = Result<T, ScanError>;
