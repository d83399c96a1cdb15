//! The closed error enum shared by every operation in this crate.
//!
//! Internal functions return `Result<T, Error>`; the container boundary
//! (`Context::get_error`) stores the most recent one in a single slot and
//! clears it on read, mirroring the reference implementation's single-slot
//! `last_error` design.

use thiserror::Error;

/// Every way a container operation can fail.
///
/// `None` is not a variant here: "no error" is represented by the absence of
/// a value in the context's last-error slot (`Option<Error>`), and
/// `OutOfMemory` is kept only for API parity with the language-neutral error
/// set in the specification — safe Rust code never constructs it, since
/// allocation failure aborts rather than returning an `Err`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid context")]
    InvalidContext,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("file error: {0}")]
    FileError(String),

    #[error("bad format: {0}")]
    BadFormat(String),

    #[error("compressor error: {0}")]
    CompressorError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("unsupported format version: {0}")]
    UnsupportedFormatVersion(u32),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
