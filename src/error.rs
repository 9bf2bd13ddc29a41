//! Error kinds returned by every parsing entry point.

use std::fmt;

/// Discriminant for [`OcsvError`], also exposed numerically across the C ABI
/// via `ocsv_last_error_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Reserved: the state machine currently tolerates invalid UTF-8 by
    /// carrying the raw bytes through; nothing in this crate raises it yet.
    InvalidUtf8 = 0,
    UnterminatedQuote = 1,
    InvalidCharAfterQuote = 2,
    FieldTooLarge = 3,
    RowTooLarge = 4,
    OutOfRange = 5,
    UseAfterDestroy = 6,
    InvalidDialect = 7,
    AllocationFailed = 8,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidUtf8 => "invalid UTF-8",
            ErrorKind::UnterminatedQuote => "unterminated quote",
            ErrorKind::InvalidCharAfterQuote => "invalid character after closing quote",
            ErrorKind::FieldTooLarge => "field exceeds max_field_bytes",
            ErrorKind::RowTooLarge => "row exceeds max_row_bytes",
            ErrorKind::OutOfRange => "index out of range",
            ErrorKind::UseAfterDestroy => "use after destroy",
            ErrorKind::InvalidDialect => "invalid dialect",
            ErrorKind::AllocationFailed => "allocation failed",
        };
        f.write_str(s)
    }
}

/// A parse or API-level failure. Carries 1-based `line`/`column` per the
/// position the state machine had reached when the failure was detected;
/// API-level errors (`OutOfRange`, `UseAfterDestroy`, `InvalidDialect`) use
/// `line = 0, column = 0` since they are not tied to a scan position.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{kind} at line {line}, column {column}: {message}")]
pub struct OcsvError {
    pub kind: ErrorKind,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl OcsvError {
    pub fn new(kind: ErrorKind, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn api(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, 0, 0, message)
    }
}

pub type Result<T> = std::result::Result<T, OcsvError>;
