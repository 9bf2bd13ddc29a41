//! Parser configuration record.

use crate::error::{ErrorKind, OcsvError};

/// Configurable RFC 4180 parsing rules. Value type: copyable, comparable,
/// and caller-supplied — this crate never attempts dialect discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: u8,
    /// `0` disables comment-line skipping.
    pub comment: u8,
    pub relaxed: bool,
    pub skip_empty_lines: bool,
    pub trim: bool,
    pub max_field_bytes: u32,
    pub max_row_bytes: u32,
    /// `-1` means unbounded.
    pub from_line: i64,
    /// `-1` means unbounded.
    pub to_line: i64,
    pub skip_lines_with_error: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: b'"',
            comment: b'#',
            relaxed: false,
            skip_empty_lines: false,
            trim: false,
            max_field_bytes: u32::MAX,
            max_row_bytes: u32::MAX,
            from_line: -1,
            to_line: -1,
            skip_lines_with_error: false,
        }
    }
}

impl Dialect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the rules in §4.1: `delimiter`/`quote`/`escape` must be
    /// distinct ASCII bytes and neither `\n` nor `\r`; `comment` may be `0`
    /// (disabled) or any ASCII byte distinct from the other three.
    pub fn validate(&self) -> Result<(), OcsvError> {
        let reserved = [b'\n', b'\r'];
        let core = [self.delimiter, self.quote, self.escape];

        for &b in &core {
            if !b.is_ascii() || reserved.contains(&b) {
                return Err(OcsvError::api(
                    ErrorKind::InvalidDialect,
                    format!("delimiter/quote/escape must be ASCII and not newline/CR, got {b:#04x}"),
                ));
            }
        }
        if self.delimiter == self.quote || self.delimiter == self.escape {
            return Err(OcsvError::api(
                ErrorKind::InvalidDialect,
                "delimiter must differ from quote and escape",
            ));
        }

        if self.comment != 0 {
            if !self.comment.is_ascii() || reserved.contains(&self.comment) {
                return Err(OcsvError::api(
                    ErrorKind::InvalidDialect,
                    "comment must be ASCII and not newline/CR",
                ));
            }
            if self.comment == self.delimiter || self.comment == self.quote {
                return Err(OcsvError::api(
                    ErrorKind::InvalidDialect,
                    "comment must differ from delimiter and quote",
                ));
            }
        }

        if self.from_line >= 0 && self.to_line >= 0 && self.from_line > self.to_line {
            return Err(OcsvError::api(
                ErrorKind::InvalidDialect,
                "from_line must not exceed to_line",
            ));
        }

        Ok(())
    }

    /// Whether 0-based row index `row` falls inside the `[from_line, to_line]`
    /// window (open bounds represented by `-1`).
    pub(crate) fn in_window(&self, row: u64) -> bool {
        let row = row as i64;
        let after_from = self.from_line < 0 || row >= self.from_line;
        let before_to = self.to_line < 0 || row <= self.to_line;
        after_from && before_to
    }
}
