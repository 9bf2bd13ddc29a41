//! One-shot parse wrapping Scanner + StateMachine + Store (§4.5).

use tracing::{debug, error};

use crate::dialect::Dialect;
use crate::error::{ErrorKind, OcsvError};
use crate::state_machine::{Action, ByteClassMap, StateMachine};
use crate::store::Store;

pub struct BatchParser {
    dialect: Dialect,
    class_map: ByteClassMap,
    store: Store,
}

impl BatchParser {
    pub fn new(dialect: Dialect) -> Result<Self, OcsvError> {
        dialect.validate()?;
        let class_map = ByteClassMap::new(dialect.delimiter, dialect.quote, dialect.comment);
        debug!(?dialect, "parser constructed");
        Ok(Self {
            dialect,
            class_map,
            store: Store::new(),
        })
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Resets the Store, drives the byte pump over the full input, runs EOF
    /// finalisation. On error the Store may contain partial rows (or rows
    /// from recovered lines under `skip_lines_with_error`); callers must
    /// treat the Store as authoritative only when this returns `Ok`, unless
    /// `skip_lines_with_error` is set.
    #[tracing::instrument(level = "debug", skip(self, input), fields(bytes = input.len()))]
    pub fn parse(&mut self, input: &[u8]) -> Result<(), OcsvError> {
        self.store.clear();
        self.store.source_byte_count = input.len() as u64;

        let mut cursor = Cursor::new(&self.dialect);
        let result = cursor.run(input, &self.class_map, &self.dialect, &mut self.store);
        if let Err(e) = &result {
            error!(kind = ?e.kind, line = e.line, column = e.column, "{}", e.message);
            self.store.set_failed(e.clone());
        }
        result
    }
}

/// Mutable machine state threaded through one `parse`/`feed` call. Factored
/// out of `BatchParser` so `StreamParser` can hold the same shape across
/// chunk boundaries.
pub(crate) struct Cursor {
    pub(crate) sm: StateMachine,
    pub(crate) field_buf: Vec<u8>,
    pub(crate) field_quoted: bool,
    pub(crate) row_field_count: u32,
    pub(crate) row_byte_count: u64,
    pub(crate) row_empty: bool,
    pub(crate) line: u32,
    pub(crate) column: u32,
    pub(crate) row_index: u64,
}

impl Cursor {
    pub(crate) fn new(_dialect: &Dialect) -> Self {
        Self {
            sm: StateMachine::new(),
            field_buf: Vec::new(),
            field_quoted: false,
            row_field_count: 0,
            row_byte_count: 0,
            row_empty: true,
            line: 1,
            column: 1,
            row_index: 0,
        }
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) -> OcsvError {
        OcsvError::new(kind, self.line, self.column, message.into())
    }

    fn append(&mut self, dialect: &Dialect, byte: u8) -> Result<(), OcsvError> {
        if self.field_buf.len() as u32 >= dialect.max_field_bytes {
            return Err(self.error(
                ErrorKind::FieldTooLarge,
                format!("field exceeds max_field_bytes ({})", dialect.max_field_bytes),
            ));
        }
        self.field_buf.push(byte);
        self.row_byte_count += 1;
        if self.row_byte_count > dialect.max_row_bytes as u64 {
            return Err(self.error(
                ErrorKind::RowTooLarge,
                format!("row exceeds max_row_bytes ({})", dialect.max_row_bytes),
            ));
        }
        self.row_empty = false;
        Ok(())
    }

    fn emit_field(&mut self, dialect: &Dialect, store: &mut Store) {
        if dialect.trim && !self.field_quoted {
            let trimmed = trim_ascii_whitespace(&self.field_buf);
            store.push_field(trimmed);
        } else if self.field_buf.is_empty() {
            store.push_empty_field();
        } else {
            store.push_field(&self.field_buf);
        }
        self.field_buf.clear();
        self.field_quoted = false;
        self.row_field_count += 1;
        self.row_empty = false;
    }

    fn finish_row(&mut self, dialect: &Dialect, store: &mut Store) {
        if dialect.in_window(self.row_index) {
            store.finish_row();
        } else {
            store.discard_pending_row();
        }
        self.row_index += 1;
        self.row_field_count = 0;
        self.row_byte_count = 0;
        self.row_empty = true;
    }

    fn advance_position(&mut self, class: crate::state_machine::ByteClass) {
        if matches!(class, crate::state_machine::ByteClass::LF) {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    /// Applies one `Action` to the store/field buffer. Returns `Err` on a
    /// fatal or (absent recovery) strict-mode failure.
    pub(crate) fn apply(
        &mut self,
        action: Action,
        dialect: &Dialect,
        store: &mut Store,
    ) -> Result<(), OcsvError> {
        match action {
            Action::Append(b) => self.append(dialect, b)?,
            Action::AppendTwo(b1, b2) => {
                self.append(dialect, b1)?;
                self.append(dialect, b2)?;
            }
            Action::Noop => {}
            Action::EmitField => self.emit_field(dialect, store),
            Action::EmitFieldAndRow => {
                self.emit_field(dialect, store);
                self.finish_row(dialect, store);
            }
            Action::FinishEmptyRow => {
                self.finish_row(dialect, store);
            }
            Action::DropEmptyLine => {
                self.row_index += 1;
            }
            Action::ClearField => {
                self.field_buf.clear();
                self.field_quoted = false;
            }
            Action::Fail(kind) => {
                let message = kind.to_string();
                return Err(self.error(kind, message));
            }
        }
        Ok(())
    }

    /// Drives the pump over a complete input slice including EOF
    /// finalisation. Used directly by `BatchParser`; `StreamParser` drives
    /// the per-byte loop itself so it can stop at a chunk boundary.
    pub(crate) fn run(
        &mut self,
        input: &[u8],
        class_map: &ByteClassMap,
        dialect: &Dialect,
        store: &mut Store,
    ) -> Result<(), OcsvError> {
        for &byte in input {
            self.step_one(byte, class_map, dialect, store)?;
        }
        let action = self.sm.finalize(dialect.relaxed, self.row_empty);
        self.apply(action, dialect, store)
    }

    pub(crate) fn step_one(
        &mut self,
        byte: u8,
        class_map: &ByteClassMap,
        dialect: &Dialect,
        store: &mut Store,
    ) -> Result<(), OcsvError> {
        let class = class_map.get(byte);
        let prev_state = self.sm.state();
        if prev_state == crate::state_machine::State::FieldStart
            && class == crate::state_machine::ByteClass::Quote
        {
            self.field_quoted = true;
        }
        let action = self
            .sm
            .step(byte, class, dialect.relaxed, dialect.skip_empty_lines, self.row_empty, dialect.quote);

        let result = self.apply(action, dialect, store);
        match result {
            Ok(()) => {
                self.advance_position(class);
                Ok(())
            }
            Err(e) if dialect.skip_lines_with_error && is_recoverable(e.kind) => {
                self.advance_position(class);
                self.field_buf.clear();
                self.field_quoted = false;
                store.discard_pending_row();
                self.sm.reset();
                self.row_field_count = 0;
                self.row_byte_count = 0;
                self.row_empty = true;
                self.row_index += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn is_recoverable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnterminatedQuote | ErrorKind::InvalidCharAfterQuote
    )
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| *b != b' ' && *b != b'\t')
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| *b != b' ' && *b != b'\t')
        .map(|p| p + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_as_strings(store: &Store) -> Vec<Vec<String>> {
        store
            .rows()
            .map(|r| {
                r.fields()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect()
            })
            .collect()
    }

    fn parse_ok(input: &[u8], dialect: Dialect) -> Vec<Vec<String>> {
        let mut p = BatchParser::new(dialect).unwrap();
        p.parse(input).unwrap();
        rows_as_strings(p.store())
    }

    #[test]
    fn s1_simple_rows() {
        let rows = parse_ok(b"a,b,c\nd,e,f\n", Dialect::default());
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["d", "e", "f"]]);
    }

    #[test]
    fn s2_doubled_quote_escape() {
        let rows = parse_ok(b"\"He said \"\"Hi\"\"\",1\n", Dialect::default());
        assert_eq!(rows, vec![vec!["He said \"Hi\"", "1"]]);
    }

    #[test]
    fn s3_quoted_newline() {
        let rows = parse_ok(b"a,\"line1\nline2\",b\n", Dialect::default());
        assert_eq!(rows, vec![vec!["a", "line1\nline2", "b"]]);
    }

    #[test]
    fn s4_empty_fields() {
        let rows = parse_ok(b"a,,b\n,c,\n", Dialect::default());
        assert_eq!(
            rows,
            vec![vec!["a", "", "b"], vec!["", "c", ""]]
        );
    }

    #[test]
    fn s5_comment_line() {
        let rows = parse_ok(b"# comment\na,b\n", Dialect::default());
        assert_eq!(rows, vec![vec!["a", "b"]]);
    }

    #[test]
    fn s6_utf8_bytes_preserved() {
        let rows = parse_ok("日本語,中文,한글\n".as_bytes(), Dialect::default());
        assert_eq!(rows, vec![vec!["日本語", "中文", "한글"]]);
    }

    #[test]
    fn s7_unterminated_strict_fails() {
        // The `\n` here is swallowed as literal content of the still-open
        // quoted field (RFC 4180 quoted fields may embed raw newlines), so
        // by EOF the line counter has already advanced past it.
        let mut p = BatchParser::new(Dialect::default()).unwrap();
        let err = p.parse(b"\"unterminated\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedQuote);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn s7_unterminated_relaxed_recovers() {
        let dialect = Dialect {
            relaxed: true,
            ..Dialect::default()
        };
        let rows = parse_ok(b"\"unterminated\n", dialect);
        assert_eq!(rows, vec![vec!["unterminated\n"]]);
    }

    #[test]
    fn relaxed_repair_with_non_default_quote_byte() {
        // Quote is `'`, not `"`. The relaxed invalid-char-after-quote repair
        // must re-append the active quote byte, not a literal `"`: the
        // stray `'c` inside the quoted field becomes a literal `'c` in the
        // field content, then a later `'` closes the field normally.
        let dialect = Dialect {
            quote: b'\'',
            escape: b'\'',
            relaxed: true,
            ..Dialect::default()
        };
        let rows = parse_ok(b"'ab'c',d\n", dialect);
        assert_eq!(rows, vec![vec!["ab'c", "d"]]);
    }

    #[test]
    fn quote_mid_field_is_literal_in_any_mode() {
        // A quote that does not occur at the very start of a field is never
        // special (per invariant 9): "abc\"def,g" is two fields, not a
        // quoted-field transition.
        let rows = parse_ok(b"abc\"def,g\n", Dialect::default());
        assert_eq!(rows, vec![vec!["abc\"def", "g"]]);
    }

    #[test]
    fn leading_comma_is_leading_empty_field() {
        let rows = parse_ok(b",a\n", Dialect::default());
        assert_eq!(rows, vec![vec!["", "a"]]);
    }

    #[test]
    fn trailing_comma_is_trailing_empty_field() {
        let rows = parse_ok(b"a,\n", Dialect::default());
        assert_eq!(rows, vec![vec!["a", ""]]);
    }

    #[test]
    fn comma_only_row_is_two_fields() {
        let rows = parse_ok(b",\n", Dialect::default());
        assert_eq!(rows, vec![vec!["", ""]]);
    }

    #[test]
    fn blank_line_kept_by_default() {
        // A genuinely blank line (no delimiter, no field byte) becomes a
        // zero-field row, not a row with one empty field.
        let rows = parse_ok(b"a\n\nb\n", Dialect::default());
        assert_eq!(
            rows,
            vec![vec!["a".to_string()], vec![], vec!["b".to_string()]]
        );
    }

    #[test]
    fn blank_line_dropped_with_skip_empty_lines() {
        let dialect = Dialect {
            skip_empty_lines: true,
            ..Dialect::default()
        };
        let rows = parse_ok(b"a\n\nb\n", dialect);
        assert_eq!(rows, vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn trim_applies_only_outside_quotes() {
        // The opening quote must be the very first byte of the field to
        // make that field "quoted" — a leading space before it would put
        // the state machine in InField already, where a quote is literal.
        let dialect = Dialect {
            trim: true,
            ..Dialect::default()
        };
        let rows = parse_ok(b" a ,\" b \"\n", dialect);
        assert_eq!(rows, vec![vec!["a", " b "]]);
    }

    #[test]
    fn field_too_large_is_fatal_even_with_skip_lines_with_error() {
        let dialect = Dialect {
            max_field_bytes: 2,
            skip_lines_with_error: true,
            ..Dialect::default()
        };
        let mut p = BatchParser::new(dialect).unwrap();
        let err = p.parse(b"abc,d\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::FieldTooLarge);
    }

    #[test]
    fn skip_lines_with_error_recovers_and_continues() {
        let dialect = Dialect {
            skip_lines_with_error: true,
            ..Dialect::default()
        };
        // `"bad"x` is a closed quote followed directly by a non-delimiter
        // byte: a strict violation (InvalidCharAfterQuote) that is
        // recoverable. Parsing must still reach the clean row that follows.
        let rows = parse_ok(b"\"bad\"x\ngood,2\n", dialect);
        assert_eq!(rows.last(), Some(&vec!["good".to_string(), "2".to_string()]));
    }

    #[test]
    fn window_filters_rows_outside_bounds() {
        let dialect = Dialect {
            from_line: 1,
            to_line: 1,
            ..Dialect::default()
        };
        let rows = parse_ok(b"a\nb\nc\n", dialect);
        assert_eq!(rows, vec![vec!["b"]]);
    }

    #[test]
    fn no_trailing_newline_still_emits_final_row() {
        let rows = parse_ok(b"a,b", Dialect::default());
        assert_eq!(rows, vec![vec!["a", "b"]]);
    }

    #[test]
    fn crlf_is_treated_as_lf_with_ignored_cr() {
        let rows = parse_ok(b"a,b\r\nc,d\r\n", Dialect::default());
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", "d"]]);
    }
}
