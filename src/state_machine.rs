//! The core RFC 4180 automaton (§4.3 of the specification).
//!
//! Byte classification is done through a 256-entry lookup table keyed on the
//! active [`Dialect`](crate::dialect::Dialect), the same trick
//! `ByteClassMap`/`DfaTable` in this lineage's optimized parser use to avoid
//! multi-branch comparisons in the hot loop. Unlike that table, transition
//! *actions* here also depend on `relaxed` and on whether the current row is
//! still empty, so the state/class table narrows the dispatch but the final
//! action is resolved by a small match rather than a second flat array.

use crate::error::{ErrorKind, OcsvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    FieldStart = 0,
    InField = 1,
    InQuotedField = 2,
    QuoteInQuote = 3,
    LineComment = 4,
}

/// Byte equivalence classes. Reduces the effective alphabet from 256 bytes
/// to 6 classes for the purpose of transition dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ByteClass {
    Normal = 0,
    Delimiter = 1,
    Quote = 2,
    LF = 3,
    CR = 4,
    Comment = 5,
}

/// 256-entry byte → class lookup table, rebuilt whenever the dialect changes.
pub struct ByteClassMap {
    classes: [ByteClass; 256],
}

impl ByteClassMap {
    pub fn new(delimiter: u8, quote: u8, comment: u8) -> Self {
        let mut classes = [ByteClass::Normal; 256];
        classes[b'\n' as usize] = ByteClass::LF;
        classes[b'\r' as usize] = ByteClass::CR;
        // Order matters only in pathological dialects where validation would
        // already have rejected overlap; assign delimiter/quote last so they
        // win over a `comment` that Dialect::validate would otherwise forbid.
        if comment != 0 {
            classes[comment as usize] = ByteClass::Comment;
        }
        classes[delimiter as usize] = ByteClass::Delimiter;
        classes[quote as usize] = ByteClass::Quote;
        ByteClassMap { classes }
    }

    #[inline(always)]
    pub fn get(&self, byte: u8) -> ByteClass {
        self.classes[byte as usize]
    }
}

/// What the caller (Scanner driver) should do in response to one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Append `byte` to the current field buffer.
    Append(u8),
    /// Append two bytes (used for the relaxed quote-after-quote repair:
    /// the stray quote byte plus the byte that follows it).
    AppendTwo(u8, u8),
    /// Ignore the byte entirely (bare `\r`, delimiter/quote state-only
    /// transitions).
    Noop,
    /// Finish the current field (it may be empty) without finishing the row.
    EmitField,
    /// Finish the current field, then finish the row. Used both when a
    /// field's bytes are pending and when the field is implicitly empty
    /// (e.g. a trailing `,` immediately followed by `\n`).
    EmitFieldAndRow,
    /// A `\n` on a row that has seen no delimiter or field byte yet
    /// (a genuinely blank line): finish a zero-field row without
    /// `skip_empty_lines`.
    FinishEmptyRow,
    /// A `\n` on a still-blank row when `skip_empty_lines` is set: drop
    /// silently, no row emitted.
    DropEmptyLine,
    /// Clear the field buffer without emitting (comment line continuation).
    ClearField,
    /// Strict-mode violation.
    Fail(ErrorKind),
}

/// The automaton itself. Holds only the current state; `row_empty` and the
/// byte-class table live alongside it in the driver (Scanner/BatchParser/
/// StreamParser) since they are per-parse, not per-automaton-instance,
/// concerns shared with window filtering and position tracking.
#[derive(Debug, Clone, Copy)]
pub struct StateMachine {
    state: State,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: State::FieldStart,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = State::FieldStart;
    }

    /// Advances the automaton by one byte. `row_empty` is true when the
    /// current row has seen no delimiter and no field byte yet (i.e. this
    /// is the very first byte of the row); it disambiguates `FieldStart` +
    /// `\n` and gates comment-line entry. `skip_empty_lines` only affects
    /// that same genuinely-blank-row case. `quote` is the active dialect's
    /// quote byte, needed to reconstruct the stray quote the relaxed
    /// `QuoteInQuote` repair re-appends (§4.3: "append quote byte then
    /// byte").
    pub fn step(
        &mut self,
        byte: u8,
        class: ByteClass,
        dialect_relaxed: bool,
        skip_empty_lines: bool,
        row_empty: bool,
        quote: u8,
    ) -> Action {
        use Action::*;
        use State::*;

        let (next, action) = match (self.state, class) {
            (FieldStart, ByteClass::Quote) => (InQuotedField, Noop),
            (FieldStart, ByteClass::Delimiter) => (FieldStart, EmitField),
            (FieldStart, ByteClass::LF) => {
                if row_empty {
                    if skip_empty_lines {
                        (FieldStart, DropEmptyLine)
                    } else {
                        (FieldStart, FinishEmptyRow)
                    }
                } else {
                    (FieldStart, EmitFieldAndRow)
                }
            }
            (FieldStart, ByteClass::CR) => (FieldStart, Noop),
            (FieldStart, ByteClass::Comment) if row_empty => (LineComment, Noop),
            (FieldStart, _) => (InField, Append(byte)),

            (InField, ByteClass::Delimiter) => (FieldStart, EmitField),
            (InField, ByteClass::LF) => (FieldStart, EmitFieldAndRow),
            (InField, ByteClass::CR) => (InField, Noop),
            (InField, _) => (InField, Append(byte)),

            (InQuotedField, ByteClass::Quote) => (QuoteInQuote, Noop),
            (InQuotedField, _) => (InQuotedField, Append(byte)),

            (QuoteInQuote, ByteClass::Quote) => (InQuotedField, Append(byte)),
            (QuoteInQuote, ByteClass::Delimiter) => (FieldStart, EmitField),
            (QuoteInQuote, ByteClass::LF) => (FieldStart, EmitFieldAndRow),
            (QuoteInQuote, ByteClass::CR) => (QuoteInQuote, Noop),
            (QuoteInQuote, _) => {
                if dialect_relaxed {
                    (InQuotedField, AppendTwo(quote, byte))
                } else {
                    (QuoteInQuote, Fail(ErrorKind::InvalidCharAfterQuote))
                }
            }

            (LineComment, ByteClass::LF) => (FieldStart, ClearField),
            (LineComment, _) => (LineComment, Noop),
        };

        self.state = next;
        action
    }

    /// EOF finalisation per §4.3.
    pub fn finalize(&self, relaxed: bool, row_empty: bool) -> Action {
        use Action::*;
        match self.state {
            State::InField | State::QuoteInQuote => EmitFieldAndRow,
            State::InQuotedField => {
                if relaxed {
                    EmitFieldAndRow
                } else {
                    Fail(ErrorKind::UnterminatedQuote)
                }
            }
            State::FieldStart => {
                if row_empty {
                    Noop
                } else {
                    EmitFieldAndRow
                }
            }
            State::LineComment => Noop,
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(map: &ByteClassMap, b: u8) -> ByteClass {
        map.get(b)
    }

    #[test]
    fn simple_fields_and_row() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        let input = b"a,b\n";
        let mut row_empty = true;
        let mut actions = Vec::new();
        for &b in input {
            let class = classify(&map, b);
            let a = sm.step(b, class, false, false, row_empty, b'"');
            if matches!(a, Action::Append(_) | Action::EmitField | Action::EmitFieldAndRow) {
                row_empty = false;
            }
            actions.push(a);
        }
        assert_eq!(
            actions,
            vec![
                Action::Append(b'a'),
                Action::EmitField,
                Action::Append(b'b'),
                Action::EmitFieldAndRow,
            ]
        );
    }

    #[test]
    fn trailing_comma_before_newline_emits_empty_field() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        let a1 = sm.step(b'a', classify(&map, b'a'), false, false, true, b'"');
        assert_eq!(a1, Action::Append(b'a'));
        let a2 = sm.step(b',', classify(&map, b','), false, false, false, b'"');
        assert_eq!(a2, Action::EmitField);
        // row_empty is now false: a field has already been emitted.
        let a3 = sm.step(b'\n', classify(&map, b'\n'), false, false, false, b'"');
        assert_eq!(a3, Action::EmitFieldAndRow);
    }

    #[test]
    fn blank_line_without_skip_empty_lines_finishes_zero_field_row() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        let a = sm.step(b'\n', classify(&map, b'\n'), false, false, true, b'"');
        assert_eq!(a, Action::FinishEmptyRow);
    }

    #[test]
    fn blank_line_with_skip_empty_lines_is_dropped() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        let a = sm.step(b'\n', classify(&map, b'\n'), false, true, true, b'"');
        assert_eq!(a, Action::DropEmptyLine);
    }

    #[test]
    fn quote_in_quote_append_single_quote() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        sm.step(b'"', classify(&map, b'"'), false, false, true, b'"'); // -> InQuotedField
        sm.step(b'a', classify(&map, b'a'), false, false, false, b'"');
        let act = sm.step(b'"', classify(&map, b'"'), false, false, false, b'"'); // -> QuoteInQuote
        assert_eq!(act, Action::Noop);
        let act = sm.step(b'"', classify(&map, b'"'), false, false, false, b'"'); // escaped quote
        assert_eq!(act, Action::Append(b'"'));
        assert_eq!(sm.state(), State::InQuotedField);
    }

    #[test]
    fn strict_invalid_char_after_quote() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        sm.step(b'"', classify(&map, b'"'), false, false, true, b'"');
        sm.step(b'a', classify(&map, b'a'), false, false, false, b'"');
        sm.step(b'"', classify(&map, b'"'), false, false, false, b'"'); // -> QuoteInQuote
        let act = sm.step(b'x', classify(&map, b'x'), false, false, false, b'"');
        assert_eq!(act, Action::Fail(ErrorKind::InvalidCharAfterQuote));
    }

    #[test]
    fn relaxed_invalid_char_after_quote_recovers() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        sm.step(b'"', classify(&map, b'"'), true, false, true, b'"');
        sm.step(b'a', classify(&map, b'a'), true, false, false, b'"');
        sm.step(b'"', classify(&map, b'"'), true, false, false, b'"'); // -> QuoteInQuote
        let act = sm.step(b'x', classify(&map, b'x'), true, false, false, b'"');
        assert_eq!(act, Action::AppendTwo(b'"', b'x'));
        assert_eq!(sm.state(), State::InQuotedField);
    }

    #[test]
    fn comment_line_is_dropped() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        let act = sm.step(b'#', classify(&map, b'#'), false, false, true, b'"');
        assert_eq!(act, Action::Noop);
        assert_eq!(sm.state(), State::LineComment);
        sm.step(b'x', classify(&map, b'x'), false, false, true, b'"');
        let act = sm.step(b'\n', classify(&map, b'\n'), false, false, true, b'"');
        assert_eq!(act, Action::ClearField);
        assert_eq!(sm.state(), State::FieldStart);
    }

    #[test]
    fn eof_finalize_unterminated_quote_strict() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        sm.step(b'"', classify(&map, b'"'), false, false, true, b'"');
        sm.step(b'a', classify(&map, b'a'), false, false, false, b'"');
        assert_eq!(
            sm.finalize(false, false),
            Action::Fail(ErrorKind::UnterminatedQuote)
        );
    }

    #[test]
    fn eof_finalize_unterminated_quote_relaxed() {
        let map = ByteClassMap::new(b',', b'"', b'#');
        let mut sm = StateMachine::new();
        sm.step(b'"', classify(&map, b'"'), true, false, true, b'"');
        sm.step(b'a', classify(&map, b'a'), true, false, false, b'"');
        assert_eq!(sm.finalize(true, false), Action::EmitFieldAndRow);
    }

    #[test]
    fn eof_on_empty_field_start_emits_nothing() {
        let sm = StateMachine::new();
        assert_eq!(sm.finalize(false, true), Action::Noop);
    }

    #[test]
    fn relaxed_repair_reuses_the_dialect_quote_byte_not_double_quote() {
        // Quote byte is `'`, not `"`; the relaxed QuoteInQuote repair must
        // re-append `'`, never a literal 0x22.
        let map = ByteClassMap::new(b',', b'\'', b'#');
        let mut sm = StateMachine::new();
        sm.step(b'\'', classify(&map, b'\''), true, false, true, b'\'');
        sm.step(b'a', classify(&map, b'a'), true, false, false, b'\'');
        sm.step(b'\'', classify(&map, b'\''), true, false, false, b'\''); // -> QuoteInQuote
        let act = sm.step(b'x', classify(&map, b'x'), true, false, false, b'\'');
        assert_eq!(act, Action::AppendTwo(b'\'', b'x'));
    }
}
