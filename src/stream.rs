//! Chunk-boundary-safe incremental parser with callbacks (§4.6).
//!
//! `StreamParser` reuses the same [`Cursor`](crate::batch::Cursor) the
//! batch path drives, so the two entry points share byte-pump semantics
//! exactly; the only streaming-specific piece is the UTF-8 carry buffer at
//! chunk boundaries. Per the critical invariant called out in the
//! specification: only an incomplete trailing UTF-8 sequence is carried
//! between `feed` calls. A complete ASCII tail is never re-stored, because
//! the `StateMachine`'s own state (and the partial field buffer inside
//! `Cursor`) already captures "we are mid-field" — carrying raw bytes on
//! top of that would feed them to the automaton twice.

use crate::batch::Cursor;
use crate::dialect::Dialect;
use crate::error::OcsvError;
use crate::scanner::Scanner;
use crate::state_machine::ByteClassMap;
use crate::store::Store;

/// `row_fields[i]` borrows into a scratch `Store` cleared immediately after
/// the callback returns; callbacks must not retain the slices.
pub type RowCallback<'a> = dyn FnMut(&[&[u8]], u64) -> bool + 'a;
pub type ErrCallback<'a> = dyn FnMut(&OcsvError, u64) -> bool + 'a;

pub struct StreamParser {
    dialect: Dialect,
    class_map: ByteClassMap,
    cursor: Cursor,
    /// Scratch store holding at most the one row currently being reported
    /// to `row_cb`; cleared right after the callback returns.
    store: Store,
    /// Up to 3 bytes of an incomplete UTF-8 sequence left over from the
    /// previous `feed` call's tail.
    carry: Vec<u8>,
    stopped: bool,
}

impl StreamParser {
    pub fn new(dialect: Dialect) -> Result<Self, OcsvError> {
        dialect.validate()?;
        let class_map = ByteClassMap::new(dialect.delimiter, dialect.quote, dialect.comment);
        tracing::debug!(?dialect, "stream parser constructed");
        Ok(Self {
            dialect,
            class_map,
            cursor: Cursor::new(&dialect),
            store: Store::new(),
            carry: Vec::new(),
            stopped: false,
        })
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Feeds one chunk of input. Returns `false` once either callback has
    /// asked to stop (in which case the parser is done: no further `feed`
    /// or `finish` calls will do anything) or `true` to keep going.
    #[tracing::instrument(level = "debug", skip_all, fields(bytes = chunk.len()))]
    pub fn feed(
        &mut self,
        chunk: &[u8],
        row_cb: &mut RowCallback<'_>,
        err_cb: &mut ErrCallback<'_>,
    ) -> bool {
        if self.stopped {
            return false;
        }

        let combined;
        let data: &[u8] = if self.carry.is_empty() {
            chunk
        } else {
            combined = [self.carry.as_slice(), chunk].concat();
            &combined
        };

        let boundary = Scanner::utf8_boundary(data);
        let cont = self.pump(&data[..boundary], row_cb, err_cb);
        self.carry = if cont {
            data[boundary..].to_vec()
        } else {
            Vec::new()
        };
        cont
    }

    /// EOF finalisation: flushes any carried bytes (now known to be the
    /// end of input rather than an incomplete sequence) and runs the
    /// state machine's `finalize` step. After this call the parser is
    /// always `stopped`.
    pub fn finish(&mut self, row_cb: &mut RowCallback<'_>, err_cb: &mut ErrCallback<'_>) -> bool {
        if self.stopped {
            return false;
        }
        let carry = std::mem::take(&mut self.carry);
        if !self.pump(&carry, row_cb, err_cb) {
            return false;
        }

        let row_idx_before = self.cursor.row_index;
        let action = self.cursor.sm.finalize(self.dialect.relaxed, self.cursor.row_empty);
        let cont = match self.cursor.apply(action, &self.dialect, &mut self.store) {
            Ok(()) => self.emit_pending_row(row_idx_before, row_cb),
            Err(e) => {
                let want_continue = err_cb(&e, row_idx_before);
                let _ = want_continue;
                false
            }
        };
        self.stopped = true;
        cont
    }

    fn pump(&mut self, bytes: &[u8], row_cb: &mut RowCallback<'_>, err_cb: &mut ErrCallback<'_>) -> bool {
        for &byte in bytes {
            let row_idx_before = self.cursor.row_index;
            match self
                .cursor
                .step_one(byte, &self.class_map, &self.dialect, &mut self.store)
            {
                Ok(()) => {
                    if !self.emit_pending_row(row_idx_before, row_cb) {
                        self.stopped = true;
                        return false;
                    }
                }
                Err(e) => {
                    err_cb(&e, row_idx_before);
                    self.stopped = true;
                    return false;
                }
            }
        }
        true
    }

    /// If a row landed in the scratch store (and wasn't filtered out by
    /// `from_line`/`to_line`), reports it and clears the store so it never
    /// holds more than one row at a time.
    fn emit_pending_row(&mut self, row_idx: u64, row_cb: &mut RowCallback<'_>) -> bool {
        if self.store.row_count() == 0 {
            return true;
        }
        let cont = {
            let row = self.store.row(0).expect("just checked row_count");
            let fields: Vec<&[u8]> = row.fields().collect();
            row_cb(&fields, row_idx)
        };
        self.store.clear();
        cont
    }
}
