//! Owned storage of rows and fields for one parse (§4.4).
//!
//! Field bytes live in one contiguous growing byte buffer; each field is an
//! offset range into it, and each row is a run of field indices. Borrowing a
//! field is just slicing the buffer — no per-field heap string, which is
//! what this codebase's `RecordBuffer` already does for the same reason
//! (cache-friendly storage, and here, zero-copy FFI borrows). The buffer
//! only grows during an active parse; once a parse finishes (`status` is
//! set) no mutation happens until the next `clear`, so offsets handed out
//! to [`LazyView`](crate::lazy::LazyView) or across the C ABI stay valid for
//! the Store's lifetime, satisfying the "pinned storage" requirement
//! without needing a bump allocator.

use crate::error::OcsvError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed(OcsvError),
}

#[derive(Debug, Clone, Copy)]
struct FieldRange {
    start: u32,
    end: u32,
}

#[derive(Debug, Default, Clone)]
pub struct Store {
    buffer: Vec<u8>,
    fields: Vec<FieldRange>,
    /// Index into `fields` where each row's field run starts.
    row_field_start: Vec<u32>,
    row_field_count: Vec<u32>,
    pub source_byte_count: u64,
    status: Status,
    /// Fields pushed for the row currently being built, not yet finished.
    pending_row_fields: u32,
}

impl Default for Status {
    fn default() -> Self {
        Status::Ok
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.fields.clear();
        self.row_field_start.clear();
        self.row_field_count.clear();
        self.source_byte_count = 0;
        self.status = Status::Ok;
        self.pending_row_fields = 0;
    }

    #[inline]
    pub fn push_empty_field(&mut self) {
        let at = self.buffer.len() as u32;
        self.fields.push(FieldRange { start: at, end: at });
        self.pending_row_fields += 1;
    }

    #[inline]
    pub fn push_field(&mut self, bytes: &[u8]) {
        let start = self.buffer.len() as u32;
        self.buffer.extend_from_slice(bytes);
        let end = self.buffer.len() as u32;
        self.fields.push(FieldRange { start, end });
        self.pending_row_fields += 1;
    }

    #[inline]
    pub fn finish_row(&mut self) {
        let start = self.fields.len() as u32 - self.pending_row_fields;
        self.row_field_start.push(start);
        self.row_field_count.push(self.pending_row_fields);
        self.pending_row_fields = 0;
    }

    /// Drops an in-progress row's already-pushed fields without recording a
    /// row. Used by `skip_lines_with_error` recovery.
    pub fn discard_pending_row(&mut self) {
        let drop_from = self.fields.len() - self.pending_row_fields as usize;
        let reclaim = self
            .fields
            .get(drop_from)
            .map(|f| self.buffer.len() as u32 - f.start)
            .unwrap_or(0);
        self.buffer.truncate(self.buffer.len() - reclaim as usize);
        self.fields.truncate(drop_from);
        self.pending_row_fields = 0;
    }

    pub fn row_count(&self) -> usize {
        self.row_field_start.len()
    }

    pub fn field_count(&self, row: usize) -> Option<usize> {
        self.row_field_count.get(row).map(|&c| c as usize)
    }

    pub fn field(&self, row: usize, col: usize) -> Option<&[u8]> {
        let count = *self.row_field_count.get(row)? as usize;
        if col >= count {
            return None;
        }
        let start = *self.row_field_start.get(row)? as usize;
        let range = self.fields.get(start + col)?;
        Some(&self.buffer[range.start as usize..range.end as usize])
    }

    pub fn row(&self, row: usize) -> Option<RowView<'_>> {
        if row >= self.row_count() {
            return None;
        }
        Some(RowView { store: self, row })
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        (0..self.row_count()).map(move |r| RowView { store: self, row: r })
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn set_failed(&mut self, err: OcsvError) {
        self.status = Status::Failed(err);
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, Status::Ok)
    }

    /// Appends another store's rows in order, deep-copying field bytes into
    /// this store's arena. Used by `ParallelDriver` to merge per-worker
    /// stores in range-index order.
    pub fn append_from(&mut self, other: &Store) {
        for row in other.rows() {
            for field in row.fields() {
                self.push_field(field);
            }
            self.finish_row();
        }
        self.source_byte_count += other.source_byte_count;
    }
}

#[derive(Clone, Copy)]
pub struct RowView<'a> {
    store: &'a Store,
    row: usize,
}

impl<'a> RowView<'a> {
    pub fn len(&self) -> usize {
        self.store.field_count(self.row).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field(&self, col: usize) -> Option<&'a [u8]> {
        self.store.field(self.row, col)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        let store = self.store;
        let row = self.row;
        (0..self.len()).map(move |c| store.field(row, c).unwrap())
    }
}
