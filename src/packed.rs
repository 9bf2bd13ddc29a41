//! Bulk binary export/import of a [`Store`] (§4.9).
//!
//! Layout (little-endian, tightly packed):
//!
//! ```text
//! magic:        u32 = 0x4F435356   // "OCSV"
//! version:      u32 = 1
//! row_count:    u32
//! field_count:  u32                 // maximum row arity; rectangular view
//! total_bytes:  u64                 // size of the whole buffer including header
//! row_offsets:  u32 × row_count     // byte offset from buffer start to each row
//! row_data:     row_count × [ field_count × (len:u16, data:byte × len) ]
//! ```
//!
//! Short rows are zero-padded with empty fields up to `field_count`, so
//! the decode side always knows exactly how many fields to read per row.

use crate::error::{ErrorKind, OcsvError};
use crate::store::Store;

const MAGIC: u32 = 0x4F43_5356;
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 8;

pub struct PackedCodec;

impl PackedCodec {
    pub fn encode(store: &Store) -> Vec<u8> {
        let row_count = store.row_count();
        let field_count = (0..row_count)
            .map(|r| store.field_count(r).unwrap_or(0))
            .max()
            .unwrap_or(0);

        let mut row_blobs: Vec<Vec<u8>> = Vec::with_capacity(row_count);
        for r in 0..row_count {
            let mut blob = Vec::new();
            let n_fields = store.field_count(r).unwrap_or(0);
            for c in 0..field_count {
                let field = if c < n_fields {
                    store.field(r, c).unwrap_or(&[])
                } else {
                    &[]
                };
                blob.extend_from_slice(&(field.len() as u16).to_le_bytes());
                blob.extend_from_slice(field);
            }
            row_blobs.push(blob);
        }

        let row_offsets_len = row_count * 4;
        let mut offsets = Vec::with_capacity(row_count);
        let mut cursor = HEADER_LEN + row_offsets_len;
        for blob in &row_blobs {
            offsets.push(cursor as u32);
            cursor += blob.len();
        }
        let total_bytes = cursor as u64;

        let mut out = Vec::with_capacity(cursor);
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(row_count as u32).to_le_bytes());
        out.extend_from_slice(&(field_count as u32).to_le_bytes());
        out.extend_from_slice(&total_bytes.to_le_bytes());
        for off in &offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
        for blob in &row_blobs {
            out.extend_from_slice(blob);
        }
        debug_assert_eq!(out.len() as u64, total_bytes);
        out
    }

    /// Inverse of [`encode`](Self::encode). Part of this crate's ambient
    /// surface: a codec that only encodes can't be tested for round-trip
    /// fidelity.
    pub fn decode(buf: &[u8]) -> Result<Store, OcsvError> {
        if buf.len() < HEADER_LEN {
            return Err(OcsvError::api(
                ErrorKind::OutOfRange,
                "packed buffer shorter than header",
            ));
        }
        let magic = read_u32(buf, 0)?;
        if magic != MAGIC {
            return Err(OcsvError::api(
                ErrorKind::OutOfRange,
                format!("bad packed-buffer magic {magic:#010x}"),
            ));
        }
        let version = read_u32(buf, 4)?;
        if version != VERSION {
            return Err(OcsvError::api(
                ErrorKind::OutOfRange,
                format!("unsupported packed-buffer version {version}"),
            ));
        }
        let row_count = read_u32(buf, 8)? as usize;
        let field_count = read_u32(buf, 12)? as usize;
        let total_bytes = read_u64(buf, 16)? as usize;
        if total_bytes != buf.len() {
            return Err(OcsvError::api(
                ErrorKind::OutOfRange,
                "packed buffer length does not match header total_bytes",
            ));
        }

        let offsets_start = HEADER_LEN;
        let offsets_end = offsets_start + row_count * 4;
        if offsets_end > buf.len() {
            return Err(OcsvError::api(
                ErrorKind::OutOfRange,
                "packed buffer truncated in row-offset table",
            ));
        }

        let mut store = Store::new();
        for r in 0..row_count {
            let row_start = read_u32(buf, offsets_start + r * 4)? as usize;
            let mut pos = row_start;
            for _ in 0..field_count {
                let len = read_u16(buf, pos)? as usize;
                pos += 2;
                let end = pos
                    .checked_add(len)
                    .filter(|&e| e <= buf.len())
                    .ok_or_else(|| {
                        OcsvError::api(ErrorKind::OutOfRange, "packed buffer field overruns buffer")
                    })?;
                store.push_field(&buf[pos..end]);
                pos = end;
            }
            store.finish_row();
        }
        Ok(store)
    }
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32, OcsvError> {
    buf.get(at..at + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| OcsvError::api(ErrorKind::OutOfRange, "packed buffer truncated (u32)"))
}

fn read_u64(buf: &[u8], at: usize) -> Result<u64, OcsvError> {
    buf.get(at..at + 8)
        .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| OcsvError::api(ErrorKind::OutOfRange, "packed buffer truncated (u64)"))
}

fn read_u16(buf: &[u8], at: usize) -> Result<u16, OcsvError> {
    buf.get(at..at + 2)
        .map(|s| u16::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| OcsvError::api(ErrorKind::OutOfRange, "packed buffer truncated (u16)"))
}
