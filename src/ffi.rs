//! Stable exported C ABI (§4.10).
//!
//! Every symbol takes/returns raw pointers and sentinel values instead of
//! panicking or faulting on bad input: a null handle is always a no-op
//! (returning the documented null/−1/nonzero sentinel), matching the
//! requirement that "all pointer parameters may be null; symbols must
//! return the null/−1 sentinel instead of faulting". Thread-safety is the
//! caller's responsibility: concurrent calls on *distinct* handles are
//! fine, concurrent calls on the *same* handle are undefined behaviour.

use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use crate::batch::BatchParser;
use crate::dialect::Dialect;
use crate::error::OcsvError;
use crate::json::rows_to_json as export_rows_to_json;
use crate::packed::PackedCodec;

/// Opaque handle returned to C callers. Bundles the parser with the
/// scratch buffers needed to hand out borrowed C strings: `get_field`'s
/// contract ("lifetime = parser lifetime") requires the `CString` to
/// outlive the call, and `get_last_error_message`'s contract ("until the
/// next call on the same handle") requires exactly one slot, replaced
/// each time.
pub struct ParserHandle {
    parser: BatchParser,
    field_scratch: Vec<CString>,
    last_error_message: CString,
}

impl ParserHandle {
    fn new(dialect: Dialect) -> Result<Box<Self>, OcsvError> {
        Ok(Box::new(Self {
            parser: BatchParser::new(dialect)?,
            field_scratch: Vec::new(),
            last_error_message: CString::default(),
        }))
    }
}

/// # Safety
/// `handle` must be either null or a pointer previously returned by
/// `parser_create`/`parser_create_with_dialect` and not yet destroyed.
unsafe fn handle_ref<'a>(handle: *mut ParserHandle) -> Option<&'a mut ParserHandle> {
    handle.as_mut()
}

/// Creates a parser with RFC 4180 defaults. Equivalent to
/// `parser_create_with_dialect` with the default byte values.
#[no_mangle]
pub extern "C" fn parser_create() -> *mut ParserHandle {
    match ParserHandle::new(Dialect::default()) {
        Ok(handle) => Box::into_raw(handle),
        Err(_) => ptr::null_mut(),
    }
}

/// Creates a parser with an explicit dialect. Returns null if the
/// requested dialect is invalid (mismatched delimiter/quote/escape,
/// reserved bytes used as separators, or an inverted line window).
///
/// Boolean fields are passed as `i32` (`0` = false) for C ABI simplicity.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn parser_create_with_dialect(
    delimiter: u8,
    quote: u8,
    escape: u8,
    comment: u8,
    relaxed: i32,
    skip_empty_lines: i32,
    trim: i32,
    max_field_bytes: u32,
    max_row_bytes: u32,
    from_line: i32,
    to_line: i32,
    skip_lines_with_error: i32,
) -> *mut ParserHandle {
    let dialect = Dialect {
        delimiter,
        quote,
        escape,
        comment,
        relaxed: relaxed != 0,
        skip_empty_lines: skip_empty_lines != 0,
        trim: trim != 0,
        max_field_bytes,
        max_row_bytes,
        from_line: from_line as i64,
        to_line: to_line as i64,
        skip_lines_with_error: skip_lines_with_error != 0,
    };
    match ParserHandle::new(dialect) {
        Ok(handle) => Box::into_raw(handle),
        Err(_) => ptr::null_mut(),
    }
}

/// Frees a handle returned by either creation function. A null pointer is
/// a no-op.
///
/// # Safety
/// `handle` must not be used again after this call.
#[no_mangle]
pub unsafe extern "C" fn parser_destroy(handle: *mut ParserHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Parses `len` bytes starting at `data` (may be read-only memory owned
/// by the caller; copied in, not retained past this call). Returns `0` on
/// success, nonzero on failure (see `ocsv_last_error_kind` for the cause).
///
/// # Safety
/// `data` must be valid for reads of `len` bytes, or `len` must be `0`.
#[no_mangle]
pub unsafe extern "C" fn parse_string(handle: *mut ParserHandle, data: *const u8, len: i32) -> i32 {
    let Some(handle) = handle_ref(handle) else {
        return -1;
    };
    if len < 0 || (data.is_null() && len != 0) {
        return -1;
    }
    let slice = if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len as usize)
    };
    match handle.parser.parse(slice) {
        Ok(()) => 0,
        Err(e) => {
            handle.last_error_message = CString::new(e.to_string()).unwrap_or_default();
            1
        }
    }
}

/// Number of rows stored by the last successful `parse_string` call, or
/// `-1` if `handle` is null.
#[no_mangle]
pub extern "C" fn get_row_count(handle: *mut ParserHandle) -> i32 {
    match unsafe { handle_ref(handle) } {
        Some(h) => h.parser.store().row_count() as i32,
        None => -1,
    }
}

/// Field count of `row`, or `-1` if `handle` is null or `row` is out of
/// range.
#[no_mangle]
pub extern "C" fn get_field_count(handle: *mut ParserHandle, row: i32) -> i32 {
    let Some(h) = (unsafe { handle_ref(handle) }) else {
        return -1;
    };
    if row < 0 {
        return -1;
    }
    h.parser
        .store()
        .field_count(row as usize)
        .map(|c| c as i32)
        .unwrap_or(-1)
}

/// Borrowed, null-terminated view of field `(row, col)`; valid for the
/// parser's lifetime (until destroyed or re-parsed). Returns null if the
/// handle is null or the index is out of range.
#[no_mangle]
pub extern "C" fn get_field(handle: *mut ParserHandle, row: i32, col: i32) -> *const c_char {
    let Some(h) = (unsafe { handle_ref(handle) }) else {
        return ptr::null();
    };
    if row < 0 || col < 0 {
        return ptr::null();
    }
    let Some(bytes) = h.parser.store().field(row as usize, col as usize) else {
        return ptr::null();
    };
    // A field may contain an embedded NUL; truncate there like any C
    // string would, rather than failing the whole call.
    let truncated = match bytes.iter().position(|&b| b == 0) {
        Some(at) => &bytes[..at],
        None => bytes,
    };
    let cstring = CString::new(truncated).unwrap_or_default();
    let ptr = cstring.as_ptr();
    h.field_scratch.push(cstring);
    ptr
}

/// Owned JSON export (row-major array of arrays of strings, §6); free via
/// `free_json_string`.
#[no_mangle]
pub extern "C" fn rows_to_json(handle: *mut ParserHandle) -> *mut c_char {
    let Some(h) = (unsafe { handle_ref(handle) }) else {
        return ptr::null_mut();
    };
    let json = export_rows_to_json(h.parser.store());
    CString::new(json)
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// Frees a string returned by `rows_to_json`. A null pointer is a no-op.
///
/// # Safety
/// `s` must have been returned by `rows_to_json` and not freed already.
#[no_mangle]
pub unsafe extern "C" fn free_json_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Owned packed-binary export (§4.9); writes the buffer length into
/// `*out_size` and returns the buffer, or null (with `*out_size`
/// untouched) on a null handle or null `out_size`.
///
/// # Safety
/// `out_size` must be valid for a single `i32` write.
#[no_mangle]
pub unsafe extern "C" fn rows_to_packed_buffer(handle: *mut ParserHandle, out_size: *mut i32) -> *mut u8 {
    if out_size.is_null() {
        return ptr::null_mut();
    }
    let Some(h) = handle_ref(handle) else {
        return ptr::null_mut();
    };
    let mut buf = PackedCodec::encode(h.parser.store()).into_boxed_slice();
    *out_size = buf.len() as i32;
    let ptr = buf.as_mut_ptr();
    std::mem::forget(buf);
    ptr
}

/// Frees a buffer returned by `rows_to_packed_buffer`. A null pointer is
/// a no-op.
///
/// # Safety
/// `(buf, size)` must exactly match a prior `rows_to_packed_buffer` call
/// not yet freed.
#[no_mangle]
pub unsafe extern "C" fn free_packed_buffer(buf: *mut u8, size: i32) {
    if !buf.is_null() && size >= 0 {
        let slice_ptr = ptr::slice_from_raw_parts_mut(buf, size as usize);
        drop(Box::from_raw(slice_ptr));
    }
}

/// Human-readable message for the last failed `parse_string` call, or an
/// empty string if the last parse succeeded (or none has run yet).
/// Borrowed; valid until the next call on this handle.
#[no_mangle]
pub extern "C" fn get_last_error_message(handle: *mut ParserHandle) -> *const c_char {
    let Some(h) = (unsafe { handle_ref(handle) }) else {
        return ptr::null();
    };
    if h.parser.store().is_ok() {
        h.last_error_message = CString::default();
    }
    h.last_error_message.as_ptr()
}

/// Numeric `ErrorKind` discriminant of the last status, or `-1` if the
/// status is `Ok` or the handle is null.
#[no_mangle]
pub extern "C" fn ocsv_last_error_kind(handle: *mut ParserHandle) -> i32 {
    let Some(h) = (unsafe { handle_ref(handle) }) else {
        return -1;
    };
    match h.parser.store().status() {
        crate::store::Status::Ok => -1,
        crate::store::Status::Failed(e) => e.kind as i32,
    }
}
