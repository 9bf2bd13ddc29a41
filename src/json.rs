//! Row-major JSON export of a [`Store`] (§6).
//!
//! A JSON array of arrays of strings. Field bytes are decoded as UTF-8
//! (lossy: this crate stores raw bytes and never rejects non-UTF-8
//! content, so export cannot either); `serde_json` takes care of the
//! `"`, `\`, and control-character escaping this format requires.

use serde_json::Value;

use crate::store::Store;

pub fn rows_to_json(store: &Store) -> String {
    let rows: Vec<Value> = store
        .rows()
        .map(|row| {
            Value::Array(
                row.fields()
                    .map(|f| Value::String(String::from_utf8_lossy(f).into_owned()))
                    .collect(),
            )
        })
        .collect();
    serde_json::to_string(&Value::Array(rows)).expect("Vec<Value> of strings always serialises")
}
