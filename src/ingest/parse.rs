// src/ingest/parse.rs
//! Pull a typed row array out of whatever the agent printed.
//!
//! Agent output is prose with JSON somewhere in it: bare, fenced, nested
//! under a wrapper object, double-encoded inside a string, or spread over
//! several NUL-separated tool-result blocks. We locate the first array whose
//! first object carries a key of the target schema, then validate every row.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::FetchError;

/// Nesting depth after which the search gives up.
const MAX_DEPTH: usize = 12;

/// Keys that usually hold the payload, searched before any other key.
const WRAPPER_KEYS: [&str; 7] = ["result", "rows", "data", "items", "records", "output", "content"];

/// A row type the parser can extract.
pub trait RowSchema: DeserializeOwned {
    /// Required fields; each entry lists the accepted spellings of one field.
    /// A row missing all spellings (or holding `null`) is partial data.
    const REQUIRED: &'static [&'static [&'static str]];

    /// Whether `obj` looks like a row of this schema at all.
    fn is_row(obj: &serde_json::Map<String, Value>) -> bool {
        Self::REQUIRED
            .iter()
            .flat_map(|alts| alts.iter())
            .any(|k| obj.contains_key(*k))
    }
}

/// Extract and validate rows of `T` from raw agent output.
///
/// An empty array is returned as `Ok(vec![])` when it is the whole of a
/// block or sits directly under a wrapper key; deciding what an empty result
/// means is left to the caller. Empty brackets embedded in prose are skipped.
pub fn parse_rows<T: RowSchema>(raw: &str) -> Result<Vec<T>, FetchError> {
    let rows = locate_rows::<T>(raw).ok_or_else(|| {
        FetchError::Malformed(format!(
            "no JSON array with the expected fields in {} bytes of output",
            raw.len()
        ))
    })?;
    rows.into_iter()
        .enumerate()
        .map(|(i, v)| decode_row::<T>(i, v))
        .collect()
}

fn locate_rows<T: RowSchema>(raw: &str) -> Option<Vec<Value>> {
    raw.split('\0')
        .map(str::trim)
        .filter(|seg| !seg.is_empty())
        .find_map(|seg| locate_in_segment::<T>(seg))
}

fn locate_in_segment<T: RowSchema>(seg: &str) -> Option<Vec<Value>> {
    if let Ok(v) = serde_json::from_str::<Value>(seg) {
        if let Some(found) = search_top::<T>(&v) {
            return Some(found);
        }
    }

    // Prose around the JSON: try each bracket as a value start. A bare `[]`
    // here is prose (`- [ ] item`, `filters: []`), not an answer.
    let mut pos = 0usize;
    while let Some(off) = seg[pos..].find(['[', '{']) {
        let start = pos + off;
        let mut stream = serde_json::Deserializer::from_str(&seg[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(v)) => {
                if let Some(found) = search::<T>(&v, 0) {
                    return Some(found);
                }
                pos = start + stream.byte_offset().max(1);
            }
            _ => pos = start + 1,
        }
    }
    None
}

fn search_top<T: RowSchema>(v: &Value) -> Option<Vec<Value>> {
    match v {
        Value::Array(items) if items.is_empty() => Some(Vec::new()),
        _ => search::<T>(v, 0),
    }
}

fn search<T: RowSchema>(v: &Value, depth: usize) -> Option<Vec<Value>> {
    if depth > MAX_DEPTH {
        return None;
    }
    match v {
        Value::Array(items) => {
            if let Some(Value::Object(first)) = items.first() {
                if T::is_row(first) {
                    return Some(items.clone());
                }
            }
            items.iter().find_map(|item| search::<T>(item, depth + 1))
        }
        Value::Object(map) => {
            for key in WRAPPER_KEYS {
                match map.get(key) {
                    Some(Value::Array(a)) if a.is_empty() => return Some(Vec::new()),
                    Some(inner) => {
                        if let Some(found) = search::<T>(inner, depth + 1) {
                            return Some(found);
                        }
                    }
                    None => {}
                }
            }
            map.iter()
                .filter(|(k, _)| !WRAPPER_KEYS.contains(&k.as_str()))
                .find_map(|(_, inner)| search::<T>(inner, depth + 1))
        }
        Value::String(s) => {
            let t = s.trim_start();
            if t.len() > 4 && t.starts_with(['[', '{']) {
                let inner: Value = serde_json::from_str(t).ok()?;
                match inner {
                    Value::Array(ref a) if a.is_empty() => Some(Vec::new()),
                    _ => search::<T>(&inner, depth + 1),
                }
            } else {
                None
            }
        }
        _ => None,
    }
}

fn decode_row<T: RowSchema>(row: usize, v: Value) -> Result<T, FetchError> {
    let Value::Object(obj) = &v else {
        return Err(FetchError::Malformed(format!("row {row} is not an object")));
    };
    for alts in T::REQUIRED {
        let present = alts
            .iter()
            .any(|k| obj.get(*k).is_some_and(|x| !x.is_null()));
        if !present {
            return Err(FetchError::PartialData {
                row,
                field: alts.first().copied().unwrap_or("?"),
            });
        }
    }
    serde_json::from_value(v).map_err(|e| FetchError::Malformed(format!("row {row}: {e}")))
}

/// Counts arrive as integers, or as floats when the agent did arithmetic.
/// Anything negative, fractional or non-numeric is rejected.
pub fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| D::Error::custom(format!("expected a non-negative integer, got {n}"))),
        other => Err(D::Error::custom(format!(
            "expected a non-negative integer, got {other}"
        ))),
    }
}
