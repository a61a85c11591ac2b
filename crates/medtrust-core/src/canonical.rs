//! Canonical CBOR encoding for deterministic hashing.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The canonical encoding is what makes audit events content-addressable:
//! the same event produces identical bytes (and thus an identical
//! [`EventId`](crate::EventId)) on every platform, and a details map hashes
//! to the same commitment no matter which process built it.

use ciborium::value::Value;

use crate::error::CoreError;
use crate::event::{AuditAction, AuditEvent, AuditResult};

/// Event field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const ACTOR_ID: u64 = 1;
    pub const ACTION: u64 = 2;
    pub const RESOURCE_ID: u64 = 3;
    pub const RESULT: u64 = 4;
    pub const TIMESTAMP: u64 = 5;
    pub const DETAILS_HASH: u64 = 6;
}

/// Event schema version committed into the canonical bytes.
pub const EVENT_VERSION: u8 = 0;

/// Encode an audit event to canonical CBOR bytes.
///
/// The event id is blake3 over exactly these bytes.
pub fn canonical_event_bytes(event: &AuditEvent) -> Vec<u8> {
    let entries = vec![
        (
            Value::Integer(keys::VERSION.into()),
            Value::Integer(EVENT_VERSION.into()),
        ),
        (
            Value::Integer(keys::ACTOR_ID.into()),
            Value::Text(event.actor_id.as_str().to_string()),
        ),
        (
            Value::Integer(keys::ACTION.into()),
            Value::Integer(event.action.to_u16().into()),
        ),
        (
            Value::Integer(keys::RESOURCE_ID.into()),
            Value::Text(event.resource_id.clone()),
        ),
        (
            Value::Integer(keys::RESULT.into()),
            Value::Integer(event.result.to_u8().into()),
        ),
        (
            Value::Integer(keys::TIMESTAMP.into()),
            Value::Integer(event.timestamp.into()),
        ),
        (
            Value::Integer(keys::DETAILS_HASH.into()),
            Value::Bytes(event.details_hash.as_bytes().to_vec()),
        ),
    ];

    encode_cbor_value_canonical(&Value::Map(entries))
}

/// Encode a free-form details map to canonical CBOR bytes.
///
/// Details never enter the event row in the clear; only the hash of these
/// bytes is stored.
pub fn canonical_details_bytes(details: &serde_json::Value) -> Result<Vec<u8>, CoreError> {
    let value = json_to_cbor(details)?;
    Ok(encode_cbor_value_canonical(&value))
}

/// Convert a JSON value into a CBOR value suitable for canonical encoding.
///
/// Floats are rejected; timestamps and counters belong in integers.
fn json_to_cbor(json: &serde_json::Value) -> Result<Value, CoreError> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i.into()))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::Integer(u.into()))
            } else {
                Err(CoreError::EncodingError(
                    "floats are not canonicalizable".into(),
                ))
            }
        }
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        serde_json::Value::Array(items) => {
            let converted: Result<Vec<Value>, CoreError> = items.iter().map(json_to_cbor).collect();
            Ok(Value::Array(converted?))
        }
        serde_json::Value::Object(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (k, v) in map {
                entries.push((Value::Text(k.clone()), json_to_cbor(v)?));
            }
            Ok(Value::Map(entries))
        }
    }
}

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => panic!("floats not supported in canonical encoding"),
        _ => panic!("unsupported CBOR value type"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    // Sort by encoded key bytes (lexicographic)
    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Convenience: event fields as stable discriminants.
impl AuditAction {
    /// Convert to u16 for canonical encoding.
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

impl AuditResult {
    /// Convert to u8 for canonical encoding.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}
