//! Size- and depth-safe JSON encoding.
//!
//! Every persisted document goes through [`BoundedSerializer::safe_stringify`]:
//!
//! 1. **Preprocess**: depth-limited walk that truncates long arrays, wide
//!    objects, and oversized string leaves.
//! 2. **Estimate**: a UTF-16 style size estimate (about two bytes per char
//!    plus per-entry overhead). Over `max_string_length`, the full encode is
//!    skipped and a compact summary of the data is emitted instead.
//! 3. **Encode**: into a writer capped at [`SAFETY_CEILING`] characters.
//!    Hitting the cap is a handled capacity failure.
//!
//! Failures feed a [`CircuitBreaker`]; while it is open, calls return
//! immediately without doing any work.
//!
//! `serde_json::Value` is an owned tree, so reference cycles cannot occur;
//! the depth limit is the only guard against runaway nesting.

use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Write};

use crate::circuit::CircuitBreaker;
use crate::config::SerializerConfig;
use crate::error::{Result, TrailError};
use crate::truncate::truncate_if_needed;

/// Absolute ceiling on encoded output, in bytes.
pub const SAFETY_CEILING: usize = 1 << 28;

pub const MAX_DEPTH_MARKER: &str = "[Max Depth Exceeded]";
pub const TRUNCATED_KEYS_FIELD: &str = "...truncated";

const SAMPLE_ITEM_BUDGET: usize = 64 * 1024;
const SUMMARY_TOP_KEYS: usize = 10;

pub struct BoundedSerializer {
    config: SerializerConfig,
    breaker: CircuitBreaker,
    ceiling: usize,
}

impl BoundedSerializer {
    pub fn new(config: SerializerConfig) -> Self {
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_threshold,
            config.circuit_breaker_timeout(),
        );
        Self {
            config,
            breaker,
            ceiling: SAFETY_CEILING,
        }
    }

    /// Override the output ceiling. Mostly useful for exercising the
    /// capacity path without allocating hundreds of megabytes.
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn is_circuit_open(&mut self) -> bool {
        self.breaker.is_open()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_mut(&mut self) -> &mut CircuitBreaker {
        &mut self.breaker
    }

    pub fn safe_stringify<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<String> {
        if self.breaker.is_open() {
            return Err(TrailError::CircuitOpen {
                operation: "serialize",
            });
        }

        match self.encode(data) {
            Ok(encoded) => {
                self.breaker.record_success();
                Ok(encoded)
            }
            Err(e) => {
                tracing::warn!(error = %e, "bounded serialization failed");
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    /// Like [`safe_stringify`](Self::safe_stringify) but always yields a
    /// string: the standard error payload stands in for any failure.
    pub fn stringify_or_payload<T: Serialize + ?Sized>(&mut self, data: &T) -> String {
        match self.safe_stringify(data) {
            Ok(s) => s,
            Err(TrailError::CircuitOpen { operation }) => {
                self.breaker.open_payload(operation).to_string()
            }
            Err(e) => serde_json::json!({
                "error": e.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "circuitOpen": false,
            })
            .to_string(),
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let value = serde_json::to_value(data)?;
        let prepared = self.preprocess(value, 0, None);

        let estimate = estimate_size(&prepared);
        if estimate > self.config.max_string_length {
            tracing::warn!(
                estimated_bytes = estimate,
                limit = self.config.max_string_length,
                "data too large to encode, writing summary"
            );
            let summary = oversized_summary(&prepared, estimate);
            return Ok(serde_json::to_string_pretty(&summary)?);
        }

        let mut writer = CappedWriter::new(self.ceiling);
        if let Err(e) = serde_json::to_writer_pretty(&mut writer, &prepared) {
            if writer.overflowed {
                return Err(TrailError::Capacity(format!(
                    "encoded output exceeds {} bytes",
                    self.ceiling
                )));
            }
            return Err(e.into());
        }
        String::from_utf8(writer.buf)
            .map_err(|e| TrailError::Corruption(format!("encoder produced invalid UTF-8: {}", e)))
    }

    /// Depth-limited walk applying the array, key, and string bounds.
    pub fn preprocess(&self, value: Value, depth: usize, key: Option<&str>) -> Value {
        if depth > self.config.max_depth {
            return Value::String(MAX_DEPTH_MARKER.to_string());
        }

        match value {
            Value::String(s) => {
                match truncate_if_needed(&s, self.config.max_content_length, key) {
                    Some(descriptor) => serde_json::to_value(descriptor).unwrap_or(Value::Null),
                    None => Value::String(s),
                }
            }
            Value::Array(items) => {
                let total = items.len();
                let limit = self.config.max_array_items;
                let mut out: Vec<Value> = items
                    .into_iter()
                    .take(limit)
                    .map(|item| self.preprocess(item, depth + 1, key))
                    .collect();
                if total > limit {
                    out.push(Value::String(format!(
                        "[... {} more items truncated]",
                        total - limit
                    )));
                }
                Value::Array(out)
            }
            Value::Object(map) => {
                let total = map.len();
                let limit = self.config.max_array_items;
                let mut out = Map::new();
                for (k, v) in map.into_iter().take(limit) {
                    let child = self.preprocess(v, depth + 1, Some(&k));
                    out.insert(k, child);
                }
                if total > limit {
                    out.insert(
                        TRUNCATED_KEYS_FIELD.to_string(),
                        Value::String(format!("{} more keys", total - limit)),
                    );
                }
                Value::Object(out)
            }
            other => other,
        }
    }
}

/// Encoded-size estimate in bytes, assuming UTF-16 storage (two bytes per
/// code unit) plus a small overhead for delimiters.
pub fn estimate_size(value: &Value) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(_) => 8,
        Value::String(s) => utf16_bytes(s) + 2,
        Value::Array(items) => 2 + items.iter().map(|v| estimate_size(v) + 1).sum::<usize>(),
        Value::Object(map) => {
            2 + map
                .iter()
                .map(|(k, v)| utf16_bytes(k) + 4 + estimate_size(v))
                .sum::<usize>()
        }
    }
}

fn utf16_bytes(s: &str) -> usize {
    // ASCII is one UTF-8 byte per code unit; skip the re-encode.
    if s.is_ascii() {
        s.len() * 2
    } else {
        s.encode_utf16().count() * 2
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn sample(value: &Value) -> Value {
    let size = estimate_size(value);
    if size <= SAMPLE_ITEM_BUDGET {
        value.clone()
    } else {
        Value::String(format!("[{} of ~{} bytes]", type_name(value), size))
    }
}

fn oversized_summary(value: &Value, estimate: usize) -> Value {
    let mut summary = serde_json::json!({
        "oversized": true,
        "type": type_name(value),
        "estimatedSize": estimate,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    match value {
        Value::Array(items) => {
            summary["itemCount"] = items.len().into();
            summary["firstItem"] = items.first().map(sample).unwrap_or(Value::Null);
            summary["lastItem"] = items.last().map(sample).unwrap_or(Value::Null);
        }
        Value::Object(map) => {
            summary["keyCount"] = map.len().into();
            let mut keys: Vec<(&String, usize)> =
                map.iter().map(|(k, v)| (k, estimate_size(v))).collect();
            keys.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            summary["topKeys"] = keys
                .into_iter()
                .take(SUMMARY_TOP_KEYS)
                .map(|(k, size)| serde_json::json!({ "key": k, "estimatedSize": size }))
                .collect::<Vec<_>>()
                .into();
        }
        _ => {}
    }
    summary
}

struct CappedWriter {
    buf: Vec<u8>,
    cap: usize,
    overflowed: bool,
}

impl CappedWriter {
    fn new(cap: usize) -> Self {
        Self {
            buf: Vec::new(),
            cap,
            overflowed: false,
        }
    }
}

impl Write for CappedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.cap {
            self.overflowed = true;
            return Err(io::Error::other("output ceiling reached"));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
