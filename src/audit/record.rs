//! Ledger Record
//!
//! Defines the structure of a single audit ledger line and the hash
//! functions that chain records together.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io;

use crate::error::{LedgerError, Result};

/// `prev_hash` of the first record in a chain.
pub const SENTINEL_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Payload carried by a record: string keys to arbitrary JSON values.
pub type Payload = Map<String, Value>;

/// One line of the audit ledger.
///
/// Field order matches the on-disk layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Written as RFC 3339 with a `Z` suffix; read leniently, see
    /// [`parse_timestamp`].
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub data_hash: String,
    pub prev_hash: String,
    pub chain_hash: String,
    pub payload: Payload,
}

impl LedgerRecord {
    /// Build a record linked to `prev_hash`, hashing `action` and `payload`.
    pub fn new(action: String, payload: Payload, prev_hash: String) -> Result<Self> {
        let data_hash = data_hash(&action, &payload)?;
        let chain_hash = chain_hash(&prev_hash, &data_hash);

        Ok(Self {
            timestamp: Utc::now(),
            action,
            data_hash,
            prev_hash,
            chain_hash,
            payload,
        })
    }

    /// Recompute both hashes and compare against the stored values.
    pub fn verify_hash(&self) -> bool {
        match data_hash(&self.action, &self.payload) {
            Ok(expected) => {
                expected == self.data_hash
                    && chain_hash(&self.prev_hash, &self.data_hash) == self.chain_hash
            }
            Err(_) => false,
        }
    }

    pub fn is_chain_start(&self) -> bool {
        self.prev_hash == SENTINEL_HASH
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} {} ({} -> {})",
            self.timestamp.to_rfc3339(),
            self.action,
            short(&self.prev_hash),
            short(&self.chain_hash)
        )
    }
}

/// Turn any serializable value into a record payload. Only JSON objects are
/// accepted.
pub fn to_payload<P: Serialize + ?Sized>(payload: &P) -> Result<Payload> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(LedgerError::InvalidInput(format!(
            "payload must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Parse a record timestamp. RFC 3339 values are converted to UTC; ISO-8601
/// datetimes without an offset (`2025-01-01T12:00:00.123456`) are taken as
/// UTC.
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(timestamp) => Ok(timestamp.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc()),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(|e| {
        serde::de::Error::custom(format!("invalid timestamp {:?}: {}", raw, e))
    })
}

/// Hashed body of a record. Fields are declared in sorted order.
#[derive(Serialize)]
struct CanonicalBody<'a> {
    action: &'a str,
    payload: SortedMap<'a>,
}

/// An object serialized with its keys in code point order, at every depth.
struct SortedMap<'a>(&'a Map<String, Value>);

struct SortedValue<'a>(&'a Value);

impl Serialize for SortedMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut entries: Vec<(&String, &Value)> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        serializer.collect_map(entries.into_iter().map(|(k, v)| (k, SortedValue(v))))
    }
}

impl Serialize for SortedValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => SortedMap(map).serialize(serializer),
            Value::Array(items) => serializer.collect_seq(items.iter().map(SortedValue)),
            other => other.serialize(serializer),
        }
    }
}

/// Output layout of Python's `json.dumps(obj, sort_keys=True)`: `", "` and
/// `": "` separators, everything outside printable ASCII escaped as
/// lowercase `\uXXXX` (UTF-16 units), floats in `repr` notation.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }
}

/// Shortest round-trip digits, positional for decimal exponents -4 to 15
/// (`1000000000000000.0`, `0.0001`), otherwise `1e+16` / `1.5e-07`.
fn float_repr(value: f64) -> String {
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let sign = if value < 0.0 { "-" } else { "" };

    if (-4..16).contains(&exponent) {
        let point = exponent + 1;
        if point <= 0 {
            format!("{}0.{}{}", sign, "0".repeat(point.unsigned_abs() as usize), digits)
        } else if point as usize >= digits.len() {
            let zeros = "0".repeat(point as usize - digits.len());
            format!("{}{}{}.0", sign, digits, zeros)
        } else {
            let (int, frac) = digits.split_at(point as usize);
            format!("{}{}.{}", sign, int, frac)
        }
    } else {
        let (first, rest) = digits.split_at(1);
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        if rest.is_empty() {
            format!("{}{}e{}{:02}", sign, first, exp_sign, exponent.abs())
        } else {
            format!("{}{}.{}e{}{:02}", sign, first, rest, exp_sign, exponent.abs())
        }
    }
}

/// Deterministic serialization of `{action, payload}`, byte for byte what
/// `json.dumps({"action": ..., "payload": ...}, sort_keys=True)` produces,
/// so ledgers written by earlier tooling keep verifying.
pub fn canonical_json(action: &str, payload: &Payload) -> Result<String> {
    let body = CanonicalBody {
        action,
        payload: SortedMap(payload),
    };
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
    body.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| LedgerError::SerializationError(e.to_string()))
}

/// SHA-256 of a string as lowercase hex.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn data_hash(action: &str, payload: &Payload) -> Result<String> {
    Ok(sha256_hex(&canonical_json(action, payload)?))
}

/// Plain string concatenation, previous hash first.
pub fn chain_hash(prev_hash: &str, data_hash: &str) -> String {
    sha256_hex(&format!("{}{}", prev_hash, data_hash))
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
