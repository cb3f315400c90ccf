//! # SchemaStore
//!
//! Thread-safe registry of Avro writer schemas.
//!
//! | Policy | Key | `register` | `key_type` |
//! |---|---|---|---|
//! | [`FingerprintPolicy::Rabin`] | CRC-64-AVRO of the canonical form | yes | `"rabin"` |
//! | [`FingerprintPolicy::Confluent`] | registry id, fits `u32` | no | `"id"` |
//! | [`FingerprintPolicy::Apicurio`] | registry id, `u64` | no | `"id64"` |
//!
//! ## Example
//! ```rust
//! use minarrow_interchange::io::avro::SchemaStore;
//!
//! let store = SchemaStore::rabin();
//! let fp = store.register(r#"{"type": "record", "name": "r", "fields": [{"name": "a", "type": "long"}]}"#).unwrap();
//! assert_eq!(store.fingerprints(), vec![fp]);
//! assert!(store.lookup(format!("0x{fp:x}")).unwrap().is_some());
//! ```

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use crate::enums::error::{InterchangeError, Result};

/// Seed and polynomial of the CRC-64-AVRO fingerprint.
pub const RABIN_EMPTY: u64 = 0xc15d_213a_a4d7_a795;

const RABIN_TABLE: [u64; 256] = rabin_table();

const fn rabin_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut fp = i as u64;
        let mut j = 0;
        while j < 8 {
            fp = (fp >> 1) ^ (RABIN_EMPTY & (fp & 1).wrapping_neg());
            j += 1;
        }
        table[i] = fp;
        i += 1;
    }
    table
}

/// CRC-64-AVRO (Rabin) fingerprint of `bytes`.
pub fn rabin_fingerprint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(RABIN_EMPTY, |fp, &b| {
        (fp >> 8) ^ RABIN_TABLE[((fp ^ b as u64) & 0xff) as usize]
    })
}

const PRIMITIVES: [&str; 8] = [
    "null", "boolean", "int", "long", "float", "double", "bytes", "string",
];

/// Returns the Parsing Canonical Form of an Avro schema.
///
/// Names become full names, attributes other than `name`, `type`, `fields`,
/// `symbols`, `items`, `values` and `size` are dropped, and the rest are
/// written in that order without whitespace.
///
/// # Errors
/// `SchemaParse` when `schema` is not JSON or not a valid schema shape.
pub fn canonical_form(schema: &str) -> Result<String> {
    let value: Value = serde_json::from_str(schema)
        .map_err(|e| InterchangeError::SchemaParse(format!("invalid schema JSON: {e}")))?;
    let mut out = String::with_capacity(schema.len());
    write_canonical(&value, "", &mut out)?;
    Ok(out)
}

fn parse_error(msg: impl Into<String>) -> InterchangeError {
    InterchangeError::SchemaParse(msg.into())
}

fn full_name(name: &str, namespace: &str) -> String {
    if name.contains('.') || namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

fn push_json_string(s: &str, out: &mut String) {
    // serde_json only fails on non-string map keys
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}

fn write_canonical(value: &Value, namespace: &str, out: &mut String) -> Result<()> {
    match value {
        Value::String(name) => {
            if PRIMITIVES.contains(&name.as_str()) {
                push_json_string(name, out);
            } else {
                push_json_string(&full_name(name, namespace), out);
            }
            Ok(())
        }
        Value::Array(branches) => {
            out.push('[');
            for (i, branch) in branches.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(branch, namespace, out)?;
            }
            out.push(']');
            Ok(())
        }
        Value::Object(map) => write_complex(map, namespace, out),
        other => Err(parse_error(format!("unexpected schema value {other}"))),
    }
}

fn write_complex(map: &Map<String, Value>, namespace: &str, out: &mut String) -> Result<()> {
    let ty = map
        .get("type")
        .ok_or_else(|| parse_error("schema object without 'type'"))?;
    let Value::String(ty) = ty else {
        // {"type": {...}} or {"type": [...]} wraps another schema
        return write_canonical(ty, namespace, out);
    };
    match ty.as_str() {
        "record" | "error" | "enum" | "fixed" => {
            let name = map
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| parse_error(format!("{ty} without a name")))?;
            let own_namespace = match map.get("namespace").and_then(Value::as_str) {
                Some(ns) => ns,
                None => namespace,
            };
            let full = full_name(name, own_namespace);
            let inner_namespace = full.rsplit_once('.').map_or("", |(ns, _)| ns).to_string();
            out.push_str("{\"name\":");
            push_json_string(&full, out);
            out.push_str(",\"type\":");
            push_json_string(if ty == "error" { "record" } else { ty }, out);
            match ty.as_str() {
                "enum" => {
                    let symbols = map
                        .get("symbols")
                        .and_then(Value::as_array)
                        .ok_or_else(|| parse_error(format!("enum '{full}' without symbols")))?;
                    out.push_str(",\"symbols\":[");
                    for (i, s) in symbols.iter().enumerate() {
                        let s = s
                            .as_str()
                            .ok_or_else(|| parse_error(format!("enum '{full}' symbol is not a string")))?;
                        if i > 0 {
                            out.push(',');
                        }
                        push_json_string(s, out);
                    }
                    out.push(']');
                }
                "fixed" => {
                    let size = map
                        .get("size")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| parse_error(format!("fixed '{full}' without a size")))?;
                    out.push_str(&format!(",\"size\":{size}"));
                }
                _ => {
                    let fields = map
                        .get("fields")
                        .and_then(Value::as_array)
                        .ok_or_else(|| parse_error(format!("record '{full}' without fields")))?;
                    out.push_str(",\"fields\":[");
                    for (i, field) in fields.iter().enumerate() {
                        let field_name = field
                            .get("name")
                            .and_then(Value::as_str)
                            .ok_or_else(|| parse_error(format!("field of '{full}' without a name")))?;
                        let field_type = field
                            .get("type")
                            .ok_or_else(|| parse_error(format!("field '{field_name}' without a type")))?;
                        if i > 0 {
                            out.push(',');
                        }
                        out.push_str("{\"name\":");
                        push_json_string(field_name, out);
                        out.push_str(",\"type\":");
                        write_canonical(field_type, &inner_namespace, out)?;
                        out.push('}');
                    }
                    out.push(']');
                }
            }
            out.push('}');
            Ok(())
        }
        "array" => {
            let items = map
                .get("items")
                .ok_or_else(|| parse_error("array without items"))?;
            out.push_str("{\"type\":\"array\",\"items\":");
            write_canonical(items, namespace, out)?;
            out.push('}');
            Ok(())
        }
        "map" => {
            let values = map
                .get("values")
                .ok_or_else(|| parse_error("map without values"))?;
            out.push_str("{\"type\":\"map\",\"values\":");
            write_canonical(values, namespace, out)?;
            out.push('}');
            Ok(())
        }
        // Primitive with annotations such as logicalType.
        _ => write_canonical(&Value::String(ty.clone()), namespace, out),
    }
}

/// How keys are assigned to schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FingerprintPolicy {
    /// Rabin fingerprint of the Parsing Canonical Form.
    #[default]
    Rabin,
    /// Confluent Schema Registry 32-bit ids.
    Confluent,
    /// Apicurio Registry 64-bit ids.
    Apicurio,
}

impl FingerprintPolicy {
    pub fn key_type(self) -> &'static str {
        match self {
            Self::Rabin => "rabin",
            Self::Confluent => "id",
            Self::Apicurio => "id64",
        }
    }
}

/// A fingerprint or id, as a number or as `"0x…"` hex / decimal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaKey {
    Number(u64),
    Text(String),
}

impl From<u64> for SchemaKey {
    fn from(v: u64) -> Self {
        Self::Number(v)
    }
}

impl From<u32> for SchemaKey {
    fn from(v: u32) -> Self {
        Self::Number(v as u64)
    }
}

impl From<&str> for SchemaKey {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SchemaKey {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl SchemaKey {
    /// Resolves the key to its numeric value under `policy`.
    ///
    /// # Errors
    /// `TypeMismatch` for unparsable text or a Confluent id above `u32::MAX`.
    pub fn resolve(&self, policy: FingerprintPolicy) -> Result<u64> {
        let value = match self {
            Self::Number(v) => *v,
            Self::Text(s) => {
                let parsed = match s.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => s.parse::<u64>(),
                };
                parsed.map_err(|_| {
                    InterchangeError::type_mismatch("integer or 0x-prefixed hex key", format!("'{s}'"))
                })?
            }
        };
        if policy == FingerprintPolicy::Confluent && value > u32::MAX as u64 {
            return Err(InterchangeError::type_mismatch(
                "u32 schema id",
                value,
            ));
        }
        Ok(value)
    }
}

/// Registry of Avro writer schemas.
///
/// Lookups take a read lock; `register` and `set` take the write lock for the
/// whole insert.
#[derive(Debug, Default)]
pub struct SchemaStore {
    policy: FingerprintPolicy,
    schemas: RwLock<HashMap<u64, String>>,
}

impl SchemaStore {
    pub fn new(policy: FingerprintPolicy) -> Self {
        Self {
            policy,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn rabin() -> Self {
        Self::new(FingerprintPolicy::Rabin)
    }

    pub fn confluent() -> Self {
        Self::new(FingerprintPolicy::Confluent)
    }

    pub fn apicurio() -> Self {
        Self::new(FingerprintPolicy::Apicurio)
    }

    pub fn policy(&self) -> FingerprintPolicy {
        self.policy
    }

    pub fn key_type(&self) -> &'static str {
        self.policy.key_type()
    }

    /// Fingerprints `schema` and stores it. Registering the same schema again
    /// returns the same key and keeps the first text.
    ///
    /// # Errors
    /// `UnsupportedOperation` for id policies, `SchemaParse` for invalid
    /// schemas.
    pub fn register(&self, schema: &str) -> Result<u64> {
        if self.policy != FingerprintPolicy::Rabin {
            return Err(InterchangeError::UnsupportedOperation(format!(
                "register needs the rabin policy, this store uses '{}' keys; use set",
                self.key_type()
            )));
        }
        let canonical = canonical_form(schema)?;
        let fp = rabin_fingerprint(canonical.as_bytes());
        self.schemas
            .write()
            .entry(fp)
            .or_insert_with(|| schema.to_string());
        debug!(fingerprint = fp, "avro schema registered");
        Ok(fp)
    }

    /// Stores `schema` under `key`, replacing any existing entry.
    pub fn set(&self, key: impl Into<SchemaKey>, schema: &str) -> Result<()> {
        let key = key.into().resolve(self.policy)?;
        serde_json::from_str::<Value>(schema)
            .map_err(|e| InterchangeError::SchemaParse(format!("invalid schema JSON: {e}")))?;
        self.schemas.write().insert(key, schema.to_string());
        Ok(())
    }

    /// Schema text stored under `key`, if any.
    pub fn lookup(&self, key: impl Into<SchemaKey>) -> Result<Option<String>> {
        let key = key.into().resolve(self.policy)?;
        Ok(self.schemas.read().get(&key).cloned())
    }

    /// Sorted snapshot of the stored keys.
    pub fn fingerprints(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = self.schemas.read().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}
