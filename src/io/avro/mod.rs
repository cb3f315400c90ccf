//! # Avro Module - *Writer schema registry*
//!
//! Avro single-object and registry-framed messages carry a key instead of the
//! writer schema. [`SchemaStore`] maps those keys back to schema text, keyed
//! either by the Rabin fingerprint of the schema's Parsing Canonical Form or by
//! a registry id.

pub mod schema_store;

pub use schema_store::{
    FingerprintPolicy, SchemaKey, SchemaStore, canonical_form, rabin_fingerprint,
};
