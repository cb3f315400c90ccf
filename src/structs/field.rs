//! # Field Module - *Arrow-compliant Column Metadata Tagging*
//!
//! A `Field` captures a column's name, logical data type, nullability and
//! lightweight string metadata.
//!
//! This module contains only the schema description. It does not hold any row
//! data; pair with an [`Array`](crate::Array) inside a
//! [`RecordBatch`](crate::RecordBatch) to bind a schema to values.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::Array;
use crate::ffi::arrow_dtype::DataType;

/// # Field
///
/// ## Description
/// - Name, type, nullability and key-value metadata of one column or child.
/// - Equality is structural over all four members. Metadata is an ordered map,
///   so insertion order never affects equality.
///
/// ### Tips:
/// - `Field` is *cloned often* (it is embedded in nested `DataType`s), so keep
///   metadata lightweight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub metadata: BTreeMap<String, String>,
}

impl Field {
    /// Constructs a new `Field` with empty metadata.
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Field {
            name: name.into(),
            data_type,
            nullable,
            metadata: BTreeMap::new(),
        }
    }

    /// Constructs a nullable `Field` describing `array`.
    pub fn from_array(name: impl Into<String>, array: &Array) -> Self {
        Field::new(name, array.data_type().clone(), true)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Replaces the metadata map.
    pub fn with_metadata<K, V, I>(mut self, metadata: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.metadata = metadata
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Field \"{}\": {}{}",
            self.name,
            self.data_type,
            if self.nullable { "" } else { " not null" }
        )?;
        if !self.metadata.is_empty() {
            write!(f, " (metadata: {:?})", self.metadata)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural_and_order_free() {
        let a = Field::new("x", DataType::Int32, true).with_metadata([("a", "1"), ("b", "2")]);
        let b = Field::new("x", DataType::Int32, true).with_metadata([("b", "2"), ("a", "1")]);
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_nullable(false));
        assert_ne!(a, b.clone().with_name("y"));
        assert_ne!(a, b.with_data_type(DataType::Int64));
    }

    #[test]
    fn display() {
        let f = Field::new("col", DataType::Utf8, false);
        assert_eq!(f.to_string(), "Field \"col\": Utf8 not null");
    }
}
