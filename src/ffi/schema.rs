use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::enums::error::{InterchangeError, Result};
use crate::Field;

/// Ordered field list plus schema-level metadata.
///
/// Describes the columns of a `RecordBatch` or `Table`, and travels over the
/// C Data Interface as a struct-typed `ArrowSchema`.
///
/// Field names need not be unique; name lookups return the first match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub metadata: BTreeMap<String, String>,
}

impl Schema {
    #[inline]
    pub fn new(fields: Vec<Field>, metadata: BTreeMap<String, String>) -> Self {
        Self { fields, metadata }
    }

    /// Replaces the metadata map.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    /// Index of the first field named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_with_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// New schema holding the fields at `indices`, in that order. Metadata is kept.
    pub fn project(&self, indices: &[usize]) -> Result<Schema> {
        let fields = indices
            .iter()
            .map(|&i| {
                self.fields
                    .get(i)
                    .cloned()
                    .ok_or(InterchangeError::IndexOutOfBounds {
                        index: i,
                        len: self.fields.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::new(fields, self.metadata.clone()))
    }

    /// Same field count, order and data types. Names and metadata are ignored.
    pub fn is_interchange_compatible(&self, other: &Schema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl From<Vec<Field>> for Schema {
    fn from(fields: Vec<Field>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Schema [{} fields]", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::arrow_dtype::DataType;

    #[test]
    fn test_schema_new_and_from_fields() {
        let f1 = Field::new("c1", DataType::Int32, false);
        let f2 = Field::new("c2", DataType::Utf8, true);

        let meta = BTreeMap::new();
        let schema = Schema::new(vec![f1.clone(), f2.clone()], meta);
        assert_eq!(schema.fields[0], f1);
        assert_eq!(schema.fields[1], f2);

        let schema2: Schema = vec![f1.clone(), f2.clone()].into();
        assert_eq!(schema2.fields[0], f1);
        assert!(schema2.metadata.is_empty());
    }

    #[test]
    fn lookup_uses_first_match() {
        let schema: Schema = vec![
            Field::new("a", DataType::Int8, true),
            Field::new("a", DataType::Int16, true),
        ]
        .into();
        assert_eq!(schema.index_of("a"), Some(0));
        assert_eq!(schema.field_with_name("a").unwrap().data_type, DataType::Int8);
        assert_eq!(schema.index_of("b"), None);
    }

    #[test]
    fn compatibility_ignores_names_and_metadata() {
        let a: Schema = vec![Field::new("x", DataType::Utf8, true)].into();
        let mut meta = BTreeMap::new();
        meta.insert("k".to_string(), "v".to_string());
        let b = Schema::new(vec![Field::new("y", DataType::Utf8, false)], meta);
        assert!(a.is_interchange_compatible(&b));
        let c: Schema = vec![Field::new("x", DataType::LargeUtf8, true)].into();
        assert!(!a.is_interchange_compatible(&c));
    }

    #[test]
    fn project_reorders_and_checks_bounds() {
        let schema: Schema = vec![
            Field::new("a", DataType::Int8, true),
            Field::new("b", DataType::Int16, true),
        ]
        .into();
        let p = schema.project(&[1, 0]).unwrap();
        assert_eq!(p.field_names(), vec!["b", "a"]);
        assert!(schema.project(&[2]).is_err());
    }
}
