//! # **RecordBatch Module** - *Equal-length columns bound to a Schema*
//!
//! Columnar data container pairing a fixed number of rows with named, typed
//! `Array` columns described by a [`Schema`].
//!
//! The unit of exchange for the C Stream Interface and of both codecs: each
//! Parquet row group and each IPC record-batch message decodes to one.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::Scalar;
use crate::kernels::cast::cast;
use crate::structs::builders::struct_array;
use crate::traits::concatenate::concat_arrays;
use crate::traits::print::{scalar_to_string, write_grid};
use crate::{Array, DataType, Field, Schema};

/// # RecordBatch
///
/// ## Description
/// - One `Schema` plus one `Array` per field, all of `num_rows` length.
/// - Construction checks the column count, lengths and types.
/// - Every transform returns a new batch; column buffers are shared.
///
/// ## Example
/// ```rust
/// use minarrow_interchange::{Array, RecordBatch};
///
/// let batch = RecordBatch::from_arrays(
///     &["id", "name"],
///     vec![Array::from_slice(&[1i32, 2]), Array::from_strs(&["a", "b"])],
/// )
/// .unwrap();
/// assert_eq!(batch.shape(), (2, 2));
/// ```
#[derive(Clone, Debug)]
pub struct RecordBatch {
    schema: Schema,
    columns: Vec<Array>,
    num_rows: usize,
}

impl RecordBatch {
    /// Binds `columns` to `schema`.
    ///
    /// # Errors
    /// - `FieldCountMismatch` when the column count differs from the field count.
    /// - `ColumnLengthMismatch` when a column's length differs from the first.
    /// - `TypeMismatch` when a column's type differs from its field.
    pub fn try_new(schema: Schema, columns: Vec<Array>) -> Result<Self> {
        let num_rows = columns.first().map(Array::len).unwrap_or(0);
        Self::try_new_with_num_rows(schema, columns, num_rows)
    }

    /// As [`RecordBatch::try_new`] with an explicit row count, which is what
    /// gives a zero-column batch its length.
    pub fn try_new_with_num_rows(
        schema: Schema,
        columns: Vec<Array>,
        num_rows: usize,
    ) -> Result<Self> {
        if schema.len() != columns.len() {
            return Err(InterchangeError::FieldCountMismatch {
                expected: schema.len(),
                found: columns.len(),
            });
        }
        for (col, (array, field)) in columns.iter().zip(&schema.fields).enumerate() {
            if array.len() != num_rows {
                return Err(InterchangeError::ColumnLengthMismatch {
                    col,
                    expected: num_rows,
                    found: array.len(),
                });
            }
            if *array.data_type() != field.data_type {
                return Err(InterchangeError::TypeMismatch {
                    expected: field.data_type.to_string(),
                    found: array.data_type().to_string(),
                    context: Some(format!("column '{}'", field.name)),
                });
            }
        }
        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    /// Builds a batch of nullable fields named `names`.
    pub fn from_arrays<S: AsRef<str>>(names: &[S], columns: Vec<Array>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(InterchangeError::FieldCountMismatch {
                expected: names.len(),
                found: columns.len(),
            });
        }
        let fields = names
            .iter()
            .zip(&columns)
            .map(|(name, array)| Field::from_array(name.as_ref(), array))
            .collect::<Vec<_>>();
        Self::try_new(Schema::from(fields), columns)
    }

    /// Zero-row batch of `schema`.
    pub fn new_empty(schema: Schema) -> Result<Self> {
        let columns = schema
            .fields
            .iter()
            .map(|f| Array::new_null_typed(&f.data_type, 0))
            .collect::<Result<Vec<_>>>()?;
        Self::try_new_with_num_rows(schema, columns, 0)
    }

    /// Splits a struct array into one column per child. Parent nulls are
    /// folded into each column's validity.
    pub fn from_struct_array(array: &Array) -> Result<Self> {
        let DataType::Struct(fields) = array.data_type() else {
            return Err(InterchangeError::TypeMismatch {
                expected: "Struct".into(),
                found: array.data_type().to_string(),
                context: Some("RecordBatch::from_struct_array".into()),
            });
        };
        let columns = (0..fields.len())
            .map(|i| array.struct_field(&[i]))
            .collect::<Result<Vec<_>>>()?;
        Self::try_new_with_num_rows(Schema::from(fields.clone()), columns, array.len())
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.columns.len())
    }

    #[inline]
    pub fn columns(&self) -> &[Array] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Array> {
        self.columns
    }

    #[inline]
    pub fn column(&self, i: usize) -> Option<&Array> {
        self.columns.get(i)
    }

    /// First column named `name`.
    pub fn column_by_name(&self, name: &str) -> Option<&Array> {
        self.schema.index_of(name).map(|i| &self.columns[i])
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.field_names()
    }

    /// Zero-copy window of rows `[offset, offset + len)`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        if offset + len > self.num_rows {
            return Err(InterchangeError::IndexOutOfBounds {
                index: offset + len,
                len: self.num_rows,
            });
        }
        Ok(Self {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.slice(offset, len)).collect(),
            num_rows: len,
        })
    }

    /// Columns at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Result<Self> {
        let schema = self.schema.project(indices)?;
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        Self::try_new_with_num_rows(schema, columns, self.num_rows)
    }

    /// Columns named `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let indices = resolve_names(&self.schema, names)?;
        self.project(&indices)
    }

    /// Replaces the schema. Field count and types must match; names,
    /// nullability and metadata may change.
    pub fn with_schema(self, schema: Schema) -> Result<Self> {
        if !self.schema.is_interchange_compatible(&schema) {
            return Err(InterchangeError::SchemaMismatch(format!(
                "cannot rebind batch of [{}] to [{}]",
                type_list(&self.schema),
                type_list(&schema)
            )));
        }
        Ok(Self { schema, ..self })
    }

    /// Replaces the schema-level metadata.
    pub fn with_metadata(self, metadata: BTreeMap<String, String>) -> Self {
        let schema = self.schema.clone().with_metadata(metadata);
        Self { schema, ..self }
    }

    /// Inserts `column` at position `i`.
    pub fn add_column(&self, i: usize, field: Field, column: Array) -> Result<Self> {
        if i > self.columns.len() {
            return Err(InterchangeError::IndexOutOfBounds {
                index: i,
                len: self.columns.len(),
            });
        }
        let mut schema = self.schema.clone();
        let mut columns = self.columns.clone();
        schema.fields.insert(i, field);
        columns.insert(i, column);
        Self::try_new_with_num_rows(schema, columns, self.num_rows)
    }

    pub fn append_column(&self, field: Field, column: Array) -> Result<Self> {
        self.add_column(self.columns.len(), field, column)
    }

    /// Replaces the column at position `i`.
    pub fn set_column(&self, i: usize, field: Field, column: Array) -> Result<Self> {
        self.check_index(i)?;
        let mut schema = self.schema.clone();
        let mut columns = self.columns.clone();
        schema.fields[i] = field;
        columns[i] = column;
        Self::try_new_with_num_rows(schema, columns, self.num_rows)
    }

    pub fn remove_column(&self, i: usize) -> Result<Self> {
        self.check_index(i)?;
        let mut schema = self.schema.clone();
        let mut columns = self.columns.clone();
        schema.fields.remove(i);
        columns.remove(i);
        Self::try_new_with_num_rows(schema, columns, self.num_rows)
    }

    /// Renames every column; `names` must cover all of them.
    pub fn rename_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let schema = renamed(&self.schema, names)?;
        Ok(Self {
            schema,
            columns: self.columns.clone(),
            num_rows: self.num_rows,
        })
    }

    /// Casts each column to the type of the matching field in `target`.
    ///
    /// The result carries `target`'s fields, and keeps this batch's metadata
    /// when `target` has none.
    pub fn cast(&self, target: &Schema) -> Result<Self> {
        if target.len() != self.columns.len() {
            return Err(InterchangeError::FieldCountMismatch {
                expected: target.len(),
                found: self.columns.len(),
            });
        }
        let columns = self
            .columns
            .iter()
            .zip(&target.fields)
            .map(|(c, f)| cast(c, &f.data_type))
            .collect::<Result<Vec<_>>>()?;
        let mut schema = target.clone();
        if schema.metadata.is_empty() {
            schema.metadata = self.schema.metadata.clone();
        }
        Self::try_new_with_num_rows(schema, columns, self.num_rows)
    }

    /// Packs the columns as children of one struct array.
    pub fn to_struct_array(&self) -> Result<Array> {
        if self.columns.is_empty() {
            return Array::try_new(
                DataType::Struct(Vec::new()),
                self.num_rows,
                0,
                None,
                Vec::new(),
                Vec::new(),
                None,
            );
        }
        struct_array(&self.columns, &self.schema.fields, None)
    }

    /// Logical values of row `i`, one per column.
    pub fn row(&self, i: usize) -> Result<Vec<Scalar>> {
        if i >= self.num_rows {
            return Err(InterchangeError::IndexOutOfBounds {
                index: i,
                len: self.num_rows,
            });
        }
        Ok(self.columns.iter().map(|c| c.to_scalar(i)).collect())
    }

    /// Concatenates batches sharing one schema. The first batch's schema wins.
    ///
    /// # Errors
    /// - `SchemaMismatch` when a batch's types differ from the first.
    /// - `UnsupportedOperation` when `batches` is empty.
    pub fn concat_batches(batches: &[RecordBatch]) -> Result<RecordBatch> {
        let Some(first) = batches.first() else {
            return Err(InterchangeError::UnsupportedOperation(
                "cannot concatenate zero batches".into(),
            ));
        };
        for (i, b) in batches.iter().enumerate().skip(1) {
            if !first.schema.is_interchange_compatible(&b.schema) {
                return Err(InterchangeError::SchemaMismatch(format!(
                    "batch {i} has types [{}], expected [{}]",
                    type_list(&b.schema),
                    type_list(&first.schema)
                )));
            }
        }
        let num_rows = batches.iter().map(|b| b.num_rows).sum();
        let columns = (0..first.num_columns())
            .map(|c| {
                let parts: Vec<Array> = batches.iter().map(|b| b.columns[c].clone()).collect();
                concat_arrays(&parts)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::try_new_with_num_rows(first.schema.clone(), columns, num_rows)
    }

    fn check_index(&self, i: usize) -> Result<()> {
        if i >= self.columns.len() {
            return Err(InterchangeError::IndexOutOfBounds {
                index: i,
                len: self.columns.len(),
            });
        }
        Ok(())
    }
}

pub(crate) fn resolve_names<S: AsRef<str>>(schema: &Schema, names: &[S]) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|n| {
            schema.index_of(n.as_ref()).ok_or_else(|| {
                InterchangeError::SchemaMismatch(format!("no column named '{}'", n.as_ref()))
            })
        })
        .collect()
}

pub(crate) fn renamed<S: AsRef<str>>(schema: &Schema, names: &[S]) -> Result<Schema> {
    if names.len() != schema.len() {
        return Err(InterchangeError::FieldCountMismatch {
            expected: schema.len(),
            found: names.len(),
        });
    }
    let fields = schema
        .fields
        .iter()
        .zip(names)
        .map(|(f, n)| f.clone().with_name(n.as_ref()))
        .collect();
    Ok(Schema::new(fields, schema.metadata.clone()))
}

pub(crate) fn type_list(schema: &Schema) -> String {
    schema
        .fields
        .iter()
        .map(|f| f.data_type.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl PartialEq for RecordBatch {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
            && self.num_rows == other.num_rows
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.logical_eq(b))
    }
}

impl Display for RecordBatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let headers = self.schema.fields.iter().map(|f| f.name.clone()).collect();
        write_grid(f, "RecordBatch", headers, self.num_rows, |row, col| {
            scalar_to_string(&self.columns[col].to_scalar(row))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> RecordBatch {
        RecordBatch::from_arrays(
            &["a", "b"],
            vec![
                Array::from_options(&[Some(1i32), None, Some(3)]),
                Array::from_strs(&["x", "y", "z"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn construction_checks() {
        let schema = batch().schema().clone();
        assert!(matches!(
            RecordBatch::try_new(schema.clone(), vec![Array::from_slice(&[1i32])]),
            Err(InterchangeError::FieldCountMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            RecordBatch::try_new(
                schema.clone(),
                vec![Array::from_slice(&[1i32]), Array::from_strs(&["x", "y"])]
            ),
            Err(InterchangeError::ColumnLengthMismatch { col: 1, .. })
        ));
        assert!(matches!(
            RecordBatch::try_new(
                schema,
                vec![Array::from_slice(&[1i64]), Array::from_strs(&["x"])]
            ),
            Err(InterchangeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn column_access_and_slice() {
        let b = batch();
        assert_eq!(b.column_names(), vec!["a", "b"]);
        assert_eq!(b.column_by_name("b").unwrap().value_str(2), Some("z"));
        let s = b.slice(1, 2).unwrap();
        assert_eq!(s.num_rows(), 2);
        assert_eq!(s.row(0).unwrap(), vec![Scalar::Null, Scalar::Utf8("y".into())]);
        assert!(s.columns()[1].buffers()[0].shares_storage(&b.columns()[1].buffers()[0]));
        assert!(b.slice(2, 2).is_err());
    }

    #[test]
    fn column_edits() {
        let b = batch();
        let c = b
            .add_column(0, Field::new("c", DataType::Boolean, false), Array::from_bools(&[true, false, true]))
            .unwrap();
        assert_eq!(c.column_names(), vec!["c", "a", "b"]);
        let c = c.remove_column(0).unwrap().rename_columns(&["x", "y"]).unwrap();
        assert_eq!(c.column_names(), vec!["x", "y"]);
        assert!(b.append_column(Field::new("d", DataType::Int32, true), Array::from_slice(&[1i32])).is_err());
        assert_eq!(b.select(&["b"]).unwrap().num_columns(), 1);
        assert!(matches!(b.select(&["nope"]), Err(InterchangeError::SchemaMismatch(_))));
    }

    #[test]
    fn struct_round_trip() {
        let b = batch();
        let s = b.to_struct_array().unwrap();
        assert_eq!(s.len(), 3);
        let back = RecordBatch::from_struct_array(&s).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn concat_and_cast() {
        let b = batch();
        let both = RecordBatch::concat_batches(&[b.clone(), b.slice(0, 1).unwrap()]).unwrap();
        assert_eq!(both.num_rows(), 4);
        assert_eq!(both.row(3).unwrap()[0], Scalar::Int(1));

        let target = Schema::from(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::LargeUtf8, true),
        ]);
        let cast = b.cast(&target).unwrap();
        assert_eq!(cast.schema(), &target);
        assert_eq!(cast.row(2).unwrap(), b.row(2).unwrap());
    }

    #[test]
    fn display_has_headers() {
        let out = batch().to_string();
        assert!(out.starts_with("RecordBatch [3 rows × 2 cols]"));
        assert!(out.contains("null"));
    }
}
