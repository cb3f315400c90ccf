//! # **Table Module** - *Batched (Chunked) Table*
//!
//! Contains `Table`, a higher-order container of `RecordBatch` chunks that share
//! one `Schema`.
//!
//! ## Overview
//! - Logical concatenation of batches; row count is the sum of batch rows.
//! - Batches are validated against the table schema on construction.
//! - Rechunking, slicing and column edits return new tables. Column buffers are
//!   shared wherever no two batches need merging.
//! - Column views come back as [`ChunkedArray`], one chunk per batch.

use std::fmt::{Display, Formatter};

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::Scalar;
use crate::ffi::stream::BatchReader;
use crate::structs::chunked::chunked_array::{ChunkedArray, RechunkStrategy, uniform_lengths};
use crate::structs::record_batch::{renamed, resolve_names, type_list};
use crate::traits::print::{scalar_to_string, write_grid};
use crate::{Array, DataType, Field, RecordBatch, Schema};

/// # Table
///
/// ## Description
/// - One `Schema` plus an ordered list of `RecordBatch`es.
/// - `chunk_lengths()` is the per-batch row count; `num_rows()` their sum.
/// - Equality is logical: same schema and same values per column, whatever the
///   batch boundaries.
///
/// ## Example
/// ```rust
/// use minarrow_interchange::{Array, RecordBatch, Table};
///
/// let b = RecordBatch::from_arrays(&["x"], vec![Array::from_slice(&[1i32, 2, 3])]).unwrap();
/// let t = Table::from_batches(vec![b.clone(), b], None).unwrap();
/// assert_eq!(t.num_rows(), 6);
/// let t2 = t.rechunk_to_lengths(&[4, 2]).unwrap();
/// assert_eq!(t2.chunk_lengths(), vec![4, 2]);
/// assert_eq!(t, t2);
/// ```
#[derive(Clone, Debug)]
pub struct Table {
    schema: Schema,
    batches: Vec<RecordBatch>,
}

impl Table {
    /// Builds a table from `batches`.
    ///
    /// With `schema` absent, the first batch's schema is used. Every batch must
    /// agree with it on field names and types; batches are rebound to it.
    ///
    /// # Errors
    /// - `SchemaMismatch` when a batch disagrees with the table schema.
    /// - `UnsupportedOperation` when both `batches` and `schema` are empty.
    pub fn from_batches(batches: Vec<RecordBatch>, schema: Option<Schema>) -> Result<Self> {
        let schema = match schema {
            Some(s) => s,
            None => match batches.first() {
                Some(b) => b.schema().clone(),
                None => {
                    return Err(InterchangeError::UnsupportedOperation(
                        "cannot infer a schema from zero batches".into(),
                    ));
                }
            },
        };
        Self::try_new(schema, batches)
    }

    /// Binds `batches` to `schema`; see [`Table::from_batches`].
    pub fn try_new(schema: Schema, batches: Vec<RecordBatch>) -> Result<Self> {
        let batches = batches
            .into_iter()
            .enumerate()
            .map(|(i, b)| {
                let same_names = b.schema().field_names() == schema.field_names();
                if !same_names || !b.schema().is_interchange_compatible(&schema) {
                    return Err(InterchangeError::SchemaMismatch(format!(
                        "batch {i} has fields [{}] of [{}], table expects [{}] of [{}]",
                        b.schema().field_names().join(", "),
                        type_list(b.schema()),
                        schema.field_names().join(", "),
                        type_list(&schema)
                    )));
                }
                b.with_schema(schema.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { schema, batches })
    }

    /// Zero-batch table of `schema`.
    pub fn empty(schema: Schema) -> Self {
        Self {
            schema,
            batches: Vec::new(),
        }
    }

    /// One-batch table of nullable columns named `names`.
    pub fn from_arrays<S: AsRef<str>>(names: &[S], arrays: Vec<Array>) -> Result<Self> {
        let batch = RecordBatch::from_arrays(names, arrays)?;
        Ok(Self::from(batch))
    }

    /// Builds a table from whole columns. Every column is rechunked to the
    /// first column's chunk lengths.
    ///
    /// # Errors
    /// - `FieldCountMismatch` / `TypeMismatch` against `schema`.
    /// - `ColumnLengthMismatch` when the columns differ in length.
    pub fn from_chunked_columns(schema: Schema, columns: Vec<ChunkedArray>) -> Result<Self> {
        if schema.len() != columns.len() {
            return Err(InterchangeError::FieldCountMismatch {
                expected: schema.len(),
                found: columns.len(),
            });
        }
        let Some(first) = columns.first() else {
            return Ok(Self::empty(schema));
        };
        let lengths = first.chunk_lengths();
        let total = first.len();
        for (col, (c, field)) in columns.iter().zip(&schema.fields).enumerate() {
            if c.len() != total {
                return Err(InterchangeError::ColumnLengthMismatch {
                    col,
                    expected: total,
                    found: c.len(),
                });
            }
            if *c.data_type() != field.data_type {
                return Err(InterchangeError::TypeMismatch {
                    expected: field.data_type.to_string(),
                    found: c.data_type().to_string(),
                    context: Some(format!("column '{}'", field.name)),
                });
            }
        }
        let rechunked = columns
            .iter()
            .map(|c| c.rechunk_to_lengths(&lengths))
            .collect::<Result<Vec<_>>>()?;
        Self::assemble(schema, rechunked, &lengths)
    }

    /// Zips equally chunked columns into batches of `lengths` rows.
    fn assemble(schema: Schema, columns: Vec<ChunkedArray>, lengths: &[usize]) -> Result<Self> {
        let mut per_column: Vec<std::vec::IntoIter<Array>> = columns
            .into_iter()
            .map(|c| c.into_chunks().into_iter())
            .collect();
        let mut batches = Vec::with_capacity(lengths.len());
        for &n in lengths {
            let cols = per_column
                .iter_mut()
                .map(|it| {
                    it.next().ok_or_else(|| {
                        InterchangeError::UnsupportedOperation("column chunk count mismatch".into())
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            batches.push(RecordBatch::try_new_with_num_rows(schema.clone(), cols, n)?);
        }
        Ok(Self { schema, batches })
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.schema.len()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    #[inline]
    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Row count of each batch.
    pub fn chunk_lengths(&self) -> Vec<usize> {
        self.batches.iter().map(RecordBatch::num_rows).collect()
    }

    #[inline]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    #[inline]
    pub fn batch(&self, i: usize) -> Option<&RecordBatch> {
        self.batches.get(i)
    }

    pub fn to_batches(&self) -> Vec<RecordBatch> {
        self.batches.clone()
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.field_names()
    }

    /// Column `i` as one chunk per batch.
    pub fn column(&self, i: usize) -> Result<ChunkedArray> {
        let field = self.schema.field(i).cloned().ok_or(InterchangeError::IndexOutOfBounds {
            index: i,
            len: self.schema.len(),
        })?;
        let chunks = self.batches.iter().map(|b| b.columns()[i].clone()).collect();
        ChunkedArray::try_new(chunks, field)
    }

    pub fn column_by_name(&self, name: &str) -> Result<ChunkedArray> {
        let idx = resolve_names(&self.schema, &[name])?;
        self.column(idx[0])
    }

    pub fn columns(&self) -> Result<Vec<ChunkedArray>> {
        (0..self.num_columns()).map(|i| self.column(i)).collect()
    }

    /// Logical values of column `i` in row order.
    pub fn to_flat_values(&self, i: usize) -> Result<Vec<Scalar>> {
        Ok(self.column(i)?.to_scalars())
    }

    /// Merges all batches into one.
    pub fn combine_chunks(&self) -> Result<Self> {
        if self.batches.len() <= 1 {
            return Ok(self.clone());
        }
        let batch = RecordBatch::concat_batches(&self.batches)?;
        Ok(Self {
            schema: self.schema.clone(),
            batches: vec![batch],
        })
    }

    /// The whole table as one batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        match self.batches.len() {
            0 => RecordBatch::new_empty(self.schema.clone()),
            1 => Ok(self.batches[0].clone()),
            _ => RecordBatch::concat_batches(&self.batches),
        }
    }

    /// Zero-copy window of rows `[offset, offset + len)` across batches.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        let total = self.num_rows();
        if offset + len > total {
            return Err(InterchangeError::IndexOutOfBounds {
                index: offset + len,
                len: total,
            });
        }
        let end = offset + len;
        let mut start = 0;
        let mut batches = Vec::new();
        for b in &self.batches {
            let b_end = start + b.num_rows();
            if b_end > offset && start < end {
                let lo = offset.max(start) - start;
                let hi = end.min(b_end) - start;
                batches.push(b.slice(lo, hi - lo)?);
            }
            start = b_end;
            if start >= end {
                break;
            }
        }
        Ok(Self {
            schema: self.schema.clone(),
            batches,
        })
    }

    /// Columns at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Result<Self> {
        let schema = self.schema.project(indices)?;
        let batches = self
            .batches
            .iter()
            .map(|b| b.project(indices))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { schema, batches })
    }

    /// Columns named `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let indices = resolve_names(&self.schema, names)?;
        self.project(&indices)
    }

    /// Inserts `column` at position `i`, rechunked to this table's batch lengths.
    pub fn add_column(&self, i: usize, field: Field, column: ChunkedArray) -> Result<Self> {
        if i > self.num_columns() {
            return Err(InterchangeError::IndexOutOfBounds {
                index: i,
                len: self.num_columns(),
            });
        }
        let chunks = self.fit_column(&field, column)?;
        let mut schema = self.schema.clone();
        schema.fields.insert(i, field.clone());
        let batches = self
            .batches
            .iter()
            .zip(chunks)
            .map(|(b, c)| b.add_column(i, field.clone(), c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { schema, batches })
    }

    pub fn append_column(&self, field: Field, column: ChunkedArray) -> Result<Self> {
        self.add_column(self.num_columns(), field, column)
    }

    /// Replaces the column at position `i`.
    pub fn set_column(&self, i: usize, field: Field, column: ChunkedArray) -> Result<Self> {
        if i >= self.num_columns() {
            return Err(InterchangeError::IndexOutOfBounds {
                index: i,
                len: self.num_columns(),
            });
        }
        let chunks = self.fit_column(&field, column)?;
        let mut schema = self.schema.clone();
        schema.fields[i] = field.clone();
        let batches = self
            .batches
            .iter()
            .zip(chunks)
            .map(|(b, c)| b.set_column(i, field.clone(), c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { schema, batches })
    }

    pub fn remove_column(&self, i: usize) -> Result<Self> {
        if i >= self.num_columns() {
            return Err(InterchangeError::IndexOutOfBounds {
                index: i,
                len: self.num_columns(),
            });
        }
        let mut schema = self.schema.clone();
        schema.fields.remove(i);
        let batches = self
            .batches
            .iter()
            .map(|b| b.remove_column(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { schema, batches })
    }

    pub fn rename_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let schema = renamed(&self.schema, names)?;
        self.clone().with_schema(schema)
    }

    /// Replaces the schema. Types must match; names, nullability and metadata may change.
    pub fn with_schema(self, schema: Schema) -> Result<Self> {
        if !self.schema.is_interchange_compatible(&schema) {
            return Err(InterchangeError::SchemaMismatch(format!(
                "cannot rebind table of [{}] to [{}]",
                type_list(&self.schema),
                type_list(&schema)
            )));
        }
        let batches = self
            .batches
            .into_iter()
            .map(|b| b.with_schema(schema.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { schema, batches })
    }

    /// Casts every batch to `target`.
    pub fn cast(&self, target: &Schema) -> Result<Self> {
        let batches = self
            .batches
            .iter()
            .map(|b| b.cast(target))
            .collect::<Result<Vec<_>>>()?;
        let mut schema = target.clone();
        if schema.metadata.is_empty() {
            schema.metadata = self.schema.metadata.clone();
        }
        Ok(Self { schema, batches })
    }

    /// Redistributes rows into batches of the strategy's size.
    pub fn rechunk(&self, strategy: RechunkStrategy) -> Result<Self> {
        let size = strategy.chunk_size()?;
        self.rechunk_to_lengths(&uniform_lengths(self.num_rows(), size))
    }

    /// Redistributes rows into batches of exactly `lengths`.
    ///
    /// # Errors
    /// `ColumnLengthMismatch` when `lengths` do not sum to `num_rows()`.
    pub fn rechunk_to_lengths(&self, lengths: &[usize]) -> Result<Self> {
        let total = self.num_rows();
        let wanted: usize = lengths.iter().sum();
        if wanted != total {
            return Err(InterchangeError::ColumnLengthMismatch {
                col: 0,
                expected: total,
                found: wanted,
            });
        }
        let columns = self
            .columns()?
            .iter()
            .map(|c| c.rechunk_to_lengths(lengths))
            .collect::<Result<Vec<_>>>()?;
        Self::assemble(self.schema.clone(), columns, lengths)
    }

    /// Pull-based reader over the batches.
    pub fn to_reader(&self) -> BatchReader {
        BatchReader::new(self.schema.clone(), self.batches.clone())
    }

    /// Each batch as a struct array, one chunk per batch.
    pub fn to_struct_array(&self) -> Result<ChunkedArray> {
        let field = Field::new("", DataType::Struct(self.schema.fields.clone()), true);
        let chunks = self
            .batches
            .iter()
            .map(RecordBatch::to_struct_array)
            .collect::<Result<Vec<_>>>()?;
        ChunkedArray::try_new(chunks, field)
    }

    /// Checks `column` against `field` and the row count, then splits it to
    /// this table's batch lengths.
    fn fit_column(&self, field: &Field, column: ChunkedArray) -> Result<Vec<Array>> {
        if *column.data_type() != field.data_type {
            return Err(InterchangeError::TypeMismatch {
                expected: field.data_type.to_string(),
                found: column.data_type().to_string(),
                context: Some(format!("column '{}'", field.name)),
            });
        }
        if column.len() != self.num_rows() {
            return Err(InterchangeError::ColumnLengthMismatch {
                col: self.num_columns(),
                expected: self.num_rows(),
                found: column.len(),
            });
        }
        Ok(column.rechunk_to_lengths(&self.chunk_lengths())?.into_chunks())
    }
}

impl From<RecordBatch> for Table {
    fn from(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema().clone(),
            batches: vec![batch],
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        if self.schema != other.schema || self.num_rows() != other.num_rows() {
            return false;
        }
        (0..self.num_columns()).all(|i| match (self.to_flat_values(i), other.to_flat_values(i)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        })
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut starts = Vec::with_capacity(self.batches.len());
        let mut acc = 0;
        for b in &self.batches {
            starts.push(acc);
            acc += b.num_rows();
        }
        let headers = self.schema.fields.iter().map(|f| f.name.clone()).collect();
        let title = format!("Table ({} batches)", self.batches.len());
        write_grid(f, &title, headers, acc, |row, col| {
            let mut b = 0;
            while row >= starts[b] + self.batches[b].num_rows() {
                b += 1;
            }
            scalar_to_string(&self.batches[b].columns()[col].to_scalar(row - starts[b]))
        })
    }
}
