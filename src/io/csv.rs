//! # **CSV** - *Delimited text tables*
//!
//! Reads delimited text into a [`Table`] and writes any [`RecordBatchReader`]
//! back out. Record splitting, quoting and escaping come from the `csv` crate;
//! cell values use the text forms described in the crate's text helpers
//! (ISO dates and timestamps, base64 binary, decimals at their scale).
//!
//! - Without a schema, column types are inferred from up to `max_records` rows:
//!   `Boolean`, `Int64`, `Float64`, `Date32`, `Timestamp(µs)` or `Utf8`, widened
//!   as rows disagree. Columns with no values read as `Utf8`.
//! - Files without a header name their columns `col0`, `col1`, ...
//! - Nested columns have no text form and are refused on both sides.
//!
//! ## Example
//! ```rust
//! use minarrow_interchange::io::csv::{CsvReadOptions, CsvWriteOptions, read_csv, write_csv};
//!
//! let text = "id,name\n1,a\n2,\n";
//! let table = read_csv(text.as_bytes(), None, &CsvReadOptions::default()).unwrap();
//! assert_eq!(table.shape(), (2, 2));
//!
//! let mut out = Vec::new();
//! write_csv(table.to_reader(), &mut out, &CsvWriteOptions::default()).unwrap();
//! assert_eq!(String::from_utf8(out).unwrap(), text);
//! ```

use std::io::{ErrorKind, Read, Write};

use tracing::debug;

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::Scalar;
use crate::ffi::stream::RecordBatchReader;
use crate::io::text::{format_text, infer_text, merge_inferred, parse_text};
use crate::structs::builders::array_from_scalars;
use crate::{DataType, Field, RecordBatch, Schema, Table};

/// Options for [`read_csv`] and [`infer_csv_schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReadOptions {
    /// First record names the columns.
    pub has_header: bool,
    pub delimiter: u8,
    pub quote: u8,
    /// Escape character inside quoted fields. `None` means doubled quotes.
    pub escape: Option<u8>,
    /// Lines starting with this byte are skipped.
    pub comment: Option<u8>,
    /// Cells read as null, compared exactly.
    pub nulls: Vec<String>,
    /// Rows per record batch of the resulting table.
    pub batch_size: usize,
    /// Rows sampled for inference. `None` samples every row.
    pub max_records: Option<usize>,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            quote: b'"',
            escape: None,
            comment: None,
            nulls: ["", "NA", "null", "NULL"].map(String::from).to_vec(),
            batch_size: 8192,
            max_records: None,
        }
    }
}

impl CsvReadOptions {
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_escape(mut self, escape: Option<u8>) -> Self {
        self.escape = escape;
        self
    }

    pub fn with_comment(mut self, comment: Option<u8>) -> Self {
        self.comment = comment;
        self
    }

    pub fn with_nulls<S: Into<String>>(mut self, nulls: impl IntoIterator<Item = S>) -> Self {
        self.nulls = nulls.into_iter().map(Into::into).collect();
        self
    }

    /// Clamped to at least one row.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_records(mut self, max_records: Option<usize>) -> Self {
        self.max_records = max_records;
        self
    }

    fn reader<R: Read>(&self, source: R) -> csv::Reader<R> {
        csv::ReaderBuilder::new()
            .has_headers(self.has_header)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .escape(self.escape)
            .double_quote(self.escape.is_none())
            .comment(self.comment)
            .from_reader(source)
    }

    fn is_null(&self, cell: &str) -> bool {
        self.nulls.iter().any(|n| n == cell)
    }
}

/// Options for [`write_csv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvWriteOptions {
    /// Write the column names first.
    pub header: bool,
    pub delimiter: u8,
    pub quote: u8,
    /// Text written for null cells.
    pub null: String,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            header: true,
            delimiter: b',',
            quote: b'"',
            null: String::new(),
        }
    }
}

impl CsvWriteOptions {
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_null(mut self, null: impl Into<String>) -> Self {
        self.null = null.into();
        self
    }
}

/// Malformed records surface as `Io(InvalidData)`; read failures keep their kind.
fn csv_error(err: csv::Error) -> InterchangeError {
    if err.is_io_error() {
        if let csv::ErrorKind::Io(io) = err.into_kind() {
            return InterchangeError::Io(io);
        }
        return InterchangeError::Io(std::io::Error::other("csv I/O failure"));
    }
    InterchangeError::Io(std::io::Error::new(ErrorKind::InvalidData, err))
}

fn column_names(reader: &mut csv::Reader<impl Read>, width: usize) -> Result<Vec<String>> {
    if reader.has_headers() {
        Ok(reader.headers().map_err(csv_error)?.iter().map(str::to_string).collect())
    } else {
        Ok((0..width).map(|i| format!("col{i}")).collect())
    }
}

/// Infers a schema from the records of `source`.
///
/// All fields are nullable. Without a header the column count comes from the
/// first record.
///
/// # Errors
/// `Io(InvalidData)` for malformed or ragged records.
pub fn infer_csv_schema<R: Read>(source: R, options: &CsvReadOptions) -> Result<Schema> {
    let mut reader = options.reader(source);
    let mut types: Vec<DataType> = Vec::new();
    let mut sampled = 0usize;
    let mut record = csv::StringRecord::new();
    while options.max_records.is_none_or(|max| sampled < max)
        && reader.read_record(&mut record).map_err(csv_error)?
    {
        if types.is_empty() {
            types = vec![DataType::Null; record.len()];
        }
        for (slot, cell) in types.iter_mut().zip(record.iter()) {
            if !options.is_null(cell) {
                *slot = merge_inferred(std::mem::replace(slot, DataType::Null), infer_text(cell));
            }
        }
        sampled += 1;
    }
    let names = column_names(&mut reader, types.len())?;
    if types.len() < names.len() {
        types.resize(names.len(), DataType::Null);
    }
    let fields: Vec<Field> = names
        .into_iter()
        .zip(types)
        .map(|(name, t)| {
            let t = if t == DataType::Null { DataType::Utf8 } else { t };
            Field::new(name, t, true)
        })
        .collect();
    Ok(Schema::from(fields))
}

/// Reads delimited text into a table of `batch_size`-row batches.
///
/// With `schema = None` the input is buffered once and its schema inferred
/// first. A given schema must have one field per record column; header names
/// are not compared against it.
///
/// # Errors
/// - `Io(InvalidData)` for malformed or ragged records.
/// - `SchemaMismatch` when a record's width differs from the schema, or a cell
///   does not parse as its column's type. The message names the column and
///   the row.
/// - `UnsupportedOperation` for nested schema fields.
pub fn read_csv<R: Read>(mut source: R, schema: Option<Schema>, options: &CsvReadOptions) -> Result<Table> {
    let (schema, buffered) = match schema {
        Some(schema) => (schema, None),
        None => {
            let mut bytes = Vec::new();
            source.read_to_end(&mut bytes)?;
            (infer_csv_schema(bytes.as_slice(), options)?, Some(bytes))
        }
    };
    if let Some(field) = schema.fields.iter().find(|f| f.data_type.is_nested()) {
        return Err(InterchangeError::UnsupportedOperation(format!(
            "CSV cannot hold nested column '{}' of type {}",
            field.name, field.data_type
        )));
    }
    let batches = match buffered {
        Some(bytes) => read_batches(options.reader(bytes.as_slice()), &schema, options)?,
        None => read_batches(options.reader(source), &schema, options)?,
    };
    debug!(
        rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
        batches = batches.len(),
        columns = schema.len(),
        "CSV read"
    );
    Table::try_new(schema, batches)
}

fn read_batches<R: Read>(
    mut reader: csv::Reader<R>,
    schema: &Schema,
    options: &CsvReadOptions,
) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    let mut columns: Vec<Vec<Scalar>> = vec![Vec::new(); schema.len()];
    let mut record = csv::StringRecord::new();
    let mut row = 0usize;
    while reader.read_record(&mut record).map_err(csv_error)? {
        if record.len() != schema.len() {
            return Err(InterchangeError::SchemaMismatch(format!(
                "row {row} has {} fields, schema has {}",
                record.len(),
                schema.len()
            )));
        }
        for ((column, field), cell) in columns.iter_mut().zip(&schema.fields).zip(record.iter()) {
            let value = if options.is_null(cell) {
                Scalar::Null
            } else {
                parse_text(cell, &field.data_type).ok_or_else(|| {
                    InterchangeError::SchemaMismatch(format!(
                        "column '{}' row {row}: cannot read {cell:?} as {}",
                        field.name, field.data_type
                    ))
                })?
            };
            column.push(value);
        }
        row += 1;
        if columns.first().is_some_and(|c| c.len() >= options.batch_size) {
            batches.push(build_batch(schema, &mut columns, row)?);
        }
    }
    if columns.first().is_some_and(|c| !c.is_empty()) {
        batches.push(build_batch(schema, &mut columns, row)?);
    }
    Ok(batches)
}

/// Drains the column buffers into one batch. `row` is the count read so far,
/// for error messages.
fn build_batch(schema: &Schema, columns: &mut [Vec<Scalar>], row: usize) -> Result<RecordBatch> {
    let first_row = row - columns.first().map_or(0, Vec::len);
    let arrays = columns
        .iter_mut()
        .zip(&schema.fields)
        .map(|(column, field)| {
            array_from_scalars(&field.data_type, &std::mem::take(column)).map_err(|e| {
                InterchangeError::SchemaMismatch(format!(
                    "column '{}' in rows {first_row}..{row}: {e}",
                    field.name
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::try_new(schema.clone(), arrays)
}

/// Writes every batch of `reader` as delimited text.
///
/// # Errors
/// - `UnsupportedOperation` for nested columns, checked before anything is
///   written.
/// - `SchemaMismatch` when a batch's columns differ from the reader's schema.
pub fn write_csv<R, W>(reader: R, sink: W, options: &CsvWriteOptions) -> Result<()>
where
    R: RecordBatchReader,
    W: Write,
{
    let schema = reader.schema();
    if let Some(field) = schema.fields.iter().find(|f| f.data_type.is_nested()) {
        return Err(InterchangeError::UnsupportedOperation(format!(
            "CSV cannot hold nested column '{}' of type {}",
            field.name, field.data_type
        )));
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .from_writer(sink);
    if options.header {
        writer.write_record(schema.field_names()).map_err(csv_error)?;
    }
    let mut rows = 0usize;
    let mut cells = Vec::with_capacity(schema.len());
    for batch in reader {
        let batch = batch?;
        if !batch.schema().is_interchange_compatible(&schema) {
            return Err(InterchangeError::SchemaMismatch(format!(
                "batch columns [{}] do not match the reader schema [{schema}]",
                batch.schema()
            )));
        }
        for i in 0..batch.num_rows() {
            cells.clear();
            for (column, field) in batch.columns().iter().zip(&schema.fields) {
                let cell = match column.to_scalar(i) {
                    Scalar::Null => options.null.clone(),
                    value => format_text(&value, &field.data_type)?,
                };
                cells.push(cell);
            }
            writer.write_record(&cells).map_err(csv_error)?;
        }
        rows += batch.num_rows();
    }
    writer.flush()?;
    debug!(rows, columns = schema.len(), "CSV written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Array, TimeUnit};

    #[test]
    fn inference_widens_and_falls_back_to_text() {
        let text = "a,b,c,d,e\n1,true,2024-01-01,,x\n2.5,false,2024-01-02T10:00:00,,1\n";
        let schema = infer_csv_schema(text.as_bytes(), &CsvReadOptions::default()).unwrap();
        let types: Vec<_> = schema.fields.iter().map(|f| f.data_type.clone()).collect();
        assert_eq!(
            types,
            vec![
                DataType::Float64,
                DataType::Boolean,
                DataType::Timestamp(TimeUnit::Microsecond, None),
                DataType::Utf8,
                DataType::Utf8,
            ]
        );
        let sampled = infer_csv_schema(
            text.as_bytes(),
            &CsvReadOptions::default().with_max_records(Some(1)),
        )
        .unwrap();
        assert_eq!(sampled.fields[0].data_type, DataType::Int64);
        assert_eq!(sampled.fields[2].data_type, DataType::Date32);
    }

    #[test]
    fn headerless_input_names_columns_by_position() {
        let options = CsvReadOptions::default().with_header(false).with_delimiter(b'\t');
        let table = read_csv("1\tx\n2\ty\n".as_bytes(), None, &options).unwrap();
        assert_eq!(table.column_names(), vec!["col0", "col1"]);
        assert_eq!(table.num_rows(), 2);
    }

    #[test]
    fn batches_follow_the_batch_size() {
        let text = "n\n1\n2\n3\n4\n5\n";
        let options = CsvReadOptions::default().with_batch_size(2);
        let table = read_csv(text.as_bytes(), None, &options).unwrap();
        assert_eq!(table.chunk_lengths(), vec![2, 2, 1]);
        assert_eq!(
            table,
            Table::from_arrays(&["n"], vec![Array::from_slice(&[1i64, 2, 3, 4, 5])]).unwrap()
        );
    }

    #[test]
    fn bad_cells_name_column_and_row() {
        let schema = Schema::from(vec![Field::new("n", DataType::Int32, true)]);
        let err = read_csv("n\n1\noops\n".as_bytes(), Some(schema.clone()), &CsvReadOptions::default())
            .unwrap_err();
        match err {
            InterchangeError::SchemaMismatch(msg) => {
                assert!(msg.contains("column 'n' row 1"), "{msg}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let err = read_csv("n\n1\n99999999999\n".as_bytes(), Some(schema), &CsvReadOptions::default())
            .unwrap_err();
        assert!(matches!(err, InterchangeError::SchemaMismatch(_)));
    }

    #[test]
    fn ragged_records_are_invalid_data() {
        let err = read_csv("a,b\n1,2\n3\n".as_bytes(), None, &CsvReadOptions::default()).unwrap_err();
        assert!(matches!(err, InterchangeError::Io(e) if e.kind() == ErrorKind::InvalidData));
    }

    #[test]
    fn nested_columns_are_refused() {
        let table = Table::from_arrays(
            &["l"],
            vec![
                array_from_scalars(
                    &DataType::list(DataType::Int32),
                    &[Scalar::List(vec![Scalar::Int(1)])],
                )
                .unwrap(),
            ],
        )
        .unwrap();
        let mut out = Vec::new();
        let err = write_csv(table.to_reader(), &mut out, &CsvWriteOptions::default()).unwrap_err();
        assert!(matches!(err, InterchangeError::UnsupportedOperation(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn quoting_and_null_text_are_written() {
        let table = Table::from_arrays(
            &["s", "n"],
            vec![
                Array::from_opt_strs(&[Some("a,b"), Some("say \"hi\"")]),
                Array::from_options(&[None, Some(2i64)]),
            ],
        )
        .unwrap();
        let mut out = Vec::new();
        let options = CsvWriteOptions::default().with_null("NULL");
        write_csv(table.to_reader(), &mut out, &options).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "s,n\n\"a,b\",NULL\n\"say \"\"hi\"\"\",2\n");
        let back = read_csv(text.as_bytes(), Some(table.schema().clone()), &CsvReadOptions::default())
            .unwrap();
        assert_eq!(back, table);
    }
}
