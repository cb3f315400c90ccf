//! # **JSON** - *Line-delimited and array JSON tables*
//!
//! [`read_json`] takes a sequence of JSON objects, one row each, separated by
//! whitespace (newline-delimited JSON). A top-level array of objects is read
//! the same way, so the output of [`write_json`] reads back.
//!
//! - Without a schema, types are inferred from up to `max_records` rows:
//!   booleans, `Int64` (widened to `Float64` by any fractional number), `Utf8`,
//!   lists of the merged item type and structs of the merged keys. Conflicting
//!   values fall back to `Utf8`, which stores the JSON text of non-strings.
//!   A key that only ever holds `null` reads as `Null`. Columns appear in the
//!   order their keys are first seen, taking each object's keys in sorted order.
//! - Keys missing from a row are null; keys not in the schema are ignored.
//! - Temporal values are read from ISO text or raw integers and written as ISO
//!   text. Decimals and binary travel as strings, binary in base64. Maps are
//!   objects keyed by the text form of their keys; a null map value is always
//!   written, since the key itself is data.
//!
//! ## Example
//! ```rust
//! use minarrow_interchange::io::json::{JsonReadOptions, JsonWriteOptions, read_json, write_ndjson};
//!
//! let text = "{\"id\":1,\"tags\":[\"a\"]}\n{\"id\":2,\"tags\":null}\n";
//! let table = read_json(text.as_bytes(), None, &JsonReadOptions::default()).unwrap();
//! assert_eq!(table.shape(), (2, 2));
//!
//! let mut out = Vec::new();
//! write_ndjson(table.to_reader(), &mut out, &JsonWriteOptions::default()).unwrap();
//! assert_eq!(String::from_utf8(out).unwrap(), "{\"id\":1,\"tags\":[\"a\"]}\n{\"id\":2}\n");
//! ```

use std::io::{ErrorKind, Read, Write};

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::Scalar;
use crate::ffi::stream::RecordBatchReader;
use crate::io::text::{format_text, merge_inferred, parse_text};
use crate::structs::builders::array_from_scalars;
use crate::{DataType, Field, RecordBatch, Schema, Table};

/// Options for [`read_json`] and [`infer_json_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonReadOptions {
    /// Rows per record batch of the resulting table.
    pub batch_size: usize,
    /// Rows sampled for inference. `None` samples every row.
    pub max_records: Option<usize>,
}

impl Default for JsonReadOptions {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            max_records: None,
        }
    }
}

impl JsonReadOptions {
    /// Clamped to at least one row.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_records(mut self, max_records: Option<usize>) -> Self {
        self.max_records = max_records;
        self
    }
}

/// Options for [`write_json`] and [`write_ndjson`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonWriteOptions {
    /// Write `"key": null` for null values instead of leaving the key out.
    pub explicit_nulls: bool,
}

impl JsonWriteOptions {
    pub fn with_explicit_nulls(mut self, explicit_nulls: bool) -> Self {
        self.explicit_nulls = explicit_nulls;
        self
    }
}

fn invalid(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> InterchangeError {
    InterchangeError::Io(std::io::Error::new(ErrorKind::InvalidData, err))
}

/// Rows of `source`: each top-level object, or each object of a top-level array.
fn rows<R: Read>(source: R) -> impl Iterator<Item = Result<Map<String, Value>>> {
    serde_json::Deserializer::from_reader(source)
        .into_iter::<Value>()
        .flat_map(|value| -> Vec<Result<Value>> {
            match value {
                Ok(Value::Array(items)) => items.into_iter().map(Ok).collect(),
                Ok(other) => vec![Ok(other)],
                Err(e) if e.is_io() => vec![Err(InterchangeError::Io(e.into()))],
                Err(e) => vec![Err(invalid(e))],
            }
        })
        .map(|value| match value? {
            Value::Object(row) => Ok(row),
            other => Err(invalid(format!("expected a JSON object per row, found {other}"))),
        })
}

fn infer_value(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::Null,
        Value::Bool(_) => DataType::Boolean,
        Value::Number(n) if n.is_i64() => DataType::Int64,
        Value::Number(_) => DataType::Float64,
        Value::String(_) => DataType::Utf8,
        Value::Array(items) => DataType::list(
            items
                .iter()
                .map(infer_value)
                .fold(DataType::Null, merge_inferred),
        ),
        Value::Object(entries) => DataType::Struct(
            entries
                .iter()
                .map(|(k, v)| Field::new(k.clone(), infer_value(v), true))
                .collect(),
        ),
    }
}

/// Infers a schema from the rows of `source`. All fields are nullable.
///
/// # Errors
/// `Io(InvalidData)` for malformed JSON or rows that are not objects.
pub fn infer_json_schema<R: Read>(source: R, options: &JsonReadOptions) -> Result<Schema> {
    let mut fields: Vec<Field> = Vec::new();
    let limit = options.max_records.unwrap_or(usize::MAX);
    for row in rows(source).take(limit) {
        for (key, value) in row? {
            let inferred = infer_value(&value);
            match fields.iter_mut().find(|f| f.name == key) {
                Some(field) => {
                    field.data_type = merge_inferred(field.data_type.clone(), inferred);
                }
                None => fields.push(Field::new(key, inferred, true)),
            }
        }
    }
    Ok(Schema::from(fields))
}

/// Logical value of `value` as `data_type`, or `None` when it does not fit.
fn value_to_scalar(value: &Value, data_type: &DataType) -> Option<Scalar> {
    if value.is_null() {
        return Some(Scalar::Null);
    }
    match (data_type, value) {
        (DataType::Dictionary(_, inner), v) => value_to_scalar(v, inner),
        (DataType::Boolean, Value::Bool(b)) => Some(Scalar::Boolean(*b)),
        (
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64,
            Value::Number(n),
        ) => n.as_u64().map(Scalar::UInt),
        (t, Value::Number(n)) if t.is_integer() || is_raw_temporal(t) => n.as_i64().map(Scalar::Int),
        (DataType::Float16 | DataType::Float32 | DataType::Float64, Value::Number(n)) => {
            n.as_f64().map(Scalar::Float)
        }
        (
            DataType::Decimal32(..)
            | DataType::Decimal64(..)
            | DataType::Decimal128(..)
            | DataType::Decimal256(..),
            Value::Number(n),
        ) => parse_text(&n.to_string(), data_type),
        (DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View, Value::String(s)) => {
            Some(Scalar::Utf8(s.clone()))
        }
        (DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View, other) => {
            Some(Scalar::Utf8(other.to_string()))
        }
        (
            DataType::List(item) | DataType::LargeList(item) | DataType::FixedSizeList(item, _),
            Value::Array(items),
        ) => {
            if matches!(data_type, DataType::FixedSizeList(_, n) if items.len() != *n as usize) {
                return None;
            }
            items
                .iter()
                .map(|v| value_to_scalar(v, &item.data_type))
                .collect::<Option<Vec<_>>>()
                .map(Scalar::List)
        }
        (DataType::Struct(fields), Value::Object(entries)) => fields
            .iter()
            .map(|f| value_to_scalar(entries.get(&f.name).unwrap_or(&Value::Null), &f.data_type))
            .collect::<Option<Vec<_>>>()
            .map(Scalar::Struct),
        (DataType::Map(entries_field, _), Value::Object(entries)) => {
            let DataType::Struct(kv) = &entries_field.data_type else {
                return None;
            };
            let [key_field, value_field] = kv.as_slice() else {
                return None;
            };
            entries
                .iter()
                .map(|(k, v)| {
                    let key = parse_text(k, &key_field.data_type)?;
                    let item = value_to_scalar(v, &value_field.data_type)?;
                    Some(Scalar::Struct(vec![key, item]))
                })
                .collect::<Option<Vec<_>>>()
                .map(Scalar::List)
        }
        (_, Value::String(s)) => parse_text(s, data_type),
        _ => None,
    }
}

/// Temporal types carried as a bare integer.
fn is_raw_temporal(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Date32
            | DataType::Date64
            | DataType::Time32(_)
            | DataType::Time64(_)
            | DataType::Timestamp(..)
            | DataType::Duration(_)
    )
}

/// Reads JSON rows into a table of `batch_size`-row batches.
///
/// With `schema = None` the input is buffered once and its schema inferred
/// first.
///
/// # Errors
/// - `Io(InvalidData)` for malformed JSON or rows that are not objects.
/// - `SchemaMismatch` when a value does not fit its column's type, naming the
///   column and the row.
pub fn read_json<R: Read>(mut source: R, schema: Option<Schema>, options: &JsonReadOptions) -> Result<Table> {
    let (schema, batches) = match schema {
        Some(schema) => {
            let batches = read_batches(rows(source), &schema, options)?;
            (schema, batches)
        }
        None => {
            let mut bytes = Vec::new();
            source.read_to_end(&mut bytes)?;
            let schema = infer_json_schema(bytes.as_slice(), options)?;
            let batches = read_batches(rows(bytes.as_slice()), &schema, options)?;
            (schema, batches)
        }
    };
    debug!(
        rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
        batches = batches.len(),
        columns = schema.len(),
        "JSON read"
    );
    Table::try_new(schema, batches)
}

fn read_batches(
    rows: impl Iterator<Item = Result<Map<String, Value>>>,
    schema: &Schema,
    options: &JsonReadOptions,
) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    let mut columns: Vec<Vec<Scalar>> = vec![Vec::new(); schema.len()];
    let mut pending = 0usize;
    for (index, row) in rows.enumerate() {
        let row = row?;
        for (column, field) in columns.iter_mut().zip(&schema.fields) {
            let value = row.get(&field.name).unwrap_or(&Value::Null);
            let scalar = value_to_scalar(value, &field.data_type).ok_or_else(|| {
                InterchangeError::SchemaMismatch(format!(
                    "column '{}' row {index}: cannot read {value} as {}",
                    field.name, field.data_type
                ))
            })?;
            column.push(scalar);
        }
        pending += 1;
        if pending == options.batch_size {
            batches.push(build_batch(schema, &mut columns, pending)?);
            pending = 0;
        }
    }
    if pending > 0 {
        batches.push(build_batch(schema, &mut columns, pending)?);
    }
    Ok(batches)
}

fn build_batch(schema: &Schema, columns: &mut [Vec<Scalar>], rows: usize) -> Result<RecordBatch> {
    let arrays = columns
        .iter_mut()
        .zip(&schema.fields)
        .map(|(column, field)| {
            array_from_scalars(&field.data_type, &std::mem::take(column)).map_err(|e| {
                InterchangeError::SchemaMismatch(format!("column '{}': {e}", field.name))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::try_new_with_num_rows(schema.clone(), arrays, rows)
}

/// JSON form of a value of `data_type`.
fn scalar_to_json(value: &Scalar, data_type: &DataType, options: &JsonWriteOptions) -> Result<Value> {
    let json = match (data_type, value) {
        (_, Scalar::Null) => Value::Null,
        (DataType::Dictionary(_, inner), v) => return scalar_to_json(v, inner, options),
        (_, Scalar::Boolean(b)) => Value::Bool(*b),
        (t, Scalar::Int(v)) if !is_raw_temporal(t) || matches!(t, DataType::Duration(_)) => {
            Value::from(*v)
        }
        (_, Scalar::UInt(v)) => Value::from(*v),
        (_, Scalar::Float(v)) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        (_, Scalar::Utf8(s)) => Value::String(s.clone()),
        (
            DataType::List(item) | DataType::LargeList(item) | DataType::FixedSizeList(item, _),
            Scalar::List(items),
        ) => Value::Array(
            items
                .iter()
                .map(|v| scalar_to_json(v, &item.data_type, options))
                .collect::<Result<_>>()?,
        ),
        (DataType::Map(entries_field, _), Scalar::List(entries)) => {
            let DataType::Struct(kv) = &entries_field.data_type else {
                return Err(InterchangeError::type_mismatch("map entries struct", &entries_field.data_type));
            };
            let [key_field, value_field] = kv.as_slice() else {
                return Err(InterchangeError::type_mismatch("map entries struct", &entries_field.data_type));
            };
            let mut object = Map::new();
            for entry in entries {
                let Scalar::Struct(pair) = entry else { continue };
                let [key, item] = pair.as_slice() else { continue };
                let item = scalar_to_json(item, &value_field.data_type, options)?;
                object.insert(format_text(key, &key_field.data_type)?, item);
            }
            Value::Object(object)
        }
        (DataType::Struct(fields), Scalar::Struct(values)) => {
            Value::Object(object_of(fields, values.iter(), options)?)
        }
        (t, v) => Value::String(format_text(v, t)?),
    };
    Ok(json)
}

/// Object of named values, dropping nulls unless `explicit_nulls`.
fn object_of<'a>(
    fields: &[Field],
    values: impl Iterator<Item = &'a Scalar>,
    options: &JsonWriteOptions,
) -> Result<Map<String, Value>> {
    let mut object = Map::new();
    for (field, value) in fields.iter().zip(values) {
        let json = scalar_to_json(value, &field.data_type, options)?;
        if options.explicit_nulls || !json.is_null() {
            object.insert(field.name.clone(), json);
        }
    }
    Ok(object)
}

/// Calls `emit` with each row of `reader` as a JSON object.
fn for_each_row<R: RecordBatchReader>(
    reader: R,
    options: &JsonWriteOptions,
    mut emit: impl FnMut(Value) -> Result<()>,
) -> Result<usize> {
    let schema = reader.schema();
    let mut rows = 0usize;
    for batch in reader {
        let batch = batch?;
        if !batch.schema().is_interchange_compatible(&schema) {
            return Err(InterchangeError::SchemaMismatch(format!(
                "batch columns [{}] do not match the reader schema [{schema}]",
                batch.schema()
            )));
        }
        for i in 0..batch.num_rows() {
            let values: Vec<Scalar> = batch.columns().iter().map(|c| c.to_scalar(i)).collect();
            emit(Value::Object(object_of(&schema.fields, values.iter(), options)?))?;
        }
        rows += batch.num_rows();
    }
    Ok(rows)
}

fn write_value<W: Write>(sink: &mut W, value: &Value) -> Result<()> {
    serde_json::to_writer(sink, value).map_err(|e| InterchangeError::Io(e.into()))
}

/// Writes every row of `reader` as one JSON array of objects.
///
/// # Errors
/// `SchemaMismatch` when a batch's columns differ from the reader's schema.
pub fn write_json<R, W>(reader: R, mut sink: W, options: &JsonWriteOptions) -> Result<()>
where
    R: RecordBatchReader,
    W: Write,
{
    sink.write_all(b"[")?;
    let mut first = true;
    let rows = for_each_row(reader, options, |row| {
        if !first {
            sink.write_all(b",")?;
        }
        first = false;
        write_value(&mut sink, &row)
    })?;
    sink.write_all(b"]")?;
    sink.flush()?;
    debug!(rows, "JSON array written");
    Ok(())
}

/// Writes every row of `reader` as one JSON object per line.
///
/// # Errors
/// `SchemaMismatch` when a batch's columns differ from the reader's schema.
pub fn write_ndjson<R, W>(reader: R, mut sink: W, options: &JsonWriteOptions) -> Result<()>
where
    R: RecordBatchReader,
    W: Write,
{
    let rows = for_each_row(reader, options, |row| {
        write_value(&mut sink, &row)?;
        sink.write_all(b"\n")?;
        Ok(())
    })?;
    sink.flush()?;
    debug!(rows, "NDJSON written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Array, TimeUnit};

    #[test]
    fn inference_merges_rows_and_nested_keys() {
        let text = r#"
            {"a": 1, "b": {"x": true}, "c": [1, 2]}
            {"a": 2.5, "b": {"y": "s"}, "d": null}
            {"a": "three", "c": [null, 4.5]}
        "#;
        let schema = infer_json_schema(text.as_bytes(), &JsonReadOptions::default()).unwrap();
        assert_eq!(schema.field_names(), vec!["a", "b", "c", "d"]);
        assert_eq!(schema.fields[0].data_type, DataType::Utf8);
        assert_eq!(
            schema.fields[1].data_type,
            DataType::Struct(vec![
                Field::new("x", DataType::Boolean, true),
                Field::new("y", DataType::Utf8, true),
            ])
        );
        assert_eq!(schema.fields[2].data_type, DataType::list(DataType::Float64));
        assert_eq!(schema.fields[3].data_type, DataType::Null);

        let table = read_json(text.as_bytes(), Some(schema), &JsonReadOptions::default()).unwrap();
        let a = table.to_flat_values(0).unwrap();
        assert_eq!(a, vec![Scalar::from("1"), Scalar::from("2.5"), Scalar::from("three")]);
        assert_eq!(
            table.to_flat_values(1).unwrap()[1],
            Scalar::Struct(vec![Scalar::Null, Scalar::from("s")])
        );
        assert!(table.to_flat_values(1).unwrap()[2].is_null());
    }

    #[test]
    fn array_form_reads_back() {
        let table = Table::from_arrays(
            &["id", "name"],
            vec![
                Array::from_slice(&[1i64, 2]),
                Array::from_opt_strs(&[Some("a"), None]),
            ],
        )
        .unwrap();
        let mut out = Vec::new();
        let options = JsonWriteOptions::default().with_explicit_nulls(true);
        write_json(table.to_reader(), &mut out, &options).unwrap();
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            r#"[{"id":1,"name":"a"},{"id":2,"name":null}]"#
        );
        let back = read_json(out.as_slice(), None, &JsonReadOptions::default()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn temporal_and_map_values_use_text_keys() {
        let ts = DataType::Timestamp(TimeUnit::Second, Some("UTC".into()));
        let map = DataType::map(DataType::Utf8, DataType::Int64, false);
        let schema = Schema::from(vec![
            Field::new("at", ts.clone(), true),
            Field::new("m", map.clone(), true),
        ]);
        let text = r#"{"at": "2023-11-14T22:13:20Z", "m": {"k": 1}}
{"at": 0, "m": {}}"#;
        let table = read_json(text.as_bytes(), Some(schema), &JsonReadOptions::default()).unwrap();
        assert_eq!(
            table.to_flat_values(0).unwrap(),
            vec![Scalar::Int(1_700_000_000), Scalar::Int(0)]
        );
        let mut out = Vec::new();
        write_ndjson(table.to_reader(), &mut out, &JsonWriteOptions::default()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"at\":\"2023-11-14T22:13:20Z\",\"m\":{\"k\":1}}\n{\"at\":\"1970-01-01T00:00:00Z\",\"m\":{}}\n"
        );
    }

    #[test]
    fn mismatched_values_name_column_and_row() {
        let schema = Schema::from(vec![Field::new("n", DataType::Int32, true)]);
        let err = read_json(
            "{\"n\": 1}\n{\"n\": [1]}".as_bytes(),
            Some(schema),
            &JsonReadOptions::default(),
        )
        .unwrap_err();
        match err {
            InterchangeError::SchemaMismatch(msg) => assert!(msg.contains("column 'n' row 1"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
        let err = read_json("[1, 2]".as_bytes(), None, &JsonReadOptions::default()).unwrap_err();
        assert!(matches!(err, InterchangeError::Io(e) if e.kind() == ErrorKind::InvalidData));
        let err = read_json("{\"n\": ".as_bytes(), None, &JsonReadOptions::default()).unwrap_err();
        assert!(matches!(err, InterchangeError::Io(_)));
    }
}
