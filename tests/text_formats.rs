//! CSV and JSON against the other codecs: text written from a reader, read
//! back into a table, and handed on to Parquet or IPC.

use std::io::Cursor;

use minarrow_interchange::io::csv::{CsvReadOptions, CsvWriteOptions, read_csv, write_csv};
use minarrow_interchange::io::ipc::{IpcFormat, IpcStreamReader, IpcWriteOptions, write_ipc};
use minarrow_interchange::io::json::{
    JsonReadOptions, JsonWriteOptions, infer_json_schema, read_json, write_json, write_ndjson,
};
use minarrow_interchange::io::parquet::{ParquetFile, ParquetWriteOptions, write_parquet};
use minarrow_interchange::{
    Array, DataType, Field, InterchangeError, RecordBatchReader, Scalar, Schema, Table, TimeUnit,
    array_from_scalars,
};

fn flat_table() -> Table {
    let stamps = Array::from_options(&[Some(0i64), Some(1_500), None, Some(-86_400_000)])
        .with_data_type(DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())))
        .unwrap();
    let dates = Array::from_options(&[Some(19_000i32), None, Some(0), Some(-1)])
        .with_data_type(DataType::Date32)
        .unwrap();
    let amounts = array_from_scalars(
        &DataType::Decimal128(12, 3),
        &[
            Scalar::Decimal(1_234_567i128.to_le_bytes().to_vec()),
            Scalar::Null,
            Scalar::Decimal((-5i128).to_le_bytes().to_vec()),
            Scalar::Decimal(0i128.to_le_bytes().to_vec()),
        ],
    )
    .unwrap();
    let colours = Array::try_new_dictionary(
        Array::from_options(&[Some(1i32), Some(0), None, Some(1)]),
        Array::from_strs(&["red", "blue"]),
    )
    .unwrap();
    Table::from_arrays(
        &["i8", "u64", "f32", "f64", "flag", "text", "bytes", "date", "ts", "amount", "colour"],
        vec![
            Array::from_options(&[Some(-1i8), None, Some(i8::MIN), Some(i8::MAX)]),
            Array::from_options(&[Some(u64::MAX), Some(0u64), None, Some(7)]),
            Array::from_options(&[Some(0.5f32), None, Some(-1.25), Some(3.0)]),
            Array::from_options(&[Some(1.5f64), Some(f64::MAX), None, Some(-0.1)]),
            Array::from_opt_bools(&[Some(true), Some(false), None, Some(true)]),
            Array::from_opt_strs(&[Some("plain"), Some(""), None, Some("a,\"quoted\"\nline")]),
            Array::from_binary(&[vec![0u8, 1], vec![], vec![0xff], b"ab".to_vec()]),
            dates,
            stamps,
            amounts,
            colours,
        ],
    )
    .unwrap()
}

fn nested_table() -> Table {
    let ids = DataType::list(DataType::Int32);
    let point = DataType::Struct(vec![
        Field::new("x", DataType::Float64, true),
        Field::new("label", DataType::Utf8, true),
    ]);
    let attrs = DataType::map(DataType::Utf8, DataType::Int64, false);
    let entry = |k: &str, v: Option<i64>| {
        Scalar::Struct(vec![Scalar::from(k), v.map_or(Scalar::Null, Scalar::Int)])
    };
    Table::from_arrays(
        &["ids", "point", "attrs"],
        vec![
            array_from_scalars(
                &ids,
                &[
                    Scalar::List(vec![Scalar::Int(1), Scalar::Null, Scalar::Int(3)]),
                    Scalar::Null,
                    Scalar::List(vec![]),
                ],
            )
            .unwrap(),
            array_from_scalars(
                &point,
                &[
                    Scalar::Struct(vec![Scalar::Float(0.25), Scalar::from("origin")]),
                    Scalar::Struct(vec![Scalar::Null, Scalar::from("unset")]),
                    Scalar::Null,
                ],
            )
            .unwrap(),
            array_from_scalars(
                &attrs,
                &[
                    Scalar::List(vec![entry("a", Some(1)), entry("b", None)]),
                    Scalar::List(vec![]),
                    Scalar::Null,
                ],
            )
            .unwrap(),
        ],
    )
    .unwrap()
}

#[test]
fn csv_round_trips_every_flat_type_under_a_schema() {
    let table = flat_table();
    let mut text = Vec::new();
    write_csv(table.to_reader(), &mut text, &CsvWriteOptions::default().with_null("NULL")).unwrap();

    let options = CsvReadOptions::default().with_nulls(["NULL"]).with_batch_size(3);
    let back = read_csv(text.as_slice(), Some(table.schema().clone()), &options).unwrap();
    assert_eq!(back.chunk_lengths(), vec![3, 1]);
    assert_eq!(back, table);
}

#[test]
fn csv_text_uses_iso_dates_and_scaled_decimals() {
    let table = flat_table().select(&["date", "ts", "amount"]).unwrap();
    let mut text = Vec::new();
    write_csv(table.to_reader(), &mut text, &CsvWriteOptions::default()).unwrap();
    assert_eq!(
        String::from_utf8(text).unwrap(),
        "date,ts,amount\n\
         2022-01-08,1970-01-01T00:00:00Z,1234.567\n\
         ,1970-01-01T00:00:01.500Z,\n\
         1970-01-01,,-0.005\n\
         1969-12-31,1969-12-31T00:00:00Z,0.000\n"
    );
}

#[test]
fn csv_flows_into_parquet_and_back_out() {
    let source = "city,population,founded\nOslo,709037,1040-01-01\nBergen,,1070-01-01\n";
    let table = read_csv(source.as_bytes(), None, &CsvReadOptions::default()).unwrap();
    assert_eq!(
        table.schema().fields.iter().map(|f| f.data_type.clone()).collect::<Vec<_>>(),
        vec![DataType::Utf8, DataType::Int64, DataType::Date32]
    );

    let mut parquet = Vec::new();
    write_parquet(&table, &mut parquet, ParquetWriteOptions::default()).unwrap();
    let mut file = ParquetFile::open(Cursor::new(parquet)).unwrap();
    let read = file.read_all().unwrap();
    assert_eq!(read, table);

    let mut out = Vec::new();
    write_csv(read.to_reader(), &mut out, &CsvWriteOptions::default()).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), source);
}

#[test]
fn ipc_stream_reader_writes_straight_to_text() {
    let table = flat_table().select(&["i8", "text", "colour"]).unwrap();
    let mut ipc = Vec::new();
    write_ipc(&table, &mut ipc, IpcWriteOptions::default().with_format(IpcFormat::Stream)).unwrap();

    let reader = IpcStreamReader::try_new(Cursor::new(ipc.clone())).unwrap();
    let mut csv = Vec::new();
    write_csv(reader, &mut csv, &CsvWriteOptions::default().with_null("NULL")).unwrap();
    let options = CsvReadOptions::default().with_nulls(["NULL"]);
    assert_eq!(read_csv(csv.as_slice(), Some(table.schema().clone()), &options).unwrap(), table);

    let reader = IpcStreamReader::try_new(Cursor::new(ipc)).unwrap();
    let schema = reader.schema();
    let mut json = Vec::new();
    write_ndjson(reader, &mut json, &JsonWriteOptions::default()).unwrap();
    assert_eq!(read_json(json.as_slice(), Some(schema), &JsonReadOptions::default()).unwrap(), table);
}

#[test]
fn json_round_trips_nested_columns() {
    let table = nested_table();
    for explicit_nulls in [false, true] {
        let options = JsonWriteOptions::default().with_explicit_nulls(explicit_nulls);
        let mut lines = Vec::new();
        write_ndjson(table.to_reader(), &mut lines, &options).unwrap();
        let back = read_json(lines.as_slice(), Some(table.schema().clone()), &JsonReadOptions::default())
            .unwrap();
        assert_eq!(back, table);

        let mut array = Vec::new();
        write_json(table.to_reader(), &mut array, &options).unwrap();
        let back = read_json(array.as_slice(), Some(table.schema().clone()), &JsonReadOptions::default())
            .unwrap();
        assert_eq!(back, table);
    }
}

#[test]
fn json_text_of_nested_rows() {
    let mut lines = Vec::new();
    write_ndjson(nested_table().to_reader(), &mut lines, &JsonWriteOptions::default()).unwrap();
    let text = String::from_utf8(lines).unwrap();
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec![
            r#"{"attrs":{"a":1,"b":null},"ids":[1,null,3],"point":{"label":"origin","x":0.25}}"#,
            r#"{"attrs":{},"point":{"label":"unset"}}"#,
            r#"{"ids":[]}"#,
        ]
    );
}

#[test]
fn inferred_json_reads_into_parquet() {
    let text = r#"{"id": 1, "tags": ["x", "y"], "meta": {"ok": true}}
{"id": 2, "tags": [], "meta": {"ok": false, "note": "late"}}
{"id": 3}"#;
    let schema = infer_json_schema(text.as_bytes(), &JsonReadOptions::default()).unwrap();
    assert_eq!(schema.field_names(), vec!["id", "meta", "tags"]);
    let table = read_json(text.as_bytes(), None, &JsonReadOptions::default().with_batch_size(2)).unwrap();
    assert_eq!(table.schema(), &schema);
    assert_eq!(table.chunk_lengths(), vec![2, 1]);

    let mut parquet = Vec::new();
    write_parquet(&table, &mut parquet, ParquetWriteOptions::default()).unwrap();
    let read = ParquetFile::open(Cursor::new(parquet)).unwrap().read_all().unwrap();
    assert_eq!(read, table);
}

#[test]
fn schema_width_mismatch_is_reported() {
    let schema = Schema::from(vec![Field::new("only", DataType::Utf8, true)]);
    let err = read_csv("a,b\n1,2\n".as_bytes(), Some(schema), &CsvReadOptions::default()).unwrap_err();
    assert!(matches!(err, InterchangeError::SchemaMismatch(_)));
}
