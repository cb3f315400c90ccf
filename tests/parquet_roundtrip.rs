//! End-to-end Parquet tests: write a table, reopen it, read it back.

use std::collections::BTreeMap;
use std::io::Cursor;

use minarrow_interchange::io::compression::Compression;
use minarrow_interchange::io::parquet::{
    ARROW_SCHEMA_KEY, ParquetFile, ParquetReadOptions, ParquetWriteOptions, ParquetWriter,
    write_parquet,
};
use minarrow_interchange::{Array, DataType, Field, InterchangeError, Schema, Table, TimeUnit};

fn write(table: &Table, options: ParquetWriteOptions) -> Vec<u8> {
    let mut buf = Vec::new();
    write_parquet(table, &mut buf, options).unwrap();
    buf
}

fn open(buf: Vec<u8>) -> ParquetFile<Cursor<Vec<u8>>> {
    ParquetFile::open(Cursor::new(buf)).unwrap()
}

fn mixed_table() -> Table {
    let dictionary = Array::try_new_dictionary(
        Array::from_options(&[Some(0i32), Some(1), None, Some(0), Some(1)]),
        Array::from_strs(&["red", "blue"]),
    )
    .unwrap();
    let stamps = Array::from_options(&[Some(0i64), Some(1_000), None, Some(3_000), Some(4_000)])
        .with_data_type(DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())))
        .unwrap();
    let dates = Array::from_options(&[Some(19_000i32), None, Some(19_002), Some(19_003), None])
        .with_data_type(DataType::Date32)
        .unwrap();
    Table::from_arrays(
        &[
            "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64", "flag", "text",
            "large", "bytes", "date", "ts", "dict",
        ],
        vec![
            Array::from_options(&[Some(-1i8), None, Some(3), Some(i8::MIN), Some(i8::MAX)]),
            Array::from_options(&[Some(1i16), Some(2), None, Some(4), Some(5)]),
            Array::from_options(&[None, Some(2i32), Some(3), Some(i32::MIN), Some(i32::MAX)]),
            Array::from_options(&[Some(1i64), Some(-2), Some(3), None, Some(i64::MAX)]),
            Array::from_options(&[Some(0u8), Some(255), None, Some(3), Some(4)]),
            Array::from_options(&[Some(0u16), Some(u16::MAX), Some(2), None, Some(4)]),
            Array::from_options(&[Some(u32::MAX), None, Some(2u32), Some(3), Some(4)]),
            Array::from_options(&[Some(u64::MAX), Some(1u64), None, Some(3), Some(4)]),
            Array::from_options(&[Some(0.5f32), None, Some(-1.25), Some(3.0), Some(4.5)]),
            Array::from_options(&[Some(1.5f64), Some(f64::MAX), None, Some(-0.0), Some(4.0)]),
            Array::from_opt_bools(&[Some(true), Some(false), None, Some(true), Some(true)]),
            Array::from_opt_strs(&[Some("a"), None, Some(""), Some("dddd"), Some("é")]),
            Array::from_large_strs(&["x", "yy", "zzz", "", "w"]),
            Array::from_binary(&[vec![0u8, 1], vec![], vec![0xff], b"ab".to_vec(), b"c".to_vec()]),
            dates,
            stamps,
            dictionary,
        ],
    )
    .unwrap()
}

#[test]
fn hello_world_metadata_without_embedded_schema() {
    let table = Table::from_arrays(
        &["id", "name"],
        vec![
            Array::from_slice(&[1i16, 2, 3, 4]),
            Array::from_strs(&["a", "b", "c", "d"]),
        ],
    )
    .unwrap();
    let options = ParquetWriteOptions::default()
        .with_key_value_metadata(BTreeMap::from([("hello".to_string(), "world".to_string())]))
        .with_skip_arrow_metadata(true);
    let mut file = open(write(&table, options));

    assert_eq!(file.key_value_metadata().get("hello").map(String::as_str), Some("world"));
    assert!(!file.key_value_metadata().contains_key(ARROW_SCHEMA_KEY));
    assert_eq!(file.schema().metadata.get("hello").map(String::as_str), Some("world"));
    assert!(!file.schema().metadata.contains_key(ARROW_SCHEMA_KEY));

    let back = file.read_all().unwrap();
    assert_eq!(back.schema().fields[0].data_type, DataType::Int16);
    assert_eq!(back.schema().fields[1].data_type, DataType::Utf8);
    assert_eq!(back.to_flat_values(0).unwrap(), table.to_flat_values(0).unwrap());
    assert_eq!(back.to_flat_values(1).unwrap(), table.to_flat_values(1).unwrap());
    assert_eq!(back.schema().metadata["hello"], "world");
}

#[test]
fn every_flat_type_round_trips_with_nulls() {
    let table = mixed_table();
    let mut file = open(write(&table, ParquetWriteOptions::default().with_data_page_size(2)));
    let back = file.read_all().unwrap();
    assert_eq!(back.schema().fields, table.schema().fields);
    for i in 0..table.num_columns() {
        assert_eq!(
            back.to_flat_values(i).unwrap(),
            table.to_flat_values(i).unwrap(),
            "column {}",
            table.schema().fields[i].name
        );
    }
}

#[test]
fn embedded_schema_restores_large_and_dictionary_types() {
    let table = mixed_table();
    let mut file = open(write(&table, ParquetWriteOptions::default()));
    let back = file.read_all().unwrap();
    let field = |name: &str| back.schema().field_with_name(name).unwrap().data_type.clone();
    assert_eq!(field("large"), DataType::LargeUtf8);
    assert_eq!(
        field("dict"),
        DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
    );
    assert_eq!(
        field("ts"),
        DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
    );
}

#[test]
fn without_embedded_schema_types_come_from_annotations() {
    let table = mixed_table();
    let mut file = open(write(
        &table,
        ParquetWriteOptions::default().with_skip_arrow_metadata(true),
    ));
    let back = file.read_all().unwrap();
    let field = |name: &str| back.schema().field_with_name(name).unwrap().data_type.clone();
    assert_eq!(field("u16"), DataType::UInt16);
    assert_eq!(field("date"), DataType::Date32);
    // Large and dictionary layouts are not recorded in the annotations.
    assert_eq!(field("large"), DataType::Utf8);
    assert_eq!(field("dict"), DataType::Utf8);
    assert_eq!(back.to_flat_values(16).unwrap(), table.to_flat_values(16).unwrap());
}

#[test]
fn compressed_files_round_trip() {
    let table = mixed_table();
    let mut codecs = vec![Compression::None];
    if Compression::Zstd.is_available() {
        codecs.push(Compression::Zstd);
    }
    if Compression::Lz4.is_available() {
        codecs.push(Compression::Lz4);
    }
    for codec in codecs {
        let mut file = open(write(
            &table,
            ParquetWriteOptions::default().with_compression(codec),
        ));
        let rg = file.row_group_metadata(0).unwrap();
        assert_eq!(rg.columns[0].compression().unwrap(), codec);
        assert_eq!(file.read_all().unwrap(), table, "{codec:?}");
    }
}

#[test]
fn footer_is_readable_before_any_data() {
    let table = mixed_table();
    let file = open(write(
        &table,
        ParquetWriteOptions::default().with_max_row_group_size(2),
    ));
    assert_eq!(file.num_rows(), 5);
    assert_eq!(file.num_row_groups(), 3);
    let rg = file.row_group_metadata(2).unwrap();
    assert_eq!(rg.num_rows, 1);
    assert_eq!(rg.columns.len(), table.num_columns());
    assert!(file.row_group_metadata(3).is_none());
    assert!(file.metadata().created_by().is_some());
}

#[test]
fn truncated_or_damaged_files_fail_with_corrupt_footer() {
    let buf = write(&mixed_table(), ParquetWriteOptions::default());
    for cut in [1usize, 4, 9, buf.len() - 11] {
        let short = buf[..buf.len() - cut].to_vec();
        assert!(
            matches!(
                ParquetFile::open(Cursor::new(short)),
                Err(InterchangeError::CorruptFooter(_))
            ),
            "cut {cut}"
        );
    }
    let mut bad = buf.clone();
    bad[0] = b'X';
    assert!(matches!(
        ParquetFile::open(Cursor::new(bad)),
        Err(InterchangeError::CorruptFooter(_))
    ));
    assert!(matches!(
        ParquetFile::open(Cursor::new(b"PAR1PAR1".to_vec())),
        Err(InterchangeError::CorruptFooter(_))
    ));
}

#[test]
fn projection_limit_offset_and_batch_size() {
    let table = mixed_table();
    let mut file = open(write(
        &table,
        ParquetWriteOptions::default().with_max_row_group_size(2),
    ));
    let options = ParquetReadOptions::default()
        .with_columns(vec![11, 3])
        .with_offset(1)
        .with_limit(3)
        .with_batch_size(2);
    let got = file.read(options).unwrap();
    assert_eq!(got.column_names(), vec!["text", "i64"]);
    assert_eq!(got.chunk_lengths(), vec![2, 1]);
    assert_eq!(got, table.project(&[11, 3]).unwrap().slice(1, 3).unwrap());

    let past_end = file
        .read(ParquetReadOptions::default().with_offset(10))
        .unwrap();
    assert_eq!(past_end.num_rows(), 0);
    assert_eq!(past_end.num_columns(), table.num_columns());
}

#[test]
fn incremental_writer_and_schema_checks() {
    let schema = Schema::from(vec![Field::new("v", DataType::Int32, false)]);
    let mut writer =
        ParquetWriter::try_new(Vec::new(), schema.clone(), ParquetWriteOptions::default()).unwrap();
    let batch = minarrow_interchange::RecordBatch::try_new(
        schema.clone(),
        vec![Array::from_slice(&[1i32, 2])],
    )
    .unwrap();
    writer.write_batch(&batch).unwrap();
    writer.write_batch(&batch).unwrap();

    let wrong = minarrow_interchange::RecordBatch::from_arrays(&["v"], vec![Array::from_strs(&["x"])])
        .unwrap();
    assert!(matches!(
        writer.write_batch(&wrong),
        Err(InterchangeError::SchemaMismatch(_))
    ));
}

#[test]
fn non_nullable_column_with_nulls_is_rejected() {
    let schema = Schema::from(vec![Field::new("v", DataType::Int32, false)]);
    let batch = minarrow_interchange::RecordBatch::try_new(
        schema.clone(),
        vec![Array::from_options(&[Some(1i32), None])],
    )
    .unwrap();
    let mut writer =
        ParquetWriter::try_new(Vec::new(), schema, ParquetWriteOptions::default()).unwrap();
    assert!(matches!(
        writer.write_batch(&batch),
        Err(InterchangeError::SchemaMismatch(_))
    ));
}

#[test]
fn required_columns_round_trip() {
    let schema = Schema::from(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
    ]);
    let batch = minarrow_interchange::RecordBatch::try_new(
        schema.clone(),
        vec![Array::from_slice(&[7i64, 8, 9]), Array::from_strs(&["p", "q", "r"])],
    )
    .unwrap();
    let table = Table::from(batch);
    let mut file = open(write(&table, ParquetWriteOptions::default().with_skip_arrow_metadata(true)));
    let back = file.read_all().unwrap();
    assert!(!back.schema().fields[0].nullable);
    assert_eq!(back, table);
}

#[test]
fn file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.parquet");
    let table = mixed_table();
    write_parquet(
        &table,
        std::fs::File::create(&path).unwrap(),
        ParquetWriteOptions::default(),
    )
    .unwrap();
    let mut file = ParquetFile::open(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(file.read_all().unwrap(), table);
}

fn nested_table() -> Table {
    use minarrow_interchange::{fixed_size_list_array, list_array, map_array, struct_array};

    // [[1, 2], null, [], [3], [null, 5]]
    let list = list_array(
        &Array::from_slice(&[0i32, 2, 2, 2, 3, 5]),
        &Array::from_options(&[Some(1i64), Some(2), Some(3), None, Some(5)]),
        None,
        Some(&Array::from_bools(&[true, false, true, true, true])),
    )
    .unwrap();
    let large = list_array(
        &Array::from_slice(&[0i64, 1, 3, 3, 4, 4]),
        &Array::from_strs(&["a", "bb", "ccc", "d"]),
        None,
        None,
    )
    .unwrap();
    let fixed = fixed_size_list_array(
        &Array::from_options(&[Some(1.0f32), Some(2.0), None, Some(4.0), Some(5.0), Some(6.0), Some(7.0), Some(8.0), Some(9.0), Some(10.0)]),
        2,
        None,
        Some(&Array::from_bools(&[true, true, false, true, true])),
    )
    .unwrap();
    let point = struct_array(
        &[
            Array::from_slice(&[1i32, 2, 3, 4, 5]),
            Array::from_opt_strs(&[Some("p"), None, Some("r"), Some("s"), None]),
        ],
        &[
            Field::new("x", DataType::Int32, false),
            Field::new("label", DataType::Utf8, true),
        ],
        Some(&Array::from_bools(&[true, true, false, true, true])),
    )
    .unwrap();
    let map = map_array(
        &Array::from_slice(&[0i32, 2, 2, 3, 3, 4]),
        &Array::from_strs(&["k1", "k2", "k3", "k4"]),
        &Array::from_options(&[Some(10i32), None, Some(30), Some(40)]),
        false,
        Some(&Array::from_bools(&[true, true, true, false, true])),
    )
    .unwrap();
    // A list of structs holding a list: [[{tags: [x]}, {tags: []}], [], null, [{tags: null}], [{tags: [y, z]}]]
    let tags = list_array(
        &Array::from_slice(&[0i32, 1, 1, 1, 3]),
        &Array::from_strs(&["x", "y", "z"]),
        None,
        Some(&Array::from_bools(&[true, true, false, true])),
    )
    .unwrap();
    let tag_field = Field::new("tags", tags.data_type().clone(), true);
    let records = struct_array(&[tags], &[tag_field], None).unwrap();
    let deep = list_array(
        &Array::from_slice(&[0i32, 2, 2, 2, 3, 4]),
        &records,
        None,
        Some(&Array::from_bools(&[true, true, false, true, true])),
    )
    .unwrap();
    Table::from_arrays(
        &["list", "large", "fixed", "point", "map", "deep"],
        vec![list, large, fixed, point, map, deep],
    )
    .unwrap()
}

#[test]
fn nested_columns_round_trip() {
    let table = nested_table();
    for page in [1usize, 2, 1024] {
        let mut file = open(write(&table, ParquetWriteOptions::default().with_data_page_size(page)));
        // One leaf chunk per primitive field.
        assert_eq!(file.row_group_metadata(0).unwrap().columns.len(), 8);
        let back = file.read_all().unwrap();
        assert_eq!(back.schema().fields, table.schema().fields);
        for i in 0..table.num_columns() {
            assert_eq!(
                back.to_flat_values(i).unwrap(),
                table.to_flat_values(i).unwrap(),
                "column {} with pages of {page}",
                table.schema().fields[i].name
            );
        }
    }
}

#[test]
fn nested_columns_across_row_groups_and_windows() {
    let table = nested_table();
    let mut file = open(write(
        &table,
        ParquetWriteOptions::default()
            .with_max_row_group_size(2)
            .with_compression(Compression::None),
    ));
    assert_eq!(file.num_row_groups(), 3);
    assert_eq!(file.read_all().unwrap(), table);
    let got = file
        .read(
            ParquetReadOptions::default()
                .with_columns(vec![5, 2])
                .with_offset(1)
                .with_limit(3),
        )
        .unwrap();
    assert_eq!(got, table.project(&[5, 2]).unwrap().slice(1, 3).unwrap());
}

#[test]
fn nested_types_without_embedded_schema_follow_the_groups() {
    let table = nested_table();
    let mut file = open(write(
        &table,
        ParquetWriteOptions::default().with_skip_arrow_metadata(true),
    ));
    let back = file.read_all().unwrap();
    let field = |name: &str| back.schema().field_with_name(name).unwrap().data_type.clone();
    assert_eq!(field("list"), DataType::list(DataType::Int64));
    // Large and fixed-size lists are stored as plain lists.
    assert_eq!(field("large"), DataType::list(DataType::Utf8));
    assert_eq!(field("fixed"), DataType::list(DataType::Float32));
    assert!(matches!(field("point"), DataType::Struct(ref f) if f.len() == 2));
    assert!(matches!(field("map"), DataType::Map(..)));
    for i in [0, 3] {
        assert_eq!(back.to_flat_values(i).unwrap(), table.to_flat_values(i).unwrap());
    }
}

#[test]
fn null_in_a_required_nested_field_is_rejected() {
    use minarrow_interchange::struct_array;

    let point = struct_array(
        &[Array::from_options(&[Some(1i32), None])],
        &[Field::new("x", DataType::Int32, false)],
        None,
    )
    .unwrap();
    let table = Table::from_arrays(&["point"], vec![point]).unwrap();
    let mut writer = ParquetWriter::try_new(
        Vec::new(),
        table.schema().clone(),
        ParquetWriteOptions::default(),
    )
    .unwrap();
    assert!(matches!(
        writer.write_table(&table),
        Err(InterchangeError::SchemaMismatch(_))
    ));
}
