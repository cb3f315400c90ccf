//! IPC stream and file round trips over nested and sliced data.

use std::collections::BTreeMap;
use std::io::Cursor;

use minarrow_interchange::io::compression::Compression;
use minarrow_interchange::io::ipc::{
    IpcFileReader, IpcFormat, IpcStreamReader, IpcWriteOptions, IpcWriter, WriterState, read_ipc,
    write_ipc,
};
use minarrow_interchange::{
    Array, DataType, Field, InterchangeError, RecordBatch, RecordBatchReader, Schema, Table,
    list_array, struct_array,
};

fn nested_table() -> Table {
    let values = Array::from_options(&[Some(1i32), Some(2), None, Some(4), Some(5), Some(6)]);
    let lists = list_array(&Array::from_slice(&[0i32, 2, 2, 5, 6]), &values, None, None).unwrap();
    let points = struct_array(
        &[
            Array::from_slice(&[1.0f64, 2.0, 3.0, 4.0]),
            Array::from_opt_strs(&[Some("p"), None, Some("r"), Some("s")]),
        ],
        &[
            Field::new("x", DataType::Float64, true),
            Field::new("label", DataType::Utf8, true),
        ],
        None,
    )
    .unwrap();
    let batch = RecordBatch::from_arrays(
        &["id", "lists", "points", "views"],
        vec![
            Array::from_options(&[Some(10u64), None, Some(30), Some(40)]),
            lists,
            points,
            Array::from_str_views(&[Some("short"), Some("a string longer than twelve"), None, Some("")]),
        ],
    )
    .unwrap()
    .with_metadata(BTreeMap::from([("origin".to_string(), "ipc-test".to_string())]));
    Table::from_batches(vec![batch.clone(), batch.slice(1, 3).unwrap()], None).unwrap()
}

fn codecs() -> Vec<Compression> {
    [Compression::None, Compression::Lz4, Compression::Zstd]
        .into_iter()
        .filter(|c| c.is_available())
        .collect()
}

#[test]
fn stream_round_trip_keeps_batches_and_metadata() {
    let table = nested_table();
    for codec in codecs() {
        let mut buf = Vec::new();
        write_ipc(&table, &mut buf, IpcWriteOptions::default().with_compression(codec)).unwrap();
        let back = read_ipc(Cursor::new(buf), IpcFormat::Stream).unwrap();
        assert_eq!(back, table, "{codec:?}");
        assert_eq!(back.chunk_lengths(), vec![4, 3]);
        assert_eq!(back.schema().metadata["origin"], "ipc-test");
    }
}

#[test]
fn file_round_trip_with_random_access() {
    let table = nested_table();
    for codec in codecs() {
        let mut buf = Vec::new();
        write_ipc(
            &table,
            &mut buf,
            IpcWriteOptions::default()
                .with_format(IpcFormat::File)
                .with_compression(codec),
        )
        .unwrap();
        assert_eq!(&buf[..6], b"ARROW1");
        assert_eq!(&buf[buf.len() - 6..], b"ARROW1");

        let mut reader = IpcFileReader::try_new(Cursor::new(buf)).unwrap();
        assert_eq!(reader.schema(), table.schema());
        assert_eq!(reader.num_batches(), 2);
        assert_eq!(reader.read_batch(1).unwrap(), table.batches()[1]);
        assert_eq!(reader.read_all().unwrap(), table);
    }
}

#[test]
fn sliced_columns_are_written_by_value() {
    let table = nested_table().slice(2, 4).unwrap();
    let mut buf = Vec::new();
    write_ipc(&table, &mut buf, IpcWriteOptions::default()).unwrap();
    let back = read_ipc(Cursor::new(buf), IpcFormat::Stream).unwrap();
    assert_eq!(back, table);
    for i in 0..table.num_columns() {
        assert_eq!(back.to_flat_values(i).unwrap(), table.to_flat_values(i).unwrap());
    }
}

#[test]
fn incremental_writer_rejects_foreign_batches() {
    let table = nested_table();
    let mut writer =
        IpcWriter::try_new(Vec::new(), table.schema().clone(), IpcWriteOptions::default()).unwrap();
    writer.write_batch(&table.batches()[0]).unwrap();
    assert_eq!(writer.state(), WriterState::SchemaDone);

    let other = RecordBatch::from_arrays(&["id"], vec![Array::from_slice(&[1u64])]).unwrap();
    assert!(matches!(
        writer.write_batch(&other),
        Err(InterchangeError::SchemaMismatch(_))
    ));
    // A rejected batch writes nothing, so the stream stays usable.
    writer.write_batch(&table.batches()[1]).unwrap();
    writer.finish().unwrap();
    assert_eq!(writer.state(), WriterState::Closed);

    let reader = IpcStreamReader::try_new(Cursor::new(writer.into_inner())).unwrap();
    assert_eq!(reader.read_all().unwrap(), table);
}

#[test]
fn empty_table_round_trips() {
    let schema = Schema::from(vec![Field::new("x", DataType::Int8, true)]);
    let table = Table::empty(schema.clone());
    for format in [IpcFormat::Stream, IpcFormat::File] {
        let mut buf = Vec::new();
        write_ipc(&table, &mut buf, IpcWriteOptions::default().with_format(format)).unwrap();
        let back = read_ipc(Cursor::new(buf), format).unwrap();
        assert_eq!(back.schema(), &schema);
        assert_eq!(back.num_rows(), 0);
    }
}

#[test]
fn snappy_is_not_an_ipc_codec() {
    let table = nested_table();
    let err = write_ipc(
        &table,
        Vec::new(),
        IpcWriteOptions::default().with_compression(Compression::Snappy),
    )
    .unwrap_err();
    assert!(matches!(err, InterchangeError::UnsupportedOperation(_)));
}
