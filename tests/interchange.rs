//! Capsule exchange, slicing and rechunking across the public surface.

use std::collections::BTreeMap;

use minarrow_interchange::ffi::capsule::{export_array, export_schema, export_stream};
use minarrow_interchange::{
    Array, ArrowExportable, BoxError, ChunkedArray, DataType, ErrorKind, Field, InterchangeError,
    RecordBatch, RechunkStrategy, Scalar, Schema, SchemaCapsule, StreamCapsule, Table,
    fixed_size_list_array, import_from_capsule, list_array,
};

fn sample_table() -> Table {
    let batch = RecordBatch::from_arrays(
        &["n", "s"],
        vec![
            Array::from_options(&[Some(1i32), None, Some(3), Some(4), Some(5)]),
            Array::from_opt_strs(&[Some("a"), Some("b"), None, Some("d"), Some("e")]),
        ],
    )
    .unwrap()
    .with_metadata(BTreeMap::from([("source".to_string(), "unit".to_string())]));
    Table::from_batches(vec![batch.slice(0, 2).unwrap(), batch.slice(2, 3).unwrap()], None)
        .unwrap()
}

#[test]
fn slices_share_storage_and_stay_independent() {
    let base = Array::from_slice(&[10i64, 20, 30, 40, 50]);
    let head = base.slice(0, 2);
    let tail = base.slice(3, 2);
    assert!(head.buffers()[0].shares_storage(&base.buffers()[0]));
    assert!(tail.buffers()[0].shares_storage(&base.buffers()[0]));
    assert_eq!(tail.offset(), 3);
    assert_eq!(tail.values::<i64>().unwrap(), &[40, 50]);
    assert_eq!(head.values::<i64>().unwrap(), &[10, 20]);

    let nested = tail.slice(1, 1);
    assert_eq!(nested.offset(), 4);
    assert_eq!(nested.to_scalar(0), Scalar::Int(50));

    drop(base);
    drop(head);
    assert_eq!(tail.buffers()[0].strong_count(), 2);
    assert_eq!(nested.values::<i64>().unwrap(), &[50]);
}

#[test]
fn list_offsets_invert_list_array() {
    let offsets = Array::from_slice(&[0i32, 1, 1, 4]);
    let values = Array::from_strs(&["a", "b", "c", "d"]);
    let list = list_array(&offsets, &values, None, None).unwrap();
    assert_eq!(list.list_offsets(true).unwrap(), offsets);

    let window = list.slice(1, 2);
    assert_eq!(window.list_offsets(false).unwrap(), Array::from_slice(&[1i32, 1, 4]));
    let logical = window.list_offsets(true).unwrap();
    assert_eq!(logical, Array::from_slice(&[0i32, 0, 3]));
    let rebuilt = list_array(&logical, &window.list_flatten().unwrap(), None, None).unwrap();
    assert_eq!(rebuilt, window);
}

#[test]
fn fixed_size_list_mask_marks_nulls() {
    let values = Array::from_slice(&[1i8, 2, 3, 4, 5, 6]);
    let mask = Array::from_bools(&[false, true, false]);
    let lists = fixed_size_list_array(&values, 2, None, Some(&mask)).unwrap();
    assert_eq!(lists.len(), 3);
    assert!(lists.is_null(1));
    assert_eq!(lists.null_count(), 1);
    assert_eq!(
        lists.to_scalar(2),
        Scalar::List(vec![Scalar::Int(5), Scalar::Int(6)])
    );
    assert!(fixed_size_list_array(&values, 4, None, None).is_err());
}

#[test]
fn array_capsules_round_trip_and_cast_on_request() {
    let array = Array::from_opt_strs(&[Some("x"), None, Some("zz")]);
    let (a, s) = export_array(&array, None).unwrap();
    let (field, back) = import_from_capsule(&mut (s, a)).unwrap();
    assert_eq!(field.data_type, DataType::Utf8);
    assert_eq!(back, array);

    let requested = export_schema(&DataType::LargeUtf8).unwrap();
    let (a, s) = export_array(&array, Some(&requested)).unwrap();
    let (_, widened) = import_from_capsule(&mut (s, a)).unwrap();
    assert_eq!(widened.data_type(), &DataType::LargeUtf8);
    assert_eq!(widened.to_scalars(), array.to_scalars());

    let impossible = export_schema(&DataType::Int32).unwrap();
    let err = export_array(&array, Some(&impossible)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedCast);
}

#[test]
fn table_stream_keeps_metadata_across_re_export() {
    let table = sample_table();
    let once = Table::from_arrow(&table).unwrap();
    let twice = Table::from_arrow(&once).unwrap();
    assert_eq!(twice, table);
    assert_eq!(twice.schema().metadata["source"], "unit");
    assert_eq!(twice.chunk_lengths(), vec![2, 3]);
}

#[test]
fn dropping_a_stream_mid_way_releases_every_buffer() {
    let values = Array::from_slice(&[1u32, 2, 3, 4, 5, 6]);
    let shared = values.buffers()[0].clone();
    let chunked =
        ChunkedArray::from_arrays(vec![values.slice(0, 2), values.slice(2, 2), values.slice(4, 2)])
            .unwrap();
    drop(values);
    let baseline = shared.strong_count();

    let mut capsule: StreamCapsule = export_stream(&chunked, None).unwrap();
    assert!(shared.strong_count() > baseline);
    let mut reader = import_from_capsule(&mut capsule).unwrap();
    assert!(capsule.is_released());

    let first = reader.next().unwrap().unwrap();
    assert_eq!(first.to_scalars(), vec![Scalar::UInt(1), Scalar::UInt(2)]);
    drop(reader);
    drop(first);
    assert_eq!(shared.strong_count(), baseline);
}

#[test]
fn unconsumed_capsules_release_on_drop() {
    let values = Array::from_slice(&[7i16, 8]);
    let shared = values.buffers()[0].clone();
    let baseline = shared.strong_count();
    let pair = export_array(&values, None).unwrap();
    assert!(shared.strong_count() > baseline);
    drop(pair);
    assert_eq!(shared.strong_count(), baseline);
}

#[derive(Debug, thiserror::Error)]
#[error("producer failed: {reason}")]
struct ProducerError {
    reason: String,
}

struct FailingProducer;

impl ArrowExportable for FailingProducer {
    fn arrow_c_schema(&self) -> Result<SchemaCapsule, BoxError> {
        Err(Box::new(ProducerError {
            reason: "disk on fire".into(),
        }))
    }

    fn arrow_c_stream(&self, _requested: Option<&SchemaCapsule>) -> Result<StreamCapsule, BoxError> {
        Err(Box::new(ProducerError {
            reason: "no stream today".into(),
        }))
    }
}

#[test]
fn producer_errors_reach_the_consumer_unchanged() {
    let err = Field::from_arrow(&FailingProducer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ForeignError);
    assert_eq!(err.to_string(), "producer failed: disk on fire");
    assert_eq!(
        err.downcast_foreign::<ProducerError>().map(|e| e.reason.as_str()),
        Some("disk on fire")
    );

    let err = Table::from_arrow(&FailingProducer).unwrap_err();
    let foreign = err.into_foreign().unwrap();
    assert!(foreign.downcast_ref::<ProducerError>().is_some());

    // No array export, so the import falls back to the failing stream.
    let err = Array::from_arrow(&FailingProducer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ForeignError);
    assert_eq!(err.to_string(), "producer failed: no stream today");
}

#[test]
fn rechunk_preserves_content_and_lengths() {
    let table = sample_table();
    for size in [1usize, 2, 3, 4, 5, 100] {
        let rechunked = table.rechunk(RechunkStrategy::Count(size)).unwrap();
        assert_eq!(rechunked, table);
        assert_eq!(rechunked.chunk_lengths().iter().sum::<usize>(), table.num_rows());
        assert!(rechunked.chunk_lengths().iter().all(|&n| n <= size));
        assert_eq!(rechunked.schema(), table.schema());
    }
    assert!(matches!(
        table.rechunk(RechunkStrategy::Count(0)),
        Err(InterchangeError::UnsupportedOperation(_))
    ));

    let column = table.column(1).unwrap();
    let rechunked = column.rechunk(RechunkStrategy::Count(4)).unwrap();
    assert_eq!(rechunked.chunk_lengths(), vec![4, 1]);
    assert_eq!(rechunked.to_scalars(), column.to_scalars());
}

#[test]
fn schema_capsule_round_trip_keeps_field_metadata() {
    let schema = Schema::new(
        vec![
            Field::new("a", DataType::Timestamp(Default::default(), Some("UTC".into())), false)
                .with_metadata([("unit", "ms")]),
            Field::new("b", DataType::list(DataType::Float32), true),
        ],
        BTreeMap::from([("k".to_string(), "v".to_string())]),
    );
    assert_eq!(Schema::from_arrow(&schema).unwrap(), schema);
}
