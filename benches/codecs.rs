use std::hint::black_box;
use std::io::Cursor;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use minarrow_interchange::io::ipc::{IpcFormat, IpcWriteOptions, read_ipc, write_ipc};
use minarrow_interchange::io::parquet::{ParquetFile, ParquetWriteOptions, write_parquet};
use minarrow_interchange::{Array, RechunkStrategy, Table};

const ROWS: [usize; 2] = [10_000, 100_000];

fn make_table(rows: usize) -> Table {
    let ids: Vec<i64> = (0..rows as i64).collect();
    let scores: Vec<Option<f64>> = (0..rows)
        .map(|i| (i % 7 != 0).then_some(i as f64 * 0.5))
        .collect();
    let tags: Vec<String> = (0..rows).map(|i| format!("tag-{}", i % 64)).collect();
    Table::from_arrays(
        &["id", "score", "tag"],
        vec![
            Array::from_slice(&ids),
            Array::from_options(&scores),
            Array::from_strs(&tags),
        ],
    )
    .expect("benchmark table")
    .rechunk(RechunkStrategy::Auto)
    .expect("benchmark rechunk")
}

fn bench_parquet(c: &mut Criterion) {
    let mut group = c.benchmark_group("parquet");
    for rows in ROWS {
        let table = make_table(rows);
        let mut encoded = Vec::new();
        write_parquet(&table, &mut encoded, ParquetWriteOptions::default()).expect("write");
        group.throughput(Throughput::Elements(rows as u64));

        group.bench_with_input(BenchmarkId::new("write", rows), &table, |b, table| {
            b.iter(|| {
                let mut sink = Vec::with_capacity(encoded.len());
                write_parquet(black_box(table), &mut sink, ParquetWriteOptions::default())
                    .expect("write");
                sink
            })
        });
        group.bench_with_input(BenchmarkId::new("read", rows), &encoded, |b, encoded| {
            b.iter(|| {
                let mut file = ParquetFile::open(Cursor::new(black_box(encoded.as_slice())))
                    .expect("open");
                file.read_all().expect("read")
            })
        });
    }
    group.finish();
}

fn bench_ipc(c: &mut Criterion) {
    let mut group = c.benchmark_group("ipc");
    for rows in ROWS {
        let table = make_table(rows);
        group.throughput(Throughput::Elements(rows as u64));
        for format in [IpcFormat::Stream, IpcFormat::File] {
            let options = IpcWriteOptions::default().with_format(format);
            let mut encoded = Vec::new();
            write_ipc(&table, &mut encoded, options).expect("write");

            let label = format!("{format:?}").to_lowercase();
            group.bench_with_input(
                BenchmarkId::new(format!("write_{label}"), rows),
                &table,
                |b, table| {
                    b.iter(|| {
                        let mut sink = Vec::with_capacity(encoded.len());
                        write_ipc(black_box(table), &mut sink, options).expect("write");
                        sink
                    })
                },
            );
            group.bench_with_input(
                BenchmarkId::new(format!("read_{label}"), rows),
                &encoded,
                |b, encoded| {
                    b.iter(|| {
                        read_ipc(Cursor::new(black_box(encoded.as_slice())), format).expect("read")
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_parquet, bench_ipc);
criterion_main!(benches);
