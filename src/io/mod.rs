//! # IO Module - *Codecs for files, streams and object stores*
//!
//! - [`parquet`]: columnar files with row groups, page compression and an
//!   optional embedded logical schema. Async range-request reads live behind
//!   the `async` feature.
//! - [`ipc`]: the length-prefixed record batch wire format, as a stream or as a
//!   random-access file.
//! - [`csv`] and [`json`]: text tables read into a `Table` and written from any
//!   `RecordBatchReader`.
//! - [`avro`]: the schema registry used to resolve Avro writer schemas.
//! - [`compression`]: codecs shared by the Parquet and IPC writers.

use std::io::Write;

pub mod avro;
pub mod compression;
pub mod csv;
pub mod ipc;
pub mod json;
pub mod parquet;
pub(crate) mod text;

/// Tracks the byte position of a `Write` sink, so writers can record offsets
/// without `Seek`.
pub(crate) struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
