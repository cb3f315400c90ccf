//! # IPC Module - *Streaming record-batch wire format*
//!
//! The Arrow IPC format: record batches framed as length-prefixed messages whose
//! metadata is the Arrow `Message` flatbuffer, in two flavours:
//!
//! - **Stream**: schema message, record batch messages, end-of-stream marker.
//!   Needs only `Write` to produce and `Read` to consume.
//! - **File**: `ARROW1` magic, the stream, then a footer with the schema and the
//!   position of every batch, so [`IpcFileReader`] can read batches at random.
//!
//! Dictionary-encoded columns send their values in `DictionaryBatch` messages
//! ahead of the batches that use them.
//!
//! Buffers may be compressed one at a time with LZ4 (frame format) or Zstd.
//! Each compressed buffer is prefixed with its uncompressed length as an
//! `i64`; `-1` marks a buffer stored raw because compressing it did not help.
//!
//! ## Example
//! ```rust
//! use std::io::Cursor;
//! use minarrow_interchange::{Array, RecordBatch, Table};
//! use minarrow_interchange::io::ipc::{IpcFormat, IpcWriteOptions, read_ipc, write_ipc};
//!
//! let batch = RecordBatch::from_arrays(&["x"], vec![Array::from_slice(&[1i32, 2, 3])]).unwrap();
//! let table = Table::from(batch);
//!
//! let mut buf = Cursor::new(Vec::new());
//! write_ipc(&table, &mut buf, IpcWriteOptions::default().with_format(IpcFormat::File)).unwrap();
//! buf.set_position(0);
//! assert_eq!(read_ipc(buf, IpcFormat::File).unwrap(), table);
//! ```

pub mod format;
pub mod message;
pub mod reader;
pub mod writer;

pub use reader::{IpcFileReader, IpcStreamReader, read_ipc};
pub use writer::{IpcWriter, WriterState, write_ipc};

use crate::io::compression::Compression;

/// Container flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpcFormat {
    File,
    #[default]
    Stream,
}

/// Options for [`IpcWriter`] and [`write_ipc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpcWriteOptions {
    pub format: IpcFormat,
    /// `None`, `Lz4` or `Zstd`.
    pub compression: Compression,
}

impl IpcWriteOptions {
    pub fn with_format(mut self, format: IpcFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}
