//! # Parquet Module - *Columnar files with row groups*
//!
//! File layout: `PAR1`, the column chunk pages of every row group, a thrift
//! compact `FileMetaData` footer, its 4-byte length and a closing `PAR1`.
//!
//! ## Writing
//! [`write_parquet`] and [`ParquetWriter`] write tables of any nesting: lists
//! and maps become `LIST` / `MAP` groups, structs plain groups, each primitive
//! leaf its own column chunk. Values are PLAIN, repetition and definition
//! levels and dictionary indices use the RLE / bit-packing hybrid, dictionary
//! arrays get a dictionary page. The logical schema is embedded under
//! `"ARROW:schema"` unless [`ParquetWriteOptions::skip_arrow_metadata`] is set.
//! The footer is written last, so a failed write never leaves a valid file.
//!
//! ## Reading
//! [`ParquetFile::open`] parses the footer only. [`ParquetFile::read`] decodes
//! the selected row groups and columns. With the `async` feature,
//! [`read_async`] fetches column chunks concurrently from an [`ObjectStore`].
//!
//! ## Example
//! ```rust
//! use std::collections::BTreeMap;
//! use std::io::Cursor;
//! use minarrow_interchange::{Array, Table};
//! use minarrow_interchange::io::parquet::{ParquetFile, ParquetWriteOptions, write_parquet};
//!
//! let table = Table::from_arrays(&["id"], vec![Array::from_slice(&[1i64, 2, 3])]).unwrap();
//! let mut buf = Vec::new();
//! let options = ParquetWriteOptions::default()
//!     .with_key_value_metadata(BTreeMap::from([("hello".to_string(), "world".to_string())]));
//! write_parquet(&table, &mut buf, options).unwrap();
//!
//! let mut file = ParquetFile::open(Cursor::new(buf)).unwrap();
//! assert_eq!(file.num_rows(), 3);
//! assert_eq!(file.schema().metadata["hello"], "world");
//! let back = file.read_all().unwrap();
//! assert_eq!(back.schema().fields, table.schema().fields);
//! assert_eq!(back.to_flat_values(0).unwrap(), table.to_flat_values(0).unwrap());
//! ```

use std::collections::BTreeMap;

use crate::io::compression::Compression;

pub(crate) mod encoding;
pub(crate) mod levels;
pub mod metadata;
pub mod reader;
pub(crate) mod thrift;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_reader;
#[cfg(feature = "async")]
pub mod object_store;

pub use metadata::{
    ARROW_SCHEMA_KEY, ColumnChunkMetaData, ParquetMetadata, RowGroupMetaData,
};
pub use reader::ParquetFile;
pub use writer::{ParquetWriter, write_parquet};

#[cfg(feature = "async")]
pub use self::async_reader::{AsyncReadOptions, read_async};
#[cfg(feature = "async")]
pub use self::object_store::{InMemoryStore, LocalFileSystem, ObjectMeta, ObjectStore};
#[cfg(feature = "object_store")]
pub use self::object_store::ObjectStoreAdapter;

/// Leading and trailing file magic.
pub const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

pub const DEFAULT_MAX_ROW_GROUP_SIZE: usize = 1024 * 1024;
pub const DEFAULT_DATA_PAGE_SIZE: usize = 32 * 1024;

/// Options for [`write_parquet`] and [`ParquetWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetWriteOptions {
    pub compression: Compression,
    /// Written to the footer on top of the schema's own metadata.
    pub key_value_metadata: BTreeMap<String, String>,
    /// Leave out the `"ARROW:schema"` entry.
    pub skip_arrow_metadata: bool,
    /// Rows per row group; larger batches are split.
    pub max_row_group_size: usize,
    /// Rows per data page.
    pub data_page_size: usize,
}

impl Default for ParquetWriteOptions {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            key_value_metadata: BTreeMap::new(),
            skip_arrow_metadata: false,
            max_row_group_size: DEFAULT_MAX_ROW_GROUP_SIZE,
            data_page_size: DEFAULT_DATA_PAGE_SIZE,
        }
    }
}

impl ParquetWriteOptions {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_key_value_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.key_value_metadata = metadata;
        self
    }

    pub fn with_skip_arrow_metadata(mut self, skip: bool) -> Self {
        self.skip_arrow_metadata = skip;
        self
    }

    pub fn with_max_row_group_size(mut self, rows: usize) -> Self {
        self.max_row_group_size = rows;
        self
    }

    pub fn with_data_page_size(mut self, rows: usize) -> Self {
        self.data_page_size = rows;
        self
    }
}

/// Selection applied by [`ParquetFile::read`].
///
/// Row groups and columns are indices into the file. `offset` and `limit`
/// count rows across the selected row groups, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParquetReadOptions {
    /// Rows per output batch. `None` keeps one batch per row group.
    pub batch_size: Option<usize>,
    pub row_groups: Option<Vec<usize>>,
    pub columns: Option<Vec<usize>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ParquetReadOptions {
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = Some(rows);
        self
    }

    pub fn with_row_groups(mut self, row_groups: Vec<usize>) -> Self {
        self.row_groups = Some(row_groups);
        self
    }

    pub fn with_columns(mut self, columns: Vec<usize>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}
