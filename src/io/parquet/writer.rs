//! # Parquet writer
//!
//! Writes tables as one row group per input batch (split at
//! `max_row_group_size`), with v1 data pages of `data_page_size` rows.
//! Nested columns are shredded into one column chunk per leaf, see
//! [`levels`](crate::io::parquet::levels).
//!
//! Each column chunk is:
//! - an optional dictionary page (PLAIN values) for dictionary arrays,
//! - data pages holding repetition levels (leaves under a list), definition
//!   levels (leaves with an optional or repeated ancestor) and then PLAIN
//!   values or RLE_DICTIONARY indices, the whole page body compressed.
//!
//! The footer is only written by [`ParquetWriter::finish`] after every page
//! succeeded. A writer that failed refuses further calls.

use std::collections::BTreeMap;
use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, trace};

use crate::enums::error::{InterchangeError, Result};
use crate::io::CountingWriter;
use crate::io::compression::{Compression, compress};
use crate::io::ipc::message::schema_to_bytes;
use crate::io::parquet::encoding::{
    bit_width, encode_levels, encode_plain, encode_plain_at, encode_rle,
};
use crate::io::parquet::levels::{ColumnLayout, LeafColumn, LeafLevels, leaf_arrays, shred};
use crate::io::parquet::metadata::{
    ARROW_SCHEMA_KEY, ColumnChunkMetaData, DataPageHeader, DictionaryPageHeader, Encoding,
    FileMetaData, PageHeader, PageType, RowGroupMetaData, SchemaElement,
};
use crate::io::parquet::{PARQUET_MAGIC, ParquetWriteOptions};
use crate::kernels::cast::decode_dictionary;
use crate::structs::record_batch::type_list;
use crate::traits::concatenate::compact;
use crate::{Array, RecordBatch, Schema, Table};

const CREATED_BY: &str = concat!("minarrow-interchange version ", env!("CARGO_PKG_VERSION"));

/// Incremental Parquet writer over any `Write` sink.
///
/// Offsets are tracked by counting written bytes, so no `Seek` is needed.
pub struct ParquetWriter<W: Write> {
    sink: CountingWriter<W>,
    schema: Schema,
    layout: ColumnLayout,
    elements: Vec<SchemaElement>,
    options: ParquetWriteOptions,
    row_groups: Vec<RowGroupMetaData>,
    num_rows: i64,
    started: bool,
    closed: bool,
}

impl<W: Write> ParquetWriter<W> {
    /// Creates a writer for batches of `schema`.
    ///
    /// # Errors
    /// - `UnsupportedOperation` for structs without fields, or zero-sized row
    ///   groups or pages.
    /// - `Compression` when the codec is not compiled in.
    pub fn try_new(sink: W, schema: Schema, options: ParquetWriteOptions) -> Result<Self> {
        if !options.compression.is_available() {
            return Err(InterchangeError::Compression(format!(
                "{} support is not enabled",
                options.compression
            )));
        }
        if options.max_row_group_size == 0 || options.data_page_size == 0 {
            return Err(InterchangeError::UnsupportedOperation(
                "row group and page sizes must be greater than 0".into(),
            ));
        }
        let (layout, elements) = ColumnLayout::for_schema(&schema)?;
        Ok(Self {
            sink: CountingWriter::new(sink),
            schema,
            layout,
            elements,
            options,
            row_groups: Vec::new(),
            num_rows: 0,
            started: false,
            closed: false,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Row groups written so far.
    pub fn num_row_groups(&self) -> usize {
        self.row_groups.len()
    }

    /// Writes `batch` as one or more row groups.
    ///
    /// # Errors
    /// `SchemaMismatch` when the batch's column types differ from the writer's
    /// schema; nothing is written in that case.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.ensure_open()?;
        if !batch.schema().is_interchange_compatible(&self.schema) {
            return Err(InterchangeError::SchemaMismatch(format!(
                "batch columns [{}] do not match the writer schema [{}]",
                type_list(batch.schema()),
                type_list(&self.schema)
            )));
        }
        let result = self.write_batch_inner(batch);
        self.poison_on_err(result)
    }

    pub fn write_table(&mut self, table: &Table) -> Result<()> {
        for batch in table.batches() {
            self.write_batch(batch)?;
        }
        Ok(())
    }

    /// Writes the footer and trailing magic.
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = self.finish_inner();
        self.poison_on_err(result)?;
        self.closed = true;
        Ok(())
    }

    /// Returns the sink. Call [`ParquetWriter::finish`] first.
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(InterchangeError::UnsupportedOperation(
                "parquet writer is closed or failed earlier".into(),
            ));
        }
        Ok(())
    }

    fn poison_on_err(&mut self, result: Result<()>) -> Result<()> {
        if result.is_err() {
            self.closed = true;
        }
        result
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.sink.write_all(PARQUET_MAGIC)?;
            self.started = true;
        }
        Ok(())
    }

    fn write_batch_inner(&mut self, batch: &RecordBatch) -> Result<()> {
        self.start()?;
        let total = batch.num_rows();
        let mut offset = 0;
        while offset < total {
            let len = self.options.max_row_group_size.min(total - offset);
            self.write_row_group(&batch.slice(offset, len)?)?;
            offset += len;
        }
        Ok(())
    }

    fn write_row_group(&mut self, batch: &RecordBatch) -> Result<()> {
        // Shred every column before the first page goes out.
        let mut levels = vec![LeafLevels::default(); self.layout.leaves.len()];
        let mut arrays = Vec::with_capacity(self.layout.leaves.len());
        for (node, array) in self.layout.fields.iter().zip(batch.columns()) {
            shred(node, array, &mut levels)?;
            leaf_arrays(node, array, &mut arrays);
        }
        let mut columns = Vec::with_capacity(arrays.len());
        for (i, (array, levels)) in arrays.iter().zip(&levels).enumerate() {
            let column = self.layout.leaves[i].clone();
            columns.push(self.write_column_chunk(array, &column, levels)?);
        }
        let total_byte_size = columns.iter().map(|c| c.total_uncompressed_size).sum();
        self.row_groups.push(RowGroupMetaData {
            columns,
            total_byte_size,
            num_rows: batch.num_rows() as i64,
        });
        self.num_rows += batch.num_rows() as i64;
        debug!(
            row_group = self.row_groups.len() - 1,
            rows = batch.num_rows(),
            "parquet row group written"
        );
        Ok(())
    }

    fn write_column_chunk(
        &mut self,
        array: &Array,
        column: &LeafColumn,
        levels: &LeafLevels,
    ) -> Result<ColumnChunkMetaData> {
        let leaf = &column.leaf;
        let codec = self.options.compression;
        let start = self.sink.position();
        let mut sizes = (0i64, 0i64);
        let mut encodings = vec![Encoding::Plain, Encoding::Rle];

        // Dictionaries whose values hold nulls cannot become a dictionary page.
        let (values, dictionary) = match array.dictionary() {
            Some(dict) if dict.null_count() == 0 => (array.clone(), Some(compact(dict)?)),
            Some(_) => (decode_dictionary(array)?, None),
            None => (array.clone(), None),
        };

        let mut dictionary_page_offset = None;
        if let Some(dict) = &dictionary {
            dictionary_page_offset = Some(start as i64);
            let mut body = Vec::new();
            encode_plain(dict, leaf.physical, &mut body)?;
            let header = PageHeader {
                page_type: PageType::DictionaryPage,
                uncompressed_page_size: 0,
                compressed_page_size: 0,
                data_page: None,
                data_page_v2: None,
                dictionary_page: Some(DictionaryPageHeader {
                    num_values: dict.len() as i32,
                    encoding: Encoding::Plain,
                }),
            };
            self.write_page(header, &body, codec, &mut sizes)?;
            encodings.push(Encoding::RleDictionary);
        }

        let data_page_offset = self.sink.position() as i64;
        let mut next_value = 0;
        for range in levels.pages(self.options.data_page_size) {
            let present = levels.def[range.clone()]
                .iter()
                .filter(|&&d| d == column.max_def)
                .count();
            let indices = &levels.values[next_value..next_value + present];
            next_value += present;

            let mut body = Vec::new();
            encode_levels(&levels.rep[range.clone()], column.max_rep, &mut body);
            encode_levels(&levels.def[range.clone()], column.max_def, &mut body);
            let encoding = match &dictionary {
                Some(dict) => {
                    let width = bit_width(dict.len().saturating_sub(1) as u64);
                    let keys: Vec<u32> = indices
                        .iter()
                        .map(|&i| values.dictionary_key(i).unwrap_or_default() as u32)
                        .collect();
                    body.push(width);
                    encode_rle(&keys, width, &mut body);
                    Encoding::RleDictionary
                }
                None => {
                    encode_plain_at(&values, indices, leaf.physical, &mut body)?;
                    Encoding::Plain
                }
            };
            let header = PageHeader {
                page_type: PageType::DataPage,
                uncompressed_page_size: 0,
                compressed_page_size: 0,
                data_page: Some(DataPageHeader {
                    num_values: range.len() as i32,
                    encoding,
                }),
                data_page_v2: None,
                dictionary_page: None,
            };
            self.write_page(header, &body, codec, &mut sizes)?;
            trace!(column = %column.path.join("."), levels = range.len(), "parquet data page written");
        }

        let nulls = levels.def.iter().filter(|&&d| d < column.max_def).count();
        Ok(ColumnChunkMetaData {
            file_offset: start as i64,
            physical_type: leaf.physical,
            encodings,
            path_in_schema: column.path.clone(),
            codec: codec.parquet_codec(),
            num_values: levels.def.len() as i64,
            total_uncompressed_size: sizes.0,
            total_compressed_size: sizes.1,
            data_page_offset,
            dictionary_page_offset,
            null_count: Some(nulls as i64),
        })
    }

    /// Compresses `body` and writes it after its header. `sizes` accumulates
    /// (uncompressed, compressed) bytes, headers included.
    fn write_page(
        &mut self,
        mut header: PageHeader,
        body: &[u8],
        codec: Compression,
        sizes: &mut (i64, i64),
    ) -> Result<()> {
        let packed = compress(body, codec)?;
        header.uncompressed_page_size = page_size(body.len())?;
        header.compressed_page_size = page_size(packed.len())?;
        let header = header.to_bytes();
        self.sink.write_all(&header)?;
        self.sink.write_all(&packed)?;
        sizes.0 += (header.len() + body.len()) as i64;
        sizes.1 += (header.len() + packed.len()) as i64;
        Ok(())
    }

    fn finish_inner(&mut self) -> Result<()> {
        self.start()?;
        let key_value_metadata = self.key_value_metadata()?;
        let footer = FileMetaData {
            version: 1,
            schema: self.elements.clone(),
            num_rows: self.num_rows,
            row_groups: std::mem::take(&mut self.row_groups),
            key_value_metadata,
            created_by: Some(CREATED_BY.to_string()),
        };
        let bytes = footer.to_bytes();
        self.sink.write_all(&bytes)?;
        self.sink.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.sink.write_all(PARQUET_MAGIC)?;
        self.sink.flush()?;
        debug!(
            row_groups = footer.row_groups.len(),
            rows = self.num_rows,
            bytes = self.sink.position(),
            "parquet writer finished"
        );
        Ok(())
    }

    /// Schema metadata, then the caller's entries, then the embedded schema.
    fn key_value_metadata(&self) -> Result<BTreeMap<String, String>> {
        let mut out = self.schema.metadata.clone();
        out.extend(
            self.options
                .key_value_metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if self.options.skip_arrow_metadata {
            out.remove(ARROW_SCHEMA_KEY);
        } else {
            out.insert(
                ARROW_SCHEMA_KEY.to_string(),
                STANDARD.encode(schema_to_bytes(&self.schema)?),
            );
        }
        Ok(out)
    }
}

fn page_size(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| {
        InterchangeError::UnsupportedOperation(format!(
            "page of {n} bytes exceeds the format's 2 GiB limit; lower data_page_size"
        ))
    })
}

/// Writes `table` to `sink` in one call.
///
/// # Example
/// ```rust
/// use minarrow_interchange::{Array, Table};
/// use minarrow_interchange::io::parquet::{ParquetWriteOptions, write_parquet};
///
/// let table = Table::from_arrays(&["x"], vec![Array::from_slice(&[1.5f64, 2.5])]).unwrap();
/// let mut out = Vec::new();
/// write_parquet(&table, &mut out, ParquetWriteOptions::default()).unwrap();
/// assert_eq!(&out[..4], b"PAR1");
/// assert_eq!(&out[out.len() - 4..], b"PAR1");
/// ```
pub fn write_parquet<W: Write>(table: &Table, sink: W, options: ParquetWriteOptions) -> Result<()> {
    let mut writer = ParquetWriter::try_new(sink, table.schema().clone(), options)?;
    writer.write_table(table)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parquet::metadata::ParquetMetadata;

    fn footer_of(bytes: &[u8]) -> ParquetMetadata {
        let len = ParquetMetadata::footer_len(bytes).unwrap();
        let end = bytes.len() - 8;
        ParquetMetadata::parse(&bytes[end - len..end]).unwrap()
    }

    #[test]
    fn batches_split_into_row_groups_and_pages() {
        let table = Table::from_arrays(
            &["n"],
            vec![Array::from_slice(&(0..10i32).collect::<Vec<_>>())],
        )
        .unwrap();
        let mut out = Vec::new();
        let options = ParquetWriteOptions::default()
            .with_max_row_group_size(4)
            .with_data_page_size(3);
        write_parquet(&table, &mut out, options).unwrap();
        let meta = footer_of(&out);
        assert_eq!(meta.num_rows(), 10);
        assert_eq!(meta.num_row_groups(), 3);
        let rows: Vec<i64> = (0..3)
            .map(|i| meta.row_group_metadata(i).unwrap().num_rows)
            .collect();
        assert_eq!(rows, vec![4, 4, 2]);
    }

    #[test]
    fn metadata_merges_and_embeds_schema() {
        let table = Table::from_arrays(&["s"], vec![Array::from_strs(&["a"])]).unwrap();
        let mut out = Vec::new();
        let options = ParquetWriteOptions::default()
            .with_key_value_metadata(BTreeMap::from([("k".to_string(), "v".to_string())]));
        write_parquet(&table, &mut out, options).unwrap();
        let meta = footer_of(&out);
        assert!(meta.key_value_metadata().contains_key(ARROW_SCHEMA_KEY));
        assert_eq!(meta.schema().metadata.get("k").map(String::as_str), Some("v"));
        assert!(!meta.schema().metadata.contains_key(ARROW_SCHEMA_KEY));
    }

    #[test]
    fn embedded_schema_is_an_ipc_schema_message() {
        use crate::io::ipc::format::{MessageTable, VERSION_V5, header, slot};

        let table = Table::from_arrays(
            &["id", "tags"],
            vec![
                Array::from_slice(&[1i64, 2]),
                Array::from_strs(&["a", "b"]),
            ],
        )
        .unwrap();
        let mut out = Vec::new();
        write_parquet(&table, &mut out, ParquetWriteOptions::default()).unwrap();
        let meta = footer_of(&out);
        let bytes = STANDARD.decode(&meta.key_value_metadata()[ARROW_SCHEMA_KEY]).unwrap();

        assert_eq!(&bytes[..4], &[0xFF; 4]);
        let len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(len, bytes.len() - 8);
        let message = flatbuffers::root::<MessageTable>(&bytes[8..]).unwrap();
        assert_eq!(message.scalar::<i16>(slot::message::VERSION, 0), VERSION_V5);
        assert_eq!(message.scalar::<u8>(slot::message::HEADER_TYPE, 0), header::SCHEMA);
        let names: Vec<_> = message
            .table(slot::message::HEADER)
            .unwrap()
            .tables(slot::schema::FIELDS)
            .map(|f| f.str(slot::field::NAME).unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["id", "tags"]);
    }

    #[test]
    fn nested_columns_flatten_to_leaf_chunks() {
        use crate::{DataType, Field, struct_array};

        let point = struct_array(
            &[
                Array::from_slice(&[1.0f64, 2.0]),
                Array::from_options(&[Some(3.0f64), None]),
            ],
            &[
                Field::new("x", DataType::Float64, false),
                Field::new("y", DataType::Float64, true),
            ],
            None,
        )
        .unwrap();
        let table = Table::from_arrays(&["p"], vec![point]).unwrap();
        let mut out = Vec::new();
        write_parquet(&table, &mut out, ParquetWriteOptions::default()).unwrap();
        let meta = footer_of(&out);
        let columns = &meta.row_group_metadata(0).unwrap().columns;
        let paths: Vec<_> = columns.iter().map(|c| c.path_in_schema.join(".")).collect();
        assert_eq!(paths, vec!["p.x", "p.y"]);
        assert_eq!(columns[1].null_count, Some(1));
        assert_eq!(meta.file_metadata().schema[1].num_children, Some(2));
    }

    #[test]
    fn failed_write_leaves_no_footer() {
        use crate::{DataType, Field};

        let schema = Schema::from(vec![Field::new("x", DataType::Int32, false)]);
        let mut w =
            ParquetWriter::try_new(Vec::new(), schema.clone(), ParquetWriteOptions::default())
                .unwrap();
        let batch = RecordBatch::try_new(
            schema,
            vec![Array::from_options(&[Some(1i32), None])],
        )
        .unwrap();
        assert!(matches!(
            w.write_batch(&batch),
            Err(InterchangeError::SchemaMismatch(_))
        ));
        assert!(w.finish().is_err());
        // Only the leading magic made it out.
        assert_eq!(w.into_inner(), PARQUET_MAGIC.to_vec());
    }

    #[test]
    fn empty_table_is_a_valid_file() {
        use crate::{DataType, Field};

        let schema = Schema::from(vec![Field::new("x", DataType::Int32, true)]);
        let mut out = Vec::new();
        write_parquet(&Table::empty(schema), &mut out, ParquetWriteOptions::default()).unwrap();
        let meta = footer_of(&out);
        assert_eq!(meta.num_rows(), 0);
        assert_eq!(meta.num_row_groups(), 0);
        assert_eq!(meta.schema().fields[0].data_type, DataType::Int32);
    }
}
