//! # Parquet reader
//!
//! [`ParquetFile`] parses the footer on open and decodes on demand. The read
//! pipeline is shared with the async reader:
//!
//! 1. [`ReadPlan::new`] resolves the projection, row-group selection and the
//!    `offset`/`limit` window, pruning row groups outside the window.
//! 2. [`ReadPlan::tasks`] lists the byte range of every leaf column chunk the
//!    projected fields need.
//! 3. [`ReadPlan::decode`] turns one fetched chunk into its levels and values.
//! 4. [`ReadPlan::assemble`] rebuilds each projected field from its leaves,
//!    slices it to the window and builds the table in row-group order.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, trace};

use crate::enums::error::{InterchangeError, Result};
use crate::io::compression::{Compression, decompress};
use crate::io::parquet::encoding::{
    ColumnDecoder, decode_level_runs, decode_levels, malformed,
};
use crate::io::parquet::levels::{Assembler, ColumnNode, LeafChunk, LeafColumn};
use crate::io::parquet::metadata::{
    ColumnChunkMetaData, Encoding, PageHeader, PageType, ParquetMetadata, RowGroupMetaData,
    SchemaElement,
};
use crate::io::parquet::{PARQUET_MAGIC, ParquetReadOptions};
use crate::structs::chunked::chunked_array::RechunkStrategy;
use crate::{RecordBatch, Schema, Table};

/// A Parquet file whose footer has been parsed.
///
/// ## Example
/// ```rust
/// use std::io::Cursor;
/// use minarrow_interchange::{Array, Table};
/// use minarrow_interchange::io::parquet::{ParquetFile, ParquetReadOptions, ParquetWriteOptions, write_parquet};
///
/// let table = Table::from_arrays(
///     &["a", "b"],
///     vec![Array::from_slice(&[1i32, 2, 3, 4]), Array::from_strs(&["w", "x", "y", "z"])],
/// ).unwrap();
/// let mut buf = Vec::new();
/// write_parquet(&table, &mut buf, ParquetWriteOptions::default().with_max_row_group_size(2)).unwrap();
///
/// let mut file = ParquetFile::open(Cursor::new(buf)).unwrap();
/// assert_eq!(file.num_row_groups(), 2);
/// let part = file
///     .read(ParquetReadOptions::default().with_columns(vec![1]).with_offset(1).with_limit(2))
///     .unwrap();
/// assert_eq!(part.num_columns(), 1);
/// assert_eq!(part.num_rows(), 2);
/// ```
pub struct ParquetFile<R> {
    source: R,
    len: u64,
    metadata: ParquetMetadata,
}

impl<R: Read + Seek> ParquetFile<R> {
    /// Reads and parses the footer. No column data is read.
    ///
    /// # Errors
    /// `CorruptFooter` when either magic is missing, the footer length does not
    /// fit the file, or the footer does not parse.
    pub fn open(mut source: R) -> Result<Self> {
        let len = source.seek(SeekFrom::End(0))?;
        if len < 12 {
            return Err(InterchangeError::CorruptFooter(format!(
                "file of {len} bytes is too small for a parquet file"
            )));
        }
        let mut magic = [0u8; 4];
        source.seek(SeekFrom::Start(0))?;
        source.read_exact(&mut magic)?;
        if &magic != PARQUET_MAGIC {
            return Err(InterchangeError::CorruptFooter(
                "missing leading PAR1 magic".into(),
            ));
        }
        let mut tail = [0u8; 8];
        source.seek(SeekFrom::End(-8))?;
        source.read_exact(&mut tail)?;
        let footer_len = ParquetMetadata::footer_len(&tail)?;
        if footer_len as u64 + 12 > len {
            return Err(InterchangeError::CorruptFooter(format!(
                "footer length {footer_len} exceeds the file size {len}"
            )));
        }
        let mut footer = vec![0u8; footer_len];
        source.seek(SeekFrom::Start(len - 8 - footer_len as u64))?;
        source.read_exact(&mut footer)?;
        let metadata = ParquetMetadata::parse(&footer)?;
        debug!(
            bytes = len,
            footer = footer_len,
            rows = metadata.num_rows(),
            row_groups = metadata.num_row_groups(),
            "parquet footer parsed"
        );
        Ok(Self {
            source,
            len,
            metadata,
        })
    }

    pub fn metadata(&self) -> &ParquetMetadata {
        &self.metadata
    }

    pub fn schema(&self) -> &Schema {
        self.metadata.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.metadata.num_rows()
    }

    pub fn num_row_groups(&self) -> usize {
        self.metadata.num_row_groups()
    }

    pub fn row_group_metadata(&self, i: usize) -> Option<&RowGroupMetaData> {
        self.metadata.row_group_metadata(i)
    }

    pub fn key_value_metadata(&self) -> &BTreeMap<String, String> {
        self.metadata.key_value_metadata()
    }

    /// Decodes every row group into one table, one batch per row group.
    pub fn read_all(&mut self) -> Result<Table> {
        self.read(ParquetReadOptions::default())
    }

    /// Decodes the selection described by `options`.
    ///
    /// Only the projected column chunks of the selected row groups are read.
    pub fn read(&mut self, options: ParquetReadOptions) -> Result<Table> {
        let plan = ReadPlan::new(&self.metadata, &options)?;
        let mut chunks = BTreeMap::new();
        for task in plan.tasks(&self.metadata, self.len)? {
            let (start, len) = task.range;
            let mut bytes = vec![0u8; len as usize];
            self.source.seek(SeekFrom::Start(start))?;
            self.source.read_exact(&mut bytes)?;
            let chunk = plan.decode(&self.metadata, &task, &bytes)?;
            chunks.insert(task.key(), chunk);
        }
        plan.assemble(chunks)
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

/// One leaf column chunk to fetch and decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkTask {
    /// Position of the row group in the plan.
    pub group: usize,
    /// Leaf column index in the file.
    pub column: usize,
    /// `(start, len)` in the file.
    pub range: (u64, u64),
}

impl ChunkTask {
    pub fn key(&self) -> (usize, usize) {
        (self.group, self.column)
    }
}

/// A selected row group and the window of its rows to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlannedGroup {
    pub index: usize,
    pub rows: usize,
    pub skip: usize,
    pub take: usize,
}

/// Resolved read selection.
#[derive(Debug, Clone)]
pub(crate) struct ReadPlan {
    pub schema: Schema,
    /// Layout of each projected field.
    pub nodes: Vec<ColumnNode>,
    /// Leaf columns the projection reads, ascending.
    pub leaves: Vec<usize>,
    pub groups: Vec<PlannedGroup>,
    pub batch_size: Option<usize>,
}

impl ReadPlan {
    /// # Errors
    /// `IndexOutOfBounds` for unknown row groups or columns, and
    /// `UnsupportedOperation` for a zero batch size.
    pub fn new(metadata: &ParquetMetadata, options: &ParquetReadOptions) -> Result<Self> {
        if options.batch_size == Some(0) {
            return Err(InterchangeError::UnsupportedOperation(
                "batch_size must be greater than 0".into(),
            ));
        }
        let columns = match &options.columns {
            Some(c) => c.clone(),
            None => (0..metadata.schema().len()).collect(),
        };
        let schema = metadata.schema().project(&columns)?;
        let nodes: Vec<ColumnNode> = columns
            .iter()
            .map(|&c| metadata.layout().fields[c].clone())
            .collect();
        let leaves = nodes
            .iter()
            .flat_map(|n| n.leaves.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let selected = match &options.row_groups {
            Some(r) => r.clone(),
            None => (0..metadata.num_row_groups()).collect(),
        };

        let window_start = options.offset;
        let window_end = options
            .limit
            .map_or(usize::MAX, |l| window_start.saturating_add(l));
        let mut groups = Vec::new();
        let mut row = 0usize;
        for index in selected {
            let rg = metadata
                .row_group_metadata(index)
                .ok_or(InterchangeError::IndexOutOfBounds {
                    index,
                    len: metadata.num_row_groups(),
                })?;
            let rows = rg.num_rows as usize;
            let (start, end) = (row, row + rows);
            row = end;
            let lo = start.max(window_start);
            let hi = end.min(window_end);
            if lo < hi {
                groups.push(PlannedGroup {
                    index,
                    rows,
                    skip: lo - start,
                    take: hi - lo,
                });
            }
        }
        Ok(Self {
            schema,
            nodes,
            leaves,
            groups,
            batch_size: options.batch_size,
        })
    }

    /// Byte ranges to fetch, in row-group then column order.
    ///
    /// # Errors
    /// `CorruptFooter` when a chunk's range runs past `file_len`.
    pub fn tasks(&self, metadata: &ParquetMetadata, file_len: u64) -> Result<Vec<ChunkTask>> {
        let mut out = Vec::with_capacity(self.groups.len() * self.leaves.len());
        for (group, planned) in self.groups.iter().enumerate() {
            let rg = self.row_group(metadata, planned)?;
            for &column in &self.leaves {
                let range = rg.columns[column].byte_range()?;
                if range.0.saturating_add(range.1) > file_len {
                    return Err(InterchangeError::CorruptFooter(format!(
                        "column chunk {column} of row group {} runs past the end of the file",
                        planned.index
                    )));
                }
                out.push(ChunkTask {
                    group,
                    column,
                    range,
                });
            }
        }
        Ok(out)
    }

    /// Decodes the fetched bytes of `task`.
    pub fn decode(
        &self,
        metadata: &ParquetMetadata,
        task: &ChunkTask,
        bytes: &[u8],
    ) -> Result<LeafChunk> {
        let planned = &self.groups[task.group];
        let rg = self.row_group(metadata, planned)?;
        let chunk = &rg.columns[task.column];
        let column = &metadata.layout().leaves[task.column];
        let element = &metadata.file_metadata().schema[column.element];
        let expected = column.leaf.physical;
        if expected != chunk.physical_type || element.physical_type != Some(chunk.physical_type) {
            return Err(InterchangeError::SchemaMismatch(format!(
                "column '{}' is stored as {:?}, {} needs {expected:?}",
                column.path.join("."),
                chunk.physical_type,
                column.data_type
            )));
        }
        let decoded = decode_chunk(bytes, chunk, column, element)?;
        trace!(
            row_group = planned.index,
            column = task.column,
            levels = decoded.def.len(),
            "parquet column chunk decoded"
        );
        Ok(decoded)
    }

    /// Builds the table from decoded chunks keyed by `ChunkTask::key`.
    pub fn assemble(&self, chunks: BTreeMap<(usize, usize), LeafChunk>) -> Result<Table> {
        let mut batches = Vec::with_capacity(self.groups.len());
        for (group, planned) in self.groups.iter().enumerate() {
            let leaves = chunks
                .range((group, 0)..(group + 1, 0))
                .map(|(&(_, column), chunk)| (column, chunk))
                .collect();
            let assembler = Assembler::new(leaves);
            let columns = self
                .nodes
                .iter()
                .map(|node| {
                    let array = assembler.build(node)?;
                    if array.len() != planned.rows {
                        return Err(malformed(format!(
                            "column '{}' holds {} rows, row group {} has {}",
                            node.name,
                            array.len(),
                            planned.index,
                            planned.rows
                        )));
                    }
                    Ok(array.slice(planned.skip, planned.take))
                })
                .collect::<Result<Vec<_>>>()?;
            batches.push(RecordBatch::try_new_with_num_rows(
                self.schema.clone(),
                columns,
                planned.take,
            )?);
        }
        let table = Table::try_new(self.schema.clone(), batches)?;
        match self.batch_size {
            Some(size) if table.num_rows() > 0 && self.schema.len() > 0 => {
                table.rechunk(RechunkStrategy::Count(size))
            }
            _ => Ok(table),
        }
    }

    fn row_group<'m>(
        &self,
        metadata: &'m ParquetMetadata,
        planned: &PlannedGroup,
    ) -> Result<&'m RowGroupMetaData> {
        metadata
            .row_group_metadata(planned.index)
            .ok_or(InterchangeError::IndexOutOfBounds {
                index: planned.index,
                len: metadata.num_row_groups(),
            })
    }
}

/// Decodes the pages of one leaf column chunk. Pages are read until the
/// chunk's `num_values` levels are in.
pub(crate) fn decode_chunk(
    bytes: &[u8],
    chunk: &ColumnChunkMetaData,
    column: &LeafColumn,
    element: &SchemaElement,
) -> Result<LeafChunk> {
    let codec = chunk.compression()?;
    let total = chunk.num_values.max(0) as usize;
    let mut decoder =
        ColumnDecoder::new(column.data_type.clone(), chunk.physical_type, element.type_length)?;
    let (mut def, mut rep) = (Vec::new(), Vec::new());
    let mut pos = 0;
    while def.len() < total {
        if pos >= bytes.len() {
            return Err(malformed(format!(
                "column '{}' ends after {} of {total} values",
                element.name,
                def.len()
            )));
        }
        let (header, used) = PageHeader::from_bytes(&bytes[pos..])?;
        pos += used;
        let size = header.compressed_page_size as usize;
        let body = bytes
            .get(pos..pos + size)
            .ok_or_else(|| malformed("page body runs past the column chunk"))?;
        pos += size;
        let uncompressed = header.uncompressed_page_size as usize;
        let (encoding, page_rep, page_def, values) = match header.page_type {
            PageType::DictionaryPage => {
                let h = header
                    .dictionary_page
                    .as_ref()
                    .ok_or_else(|| malformed("dictionary page without its header"))?;
                let raw = decompress(body, codec, uncompressed)?;
                decoder.set_dictionary(&raw, h.num_values.max(0) as usize)?;
                continue;
            }
            PageType::DataPage => {
                let h = header
                    .data_page
                    .as_ref()
                    .ok_or_else(|| malformed("data page without its header"))?;
                let n = h.num_values.max(0) as usize;
                let raw = decompress(body, codec, uncompressed)?;
                let (page_rep, r) = decode_levels(&raw, column.max_rep, n)?;
                let (page_def, d) = decode_levels(&raw[r..], column.max_def, n)?;
                (h.encoding, page_rep, page_def, raw[r + d..].to_vec())
            }
            PageType::DataPageV2 => {
                let h = header
                    .data_page_v2
                    .as_ref()
                    .ok_or_else(|| malformed("data page v2 without its header"))?;
                let n = h.num_values.max(0) as usize;
                let r = h.repetition_levels_byte_length.max(0) as usize;
                let d = h.definition_levels_byte_length.max(0) as usize;
                let levels = body
                    .get(..r + d)
                    .ok_or_else(|| malformed("page levels run past the page"))?;
                let page_rep = decode_level_runs(&levels[..r], column.max_rep, n)?;
                let page_def = decode_level_runs(&levels[r..], column.max_def, n)?;
                let values = &body[r + d..];
                let values = if h.is_compressed && codec != Compression::None {
                    decompress(values, codec, uncompressed.saturating_sub(r + d))?
                } else {
                    values.to_vec()
                };
                (h.encoding, page_rep, page_def, values)
            }
            PageType::IndexPage => continue,
        };
        let valid: Vec<bool> = page_def
            .iter()
            .filter(|&&d| d >= column.slot_def)
            .map(|&d| d == column.max_def)
            .collect();
        push_values(&mut decoder, encoding, &valid, &values)?;
        rep.extend(page_rep);
        def.extend(page_def);
    }
    let values = decoder.finish()?;
    let slots = def.iter().filter(|&&d| d >= column.slot_def).count();
    if values.len() != slots || def.len() != total {
        return Err(malformed(format!(
            "column '{}' holds {} values in {} levels, expected {slots} in {total}",
            element.name,
            values.len(),
            def.len()
        )));
    }
    Ok(LeafChunk { def, rep, values })
}

fn push_values(
    decoder: &mut ColumnDecoder,
    encoding: Encoding,
    valid: &[bool],
    values: &[u8],
) -> Result<()> {
    match encoding {
        Encoding::Plain => decoder.push_plain(valid, values),
        Encoding::RleDictionary | Encoding::PlainDictionary => decoder.push_indices(valid, values),
        other => Err(InterchangeError::UnsupportedOperation(format!(
            "{other:?} encoded data pages are not supported"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::io::parquet::{ParquetWriteOptions, write_parquet};
    use crate::{Array, DataType, Field};

    fn sample() -> Table {
        Table::from_arrays(
            &["n", "s"],
            vec![
                Array::from_options(&[Some(1i64), None, Some(3), Some(4), None, Some(6)]),
                Array::from_opt_strs(&[Some("a"), Some("b"), None, Some("d"), Some("e"), Some("f")]),
            ],
        )
        .unwrap()
    }

    fn file_of(table: &Table, options: ParquetWriteOptions) -> ParquetFile<Cursor<Vec<u8>>> {
        let mut buf = Vec::new();
        write_parquet(table, &mut buf, options).unwrap();
        ParquetFile::open(Cursor::new(buf)).unwrap()
    }

    #[test]
    fn round_trip_with_nulls() {
        let table = sample();
        let mut file = file_of(&table, ParquetWriteOptions::default().with_data_page_size(4));
        assert_eq!(file.read_all().unwrap(), table);
    }

    #[test]
    fn offset_and_limit_cross_row_groups() {
        let table = sample();
        let mut file = file_of(&table, ParquetWriteOptions::default().with_max_row_group_size(2));
        assert_eq!(file.num_row_groups(), 3);
        let got = file
            .read(ParquetReadOptions::default().with_offset(1).with_limit(3))
            .unwrap();
        assert_eq!(got, table.slice(1, 3).unwrap());
    }

    #[test]
    fn plan_prunes_row_groups_outside_the_window() {
        let table = sample();
        let file = file_of(&table, ParquetWriteOptions::default().with_max_row_group_size(2));
        let options = ParquetReadOptions::default().with_offset(2).with_limit(2);
        let plan = ReadPlan::new(file.metadata(), &options).unwrap();
        assert_eq!(
            plan.groups,
            vec![PlannedGroup {
                index: 1,
                rows: 2,
                skip: 0,
                take: 2
            }]
        );
    }

    #[test]
    fn projection_and_row_group_selection() {
        let table = sample();
        let mut file = file_of(&table, ParquetWriteOptions::default().with_max_row_group_size(2));
        let got = file
            .read(
                ParquetReadOptions::default()
                    .with_columns(vec![1])
                    .with_row_groups(vec![2, 0]),
            )
            .unwrap();
        assert_eq!(got.schema().fields, vec![Field::new("s", DataType::Utf8, true)]);
        let all = table.to_flat_values(1).unwrap();
        let expected = vec![all[4].clone(), all[5].clone(), all[0].clone(), all[1].clone()];
        assert_eq!(got.to_flat_values(0).unwrap(), expected);
    }

    #[test]
    fn batch_size_resplits_output() {
        let table = sample();
        let mut file = file_of(&table, ParquetWriteOptions::default());
        let got = file
            .read(ParquetReadOptions::default().with_batch_size(4))
            .unwrap();
        assert_eq!(got.chunk_lengths(), vec![4, 2]);
    }

    #[test]
    fn bad_indices_are_reported() {
        let mut file = file_of(&sample(), ParquetWriteOptions::default());
        assert!(matches!(
            file.read(ParquetReadOptions::default().with_columns(vec![5])),
            Err(InterchangeError::IndexOutOfBounds { index: 5, len: 2 })
        ));
        assert!(matches!(
            file.read(ParquetReadOptions::default().with_row_groups(vec![9])),
            Err(InterchangeError::IndexOutOfBounds { index: 9, .. })
        ));
    }

    #[test]
    fn truncated_file_is_corrupt_footer() {
        let mut buf = Vec::new();
        write_parquet(&sample(), &mut buf, ParquetWriteOptions::default()).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            ParquetFile::open(Cursor::new(buf)),
            Err(InterchangeError::CorruptFooter(_))
        ));
    }
}
