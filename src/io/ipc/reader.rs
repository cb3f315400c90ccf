//! IPC readers
//!
//! - [`IpcStreamReader`]: pulls messages until end-of-stream; a
//!   [`RecordBatchReader`].
//! - [`IpcFileReader`]: parses the footer first, then reads any batch by index.
//!
//! Body buffers are wrapped zero-copy when stored raw. A record batch whose
//! column count, node count or buffer count disagrees with the declared schema
//! fails with `SchemaMismatch`.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::slice;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::enums::error::{InterchangeError, Result};
use crate::ffi::arrow_dtype::Layout;
use crate::ffi::stream::RecordBatchReader;
use crate::io::compression::{Compression, decompress_ipc};
use crate::io::ipc::IpcFormat;
use crate::io::ipc::message::{
    ARROW_MAGIC, Block, BufferSpec, DictionaryBatchHeader, FieldNode, IpcSchema, Message,
    MessageHeader, RecordBatchHeader, decode_footer, decode_metadata, invalid,
    read_message_header,
};
use crate::structs::bitmask::{Bitmask, bytes_for};
use crate::traits::concatenate::concat_arrays;
use crate::{Array, Buffer, DataType, RecordBatch, Schema, Table};

fn mismatch(msg: impl Into<String>) -> InterchangeError {
    InterchangeError::SchemaMismatch(msg.into())
}

/// Dictionaries received so far, by id.
type Dictionaries = HashMap<i64, Array>;

/// Rebuilds arrays from field nodes and body buffers, in writer order.
struct BodyDecoder<'a> {
    nodes: slice::Iter<'a, FieldNode>,
    buffers: slice::Iter<'a, BufferSpec>,
    variadic_counts: slice::Iter<'a, i64>,
    /// Ids of the dictionary types still to be met, in pre-order.
    ids: slice::Iter<'a, i64>,
    dictionaries: &'a Dictionaries,
    body: &'a Bytes,
    compression: Compression,
}

impl<'a> BodyDecoder<'a> {
    fn new(
        header: &'a RecordBatchHeader,
        body: &'a Bytes,
        ids: &'a [i64],
        dictionaries: &'a Dictionaries,
    ) -> Self {
        Self {
            nodes: header.nodes.iter(),
            buffers: header.buffers.iter(),
            variadic_counts: header.variadic_counts.iter(),
            ids: ids.iter(),
            dictionaries,
            body,
            compression: header.compression,
        }
    }

    fn next_node(&mut self) -> Result<FieldNode> {
        self.nodes
            .next()
            .copied()
            .ok_or_else(|| mismatch("schema declares more field nodes than the batch carries"))
    }

    fn next_buffer(&mut self) -> Result<Buffer> {
        let spec = self
            .buffers
            .next()
            .ok_or_else(|| mismatch("schema declares more buffers than the batch carries"))?;
        if spec.length == 0 {
            return Ok(Buffer::empty());
        }
        let start = usize::try_from(spec.offset).map_err(|_| invalid("negative buffer offset"))?;
        let len = usize::try_from(spec.length).map_err(|_| invalid("negative buffer length"))?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.body.len())
            .ok_or_else(|| invalid("buffer runs past the message body"))?;
        let raw = self.body.slice(start..end);
        if self.compression == Compression::None {
            return Ok(Buffer::from_bytes(raw));
        }
        if raw.len() < 8 {
            return Err(invalid("compressed buffer lacks its length prefix"));
        }
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&raw[..8]);
        match i64::from_le_bytes(prefix) {
            -1 => Ok(Buffer::from_bytes(raw.slice(8..))),
            n if n < 0 => Err(invalid(format!("bad uncompressed length {n}"))),
            n => Ok(Buffer::from(decompress_ipc(&raw[8..], self.compression, n as usize)?)),
        }
    }

    fn decode(&mut self, data_type: &DataType) -> Result<Array> {
        let node = self.next_node()?;
        let len = usize::try_from(node.length).map_err(|_| invalid("negative node length"))?;
        let layout = data_type.layout();
        if layout == Layout::Null {
            return Array::new_null_typed(data_type, len);
        }
        let bits = self.next_buffer()?;
        let validity = if node.null_count > 0 {
            if bits.len() < bytes_for(len) {
                return Err(invalid("validity buffer shorter than the node"));
            }
            Some(Bitmask::new(bits, len))
        } else {
            None
        };
        let fixed = match layout {
            Layout::Variable { .. } => 2,
            Layout::View => {
                let count = self
                    .variadic_counts
                    .next()
                    .ok_or_else(|| invalid("view array without a variadic buffer count"))?;
                let count =
                    usize::try_from(*count).map_err(|_| invalid("negative variadic buffer count"))?;
                1 + count
            }
            Layout::Bitmap | Layout::FixedWidth(_) | Layout::Dictionary(_) | Layout::List { .. } => 1,
            Layout::FixedSizeList(_) | Layout::Struct | Layout::Null => 0,
        };
        let buffers = (0..fixed)
            .map(|_| self.next_buffer())
            .collect::<Result<Vec<_>>>()?;
        let children = data_type
            .children()
            .into_iter()
            .map(|f| self.decode(&f.data_type))
            .collect::<Result<Vec<_>>>()?;
        let dictionary = match data_type {
            DataType::Dictionary(..) => {
                let id = *self
                    .ids
                    .next()
                    .ok_or_else(|| mismatch("schema has more dictionaries than ids"))?;
                let values = self.dictionaries.get(&id).ok_or_else(|| {
                    invalid(format!("record batch uses dictionary {id} before it was sent"))
                })?;
                Some(values.clone())
            }
            _ => None,
        };
        Array::try_new(
            data_type.clone(),
            len,
            0,
            validity,
            buffers,
            children,
            dictionary,
        )
    }

    fn finish(&mut self) -> Result<()> {
        if self.nodes.next().is_some() || self.buffers.next().is_some() {
            return Err(mismatch("batch carries more nodes or buffers than the schema declares"));
        }
        Ok(())
    }
}

/// Decodes one record batch body against `schema`.
pub(crate) fn decode_batch(
    schema: &IpcSchema,
    header: &RecordBatchHeader,
    body: &Bytes,
    dictionaries: &Dictionaries,
) -> Result<RecordBatch> {
    let num_rows = usize::try_from(header.length).map_err(|_| invalid("negative batch length"))?;
    let mut decoder = BodyDecoder::new(header, body, &schema.dictionary_ids, dictionaries);
    let columns = schema
        .schema
        .fields
        .iter()
        .map(|f| decoder.decode(&f.data_type))
        .collect::<Result<Vec<_>>>()?;
    decoder.finish()?;
    if let Some((i, c)) = columns.iter().enumerate().find(|(_, c)| c.len() != num_rows) {
        return Err(mismatch(format!(
            "column {i} has {} rows, batch declares {num_rows}",
            c.len()
        )));
    }
    RecordBatch::try_new_with_num_rows(schema.schema.clone(), columns, num_rows)
}

/// Decodes a dictionary batch and stores it, appending when it is a delta.
pub(crate) fn apply_dictionary(
    schema: &IpcSchema,
    header: &DictionaryBatchHeader,
    body: &Bytes,
    dictionaries: &mut Dictionaries,
) -> Result<()> {
    let value_type = schema
        .dictionaries()
        .into_iter()
        .find_map(|(id, value)| (id == header.id).then(|| value.clone()))
        .ok_or_else(|| mismatch(format!("no field uses dictionary {}", header.id)))?;
    let values = {
        let mut decoder = BodyDecoder::new(&header.data, body, &[], dictionaries);
        let values = decoder.decode(&value_type)?;
        decoder.finish()?;
        values
    };
    if values.len() as i64 != header.data.length {
        return Err(mismatch(format!(
            "dictionary {} has {} values, its batch declares {}",
            header.id,
            values.len(),
            header.data.length
        )));
    }
    let values = match dictionaries.get(&header.id) {
        Some(previous) if header.is_delta => concat_arrays(&[previous.clone(), values])?,
        _ => values,
    };
    trace!(id = header.id, values = values.len(), delta = header.is_delta, "IPC dictionary read");
    dictionaries.insert(header.id, values);
    Ok(())
}

fn read_body<R: Read>(r: &mut R, len: u64) -> Result<Bytes> {
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body)?;
    Ok(Bytes::from(body))
}

// ---------------------------------------------------------------
// Stream reader
// ---------------------------------------------------------------

/// Reads the stream flavour from any `Read` source.
pub struct IpcStreamReader<R: Read> {
    source: R,
    schema: IpcSchema,
    dictionaries: Dictionaries,
    done: bool,
}

impl<R: Read> IpcStreamReader<R> {
    /// Reads the leading schema message.
    pub fn try_new(mut source: R) -> Result<Self> {
        let schema = match read_message_header(&mut source)? {
            Some(Message {
                header: MessageHeader::Schema(schema),
                body_len,
            }) => {
                read_body(&mut source, body_len)?;
                schema
            }
            Some(_) => return Err(mismatch("stream does not start with a schema message")),
            None => return Err(mismatch("stream ended before its schema")),
        };
        debug!(columns = schema.schema.len(), "IPC stream schema read");
        Ok(Self {
            source,
            schema,
            dictionaries: HashMap::new(),
            done: false,
        })
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            let Some(msg) = read_message_header(&mut self.source)? else {
                return Ok(None);
            };
            let body = read_body(&mut self.source, msg.body_len)?;
            match msg.header {
                MessageHeader::RecordBatch(header) => {
                    let batch = decode_batch(&self.schema, &header, &body, &self.dictionaries)?;
                    trace!(rows = batch.num_rows(), "IPC record batch read");
                    return Ok(Some(batch));
                }
                MessageHeader::DictionaryBatch(header) => {
                    apply_dictionary(&self.schema, &header, &body, &mut self.dictionaries)?;
                }
                MessageHeader::Schema(_) => {
                    return Err(mismatch("unexpected second schema message"));
                }
            }
        }
    }
}

impl<R: Read> Iterator for IpcStreamReader<R> {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let out = self.next_batch().transpose();
        if !matches!(out, Some(Ok(_))) {
            self.done = true;
        }
        out
    }
}

impl<R: Read> RecordBatchReader for IpcStreamReader<R> {
    fn schema(&self) -> Schema {
        self.schema.schema.clone()
    }
}

// ---------------------------------------------------------------
// File reader
// ---------------------------------------------------------------

/// Random-access reader for the file flavour.
///
/// Every dictionary listed in the footer is loaded when the file is opened.
pub struct IpcFileReader<R: Read + Seek> {
    source: R,
    schema: IpcSchema,
    blocks: Vec<Block>,
    dictionaries: Dictionaries,
}

impl<R: Read + Seek> IpcFileReader<R> {
    /// Checks both magics, parses the footer and loads the dictionaries.
    ///
    /// # Errors
    /// `CorruptFooter` if the magic, footer length or footer bytes are bad.
    pub fn try_new(mut source: R) -> Result<Self> {
        let corrupt = |msg: &str| InterchangeError::CorruptFooter(msg.to_string());
        let file_len = source.seek(SeekFrom::End(0))?;
        if file_len < 18 {
            return Err(corrupt("file too small for the IPC file format"));
        }
        source.seek(SeekFrom::Start(0))?;
        let mut head = [0u8; 6];
        source.read_exact(&mut head)?;
        if &head != ARROW_MAGIC {
            return Err(corrupt("missing leading ARROW1 magic"));
        }
        source.seek(SeekFrom::End(-10))?;
        let mut tail = [0u8; 10];
        source.read_exact(&mut tail)?;
        if &tail[4..] != ARROW_MAGIC {
            return Err(corrupt("missing trailing ARROW1 magic"));
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&tail[..4]);
        let footer_len = i32::from_le_bytes(len);
        if footer_len <= 0 || footer_len as u64 > file_len - 18 {
            return Err(corrupt("footer length out of bounds"));
        }
        source.seek(SeekFrom::End(-10 - footer_len as i64))?;
        let mut footer = vec![0u8; footer_len as usize];
        source.read_exact(&mut footer)?;
        let footer =
            decode_footer(&footer).map_err(|e| InterchangeError::CorruptFooter(e.to_string()))?;
        debug!(
            batches = footer.record_batches.len(),
            dictionaries = footer.dictionaries.len(),
            columns = footer.schema.schema.len(),
            "IPC file footer parsed"
        );
        let mut reader = Self {
            source,
            schema: footer.schema,
            blocks: footer.record_batches,
            dictionaries: HashMap::new(),
        };
        for block in &footer.dictionaries {
            let (msg, body) = reader.read_block(block)?;
            match msg.header {
                MessageHeader::DictionaryBatch(header) => {
                    apply_dictionary(&reader.schema, &header, &body, &mut reader.dictionaries)?
                }
                _ => return Err(invalid("file block does not point at a dictionary batch")),
            }
        }
        Ok(reader)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema.schema
    }

    pub fn num_batches(&self) -> usize {
        self.blocks.len()
    }

    fn read_block(&mut self, block: &Block) -> Result<(Message, Bytes)> {
        self.source.seek(SeekFrom::Start(block.offset + 8))?;
        let mut meta = vec![0u8; block.metadata_len as usize - 8];
        self.source.read_exact(&mut meta)?;
        let msg = decode_metadata(&meta)?;
        if msg.body_len != block.body_len {
            return Err(invalid("block and message disagree on the body length"));
        }
        let body = read_body(&mut self.source, msg.body_len)?;
        Ok((msg, body))
    }

    /// Reads batch `i`.
    pub fn read_batch(&mut self, i: usize) -> Result<RecordBatch> {
        let block = *self.blocks.get(i).ok_or(InterchangeError::IndexOutOfBounds {
            index: i,
            len: self.blocks.len(),
        })?;
        let (msg, body) = self.read_block(&block)?;
        match msg.header {
            MessageHeader::RecordBatch(header) => {
                decode_batch(&self.schema, &header, &body, &self.dictionaries)
            }
            _ => Err(invalid("file block does not point at a record batch")),
        }
    }

    /// Reads every batch into a table.
    pub fn read_all(&mut self) -> Result<Table> {
        let batches = (0..self.num_batches())
            .map(|i| self.read_batch(i))
            .collect::<Result<Vec<_>>>()?;
        Table::try_new(self.schema.schema.clone(), batches)
    }
}

/// Reads a whole file or stream into a table.
pub fn read_ipc<R: Read + Seek>(source: R, format: IpcFormat) -> Result<Table> {
    match format {
        IpcFormat::File => IpcFileReader::try_new(source)?.read_all(),
        IpcFormat::Stream => IpcStreamReader::try_new(source)?.read_all(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::compression::Compression;
    use crate::io::ipc::message::{padded, write_eos, write_message};
    use crate::io::ipc::{IpcWriteOptions, write_ipc};
    use crate::Field;
    use std::io::Cursor;

    fn table() -> Table {
        let b = RecordBatch::from_arrays(
            &["n", "s"],
            vec![
                Array::from_options(&[Some(1i64), None, Some(3)]),
                Array::from_opt_strs(&[Some("a"), Some("bb"), None]),
            ],
        )
        .unwrap();
        Table::from_batches(vec![b.clone(), b.slice(1, 2).unwrap()], None).unwrap()
    }

    #[test]
    fn file_random_access() {
        let t = table();
        let mut buf = Cursor::new(Vec::new());
        write_ipc(&t, &mut buf, IpcWriteOptions::default().with_format(IpcFormat::File)).unwrap();
        let mut r = IpcFileReader::try_new(buf).unwrap();
        assert_eq!(r.num_batches(), 2);
        assert_eq!(r.read_batch(1).unwrap(), t.batches()[1]);
        assert_eq!(r.read_batch(0).unwrap(), t.batches()[0]);
        assert!(matches!(
            r.read_batch(2),
            Err(InterchangeError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn stream_reader_iterates_until_eos() {
        let t = table();
        let mut buf = Vec::new();
        write_ipc(&t, &mut buf, IpcWriteOptions::default()).unwrap();
        let reader = IpcStreamReader::try_new(Cursor::new(buf)).unwrap();
        assert_eq!(reader.schema(), *t.schema());
        let back = reader.read_all().unwrap();
        assert_eq!(back, t);
        assert_eq!(back.chunk_lengths(), vec![3, 2]);
    }

    #[test]
    fn truncated_file_is_corrupt_footer() {
        let mut buf = Vec::new();
        write_ipc(&table(), &mut buf, IpcWriteOptions::default().with_format(IpcFormat::File))
            .unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            IpcFileReader::try_new(Cursor::new(buf)),
            Err(InterchangeError::CorruptFooter(_))
        ));
    }

    #[test]
    fn declared_schema_must_match_batch_layout() {
        let t = table();
        let mut buf = Vec::new();
        write_ipc(&t, &mut buf, IpcWriteOptions::default()).unwrap();

        // Swap the schema message for one declaring a third column.
        let mut wider = t.schema().clone();
        wider.fields.push(Field::new("extra", DataType::Int32, true));
        let mut forged = Vec::new();
        let wider = IpcSchema::new(wider).unwrap();
        write_message(&mut forged, &MessageHeader::Schema(wider), &[]).unwrap();
        let original_schema_len = {
            let mut c = Cursor::new(&buf);
            let msg = read_message_header(&mut c).unwrap().unwrap();
            assert_eq!(msg.body_len, 0);
            c.position() as usize
        };
        forged.extend_from_slice(&buf[original_schema_len..]);

        let mut reader = IpcStreamReader::try_new(Cursor::new(forged)).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(InterchangeError::SchemaMismatch(_)))
        ));
        assert!(reader.next().is_none());
    }

    fn dictionary_table() -> Table {
        let batch = |keys: &[i16], values: &[&str]| {
            let tags = Array::try_new_dictionary(
                Array::from_options(&keys.iter().map(|k| (*k >= 0).then_some(*k)).collect::<Vec<_>>()),
                Array::from_strs(values),
            )
            .unwrap();
            RecordBatch::from_arrays(&["n", "tag"], vec![Array::from_slice(&vec![1i64; keys.len()]), tags])
                .unwrap()
        };
        Table::from_batches(
            vec![batch(&[0, 1, -1], &["red", "green"]), batch(&[1, 1], &["red", "green"])],
            None,
        )
        .unwrap()
    }

    #[test]
    fn dictionaries_round_trip_in_both_formats() {
        let t = dictionary_table();
        for format in [IpcFormat::Stream, IpcFormat::File] {
            for compression in [Compression::None, Compression::Zstd, Compression::Lz4] {
                if !compression.is_available() {
                    continue;
                }
                let opts = IpcWriteOptions::default()
                    .with_format(format)
                    .with_compression(compression);
                let mut buf = Cursor::new(Vec::new());
                write_ipc(&t, &mut buf, opts).unwrap();
                buf.set_position(0);
                assert_eq!(read_ipc(buf, format).unwrap(), t, "{format:?} {compression}");
            }
        }
    }

    #[test]
    fn delta_dictionaries_extend_the_current_one() {
        let t = dictionary_table();
        let mut buf = Vec::new();
        write_ipc(&t, &mut buf, IpcWriteOptions::default()).unwrap();

        // Re-frame: schema, dictionary, first batch, then a delta adding "blue"
        // and a batch that points at it.
        let mut cursor = Cursor::new(buf.as_slice());
        let mut messages = Vec::new();
        while let Some(msg) = read_message_header(&mut cursor).unwrap() {
            let body = read_body(&mut cursor, msg.body_len).unwrap();
            messages.push((msg, body));
        }
        let schema = match &messages[0].0.header {
            MessageHeader::Schema(s) => s.clone(),
            other => panic!("unexpected {other:?}"),
        };

        let blue = Array::from_strs(&["blue"]);
        let mut body = Vec::new();
        let offsets = blue.buffers()[0].as_slice();
        let values = blue.buffers()[1].as_slice();
        body.extend_from_slice(offsets);
        body.resize(padded(body.len()), 0);
        let values_at = body.len();
        body.extend_from_slice(values);
        body.resize(padded(body.len()), 0);
        let delta = MessageHeader::DictionaryBatch(DictionaryBatchHeader {
            id: 0,
            data: RecordBatchHeader {
                length: 1,
                compression: Compression::None,
                nodes: vec![FieldNode { length: 1, null_count: 0 }],
                buffers: vec![
                    BufferSpec { offset: 0, length: 0 },
                    BufferSpec { offset: 0, length: offsets.len() as i64 },
                    BufferSpec { offset: values_at as i64, length: values.len() as i64 },
                ],
                variadic_counts: Vec::new(),
            },
            is_delta: true,
        });

        let mut out = Vec::new();
        for (msg, body) in &messages[..3] {
            write_message(&mut out, &msg.header, body).unwrap();
        }
        write_message(&mut out, &delta, &body).unwrap();
        let (last, last_body) = &messages[3];
        write_message(&mut out, &last.header, last_body).unwrap();
        write_eos(&mut out).unwrap();

        let back = IpcStreamReader::try_new(Cursor::new(out)).unwrap().read_all().unwrap();
        let tags = back.batches()[1].column(1).unwrap();
        assert_eq!(tags.dictionary().unwrap(), &Array::from_strs(&["red", "green", "blue"]));
        assert_eq!(schema.dictionary_ids, vec![0]);
    }

    #[test]
    fn batch_before_its_dictionary_is_invalid() {
        let t = dictionary_table();
        let mut buf = Vec::new();
        write_ipc(&t, &mut buf, IpcWriteOptions::default()).unwrap();
        let mut cursor = Cursor::new(buf.as_slice());
        let mut out = Vec::new();
        while let Some(msg) = read_message_header(&mut cursor).unwrap() {
            let body = read_body(&mut cursor, msg.body_len).unwrap();
            if !matches!(msg.header, MessageHeader::DictionaryBatch(_)) {
                write_message(&mut out, &msg.header, &body).unwrap();
            }
        }
        write_eos(&mut out).unwrap();
        let mut reader = IpcStreamReader::try_new(Cursor::new(out)).unwrap();
        assert!(matches!(reader.next(), Some(Err(InterchangeError::Io(_)))));
    }
}
