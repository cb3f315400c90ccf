//! IPC writer
//!
//! [`IpcWriter`] moves through `Fresh → SchemaDone → Closed`: the header and
//! schema are written with the first batch (or at `finish` for an empty
//! stream), and `finish` writes the end-of-stream marker plus, for files, the
//! footer. A writer that hit an I/O or codec error refuses further calls, so a
//! failed file never gets a footer.
//!
//! Dictionaries are sent as `DictionaryBatch` messages ahead of the first batch
//! that uses them. A stream re-sends a dictionary whenever a later batch holds a
//! different one; a file cannot replace a dictionary, so such a batch is
//! refused before anything of it is written.

use std::collections::HashMap;
use std::io::Write;

use tracing::{debug, trace};

use crate::enums::error::{InterchangeError, Result};
use crate::ffi::arrow_dtype::Layout;
use crate::io::CountingWriter;
use crate::io::compression::{Compression, compress_ipc};
use crate::io::ipc::message::{
    ARROW_MAGIC, Block, BufferSpec, DictionaryBatchHeader, FieldNode, IpcSchema, MessageHeader,
    RecordBatchHeader, encode_footer, padded, write_eos, write_message,
};
use crate::io::ipc::{IpcFormat, IpcWriteOptions};
use crate::structs::bitmask::bytes_for;
use crate::traits::concatenate::compact;
use crate::{Array, RecordBatch, Schema, Table};

/// Lifecycle of an [`IpcWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing written yet.
    Fresh,
    /// Header and schema written; batches may follow.
    SchemaDone,
    /// Finished, or failed.
    Closed,
}

/// Incremental IPC writer over any `Write` sink.
///
/// File offsets are tracked by counting written bytes, so the file flavour does
/// not need to seek.
pub struct IpcWriter<W: Write> {
    sink: CountingWriter<W>,
    schema: IpcSchema,
    options: IpcWriteOptions,
    state: WriterState,
    failed: bool,
    blocks: Vec<Block>,
    dictionary_blocks: Vec<Block>,
    /// Last dictionary sent for each id.
    sent: HashMap<i64, Array>,
}

impl<W: Write> IpcWriter<W> {
    /// Creates a writer for batches of `schema`.
    ///
    /// # Errors
    /// `UnsupportedOperation` for Snappy, which the wire format does not define,
    /// or for dictionaries nested inside dictionary values. `Compression` when
    /// the chosen codec is not compiled in.
    pub fn try_new(sink: W, schema: Schema, options: IpcWriteOptions) -> Result<Self> {
        match options.compression {
            Compression::Snappy => {
                return Err(InterchangeError::UnsupportedOperation(
                    "IPC buffers support only LZ4 and Zstd compression".into(),
                ));
            }
            c if !c.is_available() => {
                return Err(InterchangeError::Compression(format!(
                    "{c} support is not enabled"
                )));
            }
            _ => {}
        }
        Ok(Self {
            sink: CountingWriter::new(sink),
            schema: IpcSchema::new(schema)?,
            options,
            state: WriterState::Fresh,
            failed: false,
            blocks: Vec::new(),
            dictionary_blocks: Vec::new(),
            sent: HashMap::new(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema.schema
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Appends one batch.
    ///
    /// # Errors
    /// - `SchemaMismatch` if the batch's column types differ from the writer's
    ///   schema.
    /// - `UnsupportedOperation` if a file writer meets a dictionary that differs
    ///   from the one already written for the same field.
    ///
    /// Nothing is written in either case and the writer stays usable.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.ensure_open()?;
        if !batch.schema().is_interchange_compatible(&self.schema.schema) {
            return Err(InterchangeError::SchemaMismatch(format!(
                "batch columns [{}] do not match the writer schema [{}]",
                batch.schema(),
                self.schema.schema
            )));
        }
        let columns = batch
            .columns()
            .iter()
            .map(compact)
            .collect::<Result<Vec<_>>>()?;
        let pending = self.pending_dictionaries(&columns)?;
        let result = self.write_batch_inner(batch.num_rows(), &columns, pending);
        self.poison_on_err(result)
    }

    /// Dictionaries of `columns` that still have to be sent, by id.
    fn pending_dictionaries(&self, columns: &[Array]) -> Result<Vec<(i64, Array)>> {
        let mut found = Vec::with_capacity(self.schema.dictionary_ids.len());
        for column in columns {
            collect_dictionaries(column, &mut found)?;
        }
        let mut pending = Vec::new();
        for (&id, dictionary) in self.schema.dictionary_ids.iter().zip(found) {
            match self.sent.get(&id) {
                Some(previous) if *previous == dictionary => {}
                Some(_) if self.options.format == IpcFormat::File => {
                    return Err(InterchangeError::UnsupportedOperation(format!(
                        "dictionary {id} changed, and the IPC file format cannot replace dictionaries"
                    )));
                }
                _ => pending.push((id, dictionary)),
            }
        }
        Ok(pending)
    }

    /// Appends every batch of `table`.
    pub fn write_table(&mut self, table: &Table) -> Result<()> {
        for batch in table.batches() {
            self.write_batch(batch)?;
        }
        Ok(())
    }

    /// Writes the end-of-stream marker and, for files, the footer.
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = self.finish_inner();
        self.poison_on_err(result)?;
        self.state = WriterState::Closed;
        Ok(())
    }

    /// Returns the sink. Call [`IpcWriter::finish`] first.
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.failed {
            return Err(InterchangeError::UnsupportedOperation(
                "IPC writer failed earlier and cannot continue".into(),
            ));
        }
        if self.state == WriterState::Closed {
            return Err(InterchangeError::UnsupportedOperation(
                "IPC writer is already closed".into(),
            ));
        }
        Ok(())
    }

    fn poison_on_err(&mut self, result: Result<()>) -> Result<()> {
        if result.is_err() {
            self.failed = true;
            self.state = WriterState::Closed;
        }
        result
    }

    fn write_header(&mut self) -> Result<()> {
        if self.state != WriterState::Fresh {
            return Ok(());
        }
        if self.options.format == IpcFormat::File {
            self.sink.write_all(ARROW_MAGIC)?;
            self.sink.write_all(&[0, 0])?;
        }
        write_message(
            &mut self.sink,
            &MessageHeader::Schema(self.schema.clone()),
            &[],
        )?;
        self.state = WriterState::SchemaDone;
        debug!(columns = self.schema.schema.len(), format = ?self.options.format, "IPC schema written");
        Ok(())
    }

    /// Writes one message and returns its block.
    fn write_block(&mut self, header: &MessageHeader, body: &[u8]) -> Result<Block> {
        let offset = self.sink.position();
        let (metadata_len, body_len) = write_message(&mut self.sink, header, body)?;
        Ok(Block {
            offset,
            metadata_len: metadata_len as u32,
            body_len: body_len as u64,
        })
    }

    fn write_batch_inner(
        &mut self,
        num_rows: usize,
        columns: &[Array],
        dictionaries: Vec<(i64, Array)>,
    ) -> Result<()> {
        self.write_header()?;
        for (id, dictionary) in dictionaries {
            let mut body = BodyBuilder::new(self.options.compression);
            body.push_array(&dictionary)?;
            let header = MessageHeader::DictionaryBatch(DictionaryBatchHeader {
                id,
                data: body.header(dictionary.len()),
                is_delta: false,
            });
            let block = self.write_block(&header, &body.body)?;
            self.dictionary_blocks.push(block);
            trace!(id, values = dictionary.len(), "IPC dictionary written");
            self.sent.insert(id, dictionary);
        }

        let mut body = BodyBuilder::new(self.options.compression);
        for column in columns {
            body.push_array(column)?;
        }
        let header = MessageHeader::RecordBatch(body.header(num_rows));
        let block = self.write_block(&header, &body.body)?;
        self.blocks.push(block);
        trace!(rows = num_rows, body_len = block.body_len, "IPC record batch written");
        Ok(())
    }

    fn finish_inner(&mut self) -> Result<()> {
        self.write_header()?;
        write_eos(&mut self.sink)?;
        if self.options.format == IpcFormat::File {
            let footer = encode_footer(&self.schema, &self.dictionary_blocks, &self.blocks)?;
            self.sink.write_all(&footer)?;
            self.sink.write_all(&(footer.len() as i32).to_le_bytes())?;
            self.sink.write_all(ARROW_MAGIC)?;
        }
        self.sink.flush()?;
        debug!(batches = self.blocks.len(), bytes = self.sink.position(), "IPC writer finished");
        Ok(())
    }
}

/// Dictionary values of `array` and its descendants, in pre-order.
fn collect_dictionaries(array: &Array, out: &mut Vec<Array>) -> Result<()> {
    if let Some(dictionary) = array.dictionary() {
        out.push(compact(dictionary)?);
    }
    for child in array.children() {
        collect_dictionaries(child, out)?;
    }
    Ok(())
}

/// Flattens arrays into field nodes and an 8-byte aligned body.
struct BodyBuilder {
    compression: Compression,
    nodes: Vec<FieldNode>,
    buffers: Vec<BufferSpec>,
    variadic_counts: Vec<i64>,
    body: Vec<u8>,
}

impl BodyBuilder {
    fn new(compression: Compression) -> Self {
        Self {
            compression,
            nodes: Vec::new(),
            buffers: Vec::new(),
            variadic_counts: Vec::new(),
            body: Vec::new(),
        }
    }

    fn header(&mut self, length: usize) -> RecordBatchHeader {
        RecordBatchHeader {
            length: length as i64,
            compression: self.compression,
            nodes: std::mem::take(&mut self.nodes),
            buffers: std::mem::take(&mut self.buffers),
            variadic_counts: std::mem::take(&mut self.variadic_counts),
        }
    }

    fn push_buffer(&mut self, bytes: &[u8]) -> Result<()> {
        let offset = self.body.len();
        if !bytes.is_empty() {
            if self.compression == Compression::None {
                self.body.extend_from_slice(bytes);
            } else {
                let packed = compress_ipc(bytes, self.compression)?;
                if packed.len() < bytes.len() {
                    self.body.extend_from_slice(&(bytes.len() as i64).to_le_bytes());
                    self.body.extend_from_slice(&packed);
                } else {
                    self.body.extend_from_slice(&(-1i64).to_le_bytes());
                    self.body.extend_from_slice(bytes);
                }
            }
        }
        let length = self.body.len() - offset;
        self.body.resize(padded(self.body.len()), 0);
        self.buffers.push(BufferSpec {
            offset: offset as i64,
            length: length as i64,
        });
        Ok(())
    }

    /// Pre-order: node, its buffers, then children. Dictionary values are not
    /// part of the body; only the keys are.
    ///
    /// `array` must be packed (offset zero), as produced by `compact`.
    fn push_array(&mut self, array: &Array) -> Result<()> {
        let layout = array.data_type().layout();
        if layout == Layout::View {
            self.variadic_counts
                .push(array.buffers().len().saturating_sub(1) as i64);
        }
        self.nodes.push(FieldNode {
            length: array.len() as i64,
            null_count: array.null_count() as i64,
        });
        if layout == Layout::Null {
            return Ok(());
        }
        match array.validity() {
            Some(mask) if array.null_count() > 0 => {
                let bytes = &mask.as_bytes()[..bytes_for(array.len())];
                self.push_buffer(bytes)?;
            }
            _ => self.push_buffer(&[])?,
        }
        for buffer in array.buffers() {
            self.push_buffer(buffer.as_slice())?;
        }
        for child in array.children() {
            self.push_array(child)?;
        }
        Ok(())
    }
}

/// Writes `table` to `sink` in one call.
pub fn write_ipc<W: Write>(table: &Table, sink: W, options: IpcWriteOptions) -> Result<()> {
    let mut writer = IpcWriter::try_new(sink, table.schema().clone(), options)?;
    writer.write_table(table)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Field;

    fn batch() -> RecordBatch {
        RecordBatch::from_arrays(
            &["a", "b"],
            vec![
                Array::from_options(&[Some(1i32), None, Some(3)]),
                Array::from_strs(&["x", "y", "z"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn state_machine() {
        let b = batch();
        let mut w = IpcWriter::try_new(Vec::new(), b.schema().clone(), IpcWriteOptions::default())
            .unwrap();
        assert_eq!(w.state(), WriterState::Fresh);
        w.write_batch(&b).unwrap();
        assert_eq!(w.state(), WriterState::SchemaDone);
        w.finish().unwrap();
        assert_eq!(w.state(), WriterState::Closed);
        assert!(matches!(
            w.write_batch(&b),
            Err(InterchangeError::UnsupportedOperation(_))
        ));
        let bytes = w.into_inner();
        assert_eq!(&bytes[bytes.len() - 8..], &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
    }

    #[test]
    fn rejects_batches_of_another_schema() {
        let b = batch();
        let other = Schema::from(vec![Field::new("a", crate::DataType::Int64, true)]);
        let mut w = IpcWriter::try_new(Vec::new(), other, IpcWriteOptions::default()).unwrap();
        assert!(matches!(
            w.write_batch(&b),
            Err(InterchangeError::SchemaMismatch(_))
        ));
        // Nothing was written, the writer is still usable.
        assert_eq!(w.state(), WriterState::Fresh);
    }

    #[test]
    fn snappy_is_rejected() {
        let opts = IpcWriteOptions::default().with_compression(Compression::Snappy);
        assert!(matches!(
            IpcWriter::try_new(Vec::new(), Schema::default(), opts),
            Err(InterchangeError::UnsupportedOperation(_))
        ));
    }

    fn dictionary_batch(values: &[&str], keys: &[i32]) -> RecordBatch {
        let column =
            Array::try_new_dictionary(Array::from_slice(keys), Array::from_strs(values)).unwrap();
        RecordBatch::from_arrays(&["tag"], vec![column]).unwrap()
    }

    fn message_kinds(bytes: &[u8]) -> Vec<&'static str> {
        let mut cursor = std::io::Cursor::new(bytes);
        let mut kinds = Vec::new();
        while let Some(msg) = crate::io::ipc::message::read_message_header(&mut cursor).unwrap() {
            cursor.set_position(cursor.position() + msg.body_len);
            kinds.push(match msg.header {
                MessageHeader::Schema(_) => "schema",
                MessageHeader::DictionaryBatch(_) => "dictionary",
                MessageHeader::RecordBatch(_) => "batch",
            });
        }
        kinds
    }

    #[test]
    fn stream_sends_dictionaries_once_until_they_change() {
        let first = dictionary_batch(&["a", "b"], &[0, 1, 0]);
        let same = dictionary_batch(&["a", "b"], &[1, 1]);
        let changed = dictionary_batch(&["x", "y", "z"], &[2, 0]);
        let mut w =
            IpcWriter::try_new(Vec::new(), first.schema().clone(), IpcWriteOptions::default())
                .unwrap();
        for b in [&first, &same, &changed] {
            w.write_batch(b).unwrap();
        }
        w.finish().unwrap();
        assert_eq!(
            message_kinds(&w.into_inner()),
            vec!["schema", "dictionary", "batch", "batch", "dictionary", "batch"]
        );
    }

    #[test]
    fn file_refuses_to_replace_a_dictionary() {
        let first = dictionary_batch(&["a", "b"], &[0, 1]);
        let changed = dictionary_batch(&["c"], &[0, 0]);
        let opts = IpcWriteOptions::default().with_format(IpcFormat::File);
        let mut w = IpcWriter::try_new(Vec::new(), first.schema().clone(), opts).unwrap();
        w.write_batch(&first).unwrap();
        assert!(matches!(
            w.write_batch(&changed),
            Err(InterchangeError::UnsupportedOperation(_))
        ));
        // The refused batch left no trace, so the file still closes cleanly.
        w.write_batch(&first).unwrap();
        w.finish().unwrap();
        let bytes = w.into_inner();
        let mut reader = crate::io::ipc::IpcFileReader::try_new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(reader.num_batches(), 2);
        assert_eq!(reader.read_batch(1).unwrap(), first);
    }

    #[test]
    fn file_layout_has_magic_at_both_ends() {
        let table = Table::from(batch());
        let mut out = Vec::new();
        write_ipc(
            &table,
            &mut out,
            IpcWriteOptions::default().with_format(IpcFormat::File),
        )
        .unwrap();
        assert_eq!(&out[..6], ARROW_MAGIC);
        assert_eq!(&out[out.len() - 6..], ARROW_MAGIC);
    }
}
