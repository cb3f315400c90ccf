//! # IPC message framing and metadata
//!
//! Every message is framed as
//!
//! ```text
//! 0xFFFFFFFF | i32 metadata length | Message flatbuffer (8-byte padded) | body
//! ```
//!
//! and a stream ends with `0xFFFFFFFF 0x00000000`. The metadata is the Arrow
//! `Message` table of `Message.fbs`, written as metadata version V5, so the
//! bytes are readable by any Arrow implementation.
//!
//! Dictionary-encoded fields carry their value type as the field type and a
//! `DictionaryEncoding` with an id. Ids are handed out in depth-first
//! pre-order over the schema, and dictionaries travel in their own
//! `DictionaryBatch` messages.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::slice;

use flatbuffers::{
    FlatBufferBuilder, ForwardsUOffset, TableFinishedWIPOffset, VOffsetT, Vector, WIPOffset,
};

use crate::enums::error::{InterchangeError, Result};
use crate::enums::time_units::TimeUnit;
use crate::io::compression::Compression;
use crate::io::ipc::format::{
    self, CODEC_LZ4_FRAME, CODEC_ZSTD, FooterTable, MessageTable, VERSION_V4, VERSION_V5, View,
    header, slot, type_id,
};
use crate::{DataType, Field, Schema};

/// Continuation marker preceding every message.
pub const CONTINUATION: u32 = 0xFFFF_FFFF;

/// Leading and trailing magic of the file format.
pub const ARROW_MAGIC: &[u8; 6] = b"ARROW1";

type Offset = WIPOffset<TableFinishedWIPOffset>;

/// Rounds `n` up to a multiple of 8.
#[inline]
pub(crate) fn padded(n: usize) -> usize {
    n.div_ceil(8) * 8
}

/// Malformed message content.
pub(crate) fn invalid(msg: impl Into<String>) -> InterchangeError {
    InterchangeError::Io(io::Error::new(io::ErrorKind::InvalidData, msg.into()))
}

fn unsupported(msg: impl Into<String>) -> InterchangeError {
    InterchangeError::UnsupportedOperation(msg.into())
}

/// Length and null count of one flattened array node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldNode {
    pub length: i64,
    pub null_count: i64,
}

/// Location of one buffer inside a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSpec {
    pub offset: i64,
    pub length: i64,
}

/// Header of a record batch message.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatchHeader {
    pub length: i64,
    pub compression: Compression,
    pub nodes: Vec<FieldNode>,
    pub buffers: Vec<BufferSpec>,
    /// Data buffer count of every view array, in node order.
    pub variadic_counts: Vec<i64>,
}

/// Header of a dictionary batch: one column holding the dictionary values.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryBatchHeader {
    pub id: i64,
    pub data: RecordBatchHeader,
    /// Append to the dictionary already held for `id` instead of replacing it.
    pub is_delta: bool,
}

/// A schema together with the ids of its dictionary-encoded types.
#[derive(Debug, Clone, PartialEq)]
pub struct IpcSchema {
    pub schema: Schema,
    /// One id per dictionary type, in depth-first pre-order.
    pub dictionary_ids: Vec<i64>,
}

impl IpcSchema {
    /// Numbers the dictionaries of `schema` from zero.
    ///
    /// # Errors
    /// `UnsupportedOperation` when a dictionary's values are themselves
    /// dictionary encoded somewhere below.
    pub fn new(schema: Schema) -> Result<Self> {
        let types = dictionary_types(&schema);
        for dt in &types {
            if let DataType::Dictionary(_, value) = dt {
                let mut nested = Vec::new();
                collect_dictionary_types(value, &mut nested);
                if !nested.is_empty() {
                    return Err(unsupported(format!(
                        "dictionary values of type {value} contain another dictionary"
                    )));
                }
            }
        }
        let dictionary_ids = (0..types.len() as i64).collect();
        Ok(Self {
            schema,
            dictionary_ids,
        })
    }

    /// `(id, value type)` of every dictionary, in pre-order.
    pub fn dictionaries(&self) -> Vec<(i64, &DataType)> {
        self.dictionary_ids
            .iter()
            .copied()
            .zip(dictionary_types(&self.schema))
            .filter_map(|(id, dt)| match dt {
                DataType::Dictionary(_, value) => Some((id, value.as_ref())),
                _ => None,
            })
            .collect()
    }
}

fn collect_dictionary_types<'a>(data_type: &'a DataType, out: &mut Vec<&'a DataType>) {
    let children = match data_type {
        DataType::Dictionary(_, value) => {
            out.push(data_type);
            value.children()
        }
        other => other.children(),
    };
    for child in children {
        collect_dictionary_types(&child.data_type, out);
    }
}

/// Dictionary types of `schema` in depth-first pre-order.
pub(crate) fn dictionary_types(schema: &Schema) -> Vec<&DataType> {
    let mut out = Vec::new();
    for field in &schema.fields {
        collect_dictionary_types(&field.data_type, &mut out);
    }
    out
}

/// Decoded message header.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageHeader {
    Schema(IpcSchema),
    RecordBatch(RecordBatchHeader),
    DictionaryBatch(DictionaryBatchHeader),
}

/// One framed message: header plus body length.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub body_len: u64,
}

// ---------------------------------------------------------------
// Building
// ---------------------------------------------------------------

fn int_width(data_type: &DataType) -> Option<(i32, bool)> {
    Some(match data_type {
        DataType::Int8 => (8, true),
        DataType::Int16 => (16, true),
        DataType::Int32 => (32, true),
        DataType::Int64 => (64, true),
        DataType::UInt8 => (8, false),
        DataType::UInt16 => (16, false),
        DataType::UInt32 => (32, false),
        DataType::UInt64 => (64, false),
        _ => return None,
    })
}

fn unit_code(unit: TimeUnit) -> i16 {
    match unit {
        TimeUnit::Second => 0,
        TimeUnit::Millisecond => 1,
        TimeUnit::Microsecond => 2,
        TimeUnit::Nanosecond => 3,
    }
}

fn build_metadata<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    metadata: &BTreeMap<String, String>,
) -> Option<WIPOffset<Vector<'a, ForwardsUOffset<TableFinishedWIPOffset>>>> {
    if metadata.is_empty() {
        return None;
    }
    let pairs: Vec<Offset> = metadata
        .iter()
        .map(|(k, v)| {
            let key = fbb.create_string(k);
            let value = fbb.create_string(v);
            let start = fbb.start_table();
            fbb.push_slot_always(slot::key_value::KEY, key);
            fbb.push_slot_always(slot::key_value::VALUE, value);
            fbb.end_table(start)
        })
        .collect();
    Some(fbb.create_vector(&pairs))
}

fn int_table(fbb: &mut FlatBufferBuilder<'_>, bits: i32, signed: bool) -> Offset {
    let start = fbb.start_table();
    fbb.push_slot::<i32>(slot::TYPE_FIRST, bits, 0);
    fbb.push_slot::<bool>(slot::TYPE_SECOND, signed, false);
    fbb.end_table(start)
}

/// Type tag and table for a non-dictionary type.
fn build_type(fbb: &mut FlatBufferBuilder<'_>, data_type: &DataType) -> Result<(u8, Offset)> {
    use type_id::*;
    if let Some((bits, signed)) = int_width(data_type) {
        return Ok((INT, int_table(fbb, bits, signed)));
    }
    // Strings must exist before the type table is opened.
    let timezone = match data_type {
        DataType::Timestamp(_, Some(tz)) => Some(fbb.create_string(tz)),
        _ => None,
    };
    let start = fbb.start_table();
    let tag = match data_type {
        DataType::Null => NULL,
        DataType::Boolean => BOOL,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let precision = match data_type {
                DataType::Float16 => 0,
                DataType::Float32 => 1,
                _ => 2,
            };
            fbb.push_slot::<i16>(slot::TYPE_FIRST, precision, 0);
            FLOATING_POINT
        }
        DataType::Decimal32(p, s)
        | DataType::Decimal64(p, s)
        | DataType::Decimal128(p, s)
        | DataType::Decimal256(p, s) => {
            let bits = match data_type {
                DataType::Decimal32(..) => 32,
                DataType::Decimal64(..) => 64,
                DataType::Decimal128(..) => 128,
                _ => 256,
            };
            fbb.push_slot::<i32>(slot::TYPE_FIRST, *p as i32, 0);
            fbb.push_slot::<i32>(slot::TYPE_SECOND, *s as i32, 0);
            fbb.push_slot::<i32>(slot::TYPE_THIRD, bits, 128);
            DECIMAL
        }
        DataType::Utf8 => UTF8,
        DataType::LargeUtf8 => LARGE_UTF8,
        DataType::Utf8View => UTF8_VIEW,
        DataType::Binary => BINARY,
        DataType::LargeBinary => LARGE_BINARY,
        DataType::BinaryView => BINARY_VIEW,
        DataType::FixedSizeBinary(width) => {
            fbb.push_slot::<i32>(slot::TYPE_FIRST, *width, 0);
            FIXED_SIZE_BINARY
        }
        DataType::Date32 | DataType::Date64 => {
            let unit = if matches!(data_type, DataType::Date32) { 0 } else { 1 };
            fbb.push_slot::<i16>(slot::TYPE_FIRST, unit, 1);
            DATE
        }
        DataType::Time32(unit) | DataType::Time64(unit) => {
            let bits = if matches!(data_type, DataType::Time32(_)) { 32 } else { 64 };
            fbb.push_slot::<i16>(slot::TYPE_FIRST, unit_code(*unit), 1);
            fbb.push_slot::<i32>(slot::TYPE_SECOND, bits, 32);
            TIME
        }
        DataType::Timestamp(unit, _) => {
            fbb.push_slot::<i16>(slot::TYPE_FIRST, unit_code(*unit), 0);
            if let Some(tz) = timezone {
                fbb.push_slot_always(slot::TYPE_SECOND, tz);
            }
            TIMESTAMP
        }
        DataType::Duration(unit) => {
            fbb.push_slot::<i16>(slot::TYPE_FIRST, unit_code(*unit), 1);
            DURATION
        }
        DataType::List(_) => LIST,
        DataType::LargeList(_) => LARGE_LIST,
        DataType::FixedSizeList(_, size) => {
            fbb.push_slot::<i32>(slot::TYPE_FIRST, *size, 0);
            FIXED_SIZE_LIST
        }
        DataType::Struct(_) => STRUCT,
        DataType::Map(_, sorted) => {
            fbb.push_slot::<bool>(slot::TYPE_FIRST, *sorted, false);
            MAP
        }
        DataType::Dictionary(..) => {
            return Err(unsupported("dictionary values cannot be dictionary encoded"));
        }
        // Integers returned above.
        other => return Err(unsupported(format!("no IPC type for {other}"))),
    };
    Ok((tag, fbb.end_table(start)))
}

fn build_field(
    fbb: &mut FlatBufferBuilder<'_>,
    field: &Field,
    ids: &mut slice::Iter<'_, i64>,
) -> Result<Offset> {
    let name = fbb.create_string(&field.name);
    let (value_type, dictionary) = match &field.data_type {
        DataType::Dictionary(key, value) => {
            let id = *ids
                .next()
                .ok_or_else(|| unsupported("schema has more dictionaries than ids"))?;
            let (bits, signed) = int_width(key)
                .ok_or_else(|| unsupported(format!("dictionary key type {key}")))?;
            let index = int_table(fbb, bits, signed);
            let start = fbb.start_table();
            fbb.push_slot::<i64>(slot::dictionary_encoding::ID, id, 0);
            fbb.push_slot_always(slot::dictionary_encoding::INDEX_TYPE, index);
            (value.as_ref(), Some(fbb.end_table(start)))
        }
        other => (other, None),
    };
    let children = value_type
        .children()
        .into_iter()
        .map(|child| build_field(fbb, child, ids))
        .collect::<Result<Vec<_>>>()?;
    let children = fbb.create_vector(&children);
    let (tag, type_table) = build_type(fbb, value_type)?;
    let metadata = build_metadata(fbb, &field.metadata);

    let start = fbb.start_table();
    fbb.push_slot_always(slot::field::NAME, name);
    fbb.push_slot::<bool>(slot::field::NULLABLE, field.nullable, false);
    fbb.push_slot::<u8>(slot::field::TYPE_TYPE, tag, 0);
    fbb.push_slot_always(slot::field::TYPE, type_table);
    if let Some(dictionary) = dictionary {
        fbb.push_slot_always(slot::field::DICTIONARY, dictionary);
    }
    fbb.push_slot_always(slot::field::CHILDREN, children);
    if let Some(metadata) = metadata {
        fbb.push_slot_always(slot::field::CUSTOM_METADATA, metadata);
    }
    Ok(fbb.end_table(start))
}

fn build_schema(fbb: &mut FlatBufferBuilder<'_>, schema: &IpcSchema) -> Result<Offset> {
    let mut ids = schema.dictionary_ids.iter();
    let fields = schema
        .schema
        .fields
        .iter()
        .map(|f| build_field(fbb, f, &mut ids))
        .collect::<Result<Vec<_>>>()?;
    let fields = fbb.create_vector(&fields);
    let metadata = build_metadata(fbb, &schema.schema.metadata);
    let start = fbb.start_table();
    // Little endian is the zero default.
    fbb.push_slot::<i16>(slot::schema::ENDIANNESS, 0, 0);
    fbb.push_slot_always(slot::schema::FIELDS, fields);
    if let Some(metadata) = metadata {
        fbb.push_slot_always(slot::schema::CUSTOM_METADATA, metadata);
    }
    Ok(fbb.end_table(start))
}

fn build_record_batch(fbb: &mut FlatBufferBuilder<'_>, rb: &RecordBatchHeader) -> Result<Offset> {
    let nodes: Vec<format::FieldNode> = rb
        .nodes
        .iter()
        .map(|n| format::FieldNode::new(n.length, n.null_count))
        .collect();
    let nodes = fbb.create_vector(&nodes);
    let buffers: Vec<format::Buffer> = rb
        .buffers
        .iter()
        .map(|b| format::Buffer::new(b.offset, b.length))
        .collect();
    let buffers = fbb.create_vector(&buffers);
    let variadic = if rb.variadic_counts.is_empty() {
        None
    } else {
        Some(fbb.create_vector(&rb.variadic_counts))
    };
    let compression = match rb.compression {
        Compression::None => None,
        Compression::Lz4 | Compression::Zstd => {
            let codec = if rb.compression == Compression::Lz4 {
                CODEC_LZ4_FRAME
            } else {
                CODEC_ZSTD
            };
            let start = fbb.start_table();
            fbb.push_slot_always::<i8>(slot::body_compression::CODEC, codec);
            Some(fbb.end_table(start))
        }
        other => return Err(unsupported(format!("{other} is not an IPC body codec"))),
    };
    let start = fbb.start_table();
    fbb.push_slot::<i64>(slot::record_batch::LENGTH, rb.length, 0);
    fbb.push_slot_always(slot::record_batch::NODES, nodes);
    fbb.push_slot_always(slot::record_batch::BUFFERS, buffers);
    if let Some(compression) = compression {
        fbb.push_slot_always(slot::record_batch::COMPRESSION, compression);
    }
    if let Some(variadic) = variadic {
        fbb.push_slot_always(slot::record_batch::VARIADIC_BUFFER_COUNTS, variadic);
    }
    Ok(fbb.end_table(start))
}

/// Encodes a header and the body length as an unpadded `Message` flatbuffer.
pub fn encode_metadata(header: &MessageHeader, body_len: u64) -> Result<Vec<u8>> {
    let mut fbb = FlatBufferBuilder::new();
    let (tag, offset) = match header {
        MessageHeader::Schema(schema) => (header::SCHEMA, build_schema(&mut fbb, schema)?),
        MessageHeader::RecordBatch(rb) => (header::RECORD_BATCH, build_record_batch(&mut fbb, rb)?),
        MessageHeader::DictionaryBatch(db) => {
            let data = build_record_batch(&mut fbb, &db.data)?;
            let start = fbb.start_table();
            fbb.push_slot::<i64>(slot::dictionary_batch::ID, db.id, 0);
            fbb.push_slot_always(slot::dictionary_batch::DATA, data);
            fbb.push_slot::<bool>(slot::dictionary_batch::IS_DELTA, db.is_delta, false);
            (header::DICTIONARY_BATCH, fbb.end_table(start))
        }
    };
    let start = fbb.start_table();
    fbb.push_slot::<i16>(slot::message::VERSION, VERSION_V5, 0);
    fbb.push_slot::<u8>(slot::message::HEADER_TYPE, tag, 0);
    fbb.push_slot_always(slot::message::HEADER, offset);
    fbb.push_slot::<i64>(slot::message::BODY_LENGTH, body_len as i64, 0);
    let root = fbb.end_table(start);
    fbb.finish(root, None);
    Ok(fbb.finished_data().to_vec())
}

// ---------------------------------------------------------------
// Reading
// ---------------------------------------------------------------

fn read_metadata(view: View<'_>, at: VOffsetT) -> BTreeMap<String, String> {
    view.tables(at)
        .filter_map(|kv| {
            let key = kv.str(slot::key_value::KEY)?;
            let value = kv.str(slot::key_value::VALUE).unwrap_or_default();
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

fn int_type(bits: i32, signed: bool) -> Result<DataType> {
    Ok(match (bits, signed) {
        (8, true) => DataType::Int8,
        (16, true) => DataType::Int16,
        (32, true) => DataType::Int32,
        (64, true) => DataType::Int64,
        (8, false) => DataType::UInt8,
        (16, false) => DataType::UInt16,
        (32, false) => DataType::UInt32,
        (64, false) => DataType::UInt64,
        _ => return Err(invalid(format!("integer of {bits} bits"))),
    })
}

fn time_unit(code: i16) -> Result<TimeUnit> {
    Ok(match code {
        0 => TimeUnit::Second,
        1 => TimeUnit::Millisecond,
        2 => TimeUnit::Microsecond,
        3 => TimeUnit::Nanosecond,
        other => return Err(invalid(format!("time unit {other}"))),
    })
}

fn single_child(name: &str, mut children: Vec<Field>) -> Result<Box<Field>> {
    match children.len() {
        1 => Ok(Box::new(children.remove(0))),
        n => Err(invalid(format!("{name} field has {n} children, expected one"))),
    }
}

fn read_type(field: View<'_>, children: Vec<Field>) -> Result<DataType> {
    use type_id::*;
    let table = field.table(slot::field::TYPE);
    let short = |at: VOffsetT, default: i16| table.map_or(default, |t| t.scalar(at, default));
    let int = |at: VOffsetT, default: i32| table.map_or(default, |t| t.scalar(at, default));
    let flag = |at: VOffsetT| table.is_some_and(|t| t.scalar(at, false));
    Ok(match field.scalar::<u8>(slot::field::TYPE_TYPE, 0) {
        NULL => DataType::Null,
        BOOL => DataType::Boolean,
        INT => int_type(int(slot::TYPE_FIRST, 0), flag(slot::TYPE_SECOND))?,
        FLOATING_POINT => match short(slot::TYPE_FIRST, 0) {
            0 => DataType::Float16,
            1 => DataType::Float32,
            2 => DataType::Float64,
            p => return Err(invalid(format!("floating point precision {p}"))),
        },
        DECIMAL => {
            let precision = u8::try_from(int(slot::TYPE_FIRST, 0))
                .map_err(|_| invalid("decimal precision out of range"))?;
            let scale = i8::try_from(int(slot::TYPE_SECOND, 0))
                .map_err(|_| invalid("decimal scale out of range"))?;
            match int(slot::TYPE_THIRD, 128) {
                32 => DataType::Decimal32(precision, scale),
                64 => DataType::Decimal64(precision, scale),
                128 => DataType::Decimal128(precision, scale),
                256 => DataType::Decimal256(precision, scale),
                bits => return Err(invalid(format!("decimal of {bits} bits"))),
            }
        }
        UTF8 => DataType::Utf8,
        LARGE_UTF8 => DataType::LargeUtf8,
        UTF8_VIEW => DataType::Utf8View,
        BINARY => DataType::Binary,
        LARGE_BINARY => DataType::LargeBinary,
        BINARY_VIEW => DataType::BinaryView,
        FIXED_SIZE_BINARY => DataType::FixedSizeBinary(int(slot::TYPE_FIRST, 0)),
        DATE => match short(slot::TYPE_FIRST, 1) {
            0 => DataType::Date32,
            1 => DataType::Date64,
            unit => return Err(invalid(format!("date unit {unit}"))),
        },
        TIME => {
            let unit = time_unit(short(slot::TYPE_FIRST, 1))?;
            match int(slot::TYPE_SECOND, 32) {
                32 => DataType::Time32(unit),
                64 => DataType::Time64(unit),
                bits => return Err(invalid(format!("time of {bits} bits"))),
            }
        }
        TIMESTAMP => DataType::Timestamp(
            time_unit(short(slot::TYPE_FIRST, 0))?,
            table.and_then(|t| t.str(slot::TYPE_SECOND)).map(str::to_string),
        ),
        DURATION => DataType::Duration(time_unit(short(slot::TYPE_FIRST, 1))?),
        LIST => DataType::List(single_child("List", children)?),
        LARGE_LIST => DataType::LargeList(single_child("LargeList", children)?),
        FIXED_SIZE_LIST => {
            DataType::FixedSizeList(single_child("FixedSizeList", children)?, int(slot::TYPE_FIRST, 0))
        }
        STRUCT => DataType::Struct(children),
        MAP => DataType::Map(single_child("Map", children)?, flag(slot::TYPE_FIRST)),
        other => return Err(unsupported(format!("IPC type id {other} is not supported"))),
    })
}

fn read_field(view: View<'_>, ids: &mut Vec<i64>, in_dictionary: bool) -> Result<Field> {
    let name = view.str(slot::field::NAME).unwrap_or_default();
    let nullable = view.scalar::<bool>(slot::field::NULLABLE, false);
    let dictionary = view.table(slot::field::DICTIONARY);
    if let Some(encoding) = dictionary {
        if in_dictionary {
            return Err(unsupported(format!(
                "field {name} is dictionary encoded inside dictionary values"
            )));
        }
        ids.push(encoding.scalar::<i64>(slot::dictionary_encoding::ID, 0));
    }
    let children = view
        .tables(slot::field::CHILDREN)
        .map(|child| read_field(child, ids, in_dictionary || dictionary.is_some()))
        .collect::<Result<Vec<_>>>()?;
    let value_type = read_type(view, children)?;
    let data_type = match dictionary {
        Some(encoding) => {
            // An absent index type means signed 32-bit keys.
            let key = match encoding.table(slot::dictionary_encoding::INDEX_TYPE) {
                Some(index) => int_type(
                    index.scalar::<i32>(slot::TYPE_FIRST, 0),
                    index.scalar::<bool>(slot::TYPE_SECOND, false),
                )?,
                None => DataType::Int32,
            };
            DataType::dictionary(key, value_type).map_err(|e| invalid(e.to_string()))?
        }
        None => value_type,
    };
    Ok(Field::new(name, data_type, nullable)
        .with_metadata(read_metadata(view, slot::field::CUSTOM_METADATA)))
}

fn read_schema(view: View<'_>) -> Result<IpcSchema> {
    if view.scalar::<i16>(slot::schema::ENDIANNESS, 0) != 0 {
        return Err(unsupported("big-endian IPC data is not supported"));
    }
    let mut dictionary_ids = Vec::new();
    let fields = view
        .tables(slot::schema::FIELDS)
        .map(|f| read_field(f, &mut dictionary_ids, false))
        .collect::<Result<Vec<_>>>()?;
    let metadata = read_metadata(view, slot::schema::CUSTOM_METADATA);
    Ok(IpcSchema {
        schema: Schema::new(fields, metadata),
        dictionary_ids,
    })
}

fn read_record_batch(view: View<'_>) -> Result<RecordBatchHeader> {
    let compression = match view.table(slot::record_batch::COMPRESSION) {
        None => Compression::None,
        Some(c) => match c.scalar::<i8>(slot::body_compression::CODEC, CODEC_LZ4_FRAME) {
            CODEC_LZ4_FRAME => Compression::Lz4,
            CODEC_ZSTD => Compression::Zstd,
            other => return Err(invalid(format!("unknown body compression {other}"))),
        },
    };
    Ok(RecordBatchHeader {
        length: view.scalar::<i64>(slot::record_batch::LENGTH, 0),
        compression,
        nodes: view
            .structs::<format::FieldNode>(slot::record_batch::NODES)
            .map(|n| FieldNode {
                length: n.length(),
                null_count: n.null_count(),
            })
            .collect(),
        buffers: view
            .structs::<format::Buffer>(slot::record_batch::BUFFERS)
            .map(|b| BufferSpec {
                offset: b.offset(),
                length: b.length(),
            })
            .collect(),
        variadic_counts: view
            .scalars::<i64>(slot::record_batch::VARIADIC_BUFFER_COUNTS)
            .collect(),
    })
}

fn check_version(version: i16) -> Result<()> {
    if version < VERSION_V4 {
        return Err(unsupported(format!(
            "IPC metadata version {version} predates V4"
        )));
    }
    Ok(())
}

/// Parses a `Message` flatbuffer. Trailing padding is ignored.
pub fn decode_metadata(bytes: &[u8]) -> Result<Message> {
    let message = flatbuffers::root::<MessageTable>(bytes)
        .map_err(|e| invalid(format!("malformed IPC message: {e}")))?;
    check_version(message.scalar::<i16>(slot::message::VERSION, 0))?;
    let body_len = message.scalar::<i64>(slot::message::BODY_LENGTH, 0);
    if body_len < 0 {
        return Err(invalid("negative body length"));
    }
    let body = message
        .table(slot::message::HEADER)
        .ok_or_else(|| invalid("message has no header"))?;
    let header = match message.scalar::<u8>(slot::message::HEADER_TYPE, 0) {
        header::SCHEMA => MessageHeader::Schema(read_schema(body)?),
        header::RECORD_BATCH => MessageHeader::RecordBatch(read_record_batch(body)?),
        header::DICTIONARY_BATCH => {
            let data = body
                .table(slot::dictionary_batch::DATA)
                .ok_or_else(|| invalid("dictionary batch has no data"))?;
            MessageHeader::DictionaryBatch(DictionaryBatchHeader {
                id: body.scalar::<i64>(slot::dictionary_batch::ID, 0),
                data: read_record_batch(data)?,
                is_delta: body.scalar::<bool>(slot::dictionary_batch::IS_DELTA, false),
            })
        }
        other => return Err(unsupported(format!("IPC message type {other} is not supported"))),
    };
    Ok(Message {
        header,
        body_len: body_len as u64,
    })
}

// ---------------------------------------------------------------
// Framing
// ---------------------------------------------------------------

/// Writes one framed message and returns the `(metadata_len, body_len)` written,
/// where `metadata_len` includes the 8-byte prefix.
pub fn write_message<W: Write>(
    w: &mut W,
    header: &MessageHeader,
    body: &[u8],
) -> Result<(usize, usize)> {
    let mut meta = encode_metadata(header, body.len() as u64)?;
    meta.resize(padded(meta.len()), 0);
    w.write_all(&CONTINUATION.to_le_bytes())?;
    w.write_all(&(meta.len() as i32).to_le_bytes())?;
    w.write_all(&meta)?;
    w.write_all(body)?;
    Ok((8 + meta.len(), body.len()))
}

/// Writes the end-of-stream marker.
pub fn write_eos<W: Write>(w: &mut W) -> Result<()> {
    w.write_all(&CONTINUATION.to_le_bytes())?;
    w.write_all(&0i32.to_le_bytes())?;
    Ok(())
}

/// Reads the next message prefix and metadata. `None` at end of stream.
///
/// The body is left unread so the caller can take exactly `body_len` bytes.
/// The pre-0.15 prefix without the continuation marker is accepted too.
pub fn read_message_header<R: Read>(r: &mut R) -> Result<Option<Message>> {
    let mut word = [0u8; 4];
    match r.read_exact(&mut word) {
        Ok(()) => {}
        // A stream cut at a message boundary ends like one with an EOS marker.
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let mut len = u32::from_le_bytes(word);
    if len == CONTINUATION {
        r.read_exact(&mut word)?;
        len = u32::from_le_bytes(word);
    }
    let len = len as i32;
    if len == 0 {
        return Ok(None);
    }
    if len < 0 {
        return Err(invalid(format!("negative metadata length {len}")));
    }
    let mut meta = vec![0u8; len as usize];
    r.read_exact(&mut meta)?;
    decode_metadata(&meta).map(Some)
}

/// Framed schema message, as embedded in Parquet key-value metadata.
pub fn schema_to_bytes(schema: &Schema) -> Result<Vec<u8>> {
    let schema = IpcSchema::new(schema.clone())?;
    let mut out = Vec::new();
    write_message(&mut out, &MessageHeader::Schema(schema), &[])?;
    Ok(out)
}

/// Parses the output of [`schema_to_bytes`], with or without the continuation
/// marker.
pub fn schema_from_bytes(bytes: &[u8]) -> Result<Schema> {
    let mut cursor = io::Cursor::new(bytes);
    match read_message_header(&mut cursor)? {
        Some(Message {
            header: MessageHeader::Schema(schema),
            ..
        }) => Ok(schema.schema),
        _ => Err(InterchangeError::SchemaMismatch(
            "expected a schema message".into(),
        )),
    }
}

// ---------------------------------------------------------------
// File footer
// ---------------------------------------------------------------

/// Position of one message inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: u64,
    /// Prefix plus padded metadata.
    pub metadata_len: u32,
    pub body_len: u64,
}

/// Decoded `Footer` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Footer {
    pub schema: IpcSchema,
    pub dictionaries: Vec<Block>,
    pub record_batches: Vec<Block>,
}

fn wire_blocks(blocks: &[Block]) -> Vec<format::Block> {
    blocks
        .iter()
        .map(|b| format::Block::new(b.offset as i64, b.metadata_len as i32, b.body_len as i64))
        .collect()
}

fn read_blocks(view: View<'_>, at: VOffsetT) -> Result<Vec<Block>> {
    view.structs::<format::Block>(at)
        .map(|b| {
            let (offset, metadata_len, body_len) = (b.offset(), b.metadata_len(), b.body_len());
            if offset < 0 || metadata_len < 8 || body_len < 0 {
                return Err(invalid("negative block position"));
            }
            Ok(Block {
                offset: offset as u64,
                metadata_len: metadata_len as u32,
                body_len: body_len as u64,
            })
        })
        .collect()
}

/// Encodes the file footer: schema, dictionary blocks and record batch blocks.
pub(crate) fn encode_footer(
    schema: &IpcSchema,
    dictionaries: &[Block],
    record_batches: &[Block],
) -> Result<Vec<u8>> {
    let mut fbb = FlatBufferBuilder::new();
    let schema = build_schema(&mut fbb, schema)?;
    let dictionaries = fbb.create_vector(&wire_blocks(dictionaries));
    let record_batches = fbb.create_vector(&wire_blocks(record_batches));
    let start = fbb.start_table();
    fbb.push_slot::<i16>(slot::footer::VERSION, VERSION_V5, 0);
    fbb.push_slot_always(slot::footer::SCHEMA, schema);
    fbb.push_slot_always(slot::footer::DICTIONARIES, dictionaries);
    fbb.push_slot_always(slot::footer::RECORD_BATCHES, record_batches);
    let root = fbb.end_table(start);
    fbb.finish(root, None);
    Ok(fbb.finished_data().to_vec())
}

pub(crate) fn decode_footer(bytes: &[u8]) -> Result<Footer> {
    let footer = flatbuffers::root::<FooterTable>(bytes)
        .map_err(|e| invalid(format!("malformed IPC footer: {e}")))?;
    check_version(footer.scalar::<i16>(slot::footer::VERSION, 0))?;
    let schema = footer
        .table(slot::footer::SCHEMA)
        .ok_or_else(|| invalid("footer has no schema"))?;
    Ok(Footer {
        schema: read_schema(schema)?,
        dictionaries: read_blocks(footer, slot::footer::DICTIONARIES)?,
        record_batches: read_blocks(footer, slot::footer::RECORD_BATCHES)?,
    })
}
