//! # Parquet footer and page metadata
//!
//! Typed mirrors of the `parquet.thrift` structures this crate writes and
//! reads: `FileMetaData`, `SchemaElement`, `RowGroup`, `ColumnChunk` /
//! `ColumnMetaData`, `PageHeader` (data page v1/v2, dictionary) and the
//! `LogicalType` union. Each has a `write` into a [`CompactWriter`] and a
//! `read` from a [`CompactReader`] that skips unknown fields.
//!
//! [`ParquetMetadata`] is the parsed footer plus the logical [`Schema`] it
//! resolves to, from the embedded `"ARROW:schema"` entry when present and from
//! the physical/logical annotations otherwise.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::enums::error::{InterchangeError, Result};
use crate::enums::time_units::TimeUnit;
use crate::io::compression::Compression;
use crate::io::ipc::message::schema_from_bytes;
use crate::io::parquet::PARQUET_MAGIC;
use crate::io::parquet::levels::ColumnLayout;
use crate::io::parquet::thrift::{
    CompactReader, CompactWriter, T_BINARY, T_I32, T_STRUCT,
};
use crate::{DataType, Field, Schema};

/// Key-value metadata entry holding the base64 IPC schema.
pub const ARROW_SCHEMA_KEY: &str = "ARROW:schema";

pub(crate) fn corrupt(msg: impl Into<String>) -> InterchangeError {
    InterchangeError::CorruptFooter(msg.into())
}

// ---------------------------------------------------------------
// Enums
// ---------------------------------------------------------------

/// Parquet physical types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalType {
    Boolean = 0,
    Int32 = 1,
    Int64 = 2,
    Int96 = 3,
    Float = 4,
    Double = 5,
    ByteArray = 6,
    FixedLenByteArray = 7,
}

impl PhysicalType {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::Boolean,
            1 => Self::Int32,
            2 => Self::Int64,
            3 => Self::Int96,
            4 => Self::Float,
            5 => Self::Double,
            6 => Self::ByteArray,
            7 => Self::FixedLenByteArray,
            _ => return None,
        })
    }
}

/// Page and level encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Plain = 0,
    PlainDictionary = 2,
    Rle = 3,
    BitPacked = 4,
    DeltaBinaryPacked = 5,
    DeltaLengthByteArray = 6,
    DeltaByteArray = 7,
    RleDictionary = 8,
    ByteStreamSplit = 9,
}

impl Encoding {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::Plain,
            2 => Self::PlainDictionary,
            3 => Self::Rle,
            4 => Self::BitPacked,
            5 => Self::DeltaBinaryPacked,
            6 => Self::DeltaLengthByteArray,
            7 => Self::DeltaByteArray,
            8 => Self::RleDictionary,
            9 => Self::ByteStreamSplit,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetition {
    Required = 0,
    Optional = 1,
    Repeated = 2,
}

impl Repetition {
    fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::Required,
            1 => Self::Optional,
            2 => Self::Repeated,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    DataPage = 0,
    IndexPage = 1,
    DictionaryPage = 2,
    DataPageV2 = 3,
}

impl PageType {
    fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::DataPage,
            1 => Self::IndexPage,
            2 => Self::DictionaryPage,
            3 => Self::DataPageV2,
            _ => return None,
        })
    }
}

/// Legacy `ConvertedType` ids used by this crate.
pub(crate) mod converted {
    pub const UTF8: i32 = 0;
    pub const MAP: i32 = 1;
    pub const MAP_KEY_VALUE: i32 = 2;
    pub const LIST: i32 = 3;
    pub const ENUM: i32 = 4;
    pub const DECIMAL: i32 = 5;
    pub const DATE: i32 = 6;
    pub const TIME_MILLIS: i32 = 7;
    pub const TIME_MICROS: i32 = 8;
    pub const TIMESTAMP_MILLIS: i32 = 9;
    pub const TIMESTAMP_MICROS: i32 = 10;
    pub const UINT_8: i32 = 11;
    pub const UINT_16: i32 = 12;
    pub const UINT_32: i32 = 13;
    pub const UINT_64: i32 = 14;
    pub const INT_8: i32 = 15;
    pub const INT_16: i32 = 16;
    pub const INT_32: i32 = 17;
    pub const INT_64: i32 = 18;
    pub const JSON: i32 = 19;
}

/// The `LogicalType` union, restricted to the members this crate maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    String,
    Map,
    List,
    Enum,
    Decimal { scale: i32, precision: i32 },
    Date,
    Time { utc: bool, unit: TimeUnit },
    Timestamp { utc: bool, unit: TimeUnit },
    Integer { bit_width: i8, signed: bool },
    Unknown,
    Json,
    Float16,
}

fn write_time_unit(w: &mut CompactWriter, id: i16, unit: TimeUnit) {
    w.field_struct(id);
    let member = match unit {
        TimeUnit::Millisecond | TimeUnit::Second => 1,
        TimeUnit::Microsecond => 2,
        TimeUnit::Nanosecond => 3,
    };
    w.field_struct(member);
    w.struct_end();
    w.struct_end();
}

fn read_time_unit(r: &mut CompactReader<'_>) -> Result<Option<TimeUnit>> {
    let mut unit = None;
    r.struct_begin()?;
    while let Some(f) = r.field()? {
        unit = match f.id {
            1 => Some(TimeUnit::Millisecond),
            2 => Some(TimeUnit::Microsecond),
            3 => Some(TimeUnit::Nanosecond),
            _ => None,
        };
        r.skip(f.ty)?;
    }
    r.struct_end();
    Ok(unit)
}

impl LogicalType {
    /// Writes the union member into an already open struct.
    fn write(&self, w: &mut CompactWriter) {
        match *self {
            LogicalType::String => {
                w.field_struct(1);
                w.struct_end();
            }
            LogicalType::Map => {
                w.field_struct(2);
                w.struct_end();
            }
            LogicalType::List => {
                w.field_struct(3);
                w.struct_end();
            }
            LogicalType::Enum => {
                w.field_struct(4);
                w.struct_end();
            }
            LogicalType::Decimal { scale, precision } => {
                w.field_struct(5);
                w.field_i32(1, scale);
                w.field_i32(2, precision);
                w.struct_end();
            }
            LogicalType::Date => {
                w.field_struct(6);
                w.struct_end();
            }
            LogicalType::Time { utc, unit } => {
                w.field_struct(7);
                w.field_bool(1, utc);
                write_time_unit(w, 2, unit);
                w.struct_end();
            }
            LogicalType::Timestamp { utc, unit } => {
                w.field_struct(8);
                w.field_bool(1, utc);
                write_time_unit(w, 2, unit);
                w.struct_end();
            }
            LogicalType::Integer { bit_width, signed } => {
                w.field_struct(10);
                w.field_i8(1, bit_width);
                w.field_bool(2, signed);
                w.struct_end();
            }
            LogicalType::Unknown => {
                w.field_struct(11);
                w.struct_end();
            }
            LogicalType::Json => {
                w.field_struct(12);
                w.struct_end();
            }
            LogicalType::Float16 => {
                w.field_struct(15);
                w.struct_end();
            }
        }
    }

    /// Reads the union; members this crate does not map yield `None`.
    fn read(r: &mut CompactReader<'_>) -> Result<Option<Self>> {
        let mut out = None;
        r.struct_begin()?;
        while let Some(f) = r.field()? {
            if f.ty != T_STRUCT {
                r.skip(f.ty)?;
                continue;
            }
            out = match f.id {
                1 => Self::empty(r, LogicalType::String)?,
                2 => Self::empty(r, LogicalType::Map)?,
                3 => Self::empty(r, LogicalType::List)?,
                4 => Self::empty(r, LogicalType::Enum)?,
                5 => {
                    let (mut scale, mut precision) = (0, 0);
                    r.struct_begin()?;
                    while let Some(g) = r.field()? {
                        match g.id {
                            1 => scale = r.i32()?,
                            2 => precision = r.i32()?,
                            _ => r.skip(g.ty)?,
                        }
                    }
                    r.struct_end();
                    Some(LogicalType::Decimal { scale, precision })
                }
                6 => Self::empty(r, LogicalType::Date)?,
                7 | 8 => {
                    let (mut utc, mut unit) = (false, None);
                    r.struct_begin()?;
                    while let Some(g) = r.field()? {
                        match g.id {
                            1 => utc = g.bool_value()?,
                            2 => unit = read_time_unit(r)?,
                            _ => r.skip(g.ty)?,
                        }
                    }
                    r.struct_end();
                    unit.map(|unit| {
                        if f.id == 7 {
                            LogicalType::Time { utc, unit }
                        } else {
                            LogicalType::Timestamp { utc, unit }
                        }
                    })
                }
                10 => {
                    let (mut bit_width, mut signed) = (0, true);
                    r.struct_begin()?;
                    while let Some(g) = r.field()? {
                        match g.id {
                            1 => bit_width = r.i8()?,
                            2 => signed = g.bool_value()?,
                            _ => r.skip(g.ty)?,
                        }
                    }
                    r.struct_end();
                    Some(LogicalType::Integer { bit_width, signed })
                }
                11 => Self::empty(r, LogicalType::Unknown)?,
                12 => Self::empty(r, LogicalType::Json)?,
                15 => Self::empty(r, LogicalType::Float16)?,
                _ => {
                    r.skip(f.ty)?;
                    None
                }
            };
        }
        r.struct_end();
        Ok(out)
    }

    fn empty(r: &mut CompactReader<'_>, value: LogicalType) -> Result<Option<Self>> {
        r.skip(T_STRUCT)?;
        Ok(Some(value))
    }
}

// ---------------------------------------------------------------
// Footer structures
// ---------------------------------------------------------------

/// One node of the flattened Parquet schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaElement {
    pub name: String,
    pub physical_type: Option<PhysicalType>,
    pub type_length: Option<i32>,
    pub repetition: Option<Repetition>,
    pub num_children: Option<i32>,
    pub converted_type: Option<i32>,
    pub scale: Option<i32>,
    pub precision: Option<i32>,
    pub logical_type: Option<LogicalType>,
}

impl SchemaElement {
    pub(crate) fn root(num_children: usize) -> Self {
        Self {
            name: "schema".into(),
            physical_type: None,
            type_length: None,
            repetition: None,
            num_children: Some(num_children as i32),
            converted_type: None,
            scale: None,
            precision: None,
            logical_type: None,
        }
    }

    pub(crate) fn group(name: &str, repetition: Repetition, num_children: usize) -> Self {
        Self {
            name: name.to_string(),
            repetition: Some(repetition),
            ..Self::root(num_children)
        }
    }

    pub(crate) fn annotated(self, logical: LogicalType, converted: i32) -> Self {
        Self {
            logical_type: Some(logical),
            converted_type: Some(converted),
            ..self
        }
    }

    pub(crate) fn leaf(name: &str, repetition: Repetition, leaf: &LeafType) -> Self {
        Self {
            name: name.to_string(),
            physical_type: Some(leaf.physical),
            type_length: leaf.type_length,
            repetition: Some(repetition),
            num_children: None,
            converted_type: leaf.converted,
            scale: leaf.decimal.map(|(_, scale)| scale),
            precision: leaf.decimal.map(|(precision, _)| precision),
            logical_type: leaf.logical,
        }
    }

    fn write(&self, w: &mut CompactWriter) {
        w.struct_begin();
        if let Some(t) = self.physical_type {
            w.field_i32(1, t as i32);
        }
        if let Some(len) = self.type_length {
            w.field_i32(2, len);
        }
        if let Some(rep) = self.repetition {
            w.field_i32(3, rep as i32);
        }
        w.field_string(4, &self.name);
        if let Some(n) = self.num_children {
            w.field_i32(5, n);
        }
        if let Some(c) = self.converted_type {
            w.field_i32(6, c);
        }
        if let Some(s) = self.scale {
            w.field_i32(7, s);
        }
        if let Some(p) = self.precision {
            w.field_i32(8, p);
        }
        if let Some(lt) = &self.logical_type {
            w.field_struct(10);
            lt.write(w);
            w.struct_end();
        }
        w.struct_end();
    }

    fn read(r: &mut CompactReader<'_>) -> Result<Self> {
        let mut out = SchemaElement::root(0);
        out.num_children = None;
        out.name.clear();
        r.struct_begin()?;
        while let Some(f) = r.field()? {
            match f.id {
                1 => out.physical_type = PhysicalType::from_i32(r.i32()?),
                2 => out.type_length = Some(r.i32()?),
                3 => out.repetition = Repetition::from_i32(r.i32()?),
                4 => out.name = r.string()?,
                5 => out.num_children = Some(r.i32()?),
                6 => out.converted_type = Some(r.i32()?),
                7 => out.scale = Some(r.i32()?),
                8 => out.precision = Some(r.i32()?),
                10 => out.logical_type = LogicalType::read(r)?,
                _ => r.skip(f.ty)?,
            }
        }
        r.struct_end();
        Ok(out)
    }
}

/// Metadata of one column chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChunkMetaData {
    pub file_offset: i64,
    pub physical_type: PhysicalType,
    pub encodings: Vec<Encoding>,
    pub path_in_schema: Vec<String>,
    /// Parquet `CompressionCodec` id.
    pub codec: i32,
    pub num_values: i64,
    pub total_uncompressed_size: i64,
    /// Bytes of the chunk on disk, page headers included.
    pub total_compressed_size: i64,
    pub data_page_offset: i64,
    pub dictionary_page_offset: Option<i64>,
    /// Statistics null count, when recorded.
    pub null_count: Option<i64>,
}

impl ColumnChunkMetaData {
    /// Codec of every page in the chunk.
    pub fn compression(&self) -> Result<Compression> {
        Compression::from_parquet_codec(self.codec)
    }

    /// `(start, len)` of the chunk's bytes in the file.
    pub fn byte_range(&self) -> Result<(u64, u64)> {
        let start = match self.dictionary_page_offset {
            Some(d) if d > 0 && d < self.data_page_offset => d,
            _ => self.data_page_offset,
        };
        if start < 0 || self.total_compressed_size < 0 {
            return Err(corrupt("negative column chunk range"));
        }
        Ok((start as u64, self.total_compressed_size as u64))
    }

    fn write(&self, w: &mut CompactWriter) {
        // ColumnChunk
        w.struct_begin();
        w.field_i64(2, self.file_offset);
        w.field_struct(3);
        // ColumnMetaData
        w.field_i32(1, self.physical_type as i32);
        w.field_list(2, T_I32, self.encodings.len());
        for e in &self.encodings {
            w.i32(*e as i32);
        }
        w.field_list(3, T_BINARY, self.path_in_schema.len());
        for p in &self.path_in_schema {
            w.string(p);
        }
        w.field_i32(4, self.codec);
        w.field_i64(5, self.num_values);
        w.field_i64(6, self.total_uncompressed_size);
        w.field_i64(7, self.total_compressed_size);
        w.field_i64(9, self.data_page_offset);
        if let Some(d) = self.dictionary_page_offset {
            w.field_i64(11, d);
        }
        if let Some(n) = self.null_count {
            w.field_struct(12);
            w.field_i64(3, n);
            w.struct_end();
        }
        w.struct_end();
        w.struct_end();
    }

    fn read(r: &mut CompactReader<'_>) -> Result<Self> {
        let mut out = ColumnChunkMetaData {
            file_offset: 0,
            physical_type: PhysicalType::Int32,
            encodings: Vec::new(),
            path_in_schema: Vec::new(),
            codec: 0,
            num_values: 0,
            total_uncompressed_size: 0,
            total_compressed_size: 0,
            data_page_offset: 0,
            dictionary_page_offset: None,
            null_count: None,
        };
        let mut saw_meta = false;
        r.struct_begin()?;
        while let Some(f) = r.field()? {
            match f.id {
                2 => out.file_offset = r.i64()?,
                3 => {
                    saw_meta = true;
                    r.struct_begin()?;
                    while let Some(g) = r.field()? {
                        match g.id {
                            1 => {
                                out.physical_type = PhysicalType::from_i32(r.i32()?)
                                    .ok_or_else(|| corrupt("unknown physical type"))?
                            }
                            2 => {
                                let (_, n) = r.list()?;
                                for _ in 0..n {
                                    if let Some(e) = Encoding::from_i32(r.i32()?) {
                                        out.encodings.push(e);
                                    }
                                }
                            }
                            3 => {
                                let (_, n) = r.list()?;
                                for _ in 0..n {
                                    out.path_in_schema.push(r.string()?);
                                }
                            }
                            4 => out.codec = r.i32()?,
                            5 => out.num_values = r.i64()?,
                            6 => out.total_uncompressed_size = r.i64()?,
                            7 => out.total_compressed_size = r.i64()?,
                            9 => out.data_page_offset = r.i64()?,
                            11 => out.dictionary_page_offset = Some(r.i64()?),
                            12 => {
                                r.struct_begin()?;
                                while let Some(s) = r.field()? {
                                    match s.id {
                                        3 => out.null_count = Some(r.i64()?),
                                        _ => r.skip(s.ty)?,
                                    }
                                }
                                r.struct_end();
                            }
                            _ => r.skip(g.ty)?,
                        }
                    }
                    r.struct_end();
                }
                _ => r.skip(f.ty)?,
            }
        }
        r.struct_end();
        if !saw_meta {
            return Err(corrupt("column chunk without inline metadata"));
        }
        Ok(out)
    }
}

/// Metadata of one row group.
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroupMetaData {
    pub columns: Vec<ColumnChunkMetaData>,
    pub total_byte_size: i64,
    pub num_rows: i64,
}

impl RowGroupMetaData {
    fn write(&self, w: &mut CompactWriter) {
        w.struct_begin();
        w.field_list(1, T_STRUCT, self.columns.len());
        for c in &self.columns {
            c.write(w);
        }
        w.field_i64(2, self.total_byte_size);
        w.field_i64(3, self.num_rows);
        w.struct_end();
    }

    fn read(r: &mut CompactReader<'_>) -> Result<Self> {
        let mut out = RowGroupMetaData {
            columns: Vec::new(),
            total_byte_size: 0,
            num_rows: 0,
        };
        r.struct_begin()?;
        while let Some(f) = r.field()? {
            match f.id {
                1 => {
                    let (_, n) = r.list()?;
                    for _ in 0..n {
                        out.columns.push(ColumnChunkMetaData::read(r)?);
                    }
                }
                2 => out.total_byte_size = r.i64()?,
                3 => out.num_rows = r.i64()?,
                _ => r.skip(f.ty)?,
            }
        }
        r.struct_end();
        Ok(out)
    }
}

/// The footer.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetaData {
    pub version: i32,
    pub schema: Vec<SchemaElement>,
    pub num_rows: i64,
    pub row_groups: Vec<RowGroupMetaData>,
    pub key_value_metadata: BTreeMap<String, String>,
    pub created_by: Option<String>,
}

impl FileMetaData {
    /// Thrift-encodes the footer (without length or magic).
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut w = CompactWriter::new();
        w.struct_begin();
        w.field_i32(1, self.version);
        w.field_list(2, T_STRUCT, self.schema.len());
        for s in &self.schema {
            s.write(&mut w);
        }
        w.field_i64(3, self.num_rows);
        w.field_list(4, T_STRUCT, self.row_groups.len());
        for rg in &self.row_groups {
            rg.write(&mut w);
        }
        if !self.key_value_metadata.is_empty() {
            w.field_list(5, T_STRUCT, self.key_value_metadata.len());
            for (k, v) in &self.key_value_metadata {
                w.struct_begin();
                w.field_string(1, k);
                w.field_string(2, v);
                w.struct_end();
            }
        }
        if let Some(c) = &self.created_by {
            w.field_string(6, c);
        }
        w.struct_end();
        w.into_inner()
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut out = FileMetaData {
            version: 0,
            schema: Vec::new(),
            num_rows: 0,
            row_groups: Vec::new(),
            key_value_metadata: BTreeMap::new(),
            created_by: None,
        };
        let r = &mut CompactReader::new(bytes);
        r.struct_begin()?;
        while let Some(f) = r.field()? {
            match f.id {
                1 => out.version = r.i32()?,
                2 => {
                    let (_, n) = r.list()?;
                    for _ in 0..n {
                        out.schema.push(SchemaElement::read(r)?);
                    }
                }
                3 => out.num_rows = r.i64()?,
                4 => {
                    let (_, n) = r.list()?;
                    for _ in 0..n {
                        out.row_groups.push(RowGroupMetaData::read(r)?);
                    }
                }
                5 => {
                    let (_, n) = r.list()?;
                    for _ in 0..n {
                        let (mut key, mut value) = (String::new(), String::new());
                        r.struct_begin()?;
                        while let Some(g) = r.field()? {
                            match g.id {
                                1 => key = r.string()?,
                                2 => value = r.string()?,
                                _ => r.skip(g.ty)?,
                            }
                        }
                        r.struct_end();
                        out.key_value_metadata.insert(key, value);
                    }
                }
                6 => out.created_by = Some(r.string()?),
                _ => r.skip(f.ty)?,
            }
        }
        r.struct_end();
        Ok(out)
    }
}

// ---------------------------------------------------------------
// Page headers
// ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DataPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DataPageHeaderV2 {
    pub num_values: i32,
    pub num_nulls: i32,
    pub num_rows: i32,
    pub encoding: Encoding,
    pub definition_levels_byte_length: i32,
    pub repetition_levels_byte_length: i32,
    pub is_compressed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DictionaryPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageHeader {
    pub page_type: PageType,
    pub uncompressed_page_size: i32,
    pub compressed_page_size: i32,
    pub data_page: Option<DataPageHeader>,
    pub data_page_v2: Option<DataPageHeaderV2>,
    pub dictionary_page: Option<DictionaryPageHeader>,
}

fn page_encoding(r: &mut CompactReader<'_>) -> Result<Encoding> {
    let id = r.i32()?;
    Encoding::from_i32(id).ok_or_else(|| {
        InterchangeError::UnsupportedOperation(format!("page encoding {id} is not supported"))
    })
}

impl PageHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = CompactWriter::new();
        w.struct_begin();
        w.field_i32(1, self.page_type as i32);
        w.field_i32(2, self.uncompressed_page_size);
        w.field_i32(3, self.compressed_page_size);
        if let Some(h) = &self.data_page {
            w.field_struct(5);
            w.field_i32(1, h.num_values);
            w.field_i32(2, h.encoding as i32);
            w.field_i32(3, Encoding::Rle as i32);
            w.field_i32(4, Encoding::Rle as i32);
            w.struct_end();
        }
        if let Some(h) = &self.dictionary_page {
            w.field_struct(7);
            w.field_i32(1, h.num_values);
            w.field_i32(2, h.encoding as i32);
            w.struct_end();
        }
        if let Some(h) = &self.data_page_v2 {
            w.field_struct(8);
            w.field_i32(1, h.num_values);
            w.field_i32(2, h.num_nulls);
            w.field_i32(3, h.num_rows);
            w.field_i32(4, h.encoding as i32);
            w.field_i32(5, h.definition_levels_byte_length);
            w.field_i32(6, h.repetition_levels_byte_length);
            w.field_bool(7, h.is_compressed);
            w.struct_end();
        }
        w.struct_end();
        w.into_inner()
    }

    /// Parses a header at the start of `bytes`, returning it and its encoded size.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        let r = &mut CompactReader::new(bytes);
        let mut page_type = None;
        let mut out = PageHeader {
            page_type: PageType::DataPage,
            uncompressed_page_size: 0,
            compressed_page_size: 0,
            data_page: None,
            data_page_v2: None,
            dictionary_page: None,
        };
        r.struct_begin()?;
        while let Some(f) = r.field()? {
            match f.id {
                1 => page_type = PageType::from_i32(r.i32()?),
                2 => out.uncompressed_page_size = r.i32()?,
                3 => out.compressed_page_size = r.i32()?,
                5 => {
                    let mut h = DataPageHeader {
                        num_values: 0,
                        encoding: Encoding::Plain,
                    };
                    r.struct_begin()?;
                    while let Some(g) = r.field()? {
                        match g.id {
                            1 => h.num_values = r.i32()?,
                            2 => h.encoding = page_encoding(r)?,
                            _ => r.skip(g.ty)?,
                        }
                    }
                    r.struct_end();
                    out.data_page = Some(h);
                }
                7 => {
                    let mut h = DictionaryPageHeader {
                        num_values: 0,
                        encoding: Encoding::Plain,
                    };
                    r.struct_begin()?;
                    while let Some(g) = r.field()? {
                        match g.id {
                            1 => h.num_values = r.i32()?,
                            2 => h.encoding = page_encoding(r)?,
                            _ => r.skip(g.ty)?,
                        }
                    }
                    r.struct_end();
                    out.dictionary_page = Some(h);
                }
                8 => {
                    let mut h = DataPageHeaderV2 {
                        num_values: 0,
                        num_nulls: 0,
                        num_rows: 0,
                        encoding: Encoding::Plain,
                        definition_levels_byte_length: 0,
                        repetition_levels_byte_length: 0,
                        is_compressed: true,
                    };
                    r.struct_begin()?;
                    while let Some(g) = r.field()? {
                        match g.id {
                            1 => h.num_values = r.i32()?,
                            2 => h.num_nulls = r.i32()?,
                            3 => h.num_rows = r.i32()?,
                            4 => h.encoding = page_encoding(r)?,
                            5 => h.definition_levels_byte_length = r.i32()?,
                            6 => h.repetition_levels_byte_length = r.i32()?,
                            7 => h.is_compressed = g.bool_value()?,
                            _ => r.skip(g.ty)?,
                        }
                    }
                    r.struct_end();
                    out.data_page_v2 = Some(h);
                }
                _ => r.skip(f.ty)?,
            }
        }
        r.struct_end();
        out.page_type = page_type.ok_or_else(|| {
            InterchangeError::UnsupportedOperation("unknown parquet page type".into())
        })?;
        if out.compressed_page_size < 0 || out.uncompressed_page_size < 0 {
            return Err(InterchangeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "negative page size",
            )));
        }
        Ok((out, r.position()))
    }
}

// ---------------------------------------------------------------
// Type mapping
// ---------------------------------------------------------------

/// Leaf annotations for a logical type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeafType {
    pub physical: PhysicalType,
    pub type_length: Option<i32>,
    pub logical: Option<LogicalType>,
    pub converted: Option<i32>,
    pub decimal: Option<(i32, i32)>,
}

impl LeafType {
    fn plain(physical: PhysicalType) -> Self {
        Self {
            physical,
            type_length: None,
            logical: None,
            converted: None,
            decimal: None,
        }
    }

    fn with(mut self, logical: LogicalType, converted: Option<i32>) -> Self {
        self.logical = Some(logical);
        self.converted = converted;
        self
    }

    fn fixed(len: i32) -> Self {
        let mut out = Self::plain(PhysicalType::FixedLenByteArray);
        out.type_length = Some(len);
        out
    }

    fn decimal(mut self, precision: u8, scale: i8) -> Self {
        self.logical = Some(LogicalType::Decimal {
            scale: scale as i32,
            precision: precision as i32,
        });
        self.converted = Some(converted::DECIMAL);
        self.decimal = Some((precision as i32, scale as i32));
        self
    }
}

fn int_leaf(physical: PhysicalType, bit_width: i8, signed: bool, converted: i32) -> LeafType {
    LeafType::plain(physical).with(LogicalType::Integer { bit_width, signed }, Some(converted))
}

/// Physical storage and annotations for a column of `data_type`.
///
/// # Errors
/// `UnsupportedOperation` for nested types, which are stored as groups.
pub(crate) fn leaf_type(data_type: &DataType) -> Result<LeafType> {
    use PhysicalType as P;
    Ok(match data_type {
        DataType::Null => LeafType::plain(P::Int32).with(LogicalType::Unknown, None),
        DataType::Boolean => LeafType::plain(P::Boolean),
        DataType::Int8 => int_leaf(P::Int32, 8, true, converted::INT_8),
        DataType::Int16 => int_leaf(P::Int32, 16, true, converted::INT_16),
        DataType::Int32 => int_leaf(P::Int32, 32, true, converted::INT_32),
        DataType::Int64 => int_leaf(P::Int64, 64, true, converted::INT_64),
        DataType::UInt8 => int_leaf(P::Int32, 8, false, converted::UINT_8),
        DataType::UInt16 => int_leaf(P::Int32, 16, false, converted::UINT_16),
        DataType::UInt32 => int_leaf(P::Int32, 32, false, converted::UINT_32),
        DataType::UInt64 => int_leaf(P::Int64, 64, false, converted::UINT_64),
        DataType::Float16 => LeafType::fixed(2).with(LogicalType::Float16, None),
        DataType::Float32 => LeafType::plain(P::Float),
        DataType::Float64 => LeafType::plain(P::Double),
        DataType::Decimal32(p, s) => LeafType::plain(P::Int32).decimal(*p, *s),
        DataType::Decimal64(p, s) => LeafType::plain(P::Int64).decimal(*p, *s),
        DataType::Decimal128(p, s) => LeafType::fixed(16).decimal(*p, *s),
        DataType::Decimal256(p, s) => LeafType::fixed(32).decimal(*p, *s),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            LeafType::plain(P::ByteArray).with(LogicalType::String, Some(converted::UTF8))
        }
        DataType::Binary | DataType::LargeBinary | DataType::BinaryView => {
            LeafType::plain(P::ByteArray)
        }
        DataType::FixedSizeBinary(n) => LeafType::fixed(*n),
        DataType::Date32 => LeafType::plain(P::Int32).with(LogicalType::Date, Some(converted::DATE)),
        DataType::Date64 => LeafType::plain(P::Int64),
        DataType::Time32(TimeUnit::Millisecond) => LeafType::plain(P::Int32).with(
            LogicalType::Time {
                utc: false,
                unit: TimeUnit::Millisecond,
            },
            Some(converted::TIME_MILLIS),
        ),
        DataType::Time32(_) => LeafType::plain(P::Int32),
        DataType::Time64(unit @ (TimeUnit::Microsecond | TimeUnit::Nanosecond)) => {
            let conv = (*unit == TimeUnit::Microsecond).then_some(converted::TIME_MICROS);
            LeafType::plain(P::Int64).with(
                LogicalType::Time {
                    utc: false,
                    unit: *unit,
                },
                conv,
            )
        }
        DataType::Time64(_) => LeafType::plain(P::Int64),
        DataType::Timestamp(TimeUnit::Second, _) => LeafType::plain(P::Int64),
        DataType::Timestamp(unit, tz) => {
            let conv = match unit {
                TimeUnit::Millisecond => Some(converted::TIMESTAMP_MILLIS),
                TimeUnit::Microsecond => Some(converted::TIMESTAMP_MICROS),
                _ => None,
            };
            LeafType::plain(P::Int64).with(
                LogicalType::Timestamp {
                    utc: tz.is_some(),
                    unit: *unit,
                },
                conv,
            )
        }
        DataType::Duration(_) => LeafType::plain(P::Int64),
        DataType::Dictionary(_, value) => leaf_type(value)?,
        DataType::List(_)
        | DataType::LargeList(_)
        | DataType::FixedSizeList(..)
        | DataType::Struct(_)
        | DataType::Map(..) => {
            return Err(InterchangeError::UnsupportedOperation(format!(
                "nested type {data_type} cannot be written as a parquet column"
            )));
        }
    })
}

/// Logical type implied by a leaf's physical type and annotations.
pub(crate) fn arrow_type(element: &SchemaElement) -> Result<DataType> {
    let physical = element.physical_type.ok_or_else(|| {
        corrupt(format!("leaf column '{}' has no physical type", element.name))
    })?;
    let logical = element.logical_type;
    let conv = element.converted_type;
    let decimal = || {
        let (p, s) = match logical {
            Some(LogicalType::Decimal { scale, precision }) => (precision, scale),
            _ => (element.precision.unwrap_or(0), element.scale.unwrap_or(0)),
        };
        (p as u8, s as i8)
    };
    let is_decimal = matches!(logical, Some(LogicalType::Decimal { .. }))
        || conv == Some(converted::DECIMAL);
    Ok(match physical {
        PhysicalType::Boolean => DataType::Boolean,
        PhysicalType::Int32 => match (logical, conv) {
            (Some(LogicalType::Unknown), _) => DataType::Null,
            (Some(LogicalType::Integer { bit_width, signed }), _) => {
                match (bit_width, signed) {
                    (8, true) => DataType::Int8,
                    (16, true) => DataType::Int16,
                    (8, false) => DataType::UInt8,
                    (16, false) => DataType::UInt16,
                    (32, false) => DataType::UInt32,
                    _ => DataType::Int32,
                }
            }
            (Some(LogicalType::Date), _) | (None, Some(converted::DATE)) => DataType::Date32,
            (Some(LogicalType::Time { .. }), _) | (None, Some(converted::TIME_MILLIS)) => {
                DataType::Time32(TimeUnit::Millisecond)
            }
            _ if is_decimal => {
                let (p, s) = decimal();
                DataType::Decimal32(p, s)
            }
            (None, Some(converted::INT_8)) => DataType::Int8,
            (None, Some(converted::INT_16)) => DataType::Int16,
            (None, Some(converted::UINT_8)) => DataType::UInt8,
            (None, Some(converted::UINT_16)) => DataType::UInt16,
            (None, Some(converted::UINT_32)) => DataType::UInt32,
            _ => DataType::Int32,
        },
        PhysicalType::Int64 => match (logical, conv) {
            (Some(LogicalType::Integer { signed: false, .. }), _)
            | (None, Some(converted::UINT_64)) => DataType::UInt64,
            (Some(LogicalType::Time { unit, .. }), _) => DataType::Time64(unit),
            (None, Some(converted::TIME_MICROS)) => DataType::Time64(TimeUnit::Microsecond),
            (Some(LogicalType::Timestamp { utc, unit }), _) => {
                DataType::Timestamp(unit, utc.then(|| "UTC".to_string()))
            }
            (None, Some(converted::TIMESTAMP_MILLIS)) => {
                DataType::Timestamp(TimeUnit::Millisecond, None)
            }
            (None, Some(converted::TIMESTAMP_MICROS)) => {
                DataType::Timestamp(TimeUnit::Microsecond, None)
            }
            _ if is_decimal => {
                let (p, s) = decimal();
                DataType::Decimal64(p, s)
            }
            _ => DataType::Int64,
        },
        PhysicalType::Int96 => {
            return Err(InterchangeError::UnsupportedOperation(format!(
                "INT96 column '{}' is not supported",
                element.name
            )));
        }
        PhysicalType::Float => DataType::Float32,
        PhysicalType::Double => DataType::Float64,
        PhysicalType::ByteArray => match (logical, conv) {
            (Some(LogicalType::String | LogicalType::Enum | LogicalType::Json), _)
            | (None, Some(converted::UTF8 | converted::ENUM | converted::JSON)) => DataType::Utf8,
            _ => DataType::Binary,
        },
        PhysicalType::FixedLenByteArray => {
            let len = element.type_length.ok_or_else(|| {
                corrupt(format!("fixed-length column '{}' has no type length", element.name))
            })?;
            match logical {
                Some(LogicalType::Float16) if len == 2 => DataType::Float16,
                _ if is_decimal && len == 16 => {
                    let (p, s) = decimal();
                    DataType::Decimal128(p, s)
                }
                _ if is_decimal && len == 32 => {
                    let (p, s) = decimal();
                    DataType::Decimal256(p, s)
                }
                _ => DataType::FixedSizeBinary(len),
            }
        }
    })
}

// ---------------------------------------------------------------
// Parsed footer
// ---------------------------------------------------------------

/// A parsed footer together with its resolved logical schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParquetMetadata {
    file: FileMetaData,
    schema: Schema,
    layout: ColumnLayout,
}

impl ParquetMetadata {
    /// Footer length from the last 8 bytes of a file.
    ///
    /// # Errors
    /// `CorruptFooter` if the trailing magic is missing.
    pub fn footer_len(tail: &[u8]) -> Result<usize> {
        if tail.len() < 8 || &tail[tail.len() - 4..] != PARQUET_MAGIC {
            return Err(corrupt("missing trailing PAR1 magic"));
        }
        let n = tail.len();
        let mut len = [0u8; 4];
        len.copy_from_slice(&tail[n - 8..n - 4]);
        Ok(u32::from_le_bytes(len) as usize)
    }

    /// Parses thrift footer bytes and resolves the logical schema.
    ///
    /// # Errors
    /// `CorruptFooter` when the bytes do not decode or describe an inconsistent
    /// file; `UnsupportedOperation` for INT96 columns.
    pub fn parse(footer: &[u8]) -> Result<Self> {
        let file = FileMetaData::from_bytes(footer).map_err(|e| match e {
            InterchangeError::UnsupportedOperation(_) | InterchangeError::CorruptFooter(_) => e,
            other => corrupt(other.to_string()),
        })?;
        let (schema, layout) = resolve_schema(&file)?;
        for (i, rg) in file.row_groups.iter().enumerate() {
            if rg.columns.len() != layout.leaves.len() {
                return Err(corrupt(format!(
                    "row group {i} has {} column chunks, schema has {} leaves",
                    rg.columns.len(),
                    layout.leaves.len()
                )));
            }
            if rg.num_rows < 0 {
                return Err(corrupt(format!("row group {i} has a negative row count")));
            }
        }
        Ok(Self {
            file,
            schema,
            layout,
        })
    }

    /// Logical schema, with file key-value metadata (minus the embedded schema) as
    /// schema metadata.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.file.num_rows.max(0) as usize
    }

    pub fn num_row_groups(&self) -> usize {
        self.file.row_groups.len()
    }

    pub fn row_group_metadata(&self, i: usize) -> Option<&RowGroupMetaData> {
        self.file.row_groups.get(i)
    }

    /// Raw key-value metadata, including `"ARROW:schema"` when written.
    pub fn key_value_metadata(&self) -> &BTreeMap<String, String> {
        &self.file.key_value_metadata
    }

    pub fn created_by(&self) -> Option<&str> {
        self.file.created_by.as_deref()
    }

    pub fn file_metadata(&self) -> &FileMetaData {
        &self.file
    }

    pub(crate) fn layout(&self) -> &ColumnLayout {
        &self.layout
    }
}

fn resolve_schema(file: &FileMetaData) -> Result<(Schema, ColumnLayout)> {
    if file.schema.is_empty() {
        return Err(corrupt("empty parquet schema"));
    }
    let mut metadata = file.key_value_metadata.clone();
    let embedded = match metadata.remove(ARROW_SCHEMA_KEY) {
        Some(encoded) => {
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|e| corrupt(format!("embedded arrow schema is not base64: {e}")))?;
            let schema = schema_from_bytes(&bytes)
                .map_err(|e| corrupt(format!("embedded arrow schema: {e}")))?;
            Some(schema.fields)
        }
        None => None,
    };
    let (layout, fields) = ColumnLayout::for_file(&file.schema, embedded.as_deref())?;
    Ok((Schema::new(fields, metadata), layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_mapping_round_trips_without_embedded_schema() {
        let types = [
            DataType::Boolean,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::UInt8,
            DataType::UInt16,
            DataType::UInt32,
            DataType::UInt64,
            DataType::Float16,
            DataType::Float32,
            DataType::Float64,
            DataType::Decimal32(9, 2),
            DataType::Decimal64(18, 3),
            DataType::Decimal128(38, 4),
            DataType::Decimal256(76, 5),
            DataType::Utf8,
            DataType::Binary,
            DataType::FixedSizeBinary(7),
            DataType::Date32,
            DataType::Time32(TimeUnit::Millisecond),
            DataType::Time64(TimeUnit::Microsecond),
            DataType::Time64(TimeUnit::Nanosecond),
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            DataType::Timestamp(TimeUnit::Nanosecond, None),
            DataType::Null,
        ];
        for dt in types {
            let leaf = leaf_type(&dt).unwrap();
            let element = SchemaElement {
                name: "c".into(),
                physical_type: Some(leaf.physical),
                type_length: leaf.type_length,
                repetition: Some(Repetition::Optional),
                num_children: None,
                converted_type: leaf.converted,
                scale: leaf.decimal.map(|d| d.1),
                precision: leaf.decimal.map(|d| d.0),
                logical_type: leaf.logical,
            };
            assert_eq!(arrow_type(&element).unwrap(), dt, "{dt}");
        }
    }

    #[test]
    fn list_and_map_annotations_round_trip() {
        let file = FileMetaData {
            version: 1,
            schema: vec![
                SchemaElement::root(2),
                SchemaElement::group("l", Repetition::Optional, 1)
                    .annotated(LogicalType::List, converted::LIST),
                SchemaElement::group("list", Repetition::Repeated, 1),
                SchemaElement::leaf("item", Repetition::Optional, &leaf_type(&DataType::Int64).unwrap()),
                SchemaElement::group("m", Repetition::Required, 1)
                    .annotated(LogicalType::Map, converted::MAP),
                SchemaElement::group("key_value", Repetition::Repeated, 2),
                SchemaElement::leaf("key", Repetition::Required, &leaf_type(&DataType::Utf8).unwrap()),
                SchemaElement::leaf("value", Repetition::Optional, &leaf_type(&DataType::Int32).unwrap()),
            ],
            num_rows: 0,
            row_groups: Vec::new(),
            key_value_metadata: BTreeMap::new(),
            created_by: None,
        };
        let parsed = ParquetMetadata::parse(&file.to_bytes()).unwrap();
        assert_eq!(parsed.file_metadata(), &file);
        assert_eq!(parsed.layout().leaves.len(), 3);
        assert_eq!(
            parsed.schema().fields[0],
            Field::new("l", DataType::list(DataType::Int64), true)
        );
        let DataType::Map(entries, false) = &parsed.schema().fields[1].data_type else {
            panic!("expected a map");
        };
        assert_eq!(
            entries.data_type,
            DataType::Struct(vec![
                Field::new("key", DataType::Utf8, false),
                Field::new("value", DataType::Int32, true),
            ])
        );
    }

    #[test]
    fn footer_round_trip_and_corruption() {
        let file = FileMetaData {
            version: 1,
            schema: vec![
                SchemaElement::root(1),
                SchemaElement {
                    name: "x".into(),
                    physical_type: Some(PhysicalType::Int32),
                    type_length: None,
                    repetition: Some(Repetition::Required),
                    num_children: None,
                    converted_type: Some(converted::INT_16),
                    scale: None,
                    precision: None,
                    logical_type: Some(LogicalType::Integer {
                        bit_width: 16,
                        signed: true,
                    }),
                },
            ],
            num_rows: 2,
            row_groups: vec![RowGroupMetaData {
                columns: vec![ColumnChunkMetaData {
                    file_offset: 4,
                    physical_type: PhysicalType::Int32,
                    encodings: vec![Encoding::Plain, Encoding::Rle],
                    path_in_schema: vec!["x".into()],
                    codec: 0,
                    num_values: 2,
                    total_uncompressed_size: 30,
                    total_compressed_size: 30,
                    data_page_offset: 4,
                    dictionary_page_offset: None,
                    null_count: Some(0),
                }],
                total_byte_size: 30,
                num_rows: 2,
            }],
            key_value_metadata: BTreeMap::from([("hello".into(), "world".into())]),
            created_by: Some("test".into()),
        };
        let bytes = file.to_bytes();
        let parsed = ParquetMetadata::parse(&bytes).unwrap();
        assert_eq!(parsed.file_metadata(), &file);
        assert_eq!(parsed.schema().fields[0], Field::new("x", DataType::Int16, false));
        assert_eq!(parsed.schema().metadata["hello"], "world");

        assert!(matches!(
            ParquetMetadata::parse(&bytes[..bytes.len() / 2]),
            Err(InterchangeError::CorruptFooter(_))
        ));
        assert!(matches!(
            ParquetMetadata::footer_len(b"\0\0\0\0PAR2"),
            Err(InterchangeError::CorruptFooter(_))
        ));
    }

    #[test]
    fn page_header_round_trip() {
        let header = PageHeader {
            page_type: PageType::DataPage,
            uncompressed_page_size: 100,
            compressed_page_size: 60,
            data_page: Some(DataPageHeader {
                num_values: 10,
                encoding: Encoding::RleDictionary,
            }),
            data_page_v2: None,
            dictionary_page: None,
        };
        let mut bytes = header.to_bytes();
        let n = bytes.len();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert_eq!(PageHeader::from_bytes(&bytes).unwrap(), (header, n));
    }
}
