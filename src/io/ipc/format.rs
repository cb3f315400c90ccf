//! # Arrow IPC flatbuffer tables
//!
//! Slot ids, union tags and wire structs of `Schema.fbs`, `Message.fbs` and
//! `File.fbs`, plus verifiers for every table the codec reads.
//!
//! Tables are read through [`View`], a thin wrapper over a verified
//! [`flatbuffers::Table`]. Each table kind has a zero-sized marker type that
//! knows how to verify it and follows to a [`View`], so
//! `flatbuffers::root::<MessageTable>(bytes)` checks the whole message before
//! any field is read.

use flatbuffers::{
    Follow, ForwardsUOffset, InvalidFlatbuffer, Push, PushAlignment, SimpleToVerifyInSlice, Table,
    VOffsetT, Vector, Verifiable, Verifier,
};

/// `MetadataVersion.V4`.
pub const VERSION_V4: i16 = 3;
/// `MetadataVersion.V5`, written by this crate.
pub const VERSION_V5: i16 = 4;

/// `MessageHeader` union tags.
pub mod header {
    pub const SCHEMA: u8 = 1;
    pub const DICTIONARY_BATCH: u8 = 2;
    pub const RECORD_BATCH: u8 = 3;
}

/// `Type` union tags.
pub mod type_id {
    pub const NULL: u8 = 1;
    pub const INT: u8 = 2;
    pub const FLOATING_POINT: u8 = 3;
    pub const BINARY: u8 = 4;
    pub const UTF8: u8 = 5;
    pub const BOOL: u8 = 6;
    pub const DECIMAL: u8 = 7;
    pub const DATE: u8 = 8;
    pub const TIME: u8 = 9;
    pub const TIMESTAMP: u8 = 10;
    pub const INTERVAL: u8 = 11;
    pub const LIST: u8 = 12;
    pub const STRUCT: u8 = 13;
    pub const UNION: u8 = 14;
    pub const FIXED_SIZE_BINARY: u8 = 15;
    pub const FIXED_SIZE_LIST: u8 = 16;
    pub const MAP: u8 = 17;
    pub const DURATION: u8 = 18;
    pub const LARGE_BINARY: u8 = 19;
    pub const LARGE_UTF8: u8 = 20;
    pub const LARGE_LIST: u8 = 21;
    pub const RUN_END_ENCODED: u8 = 22;
    pub const BINARY_VIEW: u8 = 23;
    pub const UTF8_VIEW: u8 = 24;
    pub const LIST_VIEW: u8 = 25;
    pub const LARGE_LIST_VIEW: u8 = 26;
}

/// `CompressionType` values of `BodyCompression.codec`.
pub const CODEC_LZ4_FRAME: i8 = 0;
pub const CODEC_ZSTD: i8 = 1;

/// Vtable slots, one module per table.
pub mod slot {
    use flatbuffers::VOffsetT;

    pub mod message {
        use super::VOffsetT;
        pub const VERSION: VOffsetT = 4;
        pub const HEADER_TYPE: VOffsetT = 6;
        pub const HEADER: VOffsetT = 8;
        pub const BODY_LENGTH: VOffsetT = 10;
        pub const CUSTOM_METADATA: VOffsetT = 12;
    }

    pub mod schema {
        use super::VOffsetT;
        pub const ENDIANNESS: VOffsetT = 4;
        pub const FIELDS: VOffsetT = 6;
        pub const CUSTOM_METADATA: VOffsetT = 8;
        pub const FEATURES: VOffsetT = 10;
    }

    pub mod field {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const NULLABLE: VOffsetT = 6;
        pub const TYPE_TYPE: VOffsetT = 8;
        pub const TYPE: VOffsetT = 10;
        pub const DICTIONARY: VOffsetT = 12;
        pub const CHILDREN: VOffsetT = 14;
        pub const CUSTOM_METADATA: VOffsetT = 16;
    }

    pub mod key_value {
        use super::VOffsetT;
        pub const KEY: VOffsetT = 4;
        pub const VALUE: VOffsetT = 6;
    }

    pub mod dictionary_encoding {
        use super::VOffsetT;
        pub const ID: VOffsetT = 4;
        pub const INDEX_TYPE: VOffsetT = 6;
        pub const IS_ORDERED: VOffsetT = 8;
        pub const KIND: VOffsetT = 10;
    }

    pub mod record_batch {
        use super::VOffsetT;
        pub const LENGTH: VOffsetT = 4;
        pub const NODES: VOffsetT = 6;
        pub const BUFFERS: VOffsetT = 8;
        pub const COMPRESSION: VOffsetT = 10;
        pub const VARIADIC_BUFFER_COUNTS: VOffsetT = 12;
    }

    pub mod body_compression {
        use super::VOffsetT;
        pub const CODEC: VOffsetT = 4;
        pub const METHOD: VOffsetT = 6;
    }

    pub mod dictionary_batch {
        use super::VOffsetT;
        pub const ID: VOffsetT = 4;
        pub const DATA: VOffsetT = 6;
        pub const IS_DELTA: VOffsetT = 8;
    }

    pub mod footer {
        use super::VOffsetT;
        pub const VERSION: VOffsetT = 4;
        pub const SCHEMA: VOffsetT = 6;
        pub const DICTIONARIES: VOffsetT = 8;
        pub const RECORD_BATCHES: VOffsetT = 10;
        pub const CUSTOM_METADATA: VOffsetT = 12;
    }

    /// The first slot of every type table (`Int.bitWidth`, `Decimal.precision`,
    /// `Timestamp.unit`, `FixedSizeList.listSize` and so on).
    pub const TYPE_FIRST: VOffsetT = 4;
    pub const TYPE_SECOND: VOffsetT = 6;
    pub const TYPE_THIRD: VOffsetT = 8;
}

// ---------------------------------------------------------------
// Reading
// ---------------------------------------------------------------

/// A verified table.
#[derive(Clone, Copy)]
pub struct View<'a> {
    tab: Table<'a>,
}

impl<'a> View<'a> {
    /// Scalar slot, or `default` when absent.
    pub fn scalar<T>(&self, slot: VOffsetT, default: T) -> T
    where
        T: Follow<'a, Inner = T> + Copy + 'a,
    {
        // SAFETY: views only exist over buffers that passed verification.
        unsafe { self.tab.get::<T>(slot, Some(default)) }.unwrap_or(default)
    }

    pub fn str(&self, slot: VOffsetT) -> Option<&'a str> {
        // SAFETY: as for `scalar`.
        unsafe { self.tab.get::<ForwardsUOffset<&'a str>>(slot, None) }
    }

    pub fn table(&self, slot: VOffsetT) -> Option<View<'a>> {
        // SAFETY: as for `scalar`.
        unsafe { self.tab.get::<ForwardsUOffset<Table<'a>>>(slot, None) }.map(|tab| View { tab })
    }

    /// Vector of tables; empty when the slot is absent.
    pub fn tables(&self, slot: VOffsetT) -> impl Iterator<Item = View<'a>> + 'a {
        // SAFETY: as for `scalar`.
        unsafe { self.tab.get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Table<'a>>>>>(slot, None) }
            .into_iter()
            .flat_map(|v| v.iter())
            .map(|tab| View { tab })
    }

    /// Vector of fixed-size structs; empty when the slot is absent.
    pub fn structs<S>(&self, slot: VOffsetT) -> impl Iterator<Item = &'a S> + 'a
    where
        S: Follow<'a, Inner = &'a S> + 'a,
    {
        // SAFETY: as for `scalar`.
        unsafe { self.tab.get::<ForwardsUOffset<Vector<'a, S>>>(slot, None) }
            .into_iter()
            .flat_map(|v| v.iter())
    }

    /// Vector of scalars; empty when the slot is absent.
    pub fn scalars<T>(&self, slot: VOffsetT) -> impl Iterator<Item = T> + 'a
    where
        T: Follow<'a, Inner = T> + 'a,
    {
        // SAFETY: as for `scalar`.
        unsafe { self.tab.get::<ForwardsUOffset<Vector<'a, T>>>(slot, None) }
            .into_iter()
            .flat_map(|v| v.iter())
    }
}

/// Declares a marker type for one table kind: it follows to a [`View`] and
/// verifies the listed slots.
macro_rules! table_kind {
    ($(#[$doc:meta])* $name:ident { $($field:literal @ $slot:expr => $ty:ty),* $(,)? }) => {
        $(#[$doc])*
        pub struct $name;

        impl<'a> Follow<'a> for $name {
            type Inner = View<'a>;

            unsafe fn follow(buf: &'a [u8], loc: usize) -> View<'a> {
                View { tab: unsafe { Table::new(buf, loc) } }
            }
        }

        impl Verifiable for $name {
            fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<(), InvalidFlatbuffer> {
                v.visit_table(pos)?
                    $(.visit_field::<$ty>($field, $slot, false)?)*
                    .finish();
                Ok(())
            }
        }
    };
}

table_kind!(
    /// `KeyValue`.
    KeyValueTable {
        "key" @ slot::key_value::KEY => ForwardsUOffset<&str>,
        "value" @ slot::key_value::VALUE => ForwardsUOffset<&str>,
    }
);

table_kind!(
    /// `Int`, also the dictionary index type.
    IntTable {
        "bitWidth" @ slot::TYPE_FIRST => i32,
        "is_signed" @ slot::TYPE_SECOND => bool,
    }
);

table_kind!(
    /// Type tables with a single `short` unit or precision.
    UnitTable {
        "unit" @ slot::TYPE_FIRST => i16,
    }
);

table_kind!(
    /// Type tables with a single `int` width or size.
    WidthTable {
        "width" @ slot::TYPE_FIRST => i32,
    }
);

table_kind!(
    /// `Decimal`.
    DecimalTable {
        "precision" @ slot::TYPE_FIRST => i32,
        "scale" @ slot::TYPE_SECOND => i32,
        "bitWidth" @ slot::TYPE_THIRD => i32,
    }
);

table_kind!(
    /// `Time`.
    TimeTable {
        "unit" @ slot::TYPE_FIRST => i16,
        "bitWidth" @ slot::TYPE_SECOND => i32,
    }
);

table_kind!(
    /// `Timestamp`.
    TimestampTable {
        "unit" @ slot::TYPE_FIRST => i16,
        "timezone" @ slot::TYPE_SECOND => ForwardsUOffset<&str>,
    }
);

table_kind!(
    /// `Map`.
    MapTable {
        "keysSorted" @ slot::TYPE_FIRST => bool,
    }
);

table_kind!(
    /// Type tables without fields (`Utf8`, `List`, `Struct_` and the like).
    EmptyTable {}
);

table_kind!(
    /// `DictionaryEncoding`.
    DictionaryEncodingTable {
        "id" @ slot::dictionary_encoding::ID => i64,
        "indexType" @ slot::dictionary_encoding::INDEX_TYPE => ForwardsUOffset<IntTable>,
        "isOrdered" @ slot::dictionary_encoding::IS_ORDERED => bool,
        "dictionaryKind" @ slot::dictionary_encoding::KIND => i16,
    }
);

table_kind!(
    /// `Schema`.
    SchemaTable {
        "endianness" @ slot::schema::ENDIANNESS => i16,
        "fields" @ slot::schema::FIELDS => ForwardsUOffset<Vector<'_, ForwardsUOffset<FieldTable>>>,
        "custom_metadata" @ slot::schema::CUSTOM_METADATA => ForwardsUOffset<Vector<'_, ForwardsUOffset<KeyValueTable>>>,
        "features" @ slot::schema::FEATURES => ForwardsUOffset<Vector<'_, i64>>,
    }
);

table_kind!(
    /// `BodyCompression`.
    BodyCompressionTable {
        "codec" @ slot::body_compression::CODEC => i8,
        "method" @ slot::body_compression::METHOD => i8,
    }
);

table_kind!(
    /// `RecordBatch`.
    RecordBatchTable {
        "length" @ slot::record_batch::LENGTH => i64,
        "nodes" @ slot::record_batch::NODES => ForwardsUOffset<Vector<'_, FieldNode>>,
        "buffers" @ slot::record_batch::BUFFERS => ForwardsUOffset<Vector<'_, Buffer>>,
        "compression" @ slot::record_batch::COMPRESSION => ForwardsUOffset<BodyCompressionTable>,
        "variadicBufferCounts" @ slot::record_batch::VARIADIC_BUFFER_COUNTS => ForwardsUOffset<Vector<'_, i64>>,
    }
);

table_kind!(
    /// `DictionaryBatch`.
    DictionaryBatchTable {
        "id" @ slot::dictionary_batch::ID => i64,
        "data" @ slot::dictionary_batch::DATA => ForwardsUOffset<RecordBatchTable>,
        "isDelta" @ slot::dictionary_batch::IS_DELTA => bool,
    }
);

table_kind!(
    /// `Footer`.
    FooterTable {
        "version" @ slot::footer::VERSION => i16,
        "schema" @ slot::footer::SCHEMA => ForwardsUOffset<SchemaTable>,
        "dictionaries" @ slot::footer::DICTIONARIES => ForwardsUOffset<Vector<'_, Block>>,
        "recordBatches" @ slot::footer::RECORD_BATCHES => ForwardsUOffset<Vector<'_, Block>>,
        "custom_metadata" @ slot::footer::CUSTOM_METADATA => ForwardsUOffset<Vector<'_, ForwardsUOffset<KeyValueTable>>>,
    }
);

/// `Field`. Verified by hand for its `Type` union.
pub struct FieldTable;

impl<'a> Follow<'a> for FieldTable {
    type Inner = View<'a>;

    unsafe fn follow(buf: &'a [u8], loc: usize) -> View<'a> {
        View { tab: unsafe { Table::new(buf, loc) } }
    }
}

impl Verifiable for FieldTable {
    fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<(), InvalidFlatbuffer> {
        use slot::field::*;
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<&str>>("name", NAME, false)?
            .visit_field::<bool>("nullable", NULLABLE, false)?
            .visit_union::<u8, _>("type_type", TYPE_TYPE, "type", TYPE, false, verify_type)?
            .visit_field::<ForwardsUOffset<DictionaryEncodingTable>>("dictionary", DICTIONARY, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<FieldTable>>>>(
                "children", CHILDREN, false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<KeyValueTable>>>>(
                "custom_metadata",
                CUSTOM_METADATA,
                false,
            )?
            .finish();
        Ok(())
    }
}

fn verify_type(key: u8, v: &mut Verifier<'_, '_>, pos: usize) -> Result<(), InvalidFlatbuffer> {
    use type_id::*;
    match key {
        INT => v.verify_union_variant::<ForwardsUOffset<IntTable>>("Type::Int", pos),
        FLOATING_POINT | DATE | DURATION | INTERVAL => {
            v.verify_union_variant::<ForwardsUOffset<UnitTable>>("Type::Unit", pos)
        }
        DECIMAL => v.verify_union_variant::<ForwardsUOffset<DecimalTable>>("Type::Decimal", pos),
        TIME => v.verify_union_variant::<ForwardsUOffset<TimeTable>>("Type::Time", pos),
        TIMESTAMP => {
            v.verify_union_variant::<ForwardsUOffset<TimestampTable>>("Type::Timestamp", pos)
        }
        FIXED_SIZE_BINARY | FIXED_SIZE_LIST => {
            v.verify_union_variant::<ForwardsUOffset<WidthTable>>("Type::Width", pos)
        }
        MAP => v.verify_union_variant::<ForwardsUOffset<MapTable>>("Type::Map", pos),
        NULL | BINARY | UTF8 | BOOL | LIST | STRUCT | LARGE_BINARY | LARGE_UTF8 | LARGE_LIST
        | BINARY_VIEW | UTF8_VIEW | LIST_VIEW | LARGE_LIST_VIEW | RUN_END_ENCODED | UNION => {
            v.verify_union_variant::<ForwardsUOffset<EmptyTable>>("Type::Empty", pos)
        }
        _ => Ok(()),
    }
}

/// `Message`. Verified by hand for its `MessageHeader` union.
pub struct MessageTable;

impl<'a> Follow<'a> for MessageTable {
    type Inner = View<'a>;

    unsafe fn follow(buf: &'a [u8], loc: usize) -> View<'a> {
        View { tab: unsafe { Table::new(buf, loc) } }
    }
}

impl Verifiable for MessageTable {
    fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<(), InvalidFlatbuffer> {
        use slot::message::*;
        v.visit_table(pos)?
            .visit_field::<i16>("version", VERSION, false)?
            .visit_union::<u8, _>(
                "header_type",
                HEADER_TYPE,
                "header",
                HEADER,
                false,
                |key, v, pos| match key {
                    header::SCHEMA => {
                        v.verify_union_variant::<ForwardsUOffset<SchemaTable>>("Schema", pos)
                    }
                    header::DICTIONARY_BATCH => v
                        .verify_union_variant::<ForwardsUOffset<DictionaryBatchTable>>(
                            "DictionaryBatch",
                            pos,
                        ),
                    header::RECORD_BATCH => v
                        .verify_union_variant::<ForwardsUOffset<RecordBatchTable>>(
                            "RecordBatch",
                            pos,
                        ),
                    _ => Ok(()),
                },
            )?
            .visit_field::<i64>("bodyLength", BODY_LENGTH, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<KeyValueTable>>>>(
                "custom_metadata",
                CUSTOM_METADATA,
                false,
            )?
            .finish();
        Ok(())
    }
}

// ---------------------------------------------------------------
// Wire structs
// ---------------------------------------------------------------

/// Declares a little-endian flatbuffer struct stored as raw bytes.
macro_rules! wire_struct {
    ($(#[$doc:meta])* $name:ident[$size:literal]) => {
        $(#[$doc])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $name([u8; $size]);

        impl<'a> Follow<'a> for $name {
            type Inner = &'a $name;

            unsafe fn follow(buf: &'a [u8], loc: usize) -> &'a $name {
                unsafe { flatbuffers::follow_cast_ref::<$name>(buf, loc) }
            }
        }

        impl Push for $name {
            type Output = $name;

            unsafe fn push(&self, dst: &mut [u8], _written_len: usize) {
                dst.copy_from_slice(&self.0);
            }

            fn alignment() -> PushAlignment {
                PushAlignment::new(8)
            }
        }

        impl Verifiable for $name {
            fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<(), InvalidFlatbuffer> {
                v.in_buffer::<Self>(pos)
            }
        }

        impl SimpleToVerifyInSlice for $name {}

        impl $name {
            fn word(&self, at: usize) -> i64 {
                let mut b = [0u8; 8];
                b.copy_from_slice(&self.0[at..at + 8]);
                i64::from_le_bytes(b)
            }
        }
    };
}

wire_struct!(
    /// `FieldNode { length: long, null_count: long }`.
    FieldNode[16]
);

wire_struct!(
    /// `Buffer { offset: long, length: long }`.
    Buffer[16]
);

wire_struct!(
    /// `Block { offset: long, metaDataLength: int, bodyLength: long }`, with
    /// four bytes of padding after the metadata length.
    Block[24]
);

fn pair(a: i64, b: i64) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&a.to_le_bytes());
    out[8..].copy_from_slice(&b.to_le_bytes());
    out
}

impl FieldNode {
    pub fn new(length: i64, null_count: i64) -> Self {
        Self(pair(length, null_count))
    }

    pub fn length(&self) -> i64 {
        self.word(0)
    }

    pub fn null_count(&self) -> i64 {
        self.word(8)
    }
}

impl Buffer {
    pub fn new(offset: i64, length: i64) -> Self {
        Self(pair(offset, length))
    }

    pub fn offset(&self) -> i64 {
        self.word(0)
    }

    pub fn length(&self) -> i64 {
        self.word(8)
    }
}

impl Block {
    pub fn new(offset: i64, metadata_len: i32, body_len: i64) -> Self {
        let mut out = [0u8; 24];
        out[..8].copy_from_slice(&offset.to_le_bytes());
        out[8..12].copy_from_slice(&metadata_len.to_le_bytes());
        out[16..].copy_from_slice(&body_len.to_le_bytes());
        Self(out)
    }

    pub fn offset(&self) -> i64 {
        self.word(0)
    }

    pub fn metadata_len(&self) -> i32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.0[8..12]);
        i32::from_le_bytes(b)
    }

    pub fn body_len(&self) -> i64 {
        self.word(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatbuffers::FlatBufferBuilder;

    #[test]
    fn wire_structs_are_little_endian() {
        let block = Block::new(0x0102, 64, -1);
        assert_eq!(block.0[0], 0x02);
        assert_eq!(block.0[1], 0x01);
        assert_eq!(&block.0[8..12], &64i32.to_le_bytes());
        assert_eq!(&block.0[12..16], &[0, 0, 0, 0]);
        assert_eq!(block.offset(), 0x0102);
        assert_eq!(block.metadata_len(), 64);
        assert_eq!(block.body_len(), -1);
        assert_eq!(std::mem::size_of::<Block>(), 24);
        assert_eq!(std::mem::size_of::<FieldNode>(), 16);
    }

    #[test]
    fn struct_vectors_read_back_through_a_view() {
        let mut fbb = FlatBufferBuilder::new();
        let nodes = fbb.create_vector(&[FieldNode::new(3, 1), FieldNode::new(7, 0)]);
        let start = fbb.start_table();
        fbb.push_slot::<i64>(slot::record_batch::LENGTH, 3, 0);
        fbb.push_slot_always(slot::record_batch::NODES, nodes);
        let root = fbb.end_table(start);
        fbb.finish(root, None);

        let view = flatbuffers::root::<RecordBatchTable>(fbb.finished_data()).unwrap();
        assert_eq!(view.scalar::<i64>(slot::record_batch::LENGTH, 0), 3);
        let read: Vec<_> = view
            .structs::<FieldNode>(slot::record_batch::NODES)
            .map(|n| (n.length(), n.null_count()))
            .collect();
        assert_eq!(read, vec![(3, 1), (7, 0)]);
        assert_eq!(view.structs::<Buffer>(slot::record_batch::BUFFERS).count(), 0);
        assert!(view.table(slot::record_batch::COMPRESSION).is_none());
    }

    #[test]
    fn truncated_tables_fail_verification() {
        let mut fbb = FlatBufferBuilder::new();
        let name = fbb.create_string("column");
        let start = fbb.start_table();
        fbb.push_slot_always(slot::field::NAME, name);
        let root = fbb.end_table(start);
        fbb.finish(root, None);
        let bytes = fbb.finished_data();
        assert!(flatbuffers::root::<FieldTable>(bytes).is_ok());
        assert!(flatbuffers::root::<FieldTable>(&bytes[..bytes.len() - 6]).is_err());
    }
}
