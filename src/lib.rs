//! # Minarrow Interchange
//!
//! Arrow-compatible columnar data with the plumbing to move it between
//! processes, files and object stores.
//!
//! - **Memory**: reference-counted, 64-byte aligned [`Buffer`]s, [`Bitmask`]
//!   validity, and a single [`Array`] type covering primitive, string, binary,
//!   view, list, struct, map and dictionary layouts with O(1) slicing.
//! - **Collections**: [`ChunkedArray`], [`RecordBatch`] and [`Table`], with
//!   rechunking and schema-checked construction.
//! - **FFI**: Arrow C Data and C Stream export/import wrapped in named
//!   capsules, see [`ffi::capsule`].
//! - **Codecs**: Parquet files with an optional async object-store reader,
//!   the IPC stream and file formats, CSV and JSON text tables, and an Avro
//!   schema registry, see [`io`].
//!
//! ## Example
//! ```rust
//! use minarrow_interchange::{Array, RechunkStrategy, Table};
//!
//! let table = Table::from_arrays(
//!     &["id", "name"],
//!     vec![Array::from_slice(&[1i16, 2, 3, 4]), Array::from_strs(&["a", "b", "c", "d"])],
//! ).unwrap();
//! let rechunked = table.rechunk(RechunkStrategy::Count(3)).unwrap();
//! assert_eq!(rechunked.chunk_lengths(), vec![3, 1]);
//! assert_eq!(rechunked, table);
//! ```

pub mod enums {
    pub mod error;
    pub mod scalar;
    pub mod time_units;
}

pub mod structs {
    pub mod chunked {
        pub mod chunked_array;
        pub mod table;
    }
    pub mod array;
    pub mod bitmask;
    pub mod buffer;
    pub mod builders;
    pub mod field;
    pub mod record_batch;
}

pub mod ffi {
    pub mod arrow_c_ffi;
    pub mod arrow_dtype;
    pub mod capsule;
    pub mod schema;
    pub mod stream;
}

pub mod kernels {
    pub mod cast;
}

pub mod traits {
    pub mod concatenate;
    pub mod print;
    pub mod type_unions;
}

pub mod io;

pub use enums::error::{BoxError, ErrorKind, InterchangeError, Result};
pub use enums::scalar::Scalar;
pub use enums::time_units::TimeUnit;

pub use structs::array::Array;
pub use structs::bitmask::Bitmask;
pub use structs::buffer::Buffer;
pub use structs::builders::{
    array_from_scalars, fixed_size_list_array, list_array, map_array, struct_array,
};
pub use structs::chunked::chunked_array::{ChunkedArray, RechunkStrategy};
pub use structs::chunked::table::Table;
pub use structs::field::Field;
pub use structs::record_batch::RecordBatch;

pub use ffi::arrow_dtype::DataType;
pub use ffi::capsule::{
    ArrayCapsule, ArrowExportable, Capsule, CapsuleImport, SchemaCapsule, StreamCapsule,
    import_from_capsule,
};
pub use ffi::schema::Schema;
pub use ffi::stream::{BatchReader, RecordBatchReader};

pub use kernels::cast::{can_cast, cast};
pub use traits::concatenate::{Concatenate, concat_arrays};
pub use traits::print::Print;
pub use traits::type_unions::{NativeType, OffsetType};
