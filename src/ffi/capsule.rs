//! # **Capsule Module** - *Named handles for the C Data and C Stream structs*
//!
//! A capsule is a tagged owner of one C struct, mirroring how the structs are
//! passed between libraries in practice:
//!
//! | Capsule | Name | Payload |
//! |---|---|---|
//! | [`SchemaCapsule`] | `"arrow_schema"` | [`ArrowSchema`] |
//! | [`ArrayCapsule`] | `"arrow_array"` | [`ArrowArray`] |
//! | [`StreamCapsule`] | `"arrow_array_stream"` | [`ArrowArrayStream`] |
//!
//! Producers implement [`ArrowExportable`]. Consumers call [`import_from_capsule`],
//! or the `from_arrow` constructors on `Array`, `RecordBatch`, `ChunkedArray`,
//! `Table`, `Schema` and `Field`, which take any exportable value.
//!
//! Errors raised by a foreign exporter reach the caller as
//! [`InterchangeError::Foreign`] holding the exporter's own error value.

use tracing::debug;

use crate::enums::error::{BoxError, ErrorKind, InterchangeError, Result};
use crate::ffi::arrow_c_ffi::{
    ArrowArray, ArrowSchema, export_array as export_c_array, export_field, import_array,
    import_field, schema_from_struct_field,
};
use crate::ffi::stream::{
    ArrowArrayStream, ArrowStreamReader, BatchReader, RecordBatchReader, export_chunks,
    export_reader,
};
use crate::kernels::cast::cast;
use crate::traits::concatenate::concat_arrays;
use crate::{Array, ChunkedArray, DataType, Field, RecordBatch, Schema, Table};

/// A C struct that can travel inside a [`Capsule`].
pub trait CapsulePayload {
    /// Capsule name tag consumers expect.
    const NAME: &'static str;

    fn released() -> Self;

    fn is_released(&self) -> bool;
}

impl CapsulePayload for ArrowSchema {
    const NAME: &'static str = "arrow_schema";

    fn released() -> Self {
        ArrowSchema::empty()
    }

    fn is_released(&self) -> bool {
        ArrowSchema::is_released(self)
    }
}

impl CapsulePayload for ArrowArray {
    const NAME: &'static str = "arrow_array";

    fn released() -> Self {
        ArrowArray::empty()
    }

    fn is_released(&self) -> bool {
        ArrowArray::is_released(self)
    }
}

impl CapsulePayload for ArrowArrayStream {
    const NAME: &'static str = "arrow_array_stream";

    fn released() -> Self {
        ArrowArrayStream::empty()
    }

    fn is_released(&self) -> bool {
        ArrowArrayStream::is_released(self)
    }
}

/// # Capsule
///
/// Named owner of one C struct.
///
/// The payload's release callback runs exactly once: when an importer takes it
/// and drops the imported value, or when the capsule itself drops unconsumed.
#[derive(Debug)]
pub struct Capsule<T: CapsulePayload> {
    name: String,
    payload: T,
}

pub type SchemaCapsule = Capsule<ArrowSchema>;
pub type ArrayCapsule = Capsule<ArrowArray>;
pub type StreamCapsule = Capsule<ArrowArrayStream>;

impl<T: CapsulePayload> Capsule<T> {
    /// Wraps `payload` under its standard name.
    pub fn new(payload: T) -> Self {
        Self {
            name: T::NAME.to_string(),
            payload,
        }
    }

    /// Wraps `payload` under an arbitrary name, as a foreign producer might.
    pub fn with_name(name: impl Into<String>, payload: T) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.payload.is_released()
    }

    /// Borrows the payload without consuming it.
    pub fn payload(&self) -> Result<&T> {
        self.check()?;
        Ok(&self.payload)
    }

    /// Moves the payload out, leaving the capsule released.
    ///
    /// # Errors
    /// `ImportError` on a name mismatch or an already released payload.
    pub fn take(&mut self) -> Result<T> {
        self.check()?;
        Ok(std::mem::replace(&mut self.payload, T::released()))
    }

    fn check(&self) -> Result<()> {
        if self.name != T::NAME {
            return Err(InterchangeError::ImportError(format!(
                "expected a capsule named '{}', found '{}'",
                T::NAME,
                self.name
            )));
        }
        if self.payload.is_released() {
            return Err(InterchangeError::ImportError(format!(
                "capsule '{}' has already been consumed",
                self.name
            )));
        }
        Ok(())
    }
}

fn not_exported(what: &str) -> BoxError {
    Box::new(InterchangeError::UnsupportedOperation(format!(
        "object does not implement {what}"
    )))
}

/// # ArrowExportable
///
/// Producer side of the capsule protocol. Each method is optional; the defaults
/// report `UnsupportedOperation`.
///
/// Errors are boxed so foreign producers can return their own error types,
/// which consumers receive unchanged.
pub trait ArrowExportable {
    /// Schema of the value.
    fn arrow_c_schema(&self) -> std::result::Result<SchemaCapsule, BoxError> {
        Err(not_exported("arrow_c_schema"))
    }

    /// The value as one array, cast to `requested` when given.
    fn arrow_c_array(
        &self,
        _requested: Option<&SchemaCapsule>,
    ) -> std::result::Result<(SchemaCapsule, ArrayCapsule), BoxError> {
        Err(not_exported("arrow_c_array"))
    }

    /// The value as a stream of arrays, each cast to `requested` when given.
    fn arrow_c_stream(
        &self,
        _requested: Option<&SchemaCapsule>,
    ) -> std::result::Result<StreamCapsule, BoxError> {
        Err(not_exported("arrow_c_stream"))
    }
}

// ---------------------------------------------------------------
// Free-function entry points
// ---------------------------------------------------------------

/// Exports the schema of `source`.
pub fn export_schema<S: ArrowExportable + ?Sized>(source: &S) -> Result<SchemaCapsule> {
    source.arrow_c_schema().map_err(InterchangeError::foreign)
}

/// Exports `source` as one array, cast to `requested` when given.
pub fn export_array<S: ArrowExportable + ?Sized>(
    source: &S,
    requested: Option<&SchemaCapsule>,
) -> Result<(ArrayCapsule, SchemaCapsule)> {
    let (schema, array) = source
        .arrow_c_array(requested)
        .map_err(InterchangeError::foreign)?;
    Ok((array, schema))
}

/// Exports `source` as a pull stream, each chunk cast to `requested` when given.
pub fn export_stream<S: ArrowExportable + ?Sized>(
    source: &S,
    requested: Option<&SchemaCapsule>,
) -> Result<StreamCapsule> {
    source
        .arrow_c_stream(requested)
        .map_err(InterchangeError::foreign)
}

/// Capsules (or capsule pairs) that [`import_from_capsule`] understands.
pub trait CapsuleImport {
    type Output;

    fn import(&mut self) -> Result<Self::Output>;
}

impl CapsuleImport for SchemaCapsule {
    type Output = Field;

    fn import(&mut self) -> Result<Field> {
        let schema = self.take()?;
        unsafe { import_field(&schema) }
    }
}

impl CapsuleImport for (SchemaCapsule, ArrayCapsule) {
    type Output = (Field, Array);

    fn import(&mut self) -> Result<(Field, Array)> {
        self.0.check()?;
        self.1.check()?;
        let schema = self.0.take()?;
        let field = unsafe { import_field(&schema) }?;
        let array = self.1.take()?;
        let array = unsafe { import_array(array, &field.data_type) }?;
        Ok((field, array))
    }
}

impl CapsuleImport for StreamCapsule {
    type Output = ArrowStreamReader;

    fn import(&mut self) -> Result<ArrowStreamReader> {
        let stream = self.take()?;
        unsafe { ArrowStreamReader::try_new(stream) }
    }
}

/// Validates the capsule's name, takes ownership of its payload and imports it.
///
/// The capsule is left released.
pub fn import_from_capsule<C: CapsuleImport>(capsule: &mut C) -> Result<C::Output> {
    capsule.import()
}

/// Field requested by a consumer. The capsule is borrowed, not consumed.
fn requested_field(requested: Option<&SchemaCapsule>) -> Result<Option<Field>> {
    match requested {
        Some(c) => Ok(Some(unsafe { import_field(c.payload()?) }?)),
        None => Ok(None),
    }
}

fn requested_schema(requested: Option<&SchemaCapsule>) -> Result<Option<Schema>> {
    requested_field(requested)?
        .map(schema_from_struct_field)
        .transpose()
}

// ---------------------------------------------------------------
// Producers
// ---------------------------------------------------------------

impl ArrowExportable for DataType {
    fn arrow_c_schema(&self) -> std::result::Result<SchemaCapsule, BoxError> {
        Ok(Capsule::new(export_field(&Field::new("", self.clone(), true))?))
    }
}

impl ArrowExportable for Field {
    fn arrow_c_schema(&self) -> std::result::Result<SchemaCapsule, BoxError> {
        Ok(Capsule::new(export_field(self)?))
    }
}

impl ArrowExportable for Schema {
    fn arrow_c_schema(&self) -> std::result::Result<SchemaCapsule, BoxError> {
        Ok(Capsule::new(crate::ffi::arrow_c_ffi::export_schema(self)?))
    }
}

impl ArrowExportable for Array {
    fn arrow_c_schema(&self) -> std::result::Result<SchemaCapsule, BoxError> {
        Ok(Capsule::new(export_field(&Field::from_array("", self))?))
    }

    fn arrow_c_array(
        &self,
        requested: Option<&SchemaCapsule>,
    ) -> std::result::Result<(SchemaCapsule, ArrayCapsule), BoxError> {
        let (field, array) = match requested_field(requested)? {
            Some(target) => {
                let array = cast(self, &target.data_type)?;
                (target, array)
            }
            None => (Field::from_array("", self), self.clone()),
        };
        Ok((
            Capsule::new(export_field(&field)?),
            Capsule::new(export_c_array(&array)),
        ))
    }

    fn arrow_c_stream(
        &self,
        requested: Option<&SchemaCapsule>,
    ) -> std::result::Result<StreamCapsule, BoxError> {
        let target = requested_field(requested)?;
        let stream = export_chunks(
            vec![self.clone()],
            Field::from_array("", self),
            target.as_ref().map(|f| &f.data_type),
        )?;
        Ok(Capsule::new(stream))
    }
}

impl ArrowExportable for RecordBatch {
    fn arrow_c_schema(&self) -> std::result::Result<SchemaCapsule, BoxError> {
        self.schema().arrow_c_schema()
    }

    fn arrow_c_array(
        &self,
        requested: Option<&SchemaCapsule>,
    ) -> std::result::Result<(SchemaCapsule, ArrayCapsule), BoxError> {
        let batch = match requested_schema(requested)? {
            Some(target) => self.cast(&target)?,
            None => self.clone(),
        };
        let array = batch.to_struct_array()?;
        Ok((
            Capsule::new(crate::ffi::arrow_c_ffi::export_schema(batch.schema())?),
            Capsule::new(export_c_array(&array)),
        ))
    }

    fn arrow_c_stream(
        &self,
        requested: Option<&SchemaCapsule>,
    ) -> std::result::Result<StreamCapsule, BoxError> {
        let reader = BatchReader::new(self.schema().clone(), vec![self.clone()]);
        Ok(Capsule::new(export_reader(Box::new(reader), requested_schema(requested)?)?))
    }
}

impl ArrowExportable for ChunkedArray {
    fn arrow_c_schema(&self) -> std::result::Result<SchemaCapsule, BoxError> {
        self.field().arrow_c_schema()
    }

    fn arrow_c_stream(
        &self,
        requested: Option<&SchemaCapsule>,
    ) -> std::result::Result<StreamCapsule, BoxError> {
        let target = requested_field(requested)?;
        let stream = export_chunks(
            self.chunks().to_vec(),
            self.field().clone(),
            target.as_ref().map(|f| &f.data_type),
        )?;
        Ok(Capsule::new(stream))
    }
}

impl ArrowExportable for Table {
    fn arrow_c_schema(&self) -> std::result::Result<SchemaCapsule, BoxError> {
        self.schema().arrow_c_schema()
    }

    fn arrow_c_stream(
        &self,
        requested: Option<&SchemaCapsule>,
    ) -> std::result::Result<StreamCapsule, BoxError> {
        Ok(Capsule::new(export_reader(
            Box::new(self.to_reader()),
            requested_schema(requested)?,
        )?))
    }
}

// ---------------------------------------------------------------
// Consumers
// ---------------------------------------------------------------

/// True when the producer simply lacks the requested method.
fn is_not_exported(err: &InterchangeError) -> bool {
    err.kind() == ErrorKind::UnsupportedOperation
}

fn pull_array<S: ArrowExportable + ?Sized>(source: &S) -> Result<(Field, Array)> {
    let mut pair = export_array(source, None).map(|(a, s)| (s, a))?;
    import_from_capsule(&mut pair)
}

fn pull_stream<S: ArrowExportable + ?Sized>(source: &S) -> Result<ArrowStreamReader> {
    let mut capsule = export_stream(source, None)?;
    import_from_capsule(&mut capsule)
}

impl Field {
    /// Imports the schema of any exportable value.
    pub fn from_arrow<S: ArrowExportable + ?Sized>(source: &S) -> Result<Field> {
        let mut capsule = export_schema(source)?;
        import_from_capsule(&mut capsule)
    }
}

impl Schema {
    /// Imports the struct schema of any exportable value.
    pub fn from_arrow<S: ArrowExportable + ?Sized>(source: &S) -> Result<Schema> {
        schema_from_struct_field(Field::from_arrow(source)?)
    }
}

impl Array {
    /// Imports any exportable value as one array.
    ///
    /// Uses `arrow_c_array`, falling back to concatenating the chunks of
    /// `arrow_c_stream`.
    pub fn from_arrow<S: ArrowExportable + ?Sized>(source: &S) -> Result<Array> {
        match pull_array(source) {
            Ok((_, array)) => Ok(array),
            Err(e) if is_not_exported(&e) => {
                debug!("arrow_c_array unavailable, reading arrow_c_stream");
                let reader = pull_stream(source)?;
                let data_type = reader.field().data_type.clone();
                let chunks = reader.collect::<Result<Vec<_>>>()?;
                if chunks.is_empty() {
                    Array::new_null_typed(&data_type, 0)
                } else {
                    concat_arrays(&chunks)
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl ChunkedArray {
    /// Imports any exportable value, keeping its stream chunking.
    ///
    /// Uses `arrow_c_stream`, falling back to a single chunk from `arrow_c_array`.
    pub fn from_arrow<S: ArrowExportable + ?Sized>(source: &S) -> Result<ChunkedArray> {
        match pull_stream(source) {
            Ok(reader) => {
                let field = reader.field().clone();
                let chunks = reader.collect::<Result<Vec<_>>>()?;
                ChunkedArray::try_new(chunks, field)
            }
            Err(e) if is_not_exported(&e) => {
                let (field, array) = pull_array(source)?;
                ChunkedArray::try_new(vec![array], field)
            }
            Err(e) => Err(e),
        }
    }
}

impl RecordBatch {
    /// Imports a struct-typed array as a batch, falling back to merging a stream.
    pub fn from_arrow<S: ArrowExportable + ?Sized>(source: &S) -> Result<RecordBatch> {
        match pull_array(source) {
            Ok((field, array)) => {
                let schema = schema_from_struct_field(field)?;
                RecordBatch::from_struct_array(&array)?.with_schema(schema)
            }
            Err(e) if is_not_exported(&e) => Table::from_arrow(source)?.to_record_batch(),
            Err(e) => Err(e),
        }
    }
}

impl Table {
    /// Imports a record-batch stream, falling back to a single struct array.
    pub fn from_arrow<S: ArrowExportable + ?Sized>(source: &S) -> Result<Table> {
        match pull_stream(source) {
            Ok(reader) => reader.into_batch_reader()?.read_all(),
            Err(e) if is_not_exported(&e) => {
                let (field, array) = pull_array(source)?;
                let schema = schema_from_struct_field(field)?;
                let batch = RecordBatch::from_struct_array(&array)?.with_schema(schema)?;
                Ok(Table::from(batch))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::scalar::Scalar;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("exporter blew up with code {0}")]
    struct ExporterError(i32);

    struct Exploding;

    impl ArrowExportable for Exploding {
        fn arrow_c_array(
            &self,
            _requested: Option<&SchemaCapsule>,
        ) -> std::result::Result<(SchemaCapsule, ArrayCapsule), BoxError> {
            Err(Box::new(ExporterError(42)))
        }
    }

    #[test]
    fn foreign_error_is_not_rewrapped() {
        let err = Array::from_arrow(&Exploding).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ForeignError);
        assert_eq!(err.downcast_foreign::<ExporterError>(), Some(&ExporterError(42)));
        assert_eq!(err.to_string(), "exporter blew up with code 42");
    }

    #[test]
    fn missing_methods_report_unsupported() {
        let err = Schema::from_arrow(&Exploding).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn capsule_name_and_release_checks() {
        let schema = export_field(&Field::new("a", DataType::Int8, true)).unwrap();
        let mut wrong = Capsule::with_name("not_a_schema", schema);
        assert!(matches!(
            import_from_capsule(&mut wrong),
            Err(InterchangeError::ImportError(_))
        ));

        let mut capsule = export_schema(&DataType::Utf8).unwrap();
        let field = import_from_capsule(&mut capsule).unwrap();
        assert_eq!(field.data_type, DataType::Utf8);
        assert!(capsule.is_released());
        assert!(matches!(
            import_from_capsule(&mut capsule),
            Err(InterchangeError::ImportError(_))
        ));
    }

    #[test]
    fn export_array_with_requested_cast() {
        let array = Array::from_opt_strs(&[Some("a"), None, Some("c")]);
        let requested = export_schema(&DataType::LargeUtf8).unwrap();
        let (a, s) = export_array(&array, Some(&requested)).unwrap();
        assert!(!requested.is_released());
        let (field, back) = import_from_capsule(&mut (s, a)).unwrap();
        assert_eq!(field.data_type, DataType::LargeUtf8);
        assert_eq!(back.to_scalars(), array.to_scalars());

        let impossible = export_schema(&DataType::list(DataType::Int32)).unwrap();
        let err = export_array(&array, Some(&impossible)).unwrap_err();
        assert!(matches!(err, InterchangeError::UnsupportedCast { .. }));
    }

    #[test]
    fn containers_round_trip() {
        let batch = RecordBatch::from_arrays(
            &["n", "s"],
            vec![Array::from_slice(&[1i32, 2, 3]), Array::from_strs(&["a", "b", "c"])],
        )
        .unwrap();
        assert_eq!(RecordBatch::from_arrow(&batch).unwrap(), batch);

        let table = Table::from_batches(vec![batch.clone(), batch.slice(0, 1).unwrap()], None).unwrap();
        let back = Table::from_arrow(&table).unwrap();
        assert_eq!(back, table);
        assert_eq!(back.chunk_lengths(), vec![3, 1]);
        // Table only streams, so a batch import merges the stream.
        assert_eq!(RecordBatch::from_arrow(&table).unwrap().num_rows(), 4);

        let col = table.column(1).unwrap();
        let back = ChunkedArray::from_arrow(&col).unwrap();
        assert_eq!(back.chunk_lengths(), vec![3, 1]);
        assert_eq!(Array::from_arrow(&col).unwrap().to_scalar(3), Scalar::Utf8("a".into()));
        assert_eq!(Schema::from_arrow(&table).unwrap(), *table.schema());
    }
}
