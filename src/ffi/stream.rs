//! # **Stream Module** - *Pull-based batch streams over the Arrow C Stream Interface*
//!
//! - [`RecordBatchReader`] is the crate's pull iterator of `RecordBatch`es with a known schema.
//! - [`export_reader`] / [`export_chunks`] wrap a reader or a list of arrays in an
//!   [`ArrowArrayStream`], casting each chunk to a requested type on the way out.
//! - [`ArrowStreamReader`] consumes a foreign `ArrowArrayStream`; it yields arrays
//!   and converts into a `RecordBatchReader` for struct-typed streams.
//!
//! Streams are single-threaded and hold at most one chunk in flight. Dropping a
//! stream releases everything it still holds.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;

use tracing::{debug, trace};

use crate::enums::error::{ErrorKind, InterchangeError, Result};
use crate::ffi::arrow_c_ffi::{
    ArrowArray, ArrowSchema, export_array, export_field, import_array, import_field,
    schema_from_struct_field,
};
use crate::kernels::cast::{can_cast, cast};
use crate::{Array, DataType, Field, RecordBatch, Schema, Table};

/// Pull iterator of record batches sharing one schema.
pub trait RecordBatchReader: Iterator<Item = Result<RecordBatch>> {
    fn schema(&self) -> Schema;

    /// Drains the reader into a table.
    fn read_all(self) -> Result<Table>
    where
        Self: Sized,
    {
        let schema = self.schema();
        let batches = self.collect::<Result<Vec<_>>>()?;
        Table::try_new(schema, batches)
    }
}

impl<R: RecordBatchReader + ?Sized> RecordBatchReader for Box<R> {
    fn schema(&self) -> Schema {
        (**self).schema()
    }
}

/// In-memory `RecordBatchReader` over already materialised batches.
#[derive(Debug, Clone)]
pub struct BatchReader {
    schema: Schema,
    batches: std::vec::IntoIter<RecordBatch>,
}

impl BatchReader {
    pub fn new(schema: Schema, batches: Vec<RecordBatch>) -> Self {
        Self {
            schema,
            batches: batches.into_iter(),
        }
    }
}

impl Iterator for BatchReader {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.batches.next().map(Ok)
    }
}

impl RecordBatchReader for BatchReader {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }
}

/// ArrowArrayStream as per the Arrow C spec
#[repr(C)]
#[derive(Debug)]
pub struct ArrowArrayStream {
    pub get_schema: Option<unsafe extern "C" fn(*mut ArrowArrayStream, *mut ArrowSchema) -> c_int>,
    pub get_next: Option<unsafe extern "C" fn(*mut ArrowArrayStream, *mut ArrowArray) -> c_int>,
    pub get_last_error: Option<unsafe extern "C" fn(*mut ArrowArrayStream) -> *const c_char>,
    pub release: Option<unsafe extern "C" fn(*mut ArrowArrayStream)>,
    pub private_data: *mut c_void,
}

unsafe impl Send for ArrowArrayStream {}

impl ArrowArrayStream {
    /// A released (empty) stream.
    pub fn empty() -> Self {
        Self {
            get_schema: None,
            get_next: None,
            get_last_error: None,
            release: None,
            private_data: ptr::null_mut(),
        }
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Moves the struct out, leaving a released one in its place.
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::empty())
    }
}

impl Drop for ArrowArrayStream {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) };
        }
    }
}

// ---------------------------------------------------------------
// Export
// ---------------------------------------------------------------

/// Source of stream chunks, each exported as one `ArrowArray`.
trait ChunkSource: Send {
    fn field(&self) -> &Field;
    fn next_chunk(&mut self) -> Option<Result<Array>>;
}

/// Batches become struct arrays, cast to the requested schema if any.
struct ReaderSource {
    reader: Box<dyn RecordBatchReader + Send>,
    field: Field,
    requested: Option<Schema>,
}

impl ChunkSource for ReaderSource {
    fn field(&self) -> &Field {
        &self.field
    }

    fn next_chunk(&mut self) -> Option<Result<Array>> {
        let batch = self.reader.next()?;
        Some(batch.and_then(|b| match &self.requested {
            Some(schema) => b.cast(schema)?.to_struct_array(),
            None => b.to_struct_array(),
        }))
    }
}

struct ArraySource {
    chunks: std::vec::IntoIter<Array>,
    field: Field,
}

impl ChunkSource for ArraySource {
    fn field(&self) -> &Field {
        &self.field
    }

    fn next_chunk(&mut self) -> Option<Result<Array>> {
        let chunk = self.chunks.next()?;
        if *chunk.data_type() == self.field.data_type {
            Some(Ok(chunk))
        } else {
            Some(cast(&chunk, &self.field.data_type))
        }
    }
}

struct StreamHolder {
    source: Box<dyn ChunkSource>,
    last_error: Option<CString>,
}

/// Stream schema as a struct field carrying the schema metadata.
fn schema_field(schema: &Schema) -> Field {
    Field::new("", DataType::Struct(schema.fields.clone()), false)
        .with_metadata(schema.metadata.clone())
}

fn check_castable(from: &DataType, to: &DataType) -> Result<()> {
    if can_cast(from, to) {
        Ok(())
    } else {
        Err(InterchangeError::UnsupportedCast {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Exports a reader as a C stream of struct arrays.
///
/// With `requested`, every batch is cast to that schema; fails up front with
/// `UnsupportedCast` when no cast exists for some column.
pub fn export_reader(
    reader: Box<dyn RecordBatchReader + Send>,
    requested: Option<Schema>,
) -> Result<ArrowArrayStream> {
    let schema = reader.schema();
    let field = match &requested {
        Some(target) => {
            if target.len() != schema.len() {
                return Err(InterchangeError::FieldCountMismatch {
                    expected: target.len(),
                    found: schema.len(),
                });
            }
            for (from, to) in schema.fields.iter().zip(&target.fields) {
                check_castable(&from.data_type, &to.data_type)?;
            }
            let mut target = target.clone();
            if target.metadata.is_empty() {
                target.metadata = schema.metadata.clone();
            }
            schema_field(&target)
        }
        None => schema_field(&schema),
    };
    Ok(new_stream(Box::new(ReaderSource {
        reader,
        field,
        requested,
    })))
}

/// Exports `chunks` of `field`'s type as a C stream, cast to `requested` if given.
pub fn export_chunks(
    chunks: Vec<Array>,
    field: Field,
    requested: Option<&DataType>,
) -> Result<ArrowArrayStream> {
    let field = match requested {
        Some(to) => {
            check_castable(&field.data_type, to)?;
            field.with_data_type(to.clone())
        }
        None => field,
    };
    Ok(new_stream(Box::new(ArraySource {
        chunks: chunks.into_iter(),
        field,
    })))
}

fn new_stream(source: Box<dyn ChunkSource>) -> ArrowArrayStream {
    let holder = Box::new(StreamHolder {
        source,
        last_error: None,
    });
    ArrowArrayStream {
        get_schema: Some(stream_get_schema),
        get_next: Some(stream_get_next),
        get_last_error: Some(stream_get_last_error),
        release: Some(stream_release),
        private_data: Box::into_raw(holder) as *mut c_void,
    }
}

/// # Safety
/// `stream` must be a live stream created by [`new_stream`].
unsafe fn holder<'a>(stream: *mut ArrowArrayStream) -> Option<&'a mut StreamHolder> {
    if stream.is_null() {
        return None;
    }
    let private = unsafe { (*stream).private_data } as *mut StreamHolder;
    if private.is_null() {
        None
    } else {
        Some(unsafe { &mut *private })
    }
}

fn errno_for(err: &InterchangeError) -> c_int {
    match err.kind() {
        ErrorKind::UnsupportedCast | ErrorKind::TypeMismatch => libc::EINVAL,
        _ => libc::EIO,
    }
}

unsafe extern "C" fn stream_get_schema(
    stream: *mut ArrowArrayStream,
    out: *mut ArrowSchema,
) -> c_int {
    let Some(holder) = (unsafe { holder(stream) }) else {
        return libc::EINVAL;
    };
    match export_field(holder.source.field()) {
        Ok(schema) => {
            unsafe { ptr::write(out, schema) };
            0
        }
        Err(e) => {
            let code = errno_for(&e);
            holder.last_error = CString::new(e.to_string()).ok();
            code
        }
    }
}

unsafe extern "C" fn stream_get_next(stream: *mut ArrowArrayStream, out: *mut ArrowArray) -> c_int {
    let Some(holder) = (unsafe { holder(stream) }) else {
        return libc::EINVAL;
    };
    match holder.source.next_chunk() {
        Some(Ok(array)) => {
            trace!(len = array.len(), "stream chunk exported");
            unsafe { ptr::write(out, export_array(&array)) };
            0
        }
        None => {
            unsafe { ptr::write(out, ArrowArray::empty()) };
            0
        }
        Some(Err(e)) => {
            debug!(error = %e, "stream source failed");
            let code = errno_for(&e);
            holder.last_error = CString::new(e.to_string()).ok();
            code
        }
    }
}

unsafe extern "C" fn stream_get_last_error(stream: *mut ArrowArrayStream) -> *const c_char {
    match unsafe { holder(stream) } {
        Some(h) => h.last_error.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
        None => ptr::null(),
    }
}

unsafe extern "C" fn stream_release(stream: *mut ArrowArrayStream) {
    if stream.is_null() {
        return;
    }
    let stream = unsafe { &mut *stream };
    if stream.release.is_none() {
        return;
    }
    if !stream.private_data.is_null() {
        drop(unsafe { Box::from_raw(stream.private_data as *mut StreamHolder) });
    }
    stream.private_data = ptr::null_mut();
    stream.release = None;
    trace!("released exported ArrowArrayStream");
}

// ---------------------------------------------------------------
// Import
// ---------------------------------------------------------------

/// Consumer side of an `ArrowArrayStream`.
///
/// Yields one `Array` per pull. Dropping the reader releases the stream.
#[derive(Debug)]
pub struct ArrowStreamReader {
    stream: ArrowArrayStream,
    field: Field,
    done: bool,
}

impl ArrowStreamReader {
    /// Takes ownership of `stream` and reads its schema.
    ///
    /// # Safety
    /// `stream` must follow the Arrow C Stream Interface.
    pub unsafe fn try_new(mut stream: ArrowArrayStream) -> Result<Self> {
        if stream.is_released() {
            return Err(InterchangeError::ImportError("ArrowArrayStream is released".into()));
        }
        let get_schema = stream
            .get_schema
            .ok_or_else(|| InterchangeError::ImportError("stream has no get_schema".into()))?;
        let mut schema = ArrowSchema::empty();
        let code = unsafe { get_schema(&mut stream, &mut schema) };
        if code != 0 {
            return Err(unsafe { stream_error(&mut stream, code) });
        }
        let field = unsafe { import_field(&schema) }?;
        Ok(Self {
            stream,
            field,
            done: false,
        })
    }

    /// The stream's element field. Record-batch streams report a struct.
    #[inline]
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The stream as a schema, for struct-typed streams.
    pub fn schema(&self) -> Result<Schema> {
        schema_from_struct_field(self.field.clone())
    }

    /// Adapts a struct-typed stream into a `RecordBatchReader`.
    pub fn into_batch_reader(self) -> Result<StreamBatchReader> {
        let schema = self.schema()?;
        Ok(StreamBatchReader {
            inner: self,
            schema,
        })
    }

    fn next_array(&mut self) -> Option<Result<Array>> {
        if self.done {
            return None;
        }
        let Some(get_next) = self.stream.get_next else {
            self.done = true;
            return Some(Err(InterchangeError::ImportError("stream has no get_next".into())));
        };
        let mut array = ArrowArray::empty();
        let code = unsafe { get_next(&mut self.stream, &mut array) };
        if code != 0 {
            self.done = true;
            return Some(Err(unsafe { stream_error(&mut self.stream, code) }));
        }
        if array.is_released() {
            self.done = true;
            return None;
        }
        Some(unsafe { import_array(array, &self.field.data_type) })
    }
}

/// # Safety
/// `stream` must be a live stream.
unsafe fn stream_error(stream: &mut ArrowArrayStream, code: c_int) -> InterchangeError {
    let message = match stream.get_last_error {
        Some(f) => {
            let p = unsafe { f(stream) };
            if p.is_null() {
                None
            } else {
                Some(unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
            }
        }
        None => None,
    };
    let message = message.unwrap_or_else(|| "no error message".into());
    if code == libc::EIO {
        InterchangeError::Io(std::io::Error::other(message))
    } else {
        InterchangeError::ImportError(format!("stream error {code}: {message}"))
    }
}

impl Iterator for ArrowStreamReader {
    type Item = Result<Array>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_array()
    }
}

/// Record batches pulled from a struct-typed C stream.
#[derive(Debug)]
pub struct StreamBatchReader {
    inner: ArrowStreamReader,
    schema: Schema,
}

impl Iterator for StreamBatchReader {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let array = self.inner.next_array()?;
        Some(array.and_then(|a| {
            RecordBatch::from_struct_array(&a)?.with_schema(self.schema.clone())
        }))
    }
}

impl RecordBatchReader for StreamBatchReader {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }
}
