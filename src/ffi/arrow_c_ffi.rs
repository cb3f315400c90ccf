//! # **Arrow-C-FFI Module** - *Share data to another language and/or run-time*
//!
//! Implements the *Apache Arrow* **C Data Interface**, enabling zero-copy data
//! exchange across library and language boundaries.
//!
//! ## Features
//! - **Export**: turn any `Field`/`Schema`/`DataType` into an [`ArrowSchema`] and any
//!   `Array` (nested, dictionary and view types included) into an [`ArrowArray`].
//! - **Import**: rebuild `Field`s and `Array`s from those structs. Imported buffers
//!   point straight into the producer's memory; the producer's release callback
//!   runs once the last imported buffer drops.
//! - **Metadata**: field and schema metadata travel in the binary key/value
//!   encoding of the C Data Interface.
//!
//! ## Ownership
//! - Exported structs own a private holder that keeps every backing `Buffer`
//!   alive. The release callback frees it exactly once; dropping an unreleased
//!   struct releases it.
//! - Moving a struct out of its slot (see [`ArrowSchema::take`]) leaves a released
//!   husk behind, which is how capsules are consumed.
//!
//! ## Trademark Notice
//! *Apache Arrow* is a trademark of the Apache Software Foundation, used here under
//! fair-use to implement its published interoperability standard as per
//! https://www.apache.org/foundation/marks/ .

use std::collections::BTreeMap;
use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::Arc;
use std::{mem, ptr, slice};

use tracing::trace;

use crate::enums::error::{InterchangeError, Result};
use crate::ffi::arrow_dtype::{DataType, Layout};
use crate::ffi::schema::Schema;
use crate::structs::array::VIEW_SIZE;
use crate::structs::bitmask::{Bitmask, bytes_for};
use crate::structs::buffer::Buffer;
use crate::{Array, Field};

// Provides compatibility with the cross-platform `Apache Arrow` standard
// via the `C Data Interface` specification:
// https://arrow.apache.org/docs/format/CDataInterface.html

/// Dictionary indices are ordered.
pub const FLAG_DICTIONARY_ORDERED: i64 = 1;
/// Field is nullable.
pub const FLAG_NULLABLE: i64 = 2;
/// Map keys are sorted.
pub const FLAG_MAP_KEYS_SORTED: i64 = 4;

/// ArrowSchema as per the Arrow C spec
#[repr(C)]
#[derive(Debug)]
pub struct ArrowSchema {
    pub format: *const c_char,
    pub name: *const c_char,
    pub metadata: *const c_char,
    pub flags: i64,
    pub n_children: i64,
    pub children: *mut *mut ArrowSchema,
    pub dictionary: *mut ArrowSchema,
    pub release: Option<unsafe extern "C" fn(*mut ArrowSchema)>,
    pub private_data: *mut c_void,
}

/// ArrowArray as per the Arrow C spec
#[repr(C)]
#[derive(Debug)]
pub struct ArrowArray {
    pub length: i64,
    pub null_count: i64,
    pub offset: i64,
    pub n_buffers: i64,
    pub n_children: i64,
    pub buffers: *mut *const c_void,
    pub children: *mut *mut ArrowArray,
    pub dictionary: *mut ArrowArray,
    pub release: Option<unsafe extern "C" fn(*mut ArrowArray)>,
    pub private_data: *mut c_void,
}

// The structs are plain handles; whatever they point at is immutable until release.
unsafe impl Send for ArrowSchema {}
unsafe impl Sync for ArrowSchema {}
unsafe impl Send for ArrowArray {}
unsafe impl Sync for ArrowArray {}

impl ArrowSchema {
    /// A released (empty) schema, ready to be written into by a producer.
    pub fn empty() -> Self {
        Self {
            format: ptr::null(),
            name: ptr::null(),
            metadata: ptr::null(),
            flags: 0,
            n_children: 0,
            children: ptr::null_mut(),
            dictionary: ptr::null_mut(),
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
        mem::replace(self, Self::empty())
    }
}

impl Drop for ArrowSchema {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) };
        }
    }
}

impl ArrowArray {
    /// A released (empty) array, ready to be written into by a producer.
    pub fn empty() -> Self {
        Self {
            length: 0,
            null_count: 0,
            offset: 0,
            n_buffers: 0,
            n_children: 0,
            buffers: ptr::null_mut(),
            children: ptr::null_mut(),
            dictionary: ptr::null_mut(),
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
        mem::replace(self, Self::empty())
    }
}

impl Drop for ArrowArray {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) };
        }
    }
}

// ---------------------------------------------------------------
// Schema export
// ---------------------------------------------------------------

/// Keeps the strings and child schemas of an exported `ArrowSchema` alive.
struct SchemaHolder {
    _format: CString,
    _name: CString,
    _metadata: Option<Vec<u8>>,
    children: Box<[*mut ArrowSchema]>,
    dictionary: *mut ArrowSchema,
}

/// Releases an exported `ArrowSchema` and, through the holder, its children.
/// # Safety
/// `schema` must be null or point at a schema produced by this module.
unsafe extern "C" fn release_schema(schema: *mut ArrowSchema) {
    if schema.is_null() {
        return;
    }
    let schema = unsafe { &mut *schema };
    if schema.release.is_none() {
        return;
    }
    if !schema.private_data.is_null() {
        let holder = unsafe { Box::from_raw(schema.private_data as *mut SchemaHolder) };
        for &child in holder.children.iter() {
            drop(unsafe { Box::from_raw(child) });
        }
        if !holder.dictionary.is_null() {
            drop(unsafe { Box::from_raw(holder.dictionary) });
        }
    }
    schema.release = None;
    schema.private_data = ptr::null_mut();
}

fn c_string(s: &str, what: &str) -> Result<CString> {
    CString::new(s).map_err(|_| {
        InterchangeError::UnsupportedOperation(format!("{what} '{s}' contains a NUL byte"))
    })
}

/// Binary metadata encoding: `i32 n`, then per entry `i32 len, key, i32 len, value`.
fn encode_metadata(metadata: &BTreeMap<String, String>) -> Option<Vec<u8>> {
    if metadata.is_empty() {
        return None;
    }
    let mut out = Vec::new();
    out.extend_from_slice(&(metadata.len() as i32).to_ne_bytes());
    for (k, v) in metadata {
        out.extend_from_slice(&(k.len() as i32).to_ne_bytes());
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(&(v.len() as i32).to_ne_bytes());
        out.extend_from_slice(v.as_bytes());
    }
    Some(out)
}

/// # Safety
/// `ptr` must be null or point at a well-formed metadata block.
unsafe fn decode_metadata(ptr: *const c_char) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    if ptr.is_null() {
        return Ok(out);
    }
    let mut pos = ptr as *const u8;
    let read_i32 = |p: &mut *const u8| -> Result<usize> {
        let v = unsafe { ptr::read_unaligned(*p as *const i32) };
        *p = unsafe { p.add(4) };
        usize::try_from(v)
            .map_err(|_| InterchangeError::ImportError(format!("negative metadata length {v}")))
    };
    let read_str = |p: &mut *const u8, n: usize| -> Result<String> {
        let bytes = unsafe { slice::from_raw_parts(*p, n) };
        *p = unsafe { p.add(n) };
        String::from_utf8(bytes.to_vec())
            .map_err(|_| InterchangeError::ImportError("metadata is not valid UTF-8".into()))
    };
    let n = read_i32(&mut pos)?;
    for _ in 0..n {
        let klen = read_i32(&mut pos)?;
        let key = read_str(&mut pos, klen)?;
        let vlen = read_i32(&mut pos)?;
        let value = read_str(&mut pos, vlen)?;
        out.insert(key, value);
    }
    Ok(out)
}

/// Exports a field (name, type, nullability, metadata) as an `ArrowSchema`.
pub fn export_field(field: &Field) -> Result<ArrowSchema> {
    let (format, children, dictionary, extra_flags) = match &field.data_type {
        DataType::Dictionary(key, value) => {
            let dict = export_field(&Field::new("", value.as_ref().clone(), true))?;
            (key.format(), Vec::new(), Box::into_raw(Box::new(dict)), 0)
        }
        DataType::Map(_, sorted) => {
            let children = export_children(&field.data_type)?;
            let flags = if *sorted { FLAG_MAP_KEYS_SORTED } else { 0 };
            (field.data_type.format(), children, ptr::null_mut(), flags)
        }
        other => (other.format(), export_children(other)?, ptr::null_mut(), 0),
    };
    let format = c_string(&format, "format")?;
    let name = c_string(&field.name, "field name")?;
    let metadata = encode_metadata(&field.metadata);
    let mut holder = Box::new(SchemaHolder {
        children: children.into_boxed_slice(),
        dictionary,
        _metadata: metadata,
        _format: format,
        _name: name,
    });
    let flags = extra_flags | if field.nullable { FLAG_NULLABLE } else { 0 };
    let schema = ArrowSchema {
        format: holder._format.as_ptr(),
        name: holder._name.as_ptr(),
        metadata: holder
            ._metadata
            .as_ref()
            .map_or(ptr::null(), |m| m.as_ptr() as *const c_char),
        flags,
        n_children: holder.children.len() as i64,
        children: if holder.children.is_empty() {
            ptr::null_mut()
        } else {
            holder.children.as_mut_ptr()
        },
        dictionary: holder.dictionary,
        release: Some(release_schema),
        private_data: Box::into_raw(holder) as *mut c_void,
    };
    Ok(schema)
}

fn export_children(data_type: &DataType) -> Result<Vec<*mut ArrowSchema>> {
    let mut out = Vec::new();
    for child in data_type.children() {
        match export_field(child) {
            Ok(s) => out.push(Box::into_raw(Box::new(s))),
            Err(e) => {
                for p in out {
                    drop(unsafe { Box::from_raw(p) });
                }
                return Err(e);
            }
        }
    }
    Ok(out)
}

/// Exports a bare data type as an unnamed nullable field.
pub fn export_data_type(data_type: &DataType) -> Result<ArrowSchema> {
    export_field(&Field::new("", data_type.clone(), true))
}

/// Exports a schema as a non-null struct field carrying the schema metadata.
pub fn export_schema(schema: &Schema) -> Result<ArrowSchema> {
    let field = Field::new("", DataType::Struct(schema.fields.clone()), false)
        .with_metadata(schema.metadata.clone());
    export_field(&field)
}

// ---------------------------------------------------------------
// Schema import
// ---------------------------------------------------------------

/// Reads a field from an `ArrowSchema`. The schema is borrowed, not released.
///
/// # Safety
/// `schema` must follow the Arrow C Data Interface.
pub unsafe fn import_field(schema: &ArrowSchema) -> Result<Field> {
    if schema.is_released() {
        return Err(InterchangeError::ImportError("ArrowSchema is released".into()));
    }
    if schema.format.is_null() {
        return Err(InterchangeError::ImportError("ArrowSchema has no format".into()));
    }
    let format = unsafe { CStr::from_ptr(schema.format) }
        .to_str()
        .map_err(|_| InterchangeError::ImportError("format is not UTF-8".into()))?;
    let name = if schema.name.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(schema.name) }.to_string_lossy().into_owned()
    };
    let n_children = usize::try_from(schema.n_children)
        .map_err(|_| InterchangeError::ImportError("negative n_children".into()))?;
    let mut children = Vec::with_capacity(n_children);
    for i in 0..n_children {
        let child = unsafe { *schema.children.add(i) };
        if child.is_null() {
            return Err(InterchangeError::ImportError(format!("child schema {i} is null")));
        }
        children.push(unsafe { import_field(&*child) }?);
    }
    let sorted = schema.flags & FLAG_MAP_KEYS_SORTED != 0;
    let mut data_type = DataType::from_format(format, children, sorted)?;
    if !schema.dictionary.is_null() {
        let value = unsafe { import_field(&*schema.dictionary) }?;
        data_type = DataType::dictionary(data_type, value.data_type)
            .map_err(|e| InterchangeError::ImportError(e.to_string()))?;
    }
    let metadata = unsafe { decode_metadata(schema.metadata) }?;
    Ok(Field::new(name, data_type, schema.flags & FLAG_NULLABLE != 0).with_metadata(metadata))
}

/// Reads a schema from a struct-typed `ArrowSchema`.
///
/// # Safety
/// `schema` must follow the Arrow C Data Interface.
pub unsafe fn import_schema(schema: &ArrowSchema) -> Result<Schema> {
    let field = unsafe { import_field(schema) }?;
    schema_from_struct_field(field)
}

pub(crate) fn schema_from_struct_field(field: Field) -> Result<Schema> {
    match field.data_type {
        DataType::Struct(fields) => Ok(Schema::new(fields, field.metadata)),
        other => Err(InterchangeError::ImportError(format!(
            "expected a struct schema, found {other}"
        ))),
    }
}

// ---------------------------------------------------------------
// Array export
// ---------------------------------------------------------------

/// Keeps an exported array's buffers, pointer tables and children alive.
struct ArrayHolder {
    _array: Array,
    buffers: Box<[*const c_void]>,
    children: Box<[*mut ArrowArray]>,
    dictionary: *mut ArrowArray,
    _variadic_sizes: Option<Vec<i64>>,
}

/// Releases an exported `ArrowArray` and its children.
/// # Safety
/// `array` must be null or point at an array produced by this module.
unsafe extern "C" fn release_array(array: *mut ArrowArray) {
    if array.is_null() {
        return;
    }
    let array = unsafe { &mut *array };
    if array.release.is_none() {
        return;
    }
    if !array.private_data.is_null() {
        let holder = unsafe { Box::from_raw(array.private_data as *mut ArrayHolder) };
        for &child in holder.children.iter() {
            drop(unsafe { Box::from_raw(child) });
        }
        if !holder.dictionary.is_null() {
            drop(unsafe { Box::from_raw(holder.dictionary) });
        }
        trace!(buffers = holder.buffers.len(), "released exported ArrowArray");
    }
    array.release = None;
    array.private_data = ptr::null_mut();
}

/// Exports an array zero-copy. The returned struct shares every buffer with `array`.
pub fn export_array(array: &Array) -> ArrowArray {
    let layout = array.data_type().layout();
    let mut buffers: Vec<*const c_void> = Vec::new();
    let mut variadic_sizes = None;
    if layout != Layout::Null {
        buffers.push(
            array
                .validity()
                .map_or(ptr::null(), |v| v.buffer().as_ptr() as *const c_void),
        );
        buffers.extend(array.buffers().iter().map(|b| b.as_ptr() as *const c_void));
        if layout == Layout::View {
            let sizes: Vec<i64> = array.buffers()[1..].iter().map(|b| b.len() as i64).collect();
            buffers.push(sizes.as_ptr() as *const c_void);
            variadic_sizes = Some(sizes);
        }
    }
    let children: Box<[*mut ArrowArray]> = array
        .children()
        .iter()
        .map(|c| Box::into_raw(Box::new(export_array(c))))
        .collect();
    let dictionary = array
        .dictionary()
        .map_or(ptr::null_mut(), |d| Box::into_raw(Box::new(export_array(d))));
    let mut holder = Box::new(ArrayHolder {
        _array: array.clone(),
        buffers: buffers.into_boxed_slice(),
        children,
        dictionary,
        _variadic_sizes: variadic_sizes,
    });
    ArrowArray {
        length: array.len() as i64,
        null_count: array.null_count() as i64,
        offset: array.offset() as i64,
        n_buffers: holder.buffers.len() as i64,
        n_children: holder.children.len() as i64,
        buffers: if holder.buffers.is_empty() {
            ptr::null_mut()
        } else {
            holder.buffers.as_mut_ptr()
        },
        children: if holder.children.is_empty() {
            ptr::null_mut()
        } else {
            holder.children.as_mut_ptr()
        },
        dictionary,
        release: Some(release_array),
        private_data: Box::into_raw(holder) as *mut c_void,
    }
}

// ---------------------------------------------------------------
// Array import
// ---------------------------------------------------------------

/// Owns an imported top-level `ArrowArray`; dropping the last reference releases it.
struct ImportedArray(ArrowArray);

/// A window into foreign memory that keeps its producer alive.
struct ForeignBuffer {
    ptr: *const u8,
    len: usize,
    _owner: Arc<ImportedArray>,
}

impl AsRef<[u8]> for ForeignBuffer {
    fn as_ref(&self) -> &[u8] {
        if self.len == 0 || self.ptr.is_null() {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }
}

// Required for Buffer::from_owner()
unsafe impl Send for ForeignBuffer {}
unsafe impl Sync for ForeignBuffer {}

/// Takes ownership of `array` and rebuilds it as `data_type`.
///
/// Buffers are wrapped zero-copy when 8-byte aligned; the producer's release
/// callback runs when the last of them drops.
///
/// # Safety
/// `array` must follow the Arrow C Data Interface and match `data_type`.
pub unsafe fn import_array(array: ArrowArray, data_type: &DataType) -> Result<Array> {
    if array.is_released() {
        return Err(InterchangeError::ImportError("ArrowArray is released".into()));
    }
    let owner = Arc::new(ImportedArray(array));
    let root: *const ArrowArray = &owner.0;
    unsafe { import_node(&owner, root, data_type) }
}

fn non_negative(v: i64, what: &str) -> Result<usize> {
    usize::try_from(v).map_err(|_| InterchangeError::ImportError(format!("negative {what}: {v}")))
}

/// # Safety
/// `node` must be `owner`'s root or one of its descendants.
unsafe fn import_node(
    owner: &Arc<ImportedArray>,
    node: *const ArrowArray,
    data_type: &DataType,
) -> Result<Array> {
    let node = unsafe { &*node };
    let len = non_negative(node.length, "length")?;
    let offset = non_negative(node.offset, "offset")?;
    let n_buffers = non_negative(node.n_buffers, "n_buffers")?;
    let n_children = non_negative(node.n_children, "n_children")?;
    let end = offset + len;
    let layout = data_type.layout();

    let expected = data_type.fixed_buffer_count();
    let ok = match layout {
        Layout::View => n_buffers >= expected + 1,
        _ => n_buffers == expected,
    };
    if !ok {
        return Err(InterchangeError::ImportError(format!(
            "{data_type} expects {expected} buffers, producer sent {n_buffers}"
        )));
    }
    let raw: &[*const c_void] = if n_buffers == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(node.buffers, n_buffers) }
    };
    let wrap = |p: *const c_void, bytes: usize| -> Buffer {
        if p.is_null() || bytes == 0 {
            return Buffer::empty();
        }
        Buffer::from_owner(ForeignBuffer {
            ptr: p as *const u8,
            len: bytes,
            _owner: owner.clone(),
        })
    };

    let validity = match raw.first() {
        Some(&p) if !p.is_null() && layout != Layout::Null && node.null_count != 0 => {
            Some(Bitmask::new(wrap(p, bytes_for(end)), end))
        }
        _ => None,
    };

    let buffers = match layout {
        Layout::Null | Layout::FixedSizeList(_) | Layout::Struct => Vec::new(),
        Layout::Bitmap => vec![wrap(raw[1], bytes_for(end))],
        Layout::FixedWidth(w) | Layout::Dictionary(w) => vec![wrap(raw[1], end * w)],
        Layout::Variable { large } => {
            let width = if large { 8 } else { 4 };
            let values_len = if raw[1].is_null() {
                0
            } else {
                unsafe { read_offset(raw[1], end, large) }?
            };
            vec![wrap(raw[1], (end + 1) * width), wrap(raw[2], values_len)]
        }
        Layout::List { large } => {
            let width = if large { 8 } else { 4 };
            vec![wrap(raw[1], (end + 1) * width)]
        }
        Layout::View => {
            let n_data = n_buffers - 3;
            let sizes = raw[n_buffers - 1] as *const i64;
            let mut out = vec![wrap(raw[1], end * VIEW_SIZE)];
            for i in 0..n_data {
                let size = unsafe { ptr::read_unaligned(sizes.add(i)) };
                out.push(wrap(raw[2 + i], non_negative(size, "variadic buffer size")?));
            }
            out
        }
    };

    let child_types: Vec<DataType> = data_type
        .children()
        .into_iter()
        .map(|f| f.data_type.clone())
        .collect();
    if child_types.len() != n_children {
        return Err(InterchangeError::ImportError(format!(
            "{data_type} expects {} children, producer sent {n_children}",
            child_types.len()
        )));
    }
    let mut children = Vec::with_capacity(n_children);
    for (i, child_type) in child_types.iter().enumerate() {
        let child = unsafe { *node.children.add(i) };
        if child.is_null() {
            return Err(InterchangeError::ImportError(format!("child array {i} is null")));
        }
        children.push(unsafe { import_node(owner, child, child_type) }?);
    }

    let dictionary = match data_type {
        DataType::Dictionary(_, value) => {
            if node.dictionary.is_null() {
                return Err(InterchangeError::ImportError(
                    "dictionary-encoded array without a dictionary".into(),
                ));
            }
            Some(unsafe { import_node(owner, node.dictionary, value) }?)
        }
        _ => None,
    };

    Array::try_new(
        data_type.clone(),
        len,
        offset,
        validity,
        buffers,
        children,
        dictionary,
    )
}

/// # Safety
/// `offsets` must hold at least `index + 1` offsets of the given width.
unsafe fn read_offset(offsets: *const c_void, index: usize, large: bool) -> Result<usize> {
    let v = if large {
        unsafe { ptr::read_unaligned((offsets as *const i64).add(index)) }
    } else {
        i64::from(unsafe { ptr::read_unaligned((offsets as *const i32).add(index)) })
    };
    usize::try_from(v).map_err(|_| InterchangeError::InvalidOffsets(format!("negative offset {v}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::scalar::Scalar;
    use crate::enums::time_units::TimeUnit;
    use crate::{list_array, struct_array};

    fn round_trip(array: &Array, field: &Field) -> (Field, Array) {
        let schema = export_field(field).unwrap();
        let exported = export_array(array);
        let field = unsafe { import_field(&schema) }.unwrap();
        let array = unsafe { import_array(exported, &field.data_type) }.unwrap();
        (field, array)
    }

    #[test]
    fn primitive_zero_copy() {
        let a = Array::from_options(&[Some(1i32), None, Some(3)]);
        let before = a.buffers()[0].strong_count();
        let (field, b) = round_trip(&a, &Field::new("x", DataType::Int32, true));
        assert_eq!(field.name, "x");
        assert!(field.nullable);
        assert_eq!(b, a);
        assert!(a.buffers()[0].strong_count() > before);
        drop(b);
        assert_eq!(a.buffers()[0].strong_count(), before);
    }

    #[test]
    fn sliced_strings_keep_offset() {
        let a = Array::from_opt_strs(&[Some("a"), None, Some("ccc"), Some("dd")]).slice(1, 3);
        let (_, b) = round_trip(&a, &Field::new("s", DataType::Utf8, true));
        assert_eq!(b.offset(), 1);
        assert_eq!(b.to_scalars(), a.to_scalars());
    }

    #[test]
    fn nested_and_dictionary() {
        let list = list_array(
            &Array::from_slice(&[0i32, 2, 2, 3]),
            &Array::from_opt_strs(&[Some("a"), None, Some("b")]),
            None,
            None,
        )
        .unwrap();
        let (_, b) = round_trip(&list, &Field::from_array("l", &list));
        assert_eq!(b, list);

        let s = struct_array(
            &[Array::from_slice(&[1.5f64, 2.5]), Array::from_bools(&[true, false])],
            &[
                Field::new("f", DataType::Float64, false),
                Field::new("b", DataType::Boolean, true),
            ],
            None,
        )
        .unwrap();
        let (_, b) = round_trip(&s, &Field::from_array("s", &s));
        assert_eq!(b.to_scalar(1), Scalar::Struct(vec![Scalar::Float(2.5), Scalar::Boolean(false)]));

        let d = Array::try_new_dictionary(
            Array::from_slice(&[1i8, 0, 1]),
            Array::from_strs(&["x", "y"]),
        )
        .unwrap();
        let (field, b) = round_trip(&d, &Field::from_array("d", &d));
        assert!(field.data_type.is_dictionary());
        assert_eq!(b.to_scalar(0), Scalar::Utf8("y".into()));
    }

    #[test]
    fn imported_dictionary_keys_are_checked() {
        let dt = DataType::dictionary(DataType::Int32, DataType::Utf8).unwrap();
        let values = Array::from_strs(&["x", "y"]);
        for bad_key in [-1i32, 2] {
            let keys = Buffer::from_slice(&[0i32, bad_key]);
            let forged = Array::new_unchecked(
                dt.clone(),
                2,
                None,
                vec![keys],
                Vec::new(),
                Some(values.clone()),
            );
            let err = unsafe { import_array(export_array(&forged), &dt) }.unwrap_err();
            assert!(
                matches!(
                    err,
                    InterchangeError::InvalidOffsets(_) | InterchangeError::IndexOutOfBounds { .. }
                ),
                "{err}"
            );
        }
    }

    #[test]
    fn views_carry_variadic_sizes() {
        let a = Array::from_str_views(&[Some("short"), Some("a string well past twelve"), None]);
        let (_, b) = round_trip(&a, &Field::new("v", DataType::Utf8View, true));
        assert_eq!(b.value_str(1), Some("a string well past twelve"));
        assert!(b.is_null(2));
    }

    #[test]
    fn field_metadata_and_flags() {
        let field = Field::new("t", DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())), false)
            .with_metadata([("k", "v")]);
        let schema = export_field(&field).unwrap();
        assert_eq!(schema.flags & FLAG_NULLABLE, 0);
        let back = unsafe { import_field(&schema) }.unwrap();
        assert_eq!(back, field);

        let map = Field::new("m", DataType::map(DataType::Utf8, DataType::Int32, true), true);
        let back = unsafe { import_field(&export_field(&map).unwrap()) }.unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn schema_round_trip_and_release() {
        let schema = Schema::from(vec![Field::new("a", DataType::Int16, true)])
            .with_metadata([("hello".to_string(), "world".to_string())].into());
        let mut c = export_schema(&schema).unwrap();
        assert_eq!(unsafe { import_schema(&c) }.unwrap(), schema);
        let moved = c.take();
        assert!(c.is_released());
        assert!(unsafe { import_schema(&c) }.is_err());
        drop(moved);
    }

    #[test]
    fn wrong_buffer_count_is_import_error() {
        let exported = export_array(&Array::from_slice(&[1i32]));
        let err = unsafe { import_array(exported, &DataType::Utf8) }.unwrap_err();
        assert!(matches!(err, InterchangeError::ImportError(_)));
    }
}
