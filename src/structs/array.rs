//! # **Array Module** - *Typed, nullable column in the Arrow columnar layout*
//!
//! [`Array`] is the crate's single array header. It describes any [`DataType`]
//! through the same set of members the Arrow C Data Interface exposes:
//! validity, buffers, children, an optional dictionary, and a logical offset.
//!
//! ## Layout
//! `buffers` never includes the validity bitmap, which is held separately:
//! - `Null`: no buffers.
//! - `Boolean` / primitives / fixed-size binary / decimals: `[values]`.
//! - `Utf8` / `Binary` and their large variants: `[offsets, values]`.
//! - `Utf8View` / `BinaryView`: `[views, data...]`.
//! - `List` / `LargeList` / `Map`: `[offsets]` plus one child.
//! - `FixedSizeList` / `Struct`: no buffers, children only.
//! - `Dictionary`: `[indices]` plus `dictionary`.
//!
//! ## Slicing
//! [`Array::slice`] produces a new header over the same buffers with an adjusted
//! logical offset. Buffers, children and dictionaries are shared, never copied,
//! and the null count of the new window is computed lazily on first request.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::OnceLock;

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::{Scalar, f16_to_f64};
use crate::ffi::arrow_dtype::{DataType, Layout};
use crate::structs::bitmask::{Bitmask, bytes_for, get_bit};
use crate::traits::type_unions::{NativeType, OffsetType};
use crate::Buffer;

/// Size in bytes of one view entry.
pub const VIEW_SIZE: usize = 16;
/// Longest value stored inline in a view.
pub const MAX_INLINE_VIEW: usize = 12;

/// # Array
///
/// Immutable, shared-buffer array header.
///
/// ## Description
/// - `len` counts logical elements after applying `offset`.
/// - A validity bit of 0 marks a null slot; the value bytes under it are unspecified.
/// - `Null`-typed arrays carry no validity and report every slot as null.
/// - Struct and fixed-size-list parents apply their offset to their children.
///
/// ## Example
/// ```rust
/// use minarrow_interchange::Array;
///
/// let a = Array::from_options(&[Some(1i32), None, Some(3)]);
/// let tail = a.slice(1, 2);
/// assert_eq!(tail.null_count(), 1);
/// assert_eq!(tail.values::<i32>().unwrap()[1], 3);
/// ```
#[derive(Clone)]
pub struct Array {
    data_type: DataType,
    len: usize,
    offset: usize,
    null_count: OnceLock<usize>,
    validity: Option<Bitmask>,
    buffers: Vec<Buffer>,
    children: Vec<Array>,
    dictionary: Option<Box<Array>>,
}

impl Array {
    /// Builds an array from its parts after validating the layout.
    ///
    /// Checks buffer and child counts for the type, buffer sizes against
    /// `offset + len`, offsets (non-decreasing and within the values), child types,
    /// view references, and dictionary indices.
    pub fn try_new(
        data_type: DataType,
        len: usize,
        offset: usize,
        validity: Option<Bitmask>,
        buffers: Vec<Buffer>,
        children: Vec<Array>,
        dictionary: Option<Array>,
    ) -> Result<Self> {
        let array = Self {
            data_type,
            len,
            offset,
            null_count: OnceLock::new(),
            validity,
            buffers,
            children,
            dictionary: dictionary.map(Box::new),
        };
        array.validate()?;
        Ok(array)
    }

    /// Assembles an array from parts the caller has already validated.
    pub(crate) fn new_unchecked(
        data_type: DataType,
        len: usize,
        validity: Option<Bitmask>,
        buffers: Vec<Buffer>,
        children: Vec<Array>,
        dictionary: Option<Array>,
    ) -> Self {
        Self {
            data_type,
            len,
            offset: 0,
            null_count: OnceLock::new(),
            validity,
            buffers,
            children,
            dictionary: dictionary.map(Box::new),
        }
    }

    // ---------------------------------------------------------------
    // Construction helpers
    // ---------------------------------------------------------------

    /// Non-null primitive array from a slice of native values.
    pub fn from_slice<T: NativeType>(values: &[T]) -> Self {
        Self::new_unchecked(
            T::data_type(),
            values.len(),
            None,
            vec![Buffer::from_slice(values)],
            Vec::new(),
            None,
        )
    }

    /// Nullable primitive array. `None` slots are null and hold `T::default()`.
    pub fn from_options<T: NativeType>(values: &[Option<T>]) -> Self {
        let validity = Bitmask::from_fn(values.len(), |i| values[i].is_some());
        let buffer = Buffer::from_iter_typed(values.iter().map(|v| v.unwrap_or_default()));
        Self::new_unchecked(
            T::data_type(),
            values.len(),
            Some(validity),
            vec![buffer],
            Vec::new(),
            None,
        )
    }

    /// Primitive array of a specific logical type (e.g. `Timestamp` over `i64`).
    ///
    /// The native type must match the physical width and kind of `data_type`.
    pub fn from_native<T: NativeType>(
        data_type: DataType,
        values: &[T],
        validity: Option<Bitmask>,
    ) -> Result<Self> {
        if !physical_matches::<T>(&data_type) {
            return Err(InterchangeError::TypeMismatch {
                expected: data_type.to_string(),
                found: T::data_type().to_string(),
                context: Some("Array::from_native".into()),
            });
        }
        Self::try_new(
            data_type,
            values.len(),
            0,
            validity,
            vec![Buffer::from_slice(values)],
            Vec::new(),
            None,
        )
    }

    pub fn from_bools(values: &[bool]) -> Self {
        Self::new_unchecked(
            DataType::Boolean,
            values.len(),
            None,
            vec![Bitmask::from_bools(values).buffer().clone()],
            Vec::new(),
            None,
        )
    }

    pub fn from_opt_bools(values: &[Option<bool>]) -> Self {
        let validity = Bitmask::from_fn(values.len(), |i| values[i].is_some());
        let bits = Bitmask::from_fn(values.len(), |i| values[i].unwrap_or(false));
        Self::new_unchecked(
            DataType::Boolean,
            values.len(),
            Some(validity),
            vec![bits.buffer().clone()],
            Vec::new(),
            None,
        )
    }

    /// Non-null `Utf8` array.
    ///
    /// # Panics
    /// Panics when the values hold more than `i32::MAX` bytes; see
    /// [`Array::try_from_strs`].
    pub fn from_strs<S: AsRef<str>>(values: &[S]) -> Self {
        Self::try_from_strs(values).unwrap_or_else(|e| panic!("Array::from_strs: {e}"))
    }

    /// Non-null `Utf8` array, or `InvalidOffsets` when 32-bit offsets overflow.
    pub fn try_from_strs<S: AsRef<str>>(values: &[S]) -> Result<Self> {
        build_variable::<i32, _>(
            DataType::Utf8,
            values.iter().map(|s| Some(s.as_ref().as_bytes())),
        )
    }

    /// Nullable `Utf8` array.
    ///
    /// # Panics
    /// As [`Array::from_strs`].
    pub fn from_opt_strs(values: &[Option<&str>]) -> Self {
        Self::try_from_opt_strs(values).unwrap_or_else(|e| panic!("Array::from_opt_strs: {e}"))
    }

    pub fn try_from_opt_strs(values: &[Option<&str>]) -> Result<Self> {
        build_variable::<i32, _>(DataType::Utf8, values.iter().map(|s| s.map(str::as_bytes)))
    }

    /// Non-null `LargeUtf8` array.
    pub fn from_large_strs<S: AsRef<str>>(values: &[S]) -> Self {
        // 64-bit offsets cannot overflow for in-memory values.
        build_variable::<i64, _>(
            DataType::LargeUtf8,
            values.iter().map(|s| Some(s.as_ref().as_bytes())),
        )
        .unwrap_or_else(|e| panic!("Array::from_large_strs: {e}"))
    }

    /// Non-null `Binary` array.
    ///
    /// # Panics
    /// As [`Array::from_strs`].
    pub fn from_binary<B: AsRef<[u8]>>(values: &[B]) -> Self {
        Self::try_from_binary(values).unwrap_or_else(|e| panic!("Array::from_binary: {e}"))
    }

    pub fn try_from_binary<B: AsRef<[u8]>>(values: &[B]) -> Result<Self> {
        build_variable::<i32, _>(DataType::Binary, values.iter().map(|b| Some(b.as_ref())))
    }

    /// Nullable `Binary` array.
    ///
    /// # Panics
    /// As [`Array::from_strs`].
    pub fn from_opt_binary(values: &[Option<&[u8]>]) -> Self {
        Self::try_from_opt_binary(values)
            .unwrap_or_else(|e| panic!("Array::from_opt_binary: {e}"))
    }

    pub fn try_from_opt_binary(values: &[Option<&[u8]>]) -> Result<Self> {
        build_variable::<i32, _>(DataType::Binary, values.iter().copied())
    }

    /// `Utf8View` array. Values up to 12 bytes are stored inline.
    pub fn from_str_views(values: &[Option<&str>]) -> Self {
        build_views(DataType::Utf8View, values.iter().map(|s| s.map(str::as_bytes)))
    }

    /// `BinaryView` array.
    pub fn from_binary_views(values: &[Option<&[u8]>]) -> Self {
        build_views(DataType::BinaryView, values.iter().copied())
    }

    /// `Null`-typed array of `len` slots.
    pub fn new_null(len: usize) -> Self {
        Self::new_unchecked(DataType::Null, len, None, Vec::new(), Vec::new(), None)
    }

    /// All-null array of any type, with zeroed buffers of the right shape.
    pub fn new_null_typed(data_type: &DataType, len: usize) -> Result<Self> {
        let validity = Some(Bitmask::new_set_all(len, false));
        let array = match data_type.layout() {
            Layout::Null => return Ok(Self::new_null(len)),
            Layout::Bitmap => Self::new_unchecked(
                data_type.clone(),
                len,
                validity,
                vec![Buffer::from(vec![0u8; bytes_for(len)])],
                Vec::new(),
                None,
            ),
            Layout::FixedWidth(w) => Self::new_unchecked(
                data_type.clone(),
                len,
                validity,
                vec![Buffer::from(vec![0u8; len * w])],
                Vec::new(),
                None,
            ),
            Layout::Variable { large } => {
                let width = if large { 8 } else { 4 };
                Self::new_unchecked(
                    data_type.clone(),
                    len,
                    validity,
                    vec![Buffer::from(vec![0u8; (len + 1) * width]), Buffer::empty()],
                    Vec::new(),
                    None,
                )
            }
            Layout::View => Self::new_unchecked(
                data_type.clone(),
                len,
                validity,
                vec![Buffer::from(vec![0u8; len * VIEW_SIZE])],
                Vec::new(),
                None,
            ),
            Layout::List { large } => {
                let width = if large { 8 } else { 4 };
                let child = Self::new_null_typed(&list_child_type(data_type)?, 0)?;
                Self::new_unchecked(
                    data_type.clone(),
                    len,
                    validity,
                    vec![Buffer::from(vec![0u8; (len + 1) * width])],
                    vec![child],
                    None,
                )
            }
            Layout::FixedSizeList(size) => {
                let child = Self::new_null_typed(&list_child_type(data_type)?, len * size)?;
                Self::new_unchecked(data_type.clone(), len, validity, Vec::new(), vec![child], None)
            }
            Layout::Struct => {
                let children = data_type
                    .children()
                    .into_iter()
                    .map(|f| Self::new_null_typed(&f.data_type, len))
                    .collect::<Result<Vec<_>>>()?;
                Self::new_unchecked(data_type.clone(), len, validity, Vec::new(), children, None)
            }
            Layout::Dictionary(w) => {
                let DataType::Dictionary(_, value) = data_type else {
                    unreachable!("dictionary layout on non-dictionary type")
                };
                let dict = Self::new_null_typed(value, 0)?;
                Self::new_unchecked(
                    data_type.clone(),
                    len,
                    validity,
                    vec![Buffer::from(vec![0u8; len * w])],
                    Vec::new(),
                    Some(dict),
                )
            }
        };
        Ok(array)
    }

    /// Dictionary array from integer `keys` and a `values` dictionary.
    ///
    /// Keys keep their own offset and validity.
    pub fn try_new_dictionary(keys: Array, values: Array) -> Result<Self> {
        let data_type = DataType::dictionary(keys.data_type.clone(), values.data_type.clone())?;
        Self::try_new(
            data_type,
            keys.len,
            keys.offset,
            keys.validity,
            keys.buffers,
            Vec::new(),
            Some(values),
        )
    }

    /// Replaces the validity mask of a fresh (offset 0) array.
    ///
    /// The mask must cover `len` slots.
    pub fn with_validity(mut self, validity: Option<Bitmask>) -> Result<Self> {
        if let Some(mask) = &validity {
            if mask.len() != self.len {
                return Err(InterchangeError::ColumnLengthMismatch {
                    col: 0,
                    expected: self.len,
                    found: mask.len(),
                });
            }
            if matches!(self.data_type, DataType::Null) {
                return Err(InterchangeError::UnsupportedOperation(
                    "Null arrays carry no validity".into(),
                ));
            }
        }
        let mask = validity.map(|m| {
            if self.offset == 0 {
                m
            } else {
                // Shift the mask so it lines up with the physical window.
                Bitmask::from_fn(self.offset + self.len, |i| {
                    i >= self.offset && m.get(i - self.offset)
                })
            }
        });
        self.validity = mask;
        self.null_count = OnceLock::new();
        Ok(self)
    }

    /// Same buffers under a different but layout-identical type
    /// (e.g. relabelling a timestamp's timezone, or a child field name).
    pub fn with_data_type(mut self, data_type: DataType) -> Result<Self> {
        self.data_type = data_type;
        self.validate()?;
        Ok(self)
    }

    // ---------------------------------------------------------------
    // Header accessors
    // ---------------------------------------------------------------

    #[inline]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical offset into the buffers.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of null slots in the window, computed on first call.
    pub fn null_count(&self) -> usize {
        *self.null_count.get_or_init(|| match (&self.data_type, &self.validity) {
            (DataType::Null, _) => self.len,
            (_, None) => 0,
            (_, Some(mask)) => mask.count_unset(self.offset, self.len),
        })
    }

    /// Validity mask over the physical buffers (read it at `offset() + i`).
    #[inline]
    pub fn validity(&self) -> Option<&Bitmask> {
        self.validity.as_ref()
    }

    #[inline]
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    #[inline]
    pub fn children(&self) -> &[Array] {
        &self.children
    }

    #[inline]
    pub fn dictionary(&self) -> Option<&Array> {
        self.dictionary.as_deref()
    }

    #[inline]
    pub fn is_valid(&self, i: usize) -> bool {
        assert!(i < self.len, "index {i} out of bounds for length {}", self.len);
        match &self.validity {
            None => !matches!(self.data_type, DataType::Null),
            Some(mask) => mask.get(self.offset + i),
        }
    }

    #[inline]
    pub fn is_null(&self, i: usize) -> bool {
        !self.is_valid(i)
    }

    /// Zero-copy window `[offset, offset + len)` of this array.
    ///
    /// # Panics
    /// Panics if the window is out of bounds.
    pub fn slice(&self, offset: usize, len: usize) -> Array {
        assert!(
            offset + len <= self.len,
            "Array::slice window [{offset}, {}) out of bounds for length {}",
            offset + len,
            self.len
        );
        let null_count = OnceLock::new();
        if offset == 0 && len == self.len {
            if let Some(n) = self.null_count.get() {
                let _ = null_count.set(*n);
            }
        }
        Array {
            data_type: self.data_type.clone(),
            len,
            offset: self.offset + offset,
            null_count,
            validity: self.validity.clone(),
            buffers: self.buffers.clone(),
            children: self.children.clone(),
            dictionary: self.dictionary.clone(),
        }
    }

    // ---------------------------------------------------------------
    // Value accessors
    // ---------------------------------------------------------------

    /// Typed view of the values in the window.
    ///
    /// `T` must match the physical storage: e.g. `i64` for `Timestamp`,
    /// `i32` for `Date32`, `u16` for `Float16`, the key type for dictionaries.
    pub fn values<T: NativeType>(&self) -> Result<&[T]> {
        let compatible = match &self.data_type {
            DataType::Dictionary(key, _) => T::data_type() == **key,
            other => physical_matches::<T>(other),
        };
        if !compatible {
            return Err(InterchangeError::TypeMismatch {
                expected: self.data_type.to_string(),
                found: T::data_type().to_string(),
                context: Some("Array::values".into()),
            });
        }
        let all = self.buffers[0].typed::<T>();
        Ok(&all[self.offset..self.offset + self.len])
    }

    /// Bytes of element `i` for string, binary, view and fixed-width binary types.
    ///
    /// Returns `None` for null slots and for types without byte values.
    pub fn value_bytes(&self, i: usize) -> Option<&[u8]> {
        if self.is_null(i) {
            return None;
        }
        let p = self.offset + i;
        match self.data_type.layout() {
            Layout::Variable { large } => {
                let (start, end) = offset_pair(&self.buffers[0], large, p);
                Some(&self.buffers[1].as_slice()[start..end])
            }
            Layout::View => Some(self.view_bytes(p)),
            Layout::FixedWidth(w)
                if matches!(
                    self.data_type,
                    DataType::FixedSizeBinary(_)
                        | DataType::Decimal32(..)
                        | DataType::Decimal64(..)
                        | DataType::Decimal128(..)
                        | DataType::Decimal256(..)
                ) =>
            {
                Some(&self.buffers[0].as_slice()[p * w..(p + 1) * w])
            }
            _ => None,
        }
    }

    /// UTF-8 value of element `i` for string types; `None` for nulls.
    pub fn value_str(&self, i: usize) -> Option<&str> {
        match self.data_type {
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                self.value_bytes(i).and_then(|b| std::str::from_utf8(b).ok())
            }
            _ => None,
        }
    }

    /// Logical value of element `i`.
    pub fn to_scalar(&self, i: usize) -> Scalar {
        if self.is_null(i) {
            return Scalar::Null;
        }
        let p = self.offset + i;
        match &self.data_type {
            DataType::Null => Scalar::Null,
            DataType::Boolean => Scalar::Boolean(get_bit(self.buffers[0].as_slice(), p)),
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Date32
            | DataType::Date64
            | DataType::Time32(_)
            | DataType::Time64(_)
            | DataType::Timestamp(..)
            | DataType::Duration(_) => Scalar::Int(self.read_signed(p)),
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
                Scalar::UInt(self.read_unsigned(p))
            }
            DataType::Float16 => Scalar::Float(f16_to_f64(self.read_unsigned(p) as u16)),
            DataType::Float32 => {
                let b = fixed_bytes::<4>(self.buffers[0].as_slice(), p * 4);
                Scalar::Float(f32::from_le_bytes(b) as f64)
            }
            DataType::Float64 => {
                let b = fixed_bytes::<8>(self.buffers[0].as_slice(), p * 8);
                Scalar::Float(f64::from_le_bytes(b))
            }
            DataType::Decimal32(..)
            | DataType::Decimal64(..)
            | DataType::Decimal128(..)
            | DataType::Decimal256(..) => {
                Scalar::Decimal(self.value_bytes(i).map(<[u8]>::to_vec).unwrap_or_default())
            }
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                let bytes = self.value_bytes(i).unwrap_or_default();
                Scalar::Utf8(String::from_utf8_lossy(bytes).into_owned())
            }
            DataType::Binary
            | DataType::LargeBinary
            | DataType::BinaryView
            | DataType::FixedSizeBinary(_) => {
                Scalar::Binary(self.value_bytes(i).map(<[u8]>::to_vec).unwrap_or_default())
            }
            DataType::List(_) | DataType::LargeList(_) | DataType::Map(..) => {
                let large = matches!(self.data_type, DataType::LargeList(_));
                let (start, end) = offset_pair(&self.buffers[0], large, p);
                let child = &self.children[0];
                Scalar::List((start..end).map(|j| child.to_scalar(j)).collect())
            }
            DataType::FixedSizeList(_, n) => {
                let n = *n as usize;
                let child = &self.children[0];
                Scalar::List((p * n..(p + 1) * n).map(|j| child.to_scalar(j)).collect())
            }
            DataType::Struct(_) => {
                Scalar::Struct(self.children.iter().map(|c| c.to_scalar(p)).collect())
            }
            DataType::Dictionary(..) => {
                match (self.dictionary_key(i), self.dictionary.as_deref()) {
                    (Some(key), Some(dict)) if key < dict.len() => dict.to_scalar(key),
                    _ => Scalar::Null,
                }
            }
        }
    }

    /// All logical values in the window.
    pub fn to_scalars(&self) -> Vec<Scalar> {
        (0..self.len).map(|i| self.to_scalar(i)).collect()
    }

    /// Per-element equality of type, nullness and value, regardless of physical
    /// offsets, buffer sharing or bytes hidden under nulls.
    pub fn logical_eq(&self, other: &Array) -> bool {
        self.data_type == other.data_type
            && self.len == other.len
            && (0..self.len).all(|i| self.to_scalar(i) == other.to_scalar(i))
    }

    // ---------------------------------------------------------------
    // Nested accessors
    // ---------------------------------------------------------------

    /// Offsets of a `List` / `LargeList` / `Map` array as an `Int32` / `Int64` array.
    ///
    /// With `logical`, they are rebased to start at zero, so they describe the
    /// output of [`Array::list_flatten`]. Otherwise the physical offsets
    /// covering the window are returned unchanged.
    pub fn list_offsets(&self, logical: bool) -> Result<Array> {
        match self.data_type {
            DataType::List(_) | DataType::Map(..) => Ok(self.collect_offsets::<i32>(logical)),
            DataType::LargeList(_) => Ok(self.collect_offsets::<i64>(logical)),
            _ => Err(InterchangeError::type_mismatch(
                "List or LargeList",
                self.data_type.to_string(),
            )),
        }
    }

    fn collect_offsets<O: OffsetType + std::ops::Sub<Output = O>>(&self, logical: bool) -> Array {
        if self.buffers[0].is_empty() {
            return Array::from_slice(&[O::default()]);
        }
        let raw = &self.buffers[0].typed::<O>()[self.offset..=self.offset + self.len];
        if logical {
            let base = raw[0];
            Array::from_slice(&raw.iter().map(|&o| o - base).collect::<Vec<O>>())
        } else {
            Array::from_slice(raw)
        }
    }

    /// Child values covered by this list array's window, including those under
    /// null list slots.
    pub fn list_flatten(&self) -> Result<Array> {
        match self.data_type.layout() {
            Layout::List { large } => {
                if self.buffers[0].is_empty() {
                    return Ok(self.children[0].slice(0, 0));
                }
                let start = offset_at(&self.buffers[0], large, self.offset);
                let end = offset_at(&self.buffers[0], large, self.offset + self.len);
                Ok(self.children[0].slice(start, end - start))
            }
            Layout::FixedSizeList(n) => Ok(self.children[0].slice(self.offset * n, self.len * n)),
            _ => Err(InterchangeError::type_mismatch(
                "List, LargeList or FixedSizeList",
                self.data_type.to_string(),
            )),
        }
    }

    /// Nested struct child at the path `indices`, windowed to this array.
    ///
    /// Every parent's validity is folded into the result, so a null parent
    /// yields a null child slot.
    pub fn struct_field(&self, indices: &[usize]) -> Result<Array> {
        let mut current = self.clone();
        for &i in indices {
            let DataType::Struct(fields) = &current.data_type else {
                return Err(InterchangeError::type_mismatch(
                    "Struct",
                    current.data_type.to_string(),
                ));
            };
            if i >= fields.len() {
                return Err(InterchangeError::IndexOutOfBounds {
                    index: i,
                    len: fields.len(),
                });
            }
            let child = current.children[i].slice(current.offset, current.len);
            current = match &current.validity {
                None => child,
                Some(_) => child.and_validity(&current),
            };
        }
        Ok(current)
    }

    /// Copy of this header whose validity also clears slots null in `parent`.
    fn and_validity(self, parent: &Array) -> Array {
        let Some(parent_mask) = parent.validity() else {
            return self;
        };
        if matches!(self.data_type, DataType::Null) {
            return self;
        }
        let own = self
            .validity
            .clone()
            .unwrap_or_else(|| Bitmask::new_set_all(self.offset + self.len, true));
        let combined = Bitmask::from_fn(self.offset + self.len, |p| {
            p >= self.offset && own.get(p) && parent_mask.get(parent.offset + (p - self.offset))
        });
        let mut out = self;
        out.validity = Some(combined);
        out.null_count = OnceLock::new();
        out
    }

    /// Integer indices of a dictionary array, windowed.
    pub fn dictionary_indices(&self) -> Result<Array> {
        let DataType::Dictionary(key, _) = &self.data_type else {
            return Err(InterchangeError::type_mismatch(
                "Dictionary",
                self.data_type.to_string(),
            ));
        };
        Ok(Array {
            data_type: (**key).clone(),
            len: self.len,
            offset: self.offset,
            null_count: OnceLock::new(),
            validity: self.validity.clone(),
            buffers: self.buffers.clone(),
            children: Vec::new(),
            dictionary: None,
        })
    }

    /// Dictionary values of a dictionary array.
    pub fn dictionary_values(&self) -> Result<Array> {
        self.dictionary.as_deref().cloned().ok_or_else(|| {
            InterchangeError::type_mismatch("Dictionary", self.data_type.to_string())
        })
    }

    /// Dictionary key of logical element `i`, read regardless of validity.
    ///
    /// `None` for a negative signed key.
    pub(crate) fn dictionary_key(&self, i: usize) -> Option<usize> {
        let p = self.offset + i;
        match &self.data_type {
            DataType::Dictionary(key, _) if key.is_signed_integer() => {
                usize::try_from(self.read_signed(p)).ok()
            }
            _ => usize::try_from(self.read_unsigned(p)).ok(),
        }
    }

    // ---------------------------------------------------------------
    // Raw reads
    // ---------------------------------------------------------------

    /// Signed integer at physical position `p` of the first buffer.
    pub(crate) fn read_signed(&self, p: usize) -> i64 {
        let bytes = self.buffers[0].as_slice();
        match self.physical_width() {
            1 => bytes[p] as i8 as i64,
            2 => i16::from_le_bytes(fixed_bytes::<2>(bytes, p * 2)) as i64,
            4 => i32::from_le_bytes(fixed_bytes::<4>(bytes, p * 4)) as i64,
            _ => i64::from_le_bytes(fixed_bytes::<8>(bytes, p * 8)),
        }
    }

    /// Unsigned integer at physical position `p` of the first buffer.
    pub(crate) fn read_unsigned(&self, p: usize) -> u64 {
        let bytes = self.buffers[0].as_slice();
        match self.physical_width() {
            1 => bytes[p] as u64,
            2 => u16::from_le_bytes(fixed_bytes::<2>(bytes, p * 2)) as u64,
            4 => u32::from_le_bytes(fixed_bytes::<4>(bytes, p * 4)) as u64,
            _ => u64::from_le_bytes(fixed_bytes::<8>(bytes, p * 8)),
        }
    }

    fn physical_width(&self) -> usize {
        match self.data_type.layout() {
            Layout::FixedWidth(w) | Layout::Dictionary(w) => w,
            _ => 8,
        }
    }

    /// Byte range `[start, end)` of element at physical position `p`.
    pub(crate) fn value_range(&self, p: usize) -> (usize, usize) {
        let large = matches!(
            self.data_type.layout(),
            Layout::Variable { large: true } | Layout::List { large: true }
        );
        offset_pair(&self.buffers[0], large, p)
    }

    fn view_bytes(&self, p: usize) -> &[u8] {
        let view = &self.buffers[0].as_slice()[p * VIEW_SIZE..(p + 1) * VIEW_SIZE];
        let len = i32::from_le_bytes(fixed_bytes::<4>(view, 0)) as usize;
        if len <= MAX_INLINE_VIEW {
            &view[4..4 + len]
        } else {
            let buf = i32::from_le_bytes(fixed_bytes::<4>(view, 8)) as usize;
            let off = i32::from_le_bytes(fixed_bytes::<4>(view, 12)) as usize;
            &self.buffers[1 + buf].as_slice()[off..off + len]
        }
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    fn validate(&self) -> Result<()> {
        let end = self.offset + self.len;
        if let Some(mask) = &self.validity {
            if matches!(self.data_type, DataType::Null) {
                return Err(InterchangeError::UnsupportedOperation(
                    "Null arrays carry no validity".into(),
                ));
            }
            if mask.len() < end {
                return Err(InterchangeError::ColumnLengthMismatch {
                    col: 0,
                    expected: end,
                    found: mask.len(),
                });
            }
        }
        let layout = self.data_type.layout();
        let expected_buffers = match layout {
            Layout::View => None,
            _ => Some(self.data_type.fixed_buffer_count().saturating_sub(1)),
        };
        match expected_buffers {
            Some(n) if self.buffers.len() != n => {
                return Err(self.layout_error(format!("{n} buffers, found {}", self.buffers.len())));
            }
            None if self.buffers.is_empty() => {
                return Err(self.layout_error("a views buffer".into()));
            }
            _ => {}
        }
        let expected_children = self.data_type.children().len();
        if self.children.len() != expected_children {
            return Err(InterchangeError::FieldCountMismatch {
                expected: expected_children,
                found: self.children.len(),
            });
        }
        for (i, (child, field)) in self.children.iter().zip(self.data_type.children()).enumerate() {
            if child.data_type != field.data_type {
                return Err(InterchangeError::TypeMismatch {
                    expected: field.data_type.to_string(),
                    found: child.data_type.to_string(),
                    context: Some(format!("child {i} '{}'", field.name)),
                });
            }
        }

        match layout {
            Layout::Null => {}
            Layout::Bitmap => self.check_size(0, bytes_for(end))?,
            Layout::FixedWidth(w) => self.check_size(0, end * w)?,
            Layout::Variable { large } => {
                self.check_offsets(large, self.buffers[1].len())?;
                self.check_utf8()?;
            }
            Layout::View => {
                self.check_size(0, end * VIEW_SIZE)?;
                self.check_views()?;
                self.check_utf8()?;
            }
            Layout::List { large } => {
                self.check_offsets(large, self.children[0].len)?;
                if matches!(self.data_type, DataType::Map(..)) {
                    let DataType::Struct(kv) = &self.children[0].data_type else {
                        return Err(self.layout_error("a struct entries child".into()));
                    };
                    if kv.len() != 2 {
                        return Err(InterchangeError::FieldCountMismatch {
                            expected: 2,
                            found: kv.len(),
                        });
                    }
                }
            }
            Layout::FixedSizeList(n) => {
                if self.children[0].len < end * n {
                    return Err(InterchangeError::ColumnLengthMismatch {
                        col: 0,
                        expected: end * n,
                        found: self.children[0].len,
                    });
                }
            }
            Layout::Struct => {
                for (col, child) in self.children.iter().enumerate() {
                    if child.len < end {
                        return Err(InterchangeError::ColumnLengthMismatch {
                            col,
                            expected: end,
                            found: child.len,
                        });
                    }
                }
            }
            Layout::Dictionary(w) => {
                self.check_size(0, end * w)?;
                let DataType::Dictionary(_, value) = &self.data_type else {
                    unreachable!("dictionary layout on non-dictionary type")
                };
                let Some(dict) = self.dictionary.as_deref() else {
                    return Err(self.layout_error("a dictionary".into()));
                };
                if dict.data_type != **value {
                    return Err(InterchangeError::TypeMismatch {
                        expected: value.to_string(),
                        found: dict.data_type.to_string(),
                        context: Some("dictionary values".into()),
                    });
                }
                for i in 0..self.len {
                    if !self.is_valid(i) {
                        continue;
                    }
                    match self.dictionary_key(i) {
                        Some(key) if key < dict.len => {}
                        Some(key) => {
                            return Err(InterchangeError::IndexOutOfBounds {
                                index: key,
                                len: dict.len,
                            });
                        }
                        None => {
                            return Err(InterchangeError::InvalidOffsets(format!(
                                "negative dictionary key {} at slot {i}",
                                self.read_signed(self.offset + i)
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn layout_error(&self, what: String) -> InterchangeError {
        InterchangeError::TypeMismatch {
            expected: what,
            found: "incompatible buffer layout".into(),
            context: Some(self.data_type.to_string()),
        }
    }

    fn check_size(&self, buffer: usize, needed: usize) -> Result<()> {
        let have = self.buffers[buffer].len();
        if have < needed {
            return Err(self.layout_error(format!("buffer {buffer} of at least {needed} bytes, found {have}")));
        }
        Ok(())
    }

    fn check_offsets(&self, large: bool, limit: usize) -> Result<()> {
        let end = self.offset + self.len;
        let offsets = &self.buffers[0];
        if end == 0 && offsets.is_empty() {
            return Ok(());
        }
        let width = if large { 8 } else { 4 };
        if offsets.len() < (end + 1) * width {
            return Err(InterchangeError::InvalidOffsets(format!(
                "expected at least {} offsets, found {}",
                end + 1,
                offsets.len() / width
            )));
        }
        let read = |p: usize| -> i64 {
            let b = offsets.as_slice();
            if large {
                i64::from_le_bytes(fixed_bytes::<8>(b, p * 8))
            } else {
                i32::from_le_bytes(fixed_bytes::<4>(b, p * 4)) as i64
            }
        };
        let mut prev = read(self.offset);
        if prev < 0 {
            return Err(InterchangeError::InvalidOffsets(format!("negative offset {prev}")));
        }
        for p in self.offset + 1..=end {
            let cur = read(p);
            if cur < prev {
                return Err(InterchangeError::InvalidOffsets(format!(
                    "offsets decrease at position {p}: {prev} > {cur}"
                )));
            }
            prev = cur;
        }
        if prev as usize > limit {
            return Err(InterchangeError::InvalidOffsets(format!(
                "last offset {prev} exceeds values length {limit}"
            )));
        }
        Ok(())
    }

    /// Every non-null string slot must be valid UTF-8.
    fn check_utf8(&self) -> Result<()> {
        if !matches!(
            self.data_type,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
        ) {
            return Ok(());
        }
        for i in 0..self.len {
            if let Some(bytes) = self.value_bytes(i) {
                if let Err(e) = std::str::from_utf8(bytes) {
                    return Err(InterchangeError::TypeMismatch {
                        expected: "valid UTF-8".into(),
                        found: format!("invalid byte sequence ({e})"),
                        context: Some(format!("{} slot {i}", self.data_type)),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_views(&self) -> Result<()> {
        let views = self.buffers[0].as_slice();
        let data = &self.buffers[1..];
        for p in self.offset..self.offset + self.len {
            if self.validity.as_ref().is_some_and(|m| !m.get(p)) {
                continue;
            }
            let view = &views[p * VIEW_SIZE..(p + 1) * VIEW_SIZE];
            let len = i32::from_le_bytes(fixed_bytes::<4>(view, 0));
            if len < 0 {
                return Err(InterchangeError::InvalidOffsets(format!("negative view length {len}")));
            }
            if len as usize <= MAX_INLINE_VIEW {
                continue;
            }
            let buf = i32::from_le_bytes(fixed_bytes::<4>(view, 8)) as usize;
            let off = i32::from_le_bytes(fixed_bytes::<4>(view, 12)) as usize;
            match data.get(buf) {
                Some(b) if off + len as usize <= b.len() => {}
                _ => {
                    return Err(InterchangeError::InvalidOffsets(format!(
                        "view {p} references bytes outside data buffer {buf}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.logical_eq(other)
    }
}

impl Debug for Array {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Array<{}>[", self.data_type)?;
        for i in 0..self.len.min(20) {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.to_scalar(i))?;
        }
        if self.len > 20 {
            write!(f, ", … {} more", self.len - 20)?;
        }
        write!(f, "] (offset={}, nulls={})", self.offset, self.null_count())
    }
}

/// True when native type `T` is the physical storage of `data_type`.
pub(crate) fn physical_matches<T: NativeType>(data_type: &DataType) -> bool {
    let native = T::data_type();
    if native == *data_type {
        return true;
    }
    match native {
        DataType::Int32 => matches!(
            data_type,
            DataType::Date32 | DataType::Time32(_) | DataType::Decimal32(..)
        ),
        DataType::Int64 => matches!(
            data_type,
            DataType::Date64
                | DataType::Time64(_)
                | DataType::Timestamp(..)
                | DataType::Duration(_)
                | DataType::Decimal64(..)
        ),
        DataType::UInt16 => matches!(data_type, DataType::Float16),
        DataType::UInt8 => matches!(data_type, DataType::FixedSizeBinary(_)),
        _ => false,
    }
}

/// Child element type of a list-like type.
pub(crate) fn list_child_type(data_type: &DataType) -> Result<DataType> {
    data_type
        .children()
        .first()
        .map(|f| f.data_type.clone())
        .ok_or_else(|| InterchangeError::type_mismatch("list-like type", data_type.to_string()))
}

/// Reads `N` bytes starting at `pos`.
#[inline]
pub(crate) fn fixed_bytes<const N: usize>(bytes: &[u8], pos: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[pos..pos + N]);
    out
}

/// Offset number `p`.
#[inline]
pub(crate) fn offset_at(offsets: &Buffer, large: bool, p: usize) -> usize {
    let b = offsets.as_slice();
    if large {
        i64::from_le_bytes(fixed_bytes::<8>(b, p * 8)) as usize
    } else {
        i32::from_le_bytes(fixed_bytes::<4>(b, p * 4)) as usize
    }
}

/// Offsets `(start, end)` of physical element `p`.
#[inline]
pub(crate) fn offset_pair(offsets: &Buffer, large: bool, p: usize) -> (usize, usize) {
    let b = offsets.as_slice();
    if large {
        (
            i64::from_le_bytes(fixed_bytes::<8>(b, p * 8)) as usize,
            i64::from_le_bytes(fixed_bytes::<8>(b, (p + 1) * 8)) as usize,
        )
    } else {
        (
            i32::from_le_bytes(fixed_bytes::<4>(b, p * 4)) as usize,
            i32::from_le_bytes(fixed_bytes::<4>(b, (p + 1) * 4)) as usize,
        )
    }
}

/// Builds an offsets + values array from optional byte items.
///
/// # Errors
/// `InvalidOffsets` once the values outgrow the offset type `O`.
pub(crate) fn build_variable<'a, O, I>(data_type: DataType, items: I) -> Result<Array>
where
    O: OffsetType,
    I: IntoIterator<Item = Option<&'a [u8]>>,
{
    let mut offsets: Vec<u8> = Vec::new();
    let mut values: Vec<u8> = Vec::new();
    let mut valid: Vec<bool> = Vec::new();
    O::default().write_le(&mut offsets);
    for item in items {
        if let Some(bytes) = item {
            values.extend_from_slice(bytes);
        }
        valid.push(item.is_some());
        let end = O::from_usize(values.len()).ok_or_else(|| {
            InterchangeError::InvalidOffsets(format!(
                "{} value bytes overflow the offsets of {data_type}",
                values.len()
            ))
        })?;
        end.write_le(&mut offsets);
    }
    let len = valid.len();
    let validity = if valid.iter().all(|v| *v) {
        None
    } else {
        Some(Bitmask::from_bools(&valid))
    };
    Ok(Array::new_unchecked(
        data_type,
        len,
        validity,
        vec![Buffer::from(offsets), Buffer::from(values)],
        Vec::new(),
        None,
    ))
}

/// Builds a views array. Long values go to a single data buffer.
pub(crate) fn build_views<'a, I>(data_type: DataType, items: I) -> Array
where
    I: IntoIterator<Item = Option<&'a [u8]>>,
{
    let mut views: Vec<u8> = Vec::new();
    let mut data: Vec<u8> = Vec::new();
    let mut valid: Vec<bool> = Vec::new();
    for item in items {
        let bytes = item.unwrap_or_default();
        valid.push(item.is_some());
        views.extend_from_slice(&make_view(bytes, 0, data.len()));
        if bytes.len() > MAX_INLINE_VIEW {
            data.extend_from_slice(bytes);
        }
    }
    let len = valid.len();
    let validity = if valid.iter().all(|v| *v) {
        None
    } else {
        Some(Bitmask::from_bools(&valid))
    };
    let mut buffers = vec![Buffer::from(views)];
    if !data.is_empty() {
        buffers.push(Buffer::from(data));
    }
    Array::new_unchecked(data_type, len, validity, buffers, Vec::new(), None)
}

/// Encodes one 16-byte view. `buffer` and `offset` are used only for long values.
pub(crate) fn make_view(bytes: &[u8], buffer: usize, offset: usize) -> [u8; VIEW_SIZE] {
    let mut view = [0u8; VIEW_SIZE];
    view[0..4].copy_from_slice(&(bytes.len() as i32).to_le_bytes());
    if bytes.len() <= MAX_INLINE_VIEW {
        view[4..4 + bytes.len()].copy_from_slice(bytes);
    } else {
        view[4..8].copy_from_slice(&bytes[..4]);
        view[8..12].copy_from_slice(&(buffer as i32).to_le_bytes());
        view[12..16].copy_from_slice(&(offset as i32).to_le_bytes());
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::time_units::TimeUnit;
    use crate::Field;

    #[test]
    fn slice_is_zero_copy_and_counts_nulls_lazily() {
        let a = Array::from_options(&[Some(1i64), None, Some(3), None, Some(5)]);
        let s = a.slice(1, 3);
        assert_eq!(s.len(), 3);
        assert_eq!(s.offset(), 1);
        assert!(s.buffers()[0].shares_storage(&a.buffers()[0]));
        assert_eq!(s.null_count(), 2);
        assert_eq!(a.null_count(), 2);
        assert_eq!(s.values::<i64>().unwrap(), &[0, 3, 0]);
        assert_eq!(s.to_scalar(1), Scalar::Int(3));
        let ss = s.slice(1, 2);
        assert_eq!(ss.offset(), 2);
        assert_eq!(ss.to_scalars(), vec![Scalar::Int(3), Scalar::Null]);
    }

    #[test]
    fn strings_and_views() {
        let a = Array::from_opt_strs(&[Some("hello"), None, Some("")]);
        assert_eq!(a.value_str(0), Some("hello"));
        assert_eq!(a.value_str(1), None);
        assert_eq!(a.value_str(2), Some(""));
        let long = "a string longer than twelve bytes";
        let v = Array::from_str_views(&[Some("short"), Some(long), None]);
        assert_eq!(v.value_str(0), Some("short"));
        assert_eq!(v.value_str(1), Some(long));
        assert!(v.is_null(2));
        assert_eq!(v.buffers().len(), 2);
    }

    #[test]
    fn try_new_rejects_decreasing_offsets() {
        let err = Array::try_new(
            DataType::Utf8,
            2,
            0,
            None,
            vec![Buffer::from_slice(&[0i32, 3, 1]), Buffer::from(b"abc".to_vec())],
            Vec::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, InterchangeError::InvalidOffsets(_)));

        let err = Array::try_new(
            DataType::Utf8,
            1,
            0,
            None,
            vec![Buffer::from_slice(&[0i32, 9]), Buffer::from(b"abc".to_vec())],
            Vec::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, InterchangeError::InvalidOffsets(_)));
    }

    #[test]
    fn try_new_checks_buffer_count_and_children() {
        assert!(Array::try_new(DataType::Int32, 0, 0, None, vec![], vec![], None).is_err());
        let dt = DataType::Struct(vec![Field::new("a", DataType::Int32, true)]);
        let err = Array::try_new(dt, 0, 0, None, vec![], vec![], None).unwrap_err();
        assert!(matches!(err, InterchangeError::FieldCountMismatch { .. }));
    }

    #[test]
    fn logical_equality_ignores_physical_layout() {
        let a = Array::from_options(&[Some(9i32), Some(1), None, Some(2)]).slice(1, 3);
        let b = Array::from_options(&[Some(1i32), None, Some(2)]);
        assert_eq!(a, b);
        let c = Array::from_options(&[Some(1i32), Some(0), Some(2)]);
        assert_ne!(a, c);
    }

    #[test]
    fn typed_values_follow_physical_storage() {
        let ts = Array::from_native(
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            &[1i64, 2],
            None,
        )
        .unwrap();
        assert_eq!(ts.values::<i64>().unwrap(), &[1, 2]);
        assert!(ts.values::<i32>().is_err());
        assert!(Array::from_native(DataType::Date32, &[1i64], None).is_err());
    }

    #[test]
    fn dictionary_accessors() {
        let keys = Array::from_options(&[Some(1i8), Some(0), None, Some(1)]);
        let values = Array::from_strs(&["x", "y"]);
        let d = Array::try_new_dictionary(keys, values).unwrap();
        assert_eq!(d.to_scalar(0), Scalar::Utf8("y".into()));
        assert_eq!(d.to_scalar(2), Scalar::Null);
        assert_eq!(d.dictionary_values().unwrap().len(), 2);
        assert_eq!(d.slice(1, 2).dictionary_indices().unwrap().values::<i8>().unwrap(), &[0, 0]);

        let bad = Array::try_new_dictionary(Array::from_slice(&[5i32]), Array::from_strs(&["x"]));
        assert!(matches!(bad, Err(InterchangeError::IndexOutOfBounds { .. })));
    }

    #[test]
    fn negative_dictionary_keys_are_rejected() {
        let err = Array::try_new_dictionary(
            Array::from_slice(&[0i16, -1]),
            Array::from_strs(&["x", "y"]),
        )
        .unwrap_err();
        assert!(matches!(err, InterchangeError::InvalidOffsets(_)));

        // Under a null slot the key is never read.
        let keys = Array::from_slice(&[1i16, -1])
            .with_validity(Some(Bitmask::from_bools(&[true, false])))
            .unwrap();
        let d = Array::try_new_dictionary(keys, Array::from_strs(&["x", "y"])).unwrap();
        assert_eq!(d.to_scalar(0), Scalar::Utf8("y".into()));
        assert_eq!(d.to_scalar(1), Scalar::Null);
    }

    #[test]
    fn string_arrays_must_hold_utf8() {
        let bad = vec![Buffer::from_slice(&[0i32, 2]), Buffer::from(vec![0xC3u8, 0x28])];
        let err = Array::try_new(DataType::Utf8, 1, 0, None, bad.clone(), Vec::new(), None)
            .unwrap_err();
        assert!(matches!(err, InterchangeError::TypeMismatch { .. }));
        // The same bytes are fine as binary, or hidden under a null.
        assert!(Array::try_new(DataType::Binary, 1, 0, None, bad.clone(), Vec::new(), None).is_ok());
        let masked = Some(Bitmask::from_bools(&[false]));
        assert!(Array::try_new(DataType::Utf8, 1, 0, masked, bad, Vec::new(), None).is_ok());

        let mut view = [0u8; VIEW_SIZE];
        view[0] = 1;
        view[4] = 0xFF;
        let err = Array::try_new(
            DataType::Utf8View,
            1,
            0,
            None,
            vec![Buffer::from(view.to_vec())],
            Vec::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, InterchangeError::TypeMismatch { .. }));
    }

    // Narrow offsets make overflow reachable without gigabytes of values.
    impl OffsetType for i16 {
        const IS_LARGE: bool = false;

        fn as_usize(self) -> usize {
            self as usize
        }

        fn from_usize(v: usize) -> Option<Self> {
            i16::try_from(v).ok()
        }
    }

    #[test]
    fn offset_overflow_is_an_error() {
        let big = vec![0u8; 1 << 12];
        let items = std::iter::repeat_n(Some(big.as_slice()), 8);
        let err = build_variable::<i16, _>(DataType::Binary, items).unwrap_err();
        assert!(matches!(err, InterchangeError::InvalidOffsets(_)));
        assert_eq!(Array::try_from_strs(&["a", "bc"]).unwrap().len(), 2);
    }

    #[test]
    fn null_typed_arrays() {
        let n = Array::new_null(3);
        assert_eq!(n.null_count(), 3);
        let typed = Array::new_null_typed(&DataType::list(DataType::Utf8), 2).unwrap();
        assert_eq!(typed.null_count(), 2);
        assert_eq!(typed.to_scalar(1), Scalar::Null);
        let st = Array::new_null_typed(
            &DataType::Struct(vec![Field::new("a", DataType::Int8, true)]),
            4,
        )
        .unwrap();
        assert_eq!(st.children()[0].len(), 4);
    }

    #[test]
    fn with_validity_checks_length() {
        let a = Array::from_slice(&[1u8, 2, 3]);
        assert!(a.clone().with_validity(Some(Bitmask::from_bools(&[true]))).is_err());
        let masked = a.with_validity(Some(Bitmask::from_bools(&[true, false, true]))).unwrap();
        assert_eq!(masked.null_count(), 1);
    }
}
