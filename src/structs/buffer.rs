//! # **Buffer** - *Reference-counted, immutable byte region*
//!
//! Buffer backs every values, offsets and validity region of an [`Array`](crate::Array).
//!
//! # Design
//! - Storage is an `Arc` over any owner exposing `AsRef<[u8]>`: a 64-byte aligned
//!   [`Vec64<u8>`] for locally built data, a `bytes::Bytes` payload fetched from a store,
//!   or a foreign allocation imported over the C Data Interface.
//! - A `Buffer` is a window `(owner, offset, len)` over that storage. Cloning and
//!   [`Buffer::slice`] only bump the reference count; bytes are never copied.
//! - The last `Buffer` to drop releases the owner, so a slice may outlive the
//!   array it was cut from.
//!
//! ## Alignment rules
//! - Owned buffers are always 64-byte aligned.
//! - Foreign owners are wrapped zero-copy when their data is at least 8-byte aligned,
//!   otherwise they are copied into an aligned `Vec64<u8>` on ingestion.
//! - [`Buffer::typed`] requires the window start to be aligned for `T`; array slicing
//!   never moves buffer windows, only the array's logical offset, so this holds for
//!   every buffer reachable through an `Array`.

use std::fmt::{self, Debug, Formatter};
use std::mem::{align_of, size_of};
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;
use vec64::Vec64;

use crate::traits::type_unions::NativeType;

/// Minimum alignment accepted for zero-copy ingestion.
pub const MIN_ALIGNMENT: usize = 8;

type Owner = Arc<dyn AsRef<[u8]> + Send + Sync>;

/// 64-byte aligned owned storage.
struct Aligned(Vec64<u8>);

impl AsRef<[u8]> for Aligned {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// # Buffer
///
/// Immutable, shared-ownership byte window.
///
/// ## Example
/// ```rust
/// use minarrow_interchange::Buffer;
///
/// let b = Buffer::from_slice(&[1i32, 2, 3, 4]);
/// let tail = b.slice(8, 8);
/// assert_eq!(tail.typed::<i32>(), &[3, 4]);
/// assert!(tail.shares_storage(&b));
/// ```
#[derive(Clone)]
pub struct Buffer {
    owner: Owner,
    offset: usize,
    len: usize,
}

impl Buffer {
    /// Empty buffer.
    pub fn empty() -> Self {
        Self::from_vec64(Vec64::with_capacity(0))
    }

    /// Takes ownership of an aligned vector.
    pub fn from_vec64(data: Vec64<u8>) -> Self {
        let len = data.len();
        Self {
            owner: Arc::new(Aligned(data)),
            offset: 0,
            len,
        }
    }

    /// Copies raw bytes into a new aligned allocation.
    pub fn from_bytes_copy(bytes: &[u8]) -> Self {
        let mut v = Vec64::with_capacity(bytes.len());
        v.extend_from_slice(bytes);
        Self::from_vec64(v)
    }

    /// Copies typed values into a new aligned allocation.
    pub fn from_slice<T: NativeType>(values: &[T]) -> Self {
        let n_bytes = std::mem::size_of_val(values);
        // SAFETY: NativeType implementors are plain old data without padding.
        let raw = unsafe { std::slice::from_raw_parts(values.as_ptr() as *const u8, n_bytes) };
        Self::from_bytes_copy(raw)
    }

    /// Collects typed values into a new aligned allocation.
    pub fn from_iter_typed<T: NativeType, I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut out = Vec::new();
        for v in iter {
            v.write_le(&mut out);
        }
        Self::from_bytes_copy(&out)
    }

    /// Wraps any owner zero-copy when suitably aligned, otherwise copies.
    pub fn from_owner<O>(owner: O) -> Self
    where
        O: AsRef<[u8]> + Send + Sync + 'static,
    {
        let slice = owner.as_ref();
        let len = slice.len();
        if len > 0 && (slice.as_ptr() as usize) % MIN_ALIGNMENT != 0 {
            warn!(len, "copying misaligned foreign buffer into aligned storage");
            return Self::from_bytes_copy(slice);
        }
        Self {
            owner: Arc::new(owner),
            offset: 0,
            len,
        }
    }

    /// Wraps a `Bytes` payload, zero-copy when aligned.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::from_owner(bytes)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the window's bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        let all: &[u8] = (*self.owner).as_ref();
        &all[self.offset..self.offset + self.len]
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    /// Zero-copy sub-window `[offset, offset + len)` relative to this window.
    ///
    /// # Panics
    /// Panics if the window is out of bounds.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        assert!(
            offset + len <= self.len,
            "Buffer::slice window [{offset}, {}) out of bounds for length {}",
            offset + len,
            self.len
        );
        Self {
            owner: self.owner.clone(),
            offset: self.offset + offset,
            len,
        }
    }

    /// Reinterprets the window as a slice of `T`.
    ///
    /// Trailing bytes that do not make up a full element are ignored.
    ///
    /// # Panics
    /// Panics if the window start is not aligned for `T`.
    pub fn typed<T: NativeType>(&self) -> &[T] {
        let bytes = self.as_slice();
        let n = bytes.len() / size_of::<T>();
        if n == 0 {
            return &[];
        }
        assert!(
            (bytes.as_ptr() as usize) % align_of::<T>() == 0,
            "Buffer start is not aligned for {}",
            std::any::type_name::<T>()
        );
        // SAFETY: alignment checked above, length bounded by the window, and every
        // bit pattern is a valid NativeType value.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const T, n) }
    }

    /// True when both buffers view the same underlying allocation.
    #[inline]
    pub fn shares_storage(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.owner, &other.owner)
    }

    /// Number of live handles on the underlying allocation.
    #[inline]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.owner)
    }

    /// Byte offset of this window inside its allocation.
    #[inline]
    pub fn storage_offset(&self) -> usize {
        self.offset
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl AsRef<[u8]> for Buffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("refs", &Arc::strong_count(&self.owner))
            .finish()
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(v: Vec<u8>) -> Self {
        Self::from_bytes_copy(&v)
    }
}

impl From<Vec64<u8>> for Buffer {
    fn from(v: Vec64<u8>) -> Self {
        Self::from_vec64(v)
    }
}

impl From<Bytes> for Buffer {
    fn from(b: Bytes) -> Self {
        Self::from_bytes(b)
    }
}
