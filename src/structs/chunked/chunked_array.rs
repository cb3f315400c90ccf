//! # **ChunkedArray** - *One logical column split across multiple arrays*
//!
//! Contains ChunkedArray, a higher-order container representing a logical column
//! split into multiple immutable `Array` chunks that share one `Field`.
//!
//! ## Overview
//! - Stores an ordered list of `Array` segments with shared field metadata.
//! - Chunk lengths may vary, and empty chunks are allowed.
//! - Logical indices are resolved by walking chunk boundaries.
//! - Rechunking and slicing return new containers; chunks are shared, and data is
//!   copied only where a new chunk spans several old ones.

use std::fmt::{Display, Formatter};

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::Scalar;
use crate::ffi::arrow_dtype::DataType;
use crate::kernels::cast::cast;
use crate::traits::concatenate::concat_arrays;
use crate::{Array, Field};

/// Default rows per chunk for [`RechunkStrategy::Auto`].
pub const AUTO_CHUNK_SIZE: usize = 8192;

/// Strategy for rechunking arrays and tables.
///
/// Defines how to redistribute data across chunks/batches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RechunkStrategy {
    /// Rechunk into uniform chunks of the specified element/row count.
    Count(usize),
    /// Rechunk using a default size of 8192 elements/rows.
    Auto,
}

impl RechunkStrategy {
    /// Target chunk size in rows.
    pub fn chunk_size(self) -> Result<usize> {
        match self {
            RechunkStrategy::Count(0) => Err(InterchangeError::UnsupportedOperation(
                "Count chunk size must be greater than 0".into(),
            )),
            RechunkStrategy::Count(n) => Ok(n),
            RechunkStrategy::Auto => Ok(AUTO_CHUNK_SIZE),
        }
    }
}

/// Target lengths covering `total` rows in runs of at most `size`.
pub(crate) fn uniform_lengths(total: usize, size: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(total.div_ceil(size.max(1)));
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(size);
        out.push(n);
        remaining -= n;
    }
    out
}

/// # ChunkedArray
///
/// Ordered `Array` chunks sharing one `Field`.
///
/// ## Description
/// - Every chunk's data type equals the field's data type.
/// - `len()` is the sum of the chunk lengths.
/// - Equality is logical: same field and same values in order, whatever the chunking.
///
/// ## Example
/// ```rust
/// use minarrow_interchange::{Array, ChunkedArray, RechunkStrategy};
///
/// let ca = ChunkedArray::from_arrays(vec![
///     Array::from_slice(&[1i32, 2]),
///     Array::from_slice(&[3i32]),
/// ])
/// .unwrap();
/// assert_eq!(ca.chunk_lengths(), vec![2, 1]);
/// let one = ca.rechunk(RechunkStrategy::Count(3)).unwrap();
/// assert_eq!(one.chunk_lengths(), vec![3]);
/// ```
#[derive(Clone, Debug)]
pub struct ChunkedArray {
    chunks: Vec<Array>,
    field: Field,
}

impl ChunkedArray {
    /// Constructs a ChunkedArray, checking every chunk against `field`.
    ///
    /// # Errors
    /// `TypeMismatch` naming the first chunk whose type differs.
    pub fn try_new(chunks: Vec<Array>, field: Field) -> Result<Self> {
        for (i, chunk) in chunks.iter().enumerate() {
            if *chunk.data_type() != field.data_type {
                return Err(InterchangeError::TypeMismatch {
                    expected: field.data_type.to_string(),
                    found: chunk.data_type().to_string(),
                    context: Some(format!("chunk {i}")),
                });
            }
        }
        Ok(Self { chunks, field })
    }

    /// Constructs a ChunkedArray from non-empty `chunks`, naming the field `""`.
    pub fn from_arrays(chunks: Vec<Array>) -> Result<Self> {
        let Some(first) = chunks.first() else {
            return Err(InterchangeError::UnsupportedOperation(
                "cannot infer a type from zero chunks; use ChunkedArray::try_new".into(),
            ));
        };
        let field = Field::new("", first.data_type().clone(), true);
        Self::try_new(chunks, field)
    }

    /// Single-chunk ChunkedArray.
    pub fn from_array(array: Array) -> Self {
        let field = Field::new("", array.data_type().clone(), true);
        Self {
            chunks: vec![array],
            field,
        }
    }

    /// Zero-chunk ChunkedArray of the field's type.
    pub fn empty(field: Field) -> Self {
        Self {
            chunks: Vec::new(),
            field,
        }
    }

    #[inline]
    pub fn field(&self) -> &Field {
        &self.field
    }

    #[inline]
    pub fn data_type(&self) -> &DataType {
        &self.field.data_type
    }

    /// Replaces the field. Its data type must be unchanged.
    pub fn with_field(self, field: Field) -> Result<Self> {
        Self::try_new(self.chunks, field)
    }

    #[inline]
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn chunks(&self) -> &[Array] {
        &self.chunks
    }

    #[inline]
    pub fn chunk(&self, idx: usize) -> Option<&Array> {
        self.chunks.get(idx)
    }

    pub fn into_chunks(self) -> Vec<Array> {
        self.chunks
    }

    pub fn chunk_lengths(&self) -> Vec<usize> {
        self.chunks.iter().map(Array::len).collect()
    }

    /// Total number of elements across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Array::len).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        self.chunks.iter().map(Array::null_count).sum()
    }

    /// Resolves logical index `i` to `(chunk, index within chunk)`.
    pub fn locate(&self, i: usize) -> Result<(usize, usize)> {
        let mut start = 0;
        for (c, chunk) in self.chunks.iter().enumerate() {
            if i < start + chunk.len() {
                return Ok((c, i - start));
            }
            start += chunk.len();
        }
        Err(InterchangeError::IndexOutOfBounds {
            index: i,
            len: start,
        })
    }

    /// Logical value at index `i`.
    pub fn value_at(&self, i: usize) -> Result<Scalar> {
        let (c, j) = self.locate(i)?;
        Ok(self.chunks[c].to_scalar(j))
    }

    /// All logical values, in order.
    pub fn to_scalars(&self) -> Vec<Scalar> {
        self.chunks.iter().flat_map(Array::to_scalars).collect()
    }

    /// Zero-copy window `[offset, offset + len)` across chunks.
    ///
    /// Chunks outside the window are dropped; boundary chunks are sliced.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        let total = self.len();
        if offset + len > total {
            return Err(InterchangeError::IndexOutOfBounds {
                index: offset + len,
                len: total,
            });
        }
        let mut out = Vec::new();
        let mut start = 0;
        let end = offset + len;
        for chunk in &self.chunks {
            let chunk_end = start + chunk.len();
            if chunk_end > offset && start < end {
                let lo = offset.max(start) - start;
                let hi = end.min(chunk_end) - start;
                out.push(chunk.slice(lo, hi - lo));
            }
            start = chunk_end;
            if start >= end {
                break;
            }
        }
        Ok(Self {
            chunks: out,
            field: self.field.clone(),
        })
    }

    /// Concatenates all chunks into one packed array.
    pub fn combine_chunks(&self) -> Result<Array> {
        match self.chunks.len() {
            0 => Array::new_null_typed(&self.field.data_type, 0),
            1 => Ok(self.chunks[0].clone()),
            _ => concat_arrays(&self.chunks),
        }
    }

    /// Redistributes values into chunks of the strategy's size. The last chunk
    /// holds the remainder.
    ///
    /// # Errors
    /// `UnsupportedOperation` for `Count(0)`.
    pub fn rechunk(&self, strategy: RechunkStrategy) -> Result<Self> {
        let size = strategy.chunk_size()?;
        self.rechunk_to_lengths(&uniform_lengths(self.len(), size))
    }

    /// Redistributes values into chunks of exactly `lengths`.
    ///
    /// A target chunk falling inside one source chunk is a zero-copy slice;
    /// one spanning several is concatenated.
    ///
    /// # Errors
    /// `ColumnLengthMismatch` when `lengths` do not sum to `len()`.
    pub fn rechunk_to_lengths(&self, lengths: &[usize]) -> Result<Self> {
        let total = self.len();
        let wanted: usize = lengths.iter().sum();
        if wanted != total {
            return Err(InterchangeError::ColumnLengthMismatch {
                col: 0,
                expected: total,
                found: wanted,
            });
        }
        let mut out = Vec::with_capacity(lengths.len());
        let mut offset = 0;
        for &n in lengths {
            let window = self.slice(offset, n)?;
            let chunk = match window.chunks.len() {
                0 => Array::new_null_typed(&self.field.data_type, 0)?,
                1 => window.chunks.into_iter().next().ok_or_else(|| {
                    InterchangeError::IndexOutOfBounds { index: offset, len: total }
                })?,
                _ => concat_arrays(&window.chunks)?,
            };
            out.push(chunk);
            offset += n;
        }
        Ok(Self {
            chunks: out,
            field: self.field.clone(),
        })
    }

    /// Casts every chunk to `to`, keeping the field's name, nullability and metadata.
    pub fn cast(&self, to: &DataType) -> Result<Self> {
        let chunks = self
            .chunks
            .iter()
            .map(|c| cast(c, to))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            chunks,
            field: self.field.clone().with_data_type(to.clone()),
        })
    }
}

impl PartialEq for ChunkedArray {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.to_scalars() == other.to_scalars()
    }
}

impl From<Array> for ChunkedArray {
    fn from(array: Array) -> Self {
        Self::from_array(array)
    }
}

impl Display for ChunkedArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "ChunkedArray \"{}\" <{}> [{} rows in {} chunks]",
            self.field.name,
            self.field.data_type,
            self.len(),
            self.chunks.len()
        )?;
        for (i, chunk) in self.chunks.iter().enumerate() {
            writeln!(f, "  chunk {i}: {chunk:?}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChunkedArray {
        ChunkedArray::from_arrays(vec![
            Array::from_slice(&[1i32, 2, 3]),
            Array::from_options(&[Some(4i32), None]),
            Array::from_slice(&[6i32, 7, 8, 9]),
        ])
        .unwrap()
    }

    #[test]
    fn type_checked_construction() {
        let err = ChunkedArray::from_arrays(vec![
            Array::from_slice(&[1i32]),
            Array::from_slice(&[1i64]),
        ])
        .unwrap_err();
        assert!(matches!(err, InterchangeError::TypeMismatch { .. }));
        assert!(ChunkedArray::from_arrays(Vec::new()).is_err());
    }

    #[test]
    fn value_at_walks_chunks() {
        let ca = sample();
        assert_eq!(ca.len(), 9);
        assert_eq!(ca.null_count(), 1);
        assert_eq!(ca.value_at(3).unwrap(), Scalar::Int(4));
        assert_eq!(ca.value_at(4).unwrap(), Scalar::Null);
        assert_eq!(ca.value_at(8).unwrap(), Scalar::Int(9));
        assert!(matches!(
            ca.value_at(9),
            Err(InterchangeError::IndexOutOfBounds { index: 9, len: 9 })
        ));
    }

    #[test]
    fn slice_across_boundaries_is_zero_copy() {
        let ca = sample();
        let s = ca.slice(2, 4).unwrap();
        assert_eq!(s.chunk_lengths(), vec![1, 2, 1]);
        assert!(s.chunks()[0].buffers()[0].shares_storage(&ca.chunks()[0].buffers()[0]));
        assert_eq!(
            s.to_scalars(),
            vec![Scalar::Int(3), Scalar::Int(4), Scalar::Null, Scalar::Int(6)]
        );
    }

    #[test]
    fn rechunk_preserves_values() {
        let ca = sample();
        for size in 1..=10 {
            let r = ca.rechunk(RechunkStrategy::Count(size)).unwrap();
            assert_eq!(r.len(), ca.len());
            assert!(r.chunk_lengths().iter().all(|&n| n <= size));
            assert_eq!(r, ca);
        }
        assert_eq!(ca.rechunk(RechunkStrategy::Auto).unwrap().num_chunks(), 1);
        assert!(ca.rechunk(RechunkStrategy::Count(0)).is_err());
    }

    #[test]
    fn rechunk_to_lengths_requires_exact_total() {
        let ca = sample();
        let r = ca.rechunk_to_lengths(&[4, 0, 5]).unwrap();
        assert_eq!(r.chunk_lengths(), vec![4, 0, 5]);
        assert_eq!(r, ca);
        assert!(ca.rechunk_to_lengths(&[4, 4]).is_err());
    }

    #[test]
    fn cast_and_combine() {
        let ca = sample().cast(&DataType::Int64).unwrap();
        assert_eq!(ca.data_type(), &DataType::Int64);
        let one = ca.combine_chunks().unwrap();
        assert_eq!(one.len(), 9);
        assert_eq!(one.values::<i64>().unwrap()[8], 9);
    }
}
