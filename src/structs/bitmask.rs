//! # **Bitmask Module** - *Packed validity / boolean bits*
//!
//! Arrow-compatible, packed bitmask over a shared [`Buffer`].
//!
//! ## Purpose
//! - Validity (null) masks for all array types (1 = valid, 0 = null).
//! - Backing storage for `Boolean` values.
//!
//! ## Behaviour
//! - LSB corresponds to the first physical element.
//! - Immutable once built. Arrays apply their own logical offset when reading bits,
//!   so slicing an array never touches its mask.
//! - Trailing padding bits are always masked off when packing.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::Buffer;

/// Number of bytes required to hold `bits` bits.
#[inline]
pub fn bytes_for(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Reads bit `i` of a packed LSB-first byte slice.
#[inline]
pub fn get_bit(bytes: &[u8], i: usize) -> bool {
    (bytes[i >> 3] >> (i & 7)) & 1 != 0
}

/// Sets bit `i` of a packed LSB-first byte slice.
#[inline]
pub fn set_bit(bytes: &mut [u8], i: usize, value: bool) {
    if value {
        bytes[i >> 3] |= 1 << (i & 7);
    } else {
        bytes[i >> 3] &= !(1 << (i & 7));
    }
}

/// # Bitmask
///
/// Packed bitmask backed by a shared buffer.
///
/// # Example
/// ```rust
/// use minarrow_interchange::Bitmask;
///
/// let m = Bitmask::from_bools(&[true, false, true]);
/// assert!(m.get(0) && !m.get(1));
/// assert_eq!(m.count_unset(0, 3), 1);
/// ```
#[derive(Clone, PartialEq, Default)]
pub struct Bitmask {
    bits: Buffer,
    len: usize,
}

impl Bitmask {
    /// Wraps an existing packed buffer holding at least `len` bits.
    ///
    /// # Panics
    /// Panics if the buffer is too short.
    pub fn new(bits: Buffer, len: usize) -> Self {
        assert!(
            bits.len() >= bytes_for(len),
            "Bitmask buffer holds {} bytes, {} bits need {}",
            bits.len(),
            len,
            bytes_for(len)
        );
        Self { bits, len }
    }

    /// Create a mask of `len` bits, all set if `set` else cleared.
    pub fn new_set_all(len: usize, set: bool) -> Self {
        let fill = if set { 0xFF } else { 0 };
        let mut data = vec![fill; bytes_for(len)];
        mask_trailing_bits(&mut data, len);
        Self {
            bits: Buffer::from(data),
            len,
        }
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        Self::from_fn(bits.len(), |i| bits[i])
    }

    /// Build a mask from a predicate over positions.
    pub fn from_fn(len: usize, mut f: impl FnMut(usize) -> bool) -> Self {
        let mut data = vec![0u8; bytes_for(len)];
        for i in 0..len {
            if f(i) {
                set_bit(&mut data, i, true);
            }
        }
        Self {
            bits: Buffer::from(data),
            len,
        }
    }

    /// Physical number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns physical bit `i`.
    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len, "bit {i} out of range {}", self.len);
        get_bit(self.bits.as_slice(), i)
    }

    /// Borrows the backing buffer.
    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.bits
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_slice()
    }

    /// Number of cleared bits in `[offset, offset + len)`.
    pub fn count_unset(&self, offset: usize, len: usize) -> usize {
        len - self.count_set(offset, len)
    }

    /// Number of set bits in `[offset, offset + len)`.
    pub fn count_set(&self, offset: usize, len: usize) -> usize {
        let bytes = self.bits.as_slice();
        let end = offset + len;
        let mut i = offset;
        let mut count = 0usize;
        // Leading bits until byte aligned.
        while i < end && i & 7 != 0 {
            count += get_bit(bytes, i) as usize;
            i += 1;
        }
        while i + 8 <= end {
            count += bytes[i >> 3].count_ones() as usize;
            i += 8;
        }
        while i < end {
            count += get_bit(bytes, i) as usize;
            i += 1;
        }
        count
    }

    /// Copies bits `[offset, offset + len)` into a fresh mask starting at bit 0.
    pub fn repack(&self, offset: usize, len: usize) -> Self {
        if offset == 0 && len == self.len {
            return self.clone();
        }
        let src = self.bits.as_slice();
        Self::from_fn(len, |i| get_bit(src, offset + i))
    }

    /// Bitwise AND of two windows, each read from its own offset.
    pub fn and_windows(a: &Bitmask, a_off: usize, b: &Bitmask, b_off: usize, len: usize) -> Self {
        Self::from_fn(len, |i| a.get(a_off + i) && b.get(b_off + i))
    }

    /// Iterator over physical bits `[offset, offset + len)`.
    pub fn iter_window(&self, offset: usize, len: usize) -> impl Iterator<Item = bool> + '_ {
        let bytes = self.bits.as_slice();
        (offset..offset + len).map(move |i| get_bit(bytes, i))
    }
}

/// Ensures all unused bits above `len` are zeroed, per Arrow spec.
fn mask_trailing_bits(data: &mut [u8], len: usize) {
    if len & 7 == 0 || data.is_empty() {
        return;
    }
    let last = data.len() - 1;
    data[last] &= (1u8 << (len & 7)) - 1;
}

impl Debug for Bitmask {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Bitmask(len={}, ", self.len)?;
        for i in 0..self.len.min(64) {
            f.write_str(if self.get(i) { "1" } else { "0" })?;
        }
        if self.len > 64 {
            f.write_str("…")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_all_masks_trailing_bits() {
        let m = Bitmask::new_set_all(10, true);
        assert_eq!(m.as_bytes(), &[0xFF, 0b11]);
        assert_eq!(m.count_set(0, 10), 10);
    }

    #[test]
    fn count_over_unaligned_window() {
        let bools: Vec<bool> = (0..37).map(|i| i % 3 != 0).collect();
        let m = Bitmask::from_bools(&bools);
        let expected = bools[5..30].iter().filter(|b| !**b).count();
        assert_eq!(m.count_unset(5, 25), expected);
    }

    #[test]
    fn repack_shifts_window_to_zero() {
        let m = Bitmask::from_bools(&[false, false, true, false, true]);
        let r = m.repack(2, 3);
        assert_eq!(r.len(), 3);
        assert!(r.get(0) && !r.get(1) && r.get(2));
    }

    #[test]
    fn and_windows_combines() {
        let a = Bitmask::from_bools(&[true, true, false, true]);
        let b = Bitmask::from_bools(&[false, true, true, true]);
        let c = Bitmask::and_windows(&a, 1, &b, 0, 3);
        assert_eq!(c.iter_window(0, 3).collect::<Vec<_>>(), vec![false, false, true]);
    }
}
