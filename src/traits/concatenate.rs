//! # Concatenate Trait Module
//!
//! Uniform vertical concatenation of arrays and record batches.
//!
//! ## Overview
//! - **Arrays**: every layout, nested children included. Dictionaries are merged
//!   and their indices shifted, unless all inputs share one dictionary.
//! - **Record batches**: column-wise, after checking the schemas agree.
//!
//! The output is always freshly packed: offset zero, buffers sized exactly to the
//! data, offsets rebased to start at zero. [`compact`] relies on this to turn any
//! slice into a self-contained array for the codecs.
//!
//! ## Example
//! ```rust
//! # use minarrow_interchange::{Array, Concatenate};
//! let a = Array::from_slice(&[1i32, 2, 3]);
//! let b = Array::from_slice(&[4i32, 5, 6]);
//! let result = a.concat(b).unwrap();
//! assert_eq!(result.values::<i32>().unwrap(), &[1, 2, 3, 4, 5, 6]);
//! ```

use crate::enums::error::{InterchangeError, Result};
use crate::ffi::arrow_dtype::{DataType, Layout};
use crate::structs::array::{build_views, offset_at};
use crate::structs::bitmask::{Bitmask, get_bit, set_bit};
use crate::{Array, Buffer, RecordBatch};

/// Concatenate trait for combining two instances of the same type.
///
/// Both inputs are consumed. Types must match exactly.
pub trait Concatenate {
    /// Appends `other` after `self`.
    fn concat(self, other: Self) -> Result<Self>
    where
        Self: Sized;
}

impl Concatenate for Array {
    fn concat(self, other: Self) -> Result<Self> {
        concat_arrays(&[self, other])
    }
}

impl Concatenate for RecordBatch {
    fn concat(self, other: Self) -> Result<Self> {
        RecordBatch::concat_batches(&[self, other])
    }
}

/// Returns a packed copy of `array` with offset zero and no data outside its window.
pub fn compact(array: &Array) -> Result<Array> {
    concat_arrays(std::slice::from_ref(array))
}

/// Concatenates `arrays` into one freshly packed array.
///
/// # Errors
/// - `TypeMismatch` when the arrays do not share one data type, or when the
///   input is empty (there is no type to produce).
pub fn concat_arrays(arrays: &[Array]) -> Result<Array> {
    let Some(first) = arrays.first() else {
        return Err(InterchangeError::type_mismatch("at least one array", "none"));
    };
    let data_type = first.data_type().clone();
    for a in &arrays[1..] {
        if *a.data_type() != data_type {
            return Err(InterchangeError::TypeMismatch {
                expected: data_type.to_string(),
                found: a.data_type().to_string(),
                context: Some("concat".into()),
            });
        }
    }
    let total: usize = arrays.iter().map(Array::len).sum();
    if matches!(data_type, DataType::Null) {
        return Ok(Array::new_null(total));
    }
    let validity = concat_validity(arrays, total);

    let array = match data_type.layout() {
        Layout::Null => Array::new_null(total),
        Layout::Bitmap => {
            let mut bits = vec![0u8; total.div_ceil(8)];
            let mut pos = 0;
            for a in arrays {
                let src = a.buffers()[0].as_slice();
                for i in 0..a.len() {
                    if get_bit(src, a.offset() + i) {
                        set_bit(&mut bits, pos, true);
                    }
                    pos += 1;
                }
            }
            Array::new_unchecked(data_type, total, validity, vec![Buffer::from(bits)], Vec::new(), None)
        }
        Layout::FixedWidth(w) => {
            let mut out = Vec::with_capacity(total * w);
            for a in arrays {
                out.extend_from_slice(window_bytes(a, w));
            }
            Array::new_unchecked(data_type, total, validity, vec![Buffer::from(out)], Vec::new(), None)
        }
        Layout::Variable { large } => {
            let mut offsets: Vec<u8> = Vec::with_capacity((total + 1) * if large { 8 } else { 4 });
            let mut values: Vec<u8> = Vec::new();
            push_offset(&mut offsets, large, 0)?;
            for a in arrays {
                if a.is_empty() {
                    continue;
                }
                let start = offset_at(&a.buffers()[0], large, a.offset());
                let end = offset_at(&a.buffers()[0], large, a.offset() + a.len());
                let base = values.len();
                for p in a.offset() + 1..=a.offset() + a.len() {
                    push_offset(&mut offsets, large, base + offset_at(&a.buffers()[0], large, p) - start)?;
                }
                values.extend_from_slice(&a.buffers()[1].as_slice()[start..end]);
            }
            Array::new_unchecked(
                data_type,
                total,
                validity,
                vec![Buffer::from(offsets), Buffer::from(values)],
                Vec::new(),
                None,
            )
        }
        Layout::View => {
            let items = arrays
                .iter()
                .flat_map(|a| (0..a.len()).map(move |i| a.value_bytes(i)));
            build_views(data_type, items)
        }
        Layout::List { large } => {
            let mut offsets: Vec<u8> = Vec::new();
            let mut child_windows = Vec::with_capacity(arrays.len());
            let mut base = 0usize;
            push_offset(&mut offsets, large, 0)?;
            for a in arrays {
                if a.is_empty() {
                    continue;
                }
                let start = offset_at(&a.buffers()[0], large, a.offset());
                let end = offset_at(&a.buffers()[0], large, a.offset() + a.len());
                for p in a.offset() + 1..=a.offset() + a.len() {
                    push_offset(&mut offsets, large, base + offset_at(&a.buffers()[0], large, p) - start)?;
                }
                child_windows.push(a.children()[0].slice(start, end - start));
                base += end - start;
            }
            let child = concat_children(&child_windows, &first.children()[0])?;
            Array::new_unchecked(data_type, total, validity, vec![Buffer::from(offsets)], vec![child], None)
        }
        Layout::FixedSizeList(n) => {
            let windows: Vec<Array> = arrays
                .iter()
                .map(|a| a.children()[0].slice(a.offset() * n, a.len() * n))
                .collect();
            let child = concat_children(&windows, &first.children()[0])?;
            Array::new_unchecked(data_type, total, validity, Vec::new(), vec![child], None)
        }
        Layout::Struct => {
            let mut children = Vec::with_capacity(first.children().len());
            for (i, template) in first.children().iter().enumerate() {
                let windows: Vec<Array> = arrays
                    .iter()
                    .map(|a| a.children()[i].slice(a.offset(), a.len()))
                    .collect();
                children.push(concat_children(&windows, template)?);
            }
            Array::new_unchecked(data_type, total, validity, Vec::new(), children, None)
        }
        Layout::Dictionary(w) => concat_dictionaries(arrays, data_type, total, validity, w)?,
    };
    Ok(array)
}

/// Concatenates child windows, falling back to an empty packed child.
fn concat_children(windows: &[Array], template: &Array) -> Result<Array> {
    if windows.is_empty() {
        return compact(&template.slice(0, 0));
    }
    concat_arrays(windows)
}

fn concat_validity(arrays: &[Array], total: usize) -> Option<Bitmask> {
    if arrays.iter().all(|a| a.null_count() == 0) {
        return None;
    }
    let mut bits = vec![0u8; total.div_ceil(8)];
    let mut pos = 0;
    for a in arrays {
        for i in 0..a.len() {
            if a.is_valid(i) {
                set_bit(&mut bits, pos, true);
            }
            pos += 1;
        }
    }
    Some(Bitmask::new(Buffer::from(bits), total))
}

fn window_bytes(a: &Array, w: usize) -> &[u8] {
    &a.buffers()[0].as_slice()[a.offset() * w..(a.offset() + a.len()) * w]
}

fn push_offset(out: &mut Vec<u8>, large: bool, value: usize) -> Result<()> {
    if large {
        out.extend_from_slice(&(value as i64).to_le_bytes());
    } else {
        let v = i32::try_from(value).map_err(|_| {
            InterchangeError::InvalidOffsets(format!(
                "offset {value} overflows 32-bit offsets; use a large type"
            ))
        })?;
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(())
}

fn same_dictionary(a: &Array, b: &Array) -> bool {
    match (a.dictionary(), b.dictionary()) {
        (Some(x), Some(y)) => {
            x.offset() == y.offset()
                && x.len() == y.len()
                && x.buffers().len() == y.buffers().len()
                && x
                    .buffers()
                    .iter()
                    .zip(y.buffers())
                    .all(|(p, q)| p.shares_storage(q) && p.storage_offset() == q.storage_offset())
        }
        _ => false,
    }
}

fn concat_dictionaries(
    arrays: &[Array],
    data_type: DataType,
    total: usize,
    validity: Option<Bitmask>,
    width: usize,
) -> Result<Array> {
    let DataType::Dictionary(key_type, _) = &data_type else {
        unreachable!("dictionary layout on non-dictionary type")
    };
    let shared = arrays.iter().all(|a| same_dictionary(a, &arrays[0]));
    let dicts: Vec<Array> = if shared {
        arrays[0].dictionary().cloned().into_iter().collect()
    } else {
        arrays.iter().filter_map(|a| a.dictionary().cloned()).collect()
    };
    let mut shifts = Vec::with_capacity(arrays.len());
    let mut acc = 0usize;
    for (i, _) in arrays.iter().enumerate() {
        shifts.push(if shared { 0 } else { acc });
        if !shared {
            acc += dicts[i].len();
        }
    }
    let dictionary = concat_arrays(&dicts)?;
    let max_key = key_max(key_type);
    if dictionary.len() > 0 && (dictionary.len() - 1) as u64 > max_key {
        return Err(InterchangeError::UnsupportedOperation(format!(
            "merged dictionary of {} values overflows key type {key_type}",
            dictionary.len()
        )));
    }
    let mut out = Vec::with_capacity(total * width);
    for (a, shift) in arrays.iter().zip(shifts) {
        for i in 0..a.len() {
            let key = if a.is_valid(i) { a.dictionary_key(i).unwrap_or_default() + shift } else { 0 };
            out.extend_from_slice(&(key as u64).to_le_bytes()[..width]);
        }
    }
    Ok(Array::new_unchecked(
        data_type,
        total,
        validity,
        vec![Buffer::from(out)],
        Vec::new(),
        Some(dictionary),
    ))
}

fn key_max(key_type: &DataType) -> u64 {
    match key_type {
        DataType::Int8 => i8::MAX as u64,
        DataType::Int16 => i16::MAX as u64,
        DataType::Int32 => i32::MAX as u64,
        DataType::Int64 => i64::MAX as u64,
        DataType::UInt8 => u8::MAX as u64,
        DataType::UInt16 => u16::MAX as u64,
        DataType::UInt32 => u32::MAX as u64,
        _ => u64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list_array;
    use crate::enums::scalar::Scalar;

    #[test]
    fn concat_sliced_strings_rebases_offsets() {
        let a = Array::from_opt_strs(&[Some("aa"), Some("b"), None]).slice(1, 2);
        let b = Array::from_strs(&["ccc"]);
        let c = a.concat(b).unwrap();
        assert_eq!(c.offset(), 0);
        assert_eq!(c.value_str(0), Some("b"));
        assert!(c.is_null(1));
        assert_eq!(c.value_str(2), Some("ccc"));
        assert_eq!(c.buffers()[0].typed::<i32>(), &[0, 1, 1, 4]);
    }

    #[test]
    fn compact_packs_list_children() {
        let offsets = Array::from_slice(&[0i32, 2, 3, 5]);
        let values = Array::from_slice(&[1i64, 2, 3, 4, 5]);
        let list = list_array(&offsets, &values, None, None).unwrap().slice(1, 2);
        let packed = compact(&list).unwrap();
        assert_eq!(packed.children()[0].len(), 3);
        assert_eq!(packed.list_offsets(false).unwrap().values::<i32>().unwrap(), &[0, 1, 3]);
        assert_eq!(packed, list);
    }

    #[test]
    fn dictionaries_merge_and_shift() {
        let d1 = Array::try_new_dictionary(Array::from_slice(&[0i32, 1]), Array::from_strs(&["a", "b"])).unwrap();
        let d2 = Array::try_new_dictionary(Array::from_slice(&[0i32]), Array::from_strs(&["z"])).unwrap();
        let m = d1.concat(d2).unwrap();
        assert_eq!(m.dictionary().unwrap().len(), 3);
        assert_eq!(m.to_scalar(2), Scalar::Utf8("z".into()));
    }

    #[test]
    fn mismatched_types_fail() {
        let err = Array::from_slice(&[1i32]).concat(Array::from_slice(&[1i64])).unwrap_err();
        assert!(matches!(err, InterchangeError::TypeMismatch { .. }));
    }
}
