//! # **Cast Kernel** - *Logical type conversion between array layouts*
//!
//! Converts an [`Array`] to another [`DataType`] while keeping every logical value
//! (and every null) in place. Used by the interchange layer to satisfy a
//! consumer's requested schema, and by [`ChunkedArray::cast`](crate::ChunkedArray::cast).
//!
//! ## Supported conversions
//! - identity, and `Null` to any type (all-null result)
//! - within the string and binary families: `Utf8`, `LargeUtf8`, `Utf8View`,
//!   `Binary`, `LargeBinary`, `BinaryView`, plus `FixedSizeBinary` to binary.
//!   Binary to string validates UTF-8.
//! - numeric to numeric (integers, `Float32`, `Float64`, booleans as 0/1), checked:
//!   a value that does not fit the target is an error rather than a wrap
//! - integer to temporal of the same width and back, timestamp unit rescaling,
//!   timezone relabelling, `Date32` to `Date64` and back
//! - dictionary decode and encode
//! - list / large list / fixed-size list / map / struct with recursive child casts
//!
//! Everything else is rejected with `UnsupportedCast`.

use std::collections::HashMap;

use num_traits::NumCast;

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::Scalar;
use crate::enums::time_units::TimeUnit;
use crate::ffi::arrow_dtype::{DataType, Layout};
use crate::structs::array::{build_variable, build_views, offset_at};
use crate::structs::bitmask::Bitmask;
use crate::traits::concatenate::{compact, concat_arrays};
use crate::traits::type_unions::NativeType;
use crate::{Array, Buffer};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Casts `array` to `to`.
///
/// # Errors
/// - `UnsupportedCast` when no conversion exists, a value does not fit the target
///   type, or binary data is not valid UTF-8.
pub fn cast(array: &Array, to: &DataType) -> Result<Array> {
    let from = array.data_type();
    if from == to {
        return Ok(array.clone());
    }
    let unsupported = || InterchangeError::UnsupportedCast {
        from: from.to_string(),
        to: to.to_string(),
    };
    match (from, to) {
        (DataType::Null, _) => Array::new_null_typed(to, array.len()),
        (DataType::Dictionary(..), DataType::Dictionary(key, value)) => {
            let decoded = decode_dictionary(array)?;
            encode_dictionary(&cast(&decoded, value)?, key)
        }
        (DataType::Dictionary(..), _) => cast(&decode_dictionary(array)?, to),
        (_, DataType::Dictionary(key, value)) => encode_dictionary(&cast(array, value)?, key),
        (f, t) if is_byte_like(f) && is_byte_like(t) => cast_bytes(array, to),
        (f, t) if is_numeric(f) && is_numeric(t) => cast_numeric(array, to),
        (f, t) if is_temporal(f) || is_temporal(t) => cast_temporal(array, to).ok_or_else(unsupported)?,
        (
            DataType::List(_) | DataType::LargeList(_),
            DataType::List(field) | DataType::LargeList(field),
        ) => cast_list(array, to, &field.data_type),
        (DataType::Map(..), DataType::Map(field, _)) => cast_list(array, to, &field.data_type),
        (DataType::FixedSizeList(_, n), DataType::FixedSizeList(field, m)) if n == m => {
            let n = *n as usize;
            let child = array.children()[0].slice(array.offset() * n, array.len() * n);
            let child = cast(&child, &field.data_type)?;
            Array::try_new(to.clone(), array.len(), 0, window_validity(array), Vec::new(), vec![child], None)
        }
        (DataType::FixedSizeList(_, n), DataType::List(field) | DataType::LargeList(field)) => {
            let n = *n as usize;
            let child = array.children()[0].slice(array.offset() * n, array.len() * n);
            let child = cast(&child, &field.data_type)?;
            let offsets: Vec<usize> = (0..=array.len()).map(|i| i * n).collect();
            let large = matches!(to, DataType::LargeList(_));
            Array::try_new(
                to.clone(),
                array.len(),
                0,
                window_validity(array),
                vec![offsets_buffer(&offsets, large)?],
                vec![child],
                None,
            )
        }
        (DataType::Struct(src), DataType::Struct(dst)) if src.len() == dst.len() => {
            let children = array
                .children()
                .iter()
                .zip(dst)
                .map(|(c, f)| cast(&c.slice(array.offset(), array.len()), &f.data_type))
                .collect::<Result<Vec<_>>>()?;
            Array::try_new(to.clone(), array.len(), 0, window_validity(array), Vec::new(), children, None)
        }
        _ => Err(unsupported()),
    }
}

/// True when [`cast`] has a conversion path from `from` to `to`.
///
/// Value-dependent failures (overflow, invalid UTF-8) are not predicted.
pub fn can_cast(from: &DataType, to: &DataType) -> bool {
    if from == to || matches!(from, DataType::Null) {
        return true;
    }
    match (from, to) {
        (DataType::Dictionary(_, v), _) => can_cast(v, to) || matches!(to, DataType::Dictionary(_, tv) if can_cast(v, tv)),
        (_, DataType::Dictionary(_, v)) => can_cast(from, v) && !v.is_nested(),
        (f, t) if is_byte_like(f) && is_byte_like(t) => !matches!(t, DataType::FixedSizeBinary(_)),
        (f, t) if is_numeric(f) && is_numeric(t) => true,
        (f, t) if is_temporal(f) || is_temporal(t) => temporal_path(f, t).is_some(),
        (
            DataType::List(a) | DataType::LargeList(a) | DataType::FixedSizeList(a, _),
            DataType::List(b) | DataType::LargeList(b),
        ) => can_cast(&a.data_type, &b.data_type),
        (DataType::FixedSizeList(a, n), DataType::FixedSizeList(b, m)) => n == m && can_cast(&a.data_type, &b.data_type),
        (DataType::Map(a, _), DataType::Map(b, _)) => can_cast(&a.data_type, &b.data_type),
        (DataType::Struct(a), DataType::Struct(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| can_cast(&x.data_type, &y.data_type))
        }
        _ => false,
    }
}

fn is_byte_like(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Utf8View
            | DataType::Binary
            | DataType::LargeBinary
            | DataType::BinaryView
            | DataType::FixedSizeBinary(_)
    )
}

fn is_numeric(dt: &DataType) -> bool {
    dt.is_integer() || matches!(dt, DataType::Float32 | DataType::Float64 | DataType::Boolean)
}

fn is_temporal(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Date32
            | DataType::Date64
            | DataType::Time32(_)
            | DataType::Time64(_)
            | DataType::Timestamp(..)
            | DataType::Duration(_)
    )
}

/// Validity of the array's window, repacked to start at bit zero.
fn window_validity(array: &Array) -> Option<Bitmask> {
    array
        .validity()
        .filter(|_| array.null_count() > 0)
        .map(|m| m.repack(array.offset(), array.len()))
}

fn offsets_buffer(offsets: &[usize], large: bool) -> Result<Buffer> {
    if large {
        Ok(Buffer::from_iter_typed(offsets.iter().map(|&o| o as i64)))
    } else {
        let small = offsets
            .iter()
            .map(|&o| {
                i32::try_from(o).map_err(|_| {
                    InterchangeError::InvalidOffsets(format!("offset {o} overflows 32-bit offsets"))
                })
            })
            .collect::<Result<Vec<i32>>>()?;
        Ok(Buffer::from_slice(&small))
    }
}

fn cast_bytes(array: &Array, to: &DataType) -> Result<Array> {
    let items: Vec<Option<&[u8]>> = (0..array.len()).map(|i| array.value_bytes(i)).collect();
    if matches!(to, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View) {
        let source_is_text = matches!(
            array.data_type(),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
        );
        if !source_is_text && items.iter().flatten().any(|b| std::str::from_utf8(b).is_err()) {
            return Err(InterchangeError::UnsupportedCast {
                from: array.data_type().to_string(),
                to: format!("{to} (invalid UTF-8 data)"),
            });
        }
    }
    let total: usize = items.iter().flatten().map(|b| b.len()).sum();
    match to {
        DataType::Utf8 | DataType::Binary => {
            if i32::try_from(total).is_err() {
                return Err(InterchangeError::InvalidOffsets(format!(
                    "{total} bytes overflow 32-bit offsets for {to}"
                )));
            }
            build_variable::<i32, _>(to.clone(), items)
        }
        DataType::LargeUtf8 | DataType::LargeBinary => build_variable::<i64, _>(to.clone(), items),
        DataType::Utf8View | DataType::BinaryView => Ok(build_views(to.clone(), items)),
        _ => Err(InterchangeError::UnsupportedCast {
            from: array.data_type().to_string(),
            to: to.to_string(),
        }),
    }
}

fn cast_numeric(array: &Array, to: &DataType) -> Result<Array> {
    match to {
        DataType::Boolean => {
            let mut out = Vec::with_capacity(array.len());
            for i in 0..array.len() {
                out.push(match array.to_scalar(i) {
                    Scalar::Null => false,
                    s => s.as_f64().map(|v| v != 0.0).unwrap_or(false),
                });
            }
            let bits = Bitmask::from_bools(&out);
            Array::try_new(
                DataType::Boolean,
                array.len(),
                0,
                window_validity(array),
                vec![bits.buffer().clone()],
                Vec::new(),
                None,
            )
        }
        DataType::Int8 => convert::<i8>(array, to),
        DataType::Int16 => convert::<i16>(array, to),
        DataType::Int32 => convert::<i32>(array, to),
        DataType::Int64 => convert::<i64>(array, to),
        DataType::UInt8 => convert::<u8>(array, to),
        DataType::UInt16 => convert::<u16>(array, to),
        DataType::UInt32 => convert::<u32>(array, to),
        DataType::UInt64 => convert::<u64>(array, to),
        DataType::Float32 => convert::<f32>(array, to),
        DataType::Float64 => convert::<f64>(array, to),
        _ => Err(InterchangeError::UnsupportedCast {
            from: array.data_type().to_string(),
            to: to.to_string(),
        }),
    }
}

/// Element-wise checked numeric conversion into `T`, stored as `to`.
fn convert<T: NativeType>(array: &Array, to: &DataType) -> Result<Array> {
    let mut out: Vec<T> = Vec::with_capacity(array.len());
    for i in 0..array.len() {
        let converted = match array.to_scalar(i) {
            Scalar::Null => Some(T::default()),
            Scalar::Boolean(b) => <T as NumCast>::from(b as u8),
            Scalar::Int(v) => <T as NumCast>::from(v),
            Scalar::UInt(v) => <T as NumCast>::from(v),
            Scalar::Float(v) => <T as NumCast>::from(v),
            _ => None,
        };
        let value = converted.ok_or_else(|| InterchangeError::UnsupportedCast {
            from: array.data_type().to_string(),
            to: format!("{to} (value at index {i} out of range)"),
        })?;
        out.push(value);
    }
    Array::from_native(to.clone(), &out, window_validity(array))
}

/// Integer rescaling between two temporal representations, as `(multiply, divide)`.
fn temporal_path(from: &DataType, to: &DataType) -> Option<(i64, i64)> {
    use DataType::*;
    let width = |dt: &DataType| match dt.layout() {
        Layout::FixedWidth(w) => Some(w),
        _ => None,
    };
    match (from, to) {
        (Timestamp(a, _), Timestamp(b, _)) | (Duration(a), Duration(b)) => Some(unit_ratio(*a, *b)),
        (Time32(a), Time64(b)) | (Time64(a), Time32(b)) | (Time32(a), Time32(b)) | (Time64(a), Time64(b)) => {
            Some(unit_ratio(*a, *b))
        }
        (Date32, Date64) => Some((MILLIS_PER_DAY, 1)),
        (Date64, Date32) => Some((1, MILLIS_PER_DAY)),
        (Date64, Timestamp(u, _)) => Some(unit_ratio(TimeUnit::Millisecond, *u)),
        (Date32, Timestamp(u, _)) => Some(unit_ratio(TimeUnit::Second, *u)).map(|(m, d)| (m * 86_400, d)),
        (Timestamp(u, _), Date32) => Some(unit_ratio(*u, TimeUnit::Second)).map(|(m, d)| (m, d * 86_400)),
        (f, t) if (f.is_integer() || is_temporal(f)) && (t.is_integer() || is_temporal(t)) => {
            (width(f)? == width(t)?).then_some((1, 1))
        }
        _ => None,
    }
}

fn unit_ratio(from: TimeUnit, to: TimeUnit) -> (i64, i64) {
    let scale = |u: TimeUnit| match u {
        TimeUnit::Second => 1i64,
        TimeUnit::Millisecond => 1_000,
        TimeUnit::Microsecond => 1_000_000,
        TimeUnit::Nanosecond => 1_000_000_000,
    };
    let (a, b) = (scale(from), scale(to));
    if b >= a { (b / a, 1) } else { (1, a / b) }
}

fn cast_temporal(array: &Array, to: &DataType) -> Option<Result<Array>> {
    let (mul, div) = temporal_path(array.data_type(), to)?;
    let mut values = Vec::with_capacity(array.len());
    for i in 0..array.len() {
        let v = match array.to_scalar(i) {
            Scalar::Int(v) => v,
            Scalar::UInt(v) => v as i64,
            _ => 0,
        };
        match v.checked_mul(mul) {
            Some(x) => values.push(x.div_euclid(div)),
            None => {
                return Some(Err(InterchangeError::UnsupportedCast {
                    from: array.data_type().to_string(),
                    to: format!("{to} (value at index {i} overflows)"),
                }));
            }
        }
    }
    let validity = window_validity(array);
    let result = match to.layout() {
        Layout::FixedWidth(4) => {
            let narrowed: Option<Vec<i32>> = values.iter().map(|&v| i32::try_from(v).ok()).collect();
            match narrowed {
                Some(v) if to.is_integer() && !to.is_signed_integer() => {
                    let u: Vec<u32> = v.iter().map(|&x| x as u32).collect();
                    Array::from_native(to.clone(), &u, validity)
                }
                Some(v) => Array::from_native(to.clone(), &v, validity),
                None => Err(InterchangeError::UnsupportedCast {
                    from: array.data_type().to_string(),
                    to: format!("{to} (value overflows 32 bits)"),
                }),
            }
        }
        Layout::FixedWidth(8) if matches!(to, DataType::UInt64) => {
            let u: Vec<u64> = values.iter().map(|&x| x as u64).collect();
            Array::from_native(to.clone(), &u, validity)
        }
        Layout::FixedWidth(8) => Array::from_native(to.clone(), &values, validity),
        _ => return None,
    };
    Some(result)
}

fn cast_list(array: &Array, to: &DataType, child_type: &DataType) -> Result<Array> {
    let packed = compact(array)?;
    let large_in = matches!(packed.data_type().layout(), Layout::List { large: true });
    let offsets: Vec<usize> = (0..=packed.len())
        .map(|p| if packed.buffers()[0].is_empty() { 0 } else { offset_at(&packed.buffers()[0], large_in, p) })
        .collect();
    let child = cast(&packed.children()[0], child_type)?;
    let large_out = matches!(to, DataType::LargeList(_));
    Array::try_new(
        to.clone(),
        packed.len(),
        0,
        packed.validity().cloned(),
        vec![offsets_buffer(&offsets, large_out)?],
        vec![child],
        None,
    )
}

/// Expands a dictionary array into its value type.
pub fn decode_dictionary(array: &Array) -> Result<Array> {
    let dict = array.dictionary_values()?;
    let value_type = dict.data_type().clone();
    if array.is_empty() {
        return compact(&dict.slice(0, 0));
    }
    let mut pieces = Vec::with_capacity(array.len());
    for i in 0..array.len() {
        if array.is_valid(i) {
            pieces.push(dict.slice(array.dictionary_key(i).unwrap_or_default(), 1));
        } else {
            pieces.push(Array::new_null_typed(&value_type, 1)?);
        }
    }
    concat_arrays(&pieces)
}

/// Dictionary-encodes `array` with integer keys of `key_type`.
pub fn encode_dictionary(array: &Array, key_type: &DataType) -> Result<Array> {
    if array.data_type().is_nested() || matches!(array.data_type(), DataType::Null) {
        return Err(InterchangeError::UnsupportedCast {
            from: array.data_type().to_string(),
            to: format!("Dictionary({key_type}, {})", array.data_type()),
        });
    }
    let mut seen: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut first_at: Vec<usize> = Vec::new();
    let mut keys: Vec<Option<usize>> = Vec::with_capacity(array.len());
    for i in 0..array.len() {
        if array.is_null(i) {
            keys.push(None);
            continue;
        }
        let id = element_key(array, i);
        let next = seen.len();
        let k = *seen.entry(id).or_insert_with(|| {
            first_at.push(i);
            next
        });
        keys.push(Some(k));
    }
    let values = if first_at.is_empty() {
        compact(&array.slice(0, 0))?
    } else {
        let pieces: Vec<Array> = first_at.iter().map(|&i| array.slice(i, 1)).collect();
        concat_arrays(&pieces)?
    };
    let validity = array
        .validity()
        .filter(|_| array.null_count() > 0)
        .map(|_| Bitmask::from_fn(keys.len(), |i| keys[i].is_some()));
    let key_array = match key_type {
        DataType::Int8 => keys_of::<i8>(&keys, key_type, validity),
        DataType::Int16 => keys_of::<i16>(&keys, key_type, validity),
        DataType::Int32 => keys_of::<i32>(&keys, key_type, validity),
        DataType::Int64 => keys_of::<i64>(&keys, key_type, validity),
        DataType::UInt8 => keys_of::<u8>(&keys, key_type, validity),
        DataType::UInt16 => keys_of::<u16>(&keys, key_type, validity),
        DataType::UInt32 => keys_of::<u32>(&keys, key_type, validity),
        DataType::UInt64 => keys_of::<u64>(&keys, key_type, validity),
        other => Err(InterchangeError::type_mismatch("integer dictionary key", other.to_string())),
    }?;
    Array::try_new_dictionary(key_array, values)
}

fn keys_of<T: NativeType>(keys: &[Option<usize>], key_type: &DataType, validity: Option<Bitmask>) -> Result<Array> {
    let values = keys
        .iter()
        .map(|k| {
            <T as NumCast>::from(k.unwrap_or(0)).ok_or_else(|| InterchangeError::UnsupportedCast {
                from: format!("{} distinct values", keys.len()),
                to: format!("dictionary keys of {key_type}"),
            })
        })
        .collect::<Result<Vec<T>>>()?;
    Array::from_native(key_type.clone(), &values, validity)
}

/// Byte identity of element `i`, used for dictionary encoding.
fn element_key(array: &Array, i: usize) -> Vec<u8> {
    if let Some(b) = array.value_bytes(i) {
        return b.to_vec();
    }
    match array.data_type().layout() {
        Layout::FixedWidth(w) => {
            let p = array.offset() + i;
            array.buffers()[0].as_slice()[p * w..(p + 1) * w].to_vec()
        }
        _ => vec![matches!(array.to_scalar(i), Scalar::Boolean(true)) as u8],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_to_large_utf8_keeps_values() {
        let a = Array::from_opt_strs(&[Some("a"), None, Some("ccc")]).slice(1, 2);
        let b = cast(&a, &DataType::LargeUtf8).unwrap();
        assert_eq!(b.data_type(), &DataType::LargeUtf8);
        assert!(b.is_null(0));
        assert_eq!(b.value_str(1), Some("ccc"));
        assert_eq!(b.buffers()[0].typed::<i64>(), &[0, 0, 3]);
    }

    #[test]
    fn numeric_cast_is_checked() {
        let a = Array::from_slice(&[1i64, 300]);
        assert!(matches!(
            cast(&a, &DataType::Int8),
            Err(InterchangeError::UnsupportedCast { .. })
        ));
        let b = cast(&a, &DataType::Float64).unwrap();
        assert_eq!(b.values::<f64>().unwrap(), &[1.0, 300.0]);
    }

    #[test]
    fn unsupported_pairs() {
        let a = Array::from_strs(&["x"]);
        let err = cast(&a, &DataType::Int32).unwrap_err();
        assert!(matches!(err, InterchangeError::UnsupportedCast { .. }));
        assert!(!can_cast(&DataType::Utf8, &DataType::Int32));
        assert!(can_cast(&DataType::Utf8, &DataType::LargeUtf8));
    }

    #[test]
    fn dictionary_round_trip() {
        let a = Array::from_opt_strs(&[Some("x"), Some("y"), None, Some("x")]);
        let dt = DataType::dictionary(DataType::Int32, DataType::Utf8).unwrap();
        let d = cast(&a, &dt).unwrap();
        assert_eq!(d.dictionary().unwrap().len(), 2);
        assert_eq!(d.dictionary_indices().unwrap().values::<i32>().unwrap()[3], 0);
        let back = cast(&d, &DataType::Utf8).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn timestamp_rescale_and_relabel() {
        let a = Array::from_native(DataType::Timestamp(TimeUnit::Second, None), &[1i64, 2], None).unwrap();
        let b = cast(&a, &DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))).unwrap();
        assert_eq!(b.values::<i64>().unwrap(), &[1000, 2000]);
        let d = Array::from_native(DataType::Date32, &[1i32], None).unwrap();
        assert_eq!(cast(&d, &DataType::Date64).unwrap().values::<i64>().unwrap(), &[MILLIS_PER_DAY]);
    }

    #[test]
    fn list_to_large_list_with_child_cast() {
        let offsets = Array::from_slice(&[0i32, 1, 3]);
        let values = Array::from_strs(&["a", "b", "c"]);
        let list = crate::list_array(&offsets, &values, None, None).unwrap();
        let out = cast(&list, &DataType::large_list(DataType::LargeUtf8)).unwrap();
        assert_eq!(out.list_offsets(false).unwrap().values::<i64>().unwrap(), &[0, 1, 3]);
        assert_eq!(out.list_flatten().unwrap().value_str(2), Some("c"));
    }
}
