//! # **Builders** - *Nested array constructors*
//!
//! Free functions assembling list, fixed-size list, struct and map arrays from
//! existing arrays without copying child data.
//!
//! All builders accept an optional boolean `mask` of the output length, where
//! `true` marks a null slot. A null mask entry is also treated as null.
//! Masked slots keep their underlying data (e.g. a list's offset range) but
//! report null.

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::Scalar;
use crate::ffi::arrow_dtype::DataType;
use crate::kernels::cast::cast;
use crate::structs::bitmask::{Bitmask, get_bit};
use crate::{Array, Buffer, Field};

/// Validity bitmask from a boolean null mask of length `len`.
fn validity_from_mask(mask: Option<&Array>, len: usize) -> Result<Option<Bitmask>> {
    let Some(mask) = mask else {
        return Ok(None);
    };
    if *mask.data_type() != DataType::Boolean {
        return Err(InterchangeError::TypeMismatch {
            expected: DataType::Boolean.to_string(),
            found: mask.data_type().to_string(),
            context: Some("mask".into()),
        });
    }
    if mask.len() != len {
        return Err(InterchangeError::ColumnLengthMismatch {
            col: 0,
            expected: len,
            found: mask.len(),
        });
    }
    let bits = mask.buffers()[0].as_slice();
    let offset = mask.offset();
    Ok(Some(Bitmask::from_fn(len, |i| {
        mask.is_valid(i) && !get_bit(bits, offset + i)
    })))
}

/// Resolves the item field, checking an override against the values' type.
fn item_field(values: &Array, item: Option<Field>) -> Result<Field> {
    match item {
        None => Ok(Field::new("item", values.data_type().clone(), true)),
        Some(field) if field.data_type == *values.data_type() => Ok(field),
        Some(field) => Err(InterchangeError::TypeMismatch {
            expected: field.data_type.to_string(),
            found: values.data_type().to_string(),
            context: Some(format!("list item field '{}'", field.name)),
        }),
    }
}

/// Builds a `List` (Int32 offsets) or `LargeList` (Int64 offsets) array.
///
/// # Errors
/// - `InvalidOffsets` when `offsets` is empty, contains nulls, decreases, starts
///   below zero or ends beyond `values`.
/// - `TypeMismatch` for non-integer offsets or an item field of the wrong type.
///
/// # Example
/// ```rust
/// use minarrow_interchange::{Array, list_array};
///
/// let offsets = Array::from_slice(&[0i32, 2, 3]);
/// let values = Array::from_slice(&[1i64, 2, 3]);
/// let list = list_array(&offsets, &values, None, None).unwrap();
/// assert_eq!(list.len(), 2);
/// ```
pub fn list_array(
    offsets: &Array,
    values: &Array,
    item: Option<Field>,
    mask: Option<&Array>,
) -> Result<Array> {
    let field = Box::new(item_field(values, item)?);
    check_offsets_array(offsets)?;
    let n = offsets.len() - 1;
    let (data_type, buffer) = match offsets.data_type() {
        DataType::Int32 => (DataType::List(field), Buffer::from_slice(offsets.values::<i32>()?)),
        DataType::Int64 => (DataType::LargeList(field), Buffer::from_slice(offsets.values::<i64>()?)),
        other => {
            return Err(InterchangeError::TypeMismatch {
                expected: "Int32 or Int64 offsets".into(),
                found: other.to_string(),
                context: Some("list_array".into()),
            });
        }
    };
    Array::try_new(
        data_type,
        n,
        0,
        validity_from_mask(mask, n)?,
        vec![buffer],
        vec![values.clone()],
        None,
    )
}

fn check_offsets_array(offsets: &Array) -> Result<()> {
    if offsets.is_empty() {
        return Err(InterchangeError::InvalidOffsets(
            "offsets must hold at least one entry".into(),
        ));
    }
    if offsets.null_count() > 0 {
        return Err(InterchangeError::InvalidOffsets(
            "offsets must not contain nulls".into(),
        ));
    }
    Ok(())
}

/// Builds a `FixedSizeList` array of `len(values) / list_size` slots.
///
/// # Errors
/// - `TypeMismatch` when `list_size` is not positive or does not divide `len(values)`,
///   or when the item field disagrees with the values' type.
pub fn fixed_size_list_array(
    values: &Array,
    list_size: i32,
    item: Option<Field>,
    mask: Option<&Array>,
) -> Result<Array> {
    if list_size <= 0 || values.len() % list_size as usize != 0 {
        return Err(InterchangeError::TypeMismatch {
            expected: format!("values length divisible by list size {list_size}"),
            found: format!("length {}", values.len()),
            context: Some("fixed_size_list_array".into()),
        });
    }
    let n = values.len() / list_size as usize;
    let field = Box::new(item_field(values, item)?);
    Array::try_new(
        DataType::FixedSizeList(field, list_size),
        n,
        0,
        validity_from_mask(mask, n)?,
        Vec::new(),
        vec![values.clone()],
        None,
    )
}

/// Builds a `Struct` array from equal-length children and their fields.
///
/// # Errors
/// - `FieldCountMismatch` when the field and child counts differ.
/// - `ColumnLengthMismatch` when children differ in length.
/// - `TypeMismatch` when a field's type differs from its child's.
pub fn struct_array(children: &[Array], fields: &[Field], mask: Option<&Array>) -> Result<Array> {
    if children.len() != fields.len() {
        return Err(InterchangeError::FieldCountMismatch {
            expected: fields.len(),
            found: children.len(),
        });
    }
    let len = children.first().map(Array::len).unwrap_or(0);
    for (col, (child, field)) in children.iter().zip(fields).enumerate() {
        if child.len() != len {
            return Err(InterchangeError::ColumnLengthMismatch {
                col,
                expected: len,
                found: child.len(),
            });
        }
        if child.data_type() != &field.data_type {
            return Err(InterchangeError::TypeMismatch {
                expected: field.data_type.to_string(),
                found: child.data_type().to_string(),
                context: Some(format!("struct field '{}'", field.name)),
            });
        }
    }
    Array::try_new(
        DataType::Struct(fields.to_vec()),
        len,
        0,
        validity_from_mask(mask, len)?,
        Vec::new(),
        children.to_vec(),
        None,
    )
}

/// Builds a `Map` array: Int32 `offsets` over parallel `keys` and `items`.
///
/// Keys must not contain nulls.
pub fn map_array(
    offsets: &Array,
    keys: &Array,
    items: &Array,
    keys_sorted: bool,
    mask: Option<&Array>,
) -> Result<Array> {
    if keys.null_count() > 0 {
        return Err(InterchangeError::TypeMismatch {
            expected: "non-null map keys".into(),
            found: format!("{} null keys", keys.null_count()),
            context: Some("map_array".into()),
        });
    }
    if *offsets.data_type() != DataType::Int32 {
        return Err(InterchangeError::TypeMismatch {
            expected: DataType::Int32.to_string(),
            found: offsets.data_type().to_string(),
            context: Some("map offsets".into()),
        });
    }
    let fields = vec![
        Field::new("key", keys.data_type().clone(), false),
        Field::new("value", items.data_type().clone(), true),
    ];
    let entries = struct_array(&[keys.clone(), items.clone()], &fields, None)?;
    check_offsets_array(offsets)?;
    let n = offsets.len() - 1;
    let entries_field = Field::new("entries", entries.data_type().clone(), false);
    Array::try_new(
        DataType::Map(Box::new(entries_field), keys_sorted),
        n,
        0,
        validity_from_mask(mask, n)?,
        vec![Buffer::from_slice(offsets.values::<i32>()?)],
        vec![entries],
        None,
    )
}

/// Builds an array of `data_type` from logical values, the inverse of
/// [`Array::to_scalars`]. Used by the text codecs, which parse row by row.
///
/// Integers may be given as `Int` or `UInt` and are range-checked. Temporal
/// types take their raw `Int` value. Decimals take little-endian two's
/// complement bytes no wider than the type, sign-extended to it. Lists
/// (including maps and fixed-size lists) take `List`, structs take `Struct`
/// with one entry per field. Dictionary types are built from their value type
/// and then encoded.
///
/// # Errors
/// - `TypeMismatch` when a value does not fit the type, naming its index.
/// - `UnsupportedOperation` for `Float16`, which has no native builder.
///
/// # Example
/// ```rust
/// use minarrow_interchange::{DataType, Scalar, array_from_scalars};
///
/// let values = [Scalar::Int(3), Scalar::Null, Scalar::UInt(7)];
/// let array = array_from_scalars(&DataType::Int16, &values).unwrap();
/// assert_eq!(array.to_scalars(), vec![Scalar::Int(3), Scalar::Null, Scalar::Int(7)]);
/// ```
pub fn array_from_scalars(data_type: &DataType, values: &[Scalar]) -> Result<Array> {
    let mismatch = |i: usize, value: &Scalar| InterchangeError::TypeMismatch {
        expected: data_type.to_string(),
        found: value.to_string(),
        context: Some(format!("value {i}")),
    };
    let validity = || Bitmask::from_fn(values.len(), |i| !values[i].is_null());
    match data_type {
        DataType::Null => {
            if let Some((i, v)) = values.iter().enumerate().find(|(_, v)| !v.is_null()) {
                return Err(mismatch(i, v));
            }
            Ok(Array::new_null(values.len()))
        }
        DataType::Boolean => {
            let bools = values
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Scalar::Null => Ok(None),
                    Scalar::Boolean(b) => Ok(Some(*b)),
                    other => Err(mismatch(i, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Array::from_opt_bools(&bools))
        }
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let ints = values
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Scalar::Null => Ok(None),
                    other => other.as_i64().map(Some).ok_or_else(|| mismatch(i, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            cast(&Array::from_options(&ints), data_type)
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let ints = values
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Scalar::Null => Ok(None),
                    Scalar::UInt(u) => Ok(Some(*u)),
                    Scalar::Int(n) => u64::try_from(*n).map(Some).map_err(|_| mismatch(i, v)),
                    other => Err(mismatch(i, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            cast(&Array::from_options(&ints), data_type)
        }
        DataType::Float32 | DataType::Float64 => {
            let floats = values
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Scalar::Null => Ok(None),
                    other => other.as_f64().map(Some).ok_or_else(|| mismatch(i, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            cast(&Array::from_options(&floats), data_type)
        }
        DataType::Float16 => Err(InterchangeError::UnsupportedOperation(
            "building Float16 arrays from values".into(),
        )),
        DataType::Date32 | DataType::Time32(_) => {
            let raw = raw_integers(values, |i, v| mismatch(i, v))?
                .into_iter()
                .enumerate()
                .map(|(i, v)| i32::try_from(v).map_err(|_| mismatch(i, &values[i])))
                .collect::<Result<Vec<i32>>>()?;
            Array::from_native(data_type.clone(), &raw, Some(validity()))
        }
        DataType::Date64 | DataType::Time64(_) | DataType::Timestamp(..) | DataType::Duration(_) => {
            let raw = raw_integers(values, |i, v| mismatch(i, v))?;
            Array::from_native(data_type.clone(), &raw, Some(validity()))
        }
        DataType::Decimal32(..)
        | DataType::Decimal64(..)
        | DataType::Decimal128(..)
        | DataType::Decimal256(..)
        | DataType::FixedSizeBinary(_) => {
            let (width, binary) = match data_type {
                DataType::Decimal32(..) => (4, false),
                DataType::Decimal64(..) => (8, false),
                DataType::Decimal128(..) => (16, false),
                DataType::Decimal256(..) => (32, false),
                DataType::FixedSizeBinary(w) => (*w as usize, true),
                _ => unreachable!("matched above"),
            };
            let mut bytes = Vec::with_capacity(values.len() * width);
            for (i, v) in values.iter().enumerate() {
                match v {
                    Scalar::Null => bytes.resize(bytes.len() + width, 0),
                    Scalar::Decimal(le) if !binary && le.len() <= width => {
                        let fill = if le.last().is_some_and(|b| b & 0x80 != 0) { 0xFF } else { 0 };
                        bytes.extend_from_slice(le);
                        bytes.resize(bytes.len() + width - le.len(), fill);
                    }
                    Scalar::Binary(b) if binary && b.len() == width => bytes.extend_from_slice(b),
                    other => return Err(mismatch(i, other)),
                }
            }
            Array::try_new(
                data_type.clone(),
                values.len(),
                0,
                Some(validity()),
                vec![Buffer::from(bytes)],
                Vec::new(),
                None,
            )
        }
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let strs = values
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Scalar::Null => Ok(None),
                    Scalar::Utf8(s) => Ok(Some(s.as_str())),
                    other => Err(mismatch(i, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            match data_type {
                DataType::Utf8View => Ok(Array::from_str_views(&strs)),
                _ => cast(&Array::try_from_opt_strs(&strs)?, data_type),
            }
        }
        DataType::Binary | DataType::LargeBinary | DataType::BinaryView => {
            let bins = values
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Scalar::Null => Ok(None),
                    Scalar::Binary(b) => Ok(Some(b.as_slice())),
                    other => Err(mismatch(i, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            match data_type {
                DataType::BinaryView => Ok(Array::from_binary_views(&bins)),
                _ => cast(&Array::try_from_opt_binary(&bins)?, data_type),
            }
        }
        DataType::List(field) | DataType::LargeList(field) | DataType::Map(field, _) => {
            let mut offsets = Vec::with_capacity(values.len() + 1);
            let mut items = Vec::new();
            offsets.push(0usize);
            for (i, v) in values.iter().enumerate() {
                match v {
                    Scalar::Null => {}
                    Scalar::List(entries) => items.extend(entries.iter().cloned()),
                    other => return Err(mismatch(i, other)),
                }
                offsets.push(items.len());
            }
            let child = array_from_scalars(&field.data_type, &items)?;
            let offsets = if matches!(data_type, DataType::LargeList(_)) {
                Buffer::from_iter_typed(offsets.iter().map(|&o| o as i64))
            } else {
                let small = offsets
                    .iter()
                    .map(|&o| {
                        i32::try_from(o).map_err(|_| {
                            InterchangeError::InvalidOffsets(format!(
                                "offset {o} overflows 32-bit offsets"
                            ))
                        })
                    })
                    .collect::<Result<Vec<i32>>>()?;
                Buffer::from_slice(&small)
            };
            Array::try_new(
                data_type.clone(),
                values.len(),
                0,
                Some(validity()),
                vec![offsets],
                vec![child],
                None,
            )
        }
        DataType::FixedSizeList(field, n) => {
            let n = *n as usize;
            let mut items = Vec::with_capacity(values.len() * n);
            for (i, v) in values.iter().enumerate() {
                match v {
                    Scalar::Null => items.extend(std::iter::repeat_n(Scalar::Null, n)),
                    Scalar::List(entries) if entries.len() == n => items.extend(entries.iter().cloned()),
                    other => return Err(mismatch(i, other)),
                }
            }
            let child = array_from_scalars(&field.data_type, &items)?;
            Array::try_new(
                data_type.clone(),
                values.len(),
                0,
                Some(validity()),
                Vec::new(),
                vec![child],
                None,
            )
        }
        DataType::Struct(fields) => {
            let mut columns = vec![Vec::with_capacity(values.len()); fields.len()];
            for (i, v) in values.iter().enumerate() {
                match v {
                    Scalar::Null => columns.iter_mut().for_each(|c| c.push(Scalar::Null)),
                    Scalar::Struct(entries) if entries.len() == fields.len() => {
                        for (column, entry) in columns.iter_mut().zip(entries) {
                            column.push(entry.clone());
                        }
                    }
                    other => return Err(mismatch(i, other)),
                }
            }
            let children = fields
                .iter()
                .zip(&columns)
                .map(|(f, column)| array_from_scalars(&f.data_type, column))
                .collect::<Result<Vec<_>>>()?;
            Array::try_new(
                data_type.clone(),
                values.len(),
                0,
                Some(validity()),
                Vec::new(),
                children,
                None,
            )
        }
        DataType::Dictionary(_, value) => cast(&array_from_scalars(value, values)?, data_type),
    }
}

/// Raw integer payloads for temporal types; nulls read as zero.
fn raw_integers(
    values: &[Scalar],
    mismatch: impl Fn(usize, &Scalar) -> InterchangeError,
) -> Result<Vec<i64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            Scalar::Null => Ok(0),
            other => other.as_i64().ok_or_else(|| mismatch(i, other)),
        })
        .collect()
}
