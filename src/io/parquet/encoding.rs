//! # Parquet value and level encodings
//!
//! - PLAIN encoding of the non-null values of an [`Array`], per physical type.
//! - The RLE / bit-packing hybrid used for definition levels and dictionary
//!   indices. The encoder emits RLE runs only; the decoder accepts both run kinds.
//! - [`ColumnDecoder`], which accumulates decoded pages of one column chunk into
//!   an array of the target logical type.

use std::io;

use crate::enums::error::{InterchangeError, Result};
use crate::ffi::arrow_dtype::Layout;
use crate::io::parquet::metadata::PhysicalType;
use crate::kernels::cast::encode_dictionary;
use crate::structs::array::{build_variable, build_views, fixed_bytes};
use crate::structs::bitmask::{Bitmask, get_bit, set_bit};
use crate::{Array, Buffer, DataType};

pub(crate) fn malformed(msg: impl Into<String>) -> InterchangeError {
    InterchangeError::Io(io::Error::new(io::ErrorKind::InvalidData, msg.into()))
}

/// Bits needed to store `max`.
#[inline]
pub(crate) fn bit_width(max: u64) -> u8 {
    (64 - max.leading_zeros()) as u8
}

fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let mut out = 0u64;
    for shift in (0..64).step_by(7) {
        let b = *bytes
            .get(*pos)
            .ok_or_else(|| malformed("RLE run header truncated"))?;
        *pos += 1;
        out |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok(out);
        }
    }
    Err(malformed("RLE run header too long"))
}

// ---------------------------------------------------------------
// RLE / bit-packing hybrid
// ---------------------------------------------------------------

/// Appends `values` as RLE runs of `bit_width`-bit values.
pub(crate) fn encode_rle(values: &[u32], bit_width: u8, out: &mut Vec<u8>) {
    let value_bytes = (bit_width as usize).div_ceil(8);
    let mut i = 0;
    while i < values.len() {
        let v = values[i];
        let run = values[i..].iter().take_while(|x| **x == v).count();
        write_varint(out, (run as u64) << 1);
        out.extend_from_slice(&v.to_le_bytes()[..value_bytes]);
        i += run;
    }
}

/// Decodes `count` values of `bit_width` bits.
///
/// # Errors
/// `Io(InvalidData)` when the runs end before `count` values.
pub(crate) fn decode_rle(bytes: &[u8], bit_width: u8, count: usize) -> Result<Vec<u32>> {
    if bit_width > 32 {
        return Err(malformed(format!("RLE bit width {bit_width} exceeds 32")));
    }
    let width = bit_width as usize;
    let value_bytes = width.div_ceil(8);
    // `count` comes from the page header; grow past what the bytes can pack.
    let mut out = Vec::with_capacity(count.min(bytes.len().saturating_mul(8)));
    let mut pos = 0;
    while out.len() < count {
        let header = read_varint(bytes, &mut pos)?;
        if header & 1 == 0 {
            let run = (header >> 1) as usize;
            let raw = bytes
                .get(pos..pos + value_bytes)
                .ok_or_else(|| malformed("RLE run value truncated"))?;
            pos += value_bytes;
            let mut le = [0u8; 4];
            le[..value_bytes].copy_from_slice(raw);
            let v = u32::from_le_bytes(le);
            let take = run.min(count - out.len());
            out.extend(std::iter::repeat_n(v, take));
        } else {
            let groups = (header >> 1) as usize;
            let len = groups
                .checked_mul(width)
                .ok_or_else(|| malformed("bit-packed run too long"))?;
            let packed = bytes
                .get(pos..pos + len)
                .ok_or_else(|| malformed("bit-packed run truncated"))?;
            pos += len;
            let take = (groups * 8).min(count - out.len());
            for j in 0..take {
                let mut v = 0u32;
                for b in 0..width {
                    if get_bit(packed, j * width + b) {
                        v |= 1 << b;
                    }
                }
                out.push(v);
            }
        }
    }
    Ok(out)
}

/// RLE runs of repetition or definition levels bounded by `max`. Nothing is
/// written when `max` is zero.
pub(crate) fn encode_level_runs(levels: &[u16], max: u16, out: &mut Vec<u8>) {
    if max == 0 {
        return;
    }
    let levels: Vec<u32> = levels.iter().map(|&l| l as u32).collect();
    encode_rle(&levels, bit_width(max as u64), out);
}

/// Levels of a v1 data page: a 4-byte length, then the RLE runs.
pub(crate) fn encode_levels(levels: &[u16], max: u16, out: &mut Vec<u8>) {
    if max == 0 {
        return;
    }
    let mut runs = Vec::new();
    encode_level_runs(levels, max, &mut runs);
    out.extend_from_slice(&(runs.len() as u32).to_le_bytes());
    out.extend_from_slice(&runs);
}

/// Decodes `count` levels from unprefixed RLE runs.
pub(crate) fn decode_level_runs(bytes: &[u8], max: u16, count: usize) -> Result<Vec<u16>> {
    if max == 0 {
        return Ok(vec![0; count]);
    }
    decode_rle(bytes, bit_width(max as u64), count)?
        .into_iter()
        .map(|l| {
            u16::try_from(l)
                .ok()
                .filter(|&l| l <= max)
                .ok_or_else(|| malformed(format!("level {l} exceeds the column maximum {max}")))
        })
        .collect()
}

/// Reads v1 levels, returning them and the bytes consumed.
pub(crate) fn decode_levels(bytes: &[u8], max: u16, count: usize) -> Result<(Vec<u16>, usize)> {
    if max == 0 {
        return Ok((vec![0; count], 0));
    }
    let prefix: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| malformed("levels truncated"))?;
    let len = u32::from_le_bytes(prefix) as usize;
    let runs = bytes
        .get(4..4 + len)
        .ok_or_else(|| malformed("levels truncated"))?;
    Ok((decode_level_runs(runs, max, count)?, 4 + len))
}

// ---------------------------------------------------------------
// PLAIN encoding
// ---------------------------------------------------------------

/// Appends the PLAIN encoding of the non-null values of `array`.
///
/// `array` must not be dictionary encoded; `physical` comes from `leaf_type`.
pub(crate) fn encode_plain(array: &Array, physical: PhysicalType, out: &mut Vec<u8>) -> Result<()> {
    let valid: Vec<usize> = (0..array.len()).filter(|&i| array.is_valid(i)).collect();
    encode_plain_at(array, &valid, physical, out)
}

/// PLAIN encoding of the values at the logical `indices` of `array`.
pub(crate) fn encode_plain_at(
    array: &Array,
    indices: &[usize],
    physical: PhysicalType,
    out: &mut Vec<u8>,
) -> Result<()> {
    let dt = array.data_type();
    let base = array.offset();
    let valid = indices.iter().copied();
    match physical {
        PhysicalType::Boolean => {
            let bits = array.buffers()[0].as_slice();
            let values: Vec<bool> = valid.map(|i| get_bit(bits, base + i)).collect();
            let mut packed = vec![0u8; values.len().div_ceil(8)];
            for (j, b) in values.into_iter().enumerate() {
                set_bit(&mut packed, j, b);
            }
            out.extend_from_slice(&packed);
        }
        PhysicalType::Int32 => {
            if matches!(dt, DataType::Null) {
                return Ok(());
            }
            let signed = !matches!(dt, DataType::UInt8 | DataType::UInt16 | DataType::UInt32);
            for i in valid {
                let v = if signed {
                    array.read_signed(base + i) as i32
                } else {
                    array.read_unsigned(base + i) as u32 as i32
                };
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        PhysicalType::Int64 => {
            for i in valid {
                out.extend_from_slice(&array.read_signed(base + i).to_le_bytes());
            }
        }
        PhysicalType::Float | PhysicalType::Double => {
            let w = if physical == PhysicalType::Float { 4 } else { 8 };
            let bytes = array.buffers()[0].as_slice();
            for i in valid {
                let p = (base + i) * w;
                out.extend_from_slice(&bytes[p..p + w]);
            }
        }
        PhysicalType::ByteArray => {
            for i in valid {
                let v = array.value_bytes(i).unwrap_or_default();
                out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                out.extend_from_slice(v);
            }
        }
        PhysicalType::FixedLenByteArray => {
            let reverse = matches!(dt, DataType::Decimal128(..) | DataType::Decimal256(..));
            let Layout::FixedWidth(w) = dt.layout() else {
                return Err(InterchangeError::type_mismatch("fixed-width type", dt.to_string()));
            };
            let bytes = array.buffers()[0].as_slice();
            for i in valid {
                let v = &bytes[(base + i) * w..(base + i + 1) * w];
                if reverse {
                    out.extend(v.iter().rev());
                } else {
                    out.extend_from_slice(v);
                }
            }
        }
        PhysicalType::Int96 => {
            return Err(InterchangeError::UnsupportedOperation(
                "INT96 columns cannot be written".into(),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------

/// One PLAIN value as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value<'a> {
    Bool(bool),
    I32(i32),
    I64(i64),
    Raw(&'a [u8]),
}

/// Cursor over PLAIN-encoded values of one physical type.
pub(crate) struct PlainCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    index: usize,
    physical: PhysicalType,
    type_length: usize,
}

impl<'a> PlainCursor<'a> {
    pub fn new(bytes: &'a [u8], physical: PhysicalType, type_length: Option<i32>) -> Self {
        Self {
            bytes,
            pos: 0,
            index: 0,
            physical,
            type_length: type_length.unwrap_or(0).max(0) as usize,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let out = self
            .bytes
            .get(self.pos..self.pos + n)
            .ok_or_else(|| malformed("PLAIN values truncated"))?;
        self.pos += n;
        Ok(out)
    }

    fn next(&mut self) -> Result<Value<'a>> {
        let v = match self.physical {
            PhysicalType::Boolean => {
                if self.index / 8 >= self.bytes.len() {
                    return Err(malformed("PLAIN booleans truncated"));
                }
                Value::Bool(get_bit(self.bytes, self.index))
            }
            PhysicalType::Int32 => {
                Value::I32(i32::from_le_bytes(fixed_bytes::<4>(self.take(4)?, 0)))
            }
            PhysicalType::Int64 => {
                Value::I64(i64::from_le_bytes(fixed_bytes::<8>(self.take(8)?, 0)))
            }
            PhysicalType::Float => Value::Raw(self.take(4)?),
            PhysicalType::Double => Value::Raw(self.take(8)?),
            PhysicalType::ByteArray => {
                let len = u32::from_le_bytes(fixed_bytes::<4>(self.take(4)?, 0));
                Value::Raw(self.take(len as usize)?)
            }
            PhysicalType::FixedLenByteArray => Value::Raw(self.take(self.type_length)?),
            PhysicalType::Int96 => {
                return Err(InterchangeError::UnsupportedOperation(
                    "INT96 columns cannot be read".into(),
                ));
            }
        };
        self.index += 1;
        Ok(v)
    }
}

/// Decoded values in the target's physical representation.
#[derive(Debug)]
enum Sink {
    Null,
    Bits(Vec<bool>),
    Fixed {
        width: usize,
        reverse: bool,
        bytes: Vec<u8>,
    },
    Var {
        data: Vec<u8>,
        ends: Vec<usize>,
        utf8: bool,
    },
}

impl Sink {
    fn for_type(dt: &DataType) -> Result<Self> {
        Ok(match dt.layout() {
            Layout::Null => Sink::Null,
            Layout::Bitmap => Sink::Bits(Vec::new()),
            Layout::FixedWidth(width) => Sink::Fixed {
                width,
                reverse: matches!(dt, DataType::Decimal128(..) | DataType::Decimal256(..)),
                bytes: Vec::new(),
            },
            Layout::Variable { .. } | Layout::View => Sink::Var {
                data: Vec::new(),
                ends: Vec::new(),
                utf8: matches!(dt, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View),
            },
            _ => {
                return Err(InterchangeError::UnsupportedOperation(format!(
                    "cannot decode parquet values into {dt}"
                )));
            }
        })
    }

    fn push_default(&mut self) {
        match self {
            Sink::Null => {}
            Sink::Bits(bits) => bits.push(false),
            Sink::Fixed { width, bytes, .. } => bytes.resize(bytes.len() + *width, 0),
            Sink::Var { data, ends, .. } => ends.push(data.len()),
        }
    }

    fn push(&mut self, value: Value<'_>) -> Result<()> {
        match (self, value) {
            (Sink::Null, _) => {}
            (Sink::Bits(bits), Value::Bool(b)) => bits.push(b),
            (Sink::Fixed { width, bytes, .. }, Value::I32(v)) if *width <= 4 => {
                bytes.extend_from_slice(&v.to_le_bytes()[..*width])
            }
            (Sink::Fixed { width, bytes, .. }, Value::I64(v)) => {
                bytes.extend_from_slice(&v.to_le_bytes()[..*width])
            }
            (
                Sink::Fixed {
                    width,
                    reverse,
                    bytes,
                },
                Value::Raw(raw),
            ) if raw.len() == *width => {
                if *reverse {
                    bytes.extend(raw.iter().rev());
                } else {
                    bytes.extend_from_slice(raw);
                }
            }
            (Sink::Var { data, ends, utf8 }, Value::Raw(raw)) => {
                if *utf8 && std::str::from_utf8(raw).is_err() {
                    return Err(malformed("string column holds invalid UTF-8"));
                }
                data.extend_from_slice(raw);
                ends.push(data.len());
            }
            (_, v) => {
                return Err(malformed(format!(
                    "value {v:?} does not fit the column's type"
                )));
            }
        }
        Ok(())
    }

    /// Appends element `i` of `other`, a sink of the same kind.
    fn push_from(&mut self, other: &Sink, i: usize) -> Result<()> {
        let out_of_range = || malformed(format!("dictionary index {i} out of range"));
        match (self, other) {
            (Sink::Null, _) => {}
            (Sink::Bits(bits), Sink::Bits(src)) => bits.push(*src.get(i).ok_or_else(out_of_range)?),
            (Sink::Fixed { width, bytes, .. }, Sink::Fixed { bytes: src, .. }) => {
                let v = src
                    .get(i * *width..(i + 1) * *width)
                    .ok_or_else(out_of_range)?;
                bytes.extend_from_slice(v);
            }
            (Sink::Var { data, ends, .. }, Sink::Var { data: src, ends: src_ends, .. }) => {
                let end = *src_ends.get(i).ok_or_else(out_of_range)?;
                let start = if i == 0 { 0 } else { src_ends[i - 1] };
                data.extend_from_slice(&src[start..end]);
                ends.push(data.len());
            }
            _ => return Err(malformed("dictionary kind does not match the column")),
        }
        Ok(())
    }
}

/// Accumulates the pages of one column chunk into an array.
#[derive(Debug)]
pub(crate) struct ColumnDecoder {
    target: DataType,
    value_type: DataType,
    physical: PhysicalType,
    type_length: Option<i32>,
    values: Sink,
    valid: Vec<bool>,
    dictionary: Option<Sink>,
}

impl ColumnDecoder {
    /// Decoder producing `target`, which may be a dictionary type.
    pub fn new(target: DataType, physical: PhysicalType, type_length: Option<i32>) -> Result<Self> {
        let value_type = match &target {
            DataType::Dictionary(_, v) => (**v).clone(),
            other => other.clone(),
        };
        Ok(Self {
            values: Sink::for_type(&value_type)?,
            target,
            value_type,
            physical,
            type_length,
            valid: Vec::new(),
            dictionary: None,
        })
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    /// Installs the values of a dictionary page.
    pub fn set_dictionary(&mut self, page: &[u8], num_values: usize) -> Result<()> {
        let mut sink = Sink::for_type(&self.value_type)?;
        let mut cursor = PlainCursor::new(page, self.physical, self.type_length);
        for _ in 0..num_values {
            sink.push(cursor.next()?)?;
        }
        self.dictionary = Some(sink);
        Ok(())
    }

    /// Appends PLAIN values for the set slots of `valid`.
    pub fn push_plain(&mut self, valid: &[bool], values: &[u8]) -> Result<()> {
        let mut cursor = PlainCursor::new(values, self.physical, self.type_length);
        for &v in valid {
            if v {
                self.values.push(cursor.next()?)?;
            } else {
                self.values.push_default();
            }
        }
        self.valid.extend_from_slice(valid);
        Ok(())
    }

    /// Appends dictionary-indexed values: a bit-width byte and RLE-hybrid indices.
    pub fn push_indices(&mut self, valid: &[bool], data: &[u8]) -> Result<()> {
        let dictionary = self
            .dictionary
            .as_ref()
            .ok_or_else(|| malformed("dictionary-encoded page without a dictionary page"))?;
        let non_null = valid.iter().filter(|v| **v).count();
        let indices = match data.split_first() {
            Some((width, runs)) => decode_rle(runs, *width, non_null)?,
            None if non_null == 0 => Vec::new(),
            None => return Err(malformed("dictionary indices missing")),
        };
        let mut next = indices.into_iter();
        for &v in valid {
            if v {
                let i = next
                    .next()
                    .ok_or_else(|| malformed("fewer dictionary indices than values"))?;
                self.values.push_from(dictionary, i as usize)?;
            } else {
                self.values.push_default();
            }
        }
        self.valid.extend_from_slice(valid);
        Ok(())
    }

    /// Builds the column array.
    pub fn finish(self) -> Result<Array> {
        let len = self.valid.len();
        let validity = if self.valid.iter().all(|v| *v) {
            None
        } else {
            Some(Bitmask::from_bools(&self.valid))
        };
        let values = match self.values {
            Sink::Null => Array::new_null(len),
            Sink::Bits(bits) => Array::try_new(
                self.value_type.clone(),
                len,
                0,
                validity,
                vec![Bitmask::from_bools(&bits).buffer().clone()],
                Vec::new(),
                None,
            )?,
            Sink::Fixed { bytes, .. } => Array::try_new(
                self.value_type.clone(),
                len,
                0,
                validity,
                vec![Buffer::from(bytes)],
                Vec::new(),
                None,
            )?,
            Sink::Var { data, ends, .. } => {
                let items = (0..len).map(|i| {
                    let start = if i == 0 { 0 } else { ends[i - 1] };
                    self.valid[i].then(|| &data[start..ends[i]])
                });
                match self.value_type.layout() {
                    Layout::View => build_views(self.value_type.clone(), items),
                    Layout::Variable { large: true } => {
                        build_variable::<i64, _>(self.value_type.clone(), items)?
                    }
                    _ => {
                        if data.len() > i32::MAX as usize {
                            return Err(InterchangeError::InvalidOffsets(format!(
                                "{} bytes exceed the 32-bit offsets of {}",
                                data.len(),
                                self.value_type
                            )));
                        }
                        build_variable::<i32, _>(self.value_type.clone(), items)?
                    }
                }
            }
        };
        match &self.target {
            DataType::Dictionary(key, _) => encode_dictionary(&values, key),
            _ => Ok(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rle_runs_round_trip() {
        let values = [0u32, 0, 0, 5, 5, 1, 7, 7, 7, 7];
        let mut out = Vec::new();
        encode_rle(&values, 3, &mut out);
        assert_eq!(decode_rle(&out, 3, values.len()).unwrap(), values);
        // Fewer values than encoded is fine; more is an error.
        assert_eq!(decode_rle(&out, 3, 4).unwrap(), &values[..4]);
        assert!(decode_rle(&out, 3, 11).is_err());
        // A wildly overstated count fails on the data, not on allocation.
        assert!(decode_rle(&out, 3, 1 << 40).is_err());
    }

    #[test]
    fn bit_packed_runs_decode() {
        // One group of eight 1-bit values: 1,0,1,1,0,0,0,1
        let bytes = [0b0000_0011, 0b1000_1101];
        assert_eq!(
            decode_rle(&bytes, 1, 8).unwrap(),
            vec![1, 0, 1, 1, 0, 0, 0, 1]
        );
    }

    #[test]
    fn levels_round_trip_at_their_width() {
        let levels = [3u16, 3, 0, 1, 3, 2];
        let mut out = Vec::new();
        encode_levels(&levels, 3, &mut out);
        let (decoded, used) = decode_levels(&out, 3, levels.len()).unwrap();
        assert_eq!(decoded, levels);
        assert_eq!(used, out.len());

        let mut empty = Vec::new();
        encode_levels(&levels, 0, &mut empty);
        assert!(empty.is_empty());
        assert_eq!(decode_levels(&[], 0, 2).unwrap(), (vec![0, 0], 0));
    }

    #[test]
    fn levels_above_the_maximum_are_malformed() {
        let mut runs = Vec::new();
        encode_rle(&[3], 2, &mut runs);
        assert!(decode_level_runs(&runs, 2, 1).is_err());
    }

    #[test]
    fn bit_width_of_max_value() {
        assert_eq!(bit_width(0), 0);
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(255), 8);
        assert_eq!(bit_width(256), 9);
    }

    #[test]
    fn plain_int16_through_int32() {
        let a = Array::from_options(&[Some(-2i16), None, Some(300)]);
        let mut out = Vec::new();
        encode_plain(&a, PhysicalType::Int32, &mut out).unwrap();
        assert_eq!(out.len(), 8);

        let mut dec = ColumnDecoder::new(DataType::Int16, PhysicalType::Int32, None).unwrap();
        dec.push_plain(&[true, false, true], &out).unwrap();
        assert_eq!(dec.finish().unwrap(), a);
    }

    #[test]
    fn plain_strings_with_dictionary_target() {
        let a = Array::from_strs(&["x", "y", "x"]);
        let mut out = Vec::new();
        encode_plain(&a, PhysicalType::ByteArray, &mut out).unwrap();
        let target = DataType::dictionary(DataType::Int32, DataType::Utf8).unwrap();
        let mut dec = ColumnDecoder::new(target.clone(), PhysicalType::ByteArray, None).unwrap();
        dec.push_plain(&[true, true, true], &out).unwrap();
        let got = dec.finish().unwrap();
        assert_eq!(got.data_type(), &target);
        assert_eq!(got.dictionary_values().unwrap().len(), 2);
    }

    #[test]
    fn dictionary_indices_expand() {
        let dict = Array::from_strs(&["a", "b"]);
        let mut page = Vec::new();
        encode_plain(&dict, PhysicalType::ByteArray, &mut page).unwrap();
        let mut dec = ColumnDecoder::new(DataType::Utf8, PhysicalType::ByteArray, None).unwrap();
        dec.set_dictionary(&page, 2).unwrap();
        let mut data = vec![1u8];
        encode_rle(&[1, 0, 1], 1, &mut data);
        dec.push_indices(&[true, false, true, true], &data).unwrap();
        let got = dec.finish().unwrap();
        assert_eq!(got.value_str(0), Some("b"));
        assert!(got.is_null(1));
        assert_eq!(got.value_str(2), Some("a"));
        assert_eq!(got.value_str(3), Some("b"));
    }

    #[test]
    fn booleans_pack_lsb_first() {
        let a = Array::from_opt_bools(&[Some(true), None, Some(false), Some(true)]);
        let mut out = Vec::new();
        encode_plain(&a, PhysicalType::Boolean, &mut out).unwrap();
        assert_eq!(out, vec![0b101]);
    }

    #[test]
    fn decimal128_is_big_endian_on_disk() {
        let mut le = [0u8; 16];
        le[0] = 1;
        let a = Array::try_new(
            DataType::Decimal128(10, 2),
            1,
            0,
            None,
            vec![Buffer::from(le.to_vec())],
            Vec::new(),
            None,
        )
        .unwrap();
        let mut out = Vec::new();
        encode_plain(&a, PhysicalType::FixedLenByteArray, &mut out).unwrap();
        assert_eq!(out[15], 1);
        let mut dec =
            ColumnDecoder::new(DataType::Decimal128(10, 2), PhysicalType::FixedLenByteArray, Some(16))
                .unwrap();
        dec.push_plain(&[true], &out).unwrap();
        assert_eq!(dec.finish().unwrap(), a);
    }
}
