//! # ArrowDType Module - *Arrow type tagging for self-documenting data*
//!
//! The closed logical type system used by every array, field and codec in the crate.
//!
//! ## Overview
//! - Covers nulls, booleans, integers, floats (including half precision), decimals,
//!   UTF-8 and binary in small, large and view layouts, fixed-size binary,
//!   temporal types with units and optional timezone, and the nested
//!   list / large-list / fixed-size-list / struct / map / dictionary types.
//! - Each variant knows its physical [`Layout`], which drives buffer validation,
//!   C Data export and the wire codecs.
//! - Each variant renders to and parses from the Arrow C format string.
//!
//! ## Invariants
//! - A dictionary's value type is never itself a dictionary, and its key type is
//!   always an integer. Use [`DataType::dictionary`] to build one.
//!
//! ## Copyright Notice
//! - This crate is not affiliated with the `Apache Arrow` project.
//! - The term `Apache Arrow` is a trademark of the *Apache Software Foundation*.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::enums::error::{InterchangeError, Result};
use crate::enums::time_units::TimeUnit;
use crate::structs::field::Field;

/// # DataType
///
/// Logical type of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    /// `(precision, scale)`
    Decimal32(u8, i8),
    Decimal64(u8, i8),
    Decimal128(u8, i8),
    Decimal256(u8, i8),
    Utf8,
    LargeUtf8,
    Utf8View,
    Binary,
    LargeBinary,
    BinaryView,
    FixedSizeBinary(i32),
    Date32,
    Date64,
    Time32(TimeUnit),
    Time64(TimeUnit),
    Timestamp(TimeUnit, Option<String>),
    Duration(TimeUnit),
    List(Box<Field>),
    LargeList(Box<Field>),
    FixedSizeList(Box<Field>, i32),
    Struct(Vec<Field>),
    /// Entries field (a non-null struct of key and value) and the keys-sorted flag.
    Map(Box<Field>, bool),
    /// `(key_type, value_type)`
    Dictionary(Box<DataType>, Box<DataType>),
}

/// Physical layout of a data type, following the Arrow columnar format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// No buffers at all.
    Null,
    /// Validity plus a packed bit buffer.
    Bitmap,
    /// Validity plus fixed-width values of the given byte width.
    FixedWidth(usize),
    /// Validity, offsets and values.
    Variable { large: bool },
    /// Validity, 16-byte views, then any number of data buffers.
    View,
    /// Validity and offsets, with one child.
    List { large: bool },
    /// Validity only, with one child of `len * size` elements.
    FixedSizeList(usize),
    /// Validity only, with one child per field.
    Struct,
    /// Indices laid out as a fixed-width primitive, plus a dictionary.
    Dictionary(usize),
}

impl DataType {
    /// Builds a dictionary type, rejecting nested dictionaries and non-integer keys.
    pub fn dictionary(key: DataType, value: DataType) -> Result<Self> {
        if !key.is_integer() {
            return Err(InterchangeError::TypeMismatch {
                expected: "integer dictionary key".into(),
                found: key.to_string(),
                context: Some("DataType::dictionary".into()),
            });
        }
        if matches!(value, DataType::Dictionary(..)) {
            return Err(InterchangeError::TypeMismatch {
                expected: "non-dictionary value type".into(),
                found: value.to_string(),
                context: Some("DataType::dictionary".into()),
            });
        }
        Ok(DataType::Dictionary(Box::new(key), Box::new(value)))
    }

    /// Convenience for `List(Field::new("item", value, true))`.
    pub fn list(value: DataType) -> Self {
        DataType::List(Box::new(Field::new("item", value, true)))
    }

    /// Convenience for `LargeList(Field::new("item", value, true))`.
    pub fn large_list(value: DataType) -> Self {
        DataType::LargeList(Box::new(Field::new("item", value, true)))
    }

    /// Convenience for a map with non-null keys and nullable values.
    pub fn map(key: DataType, value: DataType, keys_sorted: bool) -> Self {
        let entries = Field::new(
            "entries",
            DataType::Struct(vec![
                Field::new("key", key, false),
                Field::new("value", value, true),
            ]),
            false,
        );
        DataType::Map(Box::new(entries), keys_sorted)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            DataType::Float16 | DataType::Float32 | DataType::Float64
        )
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            DataType::List(_)
                | DataType::LargeList(_)
                | DataType::FixedSizeList(..)
                | DataType::Struct(_)
                | DataType::Map(..)
        )
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self, DataType::Dictionary(..))
    }

    /// Physical layout.
    pub fn layout(&self) -> Layout {
        match self {
            DataType::Null => Layout::Null,
            DataType::Boolean => Layout::Bitmap,
            DataType::Int8 | DataType::UInt8 => Layout::FixedWidth(1),
            DataType::Int16 | DataType::UInt16 | DataType::Float16 => Layout::FixedWidth(2),
            DataType::Int32
            | DataType::UInt32
            | DataType::Float32
            | DataType::Date32
            | DataType::Time32(_)
            | DataType::Decimal32(..) => Layout::FixedWidth(4),
            DataType::Int64
            | DataType::UInt64
            | DataType::Float64
            | DataType::Date64
            | DataType::Time64(_)
            | DataType::Timestamp(..)
            | DataType::Duration(_)
            | DataType::Decimal64(..) => Layout::FixedWidth(8),
            DataType::Decimal128(..) => Layout::FixedWidth(16),
            DataType::Decimal256(..) => Layout::FixedWidth(32),
            DataType::FixedSizeBinary(n) => Layout::FixedWidth(*n as usize),
            DataType::Utf8 | DataType::Binary => Layout::Variable { large: false },
            DataType::LargeUtf8 | DataType::LargeBinary => Layout::Variable { large: true },
            DataType::Utf8View | DataType::BinaryView => Layout::View,
            DataType::List(_) | DataType::Map(..) => Layout::List { large: false },
            DataType::LargeList(_) => Layout::List { large: true },
            DataType::FixedSizeList(_, n) => Layout::FixedSizeList(*n as usize),
            DataType::Struct(_) => Layout::Struct,
            DataType::Dictionary(key, _) => match key.layout() {
                Layout::FixedWidth(w) => Layout::Dictionary(w),
                _ => Layout::Dictionary(4),
            },
        }
    }

    /// Count of fixed buffers, validity included, that precede any variadic view data.
    pub fn fixed_buffer_count(&self) -> usize {
        match self.layout() {
            Layout::Null => 0,
            Layout::Bitmap | Layout::FixedWidth(_) | Layout::Dictionary(_) => 2,
            Layout::Variable { .. } => 3,
            Layout::View => 2,
            Layout::List { .. } => 2,
            Layout::FixedSizeList(_) | Layout::Struct => 1,
        }
    }

    /// Child fields for nested types.
    pub fn children(&self) -> Vec<&Field> {
        match self {
            DataType::List(f)
            | DataType::LargeList(f)
            | DataType::FixedSizeList(f, _)
            | DataType::Map(f, _) => vec![f.as_ref()],
            DataType::Struct(fields) => fields.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Arrow C Data Interface format string.
    ///
    /// Dictionaries render as their key type; the value type travels on the
    /// schema's dictionary member.
    pub fn format(&self) -> String {
        match self {
            DataType::Null => "n".into(),
            DataType::Boolean => "b".into(),
            DataType::Int8 => "c".into(),
            DataType::UInt8 => "C".into(),
            DataType::Int16 => "s".into(),
            DataType::UInt16 => "S".into(),
            DataType::Int32 => "i".into(),
            DataType::UInt32 => "I".into(),
            DataType::Int64 => "l".into(),
            DataType::UInt64 => "L".into(),
            DataType::Float16 => "e".into(),
            DataType::Float32 => "f".into(),
            DataType::Float64 => "g".into(),
            DataType::Decimal32(p, s) => format!("d:{p},{s},32"),
            DataType::Decimal64(p, s) => format!("d:{p},{s},64"),
            DataType::Decimal128(p, s) => format!("d:{p},{s}"),
            DataType::Decimal256(p, s) => format!("d:{p},{s},256"),
            DataType::Binary => "z".into(),
            DataType::LargeBinary => "Z".into(),
            DataType::Utf8 => "u".into(),
            DataType::LargeUtf8 => "U".into(),
            DataType::BinaryView => "vz".into(),
            DataType::Utf8View => "vu".into(),
            DataType::FixedSizeBinary(n) => format!("w:{n}"),
            DataType::Date32 => "tdD".into(),
            DataType::Date64 => "tdm".into(),
            DataType::Time32(u) | DataType::Time64(u) => format!("tt{}", u.format_char()),
            DataType::Duration(u) => format!("tD{}", u.format_char()),
            DataType::Timestamp(u, tz) => {
                format!("ts{}:{}", u.format_char(), tz.as_deref().unwrap_or(""))
            }
            DataType::List(_) => "+l".into(),
            DataType::LargeList(_) => "+L".into(),
            DataType::FixedSizeList(_, n) => format!("+w:{n}"),
            DataType::Struct(_) => "+s".into(),
            DataType::Map(..) => "+m".into(),
            DataType::Dictionary(key, _) => key.format(),
        }
    }

    /// Parses an Arrow C format string.
    ///
    /// Nested formats consume `children` in order; `map_keys_sorted` comes from the
    /// schema flags. Dictionary wrapping is the caller's job because the value type
    /// lives on a separate schema node.
    pub fn from_format(fmt: &str, mut children: Vec<Field>, map_keys_sorted: bool) -> Result<Self> {
        let bad = || InterchangeError::ImportError(format!("Unsupported format string '{fmt}'"));
        let dt = match fmt {
            "n" => DataType::Null,
            "b" => DataType::Boolean,
            "c" => DataType::Int8,
            "C" => DataType::UInt8,
            "s" => DataType::Int16,
            "S" => DataType::UInt16,
            "i" => DataType::Int32,
            "I" => DataType::UInt32,
            "l" => DataType::Int64,
            "L" => DataType::UInt64,
            "e" => DataType::Float16,
            "f" => DataType::Float32,
            "g" => DataType::Float64,
            "z" => DataType::Binary,
            "Z" => DataType::LargeBinary,
            "u" => DataType::Utf8,
            "U" => DataType::LargeUtf8,
            "vz" => DataType::BinaryView,
            "vu" => DataType::Utf8View,
            "tdD" => DataType::Date32,
            "tdm" => DataType::Date64,
            "tts" => DataType::Time32(TimeUnit::Second),
            "ttm" => DataType::Time32(TimeUnit::Millisecond),
            "ttu" => DataType::Time64(TimeUnit::Microsecond),
            "ttn" => DataType::Time64(TimeUnit::Nanosecond),
            "+l" => DataType::List(Box::new(take_child(&mut children, "+l")?)),
            "+L" => DataType::LargeList(Box::new(take_child(&mut children, "+L")?)),
            "+s" => DataType::Struct(std::mem::take(&mut children)),
            "+m" => DataType::Map(Box::new(take_child(&mut children, "+m")?), map_keys_sorted),
            other => {
                if let Some(rest) = other.strip_prefix("w:") {
                    DataType::FixedSizeBinary(rest.parse().map_err(|_| bad())?)
                } else if let Some(rest) = other.strip_prefix("+w:") {
                    let n = rest.parse().map_err(|_| bad())?;
                    DataType::FixedSizeList(Box::new(take_child(&mut children, "+w")?), n)
                } else if let Some(rest) = other.strip_prefix("d:") {
                    parse_decimal(rest).ok_or_else(bad)?
                } else if let Some(rest) = other.strip_prefix("tD") {
                    let unit = rest
                        .bytes()
                        .next()
                        .and_then(TimeUnit::from_format_char)
                        .ok_or_else(bad)?;
                    if rest.len() != 1 {
                        return Err(bad());
                    }
                    DataType::Duration(unit)
                } else if let Some(rest) = other.strip_prefix("ts") {
                    let mut parts = rest.splitn(2, ':');
                    let unit_str = parts.next().ok_or_else(bad)?;
                    let tz = parts.next().ok_or_else(bad)?;
                    if unit_str.len() != 1 {
                        return Err(bad());
                    }
                    let unit = TimeUnit::from_format_char(unit_str.as_bytes()[0]).ok_or_else(bad)?;
                    let tz = if tz.is_empty() { None } else { Some(tz.to_string()) };
                    DataType::Timestamp(unit, tz)
                } else {
                    return Err(bad());
                }
            }
        };
        Ok(dt)
    }
}

fn take_child(children: &mut Vec<Field>, what: &str) -> Result<Field> {
    if children.is_empty() {
        return Err(InterchangeError::ImportError(format!(
            "Format '{what}' requires a child schema"
        )));
    }
    Ok(children.remove(0))
}

fn parse_decimal(rest: &str) -> Option<DataType> {
    let parts: Vec<&str> = rest.split(',').collect();
    let precision: u8 = parts.first()?.parse().ok()?;
    let scale: i8 = parts.get(1)?.parse().ok()?;
    match parts.get(2).copied() {
        None | Some("128") => Some(DataType::Decimal128(precision, scale)),
        Some("32") => Some(DataType::Decimal32(precision, scale)),
        Some("64") => Some(DataType::Decimal64(precision, scale)),
        Some("256") => Some(DataType::Decimal256(precision, scale)),
        Some(_) => None,
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DataType::Null => f.write_str("Null"),
            DataType::Boolean => f.write_str("Boolean"),
            DataType::Int8 => f.write_str("Int8"),
            DataType::Int16 => f.write_str("Int16"),
            DataType::Int32 => f.write_str("Int32"),
            DataType::Int64 => f.write_str("Int64"),
            DataType::UInt8 => f.write_str("UInt8"),
            DataType::UInt16 => f.write_str("UInt16"),
            DataType::UInt32 => f.write_str("UInt32"),
            DataType::UInt64 => f.write_str("UInt64"),
            DataType::Float16 => f.write_str("Float16"),
            DataType::Float32 => f.write_str("Float32"),
            DataType::Float64 => f.write_str("Float64"),
            DataType::Decimal32(p, s) => write!(f, "Decimal32({p}, {s})"),
            DataType::Decimal64(p, s) => write!(f, "Decimal64({p}, {s})"),
            DataType::Decimal128(p, s) => write!(f, "Decimal128({p}, {s})"),
            DataType::Decimal256(p, s) => write!(f, "Decimal256({p}, {s})"),
            DataType::Utf8 => f.write_str("Utf8"),
            DataType::LargeUtf8 => f.write_str("LargeUtf8"),
            DataType::Utf8View => f.write_str("Utf8View"),
            DataType::Binary => f.write_str("Binary"),
            DataType::LargeBinary => f.write_str("LargeBinary"),
            DataType::BinaryView => f.write_str("BinaryView"),
            DataType::FixedSizeBinary(n) => write!(f, "FixedSizeBinary({n})"),
            DataType::Date32 => f.write_str("Date32"),
            DataType::Date64 => f.write_str("Date64"),
            DataType::Time32(u) => write!(f, "Time32({u})"),
            DataType::Time64(u) => write!(f, "Time64({u})"),
            DataType::Timestamp(u, None) => write!(f, "Timestamp({u})"),
            DataType::Timestamp(u, Some(tz)) => write!(f, "Timestamp({u}, {tz})"),
            DataType::Duration(u) => write!(f, "Duration({u})"),
            DataType::List(field) => write!(f, "List({})", field.data_type),
            DataType::LargeList(field) => write!(f, "LargeList({})", field.data_type),
            DataType::FixedSizeList(field, n) => {
                write!(f, "FixedSizeList({}, {n})", field.data_type)
            }
            DataType::Struct(fields) => {
                f.write_str("Struct(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                f.write_str(")")
            }
            DataType::Map(entries, sorted) => {
                let kv = entries.data_type.children();
                match (kv.first(), kv.get(1)) {
                    (Some(k), Some(v)) => {
                        write!(f, "Map({}, {}, sorted={sorted})", k.data_type, v.data_type)
                    }
                    _ => write!(f, "Map(sorted={sorted})"),
                }
            }
            DataType::Dictionary(k, v) => write!(f, "Dictionary({k}, {v})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse(dt: &DataType) -> DataType {
        let children = dt.children().into_iter().cloned().collect();
        let sorted = matches!(dt, DataType::Map(_, true));
        DataType::from_format(&dt.format(), children, sorted).unwrap()
    }

    #[test]
    fn format_strings_round_trip() {
        let types = vec![
            DataType::Null,
            DataType::Boolean,
            DataType::Int8,
            DataType::UInt64,
            DataType::Float16,
            DataType::Decimal32(9, 2),
            DataType::Decimal128(38, 10),
            DataType::Decimal256(76, -3),
            DataType::Utf8View,
            DataType::FixedSizeBinary(16),
            DataType::Time32(TimeUnit::Millisecond),
            DataType::Time64(TimeUnit::Nanosecond),
            DataType::Timestamp(TimeUnit::Microsecond, Some("Europe/Paris".into())),
            DataType::Timestamp(TimeUnit::Second, None),
            DataType::Duration(TimeUnit::Nanosecond),
            DataType::list(DataType::Int32),
            DataType::FixedSizeList(Box::new(Field::new("x", DataType::Float64, false)), 3),
            DataType::Struct(vec![
                Field::new("a", DataType::Utf8, true),
                Field::new("b", DataType::Int64, false),
            ]),
            DataType::map(DataType::Utf8, DataType::Int32, true),
        ];
        for dt in types {
            assert_eq!(reparse(&dt), dt, "format {}", dt.format());
        }
    }

    #[test]
    fn dictionary_rejects_nesting_and_bad_keys() {
        let inner = DataType::dictionary(DataType::Int32, DataType::Utf8).unwrap();
        assert!(DataType::dictionary(DataType::Int8, inner).is_err());
        assert!(DataType::dictionary(DataType::Utf8, DataType::Utf8).is_err());
        assert_eq!(
            DataType::dictionary(DataType::UInt16, DataType::Utf8).unwrap().format(),
            "S"
        );
    }

    #[test]
    fn unknown_format_is_import_error() {
        let err = DataType::from_format("?", vec![], false).unwrap_err();
        assert!(matches!(err, InterchangeError::ImportError(_)));
        assert!(DataType::from_format("+l", vec![], false).is_err());
    }

    #[test]
    fn layouts() {
        assert_eq!(DataType::Utf8.fixed_buffer_count(), 3);
        assert_eq!(DataType::Null.fixed_buffer_count(), 0);
        assert_eq!(DataType::Decimal256(10, 2).layout(), Layout::FixedWidth(32));
        assert_eq!(
            DataType::dictionary(DataType::Int16, DataType::Utf8).unwrap().layout(),
            Layout::Dictionary(2)
        );
    }
}
