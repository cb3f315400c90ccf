//! # Scalar Module - *Single Value Container*
//!
//! Contains the Scalar type for holding one logical element read out of an array.
//!
//! ## Purpose
//! - Type-erased view of a single element, independent of the physical layout
//!   (small vs large offsets, inline vs out-of-line views, dictionary encoding).
//! - Used for logical equality between arrays, chunk-walking lookups and the
//!   rechunk law `to_flat_values(rechunk(t)) == to_flat_values(t)`.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// # Scalar
///
/// Logical value of one array element.
///
/// ## Description
/// - Integers widen to `Int`/`UInt`, floats (including half precision) to `Float`.
/// - Temporal values are carried as their raw `Int` count of units.
/// - Decimals keep their little-endian two's complement bytes.
/// - Strings and binaries are owned, whatever their offset width or view layout.
/// - Dictionary elements resolve to the referenced dictionary value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Vec<u8>),
    Utf8(String),
    Binary(Vec<u8>),
    List(Vec<Scalar>),
    Struct(Vec<Scalar>),
}

impl Scalar {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Integer value, if this is a signed or unsigned integer that fits `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Int(v) => Some(*v as f64),
            Scalar::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Utf8(v.to_string())
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::UInt(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Decimal(bytes) => write!(f, "decimal{bytes:?}"),
            Scalar::Utf8(s) => write!(f, "{s:?}"),
            Scalar::Binary(b) => write!(f, "b{b:?}"),
            Scalar::List(items) | Scalar::Struct(items) => {
                let open = if matches!(self, Scalar::List(_)) { '[' } else { '{' };
                let close = if open == '[' { ']' } else { '}' };
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}

/// Converts IEEE 754 half-precision bits to `f64`.
pub fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = ((bits >> 10) & 0x1F) as i32;
    let frac = (bits & 0x03FF) as f64;
    match exp {
        0 => sign * frac * 2f64.powi(-24),
        0x1F if frac == 0.0 => sign * f64::INFINITY,
        0x1F => f64::NAN,
        _ => sign * (1.0 + frac / 1024.0) * 2f64.powi(exp - 15),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_precision_decoding() {
        assert_eq!(f16_to_f64(0x3C00), 1.0);
        assert_eq!(f16_to_f64(0xC000), -2.0);
        assert_eq!(f16_to_f64(0x0000), 0.0);
        assert_eq!(f16_to_f64(0x7C00), f64::INFINITY);
        assert!(f16_to_f64(0x7E00).is_nan());
        assert_eq!(f16_to_f64(0x3800), 0.5);
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Scalar::from(Some("x")), Scalar::Utf8("x".into()));
        assert_eq!(Scalar::from(None::<i64>), Scalar::Null);
        assert_eq!(Scalar::List(vec![Scalar::Int(1), Scalar::Null]).to_string(), "[1, null]");
    }
}
