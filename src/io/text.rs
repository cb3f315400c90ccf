//! Text forms of scalar values, shared by the CSV and JSON codecs.
//!
//! - Dates are `YYYY-MM-DD`. Times are `HH:MM:SS[.fff]`.
//! - Timestamps print as ISO 8601 in UTC, with a trailing `Z` when the type
//!   carries a timezone. Parsing also accepts a space separator, any RFC 3339
//!   offset, a bare date (midnight) or the raw integer.
//! - Decimals print at their scale, e.g. `-12.30` for `Decimal(5, 2)`.
//! - Binary values are standard base64.
//! - Dictionary columns read and write their values.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Timelike, Utc};

use crate::enums::error::{InterchangeError, Result};
use crate::enums::scalar::Scalar;
use crate::{DataType, TimeUnit};

/// Days from 0001-01-01 to the Unix epoch, as counted by `num_days_from_ce`.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses one cell of `data_type`. `None` when the text does not fit.
///
/// Surrounding whitespace is ignored, except in strings.
pub(crate) fn parse_text(raw: &str, data_type: &DataType) -> Option<Scalar> {
    let text = raw.trim();
    match data_type {
        DataType::Boolean => parse_bool(text).map(Scalar::Boolean),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            text.parse().ok().map(Scalar::Int)
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            text.parse().ok().map(Scalar::UInt)
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            text.parse().ok().map(Scalar::Float)
        }
        DataType::Decimal32(p, s)
        | DataType::Decimal64(p, s)
        | DataType::Decimal128(p, s)
        | DataType::Decimal256(p, s) => {
            let width = decimal_width(data_type);
            parse_decimal(text, *p, *s).and_then(|v| decimal_bytes(v, width)).map(Scalar::Decimal)
        }
        DataType::Date32 => parse_date(text)
            .map(|d| Scalar::Int((d.num_days_from_ce() - EPOCH_DAYS_FROM_CE) as i64))
            .or_else(|| text.parse().ok().map(Scalar::Int)),
        DataType::Date64 => parse_timestamp(text)
            .map(|t| Scalar::Int(t.timestamp_millis()))
            .or_else(|| text.parse().ok().map(Scalar::Int)),
        DataType::Timestamp(unit, _) => parse_timestamp(text)
            .and_then(|t| timestamp_in(t, *unit))
            .or_else(|| text.parse().ok())
            .map(Scalar::Int),
        DataType::Time32(unit) | DataType::Time64(unit) => parse_time(text)
            .map(|t| time_in(t, *unit))
            .or_else(|| text.parse().ok())
            .map(Scalar::Int),
        DataType::Duration(_) => text.parse().ok().map(Scalar::Int),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            Some(Scalar::Utf8(raw.to_string()))
        }
        DataType::Binary
        | DataType::LargeBinary
        | DataType::BinaryView
        | DataType::FixedSizeBinary(_) => STANDARD.decode(text).ok().map(Scalar::Binary),
        DataType::Dictionary(_, value) => parse_text(raw, value),
        _ => None,
    }
}

/// Most specific type a single non-null cell reads as.
pub(crate) fn infer_text(text: &str) -> DataType {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
        DataType::Boolean
    } else if text.parse::<i64>().is_ok() {
        DataType::Int64
    } else if text.parse::<f64>().is_ok() {
        DataType::Float64
    } else if parse_date(text).is_some() {
        DataType::Date32
    } else if DateTime::parse_from_rfc3339(text).is_ok() {
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
    } else if parse_naive_datetime(text).is_some() {
        DataType::Timestamp(TimeUnit::Microsecond, None)
    } else {
        DataType::Utf8
    }
}

/// Widens two inferred types to one that reads both. `Null` means no value
/// seen yet.
pub(crate) fn merge_inferred(a: DataType, b: DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a,
        (DataType::Null, t) | (t, DataType::Null) => t,
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        (DataType::Date32, t @ DataType::Timestamp(..))
        | (t @ DataType::Timestamp(..), DataType::Date32) => t,
        (DataType::List(a), DataType::List(b)) => DataType::list(merge_inferred(
            a.data_type.clone(),
            b.data_type.clone(),
        )),
        (DataType::Struct(a), DataType::Struct(b)) => {
            let mut fields = a;
            for field in b {
                match fields.iter_mut().find(|f| f.name == field.name) {
                    Some(existing) => {
                        existing.data_type =
                            merge_inferred(existing.data_type.clone(), field.data_type);
                    }
                    None => fields.push(field),
                }
            }
            DataType::Struct(fields)
        }
        _ => DataType::Utf8,
    }
}

/// Text form of a non-nested value of `data_type`.
///
/// # Errors
/// `UnsupportedOperation` for nested types, and for `Decimal256` values
/// beyond the 128-bit range.
pub(crate) fn format_text(value: &Scalar, data_type: &DataType) -> Result<String> {
    let unsupported =
        || InterchangeError::UnsupportedOperation(format!("{data_type} values as text"));
    let text = match (data_type, value) {
        (_, Scalar::Null) => String::new(),
        (DataType::Dictionary(_, inner), v) => return format_text(v, inner),
        (DataType::Date32, Scalar::Int(days)) => i32::try_from(*days)
            .ok()
            .and_then(|d| NaiveDate::from_num_days_from_ce_opt(d + EPOCH_DAYS_FROM_CE))
            .ok_or_else(unsupported)?
            .format("%Y-%m-%d")
            .to_string(),
        (DataType::Date64, Scalar::Int(ms)) => DateTime::from_timestamp_millis(*ms)
            .ok_or_else(unsupported)?
            .format("%Y-%m-%d")
            .to_string(),
        (DataType::Timestamp(unit, tz), Scalar::Int(v)) => {
            let t = timestamp_from(*v, *unit).ok_or_else(unsupported)?;
            match tz {
                Some(_) => t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                None => t.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            }
        }
        (DataType::Time32(unit) | DataType::Time64(unit), Scalar::Int(v)) => {
            let (secs, nanos) = split_unit(*v, *unit);
            u32::try_from(secs)
                .ok()
                .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, nanos))
                .ok_or_else(unsupported)?
                .format("%H:%M:%S%.f")
                .to_string()
        }
        (
            DataType::Decimal32(_, s)
            | DataType::Decimal64(_, s)
            | DataType::Decimal128(_, s)
            | DataType::Decimal256(_, s),
            Scalar::Decimal(bytes),
        ) => format_decimal(decimal_value(bytes).ok_or_else(unsupported)?, *s),
        (_, Scalar::Boolean(b)) => b.to_string(),
        (_, Scalar::Int(v)) => v.to_string(),
        (_, Scalar::UInt(v)) => v.to_string(),
        (_, Scalar::Float(v)) => format!("{v:?}"),
        (_, Scalar::Utf8(s)) => s.clone(),
        (_, Scalar::Binary(b)) => STANDARD.encode(b),
        _ => return Err(unsupported()),
    };
    Ok(text)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()
}

/// Instant of an RFC 3339 text, a naive datetime or a bare date, all in UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    parse_naive_datetime(text)
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
        .map(|t| t.and_utc())
}

fn timestamp_in(t: DateTime<Utc>, unit: TimeUnit) -> Option<i64> {
    match unit {
        TimeUnit::Second => Some(t.timestamp()),
        TimeUnit::Millisecond => Some(t.timestamp_millis()),
        TimeUnit::Microsecond => Some(t.timestamp_micros()),
        TimeUnit::Nanosecond => t.timestamp_nanos_opt(),
    }
}

fn time_in(t: NaiveTime, unit: TimeUnit) -> i64 {
    let secs = t.num_seconds_from_midnight() as i64;
    let nanos = t.nanosecond() as i64;
    match unit {
        TimeUnit::Second => secs,
        TimeUnit::Millisecond => secs * 1_000 + nanos / 1_000_000,
        TimeUnit::Microsecond => secs * 1_000_000 + nanos / 1_000,
        TimeUnit::Nanosecond => secs * 1_000_000_000 + nanos,
    }
}

/// Whole seconds and the nanosecond remainder of a value in `unit`.
fn split_unit(v: i64, unit: TimeUnit) -> (i64, u32) {
    let per_second = match unit {
        TimeUnit::Second => 1,
        TimeUnit::Millisecond => 1_000,
        TimeUnit::Microsecond => 1_000_000,
        TimeUnit::Nanosecond => 1_000_000_000,
    };
    let nanos = v.rem_euclid(per_second) * (1_000_000_000 / per_second);
    (v.div_euclid(per_second), nanos as u32)
}

fn timestamp_from(v: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    let (secs, nanos) = split_unit(v, unit);
    DateTime::from_timestamp(secs, nanos)
}

fn decimal_width(data_type: &DataType) -> usize {
    match data_type {
        DataType::Decimal32(..) => 4,
        DataType::Decimal64(..) => 8,
        DataType::Decimal256(..) => 32,
        _ => 16,
    }
}

/// Unscaled value of a decimal text, checked against the precision.
fn parse_decimal(text: &str, precision: u8, scale: i8) -> Option<i128> {
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if (whole.is_empty() && fraction.is_empty())
        || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let mut value: i128 = 0;
    let mut push = |d: u8| -> Option<()> {
        value = value.checked_mul(10)?.checked_add((d - b'0') as i128)?;
        Some(())
    };
    for d in whole.bytes() {
        push(d)?;
    }
    if scale >= 0 {
        let scale = scale as usize;
        let kept = fraction.trim_end_matches('0');
        if kept.len() > scale {
            return None;
        }
        for i in 0..scale {
            push(kept.as_bytes().get(i).copied().unwrap_or(b'0'))?;
        }
    } else {
        if !fraction.bytes().all(|b| b == b'0') {
            return None;
        }
        let divisor = 10i128.checked_pow(scale.unsigned_abs() as u32)?;
        if value % divisor != 0 {
            return None;
        }
        value /= divisor;
    }
    if value.unsigned_abs() >= 10u128.checked_pow(precision as u32).unwrap_or(u128::MAX) {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Little-endian bytes of `v` at `width`, or `None` when it does not fit.
/// Widths past 16 bytes are left for the builder to sign-extend.
fn decimal_bytes(v: i128, width: usize) -> Option<Vec<u8>> {
    let bytes = v.to_le_bytes();
    if width >= bytes.len() {
        return Some(bytes.to_vec());
    }
    let bits = width as u32 * 8;
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    (min..=max).contains(&v).then(|| bytes[..width].to_vec())
}

/// Sign-extended value of little-endian decimal bytes, if it fits `i128`.
fn decimal_value(bytes: &[u8]) -> Option<i128> {
    let negative = bytes.last().is_some_and(|b| b & 0x80 != 0);
    let fill = if negative { 0xFF } else { 0 };
    if bytes.len() > 16 && bytes[16..].iter().any(|&b| b != fill) {
        return None;
    }
    let mut buf = [fill; 16];
    let n = bytes.len().min(16);
    buf[..n].copy_from_slice(&bytes[..n]);
    let v = i128::from_le_bytes(buf);
    // Upper bytes were all sign bytes, but bit 127 must agree with them too.
    (bytes.len() <= 16 || (v < 0) == negative).then_some(v)
}

fn format_decimal(v: i128, scale: i8) -> String {
    let digits = v.unsigned_abs().to_string();
    let sign = if v < 0 { "-" } else { "" };
    if scale <= 0 {
        let zeros = if v == 0 { 0 } else { scale.unsigned_abs() as usize };
        return format!("{sign}{digits}{}", "0".repeat(zeros));
    }
    let scale = scale as usize;
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (whole, fraction) = padded.split_at(padded.len() - scale);
    format!("{sign}{whole}.{fraction}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporal_text_round_trips_through_the_unit() {
        let ts = DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()));
        let value = parse_text("2023-11-14T22:13:20.5Z", &ts).unwrap();
        assert_eq!(value, Scalar::Int(1_700_000_000_500));
        assert_eq!(format_text(&value, &ts).unwrap(), "2023-11-14T22:13:20.500Z");

        let naive = DataType::Timestamp(TimeUnit::Second, None);
        assert_eq!(parse_text("2023-11-14 22:13:20", &naive), Some(Scalar::Int(1_700_000_000)));
        assert_eq!(parse_text("1700000000", &naive), Some(Scalar::Int(1_700_000_000)));
        assert_eq!(
            format_text(&Scalar::Int(1_700_000_000), &naive).unwrap(),
            "2023-11-14T22:13:20"
        );

        assert_eq!(parse_text("1970-01-02", &DataType::Date32), Some(Scalar::Int(1)));
        assert_eq!(format_text(&Scalar::Int(-1), &DataType::Date32).unwrap(), "1969-12-31");

        let time = DataType::Time64(TimeUnit::Microsecond);
        assert_eq!(parse_text("00:00:01.25", &time), Some(Scalar::Int(1_250_000)));
        assert_eq!(format_text(&Scalar::Int(1_250_000), &time).unwrap(), "00:00:01.250");
    }

    #[test]
    fn decimals_respect_scale_and_precision() {
        let dt = DataType::Decimal32(5, 2);
        let value = parse_text("-12.3", &dt).unwrap();
        assert_eq!(value, Scalar::Decimal((-1230i32).to_le_bytes().to_vec()));
        assert_eq!(format_text(&value, &dt).unwrap(), "-12.30");
        assert_eq!(parse_text("1.234", &dt), None);
        assert_eq!(parse_text("1000.00", &dt), None);
        assert_eq!(format_decimal(5, 3), "0.005");
        assert_eq!(format_decimal(12, -2), "1200");
        assert_eq!(parse_decimal("1200", 5, -2), Some(12));
    }

    #[test]
    fn inference_widens_to_the_common_type() {
        let seen = ["1", "2.5", ""].iter().filter(|t| !t.is_empty()).map(|t| infer_text(t));
        assert_eq!(seen.fold(DataType::Null, merge_inferred), DataType::Float64);
        assert_eq!(merge_inferred(infer_text("2024-01-01"), infer_text("x")), DataType::Utf8);
        assert_eq!(
            merge_inferred(infer_text("2024-01-01"), infer_text("2024-01-01T10:00:00")),
            DataType::Timestamp(TimeUnit::Microsecond, None)
        );
        assert_eq!(infer_text("TRUE"), DataType::Boolean);
    }

    #[test]
    fn binary_cells_are_base64() {
        let value = parse_text("AAH/", &DataType::Binary).unwrap();
        assert_eq!(value, Scalar::Binary(vec![0, 1, 255]));
        assert_eq!(format_text(&value, &DataType::Binary).unwrap(), "AAH/");
        assert_eq!(parse_text("not base64!", &DataType::Binary), None);
    }
}
