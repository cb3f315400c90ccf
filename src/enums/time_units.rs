//! # **TimeUnits Module** - *Arrow Temporal Units*
//!
//! `TimeUnit` standardises second, millisecond, microsecond and nanosecond
//! resolution across `Time32`, `Time64`, `Timestamp` and `Duration` types.
//!
//! Each unit maps onto the single-character code used by the Arrow C format
//! strings (`s`, `m`, `u`, `n`), so the FFI and IPC layers can round-trip it.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// # TimeUnit
///
/// Resolution of a temporal value.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default, PartialOrd, Ord)]
pub enum TimeUnit {
    Second,
    #[default]
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl TimeUnit {
    /// Arrow C format character.
    pub fn format_char(self) -> char {
        match self {
            TimeUnit::Second => 's',
            TimeUnit::Millisecond => 'm',
            TimeUnit::Microsecond => 'u',
            TimeUnit::Nanosecond => 'n',
        }
    }

    /// Inverse of [`TimeUnit::format_char`].
    pub fn from_format_char(c: u8) -> Option<Self> {
        match c {
            b's' => Some(TimeUnit::Second),
            b'm' => Some(TimeUnit::Millisecond),
            b'u' => Some(TimeUnit::Microsecond),
            b'n' => Some(TimeUnit::Nanosecond),
            _ => None,
        }
    }

    /// Compact numeric code used by the wire codecs.
    pub(crate) fn code(self) -> u8 {
        match self {
            TimeUnit::Second => 0,
            TimeUnit::Millisecond => 1,
            TimeUnit::Microsecond => 2,
            TimeUnit::Nanosecond => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TimeUnit::Second),
            1 => Some(TimeUnit::Millisecond),
            2 => Some(TimeUnit::Microsecond),
            3 => Some(TimeUnit::Nanosecond),
            _ => None,
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TimeUnit::Second => f.write_str("s"),
            TimeUnit::Millisecond => f.write_str("ms"),
            TimeUnit::Microsecond => f.write_str("us"),
            TimeUnit::Nanosecond => f.write_str("ns"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_chars_round_trip() {
        for unit in [
            TimeUnit::Second,
            TimeUnit::Millisecond,
            TimeUnit::Microsecond,
            TimeUnit::Nanosecond,
        ] {
            assert_eq!(
                TimeUnit::from_format_char(unit.format_char() as u8),
                Some(unit)
            );
            assert_eq!(TimeUnit::from_code(unit.code()), Some(unit));
        }
        assert_eq!(TimeUnit::from_format_char(b'x'), None);
    }
}
