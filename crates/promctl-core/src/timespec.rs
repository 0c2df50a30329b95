//! Time spans in the managed server's flag syntax: a positive integer
//! followed by one of `y`, `w`, `d`, `h`, `m`, `s` ("15d", "30s").

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Years,
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'y' => Some(Self::Years),
            'w' => Some(Self::Weeks),
            'd' => Some(Self::Days),
            'h' => Some(Self::Hours),
            'm' => Some(Self::Minutes),
            's' => Some(Self::Seconds),
            _ => None,
        }
    }

    pub fn suffix(self) -> char {
        match self {
            Self::Years => 'y',
            Self::Weeks => 'w',
            Self::Days => 'd',
            Self::Hours => 'h',
            Self::Minutes => 'm',
            Self::Seconds => 's',
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeSpecError {
    #[error("empty time spec")]
    Empty,

    #[error("invalid unit {0:?} in time spec")]
    InvalidUnit(char),

    #[error("cannot convert {0:?} to an integer")]
    NotAnInteger(String),

    #[error("expected a positive time spec but got {0}")]
    NotPositive(i64),
}

/// A validated time span. Rendered back exactly as `{value}{unit}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpec {
    value: u64,
    unit: TimeUnit,
}

impl TimeSpec {
    /// Interval and timeout of the self-monitoring scrape job.
    pub const FIVE_SECONDS: TimeSpec = TimeSpec {
        value: 5,
        unit: TimeUnit::Seconds,
    };
}

impl FromStr for TimeSpec {
    type Err = TimeSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unit_char = s.chars().last().ok_or(TimeSpecError::Empty)?;
        let unit = TimeUnit::from_suffix(unit_char).ok_or(TimeSpecError::InvalidUnit(unit_char))?;

        let digits = &s[..s.len() - unit_char.len_utf8()];
        let value: i64 = digits
            .parse()
            .map_err(|_| TimeSpecError::NotAnInteger(digits.to_string()))?;
        if value <= 0 {
            return Err(TimeSpecError::NotPositive(value));
        }

        Ok(Self {
            value: value as u64,
            unit,
        })
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl Serialize for TimeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
