//! Tagged column values.
//!
//! [`Datum`] is the runtime representation of a single column value as it
//! moves through resolution, generated-column evaluation and row insertion.
//! [`Kind`] is its fieldless discriminant, used wherever only the variant
//! matters (diagnostics, type dispatch).

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Discriminant of a [`Datum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Null,
    Int64,
    Uint64,
    Float32,
    Float64,
    String,
    Bytes,
    BinaryLiteral,
    Decimal,
    Duration,
    Enum,
    Bit,
    Set,
    Time,
    Interface,
    MinNotNull,
    MaxValue,
    Raw,
    Json,
}

impl Kind {
    /// Short lowercase name used in log output.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Int64 => "int64",
            Kind::Uint64 => "uint64",
            Kind::Float32 => "float32",
            Kind::Float64 => "float64",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::BinaryLiteral => "binary",
            Kind::Decimal => "decimal",
            Kind::Duration => "duration",
            Kind::Enum => "enum",
            Kind::Bit => "bit",
            Kind::Set => "set",
            Kind::Time => "time",
            Kind::Interface => "interface",
            Kind::MinNotNull => "min",
            Kind::MaxValue => "max",
            Kind::Raw => "raw",
            Kind::Json => "json",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A signed time-of-day span (`TIME` column), with fractional-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duration {
    /// Total nanoseconds; negative for negative durations.
    pub nanos: i64,
    /// Fractional second digits to display (0-6).
    pub fsp: u8,
}

impl Duration {
    /// Largest representable magnitude: `838:59:59`.
    pub const MAX_NANOS: i64 = (838 * 3600 + 59 * 60 + 59) * NANOS_PER_SEC;

    pub fn new(nanos: i64, fsp: u8) -> Self {
        Self {
            nanos,
            fsp: fsp.min(6),
        }
    }

    /// Smallest representable duration, `-838:59:59`.
    pub fn min(fsp: u8) -> Self {
        Self::new(-Self::MAX_NANOS, fsp)
    }

    /// Nanoseconds of an `hours:minutes:seconds` reading, or `None` when a
    /// field is out of range.
    pub fn clock_nanos(hours: i64, minutes: i64, seconds: i64) -> Option<i64> {
        if !(0..=838).contains(&hours) || !(0..60).contains(&minutes) || !(0..60).contains(&seconds)
        {
            return None;
        }
        Some((hours * 3600 + minutes * 60 + seconds) * NANOS_PER_SEC)
    }

    /// Parse `[-]HH:MM:SS[.ffffff]` or `[-]HH:MM`.
    pub fn parse(s: &str, fsp: u8) -> Option<Self> {
        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (clock, frac) = match body.split_once('.') {
            Some((clock, frac)) => (clock, Some(frac)),
            None => (body, None),
        };
        let mut parts = clock.split(':');
        let hours: i64 = parts.next()?.parse().ok()?;
        let minutes: i64 = parts.next()?.parse().ok()?;
        let seconds: i64 = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        let whole = Self::clock_nanos(hours, minutes, seconds)?;
        let mut frac_nanos = 0i64;
        if let Some(frac) = frac {
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let digits: String = frac.chars().take(9).collect();
            let scale = 10i64.pow(9 - digits.len() as u32);
            frac_nanos = digits.parse::<i64>().ok()? * scale;
        }
        let total = whole + frac_nanos;
        if total > Self::MAX_NANOS {
            return None;
        }
        Some(Self::new(if negative { -total } else { total }, fsp))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.nanos.unsigned_abs();
        let secs = abs / NANOS_PER_SEC as u64;
        let frac = abs % NANOS_PER_SEC as u64;
        if self.nanos < 0 {
            f.write_str("-")?;
        }
        write!(f, "{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)?;
        if self.fsp > 0 {
            let digits = format!("{:09}", frac);
            write!(f, ".{}", &digits[..self.fsp as usize])?;
        }
        Ok(())
    }
}

/// A calendar value for `DATE`, `DATETIME` and `TIMESTAMP` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    pub datetime: NaiveDateTime,
    /// Render without the time-of-day part.
    pub date_only: bool,
    /// Fractional second digits to display (0-6).
    pub fsp: u8,
}

impl Time {
    pub fn datetime(datetime: NaiveDateTime, fsp: u8) -> Self {
        Self {
            datetime,
            date_only: false,
            fsp: fsp.min(6),
        }
    }

    pub fn date(date: NaiveDate) -> Self {
        Self {
            datetime: date.and_time(NaiveTime::default()),
            date_only: true,
            fsp: 0,
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.date_only {
            return write!(f, "{}", self.datetime.format("%Y-%m-%d"));
        }
        write!(f, "{}", self.datetime.format("%Y-%m-%d %H:%M:%S"))?;
        if self.fsp > 0 {
            let digits = format!("{:09}", self.datetime.nanosecond() % NANOS_PER_SEC as u32);
            write!(f, ".{}", &digits[..self.fsp as usize])?;
        }
        Ok(())
    }
}

/// A single column value.
///
/// The variant fully determines which payload is present. `MinNotNull` and
/// `MaxValue` are range-scan sentinels; they never belong in a committed row
/// but can show up in diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    BinaryLiteral(Vec<u8>),
    Decimal(Decimal),
    Duration(Duration),
    /// Enum member: its name and 1-based position in the definition.
    Enum { name: String, value: u64 },
    /// Bit value, big-endian.
    Bit(Vec<u8>),
    /// Set members joined by `,` and the member bitmap.
    Set { name: String, value: u64 },
    Time(Time),
    /// Opaque host value, carried by description only.
    Interface(String),
    MinNotNull,
    MaxValue,
    /// Already-encoded bytes passed through untouched.
    Raw(Vec<u8>),
    Json(serde_json::Value),
}

impl Datum {
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Datum::Null => Kind::Null,
            Datum::Int64(_) => Kind::Int64,
            Datum::Uint64(_) => Kind::Uint64,
            Datum::Float32(_) => Kind::Float32,
            Datum::Float64(_) => Kind::Float64,
            Datum::String(_) => Kind::String,
            Datum::Bytes(_) => Kind::Bytes,
            Datum::BinaryLiteral(_) => Kind::BinaryLiteral,
            Datum::Decimal(_) => Kind::Decimal,
            Datum::Duration(_) => Kind::Duration,
            Datum::Enum { .. } => Kind::Enum,
            Datum::Bit(_) => Kind::Bit,
            Datum::Set { .. } => Kind::Set,
            Datum::Time(_) => Kind::Time,
            Datum::Interface(_) => Kind::Interface,
            Datum::MinNotNull => Kind::MinNotNull,
            Datum::MaxValue => Kind::MaxValue,
            Datum::Raw(_) => Kind::Raw,
            Datum::Json(_) => Kind::Json,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Render the value as SQL text.
    ///
    /// Returns `None` for kinds that have no textual form: null, the two
    /// sentinels, opaque interface values and raw encoded bytes.
    pub fn to_sql_string(&self) -> Option<String> {
        let s = match self {
            Datum::Int64(v) => v.to_string(),
            Datum::Uint64(v) => v.to_string(),
            Datum::Float32(v) => v.to_string(),
            Datum::Float64(v) => v.to_string(),
            Datum::String(v) => v.clone(),
            Datum::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
            Datum::BinaryLiteral(v) | Datum::Bit(v) => hex_literal(v),
            Datum::Decimal(v) => v.to_string(),
            Datum::Duration(v) => v.to_string(),
            Datum::Enum { name, .. } | Datum::Set { name, .. } => name.clone(),
            Datum::Time(v) => v.to_string(),
            Datum::Json(v) => v.to_string(),
            Datum::Null
            | Datum::Interface(_)
            | Datum::MinNotNull
            | Datum::MaxValue
            | Datum::Raw(_) => return None,
        };
        Some(s)
    }

    /// Integer view of numeric kinds. Unsigned values are reinterpreted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int64(v) => Some(*v),
            Datum::Uint64(v) => Some(*v as i64),
            Datum::Enum { value, .. } | Datum::Set { value, .. } => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int64(v) => Some(*v as f64),
            Datum::Uint64(v) => Some(*v as f64),
            Datum::Float32(v) => Some(f64::from(*v)),
            Datum::Float64(v) => Some(*v),
            Datum::Decimal(v) => v.to_string().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(v) => Some(v),
            Datum::Bytes(v) => std::str::from_utf8(v).ok(),
            _ => None,
        }
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int64(v)
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Int64(i64::from(v))
    }
}

impl From<u64> for Datum {
    fn from(v: u64) -> Self {
        Datum::Uint64(v)
    }
}

impl From<f32> for Datum {
    fn from(v: f32) -> Self {
        Datum::Float32(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Float64(v)
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::String(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::String(v.to_string())
    }
}

impl From<Vec<u8>> for Datum {
    fn from(v: Vec<u8>) -> Self {
        Datum::Bytes(v)
    }
}

impl From<Decimal> for Datum {
    fn from(v: Decimal) -> Self {
        Datum::Decimal(v)
    }
}

impl From<Duration> for Datum {
    fn from(v: Duration) -> Self {
        Datum::Duration(v)
    }
}

impl From<Time> for Datum {
    fn from(v: Time) -> Self {
        Datum::Time(v)
    }
}

impl From<serde_json::Value> for Datum {
    fn from(v: serde_json::Value) -> Self {
        Datum::Json(v)
    }
}
