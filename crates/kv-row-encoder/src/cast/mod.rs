//! Conversion of input values to their column types.
//!
//! [`StandardCaster`] coerces a [`Datum`] of any kind into the representation
//! its column stores. A conversion that loses information (an out-of-range
//! integer, an over-long string, an unparseable date) fails with
//! [`EncodeError::Cast`] when the session casts strictly. Otherwise the value
//! is clamped or truncated and a warning is appended to the session.
//!
//! Nulls pass through untouched; `NOT NULL` enforcement happens in the
//! encoder, which knows whether a default or zero value applies.

mod values;

pub use values::{bit_byte_len, max_decimal, min_value, zero_value};

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::core::{ColumnInfo, Datum, Duration, MysqlType, Time, TypeCaster};
use crate::error::{EncodeError, Result};
use crate::session::Session;

/// Longest rendering of the offending value kept in a cast error.
const MAX_ERROR_VALUE_CHARS: usize = 64;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Casts values the way a MySQL-compatible column store does.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCaster;

impl TypeCaster for StandardCaster {
    fn cast_value(&self, session: &mut Session, value: &Datum, col: &ColumnInfo) -> Result<Datum> {
        let mut cast = Cast {
            session,
            value,
            col,
        };
        match value {
            Datum::Null => return Ok(Datum::Null),
            Datum::Raw(_) => return Ok(value.clone()),
            Datum::MinNotNull | Datum::MaxValue | Datum::Interface(_) => {
                return Err(cast.error(format!("{} values cannot be stored", value.kind())));
            }
            _ => {}
        }
        match col.field_type.tp {
            MysqlType::Tiny
            | MysqlType::Short
            | MysqlType::Int24
            | MysqlType::Long
            | MysqlType::LongLong => cast.integer(),
            MysqlType::Float | MysqlType::Double => cast.float(),
            MysqlType::NewDecimal => cast.decimal(),
            MysqlType::Varchar | MysqlType::String => cast.string(),
            MysqlType::Blob => cast.blob(),
            MysqlType::Date | MysqlType::Datetime | MysqlType::Timestamp => cast.time(),
            MysqlType::Duration => cast.duration(),
            MysqlType::Year => cast.year(),
            MysqlType::Enum => cast.enumeration(),
            MysqlType::Set => cast.set(),
            MysqlType::Bit => cast.bit(),
            MysqlType::Json => cast.json(),
        }
    }
}

/// One in-flight conversion.
struct Cast<'a> {
    session: &'a mut Session,
    value: &'a Datum,
    col: &'a ColumnInfo,
}

impl Cast<'_> {
    fn error(&self, reason: impl Into<String>) -> EncodeError {
        EncodeError::cast(
            &self.col.name,
            &self.col.field_type,
            describe(self.value),
            reason,
        )
    }

    /// Fail when strict, otherwise store `fallback` and record a warning.
    fn lossy(&mut self, reason: &str, fallback: Datum) -> Result<Datum> {
        if self.session.strict_cast() {
            return Err(self.error(reason));
        }
        self.session.append_warning(format!(
            "{} for column '{}' (value {})",
            reason,
            self.col.name,
            describe(self.value)
        ));
        Ok(fallback)
    }

    fn integer(&mut self) -> Result<Datum> {
        let ft = &self.col.field_type;
        let Some(n) = integer_value(self.value) else {
            let zero = zero_value(ft);
            return self.lossy("incorrect integer value", zero);
        };
        if ft.unsigned {
            let upper = ft.tp.unsigned_upper_bound().unwrap_or(u64::MAX);
            if n < 0 {
                return self.lossy("out of range value", Datum::Uint64(0));
            }
            if n > i128::from(upper) {
                return self.lossy("out of range value", Datum::Uint64(upper));
            }
            return Ok(Datum::Uint64(n as u64));
        }
        let (lower, upper) = ft.tp.signed_bounds().unwrap_or((i64::MIN, i64::MAX));
        if n < i128::from(lower) {
            return self.lossy("out of range value", Datum::Int64(lower));
        }
        if n > i128::from(upper) {
            return self.lossy("out of range value", Datum::Int64(upper));
        }
        Ok(Datum::Int64(n as i64))
    }

    fn float(&mut self) -> Result<Datum> {
        let ft = &self.col.field_type;
        let single = ft.tp == MysqlType::Float;
        let wrap = |f: f64| {
            if single {
                Datum::Float32(f as f32)
            } else {
                Datum::Float64(f)
            }
        };
        let Some(mut f) = float_value(self.value) else {
            return self.lossy("incorrect float value", wrap(0.0));
        };

        let mut limit = if single { f64::from(f32::MAX) } else { f64::MAX };
        if ft.flen > 0 && ft.decimal >= 0 && ft.decimal <= ft.flen {
            let scale = 10f64.powi(ft.decimal);
            f = (f * scale).round() / scale;
            limit = limit.min(10f64.powi(ft.flen - ft.decimal) - 1.0 / scale);
        }
        if f.abs() > limit {
            return self.lossy("out of range value", wrap(limit.copysign(f)));
        }
        if ft.unsigned && f < 0.0 {
            return self.lossy("out of range value", wrap(0.0));
        }
        Ok(wrap(f))
    }

    fn decimal(&mut self) -> Result<Datum> {
        let ft = &self.col.field_type;
        let Some(mut d) = decimal_value(self.value) else {
            return self.lossy("incorrect decimal value", Datum::Decimal(Decimal::ZERO));
        };
        if ft.decimal >= 0 {
            d = d.round_dp_with_strategy(ft.decimal as u32, RoundingStrategy::MidpointAwayFromZero);
        }
        if let Some(max) = max_decimal(ft.flen, ft.decimal) {
            if d.abs() > max {
                let clamped = if d.is_sign_negative() { -max } else { max };
                return self.lossy("out of range value", Datum::Decimal(clamped));
            }
        }
        if ft.unsigned && d.is_sign_negative() && !d.is_zero() {
            return self.lossy("out of range value", Datum::Decimal(Decimal::ZERO));
        }
        Ok(Datum::Decimal(d))
    }

    fn string(&mut self) -> Result<Datum> {
        let ft = &self.col.field_type;
        let Some(text) = self.value.to_sql_string() else {
            return Err(self.error("value has no textual form"));
        };
        if ft.flen >= 0 {
            let limit = ft.flen as usize;
            if text.chars().count() > limit {
                let truncated: String = text.chars().take(limit).collect();
                return self.lossy("data too long", Datum::String(truncated));
            }
        }
        Ok(Datum::String(text))
    }

    fn blob(&mut self) -> Result<Datum> {
        let ft = &self.col.field_type;
        let bytes = match self.value {
            Datum::Bytes(b) | Datum::BinaryLiteral(b) | Datum::Bit(b) => b.clone(),
            Datum::String(s) => s.as_bytes().to_vec(),
            other => match other.to_sql_string() {
                Some(s) => s.into_bytes(),
                None => return Err(self.error("value has no byte form")),
            },
        };
        if ft.flen >= 0 && bytes.len() > ft.flen as usize {
            let truncated = bytes[..ft.flen as usize].to_vec();
            return self.lossy("data too long", Datum::Bytes(truncated));
        }
        Ok(Datum::Bytes(bytes))
    }

    fn time(&mut self) -> Result<Datum> {
        let ft = &self.col.field_type;
        let parsed = match self.value {
            Datum::Time(t) => Some(t.datetime),
            Datum::String(_) | Datum::Bytes(_) => self.value.as_str().and_then(parse_datetime),
            Datum::Int64(_) | Datum::Uint64(_) | Datum::Decimal(_) => self
                .value
                .to_sql_string()
                .as_deref()
                .and_then(parse_datetime),
            _ => None,
        };
        let Some(dt) = parsed else {
            let zero = zero_value(ft);
            return self.lossy("incorrect datetime value", zero);
        };

        let fsp = ft.fsp();
        match ft.tp {
            MysqlType::Date => Ok(Datum::Time(Time::date(dt.date()))),
            MysqlType::Timestamp if !timestamp_in_range(&dt) => {
                let zero = zero_value(ft);
                self.lossy("out of range timestamp", zero)
            }
            _ => Ok(Datum::Time(Time::datetime(truncate_fraction(dt, fsp), fsp))),
        }
    }

    fn duration(&mut self) -> Result<Datum> {
        let fsp = self.col.field_type.fsp();
        let parsed = match self.value {
            Datum::Duration(d) => Some(*d),
            Datum::Time(t) => {
                let tm = t.datetime.time();
                let secs = i64::from(tm.num_seconds_from_midnight());
                Some(Duration::new(secs * NANOS_PER_SEC + i64::from(tm.nanosecond()), fsp))
            }
            Datum::String(_) | Datum::Bytes(_) => {
                self.value.as_str().and_then(|s| parse_duration(s, fsp))
            }
            Datum::Int64(_) | Datum::Uint64(_) => self
                .value
                .to_sql_string()
                .and_then(|s| parse_duration(&s, fsp)),
            _ => None,
        };
        match parsed {
            Some(d) => {
                let step = 10i64.pow(9 - u32::from(fsp));
                Ok(Datum::Duration(Duration::new(d.nanos - d.nanos % step, fsp)))
            }
            None => self.lossy("incorrect time value", Datum::Duration(Duration::new(0, fsp))),
        }
    }

    fn year(&mut self) -> Result<Datum> {
        let textual = matches!(self.value, Datum::String(_) | Datum::Bytes(_));
        let Some(n) = integer_value(self.value) else {
            return self.lossy("incorrect year value", Datum::Int64(0));
        };
        let year = match n {
            0 if !textual => 0,
            0..=69 => 2000 + n,
            70..=99 => 1900 + n,
            1901..=2155 => n,
            _ => return self.lossy("out of range value", Datum::Int64(0)),
        };
        Ok(Datum::Int64(year as i64))
    }

    fn enumeration(&mut self) -> Result<Datum> {
        let elems = &self.col.field_type.elems;
        let empty = Datum::Enum {
            name: String::new(),
            value: 0,
        };
        let index = match self.value {
            Datum::String(_) | Datum::Bytes(_) | Datum::Enum { .. } => {
                let name = match self.value {
                    Datum::Enum { name, .. } => Some(name.as_str()),
                    other => other.as_str(),
                };
                name.and_then(|name| {
                    find_member(elems, name)
                        .or_else(|| name.trim().parse::<usize>().ok().filter(|&i| i > 0))
                })
            }
            other => integer_value(other).and_then(|n| usize::try_from(n).ok()).filter(|&i| i > 0),
        };
        match index {
            Some(i) if i <= elems.len() => Ok(Datum::Enum {
                name: elems[i - 1].clone(),
                value: i as u64,
            }),
            _ => self.lossy("incorrect enum value", empty),
        }
    }

    fn set(&mut self) -> Result<Datum> {
        let elems = &self.col.field_type.elems;
        let empty = Datum::Set {
            name: String::new(),
            value: 0,
        };
        let bitmap = match self.value {
            Datum::String(_) | Datum::Bytes(_) | Datum::Set { .. } => {
                let names = match self.value {
                    Datum::Set { name, .. } => Some(name.as_str()),
                    other => other.as_str(),
                };
                names.and_then(|names| set_bitmap(elems, names))
            }
            other => integer_value(other)
                .and_then(|n| u64::try_from(n).ok())
                .filter(|&n| elems.len() >= 64 || n >> elems.len() == 0),
        };
        match bitmap {
            Some(value) => Ok(Datum::Set {
                name: set_names(elems, value),
                value,
            }),
            None => self.lossy("incorrect set value", empty),
        }
    }

    fn bit(&mut self) -> Result<Datum> {
        let ft = &self.col.field_type;
        let width = if ft.flen > 0 { ft.flen.min(64) as u32 } else { 1 };
        let len = width.div_ceil(8) as usize;
        let parsed = match self.value {
            Datum::Bit(b) | Datum::BinaryLiteral(b) | Datum::Bytes(b) => bytes_to_u64(b),
            Datum::String(s) => bytes_to_u64(s.as_bytes()),
            other => integer_value(other).and_then(|n| u64::try_from(n).ok()),
        };
        let Some(n) = parsed else {
            return self.lossy("incorrect bit value", Datum::Bit(vec![0; len]));
        };
        let max = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        if n > max {
            return self.lossy("out of range value", Datum::Bit(pack_bits(max, len)));
        }
        Ok(Datum::Bit(pack_bits(n, len)))
    }

    /// Invalid JSON text is rejected even when casting leniently.
    fn json(&mut self) -> Result<Datum> {
        let json = match self.value {
            Datum::Json(v) => v.clone(),
            Datum::String(_) | Datum::Bytes(_) => {
                let text = self
                    .value
                    .as_str()
                    .ok_or_else(|| self.error("invalid JSON text: not valid UTF-8"))?;
                serde_json::from_str(text)
                    .map_err(|e| self.error(format!("invalid JSON text: {}", e)))?
            }
            Datum::Int64(v) => serde_json::Value::from(*v),
            Datum::Uint64(v) => serde_json::Value::from(*v),
            Datum::Float32(_) | Datum::Float64(_) | Datum::Decimal(_) => self
                .value
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .ok_or_else(|| self.error("number cannot be represented in JSON"))?,
            other => match other.to_sql_string() {
                Some(s) => serde_json::Value::String(s),
                None => return Err(self.error("value has no JSON form")),
            },
        };
        Ok(Datum::Json(json))
    }
}

/// Render a value for an error or warning message.
fn describe(value: &Datum) -> String {
    let text = value
        .to_sql_string()
        .unwrap_or_else(|| format!("<{}>", value.kind()));
    if text.chars().count() > MAX_ERROR_VALUE_CHARS {
        let head: String = text.chars().take(MAX_ERROR_VALUE_CHARS).collect();
        format!("{}...", head)
    } else {
        text
    }
}

fn integer_value(value: &Datum) -> Option<i128> {
    match value {
        Datum::Int64(v) => Some(i128::from(*v)),
        Datum::Uint64(v) => Some(i128::from(*v)),
        Datum::Float32(v) => round_float(f64::from(*v)),
        Datum::Float64(v) => round_float(*v),
        Datum::Decimal(d) => d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero).to_i128(),
        Datum::String(_) | Datum::Bytes(_) => parse_integer(value.as_str()?),
        Datum::Enum { value, .. } | Datum::Set { value, .. } => Some(i128::from(*value)),
        Datum::Bit(b) | Datum::BinaryLiteral(b) => bytes_to_u64(b).map(i128::from),
        Datum::Json(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().and_then(round_float)),
        Datum::Json(serde_json::Value::Bool(b)) => Some(i128::from(*b)),
        _ => None,
    }
}

/// Round half away from zero; saturates far outside the `i64` range.
fn round_float(f: f64) -> Option<i128> {
    f.is_finite().then(|| f.round() as i128)
}

fn parse_integer(s: &str) -> Option<i128> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i128>() {
        return Some(n);
    }
    s.parse::<f64>().ok().and_then(round_float)
}

fn float_value(value: &Datum) -> Option<f64> {
    let f = match value {
        Datum::String(_) | Datum::Bytes(_) => value.as_str()?.trim().parse::<f64>().ok()?,
        Datum::Enum { value, .. } | Datum::Set { value, .. } => *value as f64,
        Datum::Bit(b) | Datum::BinaryLiteral(b) => bytes_to_u64(b)? as f64,
        Datum::Json(serde_json::Value::Number(n)) => n.as_f64()?,
        other => other.as_f64()?,
    };
    f.is_finite().then_some(f)
}

fn decimal_value(value: &Datum) -> Option<Decimal> {
    match value {
        Datum::Decimal(d) => Some(*d),
        Datum::Int64(v) => Some(Decimal::from(*v)),
        Datum::Uint64(v) => Some(Decimal::from(*v)),
        Datum::Float32(v) => Decimal::from_f32(*v),
        Datum::Float64(v) => Decimal::from_f64(*v),
        Datum::String(_) | Datum::Bytes(_) => {
            let s = value.as_str()?.trim();
            Decimal::from_str(s)
                .ok()
                .or_else(|| Decimal::from_scientific(s).ok())
        }
        Datum::Enum { value, .. } | Datum::Set { value, .. } => Some(Decimal::from(*value)),
        Datum::Json(serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn bytes_to_u64(bytes: &[u8]) -> Option<u64> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let significant = &bytes[start..];
    if significant.len() > 8 {
        return None;
    }
    Some(significant.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn pack_bits(n: u64, len: usize) -> Vec<u8> {
    n.to_be_bytes()[8 - len.min(8)..].to_vec()
}

fn find_member(elems: &[String], name: &str) -> Option<usize> {
    let name = name.trim_end_matches(' ');
    elems
        .iter()
        .position(|e| e.eq_ignore_ascii_case(name))
        .map(|i| i + 1)
}

/// Bitmap of the comma-separated `names`, or `None` if one is not a member.
fn set_bitmap(elems: &[String], names: &str) -> Option<u64> {
    if names.is_empty() {
        return Some(0);
    }
    names.split(',').try_fold(0u64, |acc, name| {
        let i = find_member(elems, name)?;
        (i <= 64).then(|| acc | (1u64 << (i - 1)))
    })
}

/// Member names of `bitmap` in definition order.
fn set_names(elems: &[String], bitmap: u64) -> String {
    elems
        .iter()
        .take(64)
        .enumerate()
        .filter(|(i, _)| bitmap & (1u64 << i) != 0)
        .map(|(_, e)| e.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse the datetime literal forms a dump file carries.
///
/// Accepts `YYYY-MM-DD[ hh:mm[:ss[.ffffff]]]` and the compact digit forms
/// `YYYYMMDD` and `YYYYMMDDhhmmss`.
fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return parse_compact_datetime(s);
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::default()))
}

fn parse_compact_datetime(digits: &str) -> Option<NaiveDateTime> {
    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u32>().ok();
    let date = NaiveDate::from_ymd_opt(field(0..4)? as i32, field(4..6)?, field(6..8)?)?;
    match digits.len() {
        8 => Some(date.and_time(NaiveTime::default())),
        14 => date.and_hms_opt(field(8..10)?, field(10..12)?, field(12..14)?),
        _ => None,
    }
}

/// `[-]hh:mm[:ss[.f]]` or the compact `[-]hhmmss` form.
fn parse_duration(s: &str, fsp: u8) -> Option<Duration> {
    let s = s.trim();
    if s.contains(':') {
        return Duration::parse(s, fsp);
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let n: i64 = digits.parse().ok()?;
    let nanos = Duration::clock_nanos(n / 10_000, (n / 100) % 100, n % 100)?;
    if nanos > Duration::MAX_NANOS {
        return None;
    }
    Some(Duration::new(if negative { -nanos } else { nanos }, fsp))
}

fn timestamp_in_range(dt: &NaiveDateTime) -> bool {
    let lower = NaiveDate::from_ymd_opt(1970, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 1));
    let upper = NaiveDate::from_ymd_opt(2038, 1, 19).and_then(|d| d.and_hms_opt(3, 14, 7));
    match (lower, upper) {
        (Some(lower), Some(upper)) => (lower..=upper).contains(dt),
        _ => false,
    }
}

fn truncate_fraction(dt: NaiveDateTime, fsp: u8) -> NaiveDateTime {
    let step = 10u32.pow(9 - u32::from(fsp.min(6)));
    let nanos = dt.nanosecond();
    dt.with_nanosecond(nanos - nanos % step).unwrap_or(dt)
}
