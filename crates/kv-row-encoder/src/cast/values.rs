//! Distinguished values of each field type.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::core::{Datum, Duration, FieldType, MysqlType, Time};

/// Largest number of significant digits a [`Decimal`] holds.
const MAX_DECIMAL_DIGITS: i32 = 28;

/// Placeholder stored in a generated column before its expression runs.
///
/// Types without a natural minimum get the `MinNotNull` sentinel.
pub fn min_value(ft: &FieldType) -> Datum {
    match ft.tp {
        tp if tp.is_integer() => {
            if ft.unsigned {
                Datum::Uint64(0)
            } else {
                let (lower, _) = tp.signed_bounds().unwrap_or((i64::MIN, i64::MAX));
                Datum::Int64(lower)
            }
        }
        MysqlType::Float => Datum::Float32(f32::MIN),
        MysqlType::Double => Datum::Float64(f64::MIN),
        MysqlType::Varchar | MysqlType::String => Datum::String(String::new()),
        MysqlType::NewDecimal => match max_decimal(ft.flen, ft.decimal) {
            Some(max) => Datum::Decimal(-max),
            None => Datum::Decimal(Decimal::MIN),
        },
        MysqlType::Duration => Datum::Duration(Duration::min(ft.fsp())),
        MysqlType::Date => Datum::Time(Time::date(min_supported_date())),
        MysqlType::Datetime => Datum::Time(Time::datetime(
            min_supported_date().and_time(chrono::NaiveTime::default()),
            ft.fsp(),
        )),
        MysqlType::Timestamp => Datum::Time(Time::datetime(min_timestamp(), ft.fsp())),
        _ => Datum::MinNotNull,
    }
}

/// Value substituted for a null in a `NOT NULL` column when not strict.
pub fn zero_value(ft: &FieldType) -> Datum {
    match ft.tp {
        MysqlType::Tiny
        | MysqlType::Short
        | MysqlType::Int24
        | MysqlType::Long
        | MysqlType::LongLong => {
            if ft.unsigned {
                Datum::Uint64(0)
            } else {
                Datum::Int64(0)
            }
        }
        MysqlType::Year => Datum::Int64(0),
        MysqlType::Float => Datum::Float32(0.0),
        MysqlType::Double => Datum::Float64(0.0),
        MysqlType::NewDecimal => Datum::Decimal(Decimal::ZERO),
        MysqlType::Varchar | MysqlType::String => Datum::String(String::new()),
        MysqlType::Blob => Datum::Bytes(Vec::new()),
        MysqlType::Date => Datum::Time(Time::date(zero_datetime().date())),
        MysqlType::Datetime | MysqlType::Timestamp => {
            Datum::Time(Time::datetime(zero_datetime(), ft.fsp()))
        }
        MysqlType::Duration => Datum::Duration(Duration::new(0, ft.fsp())),
        MysqlType::Enum => Datum::Enum {
            name: String::new(),
            value: 0,
        },
        MysqlType::Set => Datum::Set {
            name: String::new(),
            value: 0,
        },
        MysqlType::Bit => Datum::Bit(vec![0; bit_byte_len(ft)]),
        MysqlType::Json => Datum::Json(serde_json::Value::Null),
    }
}

/// `99..9.9..9` with `flen - decimal` integer and `decimal` fraction digits.
pub fn max_decimal(flen: i32, decimal: i32) -> Option<Decimal> {
    if flen <= 0 || flen > MAX_DECIMAL_DIGITS {
        return None;
    }
    let scale = decimal.clamp(0, flen);
    let int_digits = (flen - scale) as usize;
    let mut s = if int_digits == 0 {
        "0".to_string()
    } else {
        "9".repeat(int_digits)
    };
    if scale > 0 {
        s.push('.');
        s.push_str(&"9".repeat(scale as usize));
    }
    Decimal::from_str(&s).ok()
}

/// Bytes needed to store a bit column.
pub fn bit_byte_len(ft: &FieldType) -> usize {
    let bits = if ft.flen > 0 { ft.flen as usize } else { 1 };
    bits.div_ceil(8)
}

/// Earliest calendar date the supported range starts at.
fn min_supported_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1000, 1, 1).unwrap_or_default()
}

fn min_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 1))
        .unwrap_or_default()
}

/// Stand-in for the all-zero date, which has no calendar representation.
pub fn zero_datetime() -> NaiveDateTime {
    NaiveDateTime::default()
}
