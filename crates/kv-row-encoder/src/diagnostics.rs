//! Bounded rendering of rows for failure logs.
//!
//! A failed row can be arbitrarily wide and its values arbitrarily long, so
//! [`RowArray`] renders it under two limits: each value is cut to
//! `max_value_chars` characters, and rendering stops with a single
//! [`ROW_TRUNCATED_MARKER`] once the running byte total would exceed
//! `max_row_bytes`. Rendering never fails.
//!
//! Each entry is a `{kind, val}` object; the array serializes as JSON so it
//! can be attached to a `tracing` event as a single display field.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::config::{EncoderOptions, RedactMode};
use crate::core::Datum;

/// Emitted in place of the remaining entries once the row budget is spent.
pub const ROW_TRUNCATED_MARKER: &str = "The row has been truncated, and the log has exited early.";

/// Appended to a value cut at the per-value cap.
pub const VALUE_TRUNCATED_SUFFIX: &str = " (truncated)";

/// Output limits and redaction policy for logged values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLimits {
    pub max_row_bytes: usize,
    pub max_value_chars: usize,
    pub redact: RedactMode,
}

impl LogLimits {
    pub fn from_options(options: &EncoderOptions) -> Self {
        Self {
            max_row_bytes: options.max_row_log_bytes,
            max_value_chars: options.max_value_log_chars,
            redact: options.redact,
        }
    }
}

impl Default for LogLimits {
    fn default() -> Self {
        Self::from_options(&EncoderOptions::default())
    }
}

/// Display text of a value, before truncation and redaction.
///
/// String and byte values are only copied up to `max_chars + 1` characters,
/// enough for [`truncate_value`] to see that they need cutting.
pub fn display_value(datum: &Datum, max_chars: usize) -> String {
    let keep = max_chars.saturating_add(1);
    match datum {
        Datum::String(s) => s.chars().take(keep).collect(),
        // a character is at most four bytes, so this prefix holds the first `keep`
        Datum::Bytes(b) => {
            let prefix = &b[..b.len().min(keep.saturating_mul(4))];
            String::from_utf8_lossy(prefix).chars().take(keep).collect()
        }
        Datum::Null => "NULL".to_string(),
        Datum::MinNotNull => "-inf".to_string(),
        Datum::MaxValue => "+inf".to_string(),
        Datum::Interface(description) => description.clone(),
        Datum::Raw(bytes) => format!("<{} raw bytes>", bytes.len()),
        other => other.to_sql_string().unwrap_or_default(),
    }
}

/// Cut `text` to `max_chars` characters, marking the cut.
pub fn truncate_value(mut text: String, max_chars: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
        text.push_str(VALUE_TRUNCATED_SUFFIX);
    }
    text
}

/// Hide `text` according to `mode`.
///
/// `Marker` wraps the value in `‹…›` so a later pass can strip it; marker
/// characters inside the value are doubled.
pub fn redact(text: &str, mode: RedactMode) -> String {
    match mode {
        RedactMode::Off => text.to_string(),
        RedactMode::On => "?".to_string(),
        RedactMode::Marker => {
            let escaped = text.replace('‹', "‹‹").replace('›', "››");
            format!("‹{}›", escaped)
        }
    }
}

/// A single value, truncated and redacted for logging.
pub fn render_value(datum: &Datum, limits: &LogLimits) -> String {
    let max_chars = limits.max_value_chars;
    let text = truncate_value(display_value(datum, max_chars), max_chars);
    redact(&text, limits.redact)
}

/// One rendered entry of a [`RowArray`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LogEntry {
    Value { kind: &'static str, val: String },
    Truncated(&'static str),
}

/// Loggable view of a row.
#[derive(Clone, Copy)]
pub struct RowArray<'a> {
    row: &'a [Datum],
    limits: LogLimits,
}

impl<'a> RowArray<'a> {
    pub fn new(row: &'a [Datum], limits: LogLimits) -> Self {
        Self { row, limits }
    }

    /// Render the row. The budget counts bytes of the unredacted text, so
    /// redaction does not change where a row is cut.
    pub fn entries(&self) -> Vec<LogEntry> {
        let mut entries = Vec::with_capacity(self.row.len());
        let mut total = 0usize;
        for datum in self.row {
            let text = truncate_value(
                display_value(datum, self.limits.max_value_chars),
                self.limits.max_value_chars,
            );
            total += text.len();
            if total > self.limits.max_row_bytes {
                entries.push(LogEntry::Truncated(ROW_TRUNCATED_MARKER));
                break;
            }
            entries.push(LogEntry::Value {
                kind: datum.kind().name(),
                val: redact(&text, self.limits.redact),
            });
        }
        entries
    }
}

impl Serialize for RowArray<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries())
    }
}

impl fmt::Display for RowArray<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl fmt::Debug for RowArray<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_row_bytes: usize, max_value_chars: usize) -> LogLimits {
        LogLimits {
            max_row_bytes,
            max_value_chars,
            redact: RedactMode::Off,
        }
    }

    fn value(kind: &'static str, val: &str) -> LogEntry {
        LogEntry::Value {
            kind,
            val: val.to_string(),
        }
    }

    #[test]
    fn test_kinds_and_special_values() {
        let row = vec![
            Datum::Null,
            Datum::Int64(7),
            Datum::MinNotNull,
            Datum::MaxValue,
            Datum::Raw(vec![1, 2, 3]),
            Datum::Interface("opaque".into()),
        ];
        let entries = RowArray::new(&row, LogLimits::default()).entries();
        assert_eq!(
            entries,
            vec![
                value("null", "NULL"),
                value("int64", "7"),
                value("min", "-inf"),
                value("max", "+inf"),
                value("raw", "<3 raw bytes>"),
                value("interface", "opaque"),
            ]
        );
    }

    #[test]
    fn test_value_cap() {
        let row = vec![Datum::from("abcdef")];
        let entries = RowArray::new(&row, limits(1000, 4)).entries();
        assert_eq!(entries, vec![value("string", "abcd (truncated)")]);
    }

    #[test]
    fn test_display_value_copies_only_a_prefix() {
        let blob = "é".repeat(1 << 20);
        assert_eq!(display_value(&Datum::from(blob.as_str()), 3), "éééé");
        assert_eq!(
            display_value(&Datum::Bytes(blob.clone().into_bytes()), 3),
            "éééé"
        );
        assert_eq!(display_value(&Datum::Bytes(b"ab".to_vec()), 3), "ab");
        assert_eq!(display_value(&Datum::Int64(123456), 2), "123456");

        let row = vec![Datum::Bytes(blob.into_bytes())];
        assert_eq!(
            RowArray::new(&row, limits(1000, 2)).entries(),
            vec![value("bytes", "éé (truncated)")]
        );
    }

    #[test]
    fn test_value_cap_respects_char_boundaries() {
        assert_eq!(truncate_value("ééé".to_string(), 2), "éé (truncated)");
        assert_eq!(truncate_value("éé".to_string(), 2), "éé");
    }

    #[test]
    fn test_row_budget_single_marker() {
        let row: Vec<Datum> = (0..100).map(|_| Datum::from("0123456789")).collect();
        let entries = RowArray::new(&row, limits(35, 1024)).entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3], LogEntry::Truncated(ROW_TRUNCATED_MARKER));
        let markers = entries
            .iter()
            .filter(|e| matches!(e, LogEntry::Truncated(_)))
            .count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn test_row_budget_exact_fit() {
        let row = vec![Datum::from("12345"), Datum::from("12345")];
        let entries = RowArray::new(&row, limits(10, 1024)).entries();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| matches!(e, LogEntry::Value { .. })));
    }

    #[test]
    fn test_huge_row_with_default_limits() {
        let big = "x".repeat(4096);
        let row: Vec<Datum> = (0..1000).map(|_| Datum::from(big.as_str())).collect();
        let rendered = RowArray::new(&row, LogLimits::default()).to_string();
        assert!(rendered.len() < 600 * 1024);
        assert!(rendered.ends_with(&format!("\"{}\"]", ROW_TRUNCATED_MARKER)));
    }

    #[test]
    fn test_redaction_modes() {
        assert_eq!(redact("secret", RedactMode::Off), "secret");
        assert_eq!(redact("secret", RedactMode::On), "?");
        assert_eq!(redact("a‹b›", RedactMode::Marker), "‹a‹‹b›››");

        let row = vec![Datum::from("secret")];
        let limits = LogLimits {
            redact: RedactMode::On,
            ..LogLimits::default()
        };
        assert_eq!(RowArray::new(&row, limits).entries(), vec![value("string", "?")]);
    }

    #[test]
    fn test_json_rendering() {
        let row = vec![Datum::Int64(1), Datum::from("a\"b")];
        let rendered = RowArray::new(&row, LogLimits::default()).to_string();
        assert_eq!(
            rendered,
            r#"[{"kind":"int64","val":"1"},{"kind":"string","val":"a\"b"}]"#
        );
    }

    #[test]
    fn test_render_value() {
        let limits = limits(100, 3);
        assert_eq!(render_value(&Datum::from("abcdef"), &limits), "abc (truncated)");
        assert_eq!(render_value(&Datum::Null, &limits), "NUL (truncated)");
    }
}
