//! Configuration type definitions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::autoid::Allocators;
use crate::core::{ExprCompiler, RowInserter, TableInfo, TypeCaster};

/// Budget for one rendered row in diagnostics (512 KiB).
pub const DEFAULT_MAX_ROW_LOG_BYTES: usize = 512 * 1024;

/// Per-value display cap in diagnostics.
pub const DEFAULT_MAX_VALUE_LOG_CHARS: usize = 1024;

/// How row contents appear in diagnostic logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactMode {
    /// Values are logged verbatim.
    #[default]
    Off,
    /// Values are replaced by `?`; kinds are kept.
    On,
    /// Values are wrapped in `‹ ›` so a later pass can strip them.
    Marker,
}

/// Tunable encoder behavior, loadable from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncoderOptions {
    /// Seed for the per-encoder shard draw. Encoders sharing a table should
    /// use different seeds unless reproducing an earlier run.
    #[serde(default)]
    pub auto_random_seed: i64,

    /// Reject lossy casts (overflow, truncation) instead of clamping them
    /// with a warning (default: true).
    #[serde(default = "default_true")]
    pub strict_cast: bool,

    /// Reject nulls in `NOT NULL` columns instead of substituting the type's
    /// zero value with a warning (default: true).
    #[serde(default = "default_true")]
    pub strict_not_null: bool,

    /// Redaction of logged row contents (default: off).
    #[serde(default)]
    pub redact: RedactMode,

    /// Cumulative budget for one rendered row, in bytes (default: 512 KiB).
    #[serde(default = "default_max_row_log_bytes")]
    pub max_row_log_bytes: usize,

    /// Longest single value rendered before truncation, in characters
    /// (default: 1024).
    #[serde(default = "default_max_value_log_chars")]
    pub max_value_log_chars: usize,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            auto_random_seed: 0,
            strict_cast: true,
            strict_not_null: true,
            redact: RedactMode::Off,
            max_row_log_bytes: DEFAULT_MAX_ROW_LOG_BYTES,
            max_value_log_chars: DEFAULT_MAX_VALUE_LOG_CHARS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_row_log_bytes() -> usize {
    DEFAULT_MAX_ROW_LOG_BYTES
}

fn default_max_value_log_chars() -> usize {
    DEFAULT_MAX_VALUE_LOG_CHARS
}

/// Everything needed to build a [`crate::RowEncoder`].
pub struct EncodingConfig {
    pub table: Arc<TableInfo>,
    pub options: EncoderOptions,
    /// Watermarks shared with every other encoder of the same table.
    pub allocators: Allocators,
    pub compiler: Arc<dyn ExprCompiler>,
    pub caster: Arc<dyn TypeCaster>,
    pub inserter: Box<dyn RowInserter>,
    /// Span every diagnostic event is emitted under.
    pub logger: tracing::Span,
}

impl fmt::Debug for EncodingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingConfig")
            .field("table", &self.table.name)
            .field("options", &self.options)
            .field("allocators", &self.allocators)
            .finish_non_exhaustive()
    }
}
