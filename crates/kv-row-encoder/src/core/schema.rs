//! Table and column metadata consumed by the encoder.
//!
//! These types mirror what the schema catalog hands to a bulk load: column
//! definitions with their field types and flags, plus the table-level
//! identifier sharding parameters. They are immutable for the lifetime of an
//! encoder instance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, Result};

use super::value::Datum;

/// Largest shard width accepted for auto-random and shard row ID schemes.
pub const MAX_SHARD_BITS: u32 = 15;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MysqlType {
    Tiny,
    Short,
    Int24,
    Long,
    LongLong,
    Float,
    Double,
    NewDecimal,
    Varchar,
    String,
    Blob,
    Date,
    Datetime,
    Timestamp,
    Duration,
    Year,
    Enum,
    Set,
    Bit,
    Json,
}

impl MysqlType {
    /// Whether the type stores an integer.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            MysqlType::Tiny
                | MysqlType::Short
                | MysqlType::Int24
                | MysqlType::Long
                | MysqlType::LongLong
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, MysqlType::Float | MysqlType::Double)
    }

    /// Inclusive signed range of an integer type.
    pub fn signed_bounds(self) -> Option<(i64, i64)> {
        match self {
            MysqlType::Tiny => Some((i64::from(i8::MIN), i64::from(i8::MAX))),
            MysqlType::Short => Some((i64::from(i16::MIN), i64::from(i16::MAX))),
            MysqlType::Int24 => Some((-(1 << 23), (1 << 23) - 1)),
            MysqlType::Long => Some((i64::from(i32::MIN), i64::from(i32::MAX))),
            MysqlType::LongLong => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Inclusive upper bound of an unsigned integer type.
    pub fn unsigned_upper_bound(self) -> Option<u64> {
        match self {
            MysqlType::Tiny => Some(u64::from(u8::MAX)),
            MysqlType::Short => Some(u64::from(u16::MAX)),
            MysqlType::Int24 => Some((1 << 24) - 1),
            MysqlType::Long => Some(u64::from(u32::MAX)),
            MysqlType::LongLong => Some(u64::MAX),
            _ => None,
        }
    }

    fn sql_name(self) -> &'static str {
        match self {
            MysqlType::Tiny => "tinyint",
            MysqlType::Short => "smallint",
            MysqlType::Int24 => "mediumint",
            MysqlType::Long => "int",
            MysqlType::LongLong => "bigint",
            MysqlType::Float => "float",
            MysqlType::Double => "double",
            MysqlType::NewDecimal => "decimal",
            MysqlType::Varchar => "varchar",
            MysqlType::String => "char",
            MysqlType::Blob => "blob",
            MysqlType::Date => "date",
            MysqlType::Datetime => "datetime",
            MysqlType::Timestamp => "timestamp",
            MysqlType::Duration => "time",
            MysqlType::Year => "year",
            MysqlType::Enum => "enum",
            MysqlType::Set => "set",
            MysqlType::Bit => "bit",
            MysqlType::Json => "json",
        }
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub tp: MysqlType,

    /// Display width / character length / bit width. `-1` when unspecified.
    #[serde(default = "unspecified")]
    pub flen: i32,

    /// Scale for decimals, fractional seconds for temporal types. `-1` when unspecified.
    #[serde(default = "unspecified")]
    pub decimal: i32,

    #[serde(default)]
    pub unsigned: bool,

    #[serde(default)]
    pub not_null: bool,

    /// Members of an enum or set type.
    #[serde(default)]
    pub elems: Vec<String>,
}

fn unspecified() -> i32 {
    -1
}

impl FieldType {
    pub fn new(tp: MysqlType) -> Self {
        Self {
            tp,
            flen: -1,
            decimal: -1,
            unsigned: false,
            not_null: false,
            elems: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_flen(mut self, flen: i32) -> Self {
        self.flen = flen;
        self
    }

    #[must_use]
    pub fn with_decimal(mut self, decimal: i32) -> Self {
        self.decimal = decimal;
        self
    }

    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    #[must_use]
    pub fn with_elems<I, S>(mut self, elems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elems = elems.into_iter().map(Into::into).collect();
        self
    }

    /// Fractional-second precision, clamped to 0..=6.
    pub fn fsp(&self) -> u8 {
        self.decimal.clamp(0, 6) as u8
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tp.sql_name())?;
        match self.tp {
            MysqlType::Enum | MysqlType::Set => {
                let quoted: Vec<String> = self
                    .elems
                    .iter()
                    .map(|e| format!("'{}'", e.replace('\'', "''")))
                    .collect();
                write!(f, "({})", quoted.join(","))?;
            }
            MysqlType::NewDecimal | MysqlType::Float | MysqlType::Double
                if self.flen > 0 && self.decimal >= 0 =>
            {
                write!(f, "({},{})", self.flen, self.decimal)?;
            }
            MysqlType::Datetime | MysqlType::Timestamp | MysqlType::Duration
                if self.decimal > 0 =>
            {
                write!(f, "({})", self.decimal)?;
            }
            _ if self.flen > 0 && !self.tp.is_float() => write!(f, "({})", self.flen)?,
            _ => {}
        }
        if self.unsigned {
            f.write_str(" unsigned")?;
        }
        Ok(())
    }
}

/// Schema-declared default of a column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    /// No `DEFAULT` clause.
    #[default]
    None,
    /// A literal default, cast to the column type on use.
    Value(Datum),
    /// An expression default such as `CURRENT_TIMESTAMP` or `(UUID())`.
    Expr(String),
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Stable column ID.
    pub id: i64,

    /// Column name.
    pub name: String,

    /// Position in the row (0-based).
    pub offset: usize,

    pub field_type: FieldType,

    #[serde(default)]
    pub auto_increment: bool,

    /// Part of the primary key.
    #[serde(default)]
    pub primary_key: bool,

    #[serde(default)]
    pub default: ColumnDefault,

    /// Source of the generation expression for generated columns.
    #[serde(default)]
    pub generated_expr: Option<String>,
}

impl ColumnInfo {
    pub fn new(id: i64, name: impl Into<String>, offset: usize, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            offset,
            field_type,
            auto_increment: false,
            primary_key: false,
            default: ColumnDefault::None,
            generated_expr: None,
        }
    }

    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: ColumnDefault) -> Self {
        self.default = default;
        self
    }

    #[must_use]
    pub fn generated(mut self, expr: impl Into<String>) -> Self {
        self.generated_expr = Some(expr.into());
        self
    }

    pub fn is_generated(&self) -> bool {
        self.generated_expr.is_some()
    }

    pub fn is_not_null(&self) -> bool {
        self.field_type.not_null
    }
}

/// Auto-random layout of a table's clustered integer primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRandomBits {
    /// ID of the auto-random column.
    pub column_id: i64,

    /// Width of the random field placed in the high bits.
    pub shard_bits: u32,

    /// Width of the reserved high sub-range inside the random field.
    #[serde(default)]
    pub range_bits: u32,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: i64,

    pub name: String,

    /// Column definitions, in row order.
    pub columns: Vec<ColumnInfo>,

    /// Whether the integer primary key is the row handle. When false, every
    /// record carries an implicit trailing handle column.
    #[serde(default)]
    pub pk_is_handle: bool,

    #[serde(default)]
    pub auto_random: Option<AutoRandomBits>,

    /// Width of the shard field mixed into implicit row handles.
    #[serde(default)]
    pub shard_row_id_bits: u32,
}

impl TableInfo {
    pub fn new(id: i64, name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            id,
            name: name.into(),
            columns,
            pk_is_handle: false,
            auto_random: None,
            shard_row_id_bits: 0,
        }
    }

    pub fn auto_random_column(&self) -> Option<&ColumnInfo> {
        let bits = self.auto_random?;
        self.columns.iter().find(|c| c.id == bits.column_id)
    }

    pub fn auto_increment_column(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    /// The integer primary key column that doubles as the row handle.
    pub fn handle_column(&self) -> Option<&ColumnInfo> {
        if !self.pk_is_handle {
            return None;
        }
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .or_else(|| self.auto_random_column())
    }

    /// Whether encoded records carry the implicit handle column.
    pub fn has_implicit_handle(&self) -> bool {
        !self.pk_is_handle
    }

    /// Check the invariants the encoder relies on.
    pub fn validate(&self) -> Result<()> {
        for (pos, col) in self.columns.iter().enumerate() {
            if col.offset != pos {
                return Err(EncodeError::Schema(format!(
                    "column `{}` has offset {} but sits at position {}",
                    col.name, col.offset, pos
                )));
            }
        }

        let auto_inc: Vec<&ColumnInfo> =
            self.columns.iter().filter(|c| c.auto_increment).collect();
        if auto_inc.len() > 1 {
            return Err(EncodeError::Schema(format!(
                "table `{}` has {} auto-increment columns, at most one is allowed",
                self.name,
                auto_inc.len()
            )));
        }
        if let Some(col) = auto_inc.first() {
            if !col.field_type.tp.is_integer() && !col.field_type.tp.is_float() {
                return Err(EncodeError::Schema(format!(
                    "auto-increment column `{}` must be numeric, got {}",
                    col.name, col.field_type
                )));
            }
        }

        if self.pk_is_handle {
            let handle = self.handle_column().ok_or_else(|| {
                EncodeError::Schema(format!(
                    "table `{}` uses its primary key as handle but has no primary key column",
                    self.name
                ))
            })?;
            if !handle.field_type.tp.is_integer() {
                return Err(EncodeError::Schema(format!(
                    "handle column `{}` must be an integer, got {}",
                    handle.name, handle.field_type
                )));
            }
        }

        if let Some(bits) = self.auto_random {
            let col = self.auto_random_column().ok_or_else(|| {
                EncodeError::Schema(format!(
                    "auto-random column id {} not found in table `{}`",
                    bits.column_id, self.name
                ))
            })?;
            if !col.field_type.tp.is_integer() {
                return Err(EncodeError::Schema(format!(
                    "auto-random column `{}` must be an integer, got {}",
                    col.name, col.field_type
                )));
            }
            if self.handle_column().map(|h| h.id) != Some(col.id) {
                return Err(EncodeError::Schema(format!(
                    "auto-random column `{}` must be the clustered integer primary key",
                    col.name
                )));
            }
            if bits.shard_bits == 0 || bits.shard_bits > MAX_SHARD_BITS {
                return Err(EncodeError::Schema(format!(
                    "auto-random shard bits must be in 1..={}, got {}",
                    MAX_SHARD_BITS, bits.shard_bits
                )));
            }
            if bits.range_bits > bits.shard_bits {
                return Err(EncodeError::Schema(format!(
                    "auto-random range bits ({}) exceed shard bits ({})",
                    bits.range_bits, bits.shard_bits
                )));
            }
            if self.shard_row_id_bits > 0 {
                return Err(EncodeError::Schema(
                    "auto-random and shard row ID bits are mutually exclusive".into(),
                ));
            }
        }

        if self.shard_row_id_bits > MAX_SHARD_BITS {
            return Err(EncodeError::Schema(format!(
                "shard row ID bits must be at most {}, got {}",
                MAX_SHARD_BITS, self.shard_row_id_bits
            )));
        }
        if self.shard_row_id_bits > 0 && self.pk_is_handle {
            return Err(EncodeError::Schema(
                "shard row ID bits require a table without an integer handle".into(),
            ));
        }

        Ok(())
    }
}
