//! Per-column value resolution.
//!
//! A supplied value is cast to the column type and used as long as it passes
//! the not-null check. Otherwise the first matching fallback wins:
//!
//! 1. auto-increment: the row sequence number
//! 2. auto-random: the composed identifier
//! 3. generated: the type's minimum, overwritten later by the expression
//! 4. a supplied null in a `NOT NULL` column: the not-null policy
//! 5. the schema default
//!
//! Auto-increment and auto-random values then advance the shared allocators.

use std::sync::Arc;

use crate::autoid::auto_record_id;
use crate::cast::{min_value, zero_value};
use crate::core::{ColumnDefault, ColumnInfo, Datum};
use crate::error::{EncodeError, Result};

use super::RowEncoder;

impl RowEncoder {
    /// Resolve the value of column `col_idx` for row `row_seq`.
    ///
    /// `input` is the caller-supplied value, if any. The auto-increment and
    /// auto-random allocators are rebased past the returned value.
    pub fn resolve_column(
        &mut self,
        col_idx: usize,
        row_seq: i64,
        input: Option<&Datum>,
    ) -> Result<Datum> {
        let table = Arc::clone(&self.table);
        let col = table.columns.get(col_idx).ok_or_else(|| {
            EncodeError::Schema(format!(
                "column index {} out of range for table `{}`",
                col_idx, table.name
            ))
        })?;

        let value = self.actual_datum(col, row_seq, input)?;
        if value.is_null() {
            return Ok(value);
        }

        if self.is_auto_random_col(col) {
            if let Some(layout) = self.converter.layout() {
                let id = value.as_i64().ok_or_else(|| EncodeError::AllocatorRebase {
                    allocator: "auto_random",
                    base: 0,
                    reason: format!("{} value is not an identifier", value.kind()),
                })?;
                self.allocators
                    .auto_random
                    .rebase(id & layout.incremental_mask())?;
            }
        }
        if col.auto_increment {
            let id = auto_record_id(&value, &col.field_type)?;
            self.allocators.auto_increment.rebase(id)?;
        }
        Ok(value)
    }

    fn actual_datum(
        &mut self,
        col: &ColumnInfo,
        row_seq: i64,
        input: Option<&Datum>,
    ) -> Result<Datum> {
        let mut bad_null = false;
        if let Some(input) = input {
            let value = self.caster.cast_value(&mut self.session, input, col)?;
            if !value.is_null() || !self.requires_value(col) {
                return Ok(value);
            }
            bad_null = true;
        }

        if col.auto_increment {
            // still cast, so a TINYINT column rejects sequence numbers above 127
            return self
                .caster
                .cast_value(&mut self.session, &Datum::Int64(row_seq), col);
        }
        if self.is_auto_random_col(col) {
            let id = self.converter.convert(row_seq);
            let datum = if col.field_type.unsigned {
                Datum::Uint64(id as u64)
            } else {
                Datum::Int64(id)
            };
            return self.caster.cast_value(&mut self.session, &datum, col);
        }
        if col.is_generated() {
            return Ok(min_value(&col.field_type));
        }
        if bad_null {
            return self.handle_bad_null(col);
        }
        self.default_value(col)
    }

    /// Auto-increment and auto-random columns never store null; a null input
    /// falls through to identifier synthesis.
    fn requires_value(&self, col: &ColumnInfo) -> bool {
        col.is_not_null() || col.auto_increment || self.is_auto_random_col(col)
    }

    pub(super) fn is_auto_random_col(&self, col: &ColumnInfo) -> bool {
        self.auto_random_col_id == Some(col.id)
    }

    /// Null in a `NOT NULL` column: an error, or the zero value with a warning.
    fn handle_bad_null(&mut self, col: &ColumnInfo) -> Result<Datum> {
        if self.session.strict_not_null() {
            return Err(EncodeError::NotNull {
                column: col.name.clone(),
            });
        }
        self.session
            .append_warning(format!("Column '{}' cannot be null", col.name));
        Ok(zero_value(&col.field_type))
    }

    fn default_value(&mut self, col: &ColumnInfo) -> Result<Datum> {
        let value = match &col.default {
            ColumnDefault::Value(literal) => self
                .caster
                .cast_value(&mut self.session, literal, col)
                .map_err(|e| EncodeError::default_value(&col.name, e.to_string()))?,
            ColumnDefault::Expr(source) => {
                let expr = self.default_exprs.get(&col.offset).cloned().ok_or_else(|| {
                    EncodeError::default_value(
                        &col.name,
                        format!("default expression `{}` was not compiled", source),
                    )
                })?;
                let raw = self
                    .session
                    .with_txn_scope(|ctx| expr.eval(ctx, &[]))
                    .map_err(|e| EncodeError::default_value(&col.name, e.to_string()))?;
                self.caster
                    .cast_value(&mut self.session, &raw, col)
                    .map_err(|e| EncodeError::default_value(&col.name, e.to_string()))?
            }
            ColumnDefault::None => {
                if !col.is_not_null() {
                    return Ok(Datum::Null);
                }
                if self.session.strict_not_null() {
                    return Err(EncodeError::default_value(
                        &col.name,
                        format!("Field '{}' doesn't have a default value", col.name),
                    ));
                }
                self.session.append_warning(format!(
                    "Field '{}' doesn't have a default value",
                    col.name
                ));
                return Ok(zero_value(&col.field_type));
            }
        };

        if value.is_null() && col.is_not_null() {
            return self.handle_bad_null(col);
        }
        Ok(value)
    }
}
