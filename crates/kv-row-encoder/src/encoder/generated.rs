//! Generated column compilation and evaluation.

use std::fmt;
use std::sync::Arc;

use crate::core::{Datum, ExprCompiler, Expression, TableInfo};
use crate::error::{EncodeError, Result};

use super::RowEncoder;

/// A generated column: its offset in the row and its compiled expression.
#[derive(Clone)]
pub struct GeneratedColumn {
    pub index: usize,
    pub expr: Arc<dyn Expression>,
}

impl fmt::Debug for GeneratedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedColumn")
            .field("index", &self.index)
            .field("references", &self.expr.referenced_columns())
            .finish()
    }
}

/// Offset of the generated column whose evaluation failed, and why.
#[derive(Debug)]
pub struct GeneratedColumnFailure {
    pub index: usize,
    pub error: EncodeError,
}

/// Compile every generated column of `table`, in ascending offset order.
///
/// An expression may read base columns anywhere in the row, and generated
/// columns strictly before its own offset.
pub(crate) fn compile_generated_columns(
    table: &TableInfo,
    compiler: &dyn ExprCompiler,
) -> Result<Vec<GeneratedColumn>> {
    let mut gen_cols = Vec::new();
    for col in &table.columns {
        let Some(source) = col.generated_expr.as_deref() else {
            continue;
        };
        let expr = compiler
            .compile(table, source)
            .map_err(|e| e.context(format!("compiling generated column `{}`", col.name)))?;

        for dep in expr.referenced_columns() {
            let Some(dep_col) = table.columns.get(dep) else {
                return Err(EncodeError::Schema(format!(
                    "generated column `{}` references column offset {} outside the table",
                    col.name, dep
                )));
            };
            if dep == col.offset || (dep > col.offset && dep_col.is_generated()) {
                return Err(EncodeError::Schema(format!(
                    "generated column `{}` depends on generated column `{}` defined at or after it",
                    col.name, dep_col.name
                )));
            }
        }

        gen_cols.push(GeneratedColumn {
            index: col.offset,
            expr,
        });
    }
    Ok(gen_cols)
}

impl RowEncoder {
    /// Evaluate the generated columns over `record` in ascending offset order.
    ///
    /// Each result is cast to its column type and written back before the
    /// next expression runs, so later columns see earlier results. The first
    /// failure stops the pass.
    pub fn eval_generated_columns(
        &mut self,
        record: &mut [Datum],
    ) -> std::result::Result<(), GeneratedColumnFailure> {
        let ctx = self.session.eval_context();
        for gc in &self.gen_cols {
            let col = &self.table.columns[gc.index];
            let fail = |error: EncodeError| GeneratedColumnFailure {
                index: gc.index,
                error: EncodeError::GeneratedColumn {
                    column: col.name.clone(),
                    source: Box::new(error),
                },
            };
            if gc.index >= record.len() {
                return Err(fail(EncodeError::Schema(format!(
                    "record has {} values, generated column sits at offset {}",
                    record.len(),
                    gc.index
                ))));
            }

            let evaluated = gc.expr.eval(&ctx, record).map_err(fail)?;
            let value = self
                .caster
                .cast_value(&mut self.session, &evaluated, col)
                .map_err(fail)?;
            record[gc.index] = value;
        }
        Ok(())
    }

    pub fn generated_columns(&self) -> &[GeneratedColumn] {
        &self.gen_cols
    }
}
