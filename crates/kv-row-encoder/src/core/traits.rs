//! Seams to the encoder's external collaborators.
//!
//! - [`Expression`] / [`ExprCompiler`]: the SQL expression evaluator, used for
//!   generated columns and expression defaults
//! - [`TypeCaster`]: the type-casting subsystem
//! - [`RowInserter`]: the storage-row builder that turns a complete row into
//!   physical pairs
//! - [`IdAllocator`]: the shared identifier high-watermark
//!
//! The crate ships one implementation of each seam except the expression
//! evaluator; callers may substitute their own.

use std::sync::Arc;

use crate::error::Result;
use crate::session::{EvalContext, Session};

use super::kv::KvPairs;
use super::schema::{ColumnInfo, TableInfo};
use super::value::Datum;

/// A compiled scalar expression evaluated against a row.
pub trait Expression: Send + Sync {
    /// Evaluate against `row`, indexed by column offset.
    fn eval(&self, ctx: &EvalContext, row: &[Datum]) -> Result<Datum>;

    /// Offsets of the columns this expression reads.
    fn referenced_columns(&self) -> Vec<usize> {
        Vec::new()
    }
}

impl<F> Expression for F
where
    F: Fn(&EvalContext, &[Datum]) -> Result<Datum> + Send + Sync,
{
    fn eval(&self, ctx: &EvalContext, row: &[Datum]) -> Result<Datum> {
        self(ctx, row)
    }
}

/// Turns expression source text from the schema into [`Expression`]s.
pub trait ExprCompiler: Send + Sync {
    fn compile(&self, table: &TableInfo, source: &str) -> Result<Arc<dyn Expression>>;
}

/// Casts a value to a column's declared type.
///
/// Implementations consult the session for strictness and record non-fatal
/// coercions as warnings on it.
pub trait TypeCaster: Send + Sync {
    fn cast_value(&self, session: &mut Session, value: &Datum, col: &ColumnInfo) -> Result<Datum>;
}

/// Result of inserting one complete row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedRow {
    /// Integer handle the row was stored under.
    pub handle: i64,
    pub pairs: KvPairs,
}

/// Builds the physical pairs of a complete row.
pub trait RowInserter: Send {
    /// `record` holds one datum per column, plus the implicit handle as a
    /// trailing datum when the table has no integer handle.
    fn add_record(&mut self, table: &TableInfo, record: &[Datum]) -> Result<InsertedRow>;
}

/// A shared, monotonically advancing identifier watermark.
///
/// Many encoders rebase the same allocator concurrently; `rebase` must be a
/// max-update that never lowers the watermark.
pub trait IdAllocator: Send + Sync {
    fn rebase(&self, required_base: i64) -> Result<()>;

    fn base(&self) -> i64;
}
