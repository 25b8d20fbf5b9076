//! The row encoder.
//!
//! [`RowEncoder`] turns one logical row into the physical pairs the storage
//! layer persists:
//!
//! 1. every column is resolved ([`RowEncoder::resolve_column`]), synthesizing
//!    identifiers and defaults for values the caller left out
//! 2. generated columns are evaluated over the resolved row
//! 3. the complete record is handed to the [`RowInserter`]
//! 4. each returned pair is stamped with the row sequence number
//!
//! One encoder serves one worker: it owns its session, its shard draw and a
//! reusable row buffer. The allocators are shared with every other encoder
//! of the table.

mod generated;
mod resolve;

pub use generated::{GeneratedColumn, GeneratedColumnFailure};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::autoid::{Allocators, AutoIdConverter};
use crate::config::{EncoderOptions, EncodingConfig};
use crate::core::{
    ColumnDefault, ColumnInfo, Datum, Expression, FieldType, KvPairs, MysqlType, RowIdTag,
    RowInserter, TableInfo, TypeCaster,
};
use crate::diagnostics::{render_value, LogLimits, RowArray};
use crate::error::{EncodeError, Result};
use crate::session::Session;

/// Name of the implicit handle column of tables without an integer handle.
pub const IMPLICIT_HANDLE_NAME: &str = "_tidb_rowid";

/// Column ID reserved for the implicit handle column.
pub const IMPLICIT_HANDLE_ID: i64 = -1;

/// Encodes rows of one table.
pub struct RowEncoder {
    table: Arc<TableInfo>,
    options: EncoderOptions,
    limits: LogLimits,
    session: Session,
    allocators: Allocators,
    caster: Arc<dyn TypeCaster>,
    inserter: Box<dyn RowInserter>,
    converter: AutoIdConverter,
    auto_random_col_id: Option<i64>,
    gen_cols: Vec<GeneratedColumn>,
    /// Compiled expression defaults, by column offset.
    default_exprs: HashMap<usize, Arc<dyn Expression>>,
    handle_column: ColumnInfo,
    record_cache: Option<Vec<Datum>>,
    logger: tracing::Span,
}

impl RowEncoder {
    /// Build an encoder, compiling every generated column and expression
    /// default up front.
    pub fn new(config: EncodingConfig) -> Result<Self> {
        let EncodingConfig {
            table,
            options,
            allocators,
            compiler,
            caster,
            inserter,
            logger,
        } = config;

        table.validate()?;
        options.validate()?;

        let converter = AutoIdConverter::for_table(&table, options.auto_random_seed);
        let gen_cols = generated::compile_generated_columns(&table, compiler.as_ref())?;

        let mut default_exprs = HashMap::new();
        for col in &table.columns {
            if let ColumnDefault::Expr(source) = &col.default {
                let expr = compiler.compile(&table, source).map_err(|e| {
                    e.context(format!("compiling default of column `{}`", col.name))
                })?;
                default_exprs.insert(col.offset, expr);
            }
        }

        let handle_column = ColumnInfo::new(
            IMPLICIT_HANDLE_ID,
            IMPLICIT_HANDLE_NAME,
            table.columns.len(),
            FieldType::new(MysqlType::LongLong).not_null(),
        );

        logger.in_scope(|| {
            debug!(
                table = %table.name,
                scheme = converter.scheme_name(),
                generated_columns = gen_cols.len(),
                options_hash = %options.hash(),
                "row encoder created"
            );
        });

        Ok(Self {
            auto_random_col_id: table.auto_random.map(|bits| bits.column_id),
            limits: LogLimits::from_options(&options),
            session: Session::new(&options),
            table,
            options,
            allocators,
            caster,
            inserter,
            converter,
            gen_cols,
            default_exprs,
            handle_column,
            record_cache: None,
            logger,
        })
    }

    /// Take the reusable row buffer, empty but with its capacity intact.
    ///
    /// Hand it back through [`RowEncoder::commit`].
    pub fn checkout_row_buffer(&mut self) -> Vec<Datum> {
        match self.record_cache.take() {
            Some(mut record) => {
                record.clear();
                record
            }
            None => Vec::with_capacity(self.table.columns.len() + 1),
        }
    }

    fn recycle(&mut self, mut record: Vec<Datum>) {
        record.clear();
        self.record_cache = Some(record);
    }

    /// Resolve, evaluate and commit one row.
    ///
    /// `input` holds the caller's values by column offset; `None` marks a
    /// value the caller did not supply. Tables without an integer handle
    /// accept an explicit handle one position past the last column.
    /// `original_row` is only used for failure logs. Warnings from the
    /// previous row are discarded first.
    pub fn encode_row(
        &mut self,
        input: &[Option<Datum>],
        original_row: &[Datum],
        row_seq: i64,
    ) -> Result<KvPairs> {
        self.session.truncate_warnings(0);
        let table = Arc::clone(&self.table);
        let mut record = self.checkout_row_buffer();

        for (j, col) in table.columns.iter().enumerate() {
            let supplied = input.get(j).and_then(Option::as_ref);
            match self.resolve_column(j, row_seq, supplied) {
                Ok(value) => record.push(value),
                Err(err) => {
                    let err = self.log_kv_convert_failed(original_row, j, col, err);
                    self.recycle(record);
                    return Err(err);
                }
            }
        }

        if table.has_implicit_handle() {
            let j = table.columns.len();
            let supplied = input.get(j).and_then(Option::as_ref);
            match self.implicit_handle(row_seq, supplied) {
                Ok(handle) => record.push(handle),
                Err(err) => {
                    let err = self.log_kv_convert_failed(original_row, j, &self.handle_column, err);
                    self.recycle(record);
                    return Err(err);
                }
            }
        }

        if !self.gen_cols.is_empty() {
            if let Err(failure) = self.eval_generated_columns(&mut record) {
                let col = &table.columns[failure.index];
                let err = self.log_eval_gen_expr_failed(&record, col, failure.error);
                self.recycle(record);
                return Err(err);
            }
        }

        self.commit(record, original_row, row_seq)
    }

    /// Hand a complete record to the row inserter and tag its pairs.
    ///
    /// The record goes back to the buffer cache whether or not insertion
    /// succeeds.
    pub fn commit(
        &mut self,
        record: Vec<Datum>,
        original_row: &[Datum],
        row_seq: i64,
    ) -> Result<KvPairs> {
        let inserted = match self.inserter.add_record(&self.table, &record) {
            Ok(inserted) => inserted,
            Err(err) => {
                self.logger.in_scope(|| {
                    error!(
                        original_row = %RowArray::new(original_row, self.limits),
                        converted_row = %RowArray::new(&record, self.limits),
                        row_seq,
                        error = %err,
                        "kv encode failed"
                    );
                });
                self.recycle(record);
                return Err(err.context(format!("failed to encode row {}", row_seq)));
            }
        };

        let tag = RowIdTag::new(row_seq);
        let mut pairs = inserted.pairs;
        for pair in &mut pairs.pairs {
            pair.row_id = tag;
        }
        self.recycle(record);
        Ok(pairs)
    }

    /// The implicit handle: an explicit value if supplied, otherwise the
    /// converted row sequence number. The row ID allocator is rebased past
    /// the unconverted value.
    fn implicit_handle(&mut self, row_seq: i64, input: Option<&Datum>) -> Result<Datum> {
        let (handle, base) = match input.filter(|d| !d.is_null()) {
            Some(input) => {
                let value = self
                    .caster
                    .cast_value(&mut self.session, input, &self.handle_column)?;
                let id = value.as_i64().ok_or_else(|| {
                    EncodeError::cast(
                        IMPLICIT_HANDLE_NAME,
                        &self.handle_column.field_type,
                        value.kind().name(),
                        "handle must be an integer",
                    )
                })?;
                (value, id)
            }
            None => (Datum::Int64(self.converter.convert(row_seq)), row_seq),
        };
        self.allocators.row_id.rebase(base)?;
        Ok(handle)
    }

    /// Log a column that failed to resolve and annotate its error.
    ///
    /// Only the offending value of `row` is logged, not the whole row.
    pub fn log_kv_convert_failed(
        &self,
        row: &[Datum],
        j: usize,
        col: &ColumnInfo,
        err: EncodeError,
    ) -> EncodeError {
        let logged = row.get(j..=j).unwrap_or(row);
        let orig_val = row
            .get(j)
            .map(|datum| render_value(datum, &self.limits))
            .unwrap_or_else(|| "NULL".to_string());
        self.logger.in_scope(|| {
            error!(
                original = %RowArray::new(logged, self.limits),
                original_col = j,
                col_name = %col.name,
                col_type = %col.field_type,
                error = %err,
                "kv convert failed"
            );
            error!(
                orig_val = %orig_val,
                field_type = %col.field_type,
                column = %col.name,
                column_id = j + 1,
                "failed to convert kv value"
            );
        });
        err.context(format!(
            "failed to cast value as {} for column `{}` (#{})",
            col.field_type,
            col.name,
            j + 1
        ))
    }

    /// Log a generated column that failed to evaluate and annotate its error.
    pub fn log_eval_gen_expr_failed(
        &self,
        row: &[Datum],
        col: &ColumnInfo,
        err: EncodeError,
    ) -> EncodeError {
        self.logger.in_scope(|| {
            error!(
                original = %RowArray::new(row, self.limits),
                col_name = %col.name,
                error = %err,
                "kv convert failed: cannot evaluate generated column expression"
            );
        });
        err.context(format!(
            "failed to evaluate generated column expression for column `{}`",
            col.name
        ))
    }

    /// Warnings of the current row, recorded since the last
    /// [`RowEncoder::encode_row`] or [`RowEncoder::truncate_warnings`].
    pub fn warnings(&self) -> &[String] {
        self.session.warnings()
    }

    pub fn truncate_warnings(&mut self) {
        self.session.truncate_warnings(0);
    }

    pub fn table(&self) -> &TableInfo {
        &self.table
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    pub fn allocators(&self) -> &Allocators {
        &self.allocators
    }

    /// The identifier scheme chosen for this table.
    pub fn converter(&self) -> &AutoIdConverter {
        &self.converter
    }
}

impl fmt::Debug for RowEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowEncoder")
            .field("table", &self.table.name)
            .field("converter", &self.converter)
            .field("generated_columns", &self.gen_cols)
            .field("allocators", &self.allocators)
            .finish_non_exhaustive()
    }
}
