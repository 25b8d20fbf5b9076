//! # kv-row-encoder
//!
//! Turns logical table rows into the key-value pairs of an ordered KV store,
//! for bulk loading.
//!
//! The encoder provides:
//!
//! - **Value resolution** with auto-increment, auto-random and default synthesis
//! - **Generated columns** evaluated in definition order
//! - **Shared identifier allocators** that never hand out a value twice
//! - **Provenance tags** tying every pair back to its source row
//! - **Bounded diagnostics** that keep failure logs small and optionally redacted
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kv_row_encoder::{
//!     Allocators, Datum, EncoderOptions, EncodingConfig, RecordInserter, RowEncoder,
//!     StandardCaster, TableInfo,
//! };
//! # use kv_row_encoder::{ExprCompiler, Expression};
//! # struct NoExprs;
//! # impl ExprCompiler for NoExprs {
//! #     fn compile(&self, _: &TableInfo, s: &str) -> kv_row_encoder::Result<Arc<dyn Expression>> {
//! #         Err(kv_row_encoder::EncodeError::Expression(s.to_string()))
//! #     }
//! # }
//!
//! fn main() -> kv_row_encoder::Result<()> {
//!     let yaml = std::fs::read_to_string("table.yaml")?;
//!     let table: Arc<TableInfo> = Arc::new(serde_yaml::from_str(&yaml)?);
//!     let mut encoder = RowEncoder::new(EncodingConfig {
//!         allocators: Allocators::for_table(&table),
//!         table,
//!         options: EncoderOptions::load("encoder.yaml")?,
//!         compiler: Arc::new(NoExprs),
//!         caster: Arc::new(StandardCaster),
//!         inserter: Box::new(RecordInserter::new()),
//!         logger: tracing::info_span!("encode"),
//!     })?;
//!     let pairs = encoder.encode_row(&[None, Some(Datum::from("hello"))], &[], 1)?;
//!     println!("{} pairs", pairs.len());
//!     Ok(())
//! }
//! ```

pub mod autoid;
pub mod cast;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod encoder;
pub mod error;
pub mod inserter;
pub mod session;

// Re-exports for convenient access
pub use autoid::{Allocators, AutoIdConverter, WatermarkAllocator};
pub use cast::StandardCaster;
pub use config::{EncoderOptions, EncodingConfig, RedactMode};
pub use core::{
    AutoRandomBits, ColumnDefault, ColumnInfo, Datum, ExprCompiler, Expression, FieldType,
    IdAllocator, InsertedRow, KvPair, KvPairs, MysqlType, RowIdTag, RowInserter, TableInfo,
    TypeCaster,
};
pub use diagnostics::{LogLimits, RowArray};
pub use encoder::RowEncoder;
pub use error::{EncodeError, ErrorKind, Result};
pub use inserter::RecordInserter;
pub use session::{EvalContext, Session};
