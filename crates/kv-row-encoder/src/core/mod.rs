//! Core types shared by every stage of the encoder.
//!
//! - [`value`]: tagged column values
//! - [`schema`]: table, column and field type metadata
//! - [`kv`]: physical pairs, provenance tags and byte codecs
//! - [`traits`]: seams to the expression evaluator, type caster, row
//!   inserter and identifier allocator

pub mod kv;
pub mod schema;
pub mod traits;
pub mod value;

pub use kv::{KvPair, KvPairs, RowIdTag};
pub use schema::{AutoRandomBits, ColumnDefault, ColumnInfo, FieldType, MysqlType, TableInfo};
pub use traits::{ExprCompiler, Expression, IdAllocator, InsertedRow, RowInserter, TypeCaster};
pub use value::{Datum, Duration, Kind, Time};
