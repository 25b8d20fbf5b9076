//! Shared identifier watermarks.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::core::{Datum, FieldType, IdAllocator, MysqlType, TableInfo};
use crate::error::{EncodeError, Result};

use super::ShardIdLayout;

/// Lock-free watermark with an upper bound.
///
/// `rebase` is a compare-free `fetch_max`, so concurrent encoders can race to
/// advance it without ever lowering it.
pub struct WatermarkAllocator {
    name: &'static str,
    base: AtomicI64,
    max: i64,
}

impl WatermarkAllocator {
    pub fn new(name: &'static str) -> Self {
        Self::with_max(name, i64::MAX)
    }

    pub fn with_max(name: &'static str, max: i64) -> Self {
        Self {
            name,
            base: AtomicI64::new(0),
            max,
        }
    }

    pub fn max(&self) -> i64 {
        self.max
    }
}

impl IdAllocator for WatermarkAllocator {
    fn rebase(&self, required_base: i64) -> Result<()> {
        if required_base > self.max {
            return Err(EncodeError::AllocatorRebase {
                allocator: self.name,
                base: required_base,
                reason: format!("exceeds maximum {}", self.max),
            });
        }
        self.base.fetch_max(required_base, Ordering::AcqRel);
        Ok(())
    }

    fn base(&self) -> i64 {
        self.base.load(Ordering::Acquire)
    }
}

impl fmt::Debug for WatermarkAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatermarkAllocator")
            .field("name", &self.name)
            .field("base", &self.base())
            .field("max", &self.max)
            .finish()
    }
}

/// The allocators of one table, shared by all of its encoders.
#[derive(Clone)]
pub struct Allocators {
    pub auto_increment: Arc<dyn IdAllocator>,
    pub auto_random: Arc<dyn IdAllocator>,
    pub row_id: Arc<dyn IdAllocator>,
}

impl Allocators {
    /// Unbounded watermarks starting at zero.
    pub fn new() -> Self {
        Self {
            auto_increment: Arc::new(WatermarkAllocator::new("auto_increment")),
            auto_random: Arc::new(WatermarkAllocator::new("auto_random")),
            row_id: Arc::new(WatermarkAllocator::new("row_id")),
        }
    }

    /// Watermarks bounded by what the table can store. The auto-random
    /// allocator only tracks the incremental part, so its bound is the
    /// layout's incremental capacity.
    pub fn for_table(table: &TableInfo) -> Self {
        let mut allocators = Self::new();
        if let (Some(bits), Some(col)) = (table.auto_random, table.auto_random_column()) {
            let layout =
                ShardIdLayout::new(bits.shard_bits, bits.range_bits, col.field_type.unsigned);
            allocators.auto_random = Arc::new(WatermarkAllocator::with_max(
                "auto_random",
                layout.incremental_mask(),
            ));
        }
        allocators
    }
}

impl Default for Allocators {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Allocators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocators")
            .field("auto_increment", &self.auto_increment.base())
            .field("auto_random", &self.auto_random.base())
            .field("row_id", &self.row_id.base())
            .finish()
    }
}

/// The watermark value an auto-increment datum accounts for.
///
/// Float columns round to the nearest integer; unsigned values are
/// reinterpreted as `i64`.
pub fn auto_record_id(value: &Datum, field_type: &FieldType) -> Result<i64> {
    let unsupported = || EncodeError::AllocatorRebase {
        allocator: "auto_increment",
        base: 0,
        reason: format!("cannot derive an ID from {} value of {}", value.kind(), field_type),
    };
    match field_type.tp {
        MysqlType::Float | MysqlType::Double => {
            let f = value.as_f64().ok_or_else(unsupported)?;
            Ok(f.round() as i64)
        }
        tp if tp.is_integer() => value.as_i64().ok_or_else(unsupported),
        _ => Err(unsupported()),
    }
}
