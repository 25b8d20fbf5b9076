//! Identifier synthesis for auto-random columns and sharded row handles.
//!
//! Two schemes spread sequential row sequence numbers over the key space:
//!
//! - **Auto-random**: a per-encoder shard value is drawn once from the
//!   configured seed and placed in the high bits of the identifier, below the
//!   sign bit for signed columns. The low bits hold the incremental part and
//!   can always be recovered with [`ShardIdLayout::incremental_mask`].
//! - **Shard row ID**: the shard bits are drawn from a generator seeded with
//!   the row sequence number itself, so the result depends on the input
//!   alone. Not invertible.
//!
//! [`AutoIdConverter`] picks one of them (or neither) for a table.

mod allocator;

pub use allocator::{auto_record_id, Allocators, WatermarkAllocator};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::schema::MAX_SHARD_BITS;
use crate::core::TableInfo;

/// Width of a row handle in bits.
pub const ROW_ID_BIT_LENGTH: u32 = 64;

/// Bit layout of an auto-random identifier.
///
/// From the top: the sign bit (signed columns only), then `shard_bits` of
/// random field, then the incremental part. The top `range_bits` of the
/// random field form the range sub-field; the rest is the shard sub-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardIdLayout {
    shard_bits: u32,
    range_bits: u32,
    incremental_bits: u32,
}

/// The three fields of a composed auto-random identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardIdParts {
    pub range: i64,
    pub shard: i64,
    pub incremental: i64,
}

impl ShardIdLayout {
    /// `shard_bits` is capped at [`MAX_SHARD_BITS`].
    pub fn new(shard_bits: u32, range_bits: u32, unsigned: bool) -> Self {
        let shard_bits = shard_bits.min(MAX_SHARD_BITS);
        let sign_bits = if unsigned { 0 } else { 1 };
        Self {
            shard_bits,
            range_bits: range_bits.min(shard_bits),
            incremental_bits: ROW_ID_BIT_LENGTH - shard_bits - sign_bits,
        }
    }

    pub fn shard_bits(&self) -> u32 {
        self.shard_bits
    }

    pub fn incremental_bits(&self) -> u32 {
        self.incremental_bits
    }

    /// `00..0[11..1]`, covering the incremental part.
    pub fn incremental_mask(&self) -> i64 {
        low_mask(self.incremental_bits) as i64
    }

    fn shard_mask(&self) -> u64 {
        low_mask(self.shard_bits)
    }

    /// Largest incremental value the layout can hold.
    pub fn incremental_capacity(&self) -> u64 {
        low_mask(self.incremental_bits)
    }

    /// Place `shard` in the random field and the low bits of `id` below it.
    pub fn compose(&self, shard: i64, id: i64) -> i64 {
        let field = (shard as u64 & self.shard_mask()) << self.incremental_bits;
        (field | (id as u64 & low_mask(self.incremental_bits))) as i64
    }

    pub fn decompose(&self, id: i64) -> ShardIdParts {
        let field = (id as u64 >> self.incremental_bits) & self.shard_mask();
        let low_width = self.shard_bits - self.range_bits;
        ShardIdParts {
            range: (field >> low_width) as i64,
            shard: (field & low_mask(low_width)) as i64,
            incremental: id & self.incremental_mask(),
        }
    }
}

fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Draw the per-encoder auto-random shard value from `seed`.
pub fn draw_shard(seed: i64) -> i64 {
    let mut rng = StdRng::seed_from_u64(seed as u64);
    rng.gen::<i64>() & i64::MAX
}

/// Mix `shard_bits` pseudo-random bits into `id` just below the sign bit.
///
/// The draw is seeded with `id`, so equal inputs always produce equal output
/// regardless of what was computed before. `shard_bits` is capped at
/// [`MAX_SHARD_BITS`].
pub fn shard_row_id(id: i64, shard_bits: u32) -> i64 {
    if shard_bits == 0 {
        return id;
    }
    let shard_bits = shard_bits.min(MAX_SHARD_BITS);
    let mask = low_mask(shard_bits) as i64;
    let shift = ROW_ID_BIT_LENGTH - shard_bits - 1;
    let draw = StdRng::seed_from_u64(id as u64).gen::<u32>();
    ((i64::from(draw) & mask) << shift) | id
}

/// Maps a row sequence number to the identifier actually stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoIdConverter {
    Identity,
    AutoRandom { layout: ShardIdLayout, shard: i64 },
    ShardRowId { shard_bits: u32 },
}

impl AutoIdConverter {
    /// Select the scheme the table declares, drawing the shard from `seed`.
    pub fn for_table(table: &TableInfo, seed: i64) -> Self {
        if let (Some(bits), Some(col)) = (table.auto_random, table.auto_random_column()) {
            let layout =
                ShardIdLayout::new(bits.shard_bits, bits.range_bits, col.field_type.unsigned);
            return AutoIdConverter::AutoRandom {
                layout,
                shard: draw_shard(seed),
            };
        }
        if table.shard_row_id_bits > 0 {
            return AutoIdConverter::ShardRowId {
                shard_bits: table.shard_row_id_bits,
            };
        }
        AutoIdConverter::Identity
    }

    pub fn convert(&self, row_seq: i64) -> i64 {
        match self {
            AutoIdConverter::Identity => row_seq,
            AutoIdConverter::AutoRandom { layout, shard } => layout.compose(*shard, row_seq),
            AutoIdConverter::ShardRowId { shard_bits } => shard_row_id(row_seq, *shard_bits),
        }
    }

    /// Layout of the auto-random scheme, if selected.
    pub fn layout(&self) -> Option<&ShardIdLayout> {
        match self {
            AutoIdConverter::AutoRandom { layout, .. } => Some(layout),
            _ => None,
        }
    }

    pub fn scheme_name(&self) -> &'static str {
        match self {
            AutoIdConverter::Identity => "identity",
            AutoIdConverter::AutoRandom { .. } => "auto_random",
            AutoIdConverter::ShardRowId { .. } => "shard_row_id",
        }
    }
}
