//! Building blocks for multipart transfers: part planning, progress
//! aggregation, bounded-concurrency launching and payload byte ranges.

mod payload;
mod planner;
mod progress;
mod throttle;

pub use payload::{FilePayload, MemoryPayload, PayloadSource, ReadFuture, detect_content_type};
pub use planner::{PartLimits, PartPlan, plan_parts};
pub use progress::{ProgressAggregator, part_percentage};
pub use throttle::{Batch, Throttle};

/// Default lower bound for a part: 10 MiB.
pub const DEFAULT_MIN_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Default upper bound on the number of parts.
pub const DEFAULT_MAX_PARTS: u32 = 96;

/// Default size at or below which a payload is sent as a single part: 32 MiB.
pub const DEFAULT_SINGLE_PART_THRESHOLD: u64 = 32 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {offset}+{len} exceeds payload size {size}")]
    InvalidRange { offset: u64, len: u64, size: u64 },

    #[error("concurrency limit must be at least 1")]
    InvalidLimit,

    #[error("task join error: {0}")]
    Join(String),
}
