//! Shard-level building blocks for chunked transfers.
//!
//! Splits a local file into fixed-size, content-addressed shards and holds
//! the tier policy that decides how large those shards are.

mod progress;
mod shard;
mod types;
mod validation;

pub use progress::{ThroughputMeter, TransferProgress};
pub use shard::{ShardReader, fingerprint_bytes, fingerprint_file, for_each_shard, shard_count};
pub use types::{Fingerprint, Shard, TierClass, UploadSession};
pub use validation::{split_remote_path, validate_remote_path};

/// Shard size for the standard tier: 4 MiB.
pub const STANDARD_SHARD_SIZE: usize = 4 * 1024 * 1024;

/// Shard size for the elevated tier: 32 MiB.
pub const ELEVATED_SHARD_SIZE: usize = 32 * 1024 * 1024;

/// Largest file accepted on the standard tier: 4 GiB.
pub const STANDARD_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Largest file accepted on the elevated tier: 20 GiB.
pub const ELEVATED_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("shard size must be greater than zero")]
    ShardSize,
}
