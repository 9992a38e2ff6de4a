//! Error types for channel allocation.

use crate::channel::ChannelId;
use crate::time::RealTime;
use thiserror::Error;

/// Errors reported by the channel allocator.
///
/// `AllocationExhausted` is an expected outcome under load and callers are
/// expected to pick a fallback. The remaining variants indicate a bookkeeping
/// bug in the caller and leave the allocator state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("no channel has a free window covering [{start}, {end})")]
    AllocationExhausted { start: RealTime, end: RealTime },

    #[error("invalid interval [{start}, {end})")]
    InvalidInterval { start: RealTime, end: RealTime },

    #[error("channel {channel} has no occupied window [{start}, {end}) to release")]
    DoubleRelease {
        channel: ChannelId,
        start: RealTime,
        end: RealTime,
    },

    #[error("no such channel: {0}")]
    NoSuchChannel(ChannelId),

    #[error("segment {0} appears more than once in one plan")]
    DuplicateSegment(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("free-channel bookkeeping corrupted: {0}")]
    Corrupted(String),
}

impl ChannelError {
    /// True if this is the recoverable "every channel is busy" outcome.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ChannelError::AllocationExhausted { .. })
    }
}

/// Errors that can occur while loading a session file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid session: {0}")]
    Invalid(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
