//! chanalloc - time-interval channel allocation for MIDI and audio playback.
//!
//! Playback entities borrow a device channel for a window of time through a
//! [`ChannelManager`]; the device's [`FreeChannels`] keeps every channel's
//! free windows so that no two bound windows on one channel ever overlap.

pub mod channel;
pub mod config;
pub mod error;
pub mod playback;
pub mod time;

// Re-export commonly used types
pub use channel::{
    ChannelId, ChannelInterval, ChannelManager, Device, DeviceId, FreeChannels, NO_CHANNEL,
};
pub use config::{Session, SessionConfig};
pub use error::{ChannelError, ConfigError};
pub use playback::{Outcome, OverflowPolicy, PlaybackPlan, Planner, Segment};
pub use time::RealTime;
