//! Channel allocation over time.
//!
//! A device exposes a fixed number of channels. Playback entities ask a
//! [`ChannelManager`] for a channel over a time window; the manager books the
//! window in the device's [`FreeChannels`] and gives it back on release, on
//! device switch, or when dropped.

mod device;
mod free_channels;
mod interval;
mod manager;

pub use device::{Device, DeviceId};
pub use free_channels::FreeChannels;
pub use interval::{cmp_by_start, ByStart, ChannelInterval};
pub use manager::ChannelManager;

/// Index of a channel on some device. Negative means no channel.
pub type ChannelId = i32;

/// The "unassigned" channel id.
pub const NO_CHANNEL: ChannelId = -1;

/// Channels on a General MIDI device.
pub const MIDI_CHANNEL_COUNT: usize = 16;

/// Channel 10 (index 9) is reserved for drums in General MIDI.
pub const PERCUSSION_CHANNEL: ChannelId = 9;
