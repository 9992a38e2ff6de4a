//! A playback device and the lock guarding its channel bookkeeping.

use super::free_channels::FreeChannels;
use super::interval::ChannelInterval;
use super::ChannelId;
use crate::config::DeviceConfig;
use crate::error::ChannelError;
use crate::time::RealTime;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Global counter for generating unique device IDs.
static DEVICE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Generates a new unique device ID.
    pub fn new() -> Self {
        Self(DEVICE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

/// A device with a fixed channel count.
///
/// All mutation of the device's [`FreeChannels`] goes through one mutex, so
/// allocate and release are serialized per device. Share it as `Arc<Device>`.
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    name: String,
    channel_count: usize,
    channels: Mutex<FreeChannels>,
}

impl Device {
    /// Creates a device whose channels are all free.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name for the device
    /// * `channel_count` - Number of channels, fixed for the device's lifetime
    pub fn new(name: impl Into<String>, channel_count: usize) -> Self {
        Self {
            id: DeviceId::new(),
            name: name.into(),
            channel_count,
            channels: Mutex::new(FreeChannels::new(channel_count)),
        }
    }

    /// Creates a device from its session configuration, reserving the
    /// configured channels.
    pub fn from_config(config: &DeviceConfig) -> Result<Self, ChannelError> {
        let mut channels = FreeChannels::new(config.channels);
        for &channel in &config.reserved {
            channels.reserve_channel(channel)?;
        }
        Ok(Self {
            id: DeviceId::new(),
            name: config.name.clone(),
            channel_count: config.channels,
            channels: Mutex::new(channels),
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Runs `f` with exclusive access to the device's channel bookkeeping.
    pub fn with_channels<R>(
        &self,
        f: impl FnOnce(&mut FreeChannels) -> R,
    ) -> Result<R, ChannelError> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| ChannelError::DeviceUnavailable(self.name.clone()))?;
        Ok(f(&mut channels))
    }

    /// Books `[start, end)` on one of this device's channels.
    pub fn allocate(
        &self,
        start: RealTime,
        end: RealTime,
        preferred: Option<ChannelId>,
    ) -> Result<ChannelInterval, ChannelError> {
        self.with_channels(|channels| channels.allocate(start, end, preferred))?
    }

    /// Returns a booked window to this device.
    pub fn release(&self, interval: &ChannelInterval) -> Result<(), ChannelError> {
        self.with_channels(|channels| channels.release(interval))?
    }

    /// A copy of the current bookkeeping, for diagnostics.
    pub fn snapshot(&self) -> Result<FreeChannels, ChannelError> {
        self.with_channels(|channels| channels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MIDI_CHANNEL_COUNT, PERCUSSION_CHANNEL};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_device_ids_unique() {
        let a = Device::new("a", 16);
        let b = Device::new("b", 16);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.channel_count(), 16);
        assert_eq!(a.name(), "a");
    }

    #[test]
    fn test_from_config_reserves_channels() {
        let config = DeviceConfig {
            name: "gm".to_string(),
            channels: MIDI_CHANNEL_COUNT,
            reserved: vec![PERCUSSION_CHANNEL],
        };
        let device = Device::from_config(&config).unwrap();
        let snapshot = device.snapshot().unwrap();
        assert!(snapshot.is_reserved(PERCUSSION_CHANNEL));
        assert!(!snapshot.is_reserved(0));
    }

    #[test]
    fn test_from_config_rejects_unknown_reserved_channel() {
        let config = DeviceConfig {
            name: "small".to_string(),
            channels: 2,
            reserved: vec![5],
        };
        assert_eq!(
            Device::from_config(&config).unwrap_err(),
            ChannelError::NoSuchChannel(5)
        );
    }

    #[test]
    fn test_concurrent_allocations_never_collide() {
        let device = Arc::new(Device::new("shared", 4));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let device = Arc::clone(&device);
                thread::spawn(move || {
                    device.allocate(RealTime::new(0, 0), RealTime::new(10, 0), None)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let mut channels: Vec<_> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|iv| iv.channel_id()))
            .collect();
        channels.sort_unstable();
        assert_eq!(channels, vec![0, 1, 2, 3]);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 4);
        device.snapshot().unwrap().check_invariants().unwrap();
    }
}
