//! Per-entity channel binding.
//!
//! A `ChannelManager` holds at most one booked window on one device. Every
//! successful acquire is matched by exactly one release: an explicit
//! `release`, the next `acquire`, a device switch, or `Drop`.

use super::device::{Device, DeviceId};
use super::interval::ChannelInterval;
use super::{ChannelId, NO_CHANNEL};
use crate::error::ChannelError;
use crate::time::RealTime;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Mediates between one playback entity and a device's channels.
#[derive(Debug, Default)]
pub struct ChannelManager {
    /// The current window. Unbound (no channel) when nothing is held.
    interval: ChannelInterval,
    /// Device the window is booked on; `Some` exactly when bound.
    device: Option<Arc<Device>>,
}

impl ChannelManager {
    /// Creates an unbound manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Books a channel on `device` for `[start, end)`.
    ///
    /// Any window already held is released first, so on failure the manager
    /// is left unbound.
    ///
    /// # Examples
    ///
    /// ```
    /// use chanalloc::{ChannelManager, Device, RealTime};
    /// use std::sync::Arc;
    ///
    /// let device = Arc::new(Device::new("synth", 16));
    /// let mut manager = ChannelManager::new();
    /// let channel = manager
    ///     .acquire(&device, RealTime::from_millis(0), RealTime::from_millis(250), None)
    ///     .unwrap();
    /// assert_eq!(manager.channel_id(), channel);
    /// ```
    pub fn acquire(
        &mut self,
        device: &Arc<Device>,
        start: RealTime,
        end: RealTime,
        preferred: Option<ChannelId>,
    ) -> Result<ChannelId, ChannelError> {
        self.release()?;

        let booked = device.allocate(start, end, preferred)?;
        let channel = booked.channel_id();
        self.interval = booked;
        self.device = Some(Arc::clone(device));
        Ok(channel)
    }

    /// Gives the held window back to its device. A no-op when unbound.
    pub fn release(&mut self) -> Result<(), ChannelError> {
        let Some(device) = self.device.take() else {
            return Ok(());
        };
        let held = self.interval;
        self.interval.clear_channel_id();
        device.release(&held)?;
        debug!(
            device = device.name(),
            channel = held.channel_id(),
            "released channel binding"
        );
        Ok(())
    }

    /// Moves the held window to another device.
    ///
    /// The window is released on the current device and booked again on
    /// `device`, preferring the same channel number. If the new device has no
    /// room the manager ends up unbound and the error is returned.
    ///
    /// # Returns
    ///
    /// The new channel, or `None` if nothing was held
    pub fn switch_device(
        &mut self,
        device: &Arc<Device>,
    ) -> Result<Option<ChannelId>, ChannelError> {
        if !self.is_bound() {
            return Ok(None);
        }
        let previous = self.interval;
        let from = self.device.as_ref().map(|d| d.name().to_string());
        self.release()?;

        let channel = self.acquire(
            device,
            previous.start(),
            previous.end(),
            Some(previous.channel_id()),
        )?;
        info!(
            from = from.as_deref().unwrap_or("?"),
            to = device.name(),
            old_channel = previous.channel_id(),
            new_channel = channel,
            "moved channel binding"
        );
        Ok(Some(channel))
    }

    /// The held channel, or [`NO_CHANNEL`].
    pub fn channel_id(&self) -> ChannelId {
        if self.is_bound() {
            self.interval.channel_id()
        } else {
            NO_CHANNEL
        }
    }

    pub fn is_bound(&self) -> bool {
        self.device.is_some() && self.interval.valid_channel()
    }

    /// The held window, if bound.
    pub fn interval(&self) -> Option<&ChannelInterval> {
        self.is_bound().then_some(&self.interval)
    }

    /// The device the held window is booked on, if bound.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.device.as_ref().map(|d| d.id())
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release channel binding on drop: {}", e);
        }
    }
}
