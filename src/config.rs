//! Session files.
//!
//! A session describes the devices to open, the segments to schedule on them
//! (times in seconds), and the overflow policy. Sessions are stored as JSON.

use crate::channel::{ChannelId, Device, MIDI_CHANNEL_COUNT};
use crate::error::ConfigError;
use crate::playback::{OverflowPolicy, Segment};
use crate::time::RealTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn default_channel_count() -> usize {
    MIDI_CHANNEL_COUNT
}

/// A device to open for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,

    /// Number of channels (16 for a MIDI port).
    #[serde(default = "default_channel_count")]
    pub channels: usize,

    /// Channels excluded from automatic allocation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<ChannelId>,
}

/// A segment to schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub name: String,

    /// Name of a device in the same session.
    pub device: String,

    /// Start time in seconds.
    pub start: f64,

    /// End time in seconds.
    pub end: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<ChannelId>,
}

/// Everything needed to run one allocation session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub segments: Vec<SegmentConfig>,

    #[serde(default)]
    pub overflow: OverflowPolicy,
}

/// Devices and segments built from a [`SessionConfig`].
#[derive(Debug)]
pub struct Session {
    pub devices: Vec<Arc<Device>>,
    pub segments: Vec<Segment>,
    pub overflow: OverflowPolicy,
}

impl Session {
    /// Looks up a device by name.
    pub fn device(&self, name: &str) -> Option<&Arc<Device>> {
        self.devices.iter().find(|d| d.name() == name)
    }
}

impl SessionConfig {
    /// Parses a session from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the session to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a session from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if file reading or parsing fails
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Saves the session to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Checks names and references.
    ///
    /// Interval bounds are left to the allocator, which rejects bad spans
    /// with a typed error when the segment is planned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut device_names = HashSet::new();
        for device in &self.devices {
            if !device_names.insert(device.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device name: {}",
                    device.name
                )));
            }
        }

        let mut segment_names = HashSet::new();
        for segment in &self.segments {
            if !segment_names.insert(segment.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate segment name: {}",
                    segment.name
                )));
            }
            if !device_names.contains(segment.device.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "segment {} refers to unknown device {}",
                    segment.name, segment.device
                )));
            }
            if !segment.start.is_finite() || !segment.end.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "segment {} has a non-finite time",
                    segment.name
                )));
            }
        }
        Ok(())
    }

    /// Validates the session and opens its devices.
    pub fn instantiate(&self) -> Result<Session, ConfigError> {
        self.validate()?;

        let devices = self
            .devices
            .iter()
            .map(|config| Device::from_config(config).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        let by_name: HashMap<&str, &Arc<Device>> =
            devices.iter().map(|d| (d.name(), d)).collect();

        let segments = self
            .segments
            .iter()
            .filter_map(|config| {
                by_name.get(config.device.as_str()).map(|device| Segment {
                    name: config.name.clone(),
                    device: Arc::clone(device),
                    start: RealTime::from_secs_f64(config.start),
                    end: RealTime::from_secs_f64(config.end),
                    preferred: config.preferred,
                })
            })
            .collect();

        Ok(Session {
            devices,
            segments,
            overflow: self.overflow,
        })
    }
}
