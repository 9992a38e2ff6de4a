//! Timestamps for channel scheduling.
//!
//! `RealTime` is a signed nanosecond count from the start of the composition.
//! The four reference instants bracket every real interval the allocator
//! stores, so interval lookups always have a neighbour on both sides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Nanoseconds per second.
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Ticks per beat (quarter note) - standard MIDI resolution.
pub const TICKS_PER_BEAT: u32 = 480;

/// Default tempo in beats per minute.
pub const DEFAULT_TEMPO: u32 = 120;

/// A point in (or span of) playback time with nanosecond resolution.
///
/// Differences between two `RealTime`s are themselves `RealTime`s, which is
/// how durations and slack are expressed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RealTime(i64);

impl RealTime {
    /// The epoch. Unbound intervals start and end here.
    pub const ZERO: RealTime = RealTime(0);

    /// The earliest instant a real interval may touch.
    pub const EARLIEST: RealTime = RealTime(0);

    /// Strictly before every real interval.
    pub const BEFORE_EARLIEST: RealTime = RealTime(-NANOS_PER_SEC);

    /// The latest instant a real interval may touch (about 146 years).
    pub const LATEST: RealTime = RealTime(i64::MAX / 2);

    /// Strictly after every real interval.
    pub const AFTER_LATEST: RealTime = RealTime(i64::MAX / 2 + NANOS_PER_SEC);

    /// Creates a time from whole seconds plus nanoseconds, saturating at the
    /// ends of the representable range.
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self(sec.saturating_mul(NANOS_PER_SEC).saturating_add(nsec))
    }

    /// Creates a time from a raw nanosecond count.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a time from fractional seconds.
    ///
    /// Values outside the representable range saturate.
    ///
    /// # Examples
    ///
    /// ```
    /// use chanalloc::RealTime;
    ///
    /// assert_eq!(RealTime::from_secs_f64(1.5), RealTime::from_millis(1500));
    /// ```
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    /// Converts a tick position to time at the given tempo.
    ///
    /// # Arguments
    ///
    /// * `ticks` - Number of ticks
    /// * `tempo` - Tempo in beats per minute
    pub fn from_ticks(ticks: u32, tempo: u32) -> Self {
        Self::from_secs_f64(ticks_to_seconds(ticks, tempo))
    }

    /// Raw nanosecond count.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Fractional seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Whole seconds (floored, so `nsec` is always non-negative).
    pub const fn sec(self) -> i64 {
        self.0.div_euclid(NANOS_PER_SEC)
    }

    /// Nanoseconds within the second.
    pub const fn nsec(self) -> i64 {
        self.0.rem_euclid(NANOS_PER_SEC)
    }

    /// True if this instant may be used as an interval bound in a request.
    pub fn is_schedulable(self) -> bool {
        self >= Self::EARLIEST && self <= Self::LATEST
    }
}

impl Add for RealTime {
    type Output = RealTime;

    fn add(self, rhs: RealTime) -> RealTime {
        RealTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for RealTime {
    type Output = RealTime;

    fn sub(self, rhs: RealTime) -> RealTime {
        RealTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for RealTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::BEFORE_EARLIEST => write!(f, "-inf"),
            Self::AFTER_LATEST => write!(f, "+inf"),
            _ => write!(f, "{}.{:09}s", self.sec(), self.nsec()),
        }
    }
}

/// Converts ticks to seconds based on tempo.
///
/// # Arguments
///
/// * `ticks` - Number of ticks
/// * `tempo` - Tempo in beats per minute
///
/// # Returns
///
/// Duration in seconds
pub fn ticks_to_seconds(ticks: u32, tempo: u32) -> f64 {
    let beats = ticks as f64 / TICKS_PER_BEAT as f64;
    beats * 60.0 / tempo.max(1) as f64
}
