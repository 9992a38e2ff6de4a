//! Free-window bookkeeping for the channels of one device.
//!
//! Each channel keeps its free windows in an ordered map keyed by start time.
//! A fresh channel has a single free window spanning
//! `[BEFORE_EARLIEST, AFTER_LATEST)`, and requests are confined to
//! `[EARLIEST, LATEST]`, so the first and last free windows are never consumed
//! and every lookup has a floor entry.
//!
//! A zero-length booking `[t, t)` needs a channel that is free at `t` but
//! consumes no time, so it leaves the free windows alone and is only counted
//! per instant until released.
//!
//! Allocation and release touch only the floor/ceiling neighbours of the
//! requested span, so both are O(log n) per channel in the number of windows.

use super::interval::ChannelInterval;
use super::ChannelId;
use crate::error::ChannelError;
use crate::time::RealTime;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Windows of one channel, `start -> end`, disjoint and sorted.
type WindowMap = BTreeMap<RealTime, RealTime>;

/// Free and occupied windows for every channel of a device.
#[derive(Debug, Clone)]
pub struct FreeChannels {
    free: Vec<WindowMap>,
    occupied: Vec<WindowMap>,
    /// Zero-length bookings per channel, `instant -> count`.
    instants: Vec<BTreeMap<RealTime, usize>>,
    reserved: Vec<bool>,
}

impl FreeChannels {
    /// Creates bookkeeping for `channel_count` channels, all entirely free.
    ///
    /// # Examples
    ///
    /// ```
    /// use chanalloc::{FreeChannels, RealTime};
    ///
    /// let mut channels = FreeChannels::new(2);
    /// let booked = channels
    ///     .allocate(RealTime::from_millis(0), RealTime::from_millis(500), None)
    ///     .unwrap();
    /// assert_eq!(booked.channel_id(), 0);
    /// channels.release(&booked).unwrap();
    /// assert!(channels.is_idle());
    /// ```
    pub fn new(channel_count: usize) -> Self {
        let whole_timeline = || {
            let mut map = WindowMap::new();
            map.insert(RealTime::BEFORE_EARLIEST, RealTime::AFTER_LATEST);
            map
        };
        Self {
            free: (0..channel_count).map(|_| whole_timeline()).collect(),
            occupied: (0..channel_count).map(|_| WindowMap::new()).collect(),
            instants: (0..channel_count).map(|_| BTreeMap::new()).collect(),
            reserved: vec![false; channel_count],
        }
    }

    /// Number of channels on the device, reserved ones included.
    pub fn channel_count(&self) -> usize {
        self.free.len()
    }

    fn index(&self, channel: ChannelId) -> Result<usize, ChannelError> {
        usize::try_from(channel)
            .ok()
            .filter(|&idx| idx < self.free.len())
            .ok_or(ChannelError::NoSuchChannel(channel))
    }

    fn validate(start: RealTime, end: RealTime) -> Result<(), ChannelError> {
        if start > end || !start.is_schedulable() || !end.is_schedulable() {
            return Err(ChannelError::InvalidInterval { start, end });
        }
        Ok(())
    }

    /// The free window on channel `idx` that contains all of `[start, end)`.
    ///
    /// For a zero-length request the window must contain `start` itself.
    fn fitting_window(
        &self,
        idx: usize,
        start: RealTime,
        end: RealTime,
    ) -> Option<(RealTime, RealTime)> {
        let (&fs, &fe) = self.free[idx].range(..=start).next_back()?;
        (fe >= end && fe > start).then_some((fs, fe))
    }

    /// Books `[start, end)` on some channel.
    ///
    /// The preferred channel wins if it has a fitting free window. Otherwise
    /// the channel whose fitting window leaves the least slack is chosen,
    /// with ties going to the lowest channel id. Reserved channels are never
    /// chosen.
    ///
    /// # Errors
    ///
    /// - `InvalidInterval` if `start > end` or either bound lies outside
    ///   `[EARLIEST, LATEST]`
    /// - `AllocationExhausted` if no channel has a single free window
    ///   covering the whole span
    pub fn allocate(
        &mut self,
        start: RealTime,
        end: RealTime,
        preferred: Option<ChannelId>,
    ) -> Result<ChannelInterval, ChannelError> {
        Self::validate(start, end)?;

        let preferred_fit = preferred
            .and_then(|channel| self.index(channel).ok())
            .filter(|&idx| !self.reserved[idx])
            .and_then(|idx| self.fitting_window(idx, start, end).map(|w| (idx, w)));

        let chosen = preferred_fit.or_else(|| {
            (0..self.free.len())
                .filter(|&idx| !self.reserved[idx])
                .filter_map(|idx| self.fitting_window(idx, start, end).map(|w| (idx, w)))
                .min_by_key(|&(idx, (fs, fe))| ((start - fs) + (fe - end), idx))
        });

        let Some((idx, (fs, fe))) = chosen else {
            debug!(%start, %end, "no free channel window");
            return Err(ChannelError::AllocationExhausted { start, end });
        };

        let mut booked = ChannelInterval::unbound(start, end);
        booked.set_channel_id(idx as ChannelId);

        if start == end {
            *self.instants[idx].entry(start).or_insert(0) += 1;
            debug!(channel = idx, %start, "booked zero-length window");
            return Ok(booked);
        }

        let free = &mut self.free[idx];
        free.remove(&fs);
        if fs < start {
            free.insert(fs, start);
        }
        if end < fe {
            free.insert(end, fe);
        }
        self.occupied[idx].insert(start, end);

        debug!(channel = idx, %start, %end, "allocated channel window");
        Ok(booked)
    }

    /// Returns a window previously handed out by [`allocate`](Self::allocate).
    pub fn release(&mut self, interval: &ChannelInterval) -> Result<(), ChannelError> {
        self.release_window(interval.channel_id(), interval.start(), interval.end())
    }

    /// Returns `[start, end)` on `channel` to the free set, merging it with
    /// free neighbours it touches exactly.
    ///
    /// # Errors
    ///
    /// - `NoSuchChannel` for an unknown channel
    /// - `InvalidInterval` for a malformed span
    /// - `DoubleRelease` if the span is not exactly an occupied window, or
    ///   for a zero-length span, if no booking at that instant is left
    pub fn release_window(
        &mut self,
        channel: ChannelId,
        start: RealTime,
        end: RealTime,
    ) -> Result<(), ChannelError> {
        let idx = self.index(channel)?;
        Self::validate(start, end)?;

        if start == end {
            return self.release_instant(idx, start);
        }

        if self.occupied[idx].get(&start) != Some(&end) {
            warn!(channel, %start, %end, "release of a window that is not occupied");
            return Err(ChannelError::DoubleRelease {
                channel,
                start,
                end,
            });
        }
        self.occupied[idx].remove(&start);

        let free = &mut self.free[idx];
        let mut merged_start = start;
        let mut merged_end = end;

        let previous = free.range(..start).next_back().map(|(&s, &e)| (s, e));
        if let Some((prev_start, prev_end)) = previous {
            if prev_end == start {
                free.remove(&prev_start);
                merged_start = prev_start;
            }
        }
        if let Some(next_end) = free.remove(&end) {
            merged_end = next_end;
        }
        free.insert(merged_start, merged_end);

        trace!(channel, start = %merged_start, end = %merged_end, "merged free window");
        debug!(channel, %start, %end, "released channel window");
        Ok(())
    }

    fn release_instant(&mut self, idx: usize, at: RealTime) -> Result<(), ChannelError> {
        let channel = idx as ChannelId;
        let instants = &mut self.instants[idx];
        let Some(count) = instants.get_mut(&at) else {
            warn!(channel, %at, "release of a zero-length window that is not booked");
            return Err(ChannelError::DoubleRelease {
                channel,
                start: at,
                end: at,
            });
        };
        *count -= 1;
        if *count == 0 {
            instants.remove(&at);
        }
        debug!(channel, %at, "released zero-length window");
        Ok(())
    }

    /// The free window on `channel` covering `time`, if any.
    pub fn query_free(&self, channel: ChannelId, time: RealTime) -> Option<ChannelInterval> {
        let idx = self.index(channel).ok()?;
        let (&fs, &fe) = self.free[idx].range(..=time).next_back()?;
        (time < fe).then(|| ChannelInterval::new(channel, fs, fe))
    }

    /// Free windows of `channel` in start order, sentinels included.
    pub fn free_windows(&self, channel: ChannelId) -> Vec<ChannelInterval> {
        Self::windows(&self.free, self.index(channel).ok(), channel)
    }

    /// Occupied windows of `channel` in start order.
    pub fn occupied_windows(&self, channel: ChannelId) -> Vec<ChannelInterval> {
        Self::windows(&self.occupied, self.index(channel).ok(), channel)
    }

    fn windows(maps: &[WindowMap], idx: Option<usize>, channel: ChannelId) -> Vec<ChannelInterval> {
        idx.and_then(|i| maps.get(i))
            .map(|map| {
                map.iter()
                    .map(|(&s, &e)| ChannelInterval::new(channel, s, e))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of occupied windows on `channel` that overlap `[start, end)`.
    pub fn busy_windows(&self, channel: ChannelId, start: RealTime, end: RealTime) -> usize {
        let Ok(idx) = self.index(channel) else {
            return 0;
        };
        self.occupied[idx]
            .range(..end)
            .rev()
            .take_while(|&(_, &oe)| oe > start)
            .count()
    }

    /// Total number of bookings across all channels, zero-length ones
    /// included.
    pub fn occupied_count(&self) -> usize {
        let windows: usize = self.occupied.iter().map(|m| m.len()).sum();
        let instants: usize = self.instants.iter().flat_map(|m| m.values()).sum();
        windows + instants
    }

    /// True if nothing is booked on any channel.
    pub fn is_idle(&self) -> bool {
        self.occupied.iter().all(|m| m.is_empty()) && self.instants.iter().all(|m| m.is_empty())
    }

    /// Excludes `channel` from automatic allocation.
    ///
    /// Windows already booked on it stay booked and can still be released.
    pub fn reserve_channel(&mut self, channel: ChannelId) -> Result<(), ChannelError> {
        let idx = self.index(channel)?;
        self.reserved[idx] = true;
        Ok(())
    }

    /// Makes a reserved channel available to allocation again.
    pub fn unreserve_channel(&mut self, channel: ChannelId) -> Result<(), ChannelError> {
        let idx = self.index(channel)?;
        self.reserved[idx] = false;
        Ok(())
    }

    pub fn is_reserved(&self, channel: ChannelId) -> bool {
        self.index(channel)
            .map(|idx| self.reserved[idx])
            .unwrap_or(false)
    }

    /// Channels open to allocation, lowest first.
    pub fn available_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.reserved
            .iter()
            .enumerate()
            .filter(|&(_, &reserved)| !reserved)
            .map(|(idx, _)| idx as ChannelId)
    }

    /// Verifies that, per channel, free and occupied windows tile the whole
    /// bracketed timeline with no gaps, no overlap, and no unmerged free
    /// neighbours.
    pub fn check_invariants(&self) -> Result<(), ChannelError> {
        for (idx, (free, occupied)) in self.free.iter().zip(&self.occupied).enumerate() {
            let mut windows: Vec<(RealTime, RealTime, bool)> = free
                .iter()
                .map(|(&s, &e)| (s, e, true))
                .chain(occupied.iter().map(|(&s, &e)| (s, e, false)))
                .collect();
            windows.sort_by_key(|&(s, _, _)| s);

            let mut cursor = RealTime::BEFORE_EARLIEST;
            let mut previous_free = false;
            for &(start, end, is_free) in &windows {
                if start != cursor {
                    return Err(ChannelError::Corrupted(format!(
                        "channel {}: window at {} does not follow {}",
                        idx, start, cursor
                    )));
                }
                if start >= end {
                    return Err(ChannelError::Corrupted(format!(
                        "channel {}: empty window at {}",
                        idx, start
                    )));
                }
                if is_free && previous_free {
                    return Err(ChannelError::Corrupted(format!(
                        "channel {}: unmerged free windows at {}",
                        idx, start
                    )));
                }
                cursor = end;
                previous_free = is_free;
            }
            if cursor != RealTime::AFTER_LATEST {
                return Err(ChannelError::Corrupted(format!(
                    "channel {}: timeline ends at {}",
                    idx, cursor
                )));
            }
        }
        Ok(())
    }
}
