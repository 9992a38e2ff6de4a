//! A timewise section of one channel on some device.

use super::{ChannelId, NO_CHANNEL};
use crate::time::RealTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A half-open span `[start, end)` bound to a channel, or unbound.
///
/// Unbound intervals are requests. Bound intervals are either occupied
/// windows handed out by [`FreeChannels`](super::FreeChannels) or free
/// windows inside it. Only the allocator can rebind an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelInterval {
    channel: ChannelId,
    start: RealTime,
    end: RealTime,
}

impl Default for ChannelInterval {
    fn default() -> Self {
        Self {
            channel: NO_CHANNEL,
            start: RealTime::ZERO,
            end: RealTime::ZERO,
        }
    }
}

impl ChannelInterval {
    /// Creates an interval bound to `channel`.
    ///
    /// `start <= end` is the caller's responsibility.
    ///
    /// # Examples
    ///
    /// ```
    /// use chanalloc::{ChannelInterval, RealTime};
    ///
    /// let iv = ChannelInterval::new(3, RealTime::from_millis(0), RealTime::from_millis(500));
    /// assert!(iv.valid_channel());
    /// assert_eq!(iv.channel_id(), 3);
    /// ```
    pub fn new(channel: ChannelId, start: RealTime, end: RealTime) -> Self {
        debug_assert!(start <= end, "interval start {} after end {}", start, end);
        Self { channel, start, end }
    }

    /// Creates an unbound request for `[start, end)`.
    pub fn unbound(start: RealTime, end: RealTime) -> Self {
        Self::new(NO_CHANNEL, start, end)
    }

    /// Returns the channel, or [`NO_CHANNEL`] if unbound.
    pub fn channel_id(&self) -> ChannelId {
        self.channel
    }

    /// Forgets the channel; the span is kept.
    pub fn clear_channel_id(&mut self) {
        self.channel = NO_CHANNEL;
    }

    /// True if bound to a channel.
    pub fn valid_channel(&self) -> bool {
        self.channel >= 0
    }

    pub(in crate::channel) fn set_channel_id(&mut self, channel: ChannelId) {
        self.channel = channel;
    }

    pub fn start(&self) -> RealTime {
        self.start
    }

    pub fn end(&self) -> RealTime {
        self.end
    }

    pub fn duration(&self) -> RealTime {
        self.end - self.start
    }

    /// True if `time` falls inside `[start, end)`.
    pub fn contains(&self, time: RealTime) -> bool {
        self.start <= time && time < self.end
    }

    /// True if `[start, end)` fits entirely inside this interval.
    pub fn covers(&self, start: RealTime, end: RealTime) -> bool {
        self.start <= start && end <= self.end
    }

    /// True if the two spans overlap in time, ignoring channels.
    pub fn overlaps(&self, other: &ChannelInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if one span ends exactly where the other begins.
    pub fn is_adjacent_to(&self, other: &ChannelInterval) -> bool {
        self.end == other.start || other.end == self.start
    }
}

/// Orders intervals by start time.
///
/// Ties fall back to end time and then channel so the order is total.
pub fn cmp_by_start(a: &ChannelInterval, b: &ChannelInterval) -> Ordering {
    a.start
        .cmp(&b.start)
        .then(a.end.cmp(&b.end))
        .then(a.channel.cmp(&b.channel))
}

/// Orders borrowed intervals by start time, for containers of references.
#[derive(Debug, Clone, Copy)]
pub struct ByStart<'a>(pub &'a ChannelInterval);

impl PartialEq for ByStart<'_> {
    fn eq(&self, other: &Self) -> bool {
        cmp_by_start(self.0, other.0) == Ordering::Equal
    }
}

impl Eq for ByStart<'_> {}

impl PartialOrd for ByStart<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByStart<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_by_start(self.0, other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: i64) -> RealTime {
        RealTime::from_millis(millis)
    }

    #[test]
    fn test_default_is_unbound() {
        let iv = ChannelInterval::default();
        assert!(!iv.valid_channel());
        assert_eq!(iv.channel_id(), NO_CHANNEL);
        assert_eq!(iv.start(), RealTime::ZERO);
        assert_eq!(iv.end(), RealTime::ZERO);
    }

    #[test]
    fn test_clear_keeps_span() {
        let mut iv = ChannelInterval::new(4, ms(10), ms(20));
        iv.clear_channel_id();
        assert!(!iv.valid_channel());
        assert_eq!(iv.start(), ms(10));
        assert_eq!(iv.end(), ms(20));
    }

    #[test]
    fn test_containment() {
        let iv = ChannelInterval::new(0, ms(10), ms(20));
        assert!(iv.contains(ms(10)));
        assert!(!iv.contains(ms(20)));
        assert!(iv.covers(ms(10), ms(20)));
        assert!(iv.covers(ms(12), ms(15)));
        assert!(!iv.covers(ms(5), ms(15)));
    }

    #[test]
    fn test_overlap_and_adjacency() {
        let a = ChannelInterval::new(0, ms(0), ms(10));
        let b = ChannelInterval::new(0, ms(10), ms(20));
        let c = ChannelInterval::new(0, ms(5), ms(15));
        assert!(!a.overlaps(&b));
        assert!(a.is_adjacent_to(&b));
        assert!(a.overlaps(&c));
        assert!(!a.is_adjacent_to(&c));
    }

    #[test]
    fn test_sort_by_start() {
        let mut v = vec![
            ChannelInterval::new(1, ms(30), ms(40)),
            ChannelInterval::new(0, ms(0), ms(10)),
            ChannelInterval::new(2, ms(10), ms(20)),
        ];
        v.sort_by(cmp_by_start);
        let starts: Vec<_> = v.iter().map(|iv| iv.start()).collect();
        assert_eq!(starts, vec![ms(0), ms(10), ms(30)]);

        let mut refs: Vec<ByStart<'_>> = v.iter().rev().map(ByStart).collect();
        refs.sort();
        assert_eq!(refs[0].0.start(), ms(0));
        assert_eq!(refs[2].0.start(), ms(30));
    }
}
