//! Channel planning for a set of timed segments.
//!
//! The planner plays the part of the playback scheduler: it walks segments in
//! start order, gives each one a [`ChannelManager`], and applies the overflow
//! policy when a device runs out of channels.

use crate::channel::{ChannelId, ChannelManager, Device};
use crate::error::ChannelError;
use crate::time::RealTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do with a segment when its device has no free channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Skip the segment; it does not sound.
    #[default]
    Drop,
    /// Play the segment on an already busy channel, accepting polyphony loss.
    Share,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(OverflowPolicy::Drop),
            "share" => Ok(OverflowPolicy::Share),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

/// A stretch of playback that needs one channel for its whole duration.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Unique name; identifies the segment's channel binding.
    pub name: String,
    pub device: Arc<Device>,
    pub start: RealTime,
    pub end: RealTime,
    pub preferred: Option<ChannelId>,
}

/// How a segment was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Booked exclusively on this channel.
    Assigned(ChannelId),
    /// Sharing this channel with booked segments; nothing was booked.
    Shared(ChannelId),
    /// Not played.
    Dropped,
}

impl Outcome {
    /// The channel the segment plays on, if any.
    pub fn channel(&self) -> Option<ChannelId> {
        match *self {
            Outcome::Assigned(ch) | Outcome::Shared(ch) => Some(ch),
            Outcome::Dropped => None,
        }
    }
}

/// One row of a [`PlaybackPlan`].
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub segment: String,
    pub device: String,
    pub start: RealTime,
    pub end: RealTime,
    pub outcome: Outcome,
}

/// Result of planning a batch of segments, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaybackPlan {
    pub assignments: Vec<Assignment>,
}

impl PlaybackPlan {
    /// Outcome for the named segment.
    pub fn outcome_of(&self, segment: &str) -> Option<Outcome> {
        self.assignments
            .iter()
            .find(|a| a.segment == segment)
            .map(|a| a.outcome)
    }

    pub fn assigned_count(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Assigned(_)))
    }

    pub fn shared_count(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Shared(_)))
    }

    pub fn dropped_count(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Dropped))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.assignments.iter().filter(|a| pred(&a.outcome)).count()
    }
}

/// Owns one channel manager per segment name.
#[derive(Debug, Default)]
pub struct Planner {
    policy: OverflowPolicy,
    managers: HashMap<String, ChannelManager>,
}

impl Planner {
    pub fn new(policy: OverflowPolicy) -> Self {
        Self {
            policy,
            managers: HashMap::new(),
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Books channels for `segments`, earliest start first.
    ///
    /// A segment whose name is already bound from an earlier call is
    /// re-booked for its new window.
    ///
    /// # Errors
    ///
    /// `DuplicateSegment` if two segments in `segments` share a name. Nothing
    /// is booked in that case.
    ///
    /// Anything other than exhaustion (bad intervals, a poisoned device)
    /// aborts planning. Segments planned before the error keep their
    /// bindings.
    pub fn plan(&mut self, segments: &[Segment]) -> Result<PlaybackPlan, ChannelError> {
        let mut names = HashSet::new();
        if let Some(dup) = segments.iter().find(|s| !names.insert(s.name.as_str())) {
            warn!(segment = %dup.name, "duplicate segment name");
            return Err(ChannelError::DuplicateSegment(dup.name.clone()));
        }

        let mut order: Vec<&Segment> = segments.iter().collect();
        order.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));

        let mut plan = PlaybackPlan::default();
        for segment in order {
            let outcome = self.plan_segment(segment)?;
            debug!(segment = %segment.name, ?outcome, "planned segment");
            plan.assignments.push(Assignment {
                segment: segment.name.clone(),
                device: segment.device.name().to_string(),
                start: segment.start,
                end: segment.end,
                outcome,
            });
        }
        Ok(plan)
    }

    fn plan_segment(&mut self, segment: &Segment) -> Result<Outcome, ChannelError> {
        let manager = self.managers.entry(segment.name.clone()).or_default();
        match manager.acquire(&segment.device, segment.start, segment.end, segment.preferred) {
            Ok(channel) => Ok(Outcome::Assigned(channel)),
            Err(e) if e.is_exhausted() => {
                warn!(
                    segment = %segment.name,
                    device = segment.device.name(),
                    start = %segment.start,
                    end = %segment.end,
                    policy = ?self.policy,
                    "no free channel"
                );
                match self.policy {
                    OverflowPolicy::Drop => Ok(Outcome::Dropped),
                    OverflowPolicy::Share => {
                        let shared = shared_channel(segment)?;
                        Ok(shared.map(Outcome::Shared).unwrap_or(Outcome::Dropped))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Releases the named segment's binding.
    ///
    /// # Returns
    ///
    /// true if the segment was known
    pub fn finish(&mut self, segment: &str) -> Result<bool, ChannelError> {
        match self.managers.remove(segment) {
            Some(mut manager) => {
                manager.release()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Releases every binding.
    pub fn release_all(&mut self) -> Result<(), ChannelError> {
        for (_, mut manager) in self.managers.drain() {
            manager.release()?;
        }
        Ok(())
    }

    /// Moves every binding on `from` to `to`.
    ///
    /// Segments that do not fit on `to` end up unbound and are returned.
    pub fn switch_device(
        &mut self,
        from: &Arc<Device>,
        to: &Arc<Device>,
    ) -> Result<Vec<String>, ChannelError> {
        let mut displaced = Vec::new();
        let mut names: Vec<&String> = self
            .managers
            .iter()
            .filter(|(_, m)| m.device_id() == Some(from.id()))
            .map(|(name, _)| name)
            .collect();
        names.sort();
        let names: Vec<String> = names.into_iter().cloned().collect();

        for name in names {
            if let Some(manager) = self.managers.get_mut(&name) {
                match manager.switch_device(to) {
                    Ok(_) => {}
                    Err(e) if e.is_exhausted() => displaced.push(name),
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(displaced)
    }

    /// Number of segments currently holding a channel.
    pub fn active_bindings(&self) -> usize {
        self.managers.values().filter(|m| m.is_bound()).count()
    }

    /// Channel held by the named segment, if bound.
    pub fn channel_of(&self, segment: &str) -> Option<ChannelId> {
        self.managers
            .get(segment)
            .filter(|m| m.is_bound())
            .map(|m| m.channel_id())
    }
}

/// Picks a channel to double up on: the preferred one if usable, otherwise
/// the available channel with the fewest booked windows overlapping the
/// segment.
fn shared_channel(segment: &Segment) -> Result<Option<ChannelId>, ChannelError> {
    segment.device.with_channels(|channels| {
        if let Some(preferred) = segment.preferred {
            if channels.available_channels().any(|ch| ch == preferred) {
                return Some(preferred);
            }
        }
        channels
            .available_channels()
            .min_by_key(|&ch| (channels.busy_windows(ch, segment.start, segment.end), ch))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> RealTime {
        RealTime::new(secs, 0)
    }

    fn segment(name: &str, device: &Arc<Device>, start: i64, end: i64) -> Segment {
        Segment {
            name: name.to_string(),
            device: Arc::clone(device),
            start: t(start),
            end: t(end),
            preferred: None,
        }
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("drop".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Drop));
        assert_eq!("Share".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Share));
        assert!("steal".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn test_two_channels_three_overlapping_segments() {
        let device = Arc::new(Device::new("dev", 2));
        let segments = vec![
            segment("a", &device, 0, 5),
            segment("b", &device, 2, 8),
            segment("c", &device, 1, 3),
        ];
        let mut planner = Planner::new(OverflowPolicy::Drop);
        let plan = planner.plan(&segments).unwrap();

        assert_eq!(plan.assigned_count(), 2);
        assert_eq!(plan.dropped_count(), 1);
        let channels: Vec<_> = plan
            .assignments
            .iter()
            .filter_map(|a| match a.outcome {
                Outcome::Assigned(ch) => Some(ch),
                _ => None,
            })
            .collect();
        assert_ne!(channels[0], channels[1]);
        // Processed by start time: a, c, b.
        assert_eq!(plan.outcome_of("b"), Some(Outcome::Dropped));
        assert_eq!(planner.active_bindings(), 2);
    }

    #[test]
    fn test_share_policy_picks_least_busy_channel() {
        let device = Arc::new(Device::new("dev", 2));
        let segments = vec![
            segment("a", &device, 0, 10),
            segment("b", &device, 0, 4),
            segment("c", &device, 5, 10),
            segment("d", &device, 6, 9),
        ];
        let mut planner = Planner::new(OverflowPolicy::Share);
        let plan = planner.plan(&segments).unwrap();

        assert_eq!(plan.outcome_of("a"), Some(Outcome::Assigned(0)));
        assert_eq!(plan.outcome_of("b"), Some(Outcome::Assigned(1)));
        assert_eq!(plan.outcome_of("c"), Some(Outcome::Assigned(1)));
        // Both channels are busy over [6, 9) with one window each.
        assert_eq!(plan.outcome_of("d"), Some(Outcome::Shared(0)));
        assert_eq!(plan.shared_count(), 1);
        assert_eq!(device.snapshot().unwrap().occupied_count(), 3);
    }

    #[test]
    fn test_share_with_no_channels_drops() {
        let device = Arc::new(Device::new("empty", 0));
        let mut planner = Planner::new(OverflowPolicy::Share);
        let plan = planner.plan(&[segment("a", &device, 0, 1)]).unwrap();
        assert_eq!(plan.outcome_of("a"), Some(Outcome::Dropped));
        assert_eq!(Outcome::Dropped.channel(), None);
    }

    #[test]
    fn test_invalid_segment_aborts() {
        let device = Arc::new(Device::new("dev", 1));
        let mut planner = Planner::new(OverflowPolicy::Drop);
        let err = planner.plan(&[segment("bad", &device, 5, 1)]).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidInterval { .. }));
    }

    #[test]
    fn test_zero_length_segment_is_assigned() {
        let device = Arc::new(Device::new("dev", 2));
        let segments = vec![
            segment("a", &device, 0, 5),
            segment("grace", &device, 3, 3),
            segment("b", &device, 6, 9),
        ];
        let mut planner = Planner::new(OverflowPolicy::Drop);
        let plan = planner.plan(&segments).unwrap();

        assert_eq!(plan.outcome_of("a"), Some(Outcome::Assigned(0)));
        assert_eq!(plan.outcome_of("grace"), Some(Outcome::Assigned(1)));
        assert_eq!(plan.assigned_count(), 3);
        assert_eq!(planner.channel_of("grace"), Some(1));

        planner.release_all().unwrap();
        let snapshot = device.snapshot().unwrap();
        assert!(snapshot.is_idle());
        snapshot.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_segment_names_rejected() {
        let device = Arc::new(Device::new("dev", 2));
        let segments = vec![
            segment("a", &device, 0, 5),
            segment("b", &device, 0, 5),
            segment("a", &device, 6, 9),
        ];
        let mut planner = Planner::new(OverflowPolicy::Drop);
        assert_eq!(
            planner.plan(&segments).unwrap_err(),
            ChannelError::DuplicateSegment("a".to_string())
        );
        assert_eq!(planner.active_bindings(), 0);
        assert!(device.snapshot().unwrap().is_idle());
    }

    #[test]
    fn test_finish_and_release_all() {
        let device = Arc::new(Device::new("dev", 2));
        let mut planner = Planner::new(OverflowPolicy::Drop);
        planner
            .plan(&[segment("a", &device, 0, 5), segment("b", &device, 0, 5)])
            .unwrap();
        assert_eq!(planner.channel_of("a"), Some(0));

        assert!(planner.finish("a").unwrap());
        assert!(!planner.finish("a").unwrap());
        assert_eq!(planner.channel_of("a"), None);
        assert_eq!(device.snapshot().unwrap().occupied_count(), 1);

        planner.release_all().unwrap();
        assert!(device.snapshot().unwrap().is_idle());
    }

    #[test]
    fn test_dropping_planner_releases_everything() {
        let device = Arc::new(Device::new("dev", 2));
        {
            let mut planner = Planner::new(OverflowPolicy::Drop);
            planner
                .plan(&[segment("a", &device, 0, 5), segment("b", &device, 3, 9)])
                .unwrap();
            assert_eq!(device.snapshot().unwrap().occupied_count(), 2);
        }
        assert!(device.snapshot().unwrap().is_idle());
    }

    #[test]
    fn test_switch_device_reports_displaced() {
        let old = Arc::new(Device::new("old", 2));
        let new = Arc::new(Device::new("new", 1));
        let mut planner = Planner::new(OverflowPolicy::Drop);
        planner
            .plan(&[segment("a", &old, 0, 5), segment("b", &old, 2, 6)])
            .unwrap();

        let displaced = planner.switch_device(&old, &new).unwrap();
        assert_eq!(displaced, vec!["b".to_string()]);
        assert!(old.snapshot().unwrap().is_idle());
        assert_eq!(new.snapshot().unwrap().occupied_count(), 1);
        assert_eq!(planner.active_bindings(), 1);
    }
}
