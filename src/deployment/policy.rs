//! Playback policy: how the real-time side should schedule a published sequence.

use crate::deployment::constants::{BEATS_PER_BAR, DEFAULT_LOOP_BARS, MAX_LOOP_BARS};

/// Where sequence time zero is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAnchor {
    /// Event times count from the moment playback starts.
    RelativeToPlaybackStart,
    /// Event times are absolute host transport positions.
    Absolute,
}

/// Unit of event times in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// Quarter notes (pulses-per-quarter-note time base).
    Ppq,
    Seconds,
}

/// What happens to the previous stream when a new sequence arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteMode {
    /// Drop every event of the previous sequence and play only the new one.
    ReplaceAll,
    /// Keep already scheduled events and add the new ones.
    Merge,
}

/// Scheduling metadata published alongside a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPolicy {
    pub anchor: TimeAnchor,
    pub time_unit: TimeUnit,
    pub overwrite: OverwriteMode,
    /// Loop length in bars, or `None` to play once.
    pub loop_bars: Option<u32>,
}

impl PlaybackPolicy {
    /// Loop length in quarter notes.
    pub fn loop_quarter_notes(&self) -> Option<u32> {
        self.loop_bars.and_then(|bars| bars.checked_mul(BEATS_PER_BAR))
    }
}

/// Builds the policy every regenerated pattern is published with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPolicyBuilder {
    loop_bars: u32,
}

impl Default for PlaybackPolicyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_LOOP_BARS)
    }
}

impl PlaybackPolicyBuilder {
    /// Loop lengths above [`MAX_LOOP_BARS`] are clamped.
    pub fn new(loop_bars: u32) -> Self {
        if loop_bars > MAX_LOOP_BARS {
            log::warn!("loop of {loop_bars} bars clamped to {MAX_LOOP_BARS}");
        }
        Self {
            loop_bars: loop_bars.min(MAX_LOOP_BARS),
        }
    }

    pub fn build(&self) -> PlaybackPolicy {
        PlaybackPolicy {
            anchor: TimeAnchor::RelativeToPlaybackStart,
            time_unit: TimeUnit::Ppq,
            overwrite: OverwriteMode::ReplaceAll,
            loop_bars: (self.loop_bars > 0).then_some(self.loop_bars),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = PlaybackPolicyBuilder::default().build();

        assert_eq!(policy.anchor, TimeAnchor::RelativeToPlaybackStart);
        assert_eq!(policy.time_unit, TimeUnit::Ppq);
        assert_eq!(policy.overwrite, OverwriteMode::ReplaceAll);
        assert_eq!(policy.loop_bars, Some(8));
        assert_eq!(policy.loop_quarter_notes(), Some(32));
    }

    #[test]
    fn test_loop_length_is_configurable() {
        let policy = PlaybackPolicyBuilder::new(2).build();
        assert_eq!(policy.loop_bars, Some(2));
    }

    #[test]
    fn test_huge_loop_is_clamped() {
        let policy = PlaybackPolicyBuilder::new(u32::MAX).build();
        assert_eq!(policy.loop_bars, Some(MAX_LOOP_BARS));
        assert_eq!(policy.loop_quarter_notes(), Some(MAX_LOOP_BARS * BEATS_PER_BAR));

        let unchecked = PlaybackPolicy {
            loop_bars: Some(u32::MAX),
            ..policy
        };
        assert_eq!(unchecked.loop_quarter_notes(), None);
    }

    #[test]
    fn test_zero_bars_disables_looping() {
        let policy = PlaybackPolicyBuilder::new(0).build();
        assert_eq!(policy.loop_bars, None);
        assert_eq!(policy.loop_quarter_notes(), None);
    }

    #[test]
    fn test_build_is_stable() {
        let builder = PlaybackPolicyBuilder::default();
        assert_eq!(builder.build(), builder.build());
    }
}
