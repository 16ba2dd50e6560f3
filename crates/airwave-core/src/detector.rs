//! Track-ending inference from noisy playback snapshots.
//!
//! The provider reports position/duration/pause through delayed, sometimes
//! contradictory snapshots. Two independent paths watch them:
//!
//!   - the reactive path (`observe`) runs on every state-change snapshot
//!     and recognizes the provider's own end-of-track behaviors;
//!   - the proactive path (`poll`) runs on a fixed 2 s tick and triggers
//!     slightly *before* the provider's native end event, because waiting
//!     for it leaves an audible gap.
//!
//! Both return an [`EndingReason`]; the controller funnels them through a
//! single entry point that enforces the single-flight guarantee. The
//! detector itself is pure bookkeeping: one retained previous snapshot and
//! a stall counter. Thresholds come from [`TimingConfig`]; they are tuned
//! against provider latency, not semantic invariants, and the reactive and
//! proactive rules are allowed to fire for the same physical ending.

use crate::config::TimingConfig;
use serde::{Deserialize, Serialize};

/// Point-in-time read of the provider playback state. Replaced on every
/// event and poll tick; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub position_ms: i64,
    pub duration_ms: i64,
    pub paused: bool,
    #[serde(default)]
    pub track_id: Option<String>,
}

impl PlaybackSnapshot {
    pub fn remaining_ms(&self) -> i64 {
        self.duration_ms - self.position_ms
    }
}

/// Which rule recognized the ending. Carried into logs so threshold tuning
/// can be done from the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndingReason {
    /// Paused with remaining time inside the near-end window.
    PausedNearEnd,
    /// Position reached or passed duration, pause state irrelevant.
    PastDuration,
    /// Position jumped from near-the-end back to near-zero while paused,
    /// the provider's native "finished and auto-paused at 0" behavior.
    ResetToStart,
    /// Position static across consecutive observations while nominally
    /// playing, close to the end.
    Stalled,
    /// Proactive: playing with less than the early-trigger window left.
    EarlyTrigger,
    /// Proactive: almost no time left and nothing else fired yet.
    Failsafe,
}

impl EndingReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PausedNearEnd => "paused-near-end",
            Self::PastDuration => "past-duration",
            Self::ResetToStart => "reset-to-start",
            Self::Stalled => "stalled",
            Self::EarlyTrigger => "early-trigger",
            Self::Failsafe => "failsafe",
        }
    }
}

#[derive(Debug)]
pub struct EndingDetector {
    tuning: TimingConfig,
    /// Exactly one previous snapshot is retained for delta comparison.
    previous: Option<PlaybackSnapshot>,
    last_known_position_ms: i64,
    stall_count: u32,
}

impl EndingDetector {
    pub fn new(tuning: TimingConfig) -> Self {
        Self {
            tuning,
            previous: None,
            last_known_position_ms: 0,
            stall_count: 0,
        }
    }

    /// Reactive path: inspect a state-change snapshot against the previous
    /// one. Always retains `snap` as the new previous snapshot.
    pub fn observe(&mut self, snap: &PlaybackSnapshot) -> Option<EndingReason> {
        let reason = self.classify(snap);
        self.previous = Some(snap.clone());
        reason
    }

    /// Proactive path: stricter early-trigger rule applied on the fixed
    /// poll tick. Does not touch the previous snapshot: the poll is a
    /// re-read, not a state change.
    pub fn poll(&self, snap: &PlaybackSnapshot) -> Option<EndingReason> {
        if snap.duration_ms <= 0 {
            return None;
        }
        let remaining = snap.remaining_ms();
        if !snap.paused && remaining < self.tuning.early_trigger_ms {
            return Some(EndingReason::EarlyTrigger);
        }
        if remaining < self.tuning.failsafe_ms {
            return Some(EndingReason::Failsafe);
        }
        None
    }

    /// Forget the previous snapshot and stall state. Called on station
    /// change and at the start of each transition so the outgoing track's
    /// tail cannot trip detection on the incoming one.
    pub fn reset(&mut self) {
        self.previous = None;
        self.reset_stall();
    }

    pub fn reset_stall(&mut self) {
        self.stall_count = 0;
        self.last_known_position_ms = 0;
    }

    fn classify(&mut self, snap: &PlaybackSnapshot) -> Option<EndingReason> {
        if snap.duration_ms <= 0 {
            return None;
        }
        let remaining = snap.remaining_ms();

        // Reset-to-start must be checked before the stall bookkeeping: the
        // jump back to zero would otherwise register as a huge delta and
        // clear the stall counter for nothing.
        if self.is_reset_to_start(snap) {
            return Some(EndingReason::ResetToStart);
        }

        let stalled = self.track_stall(snap);

        if snap.paused
            && remaining < self.tuning.near_end_ms
            && remaining >= -self.tuning.end_tolerance_ms
        {
            return Some(EndingReason::PausedNearEnd);
        }
        if snap.position_ms >= snap.duration_ms {
            return Some(EndingReason::PastDuration);
        }
        if stalled && remaining < self.tuning.stall_window_ms {
            return Some(EndingReason::Stalled);
        }
        None
    }

    /// Current snapshot near zero and paused, previous snapshot near the
    /// end of the same duration.
    fn is_reset_to_start(&self, snap: &PlaybackSnapshot) -> bool {
        if !snap.paused {
            return false;
        }
        let Some(prev) = &self.previous else {
            return false;
        };
        if prev.duration_ms <= 0 {
            return false;
        }
        let end_mark = (prev.duration_ms as f64 * self.tuning.reset_end_pct) as i64;
        let start_mark = (snap.duration_ms as f64 * self.tuning.reset_start_pct) as i64;
        prev.position_ms >= end_mark && snap.position_ms <= start_mark
    }

    /// Count consecutive observations where the position barely moved while
    /// nominally playing. Returns true once the confirmation count is met.
    fn track_stall(&mut self, snap: &PlaybackSnapshot) -> bool {
        let delta = (snap.position_ms - self.last_known_position_ms).abs();
        if !snap.paused && delta < self.tuning.stall_delta_ms {
            self.stall_count += 1;
        } else {
            self.stall_count = 0;
            self.last_known_position_ms = snap.position_ms;
        }
        self.stall_count >= self.tuning.stall_checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(position_ms: i64, duration_ms: i64, paused: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            position_ms,
            duration_ms,
            paused,
            track_id: Some("t1".into()),
        }
    }

    fn detector() -> EndingDetector {
        EndingDetector::new(TimingConfig::default())
    }

    #[test]
    fn test_mid_track_playback_is_quiet() {
        let mut d = detector();
        assert_eq!(d.observe(&snap(10_000, 212_000, false)), None);
        assert_eq!(d.observe(&snap(12_000, 212_000, false)), None);
        assert_eq!(d.poll(&snap(12_000, 212_000, false)), None);
    }

    #[test]
    fn test_paused_near_end() {
        let mut d = detector();
        assert_eq!(
            d.observe(&snap(211_500, 212_000, true)),
            Some(EndingReason::PausedNearEnd)
        );
    }

    #[test]
    fn test_paused_slightly_past_duration_within_tolerance() {
        let mut d = detector();
        assert_eq!(
            d.observe(&snap(212_050, 212_000, true)),
            Some(EndingReason::PausedNearEnd)
        );
    }

    #[test]
    fn test_position_past_duration_while_playing() {
        let mut d = detector();
        assert_eq!(
            d.observe(&snap(212_000, 212_000, false)),
            Some(EndingReason::PastDuration)
        );
    }

    #[test]
    fn test_paused_mid_track_is_not_an_ending() {
        let mut d = detector();
        assert_eq!(d.observe(&snap(100_000, 212_000, true)), None);
    }

    // The provider's native end behavior: almost-done, then a snapshot at
    // position 0, paused. Must be detected exactly once.
    #[test]
    fn test_reset_to_start_after_near_end() {
        let mut d = detector();
        assert_eq!(d.observe(&snap(211_900, 212_000, false)), None);
        assert_eq!(
            d.observe(&snap(0, 212_000, true)),
            Some(EndingReason::ResetToStart)
        );
        // The tail event repeating position 0 no longer matches: previous
        // is now the reset snapshot itself, nowhere near the end.
        assert_eq!(d.observe(&snap(0, 212_000, true)), None);
    }

    #[test]
    fn test_reset_requires_previous_near_end() {
        let mut d = detector();
        assert_eq!(d.observe(&snap(50_000, 212_000, false)), None);
        // Paused at zero after a mid-track snapshot is a user action
        // (restart), not an ending.
        assert_eq!(d.observe(&snap(0, 212_000, true)), None);
    }

    #[test]
    fn test_stall_near_end_confirmed_after_three_observations() {
        let mut d = detector();
        // Establish a baseline position near the end.
        assert_eq!(d.observe(&snap(210_500, 212_000, false)), None);
        assert_eq!(d.observe(&snap(210_520, 212_000, false)), None); // stall 1
        assert_eq!(d.observe(&snap(210_540, 212_000, false)), None); // stall 2
        assert_eq!(
            d.observe(&snap(210_560, 212_000, false)),
            Some(EndingReason::Stalled)
        );
    }

    #[test]
    fn test_stall_far_from_end_is_buffering_not_ending() {
        let mut d = detector();
        assert_eq!(d.observe(&snap(50_000, 212_000, false)), None);
        for _ in 0..5 {
            assert_eq!(d.observe(&snap(50_010, 212_000, false)), None);
        }
    }

    #[test]
    fn test_stall_counter_resets_on_movement() {
        let mut d = detector();
        assert_eq!(d.observe(&snap(210_500, 212_000, false)), None);
        assert_eq!(d.observe(&snap(210_520, 212_000, false)), None); // stall 1
        assert_eq!(d.observe(&snap(211_000, 212_000, false)), None); // moved
        assert_eq!(d.observe(&snap(211_020, 212_000, false)), None); // stall 1
        assert_eq!(d.observe(&snap(211_040, 212_000, false)), None); // stall 2
    }

    #[test]
    fn test_poll_early_trigger() {
        let d = detector();
        assert_eq!(
            d.poll(&snap(211_000, 212_000, false)),
            Some(EndingReason::EarlyTrigger)
        );
        assert_eq!(d.poll(&snap(209_000, 212_000, false)), None);
    }

    #[test]
    fn test_poll_failsafe_fires_even_when_paused() {
        let d = detector();
        assert_eq!(
            d.poll(&snap(211_700, 212_000, true)),
            Some(EndingReason::Failsafe)
        );
        assert_eq!(d.poll(&snap(210_000, 212_000, true)), None);
    }

    #[test]
    fn test_zero_duration_never_triggers() {
        let mut d = detector();
        assert_eq!(d.observe(&snap(0, 0, true)), None);
        assert_eq!(d.poll(&snap(0, 0, false)), None);
    }

    #[test]
    fn test_reset_clears_previous_snapshot() {
        let mut d = detector();
        assert_eq!(d.observe(&snap(211_900, 212_000, false)), None);
        d.reset();
        // Without the retained near-end snapshot the zero/paused snapshot
        // is unremarkable.
        assert_eq!(d.observe(&snap(0, 212_000, true)), None);
    }
}
