//! Beat sync - tempo comparison and pitch matching between the decks
//!
//! All comparisons use full-precision effective BPM (track BPM × playback
//! rate). Rounding happens only for display.

use super::deck::PITCH_RANGE_PERCENT;

/// Decks closer than this (in BPM) count as in sync
pub const SYNC_TOLERANCE_BPM: f64 = 2.0;

/// Accuracy lost per BPM of difference
const ACCURACY_PER_BPM: f64 = 10.0;

/// Tempo relationship between the two decks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncStatus {
    /// Absolute difference in effective BPM
    pub bpm_difference: f64,
    pub in_sync: bool,
    /// 100 when identical, dropping 10 per BPM of difference, floored at 0
    pub accuracy_percent: f64,
}

impl SyncStatus {
    /// Compare two effective tempos
    pub fn measure(bpm_a: f64, bpm_b: f64) -> Self {
        let bpm_difference = (bpm_a - bpm_b).abs();
        Self {
            bpm_difference,
            in_sync: bpm_difference < SYNC_TOLERANCE_BPM,
            accuracy_percent: (100.0 - bpm_difference * ACCURACY_PER_BPM).clamp(0.0, 100.0),
        }
    }
}

/// What a sync request did to the target deck
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// Target was already within tolerance; its pitch is unchanged
    AlreadyInSync,
    /// Target pitch was set to this value (percent, within ±20)
    Adjusted { pitch_percent: f64 },
}

/// Pitch the target needs so its effective BPM equals `source_effective_bpm`
///
/// Clamped to the pitch range, so a tempo gap wider than ±20% is only
/// partially closed.
pub fn matching_pitch(source_effective_bpm: f64, target_track_bpm: f64) -> f64 {
    if target_track_bpm <= 0.0 || !target_track_bpm.is_finite() {
        return 0.0;
    }
    let pitch = (source_effective_bpm / target_track_bpm - 1.0) * 100.0;
    if pitch.is_finite() {
        pitch.clamp(-PITCH_RANGE_PERCENT, PITCH_RANGE_PERCENT)
    } else {
        0.0
    }
}

/// Decide how to sync a target deck to a source deck
pub fn plan_sync(
    source_effective_bpm: f64,
    target_track_bpm: f64,
    target_effective_bpm: f64,
) -> SyncOutcome {
    if SyncStatus::measure(source_effective_bpm, target_effective_bpm).in_sync {
        SyncOutcome::AlreadyInSync
    } else {
        SyncOutcome::Adjusted {
            pitch_percent: matching_pitch(source_effective_bpm, target_track_bpm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_tempos() {
        let status = SyncStatus::measure(128.0, 128.0);
        assert_eq!(status.bpm_difference, 0.0);
        assert!(status.in_sync);
        assert_eq!(status.accuracy_percent, 100.0);
    }

    #[test]
    fn test_tolerance_is_strict() {
        assert!(SyncStatus::measure(128.0, 126.5).in_sync);
        assert!(!SyncStatus::measure(128.0, 126.0).in_sync);
    }

    #[test]
    fn test_accuracy_falls_off_and_floors() {
        let status = SyncStatus::measure(120.0, 123.0);
        assert!((status.accuracy_percent - 70.0).abs() < 1e-9);
        assert_eq!(SyncStatus::measure(120.0, 140.0).accuracy_percent, 0.0);
    }

    #[test]
    fn test_matching_pitch() {
        // 124 → 128 needs +3.2258%
        let pitch = matching_pitch(128.0, 124.0);
        assert!((pitch - 3.225806451612903).abs() < 1e-9);
        assert!((124.0 * (1.0 + pitch / 100.0) - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_matching_pitch_is_clamped() {
        assert_eq!(matching_pitch(174.0, 90.0), 20.0);
        assert_eq!(matching_pitch(60.0, 128.0), -20.0);
        assert_eq!(matching_pitch(128.0, 0.0), 0.0);
    }

    #[test]
    fn test_plan_sync_skips_when_close() {
        assert_eq!(plan_sync(128.0, 127.0, 127.0), SyncOutcome::AlreadyInSync);
        match plan_sync(128.0, 120.0, 120.0) {
            SyncOutcome::Adjusted { pitch_percent } => {
                assert!((pitch_percent - 6.666666666666667).abs() < 1e-9)
            }
            other => panic!("expected adjustment, got {:?}", other),
        }
    }
}
