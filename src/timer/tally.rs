use serde::Serialize;

use crate::sensing::DetectionStatus;

/// Per-second engagement counters for the running Focus phase.
///
/// Exactly one counter advances per elapsed second, chosen by the detection
/// status sampled at that second; `Loading` advances neither. Both reset at
/// the start of every fresh Focus phase and on explicit reset.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTally {
    pub studying_seconds: u64,
    pub distracted_seconds: u64,
}

impl ActivityTally {
    pub fn record(&mut self, status: DetectionStatus) {
        match status {
            DetectionStatus::Studying => self.studying_seconds += 1,
            DetectionStatus::Distracted => self.distracted_seconds += 1,
            DetectionStatus::Loading => {}
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn distraction_minutes(&self) -> u64 {
        self.distracted_seconds / 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_studying_counts_every_second() {
        let mut tally = ActivityTally::default();
        for _ in 0..90 {
            tally.record(DetectionStatus::Studying);
        }
        assert_eq!(tally.studying_seconds, 90);
        assert_eq!(tally.distracted_seconds, 0);
    }

    #[test]
    fn loading_counts_nothing() {
        let mut tally = ActivityTally::default();
        tally.record(DetectionStatus::Loading);
        tally.record(DetectionStatus::Loading);
        assert_eq!(tally.studying_seconds, 0);
        assert_eq!(tally.distracted_seconds, 0);
    }

    #[test]
    fn distraction_minutes_floor() {
        let mut tally = ActivityTally::default();
        for _ in 0..119 {
            tally.record(DetectionStatus::Distracted);
        }
        assert_eq!(tally.distraction_minutes(), 1);
        tally.record(DetectionStatus::Distracted);
        assert_eq!(tally.distraction_minutes(), 2);
    }

    #[test]
    fn reset_zeroes_both_counters() {
        let mut tally = ActivityTally::default();
        tally.record(DetectionStatus::Studying);
        tally.record(DetectionStatus::Distracted);
        tally.reset();
        assert_eq!(tally.studying_seconds, 0);
        assert_eq!(tally.distracted_seconds, 0);
    }
}
