//! Block labeling
//!
//! Maps each time point of a session to its experimental context. Every
//! session family has one entry in a closed schedule table; alternation,
//! valid-bin cutoff and per-bin overrides are data, not branches.
//!
//! Times outside the valid bins are labeled [`BlockLabel::Undefined`] and kept.
//! Removing them is the caller's decision (see `pipeline::remove_undefined`).

use crate::error::ComputeError;
use crate::session::SessionFamily;
use crate::types::BlockLabel;
use serde::Serialize;

/// Width of one schedule bin in seconds
pub const BLOCK_BIN_WIDTH_SEC: f64 = 120.0;

/// Number of schedule bins in a test session (0–960 s)
pub const BLOCK_BIN_COUNT: usize = 8;

/// Fixed-width schedule with alternating labels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlternatingSchedule {
    pub bin_width: f64,
    pub bin_count: usize,
    /// Label of even bins, then odd bins
    pub sequence: [BlockLabel; 2],
    /// Highest bin index that carries a label
    pub max_idx: usize,
    /// Bins whose label replaces the alternation
    pub overrides: &'static [(usize, BlockLabel)],
}

impl AlternatingSchedule {
    /// Bin containing `time`, using right-open bins starting at 0
    pub fn bin_index(&self, time: f64) -> Option<usize> {
        if !time.is_finite() || time < 0.0 {
            return None;
        }
        let idx = (time / self.bin_width).floor() as usize;
        (idx < self.bin_count).then_some(idx)
    }

    pub fn label_for_bin(&self, idx: usize) -> BlockLabel {
        if idx > self.max_idx || idx >= self.bin_count {
            return BlockLabel::Undefined;
        }
        self.overrides
            .iter()
            .find(|(bin, _)| *bin == idx)
            .map(|(_, label)| *label)
            .unwrap_or(self.sequence[idx % 2])
    }

    pub fn label_at(&self, time: f64) -> BlockLabel {
        self.bin_index(time)
            .map(|idx| self.label_for_bin(idx))
            .unwrap_or(BlockLabel::Undefined)
    }
}

/// Block schedule of one session family
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockSchedule {
    /// The whole session is one context
    Constant { label: BlockLabel },
    Alternating(AlternatingSchedule),
}

impl BlockSchedule {
    pub fn label_at(&self, time: f64) -> BlockLabel {
        match self {
            BlockSchedule::Constant { label } => *label,
            BlockSchedule::Alternating(schedule) => schedule.label_at(time),
        }
    }

    /// `(start, end, label)` of every bin; empty for constant schedules
    pub fn bins(&self) -> Vec<(f64, f64, BlockLabel)> {
        match self {
            BlockSchedule::Constant { .. } => Vec::new(),
            BlockSchedule::Alternating(s) => (0..s.bin_count)
                .map(|idx| {
                    let start = idx as f64 * s.bin_width;
                    (start, start + s.bin_width, s.label_for_bin(idx))
                })
                .collect(),
        }
    }
}

const MORNING_SCHEDULE: BlockSchedule = BlockSchedule::Constant {
    label: BlockLabel::Safe,
};

const AFTERNOON_SCHEDULE: BlockSchedule = BlockSchedule::Constant {
    label: BlockLabel::Scary,
};

const TEST1_SCHEDULE: BlockSchedule = BlockSchedule::Alternating(AlternatingSchedule {
    bin_width: BLOCK_BIN_WIDTH_SEC,
    bin_count: BLOCK_BIN_COUNT,
    sequence: [BlockLabel::Safe, BlockLabel::Scary],
    max_idx: 5,
    overrides: &[],
});

const TEST2_SCHEDULE: BlockSchedule = BlockSchedule::Alternating(AlternatingSchedule {
    bin_width: BLOCK_BIN_WIDTH_SEC,
    bin_count: BLOCK_BIN_COUNT,
    sequence: [BlockLabel::Scary, BlockLabel::Safe],
    max_idx: 6,
    overrides: &[(6, BlockLabel::Mixed)],
});

impl SessionFamily {
    /// Schedule table entry for this family
    pub fn schedule(&self) -> BlockSchedule {
        match self {
            SessionFamily::Morning => MORNING_SCHEDULE,
            SessionFamily::Afternoon => AFTERNOON_SCHEDULE,
            SessionFamily::Test1 => TEST1_SCHEDULE,
            SessionFamily::Test2 => TEST2_SCHEDULE,
        }
    }
}

/// Labels time points of one session
#[derive(Debug, Clone)]
pub struct BlockLabeler {
    family: SessionFamily,
    schedule: BlockSchedule,
}

impl BlockLabeler {
    /// Look up the schedule for `session_name` once
    pub fn for_session(session_name: &str) -> Result<Self, ComputeError> {
        let family = SessionFamily::classify(session_name)?;
        Ok(Self {
            family,
            schedule: family.schedule(),
        })
    }

    pub fn family(&self) -> SessionFamily {
        self.family
    }

    pub fn schedule(&self) -> &BlockSchedule {
        &self.schedule
    }

    pub fn label_at(&self, time: f64) -> BlockLabel {
        self.schedule.label_at(time)
    }

    /// One label per timestamp, in input order
    pub fn label(&self, timestamps: &[f64]) -> Vec<BlockLabel> {
        timestamps.iter().map(|t| self.label_at(*t)).collect()
    }
}

/// Label every timestamp of `session_name`
pub fn label(timestamps: &[f64], session_name: &str) -> Result<Vec<BlockLabel>, ComputeError> {
    Ok(BlockLabeler::for_session(session_name)?.label(timestamps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use BlockLabel::{Mixed, Safe, Scary, Undefined};

    #[test]
    fn test_session1_schedule() {
        let times = [0.0, 60.0, 119.9, 120.0, 240.0, 360.0, 480.0, 600.0, 719.9, 720.0, 750.0];
        let labels = label(&times, "day4-test1").unwrap();

        assert_eq!(
            labels,
            vec![Safe, Safe, Safe, Scary, Safe, Scary, Safe, Scary, Scary, Undefined, Undefined]
        );
    }

    #[test]
    fn test_session2_schedule() {
        let times = [0.0, 119.0, 120.0, 700.0, 720.0, 839.9, 840.0, 959.0, 960.0, 5000.0];
        let labels = label(&times, "day5-test2").unwrap();

        assert_eq!(
            labels,
            vec![Scary, Scary, Safe, Safe, Mixed, Mixed, Undefined, Undefined, Undefined, Undefined]
        );
    }

    #[test]
    fn test_constant_sessions() {
        let times = [0.0, 500.0, 10_000.0];
        assert_eq!(label(&times, "day2-morning").unwrap(), vec![Safe; 3]);
        assert_eq!(label(&times, "day3-afternoon").unwrap(), vec![Scary; 3]);
    }

    #[test]
    fn test_out_of_range_times_undefined() {
        let labeler = BlockLabeler::for_session("day4-test1").unwrap();
        assert_eq!(labeler.label_at(-1.0), Undefined);
        assert_eq!(labeler.label_at(f64::NAN), Undefined);
        assert_eq!(labeler.label_at(960.0), Undefined);
    }

    #[test]
    fn test_unknown_session() {
        assert!(matches!(
            label(&[0.0], "day9-nope"),
            Err(ComputeError::UnknownSessionError(name)) if name == "day9-nope"
        ));
    }

    #[test]
    fn test_schedule_bins() {
        let bins = SessionFamily::Test2.schedule().bins();
        assert_eq!(bins.len(), BLOCK_BIN_COUNT);
        assert_eq!(bins[0], (0.0, 120.0, Scary));
        assert_eq!(bins[6], (720.0, 840.0, Mixed));
        assert_eq!(bins[7].2, Undefined);

        assert!(SessionFamily::Morning.schedule().bins().is_empty());
    }

    #[test]
    fn test_label_is_pure() {
        let times: Vec<f64> = (0..1000).map(|i| i as f64 * 0.97).collect();
        let first = label(&times, "day5-test2").unwrap();
        let second = label(&times, "day5-test2").unwrap();
        assert_eq!(first, second);
    }
}
