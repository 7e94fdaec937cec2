//! # Control Status
//!
//! Implementation status of an organization's controls and the tally that
//! turns a set of statuses into a compliance score.

use serde::{Deserialize, Serialize};

/// Implementation status of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlStatus {
    /// Requirement fully met.
    Met,
    /// Requirement partially met.
    Partial,
    /// Requirement not met.
    Gap,
    /// Requirement does not apply to the organization.
    NotApplicable,
}

impl ControlStatus {
    /// Return the wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Met => "MET",
            Self::Partial => "PARTIAL",
            Self::Gap => "GAP",
            Self::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl Default for ControlStatus {
    fn default() -> Self {
        Self::Gap
    }
}

impl std::fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much a control matters to the organization's posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criticality {
    /// Low criticality.
    Low,
    /// Medium criticality.
    Medium,
    /// High criticality.
    High,
    /// Critical.
    Critical,
}

impl Default for Criticality {
    fn default() -> Self {
        Self::Medium
    }
}

/// Counts of controls per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlTally {
    /// Controls in `MET`.
    pub met: usize,
    /// Controls in `PARTIAL`.
    pub partial: usize,
    /// Controls in `GAP`.
    pub gap: usize,
    /// Controls in `NOT_APPLICABLE`.
    pub not_applicable: usize,
}

impl ControlTally {
    /// Tally an iterator of statuses.
    pub fn from_statuses(statuses: impl IntoIterator<Item = ControlStatus>) -> Self {
        let mut tally = Self::default();
        for status in statuses {
            match status {
                ControlStatus::Met => tally.met += 1,
                ControlStatus::Partial => tally.partial += 1,
                ControlStatus::Gap => tally.gap += 1,
                ControlStatus::NotApplicable => tally.not_applicable += 1,
            }
        }
        tally
    }

    /// Total number of controls tallied.
    pub fn total(&self) -> usize {
        self.met + self.partial + self.gap + self.not_applicable
    }

    /// Compliance score in percent: `(MET + 0.5·PARTIAL) / applicable × 100`.
    ///
    /// `None` when no applicable controls exist.
    pub fn score(&self) -> Option<f64> {
        let applicable = self.met + self.partial + self.gap;
        if applicable == 0 {
            return None;
        }
        let achieved = self.met as f64 + 0.5 * self.partial as f64;
        Some(achieved / applicable as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ControlStatus::NotApplicable).unwrap(),
            "\"NOT_APPLICABLE\""
        );
        assert_eq!(ControlStatus::Met.to_string(), "MET");
        assert_eq!(ControlStatus::default(), ControlStatus::Gap);
    }

    #[test]
    fn tally_counts_each_status() {
        let tally = ControlTally::from_statuses([
            ControlStatus::Met,
            ControlStatus::Met,
            ControlStatus::Partial,
            ControlStatus::Gap,
            ControlStatus::NotApplicable,
        ]);
        assert_eq!(tally.met, 2);
        assert_eq!(tally.partial, 1);
        assert_eq!(tally.gap, 1);
        assert_eq!(tally.not_applicable, 1);
        assert_eq!(tally.total(), 5);
    }

    #[test]
    fn score_excludes_not_applicable() {
        let tally = ControlTally::from_statuses([
            ControlStatus::Met,
            ControlStatus::Partial,
            ControlStatus::Gap,
            ControlStatus::NotApplicable,
        ]);
        // (1 + 0.5) / 3 * 100
        let score = tally.score().unwrap();
        assert!((score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_none_without_applicable_controls() {
        assert_eq!(ControlTally::default().score(), None);
        let only_na = ControlTally::from_statuses([ControlStatus::NotApplicable]);
        assert_eq!(only_na.score(), None);
    }

    proptest::proptest! {
        #[test]
        fn score_is_a_percentage(met in 0usize..50, partial in 0usize..50, gap in 0usize..50) {
            let tally = ControlTally { met, partial, gap, not_applicable: 0 };
            if let Some(score) = tally.score() {
                proptest::prop_assert!((0.0..=100.0).contains(&score));
            }
        }
    }
}
