//! Clause coverage for compliance reports.
//!
//! A selected clause is covered when its latest evidence submission has been
//! approved.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::ReviewStatus;

/// Latest submission state for one selected clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseCoverage {
    /// The clause.
    pub clause_id: Uuid,
    /// Review status of the latest submission, `None` when nothing was submitted.
    pub latest: Option<ReviewStatus>,
}

impl ClauseCoverage {
    /// Whether the clause counts toward coverage.
    pub fn is_covered(&self) -> bool {
        self.latest == Some(ReviewStatus::Approved)
    }
}

/// Counts of selected clauses by latest submission state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageTally {
    /// Number of clauses considered.
    pub total: usize,
    /// Latest submission approved.
    pub approved: usize,
    /// Latest submission awaiting review.
    pub pending: usize,
    /// Latest submission rejected.
    pub rejected: usize,
    /// Latest submission sent back for revision.
    pub needs_revision: usize,
    /// No submission yet.
    pub missing: usize,
}

impl CoverageTally {
    /// Tally a set of clause coverage rows.
    pub fn from_clauses<'a>(clauses: impl IntoIterator<Item = &'a ClauseCoverage>) -> Self {
        let mut tally = Self::default();
        for clause in clauses {
            tally.total += 1;
            match clause.latest {
                None => tally.missing += 1,
                Some(ReviewStatus::Pending) => tally.pending += 1,
                Some(ReviewStatus::Approved) => tally.approved += 1,
                Some(ReviewStatus::Rejected) => tally.rejected += 1,
                Some(ReviewStatus::NeedsRevision) => tally.needs_revision += 1,
            }
        }
        tally
    }

    /// Percent of clauses covered; 0 when there are no clauses.
    pub fn coverage_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.approved as f64 / self.total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(latest: Option<ReviewStatus>) -> ClauseCoverage {
        ClauseCoverage {
            clause_id: Uuid::new_v4(),
            latest,
        }
    }

    #[test]
    fn only_approved_latest_counts_as_covered() {
        assert!(row(Some(ReviewStatus::Approved)).is_covered());
        assert!(!row(Some(ReviewStatus::Pending)).is_covered());
        assert!(!row(None).is_covered());
    }

    #[test]
    fn tally_and_percent() {
        let rows = vec![
            row(Some(ReviewStatus::Approved)),
            row(Some(ReviewStatus::Approved)),
            row(Some(ReviewStatus::Rejected)),
            row(None),
        ];
        let tally = CoverageTally::from_clauses(&rows);
        assert_eq!(tally.total, 4);
        assert_eq!(tally.approved, 2);
        assert_eq!(tally.rejected, 1);
        assert_eq!(tally.missing, 1);
        assert!((tally.coverage_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_report_has_zero_coverage() {
        assert_eq!(CoverageTally::default().coverage_percent(), 0.0);
    }
}
