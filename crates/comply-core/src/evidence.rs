//! # Evidence & Submission Review
//!
//! Evidence classification, expiry handling, and the review workflow for
//! evidence submissions.
//!
//! ## Review States
//!
//! ```text
//! PENDING ──▶ APPROVED
//!    │
//!    ├──────▶ REJECTED        (comments required)
//!    │
//!    └──────▶ NEEDS_REVISION  (comments required)
//! ```
//!
//! Reviewed submissions are final. A revision is a new submission with the
//! next version number; see [`next_version`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Kind of evidence artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceType {
    /// Generic document.
    Document,
    /// Screenshot of a system setting or console.
    Screenshot,
    /// Generated report (scan output, audit report).
    Report,
    /// Policy or procedure document.
    Policy,
    /// System or access log extract.
    Log,
    /// Third-party certificate or attestation.
    Certificate,
    /// Anything else.
    Other,
}

/// Lifecycle status of an evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceStatus {
    /// Uploaded but not yet in force.
    Draft,
    /// Current evidence.
    Active,
    /// Past its expiry date.
    Expired,
    /// Retired by the organization.
    Archived,
}

impl Default for EvidenceStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl EvidenceStatus {
    /// Status as observed at `now`: an `ACTIVE` item past its expiry is `EXPIRED`.
    pub fn effective(self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match (self, expires_at) {
            (Self::Active, Some(expiry)) if expiry <= now => Self::Expired,
            (status, _) => status,
        }
    }
}

/// Whether an expiry date falls within `days` days after `now` (and has not passed).
///
/// A window too large to represent has no upper bound.
pub fn expires_within(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>, days: i64) -> bool {
    let Some(expiry) = expires_at else {
        return false;
    };
    if expiry <= now {
        return false;
    }
    match Duration::try_days(days).and_then(|window| now.checked_add_signed(window)) {
        Some(horizon) => expiry <= horizon,
        None => days > 0,
    }
}

/// Review status of an evidence submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    /// Awaiting review.
    Pending,
    /// Accepted by a reviewer.
    Approved,
    /// Refused by a reviewer.
    Rejected,
    /// Reviewer asked for a revised submission.
    NeedsRevision,
}

/// Reviewer verdict on a pending submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    /// Accept the submission.
    Approved,
    /// Refuse the submission.
    Rejected,
    /// Ask for a new version.
    NeedsRevision,
}

impl ReviewStatus {
    /// Return the wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::NeedsRevision => "NEEDS_REVISION",
        }
    }

    /// Apply a reviewer decision, returning the new status.
    ///
    /// Only `PENDING` submissions can be reviewed. Rejections and revision
    /// requests must carry non-blank comments.
    pub fn review(
        self,
        decision: ReviewDecision,
        comments: Option<&str>,
    ) -> Result<ReviewStatus, TransitionError> {
        let target = ReviewStatus::from(decision);
        if self != Self::Pending {
            return Err(TransitionError::InvalidTransition {
                from: self.as_str(),
                to: target.as_str(),
                reason: "submission has already been reviewed".to_string(),
            });
        }
        let has_comments = comments.is_some_and(|c| !c.trim().is_empty());
        if target != Self::Approved && !has_comments {
            return Err(TransitionError::MissingComments {
                to: target.as_str(),
            });
        }
        Ok(target)
    }
}

impl From<ReviewDecision> for ReviewStatus {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Approved => Self::Approved,
            ReviewDecision::Rejected => Self::Rejected,
            ReviewDecision::NeedsRevision => Self::NeedsRevision,
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version number for the next submission given existing versions for the
/// same (organization, clause). Starts at 1.
pub fn next_version(existing: impl IntoIterator<Item = i32>) -> i32 {
    existing
        .into_iter()
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_be_approved_without_comments() {
        let next = ReviewStatus::Pending
            .review(ReviewDecision::Approved, None)
            .unwrap();
        assert_eq!(next, ReviewStatus::Approved);
    }

    #[test]
    fn rejection_requires_comments() {
        let err = ReviewStatus::Pending
            .review(ReviewDecision::Rejected, Some("  "))
            .unwrap_err();
        assert_eq!(err, TransitionError::MissingComments { to: "REJECTED" });

        let next = ReviewStatus::Pending
            .review(ReviewDecision::NeedsRevision, Some("blurry screenshot"))
            .unwrap();
        assert_eq!(next, ReviewStatus::NeedsRevision);
    }

    #[test]
    fn reviewed_submissions_are_final() {
        for status in [
            ReviewStatus::Approved,
            ReviewStatus::Rejected,
            ReviewStatus::NeedsRevision,
        ] {
            let result = status.review(ReviewDecision::Approved, Some("again"));
            assert!(
                matches!(result, Err(TransitionError::InvalidTransition { .. })),
                "{status} should not be reviewable"
            );
        }
    }

    #[test]
    fn versions_start_at_one_and_increment() {
        assert_eq!(next_version(Vec::new()), 1);
        assert_eq!(next_version(vec![1, 2, 3]), 4);
    }

    #[test]
    fn active_evidence_past_expiry_reads_as_expired() {
        let now = Utc::now();
        let past = Some(now - Duration::days(1));
        let future = Some(now + Duration::days(1));
        assert_eq!(EvidenceStatus::Active.effective(past, now), EvidenceStatus::Expired);
        assert_eq!(EvidenceStatus::Active.effective(future, now), EvidenceStatus::Active);
        assert_eq!(EvidenceStatus::Active.effective(None, now), EvidenceStatus::Active);
        assert_eq!(EvidenceStatus::Archived.effective(past, now), EvidenceStatus::Archived);
    }

    #[test]
    fn expiring_window() {
        let now = Utc::now();
        assert!(expires_within(Some(now + Duration::days(10)), now, 30));
        assert!(!expires_within(Some(now + Duration::days(31)), now, 30));
        assert!(!expires_within(Some(now - Duration::days(1)), now, 30));
        assert!(!expires_within(None, now, 30));
    }

    #[test]
    fn huge_expiry_window_does_not_overflow() {
        let now = Utc::now();
        let far = Some(now + Duration::days(365 * 900));
        assert!(expires_within(far, now, i64::MAX));
        assert!(expires_within(far, now, 200_000_000_000));
        assert!(!expires_within(Some(now - Duration::days(1)), now, i64::MAX));
        assert!(!expires_within(far, now, i64::MIN));
    }

    #[test]
    fn review_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ReviewStatus::NeedsRevision).unwrap(),
            "\"NEEDS_REVISION\""
        );
        let decision: ReviewDecision = serde_json::from_str("\"APPROVED\"").unwrap();
        assert_eq!(ReviewStatus::from(decision), ReviewStatus::Approved);
    }
}
