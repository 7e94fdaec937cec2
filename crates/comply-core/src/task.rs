//! # Task Vocabulary
//!
//! Work items raised against controls and evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Close a control gap.
    Remediation,
    /// Gather or refresh evidence.
    EvidenceCollection,
    /// Review a control or artifact.
    Review,
    /// Perform an assessment.
    Assessment,
    /// Anything else.
    Other,
}

impl Default for TaskType {
    fn default() -> Self {
        Self::Other
    }
}

/// Progress state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Waiting on something else.
    Blocked,
    /// Finished.
    Done,
    /// Abandoned.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl TaskStatus {
    /// Whether the task still needs work.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Done | Self::Cancelled)
    }
}

/// Urgency of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
    /// Needs immediate attention.
    Urgent,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// An open task whose due date has passed is overdue.
pub fn is_overdue(status: TaskStatus, due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    status.is_open() && due_date.is_some_and(|due| due < now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn done_and_cancelled_are_closed() {
        assert!(TaskStatus::Todo.is_open());
        assert!(TaskStatus::Blocked.is_open());
        assert!(!TaskStatus::Done.is_open());
        assert!(!TaskStatus::Cancelled.is_open());
    }

    #[test]
    fn overdue_only_when_open_and_past_due() {
        let now = Utc::now();
        let yesterday = Some(now - Duration::days(1));
        assert!(is_overdue(TaskStatus::InProgress, yesterday, now));
        assert!(!is_overdue(TaskStatus::Done, yesterday, now));
        assert!(!is_overdue(TaskStatus::Todo, Some(now + Duration::days(1)), now));
        assert!(!is_overdue(TaskStatus::Todo, None, now));
    }

    #[test]
    fn task_type_wire_name() {
        assert_eq!(
            serde_json::to_string(&TaskType::EvidenceCollection).unwrap(),
            "\"EVIDENCE_COLLECTION\""
        );
    }
}
