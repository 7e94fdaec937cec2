//! # Security Questionnaires
//!
//! Decomposition of uploaded questionnaire text into questions, the answer
//! review workflow, and progress tallies.
//!
//! ## Answer States
//!
//! ```text
//! (none) ──save──▶ DRAFT ──submit──▶ SUBMITTED ──approve──▶ APPROVED
//!                    ▲                    │
//!                    │                    └──reject──▶ REJECTED
//!                    └────────save───────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Review state of a question's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerStatus {
    /// Being written.
    Draft,
    /// Waiting for review.
    Submitted,
    /// Accepted; the draft became the final answer.
    Approved,
    /// Sent back to the author.
    Rejected,
}

/// Reviewer verdict on a submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerDecision {
    /// Accept the answer.
    Approved,
    /// Send the answer back.
    Rejected,
}

impl AnswerStatus {
    /// Return the wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Check that a draft may be saved over an answer in `current` state.
    ///
    /// Unanswered, draft, and rejected answers are editable; submitted and
    /// approved answers are locked.
    pub fn ensure_editable(current: Option<AnswerStatus>) -> Result<(), TransitionError> {
        match current {
            None | Some(Self::Draft) | Some(Self::Rejected) => Ok(()),
            Some(locked) => Err(TransitionError::InvalidTransition {
                from: locked.as_str(),
                to: Self::Draft.as_str(),
                reason: "answer is locked while under review or after approval".to_string(),
            }),
        }
    }

    /// Submit a draft for review.
    pub fn submit(self, draft_text: &str) -> Result<AnswerStatus, TransitionError> {
        if self != Self::Draft {
            return Err(TransitionError::InvalidTransition {
                from: self.as_str(),
                to: Self::Submitted.as_str(),
                reason: "only draft answers can be submitted".to_string(),
            });
        }
        if draft_text.trim().is_empty() {
            return Err(TransitionError::InvalidTransition {
                from: self.as_str(),
                to: Self::Submitted.as_str(),
                reason: "answer text is empty".to_string(),
            });
        }
        Ok(Self::Submitted)
    }

    /// Apply a reviewer decision to a submitted answer.
    pub fn review(
        self,
        decision: AnswerDecision,
        comments: Option<&str>,
    ) -> Result<AnswerStatus, TransitionError> {
        let target = match decision {
            AnswerDecision::Approved => Self::Approved,
            AnswerDecision::Rejected => Self::Rejected,
        };
        if self != Self::Submitted {
            return Err(TransitionError::InvalidTransition {
                from: self.as_str(),
                to: target.as_str(),
                reason: "only submitted answers can be reviewed".to_string(),
            });
        }
        if target == Self::Rejected && !comments.is_some_and(|c| !c.trim().is_empty()) {
            return Err(TransitionError::MissingComments {
                to: target.as_str(),
            });
        }
        Ok(target)
    }
}

/// Overall state of a questionnaire, derived from its answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionnaireStatus {
    /// No question has an answer yet.
    NotStarted,
    /// Some answers are missing, drafted, or rejected.
    InProgress,
    /// Every question is submitted or approved, some still await review.
    UnderReview,
    /// Every answer is approved.
    Completed,
}

/// Answer counts for one questionnaire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireProgress {
    /// Number of questions.
    pub total: usize,
    /// Questions with no answer.
    pub unanswered: usize,
    /// Answers in `DRAFT`.
    pub draft: usize,
    /// Answers in `SUBMITTED`.
    pub submitted: usize,
    /// Answers in `APPROVED`.
    pub approved: usize,
    /// Answers in `REJECTED`.
    pub rejected: usize,
}

impl QuestionnaireProgress {
    /// Tally the answer state of each question (`None` = unanswered).
    pub fn from_answers(answers: impl IntoIterator<Item = Option<AnswerStatus>>) -> Self {
        let mut progress = Self::default();
        for answer in answers {
            progress.total += 1;
            match answer {
                None => progress.unanswered += 1,
                Some(AnswerStatus::Draft) => progress.draft += 1,
                Some(AnswerStatus::Submitted) => progress.submitted += 1,
                Some(AnswerStatus::Approved) => progress.approved += 1,
                Some(AnswerStatus::Rejected) => progress.rejected += 1,
            }
        }
        progress
    }

    /// Percent of questions submitted or approved.
    pub fn completion_percent(&self) -> f64 {
        percent(self.submitted + self.approved, self.total)
    }

    /// Percent of questions approved.
    pub fn approval_percent(&self) -> f64 {
        percent(self.approved, self.total)
    }

    /// Derived questionnaire status.
    pub fn status(&self) -> QuestionnaireStatus {
        if self.total == 0 || self.unanswered == self.total {
            QuestionnaireStatus::NotStarted
        } else if self.approved == self.total {
            QuestionnaireStatus::Completed
        } else if self.submitted + self.approved == self.total {
            QuestionnaireStatus::UnderReview
        } else {
            QuestionnaireStatus::InProgress
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// One question extracted from questionnaire text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuestion {
    /// Section heading the question appeared under, if any.
    pub section: Option<String>,
    /// Question text with numbering and bullets removed.
    pub text: String,
}

/// Split raw questionnaire text into questions.
///
/// - Blank lines are dropped.
/// - Lines starting with `#` are section headings and apply to the questions
///   that follow. So is a short line ending with `:` that contains no `?` and
///   does not open with a request ("Describe your backup policy:" stays a
///   question).
/// - Leading bullets (`-`, `*`, `•`) and numbering (`1.`, `2)`, `1.2.3`,
///   `Q4:`) are stripped.
/// - A line starting with a lowercase letter continues the previous
///   question when that question does not already end with `?`.
pub fn decompose(raw: &str) -> Vec<ParsedQuestion> {
    let mut section: Option<String> = None;
    let mut questions: Vec<ParsedQuestion> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(heading) = line.strip_prefix('#') {
            let heading = heading.trim_start_matches('#').trim();
            section = (!heading.is_empty()).then(|| heading.to_string());
            continue;
        }
        if let Some(heading) = colon_heading(line) {
            section = (!heading.is_empty()).then(|| heading.to_string());
            continue;
        }

        let text = strip_marker(line);
        if text.is_empty() {
            continue;
        }

        let continues_previous = text.starts_with(|c: char| c.is_lowercase())
            && questions
                .last()
                .is_some_and(|q| !q.text.ends_with('?'));
        if continues_previous {
            if let Some(previous) = questions.last_mut() {
                previous.text.push(' ');
                previous.text.push_str(text);
            }
            continue;
        }

        questions.push(ParsedQuestion {
            section: section.clone(),
            text: text.to_string(),
        });
    }

    questions
}

/// Remove a leading bullet or numbering marker from a line.
fn strip_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    for bullet in ['-', '*', '•'] {
        if let Some(rest) = trimmed.strip_prefix(bullet) {
            return rest.trim_start();
        }
    }

    // Optional `Q`/`q` prefix, then digits and dots, then one of `.`, `)`, `:`.
    let body = trimmed
        .strip_prefix('Q')
        .or_else(|| trimmed.strip_prefix('q'))
        .unwrap_or(trimmed);
    let numbering_len = body
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    let digits = &body[..numbering_len];
    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return trimmed;
    }
    let rest = &body[numbering_len..];
    let rest = rest
        .strip_prefix(')')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest);
    // Numbering must be followed by whitespace or a terminator we just removed,
    // otherwise the digits are part of the question ("2FA enabled?").
    if rest.len() == body.len() - numbering_len
        && !digits.ends_with('.')
        && !rest.starts_with(char::is_whitespace)
    {
        return trimmed;
    }
    rest.trim_start()
}

/// Longest colon-terminated line, in words, still read as a heading.
const MAX_HEADING_WORDS: usize = 6;

/// Words that open a request for an answer rather than name a section.
const REQUEST_VERBS: &[&str] = &[
    "briefly", "confirm", "define", "describe", "detail", "explain", "give", "identify",
    "indicate", "list", "outline", "please", "provide", "share", "specify", "state", "summarize",
    "summarise",
];

/// Heading text of a `Title:` line, or `None` when the line reads as a question.
fn colon_heading(line: &str) -> Option<&str> {
    let body = line.strip_suffix(':')?;
    if body.contains('?') {
        return None;
    }
    let heading = strip_marker(body);
    let opens_request = heading
        .split_whitespace()
        .next()
        .is_some_and(|w| REQUEST_VERBS.contains(&w.to_lowercase().as_str()));
    if opens_request || heading.split_whitespace().count() > MAX_HEADING_WORDS {
        return None;
    }
    Some(heading.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose_strips_numbering_and_tracks_sections() {
        let raw = "\
# Access Control
1. Do you enforce MFA for all employees?
2) Are access reviews performed quarterly?

Data Protection:
Q3: Is data encrypted at rest?
- Is data encrypted in transit?
";
        let questions = decompose(raw);
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[0].text, "Do you enforce MFA for all employees?");
        assert_eq!(questions[0].section.as_deref(), Some("Access Control"));
        assert_eq!(questions[1].text, "Are access reviews performed quarterly?");
        assert_eq!(questions[2].text, "Is data encrypted at rest?");
        assert_eq!(questions[2].section.as_deref(), Some("Data Protection"));
        assert_eq!(questions[3].text, "Is data encrypted in transit?");
    }

    #[test]
    fn decompose_keeps_leading_digits_that_are_not_numbering() {
        let questions = decompose("2FA is required for admins?");
        assert_eq!(questions[0].text, "2FA is required for admins?");
    }

    #[test]
    fn decompose_handles_dotted_numbering() {
        let questions = decompose("1.2.3 Describe your incident response plan");
        assert_eq!(questions[0].text, "Describe your incident response plan");
    }

    #[test]
    fn decompose_joins_wrapped_lines() {
        let raw = "1. Describe how production access is granted\n   and how it is revoked on termination.\n2. Next question?";
        let questions = decompose(raw);
        assert_eq!(questions.len(), 2);
        assert_eq!(
            questions[0].text,
            "Describe how production access is granted and how it is revoked on termination."
        );
    }

    #[test]
    fn colon_terminated_request_is_a_question_not_a_heading() {
        let raw = "\
Access Control:
Describe your backup policy:
2. List the regions where customer data is stored:
Does the vendor hold a current certification from an accredited auditor for this service:
";
        let questions = decompose(raw);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].text, "Describe your backup policy:");
        assert_eq!(questions[0].section.as_deref(), Some("Access Control"));
        assert_eq!(
            questions[1].text,
            "List the regions where customer data is stored:"
        );
        assert!(questions[2].text.starts_with("Does the vendor"));
        assert!(questions
            .iter()
            .all(|q| q.section.as_deref() == Some("Access Control")));
    }

    #[test]
    fn decompose_empty_input_yields_nothing() {
        assert!(decompose("\n\n   \n").is_empty());
    }

    #[test]
    fn draft_can_be_saved_over_rejected_but_not_submitted() {
        assert!(AnswerStatus::ensure_editable(None).is_ok());
        assert!(AnswerStatus::ensure_editable(Some(AnswerStatus::Draft)).is_ok());
        assert!(AnswerStatus::ensure_editable(Some(AnswerStatus::Rejected)).is_ok());
        assert!(AnswerStatus::ensure_editable(Some(AnswerStatus::Submitted)).is_err());
        assert!(AnswerStatus::ensure_editable(Some(AnswerStatus::Approved)).is_err());
    }

    #[test]
    fn submit_requires_draft_with_text() {
        assert_eq!(
            AnswerStatus::Draft.submit("Yes, via Okta."),
            Ok(AnswerStatus::Submitted)
        );
        assert!(AnswerStatus::Draft.submit("   ").is_err());
        assert!(AnswerStatus::Approved.submit("text").is_err());
    }

    #[test]
    fn review_paths() {
        assert_eq!(
            AnswerStatus::Submitted.review(AnswerDecision::Approved, None),
            Ok(AnswerStatus::Approved)
        );
        assert_eq!(
            AnswerStatus::Submitted.review(AnswerDecision::Rejected, None),
            Err(TransitionError::MissingComments { to: "REJECTED" })
        );
        assert_eq!(
            AnswerStatus::Submitted.review(AnswerDecision::Rejected, Some("cite the policy")),
            Ok(AnswerStatus::Rejected)
        );
        assert!(AnswerStatus::Draft
            .review(AnswerDecision::Approved, None)
            .is_err());
    }

    #[test]
    fn progress_and_status() {
        let progress = QuestionnaireProgress::from_answers([
            None,
            Some(AnswerStatus::Draft),
            Some(AnswerStatus::Submitted),
            Some(AnswerStatus::Approved),
        ]);
        assert_eq!(progress.total, 4);
        assert_eq!(progress.unanswered, 1);
        assert!((progress.completion_percent() - 50.0).abs() < 1e-9);
        assert!((progress.approval_percent() - 25.0).abs() < 1e-9);
        assert_eq!(progress.status(), QuestionnaireStatus::InProgress);
    }

    #[test]
    fn status_boundaries() {
        assert_eq!(
            QuestionnaireProgress::from_answers([None, None]).status(),
            QuestionnaireStatus::NotStarted
        );
        assert_eq!(
            QuestionnaireProgress::from_answers([
                Some(AnswerStatus::Submitted),
                Some(AnswerStatus::Approved)
            ])
            .status(),
            QuestionnaireStatus::UnderReview
        );
        assert_eq!(
            QuestionnaireProgress::from_answers([Some(AnswerStatus::Approved)]).status(),
            QuestionnaireStatus::Completed
        );
        assert_eq!(
            QuestionnaireProgress::default().status(),
            QuestionnaireStatus::NotStarted
        );
    }
}
