#![deny(missing_docs)]

//! # comply-core: Domain Vocabulary for the Comply Platform
//!
//! This crate defines the types every other crate in the workspace speaks:
//! status enums with their wire names, the review workflows for evidence
//! submissions and questionnaire answers, and the pure calculations behind
//! dashboards and reports. It has no I/O and no internal crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **One enum per status vocabulary.** Wire names are `SCREAMING_SNAKE_CASE`
//!    and are the same in JSON bodies, query strings and database columns.
//!
//! 2. **Workflows return `Result`.** Review and answer transitions are
//!    validated here and reject invalid moves with [`TransitionError`], so the
//!    HTTP layer only maps errors to status codes.
//!
//! 3. **Calculations are pure.** Scoring, ordering and tallies take plain
//!    values and never look at a clock or a store.

pub mod control;
pub mod error;
pub mod evidence;
pub mod framework;
pub mod library;
pub mod organization;
pub mod questionnaire;
pub mod report;
pub mod task;
pub mod validate;

pub use control::{ControlStatus, ControlTally, Criticality};
pub use error::{TransitionError, ValidationError};
pub use evidence::{EvidenceStatus, EvidenceType, ReviewDecision, ReviewStatus};
pub use framework::{FrameworkType, MappingRelationship, RiskLevel};
pub use library::{rank_suggestions, score_match, ScoredEntry};
pub use organization::{OrgRole, RiskTolerance};
pub use questionnaire::{
    decompose, AnswerDecision, AnswerStatus, ParsedQuestion, QuestionnaireProgress,
    QuestionnaireStatus,
};
pub use report::{ClauseCoverage, CoverageTally};
pub use task::{TaskPriority, TaskStatus, TaskType};
