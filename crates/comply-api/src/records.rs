//! # Record Types
//!
//! API-layer representations of everything the service stores. Status
//! vocabularies come from `comply-core`; these structs add identity,
//! ownership and timestamps. Every record is `Clone` so it can live in a
//! [`Store`](crate::state::Store).

use chrono::{DateTime, Utc};
use comply_core::{
    AnswerStatus, ControlStatus, Criticality, EvidenceStatus, EvidenceType, FrameworkType,
    MappingRelationship, OrgRole, ReviewStatus, RiskLevel, RiskTolerance, TaskPriority, TaskStatus,
    TaskType,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// -- Framework catalogue ------------------------------------------------------

/// Regulatory framework that organization controls are written against.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FrameworkRecord {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    /// REGULATORY, STANDARD, INDUSTRY, INTERNAL or CUSTOM.
    #[schema(value_type = String)]
    pub framework_type: FrameworkType,
    pub source: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cross-framework requirement mapping.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FrameworkMappingRecord {
    pub id: Uuid,
    pub source_framework_id: Uuid,
    pub source_reference: String,
    pub target_framework_id: Uuid,
    pub target_reference: String,
    /// EQUIVALENT, SUBSET, SUPERSET or RELATED.
    #[schema(value_type = String)]
    pub relationship: MappingRelationship,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Compliance structure -----------------------------------------------------

/// Compliance framework: the root of the topic → component → clause tree.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComplianceFrameworkRecord {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopicRecord {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComponentRecord {
    pub id: Uuid,
    pub topic_id: Uuid,
    /// Owning compliance framework, copied from the topic on creation.
    pub framework_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single requirement. `reference` is unique within its component.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClauseRecord {
    pub id: Uuid,
    pub component_id: Uuid,
    pub topic_id: Uuid,
    pub framework_id: Uuid,
    /// Clause reference, e.g. `CC6.1`.
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub risk_level: RiskLevel,
    pub evidence_guidance: Option<String>,
    pub testing_guidance: Option<String>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Organizations ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationRecord {
    pub id: Uuid,
    pub name: String,
    /// URL-safe identifier, unique across organizations.
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's role in one organization. Unique per (organization, user).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MembershipRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    /// MEMBER, ADMIN or OWNER.
    #[schema(value_type = String)]
    pub role: OrgRole,
    pub created_at: DateTime<Utc>,
}

/// An organization's choice to track a compliance framework or one of its
/// clauses. A row without `clause_id` is the framework-level selection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SelectionRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub framework_id: Uuid,
    pub clause_id: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub risk_tolerance: Option<RiskTolerance>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Controls & evidence ------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ControlRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub framework_id: Uuid,
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
    /// MET, PARTIAL, GAP or NOT_APPLICABLE.
    #[schema(value_type = String)]
    pub status: ControlStatus,
    #[schema(value_type = String)]
    pub criticality: Criticality,
    pub owner_id: Option<Uuid>,
    /// Linked evidence items, in link order.
    pub evidence_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata of an uploaded file. The bytes live in external object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileMetadata {
    pub file_name: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub storage_key: Option<String>,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvidenceRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub evidence_type: EvidenceType,
    /// Stored status. Responses report the effective status, see
    /// [`EvidenceRecord::observed`].
    #[schema(value_type = String)]
    pub status: EvidenceStatus,
    pub file: Option<FileMetadata>,
    pub expires_at: Option<DateTime<Utc>>,
    pub clause_ids: Vec<Uuid>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvidenceRecord {
    /// Copy of the record with `status` as observed at `now`.
    pub fn observed(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.status.effective(self.expires_at, now);
        self
    }
}

/// A versioned evidence submission for one clause.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub clause_id: Uuid,
    pub evidence_id: Option<Uuid>,
    pub title: String,
    pub notes: Option<String>,
    pub file: Option<FileMetadata>,
    /// 1-based, increasing per (organization, clause).
    pub version: i32,
    /// Only the highest version for an (organization, clause) is latest.
    pub is_latest: bool,
    #[schema(value_type = String)]
    pub review_status: ReviewStatus,
    pub reviewer_id: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_comments: Option<String>,
    pub submitted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Tasks --------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub task_type: TaskType,
    #[schema(value_type = String)]
    pub status: TaskStatus,
    #[schema(value_type = String)]
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee_id: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub evidence_id: Option<Uuid>,
    /// Set while the task is DONE.
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Questionnaires -----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionnaireRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    /// Customer or party that sent the questionnaire.
    pub requester: Option<String>,
    pub description: Option<String>,
    pub file_name: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionRecord {
    pub id: Uuid,
    pub questionnaire_id: Uuid,
    pub organization_id: Uuid,
    pub order_index: i32,
    pub section: Option<String>,
    pub text: String,
    pub answer: Option<AnswerRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Answer to one question. `final_text` is set on approval.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerRecord {
    pub draft_text: String,
    pub final_text: Option<String>,
    #[schema(value_type = String)]
    pub status: AnswerStatus,
    /// Library entry the draft was seeded from, if any.
    pub library_entry_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewer_id: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_comments: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Reusable, pre-approved answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LibraryEntryRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub category: Option<String>,
    /// Canonical form of the question this entry answers.
    pub question: String,
    pub answer: String,
    pub key_phrases: Vec<String>,
    pub usage_count: i64,
    /// Curator confidence in `[0, 1]`.
    pub confidence_score: f64,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Audit --------------------------------------------------------------------

/// One entry of the hash-chained activity log.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AuditEventRecord {
    pub id: Uuid,
    /// Position in the chain, starting at 1.
    pub sequence: i64,
    pub actor_id: Option<Uuid>,
    pub actor_role: String,
    pub organization_id: Option<Uuid>,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub previous_hash: String,
    pub event_hash: String,
    pub created_at: DateTime<Utc>,
}
