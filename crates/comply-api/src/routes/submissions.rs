//! # Evidence Submissions API
//!
//! Versioned evidence submitted against a compliance clause, and the review
//! workflow that decides whether the clause counts as covered.
//!
//! Each new submission for an (organization, clause) pair takes the next
//! version number and becomes the only `is_latest` row for that pair. The
//! version is computed and earlier rows are demoted under one write lock on
//! the submissions store.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use comply_core::evidence::next_version;
use comply_core::validate::{self, MAX_LONG_TEXT, MAX_SHORT_TEXT};
use comply_core::{OrgRole, ReviewDecision, ReviewStatus, ValidationError};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::auth::{require_org_role, CallerIdentity};
use crate::db::{self, persist_error};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::records::{FileMetadata, SubmissionRecord};
use crate::state::AppState;

use super::org_scoped;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubmissionRequest {
    pub clause_id: Uuid,
    /// Existing evidence item backing the submission.
    pub evidence_id: Option<Uuid>,
    pub title: String,
    pub notes: Option<String>,
    pub file: Option<FileMetadata>,
}

impl Validate for CreateSubmissionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("title", &self.title, MAX_SHORT_TEXT)?;
        validate::optional("notes", self.notes.as_deref(), MAX_LONG_TEXT)?;
        if let Some(file) = &self.file {
            validate::required("file.file_name", &file.file_name, MAX_SHORT_TEXT)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewSubmissionRequest {
    /// APPROVED, REJECTED or NEEDS_REVISION.
    #[schema(value_type = String)]
    pub decision: ReviewDecision,
    /// Required unless the decision is APPROVED.
    pub comments: Option<String>,
}

impl Validate for ReviewSubmissionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("comments", self.comments.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListSubmissionsQuery {
    pub clause_id: Option<Uuid>,
    pub review_status: Option<ReviewStatus>,
    #[serde(default)]
    pub latest_only: bool,
}

/// Build the submissions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations/:org_id/submissions",
            get(list_submissions).post(create_submission),
        )
        .route(
            "/api/organizations/:org_id/submissions/:id",
            get(get_submission),
        )
        .route(
            "/api/organizations/:org_id/submissions/:id/review",
            post(review_submission),
        )
}

/// GET /api/organizations/:org_id/submissions: List submissions.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/submissions",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("clause_id" = Option<Uuid>, Query, description = "Clause filter"),
        ("review_status" = Option<String>, Query, description = "PENDING, APPROVED, REJECTED or NEEDS_REVISION"),
        ("latest_only" = Option<bool>, Query, description = "Only the latest version per clause"),
    ),
    responses((status = 200, description = "Submissions, newest version first per clause", body = Vec<SubmissionRecord>)),
    tag = "submissions"
)]
async fn list_submissions(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    query: Result<Query<ListSubmissionsQuery>, QueryRejection>,
) -> Result<Json<Vec<SubmissionRecord>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;

    let mut submissions = state.submissions.filter(|s| {
        s.organization_id == org_id
            && query.clause_id.map_or(true, |c| s.clause_id == c)
            && query.review_status.map_or(true, |r| s.review_status == r)
            && (!query.latest_only || s.is_latest)
    });
    submissions.sort_by(|a, b| {
        a.clause_id
            .cmp(&b.clause_id)
            .then(b.version.cmp(&a.version))
    });
    Ok(Json(submissions))
}

/// POST /api/organizations/:org_id/submissions: Submit evidence for a clause.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/submissions",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateSubmissionRequest,
    responses(
        (status = 201, description = "New submission version", body = SubmissionRecord),
        (status = 400, description = "Validation error or unknown clause", body = crate::error::ErrorBody),
        (status = 404, description = "Evidence not found", body = crate::error::ErrorBody),
    ),
    tag = "submissions"
)]
async fn create_submission(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<CreateSubmissionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionRecord>), AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let (record, superseded) = {
        let clauses = state.clauses.read();
        let evidence = state.evidence.read();
        let mut submissions = state.submissions.write();

        if !clauses.contains_key(&req.clause_id) {
            return Err(ValidationError::Invalid {
                field: "clause_id",
                reason: format!("clause {} does not exist", req.clause_id),
            }
            .into());
        }
        if let Some(evidence_id) = req.evidence_id {
            if !evidence
                .get(&evidence_id)
                .is_some_and(|e| e.organization_id == org_id)
            {
                return Err(AppError::not_found("evidence", evidence_id));
            }
        }

        let mut superseded = None;
        let mut versions = Vec::new();
        for prior in submissions
            .values_mut()
            .filter(|s| s.organization_id == org_id && s.clause_id == req.clause_id)
        {
            versions.push(prior.version);
            if prior.is_latest {
                prior.is_latest = false;
                superseded = Some(prior.id);
            }
        }

        let record = SubmissionRecord {
            id: Uuid::new_v4(),
            organization_id: org_id,
            clause_id: req.clause_id,
            evidence_id: req.evidence_id,
            title: req.title.trim().to_string(),
            notes: req.notes,
            file: req.file,
            version: next_version(versions),
            is_latest: true,
            review_status: ReviewStatus::Pending,
            reviewer_id: None,
            reviewed_at: None,
            review_comments: None,
            submitted_by: caller.user_id,
            created_at: now,
            updated_at: now,
        };
        submissions.insert(record.id, record.clone());
        (record, superseded)
    };

    if let Some(pool) = &state.db_pool {
        db::evidence::save_submission(pool, &record)
            .await
            .map_err(|e| persist_error("submission", record.id, e))?;
    }

    tracing::info!(
        submission_id = %record.id,
        clause_id = %record.clause_id,
        version = record.version,
        "evidence submitted"
    );
    audit::record(
        &state,
        &caller,
        AuditEntry::new("submission", record.id, "submitted")
            .in_org(org_id)
            .with_metadata(json!({
                "clause_id": record.clause_id,
                "version": record.version,
                "superseded": superseded,
            })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/organizations/:org_id/submissions/:id: Get a submission.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/submissions/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Submission ID"),
    ),
    responses(
        (status = 200, description = "Submission", body = SubmissionRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "submissions"
)]
async fn get_submission(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SubmissionRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    org_scoped(&state.submissions, "submission", id, org_id, |s| s.organization_id).map(Json)
}

/// POST /api/organizations/:org_id/submissions/:id/review: Review a submission.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/submissions/{id}/review",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Submission ID"),
    ),
    request_body = ReviewSubmissionRequest,
    responses(
        (status = 200, description = "Reviewed submission", body = SubmissionRecord),
        (status = 400, description = "Comments missing", body = crate::error::ErrorBody),
        (status = 403, description = "Organization ADMIN required", body = crate::error::ErrorBody),
        (status = 409, description = "Submission already reviewed", body = crate::error::ErrorBody),
    ),
    tag = "submissions"
)]
async fn review_submission(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    body: Result<Json<ReviewSubmissionRequest>, JsonRejection>,
) -> Result<Json<SubmissionRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;
    let req = extract_validated_json(body)?;

    let reviewed = state
        .submissions
        .try_update(&id, |s| {
            if s.organization_id != org_id {
                return Err(AppError::not_found("submission", id));
            }
            s.review_status = s.review_status.review(req.decision, req.comments.as_deref())?;
            let now = Utc::now();
            s.reviewer_id = caller.user_id;
            s.reviewed_at = Some(now);
            s.review_comments = req.comments.filter(|c| !c.trim().is_empty());
            s.updated_at = now;
            Ok(s.clone())
        })
        .ok_or_else(|| AppError::not_found("submission", id))??;

    if let Some(pool) = &state.db_pool {
        db::evidence::update_submission(pool, &reviewed)
            .await
            .map_err(|e| persist_error("submission", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("submission", id, "reviewed")
            .in_org(org_id)
            .with_metadata(json!({ "decision": reviewed.review_status.as_str() })),
    )
    .await?;
    Ok(Json(reviewed))
}
