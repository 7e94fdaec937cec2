//! # Evidence API
//!
//! Evidence items owned by an organization. File bytes live in external
//! object storage; only their metadata is kept here. Responses report the
//! effective status, so an `ACTIVE` item past its expiry reads `EXPIRED`.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use comply_core::evidence::expires_within;
use comply_core::validate::{self, MAX_LONG_TEXT, MAX_SHORT_TEXT};
use comply_core::{EvidenceStatus, EvidenceType, OrgRole, ValidationError};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::auth::{require_org_role, CallerIdentity};
use crate::db::{self, persist_error};
use crate::error::AppError;
use crate::extractors::{
    extract_query, extract_validated_json, matches_search, paginate, Paginated, Validate,
};
use crate::records::{ClauseRecord, EvidenceRecord, FileMetadata};
use crate::state::AppState;

use super::org_scoped;

/// Largest `expiring_within_days` window accepted by the list filter.
const MAX_EXPIRY_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEvidenceRequest {
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub evidence_type: EvidenceType,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub status: Option<EvidenceStatus>,
    pub file: Option<FileMetadata>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub clause_ids: Vec<Uuid>,
}

impl Validate for CreateEvidenceRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("title", &self.title, MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)?;
        validate_file(self.file.as_ref())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEvidenceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub evidence_type: Option<EvidenceType>,
    #[schema(value_type = Option<String>)]
    pub status: Option<EvidenceStatus>,
    pub file: Option<FileMetadata>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
    /// Replaces the linked clauses when present.
    pub clause_ids: Option<Vec<Uuid>>,
}

impl Validate for UpdateEvidenceRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("title", self.title.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)?;
        validate_file(self.file.as_ref())
    }
}

fn validate_file(file: Option<&FileMetadata>) -> Result<(), ValidationError> {
    let Some(file) = file else {
        return Ok(());
    };
    validate::required("file.file_name", &file.file_name, MAX_SHORT_TEXT)?;
    if file.file_size.is_some_and(|size| size < 0) {
        return Err(ValidationError::Invalid {
            field: "file.file_size",
            reason: "must not be negative".into(),
        });
    }
    Ok(())
}

/// Every id in `clause_ids` must name an existing clause.
fn check_clauses(
    clauses: &HashMap<Uuid, ClauseRecord>,
    clause_ids: &[Uuid],
) -> Result<(), AppError> {
    match clause_ids.iter().find(|id| !clauses.contains_key(id)) {
        Some(missing) => Err(ValidationError::Invalid {
            field: "clause_ids",
            reason: format!("clause {missing} does not exist"),
        }
        .into()),
        None => Ok(()),
    }
}

fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[derive(Debug, Deserialize)]
pub struct ListEvidenceQuery {
    #[serde(rename = "type")]
    pub evidence_type: Option<EvidenceType>,
    pub status: Option<EvidenceStatus>,
    pub clause_id: Option<Uuid>,
    pub expiring_within_days: Option<i64>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Build the evidence router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations/:org_id/evidence",
            get(list_evidence).post(create_evidence),
        )
        .route(
            "/api/organizations/:org_id/evidence/:id",
            get(get_evidence).put(update_evidence).delete(delete_evidence),
        )
}

/// GET /api/organizations/:org_id/evidence: List evidence.
///
/// `status` filters on the effective status.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/evidence",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("type" = Option<String>, Query, description = "Evidence type filter"),
        ("status" = Option<String>, Query, description = "Effective status filter"),
        ("clause_id" = Option<Uuid>, Query, description = "Only evidence linked to this clause"),
        ("expiring_within_days" = Option<i64>, Query, description = "Only items expiring within N days (0 to 36500)"),
        ("search" = Option<String>, Query, description = "Substring of title, description or file name"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Page size (default 20, max 100)"),
    ),
    responses((status = 200, description = "Page of evidence, newest first")),
    tag = "evidence"
)]
async fn list_evidence(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    query: Result<Query<ListEvidenceQuery>, QueryRejection>,
) -> Result<Json<Paginated<EvidenceRecord>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;
    if query
        .expiring_within_days
        .is_some_and(|d| !(0..=MAX_EXPIRY_WINDOW_DAYS).contains(&d))
    {
        return Err(AppError::Validation(format!(
            "expiring_within_days must be between 0 and {MAX_EXPIRY_WINDOW_DAYS}"
        )));
    }
    let now = Utc::now();

    let mut items: Vec<EvidenceRecord> = state
        .evidence
        .filter(|e| e.organization_id == org_id)
        .into_iter()
        .map(|e| e.observed(now))
        .filter(|e| {
            query.evidence_type.map_or(true, |t| e.evidence_type == t)
                && query.status.map_or(true, |s| e.status == s)
                && query.clause_id.map_or(true, |c| e.clause_ids.contains(&c))
                && query
                    .expiring_within_days
                    .map_or(true, |days| expires_within(e.expires_at, now, days))
                && query.search.as_deref().map_or(true, |s| {
                    matches_search(
                        s,
                        &[
                            Some(&e.title),
                            e.description.as_deref(),
                            e.file.as_ref().map(|f| f.file_name.as_str()),
                        ],
                    )
                })
        })
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(paginate(items, query.page, query.limit)?))
}

/// POST /api/organizations/:org_id/evidence: Register an evidence item.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/evidence",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateEvidenceRequest,
    responses(
        (status = 201, description = "Evidence created", body = EvidenceRecord),
        (status = 400, description = "Validation error or unknown clause", body = crate::error::ErrorBody),
    ),
    tag = "evidence"
)]
async fn create_evidence(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<CreateEvidenceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceRecord>), AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let record = EvidenceRecord {
        id: Uuid::new_v4(),
        organization_id: org_id,
        title: req.title.trim().to_string(),
        description: req.description,
        evidence_type: req.evidence_type,
        status: req.status.unwrap_or_default(),
        file: req.file,
        expires_at: req.expires_at,
        clause_ids: dedup(req.clause_ids),
        uploaded_by: caller.user_id,
        created_at: now,
        updated_at: now,
    };

    {
        let clauses = state.clauses.read();
        let mut evidence = state.evidence.write();
        check_clauses(&clauses, &record.clause_ids)?;
        evidence.insert(record.id, record.clone());
    }

    if let Some(pool) = &state.db_pool {
        db::evidence::upsert(pool, &record)
            .await
            .map_err(|e| persist_error("evidence", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("evidence", record.id, "created")
            .in_org(org_id)
            .with_metadata(json!({ "title": record.title, "type": record.evidence_type })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record.observed(now))))
}

/// GET /api/organizations/:org_id/evidence/:id: Get an evidence item.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/evidence/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Evidence ID"),
    ),
    responses(
        (status = 200, description = "Evidence item", body = EvidenceRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "evidence"
)]
async fn get_evidence(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EvidenceRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let record = org_scoped(&state.evidence, "evidence", id, org_id, |e| e.organization_id)?;
    Ok(Json(record.observed(Utc::now())))
}

/// PUT /api/organizations/:org_id/evidence/:id: Update an evidence item.
#[utoipa::path(
    put,
    path = "/api/organizations/{org_id}/evidence/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Evidence ID"),
    ),
    request_body = UpdateEvidenceRequest,
    responses(
        (status = 200, description = "Updated", body = EvidenceRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "evidence"
)]
async fn update_evidence(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    body: Result<Json<UpdateEvidenceRequest>, JsonRejection>,
) -> Result<Json<EvidenceRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let updated = {
        let clauses = state.clauses.read();
        let mut evidence = state.evidence.write();
        let record = evidence
            .get_mut(&id)
            .filter(|e| e.organization_id == org_id)
            .ok_or_else(|| AppError::not_found("evidence", id))?;
        if let Some(clause_ids) = &req.clause_ids {
            check_clauses(&clauses, clause_ids)?;
        }

        if let Some(title) = req.title {
            record.title = title.trim().to_string();
        }
        if let Some(description) = req.description {
            record.description = Some(description);
        }
        if let Some(evidence_type) = req.evidence_type {
            record.evidence_type = evidence_type;
        }
        if let Some(status) = req.status {
            record.status = status;
        }
        if req.file.is_some() {
            record.file = req.file;
        }
        if req.expires_at.is_some() {
            record.expires_at = req.expires_at;
        }
        if let Some(clause_ids) = req.clause_ids {
            record.clause_ids = dedup(clause_ids);
        }
        record.updated_at = now;
        record.clone()
    };

    if let Some(pool) = &state.db_pool {
        db::evidence::upsert(pool, &updated)
            .await
            .map_err(|e| persist_error("evidence", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("evidence", id, "updated").in_org(org_id),
    )
    .await?;
    Ok(Json(updated.observed(now)))
}

/// DELETE /api/organizations/:org_id/evidence/:id: Delete an evidence item.
///
/// Blocked while open tasks reference the item. Control links are removed;
/// closed tasks and submissions keep their rows without the reference.
#[utoipa::path(
    delete,
    path = "/api/organizations/{org_id}/evidence/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Evidence ID"),
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Open tasks reference the evidence", body = crate::error::ErrorBody),
        (status = 403, description = "Organization ADMIN required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "evidence"
)]
async fn delete_evidence(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;

    let controls_unlinked = {
        let mut controls = state.controls.write();
        let mut evidence = state.evidence.write();
        let mut submissions = state.submissions.write();
        let mut tasks = state.tasks.write();

        match evidence.get(&id) {
            Some(e) if e.organization_id == org_id => {}
            _ => return Err(AppError::not_found("evidence", id)),
        }
        let open_tasks = tasks
            .values()
            .filter(|t| t.evidence_id == Some(id) && t.status.is_open())
            .count();
        if open_tasks > 0 {
            return Err(AppError::BadRequest(format!(
                "cannot delete evidence {id}: {open_tasks} open task(s) reference it"
            )));
        }

        evidence.remove(&id);
        let now = Utc::now();
        let mut unlinked = 0usize;
        for control in controls.values_mut() {
            let before = control.evidence_ids.len();
            control.evidence_ids.retain(|e| *e != id);
            if control.evidence_ids.len() != before {
                control.updated_at = now;
                unlinked += 1;
            }
        }
        for submission in submissions.values_mut().filter(|s| s.evidence_id == Some(id)) {
            submission.evidence_id = None;
        }
        for task in tasks.values_mut().filter(|t| t.evidence_id == Some(id)) {
            task.evidence_id = None;
        }
        unlinked
    };

    if let Some(pool) = &state.db_pool {
        db::evidence::delete(pool, id)
            .await
            .map_err(|e| persist_error("evidence", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("evidence", id, "deleted")
            .in_org(org_id)
            .with_metadata(json!({ "controls_unlinked": controls_unlinked })),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(dedup(vec![a, b, a, b]), vec![a, b]);
    }

    #[test]
    fn file_metadata_needs_a_name_and_non_negative_size() {
        let mut file = FileMetadata {
            file_name: "soc2-report.pdf".into(),
            file_size: Some(1024),
            mime_type: Some("application/pdf".into()),
            storage_key: None,
            checksum: None,
        };
        assert!(validate_file(Some(&file)).is_ok());
        file.file_size = Some(-1);
        assert!(validate_file(Some(&file)).is_err());
        file.file_size = None;
        file.file_name = "  ".into();
        assert!(validate_file(Some(&file)).is_err());
        assert!(validate_file(None).is_ok());
    }
}
