//! # Compliance Selections API
//!
//! Which compliance frameworks, and which of their clauses, an organization
//! has taken on. A selection without a clause is the framework-level
//! selection; clause selections carry deadlines, risk tolerance and owners.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use comply_core::validate::{self, MAX_LONG_TEXT};
use comply_core::{OrgRole, RiskTolerance, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::auth::{require_org_role, CallerIdentity};
use crate::db::{self, persist_error};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::records::SelectionRecord;
use crate::state::AppState;

/// Select a compliance framework as a whole.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSelectionRequest {
    pub framework_id: Uuid,
    pub deadline: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub risk_tolerance: Option<RiskTolerance>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl Validate for CreateSelectionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("notes", self.notes.as_deref(), MAX_LONG_TEXT)
    }
}

/// Select many clauses of one framework at once.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkSelectionRequest {
    pub framework_id: Uuid,
    pub clause_ids: Vec<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub risk_tolerance: Option<RiskTolerance>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Largest number of clauses accepted by one bulk request.
const MAX_BULK_CLAUSES: usize = 1000;

impl Validate for BulkSelectionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.clause_ids.is_empty() {
            return Err(ValidationError::Empty("clause_ids"));
        }
        if self.clause_ids.len() > MAX_BULK_CLAUSES {
            return Err(ValidationError::Invalid {
                field: "clause_ids",
                reason: format!("at most {MAX_BULK_CLAUSES} clauses per request"),
            });
        }
        validate::optional("notes", self.notes.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSelectionRequest {
    pub deadline: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub risk_tolerance: Option<RiskTolerance>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl Validate for UpdateSelectionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("notes", self.notes.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListSelectionsQuery {
    pub framework_id: Option<Uuid>,
}

/// Outcome of a bulk selection.
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkSelectionResponse {
    pub created: Vec<SelectionRecord>,
    /// Clauses that were already selected.
    pub skipped: Vec<Uuid>,
}

/// Build the selections router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations/:org_id/selections",
            get(list_selections).post(create_selection),
        )
        .route(
            "/api/organizations/:org_id/selections/bulk",
            post(bulk_select),
        )
        .route(
            "/api/organizations/:org_id/selections/:id",
            put(update_selection).delete(delete_selection),
        )
}

/// GET /api/organizations/:org_id/selections: List selections.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/selections",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("framework_id" = Option<Uuid>, Query, description = "Compliance framework filter"),
    ),
    responses((status = 200, description = "Selections", body = Vec<SelectionRecord>)),
    tag = "selections"
)]
async fn list_selections(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    query: Result<Query<ListSelectionsQuery>, QueryRejection>,
) -> Result<Json<Vec<SelectionRecord>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;

    let mut selections = state.selections.filter(|s| {
        s.organization_id == org_id && query.framework_id.map_or(true, |f| s.framework_id == f)
    });
    // Framework-level rows first, then by creation.
    selections.sort_by(|a, b| {
        a.framework_id
            .cmp(&b.framework_id)
            .then_with(|| a.clause_id.is_some().cmp(&b.clause_id.is_some()))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    Ok(Json(selections))
}

/// POST /api/organizations/:org_id/selections: Select a framework.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/selections",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateSelectionRequest,
    responses(
        (status = 201, description = "Framework selected", body = SelectionRecord),
        (status = 400, description = "Unknown framework", body = crate::error::ErrorBody),
        (status = 409, description = "Already selected", body = crate::error::ErrorBody),
    ),
    tag = "selections"
)]
async fn create_selection(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<CreateSelectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SelectionRecord>), AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let record = SelectionRecord {
        id: Uuid::new_v4(),
        organization_id: org_id,
        framework_id: req.framework_id,
        clause_id: None,
        deadline: req.deadline,
        risk_tolerance: req.risk_tolerance,
        owner_id: req.owner_id,
        notes: req.notes,
        created_at: now,
        updated_at: now,
    };

    {
        let frameworks = state.compliance_frameworks.read();
        let mut selections = state.selections.write();
        if !frameworks.contains_key(&record.framework_id) {
            return Err(ValidationError::Invalid {
                field: "framework_id",
                reason: format!("compliance framework {} does not exist", record.framework_id),
            }
            .into());
        }
        if selections.values().any(|s| {
            s.organization_id == org_id
                && s.framework_id == record.framework_id
                && s.clause_id.is_none()
        }) {
            return Err(AppError::Conflict(format!(
                "compliance framework {} is already selected",
                record.framework_id
            )));
        }
        selections.insert(record.id, record.clone());
    }

    if let Some(pool) = &state.db_pool {
        db::organizations::upsert_selections(pool, std::slice::from_ref(&record))
            .await
            .map_err(|e| persist_error("selection", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("selection", record.id, "created")
            .in_org(org_id)
            .with_metadata(json!({ "framework_id": record.framework_id })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/organizations/:org_id/selections/bulk: Select many clauses.
///
/// Clauses already selected are skipped. Every clause must belong to the
/// given framework; otherwise nothing is created.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/selections/bulk",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = BulkSelectionRequest,
    responses(
        (status = 201, description = "Selections created", body = BulkSelectionResponse),
        (status = 400, description = "Unknown clause or clause of another framework", body = crate::error::ErrorBody),
    ),
    tag = "selections"
)]
async fn bulk_select(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<BulkSelectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BulkSelectionResponse>), AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let response = {
        let frameworks = state.compliance_frameworks.read();
        let clauses = state.clauses.read();
        let mut selections = state.selections.write();

        if !frameworks.contains_key(&req.framework_id) {
            return Err(ValidationError::Invalid {
                field: "framework_id",
                reason: format!("compliance framework {} does not exist", req.framework_id),
            }
            .into());
        }
        for clause_id in &req.clause_ids {
            match clauses.get(clause_id) {
                Some(clause) if clause.framework_id == req.framework_id => {}
                Some(_) => {
                    return Err(ValidationError::Invalid {
                        field: "clause_ids",
                        reason: format!(
                            "clause {clause_id} belongs to another compliance framework"
                        ),
                    }
                    .into())
                }
                None => {
                    return Err(ValidationError::Invalid {
                        field: "clause_ids",
                        reason: format!("clause {clause_id} does not exist"),
                    }
                    .into())
                }
            }
        }

        let mut created = Vec::new();
        let mut skipped = Vec::new();
        for clause_id in req.clause_ids {
            let exists = selections.values().any(|s| {
                s.organization_id == org_id
                    && s.framework_id == req.framework_id
                    && s.clause_id == Some(clause_id)
            });
            if exists || created.iter().any(|s: &SelectionRecord| s.clause_id == Some(clause_id)) {
                skipped.push(clause_id);
                continue;
            }
            let record = SelectionRecord {
                id: Uuid::new_v4(),
                organization_id: org_id,
                framework_id: req.framework_id,
                clause_id: Some(clause_id),
                deadline: req.deadline,
                risk_tolerance: req.risk_tolerance,
                owner_id: req.owner_id,
                notes: req.notes.clone(),
                created_at: now,
                updated_at: now,
            };
            selections.insert(record.id, record.clone());
            created.push(record);
        }
        BulkSelectionResponse { created, skipped }
    };

    if let Some(pool) = &state.db_pool {
        db::organizations::upsert_selections(pool, &response.created)
            .await
            .map_err(|e| persist_error("selection", req.framework_id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("selection", req.framework_id, "bulk_created")
            .in_org(org_id)
            .with_metadata(json!({
                "created": response.created.len(),
                "skipped": response.skipped.len(),
            })),
    )
    .await?;

    tracing::info!(
        organization_id = %org_id,
        framework_id = %req.framework_id,
        created = response.created.len(),
        skipped = response.skipped.len(),
        "bulk clause selection"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

/// PUT /api/organizations/:org_id/selections/:id: Update a selection.
#[utoipa::path(
    put,
    path = "/api/organizations/{org_id}/selections/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Selection ID"),
    ),
    request_body = UpdateSelectionRequest,
    responses(
        (status = 200, description = "Updated", body = SelectionRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "selections"
)]
async fn update_selection(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    body: Result<Json<UpdateSelectionRequest>, JsonRejection>,
) -> Result<Json<SelectionRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;
    let req = extract_validated_json(body)?;

    let updated = state
        .selections
        .try_update(&id, |s| {
            if s.organization_id != org_id {
                return Err(AppError::not_found("selection", id));
            }
            if req.deadline.is_some() {
                s.deadline = req.deadline;
            }
            if req.risk_tolerance.is_some() {
                s.risk_tolerance = req.risk_tolerance;
            }
            if req.owner_id.is_some() {
                s.owner_id = req.owner_id;
            }
            if req.notes.is_some() {
                s.notes = req.notes;
            }
            s.updated_at = Utc::now();
            Ok(s.clone())
        })
        .ok_or_else(|| AppError::not_found("selection", id))??;

    if let Some(pool) = &state.db_pool {
        db::organizations::upsert_selections(pool, std::slice::from_ref(&updated))
            .await
            .map_err(|e| persist_error("selection", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("selection", id, "updated").in_org(org_id),
    )
    .await?;
    Ok(Json(updated))
}

/// DELETE /api/organizations/:org_id/selections/:id: Remove a selection.
#[utoipa::path(
    delete,
    path = "/api/organizations/{org_id}/selections/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Selection ID"),
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "selections"
)]
async fn delete_selection(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;

    state.selections.mutate_all(|all| match all.get(&id) {
        Some(s) if s.organization_id == org_id => {
            all.remove(&id);
            Ok(())
        }
        _ => Err(AppError::not_found("selection", id)),
    })?;

    if let Some(pool) = &state.db_pool {
        db::organizations::delete_selection(pool, id)
            .await
            .map_err(|e| persist_error("selection", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("selection", id, "deleted").in_org(org_id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
