//! # Controls API
//!
//! Organization controls written against a catalogue framework, with their
//! evidence links and the tasks that track remediation.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use comply_core::validate::{self, MAX_LONG_TEXT, MAX_SHORT_TEXT};
use comply_core::{ControlStatus, Criticality, OrgRole, ValidationError};
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
use crate::records::{ControlRecord, TaskRecord};
use crate::state::AppState;

use super::org_scoped;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateControlRequest {
    pub framework_id: Uuid,
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub status: Option<ControlStatus>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub criticality: Option<Criticality>,
    pub owner_id: Option<Uuid>,
}

impl Validate for CreateControlRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("reference", &self.reference, MAX_SHORT_TEXT)?;
        validate::required("title", &self.title, MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateControlRequest {
    pub reference: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub status: Option<ControlStatus>,
    #[schema(value_type = Option<String>)]
    pub criticality: Option<Criticality>,
    pub owner_id: Option<Uuid>,
}

impl Validate for UpdateControlRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("reference", self.reference.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("title", self.title.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListControlsQuery {
    pub framework_id: Option<Uuid>,
    pub status: Option<ControlStatus>,
    pub criticality: Option<Criticality>,
    pub owner_id: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Build the controls router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations/:org_id/controls",
            get(list_controls).post(create_control),
        )
        .route(
            "/api/organizations/:org_id/controls/:id",
            get(get_control).put(update_control).delete(delete_control),
        )
        .route(
            "/api/organizations/:org_id/controls/:id/evidence/:evidence_id",
            post(link_evidence).delete(unlink_evidence),
        )
        .route(
            "/api/organizations/:org_id/controls/:id/tasks",
            get(list_control_tasks),
        )
}

/// GET /api/organizations/:org_id/controls: List controls.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/controls",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("framework_id" = Option<Uuid>, Query, description = "Framework filter"),
        ("status" = Option<String>, Query, description = "MET, PARTIAL, GAP or NOT_APPLICABLE"),
        ("criticality" = Option<String>, Query, description = "Criticality filter"),
        ("owner_id" = Option<Uuid>, Query, description = "Owner filter"),
        ("search" = Option<String>, Query, description = "Substring of reference, title or description"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Page size (default 20, max 100)"),
    ),
    responses((status = 200, description = "Page of controls sorted by reference")),
    tag = "controls"
)]
async fn list_controls(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    query: Result<Query<ListControlsQuery>, QueryRejection>,
) -> Result<Json<Paginated<ControlRecord>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;

    let mut controls = state.controls.filter(|c| {
        c.organization_id == org_id
            && query.framework_id.map_or(true, |f| c.framework_id == f)
            && query.status.map_or(true, |s| c.status == s)
            && query.criticality.map_or(true, |k| c.criticality == k)
            && query.owner_id.map_or(true, |o| c.owner_id == Some(o))
            && query.search.as_deref().map_or(true, |s| {
                matches_search(
                    s,
                    &[Some(&c.reference), Some(&c.title), c.description.as_deref()],
                )
            })
    });
    controls.sort_by(|a, b| a.reference.cmp(&b.reference).then(a.created_at.cmp(&b.created_at)));

    Ok(Json(paginate(controls, query.page, query.limit)?))
}

/// POST /api/organizations/:org_id/controls: Create a control.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/controls",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateControlRequest,
    responses(
        (status = 201, description = "Control created", body = ControlRecord),
        (status = 400, description = "Validation error or unknown framework", body = crate::error::ErrorBody),
    ),
    tag = "controls"
)]
async fn create_control(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<CreateControlRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ControlRecord>), AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let record = ControlRecord {
        id: Uuid::new_v4(),
        organization_id: org_id,
        framework_id: req.framework_id,
        reference: req.reference.trim().to_string(),
        title: req.title.trim().to_string(),
        description: req.description,
        status: req.status.unwrap_or_default(),
        criticality: req.criticality.unwrap_or_default(),
        owner_id: req.owner_id,
        evidence_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    {
        let frameworks = state.frameworks.read();
        let mut controls = state.controls.write();
        if !frameworks.contains_key(&record.framework_id) {
            return Err(ValidationError::Invalid {
                field: "framework_id",
                reason: format!("framework {} does not exist", record.framework_id),
            }
            .into());
        }
        controls.insert(record.id, record.clone());
    }

    if let Some(pool) = &state.db_pool {
        db::controls::upsert(pool, &record)
            .await
            .map_err(|e| persist_error("control", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("control", record.id, "created")
            .in_org(org_id)
            .with_metadata(json!({ "reference": record.reference, "status": record.status.as_str() })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/organizations/:org_id/controls/:id: Get a control.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/controls/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Control ID"),
    ),
    responses(
        (status = 200, description = "Control", body = ControlRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "controls"
)]
async fn get_control(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ControlRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    org_scoped(&state.controls, "control", id, org_id, |c| c.organization_id).map(Json)
}

/// PUT /api/organizations/:org_id/controls/:id: Update a control.
#[utoipa::path(
    put,
    path = "/api/organizations/{org_id}/controls/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Control ID"),
    ),
    request_body = UpdateControlRequest,
    responses(
        (status = 200, description = "Updated", body = ControlRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "controls"
)]
async fn update_control(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    body: Result<Json<UpdateControlRequest>, JsonRejection>,
) -> Result<Json<ControlRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;

    let (updated, previous_status) = state
        .controls
        .try_update(&id, |c| {
            if c.organization_id != org_id {
                return Err(AppError::not_found("control", id));
            }
            let previous_status = c.status;
            if let Some(reference) = req.reference {
                c.reference = reference.trim().to_string();
            }
            if let Some(title) = req.title {
                c.title = title.trim().to_string();
            }
            if let Some(description) = req.description {
                c.description = Some(description);
            }
            if let Some(status) = req.status {
                c.status = status;
            }
            if let Some(criticality) = req.criticality {
                c.criticality = criticality;
            }
            if req.owner_id.is_some() {
                c.owner_id = req.owner_id;
            }
            c.updated_at = Utc::now();
            Ok((c.clone(), previous_status))
        })
        .ok_or_else(|| AppError::not_found("control", id))??;

    if let Some(pool) = &state.db_pool {
        db::controls::upsert(pool, &updated)
            .await
            .map_err(|e| persist_error("control", id, e))?;
    }

    let mut entry = AuditEntry::new("control", id, "updated").in_org(org_id);
    if previous_status != updated.status {
        entry = entry.with_metadata(json!({
            "status_from": previous_status.as_str(),
            "status_to": updated.status.as_str(),
        }));
    }
    audit::record(&state, &caller, entry).await?;
    Ok(Json(updated))
}

/// DELETE /api/organizations/:org_id/controls/:id: Delete a control.
///
/// Evidence links go with it; tasks tied to it are kept and unlinked.
#[utoipa::path(
    delete,
    path = "/api/organizations/{org_id}/controls/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Control ID"),
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Organization ADMIN required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "controls"
)]
async fn delete_control(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;

    let tasks_unlinked = {
        let mut controls = state.controls.write();
        let mut tasks = state.tasks.write();
        match controls.get(&id) {
            Some(c) if c.organization_id == org_id => {}
            _ => return Err(AppError::not_found("control", id)),
        }
        controls.remove(&id);
        let now = Utc::now();
        let mut unlinked = 0usize;
        for task in tasks.values_mut().filter(|t| t.control_id == Some(id)) {
            task.control_id = None;
            task.updated_at = now;
            unlinked += 1;
        }
        unlinked
    };

    if let Some(pool) = &state.db_pool {
        db::controls::delete(pool, id)
            .await
            .map_err(|e| persist_error("control", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("control", id, "deleted")
            .in_org(org_id)
            .with_metadata(json!({ "tasks_unlinked": tasks_unlinked })),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/organizations/:org_id/controls/:id/evidence/:evidence_id: Link evidence.
///
/// Linking an already linked item is a no-op.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/controls/{id}/evidence/{evidence_id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Control ID"),
        ("evidence_id" = Uuid, Path, description = "Evidence ID"),
    ),
    responses(
        (status = 200, description = "Control with the evidence linked", body = ControlRecord),
        (status = 404, description = "Control or evidence not found", body = crate::error::ErrorBody),
    ),
    tag = "controls"
)]
async fn link_evidence(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id, evidence_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<ControlRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;

    let (control, changed) = {
        let mut controls = state.controls.write();
        let evidence = state.evidence.read();
        if !evidence
            .get(&evidence_id)
            .is_some_and(|e| e.organization_id == org_id)
        {
            return Err(AppError::not_found("evidence", evidence_id));
        }
        let control = controls
            .get_mut(&id)
            .filter(|c| c.organization_id == org_id)
            .ok_or_else(|| AppError::not_found("control", id))?;
        let changed = !control.evidence_ids.contains(&evidence_id);
        if changed {
            control.evidence_ids.push(evidence_id);
            control.updated_at = Utc::now();
        }
        (control.clone(), changed)
    };

    if changed {
        if let Some(pool) = &state.db_pool {
            db::controls::upsert(pool, &control)
                .await
                .map_err(|e| persist_error("control", id, e))?;
        }
        audit::record(
            &state,
            &caller,
            AuditEntry::new("control", id, "evidence_linked")
                .in_org(org_id)
                .with_metadata(json!({ "evidence_id": evidence_id })),
        )
        .await?;
    }
    Ok(Json(control))
}

/// DELETE /api/organizations/:org_id/controls/:id/evidence/:evidence_id: Unlink evidence.
#[utoipa::path(
    delete,
    path = "/api/organizations/{org_id}/controls/{id}/evidence/{evidence_id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Control ID"),
        ("evidence_id" = Uuid, Path, description = "Evidence ID"),
    ),
    responses(
        (status = 200, description = "Control without the evidence", body = ControlRecord),
        (status = 404, description = "Control not found or evidence not linked", body = crate::error::ErrorBody),
    ),
    tag = "controls"
)]
async fn unlink_evidence(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id, evidence_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<ControlRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;

    let control = state
        .controls
        .try_update(&id, |c| {
            if c.organization_id != org_id {
                return Err(AppError::not_found("control", id));
            }
            let before = c.evidence_ids.len();
            c.evidence_ids.retain(|e| *e != evidence_id);
            if c.evidence_ids.len() == before {
                return Err(AppError::NotFound(format!(
                    "evidence {evidence_id} is not linked to control {id}"
                )));
            }
            c.updated_at = Utc::now();
            Ok(c.clone())
        })
        .ok_or_else(|| AppError::not_found("control", id))??;

    if let Some(pool) = &state.db_pool {
        db::controls::upsert(pool, &control)
            .await
            .map_err(|e| persist_error("control", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("control", id, "evidence_unlinked")
            .in_org(org_id)
            .with_metadata(json!({ "evidence_id": evidence_id })),
    )
    .await?;
    Ok(Json(control))
}

/// GET /api/organizations/:org_id/controls/:id/tasks: Tasks tied to a control.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/controls/{id}/tasks",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Control ID"),
    ),
    responses(
        (status = 200, description = "Tasks linked to the control", body = Vec<TaskRecord>),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "controls"
)]
async fn list_control_tasks(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<TaskRecord>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    org_scoped(&state.controls, "control", id, org_id, |c| c.organization_id)?;

    let mut tasks = state.tasks.filter(|t| t.control_id == Some(id));
    tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.due_date.cmp(&b.due_date)));
    Ok(Json(tasks))
}
