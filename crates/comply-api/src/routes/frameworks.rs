//! # Framework Catalogue API
//!
//! CRUD over the regulatory frameworks that organization controls are
//! written against, plus cross-framework mappings.
//!
//! Every route requires `PLATFORM_ADMIN`; deletion requires `SUPER_ADMIN`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use comply_core::validate::{self, MAX_LONG_TEXT, MAX_SHORT_TEXT};
use comply_core::{FrameworkType, MappingRelationship, ValidationError};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::auth::{require_role, CallerIdentity, Role};
use crate::db::{self, persist_error};
use crate::error::AppError;
use crate::extractors::{
    extract_query, extract_validated_json, matches_search, paginate, Paginated, Validate,
};
use crate::records::{FrameworkMappingRecord, FrameworkRecord};
use crate::state::AppState;

use super::default_true;

// -- Request DTOs -------------------------------------------------------------

/// Request to create a framework.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFrameworkRequest {
    pub name: String,
    pub version: String,
    #[schema(value_type = String)]
    pub framework_type: FrameworkType,
    pub source: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Validate for CreateFrameworkRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("name", &self.name, MAX_SHORT_TEXT)?;
        validate::required("version", &self.version, MAX_SHORT_TEXT)?;
        validate::optional("source", self.source.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)?;
        Ok(())
    }
}

/// Partial update of a framework. Absent fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateFrameworkRequest {
    pub name: Option<String>,
    pub version: Option<String>,
    #[schema(value_type = Option<String>)]
    pub framework_type: Option<FrameworkType>,
    pub source: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl Validate for UpdateFrameworkRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("name", self.name.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("version", self.version.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("source", self.source.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)?;
        Ok(())
    }
}

/// Request to map a reference in this framework to one in another.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMappingRequest {
    pub source_reference: String,
    pub target_framework_id: Uuid,
    pub target_reference: String,
    #[schema(value_type = String)]
    pub relationship: MappingRelationship,
    pub notes: Option<String>,
}

impl Validate for CreateMappingRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("source_reference", &self.source_reference, MAX_SHORT_TEXT)?;
        validate::required("target_reference", &self.target_reference, MAX_SHORT_TEXT)?;
        validate::optional("notes", self.notes.as_deref(), MAX_LONG_TEXT)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListFrameworksQuery {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub framework_type: Option<FrameworkType>,
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// -- Router -------------------------------------------------------------------

/// Build the framework catalogue router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/frameworks",
            get(list_frameworks).post(create_framework),
        )
        .route(
            "/api/admin/frameworks/:id",
            get(get_framework)
                .put(update_framework)
                .delete(delete_framework),
        )
        .route(
            "/api/admin/frameworks/:id/mappings",
            get(list_mappings).post(create_mapping),
        )
        .route("/api/admin/mappings/:id", delete(delete_mapping))
}

/// Whether `other` already carries the (name, version) identity.
fn same_identity(other: &FrameworkRecord, name: &str, version: &str) -> bool {
    other.name.trim().eq_ignore_ascii_case(name.trim()) && other.version.trim() == version.trim()
}

fn duplicate(name: &str, version: &str) -> AppError {
    AppError::Conflict(format!(
        "framework '{}' version '{}' already exists",
        name.trim(),
        version.trim()
    ))
}

// -- Handlers -----------------------------------------------------------------

/// GET /api/admin/frameworks: List frameworks.
#[utoipa::path(
    get,
    path = "/api/admin/frameworks",
    params(
        ("search" = Option<String>, Query, description = "Substring of name or description"),
        ("type" = Option<String>, Query, description = "Framework type"),
        ("active" = Option<bool>, Query, description = "Active flag"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Page size (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Page of frameworks sorted by name and version"),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorBody),
    ),
    tag = "frameworks"
)]
async fn list_frameworks(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ListFrameworksQuery>, QueryRejection>,
) -> Result<Json<Paginated<FrameworkRecord>>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let query = extract_query(query)?;

    let mut frameworks = state.frameworks.filter(|f| {
        query.framework_type.map_or(true, |t| f.framework_type == t)
            && query.active.map_or(true, |a| f.is_active == a)
            && query.search.as_deref().map_or(true, |s| {
                matches_search(s, &[Some(&f.name), f.description.as_deref()])
            })
    });
    frameworks.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.version.cmp(&b.version))
    });

    Ok(Json(paginate(frameworks, query.page, query.limit)?))
}

/// POST /api/admin/frameworks: Create a framework.
#[utoipa::path(
    post,
    path = "/api/admin/frameworks",
    request_body = CreateFrameworkRequest,
    responses(
        (status = 201, description = "Framework created", body = FrameworkRecord),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 409, description = "Duplicate name and version", body = crate::error::ErrorBody),
    ),
    tag = "frameworks"
)]
async fn create_framework(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateFrameworkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FrameworkRecord>), AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let record = FrameworkRecord {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        version: req.version.trim().to_string(),
        framework_type: req.framework_type,
        source: req.source,
        description: req.description,
        is_active: req.is_active,
        created_at: now,
        updated_at: now,
    };

    state.frameworks.mutate_all(|all| {
        if all
            .values()
            .any(|f| same_identity(f, &record.name, &record.version))
        {
            return Err(duplicate(&record.name, &record.version));
        }
        all.insert(record.id, record.clone());
        Ok(())
    })?;

    if let Some(pool) = &state.db_pool {
        db::frameworks::upsert(pool, &record)
            .await
            .map_err(|e| persist_error("framework", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("framework", record.id, "created")
            .with_metadata(json!({ "name": record.name, "version": record.version })),
    )
    .await?;

    tracing::info!(framework_id = %record.id, name = %record.name, "framework created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/admin/frameworks/:id: Get a framework.
#[utoipa::path(
    get,
    path = "/api/admin/frameworks/{id}",
    params(("id" = Uuid, Path, description = "Framework ID")),
    responses(
        (status = 200, description = "Framework found", body = FrameworkRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "frameworks"
)]
async fn get_framework(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<FrameworkRecord>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    state
        .frameworks
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("framework", id))
}

/// PUT /api/admin/frameworks/:id: Update a framework.
#[utoipa::path(
    put,
    path = "/api/admin/frameworks/{id}",
    params(("id" = Uuid, Path, description = "Framework ID")),
    request_body = UpdateFrameworkRequest,
    responses(
        (status = 200, description = "Framework updated", body = FrameworkRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Duplicate name and version", body = crate::error::ErrorBody),
    ),
    tag = "frameworks"
)]
async fn update_framework(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateFrameworkRequest>, JsonRejection>,
) -> Result<Json<FrameworkRecord>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    let updated = state.frameworks.mutate_all(|all| {
        let current = all
            .get(&id)
            .ok_or_else(|| AppError::not_found("framework", id))?;
        let name = req
            .name
            .as_deref()
            .map_or_else(|| current.name.clone(), |n| n.trim().to_string());
        let version = req
            .version
            .as_deref()
            .map_or_else(|| current.version.clone(), |v| v.trim().to_string());
        if all
            .values()
            .any(|f| f.id != id && same_identity(f, &name, &version))
        {
            return Err(duplicate(&name, &version));
        }

        let record = all
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("framework", id))?;
        record.name = name;
        record.version = version;
        if let Some(t) = req.framework_type {
            record.framework_type = t;
        }
        if let Some(source) = req.source {
            record.source = Some(source);
        }
        if let Some(description) = req.description {
            record.description = Some(description);
        }
        if let Some(active) = req.is_active {
            record.is_active = active;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    })?;

    if let Some(pool) = &state.db_pool {
        db::frameworks::upsert(pool, &updated)
            .await
            .map_err(|e| persist_error("framework", id, e))?;
    }

    audit::record(&state, &caller, AuditEntry::new("framework", id, "updated")).await?;
    Ok(Json(updated))
}

/// DELETE /api/admin/frameworks/:id: Delete a framework and its mappings.
///
/// Blocked while any control references the framework.
#[utoipa::path(
    delete,
    path = "/api/admin/frameworks/{id}",
    params(("id" = Uuid, Path, description = "Framework ID")),
    responses(
        (status = 204, description = "Framework deleted"),
        (status = 400, description = "Framework still referenced by controls", body = crate::error::ErrorBody),
        (status = 403, description = "SUPER_ADMIN required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "frameworks"
)]
async fn delete_framework(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::SuperAdmin)?;

    let (removed, mappings_removed) = {
        let mut frameworks = state.frameworks.write();
        let mut mappings = state.mappings.write();
        let controls = state.controls.read();

        if !frameworks.contains_key(&id) {
            return Err(AppError::not_found("framework", id));
        }
        let dependents = controls.values().filter(|c| c.framework_id == id).count();
        if dependents > 0 {
            return Err(AppError::BadRequest(format!(
                "framework {id} is referenced by {dependents} control(s)"
            )));
        }

        let before = mappings.len();
        mappings.retain(|_, m| m.source_framework_id != id && m.target_framework_id != id);
        let removed = frameworks
            .remove(&id)
            .ok_or_else(|| AppError::not_found("framework", id))?;
        (removed, before - mappings.len())
    };

    if let Some(pool) = &state.db_pool {
        db::frameworks::delete(pool, id)
            .await
            .map_err(|e| persist_error("framework", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("framework", id, "deleted").with_metadata(json!({
            "name": removed.name,
            "mappings_removed": mappings_removed,
        })),
    )
    .await?;

    tracing::info!(framework_id = %id, mappings_removed, "framework deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/frameworks/:id/mappings: Mappings touching a framework.
#[utoipa::path(
    get,
    path = "/api/admin/frameworks/{id}/mappings",
    params(("id" = Uuid, Path, description = "Framework ID")),
    responses(
        (status = 200, description = "Mappings where the framework is source or target", body = Vec<FrameworkMappingRecord>),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "frameworks"
)]
async fn list_mappings(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FrameworkMappingRecord>>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    if !state.frameworks.contains(&id) {
        return Err(AppError::not_found("framework", id));
    }
    let mut mappings = state
        .mappings
        .filter(|m| m.source_framework_id == id || m.target_framework_id == id);
    mappings.sort_by(|a, b| {
        a.source_reference
            .cmp(&b.source_reference)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    Ok(Json(mappings))
}

/// POST /api/admin/frameworks/:id/mappings: Map a reference to another framework.
#[utoipa::path(
    post,
    path = "/api/admin/frameworks/{id}/mappings",
    params(("id" = Uuid, Path, description = "Source framework ID")),
    request_body = CreateMappingRequest,
    responses(
        (status = 201, description = "Mapping created", body = FrameworkMappingRecord),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "frameworks"
)]
async fn create_mapping(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<CreateMappingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FrameworkMappingRecord>), AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    if req.target_framework_id == id {
        return Err(ValidationError::Invalid {
            field: "target_framework_id",
            reason: "a framework cannot be mapped onto itself".into(),
        }
        .into());
    }

    let record = FrameworkMappingRecord {
        id: Uuid::new_v4(),
        source_framework_id: id,
        source_reference: req.source_reference.trim().to_string(),
        target_framework_id: req.target_framework_id,
        target_reference: req.target_reference.trim().to_string(),
        relationship: req.relationship,
        notes: req.notes,
        created_at: Utc::now(),
    };

    {
        let frameworks = state.frameworks.read();
        let mut mappings = state.mappings.write();
        if !frameworks.contains_key(&id) {
            return Err(AppError::not_found("framework", id));
        }
        if !frameworks.contains_key(&record.target_framework_id) {
            return Err(ValidationError::Invalid {
                field: "target_framework_id",
                reason: format!("framework {} does not exist", record.target_framework_id),
            }
            .into());
        }
        mappings.insert(record.id, record.clone());
    }

    if let Some(pool) = &state.db_pool {
        db::frameworks::insert_mapping(pool, &record)
            .await
            .map_err(|e| persist_error("framework mapping", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("framework_mapping", record.id, "created").with_metadata(json!({
            "source_framework_id": id,
            "target_framework_id": record.target_framework_id,
        })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// DELETE /api/admin/mappings/:id: Remove a framework mapping.
#[utoipa::path(
    delete,
    path = "/api/admin/mappings/{id}",
    params(("id" = Uuid, Path, description = "Mapping ID")),
    responses(
        (status = 204, description = "Mapping deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "frameworks"
)]
async fn delete_mapping(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    state
        .mappings
        .remove(&id)
        .ok_or_else(|| AppError::not_found("framework mapping", id))?;

    if let Some(pool) = &state.db_pool {
        db::frameworks::delete_mapping(pool, id)
            .await
            .map_err(|e| persist_error("framework mapping", id, e))?;
    }

    audit::record(&state, &caller, AuditEntry::new("framework_mapping", id, "deleted")).await?;
    Ok(StatusCode::NO_CONTENT)
}
