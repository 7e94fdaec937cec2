//! # Compliance Structure API
//!
//! Admin management of compliance frameworks and their ordered
//! topic → component → clause hierarchy.
//!
//! New children are appended after their last sibling. Parents cannot be
//! deleted while they still have children, except the framework itself,
//! which takes its whole tree with it once no organization selects it.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use comply_core::framework::next_order_index;
use comply_core::validate::{self, MAX_LONG_TEXT, MAX_SHORT_TEXT};
use comply_core::{RiskLevel, ValidationError};
use serde::{Deserialize, Serialize};
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
use crate::records::{ClauseRecord, ComplianceFrameworkRecord, ComponentRecord, TopicRecord};
use crate::state::AppState;

use super::default_true;

// -- Request DTOs -------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateComplianceFrameworkRequest {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Validate for CreateComplianceFrameworkRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("name", &self.name, MAX_SHORT_TEXT)?;
        validate::required("version", &self.version, MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateComplianceFrameworkRequest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl Validate for UpdateComplianceFrameworkRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("name", self.name.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("version", self.version.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)
    }
}

/// Create a topic or a component; both carry a name and description.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNodeRequest {
    pub name: String,
    pub description: Option<String>,
}

impl Validate for CreateNodeRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("name", &self.name, MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)
    }
}

/// Update a topic or a component.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateNodeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub order_index: Option<i32>,
}

impl Validate for UpdateNodeRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("name", self.name.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)?;
        validate_order_index(self.order_index)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateClauseRequest {
    /// Clause reference such as `CC6.1`, unique within the component.
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = String)]
    pub risk_level: RiskLevel,
    pub evidence_guidance: Option<String>,
    pub testing_guidance: Option<String>,
}

impl Validate for CreateClauseRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("reference", &self.reference, MAX_SHORT_TEXT)?;
        validate::required("title", &self.title, MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)?;
        validate::optional(
            "evidence_guidance",
            self.evidence_guidance.as_deref(),
            MAX_LONG_TEXT,
        )?;
        validate::optional(
            "testing_guidance",
            self.testing_guidance.as_deref(),
            MAX_LONG_TEXT,
        )
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateClauseRequest {
    pub reference: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub risk_level: Option<RiskLevel>,
    pub evidence_guidance: Option<String>,
    pub testing_guidance: Option<String>,
    pub order_index: Option<i32>,
}

impl Validate for UpdateClauseRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("reference", self.reference.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("title", self.title.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)?;
        validate::optional(
            "evidence_guidance",
            self.evidence_guidance.as_deref(),
            MAX_LONG_TEXT,
        )?;
        validate::optional(
            "testing_guidance",
            self.testing_guidance.as_deref(),
            MAX_LONG_TEXT,
        )?;
        validate_order_index(self.order_index)
    }
}

fn validate_order_index(order_index: Option<i32>) -> Result<(), ValidationError> {
    match order_index {
        Some(i) if i < 1 => Err(ValidationError::Invalid {
            field: "order_index",
            reason: "must be at least 1".into(),
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListComplianceQuery {
    pub search: Option<String>,
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// -- Response DTOs ------------------------------------------------------------

/// A compliance framework with its ordered hierarchy.
#[derive(Debug, Serialize, ToSchema)]
pub struct ComplianceTree {
    pub framework: ComplianceFrameworkRecord,
    pub topics: Vec<TopicNode>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopicNode {
    #[serde(flatten)]
    pub topic: TopicRecord,
    pub components: Vec<ComponentNode>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentNode {
    #[serde(flatten)]
    pub component: ComponentRecord,
    pub clauses: Vec<ClauseRecord>,
}

// -- Router -------------------------------------------------------------------

/// Build the compliance structure router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/compliance",
            get(list_compliance_frameworks).post(create_compliance_framework),
        )
        .route(
            "/api/admin/compliance/:id",
            get(get_compliance_framework)
                .put(update_compliance_framework)
                .delete(delete_compliance_framework),
        )
        .route("/api/admin/compliance/:id/tree", get(get_tree))
        .route(
            "/api/admin/compliance/:id/topics",
            get(list_topics).post(create_topic),
        )
        .route(
            "/api/admin/topics/:id",
            put(update_topic).delete(delete_topic),
        )
        .route(
            "/api/admin/topics/:id/components",
            get(list_components).post(create_component),
        )
        .route(
            "/api/admin/components/:id",
            put(update_component).delete(delete_component),
        )
        .route(
            "/api/admin/components/:id/clauses",
            get(list_clauses).post(create_clause),
        )
        .route(
            "/api/admin/clauses/:id",
            put(update_clause).delete(delete_clause),
        )
}

fn same_identity(other: &ComplianceFrameworkRecord, name: &str, version: &str) -> bool {
    other.name.trim().eq_ignore_ascii_case(name.trim()) && other.version.trim() == version.trim()
}

fn duplicate_framework(name: &str, version: &str) -> AppError {
    AppError::Conflict(format!(
        "compliance framework '{}' version '{}' already exists",
        name.trim(),
        version.trim()
    ))
}

fn duplicate_clause(reference: &str) -> AppError {
    AppError::Conflict(format!(
        "clause reference '{}' already exists in this component",
        reference.trim()
    ))
}

fn blocked(resource: &str, id: Uuid, count: usize, dependents: &str) -> AppError {
    AppError::BadRequest(format!(
        "{resource} {id} still has {count} {dependents}; remove them first"
    ))
}

// -- Compliance frameworks ----------------------------------------------------

/// GET /api/admin/compliance: List compliance frameworks.
#[utoipa::path(
    get,
    path = "/api/admin/compliance",
    params(
        ("search" = Option<String>, Query, description = "Substring of name or description"),
        ("active" = Option<bool>, Query, description = "Active flag"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Page size (default 20, max 100)"),
    ),
    responses((status = 200, description = "Page of compliance frameworks")),
    tag = "compliance"
)]
async fn list_compliance_frameworks(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ListComplianceQuery>, QueryRejection>,
) -> Result<Json<Paginated<ComplianceFrameworkRecord>>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let query = extract_query(query)?;

    let mut frameworks = state.compliance_frameworks.filter(|f| {
        query.active.map_or(true, |a| f.is_active == a)
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

/// POST /api/admin/compliance: Create a compliance framework.
#[utoipa::path(
    post,
    path = "/api/admin/compliance",
    request_body = CreateComplianceFrameworkRequest,
    responses(
        (status = 201, description = "Compliance framework created", body = ComplianceFrameworkRecord),
        (status = 409, description = "Duplicate name and version", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn create_compliance_framework(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateComplianceFrameworkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ComplianceFrameworkRecord>), AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let record = ComplianceFrameworkRecord {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        version: req.version.trim().to_string(),
        description: req.description,
        is_active: req.is_active,
        created_at: now,
        updated_at: now,
    };

    state.compliance_frameworks.mutate_all(|all| {
        if all
            .values()
            .any(|f| same_identity(f, &record.name, &record.version))
        {
            return Err(duplicate_framework(&record.name, &record.version));
        }
        all.insert(record.id, record.clone());
        Ok(())
    })?;

    if let Some(pool) = &state.db_pool {
        db::compliance::upsert_framework(pool, &record)
            .await
            .map_err(|e| persist_error("compliance framework", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("compliance_framework", record.id, "created")
            .with_metadata(json!({ "name": record.name, "version": record.version })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/admin/compliance/:id: Get a compliance framework.
#[utoipa::path(
    get,
    path = "/api/admin/compliance/{id}",
    params(("id" = Uuid, Path, description = "Compliance framework ID")),
    responses(
        (status = 200, description = "Compliance framework", body = ComplianceFrameworkRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn get_compliance_framework(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ComplianceFrameworkRecord>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    state
        .compliance_frameworks
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("compliance framework", id))
}

/// PUT /api/admin/compliance/:id: Update a compliance framework.
#[utoipa::path(
    put,
    path = "/api/admin/compliance/{id}",
    params(("id" = Uuid, Path, description = "Compliance framework ID")),
    request_body = UpdateComplianceFrameworkRequest,
    responses(
        (status = 200, description = "Updated", body = ComplianceFrameworkRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Duplicate name and version", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn update_compliance_framework(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateComplianceFrameworkRequest>, JsonRejection>,
) -> Result<Json<ComplianceFrameworkRecord>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    let updated = state.compliance_frameworks.mutate_all(|all| {
        let current = all
            .get(&id)
            .ok_or_else(|| AppError::not_found("compliance framework", id))?;
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
            return Err(duplicate_framework(&name, &version));
        }

        let record = all
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("compliance framework", id))?;
        record.name = name;
        record.version = version;
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
        db::compliance::upsert_framework(pool, &updated)
            .await
            .map_err(|e| persist_error("compliance framework", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("compliance_framework", id, "updated"),
    )
    .await?;
    Ok(Json(updated))
}

/// DELETE /api/admin/compliance/:id: Delete a compliance framework and its tree.
///
/// Blocked while any organization selection references the framework, or
/// while submissions or evidence point at one of its clauses.
#[utoipa::path(
    delete,
    path = "/api/admin/compliance/{id}",
    params(("id" = Uuid, Path, description = "Compliance framework ID")),
    responses(
        (status = 204, description = "Deleted with all topics, components and clauses"),
        (status = 400, description = "Still referenced", body = crate::error::ErrorBody),
        (status = 403, description = "SUPER_ADMIN required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn delete_compliance_framework(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::SuperAdmin)?;

    let (name, clauses_removed) = {
        let mut frameworks = state.compliance_frameworks.write();
        let mut topics = state.topics.write();
        let mut components = state.components.write();
        let mut clauses = state.clauses.write();
        let selections = state.selections.read();
        let evidence = state.evidence.read();
        let submissions = state.submissions.read();

        if !frameworks.contains_key(&id) {
            return Err(AppError::not_found("compliance framework", id));
        }
        let selected = selections.values().filter(|s| s.framework_id == id).count();
        if selected > 0 {
            return Err(AppError::BadRequest(format!(
                "compliance framework {id} is selected by {selected} organization selection(s)"
            )));
        }
        let clause_ids: Vec<Uuid> = clauses
            .values()
            .filter(|c| c.framework_id == id)
            .map(|c| c.id)
            .collect();
        let submitted = submissions
            .values()
            .filter(|s| clause_ids.contains(&s.clause_id))
            .count();
        if submitted > 0 {
            return Err(blocked(
                "compliance framework",
                id,
                submitted,
                "evidence submission(s) against its clauses",
            ));
        }
        let linked = evidence
            .values()
            .filter(|e| e.clause_ids.iter().any(|c| clause_ids.contains(c)))
            .count();
        if linked > 0 {
            return Err(blocked(
                "compliance framework",
                id,
                linked,
                "evidence item(s) linked to its clauses",
            ));
        }

        clauses.retain(|_, c| c.framework_id != id);
        components.retain(|_, c| c.framework_id != id);
        topics.retain(|_, t| t.framework_id != id);
        let removed = frameworks
            .remove(&id)
            .ok_or_else(|| AppError::not_found("compliance framework", id))?;
        (removed.name, clause_ids.len())
    };

    if let Some(pool) = &state.db_pool {
        db::compliance::delete_framework(pool, id)
            .await
            .map_err(|e| persist_error("compliance framework", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("compliance_framework", id, "deleted")
            .with_metadata(json!({ "name": name, "clauses_removed": clauses_removed })),
    )
    .await?;

    tracing::info!(compliance_framework_id = %id, clauses_removed, "compliance framework deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/compliance/:id/tree: Framework with its ordered hierarchy.
#[utoipa::path(
    get,
    path = "/api/admin/compliance/{id}/tree",
    params(("id" = Uuid, Path, description = "Compliance framework ID")),
    responses(
        (status = 200, description = "Nested ordered tree", body = ComplianceTree),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn get_tree(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ComplianceTree>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let framework = state
        .compliance_frameworks
        .get(&id)
        .ok_or_else(|| AppError::not_found("compliance framework", id))?;
    Ok(Json(build_tree(&state, framework)))
}

/// Assemble the ordered hierarchy of one framework.
pub(crate) fn build_tree(state: &AppState, framework: ComplianceFrameworkRecord) -> ComplianceTree {
    let id = framework.id;
    let mut topics = state.topics.filter(|t| t.framework_id == id);
    topics.sort_by_key(|t| (t.order_index, t.created_at));
    let mut components = state.components.filter(|c| c.framework_id == id);
    components.sort_by_key(|c| (c.order_index, c.created_at));
    let mut clauses = state.clauses.filter(|c| c.framework_id == id);
    clauses.sort_by_key(|c| (c.order_index, c.created_at));

    let topics = topics
        .into_iter()
        .map(|topic| {
            let components = components
                .iter()
                .filter(|c| c.topic_id == topic.id)
                .map(|component| ComponentNode {
                    clauses: clauses
                        .iter()
                        .filter(|c| c.component_id == component.id)
                        .cloned()
                        .collect(),
                    component: component.clone(),
                })
                .collect();
            TopicNode { topic, components }
        })
        .collect();

    ComplianceTree { framework, topics }
}

// -- Topics -------------------------------------------------------------------

/// GET /api/admin/compliance/:id/topics: Topics of a framework, in order.
#[utoipa::path(
    get,
    path = "/api/admin/compliance/{id}/topics",
    params(("id" = Uuid, Path, description = "Compliance framework ID")),
    responses(
        (status = 200, description = "Ordered topics", body = Vec<TopicRecord>),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn list_topics(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TopicRecord>>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    if !state.compliance_frameworks.contains(&id) {
        return Err(AppError::not_found("compliance framework", id));
    }
    let mut topics = state.topics.filter(|t| t.framework_id == id);
    topics.sort_by_key(|t| (t.order_index, t.created_at));
    Ok(Json(topics))
}

/// POST /api/admin/compliance/:id/topics: Append a topic.
#[utoipa::path(
    post,
    path = "/api/admin/compliance/{id}/topics",
    params(("id" = Uuid, Path, description = "Compliance framework ID")),
    request_body = CreateNodeRequest,
    responses(
        (status = 201, description = "Topic appended after the last sibling", body = TopicRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn create_topic(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(framework_id): Path<Uuid>,
    body: Result<Json<CreateNodeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TopicRecord>), AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    let record = {
        let frameworks = state.compliance_frameworks.read();
        let mut topics = state.topics.write();
        if !frameworks.contains_key(&framework_id) {
            return Err(AppError::not_found("compliance framework", framework_id));
        }
        let now = Utc::now();
        let record = TopicRecord {
            id: Uuid::new_v4(),
            framework_id,
            name: req.name.trim().to_string(),
            description: req.description,
            order_index: next_order_index(
                topics
                    .values()
                    .filter(|t| t.framework_id == framework_id)
                    .map(|t| t.order_index),
            ),
            created_at: now,
            updated_at: now,
        };
        topics.insert(record.id, record.clone());
        record
    };

    if let Some(pool) = &state.db_pool {
        db::compliance::upsert_topic(pool, &record)
            .await
            .map_err(|e| persist_error("topic", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("topic", record.id, "created")
            .with_metadata(json!({ "framework_id": framework_id, "name": record.name })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/admin/topics/:id: Update a topic.
#[utoipa::path(
    put,
    path = "/api/admin/topics/{id}",
    params(("id" = Uuid, Path, description = "Topic ID")),
    request_body = UpdateNodeRequest,
    responses(
        (status = 200, description = "Updated", body = TopicRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn update_topic(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateNodeRequest>, JsonRejection>,
) -> Result<Json<TopicRecord>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    let updated = state
        .topics
        .update(&id, |t| {
            if let Some(name) = req.name {
                t.name = name.trim().to_string();
            }
            if let Some(description) = req.description {
                t.description = Some(description);
            }
            if let Some(order_index) = req.order_index {
                t.order_index = order_index;
            }
            t.updated_at = Utc::now();
        })
        .ok_or_else(|| AppError::not_found("topic", id))?;

    if let Some(pool) = &state.db_pool {
        db::compliance::upsert_topic(pool, &updated)
            .await
            .map_err(|e| persist_error("topic", id, e))?;
    }

    audit::record(&state, &caller, AuditEntry::new("topic", id, "updated")).await?;
    Ok(Json(updated))
}

/// DELETE /api/admin/topics/:id: Delete an empty topic.
#[utoipa::path(
    delete,
    path = "/api/admin/topics/{id}",
    params(("id" = Uuid, Path, description = "Topic ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Topic still has components", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn delete_topic(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;

    {
        let mut topics = state.topics.write();
        let components = state.components.read();
        if !topics.contains_key(&id) {
            return Err(AppError::not_found("topic", id));
        }
        let children = components.values().filter(|c| c.topic_id == id).count();
        if children > 0 {
            return Err(blocked("topic", id, children, "component(s)"));
        }
        topics.remove(&id);
    }

    if let Some(pool) = &state.db_pool {
        db::compliance::delete_topic(pool, id)
            .await
            .map_err(|e| persist_error("topic", id, e))?;
    }

    audit::record(&state, &caller, AuditEntry::new("topic", id, "deleted")).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Components ---------------------------------------------------------------

/// GET /api/admin/topics/:id/components: Components of a topic, in order.
#[utoipa::path(
    get,
    path = "/api/admin/topics/{id}/components",
    params(("id" = Uuid, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Ordered components", body = Vec<ComponentRecord>),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn list_components(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ComponentRecord>>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    if !state.topics.contains(&id) {
        return Err(AppError::not_found("topic", id));
    }
    let mut components = state.components.filter(|c| c.topic_id == id);
    components.sort_by_key(|c| (c.order_index, c.created_at));
    Ok(Json(components))
}

/// POST /api/admin/topics/:id/components: Append a component.
#[utoipa::path(
    post,
    path = "/api/admin/topics/{id}/components",
    params(("id" = Uuid, Path, description = "Topic ID")),
    request_body = CreateNodeRequest,
    responses(
        (status = 201, description = "Component appended after the last sibling", body = ComponentRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn create_component(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(topic_id): Path<Uuid>,
    body: Result<Json<CreateNodeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ComponentRecord>), AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    let record = {
        let topics = state.topics.read();
        let mut components = state.components.write();
        let topic = topics
            .get(&topic_id)
            .ok_or_else(|| AppError::not_found("topic", topic_id))?;
        let now = Utc::now();
        let record = ComponentRecord {
            id: Uuid::new_v4(),
            topic_id,
            framework_id: topic.framework_id,
            name: req.name.trim().to_string(),
            description: req.description,
            order_index: next_order_index(
                components
                    .values()
                    .filter(|c| c.topic_id == topic_id)
                    .map(|c| c.order_index),
            ),
            created_at: now,
            updated_at: now,
        };
        components.insert(record.id, record.clone());
        record
    };

    if let Some(pool) = &state.db_pool {
        db::compliance::upsert_component(pool, &record)
            .await
            .map_err(|e| persist_error("component", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("component", record.id, "created")
            .with_metadata(json!({ "topic_id": topic_id, "name": record.name })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/admin/components/:id: Update a component.
#[utoipa::path(
    put,
    path = "/api/admin/components/{id}",
    params(("id" = Uuid, Path, description = "Component ID")),
    request_body = UpdateNodeRequest,
    responses(
        (status = 200, description = "Updated", body = ComponentRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn update_component(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateNodeRequest>, JsonRejection>,
) -> Result<Json<ComponentRecord>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    let updated = state
        .components
        .update(&id, |c| {
            if let Some(name) = req.name {
                c.name = name.trim().to_string();
            }
            if let Some(description) = req.description {
                c.description = Some(description);
            }
            if let Some(order_index) = req.order_index {
                c.order_index = order_index;
            }
            c.updated_at = Utc::now();
        })
        .ok_or_else(|| AppError::not_found("component", id))?;

    if let Some(pool) = &state.db_pool {
        db::compliance::upsert_component(pool, &updated)
            .await
            .map_err(|e| persist_error("component", id, e))?;
    }

    audit::record(&state, &caller, AuditEntry::new("component", id, "updated")).await?;
    Ok(Json(updated))
}

/// DELETE /api/admin/components/:id: Delete an empty component.
#[utoipa::path(
    delete,
    path = "/api/admin/components/{id}",
    params(("id" = Uuid, Path, description = "Component ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Component still has clauses", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn delete_component(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;

    {
        let mut components = state.components.write();
        let clauses = state.clauses.read();
        if !components.contains_key(&id) {
            return Err(AppError::not_found("component", id));
        }
        let children = clauses.values().filter(|c| c.component_id == id).count();
        if children > 0 {
            return Err(blocked("component", id, children, "clause(s)"));
        }
        components.remove(&id);
    }

    if let Some(pool) = &state.db_pool {
        db::compliance::delete_component(pool, id)
            .await
            .map_err(|e| persist_error("component", id, e))?;
    }

    audit::record(&state, &caller, AuditEntry::new("component", id, "deleted")).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Clauses ------------------------------------------------------------------

/// GET /api/admin/components/:id/clauses: Clauses of a component, in order.
#[utoipa::path(
    get,
    path = "/api/admin/components/{id}/clauses",
    params(("id" = Uuid, Path, description = "Component ID")),
    responses(
        (status = 200, description = "Ordered clauses", body = Vec<ClauseRecord>),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn list_clauses(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ClauseRecord>>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    if !state.components.contains(&id) {
        return Err(AppError::not_found("component", id));
    }
    let mut clauses = state.clauses.filter(|c| c.component_id == id);
    clauses.sort_by_key(|c| (c.order_index, c.created_at));
    Ok(Json(clauses))
}

/// POST /api/admin/components/:id/clauses: Append a clause.
#[utoipa::path(
    post,
    path = "/api/admin/components/{id}/clauses",
    params(("id" = Uuid, Path, description = "Component ID")),
    request_body = CreateClauseRequest,
    responses(
        (status = 201, description = "Clause appended after the last sibling", body = ClauseRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Duplicate clause reference in component", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn create_clause(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(component_id): Path<Uuid>,
    body: Result<Json<CreateClauseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ClauseRecord>), AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;
    let reference = req.reference.trim().to_string();

    let record = {
        let components = state.components.read();
        let mut clauses = state.clauses.write();
        let component = components
            .get(&component_id)
            .ok_or_else(|| AppError::not_found("component", component_id))?;
        let siblings: Vec<&ClauseRecord> = clauses
            .values()
            .filter(|c| c.component_id == component_id)
            .collect();
        if siblings
            .iter()
            .any(|c| c.reference.eq_ignore_ascii_case(&reference))
        {
            return Err(duplicate_clause(&reference));
        }
        let now = Utc::now();
        let record = ClauseRecord {
            id: Uuid::new_v4(),
            component_id,
            topic_id: component.topic_id,
            framework_id: component.framework_id,
            reference,
            title: req.title.trim().to_string(),
            description: req.description,
            risk_level: req.risk_level,
            evidence_guidance: req.evidence_guidance,
            testing_guidance: req.testing_guidance,
            order_index: next_order_index(siblings.iter().map(|c| c.order_index)),
            created_at: now,
            updated_at: now,
        };
        clauses.insert(record.id, record.clone());
        record
    };

    if let Some(pool) = &state.db_pool {
        db::compliance::upsert_clause(pool, &record)
            .await
            .map_err(|e| persist_error("clause", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("clause", record.id, "created")
            .with_metadata(json!({ "component_id": component_id, "reference": record.reference })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/admin/clauses/:id: Update a clause.
#[utoipa::path(
    put,
    path = "/api/admin/clauses/{id}",
    params(("id" = Uuid, Path, description = "Clause ID")),
    request_body = UpdateClauseRequest,
    responses(
        (status = 200, description = "Updated", body = ClauseRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Duplicate clause reference in component", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn update_clause(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateClauseRequest>, JsonRejection>,
) -> Result<Json<ClauseRecord>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    let updated = state.clauses.mutate_all(|all| {
        let current = all
            .get(&id)
            .ok_or_else(|| AppError::not_found("clause", id))?;
        if let Some(reference) = req.reference.as_deref() {
            let reference = reference.trim();
            let component_id = current.component_id;
            if all.values().any(|c| {
                c.id != id
                    && c.component_id == component_id
                    && c.reference.eq_ignore_ascii_case(reference)
            }) {
                return Err(duplicate_clause(reference));
            }
        }

        let clause = all
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("clause", id))?;
        if let Some(reference) = req.reference {
            clause.reference = reference.trim().to_string();
        }
        if let Some(title) = req.title {
            clause.title = title.trim().to_string();
        }
        if let Some(description) = req.description {
            clause.description = Some(description);
        }
        if let Some(risk_level) = req.risk_level {
            clause.risk_level = risk_level;
        }
        if let Some(guidance) = req.evidence_guidance {
            clause.evidence_guidance = Some(guidance);
        }
        if let Some(guidance) = req.testing_guidance {
            clause.testing_guidance = Some(guidance);
        }
        if let Some(order_index) = req.order_index {
            clause.order_index = order_index;
        }
        clause.updated_at = Utc::now();
        Ok(clause.clone())
    })?;

    if let Some(pool) = &state.db_pool {
        db::compliance::upsert_clause(pool, &updated)
            .await
            .map_err(|e| persist_error("clause", id, e))?;
    }

    audit::record(&state, &caller, AuditEntry::new("clause", id, "updated")).await?;
    Ok(Json(updated))
}

/// DELETE /api/admin/clauses/:id: Delete an unreferenced clause.
///
/// Blocked while a selection, a submission, or an evidence link references it.
#[utoipa::path(
    delete,
    path = "/api/admin/clauses/{id}",
    params(("id" = Uuid, Path, description = "Clause ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Clause still referenced", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn delete_clause(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;

    {
        let mut clauses = state.clauses.write();
        let selections = state.selections.read();
        let evidence = state.evidence.read();
        let submissions = state.submissions.read();
        if !clauses.contains_key(&id) {
            return Err(AppError::not_found("clause", id));
        }
        let selected = selections
            .values()
            .filter(|s| s.clause_id == Some(id))
            .count();
        if selected > 0 {
            return Err(blocked("clause", id, selected, "organization selection(s)"));
        }
        let submitted = submissions.values().filter(|s| s.clause_id == id).count();
        if submitted > 0 {
            return Err(blocked("clause", id, submitted, "evidence submission(s)"));
        }
        let linked = evidence
            .values()
            .filter(|e| e.clause_ids.contains(&id))
            .count();
        if linked > 0 {
            return Err(blocked("clause", id, linked, "linked evidence item(s)"));
        }
        clauses.remove(&id);
    }

    if let Some(pool) = &state.db_pool {
        db::compliance::delete_clause(pool, id)
            .await
            .map_err(|e| persist_error("clause", id, e))?;
    }

    audit::record(&state, &caller, AuditEntry::new("clause", id, "deleted")).await?;
    Ok(StatusCode::NO_CONTENT)
}
