//! # Tasks API
//!
//! Remediation and evidence-collection work items, optionally tied to one
//! control and one evidence item of the same organization.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use comply_core::task::is_overdue;
use comply_core::validate::{self, MAX_LONG_TEXT, MAX_SHORT_TEXT};
use comply_core::{OrgRole, TaskPriority, TaskStatus, TaskType, ValidationError};
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
use crate::records::TaskRecord;
use crate::state::AppState;

use super::org_scoped;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee_id: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub evidence_id: Option<Uuid>,
}

impl Validate for CreateTaskRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("title", &self.title, MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub task_type: Option<TaskType>,
    #[schema(value_type = Option<String>)]
    pub status: Option<TaskStatus>,
    #[schema(value_type = Option<String>)]
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee_id: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub evidence_id: Option<Uuid>,
}

impl Validate for UpdateTaskRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("title", self.title.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub evidence_id: Option<Uuid>,
    pub overdue: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Build the tasks router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations/:org_id/tasks",
            get(list_tasks).post(create_task),
        )
        .route(
            "/api/organizations/:org_id/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
}

/// Keep `completed_at` in step with the status: stamped on entering DONE,
/// cleared on leaving it.
fn apply_status(task: &mut TaskRecord, status: TaskStatus, now: DateTime<Utc>) {
    match (task.status, status) {
        (TaskStatus::Done, TaskStatus::Done) => {}
        (_, TaskStatus::Done) => task.completed_at = Some(now),
        _ => task.completed_at = None,
    }
    task.status = status;
}

/// GET /api/organizations/:org_id/tasks: List tasks.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/tasks",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("status" = Option<String>, Query, description = "TODO, IN_PROGRESS, BLOCKED, DONE or CANCELLED"),
        ("priority" = Option<String>, Query, description = "LOW, MEDIUM, HIGH or URGENT"),
        ("assignee_id" = Option<Uuid>, Query, description = "Assignee filter"),
        ("control_id" = Option<Uuid>, Query, description = "Linked control filter"),
        ("evidence_id" = Option<Uuid>, Query, description = "Linked evidence filter"),
        ("overdue" = Option<bool>, Query, description = "Only open tasks past their due date"),
        ("search" = Option<String>, Query, description = "Substring of title or description"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Page size (default 20, max 100)"),
    ),
    responses((status = 200, description = "Page of tasks by due date")),
    tag = "tasks"
)]
async fn list_tasks(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<Paginated<TaskRecord>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;
    let now = Utc::now();

    let mut tasks = state.tasks.filter(|t| {
        t.organization_id == org_id
            && query.status.map_or(true, |s| t.status == s)
            && query.priority.map_or(true, |p| t.priority == p)
            && query.assignee_id.map_or(true, |a| t.assignee_id == Some(a))
            && query.control_id.map_or(true, |c| t.control_id == Some(c))
            && query.evidence_id.map_or(true, |e| t.evidence_id == Some(e))
            && query
                .overdue
                .map_or(true, |o| is_overdue(t.status, t.due_date, now) == o)
            && query.search.as_deref().map_or(true, |s| {
                matches_search(s, &[Some(&t.title), t.description.as_deref()])
            })
    });
    // Undated tasks sort last; ties go to the higher priority.
    tasks.sort_by(|a, b| {
        match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then(b.priority.cmp(&a.priority))
        .then(a.created_at.cmp(&b.created_at))
    });

    Ok(Json(paginate(tasks, query.page, query.limit)?))
}

/// POST /api/organizations/:org_id/tasks: Create a task.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/tasks",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskRecord),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 404, description = "Linked control or evidence not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
async fn create_task(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskRecord>), AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let mut record = TaskRecord {
        id: Uuid::new_v4(),
        organization_id: org_id,
        title: req.title.trim().to_string(),
        description: req.description,
        task_type: req.task_type.unwrap_or_default(),
        status: TaskStatus::default(),
        priority: req.priority.unwrap_or_default(),
        due_date: req.due_date,
        assignee_id: req.assignee_id,
        control_id: req.control_id,
        evidence_id: req.evidence_id,
        completed_at: None,
        created_by: caller.user_id,
        created_at: now,
        updated_at: now,
    };
    apply_status(&mut record, req.status.unwrap_or_default(), now);

    {
        let controls = state.controls.read();
        let evidence = state.evidence.read();
        let mut tasks = state.tasks.write();
        if let Some(control_id) = record.control_id {
            if !controls
                .get(&control_id)
                .is_some_and(|c| c.organization_id == org_id)
            {
                return Err(AppError::not_found("control", control_id));
            }
        }
        if let Some(evidence_id) = record.evidence_id {
            if !evidence
                .get(&evidence_id)
                .is_some_and(|e| e.organization_id == org_id)
            {
                return Err(AppError::not_found("evidence", evidence_id));
            }
        }
        tasks.insert(record.id, record.clone());
    }

    if let Some(pool) = &state.db_pool {
        db::tasks::upsert(pool, &record)
            .await
            .map_err(|e| persist_error("task", record.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("task", record.id, "created")
            .in_org(org_id)
            .with_metadata(json!({ "title": record.title, "status": record.status })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/organizations/:org_id/tasks/:id: Get a task.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/tasks/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Task ID"),
    ),
    responses(
        (status = 200, description = "Task", body = TaskRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
async fn get_task(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TaskRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    org_scoped(&state.tasks, "task", id, org_id, |t| t.organization_id).map(Json)
}

/// PUT /api/organizations/:org_id/tasks/:id: Update a task.
#[utoipa::path(
    put,
    path = "/api/organizations/{org_id}/tasks/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Task ID"),
    ),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Updated", body = TaskRecord),
        (status = 404, description = "Task, control or evidence not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
async fn update_task(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    body: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let (updated, previous_status) = {
        let controls = state.controls.read();
        let evidence = state.evidence.read();
        let mut tasks = state.tasks.write();
        let task = tasks
            .get_mut(&id)
            .filter(|t| t.organization_id == org_id)
            .ok_or_else(|| AppError::not_found("task", id))?;
        if let Some(control_id) = req.control_id {
            if !controls
                .get(&control_id)
                .is_some_and(|c| c.organization_id == org_id)
            {
                return Err(AppError::not_found("control", control_id));
            }
        }
        if let Some(evidence_id) = req.evidence_id {
            if !evidence
                .get(&evidence_id)
                .is_some_and(|e| e.organization_id == org_id)
            {
                return Err(AppError::not_found("evidence", evidence_id));
            }
        }

        let previous_status = task.status;
        if let Some(title) = req.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = req.description {
            task.description = Some(description);
        }
        if let Some(task_type) = req.task_type {
            task.task_type = task_type;
        }
        if let Some(status) = req.status {
            apply_status(task, status, now);
        }
        if let Some(priority) = req.priority {
            task.priority = priority;
        }
        if req.due_date.is_some() {
            task.due_date = req.due_date;
        }
        if req.assignee_id.is_some() {
            task.assignee_id = req.assignee_id;
        }
        if req.control_id.is_some() {
            task.control_id = req.control_id;
        }
        if req.evidence_id.is_some() {
            task.evidence_id = req.evidence_id;
        }
        task.updated_at = now;
        (task.clone(), previous_status)
    };

    if let Some(pool) = &state.db_pool {
        db::tasks::upsert(pool, &updated)
            .await
            .map_err(|e| persist_error("task", id, e))?;
    }

    let mut entry = AuditEntry::new("task", id, "updated").in_org(org_id);
    if previous_status != updated.status {
        entry = entry.with_metadata(json!({
            "status_from": previous_status,
            "status_to": updated.status,
        }));
    }
    audit::record(&state, &caller, entry).await?;
    Ok(Json(updated))
}

/// DELETE /api/organizations/:org_id/tasks/:id: Delete a task.
#[utoipa::path(
    delete,
    path = "/api/organizations/{org_id}/tasks/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Task ID"),
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Organization ADMIN required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
async fn delete_task(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;

    state.tasks.mutate_all(|tasks| match tasks.get(&id) {
        Some(t) if t.organization_id == org_id => {
            tasks.remove(&id);
            Ok(())
        }
        _ => Err(AppError::not_found("task", id)),
    })?;

    if let Some(pool) = &state.db_pool {
        db::tasks::delete(pool, id)
            .await
            .map_err(|e| persist_error("task", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("task", id, "deleted").in_org(org_id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: TaskStatus) -> TaskRecord {
        let now = Utc::now();
        TaskRecord {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            title: "Rotate access keys".into(),
            description: None,
            task_type: TaskType::Remediation,
            status,
            priority: TaskPriority::High,
            due_date: None,
            assignee_id: None,
            control_id: None,
            evidence_id: None,
            completed_at: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn entering_done_stamps_completion() {
        let mut t = task(TaskStatus::InProgress);
        let now = Utc::now();
        apply_status(&mut t, TaskStatus::Done, now);
        assert_eq!(t.completed_at, Some(now));
        assert_eq!(t.status, TaskStatus::Done);
    }

    #[test]
    fn staying_done_keeps_original_stamp() {
        let mut t = task(TaskStatus::InProgress);
        let first = Utc::now();
        apply_status(&mut t, TaskStatus::Done, first);
        apply_status(&mut t, TaskStatus::Done, first + chrono::Duration::hours(1));
        assert_eq!(t.completed_at, Some(first));
    }

    #[test]
    fn reopening_clears_completion() {
        let mut t = task(TaskStatus::InProgress);
        apply_status(&mut t, TaskStatus::Done, Utc::now());
        apply_status(&mut t, TaskStatus::Todo, Utc::now());
        assert!(t.completed_at.is_none());
    }
}
