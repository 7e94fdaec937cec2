//! Task persistence.

use chrono::{DateTime, Utc};
use comply_core::{TaskPriority, TaskStatus, TaskType};
use sqlx::PgPool;
use uuid::Uuid;

use super::{decode_enum, encode_enum};
use crate::records::TaskRecord;

pub async fn upsert(pool: &PgPool, record: &TaskRecord) -> Result<(), sqlx::Error> {
    let task_type = encode_enum(&record.task_type)?;
    let status = encode_enum(&record.status)?;
    let priority = encode_enum(&record.priority)?;

    sqlx::query(
        "INSERT INTO tasks (id, organization_id, title, description, task_type, status, priority,
         due_date, assignee_id, control_id, evidence_id, completed_at, created_by,
         created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         ON CONFLICT (id) DO UPDATE SET
           title = EXCLUDED.title, description = EXCLUDED.description,
           task_type = EXCLUDED.task_type, status = EXCLUDED.status,
           priority = EXCLUDED.priority, due_date = EXCLUDED.due_date,
           assignee_id = EXCLUDED.assignee_id, control_id = EXCLUDED.control_id,
           evidence_id = EXCLUDED.evidence_id, completed_at = EXCLUDED.completed_at,
           updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(record.organization_id)
    .bind(&record.title)
    .bind(&record.description)
    .bind(&task_type)
    .bind(&status)
    .bind(&priority)
    .bind(record.due_date)
    .bind(record.assignee_id)
    .bind(record.control_id)
    .bind(record.evidence_id)
    .bind(record.completed_at)
    .bind(record.created_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<TaskRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TaskRow>(
        "SELECT id, organization_id, title, description, task_type, status, priority, due_date,
         assignee_id, control_id, evidence_id, completed_at, created_by, created_at, updated_at
         FROM tasks ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(TaskRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    organization_id: Uuid,
    title: String,
    description: Option<String>,
    task_type: String,
    status: String,
    priority: String,
    due_date: Option<DateTime<Utc>>,
    assignee_id: Option<Uuid>,
    control_id: Option<Uuid>,
    evidence_id: Option<Uuid>,
    completed_at: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_record(self) -> TaskRecord {
        TaskRecord {
            task_type: decode_enum(self.id, "task_type", &self.task_type, TaskType::default()),
            status: decode_enum(self.id, "status", &self.status, TaskStatus::default()),
            priority: decode_enum(self.id, "priority", &self.priority, TaskPriority::default()),
            id: self.id,
            organization_id: self.organization_id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            assignee_id: self.assignee_id,
            control_id: self.control_id,
            evidence_id: self.evidence_id,
            completed_at: self.completed_at,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
