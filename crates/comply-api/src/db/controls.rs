//! Control persistence. Evidence links live in the `control_evidence` link
//! table and are rewritten with the control in one transaction.

use chrono::{DateTime, Utc};
use comply_core::{ControlStatus, Criticality};
use sqlx::PgPool;
use uuid::Uuid;

use super::{decode_enum, encode_enum};
use crate::records::ControlRecord;

/// Insert or update a control together with its evidence links.
pub async fn upsert(pool: &PgPool, record: &ControlRecord) -> Result<(), sqlx::Error> {
    let status = encode_enum(&record.status)?;
    let criticality = encode_enum(&record.criticality)?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO controls (id, organization_id, framework_id, reference, title, description,
         status, criticality, owner_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (id) DO UPDATE SET
           framework_id = EXCLUDED.framework_id, reference = EXCLUDED.reference,
           title = EXCLUDED.title, description = EXCLUDED.description,
           status = EXCLUDED.status, criticality = EXCLUDED.criticality,
           owner_id = EXCLUDED.owner_id, updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(record.organization_id)
    .bind(record.framework_id)
    .bind(&record.reference)
    .bind(&record.title)
    .bind(&record.description)
    .bind(&status)
    .bind(&criticality)
    .bind(record.owner_id)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM control_evidence WHERE control_id = $1")
        .bind(record.id)
        .execute(&mut *tx)
        .await?;

    for (position, evidence_id) in record.evidence_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO control_evidence (control_id, evidence_id, position) VALUES ($1, $2, $3)",
        )
        .bind(record.id)
        .bind(evidence_id)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Delete a control. Links cascade; tasks keep their row with `control_id` cleared.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM controls WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<ControlRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ControlRow>(
        "SELECT c.id, c.organization_id, c.framework_id, c.reference, c.title, c.description,
         c.status, c.criticality, c.owner_id, c.created_at, c.updated_at,
         COALESCE(
           ARRAY(SELECT ce.evidence_id FROM control_evidence ce
                 WHERE ce.control_id = c.id ORDER BY ce.position),
           '{}'
         ) AS evidence_ids
         FROM controls c ORDER BY c.created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ControlRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct ControlRow {
    id: Uuid,
    organization_id: Uuid,
    framework_id: Uuid,
    reference: String,
    title: String,
    description: Option<String>,
    status: String,
    criticality: String,
    owner_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    evidence_ids: Vec<Uuid>,
}

impl ControlRow {
    fn into_record(self) -> ControlRecord {
        ControlRecord {
            status: decode_enum(self.id, "status", &self.status, ControlStatus::default()),
            criticality: decode_enum(
                self.id,
                "criticality",
                &self.criticality,
                Criticality::default(),
            ),
            id: self.id,
            organization_id: self.organization_id,
            framework_id: self.framework_id,
            reference: self.reference,
            title: self.title,
            description: self.description,
            owner_id: self.owner_id,
            evidence_ids: self.evidence_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
