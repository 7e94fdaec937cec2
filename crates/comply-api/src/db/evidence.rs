//! Evidence persistence: evidence items and versioned clause submissions.

use chrono::{DateTime, Utc};
use comply_core::{EvidenceStatus, EvidenceType, ReviewStatus};
use sqlx::PgPool;
use uuid::Uuid;

use super::{decode_enum, decode_json, encode_enum, encode_json};
use crate::records::{EvidenceRecord, FileMetadata, SubmissionRecord};

pub async fn upsert(pool: &PgPool, record: &EvidenceRecord) -> Result<(), sqlx::Error> {
    let evidence_type = encode_enum(&record.evidence_type)?;
    let status = encode_enum(&record.status)?;
    let file = encode_json(&record.file)?;

    sqlx::query(
        "INSERT INTO evidence (id, organization_id, title, description, evidence_type, status,
         file, expires_at, clause_ids, uploaded_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (id) DO UPDATE SET
           title = EXCLUDED.title, description = EXCLUDED.description,
           evidence_type = EXCLUDED.evidence_type, status = EXCLUDED.status,
           file = EXCLUDED.file, expires_at = EXCLUDED.expires_at,
           clause_ids = EXCLUDED.clause_ids, updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(record.organization_id)
    .bind(&record.title)
    .bind(&record.description)
    .bind(&evidence_type)
    .bind(&status)
    .bind(&file)
    .bind(record.expires_at)
    .bind(&record.clause_ids)
    .bind(record.uploaded_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete an evidence item. Control links cascade; tasks and submissions
/// keep their rows with `evidence_id` cleared.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM evidence WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<EvidenceRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, EvidenceRow>(
        "SELECT id, organization_id, title, description, evidence_type, status, file,
         expires_at, clause_ids, uploaded_by, created_at, updated_at
         FROM evidence ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(EvidenceRow::into_record).collect())
}

/// Store a new submission version and demote every earlier version of the
/// same (organization, clause) in one transaction.
pub async fn save_submission(pool: &PgPool, record: &SubmissionRecord) -> Result<(), sqlx::Error> {
    let review_status = encode_enum(&record.review_status)?;
    let file = encode_json(&record.file)?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE evidence_submissions SET is_latest = FALSE
         WHERE organization_id = $1 AND clause_id = $2 AND id <> $3",
    )
    .bind(record.organization_id)
    .bind(record.clause_id)
    .bind(record.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO evidence_submissions (id, organization_id, clause_id, evidence_id, title,
         notes, file, version, is_latest, review_status, reviewer_id, reviewed_at,
         review_comments, submitted_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
    )
    .bind(record.id)
    .bind(record.organization_id)
    .bind(record.clause_id)
    .bind(record.evidence_id)
    .bind(&record.title)
    .bind(&record.notes)
    .bind(&file)
    .bind(record.version)
    .bind(record.is_latest)
    .bind(&review_status)
    .bind(record.reviewer_id)
    .bind(record.reviewed_at)
    .bind(&record.review_comments)
    .bind(record.submitted_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

/// Persist the review fields of an existing submission.
pub async fn update_submission(
    pool: &PgPool,
    record: &SubmissionRecord,
) -> Result<bool, sqlx::Error> {
    let review_status = encode_enum(&record.review_status)?;

    let result = sqlx::query(
        "UPDATE evidence_submissions SET review_status = $2, reviewer_id = $3,
         reviewed_at = $4, review_comments = $5, evidence_id = $6, updated_at = $7
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(&review_status)
    .bind(record.reviewer_id)
    .bind(record.reviewed_at)
    .bind(&record.review_comments)
    .bind(record.evidence_id)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all_submissions(pool: &PgPool) -> Result<Vec<SubmissionRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SubmissionRow>(
        "SELECT id, organization_id, clause_id, evidence_id, title, notes, file, version,
         is_latest, review_status, reviewer_id, reviewed_at, review_comments, submitted_by,
         created_at, updated_at
         FROM evidence_submissions ORDER BY organization_id, clause_id, version",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SubmissionRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct EvidenceRow {
    id: Uuid,
    organization_id: Uuid,
    title: String,
    description: Option<String>,
    evidence_type: String,
    status: String,
    file: Option<serde_json::Value>,
    expires_at: Option<DateTime<Utc>>,
    clause_ids: Vec<Uuid>,
    uploaded_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EvidenceRow {
    fn into_record(self) -> EvidenceRecord {
        EvidenceRecord {
            evidence_type: decode_enum(
                self.id,
                "evidence_type",
                &self.evidence_type,
                EvidenceType::Other,
            ),
            status: decode_enum(self.id, "status", &self.status, EvidenceStatus::default()),
            file: decode_json::<FileMetadata>(self.id, "file", self.file),
            id: self.id,
            organization_id: self.organization_id,
            title: self.title,
            description: self.description,
            expires_at: self.expires_at,
            clause_ids: self.clause_ids,
            uploaded_by: self.uploaded_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    organization_id: Uuid,
    clause_id: Uuid,
    evidence_id: Option<Uuid>,
    title: String,
    notes: Option<String>,
    file: Option<serde_json::Value>,
    version: i32,
    is_latest: bool,
    review_status: String,
    reviewer_id: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    review_comments: Option<String>,
    submitted_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubmissionRow {
    fn into_record(self) -> SubmissionRecord {
        SubmissionRecord {
            review_status: decode_enum(
                self.id,
                "review_status",
                &self.review_status,
                ReviewStatus::Pending,
            ),
            file: decode_json::<FileMetadata>(self.id, "file", self.file),
            id: self.id,
            organization_id: self.organization_id,
            clause_id: self.clause_id,
            evidence_id: self.evidence_id,
            title: self.title,
            notes: self.notes,
            version: self.version,
            is_latest: self.is_latest,
            reviewer_id: self.reviewer_id,
            reviewed_at: self.reviewed_at,
            review_comments: self.review_comments,
            submitted_by: self.submitted_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
