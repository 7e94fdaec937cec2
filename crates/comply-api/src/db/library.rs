//! Answer library persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::records::LibraryEntryRecord;

pub async fn upsert(pool: &PgPool, record: &LibraryEntryRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO answer_library (id, organization_id, category, question, answer,
         key_phrases, usage_count, confidence_score, is_active, last_used_at, created_by,
         created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (id) DO UPDATE SET
           category = EXCLUDED.category, question = EXCLUDED.question,
           answer = EXCLUDED.answer, key_phrases = EXCLUDED.key_phrases,
           usage_count = EXCLUDED.usage_count, confidence_score = EXCLUDED.confidence_score,
           is_active = EXCLUDED.is_active, last_used_at = EXCLUDED.last_used_at,
           updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(record.organization_id)
    .bind(&record.category)
    .bind(&record.question)
    .bind(&record.answer)
    .bind(&record.key_phrases)
    .bind(record.usage_count)
    .bind(record.confidence_score)
    .bind(record.is_active)
    .bind(record.last_used_at)
    .bind(record.created_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM answer_library WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<LibraryEntryRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LibraryRow>(
        "SELECT id, organization_id, category, question, answer, key_phrases, usage_count,
         confidence_score, is_active, last_used_at, created_by, created_at, updated_at
         FROM answer_library ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LibraryEntryRecord {
            id: r.id,
            organization_id: r.organization_id,
            category: r.category,
            question: r.question,
            answer: r.answer,
            key_phrases: r.key_phrases,
            usage_count: r.usage_count,
            confidence_score: r.confidence_score,
            is_active: r.is_active,
            last_used_at: r.last_used_at,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct LibraryRow {
    id: Uuid,
    organization_id: Uuid,
    category: Option<String>,
    question: String,
    answer: String,
    key_phrases: Vec<String>,
    usage_count: i64,
    confidence_score: f64,
    is_active: bool,
    last_used_at: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
