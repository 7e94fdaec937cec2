//! Questionnaire persistence. Each question row carries its answer as JSONB.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{decode_json, encode_json};
use crate::records::{AnswerRecord, LibraryEntryRecord, QuestionRecord, QuestionnaireRecord};

/// Insert a questionnaire and its decomposed questions in one transaction.
pub async fn insert_with_questions(
    pool: &PgPool,
    record: &QuestionnaireRecord,
    questions: &[QuestionRecord],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO questionnaires (id, organization_id, title, requester, description,
         file_name, due_date, created_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(record.id)
    .bind(record.organization_id)
    .bind(&record.title)
    .bind(&record.requester)
    .bind(&record.description)
    .bind(&record.file_name)
    .bind(record.due_date)
    .bind(record.created_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *tx)
    .await?;

    for question in questions {
        let answer = encode_json(&question.answer)?;
        sqlx::query(
            "INSERT INTO questions (id, questionnaire_id, organization_id, order_index, section,
             text, answer, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(question.id)
        .bind(question.questionnaire_id)
        .bind(question.organization_id)
        .bind(question.order_index)
        .bind(&question.section)
        .bind(&question.text)
        .bind(&answer)
        .bind(question.created_at)
        .bind(question.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Persist a question's text and answer.
pub async fn update_question(pool: &PgPool, record: &QuestionRecord) -> Result<bool, sqlx::Error> {
    let answer = encode_json(&record.answer)?;

    let result = sqlx::query(
        "UPDATE questions SET section = $2, text = $3, answer = $4, updated_at = $5
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(&record.section)
    .bind(&record.text)
    .bind(&answer)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Persist a draft seeded from the answer library together with the entry's
/// usage count, in one transaction.
pub async fn apply_library_answer(
    pool: &PgPool,
    question: &QuestionRecord,
    entry: &LibraryEntryRecord,
) -> Result<(), sqlx::Error> {
    let answer = encode_json(&question.answer)?;

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE questions SET answer = $2, updated_at = $3 WHERE id = $1")
        .bind(question.id)
        .bind(&answer)
        .bind(question.updated_at)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE answer_library SET usage_count = $2, last_used_at = $3, updated_at = $4
         WHERE id = $1",
    )
    .bind(entry.id)
    .bind(entry.usage_count)
    .bind(entry.last_used_at)
    .bind(entry.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

/// Delete a questionnaire. Its questions cascade.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM questionnaires WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<QuestionnaireRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, QuestionnaireRow>(
        "SELECT id, organization_id, title, requester, description, file_name, due_date,
         created_by, created_at, updated_at
         FROM questionnaires ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| QuestionnaireRecord {
            id: r.id,
            organization_id: r.organization_id,
            title: r.title,
            requester: r.requester,
            description: r.description,
            file_name: r.file_name,
            due_date: r.due_date,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

pub async fn load_all_questions(pool: &PgPool) -> Result<Vec<QuestionRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, QuestionRow>(
        "SELECT id, questionnaire_id, organization_id, order_index, section, text, answer,
         created_at, updated_at
         FROM questions ORDER BY questionnaire_id, order_index",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| QuestionRecord {
            answer: decode_json::<AnswerRecord>(r.id, "answer", r.answer),
            id: r.id,
            questionnaire_id: r.questionnaire_id,
            organization_id: r.organization_id,
            order_index: r.order_index,
            section: r.section,
            text: r.text,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct QuestionnaireRow {
    id: Uuid,
    organization_id: Uuid,
    title: String,
    requester: Option<String>,
    description: Option<String>,
    file_name: Option<String>,
    due_date: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: Uuid,
    questionnaire_id: Uuid,
    organization_id: Uuid,
    order_index: i32,
    section: Option<String>,
    text: String,
    answer: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
