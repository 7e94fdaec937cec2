//! Compliance structure persistence: frameworks, topics, components and
//! clauses. Children cascade with their parent in the schema.

use chrono::{DateTime, Utc};
use comply_core::RiskLevel;
use sqlx::PgPool;
use uuid::Uuid;

use super::{decode_enum, encode_enum};
use crate::records::{ClauseRecord, ComplianceFrameworkRecord, ComponentRecord, TopicRecord};

/// Every row of the compliance structure, for hydration.
pub struct ComplianceStructure {
    pub frameworks: Vec<ComplianceFrameworkRecord>,
    pub topics: Vec<TopicRecord>,
    pub components: Vec<ComponentRecord>,
    pub clauses: Vec<ClauseRecord>,
}

pub async fn upsert_framework(
    pool: &PgPool,
    record: &ComplianceFrameworkRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO compliance_frameworks (id, name, version, description, is_active,
         created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (id) DO UPDATE SET
           name = EXCLUDED.name, version = EXCLUDED.version,
           description = EXCLUDED.description, is_active = EXCLUDED.is_active,
           updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(&record.version)
    .bind(&record.description)
    .bind(record.is_active)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a compliance framework and, by cascade, its whole tree.
pub async fn delete_framework(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM compliance_frameworks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_topic(pool: &PgPool, record: &TopicRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO compliance_topics (id, framework_id, name, description, order_index,
         created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (id) DO UPDATE SET
           name = EXCLUDED.name, description = EXCLUDED.description,
           order_index = EXCLUDED.order_index, updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(record.framework_id)
    .bind(&record.name)
    .bind(&record.description)
    .bind(record.order_index)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_topic(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM compliance_topics WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_component(pool: &PgPool, record: &ComponentRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO compliance_components (id, topic_id, framework_id, name, description,
         order_index, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (id) DO UPDATE SET
           name = EXCLUDED.name, description = EXCLUDED.description,
           order_index = EXCLUDED.order_index, updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(record.topic_id)
    .bind(record.framework_id)
    .bind(&record.name)
    .bind(&record.description)
    .bind(record.order_index)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_component(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM compliance_components WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_clause(pool: &PgPool, record: &ClauseRecord) -> Result<(), sqlx::Error> {
    let risk_level = encode_enum(&record.risk_level)?;

    sqlx::query(
        "INSERT INTO compliance_clauses (id, component_id, topic_id, framework_id, reference,
         title, description, risk_level, evidence_guidance, testing_guidance, order_index,
         created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (id) DO UPDATE SET
           reference = EXCLUDED.reference, title = EXCLUDED.title,
           description = EXCLUDED.description, risk_level = EXCLUDED.risk_level,
           evidence_guidance = EXCLUDED.evidence_guidance,
           testing_guidance = EXCLUDED.testing_guidance,
           order_index = EXCLUDED.order_index, updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(record.component_id)
    .bind(record.topic_id)
    .bind(record.framework_id)
    .bind(&record.reference)
    .bind(&record.title)
    .bind(&record.description)
    .bind(&risk_level)
    .bind(&record.evidence_guidance)
    .bind(&record.testing_guidance)
    .bind(record.order_index)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_clause(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM compliance_clauses WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<ComplianceStructure, sqlx::Error> {
    let frameworks = sqlx::query_as::<_, FrameworkRow>(
        "SELECT id, name, version, description, is_active, created_at, updated_at
         FROM compliance_frameworks ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let topics = sqlx::query_as::<_, TopicRow>(
        "SELECT id, framework_id, name, description, order_index, created_at, updated_at
         FROM compliance_topics ORDER BY framework_id, order_index",
    )
    .fetch_all(pool)
    .await?;

    let components = sqlx::query_as::<_, ComponentRow>(
        "SELECT id, topic_id, framework_id, name, description, order_index, created_at, updated_at
         FROM compliance_components ORDER BY topic_id, order_index",
    )
    .fetch_all(pool)
    .await?;

    let clauses = sqlx::query_as::<_, ClauseRow>(
        "SELECT id, component_id, topic_id, framework_id, reference, title, description,
         risk_level, evidence_guidance, testing_guidance, order_index, created_at, updated_at
         FROM compliance_clauses ORDER BY component_id, order_index",
    )
    .fetch_all(pool)
    .await?;

    Ok(ComplianceStructure {
        frameworks: frameworks
            .into_iter()
            .map(|r| ComplianceFrameworkRecord {
                id: r.id,
                name: r.name,
                version: r.version,
                description: r.description,
                is_active: r.is_active,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect(),
        topics: topics
            .into_iter()
            .map(|r| TopicRecord {
                id: r.id,
                framework_id: r.framework_id,
                name: r.name,
                description: r.description,
                order_index: r.order_index,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect(),
        components: components
            .into_iter()
            .map(|r| ComponentRecord {
                id: r.id,
                topic_id: r.topic_id,
                framework_id: r.framework_id,
                name: r.name,
                description: r.description,
                order_index: r.order_index,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect(),
        clauses: clauses.into_iter().map(ClauseRow::into_record).collect(),
    })
}

#[derive(sqlx::FromRow)]
struct FrameworkRow {
    id: Uuid,
    name: String,
    version: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TopicRow {
    id: Uuid,
    framework_id: Uuid,
    name: String,
    description: Option<String>,
    order_index: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ComponentRow {
    id: Uuid,
    topic_id: Uuid,
    framework_id: Uuid,
    name: String,
    description: Option<String>,
    order_index: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ClauseRow {
    id: Uuid,
    component_id: Uuid,
    topic_id: Uuid,
    framework_id: Uuid,
    reference: String,
    title: String,
    description: Option<String>,
    risk_level: String,
    evidence_guidance: Option<String>,
    testing_guidance: Option<String>,
    order_index: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ClauseRow {
    fn into_record(self) -> ClauseRecord {
        ClauseRecord {
            risk_level: decode_enum(self.id, "risk_level", &self.risk_level, RiskLevel::default()),
            id: self.id,
            component_id: self.component_id,
            topic_id: self.topic_id,
            framework_id: self.framework_id,
            reference: self.reference,
            title: self.title,
            description: self.description,
            evidence_guidance: self.evidence_guidance,
            testing_guidance: self.testing_guidance,
            order_index: self.order_index,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
