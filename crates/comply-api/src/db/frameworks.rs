//! Framework catalogue persistence: `frameworks` and `framework_mappings`.

use chrono::{DateTime, Utc};
use comply_core::{FrameworkType, MappingRelationship};
use sqlx::PgPool;
use uuid::Uuid;

use super::{decode_enum, encode_enum};
use crate::records::{FrameworkMappingRecord, FrameworkRecord};

/// Insert or update a framework.
pub async fn upsert(pool: &PgPool, record: &FrameworkRecord) -> Result<(), sqlx::Error> {
    let framework_type = encode_enum(&record.framework_type)?;

    sqlx::query(
        "INSERT INTO frameworks (id, name, version, framework_type, source, description,
         is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (id) DO UPDATE SET
           name = EXCLUDED.name, version = EXCLUDED.version,
           framework_type = EXCLUDED.framework_type, source = EXCLUDED.source,
           description = EXCLUDED.description, is_active = EXCLUDED.is_active,
           updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(&record.version)
    .bind(&framework_type)
    .bind(&record.source)
    .bind(&record.description)
    .bind(record.is_active)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a framework. Its mappings go with it (`ON DELETE CASCADE`).
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM frameworks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<FrameworkRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, FrameworkRow>(
        "SELECT id, name, version, framework_type, source, description, is_active,
         created_at, updated_at
         FROM frameworks ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(FrameworkRow::into_record).collect())
}

pub async fn insert_mapping(
    pool: &PgPool,
    record: &FrameworkMappingRecord,
) -> Result<(), sqlx::Error> {
    let relationship = encode_enum(&record.relationship)?;

    sqlx::query(
        "INSERT INTO framework_mappings (id, source_framework_id, source_reference,
         target_framework_id, target_reference, relationship, notes, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(record.id)
    .bind(record.source_framework_id)
    .bind(&record.source_reference)
    .bind(record.target_framework_id)
    .bind(&record.target_reference)
    .bind(&relationship)
    .bind(&record.notes)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_mapping(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM framework_mappings WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all_mappings(pool: &PgPool) -> Result<Vec<FrameworkMappingRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MappingRow>(
        "SELECT id, source_framework_id, source_reference, target_framework_id,
         target_reference, relationship, notes, created_at
         FROM framework_mappings ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MappingRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct FrameworkRow {
    id: Uuid,
    name: String,
    version: String,
    framework_type: String,
    source: Option<String>,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FrameworkRow {
    fn into_record(self) -> FrameworkRecord {
        FrameworkRecord {
            framework_type: decode_enum(
                self.id,
                "framework_type",
                &self.framework_type,
                FrameworkType::Custom,
            ),
            id: self.id,
            name: self.name,
            version: self.version,
            source: self.source,
            description: self.description,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MappingRow {
    id: Uuid,
    source_framework_id: Uuid,
    source_reference: String,
    target_framework_id: Uuid,
    target_reference: String,
    relationship: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl MappingRow {
    fn into_record(self) -> FrameworkMappingRecord {
        FrameworkMappingRecord {
            relationship: decode_enum(
                self.id,
                "relationship",
                &self.relationship,
                MappingRelationship::Related,
            ),
            id: self.id,
            source_framework_id: self.source_framework_id,
            source_reference: self.source_reference,
            target_framework_id: self.target_framework_id,
            target_reference: self.target_reference,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}
