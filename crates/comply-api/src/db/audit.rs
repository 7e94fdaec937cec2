//! Activity log persistence. Events are append-only; there is no update or delete.

use sqlx::PgPool;

use crate::records::AuditEventRecord;

pub async fn insert(pool: &PgPool, event: &AuditEventRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_events (id, sequence, actor_id, actor_role, organization_id,
         resource_type, resource_id, action, metadata, previous_hash, event_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(event.id)
    .bind(event.sequence)
    .bind(event.actor_id)
    .bind(&event.actor_role)
    .bind(event.organization_id)
    .bind(&event.resource_type)
    .bind(event.resource_id)
    .bind(&event.action)
    .bind(&event.metadata)
    .bind(&event.previous_hash)
    .bind(&event.event_hash)
    .bind(event.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<AuditEventRecord>, sqlx::Error> {
    sqlx::query_as::<_, AuditEventRecord>(
        "SELECT id, sequence, actor_id, actor_role, organization_id, resource_type,
         resource_id, action, metadata, previous_hash, event_hash, created_at
         FROM audit_events ORDER BY sequence",
    )
    .fetch_all(pool)
    .await
}
