//! Organization persistence: organizations, memberships and compliance
//! selections.

use chrono::{DateTime, Utc};
use comply_core::{OrgRole, RiskTolerance};
use sqlx::PgPool;
use uuid::Uuid;

use super::{decode_enum, encode_enum};
use crate::records::{MembershipRecord, OrganizationRecord, SelectionRecord};

pub async fn upsert(pool: &PgPool, record: &OrganizationRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO organizations (id, name, slug, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET
           name = EXCLUDED.name, slug = EXCLUDED.slug, updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(&record.slug)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<OrganizationRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, OrganizationRow>(
        "SELECT id, name, slug, created_at, updated_at FROM organizations ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| OrganizationRecord {
            id: r.id,
            name: r.name,
            slug: r.slug,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

/// Insert a membership, or change the role of an existing one.
pub async fn upsert_membership(pool: &PgPool, record: &MembershipRecord) -> Result<(), sqlx::Error> {
    let role = encode_enum(&record.role)?;

    sqlx::query(
        "INSERT INTO memberships (id, organization_id, user_id, role, created_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET role = EXCLUDED.role",
    )
    .bind(record.id)
    .bind(record.organization_id)
    .bind(record.user_id)
    .bind(&role)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_membership(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM memberships WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all_memberships(pool: &PgPool) -> Result<Vec<MembershipRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MembershipRow>(
        "SELECT id, organization_id, user_id, role, created_at FROM memberships",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| MembershipRecord {
            role: decode_enum(r.id, "role", &r.role, OrgRole::Member),
            id: r.id,
            organization_id: r.organization_id,
            user_id: r.user_id,
            created_at: r.created_at,
        })
        .collect())
}

/// Insert or update a batch of selections in one transaction.
pub async fn upsert_selections(
    pool: &PgPool,
    records: &[SelectionRecord],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for record in records {
        let risk_tolerance = record
            .risk_tolerance
            .as_ref()
            .map(encode_enum)
            .transpose()?;

        sqlx::query(
            "INSERT INTO compliance_selections (id, organization_id, framework_id, clause_id,
             deadline, risk_tolerance, owner_id, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
               deadline = EXCLUDED.deadline, risk_tolerance = EXCLUDED.risk_tolerance,
               owner_id = EXCLUDED.owner_id, notes = EXCLUDED.notes,
               updated_at = EXCLUDED.updated_at",
        )
        .bind(record.id)
        .bind(record.organization_id)
        .bind(record.framework_id)
        .bind(record.clause_id)
        .bind(record.deadline)
        .bind(&risk_tolerance)
        .bind(record.owner_id)
        .bind(&record.notes)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn delete_selection(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM compliance_selections WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all_selections(pool: &PgPool) -> Result<Vec<SelectionRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SelectionRow>(
        "SELECT id, organization_id, framework_id, clause_id, deadline, risk_tolerance,
         owner_id, notes, created_at, updated_at
         FROM compliance_selections ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| SelectionRecord {
            risk_tolerance: r
                .risk_tolerance
                .as_deref()
                .map(|raw| decode_enum(r.id, "risk_tolerance", raw, RiskTolerance::Medium)),
            id: r.id,
            organization_id: r.organization_id,
            framework_id: r.framework_id,
            clause_id: r.clause_id,
            deadline: r.deadline,
            owner_id: r.owner_id,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    slug: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: Uuid,
    organization_id: Uuid,
    user_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SelectionRow {
    id: Uuid,
    organization_id: Uuid,
    framework_id: Uuid,
    clause_id: Option<Uuid>,
    deadline: Option<DateTime<Utc>>,
    risk_tolerance: Option<String>,
    owner_id: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
