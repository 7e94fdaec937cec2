//! # Database Persistence Layer
//!
//! Postgres persistence via SQLx.
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! mutation is written through to PostgreSQL and the in-memory stores are
//! hydrated from it on startup. When absent, the API runs in-memory only
//! (suitable for development and testing).
//!
//! Each module owns one aggregate: `upsert`/`delete` for writes and
//! `load_all` for hydration. Enumerations are stored as their wire names.

pub mod audit;
pub mod compliance;
pub mod controls;
pub mod evidence;
pub mod frameworks;
pub mod library;
pub mod organizations;
pub mod questionnaires;
pub mod tasks;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::error::AppError;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only. State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Map a failed write-through to a 500, logging the cause.
///
/// The in-memory store already holds the change, so the failure is surfaced
/// rather than letting the record silently vanish on restart.
pub fn persist_error(resource: &'static str, id: Uuid, err: sqlx::Error) -> AppError {
    tracing::error!(resource, id = %id, error = %err, "failed to persist to database");
    AppError::Internal(format!(
        "{resource} {id} changed in-memory but database persist failed"
    ))
}

/// Serialize a unit enum to the wire name stored in a TEXT column.
pub(crate) fn encode_enum<T: Serialize + std::fmt::Debug>(value: &T) -> Result<String, sqlx::Error> {
    let json = serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, value = ?value, "failed to serialize enum column");
        sqlx::Error::Encode(Box::new(e))
    })?;
    match json {
        serde_json::Value::String(s) => Ok(s),
        other => {
            tracing::error!(value = ?other, "enum did not serialize to a JSON string");
            Err(sqlx::Error::Encode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "enum did not serialize to a string",
            ))))
        }
    }
}

/// Read an enum column. Unknown values fall back to `fallback` and are
/// logged at ERROR: they indicate a schema drift or corrupted row.
pub(crate) fn decode_enum<T: DeserializeOwned>(
    id: Uuid,
    column: &'static str,
    raw: &str,
    fallback: T,
) -> T {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).unwrap_or_else(|e| {
        tracing::error!(
            id = %id,
            column,
            value = raw,
            error = %e,
            "unknown enum value in database, using fallback"
        );
        fallback
    })
}

/// Serialize a value for a JSONB column.
pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, "failed to serialize JSONB column");
        sqlx::Error::Encode(Box::new(e))
    })
}

/// Read an optional JSONB column, logging and dropping unreadable values.
pub(crate) fn decode_json<T: DeserializeOwned>(
    id: Uuid,
    column: &'static str,
    raw: Option<serde_json::Value>,
) -> Option<T> {
    let raw = raw?;
    if raw.is_null() {
        return None;
    }
    serde_json::from_value(raw)
        .map_err(|e| {
            tracing::error!(id = %id, column, error = %e, "unreadable JSONB column, ignoring");
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use comply_core::{ControlStatus, RiskLevel};

    #[test]
    fn enums_round_trip_through_wire_names() {
        assert_eq!(encode_enum(&ControlStatus::NotApplicable).unwrap(), "NOT_APPLICABLE");
        let id = Uuid::new_v4();
        assert_eq!(
            decode_enum(id, "status", "PARTIAL", ControlStatus::Gap),
            ControlStatus::Partial
        );
    }

    #[test]
    fn unknown_enum_uses_fallback() {
        let level = decode_enum(Uuid::new_v4(), "risk_level", "EXTREME", RiskLevel::Medium);
        assert_eq!(level, RiskLevel::Medium);
    }

    #[test]
    fn json_null_decodes_to_none() {
        let id = Uuid::new_v4();
        let none: Option<Vec<String>> = decode_json(id, "file", Some(serde_json::Value::Null));
        assert!(none.is_none());
        let some: Option<Vec<String>> = decode_json(id, "file", Some(serde_json::json!(["a"])));
        assert_eq!(some, Some(vec!["a".to_string()]));
        let bad: Option<Vec<String>> = decode_json(id, "file", Some(serde_json::json!(42)));
        assert!(bad.is_none());
    }
}
