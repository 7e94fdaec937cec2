//! # Answer Library API
//!
//! Reusable, pre-approved answers that seed questionnaire drafts. Entries
//! are scored against questions by the suggestion endpoint in
//! [`questionnaires`](super::questionnaires).

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use comply_core::validate::{self, MAX_LONG_TEXT, MAX_SHORT_TEXT};
use comply_core::{OrgRole, ValidationError};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::auth::{require_org_role, CallerIdentity};
use crate::db::{self, persist_error};
use crate::error::AppError;
use crate::extractors::{
    extract_query, extract_validated_json, matches_search, paginate, Paginated, Validate,
};
use crate::records::LibraryEntryRecord;
use crate::state::AppState;

use super::{default_true, org_scoped};

const MAX_KEY_PHRASES: usize = 50;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLibraryEntryRequest {
    pub category: Option<String>,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub key_phrases: Vec<String>,
    /// In `[0, 1]`; defaults to 1.0.
    pub confidence_score: Option<f64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Validate for CreateLibraryEntryRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("category", self.category.as_deref(), MAX_SHORT_TEXT)?;
        validate::required("question", &self.question, MAX_LONG_TEXT)?;
        validate::required("answer", &self.answer, MAX_LONG_TEXT)?;
        validate_phrases(&self.key_phrases)?;
        if let Some(score) = self.confidence_score {
            validate::unit_interval("confidence_score", score)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLibraryEntryRequest {
    pub category: Option<String>,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub key_phrases: Option<Vec<String>>,
    pub confidence_score: Option<f64>,
    pub is_active: Option<bool>,
}

impl Validate for UpdateLibraryEntryRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("category", self.category.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("question", self.question.as_deref(), MAX_LONG_TEXT)?;
        validate::optional("answer", self.answer.as_deref(), MAX_LONG_TEXT)?;
        if let Some(phrases) = &self.key_phrases {
            validate_phrases(phrases)?;
        }
        if let Some(score) = self.confidence_score {
            validate::unit_interval("confidence_score", score)?;
        }
        Ok(())
    }
}

fn validate_phrases(phrases: &[String]) -> Result<(), ValidationError> {
    if phrases.len() > MAX_KEY_PHRASES {
        return Err(ValidationError::Invalid {
            field: "key_phrases",
            reason: format!("at most {MAX_KEY_PHRASES} phrases are allowed"),
        });
    }
    for phrase in phrases {
        validate::required("key_phrases", phrase, MAX_SHORT_TEXT)?;
    }
    Ok(())
}

/// Trimmed phrases with case-insensitive duplicates removed.
fn normalize_phrases(phrases: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(phrases.len());
    for phrase in phrases {
        let phrase = phrase.trim().to_string();
        if !kept.iter().any(|k| k.eq_ignore_ascii_case(&phrase)) {
            kept.push(phrase);
        }
    }
    kept
}

#[derive(Debug, Deserialize)]
pub struct ListLibraryQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Build the answer library router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations/:org_id/answer-library",
            get(list_entries).post(create_entry),
        )
        .route(
            "/api/organizations/:org_id/answer-library/:id",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
}

/// GET /api/organizations/:org_id/answer-library: List library entries.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/answer-library",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("category" = Option<String>, Query, description = "Exact category, case-insensitive"),
        ("search" = Option<String>, Query, description = "Substring of question, answer or key phrases"),
        ("active" = Option<bool>, Query, description = "Active flag filter"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Page size (default 20, max 100)"),
    ),
    responses((status = 200, description = "Page of entries, most used first")),
    tag = "answer-library"
)]
async fn list_entries(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    query: Result<Query<ListLibraryQuery>, QueryRejection>,
) -> Result<Json<Paginated<LibraryEntryRecord>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;

    let mut entries = state.library.filter(|e| {
        e.organization_id == org_id
            && query.active.map_or(true, |a| e.is_active == a)
            && query.category.as_deref().map_or(true, |c| {
                e.category
                    .as_deref()
                    .is_some_and(|ec| ec.eq_ignore_ascii_case(c.trim()))
            })
            && query.search.as_deref().map_or(true, |s| {
                let phrases = e.key_phrases.join(" ");
                matches_search(s, &[Some(&e.question), Some(&e.answer), Some(&phrases)])
            })
    });
    entries.sort_by(|a, b| {
        b.usage_count
            .cmp(&a.usage_count)
            .then(a.created_at.cmp(&b.created_at))
    });

    Ok(Json(paginate(entries, query.page, query.limit)?))
}

/// POST /api/organizations/:org_id/answer-library: Add a library entry.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/answer-library",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateLibraryEntryRequest,
    responses(
        (status = 201, description = "Entry created", body = LibraryEntryRecord),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "answer-library"
)]
async fn create_entry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<CreateLibraryEntryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LibraryEntryRecord>), AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let record = LibraryEntryRecord {
        id: Uuid::new_v4(),
        organization_id: org_id,
        category: req.category.map(|c| c.trim().to_string()),
        question: req.question.trim().to_string(),
        answer: req.answer,
        key_phrases: normalize_phrases(req.key_phrases),
        usage_count: 0,
        confidence_score: req.confidence_score.unwrap_or(1.0),
        is_active: req.is_active,
        last_used_at: None,
        created_by: caller.user_id,
        created_at: now,
        updated_at: now,
    };

    if let Some(pool) = &state.db_pool {
        db::library::upsert(pool, &record)
            .await
            .map_err(|e| persist_error("library entry", record.id, e))?;
    }
    state.library.insert(record.id, record.clone());

    audit::record(
        &state,
        &caller,
        AuditEntry::new("library_entry", record.id, "created")
            .in_org(org_id)
            .with_metadata(json!({ "category": record.category })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/organizations/:org_id/answer-library/:id: Get a library entry.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/answer-library/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Library entry ID"),
    ),
    responses(
        (status = 200, description = "Library entry", body = LibraryEntryRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "answer-library"
)]
async fn get_entry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<LibraryEntryRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    org_scoped(&state.library, "library entry", id, org_id, |e| e.organization_id).map(Json)
}

/// PUT /api/organizations/:org_id/answer-library/:id: Update a library entry.
#[utoipa::path(
    put,
    path = "/api/organizations/{org_id}/answer-library/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Library entry ID"),
    ),
    request_body = UpdateLibraryEntryRequest,
    responses(
        (status = 200, description = "Updated", body = LibraryEntryRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "answer-library"
)]
async fn update_entry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    body: Result<Json<UpdateLibraryEntryRequest>, JsonRejection>,
) -> Result<Json<LibraryEntryRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;

    let updated = state
        .library
        .try_update(&id, |e| {
            if e.organization_id != org_id {
                return Err(AppError::not_found("library entry", id));
            }
            if let Some(category) = req.category {
                e.category = Some(category.trim().to_string());
            }
            if let Some(question) = req.question {
                e.question = question.trim().to_string();
            }
            if let Some(answer) = req.answer {
                e.answer = answer;
            }
            if let Some(phrases) = req.key_phrases {
                e.key_phrases = normalize_phrases(phrases);
            }
            if let Some(score) = req.confidence_score {
                e.confidence_score = score;
            }
            if let Some(active) = req.is_active {
                e.is_active = active;
            }
            e.updated_at = Utc::now();
            Ok(e.clone())
        })
        .ok_or_else(|| AppError::not_found("library entry", id))??;

    if let Some(pool) = &state.db_pool {
        db::library::upsert(pool, &updated)
            .await
            .map_err(|e| persist_error("library entry", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("library_entry", id, "updated").in_org(org_id),
    )
    .await?;
    Ok(Json(updated))
}

/// DELETE /api/organizations/:org_id/answer-library/:id: Delete a library entry.
///
/// Answers seeded from the entry keep their text.
#[utoipa::path(
    delete,
    path = "/api/organizations/{org_id}/answer-library/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Library entry ID"),
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Organization ADMIN required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "answer-library"
)]
async fn delete_entry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;

    state.library.mutate_all(|library| match library.get(&id) {
        Some(e) if e.organization_id == org_id => {
            library.remove(&id);
            Ok(())
        }
        _ => Err(AppError::not_found("library entry", id)),
    })?;

    if let Some(pool) = &state.db_pool {
        db::library::delete(pool, id)
            .await
            .map_err(|e| persist_error("library entry", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("library_entry", id, "deleted").in_org(org_id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_are_trimmed_and_deduplicated() {
        let phrases = normalize_phrases(vec![
            " encryption at rest ".into(),
            "Encryption At Rest".into(),
            "AES-256".into(),
        ]);
        assert_eq!(phrases, vec!["encryption at rest", "AES-256"]);
    }

    #[test]
    fn confidence_outside_unit_interval_is_rejected() {
        let req = CreateLibraryEntryRequest {
            category: None,
            question: "Do you encrypt data at rest?".into(),
            answer: "Yes, with AES-256.".into(),
            key_phrases: Vec::new(),
            confidence_score: Some(1.5),
            is_active: true,
        };
        assert!(matches!(
            req.validate(),
            Err(ValidationError::OutOfRange { field: "confidence_score", .. })
        ));
    }
}
