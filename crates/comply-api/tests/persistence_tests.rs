//! # Write-Through Persistence Tests
//!
//! Without `DATABASE_URL` these exercise the in-memory write path only.
//! With `DATABASE_URL` they also rebuild a fresh `AppState` through
//! `hydrate_from_db()` and check that the stored rows agree with memory.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use comply_api::state::{AppConfig, AppState};

async fn test_state() -> AppState {
    let pool = comply_api::db::init_pool()
        .await
        .expect("DATABASE_URL is set but the database is unreachable");
    AppState::with_config(AppConfig::default(), pool)
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn uuid_of(value: &Value) -> Uuid {
    value["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn applied_suggestion_persists_draft_and_usage_together() {
    let state = test_state().await;
    let app = comply_api::app(state.clone());

    let slug = format!("persist-{}", Uuid::new_v4().simple());
    let (status, org) = post_json(
        &app,
        "/api/admin/organizations",
        json!({ "name": "Persist Co", "slug": slug }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let org_id = uuid_of(&org);

    let (_, entry) = post_json(
        &app,
        &format!("/api/organizations/{org_id}/answer-library"),
        json!({
            "question": "Do you back up production databases?",
            "answer": "Nightly encrypted backups, retained for 35 days.",
        }),
    )
    .await;
    let entry_id = uuid_of(&entry);

    let (_, questionnaire) = post_json(
        &app,
        &format!("/api/organizations/{org_id}/questionnaires"),
        json!({
            "title": "Annual review",
            "questions": [{ "text": "Do you back up production databases?" }],
        }),
    )
    .await;
    let question_id: Uuid = questionnaire["questions"][0]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let (status, _) = post_json(
        &app,
        &format!(
            "/api/organizations/{org_id}/questions/{question_id}/suggestions/{entry_id}/apply"
        ),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let entry = state.library.get(&entry_id).unwrap();
    assert_eq!(entry.usage_count, 1);
    let question = state.questions.get(&question_id).unwrap();
    assert_eq!(
        question.answer.as_ref().and_then(|a| a.library_entry_id),
        Some(entry_id)
    );

    if state.db_pool.is_none() {
        return;
    }

    let restarted = AppState::with_config(AppConfig::default(), state.db_pool.clone());
    restarted.hydrate_from_db().await.unwrap();
    let stored_entry = restarted.library.get(&entry_id).unwrap();
    assert_eq!(stored_entry.usage_count, 1);
    assert!(stored_entry.last_used_at.is_some());
    let stored_question = restarted.questions.get(&question_id).unwrap();
    assert_eq!(
        stored_question.answer.as_ref().and_then(|a| a.library_entry_id),
        Some(entry_id)
    );
}
