//! # Integration Tests for comply-api
//!
//! Drives the assembled router end to end: authentication, catalogue
//! management, organization workspaces, evidence submission versioning,
//! the questionnaire answer workflow, reports, and the OpenAPI document.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use comply_api::state::{AppConfig, AppState};

/// Helper: build the test app with auth disabled.
fn test_app() -> axum::Router {
    comply_api::app(AppState::new())
}

/// Helper: build the test app with auth enabled.
fn test_app_with_auth(token: &str) -> axum::Router {
    let config = AppConfig {
        auth_token: Some(token.to_string()),
        ..AppConfig::default()
    };
    comply_api::app(AppState::with_config(config, None))
}

/// Helper: read response body as string.
async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Helper: send a request and decode the JSON response (Null when empty).
async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let text = body_string(response).await;
    let value = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, value)
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, None, Some(body)).await
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None, None).await
}

async fn delete(app: &axum::Router, uri: &str) -> StatusCode {
    send(app, Method::DELETE, uri, None, None).await.0
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

async fn create_org(app: &axum::Router, name: &str) -> String {
    let (status, org) = post(app, "/api/admin/organizations", json!({ "name": name })).await;
    assert_eq!(status, StatusCode::CREATED);
    id_of(&org)
}

/// Compliance framework with one topic, one component and `clauses` clauses.
/// Returns (framework_id, clause_ids).
async fn seed_compliance_framework(app: &axum::Router, clauses: usize) -> (String, Vec<String>) {
    let (status, framework) = post(
        app,
        "/api/admin/compliance",
        json!({ "name": "SOC 2", "version": "2017" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let framework_id = id_of(&framework);

    let (_, topic) = post(
        app,
        &format!("/api/admin/compliance/{framework_id}/topics"),
        json!({ "name": "Security" }),
    )
    .await;
    let topic_id = id_of(&topic);
    let (_, component) = post(
        app,
        &format!("/api/admin/topics/{topic_id}/components"),
        json!({ "name": "Logical Access" }),
    )
    .await;
    let component_id = id_of(&component);

    let mut clause_ids = Vec::new();
    for n in 1..=clauses {
        let (status, clause) = post(
            app,
            &format!("/api/admin/components/{component_id}/clauses"),
            json!({ "reference": format!("CC6.{n}"), "title": format!("Access control {n}") }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        clause_ids.push(id_of(&clause));
    }
    (framework_id, clause_ids)
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn test_liveness_probe() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/liveness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_probe_without_database() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/readiness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ready");
}

#[tokio::test]
async fn test_health_probes_skip_auth() {
    let app = test_app_with_auth("secret");
    let (status, _) = get(&app, "/health/liveness").await;
    assert_eq!(status, StatusCode::OK);
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = test_app_with_auth("secret");
    let (status, body) = get(&app, "/api/admin/frameworks").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let app = test_app_with_auth("secret");
    let (status, _) = send(&app, Method::GET, "/api/admin/frameworks", Some("nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_role_cannot_manage_catalogue() {
    let app = test_app_with_auth("secret");
    let token = format!("user:{}:secret", Uuid::new_v4());
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/admin/frameworks",
        Some(&token),
        Some(json!({ "name": "ISO 27001", "version": "2022", "framework_type": "STANDARD" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/admin/frameworks",
        Some("platform_admin::secret"),
        Some(json!({ "name": "ISO 27001", "version": "2022", "framework_type": "STANDARD" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let app = test_app_with_auth("secret");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/frameworks")
                .header(header::COOKIE, "theme=dark; comply_session=secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_organization_access_follows_membership() {
    let app = test_app_with_auth("secret");
    let (status, org) = send(
        &app,
        Method::POST,
        "/api/admin/organizations",
        Some("secret"),
        Some(json!({ "name": "Acme Corp" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(org["slug"], "acme-corp");
    let org_id = id_of(&org);

    let member = Uuid::new_v4();
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/admin/organizations/{org_id}/members"),
        Some("secret"),
        Some(json!({ "user_id": member, "role": "MEMBER" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let member_token = format!("user:{member}:secret");
    let (status, detail) = send(
        &app,
        Method::GET,
        &format!("/api/organizations/{org_id}"),
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["caller_role"], "MEMBER");

    let outsider = format!("user:{}:secret", Uuid::new_v4());
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/organizations/{org_id}"),
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Members may read but not delete.
    let (_, evidence) = send(
        &app,
        Method::POST,
        &format!("/api/organizations/{org_id}/evidence"),
        Some(&member_token),
        Some(json!({ "title": "Access policy", "evidence_type": "POLICY" })),
    )
    .await;
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/organizations/{org_id}/evidence/{}", id_of(&evidence)),
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// -- Framework Catalogue ------------------------------------------------------

#[tokio::test]
async fn test_duplicate_framework_is_conflict() {
    let app = test_app();
    let body = json!({ "name": "GDPR", "version": "2016/679", "framework_type": "REGULATORY" });
    let (status, _) = post(&app, "/api/admin/frameworks", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, err) = post(&app, "/api/admin/frameworks", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "CONFLICT");

    let (status, page) = get(&app, "/api/admin/frameworks?search=gdpr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_blank_framework_name_is_bad_request() {
    let app = test_app();
    let (status, _) = post(
        &app,
        "/api/admin/frameworks",
        json!({ "name": "  ", "version": "1", "framework_type": "CUSTOM" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mapping_to_self_is_rejected() {
    let app = test_app();
    let (_, framework) = post(
        &app,
        "/api/admin/frameworks",
        json!({ "name": "HIPAA", "version": "2013", "framework_type": "REGULATORY" }),
    )
    .await;
    let id = id_of(&framework);
    let (status, _) = post(
        &app,
        &format!("/api/admin/frameworks/{id}/mappings"),
        json!({
            "source_reference": "164.312(a)",
            "target_framework_id": id,
            "target_reference": "164.312(b)",
            "relationship": "EQUIVALENT",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_framework_with_controls_cannot_be_deleted() {
    let app = test_app();
    let (_, framework) = post(
        &app,
        "/api/admin/frameworks",
        json!({ "name": "PCI DSS", "version": "4.0", "framework_type": "INDUSTRY" }),
    )
    .await;
    let framework_id = id_of(&framework);
    let org_id = create_org(&app, "Vandelay Industries").await;
    let (status, control) = post(
        &app,
        &format!("/api/organizations/{org_id}/controls"),
        json!({
            "framework_id": framework_id,
            "reference": "PCI-3.5",
            "title": "Protect stored cardholder data",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let framework_uri = format!("/api/admin/frameworks/{framework_id}");

    assert_eq!(delete(&app, &framework_uri).await, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, &framework_uri).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        delete(
            &app,
            &format!("/api/organizations/{org_id}/controls/{}", id_of(&control))
        )
        .await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(delete(&app, &framework_uri).await, StatusCode::NO_CONTENT);
    let (status, _) = get(&app, &framework_uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Compliance Structure -----------------------------------------------------

#[tokio::test]
async fn test_topics_append_in_order() {
    let app = test_app();
    let (_, framework) = post(
        &app,
        "/api/admin/compliance",
        json!({ "name": "NIST CSF", "version": "2.0" }),
    )
    .await;
    let id = id_of(&framework);
    let (_, first) = post(
        &app,
        &format!("/api/admin/compliance/{id}/topics"),
        json!({ "name": "Identify" }),
    )
    .await;
    let (_, second) = post(
        &app,
        &format!("/api/admin/compliance/{id}/topics"),
        json!({ "name": "Protect" }),
    )
    .await;
    assert_eq!(first["order_index"], 1);
    assert_eq!(second["order_index"], 2);

    let (status, tree) = get(&app, &format!("/api/admin/compliance/{id}/tree")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree["topics"][0]["name"], "Identify");
    assert_eq!(tree["topics"][1]["name"], "Protect");
}

#[tokio::test]
async fn test_duplicate_clause_reference_is_conflict() {
    let app = test_app();
    let (framework_id, _) = seed_compliance_framework(&app, 1).await;
    let (_, tree) = get(&app, &format!("/api/admin/compliance/{framework_id}/tree")).await;
    let component_id = tree["topics"][0]["components"][0]["id"].as_str().unwrap();
    let (status, _) = post(
        &app,
        &format!("/api/admin/components/{component_id}/clauses"),
        json!({ "reference": "CC6.1", "title": "Again" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_selected_framework_cannot_be_deleted() {
    let app = test_app();
    let (framework_id, _) = seed_compliance_framework(&app, 1).await;
    let org_id = create_org(&app, "Globex").await;
    let (status, _) = post(
        &app,
        &format!("/api/organizations/{org_id}/selections"),
        json!({ "framework_id": framework_id }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/admin/compliance/{framework_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_topic_and_component_with_children_cannot_be_deleted() {
    let app = test_app();
    let (framework_id, clauses) = seed_compliance_framework(&app, 1).await;
    let (_, tree) = get(&app, &format!("/api/admin/compliance/{framework_id}/tree")).await;
    let topic_id = tree["topics"][0]["id"].as_str().unwrap().to_string();
    let component_id = tree["topics"][0]["components"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, err) = send(
        &app,
        Method::DELETE,
        &format!("/api/admin/topics/{topic_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "BAD_REQUEST");
    assert_eq!(
        delete(&app, &format!("/api/admin/components/{component_id}")).await,
        StatusCode::BAD_REQUEST
    );

    // Children first, then the parents go.
    assert_eq!(
        delete(&app, &format!("/api/admin/clauses/{}", clauses[0])).await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        delete(&app, &format!("/api/admin/components/{component_id}")).await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        delete(&app, &format!("/api/admin/topics/{topic_id}")).await,
        StatusCode::NO_CONTENT
    );

    let (_, tree) = get(&app, &format!("/api/admin/compliance/{framework_id}/tree")).await;
    assert!(tree["topics"].as_array().unwrap().is_empty());
}

// -- Selections ---------------------------------------------------------------

#[tokio::test]
async fn test_bulk_selection_skips_existing_clauses() {
    let app = test_app();
    let (framework_id, clauses) = seed_compliance_framework(&app, 3).await;
    let org_id = create_org(&app, "Initech").await;
    let uri = format!("/api/organizations/{org_id}/selections/bulk");

    let (status, first) = post(
        &app,
        &uri,
        json!({ "framework_id": framework_id, "clause_ids": [clauses[0], clauses[1]] }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["created"].as_array().unwrap().len(), 2);

    let (_, second) = post(
        &app,
        &uri,
        json!({ "framework_id": framework_id, "clause_ids": clauses }),
    )
    .await;
    assert_eq!(second["created"].as_array().unwrap().len(), 1);
    assert_eq!(second["skipped"].as_array().unwrap().len(), 2);

    let (status, _) = post(
        &app,
        &uri,
        json!({ "framework_id": framework_id, "clause_ids": [Uuid::new_v4()] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -- Evidence & Submissions ---------------------------------------------------

#[tokio::test]
async fn test_resubmission_creates_new_latest_version() {
    let app = test_app();
    let (_, clauses) = seed_compliance_framework(&app, 1).await;
    let org_id = create_org(&app, "Umbrella").await;
    let uri = format!("/api/organizations/{org_id}/submissions");

    let (status, v1) = post(
        &app,
        &uri,
        json!({ "clause_id": clauses[0], "title": "MFA screenshot" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(v1["version"], 1);
    assert_eq!(v1["review_status"], "PENDING");

    let (_, v2) = post(
        &app,
        &uri,
        json!({ "clause_id": clauses[0], "title": "MFA screenshot, all users" }),
    )
    .await;
    assert_eq!(v2["version"], 2);
    assert_eq!(v2["is_latest"], true);

    let (_, old) = get(&app, &format!("{uri}/{}", id_of(&v1))).await;
    assert_eq!(old["is_latest"], false);

    let (_, latest) = get(&app, &format!("{uri}?latest_only=true")).await;
    let latest = latest.as_array().unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0]["id"], v2["id"]);
}

#[tokio::test]
async fn test_submission_review_requires_comments_to_reject() {
    let app = test_app();
    let (_, clauses) = seed_compliance_framework(&app, 1).await;
    let org_id = create_org(&app, "Hooli").await;
    let (_, submission) = post(
        &app,
        &format!("/api/organizations/{org_id}/submissions"),
        json!({ "clause_id": clauses[0], "title": "Access review" }),
    )
    .await;
    let review_uri = format!(
        "/api/organizations/{org_id}/submissions/{}/review",
        id_of(&submission)
    );

    let (status, _) = post(&app, &review_uri, json!({ "decision": "REJECTED" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, reviewed) = post(&app, &review_uri, json!({ "decision": "APPROVED" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["review_status"], "APPROVED");

    let (status, _) = post(&app, &review_uri, json!({ "decision": "APPROVED" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_evidence_with_open_task_cannot_be_deleted() {
    let app = test_app();
    let org_id = create_org(&app, "Stark Industries").await;
    let (status, evidence) = post(
        &app,
        &format!("/api/organizations/{org_id}/evidence"),
        json!({ "title": "Pen test report", "evidence_type": "REPORT" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let evidence_id = id_of(&evidence);

    let (status, task) = post(
        &app,
        &format!("/api/organizations/{org_id}/tasks"),
        json!({ "title": "Renew pen test", "evidence_id": evidence_id }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let task_uri = format!("/api/organizations/{org_id}/tasks/{}", id_of(&task));
    let evidence_uri = format!("/api/organizations/{org_id}/evidence/{evidence_id}");

    let (status, _) = send(&app, Method::DELETE, &evidence_uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, done) = send(
        &app,
        Method::PUT,
        &task_uri,
        None,
        Some(json!({ "status": "DONE" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(done["completed_at"].is_string());

    let (status, _) = send(&app, Method::DELETE, &evidence_uri, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, task) = get(&app, &task_uri).await;
    assert!(task["evidence_id"].is_null());
}

#[tokio::test]
async fn test_expired_evidence_reports_expired_status() {
    let app = test_app();
    let org_id = create_org(&app, "Wayne Enterprises").await;
    let (_, evidence) = post(
        &app,
        &format!("/api/organizations/{org_id}/evidence"),
        json!({
            "title": "ISO certificate",
            "evidence_type": "CERTIFICATE",
            "expires_at": "2001-01-01T00:00:00Z",
        }),
    )
    .await;
    assert_eq!(evidence["status"], "EXPIRED");

    let (_, page) = get(
        &app,
        &format!("/api/organizations/{org_id}/evidence?status=EXPIRED"),
    )
    .await;
    assert_eq!(page["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_huge_expiry_window_is_rejected() {
    let app = test_app();
    let org_id = create_org(&app, "Prestige Worldwide").await;
    let (status, _) = post(
        &app,
        &format!("/api/organizations/{org_id}/evidence"),
        json!({
            "title": "Long-lived certificate",
            "evidence_type": "CERTIFICATE",
            "expires_at": "2999-01-01T00:00:00Z",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/organizations/{org_id}/evidence?expiring_within_days={}", i64::MAX);
    let (status, err) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "VALIDATION_ERROR");

    let (status, page) = get(
        &app,
        &format!("/api/organizations/{org_id}/evidence?expiring_within_days=36500"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 0);
}

// -- Questionnaires -----------------------------------------------------------

async fn create_questionnaire(app: &axum::Router, org_id: &str, text: &str) -> (String, String) {
    let (status, detail) = post(
        app,
        &format!("/api/organizations/{org_id}/questionnaires"),
        json!({
            "title": "Vendor security review",
            "requester": "Big Customer Inc",
            "questions": [{ "section": "Data Protection", "text": text }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let question_id = detail["questions"][0]["id"].as_str().unwrap().to_string();
    (id_of(&detail), question_id)
}

#[tokio::test]
async fn test_answer_workflow() {
    let app = test_app();
    let org_id = create_org(&app, "Cyberdyne").await;
    let (questionnaire_id, question_id) =
        create_questionnaire(&app, &org_id, "Do you encrypt data at rest?").await;
    let answer_uri = format!("/api/organizations/{org_id}/questions/{question_id}/answer");

    let (status, _) = post(&app, &format!("{answer_uri}/submit"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, question) = send(
        &app,
        Method::PUT,
        &answer_uri,
        None,
        Some(json!({ "draft_text": "Yes, AES-256 on all volumes." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(question["answer"]["status"], "DRAFT");

    let (status, question) = post(&app, &format!("{answer_uri}/submit"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(question["answer"]["status"], "SUBMITTED");

    // Locked while under review.
    let (status, _) = send(
        &app,
        Method::PUT,
        &answer_uri,
        None,
        Some(json!({ "draft_text": "Changed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post(
        &app,
        &format!("{answer_uri}/review"),
        json!({ "decision": "REJECTED", "comments": "  " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, question) = post(
        &app,
        &format!("{answer_uri}/review"),
        json!({ "decision": "APPROVED" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(question["answer"]["status"], "APPROVED");
    assert_eq!(question["answer"]["final_text"], "Yes, AES-256 on all volumes.");

    let (_, detail) = get(
        &app,
        &format!("/api/organizations/{org_id}/questionnaires/{questionnaire_id}"),
    )
    .await;
    assert_eq!(detail["progress"]["status"], "COMPLETED");
    assert_eq!(detail["progress"]["approved"], 1);
}

#[tokio::test]
async fn test_questionnaire_from_raw_text() {
    let app = test_app();
    let org_id = create_org(&app, "Soylent").await;
    let (status, detail) = post(
        &app,
        &format!("/api/organizations/{org_id}/questionnaires"),
        json!({
            "title": "SIG Lite",
            "raw_text": "Access Control:\n1. Do you enforce MFA?\n2. Are access reviews performed quarterly?",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let questions = detail["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(detail["progress"]["status"], "NOT_STARTED");

    let (status, _) = post(
        &app,
        &format!("/api/organizations/{org_id}/questionnaires"),
        json!({ "title": "Empty" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_suggestions_rank_matching_entry_first_and_apply_counts_usage() {
    let app = test_app();
    let org_id = create_org(&app, "Tyrell").await;
    let library_uri = format!("/api/organizations/{org_id}/answer-library");

    let (status, encryption) = post(
        &app,
        &library_uri,
        json!({
            "category": "Data Protection",
            "question": "Do you encrypt customer data at rest?",
            "answer": "All customer data is encrypted at rest with AES-256.",
            "key_phrases": ["encrypt", "at rest"],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    post(
        &app,
        &library_uri,
        json!({
            "category": "HR",
            "question": "Do employees complete background checks?",
            "answer": "Yes, before their start date.",
        }),
    )
    .await;

    let (_, question_id) =
        create_questionnaire(&app, &org_id, "Do you encrypt customer data at rest?").await;
    let (status, suggestions) = get(
        &app,
        &format!("/api/organizations/{org_id}/questions/{question_id}/suggestions"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let suggestions = suggestions.as_array().unwrap();
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0]["entry_id"], encryption["id"]);

    let (status, question) = post(
        &app,
        &format!(
            "/api/organizations/{org_id}/questions/{question_id}/suggestions/{}/apply",
            id_of(&encryption)
        ),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(question["answer"]["status"], "DRAFT");
    assert_eq!(question["answer"]["library_entry_id"], encryption["id"]);

    let (_, entry) = get(&app, &format!("{library_uri}/{}", id_of(&encryption))).await;
    assert_eq!(entry["usage_count"], 1);
    assert!(entry["last_used_at"].is_string());
}

#[tokio::test]
async fn test_suggestion_limit_zero_is_rejected() {
    let app = test_app();
    let org_id = create_org(&app, "Oscorp").await;
    let (_, question_id) = create_questionnaire(&app, &org_id, "Do you log access?").await;
    let (status, _) = get(
        &app,
        &format!("/api/organizations/{org_id}/questions/{question_id}/suggestions?limit=0"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -- Reports ------------------------------------------------------------------

#[tokio::test]
async fn test_compliance_report_requires_selection() {
    let app = test_app();
    let (framework_id, clauses) = seed_compliance_framework(&app, 2).await;
    let org_id = create_org(&app, "Massive Dynamic").await;
    let report_uri =
        format!("/api/organizations/{org_id}/reports/compliance?framework_id={framework_id}");

    let (status, _) = get(&app, &report_uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    post(
        &app,
        &format!("/api/organizations/{org_id}/selections"),
        json!({ "framework_id": framework_id }),
    )
    .await;
    let (_, submission) = post(
        &app,
        &format!("/api/organizations/{org_id}/submissions"),
        json!({ "clause_id": clauses[0], "title": "Policy" }),
    )
    .await;
    post(
        &app,
        &format!(
            "/api/organizations/{org_id}/submissions/{}/review",
            id_of(&submission)
        ),
        json!({ "decision": "APPROVED" }),
    )
    .await;

    let (status, report) = get(&app, &report_uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["framework_name"], "SOC 2");
    assert_eq!(report["topics"][0]["components"][0]["clauses"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_dashboard_and_activity_log() {
    let app = test_app();
    let org_id = create_org(&app, "Aperture").await;
    post(
        &app,
        &format!("/api/organizations/{org_id}/tasks"),
        json!({ "title": "Collect SOC report", "due_date": "2001-01-01T00:00:00Z" }),
    )
    .await;

    let (status, dashboard) = get(&app, &format!("/api/organizations/{org_id}/dashboard")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["tasks"]["open"], 1);
    assert_eq!(dashboard["tasks"]["overdue"], 1);

    let (status, activity) = get(&app, &format!("/api/organizations/{org_id}/activity")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(activity["pagination"]["total"].as_u64().unwrap() >= 2);

    let (status, integrity) = get(&app, "/api/admin/audit/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(integrity["chain_valid"], true);
}

// -- OpenAPI ------------------------------------------------------------------

#[tokio::test]
async fn test_openapi_json_served() {
    let app = test_app();
    let (status, spec) = get(&app, "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(spec["info"]["title"], "Comply API");
    assert!(spec["paths"]["/api/organizations/{org_id}/controls"].is_object());
}
