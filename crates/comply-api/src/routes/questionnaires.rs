//! # Questionnaires API
//!
//! Customer security questionnaires, broken down into ordered questions,
//! and the answer workflow on each question:
//!
//! ```text
//!  (none) ──save──▶ DRAFT ──submit──▶ SUBMITTED ──review──▶ APPROVED
//!                     ▲                                 │
//!                     └───────────save─── REJECTED ◀────┘
//! ```
//!
//! Drafts can be seeded from the answer library: suggestions rank active
//! library entries of the organization against the question text, and
//! applying one copies its answer into the draft.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use comply_core::library::{
    DEFAULT_MIN_CONFIDENCE, DEFAULT_SUGGESTION_LIMIT, MAX_SUGGESTION_LIMIT,
};
use comply_core::validate::{self, MAX_LONG_TEXT, MAX_SHORT_TEXT};
use comply_core::{
    decompose, rank_suggestions, score_match, AnswerDecision, AnswerStatus, OrgRole,
    QuestionnaireProgress, ScoredEntry, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::auth::{require_org_role, CallerIdentity};
use crate::db::{self, persist_error};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::records::{AnswerRecord, QuestionRecord, QuestionnaireRecord};
use crate::state::AppState;

use super::org_scoped;

/// Largest number of questions one questionnaire may hold.
const MAX_QUESTIONS: usize = 2000;

// -- Request / response types -------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuestionInput {
    pub section: Option<String>,
    pub text: String,
}

/// Create a questionnaire from explicit questions, raw text, or both.
/// Explicit questions come first, followed by those parsed from `raw_text`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateQuestionnaireRequest {
    pub title: String,
    pub requester: Option<String>,
    pub description: Option<String>,
    pub file_name: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub questions: Vec<QuestionInput>,
    /// Plain questionnaire text; section headings, numbering and bullets
    /// are recognised.
    pub raw_text: Option<String>,
}

impl Validate for CreateQuestionnaireRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("title", &self.title, MAX_SHORT_TEXT)?;
        validate::optional("requester", self.requester.as_deref(), MAX_SHORT_TEXT)?;
        validate::optional("description", self.description.as_deref(), MAX_LONG_TEXT)?;
        validate::optional("file_name", self.file_name.as_deref(), MAX_SHORT_TEXT)?;
        for question in &self.questions {
            validate::required("questions.text", &question.text, MAX_LONG_TEXT)?;
            validate::optional("questions.section", question.section.as_deref(), MAX_SHORT_TEXT)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveAnswerRequest {
    pub draft_text: String,
}

impl Validate for SaveAnswerRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::bounded("draft_text", &self.draft_text, MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewAnswerRequest {
    /// APPROVED or REJECTED.
    #[schema(value_type = String)]
    pub decision: AnswerDecision,
    /// Required when rejecting.
    pub comments: Option<String>,
}

impl Validate for ReviewAnswerRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::optional("comments", self.comments.as_deref(), MAX_LONG_TEXT)
    }
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub limit: Option<usize>,
    pub min_confidence: Option<f64>,
}

/// Answer-state counts for one questionnaire.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProgressView {
    pub total: usize,
    pub unanswered: usize,
    pub draft: usize,
    pub submitted: usize,
    pub approved: usize,
    pub rejected: usize,
    pub completion_percent: f64,
    pub approval_percent: f64,
    /// NOT_STARTED, IN_PROGRESS, UNDER_REVIEW or COMPLETED.
    #[schema(value_type = String)]
    pub status: comply_core::QuestionnaireStatus,
}

impl From<QuestionnaireProgress> for ProgressView {
    fn from(p: QuestionnaireProgress) -> Self {
        Self {
            total: p.total,
            unanswered: p.unanswered,
            draft: p.draft,
            submitted: p.submitted,
            approved: p.approved,
            rejected: p.rejected,
            completion_percent: p.completion_percent(),
            approval_percent: p.approval_percent(),
            status: p.status(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionnaireSummary {
    #[serde(flatten)]
    pub questionnaire: QuestionnaireRecord,
    pub progress: ProgressView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionnaireDetail {
    #[serde(flatten)]
    pub questionnaire: QuestionnaireRecord,
    pub progress: ProgressView,
    pub questions: Vec<QuestionRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionnaireAnalytics {
    pub questionnaire_id: Uuid,
    #[serde(flatten)]
    pub progress: ProgressView,
    /// Questions per section heading; unsectioned questions are omitted.
    pub sections: Vec<SectionCount>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SectionCount {
    pub section: String,
    pub questions: usize,
    pub approved: usize,
}

/// A library entry proposed as the answer to a question.
#[derive(Debug, Serialize, ToSchema)]
pub struct Suggestion {
    pub entry_id: Uuid,
    pub category: Option<String>,
    pub question: String,
    pub answer: String,
    /// Match strength times the entry's confidence score.
    pub confidence: f64,
    pub usage_count: i64,
}

// -- Router -------------------------------------------------------------------

/// Build the questionnaires router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations/:org_id/questionnaires",
            get(list_questionnaires).post(create_questionnaire),
        )
        .route(
            "/api/organizations/:org_id/questionnaires/:id",
            get(get_questionnaire).delete(delete_questionnaire),
        )
        .route(
            "/api/organizations/:org_id/questionnaires/:id/analytics",
            get(questionnaire_analytics),
        )
        .route(
            "/api/organizations/:org_id/questions/:id/answer",
            put(save_answer),
        )
        .route(
            "/api/organizations/:org_id/questions/:id/answer/submit",
            post(submit_answer),
        )
        .route(
            "/api/organizations/:org_id/questions/:id/answer/review",
            post(review_answer),
        )
        .route(
            "/api/organizations/:org_id/questions/:id/suggestions",
            get(suggest_answers),
        )
        .route(
            "/api/organizations/:org_id/questions/:id/suggestions/:entry_id/apply",
            post(apply_suggestion),
        )
}

fn progress_of<'a>(questions: impl IntoIterator<Item = &'a QuestionRecord>) -> QuestionnaireProgress {
    QuestionnaireProgress::from_answers(
        questions
            .into_iter()
            .map(|q| q.answer.as_ref().map(|a| a.status)),
    )
}

fn ordered_questions(state: &AppState, questionnaire_id: Uuid) -> Vec<QuestionRecord> {
    let mut questions = state
        .questions
        .filter(|q| q.questionnaire_id == questionnaire_id);
    questions.sort_by_key(|q| q.order_index);
    questions
}

/// Build question records from explicit input followed by parsed raw text.
fn build_questions(
    questionnaire_id: Uuid,
    organization_id: Uuid,
    explicit: Vec<QuestionInput>,
    raw_text: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<QuestionRecord>, ValidationError> {
    let parsed = raw_text.map(decompose).unwrap_or_default();
    for question in &parsed {
        validate::bounded("raw_text question", &question.text, MAX_LONG_TEXT)?;
    }

    let inputs = explicit
        .into_iter()
        .map(|q| (q.section, q.text.trim().to_string()))
        .chain(parsed.into_iter().map(|q| (q.section, q.text)));

    let questions: Vec<QuestionRecord> = inputs
        .enumerate()
        .map(|(i, (section, text))| QuestionRecord {
            id: Uuid::new_v4(),
            questionnaire_id,
            organization_id,
            order_index: i as i32 + 1,
            section: section.filter(|s| !s.trim().is_empty()),
            text,
            answer: None,
            created_at: now,
            updated_at: now,
        })
        .collect();

    if questions.is_empty() {
        return Err(ValidationError::Invalid {
            field: "questions",
            reason: "at least one question is required".into(),
        });
    }
    if questions.len() > MAX_QUESTIONS {
        return Err(ValidationError::Invalid {
            field: "questions",
            reason: format!("at most {MAX_QUESTIONS} questions are allowed"),
        });
    }
    Ok(questions)
}

// -- Questionnaires -----------------------------------------------------------

/// GET /api/organizations/:org_id/questionnaires: List questionnaires with progress.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/questionnaires",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses((status = 200, description = "Questionnaires, newest first", body = Vec<QuestionnaireSummary>)),
    tag = "questionnaires"
)]
async fn list_questionnaires(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<QuestionnaireSummary>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;

    let mut questionnaires = state
        .questionnaires
        .filter(|q| q.organization_id == org_id);
    questionnaires.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let questions = state.questions.read();
    let summaries = questionnaires
        .into_iter()
        .map(|questionnaire| {
            let progress = progress_of(
                questions
                    .values()
                    .filter(|q| q.questionnaire_id == questionnaire.id),
            );
            QuestionnaireSummary {
                questionnaire,
                progress: progress.into(),
            }
        })
        .collect();
    Ok(Json(summaries))
}

/// POST /api/organizations/:org_id/questionnaires: Create a questionnaire.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/questionnaires",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateQuestionnaireRequest,
    responses(
        (status = 201, description = "Questionnaire with its questions", body = QuestionnaireDetail),
        (status = 400, description = "Validation error or no questions", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn create_questionnaire(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<CreateQuestionnaireRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<QuestionnaireDetail>), AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let record = QuestionnaireRecord {
        id: Uuid::new_v4(),
        organization_id: org_id,
        title: req.title.trim().to_string(),
        requester: req.requester,
        description: req.description,
        file_name: req.file_name,
        due_date: req.due_date,
        created_by: caller.user_id,
        created_at: now,
        updated_at: now,
    };
    let questions = build_questions(record.id, org_id, req.questions, req.raw_text.as_deref(), now)?;

    if let Some(pool) = &state.db_pool {
        db::questionnaires::insert_with_questions(pool, &record, &questions)
            .await
            .map_err(|e| persist_error("questionnaire", record.id, e))?;
    }
    {
        let mut questionnaires = state.questionnaires.write();
        let mut stored = state.questions.write();
        questionnaires.insert(record.id, record.clone());
        for question in &questions {
            stored.insert(question.id, question.clone());
        }
    }

    tracing::info!(
        questionnaire_id = %record.id,
        questions = questions.len(),
        "questionnaire created"
    );
    audit::record(
        &state,
        &caller,
        AuditEntry::new("questionnaire", record.id, "created")
            .in_org(org_id)
            .with_metadata(json!({ "title": record.title, "questions": questions.len() })),
    )
    .await?;

    let progress = progress_of(&questions).into();
    Ok((
        StatusCode::CREATED,
        Json(QuestionnaireDetail {
            questionnaire: record,
            progress,
            questions,
        }),
    ))
}

/// GET /api/organizations/:org_id/questionnaires/:id: Questionnaire with ordered questions.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/questionnaires/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Questionnaire ID"),
    ),
    responses(
        (status = 200, description = "Questionnaire", body = QuestionnaireDetail),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn get_questionnaire(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<QuestionnaireDetail>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let questionnaire =
        org_scoped(&state.questionnaires, "questionnaire", id, org_id, |q| q.organization_id)?;
    let questions = ordered_questions(&state, id);
    let progress = progress_of(&questions).into();
    Ok(Json(QuestionnaireDetail {
        questionnaire,
        progress,
        questions,
    }))
}

/// DELETE /api/organizations/:org_id/questionnaires/:id: Delete a questionnaire and its questions.
#[utoipa::path(
    delete,
    path = "/api/organizations/{org_id}/questionnaires/{id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Questionnaire ID"),
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Organization ADMIN required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn delete_questionnaire(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;

    let removed_questions = {
        let mut questionnaires = state.questionnaires.write();
        let mut questions = state.questions.write();
        match questionnaires.get(&id) {
            Some(q) if q.organization_id == org_id => {}
            _ => return Err(AppError::not_found("questionnaire", id)),
        }
        questionnaires.remove(&id);
        let before = questions.len();
        questions.retain(|_, q| q.questionnaire_id != id);
        before - questions.len()
    };

    if let Some(pool) = &state.db_pool {
        db::questionnaires::delete(pool, id)
            .await
            .map_err(|e| persist_error("questionnaire", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("questionnaire", id, "deleted")
            .in_org(org_id)
            .with_metadata(json!({ "questions": removed_questions })),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/organizations/:org_id/questionnaires/:id/analytics: Answer progress.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/questionnaires/{id}/analytics",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Questionnaire ID"),
    ),
    responses(
        (status = 200, description = "Counts, percentages and derived status", body = QuestionnaireAnalytics),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn questionnaire_analytics(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<QuestionnaireAnalytics>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    org_scoped(&state.questionnaires, "questionnaire", id, org_id, |q| q.organization_id)?;
    let questions = ordered_questions(&state, id);

    let mut sections: Vec<SectionCount> = Vec::new();
    for question in &questions {
        let Some(name) = &question.section else {
            continue;
        };
        let approved = question
            .answer
            .as_ref()
            .is_some_and(|a| a.status == AnswerStatus::Approved);
        match sections.iter_mut().find(|s| &s.section == name) {
            Some(section) => {
                section.questions += 1;
                section.approved += usize::from(approved);
            }
            None => sections.push(SectionCount {
                section: name.clone(),
                questions: 1,
                approved: usize::from(approved),
            }),
        }
    }

    Ok(Json(QuestionnaireAnalytics {
        questionnaire_id: id,
        progress: progress_of(&questions).into(),
        sections,
    }))
}

// -- Answers ------------------------------------------------------------------

/// Run `f` on a question of `org_id` under the questions write lock, then
/// persist the result.
async fn update_question(
    state: &AppState,
    org_id: Uuid,
    id: Uuid,
    f: impl FnOnce(&mut QuestionRecord) -> Result<(), AppError>,
) -> Result<QuestionRecord, AppError> {
    let updated = state
        .questions
        .try_update(&id, |q| {
            if q.organization_id != org_id {
                return Err(AppError::not_found("question", id));
            }
            f(q)?;
            q.updated_at = Utc::now();
            Ok(q.clone())
        })
        .ok_or_else(|| AppError::not_found("question", id))??;

    if let Some(pool) = &state.db_pool {
        db::questionnaires::update_question(pool, &updated)
            .await
            .map_err(|e| persist_error("question", id, e))?;
    }
    Ok(updated)
}

/// Overwrite the draft of `question`, creating the answer if needed.
///
/// `library_entry_id` names the entry the text was copied from; a hand-written
/// draft passes `None` and drops any earlier attribution.
fn write_draft(
    question: &mut QuestionRecord,
    text: String,
    library_entry_id: Option<Uuid>,
    author_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    AnswerStatus::ensure_editable(question.answer.as_ref().map(|a| a.status))?;
    match &mut question.answer {
        Some(answer) => {
            answer.draft_text = text;
            answer.status = AnswerStatus::Draft;
            answer.library_entry_id = library_entry_id;
            answer.author_id = author_id;
            answer.submitted_at = None;
            answer.updated_at = now;
        }
        None => {
            question.answer = Some(AnswerRecord {
                draft_text: text,
                final_text: None,
                status: AnswerStatus::Draft,
                library_entry_id,
                author_id,
                submitted_at: None,
                reviewer_id: None,
                reviewed_at: None,
                review_comments: None,
                updated_at: now,
            });
        }
    }
    Ok(())
}

/// PUT /api/organizations/:org_id/questions/:id/answer: Save a draft answer.
#[utoipa::path(
    put,
    path = "/api/organizations/{org_id}/questions/{id}/answer",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Question ID"),
    ),
    request_body = SaveAnswerRequest,
    responses(
        (status = 200, description = "Question with the saved draft", body = QuestionRecord),
        (status = 409, description = "Answer is submitted or approved", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn save_answer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    body: Result<Json<SaveAnswerRequest>, JsonRejection>,
) -> Result<Json<QuestionRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let req = extract_validated_json(body)?;

    let question = update_question(&state, org_id, id, |q| {
        write_draft(q, req.draft_text, None, caller.user_id, Utc::now())
    })
    .await?;

    audit::record(
        &state,
        &caller,
        AuditEntry::new("question", id, "answer_saved").in_org(org_id),
    )
    .await?;
    Ok(Json(question))
}

/// POST /api/organizations/:org_id/questions/:id/answer/submit: Submit a draft for review.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/questions/{id}/answer/submit",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Question ID"),
    ),
    responses(
        (status = 200, description = "Question with the submitted answer", body = QuestionRecord),
        (status = 409, description = "No draft to submit", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn submit_answer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<QuestionRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;

    let question = update_question(&state, org_id, id, |q| {
        let answer = q
            .answer
            .as_mut()
            .ok_or_else(|| AppError::Conflict(format!("question {id} has no answer to submit")))?;
        answer.status = answer.status.submit(&answer.draft_text)?;
        let now = Utc::now();
        answer.submitted_at = Some(now);
        answer.updated_at = now;
        Ok(())
    })
    .await?;

    audit::record(
        &state,
        &caller,
        AuditEntry::new("question", id, "answer_submitted").in_org(org_id),
    )
    .await?;
    Ok(Json(question))
}

/// POST /api/organizations/:org_id/questions/:id/answer/review: Approve or reject an answer.
///
/// Approval copies the draft into the final text.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/questions/{id}/answer/review",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Question ID"),
    ),
    request_body = ReviewAnswerRequest,
    responses(
        (status = 200, description = "Question with the reviewed answer", body = QuestionRecord),
        (status = 400, description = "Rejection without comments", body = crate::error::ErrorBody),
        (status = 403, description = "Organization ADMIN required", body = crate::error::ErrorBody),
        (status = 409, description = "Answer is not submitted", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn review_answer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    body: Result<Json<ReviewAnswerRequest>, JsonRejection>,
) -> Result<Json<QuestionRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Admin)?;
    let req = extract_validated_json(body)?;

    let question = update_question(&state, org_id, id, |q| {
        let answer = q
            .answer
            .as_mut()
            .ok_or_else(|| AppError::Conflict(format!("question {id} has no answer to review")))?;
        answer.status = answer
            .status
            .review(req.decision, req.comments.as_deref())?;
        if answer.status == AnswerStatus::Approved {
            answer.final_text = Some(answer.draft_text.clone());
        }
        let now = Utc::now();
        answer.reviewer_id = caller.user_id;
        answer.reviewed_at = Some(now);
        answer.review_comments = req.comments.filter(|c| !c.trim().is_empty());
        answer.updated_at = now;
        Ok(())
    })
    .await?;

    audit::record(
        &state,
        &caller,
        AuditEntry::new("question", id, "answer_reviewed")
            .in_org(org_id)
            .with_metadata(json!({ "decision": req.decision })),
    )
    .await?;
    Ok(Json(question))
}

// -- Suggestions --------------------------------------------------------------

/// GET /api/organizations/:org_id/questions/:id/suggestions: Rank library answers.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/questions/{id}/suggestions",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Question ID"),
        ("limit" = Option<usize>, Query, description = "Maximum suggestions (default 5, max 20)"),
        ("min_confidence" = Option<f64>, Query, description = "Cut-off in [0, 1] (default 0.2)"),
    ),
    responses(
        (status = 200, description = "Suggestions, best first", body = Vec<Suggestion>),
        (status = 404, description = "Question not found", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn suggest_answers(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id)): Path<(Uuid, Uuid)>,
    query: Result<Query<SuggestionsQuery>, QueryRejection>,
) -> Result<Json<Vec<Suggestion>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;
    let min_confidence = query.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
    validate::unit_interval("min_confidence", min_confidence)?;
    let limit = match query.limit {
        Some(0) => return Err(AppError::Validation("limit must be at least 1".into())),
        Some(limit) => limit.min(MAX_SUGGESTION_LIMIT),
        None => DEFAULT_SUGGESTION_LIMIT,
    };

    let question = org_scoped(&state.questions, "question", id, org_id, |q| q.organization_id)?;

    let library = state.library.read();
    let candidates = library
        .values()
        .filter(|e| e.organization_id == org_id && e.is_active)
        .map(|e| ScoredEntry {
            entry_id: e.id,
            confidence: score_match(&question.text, &e.question, &e.key_phrases)
                * e.confidence_score,
            usage_count: e.usage_count,
        });
    let suggestions = rank_suggestions(candidates, min_confidence, limit)
        .into_iter()
        .filter_map(|scored| {
            library.get(&scored.entry_id).map(|e| Suggestion {
                entry_id: e.id,
                category: e.category.clone(),
                question: e.question.clone(),
                answer: e.answer.clone(),
                confidence: scored.confidence,
                usage_count: e.usage_count,
            })
        })
        .collect();
    Ok(Json(suggestions))
}

/// POST /api/organizations/:org_id/questions/:id/suggestions/:entry_id/apply: Use a library answer.
///
/// Copies the entry's answer into the question's draft and counts the use.
#[utoipa::path(
    post,
    path = "/api/organizations/{org_id}/questions/{id}/suggestions/{entry_id}/apply",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("id" = Uuid, Path, description = "Question ID"),
        ("entry_id" = Uuid, Path, description = "Library entry ID"),
    ),
    responses(
        (status = 200, description = "Question with the seeded draft", body = QuestionRecord),
        (status = 400, description = "Library entry is inactive", body = crate::error::ErrorBody),
        (status = 404, description = "Question or entry not found", body = crate::error::ErrorBody),
        (status = 409, description = "Answer is submitted or approved", body = crate::error::ErrorBody),
    ),
    tag = "questionnaires"
)]
async fn apply_suggestion(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, id, entry_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<QuestionRecord>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let now = Utc::now();

    let (question, entry) = {
        let mut questions = state.questions.write();
        let mut library = state.library.write();
        let question = questions
            .get_mut(&id)
            .filter(|q| q.organization_id == org_id)
            .ok_or_else(|| AppError::not_found("question", id))?;
        let entry = library
            .get_mut(&entry_id)
            .filter(|e| e.organization_id == org_id)
            .ok_or_else(|| AppError::not_found("library entry", entry_id))?;
        if !entry.is_active {
            return Err(AppError::BadRequest(format!(
                "library entry {entry_id} is inactive"
            )));
        }

        write_draft(question, entry.answer.clone(), Some(entry_id), caller.user_id, now)?;
        question.updated_at = now;
        entry.usage_count += 1;
        entry.last_used_at = Some(now);
        entry.updated_at = now;
        (question.clone(), entry.clone())
    };

    if let Some(pool) = &state.db_pool {
        db::questionnaires::apply_library_answer(pool, &question, &entry)
            .await
            .map_err(|e| persist_error("question", id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("question", id, "suggestion_applied")
            .in_org(org_id)
            .with_metadata(json!({ "library_entry_id": entry_id, "usage_count": entry.usage_count })),
    )
    .await?;
    Ok(Json(question))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_questions_precede_parsed_ones() {
        let explicit = vec![QuestionInput {
            section: Some("General".into()),
            text: "  Who is your security officer?  ".into(),
        }];
        let raw = "## Encryption\n1. Do you encrypt data at rest?\n2. Do you encrypt backups?";
        let questions =
            build_questions(Uuid::new_v4(), Uuid::new_v4(), explicit, Some(raw), Utc::now())
                .unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].text, "Who is your security officer?");
        assert_eq!(questions[1].section.as_deref(), Some("Encryption"));
        let order: Vec<i32> = questions.iter().map(|q| q.order_index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn empty_questionnaire_is_rejected() {
        let err = build_questions(Uuid::new_v4(), Uuid::new_v4(), Vec::new(), Some("\n\n"), Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("at least one question"));
    }

    fn question(now: DateTime<Utc>) -> QuestionRecord {
        QuestionRecord {
            id: Uuid::new_v4(),
            questionnaire_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            order_index: 1,
            section: None,
            text: "Do you run background checks?".into(),
            answer: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn draft_cannot_overwrite_submitted_answer() {
        let now = Utc::now();
        let mut question = question(now);
        write_draft(&mut question, "Yes".into(), None, None, now).unwrap();
        if let Some(answer) = question.answer.as_mut() {
            answer.status = AnswerStatus::Submitted;
        }
        assert!(matches!(
            write_draft(&mut question, "No".into(), None, None, now),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn hand_written_draft_drops_library_attribution() {
        let now = Utc::now();
        let entry = Uuid::new_v4();
        let mut question = question(now);
        write_draft(&mut question, "Yes, annually.".into(), Some(entry), None, now).unwrap();
        assert_eq!(question.answer.as_ref().and_then(|a| a.library_entry_id), Some(entry));

        write_draft(&mut question, "Yes, at hire only.".into(), None, None, now).unwrap();
        let answer = question.answer.as_ref().unwrap();
        assert_eq!(answer.library_entry_id, None);
        assert_eq!(answer.draft_text, "Yes, at hire only.");
    }
}
