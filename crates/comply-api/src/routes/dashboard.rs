//! # Dashboard, Reports & Activity
//!
//! Read-only views computed from the stores on each request: the
//! organization dashboard, the per-framework compliance coverage report,
//! the activity log, and the platform-level audit and metrics endpoints.

use std::collections::HashMap;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use comply_core::evidence::expires_within;
use comply_core::task::is_overdue;
use comply_core::{
    ClauseCoverage, ControlTally, CoverageTally, EvidenceStatus, OrgRole,
    QuestionnaireProgress, QuestionnaireStatus, ReviewStatus, TaskStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::ChainIntegrity;
use crate::auth::{require_org_role, require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_query, paginate, Paginated};
use crate::middleware::metrics::{ApiMetrics, MetricsSnapshot};
use crate::records::{AuditEventRecord, ClauseRecord, SelectionRecord, SubmissionRecord};
use crate::state::AppState;

/// Window for the "expiring soon" evidence count.
const EXPIRY_WARNING_DAYS: i64 = 30;

// -- Response types -----------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ControlSummary {
    pub total: usize,
    pub met: usize,
    pub partial: usize,
    pub gap: usize,
    pub not_applicable: usize,
    /// `(MET + 0.5·PARTIAL) / applicable × 100`; null without applicable controls.
    pub compliance_score: Option<f64>,
}

impl From<ControlTally> for ControlSummary {
    fn from(t: ControlTally) -> Self {
        Self {
            total: t.total(),
            met: t.met,
            partial: t.partial,
            gap: t.gap,
            not_applicable: t.not_applicable,
            compliance_score: t.score(),
        }
    }
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct EvidenceSummary {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    /// Active items expiring within 30 days.
    pub expiring_soon: usize,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct TaskSummary {
    pub open: usize,
    pub overdue: usize,
    pub done: usize,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SubmissionSummary {
    /// Latest submissions awaiting review.
    pub pending_review: usize,
    /// Clauses whose latest submission is approved.
    pub approved: usize,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct QuestionnaireCounts {
    pub total: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub under_review: usize,
    pub completed: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub organization_id: Uuid,
    pub controls: ControlSummary,
    pub evidence: EvidenceSummary,
    pub tasks: TaskSummary,
    pub submissions: SubmissionSummary,
    pub questionnaires: QuestionnaireCounts,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CoverageSummary {
    pub total: usize,
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
    pub needs_revision: usize,
    pub missing: usize,
    /// Percent of selected clauses whose latest submission is approved.
    pub coverage_percent: f64,
}

impl From<CoverageTally> for CoverageSummary {
    fn from(t: CoverageTally) -> Self {
        Self {
            total: t.total,
            approved: t.approved,
            pending: t.pending,
            rejected: t.rejected,
            needs_revision: t.needs_revision,
            missing: t.missing,
            coverage_percent: t.coverage_percent(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportClause {
    pub clause_id: Uuid,
    pub reference: String,
    pub title: String,
    #[schema(value_type = String)]
    pub risk_level: comply_core::RiskLevel,
    pub deadline: Option<DateTime<Utc>>,
    pub owner_id: Option<Uuid>,
    pub latest_submission_id: Option<Uuid>,
    pub latest_version: Option<i32>,
    /// Review status of the latest submission; null when nothing was submitted.
    #[schema(value_type = Option<String>)]
    pub review_status: Option<ReviewStatus>,
    pub covered: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportComponent {
    pub component_id: Uuid,
    pub name: String,
    pub coverage: CoverageSummary,
    pub clauses: Vec<ReportClause>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportTopic {
    pub topic_id: Uuid,
    pub name: String,
    pub coverage: CoverageSummary,
    pub components: Vec<ReportComponent>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComplianceReport {
    pub organization_id: Uuid,
    pub framework_id: Uuid,
    pub framework_name: String,
    pub framework_version: String,
    pub summary: CoverageSummary,
    pub topics: Vec<ReportTopic>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub framework_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub resource_type: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// -- Router -------------------------------------------------------------------

/// Build the dashboard, report and activity router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/organizations/:org_id/dashboard", get(get_dashboard))
        .route(
            "/api/organizations/:org_id/reports/compliance",
            get(compliance_report),
        )
        .route("/api/organizations/:org_id/activity", get(list_activity))
        .route("/api/admin/audit/verify", get(verify_audit_chain))
        .route("/api/admin/metrics", get(get_metrics))
}

// -- Dashboard ----------------------------------------------------------------

/// GET /api/organizations/:org_id/dashboard: Organization compliance overview.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/dashboard",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Dashboard", body = Dashboard),
        (status = 403, description = "Not a member", body = crate::error::ErrorBody),
    ),
    tag = "reports"
)]
async fn get_dashboard(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Dashboard>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    Ok(Json(build_dashboard(&state, org_id, Utc::now())))
}

pub(crate) fn build_dashboard(state: &AppState, org_id: Uuid, now: DateTime<Utc>) -> Dashboard {
    let controls = ControlTally::from_statuses(
        state
            .controls
            .filter(|c| c.organization_id == org_id)
            .into_iter()
            .map(|c| c.status),
    );

    let mut evidence = EvidenceSummary::default();
    for item in state.evidence.filter(|e| e.organization_id == org_id) {
        evidence.total += 1;
        match item.status.effective(item.expires_at, now) {
            EvidenceStatus::Active => {
                evidence.active += 1;
                if expires_within(item.expires_at, now, EXPIRY_WARNING_DAYS) {
                    evidence.expiring_soon += 1;
                }
            }
            EvidenceStatus::Expired => evidence.expired += 1,
            EvidenceStatus::Draft | EvidenceStatus::Archived => {}
        }
    }

    let mut tasks = TaskSummary::default();
    for task in state.tasks.filter(|t| t.organization_id == org_id) {
        if task.status.is_open() {
            tasks.open += 1;
        }
        if is_overdue(task.status, task.due_date, now) {
            tasks.overdue += 1;
        }
        if task.status == TaskStatus::Done {
            tasks.done += 1;
        }
    }

    let mut submissions = SubmissionSummary::default();
    for submission in state
        .submissions
        .filter(|s| s.organization_id == org_id && s.is_latest)
    {
        match submission.review_status {
            ReviewStatus::Pending => submissions.pending_review += 1,
            ReviewStatus::Approved => submissions.approved += 1,
            ReviewStatus::Rejected | ReviewStatus::NeedsRevision => {}
        }
    }

    let mut questionnaires = QuestionnaireCounts::default();
    {
        let stored = state.questionnaires.read();
        let questions = state.questions.read();
        for questionnaire in stored.values().filter(|q| q.organization_id == org_id) {
            let progress = QuestionnaireProgress::from_answers(
                questions
                    .values()
                    .filter(|q| q.questionnaire_id == questionnaire.id)
                    .map(|q| q.answer.as_ref().map(|a| a.status)),
            );
            questionnaires.total += 1;
            match progress.status() {
                QuestionnaireStatus::NotStarted => questionnaires.not_started += 1,
                QuestionnaireStatus::InProgress => questionnaires.in_progress += 1,
                QuestionnaireStatus::UnderReview => questionnaires.under_review += 1,
                QuestionnaireStatus::Completed => questionnaires.completed += 1,
            }
        }
    }

    Dashboard {
        organization_id: org_id,
        controls: controls.into(),
        evidence,
        tasks,
        submissions,
        questionnaires,
        generated_at: now,
    }
}

// -- Compliance report --------------------------------------------------------

/// GET /api/organizations/:org_id/reports/compliance: Clause coverage for one framework.
///
/// Covers the clauses the organization selected. A framework-level
/// selection without any clause selections covers every clause of the
/// framework.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/reports/compliance",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("framework_id" = Uuid, Query, description = "Compliance framework ID"),
    ),
    responses(
        (status = 200, description = "Coverage report grouped by topic and component", body = ComplianceReport),
        (status = 400, description = "Framework not selected by the organization", body = crate::error::ErrorBody),
        (status = 404, description = "Framework not found", body = crate::error::ErrorBody),
    ),
    tag = "reports"
)]
async fn compliance_report(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Json<ComplianceReport>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;
    let framework = state
        .compliance_frameworks
        .get(&query.framework_id)
        .ok_or_else(|| AppError::not_found("compliance framework", query.framework_id))?;

    let selections = state
        .selections
        .filter(|s| s.organization_id == org_id && s.framework_id == framework.id);
    if selections.is_empty() {
        return Err(AppError::BadRequest(format!(
            "organization has not selected compliance framework {}",
            framework.id
        )));
    }

    let mut topics = state.topics.filter(|t| t.framework_id == framework.id);
    topics.sort_by_key(|t| t.order_index);
    let mut components = state.components.filter(|c| c.framework_id == framework.id);
    components.sort_by_key(|c| c.order_index);
    let mut clauses = state.clauses.filter(|c| c.framework_id == framework.id);
    clauses.sort_by_key(|c| c.order_index);
    let latest: HashMap<Uuid, SubmissionRecord> = state
        .submissions
        .filter(|s| s.organization_id == org_id && s.is_latest)
        .into_iter()
        .map(|s| (s.clause_id, s))
        .collect();

    let selected = selected_clauses(&selections, &clauses);

    let mut all_coverage = Vec::new();
    let mut report_topics = Vec::new();
    for topic in &topics {
        let mut topic_coverage = Vec::new();
        let mut report_components = Vec::new();
        for component in components.iter().filter(|c| c.topic_id == topic.id) {
            let mut component_coverage = Vec::new();
            let mut report_clauses = Vec::new();
            for clause in clauses.iter().filter(|c| c.component_id == component.id) {
                let Some(selection) = selected.get(&clause.id) else {
                    continue;
                };
                let submission = latest.get(&clause.id);
                let coverage = ClauseCoverage {
                    clause_id: clause.id,
                    latest: submission.map(|s| s.review_status),
                };
                component_coverage.push(coverage);
                report_clauses.push(ReportClause {
                    clause_id: clause.id,
                    reference: clause.reference.clone(),
                    title: clause.title.clone(),
                    risk_level: clause.risk_level,
                    deadline: selection.deadline,
                    owner_id: selection.owner_id,
                    latest_submission_id: submission.map(|s| s.id),
                    latest_version: submission.map(|s| s.version),
                    review_status: coverage.latest,
                    covered: coverage.is_covered(),
                });
            }
            if report_clauses.is_empty() {
                continue;
            }
            report_components.push(ReportComponent {
                component_id: component.id,
                name: component.name.clone(),
                coverage: CoverageTally::from_clauses(&component_coverage).into(),
                clauses: report_clauses,
            });
            topic_coverage.extend(component_coverage);
        }
        if report_components.is_empty() {
            continue;
        }
        report_topics.push(ReportTopic {
            topic_id: topic.id,
            name: topic.name.clone(),
            coverage: CoverageTally::from_clauses(&topic_coverage).into(),
            components: report_components,
        });
        all_coverage.extend(topic_coverage);
    }

    Ok(Json(ComplianceReport {
        organization_id: org_id,
        framework_id: framework.id,
        framework_name: framework.name,
        framework_version: framework.version,
        summary: CoverageTally::from_clauses(&all_coverage).into(),
        topics: report_topics,
        generated_at: Utc::now(),
    }))
}

/// Per-clause deadline and owner for the clauses in scope.
struct ClauseScope {
    deadline: Option<DateTime<Utc>>,
    owner_id: Option<Uuid>,
}

fn selected_clauses(
    selections: &[SelectionRecord],
    clauses: &[ClauseRecord],
) -> HashMap<Uuid, ClauseScope> {
    let clause_level: HashMap<Uuid, ClauseScope> = selections
        .iter()
        .filter_map(|s| {
            s.clause_id.map(|id| {
                (
                    id,
                    ClauseScope {
                        deadline: s.deadline,
                        owner_id: s.owner_id,
                    },
                )
            })
        })
        .collect();
    if !clause_level.is_empty() {
        return clause_level;
    }

    let framework_level = selections.iter().find(|s| s.clause_id.is_none());
    clauses
        .iter()
        .map(|c| {
            (
                c.id,
                ClauseScope {
                    deadline: framework_level.and_then(|s| s.deadline),
                    owner_id: framework_level.and_then(|s| s.owner_id),
                },
            )
        })
        .collect()
}

// -- Activity & platform ------------------------------------------------------

/// GET /api/organizations/:org_id/activity: Audit events for an organization.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}/activity",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("resource_type" = Option<String>, Query, description = "Resource type filter, e.g. control"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Page size (default 20, max 100)"),
    ),
    responses((status = 200, description = "Page of audit events, newest first")),
    tag = "reports"
)]
async fn list_activity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> Result<Json<Paginated<AuditEventRecord>>, AppError> {
    require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let query = extract_query(query)?;

    let events: Vec<AuditEventRecord> = state
        .audit
        .for_organization(org_id)
        .into_iter()
        .filter(|e| {
            query
                .resource_type
                .as_deref()
                .map_or(true, |r| e.resource_type == r)
        })
        .collect();
    Ok(Json(paginate(events, query.page, query.limit)?))
}

/// GET /api/admin/audit/verify: Check the audit hash chain.
#[utoipa::path(
    get,
    path = "/api/admin/audit/verify",
    responses(
        (status = 200, description = "Chain integrity", body = ChainIntegrity),
        (status = 403, description = "PLATFORM_ADMIN required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn verify_audit_chain(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ChainIntegrity>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let integrity = state.audit.verify();
    if !integrity.chain_valid {
        tracing::warn!(
            broken_links = integrity.broken_links,
            total_events = integrity.total_events,
            "audit chain verification failed"
        );
    }
    Ok(Json(integrity))
}

/// GET /api/admin/metrics: Request counters.
#[utoipa::path(
    get,
    path = "/api/admin/metrics",
    responses(
        (status = 200, description = "Counter snapshot", body = MetricsSnapshot),
        (status = 403, description = "PLATFORM_ADMIN required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn get_metrics(
    caller: CallerIdentity,
    Extension(metrics): Extension<ApiMetrics>,
) -> Result<Json<MetricsSnapshot>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    Ok(Json(metrics.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(clause_id: Option<Uuid>, owner_id: Option<Uuid>) -> SelectionRecord {
        let now = Utc::now();
        SelectionRecord {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            framework_id: Uuid::new_v4(),
            clause_id,
            deadline: None,
            risk_tolerance: None,
            owner_id,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn clause() -> ClauseRecord {
        let now = Utc::now();
        ClauseRecord {
            id: Uuid::new_v4(),
            component_id: Uuid::new_v4(),
            topic_id: Uuid::new_v4(),
            framework_id: Uuid::new_v4(),
            reference: "CC6.1".into(),
            title: "Logical access".into(),
            description: None,
            risk_level: Default::default(),
            evidence_guidance: None,
            testing_guidance: None,
            order_index: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn clause_selections_narrow_the_scope() {
        let (a, b) = (clause(), clause());
        let scope = selected_clauses(
            &[selection(None, None), selection(Some(a.id), None)],
            &[a.clone(), b],
        );
        assert_eq!(scope.len(), 1);
        assert!(scope.contains_key(&a.id));
    }

    #[test]
    fn framework_selection_covers_every_clause() {
        let owner = Uuid::new_v4();
        let clauses = [clause(), clause(), clause()];
        let scope = selected_clauses(&[selection(None, Some(owner))], &clauses);
        assert_eq!(scope.len(), 3);
        assert!(scope.values().all(|s| s.owner_id == Some(owner)));
    }

    #[test]
    fn empty_org_dashboard_has_no_score() {
        let state = AppState::new();
        let dashboard = build_dashboard(&state, Uuid::new_v4(), Utc::now());
        assert_eq!(dashboard.controls.total, 0);
        assert!(dashboard.controls.compliance_score.is_none());
        assert_eq!(dashboard.questionnaires.total, 0);
    }
}
