//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Bearer token `{role}:{user_id}:{secret}`. The secret is set via the AUTH_TOKEN env var.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Comply API",
        version = "0.3.0",
        description = "Compliance management service.\n\nProvides:\n- **Framework catalogue** with cross-framework mappings\n- **Compliance frameworks** structured as topics, components and clauses\n- **Organizations** with role-based membership and framework selections\n- **Controls, evidence and tasks** scoped to an organization\n- **Evidence submissions** with versioning and review\n- **Security questionnaires** answered from a reusable answer library\n- **Dashboard and compliance reports**, plus a hash-chained activity log\n\nAuthentication: Bearer token via `Authorization: Bearer <token>` or the `comply_session` cookie. Health probes (`/health/*`) are unauthenticated.",
        license(name = "BUSL-1.1")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Framework catalogue ──────────────────────────────────────────
        crate::routes::frameworks::list_frameworks,
        crate::routes::frameworks::create_framework,
        crate::routes::frameworks::get_framework,
        crate::routes::frameworks::update_framework,
        crate::routes::frameworks::delete_framework,
        crate::routes::frameworks::list_mappings,
        crate::routes::frameworks::create_mapping,
        crate::routes::frameworks::delete_mapping,
        // ── Compliance framework structure ───────────────────────────────
        crate::routes::compliance::list_compliance_frameworks,
        crate::routes::compliance::create_compliance_framework,
        crate::routes::compliance::get_compliance_framework,
        crate::routes::compliance::update_compliance_framework,
        crate::routes::compliance::delete_compliance_framework,
        crate::routes::compliance::get_tree,
        crate::routes::compliance::list_topics,
        crate::routes::compliance::create_topic,
        crate::routes::compliance::update_topic,
        crate::routes::compliance::delete_topic,
        crate::routes::compliance::list_components,
        crate::routes::compliance::create_component,
        crate::routes::compliance::update_component,
        crate::routes::compliance::delete_component,
        crate::routes::compliance::list_clauses,
        crate::routes::compliance::create_clause,
        crate::routes::compliance::update_clause,
        crate::routes::compliance::delete_clause,
        // ── Organizations ────────────────────────────────────────────────
        crate::routes::organizations::list_organizations,
        crate::routes::organizations::create_organization,
        crate::routes::organizations::add_member,
        crate::routes::organizations::remove_member,
        crate::routes::organizations::get_organization,
        // ── Selections ───────────────────────────────────────────────────
        crate::routes::selections::list_selections,
        crate::routes::selections::create_selection,
        crate::routes::selections::bulk_select,
        crate::routes::selections::update_selection,
        crate::routes::selections::delete_selection,
        // ── Controls ─────────────────────────────────────────────────────
        crate::routes::controls::list_controls,
        crate::routes::controls::create_control,
        crate::routes::controls::get_control,
        crate::routes::controls::update_control,
        crate::routes::controls::delete_control,
        crate::routes::controls::link_evidence,
        crate::routes::controls::unlink_evidence,
        crate::routes::controls::list_control_tasks,
        // ── Evidence & submissions ───────────────────────────────────────
        crate::routes::evidence::list_evidence,
        crate::routes::evidence::create_evidence,
        crate::routes::evidence::get_evidence,
        crate::routes::evidence::update_evidence,
        crate::routes::evidence::delete_evidence,
        crate::routes::submissions::list_submissions,
        crate::routes::submissions::create_submission,
        crate::routes::submissions::get_submission,
        crate::routes::submissions::review_submission,
        // ── Tasks ────────────────────────────────────────────────────────
        crate::routes::tasks::list_tasks,
        crate::routes::tasks::create_task,
        crate::routes::tasks::get_task,
        crate::routes::tasks::update_task,
        crate::routes::tasks::delete_task,
        // ── Questionnaires & answer library ──────────────────────────────
        crate::routes::questionnaires::list_questionnaires,
        crate::routes::questionnaires::create_questionnaire,
        crate::routes::questionnaires::get_questionnaire,
        crate::routes::questionnaires::delete_questionnaire,
        crate::routes::questionnaires::questionnaire_analytics,
        crate::routes::questionnaires::save_answer,
        crate::routes::questionnaires::submit_answer,
        crate::routes::questionnaires::review_answer,
        crate::routes::questionnaires::suggest_answers,
        crate::routes::questionnaires::apply_suggestion,
        crate::routes::answer_library::list_entries,
        crate::routes::answer_library::create_entry,
        crate::routes::answer_library::get_entry,
        crate::routes::answer_library::update_entry,
        crate::routes::answer_library::delete_entry,
        // ── Reports & admin ──────────────────────────────────────────────
        crate::routes::dashboard::get_dashboard,
        crate::routes::dashboard::compliance_report,
        crate::routes::dashboard::list_activity,
        crate::routes::dashboard::verify_audit_chain,
        crate::routes::dashboard::get_metrics,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::auth::Role,
        crate::extractors::PageInfo,
        crate::audit::ChainIntegrity,
        crate::middleware::metrics::MetricsSnapshot,
        // Records
        crate::records::FrameworkRecord,
        crate::records::FrameworkMappingRecord,
        crate::records::ComplianceFrameworkRecord,
        crate::records::TopicRecord,
        crate::records::ComponentRecord,
        crate::records::ClauseRecord,
        crate::records::OrganizationRecord,
        crate::records::MembershipRecord,
        crate::records::SelectionRecord,
        crate::records::ControlRecord,
        crate::records::FileMetadata,
        crate::records::EvidenceRecord,
        crate::records::SubmissionRecord,
        crate::records::TaskRecord,
        crate::records::QuestionnaireRecord,
        crate::records::QuestionRecord,
        crate::records::AnswerRecord,
        crate::records::LibraryEntryRecord,
        crate::records::AuditEventRecord,
        // Requests
        crate::routes::frameworks::CreateFrameworkRequest,
        crate::routes::frameworks::UpdateFrameworkRequest,
        crate::routes::frameworks::CreateMappingRequest,
        crate::routes::compliance::CreateComplianceFrameworkRequest,
        crate::routes::compliance::UpdateComplianceFrameworkRequest,
        crate::routes::compliance::CreateNodeRequest,
        crate::routes::compliance::UpdateNodeRequest,
        crate::routes::compliance::CreateClauseRequest,
        crate::routes::compliance::UpdateClauseRequest,
        crate::routes::organizations::CreateOrganizationRequest,
        crate::routes::organizations::AddMemberRequest,
        crate::routes::selections::CreateSelectionRequest,
        crate::routes::selections::BulkSelectionRequest,
        crate::routes::selections::UpdateSelectionRequest,
        crate::routes::controls::CreateControlRequest,
        crate::routes::controls::UpdateControlRequest,
        crate::routes::evidence::CreateEvidenceRequest,
        crate::routes::evidence::UpdateEvidenceRequest,
        crate::routes::submissions::CreateSubmissionRequest,
        crate::routes::submissions::ReviewSubmissionRequest,
        crate::routes::tasks::CreateTaskRequest,
        crate::routes::tasks::UpdateTaskRequest,
        crate::routes::questionnaires::QuestionInput,
        crate::routes::questionnaires::CreateQuestionnaireRequest,
        crate::routes::questionnaires::SaveAnswerRequest,
        crate::routes::questionnaires::ReviewAnswerRequest,
        crate::routes::answer_library::CreateLibraryEntryRequest,
        crate::routes::answer_library::UpdateLibraryEntryRequest,
        // Responses
        crate::routes::compliance::ComplianceTree,
        crate::routes::compliance::TopicNode,
        crate::routes::compliance::ComponentNode,
        crate::routes::organizations::OrganizationDetail,
        crate::routes::selections::BulkSelectionResponse,
        crate::routes::questionnaires::ProgressView,
        crate::routes::questionnaires::QuestionnaireSummary,
        crate::routes::questionnaires::QuestionnaireDetail,
        crate::routes::questionnaires::QuestionnaireAnalytics,
        crate::routes::questionnaires::SectionCount,
        crate::routes::questionnaires::Suggestion,
        crate::routes::dashboard::ControlSummary,
        crate::routes::dashboard::EvidenceSummary,
        crate::routes::dashboard::TaskSummary,
        crate::routes::dashboard::SubmissionSummary,
        crate::routes::dashboard::QuestionnaireCounts,
        crate::routes::dashboard::Dashboard,
        crate::routes::dashboard::CoverageSummary,
        crate::routes::dashboard::ReportClause,
        crate::routes::dashboard::ReportComponent,
        crate::routes::dashboard::ReportTopic,
        crate::routes::dashboard::ComplianceReport,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "frameworks", description = "Regulatory framework catalogue and cross-framework mappings"),
        (name = "compliance", description = "Compliance frameworks and their topic, component and clause hierarchy"),
        (name = "organizations", description = "Organizations and membership"),
        (name = "selections", description = "Frameworks and clauses an organization has chosen to comply with"),
        (name = "controls", description = "Organization controls and their evidence links"),
        (name = "evidence", description = "Evidence library with expiry tracking"),
        (name = "submissions", description = "Versioned evidence submissions against clauses, with review"),
        (name = "tasks", description = "Remediation and collection tasks"),
        (name = "questionnaires", description = "Security questionnaires and the answer review workflow"),
        (name = "answer-library", description = "Reusable approved answers used to draft questionnaire responses"),
        (name = "reports", description = "Dashboard, compliance reports and activity log"),
        (name = "admin", description = "Platform administration: activity chain verification and metrics"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates_successfully() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Comply API");
        assert_eq!(spec.info.version, "0.3.0");
    }

    #[test]
    fn test_openapi_spec_has_catalogue_paths() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/api/admin/frameworks"));
        assert!(spec
            .paths
            .paths
            .contains_key("/api/admin/compliance/{id}/tree"));
    }

    #[test]
    fn test_openapi_spec_has_organization_paths() {
        let spec = ApiDoc::openapi();
        for path in [
            "/api/organizations/{org_id}/controls",
            "/api/organizations/{org_id}/evidence/{id}",
            "/api/organizations/{org_id}/submissions/{id}/review",
            "/api/organizations/{org_id}/questions/{id}/suggestions",
            "/api/organizations/{org_id}/reports/compliance",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn test_openapi_spec_has_security_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("ErrorBody"));
    }
}
