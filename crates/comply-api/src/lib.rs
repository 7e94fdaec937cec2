//! # comply-api: Axum API Service for the Comply Platform
//!
//! Compliance management over HTTP: the regulatory framework catalogue,
//! compliance framework structure (topics, components, clauses),
//! organizations and their selections, controls, evidence with versioned
//! submissions and review, tasks, security questionnaires, and the answer
//! library that seeds questionnaire drafts.
//!
//! ## API Surface
//!
//! | Prefix                                       | Module                        | Access            |
//! |----------------------------------------------|-------------------------------|-------------------|
//! | `/api/admin/frameworks/*`, `/api/admin/mappings/*` | [`routes::frameworks`]  | PLATFORM_ADMIN    |
//! | `/api/admin/compliance/*`, `/api/admin/{topics,components,clauses}/*` | [`routes::compliance`] | PLATFORM_ADMIN |
//! | `/api/admin/organizations/*`                 | [`routes::organizations`]     | PLATFORM_ADMIN    |
//! | `/api/admin/audit/verify`, `/api/admin/metrics` | [`routes::dashboard`]      | PLATFORM_ADMIN    |
//! | `/api/organizations/:org_id`                 | [`routes::organizations`]     | member            |
//! | `.../selections/*`                           | [`routes::selections`]        | member / ADMIN    |
//! | `.../controls/*`                             | [`routes::controls`]          | member / ADMIN    |
//! | `.../evidence/*`                             | [`routes::evidence`]          | member / ADMIN    |
//! | `.../submissions/*`                          | [`routes::submissions`]       | member / ADMIN    |
//! | `.../tasks/*`                                | [`routes::tasks`]             | member / ADMIN    |
//! | `.../questionnaires/*`, `.../questions/*`    | [`routes::questionnaires`]    | member / ADMIN    |
//! | `.../answer-library/*`                       | [`routes::answer_library`]    | member / ADMIN    |
//! | `.../dashboard`, `.../reports/*`, `.../activity` | [`routes::dashboard`]     | member            |
//!
//! Deleting a framework or compliance framework needs SUPER_ADMIN.
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros, served at `/openapi.json`.

pub mod audit;
pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod records;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware so
/// they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();
    let limiter = RateLimiter::new(RateLimitConfig::per_minute(
        state.config.rate_limit_per_minute,
    ));

    // Auth runs before rate limiting so the limiter can key on the caller
    // and unauthenticated requests never consume quota.
    let api = Router::new()
        .merge(routes::frameworks::router())
        .merge(routes::compliance::router())
        .merge(routes::organizations::router())
        .merge(routes::selections::router())
        .merge(routes::controls::router())
        .merge(routes::evidence::router())
        .merge(routes::submissions::router())
        .merge(routes::tasks::router())
        .merge(routes::questionnaires::router())
        .merge(routes::answer_library::router())
        .merge(routes::dashboard::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(Extension(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .layer(Extension(limiter))
        .with_state(state.clone());

    let unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness))
        .with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 "ready", or 503 when the configured database is
/// unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}
