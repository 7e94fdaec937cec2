//! # Authentication & Authorization
//!
//! Bearer token middleware with role-based access control, plus the
//! organization membership guard consulted at the top of every
//! organization-scoped handler.
//!
//! ## Token Format
//!
//! ```text
//! {role}:{user_id}:{secret}   role is user, platform_admin or super_admin
//! {secret}                    legacy format, treated as super_admin
//! ```
//!
//! The token is read from `Authorization: Bearer <token>`, or from the
//! `comply_session` cookie when no Authorization header is sent.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use comply_core::OrgRole;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::state::AppState;

/// Name of the session cookie carrying the token.
pub const SESSION_COOKIE: &str = "comply_session";

// ── Role ────────────────────────────────────────────────────────────────────

/// Platform roles, ordered by privilege: `USER < PLATFORM_ADMIN < SUPER_ADMIN`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Works inside the organizations they belong to.
    User,
    /// Manages the framework catalogue and organizations.
    PlatformAdmin,
    /// Everything, including destructive catalogue operations.
    SuperAdmin,
}

impl Role {
    /// Wire name, as serialized and recorded on activity events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::PlatformAdmin => "PLATFORM_ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "platform_admin" => Some(Self::PlatformAdmin),
            "super_admin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// `None` for the legacy shared-secret token and when auth is disabled.
    pub user_id: Option<Uuid>,
}

impl CallerIdentity {
    /// Identity injected when authentication is disabled.
    pub fn system() -> Self {
        Self {
            role: Role::SuperAdmin,
            user_id: None,
        }
    }

    /// Check if the caller has at least the given minimum role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required platform role.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Check that the caller may act in `org_id` with at least `minimum` org role.
///
/// Platform admins pass for any existing organization. Returns 404 for an
/// unknown organization and 403 when the caller is not a member or their
/// membership role is too low. On success returns the caller's org role
/// (`OWNER` for platform admins).
pub fn require_org_role(
    state: &AppState,
    caller: &CallerIdentity,
    org_id: Uuid,
    minimum: OrgRole,
) -> Result<OrgRole, AppError> {
    if !state.organizations.contains(&org_id) {
        return Err(AppError::not_found("organization", org_id));
    }
    if caller.has_role(Role::PlatformAdmin) {
        return Ok(OrgRole::Owner);
    }
    let user_id = caller
        .user_id
        .ok_or_else(|| AppError::Forbidden("caller has no user identity".into()))?;

    let role = state
        .memberships
        .read()
        .values()
        .find(|m| m.organization_id == org_id && m.user_id == user_id)
        .map(|m| m.role)
        .ok_or_else(|| AppError::Forbidden("not a member of this organization".into()))?;

    if role >= minimum {
        Ok(role)
    } else {
        Err(AppError::Forbidden(format!(
            "organization role '{}' required, caller has '{}'",
            minimum.as_str(),
            role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a token in format `{role}:{user_id}:{secret}` or `{secret}` (legacy).
pub fn parse_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::system())
            } else {
                Err("invalid token".into())
            }
        }
        [role_str, user_str, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid token".into());
            }
            let role = Role::parse(role_str).ok_or_else(|| format!("unknown role: {role_str}"))?;
            let user_id = if user_str.is_empty() {
                None
            } else {
                Some(
                    user_str
                        .parse::<Uuid>()
                        .map_err(|e| format!("invalid user_id: {e}"))?,
                )
            };
            if role == Role::User && user_id.is_none() {
                return Err("user tokens must carry a user_id".into());
            }
            Ok(CallerIdentity { role, user_id })
        }
        _ => Err("invalid token format, expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

/// Value of the session cookie, if present.
fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the caller from the Authorization header or session cookie and
/// inject a [`CallerIdentity`] into request extensions.
///
/// When `AuthConfig.token` is `None`, every request runs as
/// [`CallerIdentity::system`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = match request.extensions().get::<AuthConfig>() {
        Some(AuthConfig {
            token: Some(expected),
        }) => expected.clone(),
        _ => {
            request.extensions_mut().insert(CallerIdentity::system());
            return next.run(request).await;
        }
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => token.to_string(),
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => match session_cookie(request.headers()) {
            Some(token) => token.to_string(),
            None => {
                tracing::warn!("authentication failed: no credentials");
                return unauthorized_response("missing authorization header or session cookie");
            }
        },
    };

    match parse_token(&provided, &expected) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed: invalid token");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new("UNAUTHORIZED", message)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{MembershipRecord, OrganizationRecord};
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move { caller.role.as_str() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn call(app: Router, header: Option<(&str, String)>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn legacy_secret_is_super_admin() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some(("Authorization", "Bearer s3cret".into()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "SUPER_ADMIN");
    }

    #[tokio::test]
    async fn role_token_sets_role() {
        let app = test_app(Some("s3cret".into()));
        let token = format!("platform_admin:{}:s3cret", Uuid::new_v4());
        let (status, body) = call(app, Some(("Authorization", format!("Bearer {token}")))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "PLATFORM_ADMIN");
    }

    #[tokio::test]
    async fn session_cookie_is_accepted() {
        let app = test_app(Some("s3cret".into()));
        let cookie = format!("theme=dark; {SESSION_COOKIE}=user:{}:s3cret", Uuid::new_v4());
        let (status, body) = call(app, Some(("Cookie", cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "USER");
    }

    #[tokio::test]
    async fn missing_credentials_rejected() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn wrong_secret_and_scheme_rejected() {
        let app = test_app(Some("s3cret".into()));
        let (status, _) = call(app.clone(), Some(("Authorization", "Bearer nope".into()))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = call(app, Some(("Authorization", "Basic dXNlcjpwYXNz".into()))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn auth_disabled_runs_as_super_admin() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "SUPER_ADMIN");
    }

    #[test]
    fn parse_token_rejects_bad_input() {
        assert!(parse_token("wizard:abc:s3cret", "s3cret")
            .unwrap_err()
            .contains("unknown role"));
        assert!(parse_token("user:not-a-uuid:s3cret", "s3cret")
            .unwrap_err()
            .contains("invalid user_id"));
        assert!(parse_token("user::s3cret", "s3cret").is_err());
        assert!(parse_token("a:b", "s3cret").is_err());
        let admin = parse_token("SUPER_ADMIN::s3cret", "s3cret").unwrap();
        assert_eq!(admin.role, Role::SuperAdmin);
        assert!(admin.user_id.is_none());
    }

    #[test]
    fn constant_time_eq() {
        assert!(constant_time_token_eq("secret-token", "secret-token"));
        assert!(!constant_time_token_eq("secret", "secret-token"));
        assert!(!constant_time_token_eq("", "secret-token"));
    }

    #[test]
    fn roles_are_ordered() {
        assert!(Role::User < Role::PlatformAdmin);
        assert!(Role::PlatformAdmin < Role::SuperAdmin);
        let user = CallerIdentity {
            role: Role::User,
            user_id: Some(Uuid::new_v4()),
        };
        assert!(require_role(&user, Role::PlatformAdmin).is_err());
        assert!(require_role(&CallerIdentity::system(), Role::SuperAdmin).is_ok());
    }

    fn state_with_member(role: OrgRole) -> (AppState, Uuid, Uuid) {
        let state = AppState::new();
        let org_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        state.organizations.insert(
            org_id,
            OrganizationRecord {
                id: org_id,
                name: "Acme".into(),
                slug: "acme".into(),
                created_at: now,
                updated_at: now,
            },
        );
        let membership_id = Uuid::new_v4();
        state.memberships.insert(
            membership_id,
            MembershipRecord {
                id: membership_id,
                organization_id: org_id,
                user_id,
                role,
                created_at: now,
            },
        );
        (state, org_id, user_id)
    }

    #[test]
    fn org_guard_checks_membership_and_role() {
        let (state, org_id, user_id) = state_with_member(OrgRole::Member);
        let member = CallerIdentity {
            role: Role::User,
            user_id: Some(user_id),
        };
        assert_eq!(
            require_org_role(&state, &member, org_id, OrgRole::Member).unwrap(),
            OrgRole::Member
        );
        assert!(matches!(
            require_org_role(&state, &member, org_id, OrgRole::Admin),
            Err(AppError::Forbidden(_))
        ));

        let stranger = CallerIdentity {
            role: Role::User,
            user_id: Some(Uuid::new_v4()),
        };
        assert!(matches!(
            require_org_role(&state, &stranger, org_id, OrgRole::Member),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            require_org_role(&state, &member, Uuid::new_v4(), OrgRole::Member),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn platform_admin_passes_org_guard() {
        let (state, org_id, _) = state_with_member(OrgRole::Member);
        let admin = CallerIdentity {
            role: Role::PlatformAdmin,
            user_id: Some(Uuid::new_v4()),
        };
        assert_eq!(
            require_org_role(&state, &admin, org_id, OrgRole::Owner).unwrap(),
            OrgRole::Owner
        );
    }
}
