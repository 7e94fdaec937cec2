//! # Organizations API
//!
//! Tenants of the platform and their memberships. Platform admins create
//! organizations and manage members; members can read their organization.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use comply_core::validate::{self, MAX_SHORT_TEXT};
use comply_core::{OrgRole, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditEntry};
use crate::auth::{require_org_role, require_role, CallerIdentity, Role};
use crate::db::{self, persist_error};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::records::{MembershipRecord, OrganizationRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrganizationRequest {
    pub name: String,
    /// URL-safe identifier. Derived from the name when absent.
    pub slug: Option<String>,
}

impl Validate for CreateOrganizationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::required("name", &self.name, MAX_SHORT_TEXT)?;
        if let Some(slug) = &self.slug {
            validate::required("slug", slug, MAX_SHORT_TEXT)?;
            if !is_valid_slug(slug) {
                return Err(ValidationError::Invalid {
                    field: "slug",
                    reason: "use lowercase letters, digits and single hyphens".into(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default)]
    #[schema(value_type = String)]
    pub role: OrgRole,
}

/// An organization with its members.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationDetail {
    #[serde(flatten)]
    pub organization: OrganizationRecord,
    pub members: Vec<MembershipRecord>,
    /// The caller's role in this organization.
    #[schema(value_type = String)]
    pub caller_role: OrgRole,
}

/// Build the organizations router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/organizations",
            get(list_organizations).post(create_organization),
        )
        .route("/api/admin/organizations/:id/members", post(add_member))
        .route(
            "/api/admin/organizations/:id/members/:user_id",
            delete(remove_member),
        )
        .route("/api/organizations/:org_id", get(get_organization))
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Lowercase the name and collapse every run of other characters into one hyphen.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// GET /api/admin/organizations: List organizations.
#[utoipa::path(
    get,
    path = "/api/admin/organizations",
    responses((status = 200, description = "Organizations sorted by name", body = Vec<OrganizationRecord>)),
    tag = "organizations"
)]
async fn list_organizations(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<OrganizationRecord>>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let mut organizations = state.organizations.list();
    organizations.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(Json(organizations))
}

/// POST /api/admin/organizations: Create an organization.
///
/// A caller with a user identity becomes its owner.
#[utoipa::path(
    post,
    path = "/api/admin/organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = OrganizationRecord),
        (status = 409, description = "Slug already taken", body = crate::error::ErrorBody),
    ),
    tag = "organizations"
)]
async fn create_organization(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateOrganizationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrganizationRecord>), AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = extract_validated_json(body)?;

    let slug = match req.slug {
        Some(slug) => slug,
        None => slugify(&req.name),
    };
    if slug.is_empty() {
        return Err(ValidationError::Invalid {
            field: "slug",
            reason: "could not derive a slug from the name".into(),
        }
        .into());
    }

    let now = Utc::now();
    let record = OrganizationRecord {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        slug,
        created_at: now,
        updated_at: now,
    };
    let owner = caller.user_id.map(|user_id| MembershipRecord {
        id: Uuid::new_v4(),
        organization_id: record.id,
        user_id,
        role: OrgRole::Owner,
        created_at: now,
    });

    {
        let mut organizations = state.organizations.write();
        let mut memberships = state.memberships.write();
        if organizations.values().any(|o| o.slug == record.slug) {
            return Err(AppError::Conflict(format!(
                "organization slug '{}' is already taken",
                record.slug
            )));
        }
        organizations.insert(record.id, record.clone());
        if let Some(owner) = &owner {
            memberships.insert(owner.id, owner.clone());
        }
    }

    if let Some(pool) = &state.db_pool {
        db::organizations::upsert(pool, &record)
            .await
            .map_err(|e| persist_error("organization", record.id, e))?;
        if let Some(owner) = &owner {
            db::organizations::upsert_membership(pool, owner)
                .await
                .map_err(|e| persist_error("membership", owner.id, e))?;
        }
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("organization", record.id, "created")
            .in_org(record.id)
            .with_metadata(json!({ "name": record.name, "slug": record.slug })),
    )
    .await?;

    tracing::info!(organization_id = %record.id, slug = %record.slug, "organization created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/admin/organizations/:id/members: Add a member or change their role.
#[utoipa::path(
    post,
    path = "/api/admin/organizations/{id}/members",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = AddMemberRequest,
    responses(
        (status = 200, description = "Membership created or updated", body = MembershipRecord),
        (status = 404, description = "Organization not found", body = crate::error::ErrorBody),
    ),
    tag = "organizations"
)]
async fn add_member(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
    body: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Result<Json<MembershipRecord>, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;
    let req = crate::extractors::extract_json(body)?;

    let membership = {
        let organizations = state.organizations.read();
        let mut memberships = state.memberships.write();
        if !organizations.contains_key(&org_id) {
            return Err(AppError::not_found("organization", org_id));
        }
        let existing_id = memberships
            .values()
            .find(|m| m.organization_id == org_id && m.user_id == req.user_id)
            .map(|m| m.id);
        match existing_id.and_then(|id| memberships.get_mut(&id)) {
            Some(existing) => {
                existing.role = req.role;
                existing.clone()
            }
            None => {
                let record = MembershipRecord {
                    id: Uuid::new_v4(),
                    organization_id: org_id,
                    user_id: req.user_id,
                    role: req.role,
                    created_at: Utc::now(),
                };
                memberships.insert(record.id, record.clone());
                record
            }
        }
    };

    if let Some(pool) = &state.db_pool {
        db::organizations::upsert_membership(pool, &membership)
            .await
            .map_err(|e| persist_error("membership", membership.id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("membership", membership.id, "upserted")
            .in_org(org_id)
            .with_metadata(json!({
                "user_id": membership.user_id,
                "role": membership.role.as_str(),
            })),
    )
    .await?;

    Ok(Json(membership))
}

/// DELETE /api/admin/organizations/:id/members/:user_id: Remove a member.
#[utoipa::path(
    delete,
    path = "/api/admin/organizations/{id}/members/{user_id}",
    params(
        ("id" = Uuid, Path, description = "Organization ID"),
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 204, description = "Membership removed"),
        (status = 404, description = "Not a member", body = crate::error::ErrorBody),
    ),
    tag = "organizations"
)]
async fn remove_member(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((org_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::PlatformAdmin)?;

    let membership_id = state.memberships.mutate_all(|all| {
        let id = all
            .values()
            .find(|m| m.organization_id == org_id && m.user_id == user_id)
            .map(|m| m.id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "user {user_id} is not a member of organization {org_id}"
                ))
            })?;
        all.remove(&id);
        Ok::<_, AppError>(id)
    })?;

    if let Some(pool) = &state.db_pool {
        db::organizations::delete_membership(pool, membership_id)
            .await
            .map_err(|e| persist_error("membership", membership_id, e))?;
    }

    audit::record(
        &state,
        &caller,
        AuditEntry::new("membership", membership_id, "deleted")
            .in_org(org_id)
            .with_metadata(json!({ "user_id": user_id })),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/organizations/:org_id: Organization detail for members.
#[utoipa::path(
    get,
    path = "/api/organizations/{org_id}",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization with members", body = OrganizationDetail),
        (status = 403, description = "Not a member", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "organizations"
)]
async fn get_organization(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(org_id): Path<Uuid>,
) -> Result<Json<OrganizationDetail>, AppError> {
    let caller_role = require_org_role(&state, &caller, org_id, OrgRole::Member)?;
    let organization = state
        .organizations
        .get(&org_id)
        .ok_or_else(|| AppError::not_found("organization", org_id))?;
    let mut members = state.memberships.filter(|m| m.organization_id == org_id);
    members.sort_by(|a, b| b.role.cmp(&a.role).then(a.created_at.cmp(&b.created_at)));

    Ok(Json(OrganizationDetail {
        organization,
        members,
        caller_role,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Acme Corp, Inc."), "acme-corp-inc");
        assert_eq!(slugify("  --Hello  World-- "), "hello-world");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn slug_rules() {
        assert!(is_valid_slug("acme-2"));
        assert!(!is_valid_slug("Acme"));
        assert!(!is_valid_slug("-acme"));
        assert!(!is_valid_slug("a--b"));
    }
}
