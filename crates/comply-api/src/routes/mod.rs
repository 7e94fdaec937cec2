//! # Route Modules
//!
//! One module per resource. Admin catalogue routes live under `/api/admin`;
//! organization workspace routes under `/api/organizations/:org_id`.

pub mod answer_library;
pub mod compliance;
pub mod controls;
pub mod dashboard;
pub mod evidence;
pub mod frameworks;
pub mod organizations;
pub mod questionnaires;
pub mod selections;
pub mod submissions;
pub mod tasks;

use uuid::Uuid;

use crate::error::AppError;
use crate::state::Store;

/// Fetch a record that must belong to `org_id`.
///
/// A record of another organization is reported as missing so ids from
/// other tenants are not disclosed.
pub(crate) fn org_scoped<T: Clone + Send + Sync>(
    store: &Store<T>,
    resource: &str,
    id: Uuid,
    org_id: Uuid,
    org_of: impl Fn(&T) -> Uuid,
) -> Result<T, AppError> {
    store
        .get(&id)
        .filter(|record| org_of(record) == org_id)
        .ok_or_else(|| AppError::not_found(resource, id))
}

fn default_true() -> bool {
    true
}
