//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers that map body
//! and query rejections to [`AppError::BadRequest`], and page-based
//! pagination for list endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;
use comply_core::ValidationError;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate()?;
    Ok(value)
}

/// Extract query parameters, mapping parse errors to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: u32,
}

/// A page of results.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

/// Slice `items` to the requested 1-based page.
///
/// `page` defaults to 1 and `limit` to [`DEFAULT_PAGE_SIZE`]; a limit above
/// [`MAX_PAGE_SIZE`] is clamped. Zero for either is a validation error.
pub fn paginate<T>(
    items: Vec<T>,
    page: Option<u32>,
    limit: Option<u32>,
) -> Result<Paginated<T>, AppError> {
    let page = page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::Validation("page must be at least 1".into()));
    }
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 {
        return Err(AppError::Validation("limit must be at least 1".into()));
    }
    let limit = limit.min(MAX_PAGE_SIZE);

    let total = items.len();
    let total_pages = total.div_ceil(limit as usize) as u32;
    let offset = (page as usize - 1).saturating_mul(limit as usize);
    let items = items
        .into_iter()
        .skip(offset)
        .take(limit as usize)
        .collect();

    Ok(Paginated {
        items,
        pagination: PageInfo {
            page,
            limit,
            total,
            total_pages,
        },
    })
}

/// Case-insensitive substring match used by `search` filters.
pub fn matches_search(needle: &str, haystacks: &[Option<&str>]) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    haystacks
        .iter()
        .flatten()
        .any(|h| h.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_defaults_and_slices() {
        let page = paginate((1..=45).collect::<Vec<_>>(), None, None).unwrap();
        assert_eq!(page.items.len(), 20);
        assert_eq!(page.items[0], 1);
        assert_eq!(page.pagination.total, 45);
        assert_eq!(page.pagination.total_pages, 3);

        let last = paginate((1..=45).collect::<Vec<_>>(), Some(3), None).unwrap();
        assert_eq!(last.items, (41..=45).collect::<Vec<_>>());
    }

    #[test]
    fn paginate_clamps_limit_and_rejects_zero() {
        let page = paginate((0..500).collect::<Vec<_>>(), Some(1), Some(1000)).unwrap();
        assert_eq!(page.pagination.limit, MAX_PAGE_SIZE);
        assert_eq!(page.items.len(), 100);
        assert!(paginate(vec![1], Some(0), None).is_err());
        assert!(paginate(vec![1], None, Some(0)).is_err());
    }

    #[test]
    fn page_past_end_is_empty() {
        let page = paginate(vec![1, 2, 3], Some(9), Some(2)).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn search_is_case_insensitive_over_optional_fields() {
        assert!(matches_search("soc", &[Some("SOC 2 Type II"), None]));
        assert!(matches_search("trust", &[None, Some("Trust Services Criteria")]));
        assert!(!matches_search("iso", &[Some("SOC 2"), None]));
        assert!(matches_search("  ", &[None]));
    }
}
