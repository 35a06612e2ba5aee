use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    middleware,
    routing::delete,
};
use serde::{Deserialize, Serialize};

use crate::{
    application::{categories::CategoryService, error::HttpError},
    cache::{CacheStore, invalidate_pattern, keys},
    domain::error::DomainError,
};

use super::middleware::{log_responses, set_request_context};

const HIERARCHY_RESPONSE_PATTERN: &str = "cache:/api/categories/hierarchy*";

#[derive(Clone)]
pub struct AdminState {
    pub categories: Arc<CategoryService>,
    pub cache: Arc<dyn CacheStore>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/cache", delete(invalidate_cache))
        .route("/admin/cache/hierarchy", delete(invalidate_hierarchy))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvalidateQuery {
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    pattern: String,
    cleared: usize,
}

async fn invalidate_cache(
    State(state): State<AdminState>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<InvalidateResponse>, HttpError> {
    let pattern = query
        .pattern
        .unwrap_or_else(|| keys::RESPONSE_PATTERN.to_string());
    if pattern.trim().is_empty() {
        return Err(DomainError::validation("pattern must not be empty").into());
    }

    let cleared = invalidate_pattern(state.cache.as_ref(), &pattern).await?;
    Ok(Json(InvalidateResponse { pattern, cleared }))
}

#[derive(Debug, Serialize)]
struct HierarchyInvalidation {
    hierarchy: bool,
    responses: usize,
}

/// Drop the assembled hierarchy and every cached response built from it.
async fn invalidate_hierarchy(
    State(state): State<AdminState>,
) -> Result<Json<HierarchyInvalidation>, HttpError> {
    let hierarchy = state.categories.invalidate_hierarchy().await?;
    let responses = invalidate_pattern(state.cache.as_ref(), HIERARCHY_RESPONSE_PATTERN).await?;
    Ok(Json(HierarchyInvalidation {
        hierarchy,
        responses,
    }))
}
