use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    middleware,
    response::Response,
    routing::get,
};
use serde::Deserialize;

use crate::{
    application::{categories::CategoryService, error::HttpError},
    cache::{CacheState, response_cache_layer},
    domain::{
        categories::CategoryNode,
        error::DomainError,
        geo::GeoPoint,
        ranking::{Recommendation, Timeframe, TrendingEntry},
    },
    infra::db::PostgresRepositories,
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub categories: Arc<CategoryService>,
    pub db: Arc<PostgresRepositories>,
    pub cache: Option<CacheState>,
}

pub fn build_router(state: HttpState) -> Router {
    let cached_routes = Router::new()
        .route("/api/categories/hierarchy", get(category_hierarchy))
        .route(
            "/api/categories/recommendations",
            get(category_recommendations),
        )
        .route("/api/categories/trending", get(trending_categories));

    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        cached_routes
    };

    let uncached_routes = Router::new().route("/_health", get(public_health));

    cached_routes
        .merge(uncached_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecommendationQuery {
    user: Option<String>,
    lat: Option<f64>,
    #[serde(alias = "lon")]
    lng: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrendingQuery {
    lat: Option<f64>,
    #[serde(alias = "lon")]
    lng: Option<f64>,
    timeframe: Option<String>,
}

fn invalid_query(rejection: QueryRejection) -> HttpError {
    DomainError::validation(rejection.body_text()).into()
}

fn require_point(lat: Option<f64>, lng: Option<f64>) -> Result<GeoPoint, HttpError> {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Err(
            DomainError::validation("both `lat` and `lng` query parameters are required").into(),
        );
    };
    GeoPoint::new(lat, lng).map_err(HttpError::from)
}

async fn category_hierarchy(
    State(state): State<HttpState>,
) -> Result<Json<Vec<CategoryNode>>, HttpError> {
    let forest = state.categories.get_category_hierarchy().await?;
    Ok(Json(forest))
}

async fn category_recommendations(
    State(state): State<HttpState>,
    query: Result<Query<RecommendationQuery>, QueryRejection>,
) -> Result<Json<Vec<Recommendation>>, HttpError> {
    let Query(query) = query.map_err(invalid_query)?;
    let user = query.user.unwrap_or_default();
    let point = require_point(query.lat, query.lng)?;
    let ranked = state
        .categories
        .get_category_recommendations(&user, point)
        .await?;
    Ok(Json(ranked))
}

async fn trending_categories(
    State(state): State<HttpState>,
    query: Result<Query<TrendingQuery>, QueryRejection>,
) -> Result<Json<Vec<TrendingEntry>>, HttpError> {
    let Query(query) = query.map_err(invalid_query)?;
    let point = require_point(query.lat, query.lng)?;
    let timeframe = Timeframe::from_param(query.timeframe.as_deref());
    let trending = state
        .categories
        .get_trending_categories(point, timeframe)
        .await?;
    Ok(Json(trending))
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}
