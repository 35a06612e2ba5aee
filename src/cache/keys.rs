//! Cache key definitions.
//!
//! Every key written by the service is built here so that invalidation
//! patterns and writers cannot drift apart.

use axum::http::Uri;

use crate::domain::{geo::GeoPoint, ranking::Timeframe};

/// Prefix of response-cache keys.
pub const RESPONSE_PREFIX: &str = "cache:";
/// Pattern matching every response-cache key.
pub const RESPONSE_PATTERN: &str = "cache:*";
/// Key holding the assembled category forest.
pub const HIERARCHY_KEY: &str = "categories:hierarchy";

/// Response-cache key for a request: `cache:<path>[?<query>]`.
pub fn response_key(uri: &Uri) -> String {
    let original = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{RESPONSE_PREFIX}{original}")
}

pub fn recommendations_key(user_id: &str, point: &GeoPoint) -> String {
    format!("recommendations:{user_id}:{}", point.key_fragment())
}

pub fn trending_key(point: &GeoPoint, timeframe: Timeframe) -> String {
    format!("trending:{}:{}", point.key_fragment(), timeframe.as_str())
}
