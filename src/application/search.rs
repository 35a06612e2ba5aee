//! Search engine port and the query bodies the category service issues.

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::domain::{geo::GeoPoint, ranking::CategoryCount};

/// Name of the terms aggregation every aggregating query uses.
pub const CATEGORY_AGGREGATION: &str = "categories";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search transport error: {0}")]
    Transport(String),
    #[error("search engine returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("search response could not be decoded: {0}")]
    Decode(String),
}

impl SearchError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A structured query body sent to one index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    body: Value,
}

impl SearchRequest {
    pub fn from_body(body: Value) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Categories of the most recent `size` view events of one user, newest first.
    pub fn recent_views(user_id: &str, size: usize) -> Self {
        Self::from_body(json!({
            "size": size,
            "_source": ["categories"],
            "query": {
                "term": { "user_id": user_id }
            },
            "sort": [
                { "timestamp": { "order": "desc" } }
            ]
        }))
    }

    /// Category buckets of places within `radius_km` of `point`.
    pub fn local_popularity(point: &GeoPoint, radius_km: u32, buckets: usize) -> Self {
        Self::from_body(json!({
            "size": 0,
            "query": {
                "bool": {
                    "filter": [geo_filter(point, radius_km)]
                }
            },
            "aggs": category_aggregation(buckets)
        }))
    }

    /// Category buckets of view events at or after `cutoff` within `radius_km` of `point`.
    pub fn trending_views(
        point: &GeoPoint,
        radius_km: u32,
        cutoff: OffsetDateTime,
        buckets: usize,
    ) -> Result<Self, SearchError> {
        let cutoff = cutoff
            .format(&Rfc3339)
            .map_err(|err| SearchError::Decode(format!("cutoff could not be encoded: {err}")))?;
        Ok(Self::from_body(json!({
            "size": 0,
            "query": {
                "bool": {
                    "filter": [
                        { "range": { "timestamp": { "gte": cutoff } } },
                        geo_filter(point, radius_km)
                    ]
                }
            },
            "aggs": category_aggregation(buckets)
        })))
    }
}

fn geo_filter(point: &GeoPoint, radius_km: u32) -> Value {
    json!({
        "geo_distance": {
            "distance": format!("{radius_km}km"),
            "location": { "lat": point.lat, "lon": point.lng }
        }
    })
}

fn category_aggregation(buckets: usize) -> Value {
    json!({
        (CATEGORY_AGGREGATION): {
            "terms": { "field": "categories", "size": buckets }
        }
    })
}

/// Matching documents and category buckets, in the order the engine returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub hits: Vec<Value>,
    pub buckets: Vec<CategoryCount>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, SearchError>;
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn point() -> GeoPoint {
        GeoPoint::new(48.8566, 2.3522).expect("point")
    }

    #[test]
    fn recent_views_filters_by_user_and_sorts_newest_first() {
        let request = SearchRequest::recent_views("u-42", 50);
        let body = request.body();

        assert_eq!(body["size"], 50);
        assert_eq!(body["query"]["term"]["user_id"], "u-42");
        assert_eq!(body["sort"][0]["timestamp"]["order"], "desc");
        assert_eq!(body["_source"], json!(["categories"]));
    }

    #[test]
    fn local_popularity_uses_radius_and_bucket_size() {
        let request = SearchRequest::local_popularity(&point(), 10, 10);
        let body = request.body();

        let geo = &body["query"]["bool"]["filter"][0]["geo_distance"];
        assert_eq!(geo["distance"], "10km");
        assert_eq!(geo["location"]["lon"], 2.3522);
        assert_eq!(body["aggs"]["categories"]["terms"]["field"], "categories");
        assert_eq!(body["aggs"]["categories"]["terms"]["size"], 10);
        assert_eq!(body["size"], 0);
    }

    #[test]
    fn trending_views_filters_from_cutoff() {
        let request =
            SearchRequest::trending_views(&point(), 10, datetime!(2024-06-14 12:00 UTC), 10)
                .expect("request");
        let filters = &request.body()["query"]["bool"]["filter"];

        assert_eq!(filters[0]["range"]["timestamp"]["gte"], "2024-06-14T12:00:00Z");
        assert_eq!(filters[1]["geo_distance"]["distance"], "10km");
    }
}
