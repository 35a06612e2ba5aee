//! Category hierarchy, recommendations and trending, cached per result.

use std::{future::Future, sync::Arc, time::Duration};

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::{
    application::{
        repos::{CategoriesRepo, RepoError},
        search::{SearchBackend, SearchError, SearchRequest},
    },
    cache::{
        CacheConfig, CacheError, CacheStore, METRIC_CACHE_ERROR, METRIC_CACHE_HIT,
        METRIC_CACHE_MISS, SingleFlight, keys, read_json, write_json,
    },
    domain::{
        categories::{CategoryNode, CategoryTreeError, build_category_forest},
        error::DomainError,
        geo::GeoPoint,
        ranking::{
            Recommendation, Timeframe, TrendingEntry, count_preferences, rank_recommendations,
        },
        views::PlaceViewRecord,
    },
};

const DEFAULT_VIEWS_INDEX: &str = "place_views";
const DEFAULT_PLACES_INDEX: &str = "places";
const DEFAULT_RADIUS_KM: u32 = 10;
const DEFAULT_HISTORY_SIZE: usize = 50;
const DEFAULT_RESULT_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("invalid category request")]
    Domain(#[from] DomainError),
    #[error("category store failed")]
    Repo(#[from] RepoError),
    #[error("search engine query failed")]
    Search(#[from] SearchError),
    #[error("category hierarchy is malformed")]
    Tree(#[from] CategoryTreeError),
}

/// Index names and query sizes used against the search engine.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub views_index: String,
    pub places_index: String,
    pub radius_km: u32,
    /// Number of recent views read per user.
    pub history_size: usize,
    /// Cap on recommendation and trending entries.
    pub result_limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            views_index: DEFAULT_VIEWS_INDEX.to_string(),
            places_index: DEFAULT_PLACES_INDEX.to_string(),
            radius_km: DEFAULT_RADIUS_KM,
            history_size: DEFAULT_HISTORY_SIZE,
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

impl From<&crate::config::SearchSettings> for SearchOptions {
    fn from(settings: &crate::config::SearchSettings) -> Self {
        Self {
            views_index: settings.views_index.clone(),
            places_index: settings.places_index.clone(),
            radius_km: settings.radius_km.get(),
            history_size: settings.history_size.get() as usize,
            result_limit: settings.result_limit.get() as usize,
        }
    }
}

#[derive(Clone)]
pub struct CategoryService {
    categories: Arc<dyn CategoriesRepo>,
    search: Arc<dyn SearchBackend>,
    cache: Arc<dyn CacheStore>,
    config: CacheConfig,
    options: SearchOptions,
    flights: Option<SingleFlight>,
}

impl CategoryService {
    pub fn new(
        categories: Arc<dyn CategoriesRepo>,
        search: Arc<dyn SearchBackend>,
        cache: Arc<dyn CacheStore>,
        config: CacheConfig,
        options: SearchOptions,
    ) -> Self {
        let flights = config.single_flight.then(SingleFlight::new);
        Self {
            categories,
            search,
            cache,
            config,
            options,
            flights,
        }
    }

    /// The full category forest.
    #[instrument(skip(self))]
    pub async fn get_category_hierarchy(&self) -> Result<Vec<CategoryNode>, CategoryError> {
        self.cached(keys::HIERARCHY_KEY, self.config.hierarchy_ttl, || async move {
            let records = self.categories.list_categories().await?;
            Ok(build_category_forest(records)?)
        })
        .await
    }

    /// Up to `result_limit` categories for `user_id` near `point`, best first.
    #[instrument(skip(self, point), fields(lat = point.lat, lng = point.lng))]
    pub async fn get_category_recommendations(
        &self,
        user_id: &str,
        point: GeoPoint,
    ) -> Result<Vec<Recommendation>, CategoryError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(DomainError::validation("user id must not be empty").into());
        }

        let key = keys::recommendations_key(user_id, &point);
        self.cached(&key, self.config.recommendations_ttl, || async move {
            let history = self
                .search
                .search(
                    &self.options.views_index,
                    &SearchRequest::recent_views(user_id, self.options.history_size),
                )
                .await?;
            let views = decode_views(history.hits)?;
            let preferences = count_preferences(&views);

            let local = self
                .search
                .search(
                    &self.options.places_index,
                    &SearchRequest::local_popularity(
                        &point,
                        self.options.radius_km,
                        self.options.result_limit,
                    ),
                )
                .await?;

            Ok(rank_recommendations(
                &preferences,
                &local.buckets,
                self.options.result_limit,
            ))
        })
        .await
    }

    /// Categories viewed most near `point` within `timeframe`, in aggregation order.
    #[instrument(skip(self, point), fields(lat = point.lat, lng = point.lng))]
    pub async fn get_trending_categories(
        &self,
        point: GeoPoint,
        timeframe: Timeframe,
    ) -> Result<Vec<TrendingEntry>, CategoryError> {
        let key = keys::trending_key(&point, timeframe);
        self.cached(&key, self.config.trending_ttl, || async move {
            let cutoff = timeframe.cutoff(OffsetDateTime::now_utc());
            let request = SearchRequest::trending_views(
                &point,
                self.options.radius_km,
                cutoff,
                self.options.result_limit,
            )?;
            let response = self
                .search
                .search(&self.options.views_index, &request)
                .await?;

            Ok(response
                .buckets
                .into_iter()
                .take(self.options.result_limit)
                .map(TrendingEntry::from)
                .collect())
        })
        .await
    }

    /// Drop the cached hierarchy so the next read rebuilds it.
    pub async fn invalidate_hierarchy(&self) -> Result<bool, CacheError> {
        let removed = self
            .cache
            .delete(&[keys::HIERARCHY_KEY.to_string()])
            .await?;
        info!(key = keys::HIERARCHY_KEY, removed, "category hierarchy invalidated");
        Ok(removed > 0)
    }

    async fn cached<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, CategoryError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CategoryError>>,
    {
        if let Some(hit) = self.read_cached(key).await {
            return Ok(hit);
        }

        let _flight = match &self.flights {
            Some(flights) => {
                let guard = flights.acquire(key).await;
                if guard.waited()
                    && let Some(hit) = self.read_cached(key).await
                {
                    return Ok(hit);
                }
                Some(guard)
            }
            None => None,
        };

        counter!(METRIC_CACHE_MISS, "cache" => "service").increment(1);
        debug!(cache = "service", outcome = "miss", key, "computing value");

        let value = compute().await?;

        if let Err(err) = write_json(self.cache.as_ref(), key, &value, ttl).await {
            counter!(METRIC_CACHE_ERROR, "op" => "set").increment(1);
            warn!(cache = "service", outcome = "write_failed", key, error = %err, "failed to cache value");
        }

        Ok(value)
    }

    async fn read_cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match read_json(self.cache.as_ref(), key).await {
            Ok(Some(value)) => {
                counter!(METRIC_CACHE_HIT, "cache" => "service").increment(1);
                debug!(cache = "service", outcome = "hit", key, "serving cached value");
                Some(value)
            }
            Ok(None) => None,
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "op" => "get").increment(1);
                warn!(cache = "service", outcome = "read_failed", key, error = %err, "cache read failed");
                None
            }
        }
    }
}

fn decode_views(hits: Vec<serde_json::Value>) -> Result<Vec<PlaceViewRecord>, SearchError> {
    hits.into_iter()
        .map(|hit| serde_json::from_value(hit).map_err(SearchError::decode))
        .collect()
}
