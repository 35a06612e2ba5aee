//! Roamly cache layer.
//!
//! Two consumers share one key-value [`CacheStore`]:
//!
//! - **Response cache**: [`response_cache_layer`] stores JSON bodies of GET
//!   responses under `cache:<path-and-query>`.
//! - **Service cache**: the category service stores derived results
//!   (hierarchy, recommendations, trending) under their own keys.
//!
//! Backend faults never fail a request: reads degrade to misses and writes are
//! skipped. Behaviour is configured through the `[cache]` table:
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! enable_response_cache = true
//! response_ttl_seconds = 3600
//! # ... see config.rs for all options
//! ```

mod config;
mod flight;
pub mod keys;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use flight::{FlightGuard, SingleFlight};
pub use middleware::{CacheState, invalidate_pattern, response_cache_layer};
pub use store::{CacheError, CacheStore, MemoryCacheStore, glob_match, read_json, write_json};

pub(crate) const METRIC_CACHE_HIT: &str = "roamly_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "roamly_cache_miss_total";
pub(crate) const METRIC_CACHE_ERROR: &str = "roamly_cache_error_total";
pub(crate) const METRIC_CACHE_INVALIDATED: &str = "roamly_cache_invalidated_keys_total";
pub(crate) const METRIC_SINGLEFLIGHT_WAIT: &str = "roamly_singleflight_wait_total";
