//! Cache configuration.
//!
//! Controls the response cache and service-level TTLs via `roamly.toml`.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_RESPONSE_TTL_SECS: u64 = 3600;
const DEFAULT_HIERARCHY_TTL_SECS: u64 = 3600;
const DEFAULT_RECOMMENDATIONS_TTL_SECS: u64 = 30 * 60;
const DEFAULT_TRENDING_TTL_SECS: u64 = 15 * 60;
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable the GET response cache middleware.
    pub enable_response_cache: bool,
    /// TTL for cached response bodies.
    pub response_ttl: Duration,
    /// TTL for the assembled category hierarchy.
    pub hierarchy_ttl: Duration,
    /// TTL for per-user recommendations.
    pub recommendations_ttl: Duration,
    /// TTL for trending categories.
    pub trending_ttl: Duration,
    /// Collapse concurrent service-level misses for one key into one computation.
    pub single_flight: bool,
    /// Maximum entries held by the in-process store.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_response_cache: true,
            response_ttl: Duration::from_secs(DEFAULT_RESPONSE_TTL_SECS),
            hierarchy_ttl: Duration::from_secs(DEFAULT_HIERARCHY_TTL_SECS),
            recommendations_ttl: Duration::from_secs(DEFAULT_RECOMMENDATIONS_TTL_SECS),
            trending_ttl: Duration::from_secs(DEFAULT_TRENDING_TTL_SECS),
            single_flight: false,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_response_cache: settings.enable_response_cache,
            response_ttl: settings.response_ttl,
            hierarchy_ttl: settings.hierarchy_ttl,
            recommendations_ttl: settings.recommendations_ttl,
            trending_ttl: settings.trending_ttl,
            single_flight: settings.single_flight,
            memory_capacity: settings.memory_capacity.get() as usize,
        }
    }
}

impl CacheConfig {
    /// Memory store capacity, clamped to at least one entry.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
