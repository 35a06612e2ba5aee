//! Recommendation scoring and trending windows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::views::PlaceViewRecord;

/// Weight applied to a category count taken from the user's own view history.
pub const USER_PREFERENCE_WEIGHT: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingEntry {
    pub category: String,
    pub view_count: u64,
}

/// A terms-aggregation bucket: a category and its document count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

impl From<CategoryCount> for TrendingEntry {
    fn from(bucket: CategoryCount) -> Self {
        Self {
            category: bucket.category,
            view_count: bucket.count,
        }
    }
}

/// Count category occurrences across every view (a multiset of tags).
pub fn count_preferences(views: &[PlaceViewRecord]) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for category in views.iter().flat_map(|view| view.categories.iter()) {
        *counts.entry(category.clone()).or_insert(0) += 1;
    }
    counts
}

/// Blend weighted user preferences with local popularity and keep the top `limit`.
///
/// Ordered by descending score; equal scores are ordered by category label.
pub fn rank_recommendations(
    preferences: &HashMap<String, u64>,
    local: &[CategoryCount],
    limit: usize,
) -> Vec<Recommendation> {
    let mut scores: HashMap<&str, u64> = HashMap::with_capacity(preferences.len() + local.len());

    for (category, count) in preferences {
        *scores.entry(category.as_str()).or_insert(0) += count * USER_PREFERENCE_WEIGHT;
    }
    for bucket in local {
        *scores.entry(bucket.category.as_str()).or_insert(0) += bucket.count;
    }

    let mut ranked: Vec<Recommendation> = scores
        .into_iter()
        .map(|(category, score)| Recommendation {
            category: category.to_string(),
            score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.category.cmp(&b.category)));
    ranked.truncate(limit);
    ranked
}

/// Look-back window for trending categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Day,
    Week,
    Month,
}

impl Timeframe {
    /// Parse a query value; anything unrecognised falls back to `24h`.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("7d") => Self::Week,
            Some("30d") => Self::Month,
            _ => Self::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::Day => Duration::hours(24),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
        }
    }

    /// Earliest timestamp still inside the window ending at `now`.
    pub fn cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - self.duration()
    }
}
