//! Cache storage port and the in-process implementation.

use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use lru::LruCache;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::Mutex;

use super::CacheConfig;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Key-value store holding JSON text with a per-entry TTL.
///
/// An expired entry must read as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Keys matching a glob pattern (`*`, `?`, `[...]`, `\` escapes).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Delete the given keys in one batch, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError>;
}

pub async fn read_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process [`CacheStore`] used when no Redis backend is configured.
///
/// Bounded by an LRU capacity; expired entries are dropped whenever the map is
/// written or scanned.
#[derive(Clone)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<LruCache<String, Entry>>>,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::with_capacity(CacheConfig::default().memory_capacity_non_zero())
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let mut guard = self.entries.lock().await;
        purge_expired(&mut guard, Instant::now());
        guard.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn purge_expired(entries: &mut LruCache<String, Entry>, now: Instant) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in expired {
        entries.pop(&key);
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut guard = self.entries.lock().await;
        let (value, expired) = match guard.get(key) {
            Some(entry) if entry.is_expired(now) => (None, true),
            Some(entry) => (Some(entry.value.clone()), false),
            None => (None, false),
        };
        if expired {
            guard.pop(key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: now + ttl,
        };
        let mut guard = self.entries.lock().await;
        purge_expired(&mut guard, now);
        guard.put(key.to_string(), entry);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut guard = self.entries.lock().await;
        purge_expired(&mut guard, Instant::now());
        let mut keys: Vec<String> = guard
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut guard = self.entries.lock().await;
        let removed = keys
            .iter()
            .filter_map(|key| guard.pop(key))
            .filter(|entry| !entry.is_expired(now))
            .count();
        Ok(removed)
    }
}

/// Redis-compatible glob matching.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = candidate.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Pattern index just after the last `*`, and the text index it currently absorbs up to.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            if pattern[p] == '*' {
                star = Some((p + 1, t));
                p += 1;
                continue;
            }
            let (matched, width) = match_token(&pattern[p..], text[t]);
            if matched {
                p += width;
                t += 1;
                continue;
            }
        }

        match star {
            Some((after_star, absorbed)) => {
                p = after_star;
                t = absorbed + 1;
                star = Some((after_star, absorbed + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Match one pattern token against `c`, returning the outcome and the token width.
fn match_token(pattern: &[char], c: char) -> (bool, usize) {
    match pattern[0] {
        '?' => (true, 1),
        '\\' if pattern.len() > 1 => (pattern[1] == c, 2),
        '[' => match_class(pattern, c).unwrap_or((c == '[', 1)),
        literal => (literal == c, 1),
    }
}

fn match_class(pattern: &[char], c: char) -> Option<(bool, usize)> {
    let mut i = 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() {
        if pattern[i] == ']' {
            return Some((matched != negate, i + 1));
        }

        let (low, step) = if pattern[i] == '\\' && i + 1 < pattern.len() {
            (pattern[i + 1], 2)
        } else {
            (pattern[i], 1)
        };
        i += step;

        if i + 1 < pattern.len() && pattern[i] == '-' && pattern[i + 1] != ']' {
            let high = pattern[i + 1];
            i += 2;
            let (low, high) = if low <= high { (low, high) } else { (high, low) };
            matched |= (low..=high).contains(&c);
        } else {
            matched |= low == c;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_and_question() {
        assert!(glob_match("cache:*", "cache:/api/categories"));
        assert!(glob_match("*", ""));
        assert!(glob_match("trending:?:*", "trending:1:24h"));
        assert!(!glob_match("cache:*", "categories:hierarchy"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
    }

    #[test]
    fn glob_classes_and_escapes() {
        assert!(glob_match("h[ae]llo", "hello"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("h[a-f]llo", "hello"));
        assert!(glob_match("literal\\*", "literal*"));
        assert!(!glob_match("literal\\*", "literally"));
        assert!(glob_match("open[", "open["));
    }

    #[tokio::test]
    async fn roundtrip_and_missing_key() {
        let store = MemoryCacheStore::new();
        assert!(store.get("k").await.expect("get").is_none());

        store
            .set("k", "{\"a\":1}", Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let store = MemoryCacheStore::new();
        store.set("k", "1", Duration::ZERO).await.expect("set");

        assert!(store.get("k").await.expect("get").is_none());
        assert!(store.keys("*").await.expect("keys").is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn keys_and_batch_delete() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        for key in ["cache:/a", "cache:/b", "trending:x"] {
            store.set(key, "1", ttl).await.expect("set");
        }

        let matched = store.keys("cache:*").await.expect("keys");
        assert_eq!(matched, vec!["cache:/a".to_string(), "cache:/b".to_string()]);

        let removed = store.delete(&matched).await.expect("delete");
        assert_eq!(removed, 2);
        assert_eq!(store.len().await, 1);

        let removed_again = store.delete(&matched).await.expect("delete");
        assert_eq!(removed_again, 0);
    }

    #[tokio::test]
    async fn expired_entries_are_reclaimed_on_scan() {
        let store = MemoryCacheStore::new();
        for i in 0..1000 {
            let key = format!("cache:/api/categories/trending?lat=1&lng=2&x={i}");
            store.set(&key, "[]", Duration::ZERO).await.expect("set");
        }

        assert!(store.keys("*").await.expect("keys").is_empty());
        assert_eq!(store.entries.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn expired_entries_are_reclaimed_on_write() {
        let store = MemoryCacheStore::new();
        store.set("old", "1", Duration::ZERO).await.expect("set");
        store
            .set("fresh", "2", Duration::from_secs(60))
            .await
            .expect("set");

        let guard = store.entries.lock().await;
        assert_eq!(guard.len(), 1);
        assert!(guard.contains("fresh"));
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let capacity = NonZeroUsize::new(2).expect("non-zero");
        let store = MemoryCacheStore::with_capacity(capacity);
        let ttl = Duration::from_secs(60);

        store.set("a", "1", ttl).await.expect("set");
        store.set("b", "2", ttl).await.expect("set");
        assert!(store.get("a").await.expect("get").is_some());
        store.set("c", "3", ttl).await.expect("set");

        assert_eq!(
            store.keys("*").await.expect("keys"),
            vec!["a".to_string(), "c".to_string()]
        );
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn json_helpers_roundtrip() {
        let store = MemoryCacheStore::new();
        write_json(&store, "nums", &vec![1, 2, 3], Duration::from_secs(5))
            .await
            .expect("write");

        let nums: Option<Vec<u32>> = read_json(&store, "nums").await.expect("read");
        assert_eq!(nums, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn read_json_reports_corrupt_payload() {
        let store = MemoryCacheStore::new();
        store
            .set("bad", "not json", Duration::from_secs(5))
            .await
            .expect("set");

        let result: Result<Option<Vec<u32>>, _> = read_json(&store, "bad").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }
}
