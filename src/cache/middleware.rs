//! Response cache middleware.
//!
//! Serves GET requests from the shared store and writes JSON bodies of
//! successful misses back before they are sent.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, Response as HttpResponse, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use super::{
    CacheConfig, CacheError, CacheStore, METRIC_CACHE_ERROR, METRIC_CACHE_HIT,
    METRIC_CACHE_INVALIDATED, METRIC_CACHE_MISS, keys,
};

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<dyn CacheStore>,
}

/// Middleware for GET response caching.
///
/// Non-GET requests pass straight through without touching the store. Store
/// faults are logged and treated as a miss on read and skipped on write; the
/// caller always gets the handler's response.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enable_response_cache {
        return next.run(request).await;
    }

    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = keys::response_key(request.uri());

    match cache.store.get(&key).await {
        Ok(Some(stored)) => match serde_json::from_str::<serde_json::Value>(&stored) {
            Ok(_) => {
                counter!(METRIC_CACHE_HIT, "cache" => "response").increment(1);
                debug!(cache = "response", outcome = "hit", key = %key, "serving cached response");
                return json_response(Bytes::from(stored));
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "op" => "decode").increment(1);
                warn!(cache = "response", outcome = "read_failed", key = %key, error = %err, "discarding unreadable cached body");
            }
        },
        Ok(None) => {}
        Err(err) => {
            counter!(METRIC_CACHE_ERROR, "op" => "get").increment(1);
            warn!(cache = "response", outcome = "read_failed", key = %key, error = %err, "cache lookup failed");
        }
    }

    counter!(METRIC_CACHE_MISS, "cache" => "response").increment(1);
    debug!(cache = "response", outcome = "miss", key = %key, "cache miss, executing handler");

    let response = next.run(request).await;
    if !is_cacheable(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(key = %key, error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match std::str::from_utf8(&bytes) {
        Ok(text) => {
            if let Err(err) = cache.store.set(&key, text, cache.config.response_ttl).await {
                counter!(METRIC_CACHE_ERROR, "op" => "set").increment(1);
                warn!(cache = "response", outcome = "write_failed", key = %key, error = %err, "failed to cache response");
            }
        }
        Err(err) => {
            warn!(cache = "response", outcome = "write_failed", key = %key, error = %err, "response body is not UTF-8");
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Delete every key matching `pattern` in one batch.
///
/// Matching nothing is not an error.
pub async fn invalidate_pattern(store: &dyn CacheStore, pattern: &str) -> Result<usize, CacheError> {
    let keys = store.keys(pattern).await?;
    let cleared = if keys.is_empty() {
        0
    } else {
        store.delete(&keys).await?
    };

    counter!(METRIC_CACHE_INVALIDATED).increment(cleared as u64);
    info!(pattern, cleared, "cache invalidated");
    Ok(cleared)
}

fn is_cacheable(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

fn json_response(body: Bytes) -> Response {
    HttpResponse::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
