//! Elasticsearch adapter for [`SearchBackend`].

use async_trait::async_trait;
use reqwest::{Client, Url, header::AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    application::search::{
        CATEGORY_AGGREGATION, SearchBackend, SearchError, SearchRequest, SearchResponse,
    },
    domain::ranking::CategoryCount,
};

#[derive(Clone, Debug)]
pub struct ElasticsearchClient {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

impl ElasticsearchClient {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, SearchError> {
        let mut base = Url::parse(url).map_err(SearchError::transport)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(concat!("roamly/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SearchError::transport)?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    fn search_url(&self, index: &str) -> Result<Url, SearchError> {
        self.base
            .join(&format!("{index}/_search"))
            .map_err(SearchError::transport)
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchClient {
    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, SearchError> {
        let url = self.search_url(index)?;
        debug!(target = "roamly::search", index, "issuing search query");

        let mut builder = self.client.post(url).json(request.body());
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.header(AUTHORIZATION, format!("ApiKey {key}"));
        }

        let response = builder.send().await.map_err(SearchError::transport)?;
        let status = response.status();
        let body = response.text().await.map_err(SearchError::transport)?;
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        decode_response(&body)
    }
}

#[derive(Deserialize, Default)]
struct RawResponse {
    #[serde(default)]
    hits: RawHits,
    #[serde(default)]
    aggregations: Option<serde_json::Map<String, Value>>,
}

#[derive(Deserialize, Default)]
struct RawHits {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Deserialize)]
struct RawTerms {
    #[serde(default)]
    buckets: Vec<RawBucket>,
}

#[derive(Deserialize)]
struct RawBucket {
    key: Value,
    doc_count: u64,
}

/// Decode a `_search` response body into hit sources and category buckets.
pub fn decode_response(body: &str) -> Result<SearchResponse, SearchError> {
    let raw: RawResponse = serde_json::from_str(body).map_err(SearchError::decode)?;

    let hits = raw.hits.hits.into_iter().map(|hit| hit.source).collect();

    let buckets = match raw
        .aggregations
        .and_then(|mut aggs| aggs.remove(CATEGORY_AGGREGATION))
    {
        Some(terms) => {
            let terms: RawTerms = serde_json::from_value(terms).map_err(SearchError::decode)?;
            terms
                .buckets
                .into_iter()
                .map(|bucket| CategoryCount {
                    category: match bucket.key {
                        Value::String(key) => key,
                        other => other.to_string(),
                    },
                    count: bucket.doc_count,
                })
                .collect()
        }
        None => Vec::new(),
    };

    Ok(SearchResponse { hits, buckets })
}
