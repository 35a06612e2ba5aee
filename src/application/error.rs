use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{
    application::{categories::CategoryError, repos::RepoError},
    cache::CacheError,
    config::LoadError,
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// A public error response: a fixed message for the caller, the full chain in the report.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.public_message }));
        let mut response = (self.status, body).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<CategoryError> for HttpError {
    fn from(error: CategoryError) -> Self {
        const SOURCE: &str = "application::error::category_error_to_http_error";
        match &error {
            CategoryError::Domain(DomainError::Validation { message }) => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid request",
                message.clone(),
            ),
            CategoryError::Repo(RepoError::Timeout) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
            CategoryError::Repo(RepoError::Persistence(_)) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
            CategoryError::Search(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Upstream search failed",
                &error,
            ),
            CategoryError::Tree(_) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

impl From<DomainError> for HttpError {
    fn from(error: DomainError) -> Self {
        CategoryError::from(error).into()
    }
}

impl From<CacheError> for HttpError {
    fn from(error: CacheError) -> Self {
        HttpError::from_error(
            "application::error::cache_error_to_http_error",
            StatusCode::SERVICE_UNAVAILABLE,
            "Cache unavailable",
            &error,
        )
    }
}

/// Binary-level failure: configuration, bootstrap, or a one-shot command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::application::search::SearchError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn validation_maps_to_bad_request() {
        let error: HttpError = DomainError::validation("latitude out of range").into();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let response = error.into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .cloned()
            .expect("report attached");
        assert_eq!(report.messages, vec!["latitude out of range".to_string()]);
        assert_eq!(body_json(response).await["error"], "Invalid request");
    }

    #[test]
    fn upstream_failures_map_to_gateway_statuses() {
        let search: HttpError = CategoryError::Search(SearchError::Transport("reset".into())).into();
        assert_eq!(search.status(), StatusCode::BAD_GATEWAY);

        let repo: HttpError = CategoryError::Repo(RepoError::Timeout).into();
        assert_eq!(repo.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn report_keeps_the_source_chain() {
        let error = CategoryError::Search(SearchError::Status {
            status: 500,
            body: "shard failure".into(),
        });
        let report = ErrorReport::from_error("test", StatusCode::BAD_GATEWAY, &error);

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0], "search engine query failed");
        assert!(report.messages[1].contains("shard failure"));
    }
}
