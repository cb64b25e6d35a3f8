//! Single-resource reads against a FHIR server

use std::time::Duration;

use async_trait::async_trait;
use fhir_graph_core::{FetchError, FetchFailure, resource_type};
use reqwest::header::ACCEPT;
use serde_json::Value as JsonValue;

const FHIR_JSON: &str = "application/fhir+json";

/// Reads one resource by absolute URL.
///
/// Implementations perform exactly one attempt; retry policy belongs to
/// the caller.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<JsonValue, FetchError>;
}

/// `ResourceFetcher` backed by reqwest
#[derive(Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http))
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<JsonValue, FetchError> {
        tracing::debug!(url, "Fetching resource");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, FHIR_JSON)
            .send()
            .await
            .map_err(|e| FetchError::new(url, failure_of(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(url, FetchFailure::Status(status.as_u16())));
        }

        let body: JsonValue = response.json().await.map_err(|e| {
            let cause = if e.is_timeout() {
                FetchFailure::Timeout
            } else {
                FetchFailure::InvalidBody(e.to_string())
            };
            FetchError::new(url, cause)
        })?;

        if resource_type(&body).is_none() {
            return Err(FetchError::new(
                url,
                FetchFailure::InvalidBody("missing resourceType".to_string()),
            ));
        }

        Ok(body)
    }
}

fn failure_of(err: &reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Transport(err.to_string())
    }
}
