//! In-memory fetcher for unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use fhir_graph_core::{FetchError, FetchFailure};
use serde_json::Value as JsonValue;

use crate::fetcher::ResourceFetcher;

pub(crate) const BASE: &str = "https://host/fhir";

/// Serves canned resources by URL and records every call
#[derive(Default)]
pub(crate) struct MockFetcher {
    resources: HashMap<String, JsonValue>,
    failures: Mutex<HashMap<String, (FetchFailure, u32)>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serve `resource` at `{BASE}/{Type}/{id}`
    pub(crate) fn with_resource(self, resource: JsonValue) -> Self {
        let url = format!(
            "{}/{}/{}",
            BASE,
            resource["resourceType"].as_str().unwrap(),
            resource["id"].as_str().unwrap()
        );
        self.with_url(&url, resource)
    }

    pub(crate) fn with_url(mut self, url: &str, body: JsonValue) -> Self {
        self.resources.insert(url.to_string(), body);
        self
    }

    /// Fail every request to `url`
    pub(crate) fn with_failure(self, url: &str, failure: FetchFailure) -> Self {
        self.with_flaky(url, failure, u32::MAX)
    }

    /// Fail the first `times` requests to `url`
    pub(crate) fn with_flaky(self, url: &str, failure: FetchFailure, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), (failure, times));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }
}

#[async_trait]
impl ResourceFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<JsonValue, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        if let Some((failure, remaining)) = self.failures.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::new(url, failure.clone()));
            }
        }

        self.resources
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::new(url, FetchFailure::Status(404)))
    }
}
