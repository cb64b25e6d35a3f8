//! Building search URLs from an endpoint, a resource type and extra parameters

use serde::{Deserialize, Serialize};
use url::Url;

/// A type-level search against a FHIR endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub endpoint: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Extra `k=v&k2=v2` pairs appended as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
}

impl SearchQuery {
    pub fn new(endpoint: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            resource_type: resource_type.into(),
            count: None,
            params: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Base URL resources found by this search are read from
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// `{endpoint}/{resourceType}?_count=N&<params>`
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url(), self.resource_type))?;

        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(count) = self.count {
            pairs.push(("_count".to_string(), count.to_string()));
        }
        if let Some(params) = &self.params {
            pairs.extend(
                url::form_urlencoded::parse(params.trim_start_matches('?').as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }

        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }
}
