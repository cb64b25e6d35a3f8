//! Loading `next` pages and appending them to an accumulated resolution

use std::time::Duration;

use fhir_graph_core::{Bundle, FetchError, ResolveError};
use serde_json::Value as JsonValue;
use url::Url;

use crate::fetcher::ResourceFetcher;
use crate::processor::{BundleProcessor, Resolution};

/// Server base URL for a search or continuation URL.
///
/// Query and fragment are dropped, as is a trailing `<ResourceType>` path
/// segment: `https://host/fhir/Patient?page=2` → `https://host/fhir`, while
/// `https://host/baseR4?_getpages=x` keeps `/baseR4` and version bases such as
/// `/R4` or `/STU3` are kept too.
pub fn base_url_of(page_url: &str) -> String {
    let Ok(mut url) = Url::parse(page_url) else {
        return page_url
            .rsplit_once('/')
            .map(|(base, _)| base.to_string())
            .unwrap_or_else(|| page_url.to_string());
    };
    url.set_query(None);
    url.set_fragment(None);

    let mut segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    if segments.last().is_some_and(|s| looks_like_resource_type(s)) {
        segments.pop();
    }
    url.set_path(&segments.join("/"));

    url.as_str().trim_end_matches('/').to_string()
}

/// PascalCase name: `Patient`, `DiagnosticReport`. All-caps tags (`R4`,
/// `DSTU2`) are version bases, not resource types.
fn looks_like_resource_type(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && segment.chars().all(|c| c.is_ascii_alphanumeric())
        && chars.any(|c| c.is_ascii_lowercase())
}

/// Fetches pages and hands them to the bundle processor
pub struct PaginationDriver<'a> {
    fetcher: &'a dyn ResourceFetcher,
    processor: BundleProcessor<'a>,
    retries: u32,
    backoff: Duration,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(fetcher: &'a dyn ResourceFetcher, processor: BundleProcessor<'a>) -> Self {
        Self {
            fetcher,
            processor,
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Retry transient page failures `retries` times, `backoff` apart
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// Fetch and resolve the page at `next_page_url`, with the base URL
    /// derived from the page URL itself
    pub async fn load_next_page(&self, next_page_url: &str) -> Result<Resolution, ResolveError> {
        self.load_page(next_page_url, None).await
    }

    /// Fetch and resolve any Bundle-returning URL (search or continuation)
    pub async fn load_page(
        &self,
        page_url: &str,
        base_url: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        tracing::info!(url = page_url, "Loading bundle page");

        let body = match self.fetch_with_retry(page_url).await {
            Ok(body) => body,
            Err(e) => {
                metrics::counter!("fhir_pages_loaded_total", "outcome" => "fetch_error")
                    .increment(1);
                return Err(e.into());
            }
        };
        let bundle = match Bundle::from_value(body) {
            Ok(bundle) => bundle,
            Err(e) => {
                metrics::counter!("fhir_pages_loaded_total", "outcome" => "shape_error")
                    .increment(1);
                tracing::warn!(url = page_url, error = %e, "Page is not a Bundle");
                return Err(e.into());
            }
        };
        metrics::counter!("fhir_pages_loaded_total", "outcome" => "success").increment(1);

        let base_url = base_url
            .map(str::to_string)
            .unwrap_or_else(|| base_url_of(page_url));
        Ok(self.processor.process_bundle(bundle, &base_url).await)
    }

    /// Keep loading continuation pages into `resolution` until there is none
    /// left or `max_pages` were loaded. Returns the number of pages loaded.
    ///
    /// Pages appended before a failure stay in `resolution`, whose
    /// `next_page_url` still points at the page that failed.
    pub async fn follow(
        &self,
        resolution: &mut Resolution,
        max_pages: usize,
    ) -> Result<usize, ResolveError> {
        self.follow_with_base(resolution, max_pages, None).await
    }

    /// [`follow`](Self::follow), resolving every page against `base_url`
    /// instead of a base derived from each `next` link
    pub async fn follow_with_base(
        &self,
        resolution: &mut Resolution,
        max_pages: usize,
        base_url: Option<&str>,
    ) -> Result<usize, ResolveError> {
        let mut loaded = 0;
        while loaded < max_pages {
            let Some(url) = resolution.next_page_url.clone() else {
                break;
            };
            let page = self.load_page(&url, base_url).await?;
            if page.next_page_url.as_deref() == Some(url.as_str()) {
                tracing::warn!(url = %url, "Page links to itself as next, stopping");
                resolution.append(page);
                resolution.next_page_url = None;
                return Ok(loaded + 1);
            }
            resolution.append(page);
            loaded += 1;
        }
        Ok(loaded)
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<JsonValue, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(url, attempt, error = %e, "Retrying page fetch");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
