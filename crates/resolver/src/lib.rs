//! fhir-graph-resolver: dereferences FHIR Bundles against a live server
//!
//! Given a Bundle and the base URL of the server it came from, every
//! `{"reference": "Type/id"}` reachable from its entries is fetched once,
//! attached in place under `resource`, and collected into a companion
//! `collection` Bundle. `next` links are followed on request.
//!
//! ```rust,no_run
//! use fhir_graph_resolver::{Resolver, ResolverConfig};
//!
//! # async fn example(bundle: fhir_graph_core::Bundle) -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = Resolver::new(ResolverConfig::default())?;
//! let mut resolution = resolver.process_bundle(bundle, "https://hapi.fhir.org/baseR4").await;
//! resolver.follow(&mut resolution, 5).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod fetcher;
pub mod index;
pub mod pagination;
pub mod processor;
pub mod search;
pub mod walker;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use fhir_graph_core::{Bundle, ResolveError, ShapeError};
use serde_json::Value as JsonValue;

pub use config::ResolverConfig;
pub use fetcher::{HttpFetcher, ResourceFetcher};
pub use index::ReferenceIndex;
pub use pagination::{PaginationDriver, base_url_of};
pub use processor::{BundleProcessor, Resolution};
pub use search::SearchQuery;
pub use walker::{FieldKind, ReferenceWalker};

/// Entry point bundling a fetcher with its configuration.
///
/// Cheap to clone; holds no state between calls, so every call resolves
/// with a fresh ledger.
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn ResourceFetcher>,
    config: ResolverConfig,
}

impl Resolver {
    /// Resolver that reads over HTTP
    pub fn new(config: ResolverConfig) -> reqwest::Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch_timeout)?;
        Ok(Self::with_fetcher(Arc::new(fetcher), config))
    }

    pub fn with_fetcher(fetcher: Arc<dyn ResourceFetcher>, config: ResolverConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn processor(&self) -> BundleProcessor<'_> {
        BundleProcessor::new(self.fetcher.as_ref()).with_max_depth(self.config.max_depth)
    }

    pub fn pagination(&self) -> PaginationDriver<'_> {
        PaginationDriver::new(self.fetcher.as_ref(), self.processor())
            .with_retries(self.config.page_retries, self.config.retry_backoff)
    }

    pub async fn process_bundle(&self, bundle: Bundle, base_url: &str) -> Resolution {
        self.processor().process_bundle(bundle, base_url).await
    }

    pub async fn process_value(
        &self,
        value: JsonValue,
        base_url: &str,
    ) -> Result<Resolution, ShapeError> {
        self.processor().process_value(value, base_url).await
    }

    /// Fetch and resolve a search or page URL; the base URL defaults to one
    /// derived from `url`
    pub async fn load_page(
        &self,
        url: &str,
        base_url: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        self.pagination().load_page(url, base_url).await
    }

    pub async fn load_next_page(&self, next_page_url: &str) -> Result<Resolution, ResolveError> {
        self.pagination().load_next_page(next_page_url).await
    }

    pub async fn follow(
        &self,
        resolution: &mut Resolution,
        max_pages: usize,
    ) -> Result<usize, ResolveError> {
        self.pagination().follow(resolution, max_pages).await
    }

    /// Like [`follow`](Self::follow), but every page resolves against
    /// `base_url` when one is given
    pub async fn follow_with_base(
        &self,
        resolution: &mut Resolution,
        max_pages: usize,
        base_url: Option<&str>,
    ) -> Result<usize, ResolveError> {
        self.pagination()
            .follow_with_base(resolution, max_pages, base_url)
            .await
    }
}
