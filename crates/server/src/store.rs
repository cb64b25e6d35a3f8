//! In-memory store of the most recently resolved bundles.
//!
//! A resolve, fetch or load replaces the store; loading a `next` page
//! appends to it. Every change is broadcast to subscribers as a
//! [`StoreEvent`].

use std::collections::BTreeMap;
use std::sync::Arc;

use fhir_graph_core::{Bundle, ResourceKind, resource_id};
use fhir_graph_resolver::Resolution;
use serde_json::Value as JsonValue;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 64;

/// Change notification emitted after every write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The store now holds only the given bundles
    Replaced { bundles: usize },
    /// `bundles` were appended after loading a page
    Appended { bundles: usize },
}

#[derive(Default)]
struct StoreState {
    bundles: Vec<Bundle>,
    next_page_url: Option<String>,
    /// Base the held bundles were resolved against, when the caller chose it
    base_url: Option<String>,
}

/// Shared handle to the bundle store. Clones see the same data.
#[derive(Clone)]
pub struct BundleStore {
    state: Arc<RwLock<StoreState>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for BundleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            events,
        }
    }

    /// Drop everything held and keep `resolution` instead. `base_url` is
    /// reused for later pages; `None` lets them derive their own.
    pub async fn replace(&self, resolution: Resolution, base_url: Option<String>) {
        let bundles = resolution.bundles.len();
        {
            let mut state = self.state.write().await;
            state.bundles = resolution.bundles;
            state.next_page_url = resolution.next_page_url;
            state.base_url = base_url;
        }
        self.notify(StoreEvent::Replaced { bundles });
    }

    /// Add a loaded page after the bundles already held; its `next` link
    /// becomes the store's continuation
    pub async fn append(&self, page: Resolution) {
        let bundles = page.bundles.len();
        {
            let mut state = self.state.write().await;
            state.bundles.extend(page.bundles);
            state.next_page_url = page.next_page_url;
        }
        self.notify(StoreEvent::Appended { bundles });
    }

    pub async fn bundles(&self) -> Vec<Bundle> {
        self.state.read().await.bundles.clone()
    }

    pub async fn bundle_count(&self) -> usize {
        self.state.read().await.bundles.len()
    }

    pub async fn next_page_url(&self) -> Option<String> {
        self.state.read().await.next_page_url.clone()
    }

    pub async fn base_url(&self) -> Option<String> {
        self.state.read().await.base_url.clone()
    }

    /// Every resource of `kind` across the stored bundles.
    ///
    /// Includes entries of that type plus resources of that type embedded
    /// directly as a field value of other entries.
    pub async fn resources_of(&self, kind: &ResourceKind) -> Vec<JsonValue> {
        let state = self.state.read().await;
        state
            .bundles
            .iter()
            .flat_map(|bundle| extract(bundle, kind))
            .cloned()
            .collect()
    }

    /// First stored resource of `kind` with the given id
    pub async fn find(&self, kind: &ResourceKind, id: &str) -> Option<JsonValue> {
        let state = self.state.read().await;
        state
            .bundles
            .iter()
            .flat_map(|bundle| extract(bundle, kind))
            .find(|r| resource_id(r) == Some(id))
            .cloned()
    }

    /// Number of stored resources per tracked type, keyed by collection slug
    pub async fn counts(&self) -> BTreeMap<String, usize> {
        let state = self.state.read().await;
        ResourceKind::TRACKED
            .iter()
            .map(|kind| {
                let count = state
                    .bundles
                    .iter()
                    .map(|bundle| extract(bundle, kind).count())
                    .sum::<usize>();
                (kind.collection_slug(), count)
            })
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        // Err only means nobody is listening
        let _ = self.events.send(event);
    }
}

fn extract<'a>(
    bundle: &'a Bundle,
    kind: &'a ResourceKind,
) -> impl Iterator<Item = &'a JsonValue> + 'a {
    bundle.resources().flat_map(move |resource| {
        let found: Vec<&JsonValue> = if kind.matches(resource) {
            vec![resource]
        } else {
            resource
                .as_object()
                .map(|fields| fields.values().filter(|v| kind.matches(v)).collect())
                .unwrap_or_default()
        };
        found
    })
}

/// Log every store change until all store handles are dropped
pub fn spawn_event_logger(store: &BundleStore) -> JoinHandle<()> {
    let mut events = store.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::Replaced { bundles }) => {
                    tracing::info!(bundles, "Bundle store replaced");
                }
                Ok(StoreEvent::Appended { bundles }) => {
                    tracing::info!(bundles, "Page appended to bundle store");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Store event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
