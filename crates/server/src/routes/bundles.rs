//! Resolution operations
//!
//! `$resolve`, `$fetch` and `$load` replace the bundle store with their
//! result; `$next-page` appends to it. Each returns the resolution it
//! produced.

use axum::{Json, extract::State};
use fhir_graph_core::Bundle;
use fhir_graph_resolver::{Resolution, SearchQuery};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub bundle: JsonValue,
    pub base_url: String,
}

/// POST /$resolve - dereference a Bundle supplied by the client
pub async fn resolve(
    State(state): State<AppState>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<Resolution>, AppError> {
    let resolution = state
        .resolver
        .process_value(body.bundle, &body.base_url)
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid bundle: {e}")))?;

    state
        .store
        .replace(resolution.clone(), Some(body.base_url))
        .await;
    Ok(Json(resolution))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    /// Search or page URL to load as-is
    pub url: Option<String>,
    /// Search to build a URL from when `url` is absent
    pub search: Option<SearchQuery>,
    pub base_url: Option<String>,
    /// Also load `next` pages, up to the configured limit
    #[serde(default)]
    pub follow: bool,
}

/// POST /$fetch - load a search result from the server and dereference it
pub async fn fetch(
    State(state): State<AppState>,
    Json(body): Json<FetchRequest>,
) -> Result<Json<Resolution>, AppError> {
    let (url, base_url) = match (body.url, body.search) {
        (Some(url), _) => (url, body.base_url),
        (None, Some(search)) => {
            let url = search
                .to_url()
                .map_err(|e| AppError::BadRequest(format!("Invalid search endpoint: {e}")))?;
            let base_url = body
                .base_url
                .unwrap_or_else(|| search.base_url().to_string());
            (url.to_string(), Some(base_url))
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "Either 'url' or 'search' is required".to_string(),
            ));
        }
    };

    let mut resolution = state.resolver.load_page(&url, base_url.as_deref()).await?;

    if body.follow {
        // Keep whatever was loaded before a failing page
        if let Err(e) = state
            .resolver
            .follow_with_base(&mut resolution, state.max_follow_pages, base_url.as_deref())
            .await
        {
            tracing::warn!(error = %e, "Stopped following next links");
        }
    }

    state.store.replace(resolution.clone(), base_url).await;
    Ok(Json(resolution))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextPageRequest {
    pub url: Option<String>,
    pub base_url: Option<String>,
}

/// POST /$next-page - load the stored (or given) continuation page.
///
/// The stored continuation resolves against the base its first page used,
/// unless the request names one. A given `url` without `baseUrl` derives
/// its base from the URL.
pub async fn next_page(
    State(state): State<AppState>,
    Json(body): Json<NextPageRequest>,
) -> Result<Json<Resolution>, AppError> {
    let (url, base_url) = match body.url {
        Some(url) => (url, body.base_url),
        None => {
            let url = state
                .store
                .next_page_url()
                .await
                .ok_or_else(|| AppError::NotFound("There is no next page to load".to_string()))?;
            let base_url = match body.base_url {
                Some(base_url) => Some(base_url),
                None => state.store.base_url().await,
            };
            (url, base_url)
        }
    };

    let page = state.resolver.load_page(&url, base_url.as_deref()).await?;
    state.store.append(page.clone()).await;
    Ok(Json(page))
}

/// POST /$load - store a Bundle without dereferencing it
pub async fn load(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> Result<Json<Resolution>, AppError> {
    let bundle = Bundle::from_value(body).map_err(|e| {
        AppError::BadRequest(format!("The provided JSON is not a valid FHIR Bundle: {e}"))
    })?;

    let resolution = Resolution {
        next_page_url: bundle.next_page_url().map(str::to_string),
        bundles: vec![bundle],
    };
    state.store.replace(resolution.clone(), None).await;
    Ok(Json(resolution))
}

/// GET /bundles
pub async fn list(State(state): State<AppState>) -> Json<Vec<Bundle>> {
    Json(state.store.bundles().await)
}
