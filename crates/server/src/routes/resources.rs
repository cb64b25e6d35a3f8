//! Browsing the resources held in the bundle store

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
};
use fhir_graph_core::{Bundle, BundleEntry, ResourceKind};
use serde_json::Value as JsonValue;

use crate::AppState;
use crate::error::AppError;

/// GET /resources/{kind} - searchset of every stored resource of a type.
///
/// `kind` is a resource type (`Patient`) or its collection slug
/// (`patients`, `reports`).
pub async fn list(State(state): State<AppState>, Path(kind): Path<String>) -> Json<Bundle> {
    let kind = ResourceKind::parse(&kind);
    let entries: Vec<BundleEntry> = state
        .store
        .resources_of(&kind)
        .await
        .into_iter()
        .map(|resource| BundleEntry::new(None, resource))
        .collect();

    Json(Bundle::searchset(entries.len() as u32, entries))
}

/// GET /resources/{kind}/{id}
pub async fn read(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<JsonValue>, AppError> {
    let kind = ResourceKind::parse(&kind);
    state
        .store
        .find(&kind, &id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{kind}/{id} is not in the loaded bundles")))
}

/// GET /counts - stored resources per tracked type
pub async fn counts(State(state): State<AppState>) -> Json<BTreeMap<String, usize>> {
    Json(state.store.counts().await)
}
