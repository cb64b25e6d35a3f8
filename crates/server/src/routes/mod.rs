pub mod bundles;
pub mod health;
pub mod metrics;
pub mod resources;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

/// Build the resolution and browsing routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/$resolve", post(bundles::resolve))
        .route("/$fetch", post(bundles::fetch))
        .route("/$next-page", post(bundles::next_page))
        .route("/$load", post(bundles::load))
        .route("/bundles", get(bundles::list))
        .route("/counts", get(resources::counts))
        .route("/resources/{kind}", get(resources::list))
        .route("/resources/{kind}/{id}", get(resources::read))
}
