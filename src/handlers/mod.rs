pub mod admin;
pub mod public;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(public::router().layer(CorsLayer::permissive()))
        .merge(admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
