//! HTTP layer: the unified router, HTTP dispatch, and static file entries.
//!
//! The router has no fixed routes. Every path falls through to
//! [`dispatch::entry`], which either upgrades to a WebSocket or resolves the
//! path against the handler registry.

pub mod dispatch;
pub mod static_files;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub use static_files::StaticFiles;

/// Builds the router serving both surfaces for one server run.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch::entry)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
