//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::RequestHead;

/// Upgrades a request on any path to a WebSocket connection.
pub fn ws_handler(ws: WebSocketUpgrade, state: AppState, request: Arc<RequestHead>) -> Response {
    ws.on_upgrade(move |socket| run_connection(socket, state, request))
}
