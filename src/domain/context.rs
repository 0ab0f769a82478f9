//! Per-invocation handler context.

use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri};
use serde_json::Value;

use super::event_hub::BroadcastReport;
use crate::app_state::AppState;
use crate::config::Options;
use crate::service::Server;
use crate::ws::connection::WsConnection;

/// Method, URI and headers of the request that reached a handler.
///
/// For WebSocket commands this is the upgrade request of the connection.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// HTTP method.
    pub method: Method,
    /// Full request URI, including the query string.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
}

impl From<&Parts> for RequestHead {
    fn from(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }
}

impl Default for RequestHead {
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
        }
    }
}

/// Read-only snapshot handed to a handler for one invocation.
#[derive(Debug, Clone)]
pub struct Context {
    path: String,
    request: Arc<RequestHead>,
    state: AppState,
    connection: Option<WsConnection>,
}

impl Context {
    pub(crate) fn new(
        path: String,
        request: Arc<RequestHead>,
        state: AppState,
        connection: Option<WsConnection>,
    ) -> Self {
        Self {
            path,
            request,
            state,
            connection,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(path: &str, state: AppState) -> Self {
        Self::new(path.to_string(), Arc::default(), state, None)
    }

    /// The resolved command path: the HTTP request path, or the raw
    /// command string of a WebSocket message.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The originating request.
    #[must_use]
    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    /// Application options from [`crate::config::ServerConfig::options`].
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.state.options
    }

    /// The server running this handler, if it is still alive.
    ///
    /// Blocking calls such as [`Server::trigger_event`] fail with
    /// [`crate::error::ServerError::InsideDomain`] from a handler; use
    /// [`Context::trigger_event`] instead.
    #[must_use]
    pub fn server(&self) -> Option<Server> {
        self.state.server.upgrade()
    }

    /// The WebSocket connection the command arrived on, if any.
    #[must_use]
    pub fn connection(&self) -> Option<&WsConnection> {
        self.connection.as_ref()
    }

    /// Triggers `event` directly inside the execution domain.
    pub async fn trigger_event(&self, event: &str, data: Value) -> BroadcastReport {
        self.state.trigger_event(event, data).await
    }
}
