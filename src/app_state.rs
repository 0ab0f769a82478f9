//! State owned by the execution domain and injected into all Axum handlers.
//!
//! One [`AppState`] is built per server run and moved onto the
//! execution-domain thread. From then on only that thread touches it,
//! through the router, WebSocket connection tasks and the bridge loop.
//! The locks serialise interleaved tasks on that single thread; they are
//! never contended across threads.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::config::Options;
use crate::domain::{BroadcastReport, EventHub, HandlerRegistry};
use crate::service::ServerHandle;

/// Logs message traffic at `info` when the server is verbose, `debug` otherwise.
macro_rules! traffic {
    ($state:expr, $($arg:tt)+) => {
        if $state.verbose {
            ::tracing::info!($($arg)+)
        } else {
            ::tracing::debug!($($arg)+)
        }
    };
}
pub(crate) use traffic;

/// Shared state available to all handlers via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handler groups, in registration order.
    pub registry: Arc<RwLock<HandlerRegistry>>,
    /// Event records and subscriptions.
    pub hub: Arc<Mutex<EventHub>>,
    /// Options exposed to handlers.
    pub options: Arc<Options>,
    /// Back-reference to the owning server.
    pub server: ServerHandle,
    /// Verbose traffic logging.
    pub verbose: bool,
}

impl AppState {
    /// Creates the state for one server run.
    #[must_use]
    pub fn new(
        registry: HandlerRegistry,
        options: Options,
        verbose: bool,
        server: ServerHandle,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            hub: Arc::new(Mutex::new(EventHub::new())),
            options: Arc::new(options),
            server,
            verbose,
        }
    }

    /// State with an empty registry and no owning server.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(
            HandlerRegistry::new(),
            Options::new(),
            false,
            ServerHandle::detached(),
        )
    }

    /// Triggers `event` with `data` and broadcasts it to subscribers.
    pub async fn trigger_event(&self, event: &str, data: Value) -> BroadcastReport {
        traffic!(self, event, "trigger event");
        let report = self.hub.lock().await.trigger(event, data);
        if !report.evicted.is_empty() {
            tracing::warn!(event, evicted = report.evicted.len(), "dead subscribers evicted");
        }
        report
    }
}
