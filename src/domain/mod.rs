//! Domain layer: handlers, routing registry, and the event hub.
//!
//! This module contains the dispatch model: what a handler is and what
//! it returns, the handler groups it is registered under, the context
//! and parameters it is invoked with, and the versioned event state that
//! WebSocket subscribers are pushed from.

pub mod context;
pub mod event_hub;
pub mod handler;
pub mod handler_registry;
pub mod params;
pub mod subscriber_id;

pub use context::{Context, RequestHead};
pub use event_hub::{BroadcastReport, EventHub, EventRecord, Subscription};
pub use handler::{
    Completion, FunctionEntry, FunctionMap, Handler, HandlerResult, Reply, WILDCARD,
};
pub use handler_registry::{HandlerGroup, HandlerRegistry, HttpRoute, split_path};
pub use params::Params;
pub use subscriber_id::SubscriberId;
