//! # switchyard
//!
//! A unified command-dispatch server. One listening socket accepts plain
//! HTTP requests and WebSocket connections; both are routed by a path-like
//! command to handler functions registered in named groups. WebSocket
//! clients can also subscribe to named events and receive a push whenever
//! an event is triggered, including from threads outside the server.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)            Host application threads
//!     │                                    │
//!     ├── Router + HTTP dispatch (api/)    ├── Server (service/)
//!     ├── WS connections + dispatch (ws/)  │     register / start / stop
//!     │                                    │     trigger_event
//!     │                                    └── Bridge (service/)
//!     │                                           │
//!     └──────── execution domain thread ──────────┘
//!                  │
//!                  ├── HandlerRegistry (domain/)
//!                  └── EventHub (domain/)
//! ```
//!
//! All dispatch state lives on a single execution-domain thread. Other
//! threads only reach it through [`Server`], whose blocking calls are
//! queued to the domain and answered in arrival order.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;

pub use api::StaticFiles;
pub use config::ServerConfig;
pub use domain::{Context, FunctionMap, Handler, Params, Reply};
pub use error::{DispatchError, ServerError};
pub use service::{Server, ServerHandle};
