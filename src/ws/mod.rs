//! WebSocket layer: connection handling, envelope dispatch, event pushes.
//!
//! Any path accepts a WebSocket upgrade. Each text message is a JSON
//! envelope routed to a handler group by the keys it contains; event
//! subscriptions are registered with the [`crate::domain::EventHub`].

pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod messages;

pub use connection::WsConnection;
