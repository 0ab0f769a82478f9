//! Error types for routing, dispatch, transport and server lifecycle.
//!
//! The taxonomy mirrors how failures surface to clients:
//!
//! | Type / variant                  | Client sees                     | HTTP status |
//! |---------------------------------|---------------------------------|-------------|
//! | [`RoutingError`]                | its message                     | 404         |
//! | [`DispatchError::Protocol`]     | its message                     | 400         |
//! | [`DispatchError::Handler`]      | the handler's message (HTTP)    | 500         |
//! | [`DispatchError::ServerError`]  | the fixed text `Server Error`   | 500         |
//! | [`TransportError`]              | nothing (subscriber is evicted) | n/a         |
//!
//! None of these are fatal to the server. [`ServerError`] covers the
//! lifecycle and cross-domain bridge failures reported to the hosting
//! application.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

/// JSON error body sent to clients.
///
/// ```json
/// { "error": "No handler for /cmd/nope", "tid": "T1" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Transaction id of the WebSocket message that failed, echoed verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<Value>,
}

impl ErrorResponse {
    /// Creates an error body with no transaction id.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            tid: None,
        }
    }

    /// Attaches the transaction id of the originating message.
    #[must_use]
    pub fn with_tid(mut self, tid: Option<Value>) -> Self {
        self.tid = tid;
        self
    }
}

/// No handler group or function could be resolved for a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// Neither the first path segment nor `"*"` is a registered mount point.
    #[error("No handler group for {0}")]
    NoHandlerGroup(String),

    /// Neither the command segment nor `"*"` is in the group's function map.
    #[error("No handler for {0}")]
    NoHandlerFunction(String),

    /// The resolved function-map entry cannot be invoked on this surface.
    #[error("No callable handler for {0}")]
    NotCallable(String),
}

/// A failure while dispatching one HTTP request or WebSocket message.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Request could not be routed to a handler.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Malformed message envelope.
    #[error("{0}")]
    Protocol(String),

    /// User handler failed; the message is the handler's own.
    #[error("{0}")]
    Handler(anyhow::Error),

    /// User handler failed; the detail was logged and is hidden from the client.
    #[error("Server Error")]
    ServerError,

    /// Reply could not be written to the connection.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Routing(_) => StatusCode::NOT_FOUND,
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Handler(_) | Self::ServerError | Self::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed message: {err}"))
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = axum::Json(ErrorResponse::new(self.to_string())).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Writing to a WebSocket connection failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection's writer has shut down.
    #[error("connection closed")]
    Closed,

    /// The client is not reading; its outbound queue is full.
    #[error("outbound queue full")]
    Backlogged,

    /// The outbound message could not be serialized.
    #[error("unserializable message: {0}")]
    Encode(String),
}

/// A typed parameter accessor failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// The parameter is absent.
    #[error("missing parameter: {0}")]
    Missing(String),

    /// The parameter is present but has the wrong shape.
    #[error("invalid parameter {key}: {value}")]
    Invalid {
        /// Parameter name.
        key: String,
        /// The offending value, rendered as JSON.
        value: String,
    },
}

/// Lifecycle and cross-domain bridge failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The execution-domain thread or its runtime could not be created.
    #[error("failed to start execution domain: {0}")]
    Runtime(std::io::Error),

    /// A bridge call was made while the server is stopped.
    #[error("server is not running")]
    NotRunning,

    /// A blocking bridge call was made from the execution-domain thread itself.
    #[error("blocking call issued from inside the execution domain")]
    InsideDomain,

    /// The execution domain shut down before answering a call.
    #[error("execution domain exited before completing the call")]
    DomainExited,

    /// The execution-domain thread panicked.
    #[error("execution domain panicked")]
    DomainPanicked,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn routing_messages_name_the_path() {
        let err = RoutingError::NoHandlerFunction("/cmd/nope".to_string());
        assert_eq!(err.to_string(), "No handler for /cmd/nope");
        let err = RoutingError::NoHandlerGroup("/x".to_string());
        assert_eq!(err.to_string(), "No handler group for /x");
    }

    #[test]
    fn server_error_hides_detail() {
        assert_eq!(DispatchError::ServerError.to_string(), "Server Error");
    }

    #[test]
    fn handler_error_keeps_message() {
        let err = DispatchError::Handler(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn routing_maps_to_not_found() {
        let err = DispatchError::from(RoutingError::NotCallable("x".to_string()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn error_body_skips_missing_tid() {
        let Ok(json) = serde_json::to_value(ErrorResponse::new("bad")) else {
            panic!("serializable");
        };
        assert_eq!(json, serde_json::json!({"error": "bad"}));

        let body = ErrorResponse::new("bad").with_tid(Some(Value::from("T1")));
        let Ok(json) = serde_json::to_value(body) else {
            panic!("serializable");
        };
        assert_eq!(json, serde_json::json!({"error": "bad", "tid": "T1"}));
    }
}
