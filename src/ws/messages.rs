//! WebSocket wire messages: event pushes, subscription acks, reply shaping.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::SubscriberId;
use crate::error::DispatchError;

/// Reply field carrying the transaction id.
pub const TID_KEY: &str = "tid";

/// Reply field carrying the timestamp.
pub const TIMESTAMP_KEY: &str = "t";

/// Request field carrying a client-chosen subscriber id.
pub const UID_KEY: &str = "uid";

/// Status text of a subscription acknowledgement.
pub const EVENT_ADDED: &str = "Event added";

/// Current time as fractional seconds since the Unix epoch.
#[must_use]
pub fn timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Server → client push of an event's latest value.
///
/// ```json
/// {"evt": "matrixUpdate", "uid": "3F0C...", "ver": 4, "t": 1700000000.25, "r": {"m": "0010"}}
/// ```
#[derive(Debug, Serialize)]
pub struct EventPush<'a> {
    /// Event name.
    pub evt: &'a str,
    /// Subscriber the push is addressed to.
    pub uid: &'a SubscriberId,
    /// Event version.
    pub ver: u64,
    /// Send time.
    pub t: f64,
    /// Event value.
    pub r: &'a Value,
}

/// Result of an event subscription, shaped like any other reply.
#[derive(Debug, Serialize)]
pub struct SubscribeAck<'a> {
    /// Subscriber id, generated if the client did not supply one.
    pub uid: &'a SubscriberId,
    /// Always [`EVENT_ADDED`].
    pub status: &'static str,
}

/// Shapes a handler result into a reply envelope.
///
/// With a `reply_key` the result is wrapped as `{reply_key: result}`;
/// without one the result's fields are merged at the top level. The
/// transaction id is attached when present, and a timestamp when the
/// reply does not already carry one.
///
/// # Errors
///
/// Returns [`DispatchError::Protocol`] if `reply_key` is empty and the
/// result is not a JSON object.
pub fn shape_reply(
    reply_key: &str,
    result: Value,
    tid: Option<&Value>,
) -> Result<Map<String, Value>, DispatchError> {
    let mut reply = if reply_key.is_empty() {
        match result {
            Value::Object(fields) => fields,
            other => {
                return Err(DispatchError::Protocol(format!(
                    "cannot merge non-object result into reply: {other}"
                )));
            }
        }
    } else {
        let mut wrapped = Map::new();
        wrapped.insert(reply_key.to_string(), result);
        wrapped
    };

    if let Some(tid) = tid {
        reply.insert(TID_KEY.to_string(), tid.clone());
    }
    if !reply.contains_key(TIMESTAMP_KEY) {
        reply.insert(TIMESTAMP_KEY.to_string(), Value::from(timestamp()));
    }
    Ok(reply)
}
