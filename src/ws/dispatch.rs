//! WebSocket envelope dispatch.
//!
//! Each text message is one JSON object. Handler groups are scanned in
//! registration order; the first group whose event key or command key is
//! present in the message handles it, and unmatched messages are dropped.
//! Any failure is answered on the same connection with
//! `{"error": ..., "tid": ...}` and the connection stays open.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::connection::WsConnection;
use super::messages::{EVENT_ADDED, SubscribeAck, TID_KEY, UID_KEY, shape_reply};
use crate::app_state::{AppState, traffic};
use crate::domain::{Context, HandlerGroup, Params, Reply, RequestHead, SubscriberId};
use crate::error::{DispatchError, ErrorResponse, RoutingError};

/// Dispatches one text message and writes the reply or error.
///
/// Subscriber ids registered by this message are appended to `owned` so
/// the connection can drop them when it closes.
pub async fn handle_text(
    state: &AppState,
    connection: &WsConnection,
    request: &Arc<RequestHead>,
    text: &str,
    owned: &mut Vec<SubscriberId>,
) {
    traffic!(state, conn_id = %connection.id(), message = text, "websocket message");

    let mut tid = None;
    if let Err(err) = dispatch(state, connection, request, text, &mut tid, owned).await {
        tracing::warn!(conn_id = %connection.id(), error = %err, "websocket message failed");
        let body = ErrorResponse::new(err.to_string()).with_tid(tid);
        if let Err(send_err) = connection.send_json(&body) {
            tracing::debug!(conn_id = %connection.id(), error = %send_err, "error reply not sent");
        }
    }
}

async fn dispatch(
    state: &AppState,
    connection: &WsConnection,
    request: &Arc<RequestHead>,
    text: &str,
    tid: &mut Option<Value>,
    owned: &mut Vec<SubscriberId>,
) -> Result<(), DispatchError> {
    let Value::Object(envelope) = serde_json::from_str::<Value>(text)? else {
        return Err(DispatchError::Protocol(
            "message must be a JSON object".to_string(),
        ));
    };
    *tid = envelope.get(TID_KEY).filter(|v| !v.is_null()).cloned();

    let groups = state.registry.read().await.groups().to_vec();
    for group in groups {
        if let Some(event) = field(&envelope, group.event_key()) {
            return subscribe(state, connection, &group, &envelope, event, tid.as_ref(), owned)
                .await;
        }
        if let Some(command) = field(&envelope, group.command_key()) {
            return command_call(
                state,
                connection,
                request,
                &group,
                &envelope,
                command,
                tid.as_ref(),
            )
            .await;
        }
    }

    traffic!(state, conn_id = %connection.id(), "no handler group matched; message dropped");
    Ok(())
}

/// Returns `envelope[key]` unless `key` is empty.
fn field<'a>(envelope: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        None
    } else {
        envelope.get(key)
    }
}

async fn subscribe(
    state: &AppState,
    connection: &WsConnection,
    group: &HandlerGroup,
    envelope: &Map<String, Value>,
    event: &Value,
    tid: Option<&Value>,
    owned: &mut Vec<SubscriberId>,
) -> Result<(), DispatchError> {
    let event = event.as_str().ok_or_else(|| {
        DispatchError::Protocol(format!(
            "event name in '{}' must be a string",
            group.event_key()
        ))
    })?;
    let uid = match envelope.get(UID_KEY).and_then(Value::as_str) {
        Some(uid) if !uid.is_empty() => SubscriberId::from(uid),
        _ => SubscriberId::generate(),
    };
    if !owned.contains(&uid) {
        owned.push(uid.clone());
    }
    traffic!(state, event, %uid, "event subscription");

    let mut hub = state.hub.lock().await;
    hub.subscribe(event, uid.clone(), connection.clone());

    let ack = serde_json::to_value(SubscribeAck {
        uid: &uid,
        status: EVENT_ADDED,
    })?;
    send_reply(state, connection, group, ack, tid)?;

    let report = hub.broadcast(event);
    if !report.evicted.is_empty() {
        tracing::warn!(event, evicted = report.evicted.len(), "dead subscribers evicted");
    }
    Ok(())
}

async fn command_call(
    state: &AppState,
    connection: &WsConnection,
    request: &Arc<RequestHead>,
    group: &HandlerGroup,
    envelope: &Map<String, Value>,
    command: &Value,
    tid: Option<&Value>,
) -> Result<(), DispatchError> {
    let command = command.as_str().ok_or_else(|| {
        DispatchError::Protocol(format!(
            "command in '{}' must be a string",
            group.command_key()
        ))
    })?;
    let params = match field(envelope, group.params_key()) {
        Some(Value::Object(params)) => Params::from(params.clone()),
        Some(other) => {
            return Err(DispatchError::Protocol(format!(
                "parameters in '{}' must be an object, got {other}",
                group.params_key()
            )));
        }
        None => Params::from(envelope.clone()),
    };

    let segment = group.command_segment(command);
    let handler = group
        .resolve(segment, command)?
        .as_handler()
        .ok_or_else(|| RoutingError::NotCallable(command.to_string()))?;

    let ctx = Context::new(
        command.to_string(),
        Arc::clone(request),
        state.clone(),
        Some(connection.clone()),
    );
    let reply = match handler.call(ctx, params).resolve().await {
        Ok(reply) => reply,
        Err(err) => {
            tracing::error!(command, error = %format!("{err:#}"), "handler failed");
            return Err(DispatchError::ServerError);
        }
    };

    match reply {
        Reply::Json(Value::Null) => Ok(()),
        Reply::Json(result) => send_reply(state, connection, group, result, tid),
        Reply::Response(_) => Err(DispatchError::Protocol(format!(
            "handler for {command} returned an HTTP response"
        ))),
    }
}

fn send_reply(
    state: &AppState,
    connection: &WsConnection,
    group: &HandlerGroup,
    result: Value,
    tid: Option<&Value>,
) -> Result<(), DispatchError> {
    let reply = shape_reply(group.reply_key(), result, tid)?;
    let shown = Value::Object(reply.clone());
    traffic!(state, conn_id = %connection.id(), reply = %shown, "websocket reply");
    connection.send_json(&reply)?;
    Ok(())
}
