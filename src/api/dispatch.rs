//! Unified entry point and HTTP dispatch.
//!
//! Every request, on every path, arrives at [`entry`]. WebSocket upgrade
//! requests are handed to the WebSocket layer; everything else is routed
//! through the handler registry by its path, with the query string as
//! parameters.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, Request, State};
use axum::response::{IntoResponse, Response};

use crate::app_state::{AppState, traffic};
use crate::domain::{Context, FunctionEntry, Params, Reply, RequestHead};
use crate::error::DispatchError;
use crate::ws::handler::ws_handler;

/// Fallback handler for the whole router.
pub async fn entry(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Response {
    let (parts, _body) = request.into_parts();
    let head = Arc::new(RequestHead::from(&parts));
    match upgrade {
        Ok(ws) => ws_handler(ws, state, head),
        Err(_) => match dispatch_http(&state, head).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        },
    }
}

/// Routes one HTTP request and invokes its handler.
///
/// # Errors
///
/// Returns [`DispatchError::Routing`] if no group or function matches,
/// [`DispatchError::Protocol`] for an unparsable query string, and
/// [`DispatchError::Handler`] carrying the handler's own error.
pub async fn dispatch_http(
    state: &AppState,
    head: Arc<RequestHead>,
) -> Result<Response, DispatchError> {
    let path = head.uri.path().to_string();
    traffic!(state, method = %head.method, uri = %head.uri, "http request");

    let route = state.registry.read().await.route_http(&path)?;
    let handler = match &route.entry {
        FunctionEntry::Static(files) => return files.serve(&head, &route.remainder).await,
        FunctionEntry::Call(handler) => Arc::clone(handler),
    };

    let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(&head.uri)
        .map_err(|e| DispatchError::Protocol(e.body_text()))?;
    let params: Params = query.into_iter().collect();

    let ctx = Context::new(path.clone(), head, state.clone(), None);
    match handler.call(ctx, params).resolve().await {
        Ok(Reply::Json(value)) => Ok(Json(value).into_response()),
        Ok(Reply::Response(response)) => Ok(response),
        Err(err) => {
            tracing::error!(path, error = %format!("{err:#}"), "handler failed");
            Err(DispatchError::Handler(err))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::api::{StaticFiles, build_router};
    use crate::domain::{FunctionMap, HandlerGroup, HandlerRegistry, WILDCARD};

    fn app(groups: Vec<HandlerGroup>) -> axum::Router {
        let mut registry = HandlerRegistry::new();
        for group in groups {
            registry.register(group);
        }
        let mut state = AppState::detached();
        state.registry = Arc::new(tokio::sync::RwLock::new(registry));
        build_router(state)
    }

    fn cmd_group() -> HandlerGroup {
        let functions = FunctionMap::new()
            .call("add", |_ctx, q: Params| {
                Ok(json!({"result": q.int("a")? + q.int("b")?}))
            })
            .call("fail", |_ctx, _q| -> anyhow::Result<Value> {
                anyhow::bail!("division by zero")
            })
            .call(WILDCARD, |ctx: Context, q: Params| {
                Ok(json!({"path": ctx.path(), "params": Value::from(q)}))
            });
        HandlerGroup::new("cmd", "cmd", "q", "evt", "r", functions)
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let Ok(request) = axum::http::Request::builder().uri(uri).body(Body::empty()) else {
            panic!("request builds");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("infallible");
        };
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), 1 << 20).await else {
            panic!("body readable");
        };
        let Ok(body) = serde_json::from_slice(&bytes) else {
            panic!("json body");
        };
        (status, body)
    }

    #[tokio::test]
    async fn query_params_reach_handler() {
        let (status, body) = get(app(vec![cmd_group()]), "/cmd/add?a=2&b=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": 5}));
    }

    #[tokio::test]
    async fn unknown_segment_uses_wildcard() {
        let (status, body) = get(app(vec![cmd_group()]), "/cmd/catchall?a=3&b=4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"path": "/cmd/catchall", "params": {"a": "3", "b": "4"}})
        );
    }

    #[tokio::test]
    async fn single_segment_uses_wildcard() {
        let (_, body) = get(app(vec![cmd_group()]), "/cmd").await;
        assert_eq!(body.get("path"), Some(&json!("/cmd")));
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let (status, body) = get(app(vec![cmd_group()]), "/nope/add").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "No handler group for /nope/add"}));
    }

    #[tokio::test]
    async fn unknown_function_without_wildcard_is_not_found() {
        let functions = FunctionMap::new().call("only", |_ctx, _q| Ok(json!({})));
        let group = HandlerGroup::new("api", "cmd", "q", "evt", "r", functions);
        let (status, body) = get(app(vec![group]), "/api/other").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "No handler for /api/other"}));
    }

    #[tokio::test]
    async fn root_falls_back_to_wildcard_group() {
        let functions = FunctionMap::new().call(WILDCARD, |ctx: Context, _q| {
            Ok(json!({"path": ctx.path()}))
        });
        let group = HandlerGroup::new(WILDCARD, "cmd", "q", "evt", "r", functions);
        let (status, body) = get(app(vec![group]), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"path": "/"}));
    }

    #[tokio::test]
    async fn handler_error_shows_message() {
        let (status, body) = get(app(vec![cmd_group()]), "/cmd/fail").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "division by zero"}));
    }

    #[tokio::test]
    async fn missing_param_is_handler_error() {
        let (status, body) = get(app(vec![cmd_group()]), "/cmd/add?a=1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "missing parameter: b"}));
    }

    #[tokio::test]
    async fn prebuilt_response_passes_through() {
        let functions = FunctionMap::new().call("raw", |_ctx, _q| {
            Ok((StatusCode::ACCEPTED, [(header::CONTENT_TYPE, "text/plain")], "raw").into_response())
        });
        let group = HandlerGroup::new("x", "cmd", "q", "evt", "r", functions);
        let Ok(request) = axum::http::Request::builder().uri("/x/raw").body(Body::empty()) else {
            panic!("request builds");
        };
        let Ok(response) = app(vec![group]).oneshot(request).await else {
            panic!("infallible");
        };
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), 1 << 20).await else {
            panic!("body readable");
        };
        assert_eq!(bytes.as_ref(), b"raw");
    }

    #[tokio::test]
    async fn async_handler_is_awaited() {
        let functions = FunctionMap::new().call_async("later", |_ctx, q: Params| async move {
            tokio::task::yield_now().await;
            Ok::<_, anyhow::Error>(json!({"n": q.len()}))
        });
        let group = HandlerGroup::new("a", "cmd", "q", "evt", "r", functions);
        let (_, body) = get(app(vec![group]), "/a/later?x=1").await;
        assert_eq!(body, json!({"n": 1}));
    }

    #[tokio::test]
    async fn static_entry_serves_remainder() {
        let root = std::env::temp_dir().join(format!("switchyard-http-{}", uuid::Uuid::new_v4()));
        let Ok(()) = std::fs::create_dir_all(&root) else {
            panic!("temp dir");
        };
        let Ok(()) = std::fs::write(root.join("data.json"), r#"{"served":true}"#) else {
            panic!("write file");
        };
        let functions = FunctionMap::new().static_files(WILDCARD, StaticFiles::new(&root));
        let group = HandlerGroup::new("site", "", "", "", "", functions);
        let (status, body) = get(app(vec![group]), "/site/data.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"served": true}));
        let _ = std::fs::remove_dir_all(root);
    }
}
