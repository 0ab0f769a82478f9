//! End-to-end tests against a real server on an ephemeral port.
//!
//! Each test starts its own [`Server`] and drives it with `reqwest` and
//! `tokio-tungstenite` from a separate client runtime. External event
//! triggers are issued from the test thread, outside any runtime, the way
//! a host application would.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use switchyard::domain::WILDCARD;
use switchyard::{Context, FunctionMap, Params, Server, ServerConfig, ServerError};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Fixture {
    server: Server,
    addr: SocketAddr,
    rt: Runtime,
}

fn functions() -> FunctionMap {
    FunctionMap::new()
        .call("heartbeat", |_ctx, _q| Ok(json!({"alive": true})))
        .call("add", |_ctx, q: Params| {
            Ok(json!({"result": q.int("a")? + q.int("b")?}))
        })
        .call("boom", |_ctx, _q| -> anyhow::Result<Value> {
            anyhow::bail!("secret detail")
        })
        .call_async("bump", |ctx: Context, q: Params| async move {
            let n = q.int("n")?;
            ctx.trigger_event("bumped", json!({"n": n})).await;
            Ok::<_, anyhow::Error>(json!({"n": n}))
        })
        .call(WILDCARD, |ctx: Context, q: Params| {
            Ok(json!({"path": ctx.path(), "params": Value::from(q)}))
        })
}

fn fixture() -> Fixture {
    let config = ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)));
    let server = Server::new(config);
    let Ok(()) = server.register("cmd", "cmd", "q", "evt", "r", functions()) else {
        panic!("register");
    };
    let Ok(addr) = server.start() else {
        panic!("server starts");
    };
    let Ok(rt) = Runtime::new() else {
        panic!("client runtime");
    };
    Fixture { server, addr, rt }
}

async fn http_get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let Ok(response) = reqwest::get(format!("http://{addr}{path}")).await else {
        panic!("http request {path}");
    };
    let status = response.status().as_u16();
    let Ok(body) = response.json::<Value>().await else {
        panic!("json body");
    };
    (status, body)
}

async fn connect(addr: SocketAddr) -> Ws {
    let Ok((ws, _)) = tokio_tungstenite::connect_async(format!("ws://{addr}/")).await else {
        panic!("websocket connects");
    };
    ws
}

async fn send(ws: &mut Ws, message: Value) {
    let Ok(()) = ws.send(Message::text(message.to_string())).await else {
        panic!("websocket send");
    };
}

async fn recv(ws: &mut Ws) -> Value {
    loop {
        let Ok(Some(Ok(message))) = tokio::time::timeout(Duration::from_secs(5), ws.next()).await
        else {
            panic!("websocket message");
        };
        if let Message::Text(text) = message {
            let Ok(value) = serde_json::from_str(text.as_str()) else {
                panic!("json message");
            };
            return value;
        }
    }
}

async fn recv_nothing(ws: &mut Ws) {
    let pending = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(pending.is_err(), "unexpected message: {pending:?}");
}

#[test]
fn http_command_with_query_params() {
    let fx = fixture();
    let (status, body) = fx.rt.block_on(http_get(fx.addr, "/cmd/add?a=2&b=3"));
    assert_eq!(status, 200);
    assert_eq!(body, json!({"result": 5}));
    let Ok(()) = fx.server.stop() else {
        panic!("stops");
    };
}

#[test]
fn http_fallback_sees_path_and_params() {
    let fx = fixture();
    let (_, body) = fx.rt.block_on(http_get(fx.addr, "/cmd/catchall?a=3&b=4"));
    assert_eq!(
        body,
        json!({"path": "/cmd/catchall", "params": {"a": "3", "b": "4"}})
    );
    let (status, body) = fx.rt.block_on(http_get(fx.addr, "/other/x"));
    assert_eq!(status, 404);
    assert_eq!(body, json!({"error": "No handler group for /other/x"}));
}

#[test]
fn websocket_command_echoes_tid() {
    let fx = fixture();
    fx.rt.block_on(async {
        let mut ws = connect(fx.addr).await;
        send(&mut ws, json!({"cmd": "heartbeat", "tid": "T1"})).await;
        let reply = recv(&mut ws).await;
        assert_eq!(reply.get("tid"), Some(&json!("T1")));
        assert_eq!(reply.get("r"), Some(&json!({"alive": true})));
        assert!(reply.get("t").is_some_and(Value::is_number));

        send(&mut ws, json!({"cmd": "cmd/add", "q": {"a": 2, "b": 3}})).await;
        let reply = recv(&mut ws).await;
        assert_eq!(reply.get("r"), Some(&json!({"result": 5})));
    });
}

#[test]
fn websocket_handler_error_is_masked() {
    let fx = fixture();
    fx.rt.block_on(async {
        let mut ws = connect(fx.addr).await;
        send(&mut ws, json!({"cmd": "boom", "tid": 9})).await;
        assert_eq!(recv(&mut ws).await, json!({"error": "Server Error", "tid": 9}));

        send(&mut ws, Value::String("not an object".to_string())).await;
        let reply = recv(&mut ws).await;
        assert!(reply.get("error").is_some());

        // The connection survives both failures.
        send(&mut ws, json!({"cmd": "heartbeat"})).await;
        assert_eq!(recv(&mut ws).await.get("r"), Some(&json!({"alive": true})));
    });
}

#[test]
fn external_trigger_pushes_once_to_subscriber() {
    let fx = fixture();
    let (mut ws, uid) = fx.rt.block_on(async {
        let mut ws = connect(fx.addr).await;
        send(&mut ws, json!({"evt": "someEvent"})).await;
        let ack = recv(&mut ws).await;
        let Some(r) = ack.get("r") else {
            panic!("ack wrapped in reply key: {ack}");
        };
        assert_eq!(r.get("status"), Some(&json!("Event added")));
        let Some(uid) = r.get("uid").and_then(Value::as_str).map(str::to_string) else {
            panic!("generated uid");
        };
        assert_eq!(uid.len(), 32);

        // Nothing has been triggered yet, so there is no value to push.
        recv_nothing(&mut ws).await;
        (ws, uid)
    });

    let Ok(()) = fx.server.trigger_event("someEvent", json!({"value": 42})) else {
        panic!("trigger from outside");
    };

    fx.rt.block_on(async {
        let push = recv(&mut ws).await;
        assert_eq!(push.get("evt"), Some(&json!("someEvent")));
        assert_eq!(push.get("uid"), Some(&json!(uid)));
        assert_eq!(push.get("ver"), Some(&json!(1)));
        assert_eq!(push.get("r"), Some(&json!({"value": 42})));
        recv_nothing(&mut ws).await;
    });
}

#[test]
fn handler_trigger_reaches_other_connections() {
    let fx = fixture();
    fx.rt.block_on(async {
        let mut watcher = connect(fx.addr).await;
        send(&mut watcher, json!({"evt": "bumped", "uid": "WATCHER"})).await;
        let _ack = recv(&mut watcher).await;

        let mut caller = connect(fx.addr).await;
        send(&mut caller, json!({"cmd": "bump", "q": {"n": 7}})).await;
        assert_eq!(recv(&mut caller).await.get("r"), Some(&json!({"n": 7})));

        let push = recv(&mut watcher).await;
        assert_eq!(push.get("uid"), Some(&json!("WATCHER")));
        assert_eq!(push.get("r"), Some(&json!({"n": 7})));
    });
}

#[test]
fn resubscribe_receives_current_value() {
    let fx = fixture();
    let Ok(()) = fx.server.trigger_event("e", json!("seed")) else {
        panic!("seed");
    };
    fx.rt.block_on(async {
        let mut ws = connect(fx.addr).await;
        for _ in 0..2 {
            send(&mut ws, json!({"evt": "e", "uid": "SAME"})).await;
            let _ack = recv(&mut ws).await;
            let push = recv(&mut ws).await;
            assert_eq!(push.get("ver"), Some(&json!(1)));
            assert_eq!(push.get("r"), Some(&json!("seed")));
        }
    });
}

#[test]
fn closing_old_connection_keeps_taken_over_uid() {
    let fx = fixture();
    let mut second = fx.rt.block_on(async {
        let mut first = connect(fx.addr).await;
        send(&mut first, json!({"evt": "shared", "uid": "MINE"})).await;
        let _ack = recv(&mut first).await;

        let mut second = connect(fx.addr).await;
        send(&mut second, json!({"evt": "shared", "uid": "MINE"})).await;
        let _ack = recv(&mut second).await;

        let Ok(()) = first.close(None).await else {
            panic!("close first connection");
        };
        // Give the server time to run its disconnect cleanup.
        tokio::time::sleep(Duration::from_millis(200)).await;
        second
    });

    let Ok(()) = fx.server.trigger_event("shared", json!({"value": 1})) else {
        panic!("trigger");
    };

    fx.rt.block_on(async {
        let push = recv(&mut second).await;
        assert_eq!(push.get("uid"), Some(&json!("MINE")));
        assert_eq!(push.get("r"), Some(&json!({"value": 1})));
    });
}

#[test]
fn stop_is_idempotent_and_restart_serves_again() {
    let fx = fixture();
    let Ok(()) = fx.server.stop() else {
        panic!("stops");
    };
    let Ok(()) = fx.server.stop() else {
        panic!("second stop is a no-op");
    };
    assert!(matches!(
        fx.server.trigger_event("e", json!(1)),
        Err(ServerError::NotRunning)
    ));

    let Ok(addr) = fx.server.start() else {
        panic!("restarts");
    };
    let (_, body) = fx.rt.block_on(http_get(addr, "/cmd/add?a=1&b=1"));
    assert_eq!(body, json!({"result": 2}));
    let Ok(()) = fx.server.stop() else {
        panic!("stops again");
    };
}

#[test]
fn registration_while_running_takes_effect() {
    let fx = fixture();
    let extra = FunctionMap::new().call("ping", |_ctx, _q| Ok(json!({"pong": true})));
    let Ok(()) = fx.server.register("extra", "cmd", "q", "evt", "r", extra) else {
        panic!("register while running");
    };
    let (_, body) = fx.rt.block_on(http_get(fx.addr, "/extra/ping"));
    assert_eq!(body, json!({"pong": true}));

    assert_eq!(fx.server.unregister("extra").ok(), Some(true));
    let (status, _) = fx.rt.block_on(http_get(fx.addr, "/extra/ping"));
    assert_eq!(status, 404);
}
