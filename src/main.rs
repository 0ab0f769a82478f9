//! switchyard demo server.
//!
//! Registers a `cmd` group (`heartbeat`, `add`, and an echo fallback), an
//! `api` group backed by a shared digit matrix whose updates are pushed as
//! `matrixUpdate` events, and, when `STATIC_ROOT` is set, a `site` group
//! serving that directory. A background thread triggers a `clock` event
//! every second through the cross-domain bridge.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use switchyard::domain::WILDCARD;
use switchyard::{Context, FunctionMap, Params, Server, ServerConfig, StaticFiles};

const MATRIX_WIDTH: usize = 10;
const MATRIX_HEIGHT: usize = 10;

/// Row-major grid of digits, rendered as one string.
#[derive(Debug)]
struct Matrix {
    cells: Vec<u8>,
}

impl Matrix {
    fn new() -> Self {
        Self {
            cells: vec![0; MATRIX_WIDTH * MATRIX_HEIGHT],
        }
    }

    /// Increments the cell at (`x`, `y`), wrapping from 9 back to 0.
    fn increment(&mut self, x: usize, y: usize) -> anyhow::Result<()> {
        if x >= MATRIX_WIDTH || y >= MATRIX_HEIGHT {
            return Err(anyhow!("cell ({x}, {y}) is outside the matrix"));
        }
        let cell = self
            .cells
            .get_mut(y * MATRIX_WIDTH + x)
            .ok_or_else(|| anyhow!("cell ({x}, {y}) is outside the matrix"))?;
        *cell = (*cell + 1) % 10;
        Ok(())
    }

    fn render(&self) -> String {
        self.cells.iter().map(|d| char::from(b'0' + d)).collect()
    }
}

fn coordinate(q: &Params, key: &str) -> anyhow::Result<usize> {
    let value = q.int(key)?;
    usize::try_from(value).map_err(|_| anyhow!("invalid parameter {key}: {value}"))
}

fn cmd_functions() -> FunctionMap {
    FunctionMap::new()
        .call("heartbeat", |ctx: Context, _q| {
            Ok(json!({
                "iid": ctx.options().get("iid").cloned().unwrap_or(Value::Null),
                "info": format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            }))
        })
        .call("add", |_ctx, q: Params| {
            Ok(json!({"result": q.int("a")? + q.int("b")?}))
        })
        .call(WILDCARD, |ctx: Context, q: Params| {
            Ok(json!({"path": ctx.path(), "params": Value::from(q)}))
        })
}

fn api_functions(matrix: Arc<Mutex<Matrix>>) -> FunctionMap {
    let reader = Arc::clone(&matrix);
    FunctionMap::new()
        .call("getMatrix", move |_ctx, _q| {
            let m = reader.lock().unwrap_or_else(PoisonError::into_inner).render();
            Ok(json!({"m": m}))
        })
        .call_async("incMatrix", move |ctx: Context, q: Params| {
            let matrix = Arc::clone(&matrix);
            async move {
                let (x, y) = (coordinate(&q, "x")?, coordinate(&q, "y")?);
                let m = {
                    let mut matrix = matrix.lock().unwrap_or_else(PoisonError::into_inner);
                    matrix.increment(x, y)?;
                    matrix.render()
                };
                ctx.trigger_event("matrixUpdate", json!({"m": m})).await;
                Ok::<_, anyhow::Error>(json!({"m": m}))
            }
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let iid = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    let config = ServerConfig::from_env()?
        .with_option("iid", iid)
        .with_option("w", MATRIX_WIDTH)
        .with_option("h", MATRIX_HEIGHT);
    tracing::info!(addr = %config.listen_addr, "starting switchyard");

    // Register handler groups
    let server = Server::new(config);
    let matrix = Arc::new(Mutex::new(Matrix::new()));
    server.register("cmd", "cmd", "q", "evt", "r", cmd_functions())?;
    server.register("api", "cmd", "q", "evt", "r", api_functions(Arc::clone(&matrix)))?;
    if let Ok(root) = std::env::var("STATIC_ROOT") {
        let files = StaticFiles::new(root).default_page("index.html");
        server.register("site", "", "", "", "", FunctionMap::new().static_files(WILDCARD, files))?;
    }

    // Start server
    let starter = server.clone();
    let addr = tokio::task::spawn_blocking(move || starter.start()).await??;
    tracing::info!(%addr, "demo running");

    let initial = matrix.lock().unwrap_or_else(PoisonError::into_inner).render();
    server
        .trigger_event_async("matrixUpdate", json!({"m": initial}))
        .await?;

    // External clock, pushed through the bridge
    let clock = server.clone();
    std::thread::spawn(move || {
        loop {
            std::thread::sleep(Duration::from_secs(1));
            let now = chrono::Utc::now().to_rfc3339();
            if let Err(err) = clock.trigger_event("clock", json!({"now": now})) {
                tracing::info!(error = %err, "clock stopped");
                break;
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    tokio::task::spawn_blocking(move || server.stop()).await??;

    Ok(())
}
