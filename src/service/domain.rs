//! The execution domain: one thread, one single-threaded runtime.
//!
//! The thread binds the listener, serves HTTP and WebSocket traffic, and
//! runs the bridge control loop, all on a `current_thread` Tokio runtime.
//! Handler invocations, broadcasts and bridge calls interleave on it but
//! never run in parallel.

use std::cell::Cell;
use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::ServerHandle;
use super::bridge::{self, Bridge, Control};
use crate::api::build_router;
use crate::app_state::AppState;
use crate::config::ServerConfig;
use crate::domain::HandlerRegistry;
use crate::error::ServerError;

thread_local! {
    static IN_DOMAIN: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` on an execution-domain thread.
pub(crate) fn is_current() -> bool {
    IN_DOMAIN.with(Cell::get)
}

/// A live execution domain.
#[derive(Debug)]
pub(crate) struct Running {
    pub(crate) addr: SocketAddr,
    pub(crate) bridge: Bridge,
    thread: JoinHandle<()>,
}

impl Running {
    /// Spawns the domain thread and waits until it is listening.
    ///
    /// `registry` is the run's initial set of handler groups.
    pub(crate) fn spawn(
        config: &ServerConfig,
        registry: HandlerRegistry,
        server: ServerHandle,
    ) -> Result<Self, ServerError> {
        let (bridge, control) = Bridge::channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let addr = config.listen_addr;
        let state = AppState::new(registry, config.options.clone(), config.verbose, server);

        let thread = std::thread::Builder::new()
            .name("switchyard-domain".to_string())
            .spawn(move || run(addr, state, control, ready_tx))
            .map_err(ServerError::Runtime)?;

        match ready_rx.recv() {
            Ok(Ok(addr)) => Ok(Self {
                addr,
                bridge,
                thread,
            }),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => match thread.join() {
                Ok(()) => Err(ServerError::DomainExited),
                Err(_) => Err(ServerError::DomainPanicked),
            },
        }
    }

    /// Signals shutdown and waits for the thread to exit.
    pub(crate) fn stop(self) -> Result<(), ServerError> {
        self.bridge.shutdown();
        self.thread
            .join()
            .map_err(|_| ServerError::DomainPanicked)
    }

    /// Signals shutdown without waiting. Used from the domain thread itself.
    pub(crate) fn detach(self) {
        self.bridge.shutdown();
    }
}

fn run(
    addr: SocketAddr,
    state: AppState,
    mut control: mpsc::UnboundedReceiver<Control>,
    ready: std_mpsc::SyncSender<Result<SocketAddr, ServerError>>,
) {
    IN_DOMAIN.with(|flag| flag.set(true));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(ServerError::Runtime(err)));
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                let _ = ready.send(Err(ServerError::Bind { addr, source }));
                return;
            }
        };
        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(source) => {
                let _ = ready.send(Err(ServerError::Bind { addr, source }));
                return;
            }
        };

        let router = build_router(state.clone());
        let serve = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!(error = %err, "listener failed");
            }
        });
        tracing::info!(addr = %local, "server listening");
        let _ = ready.send(Ok(local));

        while let Some(control) = control.recv().await {
            match control {
                Control::Call(pending) => bridge::service(&state, pending).await,
                Control::Shutdown => break,
            }
        }

        serve.abort();
        let _ = serve.await;
        tracing::info!(addr = %local, "server stopped");
    });

    // Dropping the runtime cancels the remaining connection tasks and
    // releases their sockets before the thread exits.
    drop(runtime);
}
