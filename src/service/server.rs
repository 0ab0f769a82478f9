//! The server handle: registration, lifecycle, and external event triggers.
//!
//! [`Server`] is cheap to clone and safe to share between threads. The
//! handler registry it keeps is the source of truth for the next run;
//! while running, changes are also forwarded into the execution domain
//! through the bridge so the domain stays the only writer of its own
//! copy.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

use super::bridge::{Bridge, DomainCall};
use super::domain::{self, Running};
use crate::app_state::traffic;
use crate::config::ServerConfig;
use crate::domain::{FunctionMap, HandlerGroup, HandlerRegistry};
use crate::error::ServerError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn outside_domain() -> Result<(), ServerError> {
    if domain::is_current() {
        Err(ServerError::InsideDomain)
    } else {
        Ok(())
    }
}

#[derive(Debug)]
struct ServerInner {
    config: ServerConfig,
    registry: Mutex<HandlerRegistry>,
    run: Mutex<Option<Running>>,
    /// Serialises start, stop and registration.
    lifecycle: Mutex<()>,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        let Some(running) = lock(&self.run).take() else {
            return;
        };
        if domain::is_current() {
            running.detach();
        } else if let Err(err) = running.stop() {
            tracing::error!(error = %err, "server did not stop cleanly");
        }
    }
}

/// A unified HTTP and WebSocket command-dispatch server.
///
/// ```ignore
/// let server = Server::new(ServerConfig::default());
/// server.register("cmd", "cmd", "q", "evt", "r", FunctionMap::new()
///     .call("add", |_ctx, q| Ok(json!({"result": q.int("a")? + q.int("b")?}))))?;
/// let addr = server.start()?;
/// server.trigger_event("clock", json!({"now": 1}))?;
/// server.stop()?;
/// ```
#[derive(Debug, Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                config,
                registry: Mutex::new(HandlerRegistry::new()),
                run: Mutex::new(None),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    /// The server's configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Registers a handler group, replacing any group at the same mount point.
    ///
    /// See [`HandlerGroup::new`] for the meaning of each key.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InsideDomain`] when called from a handler and
    /// [`ServerError::DomainExited`] if the running domain went away.
    pub fn register(
        &self,
        mount_point: &str,
        command_key: &str,
        params_key: &str,
        event_key: &str,
        reply_key: &str,
        functions: FunctionMap,
    ) -> Result<(), ServerError> {
        self.register_group(HandlerGroup::new(
            mount_point,
            command_key,
            params_key,
            event_key,
            reply_key,
            functions,
        ))
    }

    /// Registers a prepared handler group.
    ///
    /// # Errors
    ///
    /// Same as [`Server::register`].
    pub fn register_group(&self, group: HandlerGroup) -> Result<(), ServerError> {
        outside_domain()?;
        let _guard = lock(&self.inner.lifecycle);
        let group = Arc::new(group);
        traffic!(self.inner.config, mount_point = group.mount_point(), "register handler group");
        lock(&self.inner.registry).insert(Arc::clone(&group));
        match self.bridge() {
            Some(bridge) => bridge.call_blocking(DomainCall::Register(group)),
            None => Ok(()),
        }
    }

    /// Removes the group at `mount_point`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Same as [`Server::register`].
    pub fn unregister(&self, mount_point: &str) -> Result<bool, ServerError> {
        outside_domain()?;
        let _guard = lock(&self.inner.lifecycle);
        let removed = lock(&self.inner.registry).unregister(mount_point).is_some();
        if let Some(bridge) = self.bridge() {
            bridge.call_blocking(DomainCall::Unregister(mount_point.to_string()))?;
        }
        Ok(removed)
    }

    /// Starts serving, restarting if already running. Returns the bound
    /// address, which differs from the configured one when its port is 0.
    ///
    /// Groups registered so far are copied into the new run. Event state
    /// and open connections of a previous run are not carried over.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is unavailable,
    /// [`ServerError::Runtime`] if the domain thread cannot be created, and
    /// [`ServerError::InsideDomain`] when called from a handler.
    pub fn start(&self) -> Result<SocketAddr, ServerError> {
        outside_domain()?;
        let _guard = lock(&self.inner.lifecycle);
        self.stop_locked()?;

        let registry = lock(&self.inner.registry).clone();
        let running = Running::spawn(&self.inner.config, registry, self.handle())?;
        let addr = running.addr;
        *lock(&self.inner.run) = Some(running);
        Ok(addr)
    }

    /// Stops serving and waits until the execution domain has exited.
    /// Does nothing if the server is not running.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DomainPanicked`] if the domain thread
    /// panicked and [`ServerError::InsideDomain`] when called from a
    /// handler.
    pub fn stop(&self) -> Result<(), ServerError> {
        outside_domain()?;
        let _guard = lock(&self.inner.lifecycle);
        self.stop_locked()
    }

    fn stop_locked(&self) -> Result<(), ServerError> {
        let running = lock(&self.inner.run).take();
        match running {
            Some(running) => running.stop(),
            None => Ok(()),
        }
    }

    /// Returns `true` while the execution domain is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.run).is_some()
    }

    /// The bound address of the current run.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.run).as_ref().map(|running| running.addr)
    }

    /// Sets the value of `event` and pushes it to every subscriber,
    /// blocking until the execution domain has done so.
    ///
    /// Callable from any thread except the execution domain's; handlers
    /// use [`crate::domain::Context::trigger_event`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotRunning`] if the server is stopped,
    /// [`ServerError::InsideDomain`] from a handler, and
    /// [`ServerError::DomainExited`] if the domain stopped mid-call.
    pub fn trigger_event(&self, event: &str, data: Value) -> Result<(), ServerError> {
        let bridge = self.bridge().ok_or(ServerError::NotRunning)?;
        bridge.call_blocking(DomainCall::TriggerEvent {
            event: event.to_string(),
            data,
        })
    }

    /// Async form of [`Server::trigger_event`] for callers running on
    /// another Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotRunning`] if the server is stopped and
    /// [`ServerError::DomainExited`] if the domain stopped mid-call.
    pub async fn trigger_event_async(&self, event: &str, data: Value) -> Result<(), ServerError> {
        let bridge = self.bridge().ok_or(ServerError::NotRunning)?;
        bridge
            .call(DomainCall::TriggerEvent {
                event: event.to_string(),
                data,
            })
            .await
    }

    /// A weak handle that does not keep the server alive.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle(Arc::downgrade(&self.inner))
    }

    fn bridge(&self) -> Option<Bridge> {
        lock(&self.inner.run)
            .as_ref()
            .map(|running| running.bridge.clone())
    }
}

/// Non-owning reference to a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle(Weak<ServerInner>);

impl ServerHandle {
    /// A handle that never upgrades.
    #[must_use]
    pub fn detached() -> Self {
        Self(Weak::new())
    }

    /// Returns the server if it still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<Server> {
        self.0.upgrade().map(|inner| Server { inner })
    }
}
