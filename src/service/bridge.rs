//! Cross-domain bridge: calls from arbitrary threads into the execution domain.
//!
//! Callers enqueue a [`PendingCall`] on an unbounded channel read by the
//! domain's control loop, then wait for the loop to post the result back.
//! The loop services calls one at a time in arrival order.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::domain;
use crate::app_state::{AppState, traffic};
use crate::domain::HandlerGroup;
use crate::error::ServerError;

/// An operation executed inside the execution domain on behalf of a caller.
#[derive(Debug)]
pub(crate) enum DomainCall {
    /// Set an event's value and broadcast it.
    TriggerEvent {
        /// Event name.
        event: String,
        /// New value.
        data: Value,
    },
    /// Insert or replace a handler group.
    Register(Arc<HandlerGroup>),
    /// Remove the handler group at a mount point.
    Unregister(String),
}

impl DomainCall {
    fn name(&self) -> &'static str {
        match self {
            Self::TriggerEvent { .. } => "trigger_event",
            Self::Register(_) => "register",
            Self::Unregister(_) => "unregister",
        }
    }
}

/// Where the result of a call is posted.
#[derive(Debug)]
enum Responder {
    /// A thread parked in [`Bridge::call_blocking`].
    Blocking(std_mpsc::SyncSender<Result<(), ServerError>>),
    /// A task awaiting [`Bridge::call`].
    Async(oneshot::Sender<Result<(), ServerError>>),
}

impl Responder {
    fn send(self, result: Result<(), ServerError>) {
        // A caller that gave up waiting is not an error for the domain.
        match self {
            Self::Blocking(tx) => {
                let _ = tx.send(result);
            }
            Self::Async(tx) => {
                let _ = tx.send(result);
            }
        }
    }
}

/// A queued call and the channel its result goes back on.
#[derive(Debug)]
pub(crate) struct PendingCall {
    call: DomainCall,
    responder: Responder,
}

/// Messages read by the domain's control loop.
#[derive(Debug)]
pub(crate) enum Control {
    /// Execute a call and post its result.
    Call(PendingCall),
    /// Leave the control loop and shut the domain down.
    Shutdown,
}

/// Sending side of the control channel.
#[derive(Debug, Clone)]
pub(crate) struct Bridge {
    tx: mpsc::UnboundedSender<Control>,
}

impl Bridge {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Control>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Runs `call` in the domain and blocks the current thread until it
    /// completes.
    ///
    /// Safe to call from any thread, including async worker threads of
    /// another runtime, except the domain thread itself.
    pub(crate) fn call_blocking(&self, call: DomainCall) -> Result<(), ServerError> {
        if domain::is_current() {
            return Err(ServerError::InsideDomain);
        }
        let (tx, rx) = std_mpsc::sync_channel(1);
        self.enqueue(call, Responder::Blocking(tx))?;
        rx.recv().map_err(|_| ServerError::DomainExited)?
    }

    /// Runs `call` in the domain and waits for it without blocking.
    pub(crate) async fn call(&self, call: DomainCall) -> Result<(), ServerError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(call, Responder::Async(tx))?;
        rx.await.map_err(|_| ServerError::DomainExited)?
    }

    /// Asks the control loop to exit. Returns `false` if it already has.
    pub(crate) fn shutdown(&self) -> bool {
        self.tx.send(Control::Shutdown).is_ok()
    }

    fn enqueue(&self, call: DomainCall, responder: Responder) -> Result<(), ServerError> {
        self.tx
            .send(Control::Call(PendingCall { call, responder }))
            .map_err(|_| ServerError::DomainExited)
    }
}

/// Executes one pending call against the run's state and posts the result.
pub(crate) async fn service(state: &AppState, pending: PendingCall) {
    let PendingCall { call, responder } = pending;
    traffic!(state, call = call.name(), "bridge call");
    let result = execute(state, call).await;
    responder.send(result);
}

async fn execute(state: &AppState, call: DomainCall) -> Result<(), ServerError> {
    match call {
        DomainCall::TriggerEvent { event, data } => {
            state.trigger_event(&event, data).await;
        }
        DomainCall::Register(group) => {
            traffic!(state, mount_point = group.mount_point(), "handler group registered");
            state.registry.write().await.insert(group);
        }
        DomainCall::Unregister(mount_point) => {
            traffic!(state, mount_point, "handler group unregistered");
            state.registry.write().await.unregister(&mount_point);
        }
    }
    Ok(())
}
