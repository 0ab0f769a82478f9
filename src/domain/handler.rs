//! Handler abstraction: what a function-map entry is and what it returns.
//!
//! A [`Handler`] is invoked with a [`Context`] and [`Params`] and yields a
//! [`Completion`], which is either an immediate result or a boxed future.
//! The dispatcher resolves both the same way, so synchronous closures and
//! `async` handlers can live in the same [`FunctionMap`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use axum::response::Response;
use futures_util::future::BoxFuture;
use serde_json::Value;

use super::{Context, Params};
use crate::api::StaticFiles;

/// Function-map and registry key matched when nothing more specific does.
pub const WILDCARD: &str = "*";

/// Outcome of a handler invocation.
pub type HandlerResult = anyhow::Result<Reply>;

/// What a handler produced.
pub enum Reply {
    /// Structured result, sent as JSON.
    Json(Value),
    /// Pre-built HTTP response, passed through unchanged. HTTP only.
    Response(Response),
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Response(res) => f.debug_tuple("Response").field(&res.status()).finish(),
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// A handler result that is either available now or still running.
pub enum Completion {
    /// The handler finished synchronously.
    Ready(HandlerResult),
    /// The handler suspended; await the future for its result.
    Pending(BoxFuture<'static, HandlerResult>),
}

impl Completion {
    /// Waits for the result, whichever form it takes.
    ///
    /// # Errors
    ///
    /// Returns the handler's own error.
    pub async fn resolve(self) -> HandlerResult {
        match self {
            Self::Ready(result) => result,
            Self::Pending(future) => future.await,
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// A callable function-map entry.
pub trait Handler: Send + Sync + 'static {
    /// Invokes the handler.
    fn call(&self, ctx: Context, params: Params) -> Completion;
}

/// Adapts a synchronous closure.
struct SyncFn<F, R> {
    f: F,
    _reply: PhantomData<fn() -> R>,
}

impl<F, R> Handler for SyncFn<F, R>
where
    F: Fn(Context, Params) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Into<Reply> + 'static,
{
    fn call(&self, ctx: Context, params: Params) -> Completion {
        Completion::Ready((self.f)(ctx, params).map(Into::into))
    }
}

/// Adapts a closure returning a future.
struct AsyncFn<F, R> {
    f: F,
    _reply: PhantomData<fn() -> R>,
}

impl<F, Fut, R> Handler for AsyncFn<F, R>
where
    F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<Reply> + 'static,
{
    fn call(&self, ctx: Context, params: Params) -> Completion {
        let future = (self.f)(ctx, params);
        Completion::Pending(Box::pin(async move { future.await.map(Into::into) }))
    }
}

/// One value in a [`FunctionMap`].
#[derive(Clone)]
pub enum FunctionEntry {
    /// An invocable handler.
    Call(Arc<dyn Handler>),
    /// A static file directory, servable over HTTP but not callable.
    Static(Arc<StaticFiles>),
}

impl FunctionEntry {
    /// Returns the handler if this entry is invocable.
    #[must_use]
    pub fn as_handler(&self) -> Option<&Arc<dyn Handler>> {
        match self {
            Self::Call(handler) => Some(handler),
            Self::Static(_) => None,
        }
    }
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call(_) => f.write_str("Call(..)"),
            Self::Static(files) => f.debug_tuple("Static").field(files).finish(),
        }
    }
}

/// Mapping from command segment to entry, with [`WILDCARD`] as fallback.
///
/// Inserting an existing key replaces the previous entry.
#[derive(Debug, Clone, Default)]
pub struct FunctionMap {
    entries: HashMap<String, FunctionEntry>,
}

impl FunctionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a synchronous handler.
    ///
    /// ```ignore
    /// FunctionMap::new().call("add", |_ctx, q| {
    ///     Ok(json!({"result": q.int("a")? + q.int("b")?}))
    /// });
    /// ```
    #[must_use]
    pub fn call<F, R>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, Params) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Reply> + 'static,
    {
        self.handler(
            key,
            SyncFn {
                f,
                _reply: PhantomData,
            },
        )
    }

    /// Adds a handler that completes asynchronously.
    #[must_use]
    pub fn call_async<F, Fut, R>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply> + 'static,
    {
        self.handler(
            key,
            AsyncFn {
                f,
                _reply: PhantomData,
            },
        )
    }

    /// Adds any [`Handler`] implementation.
    #[must_use]
    pub fn handler(self, key: impl Into<String>, handler: impl Handler) -> Self {
        self.entry(key, FunctionEntry::Call(Arc::new(handler)))
    }

    /// Adds a static file directory.
    #[must_use]
    pub fn static_files(self, key: impl Into<String>, files: StaticFiles) -> Self {
        self.entry(key, FunctionEntry::Static(Arc::new(files)))
    }

    /// Adds a prepared entry.
    #[must_use]
    pub fn entry(mut self, key: impl Into<String>, entry: FunctionEntry) -> Self {
        self.insert(key, entry);
        self
    }

    /// Inserts an entry, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, entry: FunctionEntry) -> Option<FunctionEntry> {
        self.entries.insert(key.into(), entry)
    }

    /// Looks up `segment`, falling back to [`WILDCARD`].
    #[must_use]
    pub fn lookup(&self, segment: &str) -> Option<&FunctionEntry> {
        self.entries
            .get(segment)
            .or_else(|| self.entries.get(WILDCARD))
    }

    /// Returns `true` if `key` has an exact entry.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
