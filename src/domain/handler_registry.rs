//! Handler groups and the registry that routes to them.
//!
//! [`HandlerRegistry`] keeps groups in registration order because WebSocket
//! dispatch scans them front to back and stops at the first group whose
//! command or event key appears in the message. Re-registering a mount
//! point replaces the group in place.

use std::sync::Arc;

use super::handler::{FunctionEntry, FunctionMap, WILDCARD};
use crate::error::RoutingError;

/// Splits a path or command on `/`, dropping leading empty segments.
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').skip_while(|s| s.is_empty()).collect()
}

/// A mount point plus its routing configuration and function map.
#[derive(Debug, Clone)]
pub struct HandlerGroup {
    mount_point: String,
    command_key: String,
    params_key: String,
    event_key: String,
    reply_key: String,
    functions: FunctionMap,
}

impl HandlerGroup {
    /// Creates a group.
    ///
    /// - `mount_point`: first HTTP path segment, or [`WILDCARD`].
    /// - `command_key`: WebSocket field holding the command path.
    /// - `params_key`: WebSocket field holding the parameters; empty means
    ///   the whole message.
    /// - `event_key`: WebSocket field holding an event name to subscribe to.
    /// - `reply_key`: reply field wrapping the result; empty merges the
    ///   result into the top level.
    #[must_use]
    pub fn new(
        mount_point: impl Into<String>,
        command_key: impl Into<String>,
        params_key: impl Into<String>,
        event_key: impl Into<String>,
        reply_key: impl Into<String>,
        functions: FunctionMap,
    ) -> Self {
        Self {
            mount_point: mount_point.into(),
            command_key: command_key.into(),
            params_key: params_key.into(),
            event_key: event_key.into(),
            reply_key: reply_key.into(),
            functions,
        }
    }

    /// Mount point.
    #[must_use]
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Command field name.
    #[must_use]
    pub fn command_key(&self) -> &str {
        &self.command_key
    }

    /// Parameters field name.
    #[must_use]
    pub fn params_key(&self) -> &str {
        &self.params_key
    }

    /// Event subscription field name.
    #[must_use]
    pub fn event_key(&self) -> &str {
        &self.event_key
    }

    /// Reply wrapper field name.
    #[must_use]
    pub fn reply_key(&self) -> &str {
        &self.reply_key
    }

    /// Function map.
    #[must_use]
    pub fn functions(&self) -> &FunctionMap {
        &self.functions
    }

    /// Resolves `segment` against the function map, falling back to
    /// [`WILDCARD`]. `requested` names the request in the error.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::NoHandlerFunction`] if neither exists.
    pub fn resolve(&self, segment: &str, requested: &str) -> Result<&FunctionEntry, RoutingError> {
        self.functions
            .lookup(segment)
            .ok_or_else(|| RoutingError::NoHandlerFunction(requested.to_string()))
    }

    /// Returns the function segment a WebSocket command targets.
    ///
    /// A leading segment equal to the mount point is skipped when more
    /// segments follow it, so `"api/add"` and `"add"` both select `add`
    /// in the `api` group.
    #[must_use]
    pub fn command_segment<'a>(&self, command: &'a str) -> &'a str {
        let segments = split_path(command);
        let segments = match segments.as_slice() {
            [first, rest @ ..] if !rest.is_empty() && *first == self.mount_point => rest,
            all => all,
        };
        segments.first().copied().unwrap_or_default()
    }
}

/// Result of resolving an HTTP path.
#[derive(Debug, Clone)]
pub struct HttpRoute {
    /// Group that owns the path.
    pub group: Arc<HandlerGroup>,
    /// Resolved function-map entry.
    pub entry: FunctionEntry,
    /// Path below the mount point, used by static file entries.
    pub remainder: String,
}

/// Ordered set of handler groups keyed by mount point.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    groups: Vec<Arc<HandlerGroup>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a group, returning the one it replaced.
    pub fn register(&mut self, group: HandlerGroup) -> Option<Arc<HandlerGroup>> {
        self.insert(Arc::new(group))
    }

    /// Inserts or replaces a shared group, returning the one it replaced.
    pub fn insert(&mut self, group: Arc<HandlerGroup>) -> Option<Arc<HandlerGroup>> {
        match self
            .groups
            .iter_mut()
            .find(|g| g.mount_point == group.mount_point)
        {
            Some(slot) => Some(std::mem::replace(slot, group)),
            None => {
                self.groups.push(group);
                None
            }
        }
    }

    /// Removes the group mounted at `mount_point`.
    pub fn unregister(&mut self, mount_point: &str) -> Option<Arc<HandlerGroup>> {
        let index = self
            .groups
            .iter()
            .position(|g| g.mount_point == mount_point)?;
        Some(self.groups.remove(index))
    }

    /// Returns the group mounted at `mount_point`.
    #[must_use]
    pub fn get(&self, mount_point: &str) -> Option<&Arc<HandlerGroup>> {
        self.groups.iter().find(|g| g.mount_point == mount_point)
    }

    /// Groups in registration order.
    #[must_use]
    pub fn groups(&self) -> &[Arc<HandlerGroup>] {
        &self.groups
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if no group is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Resolves an HTTP request path.
    ///
    /// The first segment selects the group (falling back to the group
    /// mounted at `"*"`), the second selects the function (falling back to
    /// the `"*"` entry). A missing segment is treated as `"*"`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::NoHandlerGroup`] or
    /// [`RoutingError::NoHandlerFunction`] when no fallback applies.
    pub fn route_http(&self, path: &str) -> Result<HttpRoute, RoutingError> {
        let segments = split_path(path);
        let (head, tail) = segments
            .split_first()
            .map_or((WILDCARD, &[][..]), |(head, tail)| (*head, tail));
        let function = tail.first().copied().unwrap_or(WILDCARD);

        let (group, remainder) = match self.get(head) {
            Some(group) => (group, tail.join("/")),
            None => (
                self.get(WILDCARD)
                    .ok_or_else(|| RoutingError::NoHandlerGroup(path.to_string()))?,
                segments.join("/"),
            ),
        };
        let entry = group.resolve(function, path)?.clone();

        Ok(HttpRoute {
            group: Arc::clone(group),
            entry,
            remainder,
        })
    }
}
