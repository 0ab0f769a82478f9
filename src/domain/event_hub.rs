//! Versioned event state and subscriber bookkeeping.
//!
//! Each named event keeps its latest value and a monotonically increasing
//! version. A subscriber is caught up when the version it was last sent
//! equals the record's version; [`EventHub::broadcast`] only pushes to
//! subscribers that are behind. A subscriber whose connection fails is
//! evicted from every event that connection still holds, not just the one
//! being broadcast. A subscriber id belongs to whichever connection last
//! subscribed with it, so cleanup for one connection never touches another
//! connection's subscriptions.
//!
//! The hub is owned by the execution domain and is never shared across
//! threads; see [`crate::service::Server::trigger_event`] for the
//! external entry point.

use std::collections::HashMap;

use serde_json::Value;

use super::SubscriberId;
use crate::ws::connection::WsConnection;
use crate::ws::messages::{EventPush, timestamp};

/// One subscriber's registration on one event.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriberId,
    connection: WsConnection,
    last_sent_version: u64,
}

impl Subscription {
    /// Subscriber id.
    #[must_use]
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Connection pushes are written to.
    #[must_use]
    pub fn connection(&self) -> &WsConnection {
        &self.connection
    }

    /// Version most recently delivered to this subscriber.
    #[must_use]
    pub fn last_sent_version(&self) -> u64 {
        self.last_sent_version
    }
}

/// State of one named event.
#[derive(Debug)]
pub struct EventRecord {
    name: String,
    version: u64,
    last_value: Value,
    subscribers: HashMap<SubscriberId, Subscription>,
}

impl EventRecord {
    fn new(name: &str, version: u64, last_value: Value) -> Self {
        Self {
            name: name.to_string(),
            version,
            last_value,
            subscribers: HashMap::new(),
        }
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Most recently triggered value.
    #[must_use]
    pub fn last_value(&self) -> &Value {
        &self.last_value
    }

    /// Looks up a subscription.
    #[must_use]
    pub fn subscriber(&self, id: &SubscriberId) -> Option<&Subscription> {
        self.subscribers.get(id)
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Summary of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Pushes written successfully.
    pub delivered: usize,
    /// Subscribers removed because their connection failed.
    pub evicted: Vec<SubscriberId>,
}

/// All event records, keyed by event name.
#[derive(Debug, Default)]
pub struct EventHub {
    events: HashMap<String, EventRecord>,
}

impl EventHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` on `event`, or refreshes an existing registration.
    ///
    /// The record is created at version 0 if needed. A refreshed
    /// subscription is marked as never sent so that the next broadcast
    /// delivers the current value to it. Returns `true` if the
    /// subscription is new.
    pub fn subscribe(&mut self, event: &str, id: SubscriberId, connection: WsConnection) -> bool {
        let record = self
            .events
            .entry(event.to_string())
            .or_insert_with(|| EventRecord::new(event, 0, Value::Null));

        match record.subscribers.get_mut(&id) {
            Some(existing) => {
                existing.last_sent_version = 0;
                existing.connection = connection;
                false
            }
            None => {
                record.subscribers.insert(
                    id.clone(),
                    Subscription {
                        id,
                        connection,
                        last_sent_version: 0,
                    },
                );
                true
            }
        }
    }

    /// Stores `data` as the latest value of `event` and broadcasts it.
    ///
    /// The first trigger of an event nobody has referenced yet only seeds
    /// the record at version 1; it does not broadcast.
    pub fn trigger(&mut self, event: &str, data: Value) -> BroadcastReport {
        let Some(record) = self.events.get_mut(event) else {
            self.events
                .insert(event.to_string(), EventRecord::new(event, 1, data));
            return BroadcastReport::default();
        };
        record.last_value = data;
        record.version = record.version.saturating_add(1);
        self.broadcast(event)
    }

    /// Pushes the current value of `event` to every subscriber that is
    /// behind, then evicts subscribers whose connection failed.
    pub fn broadcast(&mut self, event: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let Some(record) = self.events.get_mut(event) else {
            return report;
        };

        let EventRecord {
            name,
            version,
            last_value,
            subscribers,
        } = record;
        let t = timestamp();
        let mut failed = Vec::new();

        for (id, sub) in subscribers.iter_mut() {
            if sub.last_sent_version == *version {
                continue;
            }
            let push = EventPush {
                evt: name.as_str(),
                uid: id,
                ver: *version,
                t,
                r: &*last_value,
            };
            match sub.connection.send_json(&push) {
                Ok(()) => {
                    sub.last_sent_version = *version;
                    report.delivered += 1;
                }
                Err(err) => {
                    tracing::warn!(event = %name, uid = %id, error = %err, "event push failed");
                    report.evicted.push(id.clone());
                    failed.push((sub.connection.id(), id.clone()));
                }
            }
        }

        for (connection, id) in failed {
            self.remove_connection(connection, std::slice::from_ref(&id));
        }
        report
    }

    /// Removes the subscriptions under `ids` that are still held by
    /// `connection`. Entries another connection has taken over are left
    /// alone. Returns how many subscriptions went away.
    pub fn remove_connection(&mut self, connection: uuid::Uuid, ids: &[SubscriberId]) -> usize {
        let mut removed = 0;
        for record in self.events.values_mut() {
            let before = record.subscribers.len();
            record
                .subscribers
                .retain(|id, sub| sub.connection.id() != connection || !ids.contains(id));
            removed += before - record.subscribers.len();
        }
        if removed > 0 {
            tracing::debug!(%connection, removed, "connection subscriptions removed");
        }
        removed
    }

    /// Removes `id` from every event. Returns how many subscriptions went away.
    pub fn remove_subscriber(&mut self, id: &SubscriberId) -> usize {
        let removed = self
            .events
            .values_mut()
            .filter_map(|record| record.subscribers.remove(id))
            .count();
        if removed > 0 {
            tracing::debug!(uid = %id, removed, "subscriber removed");
        }
        removed
    }

    /// Looks up an event record.
    #[must_use]
    pub fn record(&self, event: &str) -> Option<&EventRecord> {
        self.events.get(event)
    }

    /// Number of event records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no event has been referenced yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
