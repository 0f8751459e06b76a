// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A minimal observable entity: named events with payloads, plus a map of tracked fields.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::FileMetadata;

/// Emitted by a file entity after a read completes. Carries the bytes read.
pub const READ_COMPLETED: &str = "read.completed";

/// Emitted by a file entity after a write completes. Carries no payload.
pub const WRITE_COMPLETED: &str = "write.completed";

/// Emitted whenever file metadata changes. Carries the current metadata.
pub const META_CHANGED: &str = "meta.changed";

/// Emitted by [`Observable::set`]. Carries the new tracked fields.
pub const CHANGE: &str = "change";

/// The data attached to an [`Event`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Payload {
    /// The event carries nothing.
    None,
    /// Raw bytes, such as the result of a read.
    Bytes(Bytes),
    /// A copy of file metadata at the time of the event.
    Metadata(FileMetadata),
    /// A structured value.
    Json(Value),
}

/// A notification delivered to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    name: Cow<'static, str>,
    payload: Payload,
}

impl Event {
    /// Returns the event name, such as [`WRITE_COMPLETED`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the event payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Identifies a handler registered with [`Observable::on`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    event: Cow<'static, str>,
    handler: Handler,
}

#[derive(Default)]
struct ObservableInner {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
    fields: RwLock<Map<String, Value>>,
}

/// A thread-safe event emitter with tracked fields.
///
/// Clones share subscribers and fields. Handlers run synchronously on the thread that
/// calls [`trigger`](Self::trigger), in the order they subscribed, and outside of any
/// internal lock, so a handler may subscribe or trigger further events itself.
#[derive(Clone, Default)]
pub struct Observable {
    inner: Arc<ObservableInner>,
}

impl Observable {
    /// Creates an observable with no subscribers and no tracked fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to every event named `event`.
    pub fn on<F>(&self, event: impl Into<Cow<'static, str>>, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscriptions.lock().push(Subscription {
            id,
            event: event.into(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Delivers an event to every handler subscribed to `event`.
    pub fn trigger(&self, event: impl Into<Cow<'static, str>>, payload: Payload) {
        let event = Event {
            name: event.into(),
            payload,
        };

        let handlers: Vec<Handler> = self
            .inner
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.event == event.name)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        tracing::trace!(event = %event.name, handlers = handlers.len(), "trigger");

        for handler in handlers {
            handler(&event);
        }
    }

    /// Replaces the tracked fields and emits [`CHANGE`] with the new fields.
    pub fn set(&self, fields: Map<String, Value>) {
        let payload = Value::Object(fields.clone());
        *self.inner.fields.write() = fields;
        self.trigger(CHANGE, Payload::Json(payload));
    }

    /// Sets one tracked field, keeping the others, and emits [`CHANGE`] with all fields.
    pub fn set_field(&self, field: impl Into<String>, value: Value) {
        let payload = {
            let mut fields = self.inner.fields.write();
            let _ = fields.insert(field.into(), value);
            Value::Object(fields.clone())
        };
        self.trigger(CHANGE, Payload::Json(payload));
    }

    /// Returns a copy of one tracked field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        self.inner.fields.read().get(field).cloned()
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}
