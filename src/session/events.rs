//! Event fan-out.
//!
//! Every inbound `event` frame is delivered to two places:
//!
//! | Consumer | Mechanism | Delivery |
//! |----------|-----------|----------|
//! | Keyed handlers | [`EventBus::subscribe`] | Synchronous, in registration order |
//! | Streams | [`EventBus::stream`] | `broadcast` channel, lagging receivers skip |
//!
//! Handlers run on the inbound path: a slow handler delays later handlers and
//! the processing of subsequent frames. A panicking handler is logged and
//! skipped; the remaining handlers and the stream still receive the event.
//! Events published with no consumer are dropped.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, trace};

use crate::protocol::Event;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked for each event.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

// ============================================================================
// EventBus
// ============================================================================

/// Keyed observer list plus a broadcast stream.
pub struct EventBus {
    /// Handlers in registration order.
    handlers: Mutex<Vec<(String, EventHandler)>>,
    /// Stream sender.
    stream_tx: broadcast::Sender<Event>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .field("streams", &self.stream_tx.receiver_count())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus whose streams buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (stream_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: Mutex::new(Vec::new()),
            stream_tx,
        }
    }

    /// Registers `handler` under `key`.
    ///
    /// An existing handler with the same key is replaced and keeps its
    /// position in the delivery order.
    pub fn subscribe(&self, key: impl Into<String>, handler: EventHandler) {
        let key = key.into();
        let mut handlers = self.handlers.lock();

        if let Some(slot) = handlers.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = handler;
        } else {
            handlers.push((key, handler));
        }
    }

    /// Removes the handler registered under `key`. Returns `true` if one existed.
    pub fn unsubscribe(&self, key: &str) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(k, _)| k != key);
        handlers.len() != before
    }

    /// Returns `true` if a handler is registered under `key`.
    #[must_use]
    pub fn has_handler(&self, key: &str) -> bool {
        self.handlers.lock().iter().any(|(k, _)| k == key)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }

    /// Returns a new receiver for the event stream.
    #[must_use]
    pub fn stream(&self) -> broadcast::Receiver<Event> {
        self.stream_tx.subscribe()
    }

    /// Delivers `event` to every handler, then to the stream.
    ///
    /// The handler list is snapshotted first, so handlers may register or
    /// remove handlers without deadlocking; changes apply from the next event.
    pub fn publish(&self, event: &Event) {
        let snapshot: Vec<(String, EventHandler)> = self
            .handlers
            .lock()
            .iter()
            .map(|(key, handler)| (key.clone(), Arc::clone(handler)))
            .collect();

        trace!(
            subscription = %event.subscription,
            event_type = event.event_type().unwrap_or("<none>"),
            handlers = snapshot.len(),
            "Publishing event"
        );

        for (key, handler) in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                error!(
                    handler = %key,
                    panic = panic_message(panic.as_ref()),
                    "Event handler panicked"
                );
            }
        }

        // No receivers is not an error.
        let _ = self.stream_tx.send(event.clone());
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::SubscriptionId;

    fn event(n: u64) -> Event {
        Event::new(
            SubscriptionId::new(1),
            json!({"event_type": "state_changed", "data": {"n": n}}),
        )
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> EventHandler {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        Arc::new(move |_event: &Event| log.lock().push(tag.clone()))
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new(8);
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("a", recorder(&log, "a"));
        bus.subscribe("b", recorder(&log, "b"));
        bus.subscribe("c", recorder(&log, "c"));
        bus.publish(&event(1));

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_resubscribe_replaces_in_place() {
        let bus = EventBus::new(8);
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("a", recorder(&log, "a1"));
        bus.subscribe("b", recorder(&log, "b"));
        bus.subscribe("a", recorder(&log, "a2"));
        assert_eq!(bus.handler_count(), 2);

        bus.publish(&event(1));
        assert_eq!(*log.lock(), vec!["a2", "b"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new(8);
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("a", recorder(&log, "a"));
        assert!(bus.has_handler("a"));
        assert!(bus.unsubscribe("a"));
        assert!(!bus.unsubscribe("a"));
        assert!(!bus.has_handler("a"));

        bus.publish(&event(1));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new(8));
        let calls = Arc::new(Mutex::new(0));

        let bus_ref = Arc::clone(&bus);
        let calls_ref = Arc::clone(&calls);
        bus.subscribe(
            "once",
            Arc::new(move |_event: &Event| {
                *calls_ref.lock() += 1;
                bus_ref.unsubscribe("once");
            }),
        );

        bus.publish(&event(1));
        bus.publish(&event(2));
        assert_eq!(*calls.lock(), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_publish_without_consumers() {
        let bus = EventBus::new(8);
        bus.publish(&event(1));
    }

    #[test]
    fn test_clear() {
        let bus = EventBus::new(8);
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("a", recorder(&log, "a"));
        bus.subscribe("b", recorder(&log, "b"));
        bus.clear();
        assert_eq!(bus.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let bus = EventBus::new(8);
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut rx = bus.stream();

        bus.subscribe("a", recorder(&log, "a"));
        bus.subscribe("bad", Arc::new(|_event: &Event| {
            panic!("handler bug");
        }));
        bus.subscribe("c", recorder(&log, "c"));

        bus.publish(&event(1));
        bus.publish(&event(2));

        assert_eq!(*log.lock(), vec!["a", "c", "a", "c"]);
        assert!(bus.has_handler("bad"));
        assert_eq!(rx.recv().await.expect("event").data(), Some(&json!({"n": 1})));
        assert_eq!(rx.recv().await.expect("event").data(), Some(&json!({"n": 2})));
    }

    #[test]
    fn test_panic_message() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(literal.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        assert_eq!(panic_message(other.as_ref()), "<non-string panic payload>");
    }

    #[tokio::test]
    async fn test_stream_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.stream();

        bus.publish(&event(7));
        let received = rx.recv().await.expect("event");
        assert_eq!(received.data(), Some(&json!({"n": 7})));
    }
}
