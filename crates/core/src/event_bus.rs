//! Domain event bus. Topic-based publish/subscribe decoupled from transport.
//!
//! Jobs accept an `Arc<dyn EventSink>` and emit events as they complete units
//! of work. `EventBus` fans events out to handlers registered per topic;
//! `CaptureSink` records them for tests.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Topics emitted by the storefront jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    SubscriptionOrderCreated,
    SubscriptionOrderFailed,
    FlashSaleActivated,
    FlashSaleEnded,
    FlashSaleReminderSent,
}

impl EventTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::SubscriptionOrderCreated => "subscription_order.created",
            EventTopic::SubscriptionOrderFailed => "subscription_order.failed",
            EventTopic::FlashSaleActivated => "flash_sale.activated",
            EventTopic::FlashSaleEnded => "flash_sale.ended",
            EventTopic::FlashSaleReminderSent => "flash_sale.reminder_sent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub topic: EventTopic,
    /// Id of the subscription or flash sale the event is about.
    pub subject_id: String,
    pub user_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Anything that accepts domain events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: DomainEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_topic(&self, topic: EventTopic) -> usize {
        self.events.lock().iter().filter(|e| e.topic == topic).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

/// Handle returned by `EventBus::subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Topic-keyed handler registry.
#[derive(Default)]
pub struct EventBus {
    next_token: AtomicU64,
    handlers: RwLock<HashMap<EventTopic, Vec<(SubscriptionToken, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: EventTopic, handler: F) -> SubscriptionToken
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(topic)
            .or_default()
            .push((token, Arc::new(handler)));
        token
    }

    /// Returns false if the token was not registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut handlers = self.handlers.write();
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(t, _)| *t == token) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        self.handlers.read().get(&topic).map_or(0, Vec::len)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: DomainEvent) {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let targets: Vec<Handler> = self
            .handlers
            .read()
            .get(&event.topic)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        for handler in targets {
            handler(&event);
        }
    }
}

/// Convenience builder for creating a `DomainEvent`.
pub fn make_event(
    topic: EventTopic,
    subject_id: impl Into<String>,
    user_id: Option<Uuid>,
    payload: serde_json::Value,
) -> DomainEvent {
    DomainEvent {
        event_id: Uuid::new_v4(),
        topic,
        subject_id: subject_id.into(),
        user_id,
        payload,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op sink for jobs that don't need events.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(
            EventTopic::FlashSaleActivated,
            "7",
            None,
            serde_json::json!({"name": "Weekend"}),
        ));
        sink.emit(make_event(
            EventTopic::SubscriptionOrderCreated,
            "sub-1",
            Some(Uuid::new_v4()),
            serde_json::Value::Null,
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_topic(EventTopic::FlashSaleActivated), 1);
        assert_eq!(sink.events()[0].subject_id, "7");
    }

    #[test]
    fn test_bus_dispatches_by_topic() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bus.subscribe(EventTopic::FlashSaleEnded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(make_event(EventTopic::FlashSaleEnded, "1", None, serde_json::Value::Null));
        bus.emit(make_event(EventTopic::FlashSaleActivated, "1", None, serde_json::Value::Null));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let token = bus.subscribe(EventTopic::SubscriptionOrderFailed, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.subscriber_count(EventTopic::SubscriptionOrderFailed), 1);

        assert!(bus.unsubscribe(token));
        assert!(!bus.unsubscribe(token));
        bus.emit(make_event(EventTopic::SubscriptionOrderFailed, "s", None, serde_json::Value::Null));

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(EventTopic::SubscriptionOrderFailed), 0);
    }
}
