//! Event publication: typed events, subscriber registration and fan-out.
//!
//! Events are delivered synchronously on the publishing task, in emission
//! order, to subscribers in registration order. Subscribers that need to do
//! real work should redispatch (see [`EventBus::subscribe_channel`]).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::{ContainerInfo, ContainerMetrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Membership or order of the tracked set changed. Carries the full list.
    ListChanged { items: Vec<ContainerInfo> },
    /// One container received a fresh metrics snapshot.
    MetricsUpdated {
        container_id: String,
        metrics: ContainerMetrics,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::ListChanged { .. } => "list_changed",
            MonitorEvent::MetricsUpdated { .. } => "metrics_updated",
        }
    }
}

pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &MonitorEvent);
}

impl<F> EventSubscriber for F
where
    F: Fn(&MonitorEvent) + Send + Sync,
{
    fn on_event(&self, event: &MonitorEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Forwards events into an unbounded channel.
struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<MonitorEvent>,
}

impl EventSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &MonitorEvent) {
        // receiver dropped: the subscriber simply goes quiet
        let _ = self.sender.send(event.clone());
    }
}

type SubscriberList = Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>;

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<SubscriberList>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        id
    }

    /// Register a subscriber that redispatches every event into a channel.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.subscribe(Arc::new(ChannelSubscriber { sender }));
        (id, receiver)
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn publish(&self, event: &MonitorEvent) {
        // callbacks run outside the lock so they may (un)subscribe
        let subscribers: Vec<Arc<dyn EventSubscriber>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();

        for subscriber in subscribers {
            subscriber.on_event(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
