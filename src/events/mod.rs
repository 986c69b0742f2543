use crate::model::{Event, Record};
use futures_util::Stream;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Type(String),
}

impl EventFilter {
    pub fn of_type(event_type: impl Into<String>) -> Self {
        Self::Type(event_type.into())
    }

    fn matches(&self, event: &Event) -> bool {
        match self {
            Self::All => true,
            Self::Type(t) => *t == event.event_type,
        }
    }
}

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::UnboundedSender<Event>,
}

/// Fans unsolicited `update-type` records out to subscribers. Each subscriber
/// owns an unbounded queue, so a slow reader never loses events.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { filter, tx });
        EventSubscription { rx }
    }

    /// Returns the number of subscribers the event was delivered to.
    pub fn publish(&self, record: Record) -> usize {
        let Some(event) = Event::from_record(record) else {
            tracing::warn!("dropping inbound message without message-id or update-type");
            return 0;
        };
        tracing::debug!(event_type = %event.event_type, "event received");

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.filter.matches(&event)) {
            if subscriber.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventSubscription {
    /// Next matching event, or `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventSubscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}
