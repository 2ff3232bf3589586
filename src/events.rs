//! Event bus: a small multi-producer/multi-consumer broadcast over
//! per-subscriber bounded channels.
//!
//! `tokio::sync::broadcast` shares one ring buffer across all subscribers, so
//! a slow subscriber can silently drop events meant for a fast one before it
//! ever reads them. Here each subscriber gets its own bounded mpsc channel
//! registered in a `DashMap`; a slow subscriber only ever loses its own
//! events, and gets a `LaggedSubscriber` marker so it knows how many.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of each subscriber's channel before it starts lagging.
const SUBSCRIBER_BUFFER: usize = 1024;

pub type SubscriberId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum EventKind {
    AuditStarted,
    PageQueued,
    PageStarted,
    AuditAttached { module: String },
    AuditFinished { module: String },
    PageFinished,
    PageError { reason: String },
    PageRetry { attempt: usize, delay_ms: u64 },
    PageSkipped { reason: String },
    PageRedirected { to: String },
    AuditCompleted { counts: AuditCounts },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditCounts {
    pub finished: usize,
    pub errored: usize,
    pub skipped: usize,
    pub redirected: usize,
}

/// A value-type lifecycle event. Owned independently by every subscriber
/// after fan-out; no shared mutable state leaks through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: String,
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(run_id: impl Into<String>, url: Option<String>, kind: EventKind) -> Self {
        Self {
            run_id: run_id.into(),
            url,
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Delivered to a subscriber in place of a dropped batch of events when its
/// channel filled up before it could keep up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaggedSubscriber {
    pub dropped_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delivery {
    Event(Event),
    Lagged(LaggedSubscriber),
}

struct Subscriber {
    sender: mpsc::Sender<Delivery>,
    dropped: Arc<AtomicU64>,
}

/// The bus. Cheap to clone (it's a thin wrapper over `Arc`-backed state) so
/// every worker and the HTTP server can hold one.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<DashMap<SubscriberId, Subscriber>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers a new subscriber and returns its id plus the receiving end
    /// of its channel.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Delivery>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.insert(
            id,
            Subscriber {
                sender: tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
        );
        (id, rx)
    }

    /// Removes a subscriber. Safe to call more than once or for an id that
    /// was already removed lazily (e.g. a disconnected WebSocket).
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.remove(&id);
    }

    /// Fans an event out to every live subscriber. A full subscriber channel
    /// increments that subscriber's drop counter and a `Lagged` marker is
    /// sent on the next successful try; dead subscribers are pruned lazily.
    pub fn publish(&self, event: Event) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            let id = *entry.key();
            let sub = entry.value();

            let dropped = sub.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                match sub
                    .sender
                    .try_send(Delivery::Lagged(LaggedSubscriber { dropped_count: dropped }))
                {
                    Ok(()) => {
                        sub.dropped.fetch_sub(dropped, Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        sub.dropped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(id);
                        continue;
                    }
                }
            }

            match sub.sender.try_send(Delivery::Event(event.clone())) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sub.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(id);
                }
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
