//! Event bus: one-to-many fan-out of execution events to subscribers
//! (spec.md §4.6 / §6).
//!
//! Handlers are invoked sequentially in registration order, but each
//! invocation is dispatched through that handler's own serial queue so one
//! handler's latency or error never blocks another — the same
//! serial-queue-per-consumer shape as the thread pool (spec.md §9: "no need
//! for an event-emitter framework").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::NodeHistory;
use crate::error::ExecError;

/// One emitted event (spec.md §6 event schema).
#[derive(Clone, Debug)]
pub enum Event {
    WorkflowStart {
        execution_id: String,
        started_at: DateTime<Utc>,
        input: Value,
    },
    WorkflowEnd {
        execution_id: String,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        histories: Vec<NodeHistory>,
        is_ok: bool,
        error: Option<ExecError>,
        output: Option<Value>,
    },
    NodeStart {
        execution_id: String,
        node_execution_id: String,
        thread_id: String,
        started_at: DateTime<Utc>,
        name: String,
        input: Value,
    },
    NodeEnd {
        execution_id: String,
        node_execution_id: String,
        thread_id: String,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        is_ok: bool,
        error: Option<ExecError>,
        name: String,
        input: Value,
        output: Option<Value>,
    },
    NodeStream {
        execution_id: String,
        node_execution_id: String,
        thread_id: String,
        timestamp: DateTime<Utc>,
        name: String,
        chunk: Value,
    },
}

impl Event {
    /// The `event_type` discriminant string from spec.md §6.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::WorkflowStart { .. } => "WORKFLOW_START",
            Event::WorkflowEnd { .. } => "WORKFLOW_END",
            Event::NodeStart { .. } => "NODE_START",
            Event::NodeEnd { .. } => "NODE_END",
            Event::NodeStream { .. } => "NODE_STREAM",
        }
    }
}

/// Subscriber callback. Async so handlers may do I/O; any `Err` is swallowed
/// by the bus (spec.md §4.6: "publish never fails").
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Opaque subscription handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<Event>,
}

/// Pub/sub bus. Cheaply `Clone`-able; all clones share the same subscriber list.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
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
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers `handler`. Events published after this call are delivered to
    /// it, in emission order, on its own background worker task.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // Errors are swallowed: one handler's failure must not affect
                // delivery to other handlers or future events on this one.
                let _ = handler.handle(event).await;
            }
        });
        self.subscribers.lock().unwrap().push(Subscriber { id, tx });
        id
    }

    /// Removes a previously registered handler. A no-op if `id` is unknown
    /// (already unsubscribed).
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().unwrap().retain(|s| s.id != id);
    }

    /// Fans `event` out to every current subscriber, in registration order.
    /// Enqueuing is synchronous and infallible; delivery happens on each
    /// subscriber's own worker task, so a slow or failing handler never
    /// blocks this call or other subscribers.
    pub async fn publish(&self, event: Event) {
        let subs = self.subscribers.lock().unwrap();
        for sub in subs.iter() {
            // An unbounded send only fails if the receiver end (the worker
            // task) has already dropped, which we treat the same as a
            // swallowed handler error.
            let _ = sub.tx.send(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

pub(crate) async fn publish_node_stream(
    bus: &EventBus,
    execution_id: &str,
    thread_id: &str,
    node_execution_id: &str,
    name: &str,
    chunk: Value,
) {
    bus.publish(Event::NodeStream {
        execution_id: execution_id.to_string(),
        node_execution_id: node_execution_id.to_string(),
        thread_id: thread_id.to_string(),
        timestamp: Utc::now(),
        name: name.to_string(),
        chunk,
    })
    .await;
}
