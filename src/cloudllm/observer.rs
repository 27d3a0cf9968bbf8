//! Fan-out of pipeline events to independently-failing subscribers.
//!
//! Generalizes the teacher's `EventHandler` callback (a single
//! `Arc<dyn EventHandler>` shared across every `Agent`) into a bus with N
//! subscribers, each fed through its own bounded channel so a slow or wedged
//! subscriber can never block the pipeline or another subscriber. This is
//! the backbone that lets a live dashboard, an eval harness, and a tracing
//! exporter all observe the same request without coordinating with each
//! other.
//!
//! # Example
//!
//! ```rust,no_run
//! use cloudllm::observer::{ObserverBus, ObserverEvent};
//!
//! # async {
//! let bus = ObserverBus::new(64);
//! let mut rx = bus.subscribe().1;
//! bus.publish(ObserverEvent::RequestStarted {
//!     request_id: "req-1".into(),
//!     user_utterance: "turn on the lights".into(),
//!     history: None,
//!     sequence: 0,
//! }).await;
//! let event = rx.recv().await.unwrap();
//! matches!(event, ObserverEvent::RequestStarted { .. });
//! # };
//! ```

use crate::context::HistoryTurn;
use crate::registry::AgentCard;
use crate::wrapper::AgentResponse;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, RwLock};

/// Stage at which an `Error` event originated, for observers that want to
/// attribute failures without parsing `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Failure while resolving or persisting the durable task.
    TaskResolution,
    /// Failure inside the router.
    Routing,
    /// Failure inside an agent execution wrapper.
    AgentExecution,
    /// Failure inside the aggregator.
    Aggregation,
    /// Failure anywhere else in the engine.
    Engine,
}

/// A single discriminated event emitted by the orchestration [`crate::engine::Engine`].
///
/// Every variant carries `request_id` and a monotonic, request-scoped
/// `sequence` number so subscribers can detect gaps or reorder buffered
/// events.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A request has begun processing.
    RequestStarted {
        /// Identifier assigned to this request.
        request_id: String,
        /// The raw user utterance.
        user_utterance: String,
        /// Prior conversation history, if a durable task was resolved.
        history: Option<Vec<HistoryTurn>>,
        /// Request-scoped monotonic sequence number.
        sequence: u64,
    },
    /// The router produced a routing decision.
    RoutingCompleted {
        /// Identifier assigned to this request.
        request_id: String,
        /// The normalized decision the dispatcher will execute.
        decision: crate::router::RoutingDecision,
        /// The system prompt sent to the chat client, if any observers want it.
        system_prompt: Option<String>,
        /// Request-scoped monotonic sequence number.
        sequence: u64,
    },
    /// One agent execution wrapper invocation completed (success or failure).
    AgentExecutionCompleted {
        /// Identifier assigned to this request.
        request_id: String,
        /// The agent's response.
        response: AgentResponse,
        /// Request-scoped monotonic sequence number.
        sequence: u64,
    },
    /// The aggregator produced the final user-facing string.
    ResponseAggregated {
        /// Identifier assigned to this request.
        request_id: String,
        /// The final text returned to the caller.
        final_text: String,
        /// Request-scoped monotonic sequence number.
        sequence: u64,
    },
    /// An error occurred somewhere in the pipeline. Never carries a stack
    /// trace or raw parse error — only a caller-safe message.
    Error {
        /// Identifier assigned to this request.
        request_id: String,
        /// Which stage the error originated in.
        stage: PipelineStage,
        /// Human-readable, caller-safe message.
        message: String,
        /// Request-scoped monotonic sequence number.
        sequence: u64,
    },
}

/// A compact, truncated projection of an [`ObserverEvent`] suitable for a
/// live dashboard feed.
///
/// `message` fields are truncated to 100 characters plus an ellipsis.
#[derive(Debug, Clone)]
pub struct LiveEventRecord {
    /// Event type name (`"request_started"`, `"routing_completed"`, etc.).
    pub event_type: &'static str,
    /// Identifier assigned to the originating request.
    pub request_id: String,
    /// Agent id, when the event concerns one agent.
    pub agent_name: Option<String>,
    /// Task/agent state, when applicable.
    pub state: Option<String>,
    /// Router confidence, when applicable.
    pub confidence: Option<f64>,
    /// Execution duration in milliseconds, when applicable.
    pub duration_ms: Option<u64>,
    /// Error message, when applicable.
    pub error_message: Option<String>,
    /// Truncated free-text message for display.
    pub message: Option<String>,
}

fn truncate_message(text: &str) -> String {
    const LIMIT: usize = 100;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(LIMIT).collect();
        truncated.push('…');
        truncated
    }
}

impl From<&ObserverEvent> for LiveEventRecord {
    fn from(event: &ObserverEvent) -> Self {
        match event {
            ObserverEvent::RequestStarted {
                request_id,
                user_utterance,
                ..
            } => LiveEventRecord {
                event_type: "request_started",
                request_id: request_id.clone(),
                agent_name: None,
                state: None,
                confidence: None,
                duration_ms: None,
                error_message: None,
                message: Some(truncate_message(user_utterance)),
            },
            ObserverEvent::RoutingCompleted {
                request_id,
                decision,
                ..
            } => LiveEventRecord {
                event_type: "routing_completed",
                request_id: request_id.clone(),
                agent_name: Some(decision.primary_agent_id.clone()),
                state: None,
                confidence: Some(decision.confidence),
                duration_ms: None,
                error_message: None,
                message: decision.reasoning.as_deref().map(truncate_message),
            },
            ObserverEvent::AgentExecutionCompleted {
                request_id,
                response,
                ..
            } => LiveEventRecord {
                event_type: "agent_execution_completed",
                request_id: request_id.clone(),
                agent_name: Some(response.agent_id.clone()),
                state: Some(if response.success { "completed" } else { "failed" }.to_string()),
                confidence: None,
                duration_ms: Some(response.execution_ms),
                error_message: response.error_message.clone(),
                message: Some(truncate_message(&response.content)),
            },
            ObserverEvent::ResponseAggregated {
                request_id,
                final_text,
                ..
            } => LiveEventRecord {
                event_type: "response_aggregated",
                request_id: request_id.clone(),
                agent_name: None,
                state: None,
                confidence: None,
                duration_ms: None,
                error_message: None,
                message: Some(truncate_message(final_text)),
            },
            ObserverEvent::Error {
                request_id,
                message,
                ..
            } => LiveEventRecord {
                event_type: "error",
                request_id: request_id.clone(),
                agent_name: None,
                state: None,
                confidence: None,
                duration_ms: None,
                error_message: Some(truncate_message(message)),
                message: None,
            },
        }
    }
}

/// Opaque handle returned by [`ObserverBus::subscribe`], used to unsubscribe later.
pub type SubscriptionId = u64;

/// Shared state backing one subscriber's bounded, per-subscriber queue.
struct SubscriberQueue {
    events: Mutex<VecDeque<ObserverEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    capacity: usize,
}

/// Receiving end of an [`ObserverBus::subscribe`] registration.
///
/// Backed by a hand-rolled bounded ring buffer rather than `tokio::sync::mpsc`:
/// `mpsc` gives the sender no way to evict an entry the receiver hasn't taken
/// yet, so it can only ever drop the newest (the one currently being sent),
/// never the oldest buffered one.
pub struct ObserverReceiver {
    queue: Arc<SubscriberQueue>,
}

impl ObserverReceiver {
    /// Wait for the next event. Never returns `None`; a receiver simply waits
    /// forever once its subscriber has been unsubscribed and no further
    /// events arrive.
    pub async fn recv(&mut self) -> Option<ObserverEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            self.queue.notify.notified().await;
        }
    }

    /// Take the next buffered event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<ObserverEvent> {
        self.queue.events.lock().unwrap().pop_front()
    }
}

struct Subscriber {
    queue: Arc<SubscriberQueue>,
}

/// Fan-out bus delivering [`ObserverEvent`]s to every registered subscriber.
///
/// Each subscriber is fed through its own bounded ring buffer (capacity set
/// at [`ObserverBus::new`]). A subscriber that falls behind never blocks
/// publication to other subscribers: on overflow, `publish` evicts that
/// subscriber's oldest buffered event and increments its `dropped` counter
/// before enqueueing the new one.
pub struct ObserverBus {
    capacity: usize,
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
    sequence: AtomicU64,
}

impl ObserverBus {
    /// Create a bus whose per-subscriber channel capacity is `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sequence: AtomicU64::new(0),
        }
    }

    /// Allocate the next monotonic sequence number for a request. Callers
    /// (the engine) typically allocate one sequence counter per request
    /// rather than sharing the bus-wide counter, but the bus exposes one as
    /// a convenience for single-request test harnesses.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a new subscriber and return its id plus the receiving end of
    /// its bounded queue.
    pub async fn subscribe(&self) -> (SubscriptionId, ObserverReceiver) {
        let queue = Arc::new(SubscriberQueue {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            capacity: self.capacity.max(1),
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(id, Subscriber { queue: queue.clone() });
        (id, ObserverReceiver { queue })
    }

    /// Remove a subscriber. A no-op if the id is unknown (already unsubscribed).
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().await.remove(&id);
    }

    /// Number of events dropped for a given subscriber due to buffer overflow.
    /// Returns `0` for an unknown subscriber id.
    pub async fn dropped_count(&self, id: SubscriptionId) -> u64 {
        self.subscribers
            .read()
            .await
            .get(&id)
            .map(|s| s.queue.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Deliver `event` to every currently-registered subscriber.
    ///
    /// Delivery order per subscriber matches publication order (each
    /// subscriber has its own FIFO queue). A subscriber whose queue is full
    /// has its oldest buffered event evicted and its counter incremented
    /// before the new event is enqueued; publication to every other
    /// subscriber proceeds regardless.
    pub async fn publish(&self, event: ObserverEvent) {
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.values() {
            let queue = &subscriber.queue;
            let mut events = queue.events.lock().unwrap();
            if events.len() >= queue.capacity {
                events.pop_front();
                queue.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("observer subscriber buffer full; dropping oldest event");
            }
            events.push_back(event.clone());
            drop(events);
            queue.notify.notify_one();
        }
    }
}
