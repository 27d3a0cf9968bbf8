//! Uniform invocation surface over local and remote agents.
//!
//! Concrete agents — whether an in-process skill or a remote A2A service —
//! are out of scope for this crate; [`AgentExecutionWrapper`] only needs a
//! capability trait to call through. Following the spec's design note
//! ("prefer a sum type over an inheritance hierarchy for dispatch"), an agent
//! binding is either [`AgentBinding::Local`] or [`AgentBinding::Remote`]
//! rather than a shared base trait both implement — the two paths genuinely
//! behave differently (thread reuse vs. task delivery) and forcing them
//! through one interface would only hide that.

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout as tokio_timeout;

use crate::context::{HistoryTurn, OrchestrationContext, ThreadHandle};
use crate::durable_task::TaskStatus;
use crate::registry::AgentCard;

pub use crate::config::WrapperOptions;

/// Receiver half of a request-scoped cancellation signal.
///
/// A thin wrapper around [`tokio::sync::watch::Receiver<bool>`] rather than a
/// new primitive: the sender side lives with whatever owns the request (the
/// [`crate::engine::Engine`] caller), and every suspension point in the
/// pipeline races against [`CancellationSignal::canceled`] via `tokio::select!`.
#[derive(Clone)]
pub struct CancellationSignal {
    receiver: tokio::sync::watch::Receiver<bool>,
}

impl CancellationSignal {
    /// Wrap a watch receiver as a cancellation signal.
    pub fn new(receiver: tokio::sync::watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// A signal that never fires, for callers that don't need cancellation.
    pub fn never() -> Self {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        Self { receiver: rx }
    }

    /// Resolve once cancellation has been requested. If the sender was
    /// dropped without ever signaling, this future never resolves, matching
    /// "no cancellation was requested".
    pub async fn canceled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Whether cancellation has already been requested, without waiting.
    pub fn is_canceled(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Outcome of one agent execution, whether the agent succeeded or failed.
///
/// Never a `Result` at this layer: a failed agent is data the aggregator
/// reasons about, not a propagated error, because one agent's failure must
/// not prevent the others in the same dispatch from being aggregated.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Id of the agent that produced this response.
    pub agent_id: String,
    /// The agent's reply text. Empty when `success` is `false`.
    pub content: String,
    /// Whether the invocation completed successfully.
    pub success: bool,
    /// Caller-safe failure description, set only when `success` is `false`.
    pub error_message: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub execution_ms: u64,
}

impl AgentResponse {
    fn ok(agent_id: impl Into<String>, content: impl Into<String>, execution_ms: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: content.into(),
            success: true,
            error_message: None,
            execution_ms,
        }
    }

    fn failed(agent_id: impl Into<String>, error_message: impl Into<String>, execution_ms: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: String::new(),
            success: false,
            error_message: Some(error_message.into()),
            execution_ms,
        }
    }
}

/// Capability surface for an in-process agent.
///
/// `thread` is the opaque handle previously stored by
/// [`OrchestrationContext::set_thread`] for this agent in this conversation,
/// if one exists; the handler downcasts it to whatever concrete state it
/// needs. Returning a new handle in the tuple replaces the stored one.
#[async_trait]
pub trait LocalAgentHandler: Send + Sync {
    /// Handle one turn, given the bounded conversation history and any prior
    /// per-conversation thread state.
    async fn handle(
        &self,
        utterance: &str,
        history: &[HistoryTurn],
        thread: Option<&ThreadHandle>,
    ) -> Result<(String, Option<ThreadHandle>), Box<dyn Error + Send + Sync>>;
}

/// Result of delivering a turn to a remote A2A agent.
#[derive(Debug, Clone)]
pub struct RemoteDeliveryResult {
    /// Lifecycle status the remote agent reported for the delivered task.
    pub status: TaskStatus,
    /// Reply text, present when the remote agent produced one synchronously.
    pub message: Option<String>,
}

/// Capability surface for delivering a turn to a remote A2A agent.
///
/// The wire protocol and transport (HTTP, gRPC, whatever the remote card's
/// `url_or_local` names) are out of scope for this crate; implementations of
/// this trait own that entirely.
#[async_trait]
pub trait RemoteTaskDelivery: Send + Sync {
    /// Deliver `utterance` to the remote agent described by `card`.
    async fn deliver(
        &self,
        card: &AgentCard,
        utterance: &str,
        history: &[HistoryTurn],
    ) -> Result<RemoteDeliveryResult, Box<dyn Error + Send + Sync>>;
}

/// How to reach a particular agent: an in-process handler, or a remote
/// delivery capability paired with the remote agent's card.
pub enum AgentBinding {
    /// A local, in-process agent.
    Local(Arc<dyn LocalAgentHandler>),
    /// A remote A2A agent, reached through a delivery capability.
    Remote(AgentCard, Arc<dyn RemoteTaskDelivery>),
}

/// Invokes one agent binding with a timeout, thread reuse, and history
/// bookkeeping, and never panics regardless of what the bound handler does.
pub struct AgentExecutionWrapper {
    options: WrapperOptions,
}

impl AgentExecutionWrapper {
    /// Construct a wrapper with the given options.
    pub fn new(options: WrapperOptions) -> Self {
        Self { options }
    }

    /// Invoke `binding` for `agent_id` against `context`, honoring
    /// `deadline` as an additional, possibly tighter, caller-supplied bound
    /// than the wrapper's own configured timeout.
    ///
    /// On return, `context.history` has the agent's reply appended (trimmed
    /// to `history_limit`) and `context.previous_agent_id` is set to
    /// `agent_id`, regardless of success or failure — a failed agent still
    /// participated in the conversation and should be recorded as having
    /// tried.
    pub async fn invoke(
        &self,
        agent_id: &str,
        binding: &AgentBinding,
        utterance: &str,
        context: &mut OrchestrationContext,
        cancel: &CancellationSignal,
        deadline: Option<Instant>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> AgentResponse {
        let effective_timeout = match deadline {
            Some(deadline) => self
                .options
                .timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.options.timeout,
        };

        let started = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.canceled() => {
                AgentResponse::failed(agent_id, "canceled", elapsed_ms(started))
            }
            result = self.run_with_timeout(agent_id, binding, utterance, context, effective_timeout) => result,
        };

        context.previous_agent_id = Some(agent_id.to_string());
        let role = crate::client_wrapper::Role::Assistant;
        let text = if response.success {
            response.content.clone()
        } else {
            String::new()
        };
        if !text.is_empty() {
            context.push_turn(HistoryTurn::new(role, text, now));
        }

        response
    }

    async fn run_with_timeout(
        &self,
        agent_id: &str,
        binding: &AgentBinding,
        utterance: &str,
        context: &mut OrchestrationContext,
        effective_timeout: Duration,
    ) -> AgentResponse {
        let started = Instant::now();
        match tokio_timeout(
            effective_timeout,
            self.run_binding(agent_id, binding, utterance, context),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                log::warn!("agent '{agent_id}' timed out after {effective_timeout:?}");
                AgentResponse::failed(agent_id, "timed out", elapsed_ms(started))
            }
        }
    }

    async fn run_binding(
        &self,
        agent_id: &str,
        binding: &AgentBinding,
        utterance: &str,
        context: &mut OrchestrationContext,
    ) -> AgentResponse {
        let started = Instant::now();
        match binding {
            AgentBinding::Local(handler) => {
                let prior_thread = context.thread_for(agent_id);
                match handler.handle(utterance, &context.history, prior_thread).await {
                    Ok((content, new_thread)) => {
                        if let Some(handle) = new_thread {
                            context.set_thread(agent_id, handle);
                        }
                        AgentResponse::ok(agent_id, content, elapsed_ms(started))
                    }
                    Err(err) => {
                        log::warn!("agent '{agent_id}' handler returned an error: {err}");
                        AgentResponse::failed(agent_id, err.to_string(), elapsed_ms(started))
                    }
                }
            }
            AgentBinding::Remote(card, delivery) => {
                match delivery.deliver(card, utterance, &context.history).await {
                    Ok(result) => match result.status {
                        TaskStatus::Completed | TaskStatus::Working | TaskStatus::InputRequired => match result.message {
                            Some(message) => AgentResponse::ok(agent_id, message, elapsed_ms(started)),
                            None => {
                                AgentResponse::failed(agent_id, "remote agent returned no response", elapsed_ms(started))
                            }
                        },
                        other => AgentResponse::failed(
                            agent_id,
                            format!("remote agent task ended in status '{other:?}'"),
                            elapsed_ms(started),
                        ),
                    },
                    Err(err) => {
                        log::warn!("remote delivery to agent '{agent_id}' failed: {err}");
                        AgentResponse::failed(agent_id, err.to_string(), elapsed_ms(started))
                    }
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
