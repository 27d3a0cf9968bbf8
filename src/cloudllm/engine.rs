//! Wires the durable task store, router, dispatcher, aggregator, and
//! observer bus into the end-to-end request lifecycle.
//!
//! [`Engine::process_request`] is the one entry point the embedding
//! application calls; everything else in this crate exists to be composed
//! here. Mirrors the teacher's `Orchestration::run` as the single
//! "coordinate everything, delegate the actual work" method, generalized
//! from a fixed council of agents to the router-driven pipeline this crate
//! implements.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::aggregator::{Aggregator, AggregatorOptions};
use crate::client_wrapper::Role;
use crate::context::{HistoryTurn, OrchestrationContext};
use crate::dispatcher::Dispatcher;
use crate::durable_task::{DurableTask, KvStore, TaskStatus, TaskStore};
use crate::error::OrchestratorError;
use crate::observer::{ObserverBus, ObserverEvent, ObserverReceiver, PipelineStage, SubscriptionId};
use crate::registry::{AgentCard, AgentRegistry};
use crate::router::{Router, RouterOptions};
use crate::wrapper::{AgentBinding, CancellationSignal};

/// Options governing how much history the engine re-hydrates and caches per
/// request.
pub use crate::config::SessionCacheOptions;

/// Snapshot of the engine's readiness, returned by [`Engine::get_status`].
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// Whether the engine currently has at least one registered agent to
    /// route to.
    pub is_ready: bool,
    /// Number of agents in the registry snapshot.
    pub available_agent_count: usize,
    /// The registry snapshot itself.
    pub available_agents: Vec<AgentCard>,
}

/// The graceful message returned (instead of an error) when an internal,
/// non-cancellation failure occurs partway through a request.
const INTERNAL_FAILURE_MESSAGE: &str = "I encountered an issue processing your request.";

/// Coordinates one full request through task resolution, routing, dispatch,
/// and aggregation.
pub struct Engine<S: KvStore> {
    registry: Arc<dyn AgentRegistry>,
    router: Router,
    dispatcher: Dispatcher,
    aggregator: Aggregator,
    task_store: TaskStore<S>,
    observer: Arc<ObserverBus>,
    router_options: RouterOptions,
    aggregator_options: AggregatorOptions,
    session_cache_options: SessionCacheOptions,
}

impl<S: KvStore> Engine<S> {
    /// Construct an engine from its collaborators and options.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        router: Router,
        dispatcher: Dispatcher,
        task_store: TaskStore<S>,
        observer: Arc<ObserverBus>,
        router_options: RouterOptions,
        aggregator_options: AggregatorOptions,
        session_cache_options: SessionCacheOptions,
    ) -> Self {
        Self {
            registry,
            router,
            dispatcher,
            aggregator: Aggregator,
            task_store,
            observer,
            router_options,
            aggregator_options,
            session_cache_options,
        }
    }

    /// Subscribe to the pipeline's observer bus. See [`ObserverBus::subscribe`].
    pub async fn subscribe_observer(&self) -> (SubscriptionId, ObserverReceiver) {
        self.observer.subscribe().await
    }

    /// Unsubscribe from the pipeline's observer bus. See [`ObserverBus::unsubscribe`].
    pub async fn unsubscribe_observer(&self, id: SubscriptionId) {
        self.observer.unsubscribe(id).await
    }

    /// Snapshot of engine readiness: whether any agents are registered, and
    /// the current registry contents.
    pub async fn get_status(&self) -> EngineStatus {
        let available_agents = self.registry.list().await;
        EngineStatus {
            is_ready: !available_agents.is_empty(),
            available_agent_count: available_agents.len(),
            available_agents,
        }
    }

    /// Fetch the current lifecycle status of one durable task, if it exists.
    ///
    /// Not part of the engine's minimal public surface, but a natural
    /// addition given the store already tracks it — useful for callers
    /// polling a task's progress between requests.
    pub async fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.task_store
            .get_task(task_id)
            .await
            .ok()
            .flatten()
            .map(|t| t.status)
    }

    /// Fetch a full snapshot of one durable task, if it exists. Exposed for
    /// callers (and tests) that need to inspect persisted history directly,
    /// e.g. to simulate handing a task off to a freshly constructed engine
    /// after a process restart.
    pub async fn task_snapshot(&self, task_id: &str) -> Option<DurableTask> {
        self.task_store.get_task(task_id).await.ok().flatten()
    }

    /// Process one user utterance end to end.
    ///
    /// `task_id` resumes an existing durable task (loading its history from
    /// the store); if it names no existing task, a new one is created under
    /// that id. `session_id` is the stable conversation identifier used for
    /// a freshly created task's `context_id`; if `None`, a new identifier is
    /// generated. When `task_id` resolves to an existing task, that task's
    /// own `context_id` wins over `session_id` (a conversation, once
    /// created, owns its id).
    ///
    /// `bindings` supplies the local/remote execution capability for every
    /// agent id that might be selected; an agent the router names with no
    /// entry here is silently skipped by the dispatcher.
    ///
    /// Returns `Err(OrchestratorError::Cancellation)` only when the caller's
    /// cancellation signal fired. Every other internal failure is absorbed:
    /// the engine logs it, emits an [`ObserverEvent::Error`], and returns
    /// `Ok` with a graceful, caller-safe message instead of raising.
    pub async fn process_request(
        &self,
        request_id: impl Into<String>,
        user_utterance: &str,
        task_id: Option<String>,
        session_id: Option<String>,
        bindings: &HashMap<String, AgentBinding>,
        cancel: CancellationSignal,
        deadline: Option<Instant>,
    ) -> Result<String, OrchestratorError> {
        let request_id = request_id.into();
        match self
            .run_pipeline(&request_id, user_utterance, task_id, session_id, bindings, &cancel, deadline)
            .await
        {
            Ok(text) => Ok(text),
            Err(OrchestratorError::Cancellation) => Err(OrchestratorError::Cancellation),
            Err(err) => {
                log::error!("engine: request '{request_id}' failed internally: {err}");
                self.observer
                    .publish(ObserverEvent::Error {
                        request_id,
                        stage: PipelineStage::Engine,
                        message: err.to_string(),
                        sequence: 0,
                    })
                    .await;
                Ok(INTERNAL_FAILURE_MESSAGE.to_string())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        request_id: &str,
        user_utterance: &str,
        task_id: Option<String>,
        session_id: Option<String>,
        bindings: &HashMap<String, AgentBinding>,
        cancel: &CancellationSignal,
        deadline: Option<Instant>,
    ) -> Result<String, OrchestratorError> {
        let mut sequence: u64 = 0;
        let mut next_sequence = || {
            let value = sequence;
            sequence += 1;
            value
        };

        let now = Utc::now();
        let mut task = self.resolve_task(task_id, session_id, now).await;

        self.observer
            .publish(ObserverEvent::RequestStarted {
                request_id: request_id.to_string(),
                user_utterance: user_utterance.to_string(),
                history: Some(task.history.clone()),
                sequence: next_sequence(),
            })
            .await;

        let mut context = OrchestrationContext::from_history(
            task.context_id.clone(),
            task.history.clone(),
            self.session_cache_options.max_history_items,
        );
        context.push_turn(HistoryTurn::new(Role::User, user_utterance, now));
        task.history = context.history.clone();
        task.set_status(TaskStatus::Working, None, now);
        self.persist(&task).await;

        if cancel.is_canceled() {
            return self.cancel_task(&mut task, now).await;
        }

        let decision = self
            .router
            .route(user_utterance, self.registry.as_ref(), &context, &self.router_options)
            .await;
        self.observer
            .publish(ObserverEvent::RoutingCompleted {
                request_id: request_id.to_string(),
                decision: decision.clone(),
                system_prompt: Some(self.router_options.system_prompt.clone()),
                sequence: next_sequence(),
            })
            .await;

        if cancel.is_canceled() {
            return self.cancel_task(&mut task, now).await;
        }

        let responses = self
            .dispatcher
            .dispatch(&decision, bindings, user_utterance, &mut context, cancel, deadline, now)
            .await;
        for response in &responses {
            self.observer
                .publish(ObserverEvent::AgentExecutionCompleted {
                    request_id: request_id.to_string(),
                    response: response.clone(),
                    sequence: next_sequence(),
                })
                .await;
        }

        if cancel.is_canceled() {
            task.history = context.history.clone();
            return self.cancel_task(&mut task, now).await;
        }

        let aggregated = self.aggregator.aggregate(responses, &self.aggregator_options);

        // Every agent failed: the conversation turn did not succeed, even
        // though the aggregator still produced a caller-facing message
        // describing the failure.
        let final_status = if !aggregated.successful_agents.is_empty() || aggregated.failed_agents.is_empty() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };

        task.history = context.history.clone();
        task.set_status(final_status, Some(aggregated.message.clone()), now);
        self.persist(&task).await;

        self.observer
            .publish(ObserverEvent::ResponseAggregated {
                request_id: request_id.to_string(),
                final_text: aggregated.message.clone(),
                sequence: next_sequence(),
            })
            .await;

        Ok(aggregated.message)
    }

    /// Resolve the durable task a request should operate on.
    ///
    /// A storage failure here is absorbed rather than propagated: the
    /// pipeline proceeds with a freshly created, in-memory-only task so a
    /// backend outage degrades durability, not the reply itself.
    async fn resolve_task(
        &self,
        task_id: Option<String>,
        session_id: Option<String>,
        now: chrono::DateTime<Utc>,
    ) -> DurableTask {
        let new_context_id = || session_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        match task_id {
            Some(id) => match self.task_store.get_task(&id).await {
                Ok(Some(task)) => task,
                Ok(None) => DurableTask::new(id, new_context_id(), now),
                Err(err) => {
                    log::warn!(
                        "engine: durable task store unavailable while resolving task '{id}', proceeding with an in-memory context: {err}"
                    );
                    DurableTask::new(id, new_context_id(), now)
                }
            },
            None => DurableTask::new(uuid::Uuid::new_v4().to_string(), new_context_id(), now),
        }
    }

    /// Persist a task, logging and continuing (rather than failing the
    /// request) if the store is unavailable.
    async fn persist(&self, task: &DurableTask) {
        if let Err(err) = self.task_store.set_task(task).await {
            log::warn!(
                "engine: durable task store unavailable, proceeding without persistence for task '{}': {}",
                task.id,
                err
            );
        }
    }

    async fn cancel_task(
        &self,
        task: &mut DurableTask,
        now: chrono::DateTime<Utc>,
    ) -> Result<String, OrchestratorError> {
        task.set_status(TaskStatus::Canceled, Some("canceled".to_string()), now);
        self.persist(task).await;
        self.observer
            .publish(ObserverEvent::Error {
                request_id: task.id.clone(),
                stage: PipelineStage::Engine,
                message: "request canceled".to_string(),
                sequence: 0,
            })
            .await;
        Err(OrchestratorError::Cancellation)
    }
}
