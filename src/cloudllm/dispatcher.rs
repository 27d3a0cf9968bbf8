//! Sequential execution of a routing decision's agent list.
//!
//! The specification defers parallel dispatch to a future revision (see the
//! open question in the design notes); for now agents run strictly in
//! order — primary first, then each additional agent — so that later agents
//! can see the history left behind by earlier ones via the shared
//! [`OrchestrationContext`].

use std::collections::HashMap;
use std::time::Instant;

use crate::context::OrchestrationContext;
use crate::router::RoutingDecision;
use crate::wrapper::{AgentBinding, AgentExecutionWrapper, AgentResponse, CancellationSignal};

/// Runs the agents named by a [`RoutingDecision`] in order, short-circuiting
/// on cancellation.
pub struct Dispatcher {
    wrapper: AgentExecutionWrapper,
}

impl Dispatcher {
    /// Construct a dispatcher around a configured [`AgentExecutionWrapper`].
    pub fn new(wrapper: AgentExecutionWrapper) -> Self {
        Self { wrapper }
    }

    /// Run `decision.primary_agent_id` followed by each of
    /// `decision.additional_agent_ids`, in order, against `bindings`.
    ///
    /// An id in the decision with no entry in `bindings` is dropped silently
    /// (it was already validated against the registry by the router; a
    /// missing binding here means the embedding application chose not to
    /// wire that agent up, which is a deployment decision, not an error).
    /// If cancellation fires, the sequence stops immediately and no response
    /// is produced for the agent that was running (or about to run) at that
    /// point.
    pub async fn dispatch(
        &self,
        decision: &RoutingDecision,
        bindings: &HashMap<String, AgentBinding>,
        utterance: &str,
        context: &mut OrchestrationContext,
        cancel: &CancellationSignal,
        deadline: Option<Instant>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Vec<AgentResponse> {
        let mut agent_ids = Vec::with_capacity(1 + decision.additional_agent_ids.len());
        agent_ids.push(decision.primary_agent_id.clone());
        agent_ids.extend(decision.additional_agent_ids.iter().cloned());

        let mut responses = Vec::with_capacity(agent_ids.len());
        for agent_id in agent_ids {
            if cancel.is_canceled() {
                log::info!("dispatcher: cancellation observed before invoking '{agent_id}', stopping sequence");
                break;
            }
            let Some(binding) = bindings.get(&agent_id) else {
                log::warn!("dispatcher: no binding wired for agent '{agent_id}', skipping");
                continue;
            };
            let response = self
                .wrapper
                .invoke(&agent_id, binding, utterance, context, cancel, deadline, now)
                .await;
            responses.push(response);
        }

        responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{HistoryTurn, ThreadHandle};
    use crate::config::WrapperOptions;
    use async_trait::async_trait;
    use std::error::Error;
    use std::sync::Arc;

    fn ts() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc)
    }

    struct EchoHandler(&'static str);

    #[async_trait]
    impl crate::wrapper::LocalAgentHandler for EchoHandler {
        async fn handle(
            &self,
            utterance: &str,
            _history: &[HistoryTurn],
            _thread: Option<&ThreadHandle>,
        ) -> Result<(String, Option<ThreadHandle>), Box<dyn Error + Send + Sync>> {
            Ok((format!("{}: {}", self.0, utterance), None))
        }
    }

    fn decision(primary: &str, additional: &[&str]) -> RoutingDecision {
        RoutingDecision {
            primary_agent_id: primary.to_string(),
            additional_agent_ids: additional.iter().map(|s| s.to_string()).collect(),
            confidence: 0.9,
            reasoning: None,
        }
    }

    #[tokio::test]
    async fn runs_primary_then_additional_in_order() {
        let dispatcher = Dispatcher::new(AgentExecutionWrapper::new(WrapperOptions::default()));
        let mut bindings = HashMap::new();
        bindings.insert(
            "light".to_string(),
            AgentBinding::Local(Arc::new(EchoHandler("light"))),
        );
        bindings.insert(
            "music".to_string(),
            AgentBinding::Local(Arc::new(EchoHandler("music"))),
        );
        let mut context = OrchestrationContext::new("conv-1", 20);
        let responses = dispatcher
            .dispatch(
                &decision("light", &["music"]),
                &bindings,
                "turn things on",
                &mut context,
                &CancellationSignal::never(),
                None,
                ts(),
            )
            .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].agent_id, "light");
        assert_eq!(responses[1].agent_id, "music");
        assert_eq!(context.previous_agent_id.as_deref(), Some("music"));
    }

    #[tokio::test]
    async fn missing_binding_is_skipped_silently() {
        let dispatcher = Dispatcher::new(AgentExecutionWrapper::new(WrapperOptions::default()));
        let mut bindings = HashMap::new();
        bindings.insert(
            "light".to_string(),
            AgentBinding::Local(Arc::new(EchoHandler("light"))),
        );
        let mut context = OrchestrationContext::new("conv-1", 20);
        let responses = dispatcher
            .dispatch(
                &decision("light", &["nonexistent"]),
                &bindings,
                "hi",
                &mut context,
                &CancellationSignal::never(),
                None,
                ts(),
            )
            .await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].agent_id, "light");
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_yields_no_responses() {
        let dispatcher = Dispatcher::new(AgentExecutionWrapper::new(WrapperOptions::default()));
        let mut bindings = HashMap::new();
        bindings.insert(
            "light".to_string(),
            AgentBinding::Local(Arc::new(EchoHandler("light"))),
        );
        let (tx, rx) = tokio::sync::watch::channel(false);
        tx.send(true).unwrap();
        let cancel = CancellationSignal::new(rx);
        let mut context = OrchestrationContext::new("conv-1", 20);
        let responses = dispatcher
            .dispatch(
                &decision("light", &[]),
                &bindings,
                "hi",
                &mut context,
                &cancel,
                None,
                ts(),
            )
            .await;

        assert!(responses.is_empty());
    }
}
