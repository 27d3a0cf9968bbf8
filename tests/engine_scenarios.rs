//! End-to-end scenarios for the orchestration pipeline, one per concrete
//! example walked through in the design: single success, an all-failing
//! agent, multi-agent priority ordering, low-confidence clarification,
//! durable resume across a simulated restart, and mid-flight cancellation.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use cloudllm::{
    AgentBinding, AggregatorOptions, CancellationSignal, ChatClient, ChatCompletionOptions,
    Dispatcher, Engine, InMemoryAgentRegistry, InMemoryKvStore, Message, ObserverEvent,
    OrchestratorError, RouterOptions, TaskStatus, TaskStore,
};
use cloudllm::cloudllm::config::{SessionCacheOptions, WrapperOptions};
use cloudllm::cloudllm::context::{HistoryTurn, ThreadHandle};
use cloudllm::cloudllm::observer::ObserverBus;
use cloudllm::cloudllm::registry::AgentCard;
use cloudllm::cloudllm::router::Router;
use cloudllm::cloudllm::wrapper::{AgentExecutionWrapper, LocalAgentHandler};

struct ScriptedRouterClient {
    body: String,
}

#[async_trait]
impl ChatClient for ScriptedRouterClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _options: &ChatCompletionOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        Ok(Message::assistant(self.body.clone()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct FixedReplyHandler(&'static str);

#[async_trait]
impl LocalAgentHandler for FixedReplyHandler {
    async fn handle(
        &self,
        _utterance: &str,
        _history: &[HistoryTurn],
        _thread: Option<&ThreadHandle>,
    ) -> Result<(String, Option<ThreadHandle>), Box<dyn Error + Send + Sync>> {
        Ok((self.0.to_string(), None))
    }
}

struct FailingHandler(&'static str);

#[async_trait]
impl LocalAgentHandler for FailingHandler {
    async fn handle(
        &self,
        _utterance: &str,
        _history: &[HistoryTurn],
        _thread: Option<&ThreadHandle>,
    ) -> Result<(String, Option<ThreadHandle>), Box<dyn Error + Send + Sync>> {
        Err(self.0.into())
    }
}

fn build_engine(routing_body: &str, agent_priority: Vec<String>) -> Engine<InMemoryKvStore> {
    let mut registry = InMemoryAgentRegistry::new();
    registry.register(AgentCard::new("light", "Light", "controls lights"));
    registry.register(AgentCard::new("music", "Music", "controls music"));
    registry.register(AgentCard::new("climate", "Climate", "controls climate"));
    registry.register(AgentCard::new("general", "General", "general assistant"));

    let client = Arc::new(ScriptedRouterClient {
        body: routing_body.to_string(),
    });
    let router = Router::new(client);
    let dispatcher = Dispatcher::new(AgentExecutionWrapper::new(WrapperOptions::default()));
    let task_store = TaskStore::new(InMemoryKvStore::new());
    let observer = Arc::new(ObserverBus::new(64));
    let aggregator_options = AggregatorOptions {
        agent_priority,
        ..Default::default()
    };

    Engine::new(
        Arc::new(registry),
        router,
        dispatcher,
        task_store,
        observer,
        RouterOptions::default(),
        aggregator_options,
        SessionCacheOptions::default(),
    )
}

#[tokio::test]
async fn scenario_1_single_success() {
    let engine = build_engine(r#"{"agentId":"light","confidence":0.92}"#, vec![]);
    let mut bindings = HashMap::new();
    bindings.insert(
        "light".to_string(),
        AgentBinding::Local(Arc::new(FixedReplyHandler(
            "I've turned on the hallway lights.",
        ))),
    );

    let (_sub_id, mut events) = engine.subscribe_observer().await;

    let reply = engine
        .process_request(
            "req-1",
            "Turn on the hallway lights.",
            Some("task-1".to_string()),
            Some("conv-1".to_string()),
            &bindings,
            CancellationSignal::never(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(reply, "I've turned on the hallway lights.");

    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen[0], ObserverEvent::RequestStarted { .. }));
    assert!(matches!(seen[1], ObserverEvent::RoutingCompleted { .. }));
    assert!(matches!(seen[2], ObserverEvent::AgentExecutionCompleted { .. }));
    assert!(matches!(seen[3], ObserverEvent::ResponseAggregated { .. }));
}

#[tokio::test]
async fn scenario_2_agent_failure_with_no_additional_agents() {
    let engine = build_engine(r#"{"agentId":"music","confidence":0.95}"#, vec![]);
    let mut bindings = HashMap::new();
    bindings.insert(
        "music".to_string(),
        AgentBinding::Local(Arc::new(FailingHandler("Player offline"))),
    );

    let reply = engine
        .process_request(
            "req-1",
            "Play some jazz.",
            Some("task-2".to_string()),
            Some("conv-2".to_string()),
            &bindings,
            CancellationSignal::never(),
            None,
        )
        .await
        .unwrap();

    let lower = reply.to_lowercase();
    assert!(lower.contains("however"));
    assert!(lower.contains("player offline"));

    assert_eq!(engine.task_status("task-2").await, Some(TaskStatus::Failed));
}

#[tokio::test]
async fn scenario_3_multi_agent_ordering_by_priority() {
    let engine = build_engine(
        r#"{"agentId":"light","confidence":0.87,"additionalAgents":["climate","music"]}"#,
        vec!["light".to_string(), "music".to_string(), "climate".to_string()],
    );
    let mut bindings = HashMap::new();
    bindings.insert(
        "light".to_string(),
        AgentBinding::Local(Arc::new(FixedReplyHandler("Lights adjusted"))),
    );
    bindings.insert(
        "climate".to_string(),
        AgentBinding::Local(Arc::new(FixedReplyHandler("Temperature set"))),
    );
    bindings.insert(
        "music".to_string(),
        AgentBinding::Local(Arc::new(FixedReplyHandler("Music playing"))),
    );

    let reply = engine
        .process_request(
            "req-1",
            "Get the room ready.",
            Some("task-3".to_string()),
            Some("conv-3".to_string()),
            &bindings,
            CancellationSignal::never(),
            None,
        )
        .await
        .unwrap();

    let lights_pos = reply.find("Lights adjusted").unwrap();
    let music_pos = reply.find("Music playing").unwrap();
    let climate_pos = reply.find("Temperature set").unwrap();
    assert!(lights_pos < music_pos);
    assert!(music_pos < climate_pos);
}

#[tokio::test]
async fn scenario_4_low_confidence_routes_to_clarification() {
    let engine = build_engine(r#"{"agentId":"light","confidence":0.55}"#, vec![]);
    let mut bindings = HashMap::new();
    bindings.insert(
        "clarification".to_string(),
        AgentBinding::Local(Arc::new(FixedReplyHandler(
            "Could you clarify which device you mean?",
        ))),
    );

    let reply = engine
        .process_request(
            "req-1",
            "Turn it on.",
            Some("task-4".to_string()),
            Some("conv-4".to_string()),
            &bindings,
            CancellationSignal::never(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(reply, "Could you clarify which device you mean?");
    assert_eq!(engine.task_status("task-4").await, Some(TaskStatus::Completed));
}

#[tokio::test]
async fn scenario_5_durable_resume_across_simulated_restart() {
    let engine_a = build_engine(r#"{"agentId":"light","confidence":0.9}"#, vec![]);
    let mut bindings = HashMap::new();
    bindings.insert(
        "light".to_string(),
        AgentBinding::Local(Arc::new(FixedReplyHandler("Lights are on."))),
    );

    engine_a
        .process_request(
            "req-1",
            "Turn on the lights.",
            Some("task-5".to_string()),
            Some("conv-5".to_string()),
            &bindings,
            CancellationSignal::never(),
            None,
        )
        .await
        .unwrap();

    let persisted = engine_a.task_snapshot("task-5").await.unwrap();
    assert_eq!(persisted.history.len(), 2);

    // Simulate a process restart: a fresh engine and a fresh in-memory
    // store, seeded only with the persisted task (no other in-memory state
    // carried over from `engine_a`).
    let task_store = TaskStore::new(InMemoryKvStore::new());
    task_store.set_task(&persisted).await.unwrap();

    let mut registry = InMemoryAgentRegistry::new();
    registry.register(AgentCard::new("light", "Light", "controls lights"));
    let client = Arc::new(ScriptedRouterClient {
        body: r#"{"agentId":"light","confidence":0.9}"#.to_string(),
    });
    let engine_b = Engine::new(
        Arc::new(registry),
        Router::new(client),
        Dispatcher::new(AgentExecutionWrapper::new(WrapperOptions::default())),
        task_store,
        Arc::new(ObserverBus::new(64)),
        RouterOptions::default(),
        AggregatorOptions::default(),
        SessionCacheOptions::default(),
    );

    bindings.insert(
        "light".to_string(),
        AgentBinding::Local(Arc::new(FixedReplyHandler("Already on."))),
    );

    engine_b
        .process_request(
            "req-2",
            "Make them brighter.",
            Some("task-5".to_string()),
            None,
            &bindings,
            CancellationSignal::never(),
            None,
        )
        .await
        .unwrap();

    let resumed = engine_b.task_snapshot("task-5").await.unwrap();
    assert_eq!(resumed.context_id, "conv-5");
    assert_eq!(resumed.history.len(), 4);
    assert_eq!(resumed.history[0].text, "Turn on the lights.");
    assert_eq!(resumed.history[1].text, "Lights are on.");
    assert_eq!(resumed.history[2].text, "Make them brighter.");
}

#[tokio::test]
async fn scenario_6_cancellation_after_routing_before_agent_completes() {
    let engine = build_engine(r#"{"agentId":"light","confidence":0.9}"#, vec![]);
    let mut bindings = HashMap::new();
    bindings.insert(
        "light".to_string(),
        AgentBinding::Local(Arc::new(FixedReplyHandler("should not run"))),
    );

    let (tx, rx) = tokio::sync::watch::channel(false);
    let cancel = CancellationSignal::new(rx);
    // Cancel immediately; the dispatcher checks cancellation before invoking
    // each agent, so this models "canceled before the sole agent completes".
    tx.send(true).unwrap();

    let (_sub_id, mut events) = engine.subscribe_observer().await;

    let result = engine
        .process_request(
            "req-1",
            "Turn on the lights.",
            Some("task-6".to_string()),
            Some("conv-6".to_string()),
            &bindings,
            cancel,
            None,
        )
        .await;

    assert!(matches!(result, Err(OrchestratorError::Cancellation)));
    assert_eq!(engine.task_status("task-6").await, Some(TaskStatus::Canceled));

    let mut saw_response_aggregated = false;
    while let Some(event) = events.try_recv() {
        if matches!(event, ObserverEvent::ResponseAggregated { .. }) {
            saw_response_aggregated = true;
        }
    }
    assert!(!saw_response_aggregated);
}
