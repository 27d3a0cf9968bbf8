// src/lib.rs

//! Multi-agent orchestration core: routes an utterance to one or more
//! agents, dispatches them, aggregates their replies into one response, and
//! persists the conversation as a durable, restart-surviving task.
//!
//! Concrete LLM chat backends, concrete agents, the agent registry's write
//! side, the key/value store backing durable tasks, and any HTTP/RPC front
//! end are external collaborators this crate only defines capability traits
//! for ([`cloudllm::client_wrapper::ChatClient`], [`cloudllm::wrapper::LocalAgentHandler`],
//! [`cloudllm::wrapper::RemoteTaskDelivery`], [`cloudllm::registry::AgentRegistry`],
//! [`cloudllm::durable_task::KvStore`]) — it never implements them itself.

// Import the top-level `cloudllm` module.
pub mod cloudllm;

// Re-exporting key items for easier external access.
pub use cloudllm::aggregator::{Aggregator, AggregatedResult, AggregatorOptions};
pub use cloudllm::client_wrapper::{ChatClient, ChatCompletionOptions, Message, Role};
pub use cloudllm::context::OrchestrationContext;
pub use cloudllm::dispatcher::Dispatcher;
pub use cloudllm::durable_task::{DurableTask, InMemoryKvStore, KvStore, TaskStatus, TaskStore};
pub use cloudllm::engine::{Engine, EngineStatus};
pub use cloudllm::error::OrchestratorError;
pub use cloudllm::observer::{ObserverBus, ObserverEvent, ObserverReceiver};
pub use cloudllm::registry::{AgentCard, AgentRegistry, InMemoryAgentRegistry};
pub use cloudllm::router::{Router, RouterOptions, RoutingDecision};
pub use cloudllm::config::{SessionCacheOptions, WrapperOptions};
pub use cloudllm::wrapper::{AgentBinding, AgentExecutionWrapper, AgentResponse, CancellationSignal};
