//! Configuration structs for the orchestration pipeline.
//!
//! Every component accepts a plain options struct with `Default` impls
//! matching the defaults called out in the specification — no config-file
//! parsing dependency is introduced; applications construct these however
//! they like (environment variables, a TOML file read with a crate of their
//! choosing, hardcoded values in tests) and pass the struct in.

use std::time::Duration;

/// Options accepted by [`crate::router::Router::route`].
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Selects which chat-client binding to use when more than one is
    /// configured. Interpretation is left to the embedding application; the
    /// router itself is handed a single `Arc<dyn ChatClient>` regardless.
    pub chat_client_key: Option<String>,
    /// Confidence below which a decision is rewritten to the clarification
    /// pseudo-agent.
    pub confidence_threshold: f64,
    /// Maximum number of chat-client calls attempted while parsing/validating
    /// a routing decision. Must be at least 1.
    pub max_attempts: u32,
    /// Sampling temperature hint passed to the chat client.
    pub temperature: f32,
    /// Generation length cap hint passed to the chat client.
    pub max_output_tokens: u32,
    /// Whether to append each agent's capability tags to its catalog entry.
    pub include_capabilities: bool,
    /// Whether to append up to `skill_example_limit` examples per skill.
    pub include_skill_examples: bool,
    /// Maximum number of examples rendered per skill when
    /// `include_skill_examples` is set.
    pub skill_example_limit: usize,
    /// System prompt prefix sent as the first message of the routing call.
    pub system_prompt: String,
    /// Template for the user-role prompt. `{catalog}` and `{utterance}` are
    /// substituted.
    pub user_prompt_template: String,
    /// Header line rendered above the agent catalog.
    pub catalog_header: String,
    /// Template used to build the `reasoning` field when a decision is
    /// rewritten to the clarification agent. `{candidates}` is substituted.
    pub clarification_prompt_template: String,
    /// Template used to build the `reasoning` field of a fallback decision.
    /// `{attempts}` is substituted.
    pub fallback_reason_template: String,
    /// Reserved agent id used when confidence falls below threshold.
    pub clarification_agent_id: String,
    /// Reserved agent id used when the router cannot choose or fails.
    pub fallback_agent_id: String,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            chat_client_key: None,
            confidence_threshold: 0.7,
            max_attempts: 3,
            temperature: 0.3,
            max_output_tokens: 500,
            include_capabilities: true,
            include_skill_examples: true,
            skill_example_limit: 3,
            system_prompt: "You are a routing engine. Choose the single best agent to handle \
                the user's request, plus any additional agents that should also contribute. \
                Respond with a strict JSON object and nothing else."
                .to_string(),
            user_prompt_template: "Available agents:\n{catalog}\n\nUser request: {utterance}"
                .to_string(),
            catalog_header: "Available agents:".to_string(),
            clarification_prompt_template:
                "confidence below threshold; top candidates were {candidates}".to_string(),
            fallback_reason_template: "routing failed after {attempts} attempts".to_string(),
            clarification_agent_id: "clarification".to_string(),
            fallback_agent_id: "general-assistant".to_string(),
        }
    }
}

/// Options accepted by [`crate::wrapper::AgentExecutionWrapper::invoke`].
#[derive(Debug, Clone)]
pub struct WrapperOptions {
    /// Wall-clock budget for a single agent invocation.
    pub timeout: Duration,
    /// Maximum number of chat turns retained in
    /// [`crate::context::OrchestrationContext::history`] after the
    /// invocation completes.
    pub history_limit: usize,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            history_limit: 20,
        }
    }
}

/// Options accepted by [`crate::aggregator::Aggregator::aggregate`].
#[derive(Debug, Clone, Default)]
pub struct AggregatorOptions {
    /// Agent ids in priority order. Agents not listed sort after all listed
    /// agents, in original arrival order.
    pub agent_priority: Vec<String>,
    /// Template used when every agent succeeded but a custom join phrase is
    /// desired. Currently informational; the default join behavior is
    /// described in [`crate::aggregator`].
    pub default_success_template: Option<String>,
    /// Message returned when the dispatcher produced no responses at all.
    pub default_fallback_message: Option<String>,
    /// Sentence prefixed to the failure listing when every agent failed.
    pub default_failure_message: Option<String>,
}

/// Options governing how much conversation history the engine re-hydrates
/// per request and for how long an in-memory session may be cached.
#[derive(Debug, Clone)]
pub struct SessionCacheOptions {
    /// How long an idle in-memory session may be cached before eviction.
    pub session_cache_length_minutes: u64,
    /// Maximum number of history turns re-hydrated from a durable task.
    pub max_history_items: usize,
}

impl Default for SessionCacheOptions {
    fn default() -> Self {
        Self {
            session_cache_length_minutes: 5,
            max_history_items: 20,
        }
    }
}
