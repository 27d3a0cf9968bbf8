//! Chooses the primary (and optional additional) agent for an utterance.
//!
//! The router never talks to a concrete agent — it only talks to a
//! [`crate::client_wrapper::ChatClient`] and the read-side
//! [`crate::registry::AgentRegistry`], and hands its normalized decision to
//! the [`crate::dispatcher::Dispatcher`]. Building the catalog prompt and
//! parsing a strict-JSON decision out of a chat completion mirrors the
//! teacher's `Orchestration::run` `Moderated` mode (which asks a moderator
//! agent to pick a speaker) and the tool-call JSON extraction in
//! `Agent::parse_tool_call`, generalized here into a retrying,
//! schema-validating call.

use crate::client_wrapper::{ChatClient, ChatCompletionOptions, Message};
use crate::context::OrchestrationContext;
use crate::registry::{AgentCard, AgentRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use crate::config::RouterOptions;

/// Normalized routing decision produced by [`Router::route`].
///
/// Invariant: after normalization, `primary_agent_id` never appears in
/// `additional_agent_ids`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The agent that should handle the request. Either a registered agent
    /// id or one of the reserved `clarification`/fallback ids.
    pub primary_agent_id: String,
    /// Other agents that should also contribute, in dispatch order, with
    /// duplicates and the primary id removed.
    pub additional_agent_ids: Vec<String>,
    /// Router's confidence in `primary_agent_id`, in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Optional free-text explanation.
    pub reasoning: Option<String>,
}

impl RoutingDecision {
    fn fallback(agent_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            primary_agent_id: agent_id.into(),
            additional_agent_ids: Vec::new(),
            confidence: 0.0,
            reasoning: Some(reasoning.into()),
        }
    }
}

/// Wire shape returned by the chat client, matching the JSON contract in the
/// external-interfaces section: `agentId`, `confidence`, `reasoning`,
/// `additionalAgents`.
#[derive(Debug, Deserialize)]
struct RoutingDecisionWire {
    #[serde(rename = "agentId")]
    agent_id: String,
    confidence: f64,
    reasoning: Option<String>,
    #[serde(rename = "additionalAgents", default)]
    additional_agents: Vec<String>,
}

/// Chooses which agent(s) should handle an utterance.
pub struct Router {
    chat_client: std::sync::Arc<dyn ChatClient>,
}

impl Router {
    /// Construct a router bound to a single chat-client capability.
    pub fn new(chat_client: std::sync::Arc<dyn ChatClient>) -> Self {
        Self { chat_client }
    }

    /// Route `utterance` given the current registry snapshot and the
    /// request's [`OrchestrationContext`] (used only to build a compressed
    /// recap of prior agents/topic — never the raw history content).
    pub async fn route(
        &self,
        utterance: &str,
        registry: &dyn AgentRegistry,
        context: &OrchestrationContext,
        options: &RouterOptions,
    ) -> RoutingDecision {
        let agents = registry.list().await;
        if agents.is_empty() {
            log::info!("router: empty registry, returning fallback without a chat call");
            return RoutingDecision::fallback(&options.fallback_agent_id, "no registered agents");
        }

        let catalog = render_catalog(&agents, options);
        let recap = render_recap(context);
        let user_prompt = options
            .user_prompt_template
            .replace("{catalog}", &catalog)
            .replace("{utterance}", utterance);
        let user_prompt = match recap {
            Some(recap) => format!("{recap}\n\n{user_prompt}"),
            None => user_prompt,
        };

        let messages = [
            Message::system(options.system_prompt.clone()),
            Message::user(user_prompt),
        ];
        let chat_options = ChatCompletionOptions {
            temperature: Some(options.temperature),
            max_output_tokens: Some(options.max_output_tokens),
            response_schema: Some(routing_decision_schema()),
        };

        let max_attempts = options.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.chat_client.send_message(&messages, &chat_options).await {
                Ok(reply) => match parse_decision(&reply.content) {
                    Ok(decision) => {
                        return self.normalize(decision, &agents, options);
                    }
                    Err(err) => {
                        log::warn!(
                            "router: attempt {attempt}/{max_attempts} failed to parse routing decision: {err}"
                        );
                    }
                },
                Err(err) => {
                    log::warn!(
                        "router: attempt {attempt}/{max_attempts} chat client call failed: {err}"
                    );
                }
            }
        }

        RoutingDecision::fallback(
            &options.fallback_agent_id,
            options
                .fallback_reason_template
                .replace("{attempts}", &max_attempts.to_string()),
        )
    }

    fn normalize(
        &self,
        decision: RoutingDecision,
        agents: &[AgentCard],
        options: &RouterOptions,
    ) -> RoutingDecision {
        let registered: HashSet<String> = agents.iter().map(|a| a.id.to_lowercase()).collect();
        let reserved: HashSet<&str> = [
            options.clarification_agent_id.as_str(),
            options.fallback_agent_id.as_str(),
        ]
        .into_iter()
        .collect();

        let mut primary = decision.primary_agent_id.to_lowercase();
        if !registered.contains(&primary) && !reserved.contains(primary.as_str()) {
            log::warn!("router: unknown primary agent '{primary}', rewriting to fallback");
            primary = options.fallback_agent_id.clone();
        }

        let mut seen = HashSet::new();
        seen.insert(primary.clone());
        let mut additional = Vec::new();
        for candidate in decision.additional_agent_ids.into_iter() {
            let lower = candidate.to_lowercase();
            if !registered.contains(&lower) {
                continue;
            }
            if seen.insert(lower.clone()) {
                additional.push(lower);
            }
        }

        let mut normalized = RoutingDecision {
            primary_agent_id: primary,
            additional_agent_ids: additional,
            confidence: decision.confidence,
            reasoning: decision.reasoning,
        };

        if normalized.confidence < options.confidence_threshold {
            let mut candidates = vec![normalized.primary_agent_id.clone()];
            candidates.extend(normalized.additional_agent_ids.iter().take(1).cloned());
            let candidates_str = candidates.join(", ");
            normalized.primary_agent_id = options.clarification_agent_id.clone();
            normalized.reasoning = Some(
                options
                    .clarification_prompt_template
                    .replace("{candidates}", &candidates_str),
            );
        }

        normalized
    }
}

fn parse_decision(raw: &str) -> Result<RoutingDecision, serde_json::Error> {
    let wire: RoutingDecisionWire = serde_json::from_str(raw.trim())?;
    Ok(RoutingDecision {
        primary_agent_id: wire.agent_id,
        additional_agent_ids: wire.additional_agents,
        confidence: wire.confidence,
        reasoning: wire.reasoning,
    })
}

fn routing_decision_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "agentId": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "reasoning": { "type": "string" },
            "additionalAgents": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["agentId", "confidence"]
    })
}

fn render_catalog(agents: &[AgentCard], options: &RouterOptions) -> String {
    let mut lines = vec![options.catalog_header.clone()];
    for agent in agents {
        let mut line = format!("- {}: {}", agent.id, agent.description);
        if options.include_capabilities && !agent.capabilities.is_empty() {
            let mut tags: Vec<&str> = agent
                .capabilities
                .iter()
                .map(|c| match c {
                    crate::registry::Capability::Push => "push",
                    crate::registry::Capability::Streaming => "streaming",
                    crate::registry::Capability::StateHistory => "state_history",
                })
                .collect();
            tags.sort_unstable();
            line.push_str(&format!(" capabilities: {}", tags.join(", ")));
        }
        lines.push(line);
        if options.include_skill_examples {
            for skill in &agent.skills {
                for example in skill.examples.iter().take(options.skill_example_limit) {
                    lines.push(format!("  example: {}", example.text));
                }
            }
        }
    }
    lines.join("\n")
}

fn render_recap(context: &OrchestrationContext) -> Option<String> {
    if context.history.is_empty() {
        return None;
    }
    let mut parts = vec![format!("conversation: {}", context.conversation_id)];
    if let Some(prev) = &context.previous_agent_id {
        parts.push(format!("previous agent: {prev}"));
    }
    Some(format!("Recap — {}", parts.join(", ")))
}
