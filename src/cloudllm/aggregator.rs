//! Combines per-agent responses into the single reply the caller sees.
//!
//! The aggregator never calls a chat client itself — it only does string
//! composition and arithmetic over the [`crate::wrapper::AgentResponse`]
//! values the dispatcher collected, following the same "plain Rust, no
//! hidden LLM call" shape as the teacher's `Orchestration::summarize_votes`
//! helper in `council.rs`.

pub use crate::config::AggregatorOptions;
use crate::wrapper::AgentResponse;

/// Final, user-facing outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct AggregatedResult {
    /// The composed reply text.
    pub message: String,
    /// Ids of agents that responded successfully, in the order they appear
    /// in the composed message.
    pub successful_agents: Vec<String>,
    /// Ids of agents whose invocation failed.
    pub failed_agents: Vec<String>,
    /// Sum of every response's `execution_ms`.
    pub total_execution_ms: u64,
}

/// Composes [`AgentResponse`]s into one [`AggregatedResult`].
pub struct Aggregator;

impl Aggregator {
    /// Aggregate `responses` per `options`.
    ///
    /// - An empty `responses` list (e.g. every agent id was unbound, or
    ///   cancellation fired before anything ran) yields the configured
    ///   fallback message with no successful or failed agents.
    /// - When every response failed, the message lists the failures.
    /// - When every response succeeded, their content is joined in priority
    ///   order.
    /// - A mix composes the successes, then a "However," sentence listing
    ///   the failures.
    pub fn aggregate(&self, responses: Vec<AgentResponse>, options: &AggregatorOptions) -> AggregatedResult {
        if responses.is_empty() {
            let message = options
                .default_fallback_message
                .clone()
                .unwrap_or_else(|| "I wasn't able to find an agent to help with that.".to_string());
            return AggregatedResult {
                message,
                successful_agents: Vec::new(),
                failed_agents: Vec::new(),
                total_execution_ms: 0,
            };
        }

        let total_execution_ms: u64 = responses
            .iter()
            .map(|r| r.execution_ms)
            .fold(0_u64, |acc, ms| acc.saturating_add(ms));

        let mut successes: Vec<&AgentResponse> = responses.iter().filter(|r| r.success).collect();
        let failures: Vec<&AgentResponse> = responses.iter().filter(|r| !r.success).collect();

        order_by_priority(&mut successes, &options.agent_priority);

        let successful_agents: Vec<String> = successes.iter().map(|r| r.agent_id.clone()).collect();
        let failed_agents: Vec<String> = failures.iter().map(|r| r.agent_id.clone()).collect();

        let message = match (successes.is_empty(), failures.is_empty()) {
            (true, _) => {
                let prefix = options
                    .default_failure_message
                    .clone()
                    .unwrap_or_else(|| "I ran into a problem handling that request. However,".to_string());
                format!("{prefix} {}", render_failures(&failures))
            }
            (false, true) => render_successes(&successes),
            (false, false) => format!(
                "{} However, {}",
                render_successes(&successes),
                render_failures(&failures)
            ),
        };

        AggregatedResult {
            message,
            successful_agents,
            failed_agents,
            total_execution_ms,
        }
    }
}

fn order_by_priority(successes: &mut Vec<&AgentResponse>, priority: &[String]) {
    let rank = |agent_id: &str| -> usize {
        priority
            .iter()
            .position(|id| id == agent_id)
            .unwrap_or(priority.len())
    };
    successes.sort_by_key(|r| rank(&r.agent_id));
}

fn render_successes(successes: &[&AgentResponse]) -> String {
    successes
        .iter()
        .map(|r| r.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_failures(failures: &[&AgentResponse]) -> String {
    let names: Vec<String> = failures
        .iter()
        .map(|r| {
            r.error_message
                .as_deref()
                .map(|msg| format!("{} ({msg})", r.agent_id))
                .unwrap_or_else(|| r.agent_id.clone())
        })
        .collect();
    format!("{} could not complete their part.", names.join(", "))
}
