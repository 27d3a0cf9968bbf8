//! Per-conversation mutable state threaded through a single request.
//!
//! [`OrchestrationContext`] is re-hydrated from a [`crate::durable_task::DurableTask`]
//! at the start of [`crate::engine::Engine::process_request`] and handed by value
//! (or by `&mut` reference, once constructed) through the router, dispatcher,
//! and each agent execution wrapper in turn. It owns no back-reference to the
//! engine and requires no global state, matching the "cyclic ownership"
//! design note in the specification.

use crate::client_wrapper::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;

/// One turn of conversation, either from the user or from the aggregated
/// assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// Who authored the turn.
    pub role: Role,
    /// The turn's text content.
    pub text: String,
    /// Id uniquely identifying this turn on the wire, independent of its
    /// position in history (A2A's `message.messageId`).
    pub message_id: String,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

impl HistoryTurn {
    /// Construct a turn stamped with the supplied timestamp.
    ///
    /// Timestamps are passed in rather than captured internally so that
    /// callers running inside a workflow or test harness that forbids
    /// wall-clock reads at arbitrary points can supply a consistent clock.
    pub fn new(role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            text: text.into(),
            message_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
        }
    }
}

/// An opaque, per-agent, per-conversation state handle.
///
/// A local agent's notion of a reusable "thread" (a provider-side
/// conversation handle, a cached embedding index, whatever the concrete
/// agent needs to avoid re-initializing on every turn) is invisible to the
/// orchestration core. The core only knows it was created for a particular
/// `conversation_id` and must be discarded wholesale — never partially
/// mutated — when the conversation changes.
pub type ThreadHandle = Box<dyn Any + Send + Sync>;

struct ThreadSlot {
    conversation_id: String,
    handle: ThreadHandle,
}

/// Per-conversation mutable state carried through one request.
pub struct OrchestrationContext {
    /// Identifier tying all turns of this dialogue together; shared across
    /// restarts. Equal to the owning [`crate::durable_task::DurableTask::context_id`].
    pub conversation_id: String,
    /// The agent that most recently produced a turn in this conversation, if any.
    pub previous_agent_id: Option<String>,
    /// Bounded, ordered chat history, trimmed to at most `history_limit`
    /// most-recent turns. The trim always discards the oldest entries.
    pub history: Vec<HistoryTurn>,
    /// Maximum number of turns [`OrchestrationContext::history`] may hold.
    history_limit: usize,
    agent_threads: HashMap<String, ThreadSlot>,
}

impl OrchestrationContext {
    /// Create a fresh context for the given conversation.
    pub fn new(conversation_id: impl Into<String>, history_limit: usize) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            previous_agent_id: None,
            history: Vec::new(),
            history_limit,
            agent_threads: HashMap::new(),
        }
    }

    /// Re-hydrate a context from a durable task's history, trimming to
    /// `history_limit` most-recent turns.
    pub fn from_history(
        conversation_id: impl Into<String>,
        history: Vec<HistoryTurn>,
        history_limit: usize,
    ) -> Self {
        let mut ctx = Self::new(conversation_id, history_limit);
        ctx.history = history;
        ctx.trim_history();
        ctx
    }

    /// Append a turn and trim from the front if over budget.
    ///
    /// Invariant: `self.history.len() <= history_limit` holds after every
    /// call, as required by the wrapper's post-invocation contract.
    pub fn push_turn(&mut self, turn: HistoryTurn) {
        self.history.push(turn);
        self.trim_history();
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.history_limit {
            self.history.remove(0);
        }
    }

    /// Look up the thread handle for `agent_id`, if one exists and was
    /// created for the current `conversation_id`. A handle created for a
    /// different conversation is treated as absent (the caller is expected
    /// to replace it via [`OrchestrationContext::set_thread`]).
    pub fn thread_for(&self, agent_id: &str) -> Option<&ThreadHandle> {
        self.agent_threads.get(agent_id).and_then(|slot| {
            if slot.conversation_id == self.conversation_id {
                Some(&slot.handle)
            } else {
                None
            }
        })
    }

    /// Replace (or insert) the thread handle for `agent_id`, binding it to
    /// the current `conversation_id`. Any prior handle for this agent is
    /// discarded wholesale, never partially mutated.
    pub fn set_thread(&mut self, agent_id: impl Into<String>, handle: ThreadHandle) {
        self.agent_threads.insert(
            agent_id.into(),
            ThreadSlot {
                conversation_id: self.conversation_id.clone(),
                handle,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn history_trims_from_the_front() {
        let mut ctx = OrchestrationContext::new("conv-1", 2);
        ctx.push_turn(HistoryTurn::new(Role::User, "one", ts()));
        ctx.push_turn(HistoryTurn::new(Role::User, "two", ts()));
        ctx.push_turn(HistoryTurn::new(Role::User, "three", ts()));
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history[0].text, "two");
        assert_eq!(ctx.history[1].text, "three");
    }

    #[test]
    fn thread_invalidated_on_conversation_change() {
        let mut ctx = OrchestrationContext::new("conv-1", 10);
        ctx.set_thread("light", Box::new(42_u32));
        assert!(ctx.thread_for("light").is_some());

        let ctx2 = OrchestrationContext::new("conv-2", 10);
        assert!(ctx2.thread_for("light").is_none());
    }

    #[test]
    fn from_history_trims_on_rehydration() {
        let turns = vec![
            HistoryTurn::new(Role::User, "a", ts()),
            HistoryTurn::new(Role::Assistant, "b", ts()),
            HistoryTurn::new(Role::User, "c", ts()),
        ];
        let ctx = OrchestrationContext::from_history("conv-1", turns, 1);
        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.history[0].text, "c");
    }
}
