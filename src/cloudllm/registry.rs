//! Read-only directory of available agents.
//!
//! The registry is an external collaborator in the full system (a concrete
//! deployment would back it with a database or a service discovery layer),
//! but the orchestration core only ever needs the read side: enumerate
//! cards, look one up by id. [`InMemoryAgentRegistry`] is a reference
//! implementation suitable for tests and single-process deployments,
//! grounded on the same "load once, treat as read-only for the rest of the
//! run" idiom the teacher uses for its `HashMap<String, Agent>` agent map in
//! `orchestration::Orchestration`.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// A capability flag an agent may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The agent can push notifications rather than only respond synchronously.
    Push,
    /// The agent supports streaming output.
    Streaming,
    /// The agent exposes its own state/history independent of the durable task.
    StateHistory,
}

/// One example exchange for a skill, used to enrich the router's catalog prompt.
#[derive(Debug, Clone)]
pub struct SkillExample {
    /// Example user utterance.
    pub text: String,
}

/// A named capability an agent exposes, with illustrative examples.
#[derive(Debug, Clone)]
pub struct Skill {
    /// Short skill name.
    pub name: String,
    /// Human-readable description of what the skill does.
    pub description: String,
    /// Example utterances this skill handles well.
    pub examples: Vec<SkillExample>,
}

/// Read-only directory entry describing one agent.
///
/// Loaded at startup from the registry and never mutated during a request.
#[derive(Debug, Clone)]
pub struct AgentCard {
    /// Unique, stable, lowercase identifier.
    pub id: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Free-form description embedded into the router's catalog prompt.
    pub description: String,
    /// Either a local identifier (resolved by the embedding application to a
    /// [`crate::wrapper::LocalAgentHandler`]) or a network endpoint for a
    /// remote A2A agent.
    pub url_or_local: String,
    /// Capability flags this agent advertises.
    pub capabilities: HashSet<Capability>,
    /// Ordered list of named skills.
    pub skills: Vec<Skill>,
    /// Agent version string.
    pub version: String,
}

impl AgentCard {
    /// Construct a minimal card with no capabilities or skills.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: description.into(),
            url_or_local: String::new(),
            capabilities: HashSet::new(),
            skills: Vec::new(),
            version: "0.1.0".to_string(),
        }
    }

    /// Whether this card is a remote A2A agent (`url_or_local` looks like a URL).
    pub fn is_remote(&self) -> bool {
        self.url_or_local.starts_with("http://") || self.url_or_local.starts_with("https://")
    }
}

/// Read-only access to the set of available agents.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// List all registered agent cards, in a stable iteration order.
    async fn list(&self) -> Vec<AgentCard>;

    /// Look up a single card by id.
    async fn get(&self, id: &str) -> Option<AgentCard>;
}

/// In-memory reference [`AgentRegistry`] backed by insertion order.
#[derive(Default)]
pub struct InMemoryAgentRegistry {
    order: Vec<String>,
    cards: HashMap<String, AgentCard>,
}

impl InMemoryAgentRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a card, preserving insertion order for catalog rendering.
    /// Re-registering an existing id overwrites the card in place without
    /// moving its position.
    pub fn register(&mut self, card: AgentCard) {
        if !self.cards.contains_key(&card.id) {
            self.order.push(card.id.clone());
        }
        self.cards.insert(card.id.clone(), card);
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn list(&self) -> Vec<AgentCard> {
        self.order
            .iter()
            .filter_map(|id| self.cards.get(id))
            .cloned()
            .collect()
    }

    async fn get(&self, id: &str) -> Option<AgentCard> {
        self.cards.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preserves_registration_order() {
        let mut registry = InMemoryAgentRegistry::new();
        registry.register(AgentCard::new("b", "B", "second"));
        registry.register(AgentCard::new("a", "A", "first"));
        let ids: Vec<_> = registry.list().await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn lookup_missing_returns_none() {
        let registry = InMemoryAgentRegistry::new();
        assert!(registry.get("missing").await.is_none());
    }

    #[test]
    fn remote_detection() {
        let mut card = AgentCard::new("light", "Light", "controls lights");
        assert!(!card.is_remote());
        card.url_or_local = "https://agents.example.com/light".to_string();
        assert!(card.is_remote());
    }
}
