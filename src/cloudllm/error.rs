//! Crate-wide error taxonomy.
//!
//! Mirrors the error-category table in the orchestration pipeline design: each
//! variant is a `kind`, not a type hierarchy, so callers match on the variant
//! rather than downcasting. Follows the same hand-rolled `Display`/`Error`
//! shape used throughout this crate (see `OrchestrationError` in the
//! teacher's own `orchestration` module) rather than pulling in a derive
//! macro crate.

use std::error::Error;
use std::fmt;

/// Boxed result alias used at public API boundaries.
pub type BoxResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Crate-wide error kind.
///
/// Not every variant is ever handed back to a caller of
/// [`crate::engine::Engine::process_request`] — several are absorbed
/// internally (e.g. `AgentTimeout` becomes a failed `AgentResponse` rather
/// than propagating), but all are represented here so internal plumbing has
/// one vocabulary to pass errors around in.
#[derive(Debug, Clone)]
pub enum OrchestratorError {
    /// The caller's cancellation signal fired.
    Cancellation,
    /// The router's chat-client response could not be parsed or validated as
    /// a `RoutingDecision` after exhausting `max_attempts`.
    RoutingParseError(String),
    /// The agent registry was empty when the router ran.
    RoutingNoAgents,
    /// An agent execution wrapper's deadline elapsed.
    AgentTimeout(String),
    /// An agent execution wrapper's handler returned an error.
    AgentFailure(String),
    /// A remote agent's task-delivery call returned nothing.
    RemoteNoResponse,
    /// A remote agent's task-delivery call returned a task in `Failed` status.
    RemoteTaskFailed(String),
    /// The durable task store is unreachable or returned an error.
    StorageUnavailable(String),
    /// An observer subscriber's handler returned an error.
    ObserverHandlerError(String),
    /// A durable task was referenced by id but does not exist.
    TaskNotFound(String),
    /// An invariant inside the orchestrator itself was violated.
    InternalError(String),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Cancellation => write!(f, "request was canceled"),
            OrchestratorError::RoutingParseError(msg) => {
                write!(f, "routing decision parse error: {}", msg)
            }
            OrchestratorError::RoutingNoAgents => write!(f, "no registered agents"),
            OrchestratorError::AgentTimeout(agent_id) => {
                write!(f, "agent '{}' timed out", agent_id)
            }
            OrchestratorError::AgentFailure(msg) => write!(f, "agent failure: {}", msg),
            OrchestratorError::RemoteNoResponse => {
                write!(f, "remote agent returned no response")
            }
            OrchestratorError::RemoteTaskFailed(status) => {
                write!(f, "remote agent task ended in status '{}'", status)
            }
            OrchestratorError::StorageUnavailable(msg) => {
                write!(f, "durable task store unavailable: {}", msg)
            }
            OrchestratorError::ObserverHandlerError(msg) => {
                write!(f, "observer subscriber error: {}", msg)
            }
            OrchestratorError::TaskNotFound(id) => write!(f, "task not found: {}", id),
            OrchestratorError::InternalError(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl Error for OrchestratorError {}
