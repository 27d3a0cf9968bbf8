//! Durable, restart-surviving conversation state.
//!
//! Everything the orchestration core needs to remember about a dialogue —
//! its turn history and its A2A lifecycle status — is modeled as a
//! [`DurableTask`] and persisted through the [`KvStore`] seam rather than
//! kept only in process memory. A concrete deployment backs [`KvStore`] with
//! Redis or similar; [`InMemoryKvStore`] is a reference implementation
//! sufficient for tests and single-process use, mirroring the teacher's
//! `InMemoryStore` used by `ContextStrategy` in spirit (load/save byte blobs
//! keyed by string, nothing fancier).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Mutex;
use std::time::Duration;

use crate::context::HistoryTurn;
use crate::error::OrchestratorError;

/// Default time-to-live applied to every durable task write. Refreshed on
/// every subsequent write so an active conversation never expires mid-flight.
pub const TASK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A2A task lifecycle status. Wire representation is kebab-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Task created but processing has not yet started.
    Submitted,
    /// Actively being processed by the pipeline.
    Working,
    /// Paused, waiting on additional user input (e.g. a clarification turn).
    InputRequired,
    /// Finished successfully; `DurableTask::status_message` holds the final reply.
    Completed,
    /// Canceled via the caller's cancellation signal.
    Canceled,
    /// Finished with an unrecoverable error.
    Failed,
    /// Status reported by a remote agent that does not map to any other variant.
    Unknown,
}

impl TaskStatus {
    /// Whether this status represents a pipeline that has stopped running
    /// and will not resume without a new request.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Canceled | TaskStatus::Failed
        )
    }
}

/// Opaque artifact produced by an agent (a file, an image, structured data)
/// that the orchestration core stores but never interprets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Caller-assigned artifact id.
    pub id: String,
    /// MIME type, as reported by the producing agent.
    pub mime_type: String,
    /// Raw bytes, base64-encoded on the wire via serde's default `Vec<u8>` handling.
    pub data: Vec<u8>,
}

/// A durable, restart-surviving unit of conversation.
///
/// `id` identifies this specific task instance; `context_id` is the
/// conversation identifier shared across every task in a dialogue
/// (equal to [`crate::context::OrchestrationContext::conversation_id`]).
///
/// This type's own field layout is the idiomatic, snake_case shape used
/// throughout the orchestration core. [`TaskStore`] never serializes it
/// directly — the A2A wire shape (nested `status`, `history` turns as
/// `{role, messageId, parts}`) is structurally different, so persistence
/// goes through [`DurableTaskWire`] instead, mirroring how
/// [`crate::router::Router`] separates its domain decision from its wire
/// representation.
#[derive(Debug, Clone)]
pub struct DurableTask {
    /// Unique task id.
    pub id: String,
    /// Conversation id this task belongs to.
    pub context_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// When `status` was last changed.
    pub status_timestamp: DateTime<Utc>,
    /// Caller-facing message associated with the current status (e.g. the
    /// final aggregated reply when `status == Completed`).
    pub status_message: Option<String>,
    /// Full turn history for this conversation.
    pub history: Vec<HistoryTurn>,
    /// Opaque artifacts attached by agents.
    pub artifacts: Vec<Artifact>,
    /// Free-form metadata (e.g. the id of the agent that produced the last turn).
    pub metadata: HashMap<String, String>,
}

impl DurableTask {
    /// Construct a freshly submitted task for a new conversation.
    pub fn new(id: impl Into<String>, context_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            context_id: context_id.into(),
            status: TaskStatus::Submitted,
            status_timestamp: now,
            status_message: None,
            history: Vec::new(),
            artifacts: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Transition to a new status, stamping `status_timestamp` and replacing
    /// `status_message`.
    pub fn set_status(&mut self, status: TaskStatus, message: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.status_message = message;
        self.status_timestamp = now;
    }
}

/// Per-configuration push-notification subscription, keyed independently of
/// the task itself so an agent can fan out to several configured webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotificationConfig {
    /// Id of this configuration, unique within a task.
    pub id: String,
    /// Endpoint the embedding application should deliver notifications to.
    /// Interpreted entirely by the (out-of-scope) HTTP/RPC front end.
    pub url: String,
    /// Opaque bearer token or similar, passed through uninterpreted.
    pub token: Option<String>,
}

/// A single text part of an A2A message. The wire format allows other part
/// kinds (file, data); the orchestration core only ever produces and
/// consumes text, so that is all [`DurableTaskWire`] models.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PartWire {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusMessageWire {
    role: crate::client_wrapper::Role,
    parts: Vec<PartWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryTurnWire {
    role: crate::client_wrapper::Role,
    message_id: String,
    parts: Vec<PartWire>,
    timestamp: DateTime<Utc>,
}

impl From<&HistoryTurn> for HistoryTurnWire {
    fn from(turn: &HistoryTurn) -> Self {
        Self {
            role: turn.role.clone(),
            message_id: turn.message_id.clone(),
            parts: vec![PartWire {
                text: turn.text.clone(),
            }],
            timestamp: turn.timestamp,
        }
    }
}

impl From<HistoryTurnWire> for HistoryTurn {
    fn from(wire: HistoryTurnWire) -> Self {
        let text = wire
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        Self {
            role: wire.role,
            text,
            message_id: wire.message_id,
            timestamp: wire.timestamp,
        }
    }
}

/// `status` as nested `{state, message, timestamp}`, per A2A §6 rather than
/// [`DurableTask`]'s flattened `status`/`status_message`/`status_timestamp` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusWire {
    state: TaskStatus,
    message: Option<StatusMessageWire>,
    timestamp: DateTime<Utc>,
}

/// A2A wire representation of a [`DurableTask`]. Only [`TaskStore`] ever
/// constructs or parses this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DurableTaskWire {
    id: String,
    context_id: String,
    status: StatusWire,
    history: Vec<HistoryTurnWire>,
    artifacts: Vec<Artifact>,
    metadata: HashMap<String, String>,
}

impl From<&DurableTask> for DurableTaskWire {
    fn from(task: &DurableTask) -> Self {
        Self {
            id: task.id.clone(),
            context_id: task.context_id.clone(),
            status: StatusWire {
                state: task.status,
                message: task.status_message.as_ref().map(|text| StatusMessageWire {
                    role: crate::client_wrapper::Role::Assistant,
                    parts: vec![PartWire { text: text.clone() }],
                }),
                timestamp: task.status_timestamp,
            },
            history: task.history.iter().map(HistoryTurnWire::from).collect(),
            artifacts: task.artifacts.clone(),
            metadata: task.metadata.clone(),
        }
    }
}

impl From<DurableTaskWire> for DurableTask {
    fn from(wire: DurableTaskWire) -> Self {
        let status_message = wire.status.message.map(|message| {
            message
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        });
        Self {
            id: wire.id,
            context_id: wire.context_id,
            status: wire.status.state,
            status_timestamp: wire.status.timestamp,
            status_message,
            history: wire.history.into_iter().map(HistoryTurn::from).collect(),
            artifacts: wire.artifacts,
            metadata: wire.metadata,
        }
    }
}

/// Minimal async byte-string key/value seam the durable task store is built
/// over. A concrete deployment backs this with Redis or another TTL-capable
/// store; [`InMemoryKvStore`] is the reference implementation used by tests.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the raw bytes stored at `key`, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Box<dyn Error + Send + Sync>>;

    /// Store `value` at `key`, expiring after `ttl`. Overwrites any existing value.
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Remove `key`, if present.
    async fn delete(&self, key: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// List keys with the given prefix. Used to enumerate a task's push
    /// notification configs.
    async fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>, Box<dyn Error + Send + Sync>>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// In-process reference [`KvStore`], suitable for tests and single-process
/// deployments. Expiry is checked lazily on read.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Box<dyn Error + Send + Sync>> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= Utc::now() {
                entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        let entries = self.entries.lock().unwrap();
        let now = Utc::now();
        Ok(entries
            .iter()
            .filter(|(k, v)| k.starts_with(prefix) && v.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect())
    }
}

fn task_key(task_id: &str) -> String {
    format!("lucia:task:{task_id}")
}

fn notification_key(task_id: &str, config_id: &str) -> String {
    format!("lucia:task:{task_id}:notification:{config_id}")
}

fn notification_prefix(task_id: &str) -> String {
    format!("lucia:task:{task_id}:notification:")
}

/// Durable task persistence built generically over a [`KvStore`].
///
/// Every write refreshes [`TASK_TTL`], so a conversation that is actively
/// used never silently expires; only genuinely abandoned conversations age out.
pub struct TaskStore<S: KvStore> {
    kv: S,
}

impl<S: KvStore> TaskStore<S> {
    /// Wrap a [`KvStore`] backend.
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    /// Fetch a task by id, if present.
    pub async fn get_task(
        &self,
        task_id: &str,
    ) -> Result<Option<DurableTask>, Box<dyn Error + Send + Sync>> {
        match self.kv.get(&task_key(task_id)).await? {
            Some(bytes) => {
                let wire: DurableTaskWire = serde_json::from_slice(&bytes)?;
                Ok(Some(DurableTask::from(wire)))
            }
            None => Ok(None),
        }
    }

    /// Persist a task in full, refreshing its TTL.
    pub async fn set_task(&self, task: &DurableTask) -> Result<(), Box<dyn Error + Send + Sync>> {
        let wire = DurableTaskWire::from(task);
        let bytes = serde_json::to_vec(&wire)?;
        self.kv.set(&task_key(&task.id), bytes, TASK_TTL).await
    }

    /// Atomic read-modify-write status transition. Fails with
    /// [`OrchestratorError::TaskNotFound`] if `task_id` does not exist,
    /// matching the `task_not_found` error category.
    pub async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DurableTask, Box<dyn Error + Send + Sync>> {
        let Some(mut task) = self.get_task(task_id).await? else {
            return Err(Box::new(OrchestratorError::TaskNotFound(task_id.to_string())));
        };
        task.set_status(status, message, now);
        self.set_task(&task).await?;
        Ok(task)
    }

    /// Fetch a single push-notification config.
    pub async fn get_push_notification(
        &self,
        task_id: &str,
        config_id: &str,
    ) -> Result<Option<PushNotificationConfig>, Box<dyn Error + Send + Sync>> {
        match self.kv.get(&notification_key(task_id, config_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store (or replace) a push-notification config.
    pub async fn set_push_notification_config(
        &self,
        task_id: &str,
        config: &PushNotificationConfig,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let bytes = serde_json::to_vec(config)?;
        self.kv
            .set(&notification_key(task_id, &config.id), bytes, TASK_TTL)
            .await
    }

    /// List every push-notification config registered for a task.
    pub async fn list_push_notifications(
        &self,
        task_id: &str,
    ) -> Result<Vec<PushNotificationConfig>, Box<dyn Error + Send + Sync>> {
        let keys = self
            .kv
            .keys_with_prefix(&notification_prefix(task_id))
            .await?;
        let mut configs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = self.kv.get(&key).await? {
                configs.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_wrapper::Role;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn round_trips_a_task() {
        let store = TaskStore::new(InMemoryKvStore::new());
        let mut task = DurableTask::new("task-1", "conv-1", ts());
        task.history
            .push(HistoryTurn::new(Role::User, "hi", ts()));
        store.set_task(&task).await.unwrap();

        let fetched = store.get_task("task-1").await.unwrap().unwrap();
        assert_eq!(fetched.context_id, "conv-1");
        assert_eq!(fetched.history.len(), 1);
        assert_eq!(fetched.status, TaskStatus::Submitted);
    }

    #[tokio::test]
    async fn missing_task_returns_none() {
        let store = TaskStore::new(InMemoryKvStore::new());
        assert!(store.get_task("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_status_is_read_modify_write() {
        let store = TaskStore::new(InMemoryKvStore::new());
        let task = DurableTask::new("task-1", "conv-1", ts());
        store.set_task(&task).await.unwrap();

        let updated = store
            .update_status("task-1", TaskStatus::Completed, Some("done".into()), ts())
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert_eq!(updated.status_message.as_deref(), Some("done"));
        assert!(updated.status.is_terminal());

        let refetched = store.get_task("task-1").await.unwrap().unwrap();
        assert_eq!(refetched.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn update_status_on_missing_task_fails_with_task_not_found() {
        let store = TaskStore::new(InMemoryKvStore::new());
        let err = store
            .update_status("missing", TaskStatus::Working, None, ts())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn push_notification_configs_round_trip_and_list() {
        let store = TaskStore::new(InMemoryKvStore::new());
        let task = DurableTask::new("task-1", "conv-1", ts());
        store.set_task(&task).await.unwrap();

        store
            .set_push_notification_config(
                "task-1",
                &PushNotificationConfig {
                    id: "cfg-a".into(),
                    url: "https://example.com/hook-a".into(),
                    token: None,
                },
            )
            .await
            .unwrap();
        store
            .set_push_notification_config(
                "task-1",
                &PushNotificationConfig {
                    id: "cfg-b".into(),
                    url: "https://example.com/hook-b".into(),
                    token: Some("secret".into()),
                },
            )
            .await
            .unwrap();

        let fetched = store
            .get_push_notification("task-1", "cfg-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.url, "https://example.com/hook-a");

        let all = store.list_push_notifications("task-1").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn status_wire_format_is_kebab_case() {
        let json = serde_json::to_string(&TaskStatus::InputRequired).unwrap();
        assert_eq!(json, "\"input-required\"");
    }
}
