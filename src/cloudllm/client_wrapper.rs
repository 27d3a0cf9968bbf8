//! Shared primitives for the pluggable chat-client capability.
//!
//! The orchestration core never talks to a concrete LLM vendor directly —
//! implementing the wire protocol for any given provider is explicitly out of
//! scope for this crate (see the crate-level docs). Instead, callers supply
//! an `Arc<dyn ChatClient>` and the core treats it as an opaque capability:
//! a sequence of [`Message`]s goes in, one [`Message`] comes back, optionally
//! honoring a structured-output constraint requested via
//! [`ChatCompletionOptions::response_schema`].
//!
//! Only the [`router`](crate::router) module calls a [`ChatClient`] directly;
//! everything else in the pipeline (dispatcher, aggregator, engine) is
//! chat-client agnostic.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::error::Error;
//! use async_trait::async_trait;
//! use cloudllm::client_wrapper::{ChatClient, ChatCompletionOptions, Message, Role};
//!
//! struct EchoClient;
//!
//! #[async_trait]
//! impl ChatClient for EchoClient {
//!     async fn send_message(
//!         &self,
//!         messages: &[Message],
//!         _options: &ChatCompletionOptions,
//!     ) -> Result<Message, Box<dyn Error + Send + Sync>> {
//!         let last = messages.last().map(|m| m.content.clone()).unwrap_or_else(|| "".into());
//!         Ok(Message { role: Role::Assistant, content: last })
//!     }
//!
//!     fn model_name(&self) -> &str {
//!         "echo-1"
//!     }
//! }
//!
//! # async {
//! let client: Arc<dyn ChatClient> = Arc::new(EchoClient);
//! let reply = client
//!     .send_message(
//!         &[Message { role: Role::User, content: "hi".into() }],
//!         &ChatCompletionOptions::default(),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(&*reply.content, "hi");
//! # };
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

/// The role a [`Message`] was authored under.
///
/// Serializes per the A2A wire vocabulary, where an assistant turn is
/// reported as `"agent"` rather than `"assistant"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// A system authored message that primes or constrains assistant behaviour.
    #[serde(rename = "system")]
    System,
    /// A user authored message.
    #[serde(rename = "user")]
    User,
    /// An assistant authored message (model output).
    #[serde(rename = "agent")]
    Assistant,
}

/// A single chat turn exchanged with a [`ChatClient`].
///
/// `content` is stored as `Arc<str>` so conversation histories
/// ([`crate::context::OrchestrationContext::history`]) can be cloned cheaply
/// when handed to successive agent wrapper invocations.
#[derive(Debug, Clone)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The message body.
    pub content: Arc<str>,
}

impl Message {
    /// Construct a user-authored message from anything convertible to a string.
    pub fn user(content: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Construct a system-authored message from anything convertible to a string.
    pub fn system(content: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Construct an assistant-authored message from anything convertible to a string.
    pub fn assistant(content: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling and structured-output hints forwarded to a [`ChatClient`].
///
/// Mirrors the `RouterOptions` sampling fields (`temperature`,
/// `max_output_tokens`) plus an optional JSON Schema constraint used when the
/// router needs a strict JSON object back.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletionOptions {
    /// Sampling temperature hint, if the provider supports one.
    pub temperature: Option<f32>,
    /// Generation length cap hint, if the provider supports one.
    pub max_output_tokens: Option<u32>,
    /// When set, the client is asked to constrain its output to valid JSON
    /// matching this schema. Implementations that cannot honor the
    /// constraint natively may ignore it; the caller is responsible for
    /// validating the returned text regardless.
    pub response_schema: Option<serde_json::Value>,
}

/// Trait-driven abstraction over a concrete chat-completion backend.
///
/// All implementations **must** be thread-safe (`Send + Sync`) so they can be
/// shared across concurrently-running requests via `Arc<dyn ChatClient>`.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a full request/response style chat completion.
    ///
    /// `messages` must include any system priming messages the caller wishes
    /// to send; there is no implicit system prompt.
    async fn send_message(
        &self,
        messages: &[Message],
        options: &ChatCompletionOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Return the identifier used to select the upstream model (e.g. `"gpt-4.1"`).
    fn model_name(&self) -> &str;
}
