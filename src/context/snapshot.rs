//! The immutable per-run input snapshot.

use super::RunIdentity;
use crate::errors::StageflowError;
use crate::utils::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Speaker role: `"user"`, `"assistant"`, `"system"`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// When the message was produced, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Free-form message metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// A message with the given role and content.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: None,
            metadata: HashMap::new(),
        }
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Stamps the message with a timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Immutable view of everything a run starts from.
///
/// Built once per run, then shared freely; stages never mutate it. The
/// snapshot round-trips losslessly through its mapping representation
/// (UUIDs as strings, timestamps as ISO-8601 UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Correlation identifiers, flattened into the mapping representation.
    #[serde(flatten)]
    pub identity: RunIdentity,

    /// Name of the topology the run executes under. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<String>,

    /// Execution mode label. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<String>,

    /// Raw input text (typed input or a transcript).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,

    /// Conversation history, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,

    /// Application extensions keyed by name. Never interpreted here.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, serde_json::Value>,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// When the snapshot was taken.
    pub created_at: Timestamp,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            identity: RunIdentity::new(),
            topology: None,
            execution_mode: None,
            input_text: None,
            messages: Vec::new(),
            extensions: HashMap::new(),
            metadata: HashMap::new(),
            created_at: now(),
        }
    }
}

impl ContextSnapshot {
    /// A snapshot with a fresh run identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the run identity.
    #[must_use]
    pub fn with_identity(mut self, identity: RunIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the topology label.
    #[must_use]
    pub fn with_topology(mut self, topology: impl Into<String>) -> Self {
        self.topology = Some(topology.into());
        self
    }

    /// Sets the execution-mode label.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: impl Into<String>) -> Self {
        self.execution_mode = Some(mode.into());
        self
    }

    /// Sets the raw input text.
    #[must_use]
    pub fn with_input_text(mut self, text: impl Into<String>) -> Self {
        self.input_text = Some(text.into());
        self
    }

    /// Appends one message to the history.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Replaces the message history.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Registers an application extension payload.
    #[must_use]
    pub fn with_extension(mut self, name: impl Into<String>, payload: serde_json::Value) -> Self {
        self.extensions.insert(name.into(), payload);
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The run id, when present.
    #[must_use]
    pub fn pipeline_run_id(&self) -> Option<uuid::Uuid> {
        self.identity.pipeline_run_id
    }

    /// The most recent user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }

    /// An extension payload by name.
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<&serde_json::Value> {
        self.extensions.get(name)
    }

    /// A metadata value by key.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// The canonical mapping representation.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Rebuilds a snapshot from its mapping representation.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the mapping does not describe a
    /// valid snapshot.
    pub fn from_dict(
        dict: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, StageflowError> {
        Ok(serde_json::from_value(serde_json::Value::Object(dict))?)
    }
}
