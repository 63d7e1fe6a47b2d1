//! Chat gateway boundary
//!
//! The engine never talks to a chat service directly. A transport adapter
//! implements `ChatGateway` for one channel and pushes `GatewayEvent`s into
//! the session's inbound queue. Everything here is transport-neutral.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::EngineError;

/// Identifier of a message within a channel.
///
/// Stored in canonical string form so ids arriving as JSON numbers and ids
/// arriving as strings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a message id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Canonicalize an id taken from a JSON payload.
    ///
    /// Strings and numbers are accepted. Returns `None` for any other JSON
    /// type and for empty strings.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self::new(s.as_str())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Sender of a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Opaque user identifier
    pub id: String,

    /// Display string used in the model-facing context
    pub name: String,

    /// Whether the sender is an automated participant
    pub is_bot: bool,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>, is_bot: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_bot,
        }
    }

    /// The token a chat message contains when it mentions this author
    pub fn mention_token(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A message as delivered by the transport, before the engine weighs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    pub author: Author,
    pub content: String,

    /// Id of the message this one replies to, known even when the message
    /// itself was not delivered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,

    /// The message this one replies to, when the transport could resolve it.
    /// Its own `referenced` field is populated only if the transport resolved
    /// one level further.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced: Option<Box<RawMessage>>,
}

impl RawMessage {
    pub fn new(id: impl Into<MessageId>, author: Author, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author,
            content: content.into(),
            reply_to: None,
            referenced: None,
        }
    }

    /// Attach the message this one replies to
    pub fn replying_to(mut self, parent: RawMessage) -> Self {
        self.reply_to = Some(parent.id.clone());
        self.referenced = Some(Box::new(parent));
        self
    }

    /// Record the id of an unresolved reply target
    pub fn with_reply_to(mut self, id: impl Into<MessageId>) -> Self {
        self.reply_to = Some(id.into());
        self
    }

    /// The reply target's own target when only its id is known
    pub fn unresolved_grandparent(&self) -> Option<&MessageId> {
        let parent = self.referenced.as_deref()?;
        match parent.referenced {
            Some(_) => None,
            None => parent.reply_to.as_ref(),
        }
    }
}

/// Events pushed by a transport adapter into a session's inbound queue
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The transport finished (re)connecting as the given user
    Ready { user: Author },

    /// A new message was posted in the session's channel
    Message(RawMessage),
}

/// Transport collaborator bound to a single channel
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Short transport name used in logs (e.g. "discord")
    fn name(&self) -> &str;

    /// Fetch up to `limit` recent messages, newest first
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<RawMessage>, EngineError>;

    /// Fetch one message of the channel, `None` when it no longer exists
    async fn fetch_message(&self, id: &MessageId) -> Result<Option<RawMessage>, EngineError>;

    /// Post a message, optionally as a reply to `reply_to`
    async fn send(&self, text: &str, reply_to: Option<&MessageId>) -> Result<MessageId, EngineError>;

    /// Publish the bot's presence/status line
    async fn set_status(&self, status: &str) -> Result<(), EngineError>;
}
