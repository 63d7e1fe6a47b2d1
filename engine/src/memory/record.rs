//! Message Record
//!
//! One observed chat message plus its relevance weight. Everything except the
//! weight is fixed at construction.

use sdk::{Author, MessageId, RawMessage};
use serde::Serialize;

/// Base weight of a message written by a human
pub const HUMAN_BASE_WEIGHT: f64 = 1.0;

/// Base weight of a message written by an automated participant
pub const BOT_BASE_WEIGHT: f64 = 0.5;

/// Multiplier for messages replying to a human
pub const HUMAN_REPLY_BOOST: f64 = 1.2;

/// Multiplier for live messages that mention the bot
pub const MENTION_BOOST: f64 = 1.4;

/// Decay never takes a weight below this floor
pub const MIN_WEIGHT: f64 = 1e-6;

/// A weighted chat message held in the conversation buffer
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    author: Author,
    text: String,
    message_id: MessageId,
    reply_target_author: Option<Author>,
    reply_target_grandparent_text: Option<String>,
    weight: f64,
}

impl MessageRecord {
    /// Build a record and compute its base weight.
    ///
    /// `replied_to` is the resolved message this one replies to. When that
    /// message was itself a resolved reply, its parent's text is captured as
    /// the grandparent text.
    pub fn new(
        author: Author,
        text: impl Into<String>,
        message_id: MessageId,
        replied_to: Option<&RawMessage>,
    ) -> Self {
        let mut weight = if author.is_bot {
            BOT_BASE_WEIGHT
        } else {
            HUMAN_BASE_WEIGHT
        };

        if let Some(parent) = replied_to {
            if !parent.author.is_bot {
                weight *= HUMAN_REPLY_BOOST;
            }
        }

        Self {
            author,
            text: text.into(),
            message_id,
            reply_target_author: replied_to.map(|parent| parent.author.clone()),
            reply_target_grandparent_text: replied_to
                .and_then(|parent| parent.referenced.as_deref())
                .map(|grandparent| grandparent.content.clone()),
            weight,
        }
    }

    /// Build a record from a transport message
    pub fn from_raw(raw: &RawMessage) -> Self {
        Self::new(
            raw.author.clone(),
            raw.content.clone(),
            raw.id.clone(),
            raw.referenced.as_deref(),
        )
    }

    /// Raise the weight of a message that mentions the bot
    pub fn with_mention_boost(mut self) -> Self {
        self.weight *= MENTION_BOOST;
        self
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn author_id(&self) -> &str {
        &self.author.id
    }

    pub fn is_bot_author(&self) -> bool {
        self.author.is_bot
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn reply_target_author(&self) -> Option<&Author> {
        self.reply_target_author.as_ref()
    }

    pub fn reply_target_grandparent_text(&self) -> Option<&str> {
        self.reply_target_grandparent_text.as_deref()
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Multiply the weight by `factor`, flooring at `MIN_WEIGHT`.
    ///
    /// Callers validate that `factor` lies in (0, 1).
    pub(crate) fn scale_weight(&mut self, factor: f64) -> f64 {
        self.weight = (self.weight * factor).max(MIN_WEIGHT);
        self.weight
    }

    /// Model-facing view of this record carrying the given weight
    pub fn to_entry(&self, weight: f64) -> ContextEntry {
        ContextEntry {
            author: self.author.name.clone(),
            author_id: self.author.id.clone(),
            message: self.text.clone(),
            message_id: self.message_id.clone(),
            replying_to: self.reply_target_author.as_ref().map(|a| a.id.clone()),
            replying_to_replying_to: self.reply_target_grandparent_text.clone(),
            weight,
        }
    }
}

/// One element of the serialized context sent to the completion service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub author: String,
    pub author_id: String,
    pub message: String,
    pub message_id: MessageId,
    pub replying_to: Option<String>,
    pub replying_to_replying_to: Option<String>,
    pub weight: f64,
}
