//! Response Selector
//!
//! One selection round:
//!
//! 1. Serialize the buffer into the model-facing context, scaling each
//!    record's weight by its recency multiplier
//! 2. Ask the completion service for `{response, picked_message}`
//! 3. Decay the picked record by 0.5
//! 4. Regenerate when the response echoes any remembered message, up to
//!    `DEFAULT_MAX_ATTEMPTS` completions
//!
//! Failures never escape. A failed round yields an empty response with the
//! error text in place of the target.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use sdk::{ChorusErrorExt, EngineError, MessageId};

use super::state::PersonaState;
use crate::llm::{extract_json_object, LLMProvider, Message};
use crate::memory::{ContextEntry, ConversationBuffer};
use crate::secrets;

/// Completions requested per round before giving up on echoes
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Decay applied to a record when the model picks it
pub const SELECTION_DECAY: f64 = 0.5;

/// Recency multipliers, newest first. Older records use `OLDEST_MULTIPLIER`.
const RECENCY_MULTIPLIERS: [f64; 4] = [0.8, 0.7, 0.6, 0.5];
const OLDEST_MULTIPLIER: f64 = 0.4;

/// Multiplier for a record `position` places from the newest (0 = newest)
pub fn recency_multiplier(position: usize) -> f64 {
    RECENCY_MULTIPLIERS
        .get(position)
        .copied()
        .unwrap_or(OLDEST_MULTIPLIER)
}

/// Build the model-facing context, oldest first.
///
/// Records written by `self_id` stay in the context with an effective
/// weight of zero.
pub fn prepare(buffer: &ConversationBuffer, self_id: Option<&str>) -> Vec<ContextEntry> {
    let len = buffer.len();
    buffer
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let multiplier = if self_id == Some(record.author_id()) {
                0.0
            } else {
                recency_multiplier(len - 1 - idx)
            };
            record.to_entry(record.weight() * multiplier)
        })
        .collect()
}

/// What the model chose to reply to
#[derive(Debug, Clone, PartialEq)]
pub enum PickedMessage {
    /// Post without a reply reference
    None,

    /// Reply to this remembered message
    Target(MessageId),

    /// The round failed; carries the error description
    Failed(String),
}

/// Output of one selection round
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub response: String,
    pub picked: PickedMessage,
}

impl Selection {
    pub fn silence() -> Self {
        Self {
            response: String::new(),
            picked: PickedMessage::None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            response: String::new(),
            picked: PickedMessage::Failed(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.picked, PickedMessage::Failed(_))
    }
}

/// Parse a completion into `(response, picked_message)`.
///
/// `response` must be a string. `picked_message` may be a string or a
/// number; null, absent and "" mean no target.
pub fn parse_completion(content: &str) -> Result<(String, Option<MessageId>), String> {
    let obj = extract_json_object(content)
        .ok_or_else(|| "completion did not contain a JSON object".to_string())?;

    let response = match obj.get("response") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(format!("`response` must be a string, got {}", other));
        }
        None => return Err("completion is missing `response`".to_string()),
    };

    let picked = match obj.get("picked_message") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some(MessageId::from_json(value).ok_or_else(|| {
            format!("`picked_message` must be a string or number, got {}", value)
        })?),
    };

    Ok((response, picked))
}

pub struct ResponseSelector {
    provider: Arc<dyn LLMProvider>,
    max_attempts: usize,
}

impl ResponseSelector {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one selection round against the persona's memory
    pub async fn select(&self, state: &PersonaState) -> Selection {
        let self_id = state.identity().await.map(|user| user.id);

        for attempt in 1..=self.max_attempts {
            let context = {
                let buffer = state.buffer().lock().await;
                serde_json::to_string(&prepare(&buffer, self_id.as_deref()))
            };
            let context = match context {
                Ok(context) => context,
                Err(e) => return Selection::failure(format!("Context serialization error: {}", e)),
            };

            debug!("Generating response (attempt {}) for context: {}", attempt, context);

            let messages = [Message::system(state.prompt().await), Message::user(context)];
            let completion = match self.provider.generate(&messages).await {
                Ok(completion) => completion,
                Err(e) => {
                    let err = EngineError::from(e);
                    let text = secrets::scrub(&err.to_string());
                    warn!("{} ({})", text, err.user_hint());
                    return Selection::failure(text);
                }
            };

            let (response, picked) = match parse_completion(&completion) {
                Ok(parsed) => parsed,
                Err(e) => {
                    let err = format!("Malformed completion: {}", e);
                    warn!("{}", err);
                    return Selection::failure(err);
                }
            };

            let Some(picked_id) = picked else {
                info!("No message picked");
                return Selection {
                    response,
                    picked: PickedMessage::None,
                };
            };

            let mut buffer = state.buffer().lock().await;
            let picked_text = match buffer.find_by_id(&picked_id) {
                Some(record) => record.text().trim().to_string(),
                None => {
                    warn!("Picked message {} not found in memory", picked_id);
                    return Selection {
                        response,
                        picked: PickedMessage::None,
                    };
                }
            };

            buffer.decay_weight(&picked_id, SELECTION_DECAY);
            info!("Generated response for message {}: {}", picked_id, response);

            let trimmed = response.trim();
            let echoes = !trimmed.is_empty()
                && (trimmed == picked_text || buffer.contains_text(trimmed));
            if !echoes {
                return Selection {
                    response,
                    picked: PickedMessage::Target(picked_id),
                };
            }

            warn!(
                "Response repeats a remembered message, regenerating ({}/{})",
                attempt, self.max_attempts
            );
        }

        warn!(
            "Every one of {} completions echoed memory, staying silent",
            self.max_attempts
        );
        Selection::silence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MessageRecord;
    use sdk::Author;

    fn record(id: &str, author: Author) -> MessageRecord {
        MessageRecord::new(author, format!("text {}", id), MessageId::new(id), None)
    }

    #[test]
    fn test_recency_table() {
        assert_eq!(recency_multiplier(0), 0.8);
        assert_eq!(recency_multiplier(1), 0.7);
        assert_eq!(recency_multiplier(2), 0.6);
        assert_eq!(recency_multiplier(3), 0.5);
        assert_eq!(recency_multiplier(4), 0.4);
        assert_eq!(recency_multiplier(50), 0.4);
    }

    #[test]
    fn test_prepare_six_records() {
        let human = Author::new("100", "alice", false);
        let me = Author::new("999", "v3s", true);
        let mut buffer = ConversationBuffer::new();
        for id in ["1", "2", "3"] {
            buffer.append(record(id, human.clone()));
        }
        buffer.append(record("4", me));
        for id in ["5", "6"] {
            buffer.append(record(id, human.clone()));
        }

        let weights: Vec<f64> = prepare(&buffer, Some("999"))
            .iter()
            .map(|e| e.weight)
            .collect();

        let expected = [0.4, 0.4, 0.5, 0.0, 0.7, 0.8];
        assert_eq!(weights.len(), expected.len());
        for (got, want) in weights.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{:?} vs {:?}", weights, expected);
        }
    }

    #[test]
    fn test_prepare_leaves_stored_weights() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record("1", Author::new("100", "alice", false)));
        let _ = prepare(&buffer, None);
        assert_eq!(buffer.iter().next().unwrap().weight(), 1.0);
    }

    #[test]
    fn test_other_bots_keep_recency_weight() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record("1", Author::new("555", "otherbot", true)));
        let entries = prepare(&buffer, Some("999"));
        assert!((entries[0].weight - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_parse_completion_variants() {
        assert_eq!(
            parse_completion(r#"{"response": "hi", "picked_message": "2"}"#).unwrap(),
            ("hi".to_string(), Some(MessageId::new("2")))
        );
        assert_eq!(
            parse_completion(r#"{"response": "hi", "picked_message": 1234567890123}"#).unwrap(),
            ("hi".to_string(), Some(MessageId::new("1234567890123")))
        );
        assert_eq!(
            parse_completion(r#"{"response": "", "picked_message": null}"#).unwrap(),
            (String::new(), None)
        );
        assert_eq!(
            parse_completion(r#"{"response": "x", "picked_message": ""}"#).unwrap(),
            ("x".to_string(), None)
        );
        assert_eq!(
            parse_completion(r#"{"response": "x"}"#).unwrap(),
            ("x".to_string(), None)
        );
    }

    #[test]
    fn test_parse_completion_schema_violations() {
        assert!(parse_completion("not json").is_err());
        assert!(parse_completion(r#"{"picked_message": "1"}"#).is_err());
        assert!(parse_completion(r#"{"response": 5}"#).is_err());
        assert!(parse_completion(r#"{"response": "x", "picked_message": [1]}"#).is_err());
        assert!(parse_completion(r#"{"response": "x", "picked_message": true}"#).is_err());
    }

    #[test]
    fn test_selection_constructors() {
        assert!(Selection::failure("boom").is_failure());
        assert!(!Selection::silence().is_failure());
        assert!(Selection::silence().response.is_empty());
    }
}
