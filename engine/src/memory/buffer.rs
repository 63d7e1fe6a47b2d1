//! Conversation Buffer
//!
//! Bounded FIFO of weighted message records, oldest first. Appending at
//! capacity evicts the oldest record. The only in-place mutation is weight
//! decay on a record the bot engaged with.

use std::collections::VecDeque;

use sdk::{EngineError, MessageId};
use tracing::{debug, warn};

use super::record::MessageRecord;

/// Default number of records kept per channel
pub const DEFAULT_CAPACITY: usize = 10;

/// Smallest capacity accepted by `resize`
pub const MIN_CAPACITY: usize = 1;

/// Largest capacity accepted by `resize`
pub const MAX_CAPACITY: usize = 100;

/// Bounded, ordered message memory for one channel
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    records: VecDeque<MessageRecord>,
    capacity: usize,
}

impl ConversationBuffer {
    /// Create an empty buffer with the default capacity
    pub fn new() -> Self {
        Self {
            records: VecDeque::with_capacity(DEFAULT_CAPACITY),
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Create an empty buffer with a validated capacity
    pub fn with_capacity(capacity: usize) -> Result<Self, EngineError> {
        validate_capacity(capacity)?;
        Ok(Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Add a record at the newest end, evicting the oldest while full.
    ///
    /// Message ids are unique within the buffer: a record whose id is
    /// already held is dropped and `false` is returned.
    pub fn append(&mut self, record: MessageRecord) -> bool {
        if self.find_by_id(record.message_id()).is_some() {
            debug!("Message {} already in memory, skipping", record.message_id());
            return false;
        }
        while self.records.len() >= self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                debug!("Evicted message {} from memory", evicted.message_id());
            }
        }
        self.records.push_back(record);
        true
    }

    /// Drop every record
    pub fn evict_all(&mut self) {
        self.records.clear();
    }

    /// Install hydrated history (oldest first), keeping only the newest
    /// `capacity` records.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = MessageRecord>) {
        self.records.clear();
        for record in records {
            self.append(record);
        }
    }

    /// Change the capacity.
    ///
    /// Out-of-range values are rejected without touching the buffer. A smaller
    /// capacity drops the oldest records immediately.
    pub fn resize(&mut self, new_capacity: usize) -> Result<(), EngineError> {
        validate_capacity(new_capacity)?;
        self.capacity = new_capacity;
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
        Ok(())
    }

    /// Locate a record by id
    pub fn find_by_id(&self, message_id: &MessageId) -> Option<&MessageRecord> {
        self.records.iter().find(|r| r.message_id() == message_id)
    }

    /// Multiply the matching record's weight by `factor` (0 < factor < 1).
    ///
    /// Returns the new weight, or `None` when the record is gone or the
    /// factor is invalid. Neither case is fatal.
    pub fn decay_weight(&mut self, message_id: &MessageId, factor: f64) -> Option<f64> {
        if !(factor > 0.0 && factor < 1.0) {
            warn!("Ignoring decay of message {} by invalid factor {}", message_id, factor);
            return None;
        }

        match self.records.iter_mut().find(|r| r.message_id() == message_id) {
            Some(record) => {
                let weight = record.scale_weight(factor);
                debug!("Decayed message {} to weight {:.4}", message_id, weight);
                Some(weight)
            }
            None => {
                warn!("Cannot decay message {}: not in memory", message_id);
                None
            }
        }
    }

    /// Whether any record's trimmed text equals the trimmed `text`
    pub fn contains_text(&self, text: &str) -> bool {
        let needle = text.trim();
        self.records.iter().any(|r| r.text().trim() == needle)
    }

    /// Records, oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MessageRecord> + ExactSizeIterator {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw dump of every record with its stored weight, for the debug echo
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        let entries: Vec<_> = self.records.iter().map(|r| r.to_entry(r.weight())).collect();
        serde_json::to_string(&entries)
    }
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a memory capacity against the accepted range
pub fn validate_capacity(capacity: usize) -> Result<(), EngineError> {
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        return Err(EngineError::Validation(format!(
            "memory size must be between {} and {}, got {}",
            MIN_CAPACITY, MAX_CAPACITY, capacity
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::Author;

    fn record(id: u64, text: &str) -> MessageRecord {
        MessageRecord::new(
            Author::new("1", "alice", false),
            text,
            MessageId::from(id),
            None,
        )
    }

    fn ids(buffer: &ConversationBuffer) -> Vec<String> {
        buffer.iter().map(|r| r.message_id().to_string()).collect()
    }

    #[test]
    fn test_new_buffer() {
        let buffer = ConversationBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_append_evicts_oldest_at_capacity() {
        let mut buffer = ConversationBuffer::with_capacity(3).unwrap();
        for id in 1..=5 {
            buffer.append(record(id, "x"));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(ids(&buffer), vec!["3", "4", "5"]);
    }

    #[test]
    fn test_append_skips_known_id() {
        let mut buffer = ConversationBuffer::with_capacity(3).unwrap();
        assert!(buffer.append(record(1, "first")));
        assert!(buffer.append(record(2, "second")));
        assert!(!buffer.append(record(1, "first again")));

        assert_eq!(ids(&buffer), vec!["1", "2"]);
        assert_eq!(buffer.find_by_id(&MessageId::from(1u64)).unwrap().text(), "first");
    }

    #[test]
    fn test_replace_all_collapses_repeated_ids() {
        let mut buffer = ConversationBuffer::new();
        buffer.replace_all(vec![record(1, "a"), record(2, "b"), record(1, "a")]);
        assert_eq!(ids(&buffer), vec!["1", "2"]);
    }

    #[test]
    fn test_evict_all_is_idempotent() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record(1, "a"));
        buffer.evict_all();
        buffer.evict_all();
        buffer.evict_all();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_resize_rejects_out_of_range() {
        let mut buffer = ConversationBuffer::with_capacity(5).unwrap();
        buffer.append(record(1, "a"));

        assert!(matches!(buffer.resize(0), Err(EngineError::Validation(_))));
        assert!(matches!(buffer.resize(101), Err(EngineError::Validation(_))));
        assert_eq!(buffer.capacity(), 5);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_resize_shrink_keeps_newest() {
        let mut buffer = ConversationBuffer::with_capacity(5).unwrap();
        for id in 1..=5 {
            buffer.append(record(id, "x"));
        }
        buffer.resize(2).unwrap();
        assert_eq!(ids(&buffer), vec!["4", "5"]);

        buffer.append(record(6, "x"));
        assert_eq!(ids(&buffer), vec!["5", "6"]);
    }

    #[test]
    fn test_resize_bounds_accepted() {
        let mut buffer = ConversationBuffer::new();
        assert!(buffer.resize(1).is_ok());
        assert!(buffer.resize(100).is_ok());
        assert_eq!(buffer.capacity(), 100);
    }

    #[test]
    fn test_find_by_id_matches_numeric_and_string_forms() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record(1234, "hello"));

        assert!(buffer.find_by_id(&MessageId::from(1234u64)).is_some());
        assert!(buffer.find_by_id(&MessageId::from("1234")).is_some());
        assert!(buffer
            .find_by_id(&MessageId::from_json(&serde_json::json!(1234)).unwrap())
            .is_some());
        assert!(buffer.find_by_id(&MessageId::from("999")).is_none());
    }

    #[test]
    fn test_decay_weight() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record(1, "a"));

        let weight = buffer.decay_weight(&MessageId::from(1u64), 0.5);
        assert_eq!(weight, Some(0.5));
        assert_eq!(buffer.find_by_id(&MessageId::from(1u64)).unwrap().weight(), 0.5);
    }

    #[test]
    fn test_decay_weight_missing_is_noop() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record(1, "a"));
        assert_eq!(buffer.decay_weight(&MessageId::from(2u64), 0.5), None);
        assert_eq!(buffer.find_by_id(&MessageId::from(1u64)).unwrap().weight(), 1.0);
    }

    #[test]
    fn test_decay_weight_rejects_invalid_factor() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record(1, "a"));
        for factor in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            assert_eq!(buffer.decay_weight(&MessageId::from(1u64), factor), None);
        }
        assert_eq!(buffer.find_by_id(&MessageId::from(1u64)).unwrap().weight(), 1.0);
    }

    #[test]
    fn test_replace_all_keeps_newest() {
        let mut buffer = ConversationBuffer::with_capacity(2).unwrap();
        buffer.append(record(99, "old"));
        buffer.replace_all((1..=4).map(|id| record(id, "x")));
        assert_eq!(ids(&buffer), vec!["3", "4"]);
    }

    #[test]
    fn test_contains_text_trims() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record(1, "  hello there \n"));
        assert!(buffer.contains_text("hello there"));
        assert!(buffer.contains_text("\thello there"));
        assert!(!buffer.contains_text("hello"));
    }

    #[test]
    fn test_snapshot_json_uses_stored_weight() {
        let mut buffer = ConversationBuffer::new();
        buffer.append(record(1, "a"));
        buffer.decay_weight(&MessageId::from(1u64), 0.5);

        let json = buffer.snapshot_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["weight"], 0.5);
        assert_eq!(value[0]["message_id"], "1");
    }
}
