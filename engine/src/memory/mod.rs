//! Conversational Memory
//!
//! Weighted, bounded memory of recent channel messages. Records enter through
//! `ConversationBuffer::append` and lose weight each time the bot engages
//! with them, which steers the model toward messages it has not answered yet.

pub mod buffer;
pub mod record;

pub use buffer::{ConversationBuffer, DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY};
pub use record::{ContextEntry, MessageRecord};
