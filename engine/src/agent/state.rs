//! Per-persona shared state
//!
//! The inbound handler, the admin commands and the scheduler all touch the
//! same buffer and settings. They share one `PersonaState` through an `Arc`;
//! the buffer sits behind a single mutex so appends and selection never
//! interleave.

use std::sync::atomic::{AtomicU64, Ordering};

use sdk::{Author, EngineError};
use tokio::sync::{watch, Mutex, RwLock};

use crate::config::RuntimeSettings;
use crate::memory::ConversationBuffer;

/// Status string shown as the bot's presence
pub fn status_line(persona: &str, seconds_remaining: u64) -> String {
    format!("{} | Next: {}s", persona, seconds_remaining)
}

pub struct PersonaState {
    name: String,
    command_prefix: String,
    buffer: Mutex<ConversationBuffer>,
    settings: RwLock<RuntimeSettings>,
    prompt: RwLock<String>,
    identity: RwLock<Option<Author>>,
    remaining: AtomicU64,
    status: watch::Sender<String>,
}

impl PersonaState {
    pub fn new(
        name: impl Into<String>,
        command_prefix: impl Into<String>,
        settings: RuntimeSettings,
        prompt: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        let buffer = ConversationBuffer::with_capacity(settings.memory_capacity())?;
        let (status, _) = watch::channel(status_line(&name, 0));

        Ok(Self {
            name,
            command_prefix: command_prefix.into(),
            buffer: Mutex::new(buffer),
            settings: RwLock::new(settings),
            prompt: RwLock::new(prompt.into()),
            identity: RwLock::new(None),
            remaining: AtomicU64::new(0),
            status,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    /// The conversation buffer. Hold the guard only for in-memory work.
    pub fn buffer(&self) -> &Mutex<ConversationBuffer> {
        &self.buffer
    }

    pub fn settings(&self) -> &RwLock<RuntimeSettings> {
        &self.settings
    }

    /// Snapshot of the current settings
    pub async fn current_settings(&self) -> RuntimeSettings {
        self.settings.read().await.clone()
    }

    pub async fn prompt(&self) -> String {
        self.prompt.read().await.clone()
    }

    pub async fn set_prompt(&self, prompt: impl Into<String>) {
        *self.prompt.write().await = prompt.into();
    }

    /// The account this persona is logged in as, once the gateway is ready
    pub async fn identity(&self) -> Option<Author> {
        self.identity.read().await.clone()
    }

    pub async fn set_identity(&self, user: Author) {
        *self.identity.write().await = Some(user);
    }

    /// Record the seconds left before the next dispatch and return the new
    /// status line
    pub fn publish_remaining(&self, seconds_remaining: u64) -> String {
        self.remaining.store(seconds_remaining, Ordering::Relaxed);
        let line = status_line(&self.name, seconds_remaining);
        self.status.send_replace(line.clone());
        line
    }

    /// Status line for the last published countdown value
    pub fn current_status(&self) -> String {
        status_line(&self.name, self.remaining.load(Ordering::Relaxed))
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_format() {
        assert_eq!(status_line("v3s", 42), "v3s | Next: 42s");
        assert_eq!(status_line("sarvel", 0), "sarvel | Next: 0s");
    }

    #[tokio::test]
    async fn test_publish_updates_watchers() {
        let state = PersonaState::new("v3s", "#", RuntimeSettings::default(), "prompt").unwrap();
        let mut rx = state.subscribe_status();
        assert_eq!(*rx.borrow(), "v3s | Next: 0s");

        let line = state.publish_remaining(18);
        assert_eq!(line, "v3s | Next: 18s");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "v3s | Next: 18s");
        assert_eq!(state.current_status(), "v3s | Next: 18s");
    }

    #[tokio::test]
    async fn test_buffer_uses_configured_capacity() {
        let mut settings = RuntimeSettings::default();
        settings.set_memory_capacity(25).unwrap();
        let state = PersonaState::new("v3s", "#", settings, "").unwrap();
        assert_eq!(state.buffer().lock().await.capacity(), 25);
        assert!(state.identity().await.is_none());
    }
}
