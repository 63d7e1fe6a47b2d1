//! Shared doubles for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chorus_engine::agent::PersonaState;
use chorus_engine::config::RuntimeSettings;
use chorus_engine::llm::{LLMError, LLMProvider, Message};
use chorus_engine::memory::MessageRecord;
use sdk::{Author, ChatGateway, EngineError, MessageId, RawMessage};

pub fn human(id: &str, name: &str) -> Author {
    Author::new(id, name, false)
}

pub fn bot_self() -> Author {
    Author::new("999", "v3s", true)
}

pub fn state() -> Arc<PersonaState> {
    state_with(RuntimeSettings::default())
}

pub fn state_with(settings: RuntimeSettings) -> Arc<PersonaState> {
    Arc::new(PersonaState::new("v3s", "#", settings, "You are v3s.").unwrap())
}

/// Append plain human messages with the given ids and texts
pub async fn seed(state: &PersonaState, messages: &[(&str, &str)]) {
    let mut buffer = state.buffer().lock().await;
    for (id, text) in messages {
        buffer.append(MessageRecord::new(
            human("100", "alice"),
            *text,
            MessageId::new(*id),
            None,
        ));
    }
}

pub async fn weight_of(state: &PersonaState, id: &str) -> f64 {
    state
        .buffer()
        .lock()
        .await
        .find_by_id(&MessageId::new(id))
        .map(|r| r.weight())
        .unwrap_or(f64::NAN)
}

/// Completion service that replays a script
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, LLMError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
    state: Option<Arc<PersonaState>>,
    buffer_free_during_call: Mutex<Vec<bool>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<String, LLMError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            state: None,
            buffer_free_during_call: Mutex::new(Vec::new()),
        }
    }

    /// Also record whether the persona's buffer lock was free mid-call
    pub fn watching(mut self, state: Arc<PersonaState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn buffer_free_during_calls(&self) -> Vec<bool> {
        self.buffer_free_during_call.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn generate(&self, messages: &[Message]) -> Result<String, LLMError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if let Some(state) = &self.state {
            let free = state.buffer().try_lock().is_ok();
            self.buffer_free_during_call.lock().unwrap().push(free);
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::ProviderUnavailable("script exhausted".to_string())))
    }
}

/// A message the gateway was asked to post
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub text: String,
    pub reply_to: Option<MessageId>,
}

/// Gateway double that records everything
pub struct RecordingGateway {
    history: Mutex<Vec<RawMessage>>,
    history_delay: Mutex<Option<Duration>>,
    lookups: Mutex<Vec<MessageId>>,
    sent: Mutex<Vec<Sent>>,
    statuses: Mutex<Vec<String>>,
    fail_sends: Mutex<bool>,
    next_id: Mutex<u64>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(Vec::new()),
            history_delay: Mutex::new(None),
            lookups: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            fail_sends: Mutex::new(false),
            next_id: Mutex::new(5000),
        }
    }

    /// History served newest first, as a chat service would
    pub fn with_history(self, newest_first: Vec<RawMessage>) -> Self {
        *self.history.lock().unwrap() = newest_first;
        self
    }

    pub fn with_history_delay(self, delay: Duration) -> Self {
        *self.history_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn failing_sends(self) -> Self {
        *self.fail_sends.lock().unwrap() = true;
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    /// Ids passed to `fetch_message`, in order
    pub fn lookups(&self) -> Vec<MessageId> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<RawMessage>, EngineError> {
        let delay = *self.history_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let history = self.history.lock().unwrap().clone();
        Ok(history.into_iter().take(limit).collect())
    }

    async fn fetch_message(&self, id: &MessageId) -> Result<Option<RawMessage>, EngineError> {
        self.lookups.lock().unwrap().push(id.clone());
        let history = self.history.lock().unwrap().clone();
        Ok(history.into_iter().find(|m| &m.id == id))
    }

    async fn send(&self, text: &str, reply_to: Option<&MessageId>) -> Result<MessageId, EngineError> {
        if *self.fail_sends.lock().unwrap() {
            return Err(EngineError::Network("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(Sent {
            text: text.to_string(),
            reply_to: reply_to.cloned(),
        });
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        Ok(MessageId::from(*next))
    }

    async fn set_status(&self, status: &str) -> Result<(), EngineError> {
        self.statuses.lock().unwrap().push(status.to_string());
        Ok(())
    }
}
