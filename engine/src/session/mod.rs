//! Bot Session
//!
//! Wires one persona's gateway events into its memory and drives its
//! scheduler. Events arrive on a single mpsc queue, so inbound appends and
//! admin commands are handled in order.

pub mod commands;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sdk::{Author, ChatGateway, ChorusErrorExt, EngineError, GatewayEvent, MessageId, RawMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::agent::{PersonaState, Scheduler};
use crate::memory::MessageRecord;

pub use commands::AdminCommand;

/// Default bound on the startup history fetch
pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_secs(20);

pub struct BotSession {
    state: Arc<PersonaState>,
    gateway: Arc<dyn ChatGateway>,
    prompt_file: PathBuf,
    history_timeout: Duration,
}

impl BotSession {
    pub fn new(
        state: Arc<PersonaState>,
        gateway: Arc<dyn ChatGateway>,
        prompt_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state,
            gateway,
            prompt_file: prompt_file.into(),
            history_timeout: DEFAULT_HISTORY_TIMEOUT,
        }
    }

    pub fn with_history_timeout(mut self, timeout: Duration) -> Self {
        self.history_timeout = timeout;
        self
    }

    pub fn state(&self) -> &Arc<PersonaState> {
        &self.state
    }

    /// Consume gateway events until the queue closes.
    ///
    /// The first `Ready` hydrates memory and starts the scheduler. Later
    /// `Ready` events (reconnects) only refresh the identity.
    pub async fn run(self, mut events: mpsc::Receiver<GatewayEvent>, scheduler: Scheduler) {
        let mut scheduler = Some(scheduler);
        let mut scheduler_task: Option<JoinHandle<()>> = None;

        while let Some(event) = events.recv().await {
            match event {
                GatewayEvent::Ready { user } => {
                    info!("Logged in as {} ({})", user.name, user.id);
                    self.state.set_identity(user).await;

                    if let Some(scheduler) = scheduler.take() {
                        self.hydrate().await;
                        let line = self.state.current_status();
                        if let Err(e) = self.gateway.set_status(&line).await {
                            debug!("Failed to update presence: {}", e);
                        }
                        scheduler_task = Some(tokio::spawn(scheduler.run().in_current_span()));
                    }
                }
                GatewayEvent::Message(raw) => self.handle_message(raw).await,
            }
        }

        info!("Event queue closed, stopping session");
        if let Some(task) = scheduler_task {
            task.abort();
        }
    }

    /// Route one inbound message to the command handler or to memory
    pub async fn handle_message(&self, mut raw: RawMessage) {
        let identity = self.state.identity().await;
        if is_self(identity.as_ref(), &raw.author) {
            return;
        }

        let prefix = self.state.command_prefix();
        if raw.content.starts_with(prefix) {
            if raw.author.is_bot {
                return;
            }
            match commands::parse(&raw.content, prefix) {
                Some(Ok(command)) => {
                    info!("{} issued {:?}", raw.author.name, command);
                    let ack = self.execute(command).await;
                    self.acknowledge(&ack).await;
                }
                Some(Err(rejection)) => self.acknowledge(&rejection).await,
                None => debug!("Ignoring unknown command: {}", raw.content),
            }
            return;
        }

        self.resolve_reply_chain(&mut raw).await;
        let mut record = MessageRecord::from_raw(&raw);
        if let Some(me) = &identity {
            if raw.content.contains(&me.mention_token()) {
                record = record.with_mention_boost();
            }
        }
        debug!(
            "Observed message {} from {} (weight {:.2})",
            raw.id,
            raw.author.name,
            record.weight()
        );
        self.state.buffer().lock().await.append(record);
    }

    /// Fill in a reply's grandparent when the transport only knows its id.
    ///
    /// Memory is consulted first, then the gateway, bounded by the history
    /// timeout. An unresolved grandparent is left empty.
    async fn resolve_reply_chain(&self, raw: &mut RawMessage) {
        let Some(grandparent_id) = raw.unresolved_grandparent().cloned() else {
            return;
        };

        let remembered = self
            .state
            .buffer()
            .lock()
            .await
            .find_by_id(&grandparent_id)
            .map(|r| RawMessage::new(r.message_id().clone(), r.author().clone(), r.text()));

        let grandparent = match remembered {
            Some(message) => Some(message),
            None => match tokio::time::timeout(
                self.history_timeout,
                self.gateway.fetch_message(&grandparent_id),
            )
            .await
            {
                Ok(Ok(message)) => message,
                Ok(Err(e)) => {
                    debug!("Failed to resolve reply target {}: {}", grandparent_id, e);
                    None
                }
                Err(_) => {
                    debug!("Timed out resolving reply target {}", grandparent_id);
                    None
                }
            },
        };

        if let (Some(parent), Some(grandparent)) = (raw.referenced.as_deref_mut(), grandparent) {
            parent.referenced = Some(Box::new(grandparent));
        }
    }

    /// Apply an admin command and return the acknowledgment text
    pub async fn execute(&self, command: AdminCommand) -> String {
        let prefix = self.state.command_prefix();
        match command {
            AdminCommand::ResetHistory => {
                self.state.buffer().lock().await.evict_all();
                info!("Message history reset");
                format!("{}Message history has been reset.", prefix)
            }
            AdminCommand::SetMemorySize(size) => {
                if let Err(e) = self.state.settings().write().await.set_memory_capacity(size) {
                    warn!("Invalid memory size attempted: {} ({})", size, e);
                    return commands::invalid_memory_size(prefix);
                }
                if let Err(e) = self.state.buffer().lock().await.resize(size) {
                    warn!("Failed to resize memory: {}", e);
                    return commands::invalid_memory_size(prefix);
                }
                self.hydrate().await;
                info!("Memory size changed to {}", size);
                format!("{}Message memory size set to {}", prefix, size)
            }
            AdminCommand::Debug(enabled) => {
                self.state.settings().write().await.set_debug(enabled);
                info!("Debug mode set to {}", enabled);
                format!("{}Debug mode set to {}", prefix, enabled)
            }
            AdminCommand::SetDelay { min, max } => {
                if let Err(e) = self.state.settings().write().await.set_delay(min, max) {
                    warn!("Rejected delay range: {}", e);
                    return commands::invalid_delay(prefix);
                }
                let line = self.state.current_status();
                if let Err(e) = self.gateway.set_status(&line).await {
                    debug!("Failed to update presence: {}", e);
                }
                info!("Delay range changed to {}-{}", min, max);
                format!("{}Delay range set to {}-{} seconds", prefix, min, max)
            }
            AdminCommand::NightMode(enabled) => {
                self.state.settings().write().await.set_night_mode(enabled);
                info!("Night mode set to {}", enabled);
                format!("{}Night mode set to {}", prefix, enabled)
            }
            AdminCommand::RefreshPrompt => match self.reload_prompt().await {
                Ok(()) => {
                    info!("System prompt refreshed");
                    format!("{}System prompt has been refreshed.", prefix)
                }
                Err(e) => {
                    error!("Failed to refresh prompt: {}", e);
                    format!("{}Failed to refresh prompt: {}", prefix, e)
                }
            },
            AdminCommand::Help => commands::help_text(prefix),
        }
    }

    /// Re-seed memory from channel history.
    ///
    /// Bounded by the history timeout. On timeout or failure the current
    /// memory is left as it is.
    pub async fn hydrate(&self) {
        let limit = self.state.current_settings().await.memory_capacity();
        info!("Fetching up to {} messages of history", limit);

        let fetched =
            match tokio::time::timeout(self.history_timeout, self.gateway.fetch_recent(limit))
                .await
            {
                Ok(Ok(messages)) => messages,
                Ok(Err(e)) => {
                    error!("Failed to fetch history: {} ({})", e, e.user_hint());
                    return;
                }
                Err(_) => {
                    warn!("{}", EngineError::HistoryTimeout(self.history_timeout.as_secs()));
                    return;
                }
            };

        let identity = self.state.identity().await;
        let prefix = self.state.command_prefix();
        let fetched = link_within_batch(fetched);
        let records: Vec<MessageRecord> = fetched
            .iter()
            .rev()
            .filter(|raw| !raw.content.starts_with(prefix))
            .filter(|raw| !is_self(identity.as_ref(), &raw.author))
            .map(MessageRecord::from_raw)
            .collect();

        let mut buffer = self.state.buffer().lock().await;
        buffer.replace_all(records);
        info!("Message history updated. Total messages: {}", buffer.len());
    }

    async fn reload_prompt(&self) -> Result<(), EngineError> {
        let prompt = tokio::fs::read_to_string(&self.prompt_file)
            .await
            .map_err(|e| EngineError::PromptLoad {
                persona: self.state.name().to_string(),
                reason: format!("{}: {}", self.prompt_file.display(), e),
            })?;
        self.state.set_prompt(prompt).await;
        Ok(())
    }

    async fn acknowledge(&self, text: &str) {
        if let Err(e) = self.gateway.send(text, None).await {
            warn!("Failed to send acknowledgment: {}", e);
        }
    }
}

fn is_self(identity: Option<&Author>, author: &Author) -> bool {
    identity.map_or(false, |me| me.id == author.id)
}

/// Resolve unresolved grandparents against the rest of a history page
fn link_within_batch(mut messages: Vec<RawMessage>) -> Vec<RawMessage> {
    let by_id: HashMap<MessageId, RawMessage> = messages
        .iter()
        .map(|m| {
            let mut bare = m.clone();
            bare.referenced = None;
            (m.id.clone(), bare)
        })
        .collect();

    for message in &mut messages {
        let Some(grandparent) = message
            .unresolved_grandparent()
            .and_then(|id| by_id.get(id))
            .cloned()
        else {
            continue;
        };
        if let Some(parent) = message.referenced.as_deref_mut() {
            parent.referenced = Some(Box::new(grandparent));
        }
    }
    messages
}
