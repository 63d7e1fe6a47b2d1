//! Scheduler
//!
//! Background loop per persona: dispatch a selection round, post the reply
//! unless it is a silence sentinel, draw the next delay and count it down in
//! fixed ticks while publishing `"{persona} | Next: {n}s"`.
//!
//! Nothing in the loop is fatal. Completion failures and send failures are
//! logged and the loop moves on to the delay.

use std::sync::Arc;

use chrono::Timelike;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use sdk::{ChatGateway, MessageId};

use super::selector::{PickedMessage, ResponseSelector};
use super::state::PersonaState;
use crate::config::RuntimeSettings;
use crate::secrets;

/// Responses that mean "post nothing this cycle"
pub const SILENCE_SENTINELS: [&str; 4] = ["*SILENCE*", "*END OF CONVERSATION*", "", "\n"];

/// Decay applied to a message after the bot has replied to it
pub const DISPATCH_DECAY: f64 = 0.3;

/// Night window in local hours, half-open
pub const NIGHT_START_HOUR: u32 = 2;
pub const NIGHT_END_HOUR: u32 = 8;

pub fn is_silence(response: &str) -> bool {
    let trimmed = response.trim();
    trimmed.is_empty() || SILENCE_SENTINELS.contains(&trimmed)
}

pub fn is_night_hour(hour: u32) -> bool {
    (NIGHT_START_HOUR..NIGHT_END_HOUR).contains(&hour)
}

/// Draw the next delay in seconds. `night` says whether the clock is inside
/// the night window; the night range applies only with night mode on.
pub fn next_delay<R: Rng + ?Sized>(rng: &mut R, settings: &RuntimeSettings, night: bool) -> u64 {
    let range = if settings.night_mode() && night {
        settings.night_delay()
    } else {
        settings.delay()
    };
    rng.gen_range(range.min()..=range.max())
}

/// Source of the current local hour
pub trait Clock: Send + Sync {
    fn hour(&self) -> u32;

    fn is_night_time(&self) -> bool {
        is_night_hour(self.hour())
    }
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

/// Fixed hour, for tests and dry runs
pub struct FixedClock(pub u32);

impl Clock for FixedClock {
    fn hour(&self) -> u32 {
        self.0
    }
}

/// Result of one dispatch step
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Sentinel or empty response, nothing posted
    Silent,

    /// The selection round failed
    Failed(String),

    /// Reply posted; `reply_to` is set when it referenced a remembered message
    Sent {
        message_id: MessageId,
        reply_to: Option<MessageId>,
    },

    /// The transport rejected the send
    SendFailed(String),
}

pub struct Scheduler {
    state: Arc<PersonaState>,
    selector: ResponseSelector,
    gateway: Arc<dyn ChatGateway>,
    clock: Box<dyn Clock>,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(
        state: Arc<PersonaState>,
        selector: ResponseSelector,
        gateway: Arc<dyn ChatGateway>,
    ) -> Self {
        Self {
            state,
            selector,
            gateway,
            clock: Box::new(LocalClock),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Run one selection round and post the result
    pub async fn dispatch_once(&mut self) -> DispatchOutcome {
        let selection = self.selector.select(&self.state).await;

        let target = match selection.picked {
            PickedMessage::Failed(err) => {
                warn!("Selection failed: {}", err);
                return DispatchOutcome::Failed(err);
            }
            PickedMessage::Target(id) => Some(id),
            PickedMessage::None => None,
        };

        if is_silence(&selection.response) {
            debug!("Staying silent this cycle");
            return DispatchOutcome::Silent;
        }

        let reply_to = match target {
            Some(id) => {
                if self.state.buffer().lock().await.find_by_id(&id).is_some() {
                    Some(id)
                } else {
                    warn!("Picked message {} left memory, posting unthreaded", id);
                    None
                }
            }
            None => None,
        };

        let message_id = match self.gateway.send(&selection.response, reply_to.as_ref()).await {
            Ok(message_id) => message_id,
            Err(e) => {
                let err = secrets::scrub(&e.to_string());
                warn!("Failed to send response: {}", err);
                return DispatchOutcome::SendFailed(err);
            }
        };
        info!("Sent response: {}", selection.response);

        let debug_echo = self.state.current_settings().await.debug();
        let snapshot = {
            let mut buffer = self.state.buffer().lock().await;
            if let Some(id) = &reply_to {
                buffer.decay_weight(id, DISPATCH_DECAY);
            }
            if debug_echo {
                buffer.snapshot_json().ok()
            } else {
                None
            }
        };

        if let Some(context) = snapshot {
            let debug_msg = format!(
                "{}[DEBUG - MESSAGE CONTEXT]\n{}",
                self.state.command_prefix(),
                context
            );
            if let Err(e) = self.gateway.send(&debug_msg, None).await {
                warn!("Failed to send debug context: {}", secrets::scrub(&e.to_string()));
            }
            debug!("Debug context: {}", context);
        }

        DispatchOutcome::Sent { message_id, reply_to }
    }

    /// Pick the delay before the next dispatch
    pub async fn draw_delay(&mut self) -> u64 {
        let settings = self.state.current_settings().await;
        let night = self.clock.is_night_time();
        let delay = next_delay(&mut self.rng, &settings, night);
        if settings.night_mode() && night {
            info!("Night mode active, delay: {}s", delay);
        } else {
            info!("Normal mode, delay: {}s", delay);
        }
        delay
    }

    /// Count `total_secs` down in ticks, publishing the status at each step
    pub async fn countdown(&self, total_secs: u64) {
        let tick = self.state.current_settings().await.countdown_tick();
        let mut remaining = total_secs;
        loop {
            self.publish_status(remaining).await;
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(tick).await;
            remaining = remaining.saturating_sub(tick.as_secs());
        }
    }

    async fn publish_status(&self, remaining: u64) {
        let line = self.state.publish_remaining(remaining);
        if let Err(e) = self.gateway.set_status(&line).await {
            debug!("Failed to update presence: {}", e);
        }
    }

    /// Loop forever: dispatch, draw a delay, count it down
    pub async fn run(mut self) {
        info!(
            "Scheduler started for {} using {}",
            self.state.name(),
            self.selector.provider_name()
        );
        loop {
            self.dispatch_once().await;
            let delay = self.draw_delay().await;
            self.countdown(delay).await;
        }
    }
}
