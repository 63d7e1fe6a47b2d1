//! Discord transport
//!
//! `DiscordGateway` implements `ChatGateway` for one channel:
//!
//! - REST (`reqwest`) for history, single-message lookup and sending
//! - A websocket connection (`tokio-tungstenite`) for `READY` and
//!   `MESSAGE_CREATE` events, heartbeats and presence updates
//!
//! The websocket loop reconnects on its own and pushes events into the
//! session's inbound queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use futures::{Sink, SinkExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn, Instrument};

use sdk::{Author, ChatGateway, ChorusErrorExt, EngineError, GatewayEvent, MessageId, RawMessage};

use crate::config::DiscordConfig;
use crate::secrets::{self, SecretString};

/// GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT
pub const GATEWAY_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 15);

/// Largest page the history endpoint serves
const MAX_HISTORY_PAGE: usize = 100;

/// Close codes after which reconnecting cannot help
const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

mod opcode {
    pub const DISPATCH: u64 = 0;
    pub const HEARTBEAT: u64 = 1;
    pub const IDENTIFY: u64 = 2;
    pub const PRESENCE_UPDATE: u64 = 3;
    pub const RECONNECT: u64 = 7;
    pub const INVALID_SESSION: u64 = 9;
    pub const HELLO: u64 = 10;
    pub const HEARTBEAT_ACK: u64 = 11;
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

impl From<DiscordUser> for Author {
    fn from(user: DiscordUser) -> Self {
        Author::new(user.id, user.username, user.bot)
    }
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    content: String,
    author: DiscordUser,
    #[serde(default)]
    message_reference: Option<DiscordReference>,
    #[serde(default)]
    referenced_message: Option<Box<DiscordMessage>>,
}

/// Pointer to a replied-to message. Discord sends it even when it does not
/// inline the message itself, as for the parent of a reply.
#[derive(Debug, Deserialize)]
struct DiscordReference {
    #[serde(default)]
    message_id: Option<String>,
}

impl From<DiscordMessage> for RawMessage {
    fn from(msg: DiscordMessage) -> Self {
        let mut raw = RawMessage::new(msg.id, msg.author.into(), msg.content);
        if let Some(id) = msg.message_reference.and_then(|r| r.message_id) {
            raw = raw.with_reply_to(id);
        }
        if let Some(parent) = msg.referenced_message {
            raw = raw.replying_to((*parent).into());
        }
        raw
    }
}

/// Body for a channel message, threaded onto `reply_to` when given
fn send_payload(text: &str, channel_id: u64, reply_to: Option<&MessageId>) -> Value {
    let mut body = json!({
        "content": text,
        "allowed_mentions": { "parse": ["users"], "replied_user": false },
    });
    if let Some(id) = reply_to {
        body["message_reference"] = json!({
            "message_id": id.as_str(),
            "channel_id": channel_id.to_string(),
            "fail_if_not_exists": false,
        });
    }
    body
}

fn presence_payload(status: &str) -> Value {
    json!({
        "op": opcode::PRESENCE_UPDATE,
        "d": {
            "since": null,
            "activities": [{ "name": status, "type": 0 }],
            "status": "online",
            "afk": false,
        }
    })
}

fn identify_payload(token: &str) -> Value {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "chorus",
                "device": "chorus",
            }
        }
    })
}

fn heartbeat_frame(sequence: Option<u64>) -> WsMessage {
    WsMessage::Text(json!({ "op": opcode::HEARTBEAT, "d": sequence }).to_string())
}

/// Write one frame; a failure means the connection is gone
async fn write_frame<S>(write: &mut S, frame: WsMessage) -> Result<(), EngineError>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    write
        .send(frame)
        .await
        .map_err(|e| EngineError::Network(e.to_string()))
}

pub struct DiscordGateway {
    client: Client,
    api_base: String,
    channel_id: u64,
    token: SecretString,
    presence: watch::Sender<String>,
}

impl DiscordGateway {
    pub fn new(config: &DiscordConfig, channel_id: u64, token: SecretString) -> Self {
        let (presence, _) = watch::channel(String::new());
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            channel_id,
            token,
            presence,
        }
    }

    /// Open the websocket connection in the background.
    ///
    /// Returns the receiving end of the session's inbound queue.
    pub fn connect(self: &Arc<Self>, config: &DiscordConfig) -> mpsc::Receiver<GatewayEvent> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let gateway = Arc::clone(self);
        let url = config.gateway_url.clone();
        let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);
        tokio::spawn(
            async move {
                gateway.reconnect_loop(url, reconnect_delay, event_tx).await;
            }
            .in_current_span(),
        );
        event_rx
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token.unsecure())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(EngineError::GatewayUnauthorized);
        }
        Err(EngineError::Gateway(format!(
            "Discord API error ({}): {}",
            status,
            secrets::scrub(&body)
        )))
    }

    async fn reconnect_loop(
        &self,
        url: String,
        reconnect_delay: Duration,
        event_tx: mpsc::Sender<GatewayEvent>,
    ) {
        loop {
            match self.run_connection(&url, &event_tx).await {
                Ok(ConnectionEnd::QueueClosed) => {
                    info!("Inbound queue closed, stopping Discord gateway");
                    return;
                }
                Ok(ConnectionEnd::Fatal(code)) => {
                    error!("Discord gateway closed with fatal code {}, not reconnecting", code);
                    return;
                }
                Ok(ConnectionEnd::Reconnect) => {}
                Err(e) if !e.is_recoverable() => {
                    error!("Discord gateway error: {} ({})", e, e.user_hint());
                    return;
                }
                Err(e) => error!("Discord gateway error: {}", e),
            }

            info!("Discord gateway reconnecting in {}s...", reconnect_delay.as_secs());
            tokio::time::sleep(reconnect_delay).await;
        }
    }

    async fn run_connection(
        &self,
        url: &str,
        event_tx: &mpsc::Sender<GatewayEvent>,
    ) -> Result<ConnectionEnd, EngineError> {
        info!("Discord gateway connecting to {}", url);
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let mut presence_rx = self.presence.subscribe();
        let mut heartbeat: Option<tokio::time::Interval> = None;
        let mut sequence: Option<u64> = None;

        loop {
            let beat = async {
                match heartbeat.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Ping(data))) => {
                            write_frame(&mut write, WsMessage::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code)).unwrap_or(1000);
                            info!("Discord gateway closed ({})", code);
                            if FATAL_CLOSE_CODES.contains(&code) {
                                return Ok(ConnectionEnd::Fatal(code));
                            }
                            return Ok(ConnectionEnd::Reconnect);
                        }
                        None => return Ok(ConnectionEnd::Reconnect),
                        Some(Err(e)) => return Err(EngineError::Network(e.to_string())),
                        _ => continue,
                    };

                    let payload: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("Failed to parse gateway payload: {}", e);
                            continue;
                        }
                    };
                    if let Some(s) = payload.get("s").and_then(Value::as_u64) {
                        sequence = Some(s);
                    }

                    match payload.get("op").and_then(Value::as_u64) {
                        Some(opcode::HELLO) => {
                            let interval_ms = payload["d"]["heartbeat_interval"].as_u64().unwrap_or(41_250);
                            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
                            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                            heartbeat = Some(interval);

                            let identify = identify_payload(self.token.unsecure()).to_string();
                            write_frame(&mut write, WsMessage::Text(identify)).await?;
                        }
                        Some(opcode::DISPATCH) => {
                            if let Some(event) = self.translate_dispatch(&payload) {
                                if event_tx.send(event).await.is_err() {
                                    return Ok(ConnectionEnd::QueueClosed);
                                }
                            }
                        }
                        Some(opcode::HEARTBEAT) => {
                            write_frame(&mut write, heartbeat_frame(sequence)).await?;
                        }
                        Some(opcode::RECONNECT) | Some(opcode::INVALID_SESSION) => {
                            info!("Discord asked for a new session");
                            return Ok(ConnectionEnd::Reconnect);
                        }
                        Some(opcode::HEARTBEAT_ACK) => {}
                        other => debug!("Ignoring gateway opcode {:?}", other),
                    }
                }
                _ = beat => {
                    write_frame(&mut write, heartbeat_frame(sequence)).await?;
                }
                changed = presence_rx.changed() => {
                    if changed.is_err() {
                        return Ok(ConnectionEnd::QueueClosed);
                    }
                    let status = presence_rx.borrow_and_update().clone();
                    let update = presence_payload(&status).to_string();
                    if let Err(e) = write.send(WsMessage::Text(update)).await {
                        warn!("Failed to send presence update: {}", e);
                    }
                }
            }
        }
    }

    /// Turn a dispatch payload into an event for this channel
    fn translate_dispatch(&self, payload: &Value) -> Option<GatewayEvent> {
        let data = payload.get("d")?.clone();
        match payload.get("t").and_then(Value::as_str)? {
            "READY" => {
                let user: DiscordUser = serde_json::from_value(data.get("user")?.clone()).ok()?;
                Some(GatewayEvent::Ready { user: user.into() })
            }
            "MESSAGE_CREATE" => {
                let msg: DiscordMessage = match serde_json::from_value(data) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("Unreadable MESSAGE_CREATE: {}", e);
                        return None;
                    }
                };
                if msg.channel_id != self.channel_id.to_string() {
                    return None;
                }
                Some(GatewayEvent::Message(msg.into()))
            }
            _ => None,
        }
    }
}

enum ConnectionEnd {
    Reconnect,
    QueueClosed,
    Fatal(u16),
}

#[async_trait]
impl ChatGateway for DiscordGateway {
    fn name(&self) -> &str {
        "discord"
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<RawMessage>, EngineError> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        let response = self
            .client
            .get(format!("{}/channels/{}/messages", self.api_base, self.channel_id))
            .query(&[("limit", limit)])
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        let messages: Vec<DiscordMessage> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Gateway(format!("Unreadable history: {}", e)))?;

        debug!("Fetched {} messages from channel {}", messages.len(), self.channel_id);
        Ok(messages.into_iter().map(RawMessage::from).collect())
    }

    async fn fetch_message(&self, id: &MessageId) -> Result<Option<RawMessage>, EngineError> {
        let response = self
            .client
            .get(format!(
                "{}/channels/{}/messages/{}",
                self.api_base,
                self.channel_id,
                id.as_str()
            ))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Message {} no longer exists in channel {}", id, self.channel_id);
            return Ok(None);
        }

        let message: DiscordMessage = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Gateway(format!("Unreadable message: {}", e)))?;
        Ok(Some(message.into()))
    }

    async fn send(&self, text: &str, reply_to: Option<&MessageId>) -> Result<MessageId, EngineError> {
        let scrubbed = secrets::scrub(text);
        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.api_base, self.channel_id))
            .header("Authorization", self.auth_header())
            .json(&send_payload(&scrubbed, self.channel_id, reply_to))
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        let sent: DiscordMessage = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Gateway(format!("Unreadable send response: {}", e)))?;
        Ok(MessageId::new(sent.id))
    }

    async fn set_status(&self, status: &str) -> Result<(), EngineError> {
        self.presence.send_replace(status.to_string());
        Ok(())
    }
}
