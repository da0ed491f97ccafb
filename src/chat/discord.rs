//! Discord responder: a `/weight` slash command served over the gateway.

use crate::chat::{
    connect_websocket, http_client, run_sessions, send_close, unless_shutdown, ChatResponder,
    SessionEnd, Socket, COMMAND_DESCRIPTION, COMMAND_NAME,
};
use crate::error::{BotError, Result};
use crate::reading::ReadingStore;
use crate::supervisor::Worker;
use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PLATFORM: &str = "Discord";

pub const API_BASE: &str = "https://discord.com/api/v10";
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Gateway opcodes used by the bot.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Close code sent when the bot token is rejected.
const CLOSE_AUTHENTICATION_FAILED: u16 = 4004;

const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const CALLBACK_CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;

/// One gateway frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct Ready {
    user: ReadyUser,
}

#[derive(Debug, Deserialize)]
struct ReadyUser {
    username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<InteractionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionData {
    pub name: String,
}

impl Interaction {
    /// The slash command name, if this is an application command.
    pub fn command_name(&self) -> Option<&str> {
        if self.kind != INTERACTION_APPLICATION_COMMAND {
            return None;
        }
        self.data.as_ref().map(|data| data.name.as_str())
    }
}

/// Map a gateway close code to a fatal error, if it is one.
///
/// 4004 means the token is wrong; 4010-4014 mean the identify payload can
/// never succeed. Everything else is worth a reconnect.
pub fn check_close_code(code: u16) -> Result<()> {
    match code {
        CLOSE_AUTHENTICATION_FAILED => Err(BotError::Auth { platform: PLATFORM }),
        4010..=4014 => Err(BotError::connection_error(format!(
            "Discord gateway closed the session with fatal code {}",
            code
        ))),
        _ => Ok(()),
    }
}

/// The command set registered for the application.
pub fn command_definitions() -> Value {
    json!([{
        "name": COMMAND_NAME,
        "description": COMMAND_DESCRIPTION,
        "type": 1,
    }])
}

fn heartbeat(sequence: Option<u64>) -> Message {
    Message::Text(json!({ "op": opcode::HEARTBEAT, "d": sequence }).to_string())
}

/// Registers `/weight` and answers it from the store.
pub struct DiscordBot {
    app_id: String,
    guild_id: Option<String>,
    bot_token: String,
    api_base: String,
    gateway_url: String,
    responder: ChatResponder,
    http: reqwest::Client,
}

impl DiscordBot {
    /// `guild_id` limits the command to one server; `None` registers it globally.
    pub fn new(
        app_id: impl Into<String>,
        guild_id: Option<String>,
        bot_token: impl Into<String>,
        store: Arc<ReadingStore>,
    ) -> Result<Self> {
        Ok(Self {
            app_id: app_id.into(),
            guild_id: guild_id.filter(|id| !id.is_empty()),
            bot_token: bot_token.into(),
            api_base: API_BASE.to_string(),
            gateway_url: GATEWAY_URL.to_string(),
            responder: ChatResponder::new(store),
            http: http_client(PLATFORM)?,
        })
    }

    /// Override the REST and gateway endpoints.
    pub fn with_endpoints(mut self, api_base: impl Into<String>, gateway_url: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.gateway_url = gateway_url.into();
        self
    }

    pub fn commands_url(&self) -> String {
        match &self.guild_id {
            Some(guild) => format!(
                "{}/applications/{}/guilds/{}/commands",
                self.api_base, self.app_id, guild
            ),
            None => format!("{}/applications/{}/commands", self.api_base, self.app_id),
        }
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Replace the application's commands with ours.
    async fn register_commands(&self) -> Result<()> {
        let response = self
            .http
            .put(self.commands_url())
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&command_definitions())
            .send()
            .await
            .map_err(|e| {
                BotError::connection_error(format!("Discord command registration failed: {}", e))
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BotError::Auth { platform: PLATFORM })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(BotError::connection_error(format!(
                    "Discord command registration returned {}: {}",
                    status, body
                )))
            }
        }
    }

    fn callback_url(&self, interaction: &Interaction) -> String {
        format!(
            "{}/interactions/{}/{}/callback",
            self.api_base, interaction.id, interaction.token
        )
    }

    /// Handle a dispatch event. Interaction replies run on their own task so
    /// a slow callback never stalls heartbeats or shutdown.
    fn handle_dispatch(&self, payload: GatewayPayload) {
        match payload.t.as_deref() {
            Some("READY") => match serde_json::from_value::<Ready>(payload.d) {
                Ok(ready) => info!("Discord bot started as {:?}", ready.user.username),
                Err(_) => info!("Discord bot ready"),
            },
            Some("INTERACTION_CREATE") => {
                let interaction = match serde_json::from_value::<Interaction>(payload.d) {
                    Ok(interaction) => interaction,
                    Err(e) => {
                        debug!("Ignoring undecodable interaction: {}", e);
                        return;
                    }
                };
                let Some(reply) = interaction
                    .command_name()
                    .and_then(|name| self.responder.reply_to_command(name))
                else {
                    return;
                };
                let http = self.http.clone();
                let url = self.callback_url(&interaction);
                tokio::spawn(async move {
                    if let Err(e) = respond(&http, &url, reply).await {
                        warn!("Failed to send response: {}", e);
                    }
                });
            }
            _ => {}
        }
    }

    async fn session(&self, shutdown: &CancellationToken) -> Result<SessionEnd> {
        let Some(socket) =
            unless_shutdown(shutdown, connect_websocket(PLATFORM, &self.gateway_url)).await
        else {
            return Ok(SessionEnd::Shutdown);
        };
        let (mut sink, mut stream) = socket?.split();

        let period = tokio::select! {
            _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            hello = read_hello(&mut stream) => hello?,
        };
        debug!("Discord heartbeat interval {:?}", period);

        let identify = json!({
            "op": opcode::IDENTIFY,
            "d": {
                "token": self.bot_token,
                "intents": 0,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "propane_bot",
                    "device": "propane_bot",
                },
            },
        });
        sink.send(Message::Text(identify.to_string()))
            .await
            .map_err(|e| BotError::connection_error(format!("Discord identify failed: {}", e)))?;

        let mut heartbeats = interval_at(Instant::now() + period, period);
        heartbeats.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence: Option<u64> = None;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    send_close(PLATFORM, &mut sink).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeats.tick() => {
                    if let Err(e) = sink.send(heartbeat(sequence)).await {
                        warn!("Discord heartbeat failed: {}", e);
                        return Ok(SessionEnd::Reconnect);
                    }
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            if let Some(frame) = &frame {
                                check_close_code(u16::from(frame.code))?;
                            }
                            info!("Discord closed the gateway connection: {:?}", frame);
                            return Ok(SessionEnd::Reconnect);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("Discord gateway read failed: {}", e);
                            return Ok(SessionEnd::Reconnect);
                        }
                        None => return Ok(SessionEnd::Reconnect),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(&text) {
                        Ok(payload) => payload,
                        Err(e) => {
                            debug!("Ignoring undecodable gateway frame: {}", e);
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }

                    match payload.op {
                        opcode::DISPATCH => self.handle_dispatch(payload),
                        opcode::HEARTBEAT => {
                            if let Err(e) = sink.send(heartbeat(sequence)).await {
                                warn!("Discord heartbeat failed: {}", e);
                                return Ok(SessionEnd::Reconnect);
                            }
                        }
                        opcode::RECONNECT | opcode::INVALID_SESSION => {
                            info!("Discord asked us to reconnect (op {})", payload.op);
                            return Ok(SessionEnd::Reconnect);
                        }
                        opcode::HEARTBEAT_ACK => {}
                        other => debug!("Ignoring gateway opcode {}", other),
                    }
                }
            }
        }
    }
}

/// Wait for the gateway's HELLO and return the heartbeat period.
async fn read_hello(stream: &mut SplitStream<Socket>) -> Result<Duration> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let Ok(payload) = serde_json::from_str::<GatewayPayload>(&text) else {
                    continue;
                };
                if payload.op != opcode::HELLO {
                    continue;
                }
                let hello: Hello = serde_json::from_value(payload.d).map_err(|e| {
                    BotError::connection_error(format!("Malformed Discord HELLO: {}", e))
                })?;
                return Ok(Duration::from_millis(hello.heartbeat_interval.max(1)));
            }
            Ok(Message::Close(Some(frame))) => {
                check_close_code(u16::from(frame.code))?;
                break;
            }
            Ok(Message::Close(None)) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(BotError::connection_error(format!(
                    "Discord gateway read failed before HELLO: {}",
                    e
                )))
            }
        }
    }

    Err(BotError::connection_error(
        "Discord gateway closed before sending HELLO",
    ))
}

/// Answer an interaction with a channel message.
async fn respond(http: &reqwest::Client, url: &str, content: String) -> Result<()> {
    let response = http
        .post(url)
        .json(&json!({
            "type": CALLBACK_CHANNEL_MESSAGE_WITH_SOURCE,
            "data": { "content": content },
        }))
        .send()
        .await
        .map_err(|e| BotError::chat_error(PLATFORM, e.to_string()))?;

    if !response.status().is_success() {
        return Err(BotError::chat_error(
            PLATFORM,
            format!("interaction callback returned {}", response.status()),
        ));
    }
    Ok(())
}

#[async_trait]
impl Worker for DiscordBot {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        let Some(registered) = unless_shutdown(&shutdown, self.register_commands()).await else {
            info!("DiscordBot received shutdown before registering commands");
            return Ok(());
        };
        registered?;
        info!("Registered /{} command", COMMAND_NAME);

        run_sessions(PLATFORM, &shutdown, || self.session(&shutdown)).await?;
        info!("DiscordBot received shutdown, connection closed");
        Ok(())
    }
}
