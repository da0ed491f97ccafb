//! Slack responder over the RTM websocket API.

use crate::chat::{
    connect_websocket, http_client, run_sessions, send_close, unless_shutdown, ChatResponder,
    SessionEnd,
};
use crate::error::{BotError, Result};
use crate::reading::ReadingStore;
use crate::supervisor::Worker;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PLATFORM: &str = "Slack";

/// Web API endpoint that hands out RTM websocket URLs.
pub const RTM_CONNECT_URL: &str = "https://slack.com/api/rtm.connect";

/// `rtm.connect` error codes that mean the token itself is bad.
const AUTH_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
];

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
    #[serde(rename = "self")]
    bot: Option<BotIdentity>,
}

#[derive(Debug, Clone, Deserialize)]
struct BotIdentity {
    id: String,
    name: String,
}

/// The RTM events the bot cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum SlackEvent {
    Hello,
    Message {
        channel: String,
        user: Option<String>,
        text: String,
    },
    Error {
        code: Option<i64>,
        message: String,
    },
    Goodbye,
    /// Anything else, including edits, bot posts, and acks for our replies
    Other,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    subtype: Option<String>,
    channel: Option<String>,
    user: Option<String>,
    text: Option<String>,
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: Option<i64>,
    msg: Option<String>,
}

/// Classify one RTM frame. Unknown or undecodable frames are `Other`.
pub fn parse_event(frame: &str) -> SlackEvent {
    let Ok(raw) = serde_json::from_str::<RawEvent>(frame) else {
        return SlackEvent::Other;
    };

    match raw.kind.as_deref() {
        Some("hello") => SlackEvent::Hello,
        Some("goodbye") => SlackEvent::Goodbye,
        Some("error") => {
            let (code, message) = match raw.error {
                Some(err) => (err.code, err.msg.unwrap_or_default()),
                None => (None, String::new()),
            };
            SlackEvent::Error { code, message }
        }
        Some("message") if raw.subtype.is_none() => match (raw.channel, raw.text) {
            (Some(channel), Some(text)) => SlackEvent::Message {
                channel,
                user: raw.user,
                text,
            },
            _ => SlackEvent::Other,
        },
        _ => SlackEvent::Other,
    }
}

/// RTM frame that posts `text` to `channel`.
pub fn outgoing_message(id: u64, channel: &str, text: &str) -> String {
    json!({
        "id": id,
        "type": "message",
        "channel": channel,
        "text": text,
    })
    .to_string()
}

/// Answers `!weight` in any channel the bot has been invited to.
pub struct SlackBot {
    api_token: String,
    connect_url: String,
    responder: ChatResponder,
    http: reqwest::Client,
}

impl SlackBot {
    pub fn new(api_token: impl Into<String>, store: Arc<ReadingStore>) -> Result<Self> {
        Ok(Self {
            api_token: api_token.into(),
            connect_url: RTM_CONNECT_URL.to_string(),
            responder: ChatResponder::new(store),
            http: http_client(PLATFORM)?,
        })
    }

    /// Point `rtm.connect` somewhere else (a proxy or a test server).
    pub fn with_connect_url(mut self, url: impl Into<String>) -> Self {
        self.connect_url = url.into();
        self
    }

    async fn rtm_connect(&self) -> Result<(String, BotIdentity)> {
        let response = self
            .http
            .post(&self.connect_url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| BotError::connection_error(format!("Slack rtm.connect request failed: {}", e)))?;

        let body: RtmConnectResponse = response.json().await.map_err(|e| {
            BotError::connection_error(format!("Unreadable Slack rtm.connect response: {}", e))
        })?;

        if !body.ok {
            let code = body.error.unwrap_or_else(|| "unknown_error".to_string());
            if AUTH_ERRORS.contains(&code.as_str()) {
                return Err(BotError::Auth { platform: PLATFORM });
            }
            return Err(BotError::connection_error(format!(
                "Slack rtm.connect failed: {}",
                code
            )));
        }

        match (body.url, body.bot) {
            (Some(url), Some(bot)) => Ok((url, bot)),
            _ => Err(BotError::connection_error(
                "Slack rtm.connect response is missing the websocket url or bot identity",
            )),
        }
    }

    async fn session(&self, shutdown: &CancellationToken) -> Result<SessionEnd> {
        let Some(connected) = unless_shutdown(shutdown, self.rtm_connect()).await else {
            return Ok(SessionEnd::Shutdown);
        };
        let (url, me) = connected?;

        let Some(socket) = unless_shutdown(shutdown, connect_websocket(PLATFORM, &url)).await
        else {
            return Ok(SessionEnd::Shutdown);
        };
        let socket = socket?;
        info!("Slack bot connected as {} ({})", me.name, me.id);

        let (mut sink, mut stream) = socket.split();
        let mut next_id: u64 = 1;

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    send_close(PLATFORM, &mut sink).await;
                    return Ok(SessionEnd::Shutdown);
                }
                frame = stream.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(frame))) => {
                    info!("Slack closed the RTM connection: {:?}", frame);
                    return Ok(SessionEnd::Reconnect);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("Slack RTM read failed: {}", e);
                    return Ok(SessionEnd::Reconnect);
                }
                None => return Ok(SessionEnd::Reconnect),
            };

            match parse_event(&text) {
                SlackEvent::Hello => info!("Slack RTM session ready"),
                SlackEvent::Message {
                    channel,
                    user,
                    text,
                } => {
                    if user.as_deref() == Some(me.id.as_str()) {
                        continue;
                    }
                    let Some(reply) = self.responder.reply_to_message(&text) else {
                        continue;
                    };

                    let frame = outgoing_message(next_id, &channel, &reply);
                    next_id += 1;
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        warn!("Failed to send weight reply: {}", e);
                    }
                }
                SlackEvent::Error { code, message } => {
                    warn!("Slack RTM error {:?}: {}", code, message);
                }
                SlackEvent::Goodbye => {
                    info!("Slack asked us to reconnect");
                    return Ok(SessionEnd::Reconnect);
                }
                SlackEvent::Other => {}
            }
        }
    }
}

#[async_trait]
impl Worker for SlackBot {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        run_sessions(PLATFORM, &shutdown, || self.session(&shutdown)).await?;
        info!("SlackBot received shutdown, connection closed");
        Ok(())
    }
}
