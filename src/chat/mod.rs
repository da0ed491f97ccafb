//! Chat platform responders.
//!
//! Both bots answer the same question the same way: a message containing
//! `!weight` (Slack) or the `/weight` slash command (Discord) gets the store
//! summary as a reply in the channel it came from. The platform modules only
//! deal with their transport; what to say lives in [`ChatResponder`].

pub mod discord;
pub mod slack;

pub use discord::DiscordBot;
pub use slack::SlackBot;

use crate::error::{BotError, Result};
use crate::reading::ReadingStore;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Text that triggers a reply when it appears anywhere in a message.
pub const TRIGGER_PHRASE: &str = "!weight";

/// Name of the slash command registered on platforms that support them.
pub const COMMAND_NAME: &str = "weight";

pub const COMMAND_DESCRIPTION: &str = "Get the current propane level";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Decides whether and how to answer an incoming chat message.
#[derive(Debug, Clone)]
pub struct ChatResponder {
    store: Arc<ReadingStore>,
}

impl ChatResponder {
    pub fn new(store: Arc<ReadingStore>) -> Self {
        Self { store }
    }

    /// Case-insensitive check for the trigger phrase.
    pub fn is_trigger(text: &str) -> bool {
        text.trim().to_lowercase().contains(TRIGGER_PHRASE)
    }

    /// Reply for a free-text message, or `None` if it should be ignored.
    pub fn reply_to_message(&self, text: &str) -> Option<String> {
        Self::is_trigger(text).then(|| self.store.summary())
    }

    /// Reply for a slash command, or `None` if it isn't ours.
    pub fn reply_to_command(&self, name: &str) -> Option<String> {
        name.eq_ignore_ascii_case(COMMAND_NAME)
            .then(|| self.store.summary())
    }
}

/// How a single platform session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The shutdown token fired; the worker should return.
    Shutdown,
    /// The platform dropped or recycled the connection; open a new one.
    Reconnect,
}

/// Run sessions back to back until shutdown or a fatal error.
pub(crate) async fn run_sessions<F, Fut>(
    platform: &'static str,
    shutdown: &CancellationToken,
    mut session: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SessionEnd>>,
{
    loop {
        match session().await? {
            SessionEnd::Shutdown => return Ok(()),
            SessionEnd::Reconnect => {
                warn!(
                    "{} session ended, reconnecting in {:?}",
                    platform, RECONNECT_DELAY
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
}

/// Drive `fut` to completion unless `shutdown` fires first.
pub(crate) async fn unless_shutdown<F: Future>(
    shutdown: &CancellationToken,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        output = fut => Some(output),
    }
}

/// Open a client websocket, giving up after [`HANDSHAKE_TIMEOUT`].
pub(crate) async fn connect_websocket(platform: &'static str, url: &str) -> Result<Socket> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(url)).await {
        Ok(Ok((socket, _))) => Ok(socket),
        Ok(Err(e)) => Err(BotError::connection_error(format!(
            "{} websocket connection failed: {}",
            platform, e
        ))),
        Err(_) => Err(BotError::connection_error(format!(
            "{} websocket handshake timed out after {:?}",
            platform, HANDSHAKE_TIMEOUT
        ))),
    }
}

/// Best-effort close frame; a peer that stops reading cannot hold up shutdown.
pub(crate) async fn send_close(platform: &'static str, sink: &mut SplitSink<Socket, Message>) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("{} close frame not sent: {}", platform, e),
        Err(_) => debug!("{} close frame timed out", platform),
    }
}

pub(crate) fn http_client(platform: &'static str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("propane_bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BotError::chat_error(platform, format!("Failed to build HTTP client: {}", e)))
}
