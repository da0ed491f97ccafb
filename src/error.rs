//! Error handling for the propane bot.

/// A specialized `Result` type for propane bot operations.
pub type Result<T> = std::result::Result<T, BotError>;

/// The main error type for propane bot operations.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding or encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration or calibration values are unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A telemetry payload could not be turned into a reading
    #[error("Malformed telemetry payload {payload:?}: {reason}")]
    MalformedTelemetry { payload: String, reason: String },

    /// The telemetry broker could not be reached or rejected us
    #[error("Connection error: {0}")]
    Connection(String),

    /// A chat platform refused our credentials
    #[error("{platform} rejected the configured credentials")]
    Auth { platform: &'static str },

    /// A chat platform session failed
    #[error("{platform} error: {message}")]
    Chat {
        platform: &'static str,
        message: String,
    },

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// A worker task panicked instead of returning
    #[error("Worker {worker} panicked")]
    WorkerPanicked { worker: String },
}

impl BotError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new malformed telemetry error
    pub fn malformed(payload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTelemetry {
            payload: payload.into(),
            reason: reason.into(),
        }
    }

    /// Create a new connection error
    pub fn connection_error(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new chat platform error
    pub fn chat_error(platform: &'static str, msg: impl Into<String>) -> Self {
        Self::Chat {
            platform,
            message: msg.into(),
        }
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }
}
