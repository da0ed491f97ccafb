//! # Propane Bot - Cylinder Level Monitor
//!
//! Listens to a scale publishing over MQTT, converts each weight into a
//! remaining-fuel percentage for the configured cylinder, and answers
//! "how much propane is left?" over Slack, Discord, and HTTP.
//!
//! ## Features
//!
//! - **Telemetry ingest**: `"<unix-seconds>,<weight>"` payloads from an MQTT topic
//! - **Chat bots**: `!weight` in Slack, `/weight` in Discord
//! - **Web dashboard**: plain text, JSON, and a live page
//! - **Supervision**: one failing worker stops them all cleanly
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use propane_bot::{CylinderProfile, ReadingStore, Supervisor, WebConfig, WebServer};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = CylinderProfile::new(17.0, 37.0, 0.0)?;
//!     let store = Arc::new(ReadingStore::new(profile, chrono_tz::America::Chicago));
//!
//!     let mut supervisor = Supervisor::new(CancellationToken::new());
//!     supervisor.spawn(WebServer::new(WebConfig::default(), store));
//!     supervisor.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod reading;
pub mod supervisor;
pub mod telemetry;
pub mod web;

// Re-export public API
pub use chat::{ChatResponder, DiscordBot, SlackBot};
pub use config::AppConfig;
pub use error::{BotError, Result};
pub use reading::{CylinderProfile, Reading, ReadingStore};
pub use supervisor::{cancel_on_shutdown_signal, Supervisor, Worker};
pub use telemetry::{parse_payload, BrokerAddress, MqttListener, TelemetryEvent};
pub use web::{create_app, WebConfig, WebServer};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;

/// Seconds the web server may spend draining connections at shutdown
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
