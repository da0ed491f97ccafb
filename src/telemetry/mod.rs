//! Telemetry ingest from the scale's MQTT feed.

pub mod listener;
pub mod parse;

// Re-export commonly used items
pub use listener::{BrokerAddress, MqttListener, DEFAULT_MQTT_PORT};
pub use parse::{parse_payload, TelemetryEvent};
