//! MQTT subscriber that feeds scale readings into the store.

use crate::error::{BotError, Result};
use crate::reading::{Reading, ReadingStore};
use crate::supervisor::Worker;
use crate::telemetry::parse::parse_payload;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default MQTT port when the server address does not name one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Host and port of the telemetry broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Parse `tcp://host:port`, `mqtt://host:port`, or a bare `host[:port]`.
    pub fn parse(server: &str) -> Result<Self> {
        let address = server
            .strip_prefix("tcp://")
            .or_else(|| server.strip_prefix("mqtt://"))
            .unwrap_or(server);

        if address.contains("://") {
            return Err(BotError::config_error(format!(
                "Unsupported MQTT server scheme in {:?}, use tcp:// or mqtt://",
                server
            )));
        }

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| {
                    BotError::config_error(format!("Invalid MQTT port in {:?}: {}", server, e))
                })?;
                (host, port)
            }
            None => (address, DEFAULT_MQTT_PORT),
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(BotError::config_error(format!(
                "MQTT server {:?} has no host",
                server
            )));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The telemetry ingest worker: the single writer of the [`ReadingStore`].
///
/// Malformed payloads and broker failures end the worker with an error. The
/// feed is at-most-once; a lost message simply leaves the previous reading in
/// place.
pub struct MqttListener {
    store: Arc<ReadingStore>,
    broker: BrokerAddress,
    topic: String,
    client_id: String,
}

impl MqttListener {
    pub fn new(
        store: Arc<ReadingStore>,
        broker: BrokerAddress,
        topic: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            broker,
            topic: topic.into(),
            client_id: client_id.into(),
        }
    }

    /// Decode one message and publish it to the store.
    pub fn handle_payload(&self, payload: &[u8]) -> Result<Reading> {
        let event = parse_payload(payload)?;
        let reading = self.store.set(event.weight, event.timestamp);
        debug!(
            "Stored reading: {} lbs at {} ({}% remaining)",
            reading.weight, reading.timestamp, reading.remaining_percent
        );
        Ok(reading)
    }
}

#[async_trait]
impl Worker for MqttListener {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        let mut options = MqttOptions::new(&self.client_id, &self.broker.host, self.broker.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        client
            .subscribe(&self.topic, QoS::AtMostOnce)
            .await
            .map_err(|e| BotError::connection_error(format!("Failed to queue subscription: {}", e)))?;

        info!("Connecting to MQTT broker {} as {}", self.broker, self.client_id);

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = eventloop.poll() => event,
            };
            // Don't store a reading that raced with shutdown.
            if shutdown.is_cancelled() {
                break;
            }

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BotError::connection_error(format!(
                            "MQTT broker {} refused connection: {:?}",
                            self.broker, ack.code
                        )));
                    }
                    info!("Connected to {}", self.broker);
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(BotError::connection_error(format!(
                            "MQTT broker {} refused subscription to {}",
                            self.broker, self.topic
                        )));
                    }
                    info!("Subscribed to {}", self.topic);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.handle_payload(&publish.payload)?;
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(BotError::connection_error(format!(
                        "MQTT connection to {} failed: {}",
                        self.broker, e
                    )));
                }
            }
        }

        info!("MQTT listener received shutdown, disconnecting");
        if client.try_disconnect().is_ok() {
            let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            })
            .await;
            if flushed.is_err() {
                warn!("Timed out sending MQTT disconnect to {}", self.broker);
            }
        }

        Ok(())
    }
}
