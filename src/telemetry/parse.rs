//! Telemetry payload decoding.

use crate::error::{BotError, Result};
use chrono::{DateTime, Utc};

/// One decoded scale message. Never retained; it is turned into a
/// [`Reading`](crate::reading::Reading) right away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub weight: f64,
}

/// Decode a `"<unix-seconds>,<weight>"` payload, e.g. `1577640142,163.4`.
///
/// Fields after the second are ignored. Fields are not trimmed, so stray
/// whitespace makes the payload malformed just like any other junk.
pub fn parse_payload(payload: &[u8]) -> Result<TelemetryEvent> {
    let text = std::str::from_utf8(payload).map_err(|_| {
        BotError::malformed(String::from_utf8_lossy(payload), "payload is not valid UTF-8")
    })?;

    let mut fields = text.split(',');
    let (Some(timestamp), Some(weight)) = (fields.next(), fields.next()) else {
        return Err(BotError::malformed(
            text,
            "expected \"<unix-seconds>,<weight>\"",
        ));
    };

    let seconds: i64 = timestamp.parse().map_err(|e| {
        BotError::malformed(text, format!("invalid timestamp {:?}: {}", timestamp, e))
    })?;
    let timestamp = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| {
        BotError::malformed(text, format!("timestamp {} is out of range", seconds))
    })?;

    let weight: f64 = weight
        .parse()
        .map_err(|e| BotError::malformed(text, format!("invalid weight {:?}: {}", weight, e)))?;
    if !weight.is_finite() {
        return Err(BotError::malformed(text, "weight must be a finite number"));
    }

    Ok(TelemetryEvent { timestamp, weight })
}
