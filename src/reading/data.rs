//! Data structures for cylinder readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable snapshot of the scale.
///
/// `remaining_percent` is computed once when the reading is stored so that
/// every presentation surface reports the same number.
///
/// The [`Default`] reading is the "no data yet" state: zero weight, zero
/// percent, stamped at the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Raw scale reading in pounds
    pub weight: f64,
    /// When the scale took the reading (source time, not receipt time)
    pub timestamp: DateTime<Utc>,
    /// Rounded percentage of gas left
    pub remaining_percent: f64,
}
