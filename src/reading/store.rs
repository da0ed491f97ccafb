//! The shared "current reading" record.

use crate::reading::{CylinderProfile, Reading};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::{PoisonError, RwLock};

/// Timestamp layout used in the summary sentence, e.g. `Sun Dec 29 11:22AM 2019`.
pub const SUMMARY_TIME_FORMAT: &str = "%a %b %e %I:%M%p %Y";

/// Thread-safe holder of the latest [`Reading`].
///
/// The telemetry ingest worker is the only writer; every presentation worker
/// reads. Readings are replaced wholesale under a write lock, so readers never
/// see a weight from one update paired with a percentage from another.
///
/// Writes are last-writer-wins: a message carrying an older embedded timestamp
/// still replaces a newer reading if it is stored later.
#[derive(Debug)]
pub struct ReadingStore {
    profile: CylinderProfile,
    display_tz: Tz,
    current: RwLock<Option<Reading>>,
}

impl ReadingStore {
    /// Create an empty store for the given cylinder.
    ///
    /// `display_tz` only affects how timestamps are rendered; stored
    /// timestamps are always absolute instants.
    pub fn new(profile: CylinderProfile, display_tz: Tz) -> Self {
        Self {
            profile,
            display_tz,
            current: RwLock::new(None),
        }
    }

    pub fn profile(&self) -> &CylinderProfile {
        &self.profile
    }

    /// Record a new scale reading, deriving its remaining percentage.
    ///
    /// Returns the reading that was stored.
    pub fn set(&self, weight: f64, timestamp: DateTime<Utc>) -> Reading {
        let reading = Reading {
            weight,
            timestamp,
            remaining_percent: self.profile.remaining_percent(weight),
        };

        // A poisoned lock still holds a whole reading, so keep going.
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(reading);
        reading
    }

    /// The latest reading, or `None` before the first telemetry event.
    pub fn latest(&self) -> Option<Reading> {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The latest reading, or the zero-valued reading before any data arrived.
    pub fn get(&self) -> Reading {
        self.latest().unwrap_or_default()
    }

    pub fn has_reading(&self) -> bool {
        self.latest().is_some()
    }

    /// A reading's timestamp in the display time zone.
    pub fn local_timestamp(&self, reading: &Reading) -> DateTime<Tz> {
        reading.timestamp.with_timezone(&self.display_tz)
    }

    /// The human-readable sentence every chat and HTTP surface replies with.
    pub fn summary(&self) -> String {
        self.summarize(&self.get())
    }

    /// Render the summary sentence for a specific reading.
    pub fn summarize(&self, reading: &Reading) -> String {
        format!(
            "Well, as of {} the cylinder weighs {:.0} lbs which kinda translates into {:.0}% remaining",
            self.local_timestamp(reading).format(SUMMARY_TIME_FORMAT),
            reading.weight,
            reading.remaining_percent,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_store() -> ReadingStore {
        let profile = CylinderProfile::new(20.0, 60.0, 5.0).unwrap();
        ReadingStore::new(profile, chrono_tz::America::Chicago)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let store = test_store();
        let stored = store.set(50.0, at(1_577_640_142));

        let reading = store.get();
        assert_eq!(reading, stored);
        assert_eq!(reading.weight, 50.0);
        assert_eq!(reading.timestamp, at(1_577_640_142));
        assert_eq!(reading.remaining_percent, 78.0);
    }

    #[test]
    fn test_get_is_idempotent() {
        let store = test_store();
        store.set(42.0, at(1_000));
        assert_eq!(store.get(), store.get());
        assert_eq!(store.summary(), store.summary());
    }

    #[test]
    fn test_empty_store_returns_zero_state() {
        let store = test_store();
        assert!(!store.has_reading());
        assert_eq!(store.latest(), None);

        let reading = store.get();
        assert_eq!(reading.weight, 0.0);
        assert_eq!(reading.remaining_percent, 0.0);
        assert_eq!(reading.timestamp.timestamp(), 0);
    }

    #[test]
    fn test_empty_store_summary() {
        let store = test_store();
        assert_eq!(
            store.summary(),
            "Well, as of Wed Dec 31 06:00PM 1969 the cylinder weighs 0 lbs which kinda translates into 0% remaining"
        );
    }

    #[test]
    fn test_summary_uses_display_timezone() {
        let store = test_store();
        store.set(50.0, at(1_577_640_142));
        assert_eq!(
            store.summary(),
            "Well, as of Sun Dec 29 11:22AM 2019 the cylinder weighs 50 lbs which kinda translates into 78% remaining"
        );
    }

    #[test]
    fn test_summary_pads_single_digit_day() {
        let profile = CylinderProfile::new(17.0, 37.0, 0.0).unwrap();
        let store = ReadingStore::new(profile, chrono_tz::UTC);
        assert_eq!(
            store.summary(),
            "Well, as of Thu Jan  1 12:00AM 1970 the cylinder weighs 0 lbs which kinda translates into 0% remaining"
        );
    }

    #[test]
    fn test_last_write_wins_regardless_of_timestamp() {
        let store = test_store();
        store.set(50.0, at(2_000));
        store.set(40.0, at(1_000));

        let reading = store.get();
        assert_eq!(reading.weight, 40.0);
        assert_eq!(reading.timestamp, at(1_000));
    }

    #[test]
    fn test_concurrent_sets_never_tear() {
        let store = Arc::new(test_store());

        std::thread::scope(|scope| {
            for i in 0..16 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for j in 0..200 {
                        let n = i * 1_000 + j;
                        store.set(20.0 + n as f64 / 100.0, at(n));
                    }
                });
            }

            for _ in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for _ in 0..500 {
                        let reading = store.get();
                        if store.has_reading() && reading.timestamp.timestamp() != 0 {
                            let n = reading.timestamp.timestamp();
                            assert_eq!(reading.weight, 20.0 + n as f64 / 100.0);
                            assert_eq!(
                                reading.remaining_percent,
                                store.profile().remaining_percent(reading.weight)
                            );
                        }
                    }
                });
            }
        });

        let reading = store.get();
        let n = reading.timestamp.timestamp();
        assert_eq!(reading.weight, 20.0 + n as f64 / 100.0);
        assert_eq!(
            reading.remaining_percent,
            store.profile().remaining_percent(reading.weight)
        );
    }
}
