//! Event weighting
//!
//! Scores each event as `base_weight × time_decay × night_boost`:
//! - base weight by event type
//! - linear decay to zero over the decay window, measured against a
//!   caller-supplied reference instant
//! - boost for events recorded during local night hours

use chrono::{DateTime, FixedOffset, Timelike, Utc};

use crate::config::AnalysisConfig;
use crate::types::{EventWeight, RawEvent};

/// Pure per-event scorer
#[derive(Debug, Clone)]
pub struct WeightEngine<'a> {
    config: &'a AnalysisConfig,
    local_offset: FixedOffset,
    reference_now: DateTime<Utc>,
}

impl<'a> WeightEngine<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        local_offset: FixedOffset,
        reference_now: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            local_offset,
            reference_now,
        }
    }

    /// Score a single event
    pub fn weigh(&self, event: &RawEvent) -> EventWeight {
        let base_weight = self.config.event_weights.weight_for(&event.event_type);
        let time_decay = time_decay(
            hours_elapsed(self.reference_now, event.timestamp),
            self.config.time_decay_hours,
        );
        let night_boost = if self.is_night(event.timestamp) {
            self.config.night_boost_factor
        } else {
            1.0
        };

        EventWeight {
            base_weight,
            time_decay,
            night_boost,
            final_weight: base_weight * time_decay * night_boost,
        }
    }

    /// Score every event, in order
    pub fn weigh_all(&self, events: &[RawEvent]) -> Vec<EventWeight> {
        events.iter().map(|e| self.weigh(e)).collect()
    }

    fn is_night(&self, timestamp: DateTime<Utc>) -> bool {
        let local_hour = timestamp.with_timezone(&self.local_offset).hour();
        self.config.is_night_hour(local_hour)
    }
}

/// Hours from `timestamp` to `reference_now`; negative for future-dated events
pub fn hours_elapsed(reference_now: DateTime<Utc>, timestamp: DateTime<Utc>) -> f64 {
    (reference_now - timestamp).num_milliseconds() as f64 / 3_600_000.0
}

/// Linear decay, clamped to [0, 1]
pub fn time_decay(hours_elapsed: f64, window_hours: f64) -> f64 {
    (1.0 - hours_elapsed / window_hours).clamp(0.0, 1.0)
}
