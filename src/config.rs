//! Analysis configuration
//!
//! Every tunable constant of the engine lives here. Defaults reproduce the
//! fixed parameter set embedded in each report's `algorithm_parameters`.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;
use crate::types::EventType;

/// DBSCAN neighbourhood radius in degrees (roughly 1.1 km)
pub const DEFAULT_EPS: f64 = 0.01;

/// Minimum neighbourhood size (including the point itself) for a core point
pub const DEFAULT_MIN_POINTS: usize = 2;

/// Linear decay window in hours
pub const DEFAULT_TIME_DECAY_HOURS: f64 = 72.0;

/// Multiplier applied to events recorded during local night hours
pub const DEFAULT_NIGHT_BOOST: f64 = 1.2;

/// India Standard Time, UTC+05:30
pub const IST_OFFSET_MINUTES: i32 = 330;

/// Confidence assigned to the coordinate-average fallback prediction
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Per-event-type base weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventWeights {
    pub upi: f64,
    pub app_open: f64,
    pub login: f64,
    pub other: f64,
}

impl Default for EventWeights {
    fn default() -> Self {
        Self {
            upi: 1.0,
            app_open: 0.8,
            login: 0.6,
            other: 0.5,
        }
    }
}

impl EventWeights {
    /// Base weight for an event type
    pub fn weight_for(&self, event_type: &EventType) -> f64 {
        match event_type {
            EventType::Upi => self.upi,
            EventType::AppOpen => self.app_open,
            EventType::Login => self.login,
            EventType::Other(_) => self.other,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub eps: f64,
    pub min_points: usize,
    pub event_weights: EventWeights,
    pub time_decay_hours: f64,
    pub night_boost_factor: f64,
    /// First local hour (inclusive) counted as night
    pub night_start_hour: u32,
    /// Last local hour (inclusive) counted as night
    pub night_end_hour: u32,
    pub local_utc_offset_minutes: i32,
    pub fallback_confidence: f64,
    /// Event count from which an unclustered user is flagged
    pub no_cluster_min_events: usize,
    /// Distinct event types (upi included) from which a cluster is flagged
    pub mixed_cluster_min_types: usize,
    /// Reject batches larger than this before clustering
    pub max_events: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            min_points: DEFAULT_MIN_POINTS,
            event_weights: EventWeights::default(),
            time_decay_hours: DEFAULT_TIME_DECAY_HOURS,
            night_boost_factor: DEFAULT_NIGHT_BOOST,
            night_start_hour: 22,
            night_end_hour: 6,
            local_utc_offset_minutes: IST_OFFSET_MINUTES,
            fallback_confidence: FALLBACK_CONFIDENCE,
            no_cluster_min_events: 5,
            mixed_cluster_min_types: 3,
            max_events: None,
        }
    }
}

impl AnalysisConfig {
    /// Parse a (possibly partial) JSON configuration; missing keys keep defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<(), ComputeError> {
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "eps must be a positive number, got {}",
                self.eps
            )));
        }
        if self.min_points == 0 {
            return Err(ComputeError::InvalidConfig(
                "min_points must be at least 1".to_string(),
            ));
        }
        if !(self.time_decay_hours.is_finite() && self.time_decay_hours > 0.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "time_decay_hours must be positive, got {}",
                self.time_decay_hours
            )));
        }
        if self.night_start_hour > 23 || self.night_end_hour > 23 {
            return Err(ComputeError::InvalidConfig(
                "night hours must be within 0..=23".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fallback_confidence) {
            return Err(ComputeError::InvalidConfig(format!(
                "fallback_confidence must be within [0, 1], got {}",
                self.fallback_confidence
            )));
        }
        let weights = [
            self.event_weights.upi,
            self.event_weights.app_open,
            self.event_weights.login,
            self.event_weights.other,
            self.night_boost_factor,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ComputeError::InvalidConfig(
                "weights and night boost must be non-negative".to_string(),
            ));
        }
        self.local_offset()?;
        Ok(())
    }

    /// The configured local timezone as a fixed offset
    pub fn local_offset(&self) -> Result<FixedOffset, ComputeError> {
        FixedOffset::east_opt(self.local_utc_offset_minutes * 60).ok_or_else(|| {
            ComputeError::InvalidConfig(format!(
                "local_utc_offset_minutes out of range: {}",
                self.local_utc_offset_minutes
            ))
        })
    }

    /// Whether a local hour of day counts as night. The window may wrap midnight.
    pub fn is_night_hour(&self, hour: u32) -> bool {
        if self.night_start_hour <= self.night_end_hour {
            (self.night_start_hour..=self.night_end_hour).contains(&hour)
        } else {
            hour >= self.night_start_hour || hour <= self.night_end_hour
        }
    }
}
