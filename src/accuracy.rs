//! Prediction accuracy
//!
//! Compares a location prediction with the events it was derived from. The
//! score is a simple distance heuristic: the mean planar distance from each
//! event to the predicted point, mapped onto [0, 1] against a 0.1 degree
//! threshold.

use serde::{Deserialize, Serialize};

use crate::stats::{mean, planar_distance};
use crate::types::{LocationPrediction, RawEvent};

/// Mean distance (degrees) at which accuracy reaches zero
pub const ACCURACY_DISTANCE_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionAccuracy {
    /// 1.0 when every event sits on the prediction, 0.0 at or past the threshold
    pub accuracy: f64,
    pub avg_distance: f64,
}

/// Score `prediction` against `events`
pub fn prediction_accuracy<'e>(
    events: impl IntoIterator<Item = &'e RawEvent>,
    prediction: &LocationPrediction,
) -> PredictionAccuracy {
    let target = (prediction.predicted_lat, prediction.predicted_lon);
    let distances: Vec<f64> = events
        .into_iter()
        .map(|e| planar_distance((e.lat, e.lon), target))
        .collect();

    if distances.is_empty() {
        return PredictionAccuracy {
            accuracy: 0.0,
            avg_distance: 0.0,
        };
    }

    let avg_distance = mean(&distances);
    PredictionAccuracy {
        accuracy: (1.0 - avg_distance / ACCURACY_DISTANCE_THRESHOLD).max(0.0),
        avg_distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, PredictionType};
    use chrono::{TimeZone, Utc};

    fn event(lat: f64, lon: f64) -> RawEvent {
        RawEvent {
            user_id: "U1".to_string(),
            event_type: EventType::Upi,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            lat,
            lon,
            accuracy: 0.0,
        }
    }

    fn prediction(lat: f64, lon: f64) -> LocationPrediction {
        LocationPrediction {
            predicted_lat: lat,
            predicted_lon: lon,
            confidence: 0.8,
            cluster_id: Some(0),
            event_count: 2,
            prediction_type: PredictionType::ClusterBased,
        }
    }

    #[test]
    fn test_exact_prediction() {
        let events = vec![event(12.9, 77.59), event(12.9, 77.59)];
        let result = prediction_accuracy(&events, &prediction(12.9, 77.59));
        assert_eq!(result.accuracy, 1.0);
        assert_eq!(result.avg_distance, 0.0);
    }

    #[test]
    fn test_partial_accuracy() {
        let events = vec![event(0.03, 0.0), event(0.0, 0.04)];
        let result = prediction_accuracy(&events, &prediction(0.0, 0.0));
        assert!((result.avg_distance - 0.035).abs() < 1e-12);
        assert!((result.accuracy - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_far_prediction_clamps_to_zero() {
        let events = vec![event(1.0, 1.0)];
        let result = prediction_accuracy(&events, &prediction(0.0, 0.0));
        assert_eq!(result.accuracy, 0.0);
    }

    #[test]
    fn test_no_events() {
        let result = prediction_accuracy(Vec::<&RawEvent>::new(), &prediction(0.0, 0.0));
        assert_eq!(
            result,
            PredictionAccuracy {
                accuracy: 0.0,
                avg_distance: 0.0
            }
        );
    }
}
