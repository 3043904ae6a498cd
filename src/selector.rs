//! Primary prediction selection

use crate::stats::mean;
use crate::types::{ClusterPrediction, LocationPrediction, PredictionType, RawEvent};

/// Chooses each user's primary prediction
pub struct PredictionSelector {
    fallback_confidence: f64,
}

impl PredictionSelector {
    pub fn new(fallback_confidence: f64) -> Self {
        Self {
            fallback_confidence,
        }
    }

    /// Highest-confidence cluster prediction, ties broken by lowest cluster id.
    /// Without any cluster prediction, falls back to the plain average of all
    /// of the user's coordinates (noise included) at a fixed low confidence.
    pub fn select(
        &self,
        predictions: &[ClusterPrediction],
        user_events: &[&RawEvent],
    ) -> LocationPrediction {
        match best_cluster(predictions) {
            Some(best) => LocationPrediction {
                predicted_lat: best.predicted_lat,
                predicted_lon: best.predicted_lon,
                confidence: best.confidence,
                cluster_id: Some(best.cluster_id),
                event_count: best.event_count,
                prediction_type: PredictionType::ClusterBased,
            },
            None => self.fallback(user_events),
        }
    }

    fn fallback(&self, user_events: &[&RawEvent]) -> LocationPrediction {
        let lats: Vec<f64> = user_events.iter().map(|e| e.lat).collect();
        let lons: Vec<f64> = user_events.iter().map(|e| e.lon).collect();

        LocationPrediction {
            predicted_lat: mean(&lats),
            predicted_lon: mean(&lons),
            confidence: self.fallback_confidence,
            cluster_id: None,
            event_count: user_events.len(),
            prediction_type: PredictionType::SimpleAverage,
        }
    }
}

fn best_cluster(predictions: &[ClusterPrediction]) -> Option<&ClusterPrediction> {
    predictions.iter().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            let better = candidate.confidence > current.confidence
                || (candidate.confidence == current.confidence
                    && candidate.cluster_id < current.cluster_id);
            Some(if better { candidate } else { current })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use chrono::{TimeZone, Utc};

    fn prediction(cluster_id: usize, confidence: f64) -> ClusterPrediction {
        ClusterPrediction {
            cluster_id,
            predicted_lat: cluster_id as f64,
            predicted_lon: cluster_id as f64 * 2.0,
            event_count: 2,
            confidence,
        }
    }

    fn event(lat: f64, lon: f64) -> RawEvent {
        RawEvent {
            user_id: "U1".to_string(),
            event_type: EventType::Login,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            lat,
            lon,
            accuracy: 0.0,
        }
    }

    #[test]
    fn test_highest_confidence_wins() {
        let selector = PredictionSelector::new(0.3);
        let predictions = vec![prediction(0, 0.4), prediction(1, 0.9), prediction(2, 0.5)];

        let primary = selector.select(&predictions, &[]);

        assert_eq!(primary.cluster_id, Some(1));
        assert_eq!(primary.confidence, 0.9);
        assert_eq!(primary.prediction_type, PredictionType::ClusterBased);
    }

    #[test]
    fn test_tie_breaks_on_lowest_cluster_id() {
        let selector = PredictionSelector::new(0.3);
        let predictions = vec![prediction(4, 0.7), prediction(2, 0.7), prediction(3, 0.1)];

        let primary = selector.select(&predictions, &[]);

        assert_eq!(primary.cluster_id, Some(2));
    }

    #[test]
    fn test_fallback_averages_all_events() {
        let selector = PredictionSelector::new(0.3);
        let a = event(10.0, 70.0);
        let b = event(20.0, 80.0);

        let primary = selector.select(&[], &[&a, &b]);

        assert_eq!(primary.prediction_type, PredictionType::SimpleAverage);
        assert_eq!(primary.cluster_id, None);
        assert_eq!(primary.confidence, 0.3);
        assert_eq!(primary.event_count, 2);
        assert_eq!(primary.predicted_lat, 15.0);
        assert_eq!(primary.predicted_lon, 75.0);
    }
}
