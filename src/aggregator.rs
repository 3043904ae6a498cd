//! Per-user cluster aggregation
//!
//! For every (user, cluster) pair this computes a weighted centroid and a
//! confidence score from the member events' final weights. Noise events never
//! contribute.

use crate::clustering::ClusterAssignment;
use crate::index::group_by_cluster;
use crate::stats::{mean, weighted_mean};
use crate::types::{ClusterId, ClusterPrediction, EventWeight, RawEvent};

/// Aggregator over one batch's events, weights and cluster labels
pub struct ClusterAggregator<'a> {
    events: &'a [RawEvent],
    weights: &'a [EventWeight],
    assignment: &'a ClusterAssignment,
}

impl<'a> ClusterAggregator<'a> {
    pub fn new(
        events: &'a [RawEvent],
        weights: &'a [EventWeight],
        assignment: &'a ClusterAssignment,
    ) -> Self {
        Self {
            events,
            weights,
            assignment,
        }
    }

    /// Cluster predictions for one user's events, ascending cluster id
    pub fn aggregate_user(&self, user_events: &[usize]) -> Vec<ClusterPrediction> {
        group_by_cluster(user_events, self.assignment)
            .into_iter()
            .map(|(cluster_id, members)| self.predict(cluster_id, &members))
            .collect()
    }

    /// Distinct non-noise clusters a user's events fall into
    pub fn clusters_involved(&self, user_events: &[usize]) -> usize {
        group_by_cluster(user_events, self.assignment).len()
    }

    fn predict(&self, cluster_id: ClusterId, members: &[usize]) -> ClusterPrediction {
        let lats: Vec<f64> = members.iter().map(|&i| self.events[i].lat).collect();
        let lons: Vec<f64> = members.iter().map(|&i| self.events[i].lon).collect();
        let weights: Vec<f64> = members
            .iter()
            .map(|&i| self.weights[i].final_weight)
            .collect();

        // Expired members all weigh zero: fall back to the plain centroid.
        let predicted_lat = weighted_mean(&lats, &weights).unwrap_or_else(|| mean(&lats));
        let predicted_lon = weighted_mean(&lons, &weights).unwrap_or_else(|| mean(&lons));

        ClusterPrediction {
            cluster_id,
            predicted_lat,
            predicted_lon,
            event_count: members.len(),
            confidence: mean(&weights).clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::SpatialClusterer;
    use crate::types::EventType;
    use chrono::{TimeZone, Utc};

    fn event(user: &str, lat: f64, lon: f64) -> RawEvent {
        RawEvent {
            user_id: user.to_string(),
            event_type: EventType::Upi,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            lat,
            lon,
            accuracy: 0.0,
        }
    }

    fn weight(final_weight: f64) -> EventWeight {
        EventWeight {
            base_weight: final_weight,
            time_decay: 1.0,
            night_boost: 1.0,
            final_weight,
        }
    }

    #[test]
    fn test_weighted_centroid_and_confidence() {
        let events = vec![event("U1", 12.900, 77.590), event("U1", 12.904, 77.594)];
        let weights = vec![weight(0.9), weight(0.3)];
        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(&events);
        let aggregator = ClusterAggregator::new(&events, &weights, &assignment);

        let predictions = aggregator.aggregate_user(&[0, 1]);

        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.event_count, 2);
        assert!((p.predicted_lat - 12.901).abs() < 1e-9);
        assert!((p.predicted_lon - 77.591).abs() < 1e-9);
        assert!((p.confidence - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_falls_back_to_plain_mean() {
        let events = vec![event("U1", 12.900, 77.590), event("U1", 12.904, 77.594)];
        let weights = vec![weight(0.0), weight(0.0)];
        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(&events);
        let aggregator = ClusterAggregator::new(&events, &weights, &assignment);

        let p = &aggregator.aggregate_user(&[0, 1])[0];

        assert!((p.predicted_lat - 12.902).abs() < 1e-9);
        assert!((p.predicted_lon - 77.592).abs() < 1e-9);
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_noise_and_other_users_excluded() {
        let events = vec![
            event("U1", 12.900, 77.590),
            event("U2", 12.901, 77.590),
            event("U1", 45.000, 10.000),
        ];
        let weights = vec![weight(1.0), weight(0.2), weight(0.5)];
        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(&events);
        let aggregator = ClusterAggregator::new(&events, &weights, &assignment);

        let predictions = aggregator.aggregate_user(&[0, 2]);

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].event_count, 1);
        assert_eq!(predictions[0].predicted_lat, 12.900);
        assert_eq!(predictions[0].confidence, 1.0);
        assert_eq!(aggregator.clusters_involved(&[0, 2]), 1);
    }

    #[test]
    fn test_boosted_confidence_is_capped() {
        let events = vec![event("U1", 12.900, 77.590), event("U1", 12.901, 77.590)];
        let weights = vec![weight(1.2), weight(1.2)];
        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(&events);
        let aggregator = ClusterAggregator::new(&events, &weights, &assignment);

        assert_eq!(aggregator.aggregate_user(&[0, 1])[0].confidence, 1.0);
    }
}
