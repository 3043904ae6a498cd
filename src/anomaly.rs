//! Anomaly detection
//!
//! Two independent heuristics:
//! - users with many events, none of which cluster
//! - clusters where payment events co-occur with many other event types
//!
//! Flags are descriptive only and never feed back into predictions.

use std::collections::HashMap;

use crate::config::AnalysisConfig;
use crate::index::EventIndex;
use crate::types::{Anomaly, EventType, RawEvent};

/// Heuristic anomaly detector
pub struct AnomalyDetector {
    no_cluster_min_events: usize,
    mixed_cluster_min_types: usize,
}

impl AnomalyDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            no_cluster_min_events: config.no_cluster_min_events,
            mixed_cluster_min_types: config.mixed_cluster_min_types,
        }
    }

    /// Run both heuristics: users first (input order), then clusters (ascending id)
    pub fn detect(
        &self,
        events: &[RawEvent],
        index: &EventIndex,
        clusters_per_user: &HashMap<&str, usize>,
    ) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        for (user_id, user_events) in index.users() {
            let Some(&clusters) = clusters_per_user.get(user_id) else {
                continue;
            };
            if user_events.len() >= self.no_cluster_min_events && clusters == 0 {
                anomalies.push(Anomaly::no_clusters(user_id, user_events.len()));
            }
        }

        for (cluster_id, members) in index.clusters() {
            let mut types: Vec<&EventType> = Vec::new();
            for &i in members {
                if !types.contains(&&events[i].event_type) {
                    types.push(&events[i].event_type);
                }
            }

            if types.contains(&&EventType::Upi) && types.len() >= self.mixed_cluster_min_types {
                let names = types.iter().map(|t| t.as_str().to_string()).collect();
                anomalies.push(Anomaly::mixed_event_cluster(cluster_id, names));
            }
        }

        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::SpatialClusterer;
    use chrono::{TimeZone, Utc};

    fn event(user: &str, event_type: EventType, lat: f64, lon: f64) -> RawEvent {
        RawEvent {
            user_id: user.to_string(),
            event_type,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            lat,
            lon,
            accuracy: 0.0,
        }
    }

    fn detect(events: &[RawEvent]) -> Vec<Anomaly> {
        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(events);
        let index = EventIndex::build(events, &assignment);
        let clusters_per_user: HashMap<&str, usize> = index
            .users()
            .map(|(user_id, idx)| {
                let mut seen: Vec<usize> = idx.iter().filter_map(|&i| assignment.label(i)).collect();
                seen.sort_unstable();
                seen.dedup();
                (user_id, seen.len())
            })
            .collect();
        AnomalyDetector::new(&AnalysisConfig::default()).detect(events, &index, &clusters_per_user)
    }

    #[test]
    fn test_unclustered_user_flagged() {
        let events: Vec<RawEvent> = (0..6)
            .map(|i| event("U5", EventType::Login, 10.0 + i as f64, 70.0))
            .collect();

        let anomalies = detect(&events);

        assert_eq!(anomalies, vec![Anomaly::no_clusters("U5", 6)]);
    }

    #[test]
    fn test_few_unclustered_events_not_flagged() {
        let events: Vec<RawEvent> = (0..4)
            .map(|i| event("U5", EventType::Login, 10.0 + i as f64, 70.0))
            .collect();
        assert!(detect(&events).is_empty());
    }

    #[test]
    fn test_mixed_cluster_flagged() {
        let events = vec![
            event("U1", EventType::Upi, 12.900, 77.590),
            event("U1", EventType::Login, 12.901, 77.590),
            event("U2", EventType::AppOpen, 12.900, 77.591),
        ];

        let anomalies = detect(&events);

        assert_eq!(anomalies.len(), 1);
        match &anomalies[0] {
            Anomaly::MixedEventCluster {
                cluster_id,
                event_types,
                ..
            } => {
                assert_eq!(*cluster_id, 0);
                assert_eq!(event_types, &vec!["upi", "login", "app_open"]);
            }
            other => panic!("unexpected anomaly {other:?}"),
        }
    }

    #[test]
    fn test_two_types_or_no_upi_not_flagged() {
        let events = vec![
            event("U1", EventType::Upi, 12.900, 77.590),
            event("U1", EventType::Login, 12.901, 77.590),
            event("U2", EventType::Login, 19.000, 72.000),
            event("U2", EventType::AppOpen, 19.001, 72.000),
            event("U2", EventType::Other("atm".into()), 19.000, 72.001),
        ];
        assert!(detect(&events).is_empty());
    }

    #[test]
    fn test_cluster_counts_matched_by_user() {
        let mut events = vec![
            event("U1", EventType::Upi, 12.900, 77.590),
            event("U1", EventType::Upi, 12.901, 77.590),
        ];
        events.extend((0..6).map(|i| event("U2", EventType::Login, 10.0 + i as f64, 70.0)));
        events.extend((0..6).map(|i| event("U3", EventType::Login, 30.0 + i as f64, 60.0)));

        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(&events);
        let index = EventIndex::build(&events, &assignment);
        // U1 has no entry; U2 and U3 must still get their own counts
        let clusters_per_user: HashMap<&str, usize> = [("U3", 0), ("U2", 0)].into_iter().collect();

        let anomalies =
            AnomalyDetector::new(&AnalysisConfig::default()).detect(&events, &index, &clusters_per_user);

        assert_eq!(
            anomalies,
            vec![Anomaly::no_clusters("U2", 6), Anomaly::no_clusters("U3", 6)]
        );
    }
}
