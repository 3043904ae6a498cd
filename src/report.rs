//! Report assembly
//!
//! Composes the final [`AnalysisReport`] from per-user results, the global
//! clustering and detected anomalies: summary statistics, per-cluster
//! descriptions, the top-level prediction map and the parameter block.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};

use crate::clustering::ClusterAssignment;
use crate::config::AnalysisConfig;
use crate::index::EventIndex;
use crate::stats::{bounding_box, mean};
use crate::types::{
    AlgorithmParameters, AnalysisReport, AnalysisSummary, Anomaly, Centroid, ClusterInfo,
    PublishedPrediction, RawEvent, UserResult,
};

/// Builds the analysis report for one run
pub struct ReportAssembler<'a> {
    config: &'a AnalysisConfig,
    local_offset: FixedOffset,
    reference_now: DateTime<Utc>,
}

impl<'a> ReportAssembler<'a> {
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

    pub fn assemble(
        &self,
        events: &[RawEvent],
        assignment: &ClusterAssignment,
        index: &EventIndex,
        user_results: Vec<UserResult>,
        anomalies: Vec<Anomaly>,
    ) -> AnalysisReport {
        let processing_timestamp = self.local_timestamp();

        let summary = AnalysisSummary {
            total_users: user_results.len(),
            total_events: events.len(),
            total_clusters: index.cluster_count(),
            noise_points: assignment.noise_count(),
            event_distribution: event_distribution(events.iter()),
            cluster_distribution: index
                .clusters()
                .map(|(id, members)| (id.to_string(), members.len()))
                .collect(),
            processing_timestamp: processing_timestamp.clone(),
            anomalies: anomalies.clone(),
            confidence: overall_confidence(&user_results),
        };

        let location_predictions = user_results
            .iter()
            .map(|r| {
                (
                    r.user_id.clone(),
                    PublishedPrediction {
                        prediction: r.primary_prediction.clone(),
                        timestamp: processing_timestamp.clone(),
                    },
                )
            })
            .collect();

        AnalysisReport {
            summary,
            user_results,
            cluster_info: cluster_info(events, index),
            location_predictions,
            anomalies,
            algorithm_parameters: self.algorithm_parameters(),
        }
    }

    pub fn algorithm_parameters(&self) -> AlgorithmParameters {
        algorithm_parameters(self.config, self.local_offset)
    }

    fn local_timestamp(&self) -> String {
        self.reference_now
            .with_timezone(&self.local_offset)
            .to_rfc3339()
    }
}

/// Parameter block describing a configuration
pub fn algorithm_parameters(config: &AnalysisConfig, local_offset: FixedOffset) -> AlgorithmParameters {
    AlgorithmParameters {
        dbscan_eps: config.eps,
        dbscan_min_samples: config.min_points,
        event_weights: config.event_weights,
        time_decay_hours: config.time_decay_hours,
        night_boost_factor: config.night_boost_factor,
        night_hours: [config.night_start_hour, config.night_end_hour],
        local_utc_offset: local_offset.to_string(),
    }
}

/// Mean primary-prediction confidence over all users, 0.0 with no users
pub fn overall_confidence(user_results: &[UserResult]) -> f64 {
    let confidences: Vec<f64> = user_results
        .iter()
        .map(|r| r.primary_prediction.confidence)
        .collect();
    mean(&confidences)
}

/// Count of events per event type name
pub fn event_distribution<'e>(events: impl Iterator<Item = &'e RawEvent>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

fn cluster_info(events: &[RawEvent], index: &EventIndex) -> BTreeMap<String, ClusterInfo> {
    let mut info = BTreeMap::new();

    for (cluster_id, members) in index.clusters() {
        let points: Vec<(f64, f64)> = members
            .iter()
            .map(|&i| (events[i].lat, events[i].lon))
            .collect();
        let lats: Vec<f64> = points.iter().map(|p| p.0).collect();
        let lons: Vec<f64> = points.iter().map(|p| p.1).collect();

        let Some(bounding_box) = bounding_box(&points) else {
            continue;
        };

        let mut users: Vec<String> = Vec::new();
        for &i in members {
            if !users.contains(&events[i].user_id) {
                users.push(events[i].user_id.clone());
            }
        }

        info.insert(
            format!("cluster_{cluster_id}"),
            ClusterInfo {
                cluster_id,
                event_count: members.len(),
                user_count: users.len(),
                event_types: event_distribution(members.iter().map(|&i| &events[i])),
                centroid: Centroid {
                    lat: mean(&lats),
                    lon: mean(&lons),
                },
                bounding_box,
                users,
            },
        );
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::SpatialClusterer;
    use crate::types::{EventType, LocationPrediction, PredictionType, TimeRange};
    use chrono::TimeZone;

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

    fn user_result(user: &str, confidence: f64) -> UserResult {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        UserResult {
            user_id: user.to_string(),
            total_events: 1,
            event_types: BTreeMap::new(),
            clusters_involved: 0,
            weighted_events: Vec::new(),
            cluster_predictions: Vec::new(),
            primary_prediction: LocationPrediction {
                predicted_lat: 0.0,
                predicted_lon: 0.0,
                confidence,
                cluster_id: None,
                event_count: 1,
                prediction_type: PredictionType::SimpleAverage,
            },
            time_range: TimeRange {
                first_event: ts,
                last_event: ts,
            },
        }
    }

    #[test]
    fn test_overall_confidence() {
        assert_eq!(overall_confidence(&[]), 0.0);
        let results = vec![user_result("A", 0.3), user_result("B", 0.9)];
        assert!((overall_confidence(&results) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_info_excludes_noise() {
        let events = vec![
            event("A", EventType::Upi, 12.900, 77.590),
            event("B", EventType::Login, 12.902, 77.596),
            event("A", EventType::Login, 12.901, 77.592),
            event("C", EventType::Upi, 50.000, 50.000),
        ];
        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(&events);
        let index = EventIndex::build(&events, &assignment);

        let info = cluster_info(&events, &index);

        assert_eq!(info.len(), 1);
        let cluster = &info["cluster_0"];
        assert_eq!(cluster.event_count, 3);
        assert_eq!(cluster.user_count, 2);
        assert_eq!(cluster.users, vec!["A", "B"]);
        assert_eq!(cluster.event_types["login"], 2);
        assert_eq!(cluster.bounding_box.min_lat, 12.900);
        assert_eq!(cluster.bounding_box.max_lat, 12.902);
        assert_eq!(cluster.bounding_box.max_lon, 77.596);
        assert!((cluster.centroid.lat - 12.901).abs() < 1e-9);
    }

    #[test]
    fn test_algorithm_parameters_defaults() {
        let config = AnalysisConfig::default();
        let params = algorithm_parameters(&config, config.local_offset().unwrap());
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["dbscan_eps"], 0.01);
        assert_eq!(value["dbscan_min_samples"], 2);
        assert_eq!(value["event_weights"]["upi"], 1.0);
        assert_eq!(value["event_weights"]["app_open"], 0.8);
        assert_eq!(value["event_weights"]["login"], 0.6);
        assert_eq!(value["time_decay_hours"], 72);
        assert!(serde_json::to_string(&params)
            .unwrap()
            .contains("\"time_decay_hours\":72,"));
        assert_eq!(value["night_boost_factor"], 1.2);
        assert_eq!(value["local_utc_offset"], "+05:30");
    }

    #[test]
    fn test_fractional_decay_hours_kept() {
        let config = AnalysisConfig {
            time_decay_hours: 36.5,
            ..AnalysisConfig::default()
        };
        let params = algorithm_parameters(&config, config.local_offset().unwrap());
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["time_decay_hours"], 36.5);

        let parsed: AlgorithmParameters =
            serde_json::from_str(&serde_json::to_string(&params).unwrap()).unwrap();
        assert_eq!(parsed.time_decay_hours, 36.5);
    }
}
