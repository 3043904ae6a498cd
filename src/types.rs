//! Core types for the Locus pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: normalized events, weighted events, cluster predictions, per-user
//! results and the final analysis report.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::config::EventWeights;
use crate::error::ValidationError;

/// Cluster identifier, unique within one analysis run
pub type ClusterId = usize;

/// Sentinel used on the wire for events that belong to no cluster
pub const NOISE_LABEL: i64 = -1;

/// Sentinel message for an empty input batch
pub const NO_DATA_MESSAGE: &str = "No data to process";

/// Kind of user action that produced an event
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Login,
    Upi,
    AppOpen,
    /// Unrecognized event types are kept under their input name
    #[serde(untagged)]
    Other(String),
}

impl EventType {
    pub fn parse(value: &str) -> Self {
        match value {
            "login" => EventType::Login,
            "upi" => EventType::Upi,
            "app_open" => EventType::AppOpen,
            other => EventType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::Login => "login",
            EventType::Upi => "upi",
            EventType::AppOpen => "app_open",
            EventType::Other(name) => name.as_str(),
        }
    }
}

/// A validated, canonical event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub user_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Reported GPS accuracy in meters
    pub accuracy: f64,
}

/// Scoring components for one event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventWeight {
    pub base_weight: f64,
    /// Linear freshness factor in [0, 1]
    pub time_decay: f64,
    pub night_boost: f64,
    pub final_weight: f64,
}

/// An event annotated with its cluster label and weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub accuracy: f64,
    /// Cluster id, or -1 for noise
    pub cluster: i64,
    #[serde(flatten)]
    pub weight: EventWeight,
}

/// Location estimate for one (user, cluster) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPrediction {
    pub cluster_id: ClusterId,
    pub predicted_lat: f64,
    pub predicted_lon: f64,
    pub event_count: usize,
    pub confidence: f64,
}

/// How a primary prediction was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    ClusterBased,
    SimpleAverage,
}

/// The chosen location estimate for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPrediction {
    pub predicted_lat: f64,
    pub predicted_lon: f64,
    pub confidence: f64,
    /// None for the coordinate-average fallback
    pub cluster_id: Option<ClusterId>,
    pub event_count: usize,
    pub prediction_type: PredictionType,
}

/// First and last event instants for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub first_event: DateTime<Utc>,
    pub last_event: DateTime<Utc>,
}

/// Per-user analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResult {
    pub user_id: String,
    pub total_events: usize,
    pub event_types: BTreeMap<String, usize>,
    pub clusters_involved: usize,
    pub weighted_events: Vec<WeightedEvent>,
    pub cluster_predictions: Vec<ClusterPrediction>,
    pub primary_prediction: LocationPrediction,
    pub time_range: TimeRange,
}

/// Suspicious pattern flagged for human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    /// Many events, none of them clustered
    NoClusters {
        user_id: String,
        event_count: usize,
        description: String,
    },
    /// Payment activity co-located with many other action types
    MixedEventCluster {
        cluster_id: ClusterId,
        event_types: Vec<String>,
        description: String,
    },
}

impl Anomaly {
    pub fn no_clusters(user_id: &str, event_count: usize) -> Self {
        Anomaly::NoClusters {
            user_id: user_id.to_string(),
            event_count,
            description: format!("User {user_id} has {event_count} events but no clusters"),
        }
    }

    pub fn mixed_event_cluster(cluster_id: ClusterId, event_types: Vec<String>) -> Self {
        Anomaly::MixedEventCluster {
            cluster_id,
            event_types,
            description: format!("Cluster {cluster_id} has unusual mix of event types"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

/// Axis-aligned extent of a set of coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Global description of one non-noise cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_id: ClusterId,
    pub event_count: usize,
    pub user_count: usize,
    pub event_types: BTreeMap<String, usize>,
    pub centroid: Centroid,
    pub bounding_box: BoundingBox,
    pub users: Vec<String>,
}

/// A user's primary prediction restated at report level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPrediction {
    #[serde(flatten)]
    pub prediction: LocationPrediction,
    /// Reference instant of the run, rendered in local time
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_users: usize,
    pub total_events: usize,
    pub total_clusters: usize,
    pub noise_points: usize,
    pub event_distribution: BTreeMap<String, usize>,
    pub cluster_distribution: BTreeMap<String, usize>,
    pub processing_timestamp: String,
    pub anomalies: Vec<Anomaly>,
    pub confidence: f64,
}

/// Constants used by a run, embedded so each report is self-describing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmParameters {
    pub dbscan_eps: f64,
    pub dbscan_min_samples: usize,
    pub event_weights: EventWeights,
    #[serde(serialize_with = "serialize_hours")]
    pub time_decay_hours: f64,
    pub night_boost_factor: f64,
    pub night_hours: [u32; 2],
    pub local_utc_offset: String,
}

/// Whole hours go on the wire as integers (`72`, not `72.0`)
fn serialize_hours<S: Serializer>(hours: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if hours.fract() == 0.0 && *hours >= 0.0 && *hours <= u32::MAX as f64 {
        serializer.serialize_u32(*hours as u32)
    } else {
        serializer.serialize_f64(*hours)
    }
}

/// Complete output of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: AnalysisSummary,
    pub user_results: Vec<UserResult>,
    pub cluster_info: BTreeMap<String, ClusterInfo>,
    pub location_predictions: BTreeMap<String, PublishedPrediction>,
    pub anomalies: Vec<Anomaly>,
    pub algorithm_parameters: AlgorithmParameters,
}

impl AnalysisReport {
    /// Look up the published prediction for one user
    pub fn prediction_for(&self, user_id: &str) -> Option<&PublishedPrediction> {
        self.location_predictions.get(user_id)
    }

    /// Look up the full result for one user
    pub fn user_result(&self, user_id: &str) -> Option<&UserResult> {
        self.user_results.iter().find(|r| r.user_id == user_id)
    }
}

/// Result of an analysis run
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Ok(Box<AnalysisReport>),
    /// The input batch held no events
    Empty,
    Validation(ValidationError),
    Internal(String),
}

impl AnalysisOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, AnalysisOutcome::Ok(_))
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisOutcome::Ok(report) => Some(report),
            _ => None,
        }
    }

    pub fn into_report(self) -> Option<AnalysisReport> {
        match self {
            AnalysisOutcome::Ok(report) => Some(*report),
            _ => None,
        }
    }

    /// Message carried by the `{"error": ...}` rendering, if this is not a report
    pub fn error_message(&self) -> Option<String> {
        match self {
            AnalysisOutcome::Ok(_) => None,
            AnalysisOutcome::Empty => Some(NO_DATA_MESSAGE.to_string()),
            AnalysisOutcome::Validation(err) => Some(format!("Invalid event batch: {err}")),
            AnalysisOutcome::Internal(detail) => Some(format!("Processing failed: {detail}")),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for AnalysisOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AnalysisOutcome::Ok(report) => report.serialize(serializer),
            other => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", &other.error_message().unwrap_or_default())?;
                map.end()
            }
        }
    }
}
