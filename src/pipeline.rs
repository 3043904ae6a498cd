//! Pipeline orchestration
//!
//! This module provides the public API for location analysis. It runs the
//! full pipeline over one batch of event records:
//! normalize → cluster → weigh → aggregate → select → detect anomalies → report.
//!
//! The pipeline never reads the wall clock: the caller supplies the reference
//! instant used for time decay and report timestamps.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn, Dispatch};

pub use tokio_util::sync::CancellationToken;

use crate::aggregator::ClusterAggregator;
use crate::anomaly::AnomalyDetector;
use crate::clustering::SpatialClusterer;
use crate::config::AnalysisConfig;
use crate::error::ComputeError;
use crate::index::EventIndex;
use crate::normalizer::EventNormalizer;
use crate::report::{event_distribution, ReportAssembler};
use crate::selector::PredictionSelector;
use crate::types::{
    AnalysisOutcome, AnalysisReport, RawEvent, TimeRange, UserResult, WeightedEvent,
};
use crate::weights::WeightEngine;

/// Analyze a batch of event records with the default configuration (stateless, one-shot).
///
/// # Arguments
/// * `records` - Event records as untyped JSON values
/// * `reference_now` - Instant that time decay is measured against
///
/// # Example
/// ```ignore
/// let outcome = analyze(&records, Utc::now());
/// if let Some(report) = outcome.report() { /* ... */ }
/// ```
pub fn analyze(records: &[Value], reference_now: DateTime<Utc>) -> AnalysisOutcome {
    LocationAnalyzer::new().analyze(records, reference_now)
}

/// Configurable analyzer.
///
/// Use this to change parameters, inject a logging sink, or attach a
/// cancellation token.
pub struct LocationAnalyzer {
    config: AnalysisConfig,
    dispatch: Option<Dispatch>,
    cancellation: Option<CancellationToken>,
}

impl Default for LocationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationAnalyzer {
    /// Create an analyzer with the default parameters
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
            dispatch: None,
            cancellation: None,
        }
    }

    /// Create an analyzer with a validated configuration
    pub fn with_config(config: AnalysisConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self {
            config,
            dispatch: None,
            cancellation: None,
        })
    }

    /// Route this analyzer's log output to `dispatch` instead of the global default
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze a batch of event records
    pub fn analyze(&self, records: &[Value], reference_now: DateTime<Utc>) -> AnalysisOutcome {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, || {
                self.analyze_guarded(records, reference_now)
            }),
            None => self.analyze_guarded(records, reference_now),
        }
    }

    /// Parse a JSON array of records, then analyze it
    pub fn analyze_json(
        &self,
        json: &str,
        reference_now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, ComputeError> {
        let records = EventNormalizer::parse_array(json)?;
        Ok(self.analyze(&records, reference_now))
    }

    fn analyze_guarded(&self, records: &[Value], reference_now: DateTime<Utc>) -> AnalysisOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(records, reference_now)));

        match result {
            Ok(Ok(Some(report))) => AnalysisOutcome::Ok(Box::new(report)),
            Ok(Ok(None)) => AnalysisOutcome::Empty,
            Ok(Err(ComputeError::Validation(err))) => {
                warn!(issues = err.issues.len(), "Rejected event batch: {}", err);
                AnalysisOutcome::Validation(err)
            }
            Ok(Err(err)) => {
                warn!("Processing failed: {}", err);
                AnalysisOutcome::Internal(err.to_string())
            }
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                warn!("Processing failed: {}", detail);
                AnalysisOutcome::Internal(detail)
            }
        }
    }

    fn run(
        &self,
        records: &[Value],
        reference_now: DateTime<Utc>,
    ) -> Result<Option<AnalysisReport>, ComputeError> {
        if records.is_empty() {
            info!("No events to process");
            return Ok(None);
        }

        if let Some(limit) = self.config.max_events {
            if records.len() > limit {
                return Err(ComputeError::BudgetExceeded {
                    limit,
                    actual: records.len(),
                });
            }
        }

        // Stage 1: Normalize records
        let events = EventNormalizer::normalize(records)?;
        self.check_cancelled()?;

        // Stage 2: Cluster all events together
        let clusterer = SpatialClusterer::new(self.config.eps, self.config.min_points);
        let assignment = clusterer.cluster_events(&events);
        let index = EventIndex::build(&events, &assignment);
        info!(
            "Processing {} events for {} users; found {} clusters ({} noise points)",
            events.len(),
            index.user_count(),
            assignment.num_clusters(),
            assignment.noise_count()
        );

        // Stage 3: Weigh every event
        let local_offset = self.config.local_offset()?;
        let weights = WeightEngine::new(&self.config, local_offset, reference_now).weigh_all(&events);

        // Stages 4-5: Aggregate per user and pick primary predictions
        let aggregator = ClusterAggregator::new(&events, &weights, &assignment);
        let selector = PredictionSelector::new(self.config.fallback_confidence);
        let mut user_results = Vec::with_capacity(index.user_count());

        for (user_id, user_events) in index.users() {
            self.check_cancelled()?;

            let members: Vec<&RawEvent> = user_events.iter().map(|&i| &events[i]).collect();
            let time_range = time_range(&members);

            let cluster_predictions = aggregator.aggregate_user(user_events);
            let primary_prediction = selector.select(&cluster_predictions, &members);
            debug!(
                user_id,
                clusters = cluster_predictions.len(),
                confidence = primary_prediction.confidence,
                "Selected primary prediction"
            );

            let weighted_events = user_events
                .iter()
                .map(|&i| WeightedEvent {
                    event_type: events[i].event_type.clone(),
                    timestamp: events[i].timestamp,
                    lat: events[i].lat,
                    lon: events[i].lon,
                    accuracy: events[i].accuracy,
                    cluster: assignment.wire_label(i),
                    weight: weights[i],
                })
                .collect();

            user_results.push(UserResult {
                user_id: user_id.to_string(),
                total_events: user_events.len(),
                event_types: event_distribution(members.iter().copied()),
                clusters_involved: aggregator.clusters_involved(user_events),
                weighted_events,
                cluster_predictions,
                primary_prediction,
                time_range,
            });
        }

        // Stage 6: Flag anomalies
        let clusters_per_user: HashMap<&str, usize> = user_results
            .iter()
            .map(|r| (r.user_id.as_str(), r.clusters_involved))
            .collect();
        let anomalies =
            AnomalyDetector::new(&self.config).detect(&events, &index, &clusters_per_user);
        if !anomalies.is_empty() {
            info!("Detected {} anomalies", anomalies.len());
        }

        // Stage 7: Assemble report
        let report = ReportAssembler::new(&self.config, local_offset, reference_now).assemble(
            &events,
            &assignment,
            &index,
            user_results,
            anomalies,
        );

        info!("Processing completed successfully");
        Ok(Some(report))
    }

    fn check_cancelled(&self) -> Result<(), ComputeError> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(ComputeError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// First and last instants of a user's events. `EventIndex` never holds a
/// user without events.
fn time_range(events: &[&RawEvent]) -> TimeRange {
    let first = events[0].timestamp;
    let (first_event, last_event) = events
        .iter()
        .fold((first, first), |(lo, hi), e| (lo.min(e.timestamp), hi.max(e.timestamp)));
    TimeRange {
        first_event,
        last_event,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected internal failure".to_string()
    }
}
