//! Spatial clustering
//!
//! Density-based clustering (DBSCAN) over event coordinates. Latitude and
//! longitude are treated as planar coordinates in degrees; at the radii used
//! here the distortion is acceptable. User identity plays no part, so a cluster
//! may hold events from several users.

use crate::types::{ClusterId, RawEvent, NOISE_LABEL};

/// Cluster label for every event of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    /// One entry per event, `None` for noise
    labels: Vec<Option<ClusterId>>,
    num_clusters: usize,
}

impl ClusterAssignment {
    pub fn label(&self, index: usize) -> Option<ClusterId> {
        self.labels.get(index).copied().flatten()
    }

    /// Label as written on the wire: the cluster id or -1
    pub fn wire_label(&self, index: usize) -> i64 {
        self.label(index)
            .map(|c| c as i64)
            .unwrap_or(NOISE_LABEL)
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }
}

/// DBSCAN clusterer with fixed parameters
#[derive(Debug, Clone, Copy)]
pub struct SpatialClusterer {
    eps: f64,
    min_points: usize,
}

impl SpatialClusterer {
    /// # Arguments
    /// * `eps` - neighbourhood radius in degrees (inclusive)
    /// * `min_points` - neighbourhood size, the point itself included, that makes a core point
    pub fn new(eps: f64, min_points: usize) -> Self {
        Self { eps, min_points }
    }

    /// Cluster the coordinates of every event in the batch
    pub fn cluster_events(&self, events: &[RawEvent]) -> ClusterAssignment {
        let points: Vec<(f64, f64)> = events.iter().map(|e| (e.lat, e.lon)).collect();
        self.cluster(&points)
    }

    /// Cluster `(lat, lon)` points. Cluster ids follow discovery order while
    /// scanning points in input order. A border point reachable from several
    /// clusters keeps the first id that reaches it.
    pub fn cluster(&self, points: &[(f64, f64)]) -> ClusterAssignment {
        let neighborhoods = self.neighborhoods(points);
        let is_core = |p: usize| neighborhoods[p].len() >= self.min_points;

        let mut labels: Vec<Option<ClusterId>> = vec![None; points.len()];
        let mut expanded = vec![false; points.len()];
        let mut num_clusters: ClusterId = 0;

        for seed in 0..points.len() {
            if labels[seed].is_some() || !is_core(seed) {
                continue;
            }

            let cluster_id = num_clusters;
            num_clusters += 1;
            labels[seed] = Some(cluster_id);

            // Frontier holds points already labelled with `cluster_id`
            let mut frontier = vec![seed];
            while let Some(p) = frontier.pop() {
                if expanded[p] || !is_core(p) {
                    continue;
                }
                expanded[p] = true;

                for &q in &neighborhoods[p] {
                    if labels[q].is_none() {
                        labels[q] = Some(cluster_id);
                        frontier.push(q);
                    }
                }
            }
        }

        ClusterAssignment {
            labels,
            num_clusters,
        }
    }

    /// Indices within `eps` (inclusive) of each point, the point itself included
    fn neighborhoods(&self, points: &[(f64, f64)]) -> Vec<Vec<usize>> {
        let eps_sq = self.eps * self.eps;
        points
            .iter()
            .map(|&a| {
                points
                    .iter()
                    .enumerate()
                    .filter(|&(_, &b)| squared_distance(a, b) <= eps_sq)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect()
    }
}

#[inline]
fn squared_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dlat = a.0 - b.0;
    let dlon = a.1 - b.1;
    dlat * dlat + dlon * dlon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusterer() -> SpatialClusterer {
        SpatialClusterer::new(0.01, 2)
    }

    #[test]
    fn test_empty_input() {
        let result = clusterer().cluster(&[]);
        assert_eq!(result.label(0), None);
        assert_eq!(result.num_clusters(), 0);
        assert_eq!(result.noise_count(), 0);
    }

    #[test]
    fn test_single_point_is_noise() {
        let result = clusterer().cluster(&[(12.9, 77.59)]);
        assert_eq!(result.num_clusters(), 0);
        assert_eq!(result.label(0), None);
        assert_eq!(result.wire_label(0), -1);
    }

    #[test]
    fn test_two_nearby_points_form_cluster() {
        let result = clusterer().cluster(&[(12.9000, 77.5900), (12.9010, 77.5910)]);
        assert_eq!(result.num_clusters(), 1);
        assert_eq!(result.label(0), Some(0));
        assert_eq!(result.label(1), Some(0));
        assert_eq!(result.noise_count(), 0);
    }

    #[test]
    fn test_separated_groups_and_outlier() {
        let points = vec![
            (12.900, 77.590),
            (12.901, 77.590),
            (28.600, 77.200), // outlier
            (19.070, 72.870),
            (19.071, 72.871),
            (19.072, 72.870),
        ];

        let result = clusterer().cluster(&points);

        assert_eq!(result.num_clusters(), 2);
        assert_eq!(result.noise_count(), 1);
        assert_eq!(result.label(2), None);
        assert_eq!(result.label(0), result.label(1));
        assert_eq!(result.label(3), result.label(4));
        assert_eq!(result.label(4), result.label(5));
        assert_ne!(result.label(0), result.label(3));
    }

    #[test]
    fn test_chain_connectivity() {
        // Each point within eps of the next; endpoints far apart.
        let points: Vec<(f64, f64)> = (0..10).map(|i| (10.0 + i as f64 * 0.008, 70.0)).collect();
        let result = clusterer().cluster(&points);
        assert_eq!(result.num_clusters(), 1);
        assert_eq!(result.noise_count(), 0);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // With min_points = 3, (0.018) only sees itself and (0.009): border, not core.
        let points = vec![(0.0, 0.0), (0.0, 0.005), (0.0, 0.009), (0.0, 0.018)];
        let result = SpatialClusterer::new(0.01, 3).cluster(&points);
        assert_eq!(result.num_clusters(), 1);
        assert_eq!(result.label(3), Some(0));
    }

    #[test]
    fn test_distance_at_eps_is_inclusive() {
        let result = clusterer().cluster(&[(0.0, 0.0), (0.0, 0.01)]);
        assert_eq!(result.num_clusters(), 1);
        let result = clusterer().cluster(&[(0.0, 0.0), (0.0, 0.02)]);
        assert_eq!(result.num_clusters(), 0);
    }

    #[test]
    fn test_contested_border_point_keeps_first_cluster() {
        // (0.0, 0.009) is within eps of both cores but is not a core itself
        let points = vec![
            (0.0, 0.0),
            (0.0, -0.002),
            (0.0, -0.004),
            (0.0, 0.009),
            (0.0, 0.018),
            (0.0, 0.020),
            (0.0, 0.022),
        ];
        let result = SpatialClusterer::new(0.01, 4).cluster(&points);
        assert_eq!(result.num_clusters(), 2);
        assert_eq!(result.label(3), Some(0));
        assert_eq!(result.label(4), Some(1));
        assert_eq!(result.label(6), Some(1));
        assert_eq!(result.noise_count(), 0);
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let points = vec![
            (12.900, 77.590),
            (19.070, 72.870),
            (12.901, 77.591),
            (19.071, 72.871),
        ];
        let first = clusterer().cluster(&points);
        let second = clusterer().cluster(&points);
        assert_eq!(first, second);
    }
}
