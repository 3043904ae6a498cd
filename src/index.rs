//! Index maps over the event arena
//!
//! Events stay in one ordered vector; groups are lists of indices into it,
//! built in a single pass.

use std::collections::{BTreeMap, HashMap};

use crate::clustering::ClusterAssignment;
use crate::types::{ClusterId, RawEvent};

/// Events grouped by user and by cluster
#[derive(Debug, Clone, Default)]
pub struct EventIndex {
    /// Users in first-appearance order with their event indices
    users: Vec<(String, Vec<usize>)>,
    user_positions: HashMap<String, usize>,
    /// Non-noise clusters, ascending id
    clusters: BTreeMap<ClusterId, Vec<usize>>,
}

impl EventIndex {
    pub fn build(events: &[RawEvent], assignment: &ClusterAssignment) -> Self {
        let mut index = EventIndex::default();

        for (i, event) in events.iter().enumerate() {
            let position = match index.user_positions.get(&event.user_id) {
                Some(&p) => p,
                None => {
                    index.users.push((event.user_id.clone(), Vec::new()));
                    let p = index.users.len() - 1;
                    index.user_positions.insert(event.user_id.clone(), p);
                    p
                }
            };
            index.users[position].1.push(i);

            if let Some(cluster_id) = assignment.label(i) {
                index.clusters.entry(cluster_id).or_default().push(i);
            }
        }

        index
    }

    /// Users in first-appearance order
    pub fn users(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.users.iter().map(|(u, idx)| (u.as_str(), idx.as_slice()))
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Non-noise clusters in ascending id order
    pub fn clusters(&self) -> impl Iterator<Item = (ClusterId, &[usize])> {
        self.clusters.iter().map(|(&c, idx)| (c, idx.as_slice()))
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }
}

/// Split a set of event indices by cluster, dropping noise. Ascending cluster id.
pub fn group_by_cluster(
    indices: &[usize],
    assignment: &ClusterAssignment,
) -> BTreeMap<ClusterId, Vec<usize>> {
    let mut groups: BTreeMap<ClusterId, Vec<usize>> = BTreeMap::new();
    for &i in indices {
        if let Some(cluster_id) = assignment.label(i) {
            groups.entry(cluster_id).or_default().push(i);
        }
    }
    groups
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

    #[test]
    fn test_index_groups_users_and_clusters() {
        let events = vec![
            event("B", 12.900, 77.590),
            event("A", 12.901, 77.591),
            event("B", 40.000, 10.000),
            event("A", 19.070, 72.870),
            event("C", 19.071, 72.871),
        ];
        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(&events);
        let index = EventIndex::build(&events, &assignment);

        let users: Vec<&str> = index.users().map(|(u, _)| u).collect();
        assert_eq!(users, vec!["B", "A", "C"]);
        let b_events: Vec<usize> = index
            .users()
            .find(|(u, _)| *u == "B")
            .map(|(_, idx)| idx.to_vec())
            .unwrap();
        assert_eq!(b_events, vec![0, 2]);

        assert_eq!(index.cluster_count(), 2);
        let clusters: Vec<(ClusterId, Vec<usize>)> =
            index.clusters().map(|(c, idx)| (c, idx.to_vec())).collect();
        assert_eq!(clusters, vec![(0, vec![0, 1]), (1, vec![3, 4])]);
    }

    #[test]
    fn test_group_by_cluster_skips_noise() {
        let events = vec![
            event("A", 12.900, 77.590),
            event("A", 50.000, 50.000),
            event("B", 12.901, 77.590),
        ];
        let assignment = SpatialClusterer::new(0.01, 2).cluster_events(&events);
        let groups = group_by_cluster(&[0, 1], &assignment);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&0], vec![0]);
    }
}
