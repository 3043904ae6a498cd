//! Numeric helpers over ordered sequences

use crate::types::BoundingBox;

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Weighted mean of `values`. Returns `None` when the weights sum to zero
/// (or the slices are empty) so callers can pick their own fallback.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    let total: f64 = weights.iter().sum();
    if values.is_empty() || total <= 0.0 {
        return None;
    }
    let acc: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    Some(acc / total)
}

/// Bounding box of `(lat, lon)` points, `None` when empty
pub fn bounding_box(points: &[(f64, f64)]) -> Option<BoundingBox> {
    let (first, rest) = points.split_first()?;
    let init = BoundingBox {
        min_lat: first.0,
        max_lat: first.0,
        min_lon: first.1,
        max_lon: first.1,
    };
    Some(rest.iter().fold(init, |bb, &(lat, lon)| BoundingBox {
        min_lat: bb.min_lat.min(lat),
        max_lat: bb.max_lat.max(lat),
        min_lon: bb.min_lon.min(lon),
        max_lon: bb.max_lon.max(lon),
    }))
}

/// Planar distance in degrees
pub fn planar_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
