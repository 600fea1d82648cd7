//! Fare estimation for new rides.

use crate::model::GeoPoint;

/// Base fare in currency units.
pub const BASE_FARE: f64 = 2.50;

/// Per-kilometer rate in currency units.
pub const PER_KM_FARE: f64 = 1.20;

/// Kilometers per degree of latitude. The estimator uses the latitude delta
/// only, a known coarse approximation kept as documented behavior rather
/// than a geodesic distance.
const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Latitude-delta distance between pickup and dropoff.
pub fn approx_distance_km(pickup: GeoPoint, dropoff: GeoPoint) -> f64 {
    (dropoff.lat - pickup.lat).abs() * KM_PER_DEGREE_LAT
}

/// Estimated fare for a ride request.
///
/// Formula: `BASE_FARE + PER_KM_FARE * approx_distance_km` when the dropoff
/// is known, base fare alone otherwise.
pub fn estimate_fare(pickup: GeoPoint, dropoff: Option<GeoPoint>) -> f64 {
    match dropoff {
        Some(dropoff) => BASE_FARE + PER_KM_FARE * approx_distance_km(pickup, dropoff),
        None => BASE_FARE,
    }
}
