//! Per-city geospatial index of online drivers.
//!
//! Drivers are bucketed by H3 cell at resolution 9 (~240m cells). A radius
//! query expands a grid disk around the query point and filters candidates by
//! haversine distance. Membership is a candidate hint only: entries may lag
//! entity state, so callers re-check the authoritative driver record under
//! lock before committing a match.

use std::collections::HashMap;
use std::sync::RwLock;

use h3o::{CellIndex, LatLng, Resolution};

use crate::errors::{DispatchError, Result};
use crate::model::{City, DriverId, GeoPoint};

/// Match radius for ride dispatch.
pub const MATCH_RADIUS_KM: f64 = 5.0;

/// Conservative center-to-center cell spacing at resolution 9, used to size
/// the grid disk so it always covers the query radius.
const CELL_SPACING_KM: f64 = 0.25;

/// Great-circle distance between two coordinate pairs.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    6371.0 * c
}

/// Rejects NaN and out-of-range coordinates before they reach the index or a
/// stored record.
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
        return Err(DispatchError::validation(format!(
            "coordinates out of range: lat={lat}, lon={lon}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct IndexedDriver {
    cell: CellIndex,
    point: GeoPoint,
}

#[derive(Debug, Default)]
struct CityBucket {
    drivers_by_cell: HashMap<CellIndex, Vec<DriverId>>,
    driver_entries: HashMap<DriverId, IndexedDriver>,
}

impl CityBucket {
    fn insert(&mut self, driver: DriverId, entry: IndexedDriver) {
        self.remove(driver);
        self.drivers_by_cell.entry(entry.cell).or_default().push(driver);
        self.driver_entries.insert(driver, entry);
    }

    fn remove(&mut self, driver: DriverId) {
        if let Some(entry) = self.driver_entries.remove(&driver) {
            if let Some(members) = self.drivers_by_cell.get_mut(&entry.cell) {
                members.retain(|&d| d != driver);
                if members.is_empty() {
                    self.drivers_by_cell.remove(&entry.cell);
                }
            }
        }
    }
}

/// Shared geo index. Interior locking makes every operation atomic with
/// respect to concurrent queries: a driver moving between cities is removed
/// from the old bucket and inserted into the new one under a single write
/// lock, so no query observes the driver in both cities or in neither.
#[derive(Debug)]
pub struct DriverGeoIndex {
    resolution: Resolution,
    cities: RwLock<HashMap<City, CityBucket>>,
}

impl DriverGeoIndex {
    pub fn new() -> Self {
        Self {
            resolution: Resolution::Nine,
            cities: RwLock::new(HashMap::new()),
        }
    }

    fn cell_for(&self, lat: f64, lon: f64) -> Result<CellIndex> {
        validate_coordinates(lat, lon)?;
        let coord = LatLng::new(lat, lon)
            .map_err(|err| DispatchError::validation(format!("invalid coordinates: {err}")))?;
        Ok(coord.to_cell(self.resolution))
    }

    /// Adds or moves a driver. A driver lives in at most one city bucket; an
    /// upsert into a new city removes the old membership in the same write
    /// section.
    pub fn upsert(&self, city: City, driver: DriverId, lat: f64, lon: f64) -> Result<()> {
        let cell = self.cell_for(lat, lon)?;
        let entry = IndexedDriver {
            cell,
            point: GeoPoint::new(lat, lon),
        };
        let mut cities = match self.cities.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (other_city, bucket) in cities.iter_mut() {
            if *other_city != city {
                bucket.remove(driver);
            }
        }
        cities.entry(city).or_default().insert(driver, entry);
        Ok(())
    }

    pub fn remove(&self, city: City, driver: DriverId) {
        let mut cities = match self.cities.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(bucket) = cities.get_mut(&city) {
            bucket.remove(driver);
        }
    }

    /// Drivers within `radius_km` of the query point, scoped to one city.
    /// Order is unspecified; callers treat the result as a candidate pool.
    pub fn query_radius(
        &self,
        city: City,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<DriverId>> {
        let origin = self.cell_for(lat, lon)?;
        let center = GeoPoint::new(lat, lon);
        let rings = (radius_km / CELL_SPACING_KM).ceil() as u32 + 1;

        let cities = match self.cities.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(bucket) = cities.get(&city) else {
            return Ok(Vec::new());
        };

        let mut matches = Vec::new();
        for cell in origin.grid_disk::<Vec<_>>(rings) {
            let Some(members) = bucket.drivers_by_cell.get(&cell) else {
                continue;
            };
            for driver in members {
                if let Some(entry) = bucket.driver_entries.get(driver) {
                    if haversine_km(center, entry.point) <= radius_km {
                        matches.push(*driver);
                    }
                }
            }
        }
        Ok(matches)
    }

    /// Membership check, used by tests and invariant assertions.
    pub fn contains(&self, city: City, driver: DriverId) -> bool {
        let cities = match self.cities.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cities
            .get(&city)
            .is_some_and(|bucket| bucket.driver_entries.contains_key(&driver))
    }
}

impl Default for DriverGeoIndex {
    fn default() -> Self {
        Self::new()
    }
}
