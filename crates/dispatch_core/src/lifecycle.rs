//! Driver, ride and trip state machines and their locking discipline.
//!
//! Every state-changing operation locks the record it mutates before reading
//! it and holds the lock until related side-mutations are committed. Accept
//! locks Driver then Ride; trip end locks Trip, then Ride, then Driver. The
//! two orders cannot deadlock against each other: acceptance only proceeds
//! while it holds an ONLINE driver, and a STARTED trip's driver stays
//! IN_RIDE until trip end commits, so the operations never contend for the
//! same driver/ride pair in opposite orders.

use std::sync::Arc;

use chrono::Utc;

use crate::errors::{DispatchError, Result};
use crate::events::{publish_best_effort, EventSink, RideEvent, RideEventKind};
use crate::model::{
    City, Driver, DriverId, DriverStatus, GeoPoint, Position, Ride, RideId, RideStatus, TenantId,
    Trip, TripId, TripStatus,
};
use crate::spatial::{haversine_km, validate_coordinates, DriverGeoIndex};
use crate::store::{lock_record, MemoryStore};

#[derive(Debug, Clone)]
pub struct RegisterDriverRequest {
    pub tenant_id: TenantId,
    pub name: String,
    pub phone_number: String,
    pub license_number: String,
    pub vehicle_model: String,
    pub vehicle_plate_number: String,
}

/// Enforces the per-entity state machines: registration, status and location
/// updates, ride acceptance and cancellation, trip start and end.
pub struct LifecycleController {
    store: Arc<MemoryStore>,
    geo: Arc<DriverGeoIndex>,
    events: Arc<dyn EventSink>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<MemoryStore>,
        geo: Arc<DriverGeoIndex>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { store, geo, events }
    }

    /// Registers a new driver. Drivers start OFFLINE and become matchable via
    /// a status update plus a location update. Phone numbers are unique
    /// across the dispatch domain.
    pub fn register_driver(&self, request: RegisterDriverRequest) -> Result<Driver> {
        if self.store.driver_by_phone(&request.phone_number).is_some() {
            return Err(DispatchError::conflict(format!(
                "driver already exists with phone: {}",
                request.phone_number
            )));
        }
        let driver = Driver {
            id: DriverId::new(),
            tenant_id: request.tenant_id,
            name: request.name,
            phone_number: request.phone_number,
            license_number: request.license_number,
            vehicle_model: request.vehicle_model,
            vehicle_plate_number: request.vehicle_plate_number,
            status: DriverStatus::Offline,
            position: None,
            city: None,
            created_at: Utc::now(),
        };
        self.store.drivers().insert(driver.id, driver.clone());
        tracing::info!(driver_id = %driver.id, tenant_id = %driver.tenant_id, "registered driver");
        Ok(driver)
    }

    /// Explicit status set. Only OFFLINE and ONLINE may be requested;
    /// IN_RIDE is managed by ride acceptance and trip end. Going offline
    /// removes the driver from the geo index; going online does not join it.
    /// The driver becomes matchable on its next location update.
    pub fn update_driver_status(
        &self,
        driver_id: DriverId,
        requested: DriverStatus,
    ) -> Result<Driver> {
        if requested == DriverStatus::InRide {
            return Err(DispatchError::validation(
                "IN_RIDE cannot be requested; it is set by ride acceptance",
            ));
        }
        let cell = self
            .store
            .drivers()
            .cell(&driver_id)
            .ok_or_else(|| DispatchError::not_found("driver", driver_id))?;
        let mut driver = lock_record(&cell);
        if driver.status == DriverStatus::InRide {
            return Err(DispatchError::invalid_state(format!(
                "driver {driver_id} is IN_RIDE; status changes resume after trip end"
            )));
        }
        let was_online = driver.status == DriverStatus::Online;
        driver.status = requested;
        if was_online && requested == DriverStatus::Offline {
            if let Some(city) = driver.city {
                self.geo.remove(city, driver_id);
            }
        }
        tracing::info!(driver_id = %driver_id, status = %requested, "updated driver status");
        Ok(driver.clone())
    }

    /// Stores the reported position and city unconditionally; an ONLINE
    /// driver is additionally upserted into the geo index, moving city
    /// buckets atomically when the city changed.
    pub fn update_driver_location(
        &self,
        driver_id: DriverId,
        lat: f64,
        lon: f64,
        city: City,
    ) -> Result<Driver> {
        validate_coordinates(lat, lon)?;
        let cell = self
            .store
            .drivers()
            .cell(&driver_id)
            .ok_or_else(|| DispatchError::not_found("driver", driver_id))?;
        let mut driver = lock_record(&cell);
        driver.position = Some(Position {
            point: GeoPoint::new(lat, lon),
            updated_at: Utc::now(),
        });
        driver.city = Some(city);
        if driver.status == DriverStatus::Online {
            self.geo.upsert(city, driver_id, lat, lon)?;
            tracing::debug!(driver_id = %driver_id, city = %city, "geo index updated");
        }
        tracing::info!(driver_id = %driver_id, lat, lon, "updated driver location");
        Ok(driver.clone())
    }

    /// Driver accepts a pending ride. Locks Driver then Ride; the loser of a
    /// race over either record observes the committed state and fails with
    /// InvalidState.
    pub fn accept_ride(&self, driver_id: DriverId, ride_id: RideId) -> Result<Ride> {
        let driver_cell = self
            .store
            .drivers()
            .cell(&driver_id)
            .ok_or_else(|| DispatchError::not_found("driver", driver_id))?;
        let mut driver = lock_record(&driver_cell);
        if driver.status != DriverStatus::Online {
            return Err(DispatchError::invalid_state(format!(
                "driver must be online to accept rides; status: {}",
                driver.status
            )));
        }

        let ride_cell = self
            .store
            .rides()
            .cell(&ride_id)
            .ok_or_else(|| DispatchError::not_found("ride", ride_id))?;
        let mut ride = lock_record(&ride_cell);
        if ride.status != RideStatus::Pending {
            return Err(DispatchError::invalid_state(format!(
                "ride is not available for acceptance; status: {}",
                ride.status
            )));
        }

        ride.driver_id = Some(driver_id);
        ride.status = RideStatus::Assigned;
        driver.status = DriverStatus::InRide;
        if let Some(city) = driver.city {
            self.geo.remove(city, driver_id);
        }

        tracing::info!(driver_id = %driver_id, ride_id = %ride_id, "driver accepted ride");
        Ok(ride.clone())
    }

    /// Creates the trip for an ASSIGNED ride and advances the ride to
    /// IN_PROGRESS.
    pub fn start_trip(&self, ride_id: RideId) -> Result<Trip> {
        let ride_cell = self
            .store
            .rides()
            .cell(&ride_id)
            .ok_or_else(|| DispatchError::not_found("ride", ride_id))?;
        let mut ride = lock_record(&ride_cell);
        if ride.status != RideStatus::Assigned {
            return Err(DispatchError::invalid_state(format!(
                "ride is not available for trip start; status: {}",
                ride.status
            )));
        }
        let driver_id = ride.driver_id.ok_or_else(|| {
            DispatchError::invalid_state(format!("assigned ride {ride_id} has no driver"))
        })?;

        let trip = Trip {
            id: TripId::new(),
            ride_id,
            driver_id,
            status: TripStatus::Started,
            started_at: Some(Utc::now()),
            completed_at: None,
            distance_km: None,
            duration_secs: None,
        };
        self.store.trips().insert(trip.id, trip.clone());
        ride.status = RideStatus::InProgress;

        tracing::info!(trip_id = %trip.id, ride_id = %ride_id, driver_id = %driver_id, "trip started");
        Ok(trip)
    }

    /// Completes a STARTED trip: records completion time and measurements,
    /// completes the ride, returns the driver to ONLINE and makes it
    /// geo-discoverable again, and publishes the COMPLETED ride event.
    /// Lock order: Trip, then Ride, then Driver.
    pub fn end_trip(&self, trip_id: TripId) -> Result<Trip> {
        let trip_cell = self
            .store
            .trips()
            .cell(&trip_id)
            .ok_or_else(|| DispatchError::not_found("trip", trip_id))?;
        let mut trip = lock_record(&trip_cell);
        if trip.status != TripStatus::Started {
            return Err(DispatchError::invalid_state(format!(
                "trip cannot be ended; status: {}",
                trip.status
            )));
        }

        let ride_cell = self
            .store
            .rides()
            .cell(&trip.ride_id)
            .ok_or_else(|| DispatchError::not_found("ride", trip.ride_id))?;
        let mut ride = lock_record(&ride_cell);

        let now = Utc::now();
        trip.status = TripStatus::Completed;
        trip.completed_at = Some(now);
        trip.duration_secs = trip.started_at.map(|started| (now - started).num_seconds());
        trip.distance_km = ride.dropoff.map(|dropoff| haversine_km(ride.pickup, dropoff));
        ride.status = RideStatus::Completed;

        if let Some(driver_cell) = self.store.drivers().cell(&trip.driver_id) {
            let mut driver = lock_record(&driver_cell);
            driver.status = DriverStatus::Online;
            if let (Some(city), Some(position)) = (driver.city, driver.position) {
                if let Err(err) =
                    self.geo
                        .upsert(city, driver.id, position.point.lat, position.point.lon)
                {
                    tracing::warn!(driver_id = %driver.id, error = %err, "geo rejoin failed");
                }
            }
            tracing::info!(driver_id = %driver.id, "driver returned to ONLINE");
        }

        publish_best_effort(
            self.events.as_ref(),
            &RideEvent::from_ride(&ride, RideEventKind::Completed),
        );
        tracing::info!(trip_id = %trip_id, ride_id = %ride.id, "trip completed");
        Ok(trip.clone())
    }

    /// Cancels a PENDING or ASSIGNED ride. An assigned driver returns to
    /// ONLINE and rejoins the geo index at its last reported position.
    pub fn cancel_ride(&self, ride_id: RideId) -> Result<Ride> {
        let ride_cell = self
            .store
            .rides()
            .cell(&ride_id)
            .ok_or_else(|| DispatchError::not_found("ride", ride_id))?;
        let mut ride = lock_record(&ride_cell);
        if !ride.status.is_cancellable() {
            return Err(DispatchError::invalid_state(format!(
                "ride cannot be cancelled; status: {}",
                ride.status
            )));
        }
        ride.status = RideStatus::Cancelled;

        if let Some(driver_id) = ride.driver_id {
            if let Some(driver_cell) = self.store.drivers().cell(&driver_id) {
                let mut driver = lock_record(&driver_cell);
                driver.status = DriverStatus::Online;
                if let (Some(city), Some(position)) = (driver.city, driver.position) {
                    if let Err(err) =
                        self.geo
                            .upsert(city, driver_id, position.point.lat, position.point.lon)
                    {
                        tracing::warn!(driver_id = %driver_id, error = %err, "geo rejoin failed");
                    }
                }
            }
        }

        publish_best_effort(
            self.events.as_ref(),
            &RideEvent::from_ride(&ride, RideEventKind::Cancelled),
        );
        tracing::info!(ride_id = %ride_id, "ride cancelled");
        Ok(ride.clone())
    }
}
