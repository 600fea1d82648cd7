//! Ride creation: candidate selection, fare estimation, persistence and the
//! CREATED event.

use std::sync::Arc;

use chrono::Utc;

use crate::errors::{DispatchError, Result};
use crate::events::{publish_best_effort, EventSink, RideEvent, RideEventKind};
use crate::idempotency::{usable_key, IdempotencyGuard};
use crate::model::{City, Driver, DriverStatus, GeoPoint, PassengerId, Ride, RideId, RideStatus};
use crate::pricing::estimate_fare;
use crate::spatial::{validate_coordinates, DriverGeoIndex, MATCH_RADIUS_KM};
use crate::store::{lock_record, MemoryStore};

#[derive(Debug, Clone)]
pub struct CreateRideRequest {
    pub passenger_id: PassengerId,
    pub pickup: GeoPoint,
    pub dropoff: Option<GeoPoint>,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub city: City,
    pub idempotency_key: Option<String>,
}

/// Matches new ride requests against the geo index and creates the ride
/// record. Collaborators are passed in at construction.
pub struct DispatchEngine {
    store: Arc<MemoryStore>,
    geo: Arc<DriverGeoIndex>,
    guard: Arc<IdempotencyGuard>,
    events: Arc<dyn EventSink>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<MemoryStore>,
        geo: Arc<DriverGeoIndex>,
        guard: Arc<IdempotencyGuard>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            geo,
            guard,
            events,
        }
    }

    /// Creates a ride, assigning the first nearby driver whose authoritative
    /// record still shows ONLINE. Re-delivery of a request carrying an
    /// already-processed idempotency key returns the original ride and emits
    /// nothing.
    pub fn create_ride(&self, request: CreateRideRequest) -> Result<Ride> {
        if let Some(key) = usable_key(request.idempotency_key.as_deref()) {
            let scope = request.passenger_id.to_string();
            if self.guard.is_processed(&scope, key) {
                return self
                    .store
                    .ride_by_idempotency_key(request.passenger_id, key)
                    .ok_or_else(|| {
                        tracing::error!(
                            passenger_id = %request.passenger_id,
                            idempotency_key = key,
                            "idempotency key marked processed but ride is missing"
                        );
                        DispatchError::not_found("ride", key)
                    });
            }
        }

        validate_coordinates(request.pickup.lat, request.pickup.lon)?;
        if let Some(dropoff) = request.dropoff {
            validate_coordinates(dropoff.lat, dropoff.lon)?;
        }

        // Geo membership is a hint; the authoritative status lives on the
        // driver record and is re-checked under its lock. The first candidate
        // that passes the re-check wins, and the rest of ride creation runs
        // while that lock is held so a concurrent acceptance of the same
        // driver observes either ONLINE or the committed IN_RIDE.
        let candidates = self.geo.query_radius(
            request.city,
            request.pickup.lat,
            request.pickup.lon,
            MATCH_RADIUS_KM,
        )?;
        for candidate in candidates {
            let Some(cell) = self.store.drivers().cell(&candidate) else {
                continue;
            };
            let mut driver = lock_record(&cell);
            if driver.status == DriverStatus::Online {
                return self.persist_ride(request, Some(&mut driver));
            }
        }
        self.persist_ride(request, None)
    }

    /// Steps 3-6 of ride creation. When a driver was matched its record lock
    /// is still held, making the ride insert, driver transition and geo
    /// removal atomic with respect to concurrent operations on that driver.
    fn persist_ride(
        &self,
        request: CreateRideRequest,
        matched: Option<&mut Driver>,
    ) -> Result<Ride> {
        let estimated_fare = estimate_fare(request.pickup, request.dropoff);
        let ride = Ride {
            id: RideId::new(),
            passenger_id: request.passenger_id,
            driver_id: matched.as_ref().map(|driver| driver.id),
            status: if matched.is_some() {
                RideStatus::Assigned
            } else {
                RideStatus::Pending
            },
            pickup: request.pickup,
            dropoff: request.dropoff,
            pickup_address: request.pickup_address,
            dropoff_address: request.dropoff_address,
            estimated_fare,
            actual_fare: None,
            idempotency_key: usable_key(request.idempotency_key.as_deref()).map(str::to_owned),
            city: request.city,
            created_at: Utc::now(),
        };
        self.store.rides().insert(ride.id, ride.clone());

        if let Some(driver) = matched {
            driver.status = DriverStatus::InRide;
            // An IN_RIDE driver must never be geo-matchable.
            if let Some(city) = driver.city {
                self.geo.remove(city, driver.id);
            }
        }

        if let Some(key) = ride.idempotency_key.as_deref() {
            self.guard
                .mark_processed(&ride.passenger_id.to_string(), key, ride.id.as_uuid());
        }

        publish_best_effort(
            self.events.as_ref(),
            &RideEvent::from_ride(&ride, RideEventKind::Created),
        );
        tracing::info!(
            ride_id = %ride.id,
            passenger_id = %ride.passenger_id,
            driver_id = ?ride.driver_id,
            status = %ride.status,
            "created ride"
        );
        Ok(ride)
    }

    pub fn get_ride(&self, ride_id: RideId) -> Result<Ride> {
        self.store
            .rides()
            .get(&ride_id)
            .ok_or_else(|| DispatchError::not_found("ride", ride_id))
    }
}
