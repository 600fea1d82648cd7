use dispatch_core::errors::DispatchError;
use dispatch_core::events::RideEventKind;
use dispatch_core::model::{DriverStatus, GeoPoint, PassengerId, RideStatus};
use dispatch_core::pricing::{BASE_FARE, PER_KM_FARE};
use dispatch_core::store::lock_record;
use dispatch_core::test_helpers::{
    create_ride_request, harness, online_driver, TEST_CITY, TEST_PICKUP,
};

#[test]
fn ride_without_nearby_drivers_is_pending_with_base_plus_distance_fare() {
    let h = harness();
    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");

    assert_eq!(ride.status, RideStatus::Pending);
    assert_eq!(ride.driver_id, None);
    let expected_fare = BASE_FARE + PER_KM_FARE * ((40.7589f64 - 40.7128).abs() * 111.0);
    assert!((ride.estimated_fare - expected_fare).abs() < 1e-9);

    let created = h.events.events_of_kind(RideEventKind::Created);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].ride_id, ride.id);
    assert_eq!(created[0].driver_id, None);
}

#[test]
fn ride_is_assigned_to_a_nearby_online_driver() {
    let h = harness();
    let driver_id = online_driver(&h, TEST_CITY, TEST_PICKUP);

    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");

    assert_eq!(ride.status, RideStatus::Assigned);
    assert_eq!(ride.driver_id, Some(driver_id));

    let driver = h.store.drivers().get(&driver_id).expect("driver");
    assert_eq!(driver.status, DriverStatus::InRide);
    assert!(!h.geo.contains(TEST_CITY, driver_id), "assigned driver must leave the geo index");

    let created = h.events.events_of_kind(RideEventKind::Created);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].driver_id, Some(driver_id));
}

#[test]
fn drivers_beyond_match_radius_are_not_assigned() {
    let h = harness();
    // ~11km north of the pickup, outside the 5km match radius.
    let far = GeoPoint::new(TEST_PICKUP.lat + 0.1, TEST_PICKUP.lon);
    online_driver(&h, TEST_CITY, far);

    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");
    assert_eq!(ride.status, RideStatus::Pending);
}

#[test]
fn stale_geo_entries_are_filtered_by_the_status_recheck() {
    let h = harness();
    let driver_id = online_driver(&h, TEST_CITY, TEST_PICKUP);

    // Flip the authoritative record to OFFLINE without touching the geo
    // index, simulating a lagging index entry.
    {
        let cell = h.store.drivers().cell(&driver_id).expect("driver cell");
        lock_record(&cell).status = DriverStatus::Offline;
    }
    assert!(h.geo.contains(TEST_CITY, driver_id));

    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");
    assert_eq!(ride.status, RideStatus::Pending);
    assert_eq!(ride.driver_id, None);
}

#[test]
fn replayed_idempotency_key_returns_the_original_ride_once() {
    let h = harness();
    let passenger = PassengerId::new();

    let first = h
        .dispatch
        .create_ride(create_ride_request(passenger, Some("req-1")))
        .expect("first create");
    let second = h
        .dispatch
        .create_ride(create_ride_request(passenger, Some("req-1")))
        .expect("replay");

    assert_eq!(first.id, second.id);
    assert_eq!(h.store.rides().len(), 1);
    assert_eq!(h.events.events_of_kind(RideEventKind::Created).len(), 1);
}

#[test]
fn same_key_under_different_passengers_creates_two_rides() {
    let h = harness();
    let first = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), Some("req-1")))
        .expect("create");
    let second = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), Some("req-1")))
        .expect("create");
    assert_ne!(first.id, second.id);
}

#[test]
fn blank_idempotency_key_never_short_circuits() {
    let h = harness();
    let passenger = PassengerId::new();
    let first = h
        .dispatch
        .create_ride(create_ride_request(passenger, Some("  ")))
        .expect("create");
    let second = h
        .dispatch
        .create_ride(create_ride_request(passenger, Some("  ")))
        .expect("create");
    assert_ne!(first.id, second.id);
    assert_eq!(h.store.rides().len(), 2);
}

#[test]
fn processed_key_with_missing_ride_is_a_consistency_error() {
    let h = harness();
    let passenger = PassengerId::new();
    // Guard claims the key was processed, but no ride record exists.
    h.guard.mark_processed(
        &passenger.to_string(),
        "req-ghost",
        dispatch_core::model::RideId::new().as_uuid(),
    );

    let err = h
        .dispatch
        .create_ride(create_ride_request(passenger, Some("req-ghost")))
        .expect_err("consistency error");
    assert!(matches!(err, DispatchError::NotFound { .. }));
}

#[test]
fn out_of_range_pickup_is_a_validation_error() {
    let h = harness();
    let mut request = create_ride_request(PassengerId::new(), None);
    request.pickup = GeoPoint::new(95.0, 0.0);
    let err = h.dispatch.create_ride(request).expect_err("validation");
    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(h.store.rides().is_empty());
}

#[test]
fn get_ride_returns_not_found_for_unknown_id() {
    let h = harness();
    let err = h
        .dispatch
        .get_ride(dispatch_core::model::RideId::new())
        .expect_err("missing ride");
    assert!(matches!(err, DispatchError::NotFound { .. }));
}
