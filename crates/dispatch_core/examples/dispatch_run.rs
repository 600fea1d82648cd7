//! Drive one ride end to end: register a driver, match a request, run the
//! trip and charge the fare.
//!
//! Run with: cargo run -p dispatch_core --example dispatch_run

use std::sync::Arc;

use dispatch_core::dispatch::{CreateRideRequest, DispatchEngine};
use dispatch_core::events::JsonLogSink;
use dispatch_core::idempotency::IdempotencyGuard;
use dispatch_core::lifecycle::{LifecycleController, RegisterDriverRequest};
use dispatch_core::model::{City, DriverStatus, GeoPoint, PassengerId};
use dispatch_core::payments::{CreatePaymentRequest, PaymentProcessor, SimulatedChargeGateway};
use dispatch_core::spatial::DriverGeoIndex;
use dispatch_core::store::MemoryStore;
use dispatch_core::tenancy::TenantDirectory;

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let store = Arc::new(MemoryStore::new());
    let geo = Arc::new(DriverGeoIndex::new());
    let guard = Arc::new(IdempotencyGuard::new());
    let events = Arc::new(JsonLogSink);

    let dispatch = DispatchEngine::new(store.clone(), geo.clone(), guard.clone(), events.clone());
    let lifecycle = LifecycleController::new(store.clone(), geo.clone(), events.clone());
    let payments = PaymentProcessor::new(
        store.clone(),
        guard.clone(),
        Arc::new(SimulatedChargeGateway),
    );
    let tenants = TenantDirectory::new(store.clone());

    let tenant = tenants.register_tenant(
        "acme-cabs".to_owned(),
        Some("ops@acme.example".to_owned()),
    );
    let driver = lifecycle
        .register_driver(RegisterDriverRequest {
            tenant_id: tenant.id,
            name: "Asha".to_owned(),
            phone_number: "+91-9000000001".to_owned(),
            license_number: "MH-01-2020".to_owned(),
            vehicle_model: "Swift".to_owned(),
            vehicle_plate_number: "MH-01-AB-1234".to_owned(),
        })
        .expect("register driver");
    lifecycle
        .update_driver_status(driver.id, DriverStatus::Online)
        .expect("driver online");
    lifecycle
        .update_driver_location(driver.id, 19.0760, 72.8777, City::Mumbai)
        .expect("driver location");

    let ride = dispatch
        .create_ride(CreateRideRequest {
            passenger_id: PassengerId::new(),
            pickup: GeoPoint::new(19.0765, 72.8770),
            dropoff: Some(GeoPoint::new(19.1136, 72.8697)),
            pickup_address: Some("Gateway of India".to_owned()),
            dropoff_address: Some("Andheri".to_owned()),
            city: City::Mumbai,
            idempotency_key: Some("demo-ride-1".to_owned()),
        })
        .expect("create ride");
    println!(
        "ride {} -> {} (driver {:?}, estimated fare {:.2})",
        ride.id, ride.status, ride.driver_id, ride.estimated_fare
    );

    let trip = lifecycle.start_trip(ride.id).expect("start trip");
    let trip = lifecycle.end_trip(trip.id).expect("end trip");
    println!(
        "trip {} -> {} (distance {:.2} km)",
        trip.id,
        trip.status,
        trip.distance_km.unwrap_or(0.0)
    );

    let payment = payments
        .create_payment(CreatePaymentRequest {
            ride_id: ride.id,
            payment_method: Some("card".to_owned()),
            idempotency_key: Some("demo-pay-1".to_owned()),
        })
        .expect("create payment");
    println!(
        "payment {} -> {} (txn {})",
        payment.id,
        payment.status,
        payment.transaction_id.as_deref().unwrap_or("-")
    );
}
