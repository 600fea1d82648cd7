//! Shared fixtures for unit and integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dispatch::{CreateRideRequest, DispatchEngine};
use crate::events::MemoryEventSink;
use crate::idempotency::IdempotencyGuard;
use crate::lifecycle::{LifecycleController, RegisterDriverRequest};
use crate::model::{City, DriverId, DriverStatus, GeoPoint, PassengerId, TenantId};
use crate::payments::{ChargeError, ChargeGateway, PaymentProcessor, SimulatedChargeGateway};
use crate::spatial::DriverGeoIndex;
use crate::store::MemoryStore;

/// Pickup used across tests: lower Manhattan.
pub const TEST_PICKUP: GeoPoint = GeoPoint {
    lat: 40.7128,
    lon: -74.0060,
};

/// Dropoff used across tests: Times Square.
pub const TEST_DROPOFF: GeoPoint = GeoPoint {
    lat: 40.7589,
    lon: -73.9851,
};

pub const TEST_CITY: City = City::Mumbai;

/// A fully wired engine over shared in-memory collaborators, with a capturing
/// event sink and a counting charge gateway.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub geo: Arc<DriverGeoIndex>,
    pub guard: Arc<IdempotencyGuard>,
    pub events: Arc<MemoryEventSink>,
    pub gateway: Arc<CountingChargeGateway>,
    pub dispatch: DispatchEngine,
    pub lifecycle: LifecycleController,
    pub payments: PaymentProcessor,
}

pub fn harness() -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let geo = Arc::new(DriverGeoIndex::new());
    let guard = Arc::new(IdempotencyGuard::new());
    let events = Arc::new(MemoryEventSink::new());
    let gateway = Arc::new(CountingChargeGateway::default());

    let dispatch = DispatchEngine::new(
        store.clone(),
        geo.clone(),
        guard.clone(),
        events.clone(),
    );
    let lifecycle = LifecycleController::new(store.clone(), geo.clone(), events.clone());
    let payments = PaymentProcessor::new(store.clone(), guard.clone(), gateway.clone());

    TestHarness {
        store,
        geo,
        guard,
        events,
        gateway,
        dispatch,
        lifecycle,
        payments,
    }
}

static NEXT_PHONE: AtomicUsize = AtomicUsize::new(0);

pub fn register_driver_request() -> RegisterDriverRequest {
    let n = NEXT_PHONE.fetch_add(1, Ordering::Relaxed);
    RegisterDriverRequest {
        tenant_id: TenantId::new(),
        name: format!("driver-{n}"),
        phone_number: format!("+91-90000{n:05}"),
        license_number: format!("KA-{n:05}"),
        vehicle_model: "Swift".to_owned(),
        vehicle_plate_number: format!("KA-01-{n:04}"),
    }
}

/// Registers a driver, brings it ONLINE and reports a location so it is
/// geo-matchable at `point`.
pub fn online_driver(harness: &TestHarness, city: City, point: GeoPoint) -> DriverId {
    let driver = harness
        .lifecycle
        .register_driver(register_driver_request())
        .expect("register driver");
    harness
        .lifecycle
        .update_driver_status(driver.id, DriverStatus::Online)
        .expect("set online");
    harness
        .lifecycle
        .update_driver_location(driver.id, point.lat, point.lon, city)
        .expect("report location");
    driver.id
}

pub fn create_ride_request(
    passenger_id: PassengerId,
    idempotency_key: Option<&str>,
) -> CreateRideRequest {
    CreateRideRequest {
        passenger_id,
        pickup: TEST_PICKUP,
        dropoff: Some(TEST_DROPOFF),
        pickup_address: Some("City Hall".to_owned()),
        dropoff_address: Some("Times Square".to_owned()),
        city: TEST_CITY,
        idempotency_key: idempotency_key.map(str::to_owned),
    }
}

/// Delegates to the simulated gateway while counting charge attempts, for
/// at-most-once assertions.
#[derive(Debug, Default)]
pub struct CountingChargeGateway {
    inner: SimulatedChargeGateway,
    charges: AtomicUsize,
}

impl CountingChargeGateway {
    pub fn charges(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

impl ChargeGateway for CountingChargeGateway {
    fn charge(&self, payment: &crate::model::Payment) -> Result<String, ChargeError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        self.inner.charge(payment)
    }
}

/// Gateway that rejects every charge, for failure-path tests.
#[derive(Debug, Default)]
pub struct FailingChargeGateway;

impl ChargeGateway for FailingChargeGateway {
    fn charge(&self, _payment: &crate::model::Payment) -> Result<String, ChargeError> {
        Err(ChargeError("card declined".to_owned()))
    }
}
