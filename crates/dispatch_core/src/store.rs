//! In-memory record store: the persistence collaborator of the engine.
//!
//! Each record lives in its own `Arc<Mutex<_>>` cell, which gives the two
//! access modes every operation needs: a point-lookup snapshot (clone) and a
//! lock-and-fetch handle held across a mutation. Secondary queries are
//! scans, which is adequate for a single dispatch domain held in memory.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::errors::{DispatchError, Result};
use crate::model::{
    Driver, DriverId, Payment, PaymentId, PassengerId, Ride, RideId, Tenant, TenantId, Trip,
    TripId,
};

/// Locks a record cell, recovering the data if a previous holder panicked.
pub fn lock_record<T>(cell: &Mutex<T>) -> MutexGuard<'_, T> {
    match cell.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One table of records keyed by id.
#[derive(Debug)]
pub struct RecordTable<K, V> {
    cells: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K, V> RecordTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    fn map_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<K, Arc<Mutex<V>>>> {
        match self.cells.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn map_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<K, Arc<Mutex<V>>>> {
        match self.cells.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.map_write().insert(key, Arc::new(Mutex::new(value)));
    }

    /// Point-lookup snapshot of the current record state.
    pub fn get(&self, key: &K) -> Option<V> {
        let cell = self.map_read().get(key).cloned()?;
        let value = lock_record(&cell).clone();
        Some(value)
    }

    /// Lock-and-fetch handle. The caller holds the returned cell's mutex for
    /// the duration of its mutation.
    pub fn cell(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.map_read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map_read().contains_key(key)
    }

    /// Snapshot of every record, for scan-backed queries.
    pub fn snapshot_all(&self) -> Vec<V> {
        self.map_read()
            .values()
            .map(|cell| lock_record(cell).clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map_read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map_read().is_empty()
    }
}

/// The full record store: one table per entity plus the secondary queries the
/// engine needs.
#[derive(Debug)]
pub struct MemoryStore {
    drivers: RecordTable<DriverId, Driver>,
    rides: RecordTable<RideId, Ride>,
    trips: RecordTable<TripId, Trip>,
    payments: RecordTable<PaymentId, Payment>,
    tenants: RecordTable<TenantId, Tenant>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            drivers: RecordTable::new(),
            rides: RecordTable::new(),
            trips: RecordTable::new(),
            payments: RecordTable::new(),
            tenants: RecordTable::new(),
        }
    }

    pub fn drivers(&self) -> &RecordTable<DriverId, Driver> {
        &self.drivers
    }

    pub fn rides(&self) -> &RecordTable<RideId, Ride> {
        &self.rides
    }

    pub fn trips(&self) -> &RecordTable<TripId, Trip> {
        &self.trips
    }

    pub fn payments(&self) -> &RecordTable<PaymentId, Payment> {
        &self.payments
    }

    pub fn tenants(&self) -> &RecordTable<TenantId, Tenant> {
        &self.tenants
    }

    pub fn driver_by_phone(&self, phone_number: &str) -> Option<Driver> {
        self.drivers
            .snapshot_all()
            .into_iter()
            .find(|driver| driver.phone_number == phone_number)
    }

    pub fn drivers_by_tenant(&self, tenant_id: TenantId) -> Vec<Driver> {
        self.drivers
            .snapshot_all()
            .into_iter()
            .filter(|driver| driver.tenant_id == tenant_id)
            .collect()
    }

    /// Rides assigned to the driver, newest first.
    pub fn rides_by_driver(&self, driver_id: DriverId) -> Vec<Ride> {
        let mut rides: Vec<Ride> = self
            .rides
            .snapshot_all()
            .into_iter()
            .filter(|ride| ride.driver_id == Some(driver_id))
            .collect();
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rides
    }

    /// Rides served by any driver of the tenant, newest first.
    pub fn rides_by_tenant(&self, tenant_id: TenantId) -> Vec<Ride> {
        let tenant_drivers: Vec<DriverId> = self
            .drivers_by_tenant(tenant_id)
            .into_iter()
            .map(|driver| driver.id)
            .collect();
        let mut rides: Vec<Ride> = self
            .rides
            .snapshot_all()
            .into_iter()
            .filter(|ride| {
                ride.driver_id
                    .is_some_and(|driver| tenant_drivers.contains(&driver))
            })
            .collect();
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rides
    }

    /// The ride a processed idempotency key refers to, scoped to its
    /// passenger.
    pub fn ride_by_idempotency_key(&self, passenger_id: PassengerId, key: &str) -> Option<Ride> {
        self.rides.snapshot_all().into_iter().find(|ride| {
            ride.passenger_id == passenger_id && ride.idempotency_key.as_deref() == Some(key)
        })
    }

    pub fn payment_by_idempotency_key(&self, key: &str) -> Option<Payment> {
        self.payments
            .snapshot_all()
            .into_iter()
            .find(|payment| payment.idempotency_key.as_deref() == Some(key))
    }

    /// Inserts a payment, enforcing the unique constraint on its idempotency
    /// key. The check and the insert happen under the table write lock.
    pub fn insert_payment(&self, payment: Payment) -> Result<()> {
        let mut cells = self.payments.map_write();
        if let Some(key) = payment.idempotency_key.as_deref() {
            let duplicate = cells
                .values()
                .any(|cell| lock_record(cell).idempotency_key.as_deref() == Some(key));
            if duplicate {
                return Err(DispatchError::conflict(format!(
                    "payment already exists for idempotency key: {key}"
                )));
            }
        }
        cells.insert(payment.id, Arc::new(Mutex::new(payment)));
        Ok(())
    }

    pub fn tenant_by_name(&self, name: &str) -> Option<Tenant> {
        self.tenants
            .snapshot_all()
            .into_iter()
            .find(|tenant| tenant.name == name)
    }

    pub fn tenant_by_email(&self, email: &str) -> Option<Tenant> {
        self.tenants
            .snapshot_all()
            .into_iter()
            .find(|tenant| tenant.contact_email.as_deref() == Some(email))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
