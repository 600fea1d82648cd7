//! Ride history queries for drivers and tenants.

use std::sync::Arc;

use crate::errors::{DispatchError, Result};
use crate::model::{Driver, DriverId, Ride, TenantId};
use crate::store::MemoryStore;

/// A driver together with the rides it has served, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverDetail {
    pub driver: Driver,
    pub rides: Vec<Ride>,
}

pub struct HistoryService {
    store: Arc<MemoryStore>,
}

impl HistoryService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Rides served by the driver, newest first.
    pub fn driver_ride_history(&self, driver_id: DriverId) -> Vec<Ride> {
        self.store.rides_by_driver(driver_id)
    }

    /// Rides served by any driver of the tenant, newest first.
    pub fn tenant_ride_history(&self, tenant_id: TenantId) -> Vec<Ride> {
        self.store.rides_by_tenant(tenant_id)
    }

    pub fn driver_detail(&self, driver_id: DriverId) -> Result<DriverDetail> {
        let driver = self
            .store
            .drivers()
            .get(&driver_id)
            .ok_or_else(|| DispatchError::not_found("driver", driver_id))?;
        let rides = self.store.rides_by_driver(driver_id);
        Ok(DriverDetail { driver, rides })
    }
}
