//! Tenant registration and identity resolution by contact email.

use std::sync::Arc;

use chrono::Utc;

use crate::model::{DriverId, Tenant, TenantId};
use crate::store::MemoryStore;

/// Result of resolving an external contact email to a dispatch identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityResolution {
    pub tenant_id: TenantId,
    /// First registered driver of the tenant, if any.
    pub driver_id: Option<DriverId>,
}

pub struct TenantDirectory {
    store: Arc<MemoryStore>,
}

impl TenantDirectory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn register_tenant(&self, name: String, contact_email: Option<String>) -> Tenant {
        let tenant = Tenant {
            id: TenantId::new(),
            name,
            contact_email,
            created_at: Utc::now(),
        };
        self.store.tenants().insert(tenant.id, tenant.clone());
        tracing::info!(tenant_id = %tenant.id, name = %tenant.name, "registered tenant");
        tenant
    }

    pub fn find_by_id(&self, tenant_id: TenantId) -> Option<Tenant> {
        self.store.tenants().get(&tenant_id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<Tenant> {
        self.store.tenant_by_name(name)
    }

    /// Resolves a contact email to its tenant and that tenant's first
    /// registered driver, if one exists.
    pub fn resolve_identity(&self, email: &str) -> Option<IdentityResolution> {
        let tenant = self.store.tenant_by_email(email)?;
        let mut drivers = self.store.drivers_by_tenant(tenant.id);
        drivers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Some(IdentityResolution {
            tenant_id: tenant.id,
            driver_id: drivers.first().map(|driver| driver.id),
        })
    }
}
