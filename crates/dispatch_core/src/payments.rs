//! Payment creation against a ride's fare, guarded for safe retries.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::errors::{DispatchError, Result};
use crate::idempotency::{usable_key, IdempotencyGuard};
use crate::model::{Payment, PaymentId, PaymentStatus, RideId};
use crate::store::{lock_record, MemoryStore};

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub ride_id: RideId,
    pub payment_method: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Error)]
#[error("charge failed: {0}")]
pub struct ChargeError(pub String);

/// External charge operation. Once started it runs to completion; callers
/// needing timeout behavior wrap the call externally.
pub trait ChargeGateway: Send + Sync {
    fn charge(&self, payment: &Payment) -> std::result::Result<String, ChargeError>;
}

/// Stand-in for a real payment provider; always succeeds and returns a
/// generated transaction id.
#[derive(Debug, Default)]
pub struct SimulatedChargeGateway;

impl ChargeGateway for SimulatedChargeGateway {
    fn charge(&self, _payment: &Payment) -> std::result::Result<String, ChargeError> {
        Ok(format!("txn-{:016x}", rand::random::<u64>()))
    }
}

/// Creates and advances payments. A payment runs PENDING → PROCESSING →
/// COMPLETED, or → FAILED with the reason recorded before the error is
/// re-raised.
pub struct PaymentProcessor {
    store: Arc<MemoryStore>,
    guard: Arc<IdempotencyGuard>,
    gateway: Arc<dyn ChargeGateway>,
}

impl PaymentProcessor {
    pub fn new(
        store: Arc<MemoryStore>,
        guard: Arc<IdempotencyGuard>,
        gateway: Arc<dyn ChargeGateway>,
    ) -> Self {
        Self {
            store,
            guard,
            gateway,
        }
    }

    /// Charges the ride's estimated fare. A replayed idempotency key returns
    /// the original payment without touching the gateway again; keys are
    /// scoped by ride id.
    pub fn create_payment(&self, request: CreatePaymentRequest) -> Result<Payment> {
        let ride_cell = self
            .store
            .rides()
            .cell(&request.ride_id)
            .ok_or_else(|| DispatchError::not_found("ride", request.ride_id))?;
        // Held for the whole operation; concurrent payment attempts against
        // the same ride serialize here.
        let ride = lock_record(&ride_cell);

        let scope = ride.id.to_string();
        if let Some(key) = usable_key(request.idempotency_key.as_deref()) {
            if self.guard.is_processed(&scope, key) {
                return self.store.payment_by_idempotency_key(key).ok_or_else(|| {
                    tracing::error!(
                        ride_id = %ride.id,
                        idempotency_key = key,
                        "idempotency key marked processed but payment is missing"
                    );
                    DispatchError::not_found("payment", key)
                });
            }
        }

        let payment = Payment {
            id: PaymentId::new(),
            ride_id: ride.id,
            passenger_id: ride.passenger_id,
            amount: ride.estimated_fare,
            status: PaymentStatus::Pending,
            payment_method: request.payment_method.clone(),
            transaction_id: None,
            idempotency_key: usable_key(request.idempotency_key.as_deref()).map(str::to_owned),
            processed_at: None,
            failure_reason: None,
            created_at: Utc::now(),
        };
        self.store.insert_payment(payment.clone())?;
        let payment_cell = self
            .store
            .payments()
            .cell(&payment.id)
            .ok_or_else(|| DispatchError::not_found("payment", payment.id))?;
        let mut payment = lock_record(&payment_cell);
        payment.status = PaymentStatus::Processing;

        match self.gateway.charge(&payment) {
            Ok(transaction_id) => {
                payment.status = PaymentStatus::Completed;
                payment.transaction_id = Some(transaction_id);
                payment.processed_at = Some(Utc::now());
                if let Some(key) = payment.idempotency_key.as_deref() {
                    self.guard.mark_processed(&scope, key, payment.id.as_uuid());
                }
                tracing::info!(
                    payment_id = %payment.id,
                    ride_id = %ride.id,
                    amount = payment.amount,
                    "payment processed"
                );
                Ok(payment.clone())
            }
            Err(err) => {
                payment.status = PaymentStatus::Failed;
                payment.failure_reason = Some(err.to_string());
                tracing::error!(
                    payment_id = %payment.id,
                    ride_id = %ride.id,
                    error = %err,
                    "payment processing failed"
                );
                Err(DispatchError::downstream(format!(
                    "payment processing failed: {err}"
                )))
            }
        }
    }

    pub fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.store
            .payments()
            .get(&payment_id)
            .ok_or_else(|| DispatchError::not_found("payment", payment_id))
    }
}
