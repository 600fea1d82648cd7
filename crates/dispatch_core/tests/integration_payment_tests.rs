use std::sync::Arc;

use dispatch_core::errors::DispatchError;
use dispatch_core::model::{PassengerId, PaymentStatus, RideId};
use dispatch_core::payments::{CreatePaymentRequest, PaymentProcessor};
use dispatch_core::test_helpers::{create_ride_request, harness, FailingChargeGateway};

fn payment_request(ride_id: RideId, key: Option<&str>) -> CreatePaymentRequest {
    CreatePaymentRequest {
        ride_id,
        payment_method: Some("card".to_owned()),
        idempotency_key: key.map(str::to_owned),
    }
}

#[test]
fn successful_payment_charges_the_estimated_fare() {
    let h = harness();
    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");

    let payment = h
        .payments
        .create_payment(payment_request(ride.id, Some("pay-1")))
        .expect("create payment");

    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.amount, ride.estimated_fare);
    assert_eq!(payment.passenger_id, ride.passenger_id);
    assert!(payment.transaction_id.is_some());
    assert!(payment.processed_at.is_some());
    assert_eq!(h.gateway.charges(), 1);
}

#[test]
fn replayed_payment_key_returns_the_original_and_charges_once() {
    let h = harness();
    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");

    let first = h
        .payments
        .create_payment(payment_request(ride.id, Some("pay-1")))
        .expect("first payment");
    let second = h
        .payments
        .create_payment(payment_request(ride.id, Some("pay-1")))
        .expect("replay");

    assert_eq!(first.id, second.id);
    assert_eq!(h.store.payments().len(), 1);
    assert_eq!(h.gateway.charges(), 1, "charge must run at most once");
}

#[test]
fn payments_without_a_key_are_independent() {
    let h = harness();
    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");

    let first = h
        .payments
        .create_payment(payment_request(ride.id, None))
        .expect("first payment");
    let second = h
        .payments
        .create_payment(payment_request(ride.id, None))
        .expect("second payment");
    assert_ne!(first.id, second.id);
    assert_eq!(h.gateway.charges(), 2);
}

#[test]
fn failed_charge_is_recorded_and_re_raised() {
    let h = harness();
    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");
    let failing = PaymentProcessor::new(
        h.store.clone(),
        h.guard.clone(),
        Arc::new(FailingChargeGateway),
    );

    let err = failing
        .create_payment(payment_request(ride.id, Some("pay-1")))
        .expect_err("charge failure");
    assert!(matches!(err, DispatchError::Downstream(_)));

    // The attempt is durable: the payment exists as FAILED with the reason.
    let failed = h
        .store
        .payment_by_idempotency_key("pay-1")
        .expect("failed payment");
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(failed
        .failure_reason
        .as_deref()
        .expect("failure reason")
        .contains("card declined"));

    // The key was never marked processed, so a retry attempts a new payment
    // and trips the unique-key constraint instead of replaying.
    let err = failing
        .create_payment(payment_request(ride.id, Some("pay-1")))
        .expect_err("key still held by the failed payment");
    assert!(matches!(err, DispatchError::Conflict(_)));
}

#[test]
fn payment_for_unknown_ride_is_not_found() {
    let h = harness();
    let err = h
        .payments
        .create_payment(payment_request(RideId::new(), None))
        .expect_err("missing ride");
    assert!(matches!(err, DispatchError::NotFound { .. }));
}

#[test]
fn processed_key_with_missing_payment_is_a_consistency_error() {
    let h = harness();
    let ride = h
        .dispatch
        .create_ride(create_ride_request(PassengerId::new(), None))
        .expect("create ride");
    h.guard.mark_processed(
        &ride.id.to_string(),
        "pay-ghost",
        dispatch_core::model::PaymentId::new().as_uuid(),
    );

    let err = h
        .payments
        .create_payment(payment_request(ride.id, Some("pay-ghost")))
        .expect_err("consistency error");
    assert!(matches!(err, DispatchError::NotFound { .. }));
}
