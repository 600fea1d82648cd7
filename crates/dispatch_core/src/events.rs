//! Ride lifecycle events and the sink they are delivered to.
//!
//! Delivery is best-effort at-least-once: a publish failure is logged and
//! never fails the operation that produced the event. Downstream consumers
//! (notification fan-out, analytics) partition on `passenger_id:ride_id`.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{DriverId, GeoPoint, PassengerId, Ride, RideId, RideStatus};

/// Topic every ride lifecycle event is published to.
pub const RIDE_EVENTS_TOPIC: &str = "ride-events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideEventKind {
    Created,
    Updated,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideEvent {
    pub ride_id: RideId,
    pub passenger_id: PassengerId,
    pub driver_id: Option<DriverId>,
    pub status: RideStatus,
    pub pickup: GeoPoint,
    pub dropoff: Option<GeoPoint>,
    pub fare: f64,
    pub timestamp: DateTime<Utc>,
    pub event_type: RideEventKind,
}

impl RideEvent {
    /// Snapshot of the ride at the moment of the transition. Creation events
    /// carry the estimated fare; completion events carry the billable fare.
    pub fn from_ride(ride: &Ride, event_type: RideEventKind) -> Self {
        let fare = match event_type {
            RideEventKind::Completed => ride.billable_fare(),
            _ => ride.estimated_fare,
        };
        Self {
            ride_id: ride.id,
            passenger_id: ride.passenger_id,
            driver_id: ride.driver_id,
            status: ride.status,
            pickup: ride.pickup,
            dropoff: ride.dropoff,
            fare,
            timestamp: Utc::now(),
            event_type,
        }
    }

    pub fn partition_key(&self) -> String {
        format!("{}:{}", self.passenger_id, self.ride_id)
    }
}

#[derive(Debug, Error)]
#[error("event delivery failed: {0}")]
pub struct EventSinkError(pub String);

/// Downstream event transport. Implementations must tolerate concurrent
/// publishes; the engine never awaits delivery confirmation.
pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, key: &str, event: &RideEvent)
        -> Result<(), EventSinkError>;
}

/// Publishes an event, logging the outcome. Failures never propagate to the
/// operation that triggered the event.
pub fn publish_best_effort(sink: &dyn EventSink, event: &RideEvent) {
    let key = event.partition_key();
    match sink.publish(RIDE_EVENTS_TOPIC, &key, event) {
        Ok(()) => tracing::debug!(%key, event_type = ?event.event_type, "ride event published"),
        Err(err) => tracing::warn!(%key, error = %err, "ride event publish failed"),
    }
}

/// Sink that serializes events to JSON log lines; the default transport when
/// no broker is wired in.
#[derive(Debug, Default)]
pub struct JsonLogSink;

impl EventSink for JsonLogSink {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &RideEvent,
    ) -> Result<(), EventSinkError> {
        let payload =
            serde_json::to_string(event).map_err(|err| EventSinkError(err.to_string()))?;
        tracing::info!(%topic, %key, %payload, "ride event");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub event: RideEvent,
}

/// Capturing sink for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    published: Mutex<Vec<PublishedEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        match self.published.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_of_kind(&self, kind: RideEventKind) -> Vec<RideEvent> {
        self.published()
            .into_iter()
            .map(|published| published.event)
            .filter(|event| event.event_type == kind)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &RideEvent,
    ) -> Result<(), EventSinkError> {
        let mut published = match self.published.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        published.push(PublishedEvent {
            topic: topic.to_owned(),
            key: key.to_owned(),
            event: event.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::City;

    fn sample_ride() -> Ride {
        Ride {
            id: RideId::new(),
            passenger_id: PassengerId::new(),
            driver_id: Some(DriverId::new()),
            status: RideStatus::Assigned,
            pickup: GeoPoint::new(12.97, 77.59),
            dropoff: Some(GeoPoint::new(12.99, 77.60)),
            pickup_address: None,
            dropoff_address: None,
            estimated_fare: 5.0,
            actual_fare: Some(6.5),
            idempotency_key: None,
            city: City::Bangalore,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn partition_key_is_passenger_and_ride() {
        let ride = sample_ride();
        let event = RideEvent::from_ride(&ride, RideEventKind::Created);
        assert_eq!(
            event.partition_key(),
            format!("{}:{}", ride.passenger_id, ride.id)
        );
    }

    #[test]
    fn completion_event_carries_billable_fare() {
        let ride = sample_ride();
        let created = RideEvent::from_ride(&ride, RideEventKind::Created);
        assert_eq!(created.fare, 5.0);
        let completed = RideEvent::from_ride(&ride, RideEventKind::Completed);
        assert_eq!(completed.fare, 6.5);
    }

    #[test]
    fn memory_sink_captures_topic_key_and_event() {
        let sink = MemoryEventSink::new();
        let ride = sample_ride();
        let event = RideEvent::from_ride(&ride, RideEventKind::Created);
        publish_best_effort(&sink, &event);

        let published = sink.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, RIDE_EVENTS_TOPIC);
        assert_eq!(published[0].key, event.partition_key());
        assert_eq!(published[0].event, event);
    }

    #[test]
    fn events_round_trip_through_json() {
        let ride = sample_ride();
        let event = RideEvent::from_ride(&ride, RideEventKind::Completed);
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"COMPLETED\""));
        let back: RideEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }
}
