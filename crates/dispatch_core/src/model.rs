//! Domain records and their state machines.
//!
//! Driver, Ride, Trip, Payment and Tenant are independent records related by
//! id, not by containment. Status transitions are validated by the predicates
//! here; the controllers in `dispatch`/`lifecycle`/`payments` decide which
//! transition to attempt and under which locks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DispatchError;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(DriverId);
define_id!(RideId);
define_id!(TripId);
define_id!(PaymentId);
define_id!(TenantId);
define_id!(
    /// Passengers are managed outside this engine; only their id is carried.
    PassengerId
);

/// A WGS84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Dispatch domain. Every geo query and every ride is scoped to exactly one
/// city; queries never cross city boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum City {
    Bangalore,
    Chennai,
    Delhi,
    Hyderabad,
    Kolkata,
    Mumbai,
    Pune,
}

impl City {
    pub fn as_str(&self) -> &'static str {
        match self {
            City::Bangalore => "BANGALORE",
            City::Chennai => "CHENNAI",
            City::Delhi => "DELHI",
            City::Hyderabad => "HYDERABAD",
            City::Kolkata => "KOLKATA",
            City::Mumbai => "MUMBAI",
            City::Pune => "PUNE",
        }
    }
}

impl FromStr for City {
    type Err = DispatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "BANGALORE" => Ok(City::Bangalore),
            "CHENNAI" => Ok(City::Chennai),
            "DELHI" => Ok(City::Delhi),
            "HYDERABAD" => Ok(City::Hyderabad),
            "KOLKATA" => Ok(City::Kolkata),
            "MUMBAI" => Ok(City::Mumbai),
            "PUNE" => Ok(City::Pune),
            other => Err(DispatchError::validation(format!(
                "unrecognized city: {other}"
            ))),
        }
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Offline,
    Online,
    InRide,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Offline => "OFFLINE",
            DriverStatus::Online => "ONLINE",
            DriverStatus::InRide => "IN_RIDE",
        }
    }
}

impl FromStr for DriverStatus {
    type Err = DispatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "OFFLINE" => Ok(DriverStatus::Offline),
            "ONLINE" => Ok(DriverStatus::Online),
            "IN_RIDE" => Ok(DriverStatus::InRide),
            other => Err(DispatchError::validation(format!(
                "unrecognized driver status: {other}"
            ))),
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "PENDING",
            RideStatus::Assigned => "ASSIGNED",
            RideStatus::InProgress => "IN_PROGRESS",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }

    /// Completed and cancelled rides are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// Cancellation is reachable from PENDING or ASSIGNED only.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, RideStatus::Pending | RideStatus::Assigned)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Pending,
    Started,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => "PENDING",
            TripStatus::Started => "STARTED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Refunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last reported driver position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub point: GeoPoint,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub tenant_id: TenantId,
    pub name: String,
    pub phone_number: String,
    pub license_number: String,
    pub vehicle_model: String,
    pub vehicle_plate_number: String,
    pub status: DriverStatus,
    /// Unset until the first location update.
    pub position: Option<Position>,
    /// City of the last location update. A driver is present in the geo index
    /// for this city iff `status == Online`.
    pub city: Option<City>,
    pub created_at: DateTime<Utc>,
}

/// A ride request and its assignment.
///
/// `driver_id` is `Some` iff `status` is ASSIGNED or later; PENDING rides are
/// unassigned by definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub passenger_id: PassengerId,
    pub driver_id: Option<DriverId>,
    pub status: RideStatus,
    pub pickup: GeoPoint,
    pub dropoff: Option<GeoPoint>,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub estimated_fare: f64,
    pub actual_fare: Option<f64>,
    pub idempotency_key: Option<String>,
    pub city: City,
    pub created_at: DateTime<Utc>,
}

impl Ride {
    /// Fare carried on completion events: actual when recorded, estimated
    /// otherwise.
    pub fn billable_fare(&self) -> f64 {
        self.actual_fare.unwrap_or(self.estimated_fare)
    }
}

/// The travelled leg of an ASSIGNED ride; one trip per ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub ride_id: RideId,
    pub driver_id: DriverId,
    pub status: TripStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub distance_km: Option<f64>,
    pub duration_secs: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub ride_id: RideId,
    pub passenger_id: PassengerId,
    pub amount: f64,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Owns drivers by reference; `contact_email` doubles as an external identity
/// lookup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_parses_case_insensitively() {
        assert_eq!("mumbai".parse::<City>().expect("city"), City::Mumbai);
        assert_eq!("BANGALORE".parse::<City>().expect("city"), City::Bangalore);
        assert!("atlantis".parse::<City>().is_err());
    }

    #[test]
    fn driver_status_parses_recognized_values_only() {
        assert_eq!(
            "online".parse::<DriverStatus>().expect("status"),
            DriverStatus::Online
        );
        assert_eq!(
            "IN_RIDE".parse::<DriverStatus>().expect("status"),
            DriverStatus::InRide
        );
        assert!("driving".parse::<DriverStatus>().is_err());
    }

    #[test]
    fn ride_status_terminality_and_cancellation() {
        assert!(RideStatus::Completed.is_terminal());
        assert!(RideStatus::Cancelled.is_terminal());
        assert!(!RideStatus::InProgress.is_terminal());

        assert!(RideStatus::Pending.is_cancellable());
        assert!(RideStatus::Assigned.is_cancellable());
        assert!(!RideStatus::InProgress.is_cancellable());
        assert!(!RideStatus::Completed.is_cancellable());
    }

    #[test]
    fn billable_fare_prefers_actual() {
        let mut ride = Ride {
            id: RideId::new(),
            passenger_id: PassengerId::new(),
            driver_id: None,
            status: RideStatus::Pending,
            pickup: GeoPoint::new(12.97, 77.59),
            dropoff: None,
            pickup_address: None,
            dropoff_address: None,
            estimated_fare: 10.0,
            actual_fare: None,
            idempotency_key: None,
            city: City::Bangalore,
            created_at: Utc::now(),
        };
        assert_eq!(ride.billable_fare(), 10.0);
        ride.actual_fare = Some(12.5);
        assert_eq!(ride.billable_fare(), 12.5);
    }

    #[test]
    fn status_enums_serialize_screaming_snake() {
        let json = serde_json::to_string(&RideStatus::InProgress).expect("json");
        assert_eq!(json, "\"IN_PROGRESS\"");
        let json = serde_json::to_string(&DriverStatus::InRide).expect("json");
        assert_eq!(json, "\"IN_RIDE\"");
    }
}
