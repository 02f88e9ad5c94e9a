use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

const MEAN_EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Haversine distance to `other` in kilometres, on a spherical Earth.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (from_lat, to_lat) = (self.lat.to_radians(), other.lat.to_radians());
        let half_dlat = (other.lat - self.lat).to_radians() / 2.0;
        let half_dlng = (other.lng - self.lng).to_radians() / 2.0;

        let h = half_dlat.sin().powi(2) + from_lat.cos() * to_lat.cos() * half_dlng.sin().powi(2);
        2.0 * MEAN_EARTH_RADIUS_KM * h.sqrt().asin()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Dispatcher,
    Driver,
    Client,
}

const DRIVER_TARGETS: &[OrderStatus] = &[
    OrderStatus::InProgress,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
];

impl Role {
    /// Admins and dispatchers share full authority over orders.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Dispatcher)
    }

    /// Statuses this role may request through a status transition.
    /// Reachability from the current status is checked separately.
    pub fn permitted_targets(self) -> &'static [OrderStatus] {
        match self {
            Role::Admin | Role::Dispatcher => OrderStatus::ALL,
            Role::Driver => DRIVER_TARGETS,
            Role::Client => &[],
        }
    }

    pub fn may_target(self, status: OrderStatus) -> bool {
        self.permitted_targets().contains(&status)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Dispatcher => "DISPATCHER",
            Role::Driver => "DRIVER",
            Role::Client => "CLIENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "DISPATCHER" => Ok(Role::Dispatcher),
            "DRIVER" => Ok(Role::Driver),
            "CLIENT" => Ok(Role::Client),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Driver-only attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverProfile {
    pub vehicle: String,
    pub is_available: bool,
    pub location: Option<GeoPoint>,
    pub location_recorded_at: Option<DateTime<Utc>>,
}

impl DriverProfile {
    pub fn new(vehicle: impl Into<String>) -> Self {
        Self {
            vehicle: vehicle.into(),
            is_available: true,
            location: None,
            location_recorded_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub role: Role,
    pub driver: Option<DriverProfile>,
    pub created_at: DateTime<Utc>,
}

impl Actor {
    /// Builds an actor; drivers get a default profile with an empty vehicle descriptor.
    pub fn new(name: impl Into<String>, phone: impl Into<String>, role: Role) -> Self {
        let driver = (role == Role::Driver).then(|| DriverProfile::new(""));
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phone: phone.into(),
            role,
            driver,
            created_at: Utc::now(),
        }
    }

    pub fn driver(
        name: impl Into<String>,
        phone: impl Into<String>,
        vehicle: impl Into<String>,
    ) -> Self {
        let mut actor = Self::new(name, phone, Role::Driver);
        actor.driver = Some(DriverProfile::new(vehicle));
        actor
    }

    pub fn is_driver(&self) -> bool {
        self.role == Role::Driver
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, GeoPoint, Role};
    use crate::models::order::OrderStatus;

    #[test]
    fn distance_between_rabat_and_casablanca() {
        let rabat = GeoPoint {
            lat: 34.0209,
            lng: -6.8416,
        };
        let casablanca = GeoPoint {
            lat: 33.5731,
            lng: -7.5898,
        };

        assert!(rabat.distance_km(&rabat) < 1e-9);
        let km = rabat.distance_km(&casablanca);
        assert!((km - 87.0).abs() < 5.0, "got {km}");
        assert!((km - casablanca.distance_km(&rabat)).abs() < 1e-9);
    }

    #[test]
    fn role_vocabulary_is_case_sensitive() {
        assert_eq!("DRIVER".parse::<Role>(), Ok(Role::Driver));
        assert!("Driver".parse::<Role>().is_err());
        assert!("driver".parse::<Role>().is_err());
    }

    #[test]
    fn driver_targets_are_restricted() {
        assert!(Role::Driver.may_target(OrderStatus::Delivered));
        assert!(!Role::Driver.may_target(OrderStatus::OutForDelivery));
        assert!(!Role::Driver.may_target(OrderStatus::Assigned));
        assert!(Role::Dispatcher.may_target(OrderStatus::Returned));
        assert!(Role::Client.permitted_targets().is_empty());
    }

    #[test]
    fn only_drivers_get_a_profile() {
        assert!(Actor::new("Dan", "+100", Role::Driver).driver.is_some());
        assert!(Actor::new("Ann", "+101", Role::Admin).driver.is_none());
    }

    #[test]
    fn geo_point_bounds() {
        assert!(GeoPoint { lat: 33.97, lng: -6.85 }.is_valid());
        assert!(!GeoPoint { lat: 91.0, lng: 0.0 }.is_valid());
        assert!(!GeoPoint { lat: 0.0, lng: f64::NAN }.is_valid());
    }
}
