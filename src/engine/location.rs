use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::actor::{Actor, DriverProfile, GeoPoint, Role};
use crate::observability::metrics::Metrics;
use crate::store::ActorDirectory;

/// How far ahead of server time a device clock may be.
const MAX_CLOCK_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct LocationReport {
    pub lat: f64,
    pub lng: f64,
    /// Device time of the fix; server time is used when absent.
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverPosition {
    pub driver_id: Uuid,
    pub name: String,
    pub is_available: bool,
    pub location: Option<GeoPoint>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl DriverPosition {
    fn of(actor: &Actor, profile: &DriverProfile) -> Self {
        Self {
            driver_id: actor.id,
            name: actor.name.clone(),
            is_available: profile.is_available,
            location: profile.location,
            recorded_at: profile.location_recorded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableDriver {
    pub driver_id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: String,
    pub location: Option<GeoPoint>,
    pub distance_km: Option<f64>,
}

#[derive(Clone)]
pub struct DriverLocationRegistry {
    actors: Arc<dyn ActorDirectory>,
    metrics: Metrics,
}

impl DriverLocationRegistry {
    pub fn new(actors: Arc<dyn ActorDirectory>, metrics: Metrics) -> Self {
        Self { actors, metrics }
    }

    /// Overwrites the driver's last-known position. Reports older than the stored fix
    /// are rejected so a late packet cannot move the driver backwards.
    pub fn report_location(
        &self,
        actor: &Actor,
        report: LocationReport,
    ) -> Result<DriverPosition, DispatchError> {
        let result = self.apply_report(actor, report);
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.outcome(),
        };
        self.metrics
            .location_reports_total
            .with_label_values(&[outcome])
            .inc();
        result
    }

    fn apply_report(
        &self,
        actor: &Actor,
        report: LocationReport,
    ) -> Result<DriverPosition, DispatchError> {
        if !actor.is_driver() {
            return Err(DispatchError::NotADriver(actor.id));
        }

        let point = GeoPoint {
            lat: report.lat,
            lng: report.lng,
        };
        if !point.is_valid() {
            return Err(DispatchError::Validation(
                "coordinates out of range".to_string(),
            ));
        }

        let now = Utc::now();
        if let Some(recorded_at) = report.recorded_at {
            if recorded_at > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
                return Err(DispatchError::Validation(
                    "location timestamp is in the future".to_string(),
                ));
            }
        }
        let recorded_at = report.recorded_at.unwrap_or(now);

        let updated = self.actors.modify(actor.id, &mut |stored: &mut Actor| {
            let profile = driver_profile_mut(stored)?;
            if profile
                .location_recorded_at
                .is_some_and(|previous| recorded_at < previous)
            {
                return Err(DispatchError::StaleLocation);
            }
            profile.location = Some(point);
            profile.location_recorded_at = Some(recorded_at);
            Ok(())
        })?;

        debug!(driver_id = %actor.id, lat = point.lat, lng = point.lng, "driver location updated");
        position_of(&updated)
    }

    pub fn set_availability(
        &self,
        actor: &Actor,
        available: bool,
    ) -> Result<DriverPosition, DispatchError> {
        if !actor.is_driver() {
            return Err(DispatchError::NotADriver(actor.id));
        }

        let updated = self.actors.modify(actor.id, &mut |stored: &mut Actor| {
            driver_profile_mut(stored)?.is_available = available;
            Ok(())
        })?;

        info!(driver_id = %actor.id, available, "driver availability changed");
        position_of(&updated)
    }

    /// Last known position of one driver, for staff.
    pub fn driver_location(
        &self,
        actor: &Actor,
        driver_id: Uuid,
    ) -> Result<DriverPosition, DispatchError> {
        if !actor.role.is_staff() {
            return Err(DispatchError::Forbidden);
        }

        let driver = self.actors.resolve(driver_id).map_err(|err| match err {
            DispatchError::NotFound(_) => DispatchError::DriverNotFound(driver_id),
            other => other,
        })?;
        if !driver.is_driver() {
            return Err(DispatchError::NotADriver(driver_id));
        }
        position_of(&driver)
    }

    /// Available drivers, nearest to `near` first. Drivers that never reported a
    /// position sort last.
    pub fn available_drivers(
        &self,
        actor: &Actor,
        near: Option<GeoPoint>,
    ) -> Result<Vec<AvailableDriver>, DispatchError> {
        if !actor.role.is_staff() {
            return Err(DispatchError::Forbidden);
        }

        let mut drivers: Vec<AvailableDriver> = self
            .actors
            .by_role(Role::Driver)
            .into_iter()
            .filter_map(|driver| {
                let profile = driver.driver.as_ref()?;
                if !profile.is_available {
                    return None;
                }
                let distance_km = near
                    .zip(profile.location)
                    .map(|(target, location)| location.distance_km(&target));
                Some(AvailableDriver {
                    driver_id: driver.id,
                    name: driver.name.clone(),
                    phone: driver.phone.clone(),
                    vehicle: profile.vehicle.clone(),
                    location: profile.location,
                    distance_km,
                })
            })
            .collect();

        drivers.sort_by(|a, b| match (a.distance_km, b.distance_km) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });

        Ok(drivers)
    }
}

fn driver_profile_mut(actor: &mut Actor) -> Result<&mut DriverProfile, DispatchError> {
    let id = actor.id;
    actor
        .driver
        .as_mut()
        .ok_or(DispatchError::NotADriver(id))
}

fn position_of(actor: &Actor) -> Result<DriverPosition, DispatchError> {
    actor
        .driver
        .as_ref()
        .map(|profile| DriverPosition::of(actor, profile))
        .ok_or(DispatchError::NotADriver(actor.id))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::{DriverLocationRegistry, LocationReport};
    use crate::error::DispatchError;
    use crate::models::actor::{Actor, GeoPoint, Role};
    use crate::observability::metrics::Metrics;
    use crate::store::{ActorDirectory, InMemoryActorDirectory};

    fn registry() -> (DriverLocationRegistry, Arc<InMemoryActorDirectory>) {
        let actors = Arc::new(InMemoryActorDirectory::new());
        (
            DriverLocationRegistry::new(actors.clone(), Metrics::new()),
            actors,
        )
    }

    fn report(lat: f64, lng: f64, seconds_ago: i64) -> LocationReport {
        LocationReport {
            lat,
            lng,
            recorded_at: Some(Utc::now() - Duration::seconds(seconds_ago)),
        }
    }

    #[test]
    fn last_write_wins() {
        let (registry, actors) = registry();
        let driver = actors.insert(Actor::driver("Omar", "+1", "scooter")).unwrap();

        registry.report_location(&driver, report(34.00, -6.85, 10)).unwrap();
        let position = registry.report_location(&driver, report(34.01, -6.84, 5)).unwrap();

        assert_eq!(position.location, Some(GeoPoint { lat: 34.01, lng: -6.84 }));
    }

    #[test]
    fn out_of_order_report_is_rejected() {
        let (registry, actors) = registry();
        let driver = actors.insert(Actor::driver("Omar", "+1", "scooter")).unwrap();

        registry.report_location(&driver, report(34.01, -6.84, 5)).unwrap();
        let err = registry
            .report_location(&driver, report(34.00, -6.85, 60))
            .unwrap_err();

        assert!(matches!(err, DispatchError::StaleLocation));
        let stored = actors.resolve(driver.id).unwrap();
        assert_eq!(
            stored.driver.unwrap().location,
            Some(GeoPoint { lat: 34.01, lng: -6.84 })
        );
    }

    #[test]
    fn future_timestamps_and_bad_coordinates_are_invalid() {
        let (registry, actors) = registry();
        let driver = actors.insert(Actor::driver("Omar", "+1", "scooter")).unwrap();

        assert!(matches!(
            registry.report_location(&driver, report(34.0, -6.8, -3_600)),
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            registry.report_location(&driver, report(120.0, -6.8, 0)),
            Err(DispatchError::Validation(_))
        ));
    }

    #[test]
    fn only_drivers_report_or_toggle() {
        let (registry, actors) = registry();
        let client = actors.insert(Actor::new("Lina", "+2", Role::Client)).unwrap();

        assert!(matches!(
            registry.set_availability(&client, false),
            Err(DispatchError::NotADriver(_))
        ));
        assert!(matches!(
            registry.report_location(&client, report(34.0, -6.8, 0)),
            Err(DispatchError::NotADriver(_))
        ));
    }

    #[test]
    fn available_drivers_sorted_by_distance() {
        let (registry, actors) = registry();
        let admin = actors.insert(Actor::new("Root", "+0", Role::Admin)).unwrap();
        let near = actors.insert(Actor::driver("Near", "+1", "bike")).unwrap();
        let far = actors.insert(Actor::driver("Far", "+2", "van")).unwrap();
        let idle = actors.insert(Actor::driver("Idle", "+3", "van")).unwrap();
        let off = actors.insert(Actor::driver("Off", "+4", "van")).unwrap();

        registry.report_location(&near, report(34.02, -6.84, 1)).unwrap();
        registry.report_location(&far, report(33.57, -7.59, 1)).unwrap();
        registry.set_availability(&off, false).unwrap();

        let target = GeoPoint { lat: 34.0209, lng: -6.8416 };
        let listed = registry.available_drivers(&admin, Some(target)).unwrap();
        let ids: Vec<_> = listed.iter().map(|d| d.driver_id).collect();

        assert_eq!(ids, vec![near.id, far.id, idle.id]);
        assert!(listed[2].distance_km.is_none());
        assert!(matches!(
            registry.available_drivers(&near, None),
            Err(DispatchError::Forbidden)
        ));
    }
}
