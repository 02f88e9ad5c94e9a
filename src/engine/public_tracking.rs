use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::DispatchError;
use crate::models::actor::GeoPoint;
use crate::models::order::{Order, OrderStatus, TrackingId};
use crate::observability::metrics::Metrics;
use crate::store::{ActorDirectory, OrderStore};

/// Characters that sneak into pasted or right-to-left tracking codes.
const INVISIBLE_CHARS: &[char] = &[
    '\u{200e}', '\u{200f}', '\u{feff}', '\u{202a}', '\u{202b}', '\u{202c}', '\u{202d}',
    '\u{202e}',
];

#[derive(Debug, Clone, Serialize)]
pub struct PublicDriverView {
    pub name: String,
    pub phone: String,
    pub position: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_destination_km: Option<f64>,
}

/// What an anonymous holder of a tracking code may see.
#[derive(Debug, Clone, Serialize)]
pub struct PublicOrderView {
    pub tracking_id: TrackingId,
    pub status: OrderStatus,
    pub client_name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<PublicDriverView>,
}

#[derive(Clone)]
pub struct PublicTrackingGateway {
    orders: Arc<dyn OrderStore>,
    actors: Arc<dyn ActorDirectory>,
    metrics: Metrics,
    min_length: usize,
}

impl PublicTrackingGateway {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        actors: Arc<dyn ActorDirectory>,
        metrics: Metrics,
        min_length: usize,
    ) -> Self {
        Self {
            orders,
            actors,
            metrics,
            min_length,
        }
    }

    pub fn lookup(&self, raw: &str) -> Result<PublicOrderView, DispatchError> {
        let result = self.project(raw);
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.outcome(),
        };
        self.metrics
            .tracking_lookups_total
            .with_label_values(&[outcome])
            .inc();
        result
    }

    fn project(&self, raw: &str) -> Result<PublicOrderView, DispatchError> {
        let tracking_id = normalize(raw);
        if tracking_id.chars().count() < self.min_length {
            return Err(DispatchError::InvalidTrackingId(tracking_id));
        }

        let order = self.orders.get_by_tracking_id(&tracking_id)?;
        let driver = self.driver_view(&order);

        Ok(PublicOrderView {
            tracking_id: order.tracking_id,
            status: order.status,
            client_name: order.client_name,
            address: order.address,
            created_at: order.created_at,
            driver,
        })
    }

    // Driver identity and position are disclosed only while the parcel is on the road.
    fn driver_view(&self, order: &Order) -> Option<PublicDriverView> {
        if !order.status.is_active_delivery() {
            return None;
        }
        let driver_id = order.assigned_driver?;

        let driver = match self.actors.resolve(driver_id) {
            Ok(driver) => driver,
            Err(err) => {
                warn!(error = %err, order_id = %order.id, "assigned driver missing from directory");
                return None;
            }
        };

        let position = driver.driver.as_ref().and_then(|profile| profile.location);
        let distance_to_destination_km = position
            .zip(order.destination)
            .map(|(here, there)| here.distance_km(&there));

        Some(PublicDriverView {
            name: driver.name,
            phone: driver.phone,
            position,
            distance_to_destination_km,
        })
    }
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !INVISIBLE_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}
