use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::actor::GeoPoint;

/// Order lifecycle status. The serialized form is the external, case-sensitive vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Assigned,
    InProgress,
    OutForDelivery,
    Delivered,
    Cancelled,
    Failed,
    Returned,
}

impl OrderStatus {
    pub const ALL: &'static [OrderStatus] = &[
        OrderStatus::Pending,
        OrderStatus::Assigned,
        OrderStatus::InProgress,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
        OrderStatus::Returned,
    ];

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Failed
                | OrderStatus::Returned
        )
    }

    /// A driver is physically carrying the parcel.
    pub fn is_active_delivery(self) -> bool {
        matches!(self, OrderStatus::InProgress | OrderStatus::OutForDelivery)
    }

    /// Statuses directly reachable from `self`.
    pub fn successors(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Assigned, Cancelled],
            Assigned => &[InProgress, Cancelled],
            InProgress => &[OutForDelivery, Delivered, Cancelled, Failed],
            OutForDelivery => &[Delivered, Cancelled, Failed, Returned],
            Delivered | Cancelled | Failed | Returned => &[],
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.successors().contains(&target)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Assigned => "ASSIGNED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Returned => "RETURNED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Public shipment code, e.g. `LIV-ABC12345`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(String);

impl TrackingId {
    pub(crate) fn new_unchecked(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tracking_id: TrackingId,
    pub client_name: String,
    pub client_phone: String,
    pub client_id: Option<Uuid>,
    pub address: String,
    pub destination: Option<GeoPoint>,
    pub amount_cents: u64,
    pub weight: Option<String>,
    pub dimensions: Option<String>,
    pub fragile: bool,
    pub notes: String,
    pub status: OrderStatus,
    pub assigned_driver: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Order {
    pub fn from_draft(draft: OrderDraft, tracking_id: TrackingId, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tracking_id,
            client_name: draft.client_name,
            client_phone: draft.client_phone,
            client_id: draft.client_id,
            address: draft.address,
            destination: draft.destination,
            amount_cents: draft.amount_cents,
            weight: draft.weight,
            dimensions: draft.dimensions,
            fragile: draft.fragile,
            notes: draft.notes,
            status: OrderStatus::Pending,
            assigned_driver: None,
            created_by,
            created_at: now,
            picked_up_at: None,
            delivered_at: None,
            updated_at: now,
            version: 0,
        }
    }

    /// Moves to `target` and stamps the lifecycle timestamps. Validity is the caller's concern.
    pub(crate) fn apply_status(&mut self, target: OrderStatus, now: DateTime<Utc>) {
        match target {
            OrderStatus::InProgress if self.picked_up_at.is_none() => {
                self.picked_up_at = Some(now);
            }
            OrderStatus::Delivered if self.delivered_at.is_none() => {
                self.delivered_at = Some(now);
            }
            _ => {}
        }
        self.status = target;
        self.updated_at = now;
    }
}

/// Input for order creation.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderDraft {
    pub client_name: String,
    pub client_phone: String,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub address: String,
    #[serde(default)]
    pub destination: Option<GeoPoint>,
    pub amount_cents: u64,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub fragile: bool,
    #[serde(default)]
    pub notes: String,
}

impl OrderDraft {
    pub fn validate(&self) -> Result<(), DispatchError> {
        require_text("client_name", &self.client_name)?;
        require_text("client_phone", &self.client_phone)?;
        require_text("address", &self.address)?;
        if let Some(point) = &self.destination {
            require_point(point)?;
        }
        Ok(())
    }
}

/// Staff edit of an existing order. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPatch {
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub address: Option<String>,
    pub destination: Option<GeoPoint>,
    pub amount_cents: Option<u64>,
    pub weight: Option<String>,
    pub dimensions: Option<String>,
    pub fragile: Option<bool>,
    pub notes: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderPatch {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if let Some(name) = &self.client_name {
            require_text("client_name", name)?;
        }
        if let Some(phone) = &self.client_phone {
            require_text("client_phone", phone)?;
        }
        if let Some(address) = &self.address {
            require_text("address", address)?;
        }
        if let Some(point) = &self.destination {
            require_point(point)?;
        }
        Ok(())
    }

    /// Copies the descriptive fields onto `order`. Status is handled by the state machine.
    pub(crate) fn apply_fields(self, order: &mut Order) {
        if let Some(name) = self.client_name {
            order.client_name = name;
        }
        if let Some(phone) = self.client_phone {
            order.client_phone = phone;
        }
        if let Some(address) = self.address {
            order.address = address;
        }
        if let Some(point) = self.destination {
            order.destination = Some(point);
        }
        if let Some(amount) = self.amount_cents {
            order.amount_cents = amount;
        }
        if let Some(weight) = self.weight {
            order.weight = Some(weight);
        }
        if let Some(dimensions) = self.dimensions {
            order.dimensions = Some(dimensions);
        }
        if let Some(fragile) = self.fragile {
            order.fragile = fragile;
        }
        if let Some(notes) = self.notes {
            order.notes = notes;
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), DispatchError> {
    if value.trim().is_empty() {
        return Err(DispatchError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_point(point: &GeoPoint) -> Result<(), DispatchError> {
    if !point.is_valid() {
        return Err(DispatchError::Validation(
            "coordinates out of range".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub driver_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|status| order.status == status)
            && self
                .driver_id
                .is_none_or(|driver| order.assigned_driver == Some(driver))
            && self
                .client_id
                .is_none_or(|client| order.client_id == Some(client))
    }
}
