use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{OrderStatus, TrackingId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderAssigned,
    OrderUnassigned,
    OrderPickedUp,
    OrderOutForDelivery,
    OrderDelivered,
    OrderCancelled,
    StatusChange,
}

impl NotificationType {
    pub fn for_status(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Assigned => NotificationType::OrderAssigned,
            OrderStatus::InProgress => NotificationType::OrderPickedUp,
            OrderStatus::OutForDelivery => NotificationType::OrderOutForDelivery,
            OrderStatus::Delivered => NotificationType::OrderDelivered,
            OrderStatus::Cancelled => NotificationType::OrderCancelled,
            OrderStatus::Pending | OrderStatus::Failed | OrderStatus::Returned => {
                NotificationType::StatusChange
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Uuid,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub tracking_id: Option<TrackingId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Human-readable age relative to `now`.
    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        let age = now.signed_duration_since(self.created_at);

        if age.num_minutes() < 1 {
            "just now".to_string()
        } else if age.num_hours() < 1 {
            format!("{} min ago", age.num_minutes())
        } else if age.num_days() < 1 {
            format!("{}h ago", age.num_hours())
        } else if age.num_days() < 7 {
            format!("{}d ago", age.num_days())
        } else {
            self.created_at.format("%d/%m/%Y").to_string()
        }
    }
}

/// A notification as returned to its recipient.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub time_ago: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<NotificationView>,
    pub unread_count: usize,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{Notification, NotificationType};
    use crate::models::order::OrderStatus;

    fn created(at: chrono::DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient: Uuid::new_v4(),
            kind: NotificationType::StatusChange,
            title: "t".to_string(),
            message: "m".to_string(),
            order_id: None,
            tracking_id: None,
            is_read: false,
            created_at: at,
        }
    }

    #[test]
    fn time_ago_buckets() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let n = created(at);
        assert_eq!(n.time_ago(at + Duration::seconds(20)), "just now");
        assert_eq!(n.time_ago(at + Duration::minutes(5)), "5 min ago");
        assert_eq!(n.time_ago(at + Duration::hours(3)), "3h ago");
        assert_eq!(n.time_ago(at + Duration::days(2)), "2d ago");
        assert_eq!(n.time_ago(at + Duration::days(10)), "01/03/2024");
    }

    #[test]
    fn type_tags_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&NotificationType::OrderAssigned).unwrap(),
            "\"order_assigned\""
        );
        assert_eq!(
            NotificationType::for_status(OrderStatus::InProgress),
            NotificationType::OrderPickedUp
        );
    }
}
