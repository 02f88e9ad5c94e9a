use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::notifications::{NotificationDispatcher, OrderEvent};
use crate::error::DispatchError;
use crate::models::actor::Actor;
use crate::models::order::{Order, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::store::{ActorDirectory, OrderStore};

/// Binds drivers to orders. The only way into ASSIGNED.
#[derive(Clone)]
pub struct AssignmentService {
    orders: Arc<dyn OrderStore>,
    actors: Arc<dyn ActorDirectory>,
    notifications: NotificationDispatcher,
    metrics: Metrics,
}

impl AssignmentService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        actors: Arc<dyn ActorDirectory>,
        notifications: NotificationDispatcher,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            actors,
            notifications,
            metrics,
        }
    }

    /// Assigns a PENDING order. An order already ASSIGNED to someone else is a conflict;
    /// moving it to another driver needs [`Self::assign_at_version`].
    pub fn assign(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        actor: &Actor,
    ) -> Result<Order, DispatchError> {
        let result = self.apply(order_id, driver_id, actor, None);
        self.record(&result);
        result
    }

    /// Assigns or reassigns only if the order is still at `expected_version`, the version
    /// the caller based its decision on. A lost race surfaces as a conflict.
    pub fn assign_at_version(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        actor: &Actor,
        expected_version: u64,
    ) -> Result<Order, DispatchError> {
        let result = self.apply(order_id, driver_id, actor, Some(expected_version));
        self.record(&result);
        result
    }

    fn apply(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> Result<Order, DispatchError> {
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

        let current = self.orders.get(order_id)?;
        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(DispatchError::Conflict(format!(
                    "order {order_id} changed since version {expected}"
                )));
            }
        }
        if !matches!(current.status, OrderStatus::Pending | OrderStatus::Assigned) {
            return Err(DispatchError::InvalidTransition {
                from: current.status,
                to: OrderStatus::Assigned,
            });
        }
        if current.status == OrderStatus::Assigned && current.assigned_driver == Some(driver_id) {
            return Ok(current);
        }
        if expected_version.is_none() && current.status == OrderStatus::Assigned {
            return Err(DispatchError::Conflict(format!(
                "order {order_id} is already assigned to another driver"
            )));
        }

        if driver.driver.as_ref().is_some_and(|profile| !profile.is_available) {
            warn!(driver_id = %driver_id, order_id = %order_id, "assigning an unavailable driver");
        }

        let previous_driver = current.assigned_driver;
        let mut next = current.clone();
        next.assigned_driver = Some(driver_id);
        next.apply_status(OrderStatus::Assigned, Utc::now());
        let saved = self.orders.compare_and_swap(current.version, next)?;

        info!(
            order_id = %saved.id,
            tracking_id = %saved.tracking_id,
            driver_id = %driver_id,
            previous_driver = ?previous_driver,
            actor_id = %actor.id,
            "order assigned"
        );

        self.notifications.publish(OrderEvent::Assigned {
            order: saved.clone(),
            previous_driver,
        });

        Ok(saved)
    }

    fn record(&self, result: &Result<Order, DispatchError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => {
                warn!(error = %err, "assignment rejected");
                err.outcome()
            }
        };
        self.metrics
            .assignments_total
            .with_label_values(&[outcome])
            .inc();
    }
}
