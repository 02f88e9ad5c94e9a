use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::notifications::{NotificationDispatcher, OrderEvent};
use crate::engine::tracking_id::TrackingIdGenerator;
use crate::error::DispatchError;
use crate::models::actor::{Actor, Role};
use crate::models::order::{Order, OrderDraft, OrderFilter, OrderPatch, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::store::{ActorDirectory, OrderStore};

#[derive(Debug, Clone, Serialize)]
pub struct DriverHistory {
    pub total_delivered: usize,
    pub total_amount_cents: u64,
    pub deliveries: Vec<Order>,
}

/// Owns the order status field: creation, role-gated transitions and staff edits.
#[derive(Clone)]
pub struct OrderStateMachine {
    orders: Arc<dyn OrderStore>,
    actors: Arc<dyn ActorDirectory>,
    tracking_ids: TrackingIdGenerator,
    notifications: NotificationDispatcher,
    metrics: Metrics,
}

impl OrderStateMachine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        actors: Arc<dyn ActorDirectory>,
        tracking_ids: TrackingIdGenerator,
        notifications: NotificationDispatcher,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            actors,
            tracking_ids,
            notifications,
            metrics,
        }
    }

    /// Persists a new PENDING order under a freshly generated tracking id.
    pub fn create_order(&self, actor: &Actor, draft: OrderDraft) -> Result<Order, DispatchError> {
        if !actor.role.is_staff() {
            return Err(DispatchError::Forbidden);
        }
        draft.validate()?;

        if let Some(client_id) = draft.client_id {
            let client = self.actors.resolve(client_id)?;
            if client.role != Role::Client {
                return Err(DispatchError::Validation(format!(
                    "actor {client_id} is not a client"
                )));
            }
        }

        // The probe can race with a concurrent insert; the store's unique index settles
        // it and the loser draws again.
        let order = self.tracking_ids.claim(
            |candidate| self.orders.tracking_id_exists(candidate),
            |tracking_id| {
                match self
                    .orders
                    .insert(Order::from_draft(draft.clone(), tracking_id, actor.id))
                {
                    Ok(order) => Ok(Some(order)),
                    Err(DispatchError::Conflict(_)) => Ok(None),
                    Err(err) => Err(err),
                }
            },
            &self.metrics,
        )?;

        info!(
            order_id = %order.id,
            tracking_id = %order.tracking_id,
            created_by = %actor.id,
            "order created"
        );
        Ok(order)
    }

    pub fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order, DispatchError> {
        let order = self.orders.get(order_id)?;
        if !can_view(actor, &order) {
            return Err(DispatchError::Forbidden);
        }
        Ok(order)
    }

    /// Orders visible to `actor`: staff see everything, drivers their assignments,
    /// clients their own orders.
    pub fn orders_for(&self, actor: &Actor, mut filter: OrderFilter) -> Vec<Order> {
        match actor.role {
            Role::Admin | Role::Dispatcher => {}
            Role::Driver => filter.driver_id = Some(actor.id),
            Role::Client => filter.client_id = Some(actor.id),
        }
        self.orders.list(&filter)
    }

    pub fn transition(
        &self,
        order_id: Uuid,
        actor: &Actor,
        target: OrderStatus,
    ) -> Result<Order, DispatchError> {
        let result = self.apply_transition(order_id, actor, target);
        self.record("transition", &result);
        result
    }

    fn apply_transition(
        &self,
        order_id: Uuid,
        actor: &Actor,
        target: OrderStatus,
    ) -> Result<Order, DispatchError> {
        if actor.role == Role::Client {
            return Err(DispatchError::Forbidden);
        }
        let current = self.orders.get(order_id)?;
        authorize_status_change(actor, &current)?;
        check_target(actor.role, current.status, target)?;

        let mut next = current.clone();
        next.apply_status(target, Utc::now());
        let saved = self.orders.compare_and_swap(current.version, next)?;

        self.announce(&saved, actor, current.status);
        Ok(saved)
    }

    /// Staff-only edit of descriptive fields, optionally together with a status change.
    /// Everything is validated before anything is written.
    pub fn update_order(
        &self,
        order_id: Uuid,
        actor: &Actor,
        patch: OrderPatch,
    ) -> Result<Order, DispatchError> {
        let result = self.apply_update(order_id, actor, patch);
        self.record("update", &result);
        result
    }

    fn apply_update(
        &self,
        order_id: Uuid,
        actor: &Actor,
        mut patch: OrderPatch,
    ) -> Result<Order, DispatchError> {
        if !actor.role.is_staff() {
            return Err(DispatchError::Forbidden);
        }
        patch.validate()?;

        let current = self.orders.get(order_id)?;
        let target = patch.status.take().filter(|status| *status != current.status);
        if let Some(target) = target {
            check_target(actor.role, current.status, target)?;
        }

        let now = Utc::now();
        let mut next = current.clone();
        patch.apply_fields(&mut next);
        next.updated_at = now;
        if let Some(target) = target {
            next.apply_status(target, now);
        }
        let saved = self.orders.compare_and_swap(current.version, next)?;

        if target.is_some() {
            self.announce(&saved, actor, current.status);
        } else {
            info!(order_id = %saved.id, actor_id = %actor.id, "order details updated");
        }
        Ok(saved)
    }

    /// A driver's delivered orders, most recent delivery first.
    pub fn driver_history(&self, actor: &Actor) -> Result<DriverHistory, DispatchError> {
        if !actor.is_driver() {
            return Err(DispatchError::NotADriver(actor.id));
        }

        let mut deliveries = self.orders.list(&OrderFilter {
            status: Some(OrderStatus::Delivered),
            driver_id: Some(actor.id),
            client_id: None,
        });
        deliveries.sort_by(|a, b| b.delivered_at.cmp(&a.delivered_at));

        Ok(DriverHistory {
            total_delivered: deliveries.len(),
            total_amount_cents: deliveries.iter().map(|order| order.amount_cents).sum(),
            deliveries,
        })
    }

    fn announce(&self, saved: &Order, actor: &Actor, from: OrderStatus) {
        info!(
            order_id = %saved.id,
            tracking_id = %saved.tracking_id,
            actor_id = %actor.id,
            role = %actor.role,
            from = %from,
            to = %saved.status,
            "order status changed"
        );
        self.notifications.publish(OrderEvent::StatusChanged {
            order: saved.clone(),
            changed_by: actor.id,
            from,
            to: saved.status,
        });
    }

    fn record(&self, operation: &str, result: &Result<Order, DispatchError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => {
                warn!(operation, error = %err, "order mutation rejected");
                err.outcome()
            }
        };
        self.metrics
            .transitions_total
            .with_label_values(&[outcome])
            .inc();
    }
}

fn can_view(actor: &Actor, order: &Order) -> bool {
    match actor.role {
        Role::Admin | Role::Dispatcher => true,
        Role::Driver => order.assigned_driver == Some(actor.id),
        Role::Client => order.client_id == Some(actor.id),
    }
}

fn authorize_status_change(actor: &Actor, order: &Order) -> Result<(), DispatchError> {
    match actor.role {
        Role::Admin | Role::Dispatcher => Ok(()),
        Role::Driver if order.assigned_driver == Some(actor.id) => Ok(()),
        Role::Driver | Role::Client => Err(DispatchError::Forbidden),
    }
}

/// ASSIGNED is reachable only through the assignment service.
fn check_target(role: Role, from: OrderStatus, to: OrderStatus) -> Result<(), DispatchError> {
    let allowed = to != OrderStatus::Assigned && role.may_target(to) && from.can_transition_to(to);
    if allowed {
        Ok(())
    } else {
        Err(DispatchError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::check_target;
    use crate::error::DispatchError;
    use crate::models::actor::Role;
    use crate::models::order::OrderStatus;

    #[test]
    fn driver_cannot_skip_to_out_for_delivery() {
        assert!(matches!(
            check_target(Role::Driver, OrderStatus::InProgress, OrderStatus::OutForDelivery),
            Err(DispatchError::InvalidTransition { .. })
        ));
        assert!(check_target(Role::Dispatcher, OrderStatus::InProgress, OrderStatus::OutForDelivery).is_ok());
    }

    #[test]
    fn assigned_is_never_a_plain_transition_target() {
        assert!(check_target(Role::Admin, OrderStatus::Pending, OrderStatus::Assigned).is_err());
    }

    #[test]
    fn terminal_states_reject_everything() {
        for role in [Role::Admin, Role::Driver] {
            for target in OrderStatus::ALL {
                assert!(check_target(role, OrderStatus::Delivered, *target).is_err());
            }
        }
    }

    #[test]
    fn driver_may_deliver_straight_from_in_progress() {
        assert!(check_target(Role::Driver, OrderStatus::InProgress, OrderStatus::Delivered).is_ok());
        assert!(check_target(Role::Driver, OrderStatus::Assigned, OrderStatus::Delivered).is_err());
    }
}
