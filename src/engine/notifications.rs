//! Notification fan-out for order events.
//!
//! Order mutations publish an [`OrderEvent`] onto a bounded queue and return. The
//! worker spawned by [`run_notification_worker`] turns each event into persisted
//! notifications. Neither a full queue nor a failing notification store reaches
//! back into the order mutation; both are logged and counted.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::actor::Actor;
use crate::models::notification::{
    Notification, NotificationList, NotificationType, NotificationView,
};
use crate::models::order::{Order, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::store::{ActorDirectory, NotificationStore};

#[derive(Debug, Clone)]
pub enum OrderEvent {
    Assigned {
        order: Order,
        previous_driver: Option<Uuid>,
    },
    StatusChanged {
        order: Order,
        changed_by: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
}

impl OrderEvent {
    pub fn order(&self) -> &Order {
        match self {
            OrderEvent::Assigned { order, .. } | OrderEvent::StatusChanged { order, .. } => order,
        }
    }
}

struct Outgoing {
    recipient: Uuid,
    kind: NotificationType,
    title: String,
    message: String,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    actors: Arc<dyn ActorDirectory>,
    events_tx: mpsc::Sender<OrderEvent>,
    metrics: Metrics,
    notify_previous_driver: bool,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        actors: Arc<dyn ActorDirectory>,
        events_tx: mpsc::Sender<OrderEvent>,
        metrics: Metrics,
        notify_previous_driver: bool,
    ) -> Self {
        Self {
            store,
            actors,
            events_tx,
            metrics,
            notify_previous_driver,
        }
    }

    /// Hands an event to the worker without waiting. Never fails the caller.
    pub fn publish(&self, event: OrderEvent) {
        let order_id = event.order().id;
        match self.events_tx.try_send(event) {
            Ok(()) => self.metrics.notifications_in_queue.inc(),
            Err(TrySendError::Full(_)) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&["dropped"])
                    .inc();
                warn!(order_id = %order_id, "notification queue full; event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&["dropped"])
                    .inc();
                error!(order_id = %order_id, "notification worker is gone; event dropped");
            }
        }
    }

    /// Persists one notification for `recipient`.
    pub(crate) fn notify(
        &self,
        recipient: Uuid,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        related_order: Option<&Order>,
    ) -> Result<Notification, DispatchError> {
        self.actors
            .resolve(recipient)
            .map_err(|err| match err {
                DispatchError::NotFound(_) => DispatchError::RecipientNotFound(recipient),
                other => other,
            })?;

        let notification = Notification {
            id: Uuid::new_v4(),
            recipient,
            kind,
            title: title.into(),
            message: message.into(),
            order_id: related_order.map(|order| order.id),
            tracking_id: related_order.map(|order| order.tracking_id.clone()),
            is_read: false,
            created_at: Utc::now(),
        };

        self.store.create(notification)
    }

    /// Creates every notification an event calls for. All recipients are attempted;
    /// the first failure is returned after the rest have been tried.
    pub fn handle_event(&self, event: &OrderEvent) -> Result<usize, DispatchError> {
        let order = event.order();
        let mut created = 0;
        let mut first_error = None;

        for outgoing in self.recipients(event) {
            match self.notify(
                outgoing.recipient,
                outgoing.kind,
                outgoing.title,
                outgoing.message,
                Some(order),
            ) {
                Ok(notification) => {
                    created += 1;
                    self.metrics
                        .notifications_total
                        .with_label_values(&["created"])
                        .inc();
                    debug!(
                        notification_id = %notification.id,
                        recipient = %notification.recipient,
                        order_id = %order.id,
                        "notification created"
                    );
                }
                Err(err) => {
                    self.metrics
                        .notifications_total
                        .with_label_values(&["failed"])
                        .inc();
                    error!(
                        error = %err,
                        recipient = %outgoing.recipient,
                        order_id = %order.id,
                        "failed to create notification"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(created),
        }
    }

    fn recipients(&self, event: &OrderEvent) -> Vec<Outgoing> {
        match event {
            OrderEvent::Assigned {
                order,
                previous_driver,
            } => {
                let mut outgoing = Vec::new();
                if let Some(driver) = order.assigned_driver {
                    outgoing.push(Outgoing {
                        recipient: driver,
                        kind: NotificationType::OrderAssigned,
                        title: "New delivery assigned".to_string(),
                        message: format!(
                            "You have a new delivery: {} for {}",
                            order.tracking_id, order.client_name
                        ),
                    });
                }
                if self.notify_previous_driver {
                    if let Some(previous) =
                        previous_driver.filter(|prev| Some(*prev) != order.assigned_driver)
                    {
                        outgoing.push(Outgoing {
                            recipient: previous,
                            kind: NotificationType::OrderUnassigned,
                            title: "Delivery reassigned".to_string(),
                            message: format!(
                                "Delivery {} has been reassigned to another driver",
                                order.tracking_id
                            ),
                        });
                    }
                }
                outgoing
            }
            OrderEvent::StatusChanged {
                order,
                changed_by,
                from,
                to,
            } => {
                let (title, message) = status_message(order, *from, *to);
                let mut recipients: Vec<Uuid> = Vec::with_capacity(3);
                for candidate in [order.client_id, Some(order.created_by), order.assigned_driver]
                    .into_iter()
                    .flatten()
                {
                    if candidate != *changed_by && !recipients.contains(&candidate) {
                        recipients.push(candidate);
                    }
                }

                recipients
                    .into_iter()
                    .map(|recipient| Outgoing {
                        recipient,
                        kind: NotificationType::for_status(*to),
                        title: title.clone(),
                        message: message.clone(),
                    })
                    .collect()
            }
        }
    }

    pub fn list(&self, actor: &Actor) -> Result<NotificationList, DispatchError> {
        let now = Utc::now();
        let notifications = self.store.list_by_recipient(actor.id)?;
        let unread_count = notifications.iter().filter(|n| !n.is_read).count();

        Ok(NotificationList {
            notifications: notifications
                .into_iter()
                .map(|notification| NotificationView {
                    time_ago: notification.time_ago(now),
                    notification,
                })
                .collect(),
            unread_count,
        })
    }

    pub fn mark_read(&self, actor: &Actor, id: Uuid) -> Result<Notification, DispatchError> {
        self.owned(actor, id)?;
        self.store.set_read(id, true)
    }

    pub fn mark_all_read(&self, actor: &Actor) -> Result<usize, DispatchError> {
        let unread: Vec<Uuid> = self
            .store
            .list_by_recipient(actor.id)?
            .into_iter()
            .filter(|n| !n.is_read)
            .map(|n| n.id)
            .collect();

        for id in &unread {
            self.store.set_read(*id, true)?;
        }
        Ok(unread.len())
    }

    pub fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), DispatchError> {
        self.owned(actor, id)?;
        self.store.delete(id)
    }

    /// Deletes the actor's read notifications and returns how many went.
    pub fn clear_read(&self, actor: &Actor) -> Result<usize, DispatchError> {
        let read: Vec<Uuid> = self
            .store
            .list_by_recipient(actor.id)?
            .into_iter()
            .filter(|n| n.is_read)
            .map(|n| n.id)
            .collect();

        for id in &read {
            self.store.delete(*id)?;
        }
        Ok(read.len())
    }

    // Someone else's notification is reported exactly like a missing one.
    fn owned(&self, actor: &Actor, id: Uuid) -> Result<Notification, DispatchError> {
        let notification = self.store.get(id)?;
        if notification.recipient != actor.id {
            return Err(DispatchError::NotFound(format!("notification {id} not found")));
        }
        Ok(notification)
    }
}

fn status_message(order: &Order, from: OrderStatus, to: OrderStatus) -> (String, String) {
    let tracking = &order.tracking_id;
    match to {
        OrderStatus::InProgress => (
            "Order picked up".to_string(),
            format!("Parcel {tracking} has been picked up by the driver"),
        ),
        OrderStatus::OutForDelivery => (
            "Out for delivery".to_string(),
            format!("Parcel {tracking} is out for delivery"),
        ),
        OrderStatus::Delivered => (
            "Order delivered".to_string(),
            format!("Parcel {tracking} was delivered successfully"),
        ),
        OrderStatus::Cancelled => (
            "Order cancelled".to_string(),
            format!("Parcel {tracking} was cancelled"),
        ),
        _ => (
            "Status update".to_string(),
            format!("Parcel {tracking} moved from {from} to {to}"),
        ),
    }
}

pub async fn run_notification_worker(
    dispatcher: NotificationDispatcher,
    mut events_rx: mpsc::Receiver<OrderEvent>,
) {
    info!("notification worker started");

    while let Some(event) = events_rx.recv().await {
        dispatcher.metrics.notifications_in_queue.dec();

        let start = Instant::now();
        let outcome = match dispatcher.handle_event(&event) {
            Ok(_) => "success",
            Err(err) => {
                warn!(error = %err, order_id = %event.order().id, "notification fan-out incomplete");
                "error"
            }
        };
        dispatcher
            .metrics
            .notification_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
    }

    warn!("notification worker stopped: event channel closed");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::{NotificationDispatcher, OrderEvent};
    use crate::error::DispatchError;
    use crate::models::actor::{Actor, Role};
    use crate::models::notification::{Notification, NotificationType};
    use crate::models::order::{Order, OrderDraft, OrderStatus, TrackingId};
    use crate::observability::metrics::Metrics;
    use crate::store::{
        ActorDirectory, InMemoryActorDirectory, InMemoryNotificationStore, NotificationStore,
    };

    struct BrokenStore;

    impl NotificationStore for BrokenStore {
        fn create(&self, _notification: Notification) -> Result<Notification, DispatchError> {
            Err(DispatchError::Internal("notification store offline".to_string()))
        }

        fn list_by_recipient(&self, _recipient: Uuid) -> Result<Vec<Notification>, DispatchError> {
            Ok(Vec::new())
        }

        fn get(&self, id: Uuid) -> Result<Notification, DispatchError> {
            Err(DispatchError::NotFound(id.to_string()))
        }

        fn set_read(&self, id: Uuid, _is_read: bool) -> Result<Notification, DispatchError> {
            Err(DispatchError::NotFound(id.to_string()))
        }

        fn delete(&self, id: Uuid) -> Result<(), DispatchError> {
            Err(DispatchError::NotFound(id.to_string()))
        }
    }

    struct Fixture {
        dispatcher: NotificationDispatcher,
        actors: Arc<InMemoryActorDirectory>,
        metrics: Metrics,
        _rx: mpsc::Receiver<OrderEvent>,
    }

    fn fixture(store: Arc<dyn NotificationStore>, queue: usize, notify_previous: bool) -> Fixture {
        let actors = Arc::new(InMemoryActorDirectory::new());
        let metrics = Metrics::new();
        let (tx, rx) = mpsc::channel(queue);
        let dispatcher =
            NotificationDispatcher::new(store, actors.clone(), tx, metrics.clone(), notify_previous);
        Fixture {
            dispatcher,
            actors,
            metrics,
            _rx: rx,
        }
    }

    fn order(created_by: Uuid) -> Order {
        let draft = OrderDraft {
            client_name: "Imane".to_string(),
            client_phone: "+212633333333".to_string(),
            client_id: None,
            address: "Avenue Mohammed V, Rabat".to_string(),
            destination: None,
            amount_cents: 9_900,
            weight: None,
            dimensions: None,
            fragile: false,
            notes: String::new(),
        };
        Order::from_draft(
            draft,
            TrackingId::new_unchecked("LIV-NOT00001".to_string()),
            created_by,
        )
    }

    #[test]
    fn unknown_recipient_is_reported() {
        let fx = fixture(Arc::new(InMemoryNotificationStore::new()), 8, false);
        let stranger = Uuid::new_v4();

        let err = fx
            .dispatcher
            .notify(stranger, NotificationType::StatusChange, "t", "m", None)
            .unwrap_err();

        assert!(matches!(err, DispatchError::RecipientNotFound(id) if id == stranger));
    }

    struct OfflineDirectory;

    impl ActorDirectory for OfflineDirectory {
        fn resolve(&self, _id: Uuid) -> Result<Actor, DispatchError> {
            Err(DispatchError::Internal("directory offline".to_string()))
        }

        fn by_role(&self, _role: Role) -> Vec<Actor> {
            Vec::new()
        }

        fn insert(&self, actor: Actor) -> Result<Actor, DispatchError> {
            Ok(actor)
        }

        fn modify(
            &self,
            _id: Uuid,
            _change: &mut dyn FnMut(&mut Actor) -> Result<(), DispatchError>,
        ) -> Result<Actor, DispatchError> {
            Err(DispatchError::Internal("directory offline".to_string()))
        }

        fn len(&self) -> usize {
            0
        }
    }

    #[test]
    fn directory_outage_stays_internal() {
        let (tx, _rx) = mpsc::channel(8);
        let dispatcher = NotificationDispatcher::new(
            Arc::new(InMemoryNotificationStore::new()),
            Arc::new(OfflineDirectory),
            tx,
            Metrics::new(),
            false,
        );

        let err = dispatcher
            .notify(Uuid::new_v4(), NotificationType::StatusChange, "t", "m", None)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Internal(_)));
    }

    #[test]
    fn assignment_notifies_the_driver() {
        let fx = fixture(Arc::new(InMemoryNotificationStore::new()), 8, false);
        let dispatcher = fx.actors.insert(Actor::new("Hamza", "+1", Role::Dispatcher)).unwrap();
        let driver = fx.actors.insert(Actor::driver("Omar", "+2", "scooter")).unwrap();

        let mut order = order(dispatcher.id);
        order.assigned_driver = Some(driver.id);
        order.status = OrderStatus::Assigned;

        let created = fx
            .dispatcher
            .handle_event(&OrderEvent::Assigned {
                order,
                previous_driver: None,
            })
            .unwrap();
        assert_eq!(created, 1);

        let list = fx.dispatcher.list(&driver).unwrap();
        assert_eq!(list.unread_count, 1);
        let first = &list.notifications[0].notification;
        assert_eq!(first.kind, NotificationType::OrderAssigned);
        assert_eq!(first.tracking_id.as_ref().unwrap().as_str(), "LIV-NOT00001");
    }

    #[test]
    fn previous_driver_is_told_only_when_enabled() {
        for enabled in [false, true] {
            let fx = fixture(Arc::new(InMemoryNotificationStore::new()), 8, enabled);
            let dispatcher = fx.actors.insert(Actor::new("Hamza", "+1", Role::Dispatcher)).unwrap();
            let old = fx.actors.insert(Actor::driver("Old", "+2", "van")).unwrap();
            let new = fx.actors.insert(Actor::driver("New", "+3", "bike")).unwrap();

            let mut order = order(dispatcher.id);
            order.assigned_driver = Some(new.id);

            fx.dispatcher
                .handle_event(&OrderEvent::Assigned {
                    order,
                    previous_driver: Some(old.id),
                })
                .unwrap();

            let told = fx.dispatcher.list(&old).unwrap().notifications.len();
            assert_eq!(told, usize::from(enabled));
        }
    }

    #[test]
    fn status_change_skips_the_actor_who_made_it() {
        let fx = fixture(Arc::new(InMemoryNotificationStore::new()), 8, false);
        let dispatcher = fx.actors.insert(Actor::new("Hamza", "+1", Role::Dispatcher)).unwrap();
        let driver = fx.actors.insert(Actor::driver("Omar", "+2", "scooter")).unwrap();

        let mut order = order(dispatcher.id);
        order.assigned_driver = Some(driver.id);

        fx.dispatcher
            .handle_event(&OrderEvent::StatusChanged {
                order,
                changed_by: driver.id,
                from: OrderStatus::Assigned,
                to: OrderStatus::InProgress,
            })
            .unwrap();

        assert!(fx.dispatcher.list(&driver).unwrap().notifications.is_empty());
        let staff = fx.dispatcher.list(&dispatcher).unwrap();
        assert_eq!(staff.notifications.len(), 1);
        assert_eq!(
            staff.notifications[0].notification.kind,
            NotificationType::OrderPickedUp
        );
    }

    #[test]
    fn store_failures_are_counted_not_swallowed() {
        let fx = fixture(Arc::new(BrokenStore), 8, false);
        let dispatcher = fx.actors.insert(Actor::new("Hamza", "+1", Role::Dispatcher)).unwrap();
        let driver = fx.actors.insert(Actor::driver("Omar", "+2", "scooter")).unwrap();

        let mut order = order(dispatcher.id);
        order.assigned_driver = Some(driver.id);

        let result = fx.dispatcher.handle_event(&OrderEvent::Assigned {
            order,
            previous_driver: None,
        });

        assert!(matches!(result, Err(DispatchError::Internal(_))));
        assert_eq!(
            fx.metrics
                .notifications_total
                .with_label_values(&["failed"])
                .get(),
            1
        );
    }

    #[test]
    fn full_queue_drops_without_failing() {
        let fx = fixture(Arc::new(InMemoryNotificationStore::new()), 1, false);
        let event = OrderEvent::StatusChanged {
            order: order(Uuid::new_v4()),
            changed_by: Uuid::new_v4(),
            from: OrderStatus::Pending,
            to: OrderStatus::Cancelled,
        };

        fx.dispatcher.publish(event.clone());
        fx.dispatcher.publish(event);

        assert_eq!(fx.metrics.notifications_in_queue.get(), 1);
        assert_eq!(
            fx.metrics
                .notifications_total
                .with_label_values(&["dropped"])
                .get(),
            1
        );
    }

    #[test]
    fn recipients_manage_only_their_own_notifications() {
        let fx = fixture(Arc::new(InMemoryNotificationStore::new()), 8, false);
        let owner = fx.actors.insert(Actor::driver("Omar", "+2", "scooter")).unwrap();
        let other = fx.actors.insert(Actor::driver("Sara", "+3", "van")).unwrap();

        let first = fx
            .dispatcher
            .notify(owner.id, NotificationType::StatusChange, "a", "a", None)
            .unwrap();
        fx.dispatcher
            .notify(owner.id, NotificationType::StatusChange, "b", "b", None)
            .unwrap();

        assert!(matches!(
            fx.dispatcher.mark_read(&other, first.id),
            Err(DispatchError::NotFound(_))
        ));
        assert!(matches!(
            fx.dispatcher.delete(&other, first.id),
            Err(DispatchError::NotFound(_))
        ));

        assert!(fx.dispatcher.mark_read(&owner, first.id).unwrap().is_read);
        assert_eq!(fx.dispatcher.clear_read(&owner).unwrap(), 1);
        assert_eq!(fx.dispatcher.mark_all_read(&owner).unwrap(), 1);
        assert_eq!(fx.dispatcher.list(&owner).unwrap().unread_count, 0);
        assert_eq!(fx.dispatcher.clear_read(&owner).unwrap(), 1);
        assert!(fx.dispatcher.list(&owner).unwrap().notifications.is_empty());
    }
}
