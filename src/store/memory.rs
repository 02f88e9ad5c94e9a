use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::actor::{Actor, Role};
use crate::models::notification::Notification;
use crate::models::order::{Order, OrderFilter, TrackingId};
use crate::store::{ActorDirectory, NotificationStore, OrderStore};

#[derive(Default)]
pub struct InMemoryActorDirectory {
    actors: DashMap<Uuid, Actor>,
}

impl InMemoryActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActorDirectory for InMemoryActorDirectory {
    fn resolve(&self, id: Uuid) -> Result<Actor, DispatchError> {
        self.actors
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("actor {id} not found")))
    }

    fn by_role(&self, role: Role) -> Vec<Actor> {
        self.actors
            .iter()
            .filter(|entry| entry.value().role == role)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn insert(&self, actor: Actor) -> Result<Actor, DispatchError> {
        match self.actors.entry(actor.id) {
            Entry::Occupied(_) => Err(DispatchError::Conflict(format!(
                "actor {} already exists",
                actor.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(actor.clone());
                Ok(actor)
            }
        }
    }

    fn modify(
        &self,
        id: Uuid,
        change: &mut dyn FnMut(&mut Actor) -> Result<(), DispatchError>,
    ) -> Result<Actor, DispatchError> {
        let mut entry = self
            .actors
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("actor {id} not found")))?;

        let mut updated = entry.value().clone();
        change(&mut updated)?;
        *entry.value_mut() = updated.clone();

        Ok(updated)
    }

    fn len(&self) -> usize {
        self.actors.len()
    }
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    by_tracking_id: DashMap<String, Uuid>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn get(&self, id: Uuid) -> Result<Order, DispatchError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("order {id} not found")))
    }

    fn get_by_tracking_id(&self, tracking_id: &str) -> Result<Order, DispatchError> {
        let id = self
            .by_tracking_id
            .get(tracking_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| DispatchError::NotFound(format!("tracking id {tracking_id} not found")))?;
        self.get(id)
    }

    fn tracking_id_exists(&self, tracking_id: &TrackingId) -> bool {
        self.by_tracking_id.contains_key(tracking_id.as_str())
    }

    fn insert(&self, order: Order) -> Result<Order, DispatchError> {
        match self.by_tracking_id.entry(order.tracking_id.as_str().to_string()) {
            Entry::Occupied(_) => Err(DispatchError::Conflict(format!(
                "tracking id {} already in use",
                order.tracking_id
            ))),
            Entry::Vacant(slot) => {
                self.orders.insert(order.id, order.clone());
                slot.insert(order.id);
                Ok(order)
            }
        }
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        mut order: Order,
    ) -> Result<Order, DispatchError> {
        let mut entry = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| DispatchError::NotFound(format!("order {} not found", order.id)))?;

        let stored = entry.value();
        if stored.version != expected_version {
            return Err(DispatchError::Conflict(format!(
                "order {} was modified concurrently (expected version {expected_version}, found {})",
                order.id, stored.version
            )));
        }
        if stored.tracking_id != order.tracking_id {
            return Err(DispatchError::Internal(format!(
                "refusing to change tracking id of order {}",
                order.id
            )));
        }

        order.version = expected_version + 1;
        *entry.value_mut() = order.clone();

        Ok(order)
    }

    fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    fn len(&self) -> usize {
        self.orders.len()
    }
}

#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: DashMap<Uuid, Notification>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn create(&self, notification: Notification) -> Result<Notification, DispatchError> {
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    fn list_by_recipient(&self, recipient: Uuid) -> Result<Vec<Notification>, DispatchError> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| entry.value().recipient == recipient)
            .map(|entry| entry.value().clone())
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    fn get(&self, id: Uuid) -> Result<Notification, DispatchError> {
        self.notifications
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("notification {id} not found")))
    }

    fn set_read(&self, id: Uuid, is_read: bool) -> Result<Notification, DispatchError> {
        let mut entry = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("notification {id} not found")))?;
        entry.is_read = is_read;
        Ok(entry.value().clone())
    }

    fn delete(&self, id: Uuid) -> Result<(), DispatchError> {
        self.notifications
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DispatchError::NotFound(format!("notification {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::{InMemoryActorDirectory, InMemoryOrderStore};
    use crate::error::DispatchError;
    use crate::models::actor::{Actor, Role};
    use crate::models::order::{Order, OrderDraft, TrackingId};
    use crate::store::{ActorDirectory, OrderStore};

    fn order(tracking: &str) -> Order {
        let draft = OrderDraft {
            client_name: "Youssef".to_string(),
            client_phone: "+212611111111".to_string(),
            client_id: None,
            address: "Hay Riad, Rabat".to_string(),
            destination: None,
            amount_cents: 4_000,
            weight: None,
            dimensions: None,
            fragile: true,
            notes: String::new(),
        };
        Order::from_draft(
            draft,
            TrackingId::new_unchecked(tracking.to_string()),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn duplicate_tracking_id_is_rejected() {
        let store = InMemoryOrderStore::new();
        store.insert(order("LIV-AAA11111")).unwrap();

        let err = store.insert(order("LIV-AAA11111")).unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn indexed_tracking_id_always_resolves_during_inserts() {
        let store = Arc::new(InMemoryOrderStore::new());
        let orders: Vec<Order> = (0..2_000)
            .map(|n| order(&format!("LIV-IDX{n:05}")))
            .collect();
        let ids: Vec<TrackingId> = orders.iter().map(|o| o.tracking_id.clone()).collect();

        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                let mut seen = 0;
                while seen < ids.len() {
                    seen = 0;
                    for id in &ids {
                        if store.tracking_id_exists(id) {
                            seen += 1;
                            assert!(store.get_by_tracking_id(id.as_str()).is_ok());
                        }
                    }
                }
            })
        };

        for order in orders {
            store.insert(order).unwrap();
        }
        reader.join().unwrap();
    }

    #[test]
    fn compare_and_swap_rejects_stale_version() {
        let store = InMemoryOrderStore::new();
        let original = store.insert(order("LIV-BBB22222")).unwrap();

        let mut first = original.clone();
        first.notes = "first".to_string();
        let saved = store.compare_and_swap(original.version, first).unwrap();
        assert_eq!(saved.version, original.version + 1);

        let mut second = original.clone();
        second.notes = "second".to_string();
        let err = store.compare_and_swap(original.version, second).unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));

        assert_eq!(store.get(original.id).unwrap().notes, "first");
    }

    #[test]
    fn lookup_by_tracking_id() {
        let store = InMemoryOrderStore::new();
        let saved = store.insert(order("LIV-CCC33333")).unwrap();

        assert_eq!(store.get_by_tracking_id("LIV-CCC33333").unwrap().id, saved.id);
        assert!(matches!(
            store.get_by_tracking_id("LIV-ZZZ99999"),
            Err(DispatchError::NotFound(_))
        ));
    }

    #[test]
    fn failed_modify_leaves_actor_untouched() {
        let directory = InMemoryActorDirectory::new();
        let actor = directory
            .insert(Actor::new("Nadia", "+212622222222", Role::Dispatcher))
            .unwrap();

        let result = directory.modify(actor.id, &mut |a: &mut Actor| {
            a.name = "changed".to_string();
            Err(DispatchError::Forbidden)
        });

        assert!(result.is_err());
        assert_eq!(directory.resolve(actor.id).unwrap().name, "Nadia");
    }
}
