//! Persistence boundary of the dispatch core.
//!
//! Every mutation is a single-row operation. Orders are written through
//! [`OrderStore::compare_and_swap`], which only succeeds when the stored row still
//! carries the version the caller read.

pub mod memory;

use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::actor::{Actor, Role};
use crate::models::notification::Notification;
use crate::models::order::{Order, OrderFilter, TrackingId};

pub use memory::{InMemoryActorDirectory, InMemoryNotificationStore, InMemoryOrderStore};

pub trait ActorDirectory: Send + Sync {
    fn resolve(&self, id: Uuid) -> Result<Actor, DispatchError>;

    fn by_role(&self, role: Role) -> Vec<Actor>;

    fn insert(&self, actor: Actor) -> Result<Actor, DispatchError>;

    /// Applies `change` to one actor under the row lock and returns the result.
    /// When `change` fails the stored actor is left untouched.
    fn modify(
        &self,
        id: Uuid,
        change: &mut dyn FnMut(&mut Actor) -> Result<(), DispatchError>,
    ) -> Result<Actor, DispatchError>;

    fn len(&self) -> usize;
}

pub trait OrderStore: Send + Sync {
    fn get(&self, id: Uuid) -> Result<Order, DispatchError>;

    fn get_by_tracking_id(&self, tracking_id: &str) -> Result<Order, DispatchError>;

    fn tracking_id_exists(&self, tracking_id: &TrackingId) -> bool;

    /// Inserts a new order. Fails with a conflict when the tracking id is taken.
    fn insert(&self, order: Order) -> Result<Order, DispatchError>;

    /// Replaces the stored order if its version still equals `expected_version`.
    /// The written row gets `expected_version + 1`.
    fn compare_and_swap(&self, expected_version: u64, order: Order)
        -> Result<Order, DispatchError>;

    /// Matching orders, newest first.
    fn list(&self, filter: &OrderFilter) -> Vec<Order>;

    fn len(&self) -> usize;
}

pub trait NotificationStore: Send + Sync {
    fn create(&self, notification: Notification) -> Result<Notification, DispatchError>;

    /// The recipient's notifications, newest first.
    fn list_by_recipient(&self, recipient: Uuid) -> Result<Vec<Notification>, DispatchError>;

    fn get(&self, id: Uuid) -> Result<Notification, DispatchError>;

    fn set_read(&self, id: Uuid, is_read: bool) -> Result<Notification, DispatchError>;

    fn delete(&self, id: Uuid) -> Result<(), DispatchError>;
}
