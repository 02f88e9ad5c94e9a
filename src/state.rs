use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::assignment::AssignmentService;
use crate::engine::lifecycle::OrderStateMachine;
use crate::engine::location::DriverLocationRegistry;
use crate::engine::notifications::{NotificationDispatcher, OrderEvent};
use crate::engine::public_tracking::PublicTrackingGateway;
use crate::engine::tracking_id::TrackingIdGenerator;
use crate::observability::metrics::Metrics;
use crate::store::{
    ActorDirectory, InMemoryActorDirectory, InMemoryNotificationStore, InMemoryOrderStore,
    NotificationStore, OrderStore,
};

pub struct AppState {
    pub actors: Arc<dyn ActorDirectory>,
    pub orders: Arc<dyn OrderStore>,
    pub lifecycle: OrderStateMachine,
    pub assignments: AssignmentService,
    pub locations: DriverLocationRegistry,
    pub notifications: NotificationDispatcher,
    pub tracking: PublicTrackingGateway,
    pub metrics: Metrics,
}

impl AppState {
    /// State backed by the in-memory stores. The receiver feeds the notification worker.
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<OrderEvent>) {
        Self::with_stores(
            config,
            Arc::new(InMemoryActorDirectory::new()),
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryNotificationStore::new()),
        )
    }

    pub fn with_stores(
        config: &Config,
        actors: Arc<dyn ActorDirectory>,
        orders: Arc<dyn OrderStore>,
        notification_store: Arc<dyn NotificationStore>,
    ) -> (Self, mpsc::Receiver<OrderEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.notification_queue_size);
        let metrics = Metrics::new();

        let notifications = NotificationDispatcher::new(
            notification_store,
            actors.clone(),
            events_tx,
            metrics.clone(),
            config.notify_previous_driver,
        );

        let lifecycle = OrderStateMachine::new(
            orders.clone(),
            actors.clone(),
            TrackingIdGenerator::new(
                config.tracking_prefix.clone(),
                config.tracking_max_attempts,
            ),
            notifications.clone(),
            metrics.clone(),
        );
        let assignments = AssignmentService::new(
            orders.clone(),
            actors.clone(),
            notifications.clone(),
            metrics.clone(),
        );
        let locations = DriverLocationRegistry::new(actors.clone(), metrics.clone());
        let tracking = PublicTrackingGateway::new(
            orders.clone(),
            actors.clone(),
            metrics.clone(),
            config.tracking_min_length,
        );

        (
            Self {
                actors,
                orders,
                lifecycle,
                assignments,
                locations,
                notifications,
                tracking,
                metrics,
            },
            events_rx,
        )
    }
}
