pub mod assignment;
pub mod lifecycle;
pub mod location;
pub mod notifications;
pub mod public_tracking;
pub mod tracking_id;
