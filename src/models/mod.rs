pub mod actor;
pub mod notification;
pub mod order;
