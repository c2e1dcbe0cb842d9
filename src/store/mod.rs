pub mod deliveries;
pub mod notifications;
pub mod users;
