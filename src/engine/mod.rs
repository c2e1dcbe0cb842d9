pub mod assignment;
pub mod idempotency;
pub mod lifecycle;
pub mod mailer;
pub mod notifier;
pub mod queries;
pub mod state_machine;
pub mod stream;
