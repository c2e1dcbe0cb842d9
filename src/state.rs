use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::engine::mailer::{EmailMessage, Mailer};
use crate::observability::metrics::Metrics;
use crate::store::deliveries::DeliveryStore;
use crate::store::notifications::NotificationStore;
use crate::store::users::UserDirectory;

pub struct AppState {
    pub config: Config,
    pub users: UserDirectory,
    pub deliveries: DeliveryStore,
    pub notifications: Arc<NotificationStore>,
    pub mailer: Mailer,
    pub metrics: Metrics,
    shutdown_tx: watch::Sender<bool>,
}

impl AppState {
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<EmailMessage>) {
        let metrics = Metrics::new();
        let (mailer, email_rx) = Mailer::new(
            config.email_from.clone(),
            config.email_queue_size,
            metrics.clone(),
        );
        let (shutdown_tx, _unused_rx) = watch::channel(false);

        (
            Self {
                config: config.clone(),
                users: UserDirectory::new(),
                deliveries: DeliveryStore::new(config.lock_timeout),
                notifications: Arc::new(NotificationStore::new()),
                mailer,
                metrics,
                shutdown_tx,
            },
            email_rx,
        )
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Flags shutdown; every open notification stream observes it and ends.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}
