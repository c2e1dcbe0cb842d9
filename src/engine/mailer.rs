use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Fire-and-forget handle onto the outgoing email queue.
#[derive(Clone)]
pub struct Mailer {
    tx: mpsc::Sender<EmailMessage>,
    from: String,
    metrics: Metrics,
}

impl Mailer {
    pub fn new(
        from: impl Into<String>,
        queue_size: usize,
        metrics: Metrics,
    ) -> (Self, mpsc::Receiver<EmailMessage>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        (
            Self {
                tx,
                from: from.into(),
                metrics,
            },
            rx,
        )
    }

    /// Queues a message without waiting. A full or closed queue drops the message.
    pub fn send(&self, to: &str, subject: &str, body: String) {
        let message = EmailMessage {
            from: self.from.clone(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            body,
        };

        match self.tx.try_send(message) {
            Ok(()) => self.metrics.emails_total.with_label_values(&["queued"]).inc(),
            Err(TrySendError::Full(message)) => {
                self.metrics.emails_total.with_label_values(&["dropped"]).inc();
                warn!(to = ?message.to, subject = %message.subject, "email queue full; dropping message");
            }
            Err(TrySendError::Closed(message)) => {
                self.metrics.emails_total.with_label_values(&["dropped"]).inc();
                warn!(to = ?message.to, subject = %message.subject, "email queue closed; dropping message");
            }
        }
    }
}

/// Drains the queue until every sender is gone. Transport is out of scope, so
/// delivery is recorded through tracing only.
pub async fn run_mailer(mut rx: mpsc::Receiver<EmailMessage>) {
    info!("mailer started");

    while let Some(message) = rx.recv().await {
        info!(
            from = %message.from,
            to = ?message.to,
            subject = %message.subject,
            "email dispatched"
        );
    }

    warn!("mailer stopped: queue channel closed");
}

#[cfg(test)]
mod tests {
    use super::Mailer;
    use crate::observability::metrics::Metrics;

    #[tokio::test]
    async fn queued_message_carries_configured_sender() {
        let (mailer, mut rx) = Mailer::new("noreply@test.local", 4, Metrics::new());

        mailer.send("ada@test.com", "Hello", "body".to_string());

        let message = rx.recv().await.unwrap();
        assert_eq!(message.from, "noreply@test.local");
        assert_eq!(message.to, vec!["ada@test.com".to_string()]);
        assert_eq!(message.subject, "Hello");
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let metrics = Metrics::new();
        let (mailer, _rx) = Mailer::new("noreply@test.local", 1, metrics.clone());

        mailer.send("a@test.com", "one", String::new());
        mailer.send("b@test.com", "two", String::new());

        assert_eq!(metrics.emails_total.with_label_values(&["queued"]).get(), 1);
        assert_eq!(metrics.emails_total.with_label_values(&["dropped"]).get(), 1);
    }

    #[test]
    fn closed_queue_is_not_an_error() {
        let (mailer, rx) = Mailer::new("noreply@test.local", 1, Metrics::new());
        drop(rx);

        mailer.send("a@test.com", "gone", String::new());
    }
}
