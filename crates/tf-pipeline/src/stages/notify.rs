//! Notification emitter.

use std::sync::Arc;

use async_trait::async_trait;

use tf_channel::{decode, Envelope};
use tf_core::events::{EventBus, EventPayload};
use tf_core::{NotifyEvent, Result};

use crate::consumer::MessageHandler;
use crate::mail::{MailMessage, Mailer};

/// Consumes the notify channel and sends one mail per event.
///
/// Delivery failures are logged and reported on the event bus; the message
/// is still acknowledged.
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    from: String,
    events: Arc<EventBus>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, from: impl Into<String>, events: Arc<EventBus>) -> Self {
        Self {
            mailer,
            from: from.into(),
            events,
        }
    }
}

#[async_trait]
impl MessageHandler for Notifier {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        let event: NotifyEvent = decode(envelope)?;
        let message = MailMessage::for_event(&self.from, &event);

        match self.mailer.deliver(&message).await {
            Ok(()) => {
                tracing::info!(
                    job_id = %event.job_id,
                    to = %event.email,
                    mailer = self.mailer.name(),
                    error = event.error.as_deref().unwrap_or("none"),
                    "Notification sent"
                );
                self.events.broadcast(EventPayload::NotificationSent {
                    job_id: event.job_id,
                    email: event.email,
                });
            }
            Err(e) => {
                tracing::error!(
                    job_id = %event.job_id,
                    to = %event.email,
                    mailer = self.mailer.name(),
                    error = %e,
                    "Notification delivery failed"
                );
                self.events.broadcast(EventPayload::NotificationFailed {
                    job_id: event.job_id,
                    email: event.email,
                    error: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use tf_core::{Error, JobId, UNSUPPORTED_FORMAT};

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<MailMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, message: &MailMessage) -> Result<()> {
            if self.fail {
                return Err(Error::Delivery("connection refused".into()));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    fn envelope(event: &NotifyEvent) -> Envelope {
        Envelope {
            id: tf_core::MessageId::new(),
            channel: Arc::from(tf_core::NOTIFY_CHANNEL),
            partition: 0,
            offset: 0,
            key: event.job_id.to_string(),
            payload: Bytes::from(serde_json::to_vec(event).unwrap()),
            published_at: chrono::Utc::now(),
        }
    }

    fn unsupported() -> NotifyEvent {
        NotifyEvent {
            job_id: JobId::new(),
            file_name: "archive.zip".into(),
            email: "c@x.com".into(),
            error: Some(UNSUPPORTED_FORMAT.into()),
            artifacts: Vec::new(),
            failures: Vec::new(),
        }
    }

    #[tokio::test]
    async fn delivers_to_requester() {
        let mailer = Arc::new(Recording::default());
        let events = Arc::new(EventBus::default());
        let notifier = Notifier::new(mailer.clone(), "tf@localhost", events.clone());

        notifier.handle(&envelope(&unsupported())).await.unwrap();

        let sent = mailer.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "c@x.com");
        assert!(sent[0].text.contains(UNSUPPORTED_FORMAT));
        assert!(matches!(
            events.recent_events(1)[0].payload,
            EventPayload::NotificationSent { .. }
        ));
    }

    #[tokio::test]
    async fn delivery_failure_is_acknowledged() {
        let mailer = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let events = Arc::new(EventBus::default());
        let notifier = Notifier::new(mailer, "tf@localhost", events.clone());

        notifier.handle(&envelope(&unsupported())).await.unwrap();

        assert!(matches!(
            events.recent_events(1)[0].payload,
            EventPayload::NotificationFailed { .. }
        ));
    }
}
