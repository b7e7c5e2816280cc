//! Outbound mail delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use tf_core::{Error, NotifyEvent, Result, PROCESSING_FAILED};

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

pub const SUCCESS_SUBJECT: &str = "File has finished processing";
pub const FAILURE_SUBJECT: &str = "File could not be processed";

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl MailMessage {
    /// Render the message for a terminal job event.
    pub fn for_event(from: &str, event: &NotifyEvent) -> Self {
        let (subject, text) = match &event.error {
            None => {
                let mut text = format!("Your file {} has finished processing.", event.file_name);
                if !event.artifacts.is_empty() {
                    text.push_str("\n\nThe generated media can be found at:\n");
                    for artifact in &event.artifacts {
                        text.push_str(&format!("  - {artifact}\n"));
                    }
                }
                (SUCCESS_SUBJECT, text)
            }
            Some(reason) => {
                let mut text = format!(
                    "Your file {} could not be processed: {reason}.",
                    event.file_name
                );
                if !event.failures.is_empty() {
                    text.push('\n');
                    for failure in &event.failures {
                        text.push_str(&format!("\n  {}: {}", failure.branch, failure.reason));
                    }
                }
                if reason != PROCESSING_FAILED && !event.artifacts.is_empty() {
                    text.push_str("\n\nPartial results:\n");
                    for artifact in &event.artifacts {
                        text.push_str(&format!("  - {artifact}\n"));
                    }
                }
                (FAILURE_SUBJECT, text)
            }
        };
        Self {
            from: from.to_string(),
            to: event.email.clone(),
            subject: subject.to_string(),
            text,
        }
    }
}

/// Delivers messages to their recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, message: &MailMessage) -> Result<()>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, message: &MailMessage) -> Result<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Mail:\n{}",
            message.text
        );
        Ok(())
    }
}

/// POSTs messages as JSON to an HTTP mail relay.
pub struct RelayMailer {
    client: Client,
    url: String,
    token: Option<String>,
}

impl RelayMailer {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client: {}", e);
                Client::new()
            });
        Self {
            client,
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn deliver(&self, message: &MailMessage) -> Result<()> {
        let mut request = self.client.post(&self.url).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("relay request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Delivery(format!(
                "relay rejected message ({status}): {body}"
            )));
        }
        Ok(())
    }
}
