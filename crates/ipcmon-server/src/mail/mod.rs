//! Outbound email pipeline.
//!
//! Services publish [`EmailMessage`]s onto a bounded queue; a background
//! worker renders them and hands them to a [`MailTransport`]. Delivery
//! failures are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailKind {
    ConfirmationCode { code: String },
    PasswordReset { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub kind: EmailKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn render(&self, sender: &str, public_url: &str) -> RenderedEmail {
        let (subject, body) = match &self.kind {
            EmailKind::ConfirmationCode { code } => (
                "Your ipcmon confirmation code".to_string(),
                format!(
                    "Your confirmation code is {code}.\n\n\
                     If you did not request it, you can ignore this message."
                ),
            ),
            EmailKind::PasswordReset { token } => (
                "Reset your ipcmon password".to_string(),
                format!(
                    "Follow this link to choose a new password:\n\
                     {}/reset-password?token={token}\n",
                    public_url.trim_end_matches('/')
                ),
            ),
        };
        RenderedEmail {
            from: sender.to_string(),
            to: self.to.clone(),
            subject,
            body,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Delivers rendered mail.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &RenderedEmail) -> Result<(), MailError>;
}

/// Transport that only logs. Used when no SMTP relay is configured.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &RenderedEmail) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "Email dispatched (log transport)");
        Ok(())
    }
}

/// Producer side of the email queue.
#[derive(Clone)]
pub struct EmailQueue {
    tx: mpsc::Sender<EmailMessage>,
}

impl EmailQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EmailMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub async fn publish(&self, message: EmailMessage) -> ServiceResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ServiceError::Internal("email queue is closed".to_string()))
    }
}

/// Consume the queue until every producer is dropped.
pub fn spawn_mail_worker(
    mut rx: mpsc::Receiver<EmailMessage>,
    transport: Arc<dyn MailTransport>,
    sender: String,
    public_url: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let email = message.render(&sender, &public_url);
            if let Err(e) = transport.send(&email).await {
                warn!(to = %email.to, error = %e, "Failed to deliver email");
            }
        }
        info!("Mail worker stopped");
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<RenderedEmail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, email: &RenderedEmail) -> Result<(), MailError> {
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }

    #[test]
    fn confirmation_code_is_in_the_body() {
        let message = EmailMessage {
            to: "alice@example.com".into(),
            kind: EmailKind::ConfirmationCode {
                code: "123456".into(),
            },
        };
        let email = message.render("noreply@ipcmon.local", "http://x");
        assert_eq!(email.to, "alice@example.com");
        assert!(email.body.contains("123456"));
    }

    #[test]
    fn reset_link_uses_public_url() {
        let message = EmailMessage {
            to: "alice@example.com".into(),
            kind: EmailKind::PasswordReset { token: "abc".into() },
        };
        let email = message.render("noreply@ipcmon.local", "https://ipcmon.dev/");
        assert!(email.body.contains("https://ipcmon.dev/reset-password?token=abc"));
    }

    #[tokio::test]
    async fn worker_delivers_until_queue_closes() {
        let (queue, rx) = EmailQueue::new(4);
        let transport = Arc::new(RecordingTransport::default());
        let handle = spawn_mail_worker(
            rx,
            Arc::clone(&transport) as Arc<dyn MailTransport>,
            "noreply@ipcmon.local".into(),
            "http://localhost".into(),
        );

        queue
            .publish(EmailMessage {
                to: "a@example.com".into(),
                kind: EmailKind::ConfirmationCode { code: "1".into() },
            })
            .await
            .unwrap();
        drop(queue);
        handle.await.unwrap();

        assert_eq!(transport.sent.lock().await.len(), 1);
    }
}
