//! Anomaly notifications.
//!
//! Request handlers only ever hold a [`Notifier`], which pushes onto an
//! unbounded channel and returns immediately. A single worker task spawned by
//! [`spawn_worker`] drains the channel and hands each message to an
//! [`EmailSender`] on a blocking thread. Delivery failures are logged and
//! dropped; they never reach the request that caused them.

use anyhow::{Context, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Message telling a user their session was refreshed from an unfamiliar address.
    #[must_use]
    pub fn new_origin(to: &str, ip: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "New sign-in location detected".to_string(),
            body: format!(
                "Your session was refreshed from a new IP address: {ip}\n\n\
                 If this was not you, sign in again and change your password."
            ),
        }
    }
}

/// Email delivery abstraction used by the notification worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message. Errors are logged by the worker.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Sender for local development; logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Build an SMTP sender using STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` is not a valid mailbox or the relay cannot be configured.
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, SecretString)>,
        from: &str,
    ) -> Result<Self> {
        let from: Mailbox = from
            .parse()
            .with_context(|| format!("invalid sender address: {from}"))?;

        let mut builder = SmtpTransport::starttls_relay(host)
            .with_context(|| format!("invalid SMTP relay: {host}"))?
            .port(port);

        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(
                username,
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl std::fmt::Debug for SmtpEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpEmailSender")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl EmailSender for SmtpEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        let to: Mailbox = message
            .to
            .parse()
            .with_context(|| format!("invalid recipient address: {}", message.to))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("failed to build email")?;

        self.transport
            .send(&email)
            .context("SMTP delivery failed")?;

        Ok(())
    }
}

/// Producer side of the notification queue.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<EmailMessage>,
}

impl Notifier {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EmailMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message. Never blocks; a closed queue is logged and ignored.
    pub fn dispatch(&self, message: EmailMessage) {
        if let Err(err) = self.tx.send(message) {
            warn!(to = %err.0.to, "notification queue closed, dropping message");
        }
    }

    pub fn notify_new_origin(&self, to: &str, ip: &str) {
        self.dispatch(EmailMessage::new_origin(to, ip));
    }
}

/// Drain `queue` until every [`Notifier`] is dropped.
pub fn spawn_worker(
    mut queue: mpsc::UnboundedReceiver<EmailMessage>,
    sender: Arc<dyn EmailSender>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let sender = Arc::clone(&sender);
            let to = message.to.clone();

            match tokio::task::spawn_blocking(move || sender.send(&message)).await {
                Ok(Ok(())) => debug!(%to, "notification delivered"),
                Ok(Err(err)) => warn!(%to, "notification delivery failed: {err:#}"),
                Err(err) => warn!(%to, "notification task failed: {err}"),
            }
        }
        debug!("notification worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl EmailSender for RecordingSender {
        fn send(&self, message: &EmailMessage) -> Result<()> {
            self.sent
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(message.clone());
            Ok(())
        }
    }

    struct FailingSender;

    impl EmailSender for FailingSender {
        fn send(&self, _message: &EmailMessage) -> Result<()> {
            anyhow::bail!("smtp unavailable")
        }
    }

    #[test]
    fn new_origin_message_names_the_ip() {
        let message = EmailMessage::new_origin("alice@example.com", "192.168.1.1");
        assert_eq!(message.to, "alice@example.com");
        assert!(message.body.contains("192.168.1.1"));
    }

    #[test]
    fn log_sender_always_succeeds() {
        let message = EmailMessage::new_origin("alice@example.com", "10.0.0.1");
        assert!(LogEmailSender.send(&message).is_ok());
    }

    #[tokio::test]
    async fn worker_delivers_queued_messages() {
        let (notifier, queue) = Notifier::channel();
        let sender = Arc::new(RecordingSender::default());
        let worker = spawn_worker(queue, sender.clone());

        notifier.notify_new_origin("alice@example.com", "192.168.1.1");
        notifier.notify_new_origin("bob@example.com", "192.168.1.2");
        drop(notifier);
        assert!(worker.await.is_ok());

        let sent = sender.sent.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "alice@example.com");
        assert_eq!(sent[1].to, "bob@example.com");
    }

    #[tokio::test]
    async fn worker_survives_delivery_failures() {
        let (notifier, queue) = Notifier::channel();
        let worker = spawn_worker(queue, Arc::new(FailingSender));

        notifier.notify_new_origin("alice@example.com", "192.168.1.1");
        notifier.notify_new_origin("alice@example.com", "192.168.1.2");
        drop(notifier);

        assert!(worker.await.is_ok());
    }

    #[test]
    fn dispatch_on_closed_queue_is_ignored() {
        let (notifier, queue) = Notifier::channel();
        drop(queue);
        notifier.notify_new_origin("alice@example.com", "192.168.1.1");
    }

    #[test]
    fn smtp_sender_rejects_bad_from_address() {
        let result = SmtpEmailSender::new("smtp.example.com", 587, None, "not an address");
        assert!(result.is_err());
    }

    #[test]
    fn smtp_sender_debug_hides_transport() {
        let sender = SmtpEmailSender::new(
            "smtp.example.com",
            587,
            Some(("mailer".to_string(), SecretString::from("hunter2"))),
            "Tandem <no-reply@example.com>",
        );
        if let Ok(sender) = sender {
            let rendered = format!("{sender:?}");
            assert!(rendered.contains("no-reply@example.com"));
            assert!(!rendered.contains("hunter2"));
        }
    }
}
