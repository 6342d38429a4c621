//! # Code Delivery
//!
//! The issuer never hands a code back to its caller. The only way a code
//! reaches the requester is through a [`Notifier`]: the HTTP mail gateway in
//! [`crate::mail`], a queue an embedder drains itself, or (in development
//! only) the log.
//!
//! Delivery is best-effort. The issuer spawns the send on the runtime and
//! moves on; a failed send is logged and the credential stays valid.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::catalog::ResourceId;
use crate::otp::OtpCode;

/// One code on its way to one requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Where to send the code, typically an email address.
    pub contact: String,
    pub resource_id: ResourceId,
    /// Display title of the resource, for the message body.
    pub title: String,
    pub secret: OtpCode,
    pub expires_at: DateTime<Utc>,
}

/// Why a delivery did not go out.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery channel closed")]
    ChannelClosed,

    /// The gateway refused the message; retrying will not help.
    #[error("delivery rejected: {0}")]
    Rejected(String),

    /// The gateway could not be reached or failed on its side.
    #[error("delivery transport failed: {0}")]
    Transport(String),

    /// The notifier could not be built from its configuration.
    #[error("notifier misconfigured: {0}")]
    Misconfigured(String),
}

/// Out-of-band delivery channel for codes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, delivery: Delivery) -> Result<(), NotifyError>;
}

/// Writes the code to the log instead of sending it anywhere.
///
/// For local development only: anyone who can read the logs can read every
/// code issued.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, delivery: Delivery) -> Result<(), NotifyError> {
        tracing::info!(
            contact = %delivery.contact,
            resource_id = delivery.resource_id,
            title = %delivery.title,
            code = %delivery.secret.expose(),
            expires_at = %delivery.expires_at.to_rfc3339(),
            "OTP issued (log delivery)"
        );
        Ok(())
    }
}

/// Hands deliveries to a queue for an embedder that runs its own mailer.
/// The node never drains one; test suites use it to read issued codes.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Delivery>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiving end of its queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, delivery: Delivery) -> Result<(), NotifyError> {
        self.tx
            .send(delivery)
            .await
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> Delivery {
        Delivery {
            contact: "patient@example.com".into(),
            resource_id: 1,
            title: "January 2025 Statement".into(),
            secret: OtpCode::from("123456"),
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn channel_notifier_forwards_deliveries() {
        let (notifier, mut rx) = ChannelNotifier::new(4);
        notifier.send(delivery()).await.unwrap();

        let received = rx.recv().await.expect("delivery queued");
        assert_eq!(received.contact, "patient@example.com");
        assert!(received.secret.matches("123456"));
    }

    #[tokio::test]
    async fn channel_notifier_reports_closed_queue() {
        let (notifier, rx) = ChannelNotifier::new(1);
        drop(rx);

        let err = notifier.send(delivery()).await.unwrap_err();
        assert!(matches!(err, NotifyError::ChannelClosed));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send(delivery()).await.is_ok());
    }
}
