//! Event notifications
//!
//! A [`Notifier`] delivers one plain-text message to a list of recipients.
//! The trigger engine never waits on delivery: it hands the message to
//! [`spawn_notification`] and moves on.

mod email;

pub use email::{EmailNotifier, SUBJECT};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Delivers plain-text notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `plain_text` to every address in `to`; an empty list sends nothing
    async fn send_notification(&self, to: &[String], plain_text: &str) -> NotifyResult<()>;
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, to: &[String], plain_text: &str) -> NotifyResult<()> {
        if to.is_empty() {
            return Ok(());
        }
        info!(recipients = %to.join(","), text = %plain_text, "Notification");
        Ok(())
    }
}

/// Send a notification in the background, logging any failure
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    to: Vec<String>,
    plain_text: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.send_notification(&to, &plain_text).await {
            error!(recipients = %to.join(","), error = %e, "Failed to send notification");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Failing(mpsc::UnboundedSender<()>);

    #[async_trait]
    impl Notifier for Failing {
        async fn send_notification(&self, _to: &[String], _text: &str) -> NotifyResult<()> {
            let _ = self.0.send(());
            Err(NotifyError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_spawned_failure_is_swallowed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_notification(
            Arc::new(Failing(tx)),
            vec!["a@b.com".to_string()],
            "hello".to_string(),
        );

        handle.await.unwrap();
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_empty_list() {
        assert!(LogNotifier.send_notification(&[], "x").await.is_ok());
    }
}
