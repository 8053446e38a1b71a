//! SMTP delivery

use crate::{Notifier, NotifyError, NotifyResult};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};
use trygr_config::SmtpConfig;

pub const SUBJECT: &str = "Trygr Event Notification";

#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> NotifyResult<Self> {
        let from = parse_mailbox(&config.from)?;

        // `secure` means TLS from the first byte (SMTPS), not an upgrade
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotifyError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        info!(
            host = %config.host,
            port = config.port,
            secure = config.secure,
            "Set up email transport"
        );
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Build one message addressed to every valid recipient
    fn build_message(&self, to: &[String], plain_text: &str) -> NotifyResult<Message> {
        let mut builder = Message::builder().from(self.from.clone()).subject(SUBJECT);
        let mut valid = 0;

        for recipient in to {
            match parse_mailbox(recipient) {
                Ok(mailbox) => {
                    builder = builder.to(mailbox);
                    valid += 1;
                }
                Err(e) => warn!(recipient = %recipient, error = %e, "Skipping recipient"),
            }
        }

        if valid == 0 {
            return Err(NotifyError::InvalidAddress {
                address: to.join(","),
                reason: "no valid recipient".to_string(),
            });
        }

        builder
            .body(plain_text.to_owned())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_notification(&self, to: &[String], plain_text: &str) -> NotifyResult<()> {
        if to.is_empty() {
            return Ok(());
        }
        info!(recipients = %to.join(","), "Sending email");

        let message = self.build_message(to, plain_text)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        info!(recipients = %to.join(","), "Email sent");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> NotifyResult<Mailbox> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            secure: false,
            username: String::new(),
            password: String::new(),
            from: "Trygr <trygr@example.com>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_message_addressed_to_all_recipients() {
        let notifier = EmailNotifier::new(&config()).unwrap();
        let message = notifier
            .build_message(
                &["a@b.com".to_string(), "not an address".to_string(), "c@d.com".to_string()],
                "Heater | D1 turn on",
            )
            .unwrap();

        let to: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(to, vec!["a@b.com", "c@d.com"]);

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Trygr Event Notification"));
    }

    #[tokio::test]
    async fn test_all_invalid_recipients_rejected() {
        let notifier = EmailNotifier::new(&config()).unwrap();
        let result = notifier.build_message(&["nope".to_string()], "x");
        assert!(matches!(result, Err(NotifyError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_empty_recipients_sends_nothing() {
        let notifier = EmailNotifier::new(&config()).unwrap();
        assert!(notifier.send_notification(&[], "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_secure_transport_on_smtps_port() {
        let mut smtps = config();
        smtps.host = "smtp.example.com".to_string();
        smtps.port = 465;
        smtps.secure = true;
        smtps.username = "trygr".to_string();
        smtps.password = "hunter2".to_string();

        assert!(EmailNotifier::new(&smtps).is_ok());
    }

    #[test]
    fn test_invalid_from_address() {
        let mut bad = config();
        bad.from = "not an address".to_string();
        assert!(matches!(
            EmailNotifier::new(&bad),
            Err(NotifyError::InvalidAddress { .. })
        ));
    }
}
