//! [`MailTransport`] over a plain SMTP relay.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::{Message, SmtpTransport, Transport};
use tracing::debug;

use super::{AlertMessage, MailTransport, SmtpSettings, TransportError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain SMTP relay delivery: no authentication, no TLS upgrade.
///
/// A connection is opened per send.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    timeout: Duration,
}

impl Default for SmtpMailer {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SmtpMailer {
    /// Mailer with a 30 second timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the connect and command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl MailTransport for SmtpMailer {
    fn send(
        &self,
        smtp: &SmtpSettings,
        message: &AlertMessage,
    ) -> Result<(), TransportError> {
        let email = build_message(message)?;

        let transport = SmtpTransport::builder_dangerous(smtp.host.as_str())
            .port(smtp.port)
            .timeout(Some(self.timeout))
            .build();

        let response =
            transport
                .send(&email)
                .map_err(|err| TransportError::Smtp {
                    host: smtp.host.clone(),
                    port: smtp.port,
                    source: Box::new(err),
                })?;
        debug!(code = %response.code(), "relay accepted alert");
        Ok(())
    }
}

fn build_message(message: &AlertMessage) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(message.from.clone())
        .subject(message.subject.clone())
        .header(ContentType::TEXT_HTML);
    for to in &message.to {
        builder = builder.to(to.clone());
    }
    for cc in &message.cc {
        builder = builder.cc(cc.clone());
    }
    builder
        .body(message.html_body.clone())
        .map_err(TransportError::Compose)
}
