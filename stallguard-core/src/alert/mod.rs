//! Alert composition and dispatch for stalled files.
//!
//! The notifier turns a [`StalledFileSet`] into one HTML message and hands
//! it to a [`MailTransport`] exactly once. Recipient problems are tolerated
//! (bad addresses are logged and dropped); transport failures are reported
//! to the caller and never retried.

use std::error::Error as StdError;
use std::fmt::Write as _;

use chrono::Local;
use lettre::message::Mailbox;
use thiserror::Error;
use tracing::{info, warn};

use crate::detect::StalledFileSet;
use crate::error::ConfigurationError;

pub mod smtp;

pub use smtp::SmtpMailer;

/// Relay endpoint for outgoing alerts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    /// Relay host name or address.
    pub host: String,
    /// Relay port.
    pub port: u16,
}

/// Everything needed to address and word an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSettings {
    /// Primary recipients, unparsed.
    pub to: Vec<String>,
    /// Carbon-copy recipients, unparsed.
    pub cc: Vec<String>,
    /// Sender address.
    pub from: String,
    /// Subject line.
    pub subject: String,
    /// Text placed above the file listing. Inserted as-is, so it may carry
    /// HTML markup.
    pub body_prefix: String,
    /// Where to send it.
    pub smtp: SmtpSettings,
}

/// A fully composed alert, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    /// Parsed sender.
    pub from: Mailbox,
    /// Valid primary recipients.
    pub to: Vec<Mailbox>,
    /// Valid carbon-copy recipients.
    pub cc: Vec<Mailbox>,
    /// Subject line.
    pub subject: String,
    /// Complete HTML body.
    pub html_body: String,
}

/// Delivers composed alerts. One call is one delivery attempt.
#[cfg_attr(test, mockall::automock)]
pub trait MailTransport {
    /// Hand `message` to the relay described by `smtp`.
    fn send(
        &self,
        smtp: &SmtpSettings,
        message: &AlertMessage,
    ) -> Result<(), TransportError>;
}

/// A delivery attempt failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The message could not be serialized for the wire.
    #[error("failed to compose alert message")]
    Compose(#[source] lettre::error::Error),

    /// The relay was unreachable or rejected the message.
    #[error("SMTP relay {host}:{port} did not accept the message")]
    Smtp {
        /// Relay host.
        host: String,
        /// Relay port.
        port: u16,
        /// Underlying SMTP error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// A recipient entry that is not a usable email address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {field} recipient '{address}': {reason}")]
pub struct RecipientConfigurationError {
    /// `to` or `cc`.
    pub field: &'static str,
    /// The entry as configured.
    pub address: String,
    /// Parser message.
    pub reason: String,
}

/// Why an alert was not sent.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Sender or recipients are unusable.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The single delivery attempt failed.
    #[error(transparent)]
    Delivery(#[from] TransportError),
}

/// Result of a successful [`notify`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The stalled set was empty; no transport call was made.
    NothingToSend,
    /// One message was accepted by the relay.
    Sent {
        /// Files listed in the alert.
        files: usize,
        /// Addresses the message went to.
        recipients: usize,
        /// Recipient entries dropped as invalid.
        rejected: Vec<RecipientConfigurationError>,
    },
}

/// Send a single alert listing every file in `stalled`.
pub fn notify(
    stalled: &StalledFileSet,
    settings: &AlertSettings,
    transport: &dyn MailTransport,
) -> Result<NotifyOutcome, NotifyError> {
    if stalled.is_empty() {
        return Ok(NotifyOutcome::NothingToSend);
    }

    let (message, rejected) = compose(stalled, settings)?;
    let recipients = message.to.len() + message.cc.len();

    info!(
        recipients,
        files = stalled.len(),
        relay = %format!("{}:{}", settings.smtp.host, settings.smtp.port),
        "sending notification to distribution list"
    );
    transport.send(&settings.smtp, &message)?;

    Ok(NotifyOutcome::Sent {
        files: stalled.len(),
        recipients,
        rejected,
    })
}

/// Build the alert message without sending it.
pub fn compose(
    stalled: &StalledFileSet,
    settings: &AlertSettings,
) -> Result<
    (AlertMessage, Vec<RecipientConfigurationError>),
    ConfigurationError,
> {
    let from = settings.from.trim().parse::<Mailbox>().map_err(|err| {
        ConfigurationError::invalid("from", &settings.from, err.to_string())
    })?;

    let mut rejected = Vec::new();
    let to = parse_recipients("to", &settings.to, &mut rejected);
    let cc = parse_recipients("cc", &settings.cc, &mut rejected);

    if to.is_empty() && cc.is_empty() {
        return Err(ConfigurationError::invalid(
            "to",
            settings.to.join(";"),
            "no valid recipient addresses",
        ));
    }

    let message = AlertMessage {
        from,
        to,
        cc,
        subject: settings.subject.clone(),
        html_body: render_body(&settings.body_prefix, stalled),
    };
    Ok((message, rejected))
}

fn parse_recipients(
    field: &'static str,
    raw: &[String],
    rejected: &mut Vec<RecipientConfigurationError>,
) -> Vec<Mailbox> {
    let mut parsed = Vec::with_capacity(raw.len());
    for address in raw {
        match address.parse::<Mailbox>() {
            Ok(mailbox) => parsed.push(mailbox),
            Err(err) => {
                let issue = RecipientConfigurationError {
                    field,
                    address: address.clone(),
                    reason: err.to_string(),
                };
                warn!("{issue}; continuing with remaining recipients");
                rejected.push(issue);
            }
        }
    }
    parsed
}

/// Prefix, a blank line, then `name : Created on <local time>` per file.
pub fn render_body(prefix: &str, stalled: &StalledFileSet) -> String {
    let mut body = format!("<p>{prefix}<br><br>\n");
    for record in stalled {
        let created = record.created.with_timezone(&Local);
        let _ = writeln!(
            body,
            "{} : Created on {}<br>",
            escape_html(&record.name),
            created.format("%Y-%m-%d %H:%M:%S")
        );
    }
    body.push_str("</p>");
    body
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
