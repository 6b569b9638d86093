//! Building the plain text mails the tracker writes itself: control replies,
//! confirmation requests and bounce notifications.

use lettre::message::{
    Mailbox, Message,
    header::{ContentType, HeaderName, HeaderValue},
};

use crate::{error::DispatchError, transport::OutgoingMessage};

#[derive(Debug, Clone, Default)]
pub struct MailBuilder {
    envelope_from: Option<String>,
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    subject: String,
    body: String,
    in_reply_to: Option<String>,
    references: Option<String>,
    headers: Vec<(String, String)>,
}

impl MailBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope sender. Defaults to the `From` address.
    #[must_use]
    pub fn envelope_from(mut self, address: impl Into<String>) -> Self {
        self.envelope_from = Some(address.into());
        self
    }

    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn in_reply_to(mut self, message_id: Option<&str>) -> Self {
        self.in_reply_to = message_id.map(str::to_string);
        self
    }

    #[must_use]
    pub fn references(mut self, message_id: Option<&str>) -> Self {
        self.references = message_id.map(str::to_string);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Render the message and its envelope.
    ///
    /// # Errors
    /// If there is no sender or recipient, or an address cannot be parsed.
    pub fn build(self) -> Result<OutgoingMessage, DispatchError> {
        let from = self
            .from
            .ok_or_else(|| DispatchError::Compose("missing From address".to_string()))?;
        let sender = self.envelope_from.unwrap_or_else(|| from.clone());

        if self.to.is_empty() {
            return Err(DispatchError::Compose("no recipients".to_string()));
        }

        let mut builder = Message::builder()
            .from(mailbox(&from)?)
            .subject(self.subject);
        for to in &self.to {
            builder = builder.to(mailbox(to)?);
        }
        for cc in &self.cc {
            builder = builder.cc(mailbox(cc)?);
        }
        if let Some(in_reply_to) = self.in_reply_to {
            builder = builder.in_reply_to(in_reply_to);
        }
        if let Some(references) = self.references {
            builder = builder.references(references);
        }

        let recipients: Vec<String> = self.to.into_iter().chain(self.cc).collect();
        let envelope = lettre::address::Envelope::new(
            Some(address(&sender)?),
            recipients
                .iter()
                .map(|recipient| address(recipient))
                .collect::<Result<_, _>>()?,
        )
        .map_err(|e| DispatchError::Compose(e.to_string()))?;

        let mut message = builder
            .envelope(envelope)
            .header(ContentType::TEXT_PLAIN)
            .body(self.body)
            .map_err(|e| DispatchError::Compose(e.to_string()))?;

        for (name, value) in self.headers {
            let name = HeaderName::new_from_ascii(name)
                .map_err(|e| DispatchError::Compose(e.to_string()))?;
            message
                .headers_mut()
                .insert_raw(HeaderValue::new(name, value));
        }

        Ok(OutgoingMessage::new(sender, recipients, message.formatted()))
    }
}

fn mailbox(value: &str) -> Result<Mailbox, DispatchError> {
    value
        .parse()
        .map_err(|e| DispatchError::Compose(format!("{value:?}: {e}")))
}

fn address(value: &str) -> Result<lettre::Address, DispatchError> {
    value
        .parse()
        .map_err(|e| DispatchError::Compose(format!("{value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tracker_common::Email;

    use super::*;

    #[test]
    fn renders_reply_headers_and_envelope() {
        let message = MailBuilder::new()
            .envelope_from("bounces@tracker.example.org")
            .from("owner@tracker.example.org")
            .to("jane@example.com")
            .cc("john@example.com")
            .subject("Re: help")
            .in_reply_to(Some("<abc@example.com>"))
            .references(Some("<abc@example.com>"))
            .header("X-Loop", "control@tracker.example.org")
            .body("> help\nAvailable commands:\n")
            .build()
            .unwrap();

        assert_eq!(message.sender, "bounces@tracker.example.org");
        assert_eq!(message.recipients, vec!["jane@example.com", "john@example.com"]);

        let parsed = Email::parse(message.data).unwrap();
        assert_eq!(parsed.subject(), Some("Re: help"));
        assert_eq!(parsed.header("X-Loop"), Some("control@tracker.example.org"));
        assert_eq!(parsed.header("In-Reply-To"), Some("<abc@example.com>"));
        assert!(parsed.header("Cc").unwrap().contains("john@example.com"));
        assert!(parsed.plain_text().unwrap().unwrap().contains("Available commands:"));
    }

    #[test]
    fn envelope_sender_defaults_to_from() {
        let message = MailBuilder::new()
            .from("owner@tracker.example.org")
            .to("jane@example.com")
            .build()
            .unwrap();

        assert_eq!(message.sender, "owner@tracker.example.org");
    }

    #[test]
    fn needs_sender_and_recipient() {
        assert!(MailBuilder::new().to("jane@example.com").build().is_err());
        assert!(
            MailBuilder::new()
                .from("owner@tracker.example.org")
                .build()
                .is_err()
        );
        assert!(
            MailBuilder::new()
                .from("owner@tracker.example.org")
                .to("not an address")
                .build()
                .is_err()
        );
    }
}
