use std::collections::BTreeMap;

use tracker_common::outgoing;
use tracker_dispatch::{DispatchError, Dispatcher, MailBuilder};

use crate::error::ControlError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending {
    text: String,
    message: String,
}

/// Commands of one run that wait for confirmation, grouped by the address
/// that has to confirm them. Mails go out once every line was processed, so
/// each address gets a single key.
#[derive(Debug, Default)]
pub struct ConfirmationSet {
    pending: BTreeMap<String, Vec<Pending>>,
}

impl ConfirmationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, email: &str, text: String, message: String) {
        self.pending
            .entry(email.to_string())
            .or_default()
            .push(Pending { text, message });
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Addresses that will receive a confirmation mail.
    pub fn emails(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    /// Command texts waiting on `email`.
    pub fn commands_for(&self, email: &str) -> Vec<&str> {
        self.pending
            .get(email)
            .map(|pending| pending.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    /// Store every batch under a fresh key and mail it out. Returns the
    /// addresses that were asked. A batch whose mail is refused is dropped
    /// together with its key.
    pub fn ask_all(&self, dispatcher: &Dispatcher) -> Result<Vec<String>, ControlError> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let config = dispatcher.config();
        let mut connection = dispatcher.transport().connect()?;
        let mut asked = Vec::with_capacity(self.pending.len());

        for (email, pending) in &self.pending {
            let commands = pending.iter().map(|p| p.text.clone()).collect();
            let confirmation = dispatcher.store().create_confirmation(commands)?;

            let sent = MailBuilder::new()
                .envelope_from(&config.bounces_email)
                .from(&config.control_email)
                .to(email)
                .subject(format!("CONFIRM {}", confirmation.key))
                .body(confirmation_body(
                    email,
                    &confirmation.key,
                    &config.control_email,
                    pending,
                ))
                .build()
                .and_then(|message| connection.send(&message).map_err(DispatchError::from));

            match sent {
                Ok(()) => {
                    outgoing!(level = INFO, "Sent confirmation request to {email}");
                    asked.push(email.clone());
                }
                Err(e) => {
                    outgoing!(level = WARN, "Unable to ask {email} for confirmation: {e}");
                    dispatcher.store().delete_confirmation(&confirmation.key)?;
                }
            }
        }

        Ok(asked)
    }
}

fn confirmation_body(email: &str, key: &str, control: &str, pending: &[Pending]) -> String {
    let mut body = format!(
        "Hello,\n\n\
         the following commands were sent to {control} on behalf of\n\
         {email} and need your confirmation:\n\n"
    );

    for Pending { text, message } in pending {
        body.push_str("  ");
        body.push_str(text);
        body.push('\n');
        if !message.is_empty() {
            for line in message.lines() {
                body.push_str("    ");
                body.push_str(line);
                body.push('\n');
            }
        }
    }

    body.push_str(&format!(
        "\nTo confirm them, reply to this mail keeping the subject, or send\n\
         \"confirm {key}\" to {control}.\n\
         If you did not ask for this, simply ignore this mail.\n"
    ));

    body
}
