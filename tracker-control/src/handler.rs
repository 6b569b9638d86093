use std::sync::LazyLock;

use regex::Regex;
use tracker_common::{Email, incoming, internal, outgoing};
use tracker_dispatch::{Dispatcher, MailBuilder};

use crate::{error::ControlError, processor::CommandProcessor};

const PLAIN_TEXT_WARNING: &str = "\
Hello,

the tracker only reads commands from the text/plain part of a message,
and your mail did not contain one it could decode. Please send your
commands again as plain text.

Send \"help\" on its own line for the list of available commands.
";

static SUBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Re\s*:\s*)?(.*)$")
        .inspect_err(|e| internal!(level = ERROR, "Invalid subject pattern: {e}"))
        .ok()
});

/// What became of a control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The message came back from the control address itself.
    Looped,
    /// There was no readable text part; a warning was sent back.
    NotPlainText,
    /// No line held a command, so nothing was sent back.
    NoCommands,
    Replied { confirmations: usize },
}

/// Handles mail sent to the control address.
#[derive(Debug, Clone)]
pub struct ControlHandler {
    dispatcher: Dispatcher,
}

impl ControlHandler {
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Run the commands in `email` and reply to its sender.
    ///
    /// Confirmation requests are sent before the reply, which copies every
    /// address that was asked to confirm something.
    ///
    /// # Errors
    /// If a command fails against the store, or a reply cannot be composed
    /// or sent.
    #[tracing::instrument(level = "debug", skip_all, fields(message_id = email.message_id()))]
    pub fn handle(&self, email: &Email) -> Result<ControlOutcome, ControlError> {
        let config = self.dispatcher.config();

        if email.loops_through(&config.control_email) {
            incoming!(level = INFO, "Dropping control message that loops through {}", config.control_email);
            return Ok(ControlOutcome::Looped);
        }

        let text = match email.plain_text() {
            Ok(Some(text)) => text,
            Ok(None) => {
                incoming!(level = INFO, "Control message has no text/plain part");
                self.respond(email, PLAIN_TEXT_WARNING.to_string(), &[])?;
                return Ok(ControlOutcome::NotPlainText);
            }
            Err(e) => {
                incoming!(level = WARN, "Unable to decode control message: {e}");
                self.respond(email, PLAIN_TEXT_WARNING.to_string(), &[])?;
                return Ok(ControlOutcome::NotPlainText);
            }
        };

        let sender = email.from_address();
        let mut processor = CommandProcessor::new(&self.dispatcher, sender.as_deref());

        processor.process(
            subject_lines(email)
                .iter()
                .map(String::as_str)
                .chain(text.lines()),
        )?;

        let asked = processor.confirmations().ask_all(&self.dispatcher)?;

        if !processor.is_success() {
            incoming!(level = INFO, "Control message held no commands");
            return Ok(ControlOutcome::NoCommands);
        }

        let cc: Vec<&str> = asked.iter().map(String::as_str).collect();
        self.respond(email, processor.output(), &cc)?;

        Ok(ControlOutcome::Replied {
            confirmations: asked.len(),
        })
    }

    /// Reply to `original` from the contact address.
    fn respond(&self, original: &Email, body: String, cc: &[&str]) -> Result<(), ControlError> {
        let config = self.dispatcher.config();

        let Some(to) = original.from_address() else {
            outgoing!(level = WARN, "Control message has no usable From address, not replying");
            return Ok(());
        };

        let message_id = original.message_id();
        let references = [original.header("References"), message_id]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        let mut builder = MailBuilder::new()
            .envelope_from(&config.bounces_email)
            .from(&config.contact_email)
            .to(to)
            .subject(format!(
                "Re: {}",
                original.subject().filter(|s| !s.is_empty()).unwrap_or("Your mail")
            ))
            .header("X-Loop", &config.control_email)
            .in_reply_to(message_id)
            .references((!references.is_empty()).then_some(references.as_str()))
            .body(body);
        for address in cc {
            builder = builder.cc(*address);
        }

        let reply = builder.build()?;
        self.dispatcher.transport().connect()?.send(&reply)?;
        outgoing!(level = INFO, "Sent control reply to {}", reply.recipients.join(", "));

        Ok(())
    }
}

/// The subject is processed as a first command line, after a comment.
fn subject_lines(email: &Email) -> Vec<String> {
    let Some(subject) = email.subject() else {
        return Vec::new();
    };

    let command = SUBJECT
        .as_ref()
        .and_then(|pattern| pattern.captures(subject))
        .and_then(|captures| captures.get(1))
        .map_or(subject, |m| m.as_str());

    vec!["# Message subject".to_string(), command.to_string()]
}
