use std::fmt;

use chrono::{Duration, Utc};
use tracker_common::internal;

use crate::{
    command::{Command, Session},
    error::ControlError,
    processor::CommandProcessor,
    reply::Reply,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Help;

impl fmt::Display for Help {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("help")
    }
}

impl Command for Help {
    fn execute(&mut self, _session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        reply.reply("You can use the following commands:");
        for description in super::descriptions() {
            reply.reply(description);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quit;

impl fmt::Display for Quit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("quit")
    }
}

impl Command for Quit {
    fn execute(&mut self, _session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        reply.reply("Stopping processing here.");
        Ok(())
    }

    fn is_quit(&self) -> bool {
        true
    }
}

/// Replays the commands stored under `key` with confirmation granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirm {
    pub key: String,
}

impl fmt::Display for Confirm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "confirm {}", self.key)
    }
}

impl Command for Confirm {
    #[tracing::instrument(level = "debug", skip(self, session, reply), fields(key = %self.key))]
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let store = session.store();
        let days = session.config().confirmation_expiration_days;

        let purged = store.purge_confirmations(Utc::now() - Duration::days(i64::from(days)))?;
        if purged > 0 {
            internal!(level = DEBUG, "Purged {purged} expired confirmations");
        }

        let Some(confirmation) = store.confirmation(&self.key)? else {
            reply.error("Confirmation failed: unknown key.");
            return Ok(());
        };

        let mut processor = CommandProcessor::new(session.dispatcher, None).confirmed();
        processor.process(confirmation.commands.iter().map(String::as_str))?;

        if processor.is_success() {
            reply.reply("Successfully confirmed commands:");
        } else {
            reply.error("No commands confirmed.");
        }
        reply.reply(processor.output());

        store.delete_confirmation(&self.key)?;
        Ok(())
    }
}
