use std::collections::HashSet;

use tracker_common::incoming;
use tracker_dispatch::Dispatcher;

use crate::{
    command::{Command, Session},
    commands,
    confirmation::ConfirmationSet,
    error::ControlError,
    reply::Reply,
};

/// Runs the lines of one control message, collecting the reply text.
///
/// Every line is echoed back quoted. Commands whose normalised text was
/// already run in this message are skipped, and processing stops on `quit`
/// or once too many lines failed to parse.
#[derive(Debug)]
pub struct CommandProcessor<'a> {
    dispatcher: &'a Dispatcher,
    sender: Option<String>,
    confirmed: bool,
    max_errors: usize,
    confirmations: ConfirmationSet,
    out: Vec<String>,
    errors: usize,
    processed: HashSet<String>,
}

impl<'a> CommandProcessor<'a> {
    /// `sender` fills in the email of commands that omit it.
    pub fn new(dispatcher: &'a Dispatcher, sender: Option<&str>) -> Self {
        Self {
            dispatcher,
            sender: sender.map(str::to_string),
            confirmed: false,
            max_errors: dispatcher.config().max_allowed_errors,
            confirmations: ConfirmationSet::new(),
            out: Vec::new(),
            errors: 0,
            processed: HashSet::new(),
        }
    }

    /// Confirmable commands take effect immediately instead of asking.
    #[must_use]
    pub const fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    /// Process `lines`.
    ///
    /// # Errors
    /// If a command fails against the store or the transport. Output
    /// gathered so far is kept.
    pub fn process<'l, I>(&mut self, lines: I) -> Result<(), ControlError>
    where
        I: IntoIterator<Item = &'l str>,
    {
        if self.errors >= self.max_errors {
            return Ok(());
        }

        for line in lines {
            let line = line.trim();
            self.out.push(format!("> {line}"));

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(mut command) = commands::parse(line, self.sender.as_deref()) else {
                self.errors += 1;
                if self.errors >= self.max_errors {
                    self.out
                        .push(format!("{} lines without commands: stopping.", self.max_errors));
                    return Ok(());
                }
                continue;
            };

            self.run(command.as_mut())?;

            if command.is_quit() {
                return Ok(());
            }
        }

        Ok(())
    }

    fn run(&mut self, command: &mut dyn Command) -> Result<(), ControlError> {
        let text = command.to_string();
        if self.processed.contains(&text) {
            return Ok(());
        }

        incoming!(level = DEBUG, "Running control command: {text}");

        let mut reply = Reply::new();
        let mut session = Session {
            dispatcher: self.dispatcher,
            confirmed: self.confirmed,
            confirmations: &mut self.confirmations,
        };
        command.execute(&mut session, &mut reply)?;

        self.out.push(reply.render());
        self.processed.insert(text);

        Ok(())
    }

    /// Whether at least one command was run.
    pub fn is_success(&self) -> bool {
        !self.processed.is_empty()
    }

    pub fn output(&self) -> String {
        self.out.join("\n")
    }

    /// Commands waiting for confirmation after this run.
    pub const fn confirmations(&self) -> &ConfirmationSet {
        &self.confirmations
    }
}
