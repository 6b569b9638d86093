use std::fmt;

use tracker_store::PackageKind;

use crate::{
    command::{Command, Confirmable, Session},
    error::ControlError,
    reply::Reply,
};

/// Resolve `package` to a source package name, explaining the mapping or
/// the lack of one in `reply`.
fn resolve_source(
    session: &Session<'_>,
    package: &str,
    reply: &mut Reply,
    explain_pseudo: bool,
) -> Result<String, ControlError> {
    match session.store().package_kind(package)? {
        Some(PackageKind::Source) => {}
        Some(PackageKind::Binary { source }) => {
            reply.warn(format_args!("{package} is not a source package."));
            reply.reply(format!(
                "{source} is the source package for the {package} binary package"
            ));
            return Ok(source);
        }
        kind => {
            reply.warn(format_args!(
                "{package} is neither a source package nor a binary package."
            ));
            if explain_pseudo {
                if kind == Some(PackageKind::Pseudo) {
                    reply.warn(format_args!("Package {package} is a pseudo package."));
                } else {
                    reply.warn(format_args!("Package {package} is not even a pseudo package."));
                }
            }
        }
    }

    Ok(package.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub package: String,
    pub email: String,
}

impl fmt::Display for Subscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscribe {} {}", self.package, self.email)
    }
}

impl Confirmable for Subscribe {
    fn user_email(&self) -> &str {
        &self.email
    }

    fn pre_confirm(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<bool, ControlError> {
        let store = session.store();

        if store.is_subscribed(&self.email, &self.package)? {
            reply.warn(format_args!(
                "{} is already subscribed to {}",
                self.email, self.package
            ));
            return Ok(false);
        }

        self.package = resolve_source(session, &self.package, reply, true)?;

        if store.subscribe(&self.email, &self.package, false)?.is_none() {
            reply.warn(format_args!("Package {} does not exist", self.package));
            return Ok(false);
        }

        reply.reply(format!("A confirmation mail has been sent to {}", self.email));
        Ok(true)
    }

    fn confirmation_message(&self) -> String {
        format!(
            "Subscribes you to {}: you will receive its mail for every keyword\n\
             you accept.",
            self.package
        )
    }

    fn handle(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        if session
            .store()
            .subscribe(&self.email, &self.package, true)?
            .is_some()
        {
            reply.reply(format!(
                "{} has been subscribed to {}",
                self.email, self.package
            ));
        } else {
            reply.error(format_args!(
                "Could not subscribe {} to {}",
                self.email, self.package
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub package: String,
    pub email: String,
}

impl fmt::Display for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsubscribe {} {}", self.package, self.email)
    }
}

impl Confirmable for Unsubscribe {
    fn user_email(&self) -> &str {
        &self.email
    }

    fn pre_confirm(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<bool, ControlError> {
        self.package = resolve_source(session, &self.package, reply, false)?;

        if !session.store().is_subscribed(&self.email, &self.package)? {
            reply.error(format_args!(
                "{} is not subscribed, you can't unsubscribe.",
                self.email
            ));
            return Ok(false);
        }

        reply.reply(format!("A confirmation mail has been sent to {}", self.email));
        Ok(true)
    }

    fn confirmation_message(&self) -> String {
        format!("Unsubscribes you from {}.", self.package)
    }

    fn handle(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        if session.store().unsubscribe(&self.email, &self.package)? {
            reply.reply(format!(
                "{} has been unsubscribed from {}",
                self.email, self.package
            ));
        } else {
            reply.error(format_args!(
                "Could not unsubscribe {} from {}",
                self.email, self.package
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeAll {
    pub email: String,
}

impl fmt::Display for UnsubscribeAll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsubscribeall {}", self.email)
    }
}

impl Confirmable for UnsubscribeAll {
    fn user_email(&self) -> &str {
        &self.email
    }

    fn pre_confirm(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<bool, ControlError> {
        if session.store().subscriptions_of(&self.email)?.is_empty() {
            reply.warn(format_args!(
                "User {} is not subscribed to any packages",
                self.email
            ));
            return Ok(false);
        }

        reply.reply(format!("A confirmation mail has been sent to {}", self.email));
        Ok(true)
    }

    fn confirmation_message(&self) -> String {
        "Cancels every one of your subscriptions.".to_string()
    }

    fn handle(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let mut packages = session.store().unsubscribe_all(&self.email)?;
        packages.sort();

        let fqdn = &session.config().fqdn;
        reply.reply("All your subscriptions have been terminated:");
        reply.list(packages.iter().map(|package| {
            format!(
                "{} has been unsubscribed from {package}@{fqdn}",
                self.email
            )
        }));

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Which {
    pub email: String,
}

impl fmt::Display for Which {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "which {}", self.email)
    }
}

impl Command for Which {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let subscriptions = session.store().subscriptions_of(&self.email)?;

        if subscriptions.is_empty() {
            reply.reply("No subscriptions found");
        } else {
            reply.list(subscriptions.iter().map(|subscription| &subscription.package));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Who {
    pub package: String,
}

impl fmt::Display for Who {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "who {}", self.package)
    }
}

/// Keep the local part; reduce every domain label to its first character.
fn obfuscate(email: &str) -> String {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return email.to_string();
    };

    let domain = domain
        .split('.')
        .map(|label| {
            let mut chars = label.chars();
            chars.next().map_or_else(String::new, |first| {
                std::iter::once(first)
                    .chain(chars.map(|_| '.'))
                    .collect()
            })
        })
        .collect::<Vec<_>>()
        .join(".");

    format!("{local}@{domain}")
}

impl Command for Who {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let store = session.store();

        if store.package_kind(&self.package)?.is_none() {
            reply.error(format_args!("Package {} does not exist", self.package));
            return Ok(());
        }

        let subscribers = store.subscribers_of(&self.package)?;
        if subscribers.is_empty() {
            reply.reply(format!(
                "Package {} does not have any subscribers",
                self.package
            ));
            return Ok(());
        }

        reply.reply(format!(
            "Here's the list of subscribers to package {}:",
            self.package
        ));
        reply.list(subscribers.iter().map(|email| obfuscate(email)));

        Ok(())
    }
}
