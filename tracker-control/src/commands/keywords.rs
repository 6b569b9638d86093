use std::{collections::BTreeSet, fmt};

use tracker_store::{SubscriberStore, Subscription};

use crate::{
    command::{Command, Session},
    error::ControlError,
    reply::Reply,
};

/// How a keyword list changes an accepted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordOperation {
    Add,
    Remove,
    Set,
}

impl KeywordOperation {
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Remove),
            "=" => Some(Self::Set),
            _ => None,
        }
    }

    /// Apply the operation with the valid names of `keywords`, warning about
    /// the rest.
    fn apply(
        self,
        store: &dyn SubscriberStore,
        keywords: &str,
        accepted: &mut BTreeSet<String>,
        reply: &mut Reply,
    ) -> Result<(), ControlError> {
        let mut valid = Vec::new();
        for name in split_keywords(keywords) {
            if store.keyword_exists(name)? {
                valid.push(name.to_string());
            } else {
                reply.warn(format_args!("{name} is not a valid keyword"));
            }
        }

        match self {
            Self::Add => accepted.extend(valid),
            Self::Remove => {
                for name in &valid {
                    accepted.remove(name);
                }
            }
            Self::Set => *accepted = valid.into_iter().collect(),
        }

        Ok(())
    }
}

impl fmt::Display for KeywordOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Remove => "-",
            Self::Set => "=",
        })
    }
}

/// Keyword lists are separated by commas, whitespace or both.
fn split_keywords(keywords: &str) -> impl Iterator<Item = &str> {
    keywords
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|name| !name.is_empty())
}

/// The subscription keyword commands act on, or an error explaining why
/// there is none.
fn subscription(
    store: &dyn SubscriberStore,
    email: &str,
    package: &str,
    reply: &mut Reply,
) -> Result<Option<Subscription>, ControlError> {
    if store.package_kind(package)?.is_none() {
        reply.error(format_args!("Package {package} does not exist"));
        return Ok(None);
    }

    let subscription = store.subscription(email, package)?;
    if subscription.is_none() {
        reply.error(format_args!(
            "{email} is not subscribed to the package {package}"
        ));
    }

    Ok(subscription)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefaultKeywords {
    pub email: String,
}

impl fmt::Display for ViewDefaultKeywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-default-keywords {}", self.email)
    }
}

impl Command for ViewDefaultKeywords {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let keywords = session.store().default_keywords(&self.email)?;

        reply.reply(format!(
            "Here's the default list of accepted keywords for {}:",
            self.email
        ));
        reply.list(&keywords);

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPackageKeywords {
    pub package: String,
    pub email: String,
}

impl fmt::Display for ViewPackageKeywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-package-keywords {} {}", self.package, self.email)
    }
}

impl Command for ViewPackageKeywords {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let store = session.store();
        let Some(subscription) = subscription(store, &self.email, &self.package, reply)? else {
            return Ok(());
        };
        let defaults = store.default_keywords(&self.email)?;

        reply.reply("Here's the list of accepted keywords associated to package");
        reply.reply(format!("{} for {}", self.package, self.email));
        reply.list(subscription.effective_keywords(&defaults));

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDefaultKeywords {
    pub email: String,
    pub operation: KeywordOperation,
    pub keywords: String,
}

impl fmt::Display for SetDefaultKeywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "set-default-keywords {} {} {}",
            self.email, self.operation, self.keywords
        )
    }
}

impl Command for SetDefaultKeywords {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let store = session.store();
        let mut keywords = store.default_keywords(&self.email)?;

        self.operation
            .apply(store, &self.keywords, &mut keywords, reply)?;
        store.set_default_keywords(&self.email, keywords.clone())?;

        reply.reply(format!(
            "Here's the new default list of accepted keywords for {} :",
            self.email
        ));
        reply.list(&keywords);

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPackageKeywords {
    pub package: String,
    pub email: String,
    pub operation: KeywordOperation,
    pub keywords: String,
}

impl fmt::Display for SetPackageKeywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "set-package-keywords {} {} {} {}",
            self.package, self.email, self.operation, self.keywords
        )
    }
}

impl Command for SetPackageKeywords {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let store = session.store();
        let Some(subscription) = subscription(store, &self.email, &self.package, reply)? else {
            return Ok(());
        };

        let defaults = store.default_keywords(&self.email)?;
        let mut keywords = subscription.effective_keywords(&defaults).clone();

        self.operation
            .apply(store, &self.keywords, &mut keywords, reply)?;
        store.set_subscription_keywords(&self.email, &self.package, keywords.clone())?;

        reply.reply(format!(
            "Here's the new list of accepted keywords associated to package\n{} for {} :",
            self.package, self.email
        ));
        reply.list(&keywords);

        Ok(())
    }
}
