use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    error::Result,
    models::{BounceStats, CommandConfirmation, Keyword, PackageKind, Subscription, Team},
};

/// Lookup and mutation of everything the mail core knows about people.
///
/// Calls are synchronous and may block the calling thread; the mail core
/// only calls them from worker threads. Users are created on first use, so
/// reading the defaults of an unknown address yields the default keyword set.
pub trait SubscriberStore: Send + Sync + std::fmt::Debug {
    fn package_kind(&self, package: &str) -> Result<Option<PackageKind>>;

    fn keyword(&self, name: &str) -> Result<Option<Keyword>>;

    fn keyword_exists(&self, name: &str) -> Result<bool> {
        Ok(self.keyword(name)?.is_some())
    }

    fn default_keywords(&self, email: &str) -> Result<BTreeSet<String>>;

    fn set_default_keywords(&self, email: &str, keywords: BTreeSet<String>) -> Result<()>;

    fn subscription(&self, email: &str, package: &str) -> Result<Option<Subscription>>;

    /// Whether `email` holds an *active* subscription to `package`.
    fn is_subscribed(&self, email: &str, package: &str) -> Result<bool> {
        Ok(self
            .subscription(email, package)?
            .is_some_and(|subscription| subscription.active))
    }

    /// Create the subscription, or update the active flag of an existing one.
    /// Returns `None` when the package is unknown.
    fn subscribe(&self, email: &str, package: &str, active: bool)
    -> Result<Option<Subscription>>;

    /// Returns whether a subscription existed.
    fn unsubscribe(&self, email: &str, package: &str) -> Result<bool>;

    /// Drops every subscription of `email`, returning the package names.
    fn unsubscribe_all(&self, email: &str) -> Result<Vec<String>>;

    /// Active subscriptions of `email`, ordered by package.
    fn subscriptions_of(&self, email: &str) -> Result<Vec<Subscription>>;

    /// Emails actively subscribed to `package`.
    fn subscribers_of(&self, package: &str) -> Result<Vec<String>>;

    /// Emails actively subscribed to `package` that accept `keyword`.
    fn active_subscribers(&self, package: &str, keyword: &str) -> Result<Vec<String>>;

    /// Every active subscriber, grouped by package.
    fn all_subscribers(&self) -> Result<BTreeMap<String, Vec<String>>>;

    /// Replace the subscription specific keywords. Returns `false` when
    /// `email` is not subscribed to `package`.
    fn set_subscription_keywords(
        &self,
        email: &str,
        package: &str,
        keywords: BTreeSet<String>,
    ) -> Result<bool>;

    fn team(&self, slug: &str) -> Result<Option<Team>>;

    fn teams_with_package(&self, package: &str) -> Result<Vec<Team>>;

    /// Teams `email` belongs to, ordered by name.
    fn teams_of(&self, email: &str) -> Result<Vec<Team>>;

    /// Returns `false` if the team does not exist or already has the member.
    fn add_team_member(&self, slug: &str, email: &str) -> Result<bool>;

    /// Returns `false` if the team does not exist or lacks the member.
    fn remove_team_member(&self, slug: &str, email: &str) -> Result<bool>;

    /// Count one sent mail for `email` on `date`, keeping at most `retain`
    /// dated records for the user.
    fn record_sent(&self, email: &str, date: NaiveDate, retain: usize) -> Result<()>;

    /// Count one bounce for `email` on `date`, keeping at most `retain`
    /// dated records for the user.
    fn record_bounce(&self, email: &str, date: NaiveDate, retain: usize) -> Result<()>;

    /// Retained bounce records of `email`, newest first.
    fn bounce_stats(&self, email: &str) -> Result<Vec<BounceStats>>;

    /// Store `commands` under a fresh random key.
    fn create_confirmation(&self, commands: Vec<String>) -> Result<CommandConfirmation>;

    fn confirmation(&self, key: &str) -> Result<Option<CommandConfirmation>>;

    fn delete_confirmation(&self, key: &str) -> Result<bool>;

    /// Remove confirmations created before `cutoff`, returning how many.
    fn purge_confirmations(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
