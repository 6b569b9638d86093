use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::RwLock;
use rand::{Rng, distr::Alphanumeric};

use crate::{
    error::Result,
    models::{
        BUILTIN_KEYWORDS, BounceStats, CommandConfirmation, Keyword, PackageKind, Subscription,
        Team, TeamMembership,
    },
    store::SubscriberStore,
};

const CONFIRMATION_KEY_LENGTH: usize = 28;

#[derive(Debug)]
struct Inner {
    keywords: BTreeMap<String, Keyword>,
    packages: HashMap<String, PackageKind>,
    users: HashMap<String, BTreeSet<String>>,
    /// Keyed by `(package, email)`.
    subscriptions: BTreeMap<(String, String), Subscription>,
    teams: BTreeMap<String, Team>,
    /// Newest first.
    bounces: HashMap<String, Vec<BounceStats>>,
}

impl Default for Inner {
    fn default() -> Self {
        let keywords = BUILTIN_KEYWORDS
            .iter()
            .map(|&(name, default, description)| {
                (
                    name.to_string(),
                    Keyword {
                        name: name.to_string(),
                        default,
                        description: description.to_string(),
                    },
                )
            })
            .collect();

        Self {
            keywords,
            packages: HashMap::new(),
            users: HashMap::new(),
            subscriptions: BTreeMap::new(),
            teams: BTreeMap::new(),
            bounces: HashMap::new(),
        }
    }
}

impl Inner {
    fn initial_keywords(&self) -> BTreeSet<String> {
        self.keywords
            .values()
            .filter(|keyword| keyword.default)
            .map(|keyword| keyword.name.clone())
            .collect()
    }

    fn user_defaults(&self, email: &str) -> BTreeSet<String> {
        self.users
            .get(email)
            .cloned()
            .unwrap_or_else(|| self.initial_keywords())
    }

    fn ensure_user(&mut self, email: &str) -> &mut BTreeSet<String> {
        let initial = self.initial_keywords();
        self.users.entry(email.to_string()).or_insert(initial)
    }

    fn key(package: &str, email: &str) -> (String, String) {
        (package.to_string(), email.to_string())
    }

    fn bump(
        &mut self,
        email: &str,
        date: NaiveDate,
        retain: usize,
        update: impl FnOnce(&mut BounceStats),
    ) {
        let days = self.bounces.entry(email.to_string()).or_default();

        if !days.iter().any(|day| day.date == date) {
            days.push(BounceStats::new(date));
            days.sort_by(|a, b| b.date.cmp(&a.date));
            days.truncate(retain);
        }

        // A date older than the retained window was pruned straight away.
        if let Some(day) = days.iter_mut().find(|day| day.date == date) {
            update(day);
        }
    }
}

/// Subscriber store held entirely in memory.
///
/// Relational data lives behind one lock so multi-table updates such as
/// `unsubscribe_all` are atomic; confirmations are independent and live in
/// their own concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    confirmations: DashMap<String, CommandConfirmation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_package(&self, name: impl Into<String>, kind: PackageKind) {
        self.inner.write().packages.insert(name.into(), kind);
    }

    pub fn add_keyword(&self, keyword: Keyword) {
        self.inner
            .write()
            .keywords
            .insert(keyword.name.clone(), keyword);
    }

    pub fn add_team(&self, team: Team) {
        self.inner.write().teams.insert(team.slug.clone(), team);
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        let mut inner = self.inner.write();
        inner.ensure_user(&subscription.email);
        inner.subscriptions.insert(
            Inner::key(&subscription.package, &subscription.email),
            subscription,
        );
    }

    /// Store a confirmation as is, keeping its key and creation time.
    pub fn insert_confirmation(&self, confirmation: CommandConfirmation) {
        self.confirmations
            .insert(confirmation.key.clone(), confirmation);
    }

    pub fn set_bounce_stats(&self, email: &str, mut stats: Vec<BounceStats>) {
        stats.sort_by(|a, b| b.date.cmp(&a.date));
        self.inner.write().bounces.insert(email.to_string(), stats);
    }

    fn generate_key() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(CONFIRMATION_KEY_LENGTH)
            .map(char::from)
            .collect()
    }
}

impl SubscriberStore for MemoryStore {
    fn package_kind(&self, package: &str) -> Result<Option<PackageKind>> {
        Ok(self.inner.read().packages.get(package).cloned())
    }

    fn keyword(&self, name: &str) -> Result<Option<Keyword>> {
        Ok(self.inner.read().keywords.get(name).cloned())
    }

    fn default_keywords(&self, email: &str) -> Result<BTreeSet<String>> {
        Ok(self.inner.write().ensure_user(email).clone())
    }

    fn set_default_keywords(&self, email: &str, keywords: BTreeSet<String>) -> Result<()> {
        *self.inner.write().ensure_user(email) = keywords;
        Ok(())
    }

    fn subscription(&self, email: &str, package: &str) -> Result<Option<Subscription>> {
        Ok(self
            .inner
            .read()
            .subscriptions
            .get(&Inner::key(package, email))
            .cloned())
    }

    fn subscribe(
        &self,
        email: &str,
        package: &str,
        active: bool,
    ) -> Result<Option<Subscription>> {
        let mut inner = self.inner.write();
        if !inner.packages.contains_key(package) {
            return Ok(None);
        }

        inner.ensure_user(email);
        let subscription = inner
            .subscriptions
            .entry(Inner::key(package, email))
            .or_insert_with(|| Subscription {
                email: email.to_string(),
                package: package.to_string(),
                active,
                keywords: None,
            });
        subscription.active = active;

        Ok(Some(subscription.clone()))
    }

    fn unsubscribe(&self, email: &str, package: &str) -> Result<bool> {
        Ok(self
            .inner
            .write()
            .subscriptions
            .remove(&Inner::key(package, email))
            .is_some())
    }

    fn unsubscribe_all(&self, email: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.write();
        let mut removed = Vec::new();

        inner.subscriptions.retain(|(package, subscriber), _| {
            if subscriber == email {
                removed.push(package.clone());
                false
            } else {
                true
            }
        });

        Ok(removed)
    }

    fn subscriptions_of(&self, email: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .inner
            .read()
            .subscriptions
            .values()
            .filter(|subscription| subscription.active && subscription.email == email)
            .cloned()
            .collect())
    }

    fn subscribers_of(&self, package: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .read()
            .subscriptions
            .values()
            .filter(|subscription| subscription.active && subscription.package == package)
            .map(|subscription| subscription.email.clone())
            .collect())
    }

    fn active_subscribers(&self, package: &str, keyword: &str) -> Result<Vec<String>> {
        let inner = self.inner.read();

        Ok(inner
            .subscriptions
            .values()
            .filter(|subscription| subscription.active && subscription.package == package)
            .filter(|subscription| {
                subscription.accepts(keyword, &inner.user_defaults(&subscription.email))
            })
            .map(|subscription| subscription.email.clone())
            .collect())
    }

    fn all_subscribers(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for subscription in self.inner.read().subscriptions.values() {
            if subscription.active {
                grouped
                    .entry(subscription.package.clone())
                    .or_default()
                    .push(subscription.email.clone());
            }
        }

        Ok(grouped)
    }

    fn set_subscription_keywords(
        &self,
        email: &str,
        package: &str,
        keywords: BTreeSet<String>,
    ) -> Result<bool> {
        let mut inner = self.inner.write();

        if let Some(subscription) = inner.subscriptions.get_mut(&Inner::key(package, email)) {
            subscription.keywords = Some(keywords);
            return Ok(true);
        }

        Ok(false)
    }

    fn team(&self, slug: &str) -> Result<Option<Team>> {
        Ok(self.inner.read().teams.get(slug).cloned())
    }

    fn teams_with_package(&self, package: &str) -> Result<Vec<Team>> {
        Ok(self
            .inner
            .read()
            .teams
            .values()
            .filter(|team| team.packages.contains(package))
            .cloned()
            .collect())
    }

    fn teams_of(&self, email: &str) -> Result<Vec<Team>> {
        let mut teams: Vec<Team> = self
            .inner
            .read()
            .teams
            .values()
            .filter(|team| team.is_member(email))
            .cloned()
            .collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(teams)
    }

    fn add_team_member(&self, slug: &str, email: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        inner.ensure_user(email);

        let Some(team) = inner.teams.get_mut(slug) else {
            return Ok(false);
        };
        if team.is_member(email) {
            return Ok(false);
        }

        team.members.push(TeamMembership::new(email));
        Ok(true)
    }

    fn remove_team_member(&self, slug: &str, email: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        let Some(team) = inner.teams.get_mut(slug) else {
            return Ok(false);
        };

        let before = team.members.len();
        team.members.retain(|member| member.email != email);
        Ok(team.members.len() != before)
    }

    fn record_sent(&self, email: &str, date: NaiveDate, retain: usize) -> Result<()> {
        self.inner
            .write()
            .bump(email, date, retain, |day| day.sent += 1);
        Ok(())
    }

    fn record_bounce(&self, email: &str, date: NaiveDate, retain: usize) -> Result<()> {
        self.inner
            .write()
            .bump(email, date, retain, |day| day.bounced += 1);
        Ok(())
    }

    fn bounce_stats(&self, email: &str) -> Result<Vec<BounceStats>> {
        Ok(self
            .inner
            .read()
            .bounces
            .get(email)
            .cloned()
            .unwrap_or_default())
    }

    fn create_confirmation(&self, commands: Vec<String>) -> Result<CommandConfirmation> {
        loop {
            if let Entry::Vacant(slot) = self.confirmations.entry(Self::generate_key()) {
                let confirmation = CommandConfirmation {
                    key: slot.key().clone(),
                    commands,
                    created: Utc::now(),
                };
                slot.insert(confirmation.clone());
                return Ok(confirmation);
            }
        }
    }

    fn confirmation(&self, key: &str) -> Result<Option<CommandConfirmation>> {
        Ok(self.confirmations.get(key).map(|entry| entry.value().clone()))
    }

    fn delete_confirmation(&self, key: &str) -> Result<bool> {
        Ok(self.confirmations.remove(key).is_some())
    }

    fn purge_confirmations(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.confirmations.len();
        self.confirmations
            .retain(|_, confirmation| confirmation.created >= cutoff);
        Ok(before - self.confirmations.len())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_package("dpkg", PackageKind::Source);
        store.add_package("apt", PackageKind::Source);
        store
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn new_users_get_default_keywords() {
        let store = store();
        let keywords = store.default_keywords("jane@example.com").unwrap();

        assert!(keywords.contains("default"));
        assert!(keywords.contains("bts"));
        assert!(!keywords.contains("vcs"));
    }

    #[test]
    fn subscribe_unknown_package() {
        let store = store();

        assert_eq!(store.subscribe("a@example.com", "nope", true).unwrap(), None);
        assert!(!store.is_subscribed("a@example.com", "nope").unwrap());
    }

    #[test]
    fn inactive_subscriptions_are_not_subscribers() {
        let store = store();
        store.subscribe("a@example.com", "dpkg", false).unwrap();

        assert!(!store.is_subscribed("a@example.com", "dpkg").unwrap());
        assert!(store.subscribers_of("dpkg").unwrap().is_empty());

        store.subscribe("a@example.com", "dpkg", true).unwrap();
        assert!(store.is_subscribed("a@example.com", "dpkg").unwrap());
        assert_eq!(store.subscribers_of("dpkg").unwrap(), vec!["a@example.com"]);
    }

    #[test]
    fn active_subscribers_respect_keywords() {
        let store = store();
        store.subscribe("a@example.com", "dpkg", true).unwrap();
        store.subscribe("b@example.com", "dpkg", true).unwrap();
        store
            .set_subscription_keywords("b@example.com", "dpkg", ["vcs".to_string()].into())
            .unwrap();

        assert_eq!(
            store.active_subscribers("dpkg", "bts").unwrap(),
            vec!["a@example.com"]
        );
        assert_eq!(
            store.active_subscribers("dpkg", "vcs").unwrap(),
            vec!["b@example.com"]
        );
    }

    #[test]
    fn unsubscribe_all_reports_packages() {
        let store = store();
        store.subscribe("a@example.com", "dpkg", true).unwrap();
        store.subscribe("a@example.com", "apt", true).unwrap();
        store.subscribe("b@example.com", "apt", true).unwrap();

        assert_eq!(
            store.unsubscribe_all("a@example.com").unwrap(),
            vec!["apt", "dpkg"]
        );
        assert!(store.subscriptions_of("a@example.com").unwrap().is_empty());
        assert_eq!(store.subscribers_of("apt").unwrap(), vec!["b@example.com"]);
    }

    #[test]
    fn bounce_records_are_pruned_to_window() {
        let store = store();
        for day in 1..=6 {
            store.record_sent("a@example.com", date(day), 4).unwrap();
        }
        store.record_bounce("a@example.com", date(6), 4).unwrap();

        let stats = store.bounce_stats("a@example.com").unwrap();
        let dates: Vec<_> = stats.iter().map(|day| day.date).collect();

        assert_eq!(dates, vec![date(6), date(5), date(4), date(3)]);
        assert_eq!(stats[0].bounced, 1);
        assert_eq!(stats[0].sent, 1);
    }

    #[test]
    fn bounce_older_than_window_is_dropped() {
        let store = store();
        for day in 3..=6 {
            store.record_sent("a@example.com", date(day), 4).unwrap();
        }
        store.record_bounce("a@example.com", date(1), 4).unwrap();

        let stats = store.bounce_stats("a@example.com").unwrap();
        assert_eq!(stats.len(), 4);
        assert!(stats.iter().all(|day| day.bounced == 0));
    }

    #[test]
    fn team_membership_changes() {
        let store = store();
        store.add_team(Team {
            slug: "pkg-team".to_string(),
            name: "Packaging team".to_string(),
            public: true,
            owner_email: "owner@example.com".to_string(),
            packages: ["dpkg".to_string()].into(),
            members: vec![TeamMembership::new("a@example.com")],
        });

        assert!(!store.add_team_member("pkg-team", "a@example.com").unwrap());
        assert!(store.add_team_member("pkg-team", "b@example.com").unwrap());
        assert!(!store.add_team_member("missing", "b@example.com").unwrap());
        assert_eq!(store.teams_of("b@example.com").unwrap().len(), 1);
        assert_eq!(store.teams_with_package("dpkg").unwrap().len(), 1);

        assert!(store.remove_team_member("pkg-team", "b@example.com").unwrap());
        assert!(!store.remove_team_member("pkg-team", "b@example.com").unwrap());
    }

    #[test]
    fn confirmations_have_unique_keys() {
        let store = store();
        let first = store
            .create_confirmation(vec!["subscribe dpkg a@example.com".to_string()])
            .unwrap();
        let second = store.create_confirmation(vec![]).unwrap();

        assert_ne!(first.key, second.key);
        assert_eq!(first.key.len(), CONFIRMATION_KEY_LENGTH);
        assert_eq!(store.confirmation(&first.key).unwrap(), Some(first.clone()));

        assert!(store.delete_confirmation(&first.key).unwrap());
        assert_eq!(store.confirmation(&first.key).unwrap(), None);
    }

    #[test]
    fn purge_removes_old_confirmations() {
        let store = store();
        store.insert_confirmation(CommandConfirmation {
            key: "old".to_string(),
            commands: vec![],
            created: Utc::now() - chrono::Duration::days(10),
        });
        store.create_confirmation(vec![]).unwrap();

        let purged = store
            .purge_confirmations(Utc::now() - chrono::Duration::days(3))
            .unwrap();

        assert_eq!(purged, 1);
        assert_eq!(store.confirmation("old").unwrap(), None);
    }
}
