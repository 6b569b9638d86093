use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Keyword given to mail that nothing else classified.
pub const DEFAULT_KEYWORD: &str = "default";

/// Keywords known out of the box: name, accepted by new users, description.
pub const BUILTIN_KEYWORDS: &[(&str, bool, &str)] = &[
    (DEFAULT_KEYWORD, true, "Anything else that cannot be better classified"),
    ("bts", true, "All bug reports and associated discussions"),
    ("bts-control", true, "Status changes of bug reports"),
    ("summary", true, "News about the status of the package"),
    ("upload-source", true, "Notifications of sourceful uploads"),
    ("archive", true, "Other notifications sent by the archive management tool"),
    ("contact", true, "Mails from people contacting the maintainer(s)"),
    ("build", true, "Notifications of build failures from build daemons"),
    ("vcs", false, "Commit notices of the VCS repository associated to the package"),
    ("translation", false, "Notifications about translations related to the package"),
    (
        "upload-binary",
        false,
        "Notifications of binary-only uploads (made by build daemons)",
    ),
    ("derivatives", false, "Changes made to this package by derivatives"),
    (
        "derivatives-bugs",
        false,
        "Bug traffic about this package in derivative distributions",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub name: String,
    /// Part of the default set of every new user.
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageKind {
    Source,
    Pseudo,
    Binary { source: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub email: String,
    pub package: String,
    /// Inactive subscriptions await confirmation and receive nothing.
    #[serde(default = "active_by_default")]
    pub active: bool,
    /// Subscription specific keywords; the user's defaults apply when unset.
    #[serde(default)]
    pub keywords: Option<BTreeSet<String>>,
}

const fn active_by_default() -> bool {
    true
}

impl Subscription {
    pub fn accepts(&self, keyword: &str, user_defaults: &BTreeSet<String>) -> bool {
        self.effective_keywords(user_defaults).contains(keyword)
    }

    pub fn effective_keywords<'a>(
        &'a self,
        user_defaults: &'a BTreeSet<String>,
    ) -> &'a BTreeSet<String> {
        self.keywords.as_ref().unwrap_or(user_defaults)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub email: String,
    /// Mutes every package of the team.
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub muted_packages: BTreeSet<String>,
    /// Membership wide keywords; the user's defaults apply when unset.
    #[serde(default)]
    pub default_keywords: Option<BTreeSet<String>>,
    #[serde(default)]
    pub package_keywords: BTreeMap<String, BTreeSet<String>>,
}

impl TeamMembership {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            muted: false,
            muted_packages: BTreeSet::new(),
            default_keywords: None,
            package_keywords: BTreeMap::new(),
        }
    }

    pub fn is_muted(&self, package: &str) -> bool {
        self.muted || self.muted_packages.contains(package)
    }

    /// Keywords accepted for `package`: the package specific set, then the
    /// membership set, then the user's own defaults.
    pub fn keywords_for<'a>(
        &'a self,
        package: &str,
        user_defaults: &'a BTreeSet<String>,
    ) -> &'a BTreeSet<String> {
        self.package_keywords
            .get(package)
            .or(self.default_keywords.as_ref())
            .unwrap_or(user_defaults)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub public: bool,
    pub owner_email: String,
    #[serde(default)]
    pub packages: BTreeSet<String>,
    #[serde(default)]
    pub members: Vec<TeamMembership>,
}

impl Team {
    pub fn membership(&self, email: &str) -> Option<&TeamMembership> {
        self.members.iter().find(|member| member.email == email)
    }

    pub fn is_member(&self, email: &str) -> bool {
        self.membership(email).is_some()
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Mail sent to and bounced by one user on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceStats {
    pub date: NaiveDate,
    pub sent: u32,
    pub bounced: u32,
}

impl BounceStats {
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            sent: 0,
            bounced: 0,
        }
    }

    /// A day only counts as bouncing if something was actually sent.
    pub const fn is_bouncing(&self) -> bool {
        self.sent > 0 && self.bounced >= self.sent
    }
}

/// Whether each of the `days` most recent records in `stats` (newest first)
/// is a bouncing day. Fewer than `days` records is never too many.
pub fn has_too_many_bounces(stats: &[BounceStats], days: usize) -> bool {
    days > 0
        && stats
            .iter()
            .take(days)
            .filter(|day| day.is_bouncing())
            .count()
            == days
}

/// Commands waiting for the user to reply with `confirm <key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfirmation {
    pub key: String,
    pub commands: Vec<String>,
    pub created: DateTime<Utc>,
}

impl CommandConfirmation {
    pub fn is_expired(&self, now: DateTime<Utc>, expiration_days: u32) -> bool {
        now - self.created > Duration::days(i64::from(expiration_days))
    }
}
