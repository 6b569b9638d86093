//! Seeding a [`MemoryStore`] from a RON description of packages, users,
//! subscriptions and teams.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use serde::Deserialize;
use tracker_common::internal;

use crate::{
    error::{Result, StoreError},
    memory::MemoryStore,
    models::{Keyword, PackageKind, Subscription, Team},
    store::SubscriberStore,
};

#[derive(Debug, Default, Deserialize)]
pub struct StoreSnapshot {
    /// Keywords on top of the built-in ones.
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageKind>,
    /// Default keyword sets of users that changed them.
    #[serde(default)]
    pub users: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub teams: Vec<Team>,
}

impl StoreSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        })?;

        ron::from_str(&content).map_err(|source| StoreError::SnapshotFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every subscription must name a known package, and binary packages
    /// must point at a known source.
    fn validate(&self) -> Result<()> {
        for (name, kind) in &self.packages {
            if let PackageKind::Binary { source } = kind
                && !matches!(self.packages.get(source), Some(PackageKind::Source))
            {
                return Err(StoreError::Inconsistent(format!(
                    "binary package {name} names unknown source {source}"
                )));
            }
        }

        if let Some(orphan) = self
            .subscriptions
            .iter()
            .find(|subscription| !self.packages.contains_key(&subscription.package))
        {
            return Err(StoreError::Inconsistent(format!(
                "{} is subscribed to unknown package {}",
                orphan.email, orphan.package
            )));
        }

        Ok(())
    }
}

impl MemoryStore {
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        snapshot.validate()?;

        let store = Self::new();
        for keyword in snapshot.keywords {
            store.add_keyword(keyword);
        }
        for (name, kind) in snapshot.packages {
            store.add_package(name, kind);
        }
        for (email, keywords) in snapshot.users {
            store.set_default_keywords(&email, keywords)?;
        }
        for subscription in snapshot.subscriptions {
            store.insert_subscription(subscription);
        }
        for team in snapshot.teams {
            store.add_team(team);
        }

        Ok(store)
    }

    pub fn from_snapshot_file(path: &Path) -> Result<Self> {
        let store = Self::from_snapshot(StoreSnapshot::load(path)?)?;
        internal!(
            level = INFO,
            "Loaded subscriber store snapshot from {}",
            path.display()
        );
        Ok(store)
    }
}
