//! Forwarding package mail to subscribers and team members.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracker_common::{Email, TrackerConfig, incoming, outgoing, verp};
use tracker_store::{DEFAULT_KEYWORD, SubscriberStore, Team};

use crate::{
    error::DispatchError,
    router,
    transport::{OutgoingMessage, Transport},
    vendor::{NoVendor, Vendor},
};

/// Marks a `default` keyword message as fit for forwarding.
pub const APPROVED_HEADER: &str = "X-Distro-Tracker-Approved";
pub const PACKAGE_HEADER: &str = "X-Distro-Tracker-Package";
pub const KEYWORD_HEADER: &str = "X-Distro-Tracker-Keyword";
pub const TEAM_HEADER: &str = "X-Distro-Tracker-Team";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The message already went through this tracker address.
    Loop,
    /// `default` keyword without approval.
    UnapprovedDefault,
    /// Nothing identified the package.
    NoPackage,
    UnknownTeam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Dropped(DropReason),
    Forwarded { delivered: usize, failed: usize },
}

/// One copy of a message for one recipient.
struct Delivery<'a> {
    recipient: String,
    data: &'a [u8],
}

/// Everything forwarding and bounce handling need to reach the outside.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pub(crate) config: Arc<TrackerConfig>,
    pub(crate) store: Arc<dyn SubscriberStore>,
    pub(crate) vendor: Arc<dyn Vendor>,
    pub(crate) transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<TrackerConfig>,
        store: Arc<dyn SubscriberStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            store,
            vendor: Arc::new(NoVendor),
            transport,
        }
    }

    #[must_use]
    pub fn with_vendor(mut self, vendor: Arc<dyn Vendor>) -> Self {
        self.vendor = vendor;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn SubscriberStore {
        self.store.as_ref()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Settle package and keyword, then forward.
    ///
    /// # Errors
    /// On store failures, or when the transport cannot be reached.
    pub fn process(
        &self,
        email: &Email,
        package: Option<&str>,
        keyword: Option<&str>,
    ) -> Result<ForwardOutcome, DispatchError> {
        let (package, keyword) =
            router::classify_message(self.vendor.as_ref(), email, package, keyword);

        let Some(package) = package else {
            incoming!(
                level = INFO,
                "Dropping message {:?}: no package could be identified",
                email.message_id()
            );
            return Ok(ForwardOutcome::Dropped(DropReason::NoPackage));
        };

        self.forward(email, &package, &keyword)
    }

    /// Send `email` to everyone following `package` who accepts `keyword`.
    ///
    /// # Errors
    /// On store failures, or when the transport cannot be reached.
    #[tracing::instrument(level = "debug", skip(self, email))]
    pub fn forward(
        &self,
        email: &Email,
        package: &str,
        keyword: &str,
    ) -> Result<ForwardOutcome, DispatchError> {
        let package_address = self.config.address(package);
        if email.loops_through(&package_address) {
            incoming!(
                level = INFO,
                "Dropping message for {package}: X-Loop already names {package_address}"
            );
            return Ok(ForwardOutcome::Dropped(DropReason::Loop));
        }

        if keyword == DEFAULT_KEYWORD && !self.approved_default(email) {
            incoming!(
                level = INFO,
                "Dropping unapproved {DEFAULT_KEYWORD} keyword message for {package}"
            );
            return Ok(ForwardOutcome::Dropped(DropReason::UnapprovedDefault));
        }

        let mut headers = vec![
            ("X-Loop".to_string(), package_address),
            (PACKAGE_HEADER.to_string(), package.to_string()),
            (KEYWORD_HEADER.to_string(), keyword.to_string()),
        ];
        if let Some(extra) = self.vendor.add_new_headers(email, package, keyword) {
            headers.extend(extra);
        }

        let direct = {
            let mut direct = headers.clone();
            direct.push(("Precedence".to_string(), "list".to_string()));
            direct.push((
                "List-Unsubscribe".to_string(),
                format!(
                    "<mailto:{}?body=unsubscribe%20{package}>",
                    self.config.control_email
                ),
            ));
            email.with_headers(&direct)
        };

        let teams = if self.store.keyword_exists(keyword)? {
            self.store.teams_with_package(package)?
        } else {
            Vec::new()
        };

        let team_copies = teams
            .iter()
            .map(|team| {
                let mut team_headers = headers.clone();
                team_headers.push((TEAM_HEADER.to_string(), team.slug.clone()));
                email.with_headers(&team_headers)
            })
            .collect::<Vec<_>>();

        let mut copies: Vec<Delivery<'_>> = self
            .store
            .active_subscribers(package, keyword)?
            .into_iter()
            .map(|recipient| Delivery {
                recipient,
                data: &direct,
            })
            .collect();

        for (team, data) in teams.iter().zip(&team_copies) {
            for recipient in self.team_recipients(team, package, keyword)? {
                copies.push(Delivery { recipient, data });
            }
        }

        self.send_copies(&copies)
    }

    /// Send `email` to the members of the team `slug`.
    ///
    /// # Errors
    /// On store failures, or when the transport cannot be reached.
    #[tracing::instrument(level = "debug", skip(self, email))]
    pub fn forward_to_team(&self, email: &Email, slug: &str) -> Result<ForwardOutcome, DispatchError> {
        let team_address = self.config.address(&format!("team+{slug}"));
        if email.loops_through(&team_address) {
            incoming!(
                level = INFO,
                "Dropping message for team {slug}: X-Loop already names {team_address}"
            );
            return Ok(ForwardOutcome::Dropped(DropReason::Loop));
        }

        let Some(team) = self.store.team(slug)? else {
            incoming!(level = INFO, "Dropping message for unknown team {slug}");
            return Ok(ForwardOutcome::Dropped(DropReason::UnknownTeam));
        };

        let data = email.with_headers(&[("X-Loop", team_address.as_str()), (TEAM_HEADER, slug)]);
        let copies = team
            .members
            .iter()
            .filter(|member| !member.muted)
            .map(|member| Delivery {
                recipient: member.email.clone(),
                data: &data,
            })
            .collect::<Vec<_>>();

        self.send_copies(&copies)
    }

    fn approved_default(&self, email: &Email) -> bool {
        email.has_header(APPROVED_HEADER)
            || self.vendor.approve_default_message(email).unwrap_or(false)
    }

    /// Members of `team` that did not mute `package` and accept `keyword`.
    fn team_recipients(
        &self,
        team: &Team,
        package: &str,
        keyword: &str,
    ) -> Result<Vec<String>, DispatchError> {
        let mut recipients = Vec::new();

        for member in &team.members {
            if member.is_muted(package) {
                continue;
            }

            let defaults = self.store.default_keywords(&member.email)?;
            if member.keywords_for(package, &defaults).contains(keyword) {
                recipients.push(member.email.clone());
            }
        }

        Ok(recipients)
    }

    /// Deliver every copy over a single connection. A recipient that is
    /// refused or has no usable address is logged and counted; the rest are
    /// still attempted.
    fn send_copies(&self, copies: &[Delivery<'_>]) -> Result<ForwardOutcome, DispatchError> {
        if copies.is_empty() {
            return Ok(ForwardOutcome::Forwarded {
                delivered: 0,
                failed: 0,
            });
        }

        let today = Utc::now().date_naive();
        let bounce_address = bounce_address(&self.config, today);

        let mut connection = self.transport.connect()?;
        let (mut delivered, mut failed) = (0, 0);

        for copy in copies {
            let sender = match verp::encode(&bounce_address, &copy.recipient) {
                Ok(sender) => sender,
                Err(e) => {
                    failed += 1;
                    outgoing!(level = WARN, "Unable to address a copy to {}: {e}", copy.recipient);
                    continue;
                }
            };
            let message = OutgoingMessage::new(sender, vec![copy.recipient.clone()], copy.data.to_vec());

            match connection.send(&message) {
                Ok(()) => {
                    delivered += 1;
                    outgoing!(level = DEBUG, "Forwarded message to {}", copy.recipient);

                    if let Err(e) = self.store.record_sent(
                        &copy.recipient,
                        today,
                        self.config.max_days_tolerate_bounce,
                    ) {
                        outgoing!(
                            level = WARN,
                            "Unable to record sent mail for {}: {e}",
                            copy.recipient
                        );
                    }
                }
                Err(e) => {
                    failed += 1;
                    outgoing!(level = WARN, "Unable to forward message to {}: {e}", copy.recipient);
                }
            }
        }

        outgoing!(
            level = INFO,
            "Forwarded message to {delivered} recipient(s), {failed} failed"
        );

        Ok(ForwardOutcome::Forwarded { delivered, failed })
    }
}

/// Return path base for mail sent on `date`: `bounces+YYYYMMDD@fqdn`.
pub fn bounce_address(config: &TrackerConfig, date: NaiveDate) -> String {
    config.address(&format!("bounces+{}", date.format("%Y%m%d")))
}
