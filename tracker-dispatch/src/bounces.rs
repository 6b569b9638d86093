//! Counting returned mail and cancelling the subscriptions of addresses that
//! keep bouncing.

use chrono::NaiveDate;
use tracker_common::{incoming, outgoing, verp};
use tracker_store::models::has_too_many_bounces;

use crate::{compose::MailBuilder, error::DispatchError, forward::Dispatcher};

pub const CANCELLED_SUBJECT: &str = "All your subscriptions from the PTS have been cancelled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BounceOutcome {
    /// Not a bounce address of this tracker.
    Ignored,
    Recorded,
    /// The user bounced for too long and lost these subscriptions.
    Unsubscribed { packages: Vec<String> },
}

impl Dispatcher {
    /// Record the bounce returned to the VERP address `address`.
    ///
    /// # Errors
    /// On store failures, or when the cancellation notice cannot be sent.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn handle_bounces(&self, address: &str) -> Result<BounceOutcome, DispatchError> {
        let (bounce_address, user) = match verp::decode(address) {
            Ok(decoded) => decoded,
            Err(e) => {
                incoming!(level = ERROR, "Invalid bounce address {address}: {e}");
                return Ok(BounceOutcome::Ignored);
            }
        };

        let Some(date) = self.bounce_date(&bounce_address) else {
            incoming!(level = ERROR, "Invalid bounce address {bounce_address}");
            return Ok(BounceOutcome::Ignored);
        };

        let days = self.config.max_days_tolerate_bounce;
        self.store.record_bounce(&user, date, days)?;
        incoming!(level = INFO, "Logged bounce for {user} on {date}");

        if !has_too_many_bounces(&self.store.bounce_stats(&user)?, days) {
            return Ok(BounceOutcome::Recorded);
        }

        incoming!(level = INFO, "{user} has too many bounces");

        let mut packages = self
            .store
            .subscriptions_of(&user)?
            .into_iter()
            .map(|subscription| subscription.package)
            .collect::<Vec<_>>();
        packages.sort();

        let notice = MailBuilder::new()
            .envelope_from(&self.config.bounces_likely_spam_email)
            .from(&self.config.contact_email)
            .to(&user)
            .cc(&self.config.contact_email)
            .subject(CANCELLED_SUBJECT)
            .body(cancellation_body(&user, &packages))
            .build()?;

        self.transport.connect()?.send(&notice)?;
        outgoing!(level = INFO, "Sent subscription cancellation notice to {user}");

        self.store.unsubscribe_all(&user)?;

        Ok(BounceOutcome::Unsubscribed { packages })
    }

    /// The date in `bounces+YYYYMMDD@fqdn`.
    fn bounce_date(&self, bounce_address: &str) -> Option<NaiveDate> {
        let (local, domain) = bounce_address.rsplit_once('@')?;
        if !domain.eq_ignore_ascii_case(&self.config.fqdn) {
            return None;
        }

        let date = local.strip_prefix("bounces+")?;
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        NaiveDate::parse_from_str(date, "%Y%m%d").ok()
    }
}

fn cancellation_body(user: &str, packages: &[String]) -> String {
    let mut body = format!(
        "Hello,\n\n\
         mail sent to {user} has kept bouncing, so every subscription of this\n\
         address has been cancelled.\n"
    );

    if !packages.is_empty() {
        body.push_str("\nThe cancelled subscriptions were:\n");
        for package in packages {
            body.push_str("* ");
            body.push_str(package);
            body.push('\n');
        }
    }

    body.push_str("\nYou can subscribe again once the address accepts mail.\n");
    body
}
