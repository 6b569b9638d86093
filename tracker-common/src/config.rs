use serde::Deserialize;

use crate::error::ConfigError;

const fn default_max_allowed_errors() -> usize {
    5
}

const fn default_max_days_tolerate_bounce() -> usize {
    4
}

const fn default_confirmation_expiration_days() -> u32 {
    3
}

/// Runtime settings shared by every part of the mail processing core.
///
/// Addresses that are not configured explicitly are derived from `fqdn`:
/// `control@`, `owner@` (contact) and `bounces@`. Mail that is likely spam
/// is returned to the bounces address unless told otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub fqdn: String,
    pub control_email: String,
    pub contact_email: String,
    pub bounces_email: String,
    pub bounces_likely_spam_email: String,
    /// Treat `foo@fqdn` as `dispatch+foo@fqdn`.
    pub accept_unqualified_emails: bool,
    /// Unrecognised control lines tolerated before processing stops.
    pub max_allowed_errors: usize,
    /// Number of bounce-stat days kept per user, and the number of
    /// consecutive bouncing days that cancels their subscriptions.
    pub max_days_tolerate_bounce: usize,
    pub confirmation_expiration_days: u32,
}

impl TrackerConfig {
    /// Build a configuration for `fqdn` with every other value defaulted.
    ///
    /// # Errors
    /// Fails if `fqdn` is empty or looks like an address.
    pub fn new(fqdn: impl Into<String>) -> Result<Self, ConfigError> {
        let fqdn = fqdn.into();
        validate_domain(&fqdn)?;

        Ok(Self {
            control_email: format!("control@{fqdn}"),
            contact_email: format!("owner@{fqdn}"),
            bounces_email: format!("bounces@{fqdn}"),
            bounces_likely_spam_email: format!("bounces@{fqdn}"),
            accept_unqualified_emails: false,
            max_allowed_errors: default_max_allowed_errors(),
            max_days_tolerate_bounce: default_max_days_tolerate_bounce(),
            confirmation_expiration_days: default_confirmation_expiration_days(),
            fqdn,
        })
    }

    #[must_use]
    pub const fn with_unqualified_emails(mut self, accept: bool) -> Self {
        self.accept_unqualified_emails = accept;
        self
    }

    /// `local@fqdn`
    pub fn address(&self, local: &str) -> String {
        format!("{local}@{}", self.fqdn)
    }
}

impl<'de> Deserialize<'de> for TrackerConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TrackerConfigHelper {
            fqdn: String,
            #[serde(default)]
            control_email: Option<String>,
            #[serde(default)]
            contact_email: Option<String>,
            #[serde(default)]
            bounces_email: Option<String>,
            #[serde(default)]
            bounces_likely_spam_email: Option<String>,
            #[serde(default)]
            accept_unqualified_emails: bool,
            #[serde(default = "default_max_allowed_errors")]
            max_allowed_errors: usize,
            #[serde(default = "default_max_days_tolerate_bounce")]
            max_days_tolerate_bounce: usize,
            #[serde(default = "default_confirmation_expiration_days")]
            confirmation_expiration_days: u32,
        }

        let helper = TrackerConfigHelper::deserialize(deserializer)?;
        let mut config = Self::new(helper.fqdn).map_err(serde::de::Error::custom)?;

        let overrides = [
            ("control_email", helper.control_email, &mut config.control_email),
            ("contact_email", helper.contact_email, &mut config.contact_email),
            ("bounces_email", helper.bounces_email, &mut config.bounces_email),
            (
                "bounces_likely_spam_email",
                helper.bounces_likely_spam_email,
                &mut config.bounces_likely_spam_email,
            ),
        ];

        for (field, value, slot) in overrides {
            if let Some(value) = value {
                validate_address(field, &value).map_err(serde::de::Error::custom)?;
                *slot = value;
            }
        }

        if helper.max_days_tolerate_bounce == 0 {
            return Err(serde::de::Error::custom(
                ConfigError::OutOfRange("max_days_tolerate_bounce", 0),
            ));
        }

        config.accept_unqualified_emails = helper.accept_unqualified_emails;
        config.max_allowed_errors = helper.max_allowed_errors;
        config.max_days_tolerate_bounce = helper.max_days_tolerate_bounce;
        config.confirmation_expiration_days = helper.confirmation_expiration_days;

        Ok(config)
    }
}

fn validate_domain(fqdn: &str) -> Result<(), ConfigError> {
    if fqdn.is_empty() || fqdn.contains('@') || fqdn.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidDomain(fqdn.to_string()));
    }

    Ok(())
}

fn validate_address(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match value.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(content: &str) -> Result<TrackerConfig, ron::error::SpannedError> {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(content)
    }

    #[test]
    fn derives_addresses_from_fqdn() {
        let config = TrackerConfig::new("tracker.example.org").unwrap();

        assert_eq!(config.control_email, "control@tracker.example.org");
        assert_eq!(config.contact_email, "owner@tracker.example.org");
        assert_eq!(config.bounces_email, "bounces@tracker.example.org");
        assert_eq!(config.bounces_likely_spam_email, config.bounces_email);
        assert_eq!(config.max_allowed_errors, 5);
        assert_eq!(config.max_days_tolerate_bounce, 4);
        assert!(!config.accept_unqualified_emails);
    }

    #[test]
    fn rejects_address_as_domain() {
        assert!(matches!(
            TrackerConfig::new("someone@example.org"),
            Err(ConfigError::InvalidDomain(_))
        ));
        assert!(TrackerConfig::new("").is_err());
    }

    #[test]
    fn deserializes_with_overrides() {
        let config = parse(
            r#"(
                fqdn: "tracker.example.org",
                contact_email: "admins@example.org",
                accept_unqualified_emails: true,
                max_days_tolerate_bounce: 7,
            )"#,
        )
        .unwrap();

        assert_eq!(config.contact_email, "admins@example.org");
        assert_eq!(config.control_email, "control@tracker.example.org");
        assert!(config.accept_unqualified_emails);
        assert_eq!(config.max_days_tolerate_bounce, 7);
        assert_eq!(config.confirmation_expiration_days, 3);
    }

    #[test]
    fn deserialize_rejects_bad_address() {
        let result = parse(r#"(fqdn: "tracker.example.org", control_email: "not-an-address")"#);

        assert!(result.is_err());
    }

    #[test]
    fn deserialize_rejects_empty_bounce_window() {
        let result = parse(r#"(fqdn: "tracker.example.org", max_days_tolerate_bounce: 0)"#);

        assert!(result.is_err());
    }

    #[test]
    fn explicit_some_is_still_accepted() {
        let config = parse(r#"(fqdn: "tracker.example.org", bounces_email: Some("b@example.org"))"#)
            .unwrap();

        assert_eq!(config.bounces_email, "b@example.org");
    }
}
