//! Working out what a message is for from the address it was delivered to.
//!
//! Tracker addresses look like `<service>[+<details>]@<fqdn>`.

use tracker_common::{Email, TrackerConfig};
use tracker_store::DEFAULT_KEYWORD;

use crate::{error::RoutingError, vendor::Vendor};

/// Headers an MTA may record the envelope recipient in.
const DELIVERY_HEADERS: &[&str] = &["Delivered-To", "Envelope-To", "X-Original-To", "X-Envelope-To"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Dispatch {
        package: Option<String>,
        keyword: Option<String>,
    },
    Bounces {
        details: Option<String>,
    },
    Control,
    Team {
        slug: String,
    },
}

/// Find the single address of this tracker the message was delivered to.
///
/// Several copies of the same address are fine; two different ones are not.
pub fn find_delivery_address(email: &Email, fqdn: &str) -> Result<Option<String>, RoutingError> {
    let suffix = format!("@{fqdn}");
    let mut found: Option<String> = None;

    let candidates = DELIVERY_HEADERS
        .iter()
        .flat_map(|header| email.header_values(header))
        .map(|value| value.trim().trim_start_matches('<').trim_end_matches('>'));

    for address in candidates {
        let Some(local_len) = address.len().checked_sub(suffix.len()) else {
            continue;
        };
        if !address.is_char_boundary(local_len)
            || !address[local_len..].eq_ignore_ascii_case(&suffix)
        {
            continue;
        }

        match &found {
            None => found = Some(address.to_string()),
            Some(existing) if existing.eq_ignore_ascii_case(address) => {}
            Some(existing) => {
                return Err(RoutingError::ConflictingDeliveryAddresses(
                    existing.clone(),
                    address.to_string(),
                ));
            }
        }
    }

    Ok(found)
}

/// Split the local part of `address` into service and details on the first
/// `+`. Details may themselves contain `+`.
pub fn identify_service(address: &str) -> (&str, Option<&str>) {
    let local = address.rsplit_once('@').map_or(address, |(local, _)| local);

    match local.split_once('+') {
        Some((service, details)) => (service, Some(details)),
        None => (local, None),
    }
}

/// `package` or `package_keyword`, split on the first `_`.
pub fn split_package_keyword(details: &str) -> (Option<String>, Option<String>) {
    let non_empty = |part: &str| (!part.is_empty()).then(|| part.to_string());

    match details.split_once('_') {
        Some((package, keyword)) => (non_empty(package), non_empty(keyword)),
        None => (non_empty(details), None),
    }
}

pub fn route(address: &str, config: &TrackerConfig) -> Result<Route, RoutingError> {
    let (service, details) = identify_service(address);

    let route = match service.to_ascii_lowercase().as_str() {
        "dispatch" => {
            let (package, keyword) = details.map(split_package_keyword).unwrap_or_default();
            Route::Dispatch { package, keyword }
        }
        "bounces" => Route::Bounces {
            details: details.map(str::to_string),
        },
        "control" => Route::Control,
        "team" => match details {
            Some(slug) if !slug.is_empty() => Route::Team {
                slug: slug.to_string(),
            },
            _ => return Err(RoutingError::InvalidDeliveryAddress(address.to_string())),
        },
        _ if config.accept_unqualified_emails => {
            let local = address.rsplit_once('@').map_or(address, |(local, _)| local);
            let (package, keyword) = split_package_keyword(local);
            Route::Dispatch { package, keyword }
        }
        _ => return Err(RoutingError::InvalidDeliveryAddress(address.to_string())),
    };

    Ok(route)
}

/// Settle the package and keyword of a package message. The vendor gets the
/// first say; the keyword falls back to `default`.
pub fn classify_message(
    vendor: &dyn Vendor,
    email: &Email,
    package: Option<&str>,
    keyword: Option<&str>,
) -> (Option<String>, String) {
    let mut package = package.map(str::to_string);
    let mut keyword = keyword.map(str::to_string);

    if let Some(classification) = vendor.classify_message(email, package.as_deref(), keyword.as_deref())
    {
        if classification.package.is_some() {
            package = classification.package;
        }
        if classification.keyword.is_some() {
            keyword = classification.keyword;
        }
    }

    (
        package,
        keyword.unwrap_or_else(|| DEFAULT_KEYWORD.to_string()),
    )
}
