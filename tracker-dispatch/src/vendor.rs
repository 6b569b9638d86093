//! Distribution specific customisation.
//!
//! Every hook returns `None` when a vendor does not implement it, in which
//! case the built-in behaviour applies.

use tracker_common::Email;

/// Package and keyword chosen by a vendor. A `None` field keeps whatever was
/// derived from the delivery address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub package: Option<String>,
    pub keyword: Option<String>,
}

pub trait Vendor: Send + Sync + std::fmt::Debug {
    fn classify_message(
        &self,
        _email: &Email,
        _package: Option<&str>,
        _keyword: Option<&str>,
    ) -> Option<Classification> {
        None
    }

    /// Whether a message with the `default` keyword may be forwarded.
    fn approve_default_message(&self, _email: &Email) -> Option<bool> {
        None
    }

    /// Extra headers stamped on every forwarded copy.
    fn add_new_headers(
        &self,
        _email: &Email,
        _package: &str,
        _keyword: &str,
    ) -> Option<Vec<(String, String)>> {
        None
    }
}

/// A vendor with no customisation at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVendor;

impl Vendor for NoVendor {}
