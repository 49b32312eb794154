//! App-store billing.
//!
//! Some URL methods are billed through an app store instead of a web payment
//! manifest. They are only usable from inside a trusted web activity (TWA),
//! and then only by the TWA's own package. No manifest is ever fetched for
//! them.

use super::app::Candidate;
use super::method::{MethodClassifier, MethodIdentifier};
use std::collections::{BTreeMap, BTreeSet};

pub const GOOGLE_PLAY_BILLING: &str = "https://play.google.com/billing";
pub const GOOGLE_PLAY_PACKAGE: &str = "com.android.vending";

/// Facts about the merchant's surface that gate app-store billing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentContext {
    /// Package of the TWA hosting the merchant page, if any.
    pub twa_package: Option<String>,
    /// The merchant asked for a shipping address or payer contact details.
    pub requests_shipping_or_contact: bool,
}

impl PaymentContext {
    pub fn in_twa(package: impl Into<String>) -> Self {
        Self {
            twa_package: Some(package.into()),
            ..Self::default()
        }
    }

    pub fn with_shipping_or_contact(mut self) -> Self {
        self.requests_shipping_or_contact = true;
        self
    }

    /// The package allowed to bill through an app store, if billing is open at all.
    /// Delegated payer data cannot be collected through app-store billing.
    pub fn billing_package(&self) -> Option<&str> {
        if self.requests_shipping_or_contact {
            return None;
        }
        self.twa_package.as_deref().filter(|package| !package.is_empty())
    }
}

/// The configured app-store billing methods, keyed to their store's package.
#[derive(Debug, Clone, Default)]
pub struct AppStoreMethods {
    stores: BTreeMap<MethodIdentifier, String>,
}

impl AppStoreMethods {
    /// Classifies the configured method URLs. Unusable entries are skipped.
    pub fn new<'a, I>(entries: I, classifier: &MethodClassifier) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut stores = BTreeMap::new();
        for (raw, package) in entries {
            match classifier.classify(raw) {
                Ok(method @ MethodIdentifier::Url(_)) => {
                    stores.insert(method, package.clone());
                }
                Ok(_) => tracing::warn!(method = %raw, "app store method must be a URL"),
                Err(reason) => tracing::warn!(method = %raw, %reason, "ignoring app store method"),
            }
        }
        Self { stores }
    }

    pub fn contains(&self, method: &MethodIdentifier) -> bool {
        self.stores.contains_key(method)
    }

    pub fn store_package(&self, method: &MethodIdentifier) -> Option<&str> {
        self.stores.get(method).map(String::as_str)
    }

    /// Splits the requested methods into the ones resolved through manifests
    /// and the app-store grant for this query. App-store methods are dropped
    /// from the query unless `context` opens billing.
    pub fn partition(
        &self,
        requested: BTreeSet<MethodIdentifier>,
        context: &PaymentContext,
    ) -> (BTreeSet<MethodIdentifier>, BillingGrant) {
        let package = context.billing_package();
        let mut methods = BTreeSet::new();
        let mut billed = BTreeSet::new();
        for method in requested {
            if !self.contains(&method) {
                methods.insert(method);
                continue;
            }
            match package {
                Some(package) => {
                    tracing::debug!(
                        method = %method,
                        store = self.store_package(&method),
                        twa = package,
                        "app store billing requested"
                    );
                    billed.insert(method.clone());
                    methods.insert(method);
                }
                None => tracing::debug!(method = %method, "app store method needs a TWA"),
            }
        }
        let grant = BillingGrant {
            methods: billed,
            package: package.map(str::to_string),
        };
        (methods, grant)
    }
}

/// App-store methods one query may grant, and the only package that may use them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingGrant {
    methods: BTreeSet<MethodIdentifier>,
    package: Option<String>,
}

impl BillingGrant {
    pub fn covers(&self, method: &MethodIdentifier) -> bool {
        self.methods.contains(method)
    }

    /// The app must be the TWA itself and declare the method.
    pub fn permits(&self, candidate: &Candidate, method: &MethodIdentifier) -> bool {
        self.covers(method)
            && candidate.declares(method)
            && self.package.as_deref() == Some(candidate.package_id())
    }
}
