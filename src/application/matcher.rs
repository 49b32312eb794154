//! Authorization matcher.
//!
//! Pure, synchronous decision logic run once every manifest a query depends
//! on has been resolved. For each candidate app it computes the exact subset
//! of requested methods the app may use.

use crate::domain::app::{AuthorizedApp, Candidate};
use crate::domain::app_store::BillingGrant;
use crate::domain::fingerprint;
use crate::domain::manifest::{ManifestOutcome, SupportedOrigins, WebAppManifestSection};
use crate::domain::method::MethodIdentifier;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Resolved manifests keyed by the URL method they belong to. Methods absent
/// from the map are treated as unresolvable.
pub type ManifestMap = HashMap<MethodIdentifier, Arc<ManifestOutcome>>;

/// Computes every candidate's authorized method subset. Candidates with an
/// empty subset are left out.
///
/// Methods covered by `billing` bypass manifests entirely: only the grant's
/// package may use them.
pub fn authorize(
    requested: &BTreeSet<MethodIdentifier>,
    candidates: &[Candidate],
    manifests: &ManifestMap,
    billing: &BillingGrant,
) -> Vec<AuthorizedApp> {
    candidates
        .iter()
        .filter_map(|candidate| {
            let methods: BTreeSet<MethodIdentifier> = requested
                .iter()
                .filter(|method| {
                    if billing.covers(method) {
                        billing.permits(candidate, method)
                    } else {
                        is_authorized(candidate, method, manifests)
                    }
                })
                .cloned()
                .collect();
            if methods.is_empty() {
                tracing::debug!(package = candidate.package_id(), "no authorized methods");
                return None;
            }
            Some(AuthorizedApp {
                app: Arc::clone(&candidate.app),
                methods,
                delegations: candidate.delegations,
            })
        })
        .collect()
}

/// Decides a single (app, method) pair.
pub fn is_authorized(
    candidate: &Candidate,
    method: &MethodIdentifier,
    manifests: &ManifestMap,
) -> bool {
    if !candidate.declares(method) {
        return false;
    }
    match method {
        // Trust for standardized methods is left to the platform's install-time checks.
        MethodIdentifier::Standardized(_) => true,
        MethodIdentifier::Url(_) => match manifests.get(method).map(Arc::as_ref) {
            Some(ManifestOutcome::Authorized {
                default_app_rules,
                supported_origins,
            }) => {
                matches_default_application(candidate, default_app_rules)
                    || matches_supported_origin(candidate, supported_origins, manifests)
            }
            Some(ManifestOutcome::Unresolvable) | None => false,
        },
    }
}

/// True when some rule names the app's package, its version is recent enough
/// and its signing certificate is listed. Several rules for one package are
/// alternative signing configurations; any one of them suffices.
pub fn matches_default_application(
    candidate: &Candidate,
    rules: &[WebAppManifestSection],
) -> bool {
    let app = &candidate.app;
    rules.iter().any(|rule| {
        rule.package_id == app.package_id
            && app.version >= rule.min_version
            && fingerprint::verifies(&app.signing_fingerprints, &rule.fingerprints)
    })
}

fn matches_supported_origin(
    candidate: &Candidate,
    supported_origins: &SupportedOrigins,
    manifests: &ManifestMap,
) -> bool {
    match supported_origins {
        SupportedOrigins::AllOrigins => true,
        enumerated @ SupportedOrigins::Enumerated(_) => {
            candidate
                .claimed_origin()
                .is_some_and(|origin| enumerated.contains(&origin))
                && verifies_own_origin(candidate, manifests)
        }
    }
}

/// An app's claimed origin counts only if the app is a verified default
/// application of its own default method.
pub fn verifies_own_origin(candidate: &Candidate, manifests: &ManifestMap) -> bool {
    let Some(own_method @ MethodIdentifier::Url(_)) = &candidate.default_method else {
        return false;
    };
    match manifests.get(own_method).map(Arc::as_ref) {
        Some(ManifestOutcome::Authorized {
            default_app_rules, ..
        }) => matches_default_application(candidate, default_app_rules),
        _ => false,
    }
}
