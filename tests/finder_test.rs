mod common;

use common::*;
use payment_app_finder::application::cancel::CancellationToken;
use payment_app_finder::application::finder::{FindStatus, FinderEvent, PaymentAppFinder};
use payment_app_finder::domain::app::{AuthorizedApp, InstalledApp};
use payment_app_finder::domain::app_store::{GOOGLE_PLAY_BILLING, PaymentContext};
use payment_app_finder::domain::ports::AppInventory;
use payment_app_finder::error::{FinderError, Result};
use payment_app_finder::infrastructure::in_memory::{CollectingSink, InMemoryTransport};
use payment_app_finder::infrastructure::json_decoder::JsonManifestDecoder;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const BOBPAY: &str = "https://bobpay.com/webpay";
const ALICEPAY: &str = "https://alicepay.com/webpay";
const DAVEPAY: &str = "https://davepay.com/webpay";
const FRANKPAY: &str = "https://frankpay.com/webpay";
const GEORGEPAY: &str = "https://georgepay.com/webpay";
const NOT_VALID: &str = "https://not-valid.com/webpay";
const ANOTHER_STORE: &str = "https://another.appstore.com/billing";
const TWA: &str = "com.merchant.twa";

async fn manifests() -> InMemoryTransport {
    let transport = InMemoryTransport::new();
    let serve = [
        (
            "https://bobpay.com/payment-manifest.json",
            r#"{"default_applications": ["app.json"]}"#.to_string(),
        ),
        (
            "https://bobpay.com/app.json",
            app_manifest("com.bobpay", 10, &[BOBPAY_CERT]),
        ),
        (
            "https://alicepay.com/payment-manifest.json",
            r#"{"default_applications": ["https://alicepay.com/app.json"]}"#.to_string(),
        ),
        (
            "https://alicepay.com/app.json",
            app_manifest("com.alicepay", 10, &[ALICEPAY_CERT]),
        ),
        (
            "https://davepay.com/payment-manifest.json",
            r#"{"default_applications": ["prod.json", "dev.json"]}"#.to_string(),
        ),
        (
            "https://davepay.com/prod.json",
            app_manifest("com.davepay", 1, &[DAVEPAY_PROD_CERT]),
        ),
        (
            "https://davepay.com/dev.json",
            app_manifest("com.davepay", 1, &[DAVEPAY_DEV_CERT]),
        ),
        (
            "https://frankpay.com/payment-manifest.json",
            r#"{"supported_origins": "*"}"#.to_string(),
        ),
        (
            "https://georgepay.com/payment-manifest.json",
            r#"{"supported_origins": ["https://alicepay.com"]}"#.to_string(),
        ),
    ];
    for (url, body) in serve {
        transport.insert(url, body).await;
    }
    transport
}

/// Authorized apps keyed by package id, with their method names.
fn by_package(apps: &[AuthorizedApp]) -> BTreeMap<String, BTreeSet<String>> {
    apps.iter()
        .map(|app| {
            let methods = app.method_names().into_iter().map(str::to_string).collect();
            (app.package_id().to_string(), methods)
        })
        .collect()
}

fn methods(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn drain(mut events: UnboundedReceiver<FinderEvent>) -> Vec<FinderEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn test_no_apps_installed() {
    let transport = manifests().await;
    let finder = Arc::new(finder(&transport, Vec::new()));

    let (events, handle) = finder.find_stream(
        vec!["basic-card".to_string(), BOBPAY.to_string()],
        CancellationToken::new(),
    );
    assert_eq!(handle.await.unwrap(), FindStatus::Completed { authorized: 0 });
    assert_eq!(drain(events).await, vec![FinderEvent::Complete]);
    assert_eq!(transport.total_fetches().await, 0);
}

#[tokio::test]
async fn test_no_valid_methods_requested() {
    let transport = manifests().await;
    let apps = vec![payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY)];
    let finder = Arc::new(finder(&transport, apps));

    let (events, handle) = finder.find_stream(
        vec!["not a method".to_string(), "ftp://bobpay.com/webpay".to_string()],
        CancellationToken::new(),
    );
    assert_eq!(handle.await.unwrap(), FindStatus::Completed { authorized: 0 });
    assert_eq!(drain(events).await, vec![FinderEvent::Complete]);
    assert_eq!(transport.total_fetches().await, 0);
}

#[tokio::test]
async fn test_standardized_match() {
    let transport = manifests().await;
    let apps = vec![
        payment_app("com.basic", 1, BOBPAY_CERT, "basic-card"),
        payment_app("com.tokenized", 1, BOBPAY_CERT, "tokenized-card"),
    ];
    let found = finder(&transport, apps).find_apps(&["basic-card"]).await;

    assert_eq!(
        by_package(&found),
        BTreeMap::from([("com.basic".to_string(), methods(&["basic-card"]))])
    );
    assert_eq!(transport.total_fetches().await, 0);
}

#[tokio::test]
async fn test_default_application_match() {
    let transport = manifests().await;
    let apps =
        vec![payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY).with_delegations(["payerName"])];
    let found = finder(&transport, apps).find_apps(&[BOBPAY]).await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].package_id(), "com.bobpay");
    assert_eq!(found[0].method_names(), BTreeSet::from([BOBPAY]));
    assert!(found[0].delegations.payer_name);
    assert!(!found[0].delegations.shipping_address);
}

#[tokio::test]
async fn test_signature_mismatch_excluded() {
    let transport = manifests().await;
    let apps = vec![payment_app("com.bobpay", 10, ALICEPAY_CERT, BOBPAY)];
    let found = finder(&transport, apps).find_apps(&[BOBPAY]).await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_version_below_minimum_excluded() {
    let transport = manifests().await;
    let apps = vec![payment_app("com.bobpay", 9, BOBPAY_CERT, BOBPAY)];
    let found = finder(&transport, apps).find_apps(&[BOBPAY]).await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_multiple_signing_configurations() {
    let transport = manifests().await;
    for certificate in [DAVEPAY_PROD_CERT, DAVEPAY_DEV_CERT] {
        let apps = vec![payment_app("com.davepay", 1, certificate, DAVEPAY)];
        let found = finder(&transport, apps).find_apps(&[DAVEPAY]).await;
        assert_eq!(
            by_package(&found),
            BTreeMap::from([("com.davepay".to_string(), methods(&[DAVEPAY]))])
        );
    }

    let apps = vec![payment_app("com.davepay", 1, EVEPAY_CERT_1, DAVEPAY)];
    assert!(finder(&transport, apps).find_apps(&[DAVEPAY]).await.is_empty());
}

#[tokio::test]
async fn test_app_with_several_certificates_verifies_with_any() {
    let transport = manifests().await;
    let apps = vec![
        payment_app("com.davepay", 1, EVEPAY_CERT_2, DAVEPAY).with_certificate(DAVEPAY_DEV_CERT),
    ];
    let found = finder(&transport, apps).find_apps(&[DAVEPAY]).await;
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_wildcard_origins_authorize_any_declaring_app() {
    let transport = manifests().await;
    let apps = vec![
        payment_app("com.anyone", 1, IKEPAY_CERT, FRANKPAY),
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY).with_supported_methods([FRANKPAY]),
        payment_app("com.silent", 1, IKEPAY_CERT, "basic-card"),
    ];
    let found = finder(&transport, apps).find_apps(&[FRANKPAY]).await;

    assert_eq!(
        by_package(&found),
        BTreeMap::from([
            ("com.anyone".to_string(), methods(&[FRANKPAY])),
            ("com.bobpay".to_string(), methods(&[FRANKPAY])),
        ])
    );
}

#[tokio::test]
async fn test_restricted_origins_reject_spoofed_claim() {
    let transport = manifests().await;
    let apps = vec![
        payment_app("com.alicepay", 10, ALICEPAY_CERT, ALICEPAY)
            .with_supported_methods([GEORGEPAY]),
        // Claims alicepay's origin but is not signed with alicepay's certificate.
        payment_app("com.mallory", 10, BOBPAY_CERT, ALICEPAY).with_supported_methods([GEORGEPAY]),
        // Verified, but for an origin georgepay does not list.
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY).with_supported_methods([GEORGEPAY]),
    ];
    let found = finder(&transport, apps).find_apps(&[GEORGEPAY]).await;

    assert_eq!(
        by_package(&found),
        BTreeMap::from([("com.alicepay".to_string(), methods(&[GEORGEPAY]))])
    );
    assert_eq!(
        transport
            .fetch_count("https://alicepay.com/payment-manifest.json")
            .await,
        1
    );
    assert_eq!(
        transport
            .fetch_count("https://bobpay.com/payment-manifest.json")
            .await,
        0
    );
}

#[tokio::test]
async fn test_restricted_origins_with_unreachable_own_manifest() {
    let transport = InMemoryTransport::new();
    transport
        .insert(
            "https://georgepay.com/payment-manifest.json",
            r#"{"supported_origins": ["https://alicepay.com"]}"#,
        )
        .await;
    let apps = vec![
        payment_app("com.alicepay", 10, ALICEPAY_CERT, ALICEPAY)
            .with_supported_methods([GEORGEPAY]),
    ];
    let found = finder(&transport, apps).find_apps(&[GEORGEPAY]).await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_partial_authorization() {
    let transport = manifests().await;
    let apps = vec![
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY)
            .with_supported_methods([NOT_VALID, "basic-card"]),
    ];
    let found = finder(&transport, apps)
        .find_apps(&[BOBPAY, NOT_VALID, "basic-card", "tokenized-card"])
        .await;

    assert_eq!(
        by_package(&found),
        BTreeMap::from([("com.bobpay".to_string(), methods(&[BOBPAY, "basic-card"]))])
    );
}

#[tokio::test]
async fn test_unresolvable_manifest_excludes_only_its_dependents() {
    let transport = manifests().await;
    transport
        .insert("https://garbage.com/payment-manifest.json", "<html>not json</html>")
        .await;
    let apps = vec![
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY),
        payment_app("com.garbage", 1, IKEPAY_CERT, "https://garbage.com/webpay"),
        payment_app("com.notvalid", 1, IKEPAY_CERT, NOT_VALID),
    ];
    let found = finder(&transport, apps)
        .find_apps(&[BOBPAY, NOT_VALID, "https://garbage.com/webpay"])
        .await;

    assert_eq!(
        by_package(&found),
        BTreeMap::from([("com.bobpay".to_string(), methods(&[BOBPAY]))])
    );
}

#[tokio::test]
async fn test_apps_without_usable_metadata_excluded() {
    let transport = manifests().await;
    let apps = vec![
        InstalledApp::new("com.nolabel", "", 1)
            .with_certificate(IKEPAY_CERT)
            .with_default_method("basic-card"),
        InstalledApp::new("com.nometadata", "No Metadata", 1).with_certificate(IKEPAY_CERT),
        InstalledApp::new("com.unsigned", "Unsigned", 1).with_default_method("basic-card"),
        InstalledApp::new("com.nodefault", "No Default", 1)
            .with_certificate(IKEPAY_CERT)
            .with_default_method("")
            .with_supported_methods(["basic-card"]),
    ];
    let found = finder(&transport, apps).find_apps(&["basic-card"]).await;

    assert_eq!(
        by_package(&found),
        BTreeMap::from([("com.nodefault".to_string(), methods(&["basic-card"]))])
    );
}

#[tokio::test]
async fn test_idempotent_queries() {
    let transport = manifests().await;
    let apps = vec![
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY).with_supported_methods(["basic-card"]),
        payment_app("com.alicepay", 10, ALICEPAY_CERT, ALICEPAY)
            .with_supported_methods([GEORGEPAY]),
        payment_app("com.davepay", 1, DAVEPAY_DEV_CERT, DAVEPAY),
    ];
    let finder = finder(&transport, apps);
    let requested = [BOBPAY, GEORGEPAY, DAVEPAY, "basic-card"];

    let first = by_package(&finder.find_apps(&requested).await);
    let second = by_package(&finder.find_apps(&requested).await);
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn test_methods_sharing_a_manifest_fetch_once_per_query() {
    let transport = manifests().await;
    let second = "https://bobpay.com/other-method";
    let apps =
        vec![payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY).with_supported_methods([second])];
    let found = finder(&transport, apps).find_apps(&[BOBPAY, second]).await;

    assert_eq!(
        by_package(&found),
        BTreeMap::from([("com.bobpay".to_string(), methods(&[BOBPAY, second]))])
    );
    assert_eq!(
        transport
            .fetch_count("https://bobpay.com/payment-manifest.json")
            .await,
        1
    );
    assert_eq!(transport.fetch_count("https://bobpay.com/app.json").await, 1);
}

#[tokio::test]
async fn test_terminal_signal_is_last_and_unique() {
    let transport = manifests().await;
    let apps = vec![
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY),
        payment_app("com.davepay", 1, DAVEPAY_PROD_CERT, DAVEPAY),
        payment_app("com.basic", 1, IKEPAY_CERT, "basic-card"),
    ];
    let finder = Arc::new(finder(&transport, apps));
    let (events, handle) = finder.find_stream(
        vec![BOBPAY.to_string(), DAVEPAY.to_string(), "basic-card".to_string()],
        CancellationToken::new(),
    );

    assert_eq!(handle.await.unwrap(), FindStatus::Completed { authorized: 3 });
    let events = drain(events).await;
    assert_eq!(events.len(), 4);
    assert_eq!(events.last(), Some(&FinderEvent::Complete));
    assert_eq!(
        events.iter().filter(|e| **e == FinderEvent::Complete).count(),
        1
    );
}

#[tokio::test]
async fn test_find_pushes_into_sink() {
    let transport = manifests().await;
    let apps = vec![
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY).with_ready_to_pay_service(),
        payment_app("com.basic", 1, IKEPAY_CERT, "basic-card"),
    ];
    let finder = finder(&transport, apps);
    let sink = CollectingSink::new();

    let status = finder
        .find(&[BOBPAY, "basic-card"], &sink, &CancellationToken::new())
        .await;
    assert_eq!(status, FindStatus::Completed { authorized: 2 });
    assert_eq!(sink.completions(), 1);
    assert_eq!(sink.late_apps(), 0);

    let apps = sink.apps();
    let bobpay = apps.iter().find(|a| a.package_id() == "com.bobpay").unwrap();
    assert!(bobpay.app.has_ready_to_pay_service);
}

#[tokio::test]
async fn test_late_response_after_cancellation() {
    let gated = GatedTransport::new(manifests().await);
    let apps = vec![
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY).with_supported_methods(["basic-card"]),
    ];
    let finder = Arc::new(finder_with(Arc::new(gated.clone()), apps));
    let cancel = CancellationToken::new();

    let (events, handle) =
        finder.find_stream(vec![BOBPAY.to_string(), "basic-card".to_string()], cancel.clone());
    tokio::time::timeout(Duration::from_secs(5), gated.fetch_started())
        .await
        .unwrap();
    cancel.cancel();
    gated.release_all();

    let status = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, FindStatus::Cancelled);
    assert!(drain(events).await.is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let transport = manifests().await;
    let apps = vec![payment_app("com.basic", 1, IKEPAY_CERT, "basic-card")];
    let finder = Arc::new(finder(&transport, apps));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (events, handle) = finder.find_stream(vec!["basic-card".to_string()], cancel);
    assert_eq!(handle.await.unwrap(), FindStatus::Cancelled);
    assert!(drain(events).await.is_empty());
}

struct BrokenInventory;

impl AppInventory for BrokenInventory {
    fn installed_apps(&self) -> Result<Vec<InstalledApp>> {
        Err(FinderError::Inventory("package manager unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_inventory_failure_yields_empty_result() {
    let transport = manifests().await;
    let config = config();
    let finder = Arc::new(PaymentAppFinder::new(
        Arc::new(transport.clone()),
        Arc::new(JsonManifestDecoder::new(&config)),
        Arc::new(BrokenInventory),
        config,
    ));

    let (events, handle) =
        finder.find_stream(vec!["basic-card".to_string()], CancellationToken::new());
    assert_eq!(handle.await.unwrap(), FindStatus::Completed { authorized: 0 });
    assert_eq!(drain(events).await, vec![FinderEvent::Complete]);
}

#[tokio::test]
async fn test_excluded_entry_does_not_shadow_valid_duplicate() {
    let transport = manifests().await;
    let apps = vec![
        InstalledApp::new("com.bobpay", "", 1)
            .with_certificate(BOBPAY_CERT)
            .with_default_method("basic-card"),
        payment_app("com.bobpay", 10, BOBPAY_CERT, "basic-card"),
        payment_app("com.bobpay", 10, BOBPAY_CERT, "basic-card"),
    ];
    let found = finder(&transport, apps).find_apps(&["basic-card"]).await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].package_id(), "com.bobpay");
    assert_eq!(found[0].app.version, 10);
}

/// The merchant's own TWA package plus bobpay, which has a verifiable manifest.
fn billing_apps(twa_default: &str, twa_supported: &[&str]) -> Vec<InstalledApp> {
    vec![
        payment_app(TWA, 1, BOBPAY_CERT, twa_default)
            .with_supported_methods(twa_supported.iter().copied()),
        payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY).with_supported_methods([BOBPAY]),
    ]
}

#[tokio::test]
async fn test_app_store_method_ignored_outside_twa() {
    let transport = manifests().await;
    let mut config = config();
    config.app_stores = BTreeMap::from([(BOBPAY.to_string(), "com.bobpay".to_string())]);
    let apps = vec![payment_app("com.bobpay", 10, BOBPAY_CERT, BOBPAY)];
    let finder = finder_with_config(Arc::new(transport.clone()), apps, config);

    assert!(finder.find_apps(&[BOBPAY]).await.is_empty());
    assert_eq!(transport.total_fetches().await, 0);
}

#[tokio::test]
async fn test_app_store_billing_in_twa() {
    let transport = manifests().await;
    let context = PaymentContext::in_twa(TWA);

    // Declared as the default method.
    let finder = finder(&transport, billing_apps(GOOGLE_PLAY_BILLING, &[]));
    let found = finder.find_apps_in(&[GOOGLE_PLAY_BILLING], &context).await;
    assert_eq!(
        by_package(&found),
        BTreeMap::from([(TWA.to_string(), methods(&[GOOGLE_PLAY_BILLING]))])
    );

    // Declared only as a supported method.
    let finder = finder_with(
        Arc::new(transport.clone()),
        billing_apps("an://invalid.url", &[GOOGLE_PLAY_BILLING]),
    );
    let found = finder.find_apps_in(&[GOOGLE_PLAY_BILLING], &context).await;
    assert_eq!(
        by_package(&found),
        BTreeMap::from([(TWA.to_string(), methods(&[GOOGLE_PLAY_BILLING]))])
    );
    assert_eq!(transport.total_fetches().await, 0);
}

#[tokio::test]
async fn test_twa_without_billing_metadata_not_found() {
    let transport = manifests().await;
    let apps = vec![InstalledApp::new(TWA, "MerchantTwaApp", 1).with_certificate(BOBPAY_CERT)];
    let found = finder(&transport, apps)
        .find_apps_in(&[GOOGLE_PLAY_BILLING], &PaymentContext::in_twa(TWA))
        .await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_twa_supports_several_app_store_methods() {
    let transport = manifests().await;
    let mut config = config();
    config
        .app_stores
        .insert(ANOTHER_STORE.to_string(), "com.another.appstore".to_string());
    let apps = billing_apps(ANOTHER_STORE, &[GOOGLE_PLAY_BILLING]);
    let finder = finder_with_config(Arc::new(transport.clone()), apps, config);

    let found = finder
        .find_apps_in(&[GOOGLE_PLAY_BILLING, ANOTHER_STORE], &PaymentContext::in_twa(TWA))
        .await;
    assert_eq!(
        by_package(&found),
        BTreeMap::from([(TWA.to_string(), methods(&[ANOTHER_STORE, GOOGLE_PLAY_BILLING]))])
    );
}

#[tokio::test]
async fn test_app_store_billing_alongside_web_methods() {
    let transport = manifests().await;
    let requested = [GOOGLE_PLAY_BILLING, BOBPAY];
    let bobpay_only = BTreeMap::from([("com.bobpay".to_string(), methods(&[BOBPAY]))]);

    // Outside a TWA only bobpay is found.
    let finder = finder(&transport, billing_apps(GOOGLE_PLAY_BILLING, &[GOOGLE_PLAY_BILLING]));
    assert_eq!(by_package(&finder.find_apps(&requested).await), bobpay_only);

    // Billing not requested.
    let found = finder
        .find_apps_in(&[BOBPAY], &PaymentContext::in_twa(TWA))
        .await;
    assert_eq!(by_package(&found), bobpay_only);

    // Both kinds are offered side by side.
    let found = finder
        .find_apps_in(&requested, &PaymentContext::in_twa(TWA))
        .await;
    assert_eq!(
        by_package(&found),
        BTreeMap::from([
            ("com.bobpay".to_string(), methods(&[BOBPAY])),
            (TWA.to_string(), methods(&[GOOGLE_PLAY_BILLING])),
        ])
    );
}

#[tokio::test]
async fn test_delegation_request_rejects_app_store_billing() {
    let transport = manifests().await;
    let finder = finder(&transport, billing_apps(GOOGLE_PLAY_BILLING, &[GOOGLE_PLAY_BILLING]));
    let context = PaymentContext::in_twa(TWA).with_shipping_or_contact();

    let found = finder.find_apps_in(&[GOOGLE_PLAY_BILLING, BOBPAY], &context).await;
    assert_eq!(
        by_package(&found),
        BTreeMap::from([("com.bobpay".to_string(), methods(&[BOBPAY]))])
    );
}
