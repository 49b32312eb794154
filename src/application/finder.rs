use super::cancel::CancellationToken;
use super::matcher::{self, ManifestMap};
use super::pipeline::ManifestPipeline;
use crate::config::FinderConfig;
use crate::domain::app::{AuthorizedApp, Candidate};
use crate::domain::app_store::{AppStoreMethods, PaymentContext};
use crate::domain::manifest::{ManifestOutcome, SupportedOrigins};
use crate::domain::method::{MethodClassifier, MethodIdentifier, UrlPolicy};
use crate::domain::ports::{DecoderRef, InventoryRef, ResultSink, TransportRef};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Events delivered by [`PaymentAppFinder::find_stream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinderEvent {
    AppAuthorized(AuthorizedApp),
    /// Always the last event of a query that was not cancelled.
    Complete,
}

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindStatus {
    Completed { authorized: usize },
    /// Nothing further was emitted after cancellation, not even `Complete`.
    Cancelled,
}

/// A [`ResultSink`] that forwards events into an unbounded channel.
///
/// Events sent after the receiver is gone are dropped silently.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    events: mpsc::UnboundedSender<FinderEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FinderEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { events }, receiver)
    }
}

impl ResultSink for ChannelSink {
    fn app_authorized(&self, app: AuthorizedApp) {
        let _ = self.events.send(FinderEvent::AppAuthorized(app));
    }

    fn resolution_complete(&self) {
        let _ = self.events.send(FinderEvent::Complete);
    }
}

/// Resolves which installed payment apps may handle which requested methods.
///
/// `PaymentAppFinder` owns its collaborators and keeps no state between
/// queries: every call to [`find`](Self::find) takes a fresh inventory snapshot
/// and a fresh, query-scoped manifest cache.
pub struct PaymentAppFinder {
    transport: TransportRef,
    decoder: DecoderRef,
    inventory: InventoryRef,
    config: FinderConfig,
    classifier: MethodClassifier,
    app_stores: AppStoreMethods,
}

impl PaymentAppFinder {
    /// Creates a new `PaymentAppFinder`.
    ///
    /// # Arguments
    ///
    /// * `transport` - Fetches manifest documents.
    /// * `decoder` - Parses manifest documents.
    /// * `inventory` - Lists the installed apps.
    /// * `config` - Scheme policy, manifest location, limits and app stores.
    pub fn new(
        transport: TransportRef,
        decoder: DecoderRef,
        inventory: InventoryRef,
        config: FinderConfig,
    ) -> Self {
        let classifier = MethodClassifier::new(UrlPolicy::new(config.allow_http));
        let app_stores = AppStoreMethods::new(&config.app_stores, &classifier);
        Self {
            transport,
            decoder,
            inventory,
            config,
            classifier,
            app_stores,
        }
    }

    /// Runs one query outside any trusted web activity, so app-store billing
    /// methods are ignored.
    pub async fn find<S: AsRef<str>>(
        &self,
        requested: &[S],
        sink: &dyn ResultSink,
        cancel: &CancellationToken,
    ) -> FindStatus {
        self.find_in(requested, &PaymentContext::default(), sink, cancel)
            .await
    }

    /// Runs one query, pushing each authorized app into `sink` followed by a
    /// single completion signal.
    ///
    /// Failures of individual manifests only exclude the apps that depended on
    /// them. If `cancel` fires, in-flight fetches are abandoned and `sink` is
    /// not touched again.
    pub async fn find_in<S: AsRef<str>>(
        &self,
        requested: &[S],
        context: &PaymentContext,
        sink: &dyn ResultSink,
        cancel: &CancellationToken,
    ) -> FindStatus {
        if cancel.is_cancelled() {
            return FindStatus::Cancelled;
        }

        let classified: BTreeSet<MethodIdentifier> = self
            .classifier
            .classify_all(requested.iter().map(AsRef::as_ref))
            .into_iter()
            .collect();
        let (methods, billing) = self.app_stores.partition(classified, context);
        let candidates = if methods.is_empty() {
            Vec::new()
        } else {
            self.snapshot_candidates(&methods)
        };

        let manifests = if candidates.is_empty() {
            debug!(methods = methods.len(), "nothing to resolve");
            ManifestMap::new()
        } else {
            let pipeline = ManifestPipeline::new(
                Arc::clone(&self.transport),
                Arc::clone(&self.decoder),
                &self.config,
                cancel.clone(),
            );
            let barrier = Barrier::new(pipeline, &self.app_stores);
            match resolve_manifests(barrier, &methods, &candidates, cancel).await {
                Some(manifests) => manifests,
                None => {
                    debug!("query cancelled while manifests were in flight");
                    return FindStatus::Cancelled;
                }
            }
        };
        if cancel.is_cancelled() {
            return FindStatus::Cancelled;
        }

        let authorized = matcher::authorize(&methods, &candidates, &manifests, &billing);
        let count = authorized.len();
        for app in authorized {
            debug!(
                package = app.package_id(),
                methods = app.methods.len(),
                "app authorized"
            );
            sink.app_authorized(app);
        }
        sink.resolution_complete();

        info!(
            requested = methods.len(),
            candidates = candidates.len(),
            authorized = count,
            "payment app resolution complete"
        );
        FindStatus::Completed { authorized: count }
    }

    /// Runs one uncancellable query and collects the authorized apps.
    pub async fn find_apps<S: AsRef<str>>(&self, requested: &[S]) -> Vec<AuthorizedApp> {
        self.find_apps_in(requested, &PaymentContext::default())
            .await
    }

    /// [`find_apps`](Self::find_apps) on behalf of a merchant surface.
    pub async fn find_apps_in<S: AsRef<str>>(
        &self,
        requested: &[S],
        context: &PaymentContext,
    ) -> Vec<AuthorizedApp> {
        let (sink, mut events) = ChannelSink::new();
        self.find_in(requested, context, &sink, &CancellationToken::new())
            .await;
        drop(sink);

        let mut apps = Vec::new();
        while let Some(event) = events.recv().await {
            if let FinderEvent::AppAuthorized(app) = event {
                apps.push(app);
            }
        }
        apps
    }

    /// Runs the query on a background task and streams its events.
    pub fn find_stream(
        self: &Arc<Self>,
        requested: Vec<String>,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedReceiver<FinderEvent>, JoinHandle<FindStatus>) {
        let (sink, events) = ChannelSink::new();
        let finder = Arc::clone(self);
        let handle = tokio::spawn(async move { finder.find(&requested, &sink, &cancel).await });
        (events, handle)
    }

    /// Screens the inventory snapshot down to apps that could match at least
    /// one requested method. Among entries sharing a package id, the first one
    /// that passes screening is kept.
    fn snapshot_candidates(&self, methods: &BTreeSet<MethodIdentifier>) -> Vec<Candidate> {
        let apps = match self.inventory.installed_apps() {
            Ok(apps) => apps,
            Err(e) => {
                warn!(error = %e, "installed app inventory unavailable");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for app in apps {
            let package = app.package_id.clone();
            match Candidate::screen(app, &self.classifier) {
                Ok(candidate) if methods.iter().any(|m| candidate.declares(m)) => {
                    if seen.insert(package) {
                        candidates.push(candidate);
                    } else {
                        warn!(package = candidate.package_id(), "duplicate package in inventory");
                    }
                }
                Ok(_) => {}
                Err(reason) => debug!(package = %package, %reason, "app excluded"),
            }
        }
        candidates
    }
}

/// Counting barrier over every manifest the query depends on.
///
/// Requested URL methods are resolved concurrently. When a method restricts
/// itself to enumerated origins, the default methods of the apps claiming those
/// origins are scheduled too, so each claim can be checked against the
/// claimant's own manifest. Returns `None` if cancelled.
async fn resolve_manifests(
    mut barrier: Barrier,
    methods: &BTreeSet<MethodIdentifier>,
    candidates: &[Candidate],
    cancel: &CancellationToken,
) -> Option<ManifestMap> {
    for method in methods {
        barrier.schedule(method);
    }

    let mut manifests = ManifestMap::new();
    while !barrier.is_drained() {
        let (method, outcome) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            completed = barrier.next() => completed?,
        };
        debug!(
            method = %method,
            resolved = outcome.is_resolved(),
            outstanding = barrier.outstanding(),
            "manifest settled"
        );

        if methods.contains(&method)
            && let ManifestOutcome::Authorized {
                default_app_rules,
                supported_origins: SupportedOrigins::Enumerated(origins),
            } = outcome.as_ref()
        {
            for candidate in candidates.iter().filter(|c| c.declares(&method)) {
                let claims_listed_origin = candidate
                    .claimed_origin()
                    .is_some_and(|origin| origins.contains(&origin));
                if claims_listed_origin
                    && !matcher::matches_default_application(candidate, default_app_rules)
                    && let Some(own_method) = &candidate.default_method
                {
                    barrier.schedule(own_method);
                }
            }
        }
        manifests.insert(method, outcome);
    }
    Some(manifests)
}

/// In-flight manifest resolutions of one query. A failed task settles its
/// method as unresolvable instead of aborting its siblings.
struct Barrier {
    pipeline: ManifestPipeline,
    /// App-store methods have no manifests and are never fetched.
    app_stores: AppStoreMethods,
    scheduled: HashSet<MethodIdentifier>,
    in_flight: HashMap<Id, MethodIdentifier>,
    tasks: JoinSet<(MethodIdentifier, Arc<ManifestOutcome>)>,
}

impl Barrier {
    fn new(pipeline: ManifestPipeline, app_stores: &AppStoreMethods) -> Self {
        Self {
            pipeline,
            app_stores: app_stores.clone(),
            scheduled: HashSet::new(),
            in_flight: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Standardized, app-store and already scheduled methods are ignored.
    fn schedule(&mut self, method: &MethodIdentifier) {
        let Some(url) = method.url().cloned() else {
            return;
        };
        if self.app_stores.contains(method) {
            return;
        }
        if !self.scheduled.insert(method.clone()) {
            return;
        }
        let pipeline = self.pipeline.clone();
        let owned = method.clone();
        let handle = self.tasks.spawn(async move {
            let outcome = pipeline.resolve(&url).await;
            (owned, outcome)
        });
        self.in_flight.insert(handle.id(), method.clone());
    }

    fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    fn is_drained(&self) -> bool {
        self.tasks.is_empty()
    }

    async fn next(&mut self) -> Option<(MethodIdentifier, Arc<ManifestOutcome>)> {
        loop {
            match self.tasks.join_next_with_id().await? {
                Ok((id, settled)) => {
                    self.in_flight.remove(&id);
                    return Some(settled);
                }
                Err(e) => {
                    warn!(error = %e, "manifest resolution task failed");
                    if let Some(method) = self.in_flight.remove(&e.id()) {
                        return Some((method, Arc::new(ManifestOutcome::Unresolvable)));
                    }
                }
            }
        }
    }
}
