//! The resource manager.
//!
//! Converts a list of logical resource requests (explicit name/path pairs,
//! or a remote listing when the list is empty) into loaded payloads, with
//! observable progress, per-media-type loaders, and a single terminal
//! completion event. The same manager also owns the session round-trips to
//! the remote experiment server; each one follows the READY→BUSY→READY (or
//! ERROR) status discipline, and a second operation started while one is in
//! flight is rejected.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use stim_core::config::Configuration;
use stim_core::error::{Cause, Envelope};
use stim_core::SessionContext;
use stim_net::messages::{ListResourcesResponse, OpenSessionResponse, SessionAck};
use stim_net::{NetError, Remote};

use crate::classify::classify;
use crate::event::{ManagerStatus, ResourceEvent};
use crate::fetch::{AudioFetcher, BulkFetcher, Payload};
use crate::registry::{Registry, RegistryError};

const EVENT_CAPACITY: usize = 256;

/// A logical resource request: a unique name and the location to fetch it
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub name: String,
    pub path: String,
}

impl ResourceRequest {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

struct Inner {
    registry: Mutex<Registry>,
    status: Mutex<ManagerStatus>,
    events: broadcast::Sender<ResourceEvent>,
    remote: Arc<dyn Remote>,
    bulk: Arc<dyn BulkFetcher>,
    audio: Arc<dyn AudioFetcher>,
    last_error: Mutex<Option<Envelope>>,
}

/// Cheaply clonable handle to the shared manager state.
#[derive(Clone)]
pub struct ResourceManager {
    inner: Arc<Inner>,
}

impl ResourceManager {
    pub fn new(
        remote: Arc<dyn Remote>,
        bulk: Arc<dyn BulkFetcher>,
        audio: Arc<dyn AudioFetcher>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::new()),
                status: Mutex::new(ManagerStatus::Ready),
                events,
                remote,
                bulk,
                audio,
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to progress and status events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.inner.events.subscribe()
    }

    /// The current manager status.
    #[must_use]
    pub fn status(&self) -> ManagerStatus {
        *lock(&self.inner.status)
    }

    /// The error that put the manager into [`ManagerStatus::Error`] from a
    /// fire-and-forget pipeline, if any. Taking it does not reset the
    /// status.
    #[must_use]
    pub fn take_error(&self) -> Option<Envelope> {
        lock(&self.inner.last_error).take()
    }

    /// Whether the manifest is registered and every resource is loaded.
    ///
    /// Cooperative tasks poll this once per frame to gate experiment
    /// progression on asset readiness.
    #[must_use]
    pub fn resources_ready(&self) -> bool {
        lock(&self.inner.registry).is_complete()
    }

    // ── Resource registry ───────────────────────────────────────────────────

    /// Synchronous payload lookup.
    ///
    /// Returns `None` for a registered resource whose transfer has not
    /// finished; callers are expected to wait for
    /// [`ResourceEvent::DownloadCompleted`] first.
    ///
    /// # Errors
    ///
    /// Returns an envelope for a name that was never registered. This is a
    /// local contract fault, not a transport failure.
    pub fn get_resource(&self, name: &str) -> Result<Option<Payload>, Envelope> {
        let registry = lock(&self.inner.registry);
        match registry.get(name) {
            Some(entry) => Ok(entry.data.clone()),
            None => Err(Envelope::new(
                "ResourceManager.getResource",
                format!("when getting the value of resource: {name}"),
                RegistryError::Unknown,
            )),
        }
    }

    /// Start the download pipeline. Fire and forget: the call returns once
    /// the pipeline is dispatched; progress and completion are observed
    /// through [`ResourceManager::subscribe`], failures through the manager
    /// status and [`ResourceManager::take_error`].
    ///
    /// An empty `resources` list means "ask the remote listing endpoint for
    /// the manifest".
    ///
    /// # Errors
    ///
    /// Rejects synchronously when resources were already registered this
    /// session (one `download` per session) or when another manager
    /// operation is in flight.
    pub fn download(
        &self,
        ctx: &SessionContext,
        resources: Vec<ResourceRequest>,
    ) -> Result<(), Envelope> {
        const ORIGIN: &str = "ResourceManager.download";
        let context = format!(
            "when downloading the resources for experiment: {}",
            ctx.experiment_name
        );
        if lock(&self.inner.registry).is_frozen() {
            return Err(Envelope::new(ORIGIN, context, RegistryError::AlreadyFrozen));
        }
        self.try_begin(ORIGIN, &context)?;
        debug!(experiment = %ctx.experiment_name, "downloading resources");

        let this = self.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(source) = this.run_download(&ctx, resources).await {
                this.fail(Envelope::new(ORIGIN, context, source));
            }
        });
        Ok(())
    }

    async fn run_download(
        &self,
        ctx: &SessionContext,
        resources: Vec<ResourceRequest>,
    ) -> Result<(), Cause> {
        // Discovery: an empty request list means the manifest comes from the
        // remote listing endpoint.
        let requests = if resources.is_empty() {
            let listing = self.list_resources_inner(ctx).await?;
            listing
                .resources
                .iter()
                .map(|name| {
                    ResourceRequest::new(name, format!("{}/{}", listing.resource_directory, name))
                })
                .collect()
        } else {
            resources
        };

        // Register everything and freeze the expected total before any
        // transfer starts.
        let total = {
            let mut registry = lock(&self.inner.registry);
            for request in &requests {
                registry.register(&request.name, &request.path)?;
            }
            registry.freeze()
        };
        for request in &requests {
            debug!(resource = %request.name, path = %request.path, "resource registered");
        }
        self.emit(ResourceEvent::ResourcesRegistered { count: total });

        let (manifest, audio_items): (Vec<_>, Vec<_>) = requests
            .into_iter()
            .partition(|request| classify(&request.name).is_bulk());

        // The bulk batch-completion callback never fires for an empty
        // manifest, so the threshold check runs here, before the audio
        // dispatch. This is what completes the zero-resource case.
        if manifest.is_empty() {
            self.check_completion();
        }

        // Audio route: one independent transfer and completion per item.
        for request in audio_items {
            lock(&self.inner.registry).mark_loading(&request.name)?;
            self.emit(ResourceEvent::DownloadingResource {
                name: request.name.clone(),
            });
            let this = self.clone();
            let experiment = ctx.experiment_name.clone();
            tokio::spawn(async move {
                let outcome = match this.inner.audio.fetch(&request.path).await {
                    Ok(clip) => this.finish_item(&request.name, Payload::Audio(clip), true),
                    Err(err) => Err(format!(
                        "unable to download resource: {} ({err})",
                        request.name
                    )
                    .into()),
                };
                if let Err(source) = outcome {
                    this.fail(Envelope::new(
                        "ResourceManager.download",
                        format!("when downloading the resources for experiment: {experiment}"),
                        source,
                    ));
                }
            });
        }

        // Bulk route: concurrent transfers, one batch-completion check.
        if !manifest.is_empty() {
            let mut transfers = FuturesUnordered::new();
            for request in manifest {
                lock(&self.inner.registry).mark_loading(&request.name)?;
                self.emit(ResourceEvent::DownloadingResource {
                    name: request.name.clone(),
                });
                let bulk = Arc::clone(&self.inner.bulk);
                transfers.push(async move {
                    let result = bulk.fetch(&request.path).await;
                    (request, result)
                });
            }
            while let Some((request, result)) = transfers.next().await {
                match result {
                    Ok(bytes) => self.finish_item(&request.name, Payload::Binary(bytes), false)?,
                    Err(err) => {
                        return Err(format!(
                            "unable to download resource: {} ({err})",
                            request.name
                        )
                        .into())
                    }
                }
            }
            self.check_completion();
        }

        Ok(())
    }

    /// Store a payload and, for independently completing routes, run the
    /// threshold check under the same lock as the counter update.
    fn finish_item(&self, name: &str, payload: Payload, check: bool) -> Result<(), Cause> {
        let completed = {
            let mut registry = lock(&self.inner.registry);
            registry.store(name, payload)?;
            if check {
                registry.check_complete()
            } else {
                false
            }
        };
        self.emit(ResourceEvent::ResourceDownloaded {
            name: name.to_string(),
        });
        if completed {
            self.complete();
        }
        Ok(())
    }

    fn check_completion(&self) {
        let completed = lock(&self.inner.registry).check_complete();
        if completed {
            self.complete();
        }
    }

    fn complete(&self) {
        info!("all resources downloaded");
        self.set_status(ManagerStatus::Ready);
        self.emit(ResourceEvent::DownloadCompleted);
    }

    // ── Session round-trips ─────────────────────────────────────────────────

    /// Fetch and validate the experiment configuration document.
    ///
    /// # Errors
    ///
    /// Returns an envelope for transport failures, malformed documents, or
    /// when the manager is busy.
    pub async fn get_configuration(&self, config_url: &str) -> Result<Configuration, Envelope> {
        const ORIGIN: &str = "ResourceManager.getConfiguration";
        let context = format!("when reading the configuration file: {config_url}");
        debug!(url = config_url, "reading the configuration file");
        self.try_begin(ORIGIN, &context)?;
        let result: Result<Configuration, Cause> = async {
            let document = self.inner.remote.get_json(config_url, &[]).await?;
            Ok(Configuration::from_json(&document)?)
        }
        .await;
        self.finish_op(ORIGIN, context, result)
    }

    /// Open a session; the returned token goes into the orchestrator's
    /// [`SessionContext`].
    ///
    /// # Errors
    ///
    /// Returns an envelope for transport or protocol failures, or when the
    /// manager is busy.
    pub async fn open_session(&self, ctx: &SessionContext) -> Result<OpenSessionResponse, Envelope> {
        const ORIGIN: &str = "ResourceManager.openSession";
        let context = format!(
            "when opening a session for experiment: {}",
            ctx.experiment_name
        );
        debug!(experiment = %ctx.experiment_name, "opening a session");
        self.try_begin(ORIGIN, &context)?;
        let result: Result<OpenSessionResponse, Cause> = async {
            let document = self
                .inner
                .remote
                .post_form(
                    &ctx.manager_url,
                    &[("command", "open_session")],
                    &[("experimentFullPath", ctx.experiment_fullpath.clone())],
                )
                .await?;
            Ok(OpenSessionResponse::from_json(&document)?)
        }
        .await;
        self.finish_op(ORIGIN, context, result)
    }

    /// Close the session, flagging whether the experiment ran to completion.
    ///
    /// # Errors
    ///
    /// Returns an envelope for transport or protocol failures, or when the
    /// manager is busy.
    pub async fn close_session(
        &self,
        ctx: &SessionContext,
        is_completed: bool,
    ) -> Result<SessionAck, Envelope> {
        const ORIGIN: &str = "ResourceManager.closeSession";
        let context = format!(
            "when closing the session for experiment: {}",
            ctx.experiment_name
        );
        debug!(experiment = %ctx.experiment_name, is_completed, "closing the session");
        self.try_begin(ORIGIN, &context)?;
        let result: Result<SessionAck, Cause> = async {
            let document = self
                .inner
                .remote
                .post_form(
                    &ctx.manager_url,
                    &[("command", "close_session")],
                    &[
                        ("experimentFullPath", ctx.experiment_fullpath.clone()),
                        ("token", ctx.token_or_empty().to_string()),
                        ("isCompleted", is_completed.to_string()),
                    ],
                )
                .await?;
            Ok(SessionAck::from_json(&document)?)
        }
        .await;
        self.finish_op(ORIGIN, context, result)
    }

    /// Upload one key/value of collected results.
    ///
    /// # Errors
    ///
    /// Returns an envelope for transport or protocol failures, or when the
    /// manager is busy.
    pub async fn upload_data(
        &self,
        ctx: &SessionContext,
        key: &str,
        value: String,
    ) -> Result<SessionAck, Envelope> {
        const ORIGIN: &str = "ResourceManager.uploadData";
        let context = format!(
            "when uploading participant's results for experiment: {}",
            ctx.experiment_name
        );
        debug!(experiment = %ctx.experiment_name, key, "uploading data");
        self.try_begin(ORIGIN, &context)?;
        let result: Result<SessionAck, Cause> = async {
            let document = self
                .inner
                .remote
                .post_form(
                    &ctx.manager_url,
                    &[("command", "save_data")],
                    &[
                        ("experimentFullPath", ctx.experiment_fullpath.clone()),
                        ("token", ctx.token_or_empty().to_string()),
                        ("key", key.to_string()),
                        ("value", value),
                        ("saveFormat", ctx.save_format.wire_name().to_string()),
                    ],
                )
                .await?;
            Ok(SessionAck::from_json(&document)?)
        }
        .await;
        self.finish_op(ORIGIN, context, result)
    }

    /// Ask the remote listing endpoint for the resource manifest.
    ///
    /// # Errors
    ///
    /// Returns an envelope for transport or protocol failures, or when the
    /// manager is busy.
    pub async fn list_resources(
        &self,
        ctx: &SessionContext,
    ) -> Result<ListResourcesResponse, Envelope> {
        const ORIGIN: &str = "ResourceManager.listResources";
        let context = format!(
            "when listing the resources for experiment: {}",
            ctx.experiment_name
        );
        self.try_begin(ORIGIN, &context)?;
        let result: Result<ListResourcesResponse, Cause> = async {
            Ok(self.list_resources_inner(ctx).await?)
        }
        .await;
        self.finish_op(ORIGIN, context, result)
    }

    /// Listing round-trip without the status guard, for use inside the
    /// download pipeline (which already holds the BUSY status).
    async fn list_resources_inner(
        &self,
        ctx: &SessionContext,
    ) -> Result<ListResourcesResponse, NetError> {
        debug!(experiment = %ctx.experiment_name, "listing the resources");
        let document = self
            .inner
            .remote
            .get_json(
                &ctx.manager_url,
                &[
                    ("command", "list_resources"),
                    ("experimentFullPath", &ctx.experiment_fullpath),
                    ("token", ctx.token_or_empty()),
                ],
            )
            .await?;
        ListResourcesResponse::from_json(&document)
    }

    // ── Status discipline ───────────────────────────────────────────────────

    fn try_begin(&self, origin: &'static str, context: &str) -> Result<(), Envelope> {
        {
            let mut status = lock(&self.inner.status);
            if *status == ManagerStatus::Busy {
                return Err(Envelope::new(
                    origin,
                    context.to_string(),
                    "the manager is busy with another operation",
                ));
            }
            *status = ManagerStatus::Busy;
        }
        self.emit(ResourceEvent::Status {
            status: ManagerStatus::Busy,
        });
        Ok(())
    }

    fn finish_op<T>(
        &self,
        origin: &'static str,
        context: String,
        result: Result<T, Cause>,
    ) -> Result<T, Envelope> {
        match result {
            Ok(value) => {
                self.set_status(ManagerStatus::Ready);
                Ok(value)
            }
            Err(source) => {
                self.set_status(ManagerStatus::Error);
                Err(Envelope::new(origin, context, source))
            }
        }
    }

    fn set_status(&self, status: ManagerStatus) {
        *lock(&self.inner.status) = status;
        self.emit(ResourceEvent::Status { status });
    }

    fn fail(&self, envelope: Envelope) {
        error!(error = %envelope, "resource pipeline failed");
        self.set_status(ManagerStatus::Error);
        *lock(&self.inner.last_error) = Some(envelope);
    }

    fn emit(&self, event: ResourceEvent) {
        // No subscribers is fine; progress observation is optional.
        let _ = self.inner.events.send(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
