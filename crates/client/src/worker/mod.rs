//! Offline cache coordinator.
//!
//! One `Coordinator` is built per worker instantiation and owns everything
//! the lifecycle events touch: the cache handle, the network transport, the
//! router, the background writer, lifecycle state and the page clients.
//!
//! ### Event surface
//! - `install`: pre-cache the static manifest, all-or-nothing
//! - `activate`: evict partitions whose name isn't current, claim clients
//! - `fetch`: classify, then run the route's strategy
//! - `sync` / `push` / `notificationclick` / `message`: see [`events`]

pub mod events;
pub mod lifecycle;
pub mod router;
pub mod strategy;
pub mod writer;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::try_join_all;
use safenest_core::{AppConfig, CacheDb, CacheEntry, CacheNames, CachedResponse, Error, Partition};
use serde::Serialize;
use url::Url;

pub use events::{ClickOutcome, ControlMessage, Notification, SyncOutcome};
pub use lifecycle::WorkerState;
pub use router::{Route, Router, Rule};
pub use strategy::{FetchOutcome, ResponseSource, Strategy, offline_response};
pub use writer::{CacheWriter, WriteFailure};

use crate::fetch::{FetchRequest, Network, resolve};
use lifecycle::{Clients, Lifecycle};
use strategy::StrategyContext;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Settings the coordinator needs from the application config.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub origin: Url,
    pub api_prefix: String,
    pub caches: CacheNames,
    pub static_manifest: Vec<String>,
    pub offline_message: String,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;

        Ok(Self {
            origin,
            api_prefix: config.api_prefix.clone(),
            caches: config.caches.clone(),
            static_manifest: config.static_manifest.clone(),
            offline_message: config.offline_message.clone(),
        })
    }
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub partition: String,
    pub cached: usize,
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    /// Stale partitions that were deleted.
    pub deleted: Vec<String>,
    /// Page clients newly brought under control.
    pub claimed: usize,
}

/// The request-interception coordinator.
pub struct Coordinator {
    config: WorkerConfig,
    cache: CacheDb,
    network: Arc<dyn Network>,
    router: Router,
    writer: CacheWriter,
    lifecycle: Lifecycle,
    clients: Clients,
}

impl Coordinator {
    pub fn new(config: WorkerConfig, cache: CacheDb, network: Arc<dyn Network>) -> Self {
        let router = Router::new(config.api_prefix.clone());
        let writer = CacheWriter::new(cache.clone());
        Self { config, cache, network, router, writer, lifecycle: Lifecycle::new(), clients: Clients::default() }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheDb {
        &self.cache
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    /// Resolve a path or URL against the dashboard origin.
    pub fn resolve(&self, input: &str) -> Result<Url, Error> {
        resolve(&self.config.origin, input).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// Record an open page; pages opened after activation start out controlled.
    pub fn register_client(&self, id: &str) {
        self.clients.register(id, self.state().can_intercept_fetch());
    }

    pub fn controlled_clients(&self) -> usize {
        self.clients.controlled()
    }

    /// Wait for outstanding background cache writes.
    pub async fn settle(&self) {
        self.writer.settle().await;
    }

    pub fn write_failures(&self) -> Vec<WriteFailure> {
        self.writer.failures()
    }

    /// Whether install finished and waiting may be skipped.
    pub fn ready_to_activate(&self) -> bool {
        self.lifecycle.ready_to_activate()
    }

    /// Handle the `install` event.
    ///
    /// Fetches the whole static manifest and commits it in one transaction.
    /// Any failed or non-2xx fetch aborts the install with nothing written
    /// and leaves this coordinator redundant. A redundant coordinator may
    /// install again.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.lifecycle
            .transition_from(&[WorkerState::Parsed, WorkerState::Redundant], WorkerState::Installing)?;

        match self.precache().await {
            Ok(report) => {
                self.lifecycle.set(WorkerState::Installed);
                self.lifecycle.skip_waiting();
                tracing::info!(partition = %report.partition, cached = report.cached, "install complete");
                Ok(report)
            }
            Err(e) => {
                self.lifecycle.set(WorkerState::Redundant);
                tracing::error!("install failed: {e}");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<InstallReport, Error> {
        let partition = self.config.caches.name(Partition::Static).to_string();

        let requests = self
            .config
            .static_manifest
            .iter()
            .map(|path| {
                resolve(&self.config.origin, path)
                    .map(FetchRequest::get)
                    .map_err(|e| Error::InstallFailed { url: path.clone(), reason: e.to_string() })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let responses = try_join_all(requests.iter().map(|request| self.fetch_manifest_entry(request))).await?;

        let entries = requests
            .iter()
            .zip(responses)
            .map(|(request, response)| CacheEntry::new(&partition, "GET", request.cache_url(), response))
            .collect();

        let cached = self.cache.put_all(&partition, entries).await?;
        Ok(InstallReport { partition, cached })
    }

    async fn fetch_manifest_entry(&self, request: &FetchRequest) -> Result<CachedResponse, Error> {
        let url = request.url.to_string();
        let response = self
            .network
            .fetch(request)
            .await
            .map_err(|e| Error::InstallFailed { url: url.clone(), reason: e.to_string() })?;

        if !response.is_success() {
            return Err(Error::InstallFailed { url, reason: format!("status {}", response.status) });
        }

        Ok(response)
    }

    /// Take control over the current partitions an earlier run left behind.
    ///
    /// For a host whose install failed (typically offline at startup) while
    /// the store still holds this version's static partition. Nothing is
    /// evicted. Returns false when there is nothing to resume.
    pub async fn resume(&self) -> Result<bool, Error> {
        let state = self.state();
        if !matches!(state, WorkerState::Parsed | WorkerState::Redundant) {
            return Err(Error::InvalidState(format!("cannot resume from {state}")));
        }

        let partition = self.config.caches.name(Partition::Static);
        if self.cache.count_entries(partition).await? == 0 {
            tracing::debug!(partition, "no persisted entries to resume");
            return Ok(false);
        }

        self.lifecycle
            .transition_from(&[WorkerState::Parsed, WorkerState::Redundant], WorkerState::Activated)?;
        let claimed = self.clients.claim();
        tracing::warn!(partition, claimed, "resumed persisted cache partitions");
        Ok(true)
    }

    /// Handle the `activate` event.
    ///
    /// Deletes every partition whose name isn't one of the current three,
    /// then claims all known page clients.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.lifecycle.transition(WorkerState::Installed, WorkerState::Activating)?;

        let deleted = match self.evict_stale().await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.lifecycle.set(WorkerState::Installed);
                tracing::error!("activate failed: {e}");
                return Err(e);
            }
        };

        let claimed = self.clients.claim();
        self.lifecycle.set(WorkerState::Activated);
        tracing::info!(deleted = deleted.len(), claimed, "activate complete");

        Ok(ActivateReport { deleted, claimed })
    }

    async fn evict_stale(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.cache.partition_names().await? {
            if self.config.caches.is_current(&name) {
                continue;
            }
            tracing::info!(partition = %name, "deleting stale cache partition");
            self.cache.delete_partition(&name).await?;
            deleted.push(name);
        }
        Ok(deleted)
    }

    /// Handle the `fetch` event.
    ///
    /// Returns None when the request is not intercepted and should go to
    /// the network untouched.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<Option<FetchOutcome>, Error> {
        if let Some(client_id) = &request.client_id {
            self.register_client(client_id);
        }

        let state = self.state();
        if !state.can_intercept_fetch() {
            tracing::debug!(state = %state, "not controlling fetches, passing through {}", request.url);
            return Ok(None);
        }

        let Some(route) = self.router.classify(request) else {
            tracing::debug!("passing through {}", request.url);
            return Ok(None);
        };

        let strategy = route.strategy();
        tracing::debug!(route = %route, strategy = ?strategy, "{} {}", request.method, request.url);

        let ctx = StrategyContext {
            cache: &self.cache,
            network: self.network.as_ref(),
            writer: &self.writer,
            caches: &self.config.caches,
            offline_message: &self.config.offline_message,
        };
        strategy.execute(&ctx, request, route).await.map(Some)
    }

    /// Answer a fetch the way the page would see it: intercepted if the
    /// coordinator handles it, straight from the network otherwise.
    pub async fn respond(&self, request: &FetchRequest) -> Result<FetchOutcome, Error> {
        if let Some(outcome) = self.handle_fetch(request).await? {
            return Ok(outcome);
        }

        let response = self.network.fetch(request).await?;
        Ok(FetchOutcome { response, source: ResponseSource::Network, route: None })
    }
}
