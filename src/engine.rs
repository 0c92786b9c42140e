//! The configuration engine: initialization, fetch lifecycle, caching, callback delivery, and
//! the experiment-timing side channel.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config_cache::{ConfigCache, FixedStorageRoot, HostStorage};
use crate::device::{DeviceFingerprint, DeviceInfoProvider, UnknownDeviceInfo};
use crate::experiment::{ExperimentTimer, NoopExperimentTimer};
use crate::fetch_client::{FetchClient, FetchClientConfig, FetchOutcome};
use crate::telemetry::{AnalyticsSink, NoopAnalyticsSink, TelemetryEvent};
use crate::{Error, Result, SegmentConfig, Settings};

/// Host callback receiving the delivered settings and group id. Invoked at most once per
/// [`ConfigEngine::fetch`] call, from the poll thread.
pub type FetchCallback = Box<dyn FnOnce(&Settings, i64) + Send>;

/// Configuration and collaborators for [`ConfigEngine`].
///
/// # Examples
/// ```no_run
/// # use autotune::{ConfigEngine, EngineConfig, FetchClientConfig};
/// let engine = ConfigEngine::new(
///     EngineConfig::new().with_fetch(FetchClientConfig::new().with_accept_invalid_certs(false)),
/// ).unwrap();
/// ```
pub struct EngineConfig {
    pub(crate) fetch: FetchClientConfig,
    pub(crate) device_info: Box<dyn DeviceInfoProvider + Send + Sync>,
    pub(crate) storage: Box<dyn HostStorage + Send + Sync>,
    pub(crate) analytics: Box<dyn AnalyticsSink + Send + Sync>,
    pub(crate) experiment_timer: Box<dyn ExperimentTimer + Send + Sync>,
}

impl EngineConfig {
    /// Create a default engine configuration: default endpoint, no device information, no
    /// analytics, no experiment timer, and storage rooted at the OS temporary directory.
    pub fn new() -> EngineConfig {
        EngineConfig {
            fetch: FetchClientConfig::default(),
            device_info: Box::new(UnknownDeviceInfo),
            storage: Box::new(FixedStorageRoot(std::env::temp_dir())),
            analytics: Box::new(NoopAnalyticsSink),
            experiment_timer: Box::new(NoopExperimentTimer),
        }
    }

    /// Override the network configuration (endpoint and certificate policy).
    pub fn with_fetch(mut self, fetch: FetchClientConfig) -> EngineConfig {
        self.fetch = fetch;
        self
    }

    /// Set the host's device-info collaborator.
    pub fn with_device_info(
        mut self,
        device_info: impl DeviceInfoProvider + Send + Sync + 'static,
    ) -> EngineConfig {
        self.device_info = Box::new(device_info);
        self
    }

    /// Set the host's storage-root collaborator.
    pub fn with_storage(mut self, storage: impl HostStorage + Send + Sync + 'static) -> EngineConfig {
        self.storage = Box::new(storage);
        self
    }

    /// Set the analytics sink that receives finished telemetry records.
    ///
    /// ```
    /// # use autotune::EngineConfig;
    /// let config = EngineConfig::new().with_analytics(|event| {
    ///     println!("{:?}", event);
    /// });
    /// ```
    pub fn with_analytics(mut self, sink: impl AnalyticsSink + Send + Sync + 'static) -> EngineConfig {
        self.analytics = Box::new(sink);
        self
    }

    /// Set the experiment-timer collaborator.
    pub fn with_experiment_timer(
        mut self,
        timer: impl ExperimentTimer + Send + Sync + 'static,
    ) -> EngineConfig {
        self.experiment_timer = Box::new(timer);
        self
    }

    /// Create a new [`ConfigEngine`] using this configuration.
    pub fn build(self) -> Result<ConfigEngine> {
        ConfigEngine::new(self)
    }
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig::new()
    }
}

/// State set once at [`ConfigEngine::init`] and replaced wholesale on re-init.
struct InitState {
    sheet_id: String,
    build_version: String,
    cache: ConfigCache,
    client_default: SegmentConfig,
    /// The configuration currently considered authoritative. Never absent after init; replaced
    /// wholesale on each accepted fetch.
    cached: SegmentConfig,
}

/// Engine state guarded by a single lock: the completion drain and the poll's read-and-clear are
/// the only concurrent accesses.
#[derive(Default)]
struct EngineState {
    init: Option<InitState>,
    player_override: bool,
    // Transient per-fetch fields, reset before each new fetch and consumed by one delivery.
    pending_delivery: bool,
    last_error: bool,
    fetch_start: Option<Instant>,
    callback: Option<FetchCallback>,
    last_fingerprint: Option<DeviceFingerprint>,
}

impl EngineState {
    fn cleanup(&mut self) {
        self.pending_delivery = false;
        self.last_error = false;
        self.fetch_start = None;
        self.callback = None;
        self.last_fingerprint = None;
    }
}

/// The remote-segmentation-configuration engine.
///
/// An explicitly owned context object: construct one per endpoint/host pairing and pass it
/// around. Lifecycle:
///
/// 1. [`init`](ConfigEngine::init) loads the cached configuration (or the client defaults).
/// 2. [`fetch`](ConfigEngine::fetch) issues an asynchronous request for this device's segment
///    and registers a one-shot callback.
/// 3. [`poll`](ConfigEngine::poll), called once per host tick, drains fetch completions and
///    delivers the callback exactly once, then emits one telemetry record.
///
/// The host always eventually receives its callback (assuming the request does not hang):
/// network failures and malformed responses deliver the previous cached configuration with the
/// telemetry error flag set.
pub struct ConfigEngine {
    fetch_client: FetchClient,
    device_info: Box<dyn DeviceInfoProvider + Send + Sync>,
    storage: Box<dyn HostStorage + Send + Sync>,
    analytics: Box<dyn AnalyticsSink + Send + Sync>,
    experiment_timer: Box<dyn ExperimentTimer + Send + Sync>,
    outcome_tx: Sender<FetchOutcome>,
    // Completions cross from fetch-worker threads to the poll thread through this channel, so
    // business logic never runs under a lock shared with the transport.
    outcome_rx: Mutex<Receiver<FetchOutcome>>,
    state: Mutex<EngineState>,
}

impl ConfigEngine {
    /// Create a new engine using the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] or a network error if the HTTP client cannot be
    /// constructed for the configured endpoint.
    pub fn new(config: EngineConfig) -> Result<ConfigEngine> {
        let fetch_client = FetchClient::new(config.fetch)?;
        let (outcome_tx, outcome_rx) = std::sync::mpsc::channel();

        Ok(ConfigEngine {
            fetch_client,
            device_info: config.device_info,
            storage: config.storage,
            analytics: config.analytics,
            experiment_timer: config.experiment_timer,
            outcome_tx,
            outcome_rx: Mutex::new(outcome_rx),
            state: Mutex::new(EngineState::default()),
        })
    }

    /// Initializes the engine. Call before anything else.
    ///
    /// Builds the client default configuration from `defaults`, resolves the storage root
    /// (durable or temporary per `use_durable_storage`), and loads the cached configuration; a
    /// missing or malformed cache falls back to the client defaults. Also pushes
    /// `build_version` to the experiment timer.
    ///
    /// Re-invoking overwrites the previous sheet id, build version, and defaults; there is no
    /// guard against double initialization.
    pub fn init(
        &self,
        sheet_id: impl Into<String>,
        build_version: impl Into<String>,
        use_durable_storage: bool,
        defaults: Settings,
    ) {
        let sheet_id = sheet_id.into();
        let build_version = build_version.into();

        let client_default = SegmentConfig::client_default(defaults);
        let cache = ConfigCache::from_host_storage(&*self.storage, use_durable_storage);
        let cached = match cache.load() {
            Ok(config) => config,
            Err(Error::NotFound) => {
                log::debug!(target: "autotune", "no cached segment config, using client defaults");
                client_default.clone()
            }
            Err(err) => {
                log::warn!(target: "autotune", "error loading cached segment config, using client defaults: {}", err);
                client_default.clone()
            }
        };

        self.experiment_timer.set_build_version(&build_version);

        let mut state = self.lock_state();
        state.cleanup();
        state.init = Some(InitState {
            sheet_id,
            build_version,
            cache,
            client_default,
            cached,
        });
    }

    /// Fetches new settings for this device.
    ///
    /// Clears any previous fetch's transient state, registers `callback`, and issues the network
    /// exchange asynchronously; returns immediately. The callback fires on a later
    /// [`poll`](ConfigEngine::poll).
    ///
    /// Re-entrant calls before the previous fetch's delivery overwrite the delivery slot: the
    /// last registered callback wins, and at most one result is delivered per `fetch` call. A
    /// superseded request still completes and its result is still cached; only its delivery is
    /// suppressed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] if called before [`init`](ConfigEngine::init), or an
    /// I/O error if the fetch worker fails to start.
    pub fn fetch<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&Settings, i64) + Send + 'static,
    {
        let fingerprint = self.register_fetch(Box::new(callback))?;
        self.fetch_client.fetch(fingerprint, self.outcome_tx.clone())
    }

    /// Registers a fetch attempt (cleanup, callback, timestamp, fingerprint) without issuing the
    /// network exchange. Split out of [`fetch`](ConfigEngine::fetch) so the delivery path is
    /// testable with injected completions.
    fn register_fetch(&self, callback: FetchCallback) -> Result<DeviceFingerprint> {
        let mut state = self.lock_state();
        let Some(init) = state.init.as_ref() else {
            return Err(Error::Uninitialized);
        };
        let fingerprint =
            DeviceFingerprint::build(&*self.device_info, &init.sheet_id, &init.build_version);

        state.cleanup();
        state.callback = Some(callback);
        state.fetch_start = Some(Instant::now());
        state.last_fingerprint = Some(fingerprint.clone());
        Ok(fingerprint)
    }

    /// Marks that the player manually overrode the delivered settings. Visible in the next
    /// telemetry record only.
    pub fn set_player_override(&self, is_player_override: bool) {
        self.lock_state().player_override = is_player_override;
    }

    /// Time elapsed since the most recent [`fetch`](ConfigEngine::fetch) call, or `None` if no
    /// fetch was issued yet.
    ///
    /// The engine enforces no timeout: a request that never completes leaves the engine
    /// "fetching with no pending delivery" forever. This accessor makes that observable to
    /// hosts that want their own stall policy.
    pub fn time_since_fetch_start(&self) -> Option<Duration> {
        self.lock_state().fetch_start.map(|start| start.elapsed())
    }

    /// Snapshot of the currently authoritative configuration, or `None` before
    /// [`init`](ConfigEngine::init).
    pub fn cached_config(&self) -> Option<SegmentConfig> {
        self.lock_state().init.as_ref().map(|init| init.cached.clone())
    }

    /// The compiled-in fallback configuration supplied at [`init`](ConfigEngine::init), or
    /// `None` before init.
    pub fn client_default_config(&self) -> Option<SegmentConfig> {
        self.lock_state()
            .init
            .as_ref()
            .map(|init| init.client_default.clone())
    }

    /// Signals the start of a named measurement window to the experiment timer.
    pub fn begin_experiment(&self, name: &str) {
        log::debug!(target: "autotune", "begin experiment: {}", name);
        self.experiment_timer.begin_experiment(name);
    }

    /// Signals the end of the current measurement window to the experiment timer.
    pub fn end_experiment(&self) {
        log::debug!(target: "autotune", "end experiment");
        self.experiment_timer.end_experiment();
    }

    /// Per-tick poll: drains fetch completions and performs at most one callback delivery.
    ///
    /// Call once per host scheduler tick from a single well-defined scheduling point. Every
    /// drained completion is processed (successful parses are cached even when superseded); if
    /// a delivery is pending and a callback is registered, the callback is invoked exactly once
    /// with `(settings, group_id)` and one telemetry record is emitted. A panicking host
    /// callback or analytics sink is caught and logged; the engine always returns to a clean
    /// "no pending delivery" state.
    pub fn poll(&self) {
        let mut state = self.lock_state();

        {
            let rx = self
                .outcome_rx
                .lock()
                .expect("thread holding completion receiver should not panic");
            while let Ok(outcome) = rx.try_recv() {
                self.process_outcome(&mut state, outcome);
            }
        }

        if !state.pending_delivery || state.callback.is_none() {
            return;
        }
        let Some(init) = state.init.as_ref() else {
            return;
        };

        let config = init.cached.clone();
        let sheet_id = init.sheet_id.clone();
        let build_version = init.build_version.clone();
        let Some(callback) = state.callback.take() else {
            return;
        };
        let error = state.last_error;
        let player_override = state.player_override;
        let fingerprint = state.last_fingerprint.take();
        let request_latency = state
            .fetch_start
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        state.pending_delivery = false;
        state.last_error = false;

        // The host callback and the analytics sink run outside the lock so they cannot deadlock
        // against the engine or block completion handling.
        drop(state);

        log::debug!(target: "autotune", "segment roundtrip: {}s", request_latency);
        if catch_unwind(AssertUnwindSafe(|| callback(&config.settings, config.group_id))).is_err() {
            log::error!(target: "autotune", "host callback panicked during settings delivery");
        }

        // Should not happen (the fingerprint is set by register_fetch), but keeps telemetry
        // assembly free of per-field fallbacks.
        let fingerprint = fingerprint.unwrap_or_else(|| {
            DeviceFingerprint::build(&*self.device_info, &sheet_id, &build_version)
        });

        let event = TelemetryEvent {
            timestamp: chrono::Utc::now(),
            segment_id: config.segment_id,
            group_id: config.group_id,
            error,
            player_override,
            request_latency,
            fingerprint,
            plugin_version: env!("CARGO_PKG_VERSION"),
        };
        match catch_unwind(AssertUnwindSafe(|| self.analytics.emit(event))) {
            Ok(status) => {
                log::debug!(target: "autotune", "segment request info event status: {:?}", status)
            }
            Err(_) => {
                log::error!(target: "autotune", "analytics sink panicked emitting segment request info")
            }
        }
    }

    /// Applies one fetch completion to engine state. Failures never leave the host callback
    /// unfired: they latch a delivery of the previous cached configuration with the error flag
    /// set.
    fn process_outcome(&self, state: &mut EngineState, outcome: FetchOutcome) {
        if state.init.is_none() {
            return;
        }

        match outcome {
            FetchOutcome::Success { raw_json } => {
                match SegmentConfig::from_server_response(&raw_json) {
                    Ok(config) => {
                        if let Some(init) = state.init.as_mut() {
                            // Always persist on a successful parse; last write wins.
                            if let Err(err) = init.cache.store(&config) {
                                log::warn!(target: "autotune", "failed to persist segment config: {}", err);
                            }
                            init.cached = config;
                        }
                        state.pending_delivery = true;
                    }
                    Err(err) => {
                        log::warn!(target: "autotune", "error parsing segment response: {}", err);
                        state.last_error = true;
                        state.pending_delivery = true;
                    }
                }
            }
            FetchOutcome::Error(err) => {
                log::warn!(target: "autotune", "segment request error: {}", err);
                state.last_error = true;
                state.pending_delivery = true;
            }
            FetchOutcome::Cancelled => {
                log::debug!(target: "autotune", "segment request cancelled");
                state.last_error = true;
                state.pending_delivery = true;
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        // Err() is possible only if the lock is poisoned (a thread panicked while holding it);
        // delivery panics are caught outside the lock, so this should never happen.
        self.state
            .lock()
            .expect("thread holding engine state lock should not panic")
    }

    #[cfg(test)]
    fn push_outcome(&self, outcome: FetchOutcome) {
        self.outcome_tx
            .send(outcome)
            .expect("engine holds the receiver");
    }
}
