//! Periodic monitoring engine that ties a [`DataSource`], [`RiskScorer`],
//! [`AlertGenerator`] and [`AlertStore`] together behind a timer loop.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use pw_data::{DataSource, SimulatedSource};
use pw_risk::{AlertGate, AlertGenerator, AlertStore, RiskModelConfig, RiskScorer};
use pw_types::{
    Alert, AlertId, Analysis, AnalysisSnapshot, DataError, EngineError, EngineStats, Observation,
    PerformanceMetrics, PwResult,
};

use crate::config::MonitorConfig;
use crate::metrics::PerformanceSimulator;
use crate::subscribers::{SubscriberRegistry, Subscription, SubscriptionKind, Unsubscribe};

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Stopped,
    Running,
}

/// Snapshot as last published, with the tick that produced it.
#[derive(Debug, Default)]
struct Published {
    seq: u64,
    snapshot: Arc<AnalysisSnapshot>,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TickReport {
    pub seq: u64,
    pub refreshed: usize,
    pub failed: usize,
    pub alerts_raised: usize,
}

/// State shared between the engine handle and its tick loop.
struct EngineShared {
    config: MonitorConfig,
    source: Arc<dyn DataSource>,
    scorer: RiskScorer,
    generator: Mutex<AlertGenerator>,
    alerts: Mutex<AlertStore>,
    published: RwLock<Published>,
    analysis_subscribers: Arc<SubscriberRegistry<AnalysisSnapshot>>,
    alert_subscribers: Arc<SubscriberRegistry<[Alert]>>,
    /// Held for the whole of a tick so ticks never overlap.
    tick_lock: tokio::sync::Mutex<()>,
    ticks: AtomicU64,
    stats: Mutex<EngineStats>,
    performance: PerformanceSimulator,
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    assets: Vec<String>,
}

/// The monitoring engine.
///
/// Construct one per monitored universe with [`MonitoringEngine::new`] or
/// [`MonitoringEngine::builder`]. Starting and stopping are idempotent, and
/// a stopped engine can be started again.
pub struct MonitoringEngine {
    shared: Arc<EngineShared>,
    lifecycle: Mutex<Option<RunningLoop>>,
}

impl std::fmt::Debug for MonitoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringEngine")
            .field("source", &self.shared.source.name())
            .field("state", &self.state())
            .field("assets", &self.tracked_assets())
            .finish()
    }
}

impl MonitoringEngine {
    /// Create an engine reading from `source`.
    pub fn new(config: MonitorConfig, source: Arc<dyn DataSource>) -> PwResult<Self> {
        config.validate()?;

        let shared = EngineShared {
            scorer: RiskScorer::new(config.model.clone()),
            generator: Mutex::new(AlertGenerator::new(config.alerts.clone())),
            alerts: Mutex::new(AlertStore::new(config.alert_capacity)),
            published: RwLock::new(Published::default()),
            analysis_subscribers: Arc::new(SubscriberRegistry::new("analyses")),
            alert_subscribers: Arc::new(SubscriberRegistry::new("alerts")),
            tick_lock: tokio::sync::Mutex::new(()),
            ticks: AtomicU64::new(0),
            stats: Mutex::new(EngineStats::default()),
            performance: PerformanceSimulator::new(config.source.seed),
            source,
            config,
        };

        info!(
            source = shared.source.name(),
            interval_ms = shared.config.tick_interval_ms,
            alert_capacity = shared.config.alert_capacity,
            "monitoring engine created"
        );

        Ok(Self {
            shared: Arc::new(shared),
            lifecycle: Mutex::new(None),
        })
    }

    /// Create an engine over a [`SimulatedSource`] built from `config.source`.
    pub fn with_simulated_source(config: MonitorConfig) -> PwResult<Self> {
        let source = SimulatedSource::new(config.source.clone())?;
        Self::new(config, Arc::new(source))
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Begin ticking over `assets`.
    ///
    /// Does nothing if monitoring is already running; the asset list of the
    /// running loop is kept. Blank and repeated names are dropped.
    pub fn start<I, S>(&self, assets: I) -> PwResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(running) = lifecycle.as_ref() {
            debug!(assets = ?running.assets, "start requested while running");
            return Ok(());
        }

        let assets = normalize_assets(assets);
        if assets.is_empty() {
            return Err(EngineError::NoAssets.into());
        }
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let (shutdown, signal) = watch::channel(false);
        let handle = runtime.spawn(Arc::clone(&self.shared).run_loop(assets.clone(), signal));

        info!(
            assets = ?assets,
            interval_ms = self.shared.config.tick_interval_ms,
            "monitoring started"
        );
        *lifecycle = Some(RunningLoop {
            shutdown,
            handle,
            assets,
        });
        Ok(())
    }

    /// Begin ticking over the configured default assets.
    pub fn start_default(&self) -> PwResult<()> {
        self.start(&self.shared.config.default_assets)
    }

    /// Stop ticking. A tick already in flight completes before this returns.
    pub async fn stop(&self) {
        let running = self.lifecycle.lock().take();
        let Some(running) = running else {
            debug!("stop requested while stopped");
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            warn!(error = %e, "tick loop ended abnormally");
        }
        info!(assets = ?running.assets, "monitoring stopped");
    }

    pub fn state(&self) -> EngineState {
        if self.lifecycle.lock().is_some() {
            EngineState::Running
        } else {
            EngineState::Stopped
        }
    }

    /// Assets of the running loop; empty when stopped.
    pub fn tracked_assets(&self) -> Vec<String> {
        self.lifecycle
            .lock()
            .as_ref()
            .map(|running| running.assets.clone())
            .unwrap_or_default()
    }

    /// Listen for snapshot publications.
    ///
    /// If any analysis exists the callback is invoked once with the current
    /// snapshot before this returns.
    pub fn subscribe_analyses<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AnalysisSnapshot) + Send + Sync + 'static,
    {
        let registry = &self.shared.analysis_subscribers;
        let id = registry.register(Arc::new(callback));

        let (seq, snapshot) = {
            let published = self.shared.published.read();
            (published.seq, Arc::clone(&published.snapshot))
        };
        if !snapshot.is_empty() {
            registry.deliver_to(id, seq, &snapshot);
        }

        let handle = Arc::downgrade(registry) as Weak<dyn Unsubscribe>;
        Subscription::new(id, SubscriptionKind::Analyses, handle)
    }

    /// Listen for alert list publications.
    ///
    /// The callback is invoked once with the current list, even when it is
    /// empty, before this returns.
    pub fn subscribe_alerts<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Alert]) + Send + Sync + 'static,
    {
        let registry = &self.shared.alert_subscribers;
        let id = registry.register(Arc::new(callback));

        let (revision, alerts) = {
            let store = self.shared.alerts.lock();
            (store.revision(), store.list())
        };
        registry.deliver_to(id, revision, &alerts);

        let handle = Arc::downgrade(registry) as Weak<dyn Unsubscribe>;
        Subscription::new(id, SubscriptionKind::Alerts, handle)
    }

    /// Remove an active alert. Unknown ids are ignored.
    ///
    /// When something was removed, alert subscribers are notified before
    /// this returns.
    pub fn dismiss_alert(&self, id: AlertId) -> bool {
        let (revision, alerts) = {
            let mut store = self.shared.alerts.lock();
            if !store.dismiss(id) {
                debug!(id, "dismiss ignored: unknown alert");
                return false;
            }
            (store.revision(), store.list())
        };

        info!(id, remaining = alerts.len(), "alert dismissed");
        self.shared.alert_subscribers.publish(revision, &alerts);
        true
    }

    /// Snapshot produced by the last completed tick.
    pub fn current_analyses(&self) -> Arc<AnalysisSnapshot> {
        Arc::clone(&self.shared.published.read().snapshot)
    }

    /// Active alerts, newest first.
    pub fn current_alerts(&self) -> Vec<Alert> {
        self.shared.alerts.lock().list()
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.shared.performance.sample()
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = self.shared.stats.lock().clone();
        stats.subscriber_failures =
            self.shared.analysis_subscribers.failures() + self.shared.alert_subscribers.failures();
        stats
    }
}

impl Drop for MonitoringEngine {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.get_mut().take() {
            let _ = running.shutdown.send(true);
        }
    }
}

impl EngineShared {
    async fn run_loop(self: Arc<Self>, assets: Vec<String>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.tick_interval();
        let first = if self.config.immediate_first_tick {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.run_tick(&assets).await;
                    if report.refreshed == 0 {
                        warn!(seq = report.seq, failed = report.failed, "no asset refreshed this tick");
                    } else {
                        debug!(
                            seq = report.seq,
                            refreshed = report.refreshed,
                            failed = report.failed,
                            alerts = report.alerts_raised,
                            "tick complete"
                        );
                    }
                }
            }
        }
        debug!("tick loop exited");
    }

    /// Fetch, score, alert and publish once for `assets`.
    pub(crate) async fn run_tick(&self, assets: &[String]) -> TickReport {
        let _tick = self.tick_lock.lock().await;

        let results = self.fetch_all(assets).await;

        let mut analyses = Vec::with_capacity(assets.len());
        let mut failed = 0usize;
        for (asset, result) in assets.iter().zip(results) {
            match result.and_then(|observation| check_observation(asset, observation)) {
                Ok(observation) => {
                    let risk = self.scorer.score(&observation);
                    info!(
                        asset = %asset,
                        price = observation.price,
                        score = risk.score,
                        level = %risk.level,
                        "asset scored"
                    );
                    analyses.push(Analysis::new(observation, risk));
                }
                Err(error) => {
                    failed += 1;
                    warn!(asset = %asset, error = %error, "asset skipped this tick");
                }
            }
        }

        let raised: Vec<Alert> = {
            let mut generator = self.generator.lock();
            analyses
                .iter()
                .filter_map(|analysis| generator.generate(analysis))
                .collect()
        };
        let alerts_raised = raised.len();

        // The snapshot goes out before the alerts derived from it.
        let seq = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let refreshed = analyses.len();
        let analysis_publication = if refreshed > 0 {
            let mut published = self.published.write();
            let mut next = AnalysisSnapshot::clone(&published.snapshot);
            for analysis in analyses {
                next.upsert(analysis);
            }
            let next = Arc::new(next);
            *published = Published {
                seq,
                snapshot: Arc::clone(&next),
            };
            Some((seq, next))
        } else {
            None
        };

        let alert_publication = if raised.is_empty() {
            None
        } else {
            let mut store = self.alerts.lock();
            for alert in raised {
                if let Some(evicted) = store.push(alert) {
                    debug!(id = evicted.id, coin = %evicted.coin, "alert evicted");
                }
            }
            Some((store.revision(), store.list()))
        };

        {
            let mut stats = self.stats.lock();
            stats.ticks_completed += 1;
            stats.assets_refreshed += refreshed as u64;
            stats.asset_failures += failed as u64;
            stats.alerts_raised += alerts_raised as u64;
            stats.last_tick_at = Some(Utc::now());
        }

        self.publish(analysis_publication, alert_publication).await;

        TickReport {
            seq,
            refreshed,
            failed,
            alerts_raised,
        }
    }

    /// One result per asset, in input order.
    async fn fetch_all(&self, assets: &[String]) -> Vec<Result<Observation, DataError>> {
        let timeout = self.config.source_timeout();
        let timeout_ms = self.config.source_timeout_ms;

        let mut fetches = JoinSet::new();
        for (index, asset) in assets.iter().enumerate() {
            let source = Arc::clone(&self.source);
            let asset = asset.clone();
            fetches.spawn(async move {
                let result = match tokio::time::timeout(timeout, source.fetch(&asset)).await {
                    Ok(result) => result,
                    Err(_) => Err(DataError::Timeout {
                        asset: asset.clone(),
                        timeout_ms,
                    }),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<Observation, DataError>>> =
            assets.iter().map(|_| None).collect();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "fetch task failed"),
            }
        }

        assets
            .iter()
            .zip(slots)
            .map(|(asset, slot)| {
                slot.unwrap_or_else(|| {
                    Err(DataError::FetchFailed {
                        asset: asset.clone(),
                        message: "source panicked".to_string(),
                    })
                })
            })
            .collect()
    }

    /// Hand publications to subscribers, one blocking thread per registry,
    /// waiting at most the publish timeout for each.
    async fn publish(
        &self,
        analyses: Option<(u64, Arc<AnalysisSnapshot>)>,
        alerts: Option<(u64, Vec<Alert>)>,
    ) {
        let analysis_registry = Arc::clone(&self.analysis_subscribers);
        let alert_registry = Arc::clone(&self.alert_subscribers);
        tokio::join!(
            self.dispatch(analysis_registry, analyses),
            self.dispatch(alert_registry, alerts),
        );
    }

    async fn dispatch<T, V>(
        &self,
        registry: Arc<SubscriberRegistry<T>>,
        publication: Option<(u64, V)>,
    ) where
        T: ?Sized + Send + Sync + 'static,
        V: Borrow<T> + Send + 'static,
    {
        let Some((seq, value)) = publication else {
            return;
        };
        let name = registry.name();
        let task = tokio::task::spawn_blocking(move || registry.publish(seq, <V as Borrow<T>>::borrow(&value)));

        match tokio::time::timeout(self.config.publish_timeout(), task).await {
            Ok(Ok(report)) => debug!(registry = name, seq, ?report, "published"),
            Ok(Err(e)) => warn!(registry = name, error = %e, "publication task failed"),
            Err(_) => warn!(
                registry = name,
                seq,
                timeout_ms = self.config.publish_timeout_ms,
                "subscribers still running; tick continues without them"
            ),
        }
    }
}

fn check_observation(asset: &str, observation: Observation) -> Result<Observation, DataError> {
    if observation.name != asset {
        return Err(DataError::InvalidObservation {
            asset: asset.to_string(),
            message: format!("source answered for {}", observation.name),
        });
    }
    observation.validate()?;
    Ok(observation)
}

fn normalize_assets<I, S>(assets: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for asset in assets {
        let asset = asset.as_ref().trim();
        if !asset.is_empty() && !normalized.iter().any(|a| a == asset) {
            normalized.push(asset.to_string());
        }
    }
    normalized
}

/// Step-by-step construction of a [`MonitoringEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: MonitorConfig,
    source: Option<Arc<dyn DataSource>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.default_assets = normalize_assets(assets);
        self
    }

    pub fn alert_capacity(mut self, capacity: usize) -> Self {
        self.config.alert_capacity = capacity;
        self
    }

    pub fn model(mut self, model: RiskModelConfig) -> Self {
        self.config.model = model;
        self
    }

    pub fn gate(mut self, gate: AlertGate) -> Self {
        self.config.alerts.gate = gate;
        self
    }

    pub fn source<S: DataSource + 'static>(self, source: S) -> Self {
        self.shared_source(Arc::new(source))
    }

    /// Use a source the caller keeps a handle to.
    pub fn shared_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Build the engine. Without an explicit source a [`SimulatedSource`]
    /// is created from the configured sampling ranges.
    pub fn build(self) -> PwResult<MonitoringEngine> {
        match self.source {
            Some(source) => MonitoringEngine::new(self.config, source),
            None => MonitoringEngine::with_simulated_source(self.config),
        }
    }
}
