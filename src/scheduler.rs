// Window scheduler: owns the current-window pointer, rotates windows on a fixed
// interval and publishes each sealed window from its own task.
//
// The scheduler is the only writer of the pointer. Ingestion loads a snapshot per
// observation, so a send that started before a rotation finishes into the window it
// loaded, and that window's dispatcher drains only after the last snapshot is dropped.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::error::RouteError;
use crate::models::Observation;
use crate::pipeline_stats::PipelineStats;
use crate::sink::Sink;
use crate::window::{OpenWindow, SealingWindow, WindowInput};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Window length.
    pub interval: Duration,
    pub max_workers: usize,
    pub input_capacity: usize,
    pub stats_log_interval: Duration,
}

impl SchedulerConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            interval: config.aggregation.interval(),
            max_workers: config.aggregation.max_workers,
            input_capacity: config.aggregation.input_channel_capacity,
            stats_log_interval: Duration::from_secs(config.server.stats_log_interval_secs),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// Ingestion's handle on the open window. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WindowRouter {
    current: Arc<ArcSwapOption<WindowInput>>,
}

impl WindowRouter {
    /// Sends one observation to the window open right now and returns that window's id.
    pub async fn dispatch(&self, observation: Observation) -> Result<u64, RouteError> {
        let Some(input) = self.current.load_full() else {
            return Err(RouteError::Closed);
        };
        input.send(observation).await?;
        Ok(input.id())
    }

    /// Id of the open window, or `None` once the scheduler has shut down.
    pub fn current_window(&self) -> Option<u64> {
        self.current.load_full().map(|input| input.id())
    }
}

pub struct WindowScheduler<K: Sink> {
    current: Arc<ArcSwapOption<WindowInput>>,
    open: Option<OpenWindow>,
    next_id: u64,
    sink: Arc<K>,
    stats: Arc<PipelineStats>,
    config: SchedulerConfig,
    publishes: JoinSet<()>,
}

impl<K: Sink> WindowScheduler<K> {
    /// Creates the scheduler with window 0 already open.
    pub fn new(config: SchedulerConfig, sink: Arc<K>, stats: Arc<PipelineStats>) -> Self {
        let mut scheduler = Self {
            current: Arc::new(ArcSwapOption::empty()),
            open: None,
            next_id: 0,
            sink,
            stats,
            config,
            publishes: JoinSet::new(),
        };
        let (window, input) = scheduler.open_next();
        scheduler.current.store(Some(Arc::new(input)));
        scheduler.open = Some(window);
        scheduler
    }

    pub fn router(&self) -> WindowRouter {
        WindowRouter {
            current: self.current.clone(),
        }
    }

    pub fn open_window_id(&self) -> Option<u64> {
        self.open.as_ref().map(OpenWindow::id)
    }

    fn open_next(&mut self) -> (OpenWindow, WindowInput) {
        let id = self.next_id;
        self.next_id += 1;
        debug!(window_id = id, "window opened");
        OpenWindow::open(id, self.config.max_workers, self.config.input_capacity)
    }

    /// Opens the next window, then seals the previous one and publishes it in the
    /// background. Returns the id of the sealed window.
    pub fn rotate(&mut self) -> Option<u64> {
        let (next, input) = self.open_next();
        // From here on ingestion routes to `next`; earlier snapshots keep the old input alive.
        drop(self.current.swap(Some(Arc::new(input))));
        let previous = self.open.replace(next)?;
        Some(self.seal_and_publish(previous))
    }

    fn seal_and_publish(&mut self, window: OpenWindow) -> u64 {
        let sealing = window.seal();
        let id = sealing.id();
        self.stats.window_sealed();
        debug!(window_id = id, "window sealing");
        self.publishes.spawn(publish_sealed(
            sealing,
            self.sink.clone(),
            self.stats.clone(),
        ));
        id
    }

    /// Collects publish tasks that already finished.
    fn reap_publishes(&mut self) {
        while let Some(result) = self.publishes.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "publish task failed");
            }
        }
    }

    /// Terminal rotation: closes the pointer, seals and publishes the open window and
    /// waits for every outstanding publish. No new window is opened.
    pub async fn shutdown(mut self) {
        drop(self.current.swap(None));
        if let Some(window) = self.open.take() {
            self.seal_and_publish(window);
        }
        while let Some(result) = self.publishes.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "publish task failed");
            }
        }
        info!(windows = self.next_id, "scheduler stopped");
    }

    /// Rotates every `interval` until `shutdown_rx` fires (or its sender is dropped),
    /// then performs the terminal rotation.
    #[instrument(skip_all, name = "scheduler", fields(interval_ms = self.config.interval.as_millis() as u64))]
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        let start = Instant::now();
        let mut tick = interval_at(start + self.config.interval, self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_tick = interval_at(
            start + self.config.stats_log_interval,
            self.config.stats_log_interval,
        );
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Some(id) = self.rotate() {
                        debug!(window_id = id, "window rotated");
                    }
                    self.reap_publishes();
                }
                _ = stats_tick.tick() => {
                    self.stats.log();
                }
                _ = &mut shutdown_rx => {
                    debug!("scheduler shutting down");
                    break;
                }
            }
        }

        let stats = self.stats.clone();
        self.shutdown().await;
        stats.log();
    }
}

async fn publish_sealed<K: Sink>(
    sealing: SealingWindow,
    sink: Arc<K>,
    stats: Arc<PipelineStats>,
) {
    let id = sealing.id();
    let window = match sealing.finish().await {
        Ok(window) => window,
        Err(e) => {
            stats.publish_failure();
            error!(window_id = id, error = %e, "window reducer failed; window dropped");
            return;
        }
    };
    match sink.publish(&window).await {
        Ok(()) => {
            stats.window_published();
            info!(
                window_id = id,
                sink = sink.name(),
                keys = window.aggregates().len(),
                observations = window.observations(),
                "window published"
            );
        }
        Err(e) => {
            stats.publish_failure();
            warn!(
                window_id = id,
                sink = sink.name(),
                error = %e,
                "publish failed; window dropped"
            );
        }
    }
}
