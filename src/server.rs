// Server: wires a datagram source, the window scheduler and a sink together.
// Collection runs in the ingestion task; rotation and publishing run in the scheduler task.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::ingest::{DatagramSource, UdpSource, run_ingestion};
use crate::pipeline_stats::PipelineStats;
use crate::scheduler::{SchedulerConfig, WindowRouter, WindowScheduler};
use crate::sink::{DownstreamSink, Sink};

pub struct Server<S: DatagramSource, K: Sink> {
    source: S,
    sink: Arc<K>,
    config: SchedulerConfig,
    stats: Arc<PipelineStats>,
}

impl Server<UdpSource, DownstreamSink> {
    /// Binds the UDP listener and connects the configured downstream sink.
    pub async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let source = UdpSource::bind(&config.server.bind_address, config.server.read_buffer_size)
            .await
            .with_context(|| format!("bind {}", config.server.bind_address))?;
        let sink = DownstreamSink::from_config(&config.downstream)
            .await
            .with_context(|| format!("connect downstream {}", config.downstream.address))?;
        info!(
            bind_address = %source.local_addr()?,
            downstream = %config.downstream.address,
            sink = sink.name(),
            "server opened"
        );
        Ok(Self::new(source, sink, SchedulerConfig::from_app(config)))
    }
}

impl<S: DatagramSource, K: Sink> Server<S, K> {
    pub fn new(source: S, sink: K, config: SchedulerConfig) -> Self {
        Self {
            source,
            sink: Arc::new(sink),
            config,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Opens window 0 and starts the scheduler and ingestion tasks.
    pub fn start(self) -> ServerHandle {
        let scheduler = WindowScheduler::new(self.config, self.sink, self.stats.clone());
        let router = scheduler.router();

        let (scheduler_shutdown, scheduler_rx) = oneshot::channel();
        let scheduler_task = tokio::spawn(scheduler.run(scheduler_rx));

        let (ingest_shutdown, ingest_rx) = oneshot::channel();
        let ingest_task = tokio::spawn(run_ingestion(
            self.source,
            router.clone(),
            self.stats.clone(),
            ingest_rx,
        ));

        ServerHandle {
            router,
            stats: self.stats,
            ingest_shutdown,
            ingest_task,
            scheduler_shutdown,
            scheduler_task,
        }
    }

    /// Runs until `shutdown` resolves, then closes.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let handle = self.start();
        shutdown.await;
        info!("shutdown requested");
        handle.close().await
    }
}

/// A started server.
pub struct ServerHandle {
    router: WindowRouter,
    stats: Arc<PipelineStats>,
    ingest_shutdown: oneshot::Sender<()>,
    ingest_task: JoinHandle<()>,
    scheduler_shutdown: oneshot::Sender<()>,
    scheduler_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Routes observations into the open window, bypassing the datagram source.
    pub fn router(&self) -> WindowRouter {
        self.router.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Stops ingestion and releases the source, then seals and publishes the open
    /// window. Returns after every sealed window has been handed to the sink.
    pub async fn close(self) -> anyhow::Result<()> {
        let _ = self.ingest_shutdown.send(());
        self.ingest_task.await.context("ingestion task")?;
        let _ = self.scheduler_shutdown.send(());
        self.scheduler_task.await.context("scheduler task")?;
        info!("server closed");
        Ok(())
    }
}
