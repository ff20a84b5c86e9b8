// Shared test helpers

#![allow(dead_code)]

use std::io;
use std::time::Duration;

use bytes::Bytes;
use esm_filter::error::PublishError;
use esm_filter::ingest::DatagramSource;
use esm_filter::models::Observation;
use esm_filter::pipeline_stats::PipelineStats;
use esm_filter::scheduler::SchedulerConfig;
use esm_filter::sink::Sink;
use esm_filter::window::SealedWindow;
use tokio::sync::mpsc;

/// Forwards every published window to a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SealedWindow>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SealedWindow>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn publish(&self, window: &SealedWindow) -> Result<(), PublishError> {
        let _ = self.tx.send(window.clone());
        Ok(())
    }
}

/// Rejects every window.
pub struct FailingSink;

impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn publish(&self, _window: &SealedWindow) -> Result<(), PublishError> {
        Err(PublishError::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "downstream unavailable",
        )))
    }
}

/// Datagrams pushed by the test. Stays pending once the sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { rx }, tx)
    }
}

impl DatagramSource for ChannelSource {
    async fn receive(&mut self) -> io::Result<Bytes> {
        match self.rx.recv().await {
            Some(datagram) => Ok(datagram),
            None => std::future::pending().await,
        }
    }
}

/// Long interval so only the test rotates.
pub fn manual_config() -> SchedulerConfig {
    SchedulerConfig {
        interval: Duration::from_secs(3600),
        max_workers: 4,
        input_capacity: 16,
        stats_log_interval: Duration::from_secs(3600),
    }
}

pub fn observation(host: &str, path: &str, status_code: u16, response_time: f64) -> Observation {
    Observation {
        measurement: "requests".into(),
        host: host.into(),
        server_name: "s1".into(),
        path: path.into(),
        status_code,
        response_time,
        response_size: None,
        timestamp: None,
    }
}

pub fn request_line(host: &str, path: &str, status_code: u16, response_time: f64) -> String {
    format!(
        "requests,host={host},server_name=s1,path={path},status_code={status_code} response_time={response_time}"
    )
}

/// Drains every window published so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SealedWindow>) -> Vec<SealedWindow> {
    let mut windows = Vec::new();
    while let Ok(window) = rx.try_recv() {
        windows.push(window);
    }
    windows.sort_by_key(SealedWindow::id);
    windows
}

/// Polls until `stats` has counted `expected` dispatched observations.
pub async fn wait_for_dispatched(stats: &PipelineStats, expected: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while stats.snapshot().observations_dispatched < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("observations were not dispatched in time");
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
