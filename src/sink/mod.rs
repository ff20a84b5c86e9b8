// Downstream sinks for sealed windows.
// Publishing is at-most-once: a failed publish is logged by the caller and the window dropped.

pub mod encode;
mod log_sink;
mod udp;

use std::future::Future;

use crate::config::{DownstreamConfig, DownstreamKind};
use crate::error::PublishError;
use crate::window::SealedWindow;

pub use log_sink::LogSink;
pub use udp::UdpLineSink;

/// Accepts one sealed window's aggregates.
pub trait Sink: Send + Sync + 'static {
    /// Sink name for logging.
    fn name(&self) -> &str;

    /// Publishes a sealed window. An empty window is valid input.
    fn publish(
        &self,
        window: &SealedWindow,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Sink chosen by `downstream.kind`.
#[derive(Debug)]
pub enum DownstreamSink {
    Udp(UdpLineSink),
    Log(LogSink),
}

impl DownstreamSink {
    pub async fn from_config(config: &DownstreamConfig) -> anyhow::Result<Self> {
        Ok(match config.kind {
            DownstreamKind::Udp => Self::Udp(
                UdpLineSink::connect(&config.address, config.max_payload_bytes).await?,
            ),
            DownstreamKind::Log => Self::Log(LogSink),
        })
    }
}

impl Sink for DownstreamSink {
    fn name(&self) -> &str {
        match self {
            Self::Udp(s) => s.name(),
            Self::Log(s) => s.name(),
        }
    }

    async fn publish(&self, window: &SealedWindow) -> Result<(), PublishError> {
        match self {
            Self::Udp(s) => s.publish(window).await,
            Self::Log(s) => s.publish(window).await,
        }
    }
}
