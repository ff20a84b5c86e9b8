// Ingestion: read datagrams, parse them, route each observation to the open window.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::parser::parse_datagram;
use crate::pipeline_stats::PipelineStats;
use crate::scheduler::WindowRouter;

/// Rate limit for repeated receive-error warnings.
const RECEIVE_ERROR_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Where raw datagrams come from.
pub trait DatagramSource: Send + 'static {
    /// Waits for the next datagram. Must be cancel safe: ingestion races it against shutdown.
    fn receive(&mut self) -> impl Future<Output = io::Result<Bytes>> + Send;
}

/// UDP socket source.
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
    buf: BytesMut,
    read_buffer_size: usize,
}

impl UdpSource {
    pub async fn bind(address: &str, read_buffer_size: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(address).await?;
        Ok(Self {
            socket,
            buf: BytesMut::with_capacity(read_buffer_size),
            read_buffer_size,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramSource for UdpSource {
    async fn receive(&mut self) -> io::Result<Bytes> {
        self.buf.clear();
        self.buf.reserve(self.read_buffer_size);
        let (len, _peer) = self.socket.recv_buf_from(&mut self.buf).await?;
        Ok(self.buf.split_to(len).freeze())
    }
}

/// Parses one datagram and routes its observations in order.
/// Returns how many observations reached a window.
pub async fn ingest_datagram(datagram: &[u8], router: &WindowRouter, stats: &PipelineStats) -> usize {
    let observations = match parse_datagram(datagram) {
        Ok(observations) => observations,
        Err(e) => {
            stats.decode_error();
            warn!(error = %e, bytes = datagram.len(), "dropping malformed datagram");
            return 0;
        }
    };
    let mut routed = 0;
    for observation in observations {
        match router.dispatch(observation).await {
            Ok(_) => {
                stats.observation_dispatched();
                routed += 1;
            }
            Err(e) => {
                stats.route_error();
                debug!(error = %e, "observation not routed");
            }
        }
    }
    routed
}

/// Reads from `source` until `shutdown_rx` fires (or its sender is dropped), then drops
/// the source. A datagram already being routed is finished before shutdown is observed.
#[instrument(skip_all, name = "ingest")]
pub async fn run_ingestion<S: DatagramSource>(
    mut source: S,
    router: WindowRouter,
    stats: Arc<PipelineStats>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut last_error_warn: Option<Instant> = None;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                debug!("ingestion shutting down");
                break;
            }
            received = source.receive() => match received {
                Ok(datagram) => {
                    stats.datagram_received();
                    ingest_datagram(&datagram, &router, &stats).await;
                }
                Err(e) => {
                    stats.receive_error();
                    let should_warn = last_error_warn
                        .is_none_or(|t| t.elapsed() >= RECEIVE_ERROR_WARN_INTERVAL);
                    if should_warn {
                        warn!(error = %e, operation = "receive", "datagram receive failed");
                        last_error_warn = Some(Instant::now());
                    } else {
                        debug!(error = %e, operation = "receive", "datagram receive failed");
                    }
                }
            }
        }
    }
    drop(source);
}
