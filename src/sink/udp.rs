use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::debug;

use super::Sink;
use super::encode::{encode_window, pack_lines};
use crate::error::PublishError;
use crate::window::SealedWindow;

/// Sends windows as line protocol over UDP, packed into bounded datagrams.
#[derive(Debug)]
pub struct UdpLineSink {
    socket: UdpSocket,
    target: SocketAddr,
    max_payload_bytes: usize,
}

impl UdpLineSink {
    /// Resolves `address` and connects an ephemeral local socket to it.
    pub async fn connect(address: &str, max_payload_bytes: usize) -> io::Result<Self> {
        let target = tokio::net::lookup_host(address).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("downstream address {address} did not resolve"),
            )
        })?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        Ok(Self {
            socket,
            target,
            max_payload_bytes,
        })
    }
}

impl Sink for UdpLineSink {
    fn name(&self) -> &str {
        "udp"
    }

    async fn publish(&self, window: &SealedWindow) -> Result<(), PublishError> {
        let lines = encode_window(window);
        let payloads = pack_lines(&lines, self.max_payload_bytes);
        for payload in &payloads {
            self.socket.send(payload.as_bytes()).await?;
        }
        debug!(
            sink = "udp",
            target = %self.target,
            window_id = window.id(),
            points = lines.len(),
            datagrams = payloads.len(),
            "window sent"
        );
        Ok(())
    }
}
