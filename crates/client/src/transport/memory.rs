//! In-memory transport for testing and single-player games
//!
//! Datagrams travel over Tokio channels instead of sockets. Loss can be
//! simulated by dropping every n-th outbound datagram.

use super::Transport;
use async_trait::async_trait;
use tickshift_protocol::Datagram;
use tokio::sync::mpsc;

/// In-memory transport that exchanges datagrams with a peer via channels
///
/// # Example
///
/// ```
/// use tickshift_client::transport::memory::MemoryTransport;
///
/// let (client_transport, server_transport) = MemoryTransport::create_pair(100);
/// ```
pub struct MemoryTransport {
    /// Channel to send datagrams to the peer
    to_peer: mpsc::Sender<Datagram>,
    /// Channel to receive datagrams from the peer
    from_peer: mpsc::Receiver<Datagram>,
    /// Drop every n-th outbound datagram
    drop_every: Option<usize>,
}

impl MemoryTransport {
    pub fn new(to_peer: mpsc::Sender<Datagram>, from_peer: mpsc::Receiver<Datagram>) -> Self {
        Self {
            to_peer,
            from_peer,
            drop_every: None,
        }
    }

    /// Creates a pair of connected transports (client, server)
    pub fn create_pair(buffer_size: usize) -> (Self, Self) {
        let (client_to_server_tx, client_to_server_rx) = mpsc::channel(buffer_size);
        let (server_to_client_tx, server_to_client_rx) = mpsc::channel(buffer_size);

        let client_transport = Self::new(client_to_server_tx, server_to_client_rx);
        let server_transport = Self::new(server_to_client_tx, client_to_server_rx);

        (client_transport, server_transport)
    }

    /// Simulates packet loss by dropping every `n`-th datagram sent to the peer
    ///
    /// `n` of 0 or 1 is treated as no loss.
    pub fn with_loss(mut self, n: usize) -> Self {
        self.drop_every = (n > 1).then_some(n);
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Error = MemoryTransportError;

    async fn run(
        mut self,
        incoming_tx: mpsc::Sender<Datagram>,
        mut outgoing_rx: mpsc::Receiver<Datagram>,
    ) -> Result<(), Self::Error> {
        let mut sent = 0usize;
        loop {
            tokio::select! {
                // Receive from peer, forward to event loop
                Some(datagram) = self.from_peer.recv() => {
                    if incoming_tx.send(datagram).await.is_err() {
                        return Err(MemoryTransportError::ChannelClosed);
                    }
                }

                // Receive from event loop, send to peer
                Some(datagram) = outgoing_rx.recv() => {
                    sent += 1;
                    if self.drop_every.is_some_and(|n| sent % n == 0) {
                        tracing::trace!(connection = %datagram.connection, "Dropping datagram");
                        continue;
                    }
                    if self.to_peer.send(datagram).await.is_err() {
                        return Err(MemoryTransportError::ChannelClosed);
                    }
                }

                else => {
                    return Ok(());
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryTransportError {
    #[error("Transport channel closed")]
    ChannelClosed,
}
