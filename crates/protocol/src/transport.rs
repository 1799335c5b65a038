//! Transport layer abstraction for tickshift
//!
//! The synchronization core only needs a way to hand byte buffers to a peer
//! and to be told about received ones. Delivery is assumed unordered and
//! lossy; retransmission, encryption and connection setup belong to the
//! transport implementation.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::types::ConnectionId;

/// A byte buffer tagged with the session it travels on
///
/// On the server `connection` identifies the client; a client-side
/// transport fills in its own session id.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub connection: ConnectionId,
    pub payload: Bytes,
}

impl Datagram {
    pub fn new(connection: ConnectionId, payload: Bytes) -> Self {
        Self {
            connection,
            payload,
        }
    }
}

/// Transport layer abstraction for network communication
///
/// The trait is symmetric: the same shape serves client and server. A
/// transport bridges two channels:
/// - datagrams received from the network are pushed into `incoming_tx`
/// - datagrams read from `outgoing_rx` are sent to their connection
///
/// # Example: Implementing a custom transport
///
/// ```no_run
/// use async_trait::async_trait;
/// use tickshift_protocol::transport::{Datagram, Transport};
/// use tokio::sync::mpsc;
///
/// struct UdpTransport {
///     // socket, peer table, ...
/// }
///
/// #[async_trait]
/// impl Transport for UdpTransport {
///     type Error = std::io::Error;
///
///     async fn run(
///         self,
///         incoming_tx: mpsc::Sender<Datagram>,
///         mut outgoing_rx: mpsc::Receiver<Datagram>,
///     ) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + 'static {
    /// Error type for this transport
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs the transport until both channels close or an error occurs
    async fn run(
        self,
        incoming_tx: mpsc::Sender<Datagram>,
        outgoing_rx: mpsc::Receiver<Datagram>,
    ) -> Result<(), Self::Error>;
}
