//! # Tickshift Server
//!
//! Authoritative tick loop for tickshift.
//!
//! `ServerWorld` does the synchronous per-tick work (input application,
//! world history, state updates). `Server` drives it from a Tokio event loop:
//! datagrams from the transport are ingested as they arrive, the world ticks
//! on a fixed interval, and each hit claim is validated on its own task
//! against the shared world history.
//!
//! ## Example
//!
//! ```no_run
//! use tickshift_server::Server;
//! use tickshift_simulation::EulerMovement;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (incoming_tx, incoming_rx) = mpsc::channel(100);
//!     let (outgoing_tx, outgoing_rx) = mpsc::channel(100);
//!
//!     let server = Server::new(EulerMovement::default(), incoming_rx, outgoing_tx);
//!     server.run().await;
//! }
//! ```

pub mod transport;
pub mod world;

use std::sync::PoisonError;

use tickshift_protocol::{ClientMessage, ConnectionId, Datagram, EntityId, ProtocolError};
use tickshift_simulation::{HitRequest, HitVerdict, MovementModel, RewindError, SyncConfig};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub use world::{ServerWorld, SharedHistory, DEFAULT_SEND_BUDGET, LOCAL_PLAYER_PRIORITY};

/// Notifications emitted by the server loop
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A well-formed datagram arrived from a connection not seen before
    Connected {
        connection: ConnectionId,
        entity_id: EntityId,
    },

    /// A hit claim finished validation
    ///
    /// Claims that cannot be adjudicated carry the error in `outcome` and
    /// count as misses.
    HitResolved {
        connection: ConnectionId,
        request: HitRequest,
        outcome: Result<HitVerdict, RewindError>,
    },
}

impl ServerEvent {
    /// True for a hit claim that was adjudicated and accepted
    pub fn is_confirmed_hit(&self) -> bool {
        matches!(
            self,
            ServerEvent::HitResolved {
                outcome: Ok(HitVerdict { valid: true, .. }),
                ..
            }
        )
    }
}

/// Server event loop
pub struct Server<M: MovementModel> {
    world: ServerWorld<M>,

    /// Channel to receive datagrams from transport layer
    incoming_rx: mpsc::Receiver<Datagram>,

    /// Channel to send datagrams to transport layer
    outgoing_tx: mpsc::Sender<Datagram>,

    events_tx: Option<mpsc::Sender<ServerEvent>>,
}

impl<M: MovementModel + Send + 'static> Server<M> {
    pub fn new(
        model: M,
        incoming_rx: mpsc::Receiver<Datagram>,
        outgoing_tx: mpsc::Sender<Datagram>,
    ) -> Self {
        Self::with_config(model, SyncConfig::default(), incoming_rx, outgoing_tx)
    }

    pub fn with_config(
        model: M,
        config: SyncConfig,
        incoming_rx: mpsc::Receiver<Datagram>,
        outgoing_tx: mpsc::Sender<Datagram>,
    ) -> Self {
        Self {
            world: ServerWorld::with_config(model, config),
            incoming_rx,
            outgoing_tx,
            events_tx: None,
        }
    }

    /// Subscribes to connection and hit validation events
    pub fn with_events(mut self, events_tx: mpsc::Sender<ServerEvent>) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    pub fn world(&self) -> &ServerWorld<M> {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut ServerWorld<M> {
        &mut self.world
    }

    /// Runs the main event loop
    ///
    /// Returns when the incoming channel is closed or the transport stops
    /// accepting outgoing datagrams.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.world.config().tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            tick_rate_hz = self.world.config().tick_rate_hz,
            "Server loop started"
        );

        loop {
            tokio::select! {
                maybe_datagram = self.incoming_rx.recv() => {
                    match maybe_datagram {
                        Some(datagram) => self.handle_datagram(datagram).await,
                        None => {
                            tracing::info!("Server shutting down: incoming channel closed");
                            break;
                        }
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.run_tick().await {
                        tracing::error!(error = %e, "Server shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_datagram(&mut self, datagram: Datagram) {
        let connection = datagram.connection;

        // Only a well-formed message may register a connection
        let message = match ClientMessage::decode(datagram.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(connection = %connection, error = %e, "Dropping malformed datagram");
                return;
            }
        };

        if !self.world.is_connected(connection) {
            let entity_id = self.world.connect(connection);
            self.emit(ServerEvent::Connected {
                connection,
                entity_id,
            })
            .await;
        }

        match self.world.ingest_message(connection, message) {
            Ok(Some(request)) => self.spawn_validation(connection, request),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(connection = %connection, error = %e, "Dropping datagram");
            }
        }
    }

    /// Validates a hit claim on its own task under a shared read lock
    fn spawn_validation(&self, connection: ConnectionId, request: HitRequest) {
        let history = self.world.history();
        let compensator = self.world.compensator();
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            let outcome = {
                let history = history.read().unwrap_or_else(PoisonError::into_inner);
                compensator.validate_hit(&history, &request)
            };

            match &outcome {
                Ok(verdict) => tracing::info!(
                    connection = %connection,
                    target = verdict.target_id,
                    rewound_tick = verdict.rewound_tick,
                    valid = verdict.valid,
                    "Hit claim resolved"
                ),
                Err(e) => tracing::warn!(
                    connection = %connection,
                    target = request.target_id,
                    error = %e,
                    "Hit claim rejected"
                ),
            }

            if let Some(events_tx) = events_tx {
                let _ = events_tx
                    .send(ServerEvent::HitResolved {
                        connection,
                        request,
                        outcome,
                    })
                    .await;
            }
        });
    }

    async fn run_tick(&mut self) -> Result<(), ServerError> {
        for datagram in self.world.tick() {
            self.outgoing_tx
                .send(datagram)
                .await
                .map_err(|_| ServerError::ChannelSendError)?;
        }
        Ok(())
    }

    async fn emit(&self, event: ServerEvent) {
        if let Some(events_tx) = &self.events_tx {
            let _ = events_tx.send(event).await;
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Malformed client message: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Failed to send to channel")]
    ChannelSendError,
}
