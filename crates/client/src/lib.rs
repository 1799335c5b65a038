//! # Tickshift Client
//!
//! Client-side frame loop for tickshift.
//!
//! Received datagrams are decoded on the delivery path by a receiver task
//! and queued as `StateUpdate`s. Once per frame `ClientSession::frame`
//! drains that queue, reconciles the local player, feeds remote entities
//! into the snapshot buffer, predicts the new input and interpolates every
//! remote entity at the delayed render time.
//!
//! ## Example
//!
//! ```no_run
//! use tickshift_client::{spawn_receiver, ClientSession};
//! use tickshift_protocol::{ConnectionId, Datagram};
//! use tickshift_simulation::EulerMovement;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (incoming_tx, incoming_rx) = mpsc::channel(100);
//!     let (outgoing_tx, outgoing_rx) = mpsc::channel::<Datagram>(100);
//!
//!     let updates = spawn_receiver(incoming_rx, 256);
//!     let mut session = ClientSession::new(EulerMovement::default(), 1, updates);
//!     let connection = ConnectionId::new_v4();
//!
//!     let frame = session.frame(1_000, 1.0, 0.0, 1.0 / 60.0);
//!     outgoing_tx.send(Datagram::new(connection, frame.outgoing)).await.unwrap();
//! }
//! ```

pub mod transport;

use bytes::Bytes;
use tickshift_protocol::{
    ClientMessage, Datagram, EntityId, HitClaim, StateUpdate, Vec2, WireCodec,
};
use tickshift_simulation::{
    ClientPredictor, MovementModel, PredictedState, Reconciliation, RenderState, Snapshot,
    SnapshotBuffer, SyncConfig,
};
use tokio::sync::mpsc;

/// Decodes incoming datagrams into state updates on their own task
///
/// Malformed datagrams are logged and dropped. The task ends when either
/// side of the pipe closes.
pub fn spawn_receiver(
    mut incoming_rx: mpsc::Receiver<Datagram>,
    buffer_size: usize,
) -> mpsc::Receiver<StateUpdate> {
    let (updates_tx, updates_rx) = mpsc::channel(buffer_size.max(1));
    tokio::spawn(async move {
        while let Some(datagram) = incoming_rx.recv().await {
            match WireCodec::decode(datagram.payload) {
                Ok(update) => {
                    if updates_tx.send(update).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection = %datagram.connection, error = %e, "Dropping malformed state update");
                }
            }
        }
        tracing::debug!("Receiver task finished");
    });
    updates_rx
}

/// Everything one client frame produces
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Predicted state of the local player after this frame's input
    pub local: PredictedState,

    /// Remote entities at the render time, ordered by entity id
    pub remotes: Vec<(EntityId, RenderState)>,

    /// Render time the remotes were sampled at (server ms)
    pub render_time: u64,

    /// Encoded input message to send to the server
    pub outgoing: Bytes,

    /// Outcome of the newest local-player reconciliation this frame, if any
    pub reconciliation: Option<Reconciliation>,

    /// Number of state updates consumed this frame
    pub updates_applied: usize,
}

/// Client-side synchronization state for one connection
pub struct ClientSession<M: MovementModel> {
    predictor: ClientPredictor<M>,
    snapshots: SnapshotBuffer,

    /// Entity controlled by this client
    local_entity: EntityId,

    updates_rx: mpsc::Receiver<StateUpdate>,
    tick_interval_ms: u64,

    /// Render time of the last frame, sent with hit claims
    last_render_time: u64,
}

impl<M: MovementModel> ClientSession<M> {
    pub fn new(model: M, local_entity: EntityId, updates_rx: mpsc::Receiver<StateUpdate>) -> Self {
        Self::with_config(model, local_entity, Vec2::ZERO, updates_rx, &SyncConfig::default())
    }

    pub fn with_config(
        model: M,
        local_entity: EntityId,
        spawn_position: Vec2,
        updates_rx: mpsc::Receiver<StateUpdate>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            predictor: ClientPredictor::with_config(model, spawn_position, config),
            snapshots: SnapshotBuffer::with_config(config),
            local_entity,
            updates_rx,
            tick_interval_ms: config.tick_interval_ms(),
            last_render_time: 0,
        }
    }

    /// Runs one client frame
    ///
    /// `now_ms` is the client's estimate of server time; keeping it in sync
    /// is the caller's business. Remote entities the server has not described
    /// for longer than `remote_expiry_ms` are forgotten before rendering.
    pub fn frame(&mut self, now_ms: u64, dx: f32, dy: f32, delta_time: f32) -> Frame {
        let (updates_applied, reconciliation) = self.drain_updates();

        let local = self.predictor.predict_input(dx, dy, delta_time);
        let outgoing = match self.predictor.latest_command() {
            Some(command) => ClientMessage::Input(*command).encode(),
            None => Bytes::new(),
        };

        let render_time = self.snapshots.render_time(now_ms);
        self.last_render_time = render_time;
        self.snapshots.prune_expired(render_time);

        Frame {
            local,
            remotes: self.snapshots.interpolate_all(render_time),
            render_time,
            outgoing,
            reconciliation,
            updates_applied,
        }
    }

    /// Applies every queued state update without blocking
    fn drain_updates(&mut self) -> (usize, Option<Reconciliation>) {
        let mut applied = 0;
        let mut reconciliation = None;
        while let Ok(update) = self.updates_rx.try_recv() {
            applied += 1;
            if let Some(outcome) = self.apply_update(&update) {
                reconciliation = Some(outcome);
            }
        }
        (applied, reconciliation)
    }

    /// Routes one update: local player to the predictor, others to the
    /// snapshot buffer
    ///
    /// Returns the reconciliation outcome for local-player updates.
    pub fn apply_update(&mut self, update: &StateUpdate) -> Option<Reconciliation> {
        let position = match update.position() {
            Some(Ok(position)) => position,
            Some(Err(e)) => {
                tracing::warn!(entity_id = update.entity_id, error = %e, "Malformed position component");
                return None;
            }
            None => return None,
        };
        let velocity = match update.velocity() {
            Some(Ok(velocity)) => velocity,
            Some(Err(e)) => {
                tracing::warn!(entity_id = update.entity_id, error = %e, "Malformed velocity component");
                return None;
            }
            None => Vec2::ZERO,
        };

        if update.entity_id == self.local_entity {
            return Some(self.predictor.reconcile(update.sequence_ack, position, velocity));
        }

        self.snapshots.add_snapshot(
            update.entity_id,
            Snapshot {
                server_timestamp: update.timestamp.saturating_mul(self.tick_interval_ms),
                entity_id: update.entity_id,
                position,
                velocity,
            },
        );
        None
    }

    /// Encodes a hit claim against what was rendered in the last frame
    pub fn claim_hit(&self, target_id: EntityId, claimed_position: Vec2, hit_radius: f32) -> Bytes {
        ClientMessage::HitClaim(HitClaim {
            target_id,
            claimed_position,
            view_timestamp: self.last_render_time,
            hit_radius,
        })
        .encode()
    }

    /// Forgets a remote entity (e.g. after it left the area of interest)
    pub fn forget_entity(&mut self, entity_id: EntityId) -> bool {
        self.snapshots.remove_entity(entity_id)
    }

    pub fn predictor(&self) -> &ClientPredictor<M> {
        &self.predictor
    }

    pub fn snapshots(&self) -> &SnapshotBuffer {
        &self.snapshots
    }

    pub fn local_entity(&self) -> EntityId {
        self.local_entity
    }

    pub fn last_render_time(&self) -> u64 {
        self.last_render_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickshift_protocol::{Component, ConnectionId};
    use tickshift_simulation::{EulerMovement, RenderMode};
    use tokio::time::{timeout, Duration};

    fn update(tick: u64, entity_id: EntityId, x: f32, ack: u32) -> StateUpdate {
        StateUpdate::new(tick, entity_id)
            .with_sequence_ack(ack)
            .with_component(Component::position(Vec2::new(x, 0.0)))
            .with_component(Component::velocity(Vec2::new(20.0, 0.0)))
    }

    #[tokio::test]
    async fn test_receiver_decodes_and_drops_malformed() {
        let (incoming_tx, incoming_rx) = mpsc::channel(10);
        let mut updates = spawn_receiver(incoming_rx, 10);
        let connection = ConnectionId::new_v4();

        incoming_tx
            .send(Datagram::new(connection, Bytes::from_static(&[1, 2, 3])))
            .await
            .unwrap();
        let bytes = WireCodec::encode(&update(3, 2, 1.0, 0)).unwrap();
        incoming_tx.send(Datagram::new(connection, bytes)).await.unwrap();

        let received = timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.entity_id, 2);
        assert_eq!(received.timestamp, 3);
    }

    #[test]
    fn test_frame_predicts_and_encodes_input() {
        let (_tx, rx) = mpsc::channel(10);
        let mut session = ClientSession::new(EulerMovement::default(), 1, rx);

        let frame = session.frame(0, 1.0, 0.0, 0.05);
        assert_eq!(frame.local.sequence, 1);
        assert!(frame.local.position.x > 0.0);

        match ClientMessage::decode(frame.outgoing).unwrap() {
            ClientMessage::Input(command) => {
                assert_eq!(command.sequence, 1);
                assert_eq!(command.dx, 1.0);
            }
            other => panic!("Expected input, got {:?}", other),
        }
    }

    #[test]
    fn test_local_update_reconciles() {
        let (tx, rx) = mpsc::channel(10);
        let mut session = ClientSession::new(EulerMovement::default(), 1, rx);
        for _ in 0..3 {
            session.frame(0, 1.0, 0.0, 0.05);
        }

        // Server says input 2 left us at the origin
        tx.try_send(update(2, 1, 0.0, 2)).unwrap();
        let frame = session.frame(0, 0.0, 0.0, 0.05);

        assert_eq!(frame.updates_applied, 1);
        assert!(matches!(
            frame.reconciliation,
            Some(Reconciliation::Applied { replayed: 1, .. })
        ));
        assert_eq!(session.predictor().last_acked(), 2);
    }

    #[test]
    fn test_remote_updates_interpolated() {
        let (tx, rx) = mpsc::channel(10);
        let mut session = ClientSession::new(EulerMovement::default(), 1, rx);

        // Ticks 20 and 22 at 50ms = 1000ms and 1100ms
        tx.try_send(update(20, 7, 0.0, 0)).unwrap();
        tx.try_send(update(22, 7, 10.0, 0)).unwrap();

        // Render time = 1150 - 100 = 1050, halfway
        let frame = session.frame(1_150, 0.0, 0.0, 0.05);
        assert_eq!(frame.render_time, 1_050);
        assert_eq!(frame.remotes.len(), 1);

        let (entity_id, state) = frame.remotes[0];
        assert_eq!(entity_id, 7);
        assert_eq!(state.mode, RenderMode::Interpolated);
        assert!((state.position.x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_departed_remote_forgotten() {
        let (tx, rx) = mpsc::channel(10);
        let mut session = ClientSession::new(EulerMovement::default(), 1, rx);
        tx.try_send(update(20, 7, 0.0, 0)).unwrap();
        tx.try_send(update(22, 7, 10.0, 0)).unwrap();

        // Newest snapshot at 1100ms is exactly one expiry behind render time
        let frame = session.frame(2_200, 0.0, 0.0, 0.05);
        assert_eq!(frame.remotes.len(), 1);
        assert_eq!(frame.remotes[0].1.mode, RenderMode::Stale);

        let frame = session.frame(2_300, 0.0, 0.0, 0.05);
        assert!(frame.remotes.is_empty());
        assert!(session.snapshots().is_empty());
    }

    #[test]
    fn test_update_without_position_ignored() {
        let (_tx, rx) = mpsc::channel(10);
        let mut session = ClientSession::new(EulerMovement::default(), 1, rx);

        let bare = StateUpdate::new(5, 9).with_component(Component::health(50.0));
        assert_eq!(session.apply_update(&bare), None);
        assert!(session.snapshots().is_empty());
    }

    #[test]
    fn test_hit_claim_carries_render_time() {
        let (_tx, rx) = mpsc::channel(10);
        let mut session = ClientSession::new(EulerMovement::default(), 1, rx);
        session.frame(2_000, 0.0, 0.0, 0.05);

        match ClientMessage::decode(session.claim_hit(4, Vec2::new(1.0, 1.0), 0.5)).unwrap() {
            ClientMessage::HitClaim(claim) => {
                assert_eq!(claim.target_id, 4);
                assert_eq!(claim.view_timestamp, 1_900);
            }
            other => panic!("Expected hit claim, got {:?}", other),
        }
    }
}
