//! Authoritative world state and the per-tick pipeline
//!
//! `ServerWorld` owns the ground truth:
//! - Per-connection sessions (controlled entity, last applied input sequence,
//!   outbound queue)
//! - Input ingestion, drained once per tick in sequence order
//! - World history recording right after each step, before any outbound
//!   message is built
//! - State update generation for every connection

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tickshift_protocol::{
    ClientMessage, Component, ConnectionId, Datagram, EntityId, InputCommand, SendQueue, Sequence,
    StateUpdate, Tick, Vec2, WireCodec,
};
use tickshift_simulation::{
    EntityState, HitRequest, LagCompensator, MovementModel, SyncConfig, WorldHistory, WorldState,
};

use crate::ServerError;

/// Priority of the update describing a client's own entity
pub const LOCAL_PLAYER_PRIORITY: u8 = 255;

/// Highest priority a remote entity can get (when it is right next to the player)
pub const REMOTE_PRIORITY_CEILING: u8 = 200;

/// Default per-tick outbound byte budget for one connection
pub const DEFAULT_SEND_BUDGET: usize = 1200;

/// World history shared between the tick loop (writer) and hit validation
/// tasks (readers)
pub type SharedHistory = Arc<RwLock<WorldHistory>>;

/// Per-client session tracking
#[derive(Debug)]
struct ClientSession {
    /// Entity this client controls
    entity_id: EntityId,

    /// Last applied input sequence from this client
    last_sequence: Sequence,

    send_queue: SendQueue,
}

impl ClientSession {
    fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            last_sequence: 0,
            send_queue: SendQueue::new(),
        }
    }
}

/// Server-side authoritative world
///
/// # Example
///
/// ```rust
/// use tickshift_server::ServerWorld;
/// use tickshift_protocol::{ClientMessage, ConnectionId, InputCommand};
/// use tickshift_simulation::EulerMovement;
/// use std::time::Duration;
///
/// let mut world = ServerWorld::new(EulerMovement::default());
/// let connection = ConnectionId::new_v4();
/// world.connect(connection);
///
/// let input = ClientMessage::Input(InputCommand::new(1, 1.0, 0.0, 0.05, Duration::ZERO));
/// world.ingest(connection, input.encode()).unwrap();
///
/// let outbound = world.tick();
/// assert_eq!(outbound.len(), 1);
/// assert_eq!(world.last_applied_sequence(connection), Some(1));
/// ```
pub struct ServerWorld<M: MovementModel> {
    model: M,
    config: SyncConfig,

    /// Authoritative entity state (ground truth)
    entities: WorldState,

    sessions: HashMap<ConnectionId, ClientSession>,

    /// Inputs received since the previous tick
    pending_inputs: Vec<(ConnectionId, InputCommand)>,

    history: SharedHistory,
    compensator: LagCompensator,

    tick: Tick,
    next_entity_id: EntityId,
    send_budget: usize,
}

impl<M: MovementModel> ServerWorld<M> {
    pub fn new(model: M) -> Self {
        Self::with_config(model, SyncConfig::default())
    }

    pub fn with_config(model: M, config: SyncConfig) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "Synchronization config is inconsistent");
        }
        Self {
            history: Arc::new(RwLock::new(WorldHistory::with_config(&config))),
            compensator: LagCompensator::with_config(&config),
            model,
            config,
            entities: WorldState::new(),
            sessions: HashMap::new(),
            pending_inputs: Vec::new(),
            tick: 0,
            next_entity_id: 1,
            send_budget: DEFAULT_SEND_BUDGET,
        }
    }

    /// Per-connection byte budget for each tick's outbound updates
    pub fn set_send_budget(&mut self, budget: usize) {
        self.send_budget = budget;
    }

    /// Registers a client and spawns the entity it controls
    ///
    /// Connecting an already known connection returns its existing entity.
    pub fn connect(&mut self, connection: ConnectionId) -> EntityId {
        if let Some(session) = self.sessions.get(&connection) {
            return session.entity_id;
        }

        let entity_id = self.spawn_entity(Vec2::ZERO);
        self.sessions.insert(connection, ClientSession::new(entity_id));
        tracing::info!(connection = %connection, entity_id, "Client connected");
        entity_id
    }

    /// Removes a client and its entity
    pub fn disconnect(&mut self, connection: ConnectionId) {
        if let Some(session) = self.sessions.remove(&connection) {
            self.entities.remove(&session.entity_id);
            self.pending_inputs.retain(|(c, _)| *c != connection);
            tracing::info!(connection = %connection, entity_id = session.entity_id, "Client disconnected");
        }
    }

    /// Adds an entity not controlled by any client
    pub fn spawn_entity(&mut self, position: Vec2) -> EntityId {
        let entity_id = self.next_entity_id;
        self.next_entity_id += 1;
        self.entities.insert(
            entity_id,
            EntityState {
                position,
                velocity: Vec2::ZERO,
            },
        );
        entity_id
    }

    /// Overrides an entity's state (used by the gameplay simulation)
    pub fn set_entity_state(&mut self, entity_id: EntityId, state: EntityState) -> bool {
        match self.entities.get_mut(&entity_id) {
            Some(slot) => {
                *slot = state;
                true
            }
            None => false,
        }
    }

    /// Decodes and queues one client datagram
    ///
    /// See `ingest_message`.
    pub fn ingest(
        &mut self,
        connection: ConnectionId,
        payload: Bytes,
    ) -> Result<Option<HitRequest>, ServerError> {
        let message = ClientMessage::decode(payload)?;
        self.ingest_message(connection, message)
    }

    /// Queues one decoded client message
    ///
    /// Inputs are queued for the next tick. A hit claim is turned into a
    /// `HitRequest` and returned for validation. Its latency is the age of
    /// the claim's view timestamp, which the client reports; the rewind it
    /// buys is capped by `max_compensation_ms` and by the retained history,
    /// and a timestamp from the future counts as no latency at all.
    pub fn ingest_message(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> Result<Option<HitRequest>, ServerError> {
        let session = self
            .sessions
            .get(&connection)
            .ok_or(ServerError::UnknownConnection(connection))?;

        match message {
            ClientMessage::Input(command) => {
                if command.sequence <= session.last_sequence {
                    tracing::trace!(
                        connection = %connection,
                        sequence = command.sequence,
                        last_sequence = session.last_sequence,
                        "Dropping already applied input"
                    );
                    return Ok(None);
                }
                self.pending_inputs.push((connection, command));
                Ok(None)
            }
            ClientMessage::HitClaim(claim) => {
                let latency_ms = self.now_ms().saturating_sub(claim.view_timestamp);
                Ok(Some(HitRequest {
                    shooter_id: session.entity_id,
                    target_id: claim.target_id,
                    claimed_position: claim.claimed_position,
                    shooter_latency: Duration::from_millis(latency_ms),
                    hit_radius: claim.hit_radius,
                }))
            }
        }
    }

    /// Runs one simulation tick and returns the datagrams to send
    ///
    /// Order: apply queued inputs (per connection, ascending sequence,
    /// already applied sequences dropped), advance the tick, record world
    /// history, then build and schedule state updates.
    pub fn tick(&mut self) -> Vec<Datagram> {
        self.apply_pending_inputs();

        self.tick += 1;
        {
            let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
            history.record_snapshot(self.tick, &self.entities);
        }

        self.build_outbound()
    }

    fn apply_pending_inputs(&mut self) {
        let max_dt = self.config.max_input_dt();
        let mut pending = std::mem::take(&mut self.pending_inputs);
        pending.sort_by_key(|(connection, command)| (*connection, command.sequence));

        for (connection, command) in pending {
            let Some(session) = self.sessions.get_mut(&connection) else {
                continue;
            };
            if command.sequence <= session.last_sequence {
                continue;
            }
            let Some(state) = self.entities.get_mut(&session.entity_id) else {
                continue;
            };

            // Clients choose their own step; never simulate more than the bound
            let delta_time = command.delta_time.max(0.0).min(max_dt);
            let (position, velocity) =
                self.model
                    .apply_movement(state.position, state.velocity, &command, delta_time);
            state.position = position;
            state.velocity = velocity;
            session.last_sequence = command.sequence;

            tracing::debug!(
                connection = %connection,
                sequence = command.sequence,
                "Applied client input to authoritative state"
            );
        }
    }

    fn build_outbound(&mut self) -> Vec<Datagram> {
        let mut outbound = Vec::new();

        for (&connection, session) in self.sessions.iter_mut() {
            let own_position = self
                .entities
                .get(&session.entity_id)
                .map(|s| s.position)
                .unwrap_or(Vec2::ZERO);

            for (&entity_id, state) in &self.entities {
                let base = StateUpdate::new(self.tick, entity_id)
                    .with_component(Component::position(state.position))
                    .with_component(Component::velocity(state.velocity));
                let update = if entity_id == session.entity_id {
                    base.with_priority(LOCAL_PLAYER_PRIORITY)
                        .with_sequence_ack(session.last_sequence)
                } else {
                    base.with_priority(remote_priority(own_position.distance(state.position)))
                };

                match WireCodec::encode(&update) {
                    Ok(bytes) => session.send_queue.push(entity_id, update.priority, bytes),
                    Err(e) => {
                        tracing::error!(entity_id, error = %e, "Failed to encode state update");
                    }
                }
            }

            for payload in session.send_queue.drain(self.send_budget) {
                outbound.push(Datagram::new(connection, payload));
            }
        }

        outbound
    }

    /// Server time of the current tick in ms
    pub fn now_ms(&self) -> u64 {
        self.tick.saturating_mul(self.config.tick_interval_ms())
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn entity_state(&self, entity_id: EntityId) -> Option<EntityState> {
        self.entities.get(&entity_id).copied()
    }

    /// Entity controlled by `connection`
    pub fn entity_of(&self, connection: ConnectionId) -> Option<EntityId> {
        self.sessions.get(&connection).map(|s| s.entity_id)
    }

    /// Last applied input sequence for `connection`
    ///
    /// Returns `None` if the connection is unknown.
    pub fn last_applied_sequence(&self, connection: ConnectionId) -> Option<Sequence> {
        self.sessions.get(&connection).map(|s| s.last_sequence)
    }

    pub fn is_connected(&self, connection: ConnectionId) -> bool {
        self.sessions.contains_key(&connection)
    }

    pub fn client_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn pending_input_count(&self) -> usize {
        self.pending_inputs.len()
    }

    /// Shared handle to the world history for concurrent readers
    pub fn history(&self) -> SharedHistory {
        Arc::clone(&self.history)
    }

    pub fn compensator(&self) -> LagCompensator {
        self.compensator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// Remote entities closer to the player are sent first
fn remote_priority(distance: f32) -> u8 {
    let ceiling = f32::from(REMOTE_PRIORITY_CEILING);
    if distance.is_finite() {
        (ceiling - distance).clamp(0.0, ceiling) as u8
    } else {
        0
    }
}
