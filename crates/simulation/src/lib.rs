//! # Tickshift Simulation Layer
//!
//! History management for authoritative multiplayer games: client-side
//! prediction with rollback/replay, snapshot interpolation of remote entities
//! and server-side lag compensation.
//!
//! ## Architecture
//!
//! - **Client**: `ClientPredictor` applies inputs immediately and reconciles
//!   with server acks; `SnapshotBuffer` interpolates remote entities at a
//!   delayed render time
//! - **Server**: `WorldHistory` keeps the last N ticks of world positions;
//!   `LagCompensator` judges hit claims against the state the shooter saw
//! - **Shared**: the same `MovementModel` integrates inputs on both sides
//!
//! ## Example
//!
//! ```rust
//! use tickshift_simulation::{ClientPredictor, EulerMovement, Reconciliation};
//! use tickshift_protocol::Vec2;
//!
//! let mut predictor = ClientPredictor::new(EulerMovement::default(), Vec2::ZERO);
//!
//! // Instant local feedback, no round-trip
//! let predicted = predictor.predict_input(1.0, 0.0, 0.05);
//! assert_eq!(predicted.sequence, 1);
//!
//! // Server confirms sequence 1 with its own result
//! let outcome = predictor.reconcile(1, predicted.position, predicted.velocity);
//! assert!(matches!(outcome, Reconciliation::Applied { replayed: 0, .. }));
//! ```

pub mod client_predictor;
pub mod config;
pub mod input_history;
pub mod lag_compensator;
pub mod snapshot_buffer;
pub mod world_history;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tickshift_protocol::{EntityId, InputCommand, Sequence, Vec2};

pub use client_predictor::{ClientPredictor, Reconciliation};
pub use config::{ConfigError, OverrunPolicy, SyncConfig};
pub use input_history::{HistoryEntry, InputHistory};
pub use lag_compensator::{HitRequest, HitVerdict, LagCompensator, RewindError};
pub use snapshot_buffer::{RenderMode, RenderState, Snapshot, SnapshotBuffer};
pub use world_history::{WorldHistory, WorldHistoryEntry};

/// Movement integration shared by client and server
///
/// This is the determinism contract of the whole crate: the client predicts
/// with it, replays with it during reconciliation, and the server applies
/// received inputs with it. Any difference between the two sides shows up
/// as a permanent correction on every ack.
///
/// # Requirements
///
/// - **Deterministic**: same position, velocity, input and delta_time give
///   bit-identical results
/// - **Pure**: no clocks, randomness or hidden state
///
/// # Example
///
/// ```rust
/// use tickshift_simulation::MovementModel;
/// use tickshift_protocol::{InputCommand, Vec2};
///
/// struct Teleport;
///
/// impl MovementModel for Teleport {
///     fn apply_movement(
///         &self,
///         position: Vec2,
///         _velocity: Vec2,
///         input: &InputCommand,
///         _delta_time: f32,
///     ) -> (Vec2, Vec2) {
///         (position + input.direction(), Vec2::ZERO)
///     }
/// }
/// ```
pub trait MovementModel {
    /// Integrates one input step, returning the new position and velocity
    fn apply_movement(
        &self,
        position: Vec2,
        velocity: Vec2,
        input: &InputCommand,
        delta_time: f32,
    ) -> (Vec2, Vec2);
}

/// Fixed-step semi-implicit Euler movement
///
/// Velocity eases toward `direction * max_speed` (direction clamped to unit
/// length) at `responsiveness` per second, then position advances by the new
/// velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerMovement {
    /// Units per second at full input
    pub max_speed: f32,

    /// Fraction of the velocity gap closed per second (clamped to one step)
    pub responsiveness: f32,
}

impl Default for EulerMovement {
    fn default() -> Self {
        Self {
            max_speed: 5.0,
            responsiveness: 10.0,
        }
    }
}

impl MovementModel for EulerMovement {
    fn apply_movement(
        &self,
        position: Vec2,
        velocity: Vec2,
        input: &InputCommand,
        delta_time: f32,
    ) -> (Vec2, Vec2) {
        let dt = if delta_time.is_finite() { delta_time.max(0.0) } else { 0.0 };

        let mut direction = input.direction();
        if !direction.x.is_finite() || !direction.y.is_finite() {
            direction = Vec2::ZERO;
        }
        let len_sq = direction.length_squared();
        if len_sq > 1.0 {
            direction = direction * (1.0 / len_sq.sqrt());
        }

        let target = direction * self.max_speed;
        let blend = (self.responsiveness * dt).min(1.0);
        let new_velocity = velocity + (target - velocity) * blend;
        let new_position = position + new_velocity * dt;

        (new_position, new_velocity)
    }
}

/// Predicted local-player state after applying one input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedState {
    pub sequence: Sequence,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Authoritative state of one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// World state handed over by the simulation once per tick
///
/// Ordered by entity id so everything derived from it is deterministic.
pub type WorldState = BTreeMap<EntityId, EntityState>;
