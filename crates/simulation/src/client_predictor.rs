//! Client-side prediction with rollback/replay reconciliation
//!
//! This module provides `ClientPredictor` which wraps a `MovementModel` and handles:
//! - Immediate local input application (zero-latency feel)
//! - Input history for reconciliation
//! - Rollback to the server's confirmed state on every new ack
//! - Replay of the still unconfirmed inputs on top of it

use std::time::Duration;

use tickshift_protocol::{InputCommand, Sequence, Vec2};

use crate::config::SyncConfig;
use crate::input_history::InputHistory;
use crate::{MovementModel, PredictedState};

/// Outcome of a `ClientPredictor::reconcile` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Rolled back to the server state and replayed `replayed` inputs
    ///
    /// `correction` is how far the rendered position moved because of it.
    Applied { replayed: usize, correction: f32 },

    /// The ack is not newer than one already processed; nothing changed
    Duplicate,

    /// The acked input is no longer (or never was) in the history; nothing
    /// changed and prediction continues open-loop
    Stale,
}

/// Client-side predictor with reconciliation
///
/// # Example
///
/// ```rust
/// use tickshift_simulation::{ClientPredictor, EulerMovement, Reconciliation};
/// use tickshift_protocol::Vec2;
///
/// let mut predictor = ClientPredictor::new(EulerMovement::default(), Vec2::ZERO);
///
/// predictor.predict_input(1.0, 0.0, 0.05);
/// predictor.predict_input(1.0, 0.0, 0.05);
///
/// // Server disagrees about where input 1 left us
/// let outcome = predictor.reconcile(1, Vec2::new(0.0, 0.0), Vec2::ZERO);
/// assert!(matches!(outcome, Reconciliation::Applied { replayed: 1, .. }));
///
/// // Same ack again is ignored
/// assert_eq!(predictor.reconcile(1, Vec2::ZERO, Vec2::ZERO), Reconciliation::Duplicate);
/// ```
pub struct ClientPredictor<M: MovementModel> {
    /// Movement integration shared with the server
    model: M,

    /// Inputs not yet confirmed by the server
    history: InputHistory,

    /// State shown to the player (newest prediction)
    current: PredictedState,

    /// Last state confirmed by the server
    confirmed: PredictedState,

    /// Next input sequence number
    next_sequence: Sequence,

    /// Last processed ack (0 = none yet)
    last_ack: Sequence,

    /// Time since session start, accumulated from input steps
    elapsed: Duration,

    /// Longest step a single input may claim, in seconds
    max_input_dt: f32,
}

impl<M: MovementModel> ClientPredictor<M> {
    /// Creates a predictor starting at rest at `position`
    pub fn new(model: M, position: Vec2) -> Self {
        Self::with_config(model, position, &SyncConfig::default())
    }

    /// Creates a predictor using the history capacity from `config`
    pub fn with_config(model: M, position: Vec2, config: &SyncConfig) -> Self {
        let start = PredictedState {
            sequence: 0,
            position,
            velocity: Vec2::ZERO,
        };
        Self {
            model,
            history: InputHistory::new(config.input_history_capacity),
            current: start,
            confirmed: start,
            next_sequence: 1,
            last_ack: 0,
            elapsed: Duration::ZERO,
            max_input_dt: config.max_input_dt(),
        }
    }

    /// Applies a local input immediately and records it
    ///
    /// Returns the predicted state for rendering this frame. The input command
    /// to send is available through `latest_command()`. A frame longer than
    /// the configured input step bound is recorded as that bound, matching
    /// what the server will simulate.
    pub fn predict_input(&mut self, dx: f32, dy: f32, delta_time: f32) -> PredictedState {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        // f32::max drops NaN
        let delta_time = delta_time.max(0.0).min(self.max_input_dt);
        let step = Duration::try_from_secs_f32(delta_time).unwrap_or_default();
        self.elapsed += step;

        let command = InputCommand::new(sequence, dx, dy, delta_time, self.elapsed);
        let (position, velocity) = self.model.apply_movement(
            self.current.position,
            self.current.velocity,
            &command,
            delta_time,
        );

        let state = PredictedState {
            sequence,
            position,
            velocity,
        };
        self.history.push(command, state);
        self.current = state;

        state
    }

    /// Reconciles with the server's state after input `ack`
    ///
    /// Acks at or below the last processed one, and acks for inputs no longer
    /// in the history, leave the predictor untouched. Otherwise the server
    /// state becomes the baseline, confirmed inputs are dropped and every
    /// later input is replayed in sequence order with the same movement step.
    pub fn reconcile(
        &mut self,
        ack: Sequence,
        server_position: Vec2,
        server_velocity: Vec2,
    ) -> Reconciliation {
        if ack <= self.last_ack {
            tracing::trace!(ack, last_ack = self.last_ack, "Ignoring outdated ack");
            return Reconciliation::Duplicate;
        }

        if !self.history.contains(ack) {
            tracing::debug!(
                ack,
                oldest = self.history.oldest().map(|e| e.command.sequence),
                "Ack outside input history, skipping reconciliation"
            );
            return Reconciliation::Stale;
        }

        let before = self.current.position;

        self.confirmed = PredictedState {
            sequence: ack,
            position: server_position,
            velocity: server_velocity,
        };
        self.last_ack = ack;
        self.history.discard_through(ack);

        let mut state = self.confirmed;
        let mut replayed = 0;
        for entry in self.history.iter_mut() {
            let (position, velocity) = self.model.apply_movement(
                state.position,
                state.velocity,
                &entry.command,
                entry.command.delta_time,
            );
            state = PredictedState {
                sequence: entry.command.sequence,
                position,
                velocity,
            };
            entry.state = state;
            replayed += 1;
        }
        self.current = state;

        let correction = before.distance(self.current.position);
        if correction > 0.0 {
            tracing::debug!(
                ack,
                replayed,
                correction,
                "Corrected client prediction"
            );
        }

        Reconciliation::Applied {
            replayed,
            correction,
        }
    }

    /// State to render for the local player
    pub fn current_state(&self) -> PredictedState {
        self.current
    }

    /// Last server-confirmed state
    pub fn confirmed_state(&self) -> PredictedState {
        self.confirmed
    }

    /// Command recorded for `sequence`, if still unconfirmed and retained
    pub fn command(&self, sequence: Sequence) -> Option<&InputCommand> {
        self.history.get(sequence).map(|e| &e.command)
    }

    /// Most recently predicted command
    pub fn latest_command(&self) -> Option<&InputCommand> {
        self.history.newest().map(|e| &e.command)
    }

    /// Predicted state recorded for `sequence`
    pub fn predicted(&self, sequence: Sequence) -> Option<PredictedState> {
        self.history.get(sequence).map(|e| e.state)
    }

    pub fn history(&self) -> &InputHistory {
        &self.history
    }

    /// Number of inputs awaiting confirmation
    pub fn pending_count(&self) -> usize {
        self.history.len()
    }

    /// Last processed ack (0 before the first one)
    pub fn last_acked(&self) -> Sequence {
        self.last_ack
    }

    /// Sequence the next input will get
    pub fn next_sequence(&self) -> Sequence {
        self.next_sequence
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}
