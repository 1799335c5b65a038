//! Integration tests for the synchronization loop
//!
//! Drives a `ServerWorld` and several `ClientSession`s by hand, tick by tick,
//! routing datagrams through plain channels so delivery (and loss) is fully
//! deterministic.

use std::collections::HashMap;

use tickshift::client::ClientSession;
use tickshift::protocol::{ConnectionId, EntityId, StateUpdate, Vec2, WireCodec};
use tickshift::server::ServerWorld;
use tickshift::simulation::{EulerMovement, Reconciliation, RenderMode};
use tokio::sync::mpsc;

const DT: f32 = 0.05;

struct Player {
    connection: ConnectionId,
    entity: EntityId,
    session: ClientSession<EulerMovement>,
    updates_tx: mpsc::Sender<StateUpdate>,
    reconciliations: Vec<Reconciliation>,
}

struct Harness {
    world: ServerWorld<EulerMovement>,
    players: Vec<Player>,
}

impl Harness {
    fn new(count: usize) -> Self {
        let mut world = ServerWorld::new(EulerMovement::default());
        let players = (0..count)
            .map(|_| {
                let connection = ConnectionId::new_v4();
                let entity = world.connect(connection);
                let (updates_tx, updates_rx) = mpsc::channel(1024);
                Player {
                    connection,
                    entity,
                    session: ClientSession::new(EulerMovement::default(), entity, updates_rx),
                    updates_tx,
                    reconciliations: Vec::new(),
                }
            })
            .collect();
        Self { world, players }
    }

    /// One client frame per player, then one server tick
    ///
    /// `inputs[i]` is player i's direction; `deliver(i)` decides whether that
    /// player's input datagram reaches the server.
    fn step(&mut self, inputs: &[(f32, f32)], deliver: impl Fn(usize) -> bool) {
        let now = self.world.now_ms();
        for (i, player) in self.players.iter_mut().enumerate() {
            let (dx, dy) = inputs[i];
            let frame = player.session.frame(now, dx, dy, DT);
            if let Some(outcome) = frame.reconciliation {
                player.reconciliations.push(outcome);
            }
            if deliver(i) {
                self.world.ingest(player.connection, frame.outgoing).unwrap();
            }
        }

        let outbound = self.world.tick();
        let routes: HashMap<ConnectionId, &mpsc::Sender<StateUpdate>> = self
            .players
            .iter()
            .map(|p| (p.connection, &p.updates_tx))
            .collect();
        for datagram in outbound {
            let update = WireCodec::decode(datagram.payload).unwrap();
            routes[&datagram.connection].try_send(update).unwrap();
        }
    }
}

#[test]
fn test_prediction_matches_server_without_loss() {
    let mut harness = Harness::new(1);
    for _ in 0..60 {
        harness.step(&[(1.0, 0.0)], |_| true);
    }

    let player = &harness.players[0];
    assert!(!player.reconciliations.is_empty());
    for outcome in &player.reconciliations {
        match outcome {
            Reconciliation::Applied { correction, .. } => assert!(*correction < 1e-4),
            other => panic!("Unexpected reconciliation: {:?}", other),
        }
    }

    // Confirmed state is exactly the server's state after the acked input
    let confirmed = player.session.predictor().confirmed_state();
    assert_eq!(confirmed.sequence, 59);
    assert_eq!(harness.world.last_applied_sequence(player.connection), Some(60));
}

#[test]
fn test_lost_inputs_corrected_by_reconciliation() {
    let mut harness = Harness::new(1);

    // Every third input never reaches the server
    let mut frame_index = 0;
    for _ in 0..90 {
        let drop_this = frame_index % 3 == 2;
        harness.step(&[(1.0, 0.0)], |_| !drop_this);
        frame_index += 1;
    }

    // A few idle frames let the server catch up on acks
    for _ in 0..5 {
        harness.step(&[(0.0, 0.0)], |_| true);
    }

    let player = &harness.players[0];
    let corrected = player
        .reconciliations
        .iter()
        .any(|r| matches!(r, Reconciliation::Applied { correction, .. } if *correction > 1e-3));
    assert!(corrected, "lost inputs should have caused a visible correction");

    // The baseline always follows the server, never the client's guess
    let confirmed = player.session.predictor().confirmed_state();
    let acked_sequence = harness.world.last_applied_sequence(player.connection).unwrap();
    assert_eq!(confirmed.sequence, acked_sequence - 1);
    assert!(confirmed.position.x < player.session.predictor().current_state().position.x + 1e-3);
}

#[test]
fn test_remote_players_interpolated() {
    let mut harness = Harness::new(2);
    for _ in 0..40 {
        harness.step(&[(1.0, 0.0), (0.0, 1.0)], |_| true);
    }

    let now = harness.world.now_ms();
    let observer = &mut harness.players[1];
    let frame = observer.session.frame(now, 0.0, 0.0, DT);

    let mover = harness.players[0].entity;
    let (entity, state) = frame
        .remotes
        .iter()
        .copied()
        .find(|(id, _)| *id == mover)
        .unwrap();
    assert_eq!(entity, mover);
    assert_eq!(state.mode, RenderMode::Interpolated);

    // Drawn 100ms in the past: behind where the server has it now
    let server_x = harness.world.entity_state(mover).unwrap().position.x;
    assert!(state.position.x > 0.0);
    assert!(state.position.x < server_x);
}

#[test]
fn test_hit_on_rendered_position_confirmed() {
    let mut harness = Harness::new(2);
    for _ in 0..40 {
        harness.step(&[(1.0, 0.0), (0.0, 0.0)], |_| true);
    }

    let target = harness.players[0].entity;
    let now = harness.world.now_ms();
    let shooter = &mut harness.players[1];
    let frame = shooter.session.frame(now, 0.0, 0.0, DT);
    let seen = frame
        .remotes
        .iter()
        .find(|(id, _)| *id == target)
        .map(|(_, state)| state.position)
        .unwrap();

    let connection = shooter.connection;
    let on_seen = shooter.session.claim_hit(target, seen, 0.1);
    let current = harness.world.entity_state(target).unwrap().position;
    let on_current = shooter.session.claim_hit(target, current, 0.1);

    let compensator = harness.world.compensator();
    let history = harness.world.history();

    let request = harness.world.ingest(connection, on_seen).unwrap().unwrap();
    let verdict = compensator
        .validate_hit(&history.read().unwrap(), &request)
        .unwrap();
    assert!(verdict.valid);
    assert_eq!(verdict.compensation_ms, 100);

    // Where the target is now is not what the shooter saw
    let request = harness.world.ingest(connection, on_current).unwrap().unwrap();
    assert!(!compensator.is_valid_hit(&history.read().unwrap(), &request));
}

#[test]
fn test_idle_player_never_corrected() {
    let mut harness = Harness::new(1);
    for _ in 0..20 {
        harness.step(&[(0.0, 0.0)], |_| true);
    }

    let player = &harness.players[0];
    assert_eq!(player.session.predictor().current_state().position, Vec2::ZERO);
    assert!(player
        .reconciliations
        .iter()
        .all(|r| matches!(r, Reconciliation::Applied { correction, .. } if *correction == 0.0)));
}
