//! Hit validation running concurrently with the tick loop

use std::sync::Arc;
use std::time::Duration;

use tickshift::protocol::{ConnectionId, Vec2};
use tickshift::server::ServerWorld;
use tickshift::simulation::{EntityState, EulerMovement, HitRequest, RewindError};
use tokio::sync::Mutex;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_validation_tasks_read_while_ticking() {
    let mut world = ServerWorld::new(EulerMovement::default());
    let shooter = world.connect(ConnectionId::new_v4());
    let target = world.spawn_entity(Vec2::ZERO);
    world.set_entity_state(
        target,
        EntityState {
            position: Vec2::new(0.0, 0.0),
            velocity: Vec2::ZERO,
        },
    );
    for _ in 0..20 {
        world.tick();
    }

    let history = world.history();
    let compensator = world.compensator();
    let world = Arc::new(Mutex::new(world));

    // Writer: keeps ticking while validators read
    let ticker = {
        let world = Arc::clone(&world);
        tokio::spawn(async move {
            for _ in 0..50 {
                world.lock().await.tick();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut validators = Vec::new();
    for i in 0..64u64 {
        let history = Arc::clone(&history);
        validators.push(tokio::spawn(async move {
            let request = HitRequest {
                shooter_id: shooter,
                target_id: target,
                claimed_position: Vec2::ZERO,
                shooter_latency: Duration::from_millis(i * 10),
                hit_radius: 0.5,
            };
            let history = history.read().unwrap();
            compensator.validate_hit(&history, &request)
        }));
    }

    for validator in validators {
        let verdict = validator.await.unwrap().unwrap();
        assert!(verdict.valid);
    }
    ticker.await.unwrap();

    assert_eq!(world.lock().await.current_tick(), 70);
    assert_eq!(history.read().unwrap().len(), 70);
}

#[tokio::test]
async fn test_stale_claim_rejected_after_eviction() {
    let mut world = ServerWorld::new(EulerMovement::default());
    let shooter = world.connect(ConnectionId::new_v4());
    let target = world.spawn_entity(Vec2::new(1.0, 1.0));

    // 400 ticks at 20Hz; only the last 150 (7.45s) are retained
    for _ in 0..400 {
        world.tick();
    }

    let request = HitRequest {
        shooter_id: shooter,
        target_id: target,
        claimed_position: Vec2::new(1.0, 1.0),
        shooter_latency: Duration::from_millis(8_000),
        hit_radius: 0.5,
    };

    let history = world.history();
    let history = history.read().unwrap();
    let compensator = world.compensator();
    assert!(matches!(
        compensator.validate_hit(&history, &request),
        Err(RewindError::StaleReference { .. })
    ));
    assert!(!compensator.is_valid_hit(&history, &request));
}
