/// Integration tests for the task executor
///
/// Every test drives a real scheduler against the simulator with a manual
/// clock. A tick issues at most one primitive; the primitive finishes on the
/// `yield_now` after the tick and its result is collected on the next one.
mod common;

use common::{drain, plant_crop, plant_tree, Harness};
use kestrel_engine::message_bus::Event;
use kestrel_engine::placement::PlacementRecord;
use kestrel_engine::scheduler::TickReport;
use kestrel_engine::task::{TaskSpec, TickStatus};
use sdk::errors::PrimitiveError;
use sdk::{Block, BlockPos, Vec3, WorldView};

fn spec(json: &str) -> TaskSpec {
    TaskSpec::from_json(json).unwrap()
}

#[tokio::test]
async fn test_idle_update_is_a_no_op() {
    let mut h = Harness::new();

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Idle));
    assert_eq!(h.world.goal_changes(), 0);
    assert!(h.world.said().is_empty());
    assert_eq!(h.world.calls("collect"), 0);
}

#[tokio::test]
async fn test_gather_wood_until_amount_reached() {
    let mut h = Harness::new();
    plant_tree(&h.world, BlockPos::new(3, 64, 0), "oak_log");
    h.world.set_respawn_blocks(true);
    let mut events = h.subscribe_all().await;

    let id = h
        .scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood"}"#))
        .await;
    let reports = h.run_until_done(100).await;

    let issued = reports
        .iter()
        .filter(|r| **r == TickReport::Ran(TickStatus::Issued))
        .count();
    assert_eq!(issued, 32);
    assert_eq!(reports.last(), Some(&TickReport::Ran(TickStatus::Completed)));
    assert_eq!(h.world.calls("collect"), 32);
    assert_eq!(h.world.inventory_count("oak_log"), 32);
    assert_eq!(
        h.world.said().last().map(String::as_str),
        Some("wood gathered (32)")
    );
    assert!(!h.scheduler.executor().is_busy());
    assert_eq!(h.world.current_goal(), None);

    let events = drain(&mut events);
    assert!(matches!(&events[0], Event::TaskStarted { task_id, .. } if *task_id == id));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::TaskCompleted { task_id, detail, .. } if *task_id == id && detail == "wood gathered (32)"
    )));
}

#[tokio::test]
async fn test_gather_wood_counts_only_requested_types() {
    let mut h = Harness::new();
    plant_tree(&h.world, BlockPos::new(3, 64, 0), "birch_log");
    h.world.give("oak_log", 20);

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood","types":["birch"],"amount":2}"#))
        .await;
    h.world.set_respawn_blocks(true);
    let reports = h.run_until_done(10).await;

    assert_eq!(reports.last(), Some(&TickReport::Ran(TickStatus::Completed)));
    assert_eq!(h.world.inventory_count("birch_log"), 2);
    assert_eq!(h.world.said().last().map(String::as_str), Some("wood gathered (2)"));
}

#[tokio::test]
async fn test_unsafe_log_is_never_collected() {
    let mut h = Harness::new();
    // No leaves anywhere near: a lone log is part of a build
    h.world.set_block(Block::solid("oak_log", BlockPos::new(3, 64, 0)));

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood","amount":1}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Waiting));
    assert_eq!(h.world.calls("collect"), 0);
    // Nothing to chop, so the task wanders instead
    assert!(h.world.current_goal().is_some());
}

#[tokio::test]
async fn test_wander_while_searching_is_rate_limited() {
    let mut h = Harness::new();
    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Waiting));
    assert_eq!(h.world.goal_changes(), 1);

    assert_eq!(h.tick_after(1_000).await, TickReport::Ran(TickStatus::Waiting));
    assert_eq!(h.world.goal_changes(), 1);

    h.tick_after(11_001).await;
    assert_eq!(h.world.goal_changes(), 2);
}

#[tokio::test]
async fn test_primitive_failure_ends_task() {
    let mut h = Harness::new();
    plant_tree(&h.world, BlockPos::new(3, 64, 0), "oak_log");
    h.world
        .fail_next(PrimitiveError::PathBlocked("no path to (3, 64, 0)".into()));
    let mut events = h.subscribe_all().await;

    let id = h
        .scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Failed));

    assert!(!h.scheduler.executor().is_busy());
    assert_eq!(h.world.current_goal(), None);
    assert_eq!(
        h.world.said().last().map(String::as_str),
        Some("giving up on gather_wood: can't get there, the way is blocked")
    );
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        Event::TaskFailed { task_id, error, .. } if *task_id == id && error.contains("Path blocked")
    )));

    // The failed task is gone for good
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Idle));
}

#[tokio::test]
async fn test_busy_agent_waits() {
    let mut h = Harness::new();
    plant_tree(&h.world, BlockPos::new(3, 64, 0), "oak_log");
    h.world.set_digging(true);

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Waiting));
    assert_eq!(h.world.calls("collect"), 0);

    h.world.set_digging(false);
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
}

#[tokio::test]
async fn test_pending_primitive_reports_waiting() {
    let mut h = Harness::new();
    plant_tree(&h.world, BlockPos::new(3, 64, 0), "oak_log");
    h.world.set_gate_open(false);

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Waiting));
    assert!(h.scheduler.executor().has_in_flight());

    h.world.set_gate_open(true);
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    assert!(!h.scheduler.executor().has_in_flight());
    assert_eq!(h.world.inventory_count("oak_log"), 1);

    // The only log is gone, so the task goes looking for more
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Waiting));
    assert!(h.scheduler.executor().is_busy());
}

#[tokio::test]
async fn test_goal_reached_while_primitive_pending() {
    let mut h = Harness::new();
    plant_tree(&h.world, BlockPos::new(3, 64, 0), "oak_log");
    h.world.set_gate_open(false);

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood","amount":1}"#))
        .await;
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
    assert!(h.scheduler.executor().has_in_flight());

    // A player hands over a log while the collect is still walking
    h.world.give("oak_log", 1);
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Completed));
    assert!(!h.scheduler.executor().is_busy());
    assert!(!h.scheduler.executor().has_in_flight());
    assert_eq!(
        h.world.said().last().map(String::as_str),
        Some("wood gathered (1)")
    );

    // The aborted collect never lands
    h.world.set_gate_open(true);
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.world.calls("collect"), 0);
    assert_eq!(h.world.inventory_count("oak_log"), 1);
}

#[tokio::test]
async fn test_replaced_task_never_completes() {
    let mut h = Harness::new();
    h.world.set_block(Block::solid("stone", BlockPos::new(2, 64, 0)));
    h.world.set_gate_open(false);
    let mut events = h.subscribe_all().await;

    let first = h
        .scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"mine","target":"stone","amount":1}"#))
        .await;
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));

    let second = h
        .scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood"}"#))
        .await;
    h.world.set_gate_open(true);

    for _ in 0..3 {
        h.tick_after(50).await;
    }

    assert_eq!(h.scheduler.executor().active().map(|t| t.id), Some(second));
    assert_eq!(h.world.calls("collect"), 0);
    assert_eq!(h.world.inventory_count("stone"), 0);
    assert_eq!(
        h.world.block_at(BlockPos::new(2, 64, 0)).map(|b| b.name),
        Some("stone".to_string())
    );

    let ended_first = drain(&mut events).into_iter().any(|e| match e {
        Event::TaskCompleted { task_id, .. }
        | Event::TaskFailed { task_id, .. }
        | Event::TaskStopped { task_id, .. } => task_id == first,
        _ => false,
    });
    assert!(!ended_first);
}

#[tokio::test]
async fn test_stop_task_clears_goal_and_publishes() {
    let mut h = Harness::new();
    let mut events = h.subscribe_all().await;

    let id = h
        .scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"gather_wood"}"#))
        .await;
    h.tick().await;
    assert!(h.world.current_goal().is_some());

    h.scheduler.executor_mut().stop_task().await;

    assert!(!h.scheduler.executor().is_busy());
    assert_eq!(h.world.current_goal(), None);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, Event::TaskStopped { task_id, .. } if *task_id == id)));

    // Stopping with nothing active does nothing
    let changes = h.world.goal_changes();
    h.scheduler.executor_mut().stop_task().await;
    assert_eq!(h.world.goal_changes(), changes);
}

#[tokio::test]
async fn test_mine_unknown_item_abandons() {
    let mut h = Harness::new();
    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"mine","target":"unobtainium"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Abandoned));
    assert_eq!(
        h.world.said().last().map(String::as_str),
        Some("what's unobtainium? never heard of it")
    );
    assert!(!h.scheduler.executor().is_busy());
}

#[tokio::test]
async fn test_mine_completes_when_amount_already_carried() {
    let mut h = Harness::new();
    h.world.give("stone", 10);
    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"mine","target":"stone"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Completed));
    assert_eq!(
        h.world.said().last().map(String::as_str),
        Some("got 10 stone, that's enough for now")
    );
}

#[tokio::test]
async fn test_mine_normalises_spoken_names() {
    let mut h = Harness::new();
    h.world.set_block(Block::solid("iron_ore", BlockPos::new(2, 63, 0)));
    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"mine","target":"Iron Ore","amount":1}"#))
        .await;

    let reports = h.run_until_done(5).await;
    assert_eq!(reports.last(), Some(&TickReport::Ran(TickStatus::Completed)));
    assert_eq!(h.world.inventory_count("iron_ore"), 1);
}

#[tokio::test]
async fn test_mine_skips_recorded_placements() {
    let mut h = Harness::new();
    let placed = BlockPos::new(2, 64, 0);
    let natural = BlockPos::new(5, 64, 0);
    h.world.set_block(Block::solid("stone", placed));
    h.world.set_block(Block::solid("stone", natural));
    h.world.ledger().mark(PlacementRecord {
        pos: placed,
        item_name: "stone".into(),
        placed_by: "kestrel".into(),
        timestamp_ms: 0,
    });

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"mine","target":"stone","amount":1}"#))
        .await;
    let reports = h.run_until_done(5).await;

    assert_eq!(reports.last(), Some(&TickReport::Ran(TickStatus::Completed)));
    assert!(h.world.block_at(natural).unwrap().is_air());
    assert_eq!(h.world.block_at(placed).unwrap().name, "stone");
}

#[tokio::test]
async fn test_mine_abandons_when_only_structures_remain() {
    let mut h = Harness::new();
    h.world.set_block(Block::solid("stone", BlockPos::new(2, 64, 0)));
    h.world.set_block(Block::solid("oak_planks", BlockPos::new(2, 65, 0)));

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"mine","target":"stone"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Abandoned));
    assert_eq!(
        h.world.said().last().map(String::as_str),
        Some("no more stone nearby")
    );
    assert_eq!(h.world.calls("collect"), 0);
}

#[tokio::test]
async fn test_safe_mining_off_allows_structure_neighbours() {
    let mut config = common::default_config();
    config.safety.safe_mining = false;
    let mut h = Harness::with_config(&config);
    h.world.set_block(Block::solid("stone", BlockPos::new(2, 64, 0)));
    h.world.set_block(Block::solid("oak_planks", BlockPos::new(2, 65, 0)));

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"mine","target":"stone","amount":1}"#))
        .await;
    let reports = h.run_until_done(5).await;

    assert_eq!(reports.last(), Some(&TickReport::Ran(TickStatus::Completed)));
    assert_eq!(h.world.inventory_count("stone"), 1);
}

#[tokio::test]
async fn test_farm_harvests_mature_crops_and_replants() {
    let mut h = Harness::new();
    let ripe = BlockPos::new(1, 64, 0);
    let green = BlockPos::new(2, 64, 0);
    plant_crop(&h.world, ripe, "wheat", 7);
    plant_crop(&h.world, green, "wheat", 3);

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"farm"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Waiting));

    assert_eq!(h.world.calls("dig"), 1);
    assert_eq!(h.world.inventory_count("wheat"), 1);
    let replanted = h.world.block_at(ripe).unwrap();
    assert_eq!(replanted.name, "wheat");
    assert_eq!(replanted.age(), 0);
    assert_eq!(h.world.block_at(green).unwrap().age(), 3);
    // The dropped seed went back into the ground
    assert_eq!(h.world.inventory_count("wheat_seeds"), 0);
    assert!(h.scheduler.executor().is_busy());
}

#[tokio::test]
async fn test_farm_does_not_replant_off_farmland() {
    let mut h = Harness::new();
    let pos = BlockPos::new(1, 64, 0);
    h.world.set_block(Block::solid("dirt", pos + BlockPos::DOWN));
    h.world
        .set_block(Block::passable("carrots", pos).with_property("age", "7"));

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"farm","crops":["carrots"]}"#))
        .await;
    h.tick().await;
    h.tick().await;

    assert_eq!(h.world.inventory_count("carrot"), 1);
    assert!(h.world.block_at(pos).unwrap().is_air());
    assert_eq!(h.world.calls("place"), 0);
}

#[tokio::test]
async fn test_farm_completes_at_amount() {
    let mut h = Harness::new();
    h.world.give("wheat", 2);
    h.world.give("potato", 1);

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"farm","amount":3}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Completed));
    assert_eq!(
        h.world.said().last().map(String::as_str),
        Some("harvest done (3)")
    );
}

#[tokio::test]
async fn test_farm_rides_out_recoverable_errors() {
    let mut h = Harness::new();
    let pos = BlockPos::new(1, 64, 0);
    plant_crop(&h.world, pos, "beetroots", 3);
    h.world
        .fail_next(PrimitiveError::PathBlocked("fence in the way".into()));

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"farm"}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
    // The failed trip is logged and the crop is tried again
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
    assert_eq!(h.world.inventory_count("beetroot"), 1);
    assert!(h.scheduler.executor().is_busy());
    assert!(h.world.said().is_empty());
}

#[tokio::test]
async fn test_farm_fails_on_disconnect() {
    let mut h = Harness::new();
    plant_crop(&h.world, BlockPos::new(1, 64, 0), "wheat", 7);
    h.world.fail_next(PrimitiveError::Disconnected);

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"farm"}"#))
        .await;

    h.tick().await;
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Failed));
    assert_eq!(
        h.world.said().last().map(String::as_str),
        Some("giving up on farm: lost connection")
    );
}

#[tokio::test]
async fn test_defend_until_all_quiet() {
    let mut h = Harness::new();
    h.world.add_mob("zombie", Vec3::new(3.5, 64.0, 0.5));
    h.world.add_mob("skeleton", Vec3::new(-4.5, 64.0, 0.5));
    // Far outside the default radius
    h.world.add_mob("spider", Vec3::new(40.5, 64.0, 0.5));

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"defend"}"#))
        .await;
    let reports = h.run_until_done(10).await;

    assert_eq!(reports.last(), Some(&TickReport::Ran(TickStatus::Completed)));
    assert_eq!(h.world.calls("attack"), 2);
    assert_eq!(h.world.entities().len(), 1);
    assert_eq!(h.world.said().last().map(String::as_str), Some("all quiet"));
}

#[tokio::test]
async fn test_defend_ignores_target_gone() {
    let mut h = Harness::new();
    h.world.add_mob("zombie", Vec3::new(3.5, 64.0, 0.5));
    h.world
        .fail_next(PrimitiveError::TargetGone("zombie despawned".into()));

    h.scheduler
        .executor_mut()
        .start_task(spec(r#"{"kind":"defend","radius":8}"#))
        .await;

    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Issued));
    assert_eq!(h.tick().await, TickReport::Ran(TickStatus::Completed));
}
