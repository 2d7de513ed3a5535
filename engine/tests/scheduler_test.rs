/// Integration tests for the scheduler loop
///
/// The loop runs on a background task and is fed through the message bus
/// and the command handle, the same way the game adapter drives it.
mod common;

use common::{drain, plant_tree, Harness};
use kestrel_engine::message_bus::{Event, EventType};
use kestrel_engine::scheduler::{Command, TickReport};
use kestrel_engine::skills::SkillError;
use kestrel_engine::task::{TaskSpec, TickStatus};
use sdk::errors::PrimitiveError;
use sdk::{Block, BlockPos, Control, Goal, Vec3, WorldView};
use tokio::sync::oneshot;

/// Let the loop and any primitive it spawned run to completion
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_loop_runs_task_on_bus_ticks() {
    let Harness {
        world,
        clock,
        bus,
        scheduler,
    } = Harness::new();
    plant_tree(&world, BlockPos::new(3, 64, 0), "oak_log");
    world.set_respawn_blocks(true);
    let mut events = bus.subscribe(EventType::TaskCompleted).await;

    let handle = scheduler.start().await;
    let id = handle
        .start_task(TaskSpec::from_json(r#"{"kind":"gather_wood","amount":3}"#).unwrap())
        .await
        .unwrap();

    for _ in 0..10 {
        clock.advance_ms(50);
        bus.publish(Event::Tick).await;
        settle().await;
    }

    let scheduler = handle.stop().await.unwrap();
    assert!(!scheduler.executor().is_busy());
    assert_eq!(world.inventory_count("oak_log"), 3);
    assert_eq!(world.calls("collect"), 3);

    let completed = drain(&mut events);
    assert_eq!(completed.len(), 1);
    assert!(matches!(&completed[0], Event::TaskCompleted { task_id, .. } if *task_id == id));
}

#[tokio::test]
async fn test_loop_ignores_engine_events() {
    let Harness {
        world,
        bus,
        scheduler,
        ..
    } = Harness::new();
    plant_tree(&world, BlockPos::new(3, 64, 0), "oak_log");

    let handle = scheduler.start().await;
    handle
        .start_task(TaskSpec::from_json(r#"{"kind":"gather_wood"}"#).unwrap())
        .await
        .unwrap();

    bus.publish(Event::ReflexFired {
        reflex: "threat".into(),
        detail: "creeper".into(),
    })
    .await;
    settle().await;

    assert_eq!(world.calls("collect"), 0);
    let scheduler = handle.stop().await.unwrap();
    assert!(scheduler.executor().is_busy());
}

#[tokio::test]
async fn test_loop_runs_health_reflex() {
    let Harness {
        world,
        bus,
        scheduler,
        ..
    } = Harness::new();
    world.set_health(4.0);
    world.set_food(6.0);
    world.give_food("bread", 1, 5);

    let handle = scheduler.start().await;
    bus.publish(Event::Health).await;
    settle().await;

    assert_eq!(world.food(), 11.0);
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_loop_threat_reflex_stops_task() {
    let Harness {
        world,
        clock,
        bus,
        scheduler,
    } = Harness::new();
    let mut stopped = bus.subscribe(EventType::TaskStopped).await;

    let handle = scheduler.start().await;
    let id = handle
        .start_task(TaskSpec::from_json(r#"{"kind":"mine","target":"stone"}"#).unwrap())
        .await
        .unwrap();
    world.add_mob("creeper", Vec3::new(1.5, 64.0, 0.5));

    clock.advance_ms(50);
    bus.publish(Event::Tick).await;
    settle().await;

    assert!(world.control_active(Control::Back));
    assert!(world.control_active(Control::Sprint));
    assert!(matches!(
        drain(&mut stopped).as_slice(),
        [Event::TaskStopped { task_id, .. }] if *task_id == id
    ));

    let scheduler = handle.stop().await.unwrap();
    assert!(!scheduler.executor().is_busy());
    assert!(scheduler.reflex().panic().is_some());
}

#[tokio::test]
async fn test_handle_commands() {
    let Harness {
        world, scheduler, ..
    } = Harness::new();
    world.fill_floor("dirt", 63, 5);
    world.give("cobblestone", 1);
    world.give_food("apple", 1, 4);
    world.set_food(10.0);
    world.add_recipe("stick", false);
    let alice = world.add_player("alice", Vec3::new(2.0, 64.0, 0.0));

    let handle = scheduler.start().await;

    let placed = handle
        .place_block("cobblestone", Some(BlockPos::new(1, 64, 1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(placed, BlockPos::new(1, 64, 1));

    handle.craft("stick", 2).await.unwrap().unwrap();
    assert_eq!(world.inventory_count("stick"), 2);

    handle.eat(None).await.unwrap().unwrap();
    assert_eq!(world.food(), 14.0);
    let nothing = handle.eat(None).await.unwrap();
    assert!(matches!(nothing, Err(SkillError::MissingItem(_))));

    handle.follow(Some("alice".into())).await.unwrap();
    settle().await;
    assert_eq!(
        world.current_goal(),
        Some(Goal::Follow {
            entity_id: alice,
            range: 2.0
        })
    );

    handle.wander(Some(8.0)).await.unwrap();
    settle().await;
    assert!(matches!(world.current_goal(), Some(Goal::Near { .. })));

    let scheduler = handle.stop().await.unwrap();
    assert!(scheduler.executor().movement().last_wander_target().is_some());
}

#[tokio::test]
async fn test_stop_task_through_handle() {
    let Harness {
        world, scheduler, ..
    } = Harness::new();

    let handle = scheduler.start().await;
    handle
        .start_task(TaskSpec::from_json(r#"{"kind":"defend"}"#).unwrap())
        .await
        .unwrap();
    handle.stop_task().await.unwrap();

    let scheduler = handle.stop().await.unwrap();
    assert!(!scheduler.executor().is_busy());
    assert_eq!(world.current_goal(), None);
}

#[tokio::test]
async fn test_dropped_handle_aborts_loop() {
    let Harness {
        world,
        clock,
        bus,
        scheduler,
    } = Harness::new();
    world.set_block(Block::solid("stone", BlockPos::new(2, 64, 0)));

    let handle = scheduler.start().await;
    handle
        .start_task(TaskSpec::from_json(r#"{"kind":"mine","target":"stone"}"#).unwrap())
        .await
        .unwrap();
    drop(handle);
    settle().await;

    clock.advance_ms(50);
    bus.publish(Event::Tick).await;
    settle().await;

    assert_eq!(world.calls("collect"), 0);
    assert_eq!(world.block_at(BlockPos::new(2, 64, 0)).unwrap().name, "stone");
}

#[tokio::test]
async fn test_threat_interrupts_pending_skill() {
    let Harness {
        world,
        clock,
        bus,
        scheduler,
    } = Harness::new();
    world.give("cobblestone", 1);
    // Far enough that placing needs a walk, which waits on the gate
    world.set_block(Block::solid("dirt", BlockPos::new(20, 63, 0)));
    world.set_gate_open(false);

    let handle = scheduler.start().await;
    let threat = async {
        settle().await;
        world.add_mob("creeper", Vec3::new(1.5, 64.0, 0.5));
        for _ in 0..5 {
            clock.advance_ms(50);
            bus.publish(Event::Tick).await;
            settle().await;
        }
    };
    let (placed, ()) = tokio::join!(
        handle.place_block("cobblestone", Some(BlockPos::new(20, 64, 0))),
        threat
    );

    assert!(matches!(
        placed.unwrap(),
        Err(SkillError::Primitive(PrimitiveError::Interrupted))
    ));
    assert!(world.control_active(Control::Back));
    assert!(world.control_active(Control::Sprint));

    world.set_gate_open(true);
    settle().await;
    assert!(world.block_at(BlockPos::new(20, 64, 0)).unwrap().is_air());
    assert_eq!(world.inventory_count("cobblestone"), 1);

    let scheduler = handle.stop().await.unwrap();
    assert!(!scheduler.has_pending_skill());
    assert!(scheduler.reflex().panic().is_some());
}

#[tokio::test]
async fn test_pending_skill_holds_the_executor() {
    let mut h = Harness::new();
    plant_tree(&h.world, BlockPos::new(3, 64, 0), "oak_log");
    h.world.fill_floor("dirt", 63, 5);
    h.world.give("cobblestone", 1);
    h.scheduler
        .executor_mut()
        .start_task(TaskSpec::from_json(r#"{"kind":"gather_wood","amount":1}"#).unwrap())
        .await;
    h.world.set_gate_open(false);

    let (reply, mut placed) = oneshot::channel();
    h.scheduler
        .apply(Command::PlaceBlock {
            item: "cobblestone".into(),
            target: Some(BlockPos::new(-1, 64, 0)),
            reply,
        })
        .await;
    assert!(h.scheduler.has_pending_skill());

    assert_eq!(h.tick_after(50).await, TickReport::SkillPending);
    assert_eq!(h.tick_after(50).await, TickReport::SkillPending);
    assert!(h.scheduler.executor().is_busy());
    assert!(!h.scheduler.executor().has_in_flight());

    h.world.set_gate_open(true);
    settle().await;
    assert_eq!(placed.try_recv().unwrap().unwrap(), BlockPos::new(-1, 64, 0));
    assert!(!h.scheduler.has_pending_skill());

    let statuses = h.run_until_done(20).await;
    assert_eq!(
        statuses.last(),
        Some(&TickReport::Ran(TickStatus::Completed))
    );
    assert_eq!(h.world.inventory_count("oak_log"), 1);
}

#[tokio::test]
async fn test_new_skill_replaces_pending_one() {
    let mut h = Harness::new();
    h.world.give("cobblestone", 1);
    h.world.set_block(Block::solid("dirt", BlockPos::new(20, 63, 0)));
    h.world.give_food("bread", 1, 5);
    h.world.set_food(10.0);
    h.world.set_gate_open(false);

    let (reply, mut placed) = oneshot::channel();
    h.scheduler
        .apply(Command::PlaceBlock {
            item: "cobblestone".into(),
            target: Some(BlockPos::new(20, 64, 0)),
            reply,
        })
        .await;
    let (reply, mut ate) = oneshot::channel();
    h.scheduler
        .apply(Command::Eat { item: None, reply })
        .await;
    settle().await;

    assert!(matches!(
        placed.try_recv().unwrap(),
        Err(SkillError::Primitive(PrimitiveError::Interrupted))
    ));
    assert!(ate.try_recv().is_err());

    h.world.set_gate_open(true);
    settle().await;
    ate.try_recv().unwrap().unwrap();
    assert_eq!(h.world.food(), 15.0);
    assert_eq!(h.world.inventory_count("cobblestone"), 1);
}

#[tokio::test]
async fn test_smelt_and_mute_through_handle() {
    let Harness {
        world, scheduler, ..
    } = Harness::new();
    let furnace = BlockPos::new(1, 64, 1);
    world.set_block(Block::solid("furnace", furnace));
    world.give("raw_iron", 2);
    world.give("coal", 2);
    world.add_player("alice", Vec3::new(2.0, 64.0, 0.0));

    let handle = scheduler.start().await;

    handle.smelt("raw_iron", None, 2).await.unwrap().unwrap();
    assert_eq!(world.inventory_count("raw_iron"), 0);
    assert_eq!(world.inventory_count("coal"), 0);
    assert_eq!(
        world.furnace_output(furnace).map(|s| s.count),
        Some(2)
    );

    handle.mute("alice", true).await.unwrap();
    handle.follow(Some("alice".into())).await.unwrap();
    settle().await;
    assert_eq!(world.current_goal(), None);

    handle.mute("alice", false).await.unwrap();
    handle.follow(Some("alice".into())).await.unwrap();
    settle().await;
    assert!(matches!(world.current_goal(), Some(Goal::Follow { .. })));

    let scheduler = handle.stop().await.unwrap();
    assert!(!scheduler.executor().movement().is_muted("alice"));
}
