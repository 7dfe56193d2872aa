mod common;

use common::{
    assert_close, centre, register_observer, register_target, Bodies, ScriptedOracle, TestGrid,
    WallOracle,
};
use perception_core::{
    CellCoord, Command, Event, ObserverId, TargetId, TargetStatus, Vec3, VisionParameters,
    WorldPose,
};
use perception_world::{self as world, query, World};

struct Scene {
    world: World,
    bodies: Bodies,
    observer: ObserverId,
    target: TargetId,
}

impl Scene {
    /// Observer on the west edge of a 10x10 grid looking east at a target in cell (5, 5).
    fn corridor(max_distance: f32) -> Self {
        let mut world = World::with_grid(TestGrid::open(10, 10).shared());
        let mut bodies = Bodies::default();
        let vision = VisionParameters::new(90.0, max_distance).expect("valid vision");
        let observer = register_observer(
            &mut world,
            &mut bodies,
            1,
            WorldPose::at(centre(0, 5), Vec3::X),
            vision,
        );
        let target = register_target(
            &mut world,
            &mut bodies,
            0xfeed,
            WorldPose::at(centre(5, 5), Vec3::NEG_X),
        );
        Self {
            world,
            bodies,
            observer,
            target,
        }
    }

    fn step(&mut self, oracle: ScriptedOracle) -> Vec<Event> {
        let mut events = Vec::new();
        world::step(&mut self.world, &self.bodies, &oracle, &mut events);
        events
    }

    fn run(&mut self, steps: usize, oracle: ScriptedOracle) -> Vec<Event> {
        let mut events = Vec::new();
        for _ in 0..steps {
            events.extend(self.step(oracle));
        }
        events
    }

    fn awareness(&self) -> f32 {
        query::target_data(&self.world, self.observer, self.target)
            .expect("entry exists")
            .awareness
    }

    fn status(&self) -> TargetStatus {
        query::target_status(&self.world, self.target).expect("target registered")
    }

    fn belief_at(&self, column: u32, row: u32) -> f32 {
        query::belief(&self.world, self.target)
            .expect("grid bound")
            .value(CellCoord::new(column, row))
    }
}

#[test]
fn awareness_rises_by_gain_until_saturated() {
    let mut scene = Scene::corridor(1000.0);

    for step in 1..=12 {
        let _ = scene.step(ScriptedOracle::clear());
        let expected = (0.1 * step as f32).min(1.0);
        assert_close(scene.awareness(), expected);
        assert!(scene.awareness() <= 1.0);
    }

    let entry = query::target_data(&scene.world, scene.observer, scene.target).expect("entry");
    assert!(entry.has_clear_line_of_sight);
}

#[test]
fn awareness_decays_once_sight_is_lost() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(10, ScriptedOracle::clear());
    assert_close(scene.awareness(), 1.0);

    for step in 1..=25 {
        let _ = scene.step(ScriptedOracle::occluded());
        let expected = (1.0 - 0.05 * step as f32).max(0.0);
        assert_close(scene.awareness(), expected);
        assert!(scene.awareness() >= 0.0);
    }

    let entry = query::target_data(&scene.world, scene.observer, scene.target).expect("entry");
    assert!(!entry.has_clear_line_of_sight);
}

#[test]
fn target_becomes_immediate_on_the_tenth_clear_step() {
    let mut scene = Scene::corridor(1000.0);

    let events = scene.run(9, ScriptedOracle::clear());
    assert_eq!(scene.status(), TargetStatus::Unknown);
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::TargetStatusChanged { .. })));

    let events = scene.step(ScriptedOracle::clear());
    assert_eq!(scene.status(), TargetStatus::Immediate);
    assert!(events.contains(&Event::TargetStatusChanged {
        target: scene.target,
        from: TargetStatus::Unknown,
        to: TargetStatus::Immediate,
    }));
    let cache = query::target_cache(&scene.world, scene.target).expect("cache");
    assert_eq!(cache.position, centre(5, 5));
}

#[test]
fn target_short_of_threshold_stays_unknown() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(9, ScriptedOracle::clear());
    let _ = scene.run(20, ScriptedOracle::occluded());

    assert_eq!(scene.status(), TargetStatus::Unknown);
    assert_eq!(scene.awareness(), 0.0);
    assert_eq!(
        query::belief(&scene.world, scene.target)
            .expect("grid bound")
            .total_mass(),
        0.0,
        "unknown targets never receive belief mass"
    );
}

#[test]
fn known_target_never_returns_to_unknown() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(10, ScriptedOracle::clear());

    for _ in 0..40 {
        let events = scene.step(ScriptedOracle::occluded());
        assert_eq!(scene.status(), TargetStatus::Hidden);
        assert!(!events.iter().any(|event| matches!(
            event,
            Event::TargetStatusChanged {
                to: TargetStatus::Unknown,
                ..
            }
        )));
    }

    let _ = scene.run(20, ScriptedOracle::clear());
    assert_eq!(scene.status(), TargetStatus::Immediate);
}

#[test]
fn belief_collapses_and_diffuses_on_the_step_target_becomes_immediate() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(10, ScriptedOracle::clear());

    assert_close(scene.belief_at(5, 5), 0.9);
    for (column, row) in [(5, 4), (6, 5), (5, 6), (4, 5)] {
        assert_close(scene.belief_at(column, row), 0.025);
    }
    assert_close(
        query::belief(&scene.world, scene.target)
            .expect("grid bound")
            .total_mass(),
        1.0,
    );
}

#[test]
fn immediate_target_recollapses_every_step() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(10, ScriptedOracle::clear());

    let moved = centre(7, 2);
    scene
        .bodies
        .targets
        .insert(scene.target, WorldPose::at(moved, Vec3::X))
        .expect("target body present");
    let _ = scene.step(ScriptedOracle::clear());

    assert_close(scene.belief_at(7, 2), 0.9);
    assert_eq!(scene.belief_at(5, 5), 0.0);
    let cache = query::target_cache(&scene.world, scene.target).expect("cache");
    assert_eq!(cache.position, moved);
}

#[test]
fn hidden_target_with_fully_visible_belief_is_cleared() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(10, ScriptedOracle::clear());

    let events = scene.step(ScriptedOracle::occluded());

    assert_eq!(scene.status(), TargetStatus::Hidden);
    assert!(events.contains(&Event::TargetStatusChanged {
        target: scene.target,
        from: TargetStatus::Immediate,
        to: TargetStatus::Hidden,
    }));
    assert!(events.contains(&Event::BeliefCleared {
        target: scene.target
    }));
    assert_eq!(
        query::belief(&scene.world, scene.target)
            .expect("grid bound")
            .total_mass(),
        0.0
    );
    let cache = query::target_cache(&scene.world, scene.target).expect("cache");
    assert_eq!(cache.position, centre(5, 5), "last position is kept");
}

#[test]
fn hidden_target_renormalises_onto_unseen_cells() {
    // Cell (6, 5) lies 600 units away, just beyond the observer's reach.
    let mut scene = Scene::corridor(520.0);
    let _ = scene.run(10, ScriptedOracle::clear());
    assert_eq!(scene.status(), TargetStatus::Immediate);

    let events = scene.step(ScriptedOracle::occluded());

    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::BeliefCleared { .. })));
    let cache = query::target_cache(&scene.world, scene.target).expect("cache");
    assert_eq!(cache.position, centre(6, 5));

    // Pruned onto (6, 5) then diffused once.
    assert_close(scene.belief_at(6, 5), 0.9);
    for (column, row) in [(6, 4), (7, 5), (6, 6), (5, 5)] {
        assert_close(scene.belief_at(column, row), 0.025);
    }
    assert_close(
        query::belief(&scene.world, scene.target)
            .expect("grid bound")
            .total_mass(),
        1.0,
    );
}

#[test]
fn walls_block_awareness_raycasts() {
    let grid = TestGrid {
        columns: 10,
        rows: 10,
        walls: (0..10).map(|row| CellCoord::new(3, row)).collect(),
    };
    let oracle = WallOracle { grid: &grid };
    let mut world = World::with_grid(TestGrid {
        columns: 10,
        rows: 10,
        walls: grid.walls.clone(),
    }
    .shared());
    let mut bodies = Bodies::default();
    let _ = register_observer(
        &mut world,
        &mut bodies,
        1,
        WorldPose::at(centre(0, 5), Vec3::X),
        VisionParameters::default(),
    );
    let target = register_target(
        &mut world,
        &mut bodies,
        1,
        WorldPose::at(centre(5, 5), Vec3::NEG_X),
    );

    // The wall blocks the raycast so awareness never builds.
    let mut events = Vec::new();
    for _ in 0..15 {
        world::step(&mut world, &bodies, &oracle, &mut events);
    }
    assert_eq!(
        query::target_status(&world, target),
        Some(TargetStatus::Unknown)
    );
}

#[test]
fn walls_shelter_belief_from_the_visibility_pass() {
    let walls: Vec<_> = (3..=7).map(|row| CellCoord::new(6, row)).collect();
    let grid = TestGrid {
        columns: 10,
        rows: 10,
        walls: walls.clone(),
    };
    let oracle = WallOracle { grid: &grid };
    let mut world = World::with_grid(
        TestGrid {
            columns: 10,
            rows: 10,
            walls,
        }
        .shared(),
    );
    let mut bodies = Bodies::default();
    let _ = register_observer(
        &mut world,
        &mut bodies,
        1,
        WorldPose::at(centre(0, 5), Vec3::X),
        VisionParameters::default(),
    );
    let target = register_target(
        &mut world,
        &mut bodies,
        1,
        WorldPose::at(centre(8, 5), Vec3::NEG_X),
    );

    let mut events = Vec::new();
    for _ in 0..10 {
        world::step(&mut world, &bodies, &ScriptedOracle::clear(), &mut events);
    }
    assert_eq!(
        query::target_status(&world, target),
        Some(TargetStatus::Immediate)
    );

    // From here on the wall stands between the observer and every cell near the target.
    events.clear();
    for _ in 0..5 {
        world::step(&mut world, &bodies, &oracle, &mut events);
    }

    assert_eq!(
        query::target_status(&world, target),
        Some(TargetStatus::Hidden)
    );
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::BeliefCleared { .. })));

    let belief = query::belief(&world, target).expect("grid bound");
    assert_close(belief.total_mass(), 1.0);
    assert!(belief.value(CellCoord::new(8, 5)) > 0.3);
    assert_eq!(belief.value(CellCoord::new(3, 5)), 0.0);
    assert_eq!(
        query::target_cache(&world, target).expect("cache").position,
        centre(8, 5)
    );
}

#[test]
fn awareness_is_complete_before_any_target_is_evaluated() {
    let mut world = World::with_grid(TestGrid::open(10, 10).shared());
    let mut bodies = Bodies::default();
    let west = register_observer(
        &mut world,
        &mut bodies,
        1,
        WorldPose::at(centre(0, 5), Vec3::X),
        VisionParameters::default(),
    );
    let east = register_observer(
        &mut world,
        &mut bodies,
        2,
        WorldPose::at(centre(9, 5), Vec3::NEG_X),
        VisionParameters::default(),
    );
    let first = register_target(
        &mut world,
        &mut bodies,
        10,
        WorldPose::at(centre(4, 5), Vec3::X),
    );
    let second = register_target(
        &mut world,
        &mut bodies,
        11,
        WorldPose::at(centre(5, 5), Vec3::X),
    );
    let oracle = ScriptedOracle::clear();

    let mut events = Vec::new();
    for _ in 0..9 {
        world::step(&mut world, &bodies, &oracle, &mut events);
    }

    events.clear();
    world::advance_awareness(&mut world, &bodies, &oracle, &mut events);
    assert_eq!(events, vec![Event::AwarenessPassCompleted { evaluated: 4 }]);
    for observer in [west, east] {
        for target in [first, second] {
            let entry = query::target_data(&world, observer, target).expect("entry");
            assert_close(entry.awareness, 1.0);
        }
    }
    assert_eq!(
        query::target_status(&world, first),
        Some(TargetStatus::Unknown),
        "status waits for the second phase"
    );
    assert_eq!(query::step_index(&world), 9);

    events.clear();
    world::advance_target_states(&mut world, &bodies, &oracle, &mut events);
    assert_eq!(
        query::target_status(&world, first),
        Some(TargetStatus::Immediate)
    );
    assert_eq!(
        query::target_status(&world, second),
        Some(TargetStatus::Immediate)
    );
    assert_eq!(query::step_index(&world), 10);
}

#[test]
fn missing_bodies_are_skipped_for_the_step() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(3, ScriptedOracle::clear());
    let observer_pose = scene
        .bodies
        .observers
        .remove(&scene.observer)
        .expect("observer body present");

    let events = scene.step(ScriptedOracle::clear());
    assert!(events.contains(&Event::AwarenessPassCompleted { evaluated: 0 }));
    assert_close(scene.awareness(), 0.3);

    let _ = scene.bodies.observers.insert(scene.observer, observer_pose);
    let _ = scene.bodies.targets.remove(&scene.target);
    let events = scene.step(ScriptedOracle::clear());
    assert!(events.contains(&Event::AwarenessPassCompleted { evaluated: 0 }));
    assert_close(scene.awareness(), 0.3);
}

#[test]
fn missing_target_body_still_creates_an_entry() {
    let mut world = World::new();
    let mut bodies = Bodies::default();
    let observer = register_observer(
        &mut world,
        &mut bodies,
        1,
        WorldPose::at(Vec3::ZERO, Vec3::X),
        VisionParameters::default(),
    );
    let target = TargetId::new(42);
    let mut events = Vec::new();
    world::apply(&mut world, Command::RegisterTarget { target }, &mut events);

    world::step(&mut world, &bodies, &ScriptedOracle::clear(), &mut events);

    let entry = query::target_data(&world, observer, target).expect("entry created");
    assert_eq!(entry.awareness, 0.0);
    assert!(!entry.has_clear_line_of_sight);
}

#[test]
fn current_target_reports_first_target_once_known() {
    let mut scene = Scene::corridor(1000.0);
    let second = register_target(
        &mut scene.world,
        &mut scene.bodies,
        0xbeef,
        WorldPose::at(centre(1, 9), Vec3::X),
    );

    assert_eq!(query::current_target(&scene.world, scene.observer), None);
    assert!(!query::has_target(&scene.world, scene.observer));
    assert!(query::current_target_state(&scene.world, scene.observer).is_none());

    let _ = scene.run(10, ScriptedOracle::clear());

    assert_eq!(
        query::current_target(&scene.world, scene.observer),
        Some(scene.target)
    );
    assert!(query::has_target(&scene.world, scene.observer));
    let (cache, awareness) =
        query::current_target_state(&scene.world, scene.observer).expect("current state");
    assert_eq!(cache.status, TargetStatus::Immediate);
    assert_close(awareness.awareness, 1.0);

    // (150, 950) sits outside the 45 degree half-angle so it stays unknown.
    assert_eq!(
        query::target_status(&scene.world, second),
        Some(TargetStatus::Unknown)
    );
    assert_eq!(
        query::all_target_states(&scene.world, scene.observer, false).len(),
        2
    );
    let known = query::all_target_states(&scene.world, scene.observer, true);
    assert_eq!(known.len(), 1);
    assert_eq!(known[0].0.status, TargetStatus::Immediate);

    assert_eq!(
        query::current_target(&scene.world, ObserverId::new(99)),
        None
    );
    assert!(query::all_target_states(&scene.world, ObserverId::new(99), false).is_empty());
}

#[test]
fn unregistering_a_target_drops_awareness() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(2, ScriptedOracle::clear());
    assert!(query::target_data(&scene.world, scene.observer, scene.target).is_some());

    let mut events = Vec::new();
    world::apply(
        &mut scene.world,
        Command::UnregisterTarget {
            target: scene.target,
        },
        &mut events,
    );

    assert_eq!(
        events,
        vec![Event::TargetUnregistered {
            target: scene.target
        }]
    );
    assert!(query::target_data(&scene.world, scene.observer, scene.target).is_none());
    assert!(query::target_status(&scene.world, scene.target).is_none());
    assert_eq!(query::current_target(&scene.world, scene.observer), None);
}

#[test]
fn unregistering_an_observer_removes_its_ledger() {
    let mut scene = Scene::corridor(1000.0);
    let _ = scene.run(2, ScriptedOracle::clear());

    let mut events = Vec::new();
    world::apply(
        &mut scene.world,
        Command::UnregisterObserver {
            observer: scene.observer,
        },
        &mut events,
    );

    assert_eq!(
        events,
        vec![Event::ObserverUnregistered {
            observer: scene.observer
        }]
    );
    assert!(query::target_data(&scene.world, scene.observer, scene.target).is_none());
    assert_eq!(query::observers(&scene.world).count(), 0);
}

#[test]
fn immediate_target_off_grid_keeps_an_empty_belief() {
    let mut world = World::with_grid(TestGrid::open(10, 10).shared());
    let mut bodies = Bodies::default();
    let observer = register_observer(
        &mut world,
        &mut bodies,
        1,
        WorldPose::at(Vec3::new(-500.0, 550.0, 0.0), Vec3::X),
        VisionParameters::default(),
    );
    let outside = Vec3::new(-50.0, 550.0, 0.0);
    let target = register_target(
        &mut world,
        &mut bodies,
        3,
        WorldPose::at(outside, Vec3::X),
    );

    let mut events = Vec::new();
    for _ in 0..10 {
        world::step(&mut world, &bodies, &ScriptedOracle::clear(), &mut events);
    }

    assert_eq!(
        query::target_status(&world, target),
        Some(TargetStatus::Immediate)
    );
    assert_eq!(query::current_target(&world, observer), Some(target));
    let cache = query::target_cache(&world, target).expect("cache");
    assert_eq!(cache.position, outside);
    assert_eq!(
        query::belief(&world, target).expect("grid bound").total_mass(),
        0.0
    );
}

#[test]
fn gridless_world_tracks_status_without_belief() {
    let mut world = World::new();
    let mut bodies = Bodies::default();
    let _ = register_observer(
        &mut world,
        &mut bodies,
        1,
        WorldPose::at(centre(0, 5), Vec3::X),
        VisionParameters::default(),
    );
    let target = register_target(
        &mut world,
        &mut bodies,
        5,
        WorldPose::at(centre(5, 5), Vec3::X),
    );

    let mut events = Vec::new();
    for _ in 0..10 {
        world::step(&mut world, &bodies, &ScriptedOracle::clear(), &mut events);
    }
    world::step(&mut world, &bodies, &ScriptedOracle::occluded(), &mut events);

    assert_eq!(
        query::target_status(&world, target),
        Some(TargetStatus::Hidden)
    );
    assert!(query::belief(&world, target).is_none());
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::BeliefCleared { .. })));
}

#[test]
fn rejected_tuning_keeps_belief_mass_non_negative() {
    let mut scene = Scene::corridor(1000.0);
    let mut events = Vec::new();
    world::apply(
        &mut scene.world,
        Command::ConfigureTuning {
            tuning: perception_core::PerceptionTuning {
                diffusion_spread: 1.5,
                ..perception_core::PerceptionTuning::default()
            },
        },
        &mut events,
    );
    assert_eq!(
        events,
        vec![Event::TuningRejected {
            reason: perception_core::TuningError::DiffusionSpread,
        }]
    );

    let _ = scene.run(10, ScriptedOracle::clear());

    assert_eq!(scene.status(), TargetStatus::Immediate);
    assert_close(scene.belief_at(5, 5), 0.9);
    for column in 0..10 {
        for row in 0..10 {
            assert!(scene.belief_at(column, row) >= 0.0);
        }
    }
}

#[test]
fn reconfigured_gain_speeds_up_detection() {
    let mut scene = Scene::corridor(1000.0);
    let mut events = Vec::new();
    world::apply(
        &mut scene.world,
        Command::ConfigureTuning {
            tuning: perception_core::PerceptionTuning {
                awareness_gain: 0.5,
                ..perception_core::PerceptionTuning::default()
            },
        },
        &mut events,
    );

    let _ = scene.run(2, ScriptedOracle::clear());

    assert_eq!(scene.status(), TargetStatus::Immediate);
}
