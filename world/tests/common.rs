//! Collaborators shared by the world integration tests.

#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use perception_core::{
    CellCoord, Command, Entity, Event, GridTopology, GroundTruth, HasWorldPose, ObserverId,
    TargetId, Vec3, VisibilityOracle, VisionParameters, WorldPose,
};
use perception_world::{self as world, World};

pub const CELL: f32 = 100.0;

/// Square-celled grid with optional walls and 4-connected neighbours.
#[derive(Debug)]
pub struct TestGrid {
    pub columns: u32,
    pub rows: u32,
    pub walls: Vec<CellCoord>,
}

impl TestGrid {
    pub fn open(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            rows,
            walls: Vec::new(),
        }
    }

    pub fn shared(self) -> Arc<dyn GridTopology> {
        Arc::new(self)
    }

    pub fn is_wall(&self, cell: CellCoord) -> bool {
        self.walls.contains(&cell)
    }
}

impl GridTopology for TestGrid {
    fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    fn cell_at(&self, position: Vec3) -> Option<CellCoord> {
        if position.x < 0.0 || position.y < 0.0 {
            return None;
        }
        let cell = CellCoord::new((position.x / CELL) as u32, (position.y / CELL) as u32);
        self.in_bounds(cell).then_some(cell)
    }

    fn world_position_of(&self, cell: CellCoord) -> Vec3 {
        centre(cell.column(), cell.row())
    }

    fn is_traversable(&self, cell: CellCoord) -> bool {
        self.in_bounds(cell) && !self.is_wall(cell)
    }

    fn neighbors_of(&self, cell: CellCoord, traversable_only: bool, out: &mut Vec<CellCoord>) {
        let column = i64::from(cell.column());
        let row = i64::from(cell.row());
        for (dc, dr) in [(0, -1), (1, 0), (0, 1), (-1, 0)] {
            let (next_column, next_row) = (column + dc, row + dr);
            if next_column < 0 || next_row < 0 {
                continue;
            }
            let neighbor = CellCoord::new(next_column as u32, next_row as u32);
            if !self.in_bounds(neighbor) || (traversable_only && !self.is_traversable(neighbor)) {
                continue;
            }
            out.push(neighbor);
        }
    }
}

/// World-space centre of a cell on the test grid.
pub fn centre(column: u32, row: u32) -> Vec3 {
    Vec3::new(
        (column as f32 + 0.5) * CELL,
        (row as f32 + 0.5) * CELL,
        0.0,
    )
}

/// Ground truth backed by plain poses the test moves around.
#[derive(Debug, Default)]
pub struct Bodies {
    pub observers: HashMap<ObserverId, WorldPose>,
    pub targets: HashMap<TargetId, WorldPose>,
}

impl GroundTruth for Bodies {
    fn observer_body(&self, observer: ObserverId) -> Option<&dyn HasWorldPose> {
        self.observers
            .get(&observer)
            .map(|pose| pose as &dyn HasWorldPose)
    }

    fn target_body(&self, target: TargetId) -> Option<&dyn HasWorldPose> {
        self.targets.get(&target).map(|pose| pose as &dyn HasWorldPose)
    }
}

/// Oracle whose answers the test sets directly.
#[derive(Clone, Copy, Debug)]
pub struct ScriptedOracle {
    /// Answer for every cell-visibility query.
    pub line_of_sight: bool,
    /// Answer for every awareness raycast.
    pub first_hit: Option<Entity>,
}

impl ScriptedOracle {
    pub fn clear() -> Self {
        Self {
            line_of_sight: true,
            first_hit: None,
        }
    }

    pub fn occluded() -> Self {
        Self {
            line_of_sight: true,
            first_hit: Some(Entity::Geometry),
        }
    }
}

impl VisibilityOracle for ScriptedOracle {
    fn has_line_of_sight(&self, _from: Vec3, _to: Vec3, _ignoring: Entity) -> bool {
        self.line_of_sight
    }

    fn raycast_first_hit(&self, _from: Vec3, _to: Vec3, _ignoring: Entity) -> Option<Entity> {
        self.first_hit
    }
}

/// Oracle that marches along the segment and reports the first wall cell it crosses.
#[derive(Debug)]
pub struct WallOracle<'a> {
    pub grid: &'a TestGrid,
}

impl WallOracle<'_> {
    fn crosses_wall(&self, from: Vec3, to: Vec3) -> bool {
        let length = from.distance(to);
        let samples = (length / (CELL / 10.0)).ceil().max(1.0) as u32;
        (0..=samples).any(|index| {
            let point = from.lerp(to, index as f32 / samples as f32);
            self.grid
                .cell_at(point)
                .is_some_and(|cell| self.grid.is_wall(cell))
        })
    }
}

impl VisibilityOracle for WallOracle<'_> {
    fn has_line_of_sight(&self, from: Vec3, to: Vec3, _ignoring: Entity) -> bool {
        !self.crosses_wall(from, to)
    }

    fn raycast_first_hit(&self, from: Vec3, to: Vec3, _ignoring: Entity) -> Option<Entity> {
        self.crosses_wall(from, to).then_some(Entity::Geometry)
    }
}

pub fn register_observer(
    world: &mut World,
    bodies: &mut Bodies,
    id: u32,
    pose: WorldPose,
    vision: VisionParameters,
) -> ObserverId {
    let observer = ObserverId::new(id);
    let mut events = Vec::new();
    world::apply(
        world,
        Command::RegisterObserver { observer, vision },
        &mut events,
    );
    assert_eq!(events, vec![Event::ObserverRegistered { observer }]);
    let _ = bodies.observers.insert(observer, pose);
    observer
}

pub fn register_target(
    world: &mut World,
    bodies: &mut Bodies,
    id: u128,
    pose: WorldPose,
) -> TargetId {
    let target = TargetId::new(id);
    let mut events = Vec::new();
    world::apply(world, Command::RegisterTarget { target }, &mut events);
    assert_eq!(events, vec![Event::TargetRegistered { target }]);
    let _ = bodies.targets.insert(target, pose);
    target
}

pub fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}
