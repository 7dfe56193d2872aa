//! Tile grid, scripted bodies and raycasting that back the perception world.

use std::collections::BTreeMap;

use glam::Quat;
use perception_core::{
    CellCoord, Entity, GridTopology, GroundTruth, HasWorldPose, ObserverId, TargetId, Vec3,
    VisibilityOracle, WorldPose,
};
use perception_system_belief::OccupancyBelief;

use crate::scenario::{Scenario, ScenarioError};

const WALL: char = '#';
const FLOOR: char = '.';

/// Fraction of a cell edge used as the radius of every body.
const BODY_RADIUS_FRACTION: f32 = 0.25;

/// Number of raycast samples taken per cell edge travelled.
const SAMPLES_PER_CELL: f32 = 8.0;

/// Rectangular tile grid parsed from rows of `.` (floor) and `#` (wall).
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AsciiGrid {
    columns: u32,
    rows: u32,
    cell_size: f32,
    walls: Vec<bool>,
}

impl AsciiGrid {
    /// Parses the grid rows; row zero lies at the smallest y coordinate.
    pub(crate) fn from_rows(rows: &[String], cell_size: f32) -> Result<Self, ScenarioError> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(ScenarioError::InvalidCellSize(cell_size));
        }

        let expected = rows.first().map_or(0, |row| row.chars().count());
        if expected == 0 {
            return Err(ScenarioError::EmptyGrid);
        }
        let columns = to_u32(expected);

        let mut walls = Vec::with_capacity(expected * rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let found = row.chars().count();
            if found != expected {
                return Err(ScenarioError::RaggedRow {
                    row: to_u32(row_index),
                    expected: columns,
                    found: to_u32(found),
                });
            }

            for (column_index, tile) in row.chars().enumerate() {
                match tile {
                    WALL => walls.push(true),
                    FLOOR => walls.push(false),
                    other => {
                        return Err(ScenarioError::UnknownTile {
                            column: to_u32(column_index),
                            row: to_u32(row_index),
                            tile: other,
                        })
                    }
                }
            }
        }

        Ok(Self {
            columns,
            rows: to_u32(rows.len()),
            cell_size,
            walls,
        })
    }

    /// Edge length of a cell in world units.
    pub(crate) fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Reports whether the cell is a wall tile.
    pub(crate) fn is_wall(&self, cell: CellCoord) -> bool {
        self.index(cell)
            .and_then(|index| self.walls.get(index).copied())
            .unwrap_or(false)
    }

    /// Draws the belief as rows of text: walls as `#`, empty cells as `.`
    /// and occupied cells as `1`..`9` relative to the most likely cell.
    pub(crate) fn render_belief(&self, belief: &OccupancyBelief) -> String {
        let peak = belief
            .cells()
            .iter()
            .copied()
            .fold(0.0_f32, f32::max);

        let mut out = String::new();
        for row in 0..self.rows {
            for column in 0..self.columns {
                let cell = CellCoord::new(column, row);
                let mass = belief.value(cell);
                let glyph = if self.is_wall(cell) {
                    WALL
                } else if mass <= 0.0 || peak <= 0.0 {
                    FLOOR
                } else {
                    let level = ((mass / peak) * 9.0).ceil().clamp(1.0, 9.0) as u32;
                    char::from_digit(level, 10).unwrap_or(FLOOR)
                };
                out.push(glyph);
            }
            out.push('\n');
        }
        out
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.in_bounds(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl GridTopology for AsciiGrid {
    fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    fn cell_at(&self, position: Vec3) -> Option<CellCoord> {
        if !position.x.is_finite() || !position.y.is_finite() {
            return None;
        }
        if position.x < 0.0 || position.y < 0.0 {
            return None;
        }

        let column = (position.x / self.cell_size).floor();
        let row = (position.y / self.cell_size).floor();
        if column >= self.columns as f32 || row >= self.rows as f32 {
            return None;
        }

        Some(CellCoord::new(column as u32, row as u32))
    }

    fn world_position_of(&self, cell: CellCoord) -> Vec3 {
        Vec3::new(
            (cell.column() as f32 + 0.5) * self.cell_size,
            (cell.row() as f32 + 0.5) * self.cell_size,
            0.0,
        )
    }

    fn is_traversable(&self, cell: CellCoord) -> bool {
        self.in_bounds(cell) && !self.is_wall(cell)
    }

    fn neighbors_of(&self, cell: CellCoord, traversable_only: bool, out: &mut Vec<CellCoord>) {
        let column = cell.column();
        let row = cell.row();
        let candidates = [
            row.checked_sub(1).map(|north| CellCoord::new(column, north)),
            column.checked_add(1).map(|east| CellCoord::new(east, row)),
            row.checked_add(1).map(|south| CellCoord::new(column, south)),
            column.checked_sub(1).map(|west| CellCoord::new(west, row)),
        ];

        for neighbor in candidates.into_iter().flatten() {
            if !self.in_bounds(neighbor) {
                continue;
            }
            if traversable_only && !self.is_traversable(neighbor) {
                continue;
            }
            out.push(neighbor);
        }
    }
}

#[derive(Clone, Debug)]
struct ObserverActor {
    pose: WorldPose,
    turn: Quat,
}

impl ObserverActor {
    fn advance(&mut self) {
        self.pose.forward = (self.turn * self.pose.forward).normalize_or_zero();
    }
}

#[derive(Clone, Debug)]
struct TargetActor {
    pose: WorldPose,
    speed: f32,
    waypoints: Vec<Vec3>,
    next: usize,
    looping: bool,
}

impl TargetActor {
    fn advance(&mut self) {
        let previous = self.pose.position;

        if let Some(goal) = self.waypoints.get(self.next).copied() {
            let offset = goal - previous;
            let distance = offset.length();
            if distance <= self.speed {
                self.pose.position = goal;
                self.next += 1;
                if self.looping && self.next >= self.waypoints.len() {
                    self.next = 0;
                }
            } else {
                self.pose.position = previous + offset / distance * self.speed;
            }
        }

        self.pose.velocity = self.pose.position - previous;
        if self.pose.velocity != Vec3::ZERO {
            self.pose.forward = self.pose.velocity.normalize_or_zero();
        }
    }
}

/// Ground truth for every scripted body in a scenario.
#[derive(Clone, Debug)]
pub(crate) struct Actors {
    observers: BTreeMap<ObserverId, ObserverActor>,
    targets: BTreeMap<TargetId, TargetActor>,
}

impl Actors {
    /// Places every body at its scripted starting pose.
    pub(crate) fn from_scenario(scenario: &Scenario) -> Self {
        let observers = scenario
            .observers
            .iter()
            .map(|script| {
                let facing = script.facing_degrees.to_radians();
                let forward = Vec3::new(facing.cos(), facing.sin(), 0.0);
                let actor = ObserverActor {
                    pose: WorldPose::at(script.position, forward),
                    turn: Quat::from_rotation_z(script.turn_rate.to_radians()),
                };
                (script.id, actor)
            })
            .collect();

        let targets = scenario
            .targets
            .iter()
            .map(|script| {
                let start = script.waypoints.first().copied().unwrap_or(Vec3::ZERO);
                let next = if script.looping && script.waypoints.len() <= 1 {
                    0
                } else {
                    1
                };
                let actor = TargetActor {
                    pose: WorldPose::at(start, Vec3::X),
                    speed: script.speed,
                    waypoints: script.waypoints.clone(),
                    next,
                    looping: script.looping,
                };
                (script.id, actor)
            })
            .collect();

        Self {
            observers,
            targets,
        }
    }

    /// Moves every body one step along its script.
    pub(crate) fn advance(&mut self) {
        for observer in self.observers.values_mut() {
            observer.advance();
        }
        for target in self.targets.values_mut() {
            target.advance();
        }
    }

    fn bodies(&self) -> impl Iterator<Item = (Entity, Vec3)> + '_ {
        let observers = self
            .observers
            .iter()
            .map(|(id, actor)| (Entity::Observer(*id), actor.pose.position));
        let targets = self
            .targets
            .iter()
            .map(|(id, actor)| (Entity::Target(*id), actor.pose.position));
        observers.chain(targets)
    }
}

impl GroundTruth for Actors {
    fn observer_body(&self, observer: ObserverId) -> Option<&dyn HasWorldPose> {
        self.observers
            .get(&observer)
            .map(|actor| &actor.pose as &dyn HasWorldPose)
    }

    fn target_body(&self, target: TargetId) -> Option<&dyn HasWorldPose> {
        self.targets
            .get(&target)
            .map(|actor| &actor.pose as &dyn HasWorldPose)
    }
}

/// Line-of-sight oracle that marches along segments through the tile grid.
///
/// Walls block every query. Bodies only register as raycast hits; they never
/// hide grid cells from each other.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GridRaycaster<'a> {
    grid: &'a AsciiGrid,
    actors: &'a Actors,
}

impl<'a> GridRaycaster<'a> {
    /// Creates an oracle over the grid's walls and the actors' bodies.
    pub(crate) fn new(grid: &'a AsciiGrid, actors: &'a Actors) -> Self {
        Self { grid, actors }
    }

    fn samples(&self, from: Vec3, to: Vec3) -> impl Iterator<Item = Vec3> {
        let steps = (from.distance(to) / self.grid.cell_size() * SAMPLES_PER_CELL)
            .ceil()
            .max(1.0) as u32;
        (0..=steps).map(move |step| from.lerp(to, step as f32 / steps as f32))
    }

    fn hits_wall(&self, point: Vec3) -> bool {
        self.grid
            .cell_at(point)
            .is_some_and(|cell| self.grid.is_wall(cell))
    }
}

impl VisibilityOracle for GridRaycaster<'_> {
    fn has_line_of_sight(&self, from: Vec3, to: Vec3, _ignoring: Entity) -> bool {
        !self.samples(from, to).any(|point| self.hits_wall(point))
    }

    fn raycast_first_hit(&self, from: Vec3, to: Vec3, ignoring: Entity) -> Option<Entity> {
        let radius = self.grid.cell_size() * BODY_RADIUS_FRACTION;
        for point in self.samples(from, to) {
            if self.hits_wall(point) {
                return Some(Entity::Geometry);
            }
            let body = self
                .actors
                .bodies()
                .filter(|(entity, position)| {
                    *entity != ignoring && position.distance(point) <= radius
                })
                .min_by(|(_, a), (_, b)| a.distance(point).total_cmp(&b.distance(point)));
            if let Some((entity, _)) = body {
                return Some(entity);
            }
        }
        None
    }
}
