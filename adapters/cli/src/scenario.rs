//! Scripted scenarios loaded from TOML files.

use std::{collections::BTreeSet, fs, num::ParseIntError, path::Path};

use anyhow::Context;
use glam::Vec2;
use perception_core::{
    ObserverId, PerceptionTuning, TargetId, TuningError, Vec3, VisionParameters,
    VisionParametersError, DEFAULT_FIELD_OF_VIEW, DEFAULT_VISION_DISTANCE,
};
use serde::Deserialize;
use thiserror::Error;

use crate::environment::AsciiGrid;

/// Number of steps simulated when neither the file nor the command line sets one.
pub(crate) const DEFAULT_STEPS: u32 = 100;

/// Fully validated scenario ready to be simulated.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Scenario {
    pub(crate) grid: AsciiGrid,
    pub(crate) steps: u32,
    pub(crate) tuning: PerceptionTuning,
    pub(crate) observers: Vec<ObserverScript>,
    pub(crate) targets: Vec<TargetScript>,
}

/// Observer placement and how its facing changes each step.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ObserverScript {
    pub(crate) id: ObserverId,
    pub(crate) vision: VisionParameters,
    pub(crate) position: Vec3,
    pub(crate) facing_degrees: f32,
    pub(crate) turn_rate: f32,
}

/// Target route walked at constant speed.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TargetScript {
    pub(crate) id: TargetId,
    pub(crate) speed: f32,
    pub(crate) waypoints: Vec<Vec3>,
    pub(crate) looping: bool,
}

/// Reasons a scenario file may be rejected.
#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    /// The file is not valid TOML or does not match the scenario layout.
    #[error("failed to parse scenario")]
    Parse(#[from] toml::de::Error),
    /// The grid has no rows or no columns.
    #[error("grid must contain at least one row and one column")]
    EmptyGrid,
    /// A grid row differs in width from the first row.
    #[error("grid row {row} has {found} tiles, expected {expected}")]
    RaggedRow {
        /// Zero-based index of the offending row.
        row: u32,
        /// Width of the first row.
        expected: u32,
        /// Width of the offending row.
        found: u32,
    },
    /// A grid row contains a character other than `.` or `#`.
    #[error("grid tile {tile:?} at column {column}, row {row} is neither '.' nor '#'")]
    UnknownTile {
        /// Zero-based column of the tile.
        column: u32,
        /// Zero-based row of the tile.
        row: u32,
        /// Offending character.
        tile: char,
    },
    /// The cell size is zero, negative or not finite.
    #[error("cell size {0} must be finite and positive")]
    InvalidCellSize(f32),
    /// An observer declares an invalid vision cone.
    #[error("observer {observer} has invalid vision")]
    Vision {
        /// Identifier of the offending observer.
        observer: u32,
        /// Underlying validation failure.
        #[source]
        source: VisionParametersError,
    },
    /// Two observers share an identifier.
    #[error("observer {0} is declared more than once")]
    DuplicateObserver(u32),
    /// A target identifier is not a hexadecimal 128-bit value.
    #[error("target guid {value:?} is not a 128-bit hexadecimal value")]
    InvalidGuid {
        /// Offending identifier text.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: ParseIntError,
    },
    /// Two targets share an identifier.
    #[error("target {0} is declared more than once")]
    DuplicateTarget(TargetId),
    /// A target declares a negative or non-finite speed.
    #[error("target {target} speed {speed} must be finite and non-negative")]
    InvalidSpeed {
        /// Offending target.
        target: TargetId,
        /// Declared speed.
        speed: f32,
    },
    /// A target declares no waypoints.
    #[error("target {0} needs at least one waypoint")]
    MissingWaypoints(TargetId),
    /// The `[tuning]` table declares a rate outside its bounds.
    #[error("invalid tuning")]
    Tuning(#[from] TuningError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    cell_size: f32,
    grid: Vec<String>,
    #[serde(default)]
    steps: Option<u32>,
    #[serde(default)]
    tuning: PerceptionTuning,
    #[serde(default)]
    observers: Vec<ObserverFile>,
    #[serde(default)]
    targets: Vec<TargetFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObserverFile {
    id: u32,
    position: Vec2,
    #[serde(default)]
    facing_degrees: f32,
    #[serde(default)]
    turn_rate: f32,
    #[serde(default = "default_field_of_view")]
    field_of_view: f32,
    #[serde(default = "default_max_distance")]
    max_distance: f32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetFile {
    guid: String,
    speed: f32,
    waypoints: Vec<Vec2>,
    #[serde(default, rename = "loop")]
    looping: bool,
}

fn default_field_of_view() -> f32 {
    DEFAULT_FIELD_OF_VIEW
}

fn default_max_distance() -> f32 {
    DEFAULT_VISION_DISTANCE
}

impl Scenario {
    /// Reads and validates the scenario stored at `path`.
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario at {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("invalid scenario at {}", path.display()))
    }

    /// Parses and validates a scenario from TOML text.
    pub(crate) fn from_toml(contents: &str) -> Result<Self, ScenarioError> {
        let file: ScenarioFile = toml::from_str(contents)?;
        file.tuning.validate()?;

        let grid = AsciiGrid::from_rows(&file.grid, file.cell_size)?;

        let mut observer_ids = BTreeSet::new();
        let mut observers = Vec::with_capacity(file.observers.len());
        for observer in file.observers {
            if !observer_ids.insert(observer.id) {
                return Err(ScenarioError::DuplicateObserver(observer.id));
            }
            let vision = VisionParameters::new(observer.field_of_view, observer.max_distance)
                .map_err(|source| ScenarioError::Vision {
                    observer: observer.id,
                    source,
                })?;
            observers.push(ObserverScript {
                id: ObserverId::new(observer.id),
                vision,
                position: observer.position.extend(0.0),
                facing_degrees: observer.facing_degrees,
                turn_rate: observer.turn_rate,
            });
        }

        let mut target_ids = BTreeSet::new();
        let mut targets = Vec::with_capacity(file.targets.len());
        for target in file.targets {
            let id = parse_guid(&target.guid)?;
            if !target_ids.insert(id) {
                return Err(ScenarioError::DuplicateTarget(id));
            }
            if !target.speed.is_finite() || target.speed < 0.0 {
                return Err(ScenarioError::InvalidSpeed {
                    target: id,
                    speed: target.speed,
                });
            }
            if target.waypoints.is_empty() {
                return Err(ScenarioError::MissingWaypoints(id));
            }
            targets.push(TargetScript {
                id,
                speed: target.speed,
                waypoints: target
                    .waypoints
                    .iter()
                    .map(|point| point.extend(0.0))
                    .collect(),
                looping: target.looping,
            });
        }

        Ok(Self {
            grid,
            steps: file.steps.unwrap_or(DEFAULT_STEPS),
            tuning: file.tuning,
            observers,
            targets,
        })
    }
}

fn parse_guid(value: &str) -> Result<TargetId, ScenarioError> {
    let digits = value.trim().trim_start_matches("0x").replace('-', "");
    u128::from_str_radix(&digits, 16)
        .map(TargetId::new)
        .map_err(|source| ScenarioError::InvalidGuid {
            value: value.to_owned(),
            source,
        })
}
