#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the perception engine.
//!
//! This crate defines the message surface that connects hosts, the
//! authoritative perception world, and the pure perception systems. Hosts
//! submit [`Command`] values describing registrations, the world executes
//! those commands via its `apply` entry point, and broadcasts [`Event`] values
//! describing what changed. Everything the engine needs from the surrounding
//! simulation (grid layout, line of sight, ground-truth kinematics) is
//! expressed through the collaborator traits at the bottom of this file.

use std::fmt;

pub use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field of view assigned to observers that do not configure one, in degrees.
pub const DEFAULT_FIELD_OF_VIEW: f32 = 90.0;

/// Vision distance assigned to observers that do not configure one, in world units.
pub const DEFAULT_VISION_DISTANCE: f32 = 1000.0;

/// Commands that express all permissible registry mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Adds an observer to the world.
    RegisterObserver {
        /// Identifier of the observing agent.
        observer: ObserverId,
        /// Vision cone used by the observer.
        vision: VisionParameters,
    },
    /// Removes an observer and every awareness entry it owns.
    UnregisterObserver {
        /// Identifier of the observer to remove.
        observer: ObserverId,
    },
    /// Adds a target to the world with an initial status of unknown.
    RegisterTarget {
        /// Stable token identifying the target.
        target: TargetId,
    },
    /// Removes a target and drops every observer's awareness of it.
    UnregisterTarget {
        /// Stable token identifying the target.
        target: TargetId,
    },
    /// Replaces the rates that drive awareness and belief propagation.
    ConfigureTuning {
        /// Rates applied from the next step onwards.
        tuning: PerceptionTuning,
    },
}

/// Events broadcast by the world after processing commands or steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Confirms that an observer joined the world.
    ObserverRegistered {
        /// Identifier of the new observer.
        observer: ObserverId,
    },
    /// Confirms that an observer left the world.
    ObserverUnregistered {
        /// Identifier of the removed observer.
        observer: ObserverId,
    },
    /// Confirms that a target joined the world.
    TargetRegistered {
        /// Identifier of the new target.
        target: TargetId,
    },
    /// Confirms that a target left the world.
    TargetUnregistered {
        /// Identifier of the removed target.
        target: TargetId,
    },
    /// Reports that a tuning command was rejected and the previous rates kept.
    TuningRejected {
        /// Rate that failed validation.
        reason: TuningError,
    },
    /// Reports that a registration command was rejected.
    RegistrationRejected {
        /// Specific reason the command failed.
        reason: RegistrationError,
    },
    /// Announces that every observer re-evaluated its awareness.
    AwarenessPassCompleted {
        /// Number of observer/target pairs that were updated.
        evaluated: usize,
    },
    /// Announces that a target's visibility status changed.
    TargetStatusChanged {
        /// Target whose status changed.
        target: TargetId,
        /// Status held before the step.
        from: TargetStatus,
        /// Status held after the step.
        to: TargetStatus,
    },
    /// Reports that visibility pruning discarded all remaining belief mass.
    BeliefCleared {
        /// Target whose belief grid is now empty.
        target: TargetId,
    },
}

/// Reasons a registration command may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationError {
    /// An observer with the same identifier is already registered.
    DuplicateObserver(ObserverId),
    /// A target with the same identifier is already registered.
    DuplicateTarget(TargetId),
    /// No observer with the provided identifier exists.
    MissingObserver(ObserverId),
    /// No target with the provided identifier exists.
    MissingTarget(TargetId),
}

/// Unique identifier assigned to an observing agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(u32);

impl ObserverId {
    /// Creates a new observer identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Globally unique, stable token identifying a tracked target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(u128);

impl TargetId {
    /// Creates a new target token from its 128-bit representation.
    #[must_use]
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Retrieves the 128-bit representation of the token.
    #[must_use]
    pub const fn get(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Anything a line-of-sight query may ignore or report as its first hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    /// The body controlled by an observer.
    Observer(ObserverId),
    /// The body of a tracked target.
    Target(TargetId),
    /// Static world geometry such as walls.
    Geometry,
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }
}

/// Vision cone of an observer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawVisionParameters")]
pub struct VisionParameters {
    field_of_view: f32,
    max_distance: f32,
}

impl VisionParameters {
    /// Creates validated vision parameters.
    ///
    /// `field_of_view` is the full cone width in degrees and must lie in
    /// `(0, 360]`. `max_distance` is measured in world units and must be
    /// finite and non-negative.
    pub fn new(field_of_view: f32, max_distance: f32) -> Result<Self, VisionParametersError> {
        if !field_of_view.is_finite() || field_of_view <= 0.0 || field_of_view > 360.0 {
            return Err(VisionParametersError::FieldOfView(field_of_view));
        }

        if !max_distance.is_finite() || max_distance < 0.0 {
            return Err(VisionParametersError::MaxDistance(max_distance));
        }

        Ok(Self {
            field_of_view,
            max_distance,
        })
    }

    /// Full width of the vision cone in degrees.
    #[must_use]
    pub const fn field_of_view(&self) -> f32 {
        self.field_of_view
    }

    /// Half of the cone width; points further off-axis are outside the cone.
    #[must_use]
    pub fn half_angle(&self) -> f32 {
        self.field_of_view / 2.0
    }

    /// Furthest distance at which anything can be seen.
    #[must_use]
    pub const fn max_distance(&self) -> f32 {
        self.max_distance
    }
}

impl Default for VisionParameters {
    fn default() -> Self {
        Self {
            field_of_view: DEFAULT_FIELD_OF_VIEW,
            max_distance: DEFAULT_VISION_DISTANCE,
        }
    }
}

#[derive(Deserialize)]
struct RawVisionParameters {
    field_of_view: f32,
    max_distance: f32,
}

impl TryFrom<RawVisionParameters> for VisionParameters {
    type Error = VisionParametersError;

    fn try_from(raw: RawVisionParameters) -> Result<Self, Self::Error> {
        Self::new(raw.field_of_view, raw.max_distance)
    }
}

/// Reasons vision parameters may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum VisionParametersError {
    /// The field of view was not a finite angle in `(0, 360]` degrees.
    #[error("field of view {0} must be a finite angle in (0, 360] degrees")]
    FieldOfView(f32),
    /// The vision distance was negative or not finite.
    #[error("vision distance {0} must be finite and non-negative")]
    MaxDistance(f32),
}

/// Rates driving awareness accumulation and belief propagation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionTuning {
    /// Awareness gained on a step with clear line of sight.
    pub awareness_gain: f32,
    /// Awareness lost on a step without clear line of sight.
    pub awareness_decay: f32,
    /// Awareness an observer must reach for a target to become immediate.
    pub immediate_threshold: f32,
    /// Fraction of a cell's mass leaked to its neighbours per diffusion step.
    pub diffusion_spread: f32,
}

impl Default for PerceptionTuning {
    fn default() -> Self {
        Self {
            awareness_gain: 0.1,
            awareness_decay: 0.05,
            immediate_threshold: 1.0,
            diffusion_spread: 0.1,
        }
    }
}

impl PerceptionTuning {
    /// Checks that the rates keep awareness within `[0, 1]` and belief mass
    /// non-negative.
    ///
    /// Gain and decay must be finite and non-negative, the threshold must lie
    /// in `(0, 1]` and the diffusion spread in `[0, 1]`.
    pub fn validate(&self) -> Result<(), TuningError> {
        if !self.awareness_gain.is_finite() || self.awareness_gain < 0.0 {
            return Err(TuningError::AwarenessGain);
        }

        if !self.awareness_decay.is_finite() || self.awareness_decay < 0.0 {
            return Err(TuningError::AwarenessDecay);
        }

        if !(self.immediate_threshold > 0.0 && self.immediate_threshold <= 1.0) {
            return Err(TuningError::ImmediateThreshold);
        }

        if !(0.0..=1.0).contains(&self.diffusion_spread) {
            return Err(TuningError::DiffusionSpread);
        }

        Ok(())
    }
}

/// Rate of a [`PerceptionTuning`] that failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum TuningError {
    /// The awareness gain was negative or not finite.
    #[error("awareness gain must be finite and non-negative")]
    AwarenessGain,
    /// The awareness decay was negative or not finite.
    #[error("awareness decay must be finite and non-negative")]
    AwarenessDecay,
    /// The immediate threshold was outside `(0, 1]`.
    #[error("immediate threshold must lie in (0, 1]")]
    ImmediateThreshold,
    /// The diffusion spread was outside `[0, 1]`.
    #[error("diffusion spread must lie in [0, 1]")]
    DiffusionSpread,
}

/// Three-state visibility status tracked per target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetStatus {
    /// The target has never been perceived above the awareness threshold.
    #[default]
    Unknown,
    /// At least one observer currently has full awareness of the target.
    Immediate,
    /// The target was immediate before but nobody sees it clearly now.
    Hidden,
}

impl TargetStatus {
    /// Reports whether the target has ever been immediate.
    #[must_use]
    pub const fn is_known(self) -> bool {
        matches!(self, Self::Immediate | Self::Hidden)
    }
}

/// Last-known kinematic state of a target.
///
/// While hidden, `position` holds the centre of the most likely belief cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetCache {
    /// Current visibility status.
    pub status: TargetStatus,
    /// Last observed or best-guess position.
    pub position: Vec3,
    /// Velocity observed the last time the target was immediate.
    pub velocity: Vec3,
}

impl TargetCache {
    /// Overwrites the kinematic fields with freshly observed values.
    pub fn refresh(&mut self, position: Vec3, velocity: Vec3) {
        self.position = position;
        self.velocity = velocity;
    }
}

/// Awareness an observer holds toward a single target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AwarenessEntry {
    /// Accumulated confidence of visibility, always within `[0, 1]`.
    pub awareness: f32,
    /// Whether the most recent evaluation had an unobstructed view.
    pub has_clear_line_of_sight: bool,
}

/// Pose and motion of a controllable body in world space.
pub trait HasWorldPose {
    /// Position of the body.
    fn position(&self) -> Vec3;

    /// Direction the body is facing; expected to be unit length.
    fn forward(&self) -> Vec3;

    /// Current velocity of the body.
    fn velocity(&self) -> Vec3;
}

/// Plain-data pose that hosts may use to implement [`HasWorldPose`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPose {
    /// Position of the body.
    pub position: Vec3,
    /// Facing direction of the body.
    pub forward: Vec3,
    /// Velocity of the body.
    pub velocity: Vec3,
}

impl WorldPose {
    /// Creates a stationary pose facing the provided direction.
    #[must_use]
    pub fn at(position: Vec3, forward: Vec3) -> Self {
        Self {
            position,
            forward,
            velocity: Vec3::ZERO,
        }
    }
}

impl HasWorldPose for WorldPose {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn forward(&self) -> Vec3 {
        self.forward
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

/// Ground-truth source for the bodies behind observers and targets.
///
/// Returning `None` marks the entity as transiently incomplete; the engine
/// skips it for the current step.
pub trait GroundTruth {
    /// Body controlled by the observer, if it currently has one.
    fn observer_body(&self, observer: ObserverId) -> Option<&dyn HasWorldPose>;

    /// Body of the target, if it currently exists.
    fn target_body(&self, target: TargetId) -> Option<&dyn HasWorldPose>;
}

/// Line-of-sight oracle backed by the host's world geometry.
pub trait VisibilityOracle {
    /// Reports whether nothing obstructs the segment between two points.
    fn has_line_of_sight(&self, from: Vec3, to: Vec3, ignoring: Entity) -> bool;

    /// Returns the first entity hit along the segment, if any.
    fn raycast_first_hit(&self, from: Vec3, to: Vec3, ignoring: Entity) -> Option<Entity>;
}

/// Spatial grid the belief maps are laid over.
pub trait GridTopology: fmt::Debug {
    /// Number of columns and rows in the grid.
    fn dimensions(&self) -> (u32, u32);

    /// Cell containing the world position, or `None` when it lies off-grid.
    fn cell_at(&self, position: Vec3) -> Option<CellCoord>;

    /// World-space centre of the cell.
    fn world_position_of(&self, cell: CellCoord) -> Vec3;

    /// Reports whether a body may occupy the cell.
    fn is_traversable(&self, cell: CellCoord) -> bool;

    /// Appends the neighbours of `cell` to `out`, optionally only traversable ones.
    fn neighbors_of(&self, cell: CellCoord, traversable_only: bool, out: &mut Vec<CellCoord>);

    /// Reports whether the cell lies inside the grid.
    fn in_bounds(&self, cell: CellCoord) -> bool {
        let (columns, rows) = self.dimensions();
        cell.column() < columns && cell.row() < rows
    }
}
