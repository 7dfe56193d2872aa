#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that decides whether an observer can see a point in the world.
//!
//! A point is visible when it lies within the observer's vision distance,
//! inside the vision cone, and the visibility oracle reports an unobstructed
//! segment between the observer and the point.

use perception_core::{Entity, HasWorldPose, ObserverId, Vec3, VisibilityOracle, VisionParameters};

/// Observer pose and vision cone captured for a single step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewer {
    /// Observer the pose belongs to; ignored by line-of-sight queries.
    pub observer: ObserverId,
    /// Position of the observer's body.
    pub position: Vec3,
    /// Facing direction of the observer's body.
    pub forward: Vec3,
    /// Vision cone of the observer.
    pub vision: VisionParameters,
}

impl Viewer {
    /// Captures the viewer from an observer's body.
    #[must_use]
    pub fn from_body(
        observer: ObserverId,
        body: &dyn HasWorldPose,
        vision: VisionParameters,
    ) -> Self {
        Self {
            observer,
            position: body.position(),
            forward: body.forward(),
            vision,
        }
    }

    /// Measures where `point` lies relative to the viewer.
    #[must_use]
    pub fn sample(&self, point: Vec3) -> ConeSample {
        let offset = point - self.position;
        ConeSample {
            distance: offset.length(),
            angle: angle_between(self.forward, offset),
        }
    }

    /// Reports whether `point` lies within range and inside the vision cone.
    #[must_use]
    pub fn in_cone(&self, point: Vec3) -> bool {
        let sample = self.sample(point);
        sample.distance <= self.vision.max_distance() && sample.angle <= self.vision.half_angle()
    }
}

/// Distance and off-axis angle of a point relative to a viewer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConeSample {
    /// Straight-line distance in world units.
    pub distance: f32,
    /// Angle between the facing direction and the direction to the point, in degrees.
    pub angle: f32,
}

/// Angle in degrees between two directions.
///
/// Zero-length inputs normalise to the zero vector, which yields a right
/// angle. The dot product is clamped before `acos` so rounding never produces
/// NaN.
#[must_use]
pub fn angle_between(forward: Vec3, direction: Vec3) -> f32 {
    let dot = forward
        .normalize_or_zero()
        .dot(direction.normalize_or_zero())
        .clamp(-1.0, 1.0);
    dot.acos().to_degrees()
}

/// Binary visibility test of `point` for the provided viewer.
pub fn test_visibility<V>(viewer: &Viewer, point: Vec3, oracle: &V) -> bool
where
    V: VisibilityOracle + ?Sized,
{
    let sample = viewer.sample(point);
    if sample.distance > viewer.vision.max_distance() {
        return false;
    }

    if sample.angle > viewer.vision.half_angle() {
        return false;
    }

    oracle.has_line_of_sight(viewer.position, point, Entity::Observer(viewer.observer))
}

/// Reports whether any viewer passes [`test_visibility`] for `point`.
pub fn visible_to_any<V>(viewers: &[Viewer], point: Vec3, oracle: &V) -> bool
where
    V: VisibilityOracle + ?Sized,
{
    viewers
        .iter()
        .any(|viewer| test_visibility(viewer, point, oracle))
}
