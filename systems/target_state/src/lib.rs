#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure state machine that aggregates awareness into a target status.
//!
//! A target is immediate while any observer holds full awareness of it. Once
//! a target has been immediate it can only alternate between immediate and
//! hidden; a target nobody ever fully perceived stays unknown.

use perception_core::{AwarenessEntry, PerceptionTuning, TargetStatus};

/// Outcome of evaluating one target for one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Status held before the step.
    pub from: TargetStatus,
    /// Status held after the step.
    pub to: TargetStatus,
}

impl Transition {
    /// Reports whether the status changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// The target was seen this step: refresh its kinematics and collapse the belief.
    #[must_use]
    pub fn refreshes_position(&self) -> bool {
        self.to == TargetStatus::Immediate
    }

    /// The target is hidden: prune its belief against everything currently visible.
    #[must_use]
    pub fn prunes_belief(&self) -> bool {
        self.to == TargetStatus::Hidden
    }

    /// The target is known: diffuse its belief one step.
    ///
    /// This includes the step a target becomes immediate, so a freshly
    /// collapsed point mass spreads once before the next evaluation.
    #[must_use]
    pub fn diffuses_belief(&self) -> bool {
        self.to.is_known()
    }
}

/// Reports whether any of the provided awareness entries reaches the threshold.
pub fn is_immediate<'a, I>(entries: I, tuning: &PerceptionTuning) -> bool
where
    I: IntoIterator<Item = &'a AwarenessEntry>,
{
    entries
        .into_iter()
        .any(|entry| entry.awareness >= tuning.immediate_threshold)
}

/// Computes the next status from the previous one and this step's aggregate.
#[must_use]
pub fn evaluate(from: TargetStatus, immediate: bool) -> Transition {
    let to = if immediate {
        TargetStatus::Immediate
    } else if from.is_known() {
        TargetStatus::Hidden
    } else {
        TargetStatus::Unknown
    };

    Transition { from, to }
}
