#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Awareness tracker that accumulates and decays per-target confidence.
//!
//! Every step each observer re-evaluates every target. A clear view raises
//! awareness by the configured gain, anything else lowers it by the decay,
//! and the result is always clamped to `[0, 1]`.

use std::collections::BTreeMap;

use perception_core::{AwarenessEntry, Entity, PerceptionTuning, TargetId, Vec3, VisibilityOracle};
use perception_system_vision::Viewer;

/// Awareness entries owned by a single observer, keyed by target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AwarenessLedger {
    entries: BTreeMap<TargetId, AwarenessEntry>,
}

impl AwarenessLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Awareness held toward `target`, if it was ever evaluated.
    #[must_use]
    pub fn get(&self, target: TargetId) -> Option<&AwarenessEntry> {
        self.entries.get(&target)
    }

    /// Entry for `target`, created with zero awareness on first access.
    pub fn entry(&mut self, target: TargetId) -> &mut AwarenessEntry {
        self.entries.entry(target).or_default()
    }

    /// Drops the entry for `target`, returning it when present.
    pub fn remove(&mut self, target: TargetId) -> Option<AwarenessEntry> {
        self.entries.remove(&target)
    }

    /// Iterator over entries ordered by target token.
    pub fn iter(&self) -> impl Iterator<Item = (TargetId, &AwarenessEntry)> {
        self.entries.iter().map(|(target, entry)| (*target, entry))
    }

    /// Number of targets this ledger has evaluated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether no target was evaluated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-evaluates `target` at its true `position` and returns the updated entry.
    pub fn update<V>(
        &mut self,
        viewer: &Viewer,
        target: TargetId,
        position: Vec3,
        oracle: &V,
        tuning: &PerceptionTuning,
    ) -> AwarenessEntry
    where
        V: VisibilityOracle + ?Sized,
    {
        let clear = has_clear_line_of_sight(viewer, target, position, oracle);
        let entry = self.entry(target);
        entry.has_clear_line_of_sight = clear;
        accumulate(entry, tuning);

        tracing::trace!(
            target: "perception_system_awareness::update",
            observer = viewer.observer.get(),
            target_guid = %target,
            clear,
            awareness = entry.awareness,
        );

        *entry
    }
}

/// Decides whether the observer has a clear view of the target's body.
///
/// Bodies outside the vision cone are never clear. Inside the cone the first
/// raycast hit decides: nothing, or the target itself, counts as seen.
pub fn has_clear_line_of_sight<V>(
    viewer: &Viewer,
    target: TargetId,
    position: Vec3,
    oracle: &V,
) -> bool
where
    V: VisibilityOracle + ?Sized,
{
    if !viewer.in_cone(position) {
        return false;
    }

    match oracle.raycast_first_hit(viewer.position, position, Entity::Observer(viewer.observer)) {
        None => true,
        Some(Entity::Target(hit)) => hit == target,
        Some(_) => false,
    }
}

/// Applies one step of gain or decay based on `entry.has_clear_line_of_sight`.
pub fn accumulate(entry: &mut AwarenessEntry, tuning: &PerceptionTuning) {
    let delta = if entry.has_clear_line_of_sight {
        tuning.awareness_gain
    } else {
        -tuning.awareness_decay
    };
    entry.awareness = (entry.awareness + delta).clamp(0.0, 1.0);
}
