#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative perception state for a single simulated world.
//!
//! The [`World`] owns every registered observer and target. Hosts mutate the
//! registries through [`apply`] and advance the simulation with the two-phase
//! [`advance_awareness`] / [`advance_target_states`] pair (or [`step`], which
//! runs both in order). All awareness for a step is computed before any target
//! consults it.

use std::sync::Arc;

use perception_core::{
    Command, Event, GridTopology, GroundTruth, ObserverId, PerceptionTuning, RegistrationError,
    TargetCache, TargetId, VisibilityOracle, VisionParameters,
};
use perception_system_awareness::AwarenessLedger;
use perception_system_belief::{update_by_visibility, Diffusion, OccupancyBelief, VisibilityMap};
use perception_system_target_state as target_state;
use perception_system_vision::Viewer;

/// Shared handle to the grid topology that belief maps are laid over.
pub type SharedGrid = Arc<dyn GridTopology>;

/// Represents the authoritative perception state of a world.
#[derive(Debug)]
pub struct World {
    grid: Option<SharedGrid>,
    tuning: PerceptionTuning,
    observers: Vec<Observer>,
    targets: Vec<Target>,
    diffusion: Diffusion,
    step_index: u64,
}

impl World {
    /// Creates a world without a grid; targets registered here track status
    /// and awareness but keep no belief map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            grid: None,
            tuning: PerceptionTuning::default(),
            observers: Vec::new(),
            targets: Vec::new(),
            diffusion: Diffusion::new(),
            step_index: 0,
        }
    }

    /// Creates a world whose targets maintain belief maps over `grid`.
    #[must_use]
    pub fn with_grid(grid: SharedGrid) -> Self {
        Self {
            grid: Some(grid),
            ..Self::new()
        }
    }

    fn observer_index(&self, observer: ObserverId) -> Option<usize> {
        self.observers.iter().position(|entry| entry.id == observer)
    }

    fn target_index(&self, target: TargetId) -> Option<usize> {
        self.targets.iter().position(|entry| entry.id == target)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Observer {
    id: ObserverId,
    vision: VisionParameters,
    awareness: AwarenessLedger,
}

#[derive(Debug)]
struct Target {
    id: TargetId,
    cache: TargetCache,
    grid: Option<SharedGrid>,
    belief: Option<OccupancyBelief>,
}

impl Target {
    fn new(id: TargetId, grid: Option<SharedGrid>) -> Self {
        let belief = grid
            .as_deref()
            .map(|grid| OccupancyBelief::for_grid(grid));
        Self {
            id,
            cache: TargetCache::default(),
            grid,
            belief,
        }
    }
}

/// Applies the provided command to the world, mutating registries deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::RegisterObserver { observer, vision } => {
            if world.observer_index(observer).is_some() {
                reject(RegistrationError::DuplicateObserver(observer), out_events);
                return;
            }

            world.observers.push(Observer {
                id: observer,
                vision,
                awareness: AwarenessLedger::new(),
            });
            out_events.push(Event::ObserverRegistered { observer });
        }
        Command::UnregisterObserver { observer } => {
            let Some(index) = world.observer_index(observer) else {
                reject(RegistrationError::MissingObserver(observer), out_events);
                return;
            };

            let _ = world.observers.remove(index);
            out_events.push(Event::ObserverUnregistered { observer });
        }
        Command::RegisterTarget { target } => {
            if world.target_index(target).is_some() {
                reject(RegistrationError::DuplicateTarget(target), out_events);
                return;
            }

            world.targets.push(Target::new(target, world.grid.clone()));
            out_events.push(Event::TargetRegistered { target });
        }
        Command::UnregisterTarget { target } => {
            let Some(index) = world.target_index(target) else {
                reject(RegistrationError::MissingTarget(target), out_events);
                return;
            };

            let _ = world.targets.remove(index);
            for observer in &mut world.observers {
                let _ = observer.awareness.remove(target);
            }
            out_events.push(Event::TargetUnregistered { target });
        }
        Command::ConfigureTuning { tuning } => {
            if let Err(reason) = tuning.validate() {
                tracing::warn!(
                    target: "perception_world::apply",
                    ?reason,
                    ?tuning,
                    "tuning rejected"
                );
                out_events.push(Event::TuningRejected { reason });
                return;
            }

            world.tuning = tuning;
        }
    }
}

fn reject(reason: RegistrationError, out_events: &mut Vec<Event>) {
    tracing::warn!(
        target: "perception_world::apply",
        ?reason,
        "registration rejected"
    );
    out_events.push(Event::RegistrationRejected { reason });
}

/// Re-evaluates every observer's awareness of every target.
///
/// Observers or targets whose bodies the ground truth cannot supply are
/// skipped for this step.
pub fn advance_awareness<T, V>(
    world: &mut World,
    truth: &T,
    oracle: &V,
    out_events: &mut Vec<Event>,
) where
    T: GroundTruth + ?Sized,
    V: VisibilityOracle + ?Sized,
{
    let World {
        observers,
        targets,
        tuning,
        ..
    } = world;

    let mut evaluated = 0;
    for observer in observers.iter_mut() {
        let Some(body) = truth.observer_body(observer.id) else {
            continue;
        };
        let viewer = Viewer::from_body(observer.id, body, observer.vision);

        for target in targets.iter() {
            let Some(target_body) = truth.target_body(target.id) else {
                let _ = observer.awareness.entry(target.id);
                continue;
            };

            let _ = observer.awareness.update(
                &viewer,
                target.id,
                target_body.position(),
                oracle,
                tuning,
            );
            evaluated += 1;
        }
    }

    out_events.push(Event::AwarenessPassCompleted { evaluated });
}

/// Runs every target's visibility state machine against the awareness
/// computed by the latest [`advance_awareness`] pass.
///
/// Immediate targets refresh their kinematics and collapse their belief,
/// hidden targets prune their belief against everything currently visible,
/// and every known target diffuses its belief by one step.
pub fn advance_target_states<T, V>(
    world: &mut World,
    truth: &T,
    oracle: &V,
    out_events: &mut Vec<Event>,
) where
    T: GroundTruth + ?Sized,
    V: VisibilityOracle + ?Sized,
{
    let World {
        observers,
        targets,
        tuning,
        diffusion,
        step_index,
        ..
    } = world;

    let mut visibility: Option<VisibilityMap> = None;

    for target in targets.iter_mut() {
        let immediate = target_state::is_immediate(
            observers
                .iter()
                .filter_map(|observer| observer.awareness.get(target.id)),
            tuning,
        );
        let transition = target_state::evaluate(target.cache.status, immediate);
        target.cache.status = transition.to;

        if transition.changed() {
            tracing::debug!(
                target: "perception_world::step",
                target_guid = %target.id,
                from = ?transition.from,
                to = ?transition.to,
                "target status changed"
            );
            out_events.push(Event::TargetStatusChanged {
                target: target.id,
                from: transition.from,
                to: transition.to,
            });
        }

        if transition.refreshes_position() {
            if let Some(body) = truth.target_body(target.id) {
                target.cache.refresh(body.position(), body.velocity());
                if let (Some(grid), Some(belief)) = (target.grid.as_deref(), target.belief.as_mut())
                {
                    let _ = belief.set_position(grid, target.cache.position);
                }
            }
        }

        let (Some(grid), Some(belief)) = (target.grid.as_deref(), target.belief.as_mut()) else {
            continue;
        };

        if transition.prunes_belief() {
            let map = visibility.get_or_insert_with(|| {
                let viewers = collect_viewers(observers.as_slice(), truth);
                VisibilityMap::build(grid, &viewers, oracle)
            });

            let (outcome, best_guess) = update_by_visibility(belief, grid, map);
            if let Some(position) = best_guess {
                target.cache.position = position;
            }

            if outcome.cleared() {
                tracing::debug!(
                    target: "perception_world::step",
                    target_guid = %target.id,
                    discarded = outcome.discarded_mass,
                    "belief cleared by visibility"
                );
                out_events.push(Event::BeliefCleared { target: target.id });
            }
        }

        if transition.diffuses_belief() {
            diffusion.handle(belief, grid, tuning.diffusion_spread);
        }
    }

    *step_index = step_index.saturating_add(1);
}

/// Runs [`advance_awareness`] followed by [`advance_target_states`].
pub fn step<T, V>(world: &mut World, truth: &T, oracle: &V, out_events: &mut Vec<Event>)
where
    T: GroundTruth + ?Sized,
    V: VisibilityOracle + ?Sized,
{
    advance_awareness(world, truth, oracle, out_events);
    advance_target_states(world, truth, oracle, out_events);
}

fn collect_viewers<T>(observers: &[Observer], truth: &T) -> Vec<Viewer>
where
    T: GroundTruth + ?Sized,
{
    observers
        .iter()
        .filter_map(|observer| {
            truth
                .observer_body(observer.id)
                .map(|body| Viewer::from_body(observer.id, body, observer.vision))
        })
        .collect()
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use perception_core::{
        AwarenessEntry, GridTopology, ObserverId, PerceptionTuning, TargetCache, TargetId,
        TargetStatus, VisionParameters,
    };
    use perception_system_belief::OccupancyBelief;

    use super::World;

    /// Rates currently driving awareness and belief propagation.
    #[must_use]
    pub fn tuning(world: &World) -> &PerceptionTuning {
        &world.tuning
    }

    /// Grid topology bound to the world, if any.
    #[must_use]
    pub fn grid(world: &World) -> Option<&dyn GridTopology> {
        world.grid.as_deref()
    }

    /// Number of completed target-state passes.
    #[must_use]
    pub fn step_index(world: &World) -> u64 {
        world.step_index
    }

    /// Registered observers in registration order.
    pub fn observers(world: &World) -> impl Iterator<Item = ObserverId> + '_ {
        world.observers.iter().map(|observer| observer.id)
    }

    /// Registered targets in registration order.
    pub fn targets(world: &World) -> impl Iterator<Item = TargetId> + '_ {
        world.targets.iter().map(|target| target.id)
    }

    /// Vision cone of a registered observer.
    #[must_use]
    pub fn vision(world: &World, observer: ObserverId) -> Option<VisionParameters> {
        world
            .observers
            .iter()
            .find(|entry| entry.id == observer)
            .map(|entry| entry.vision)
    }

    /// Last-known kinematic state of a registered target.
    #[must_use]
    pub fn target_cache(world: &World, target: TargetId) -> Option<TargetCache> {
        world
            .targets
            .iter()
            .find(|entry| entry.id == target)
            .map(|entry| entry.cache)
    }

    /// Visibility status of a registered target.
    #[must_use]
    pub fn target_status(world: &World, target: TargetId) -> Option<TargetStatus> {
        target_cache(world, target).map(|cache| cache.status)
    }

    /// Belief map of a registered target, if the world has a grid.
    #[must_use]
    pub fn belief(world: &World, target: TargetId) -> Option<&OccupancyBelief> {
        world
            .targets
            .iter()
            .find(|entry| entry.id == target)
            .and_then(|entry| entry.belief.as_ref())
    }

    /// Awareness `observer` holds toward `target`.
    #[must_use]
    pub fn target_data(
        world: &World,
        observer: ObserverId,
        target: TargetId,
    ) -> Option<AwarenessEntry> {
        world
            .observers
            .iter()
            .find(|entry| entry.id == observer)
            .and_then(|entry| entry.awareness.get(target).copied())
    }

    /// Target the observer is attending to: the first registered target,
    /// provided it is known.
    #[must_use]
    pub fn current_target(world: &World, observer: ObserverId) -> Option<TargetId> {
        if !world.observers.iter().any(|entry| entry.id == observer) {
            return None;
        }

        world
            .targets
            .first()
            .filter(|target| target.cache.status.is_known())
            .map(|target| target.id)
    }

    /// Reports whether the observer currently attends to a target.
    #[must_use]
    pub fn has_target(world: &World, observer: ObserverId) -> bool {
        current_target(world, observer).is_some()
    }

    /// Last-known state and awareness of the observer's current target.
    #[must_use]
    pub fn current_target_state(
        world: &World,
        observer: ObserverId,
    ) -> Option<(TargetCache, AwarenessEntry)> {
        let target = current_target(world, observer)?;
        let awareness = target_data(world, observer, target)?;
        let cache = target_cache(world, target)?;
        Some((cache, awareness))
    }

    /// Last-known state and awareness of every target the observer evaluated.
    ///
    /// Targets appear in registration order; with `only_known` set, unknown
    /// targets are skipped.
    #[must_use]
    pub fn all_target_states(
        world: &World,
        observer: ObserverId,
        only_known: bool,
    ) -> Vec<(TargetCache, AwarenessEntry)> {
        let Some(entry) = world.observers.iter().find(|entry| entry.id == observer) else {
            return Vec::new();
        };

        world
            .targets
            .iter()
            .filter(|target| !only_known || target.cache.status.is_known())
            .filter_map(|target| {
                entry
                    .awareness
                    .get(target.id)
                    .map(|awareness| (target.cache, *awareness))
            })
            .collect()
    }
}
