#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Occupancy belief grid describing where an unseen target probably is.
//!
//! The grid holds non-negative probability mass per cell. Hosts collapse it
//! to a point whenever the target is seen, prune it against the cells that
//! observers can currently see while the target is hidden, and diffuse it
//! every step to model motion uncertainty.

mod diffusion;
mod visibility;

use perception_core::{CellCoord, GridTopology, Vec3};

pub use diffusion::Diffusion;
pub use visibility::VisibilityMap;

/// Dense probability mass over the cells of a grid, stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct OccupancyBelief {
    columns: u32,
    rows: u32,
    mass: Vec<f32>,
}

impl OccupancyBelief {
    /// Creates an all-zero belief with the provided dimensions.
    #[must_use]
    pub fn new(columns: u32, rows: u32) -> Self {
        let capacity_u64 = u64::from(columns) * u64::from(rows);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Self {
            columns,
            rows,
            mass: vec![0.0; capacity],
        }
    }

    /// Creates an all-zero belief shaped like `grid`.
    #[must_use]
    pub fn for_grid<G>(grid: &G) -> Self
    where
        G: GridTopology + ?Sized,
    {
        let (columns, rows) = grid.dimensions();
        Self::new(columns, rows)
    }

    /// Number of columns and rows covered by the belief.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    /// Mass stored in `cell`; zero for cells outside the grid.
    #[must_use]
    pub fn value(&self, cell: CellCoord) -> f32 {
        self.index(cell)
            .and_then(|index| self.mass.get(index).copied())
            .unwrap_or(0.0)
    }

    /// Raw row-major cell masses.
    #[must_use]
    pub fn cells(&self) -> &[f32] {
        &self.mass
    }

    /// Sum of mass over every cell.
    #[must_use]
    pub fn total_mass(&self) -> f32 {
        self.mass.iter().sum()
    }

    /// Iterator over every cell and its mass in scan order.
    ///
    /// Scan order walks each column top to bottom before moving to the next
    /// column; it decides which cell wins ties in [`Self::most_likely_cell`].
    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, f32)> + '_ {
        scan_order(self.columns, self.rows).map(move |cell| (cell, self.value(cell)))
    }

    /// Removes all mass from the grid.
    pub fn clear(&mut self) {
        self.mass.fill(0.0);
    }

    /// Collapses the belief onto the cell containing `position`.
    ///
    /// Every cell is zeroed first. When `position` lies off-grid the belief
    /// stays empty and `None` is returned.
    pub fn set_position<G>(&mut self, grid: &G, position: Vec3) -> Option<CellCoord>
    where
        G: GridTopology + ?Sized,
    {
        self.clear();

        let cell = grid.cell_at(position).filter(|cell| grid.in_bounds(*cell))?;
        let index = self.index(cell)?;
        self.mass[index] = 1.0;
        Some(cell)
    }

    /// Discards mass in visible cells and renormalises what remains.
    ///
    /// Surviving mass is scaled to sum to one over the non-visible cells. If
    /// nothing survives the grid is left empty.
    pub fn prune(&mut self, visibility: &VisibilityMap) -> PruneOutcome {
        let mut discarded_mass = 0.0;
        let mut retained_mass = 0.0;

        for cell in scan_order(self.columns, self.rows) {
            let Some(index) = self.index(cell) else {
                continue;
            };

            if visibility.is_visible(cell) {
                discarded_mass += self.mass[index];
                self.mass[index] = 0.0;
            } else {
                retained_mass += self.mass[index];
            }
        }

        if retained_mass > 0.0 {
            for value in &mut self.mass {
                *value /= retained_mass;
            }
        }

        PruneOutcome {
            discarded_mass,
            retained_mass,
            best_guess: self.most_likely_cell(),
        }
    }

    /// Cell holding strictly the greatest mass, first in scan order on ties.
    ///
    /// Returns `None` when no cell holds positive mass.
    #[must_use]
    pub fn most_likely_cell(&self) -> Option<CellCoord> {
        let mut best: Option<(CellCoord, f32)> = None;
        for (cell, value) in self.iter() {
            let threshold = best.map_or(0.0, |(_, mass)| mass);
            if value > threshold {
                best = Some((cell, value));
            }
        }
        best.map(|(cell, _)| cell)
    }

    pub(crate) fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.column() < self.columns && cell.row() < self.rows {
            let row = usize::try_from(cell.row()).ok()?;
            let column = usize::try_from(cell.column()).ok()?;
            let width = usize::try_from(self.columns).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [f32] {
        &mut self.mass
    }
}

/// Result of a visibility pruning pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PruneOutcome {
    /// Mass removed from visible cells.
    pub discarded_mass: f32,
    /// Mass that survived in non-visible cells before renormalisation.
    pub retained_mass: f32,
    /// Most likely cell after renormalisation, if any mass survived.
    pub best_guess: Option<CellCoord>,
}

impl PruneOutcome {
    /// Reports whether the pass discarded the last of the belief.
    #[must_use]
    pub fn cleared(&self) -> bool {
        self.discarded_mass > 0.0 && self.retained_mass <= 0.0
    }
}

/// Prunes `belief` against `visibility` and returns the world-space centre
/// of the new best guess.
///
/// The returned position is `None` when no mass survived, in which case the
/// caller keeps its previous estimate.
pub fn update_by_visibility<G>(
    belief: &mut OccupancyBelief,
    grid: &G,
    visibility: &VisibilityMap,
) -> (PruneOutcome, Option<Vec3>)
where
    G: GridTopology + ?Sized,
{
    let outcome = belief.prune(visibility);
    let best_guess = outcome
        .best_guess
        .map(|cell| grid.world_position_of(cell));
    (outcome, best_guess)
}

pub(crate) fn scan_order(columns: u32, rows: u32) -> impl Iterator<Item = CellCoord> {
    (0..columns).flat_map(move |column| (0..rows).map(move |row| CellCoord::new(column, row)))
}
