//! Random-walk diffusion of belief mass to neighbouring cells.

use perception_core::{CellCoord, GridTopology};

use crate::{scan_order, OccupancyBelief};

/// Diffusion system that reuses scratch buffers across steps and targets.
#[derive(Debug, Default)]
pub struct Diffusion {
    snapshot: Vec<f32>,
    neighbors: Vec<CellCoord>,
    neighbor_indices: Vec<usize>,
}

impl Diffusion {
    /// Creates a diffusion system with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spreads `spread` of every traversable cell's mass evenly over its
    /// traversable neighbours.
    ///
    /// Masses are read from a snapshot taken before any cell is updated, so
    /// the result does not depend on visitation order. A cell without
    /// traversable neighbours keeps all of its mass.
    pub fn handle<G>(&mut self, belief: &mut OccupancyBelief, grid: &G, spread: f32)
    where
        G: GridTopology + ?Sized,
    {
        self.snapshot.clear();
        self.snapshot.extend_from_slice(belief.cells());

        let (columns, rows) = belief.dimensions();
        for cell in scan_order(columns, rows) {
            let Some(index) = belief.index(cell) else {
                continue;
            };

            let mass = self.snapshot[index];
            if mass <= 0.0 || !grid.is_traversable(cell) {
                continue;
            }

            self.neighbors.clear();
            grid.neighbors_of(cell, true, &mut self.neighbors);

            self.neighbor_indices.clear();
            self.neighbor_indices.extend(
                self.neighbors
                    .iter()
                    .filter_map(|neighbor| belief.index(*neighbor)),
            );

            if self.neighbor_indices.is_empty() {
                continue;
            }

            let amount = mass * spread;
            let share = amount / self.neighbor_indices.len() as f32;
            let cells = belief.cells_mut();
            cells[index] -= amount;
            for &neighbor in &self.neighbor_indices {
                cells[neighbor] += share;
            }
        }
    }
}
