//! Transient map of the cells some observer can currently see.

use perception_core::{CellCoord, GridTopology, VisibilityOracle};
use perception_system_vision::{test_visibility, Viewer};

use crate::scan_order;

/// Dense visible/hidden flags over the cells of a grid.
///
/// Only traversable cells are ever marked visible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibilityMap {
    columns: u32,
    rows: u32,
    visible: Vec<bool>,
}

impl VisibilityMap {
    /// Creates a map with every cell hidden.
    #[must_use]
    pub fn new(columns: u32, rows: u32) -> Self {
        let capacity_u64 = u64::from(columns) * u64::from(rows);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Self {
            columns,
            rows,
            visible: vec![false; capacity],
        }
    }

    /// Tests every traversable cell centre against every viewer.
    ///
    /// Cells already revealed by an earlier viewer are not tested again. Cost
    /// is proportional to cells times viewers.
    pub fn build<G, V>(grid: &G, viewers: &[Viewer], oracle: &V) -> Self
    where
        G: GridTopology + ?Sized,
        V: VisibilityOracle + ?Sized,
    {
        let (columns, rows) = grid.dimensions();
        let mut map = Self::new(columns, rows);

        for viewer in viewers {
            for cell in scan_order(columns, rows) {
                let Some(index) = map.index(cell) else {
                    continue;
                };

                if map.visible[index] || !grid.is_traversable(cell) {
                    continue;
                }

                if test_visibility(viewer, grid.world_position_of(cell), oracle) {
                    map.visible[index] = true;
                }
            }
        }

        map
    }

    /// Marks `cell` visible, returning `false` when it lies outside the map.
    pub fn mark_visible(&mut self, cell: CellCoord) -> bool {
        match self.index(cell) {
            Some(index) => {
                self.visible[index] = true;
                true
            }
            None => false,
        }
    }

    /// Reports whether `cell` is visible; cells outside the map never are.
    #[must_use]
    pub fn is_visible(&self, cell: CellCoord) -> bool {
        self.index(cell)
            .and_then(|index| self.visible.get(index).copied())
            .unwrap_or(false)
    }

    /// Number of visible cells.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|visible| **visible).count()
    }

    /// Number of columns and rows covered by the map.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.column() < self.columns && cell.row() < self.rows {
            let row = usize::try_from(cell.row()).ok()?;
            let column = usize::try_from(cell.column()).ok()?;
            let width = usize::try_from(self.columns).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }
}
