//! Grid tiles
//!
//! A tile is the unit of work scattered to one participant. Tiles are plain
//! values: they carry the interval(s) they cover and rebuild cells on demand,
//! so they serialize cheaply and can be enumerated any number of times.

use super::cell::Cell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// The region of the grid covered by a tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// An area of the grid: `x` and `y` intervals in global indices
    Rectangular { x: Range<usize>, y: Range<usize> },

    /// A flat interval of the row-major flattened grid
    ///
    /// `width` is the x-extent of the full grid, needed to recover global
    /// coordinates from flat indices.
    Linear { cells: Range<usize>, width: usize },
}

/// A sub-region of the grid assigned to one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Sequence number within the decomposition (0-based)
    pub id: usize,

    /// Covered region
    pub selector: Selector,
}

impl Tile {
    /// Create a tile covering the area `x × y`
    pub fn rectangular(id: usize, x: Range<usize>, y: Range<usize>) -> Self {
        Self {
            id,
            selector: Selector::Rectangular { x, y },
        }
    }

    /// Create a tile covering flat indices `cells` of a grid `width` wide
    pub fn linear(id: usize, cells: Range<usize>, width: usize) -> Self {
        Self {
            id,
            selector: Selector::Linear { cells, width },
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self.selector, Selector::Linear { .. })
    }

    /// Number of cells covered by the tile
    pub fn cell_count(&self) -> usize {
        match &self.selector {
            Selector::Rectangular { x, y } => x.len().saturating_mul(y.len()),
            Selector::Linear { cells, .. } => cells.len(),
        }
    }

    /// Enumerate the cells of the tile
    ///
    /// Rectangular tiles are walked row-major (local `y` outer, local `x`
    /// inner); linear tiles in ascending flat index order.
    pub fn cells(&self) -> Cells<'_> {
        Cells {
            tile: self,
            next: 0,
            len: self.cell_count(),
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Selector::Rectangular { x, y } => write!(
                f,
                "ID={} X-interval=[{}, {}) Y-interval=[{}, {})",
                self.id, x.start, x.end, y.start, y.end
            ),
            Selector::Linear { cells, .. } => {
                write!(f, "ID={} Interval=[{}, {})", self.id, cells.start, cells.end)
            }
        }
    }
}

/// Iterator over the cells of a tile
#[derive(Debug, Clone)]
pub struct Cells<'a> {
    tile: &'a Tile,
    next: usize,
    len: usize,
}

impl Iterator for Cells<'_> {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        if self.next >= self.len {
            return None;
        }
        let k = self.next;
        self.next += 1;

        let cell = match &self.tile.selector {
            Selector::Rectangular { x, y } => {
                // len > 0 implies a non-empty x interval
                let local_x = k % x.len();
                let local_y = k / x.len();
                Cell::new(x.start + local_x, y.start + local_y, local_x, local_y)
            }
            Selector::Linear { cells, width } => {
                let flat = cells.start + k;
                // A zero-width grid has no cells; guard hand-built tiles
                let width = (*width).max(1);
                Cell::linear(flat % width, flat / width, k)
            }
        };
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Cells<'_> {}
