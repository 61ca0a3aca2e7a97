//! Grid cells

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error raised when reading an attribute a cell does not carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CellError {
    /// Cells of linear tiles have no local y index
    #[error("Cell has no attribute 'y'")]
    MissingY,
}

/// A single grid cell
///
/// Global coordinates identify the cell in the full grid and are unique
/// across every tile of a decomposition. Local coordinates are relative to
/// the owning tile; cells of linear tiles only have a local `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// The x-direction index of the cell in the full grid
    pub x_global: usize,
    /// The y-direction index of the cell in the full grid
    pub y_global: usize,
    /// The x-direction index of the cell within its tile
    pub x: usize,
    y: Option<usize>,
}

impl Cell {
    /// Create a cell of an area-shaped tile
    pub fn new(x_global: usize, y_global: usize, x: usize, y: usize) -> Self {
        Self {
            x_global,
            y_global,
            x,
            y: Some(y),
        }
    }

    /// Create a cell of a linear tile (no local y index)
    pub fn linear(x_global: usize, y_global: usize, x: usize) -> Self {
        Self {
            x_global,
            y_global,
            x,
            y: None,
        }
    }

    /// The y-direction index of the cell within its tile
    pub fn y(&self) -> Result<usize, CellError> {
        self.y.ok_or(CellError::MissingY)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.y {
            Some(y) => write!(
                f,
                "Cell(x_global={}, y_global={}, x={}, y={})",
                self.x_global, self.y_global, self.x, y
            ),
            None => write!(
                f,
                "Cell(x_global={}, y_global={}, x={})",
                self.x_global, self.y_global, self.x
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_cell_attributes() {
        let cell = Cell::new(1, 2, 3, 4);
        assert_eq!(cell.x_global, 1);
        assert_eq!(cell.y_global, 2);
        assert_eq!(cell.x, 3);
        assert_eq!(cell.y(), Ok(4));
    }

    #[test]
    fn test_linear_cell_has_no_y() {
        let cell = Cell::linear(1, 2, 3);
        assert_eq!(cell.x, 3);
        assert_eq!(cell.y(), Err(CellError::MissingY));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Cell::new(1, 2, 0, 0).to_string(),
            "Cell(x_global=1, y_global=2, x=0, y=0)"
        );
        assert_eq!(
            Cell::linear(5, 6, 7).to_string(),
            "Cell(x_global=5, y_global=6, x=7)"
        );
    }
}
