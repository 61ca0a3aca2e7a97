//! Grid decomposition
//!
//! The grid itself is never materialized: it is a `width × height` pair of
//! integers indexed `(x, y)` with `x` varying fastest. This module turns
//! those dimensions into tiles, one per participant, and lets each tile
//! enumerate the cells it covers.
//!
//! # Modules
//!
//! - `cell`: A single grid point with local and global coordinates
//! - `tile`: A sub-region of the grid and its cell enumeration
//! - `partition`: Row and cell decompositions with sentinel padding

pub mod cell;
pub mod partition;
pub mod tile;

pub use cell::{Cell, CellError};
pub use partition::{decompose, decompose_by_cells, decompose_by_rows, Decomposition};
pub use tile::{Cells, Selector, Tile};
