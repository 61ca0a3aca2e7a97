//! SCM Tiles - run a single-column model over every cell of a grid
//!
//! A fixed group of participants splits a 2-D grid into tiles, one per
//! participant. The coordinator (rank 0) reads the configuration and hands
//! out the tiles; every participant runs its tile cell by cell with an
//! injected runner, and the coordinator collects the results and reports
//! the failed cells.
//!
//! # Architecture
//!
//! - **Grid**: rows or cells decomposition with sentinel padding
//! - **Distributed**: broadcast / scatter / gather over local threads or TCP
//! - **Runner**: per-tile runner capability and an external-command runner
//! - **Task**: the initialize → run → finalize state machine

pub mod config;
pub mod distributed;
pub mod error;
pub mod grid;
pub mod logging;
pub mod runner;
pub mod task;

// Re-export commonly used types
pub use config::Config;
pub use grid::{Cell, Decomposition, Tile};
pub use runner::{CellResult, RunnerFactory, TileResult, TileRunner};
pub use task::{TaskState, TileTask};

/// Result type used throughout scmtiles
pub type Result<T> = anyhow::Result<T>;
