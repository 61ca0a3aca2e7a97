//! Tile runners
//!
//! A tile runner simulates every cell of one tile. The framework owns the
//! loop (`run_tile`); a runner only knows how to set itself up for a tile
//! and how to run a single cell. Runners are built on each participant by a
//! [`RunnerFactory`] from the broadcast configuration and the scattered tile.
//!
//! # Modules
//!
//! - `workdir`: Run directories, template links, output archiving
//! - `command`: A runner that executes an external model per cell

pub mod command;
pub mod workdir;

use crate::config::Config;
use crate::error::{TileInitializationError, TileRunError};
use crate::grid::{Cell, Tile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Span;

pub use command::{CommandRunner, CommandRunnerFactory};
pub use workdir::{archive_output, create_run_directory, input_file_name, link_template};

/// Outcome of simulating one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellResult {
    pub cell: Cell,
    /// Output files produced, or `None` when the cell failed
    pub outputs: Option<Vec<PathBuf>>,
}

impl CellResult {
    pub fn success(cell: Cell, outputs: Vec<PathBuf>) -> Self {
        Self {
            cell,
            outputs: Some(outputs),
        }
    }

    pub fn failure(cell: Cell) -> Self {
        Self { cell, outputs: None }
    }

    pub fn failed(&self) -> bool {
        self.outputs.is_none()
    }
}

/// Outcome of simulating a whole tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileResult {
    /// Id of the tile that was run
    pub id: usize,
    /// One entry per cell, in the tile's cell order
    pub cell_results: Vec<CellResult>,
}

impl TileResult {
    /// Cells of this tile whose simulation failed
    pub fn failed_cells(&self) -> impl Iterator<Item = &CellResult> {
        self.cell_results.iter().filter(|r| r.failed())
    }
}

/// Capability to simulate the cells of one tile
///
/// `span` is the tile's logging context; runners log through it (or enter
/// it) so every record carries the tile id and rank.
pub trait TileRunner {
    /// Called once before the first cell
    fn start(&mut self, _span: &Span) -> Result<(), TileRunError> {
        Ok(())
    }

    /// Simulate one cell
    ///
    /// A failed simulation is an `Ok` result with no outputs; `Err` aborts
    /// the rest of the tile.
    fn run_cell(&mut self, cell: &Cell, span: &Span) -> Result<CellResult, TileRunError>;

    /// Called once after the last cell
    fn finish(&mut self, _span: &Span) -> Result<(), TileRunError> {
        Ok(())
    }
}

/// Builds a runner for one tile
pub trait RunnerFactory {
    type Runner: TileRunner;

    fn create(&self, config: &Config, tile: &Tile) -> Result<Self::Runner, TileInitializationError>;
}

impl<F, R> RunnerFactory for F
where
    F: Fn(&Config, &Tile) -> Result<R, TileInitializationError>,
    R: TileRunner,
{
    type Runner = R;

    fn create(&self, config: &Config, tile: &Tile) -> Result<R, TileInitializationError> {
        self(config, tile)
    }
}

/// Drive `runner` over every cell of `tile` in order
pub fn run_tile<R: TileRunner + ?Sized>(
    runner: &mut R,
    tile: &Tile,
    span: &Span,
) -> Result<TileResult, TileRunError> {
    let _entered = span.enter();
    tracing::debug!("Run started for {} cells", tile.cell_count());

    runner.start(span)?;
    let mut cell_results = Vec::new();
    for cell in tile.cells() {
        let result = runner.run_cell(&cell, span)?;
        if result.failed() {
            tracing::warn!("Cell failed: {}", cell);
        }
        cell_results.push(result);
    }
    runner.finish(span)?;

    tracing::debug!("Finished running tile");
    Ok(TileResult {
        id: tile.id,
        cell_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info_span;

    /// Records lifecycle calls and fails cells whose global x is odd
    #[derive(Default)]
    struct OddFails {
        events: Vec<String>,
        abort_at: Option<usize>,
    }

    impl TileRunner for OddFails {
        fn start(&mut self, _span: &Span) -> Result<(), TileRunError> {
            self.events.push("start".into());
            Ok(())
        }

        fn run_cell(&mut self, cell: &Cell, _span: &Span) -> Result<CellResult, TileRunError> {
            if self.abort_at == Some(self.events.len()) {
                return Err(TileRunError::new("model crashed"));
            }
            self.events.push(format!("cell {}", cell.x_global));
            if cell.x_global % 2 == 1 {
                Ok(CellResult::failure(*cell))
            } else {
                Ok(CellResult::success(*cell, vec![PathBuf::from("out.nc")]))
            }
        }

        fn finish(&mut self, _span: &Span) -> Result<(), TileRunError> {
            self.events.push("finish".into());
            Ok(())
        }
    }

    #[test]
    fn test_run_tile_visits_cells_in_order() {
        let tile = Tile::rectangular(4, 0..3, 1..2);
        let mut runner = OddFails::default();
        let result = run_tile(&mut runner, &tile, &info_span!("tile")).unwrap();

        assert_eq!(result.id, 4);
        assert_eq!(
            runner.events,
            vec!["start", "cell 0", "cell 1", "cell 2", "finish"]
        );
        assert_eq!(result.cell_results.len(), 3);
        let failed: Vec<usize> = result.failed_cells().map(|r| r.cell.x_global).collect();
        assert_eq!(failed, vec![1]);
    }

    #[test]
    fn test_run_error_aborts_tile() {
        let tile = Tile::linear(0, 0..4, 2);
        let mut runner = OddFails {
            abort_at: Some(2),
            ..Default::default()
        };
        let err = run_tile(&mut runner, &tile, &Span::none()).unwrap_err();
        assert_eq!(err.to_string(), "model crashed");
        assert!(!runner.events.contains(&"finish".to_string()));
    }

    #[test]
    fn test_empty_tile() {
        let tile = Tile::linear(1, 3..3, 2);
        let mut runner = OddFails::default();
        let result = run_tile(&mut runner, &tile, &Span::none()).unwrap();
        assert!(result.cell_results.is_empty());
        assert_eq!(runner.events, vec!["start", "finish"]);
    }

    #[test]
    fn test_closure_factory() {
        let factory = |_: &Config, tile: &Tile| {
            if tile.id == 9 {
                Err(TileInitializationError::new("no input for tile 9"))
            } else {
                Ok(OddFails::default())
            }
        };
        let config = crate::config::tests::sample_config(std::path::Path::new("/tmp"));
        assert!(factory.create(&config, &Tile::linear(0, 0..1, 1)).is_ok());
        assert!(factory.create(&config, &Tile::linear(9, 0..1, 1)).is_err());
    }

    #[test]
    fn test_cell_result_helpers() {
        let cell = Cell::new(1, 2, 0, 0);
        assert!(CellResult::failure(cell).failed());
        assert!(!CellResult::success(cell, vec![]).failed());
    }
}
