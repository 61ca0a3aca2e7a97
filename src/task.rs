//! Tile task
//!
//! A [`TileTask`] is one participant's view of a run. Every participant
//! goes through the same three phases in lock step, each ending in a
//! collective operation:
//!
//! ```text
//! initialize()  coordinator reads CLI + config, broadcasts status,
//!               broadcasts config, scatters one tile per participant
//! run()         each participant runs its tile (if any), then gather
//! finalize()    coordinator counts failed cells
//! ```
//!
//! An initialization failure on the coordinator is broadcast as an abort
//! status first, so no participant is left waiting for a collective the
//! coordinator never issues.

use crate::config::cli::Cli;
use crate::config::{Config, Validation};
use crate::distributed::{Communicator, Transport};
use crate::error::{ConfigurationError, InitError, TaskError};
use crate::grid::{decompose, Tile};
use crate::runner::{run_tile, RunnerFactory, TileResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Largest process exit status
const MAX_EXIT_STATUS: usize = 255;

/// Lifecycle of a [`TileTask`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Initialized,
    Ran,
    Finalized,
}

/// First value broadcast by the coordinator during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitStatus {
    Proceed,
    Abort { exit_code: i32 },
}

/// One participant of a run
pub struct TileTask<T, F> {
    comm: Communicator<T>,
    factory: F,
    validation: Validation,
    state: TaskState,
    config: Option<Config>,
    tile: Option<Tile>,
    run_info: Option<Vec<Option<TileResult>>>,
}

impl<T: Transport, F: RunnerFactory> TileTask<T, F> {
    pub fn new(transport: T, factory: F) -> Self {
        Self {
            comm: Communicator::new(transport),
            factory,
            validation: Validation::Strict,
            state: TaskState::Created,
            config: None,
            tile: None,
            run_info: None,
        }
    }

    /// Validation applied to the configuration file (coordinator only)
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn is_root(&self) -> bool {
        self.comm.is_root()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Configuration received during initialization
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Tile assigned to this participant, `None` for no work
    pub fn tile(&self) -> Option<&Tile> {
        self.tile.as_ref()
    }

    /// Rank-ordered results gathered by the coordinator
    pub fn run_info(&self) -> Option<&[Option<TileResult>]> {
        self.run_info.as_deref()
    }

    /// Set up configuration and tile assignment on every participant
    ///
    /// `args` is the full command line including the program name; only the
    /// coordinator looks at it.
    pub fn initialize<I, S>(&mut self, args: I) -> Result<(), TaskError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        self.expect_state("initialize", TaskState::Created)?;

        let (config, tiles) = if self.is_root() {
            let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
            match self.load(&args) {
                Ok(config) => {
                    self.comm.broadcast(Some(InitStatus::Proceed))?;
                    let size = self.comm.size();
                    let tiles = decompose(
                        config.grid_width,
                        config.grid_height,
                        size,
                        config.decomposition,
                    );
                    tracing::info!(
                        "Domain of {} cells tiled for {} processes",
                        config.cell_count(),
                        size
                    );
                    (Some(config), Some(tiles))
                }
                Err(e) => {
                    let exit_code = e.exit_code();
                    report(&e);
                    self.comm.broadcast(Some(InitStatus::Abort { exit_code }))?;
                    return Err(TaskError::Exit { code: exit_code });
                }
            }
        } else {
            match self.comm.broadcast::<InitStatus>(None)? {
                InitStatus::Proceed => (None, None),
                InitStatus::Abort { exit_code } => {
                    return Err(TaskError::Exit { code: exit_code })
                }
            }
        };

        let config: Config = self.comm.broadcast(config)?;
        let tile: Option<Tile> = self.comm.scatter(tiles)?;
        match tile {
            Some(ref tile) => tracing::debug!("Rank {} assigned tile {}", self.rank(), tile),
            None => tracing::debug!("Rank {} has no work this round", self.rank()),
        }

        self.config = Some(config);
        self.tile = tile;
        self.state = TaskState::Initialized;
        if self.is_root() {
            tracing::info!("Initialization complete");
        }
        Ok(())
    }

    /// Run this participant's tile and gather every result on the coordinator
    pub fn run(&mut self) -> Result<(), TaskError> {
        self.expect_state("run", TaskState::Initialized)?;
        if self.is_root() {
            tracing::info!("Running tiles");
        }

        let result = match (self.tile.as_ref(), self.config.as_ref()) {
            (Some(tile), Some(config)) => {
                run_own_tile(&self.factory, config, tile, self.comm.rank())
            }
            _ => None,
        };

        self.run_info = self.comm.gather(result)?;
        self.state = TaskState::Ran;
        if self.is_root() {
            tracing::info!("All tiles have completed running");
        }
        Ok(())
    }

    /// Number of failed cells across the whole grid (0 on workers)
    pub fn finalize(&mut self) -> Result<usize, TaskError> {
        self.expect_state("finalize", TaskState::Ran)?;
        self.state = TaskState::Finalized;

        let Some(run_info) = self.run_info.as_deref() else {
            return Ok(0);
        };

        tracing::info!("Performing finalization checks");
        let status = count_failures(run_info);
        tracing::info!("Run complete (status = {})", status);
        Ok(status)
    }

    /// Run all three phases and return this participant's exit status
    ///
    /// The failed-cell count is capped at 255.
    pub fn execute<I, S>(&mut self, args: I) -> i32
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        match self.phases(args) {
            Ok(failed) => failed.min(MAX_EXIT_STATUS) as i32,
            Err(e) => {
                if !matches!(e, TaskError::Exit { .. }) {
                    tracing::error!("{}", e);
                }
                e.exit_code()
            }
        }
    }

    fn phases<I, S>(&mut self, args: I) -> Result<usize, TaskError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        self.initialize(args)?;
        self.run()?;
        self.finalize()
    }

    fn expect_state(&self, operation: &'static str, expected: TaskState) -> Result<(), TaskError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TaskError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Coordinator side of initialization, before anything is communicated
    fn load(&self, args: &[OsString]) -> Result<Config, InitError> {
        let cli = Cli::try_parse_args(args.iter().cloned())?;

        if let Some(program) = args.first() {
            tracing::info!("Running {}", absolute(Path::new(program)).display());
        }
        tracing::info!("Backend scmtiles is version {}", env!("CARGO_PKG_VERSION"));
        tracing::info!("Tile runner factory is {}", std::any::type_name::<F>());

        let config = Config::from_file_with(&cli.config_file_path, self.validation)?;
        tracing::info!(
            "Configuration file loaded successfully: {}",
            absolute(&cli.config_file_path).display()
        );
        tracing::info!("Configuration is: {}", config);

        create_output_directory(&config.output_directory)?;
        Ok(config)
    }
}

fn run_own_tile<F: RunnerFactory>(
    factory: &F,
    config: &Config,
    tile: &Tile,
    rank: usize,
) -> Option<TileResult> {
    let span = tracing::info_span!("tile", id = tile.id, rank);

    let mut runner = match factory.create(config, tile) {
        Ok(runner) => runner,
        Err(e) => {
            tracing::error!(
                parent: &span,
                "Runner for tile #{:03} failed to initialize: {}",
                tile.id,
                e
            );
            return None;
        }
    };

    match run_tile(&mut runner, tile, &span) {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::error!(parent: &span, "Tile #{:03} failed to run: {}", tile.id, e);
            None
        }
    }
}

/// Count failed cells over gathered results, logging each one
///
/// Absent entries (idle participants and tiles that failed outright) carry
/// no cell results and are skipped.
pub fn count_failures(run_info: &[Option<TileResult>]) -> usize {
    let mut status = 0;
    for tile_result in run_info.iter().flatten() {
        if tile_result.failed_cells().next().is_none() {
            continue;
        }
        tracing::error!("Tile #{:03} had failed cells", tile_result.id);
        for cell_result in tile_result.failed_cells() {
            status += 1;
            tracing::error!("- Failed cell: {}", cell_result.cell);
        }
    }
    status
}

fn create_output_directory(dir: &Path) -> Result<(), InitError> {
    if dir.exists() {
        return Ok(());
    }
    match fs::create_dir_all(dir) {
        Ok(()) => {
            tracing::info!("Created output directory: {}", dir.display());
            Ok(())
        }
        Err(e) => Err(output_directory_error(dir, e)),
    }
}

fn output_directory_error(dir: &Path, e: io::Error) -> InitError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        InitError::OutputPermission(dir.to_path_buf())
    } else {
        ConfigurationError::new(format!(
            "Cannot create output directory \"{}\": {}",
            dir.display(),
            e
        ))
        .into()
    }
}

/// Print or log an initialization failure the way the user expects to see it
fn report(e: &InitError) {
    match e {
        InitError::Help(text) => print!("{}", text),
        InitError::Cli(text) => eprint!("{}", text),
        other => tracing::error!("{}", other),
    }
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::LocalGroup;
    use crate::error::{TileInitializationError, TileRunError};
    use crate::grid::Cell;
    use crate::runner::{CellResult, TileRunner};
    use std::thread;
    use tempfile::TempDir;
    use tracing::Span;

    /// Succeeds on every cell
    struct AllGood;

    impl TileRunner for AllGood {
        fn run_cell(&mut self, cell: &Cell, _span: &Span) -> Result<CellResult, TileRunError> {
            Ok(CellResult::success(*cell, vec![]))
        }
    }

    fn all_good(_: &Config, _: &Tile) -> Result<AllGood, TileInitializationError> {
        Ok(AllGood)
    }

    fn write_config(root: &Path, gridx: i64, gridy: i64) -> PathBuf {
        for dir in ["input", "template", "work"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        let path = root.join("run.toml");
        fs::write(
            &path,
            format!(
                "[default]\nstart_time = \"2016-01-01T00:00:00\"\ngridx = {}\ngridy = {}\n\
                 input_directory = \"{root}/input\"\noutput_directory = \"{root}/output\"\n\
                 work_directory = \"{root}/work\"\ntemplate_directory = \"{root}/template\"\n",
                gridx,
                gridy,
                root = root.display()
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_phases_out_of_order() {
        let mut group = LocalGroup::new(1);
        let mut task = TileTask::new(group.remove(0), all_good);
        assert_eq!(task.state(), TaskState::Created);

        match task.run() {
            Err(TaskError::InvalidState { operation, state }) => {
                assert_eq!(operation, "run");
                assert_eq!(state, TaskState::Created);
            }
            other => panic!("expected InvalidState, got {:?}", other),
        }
        assert!(matches!(
            task.finalize(),
            Err(TaskError::InvalidState { operation: "finalize", .. })
        ));
    }

    #[test]
    fn test_single_participant_run() {
        let root = TempDir::new().unwrap();
        let config_path = write_config(root.path(), 3, 2);

        let mut group = LocalGroup::new(1);
        let mut task = TileTask::new(group.remove(0), all_good);
        task.initialize(["scmtiles".into(), config_path.into_os_string()])
            .unwrap();

        assert_eq!(task.state(), TaskState::Initialized);
        assert_eq!(task.tile(), Some(&Tile::rectangular(0, 0..3, 0..2)));
        assert!(root.path().join("output").is_dir());

        task.run().unwrap();
        let run_info = task.run_info().unwrap();
        assert_eq!(run_info.len(), 1);
        assert_eq!(run_info[0].as_ref().unwrap().cell_results.len(), 6);

        assert_eq!(task.finalize().unwrap(), 0);
        assert_eq!(task.state(), TaskState::Finalized);
        assert!(task.initialize(["scmtiles"]).is_err());
    }

    #[test]
    fn test_help_releases_workers() {
        let handles: Vec<_> = LocalGroup::new(3)
            .into_iter()
            .map(|transport| {
                thread::spawn(move || {
                    let mut task = TileTask::new(transport, all_good);
                    let code = task.execute(["scmtiles", "--help"]);
                    (task.state(), code)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), (TaskState::Created, 0));
        }
    }

    #[test]
    fn test_worker_leaves_with_abort_code() {
        let mut group = LocalGroup::new(2);
        let worker = group.pop().unwrap();
        let coordinator = group.pop().unwrap();

        let root = thread::spawn(move || {
            TileTask::new(coordinator, all_good).execute(["scmtiles", "/no/such/config.toml"])
        });
        let mut task = TileTask::new(worker, all_good);
        match task.initialize(["ignored on workers"]) {
            Err(TaskError::Exit { code }) => assert_eq!(code, 1),
            other => panic!("expected exit, got {:?}", other),
        }
        assert_eq!(root.join().unwrap(), 1);
    }

    #[test]
    fn test_count_failures() {
        let failing = TileResult {
            id: 1,
            cell_results: vec![
                CellResult::failure(Cell::new(0, 0, 0, 0)),
                CellResult::success(Cell::new(1, 0, 1, 0), vec![]),
                CellResult::failure(Cell::new(2, 0, 2, 0)),
            ],
        };
        let passing = TileResult {
            id: 0,
            cell_results: vec![CellResult::success(Cell::new(0, 1, 0, 0), vec![])],
        };
        assert_eq!(count_failures(&[Some(passing.clone()), None, Some(failing)]), 2);
        assert_eq!(count_failures(&[Some(passing), None]), 0);
        assert_eq!(count_failures(&[]), 0);
    }

    #[test]
    fn test_output_directory_errors() {
        let dir = Path::new("/scratch/out");

        let err = output_directory_error(dir, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, InitError::OutputPermission(ref path) if path == dir));
        assert_eq!(err.exit_code(), 2);

        let err = output_directory_error(dir, io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(matches!(err, InitError::Configuration(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_output_directory_created_once() {
        let root = TempDir::new().unwrap();
        let out = root.path().join("a").join("b");
        create_output_directory(&out).unwrap();
        assert!(out.is_dir());
        create_output_directory(&out).unwrap();
    }
}
