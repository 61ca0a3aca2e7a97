//! External model runner
//!
//! Runs the `[model] command` once per cell inside a fresh run directory
//! populated with links to the template directory. The model learns which
//! cell it is simulating from the environment:
//!
//! - `SCMTILES_X_GLOBAL`, `SCMTILES_Y_GLOBAL`: global cell coordinates
//! - `SCMTILES_TILE_ID`: id of the owning tile
//! - `SCMTILES_START_TIME`: simulation start, `YYYY-MM-DDTHH:MM:SS`
//! - `SCMTILES_INPUT_FILE`: input file path (only with `input_file_pattern`)
//!
//! Model stdout and stderr are appended to the tile log in the output
//! directory.

use super::workdir::{
    archive_output, create_run_directory, input_file_name, link_template, TIMESTAMP_FORMAT,
};
use super::{CellResult, RunnerFactory, TileRunner};
use crate::config::{Config, ModelConfig};
use crate::error::{TileInitializationError, TileRunError};
use crate::grid::{Cell, Tile};
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::Span;

/// Builds a [`CommandRunner`] from the `[model]` section
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunnerFactory;

impl RunnerFactory for CommandRunnerFactory {
    type Runner = CommandRunner;

    fn create(
        &self,
        config: &Config,
        tile: &Tile,
    ) -> Result<CommandRunner, TileInitializationError> {
        CommandRunner::new(config, tile)
    }
}

/// Per-tile log file
#[derive(Debug)]
struct TileLog {
    path: PathBuf,
    file: File,
    tile_id: usize,
}

impl TileLog {
    fn open(output_dir: &Path, tile_id: usize, config: &Config) -> Result<Self, TileRunError> {
        let path = output_dir.join(format!(
            "run.{:03}.{}.log",
            tile_id,
            config.start_time.format(TIMESTAMP_FORMAT)
        ));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|_| {
                TileRunError::new(format!(
                    "Cannot write to the output directory: {}",
                    output_dir.display()
                ))
            })?;
        Ok(Self { path, file, tile_id })
    }

    fn write(&mut self, level: &str, msg: impl Display) {
        let line = format!(
            "[{}] (tile #{:03}) {} {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.tile_id,
            level,
            msg
        );
        if let Err(e) = self.file.write_all(line.as_bytes()) {
            tracing::warn!("Failed to write tile log {}: {}", self.path.display(), e);
        }
    }

    fn stdio(&self) -> Stdio {
        shared_stdio(&self.path, self.file.try_clone())
    }
}

/// Model stdio writing into the log at `path`, discarded (with a warning) if
/// the log handle could not be duplicated
fn shared_stdio(path: &Path, file: io::Result<File>) -> Stdio {
    match file {
        Ok(file) => Stdio::from(file),
        Err(e) => {
            tracing::warn!(
                "Cannot share tile log {} with the model, output discarded: {}",
                path.display(),
                e
            );
            Stdio::null()
        }
    }
}

/// Runs an external model program for every cell of a tile
#[derive(Debug)]
pub struct CommandRunner {
    config: Config,
    model: ModelConfig,
    tile_id: usize,
    log: Option<TileLog>,
}

impl CommandRunner {
    pub fn new(config: &Config, tile: &Tile) -> Result<Self, TileInitializationError> {
        let model = config.model.clone().ok_or_else(|| {
            TileInitializationError::new("No [model] section in the configuration")
        })?;
        if model.command.is_empty() {
            return Err(TileInitializationError::new("The [model] command is empty"));
        }
        Ok(Self {
            config: config.clone(),
            model,
            tile_id: tile.id,
            log: None,
        })
    }

    fn log(&mut self, level: &str, msg: impl Display) {
        if let Some(log) = self.log.as_mut() {
            log.write(level, msg);
        }
    }

    fn command(&self, cell: &Cell, run_dir: &Path) -> Command {
        let mut command = Command::new(&self.model.command[0]);
        command
            .args(&self.model.command[1..])
            .current_dir(run_dir)
            .env("SCMTILES_X_GLOBAL", cell.x_global.to_string())
            .env("SCMTILES_Y_GLOBAL", cell.y_global.to_string())
            .env("SCMTILES_TILE_ID", self.tile_id.to_string())
            .env(
                "SCMTILES_START_TIME",
                self.config.start_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            )
            .stdin(Stdio::null());

        if let Some(ref pattern) = self.config.input_file_pattern {
            let name = input_file_name(pattern, cell, &self.config.start_time);
            command.env("SCMTILES_INPUT_FILE", self.config.input_directory.join(name));
        }

        match self.log {
            Some(ref log) => command.stdout(log.stdio()).stderr(log.stdio()),
            None => command.stdout(Stdio::null()).stderr(Stdio::null()),
        };
        command
    }

    fn collect_outputs(
        &mut self,
        cell: &Cell,
        run_dir: &Path,
    ) -> Result<Option<Vec<PathBuf>>, TileRunError> {
        let mut archived = Vec::with_capacity(self.model.outputs.len());
        for output in self.model.outputs.clone() {
            let produced = run_dir.join(&output);
            if !produced.exists() {
                let msg = format!("{}: expected output \"{}\" was not produced", cell, output);
                self.log("ERROR", msg);
                return Ok(None);
            }
            archived.push(archive_output(
                &produced,
                &self.config.output_directory,
                cell,
                &self.config.start_time,
            )?);
        }
        Ok(Some(archived))
    }
}

impl TileRunner for CommandRunner {
    fn start(&mut self, span: &Span) -> Result<(), TileRunError> {
        let mut log = TileLog::open(&self.config.output_directory, self.tile_id, &self.config)?;
        tracing::info!(
            parent: span,
            "Logging tile #{:03} to: {}",
            self.tile_id,
            log.path.display()
        );
        log.write("INFO", "Run started");
        self.log = Some(log);
        Ok(())
    }

    fn run_cell(&mut self, cell: &Cell, span: &Span) -> Result<CellResult, TileRunError> {
        let run_dir = create_run_directory(&self.config.work_directory)?;
        link_template(&self.config.template_directory, &run_dir)?;
        self.log("INFO", format!("{}: running in {}", cell, run_dir.display()));

        let status = self
            .command(cell, &run_dir)
            .status()
            .map_err(|e| {
                TileRunError::new(format!(
                    "Failed to run model command \"{}\": {}",
                    self.model.command[0], e
                ))
            })?;

        if !status.success() {
            self.log("ERROR", format!("{}: model exited with {}", cell, status));
            tracing::debug!(parent: span, "Keeping run directory {}", run_dir.display());
            return Ok(CellResult::failure(*cell));
        }

        let outputs = match self.collect_outputs(cell, &run_dir)? {
            Some(outputs) => outputs,
            None => return Ok(CellResult::failure(*cell)),
        };

        if !self.model.keep_run_directories {
            if let Err(e) = fs::remove_dir_all(&run_dir) {
                tracing::warn!(
                    parent: span,
                    "Cannot remove run directory {}: {}",
                    run_dir.display(),
                    e
                );
            }
        }

        self.log("INFO", format!("{}: done", cell));
        Ok(CellResult::success(*cell, outputs))
    }

    fn finish(&mut self, _span: &Span) -> Result<(), TileRunError> {
        self.log("INFO", "Finished running tile");
        self.log = None;
        Ok(())
    }
}
