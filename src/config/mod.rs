//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Only the coordinator reads configuration; everyone else receives the
//! validated [`Config`] through a broadcast, which is why it is serializable.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::error::ConfigurationError;
use crate::grid::Decomposition;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use validator::Validation;

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Start time of the simulations
    pub start_time: NaiveDateTime,
    /// Grid size in the x-direction
    pub grid_width: usize,
    /// Grid size in the y-direction
    pub grid_height: usize,
    /// How the grid is split among participants
    pub decomposition: Decomposition,
    /// Directory holding model input files (must exist)
    pub input_directory: PathBuf,
    /// Directory receiving archived outputs and tile logs
    pub output_directory: PathBuf,
    /// Directory in which per-cell run directories are created
    pub work_directory: PathBuf,
    /// Directory whose contents are linked into every run directory (must exist)
    pub template_directory: PathBuf,
    /// Input file name pattern, placeholders `{time}`, `{x}` and `{y}`
    pub input_file_pattern: Option<String>,
    /// External model invocation
    pub model: Option<ModelConfig>,
}

/// External model command run once per cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Program and arguments, run inside the cell's run directory
    pub command: Vec<String>,
    /// Files the model leaves in the run directory, archived on success
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Keep run directories after successful cells
    #[serde(default)]
    pub keep_run_directories: bool,
}

impl Config {
    /// Load and strictly validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        Self::from_file_with(path, Validation::Strict)
    }

    /// Load a configuration file with the given validation level
    pub fn from_file_with(path: &Path, validation: Validation) -> Result<Self, ConfigurationError> {
        let file = toml::parse_config_file(path)?;
        validator::validate(file, validation)
    }

    /// Number of cells in the grid
    pub fn cell_count(&self) -> usize {
        self.grid_width.saturating_mul(self.grid_height)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Config(start_time=\"{}\", gridx={}, gridy={}, decomposition={:?}, \
             input_directory=\"{}\", output_directory=\"{}\", \
             work_directory=\"{}\", template_directory=\"{}\"",
            self.start_time,
            self.grid_width,
            self.grid_height,
            self.decomposition,
            self.input_directory.display(),
            self.output_directory.display(),
            self.work_directory.display(),
            self.template_directory.display(),
        )?;
        if let Some(ref pattern) = self.input_file_pattern {
            write!(f, ", input_file_pattern=\"{}\"", pattern)?;
        }
        if let Some(ref model) = self.model {
            write!(f, ", model={:?}", model.command)?;
        }
        write!(f, ")")
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references
///
/// Unset variables are left untouched.
pub fn expand_path(raw: &str) -> PathBuf {
    let home_expanded = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match std::env::var("HOME") {
            Ok(home) => format!("{}{}", home, rest),
            Err(_) => raw.to_string(),
        },
        _ => raw.to_string(),
    };
    PathBuf::from(expand_vars(&home_expanded))
}

fn expand_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), std::env::var(name)) {
            (false, Ok(value)) => out.push_str(&value),
            _ => {
                out.push('$');
                out.push_str(&after[..consumed]);
            }
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// Parse a start time in one of the accepted formats
pub fn parse_start_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
