//! Configuration validation

use super::toml::ConfigFile;
use super::Config;
use crate::error::ConfigurationError;
use std::path::Path;

/// How thoroughly a configuration file is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// Grid sizes must be positive and required directories must exist
    #[default]
    Strict,
    /// Only type checks; used by tooling that inspects foreign configs
    Lenient,
}

/// Validate a parsed configuration file into a [`Config`]
pub fn validate(file: ConfigFile, validation: Validation) -> Result<Config, ConfigurationError> {
    let strict = validation == Validation::Strict;

    if strict {
        validate_grid(file.gridx, file.gridy)?;
        validate_existing_dir("input", &file.input_directory)?;
        validate_existing_dir("template", &file.template_directory)?;
    }

    // Negative sizes can only reach here in lenient mode
    let grid_width = usize::try_from(file.gridx).unwrap_or(0);
    let grid_height = usize::try_from(file.gridy).unwrap_or(0);
    if grid_width.checked_mul(grid_height).is_none() {
        return Err(grid_too_large(file.gridx, file.gridy));
    }

    if let Some(ref model) = file.model {
        if strict && model.command.is_empty() {
            return Err(ConfigurationError::new(
                "The model command in section \"[model]\" must not be empty.",
            ));
        }
    }

    Ok(Config {
        start_time: file.start_time,
        grid_width,
        grid_height,
        decomposition: file.decomposition,
        input_directory: file.input_directory,
        output_directory: file.output_directory,
        work_directory: file.work_directory,
        template_directory: file.template_directory,
        input_file_pattern: file.input_file_pattern,
        model: file.model,
    })
}

/// Grid must have positive sizes in x and y directions
///
/// The cell count `gridx * gridy` must also be addressable.
pub fn validate_grid(gridx: i64, gridy: i64) -> Result<(), ConfigurationError> {
    if gridx <= 0 || gridy <= 0 {
        return Err(ConfigurationError(format!(
            "Grid sizes must be >= 1, got gridx={} and gridy={}.",
            gridx, gridy
        )));
    }
    let cells = usize::try_from(gridx)
        .ok()
        .zip(usize::try_from(gridy).ok())
        .and_then(|(x, y)| x.checked_mul(y));
    if cells.is_none() {
        return Err(grid_too_large(gridx, gridy));
    }
    Ok(())
}

fn grid_too_large(gridx: i64, gridy: i64) -> ConfigurationError {
    ConfigurationError(format!(
        "Grid gridx={} by gridy={} has more cells than can be addressed.",
        gridx, gridy
    ))
}

fn validate_existing_dir(kind: &str, dir: &Path) -> Result<(), ConfigurationError> {
    if !dir.exists() {
        return Err(ConfigurationError(format!(
            "The {} directory \"{}\" does not exist.",
            kind,
            dir.display()
        )));
    }
    Ok(())
}
