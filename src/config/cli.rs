//! CLI argument parsing using clap

use crate::error::InitError;
use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// SCM Tiles - run a single-column model over every cell of a grid
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "scmtiles")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the program configuration file
    #[arg(value_name = "CONFIG_FILE_PATH")]
    pub config_file_path: PathBuf,
}

impl Cli {
    /// Parse CLI arguments without exiting the process
    ///
    /// `args` includes the program name. Help and version requests come back
    /// as [`InitError::Help`] so the caller can release the rest of the group
    /// before leaving.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, InitError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                InitError::Help(e.render().to_string())
            }
            _ => InitError::Cli(e.render().to_string()),
        })
    }
}
