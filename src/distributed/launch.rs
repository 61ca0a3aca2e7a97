//! Group membership from the launcher environment
//!
//! A launcher (an MPI `mpirun`, a batch scheduler, or a shell loop) starts
//! one process per rank and tells each its rank and the group size through
//! environment variables. Recognized, first match wins:
//!
//! | Rank                   | Size                   |
//! |------------------------|------------------------|
//! | `SCMTILES_RANK`        | `SCMTILES_SIZE`        |
//! | `OMPI_COMM_WORLD_RANK` | `OMPI_COMM_WORLD_SIZE` |
//! | `PMI_RANK`             | `PMI_SIZE`             |
//!
//! Without any of them the whole group runs as threads of this process.

use super::tcp::TcpGroupSpec;
use anyhow::{Context, Result};
use std::time::Duration;

/// Coordinator address used when `SCMTILES_COORDINATOR` is unset
pub const DEFAULT_COORDINATOR: &str = "127.0.0.1:7300";

/// Group formation timeout used when `SCMTILES_JOIN_TIMEOUT` is unset
pub const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 60;

const RANK_SIZE_VARS: [(&str, &str); 3] = [
    ("SCMTILES_RANK", "SCMTILES_SIZE"),
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
];

/// How this process takes part in a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSpec {
    /// All ranks as threads of this process
    Local { size: usize },
    /// This process is one rank of a TCP group
    Tcp(TcpGroupSpec),
}

impl GroupSpec {
    /// Read the group description from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the group description through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let found = RANK_SIZE_VARS
            .iter()
            .find(|vars| lookup(vars.0).is_some());

        let (rank_var, size_var) = match found {
            Some(vars) => *vars,
            None => {
                let size = match lookup("SCMTILES_LOCAL_SIZE") {
                    Some(value) => parse_count("SCMTILES_LOCAL_SIZE", &value)?,
                    None => num_cpus::get(),
                };
                if size == 0 {
                    anyhow::bail!("SCMTILES_LOCAL_SIZE must be at least 1");
                }
                return Ok(GroupSpec::Local { size });
            }
        };

        let rank_value = lookup(rank_var).unwrap_or_default();
        let rank = parse_count(rank_var, &rank_value)?;
        let size_value = lookup(size_var)
            .with_context(|| format!("{} is set but {} is not", rank_var, size_var))?;
        let size = parse_count(size_var, &size_value)?;
        if size == 0 || rank >= size {
            anyhow::bail!("{}={} is out of range for {}={}", rank_var, rank, size_var, size);
        }

        let coordinator =
            lookup("SCMTILES_COORDINATOR").unwrap_or_else(|| DEFAULT_COORDINATOR.to_string());
        let join_timeout = match lookup("SCMTILES_JOIN_TIMEOUT") {
            Some(value) => parse_count("SCMTILES_JOIN_TIMEOUT", &value)? as u64,
            None => DEFAULT_JOIN_TIMEOUT_SECS,
        };

        Ok(GroupSpec::Tcp(TcpGroupSpec {
            rank,
            size,
            coordinator,
            join_timeout: Duration::from_secs(join_timeout),
        }))
    }

    /// Number of participants in the group
    pub fn size(&self) -> usize {
        match self {
            GroupSpec::Local { size } => *size,
            GroupSpec::Tcp(spec) => spec.size,
        }
    }
}

fn parse_count(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a non-negative integer, got \"{}\"", name, value))
}
