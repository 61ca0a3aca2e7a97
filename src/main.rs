//! scmtiles CLI entry point
//!
//! Under a launcher (`SCMTILES_RANK`/`SCMTILES_SIZE` or an MPI launcher's
//! variables) this process is one rank of a TCP group. Otherwise the whole
//! group runs as threads of this process.

use anyhow::{Context, Result};
use scmtiles::distributed::{GroupSpec, LocalGroup, TcpTransport, Transport, ROOT};
use scmtiles::error::EXIT_COMMUNICATION_FAILURE;
use scmtiles::runner::CommandRunnerFactory;
use scmtiles::TileTask;
use std::ffi::OsString;
use std::process;
use std::thread;

fn main() {
    scmtiles::logging::init();

    let status = match run() {
        Ok(status) => status,
        Err(e) => {
            tracing::error!("{:#}", e);
            EXIT_COMMUNICATION_FAILURE
        }
    };
    process::exit(status);
}

fn run() -> Result<i32> {
    let spec = GroupSpec::from_env().context("Cannot determine the participant group")?;
    let args: Vec<OsString> = std::env::args_os().collect();

    match spec {
        GroupSpec::Tcp(tcp) => {
            tracing::debug!("Rank {} of {} via {}", tcp.rank, tcp.size, tcp.coordinator);
            let transport =
                TcpTransport::connect(&tcp).context("Failed to form the participant group")?;
            Ok(TileTask::new(transport, CommandRunnerFactory).execute(args))
        }
        GroupSpec::Local { size } => run_local(size, args),
    }
}

/// Run every rank on its own thread; the coordinator's status is returned
fn run_local(size: usize, args: Vec<OsString>) -> Result<i32> {
    tracing::debug!("Running {} participants as threads", size);

    let mut handles = Vec::with_capacity(size);
    for transport in LocalGroup::new(size) {
        let args = args.clone();
        let handle = thread::Builder::new()
            .name(format!("rank-{}", transport.rank()))
            .spawn(move || TileTask::new(transport, CommandRunnerFactory).execute(args))
            .context("Failed to spawn participant thread")?;
        handles.push(handle);
    }

    let mut status = EXIT_COMMUNICATION_FAILURE;
    for (rank, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(code) if rank == ROOT => status = code,
            Ok(_) => {}
            Err(_) => anyhow::bail!("Participant {} panicked", rank),
        }
    }
    Ok(status)
}
