//! TCP participant group
//!
//! One process per rank. Rank 0 listens on the coordinator address and
//! accepts a connection from every other rank; each worker connects,
//! retrying until the coordinator is up, and introduces itself with a
//! `Join` message. Messages are framed as described in
//! [`protocol`](super::protocol).
//!
//! The transport is blocking: each call drives the async stream I/O to
//! completion on a private single-threaded tokio runtime.

use super::comm::{Transport, ROOT};
use super::protocol::{
    describe, read_message, write_message, JoinMessage, Message, PROTOCOL_VERSION,
};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::time::{sleep, timeout, Instant};

/// Interval between connection attempts while the coordinator starts up
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Where and how a TCP group is formed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpGroupSpec {
    /// Rank of this process
    pub rank: usize,
    /// Number of processes in the group
    pub size: usize,
    /// `host:port` the coordinator listens on
    pub coordinator: String,
    /// How long group formation may take
    pub join_timeout: Duration,
}

/// One process's end of a TCP group
#[derive(Debug)]
pub struct TcpTransport {
    rank: usize,
    size: usize,
    runtime: Runtime,
    streams: Vec<Option<TcpStream>>,
}

impl TcpTransport {
    /// Form the group: listen as the coordinator, or join it as a worker
    pub fn connect(spec: &TcpGroupSpec) -> Result<Self> {
        if spec.size == 0 || spec.rank >= spec.size {
            anyhow::bail!("Invalid rank {} for group size {}", spec.rank, spec.size);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        let streams = if spec.rank == ROOT {
            runtime.block_on(accept_workers(spec))?
        } else {
            runtime.block_on(join_coordinator(spec))?
        };

        Ok(Self {
            rank: spec.rank,
            size: spec.size,
            runtime,
            streams,
        })
    }
}

impl Transport for TcpTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, to: usize, msg: Message) -> Result<()> {
        let rank = self.rank;
        let stream = self
            .streams
            .get_mut(to)
            .and_then(Option::as_mut)
            .with_context(|| format!("Rank {} has no connection to rank {}", rank, to))?;
        self.runtime.block_on(write_message(stream, &msg))
    }

    fn recv(&mut self, from: usize) -> Result<Message> {
        let rank = self.rank;
        let stream = self
            .streams
            .get_mut(from)
            .and_then(Option::as_mut)
            .with_context(|| format!("Rank {} has no connection from rank {}", rank, from))?;
        self.runtime.block_on(read_message(stream))
    }
}

/// Coordinator side: accept and identify every worker
async fn accept_workers(spec: &TcpGroupSpec) -> Result<Vec<Option<TcpStream>>> {
    let mut streams: Vec<Option<TcpStream>> = (0..spec.size).map(|_| None).collect();
    if spec.size == 1 {
        return Ok(streams);
    }

    let listener = TcpListener::bind(&spec.coordinator)
        .await
        .with_context(|| format!("Failed to bind coordinator address {}", spec.coordinator))?;
    tracing::debug!(
        "Coordinator listening on {} for {} workers",
        spec.coordinator,
        spec.size - 1
    );

    let deadline = Instant::now() + spec.join_timeout;
    let mut joined = 0;
    while joined < spec.size - 1 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (mut stream, addr) = timeout(remaining, listener.accept())
            .await
            .with_context(|| {
                format!(
                    "Timed out waiting for workers to join ({} of {} joined)",
                    joined,
                    spec.size - 1
                )
            })?
            .context("Failed to accept connection")?;
        stream.set_nodelay(true).ok();

        let msg = timeout(remaining, read_message(&mut stream))
            .await
            .with_context(|| format!("Timed out waiting for JOIN from {}", addr))??;
        let join = match msg {
            Message::Join(join) => join,
            other => anyhow::bail!("Expected JOIN from {}, got {}", addr, describe(&other)),
        };
        validate_join(&join, spec.size, &streams)?;

        tracing::debug!("Rank {} joined from {} ({})", join.rank, join.host, addr);
        streams[join.rank] = Some(stream);
        joined += 1;
    }

    Ok(streams)
}

fn validate_join(join: &JoinMessage, size: usize, streams: &[Option<TcpStream>]) -> Result<()> {
    if join.protocol_version != PROTOCOL_VERSION {
        anyhow::bail!(
            "Protocol version mismatch on rank {}: expected {}, got {}",
            join.rank,
            PROTOCOL_VERSION,
            join.protocol_version
        );
    }
    if join.size != size {
        anyhow::bail!(
            "Rank {} was launched for a group of {}, coordinator expects {}",
            join.rank,
            join.size,
            size
        );
    }
    if join.rank == ROOT || join.rank >= size {
        anyhow::bail!("Rank {} is not a valid worker rank for group size {}", join.rank, size);
    }
    if streams[join.rank].is_some() {
        anyhow::bail!("Rank {} joined twice", join.rank);
    }
    Ok(())
}

/// Worker side: connect to the coordinator and introduce ourselves
async fn join_coordinator(spec: &TcpGroupSpec) -> Result<Vec<Option<TcpStream>>> {
    let deadline = Instant::now() + spec.join_timeout;

    let mut stream = loop {
        match TcpStream::connect(&spec.coordinator).await {
            Ok(stream) => break stream,
            Err(e) if Instant::now() < deadline => {
                tracing::trace!("Coordinator {} not reachable yet: {}", spec.coordinator, e);
                sleep(CONNECT_RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to connect to coordinator {}", spec.coordinator)
                })
            }
        }
    };
    stream.set_nodelay(true).ok();

    let join = JoinMessage {
        protocol_version: PROTOCOL_VERSION,
        rank: spec.rank,
        size: spec.size,
        host: host_name(),
    };
    write_message(&mut stream, &Message::Join(join))
        .await
        .context("Failed to send JOIN to the coordinator")?;

    let mut streams: Vec<Option<TcpStream>> = (0..spec.size).map(|_| None).collect();
    streams[ROOT] = Some(stream);
    Ok(streams)
}

/// Host name of this participant, or "unknown"
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
