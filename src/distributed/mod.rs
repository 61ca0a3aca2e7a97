//! Participant groups and collective communication
//!
//! # Architecture
//!
//! A run is carried out by a fixed group of participants identified by rank
//! in `[0, size)`. Rank 0 is the coordinator; every collective is rooted
//! there and all traffic flows between rank 0 and one other rank:
//!
//! - **Coordinator** (rank 0): parses configuration, decomposes the grid,
//!   broadcasts and scatters, gathers results
//! - **Workers** (ranks 1..size): receive a tile, run it, report back
//!
//! # Modules
//!
//! - `protocol`: Message definitions and serialization
//! - `comm`: The `Transport` seam and blocking collectives
//! - `local`: Threads of one process over crossbeam channels
//! - `tcp`: One process per rank over TCP
//! - `launch`: Group membership from the launcher environment

pub mod comm;
pub mod launch;
pub mod local;
pub mod protocol;
pub mod tcp;

// Re-export key types
pub use comm::{Communicator, Transport, ROOT};
pub use launch::GroupSpec;
pub use local::{LocalGroup, LocalTransport};
pub use protocol::{JoinMessage, Message, PROTOCOL_VERSION};
pub use tcp::{TcpGroupSpec, TcpTransport};
