//! Participant group protocol
//!
//! Every collective operation moves one [`Message`] per participant pair.
//! The value being communicated is serialized separately into the message
//! payload with MessagePack (rmp-serde) so the message envelope is the same
//! whatever type a collective carries.
//!
//! # Message Flow
//!
//! ```text
//! Coordinator (rank 0)             Worker (rank r)
//!     |                              |
//!     |<------- JOIN(rank r) --------|   (TCP transport only)
//!     |                              |
//!     |------ BROADCAST(status) ---->|   initialize
//!     |------ BROADCAST(config) ---->|
//!     |------ SCATTER(tile r) ------>|
//!     |                              |
//!     |<----- GATHER(result r) ------|   run
//! ```
//!
//! # Message Framing
//!
//! On byte streams each message is prefixed with a 4-byte length field
//! (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Coordinator and workers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted message body
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Join message (Worker → Coordinator)
    ///
    /// First message on a new TCP connection; identifies the worker's rank.
    Join(JoinMessage),

    /// One-to-all value from the coordinator
    Broadcast(Vec<u8>),

    /// The coordinator's per-rank value for the receiving participant
    Scatter(Vec<u8>),

    /// A participant's contribution to the coordinator
    Gather(Vec<u8>),
}

/// Join message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Rank of the joining participant
    pub rank: usize,

    /// Group size the participant was launched with
    pub size: usize,

    /// Host the participant runs on
    pub host: String,
}

/// The three collective operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collective {
    Broadcast,
    Scatter,
    Gather,
}

impl Collective {
    /// Wrap a payload into this collective's message
    pub fn message(self, payload: Vec<u8>) -> Message {
        match self {
            Collective::Broadcast => Message::Broadcast(payload),
            Collective::Scatter => Message::Scatter(payload),
            Collective::Gather => Message::Gather(payload),
        }
    }

    /// Extract the payload, rejecting messages of any other kind
    pub fn payload(self, msg: Message) -> Result<Vec<u8>> {
        match (self, msg) {
            (Collective::Broadcast, Message::Broadcast(p))
            | (Collective::Scatter, Message::Scatter(p))
            | (Collective::Gather, Message::Gather(p)) => Ok(p),
            (expected, other) => {
                anyhow::bail!("Expected {:?} message, got {}", expected, describe(&other))
            }
        }
    }
}

/// Short message description for protocol errors (payloads omitted)
pub fn describe(msg: &Message) -> String {
    match msg {
        Message::Join(join) => format!("Join(rank={})", join.rank),
        Message::Broadcast(p) => format!("Broadcast({} bytes)", p.len()),
        Message::Scatter(p) => format!("Scatter({} bytes)", p.len()),
        Message::Gather(p) => format!("Gather({} bytes)", p.len()),
    }
}

/// Serialize a value into a collective payload
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(value).context("Failed to serialize payload")
}

/// Deserialize a collective payload
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    rmp_serde::from_slice(payload).context("Failed to deserialize payload")
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg).context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_bytes.len());
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Read a complete message from a stream
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Message> {

    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;

    if msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_len);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")?;

    Ok(msg)
}

/// Write a message to a stream
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, msg: &Message) -> Result<()> {
    let framed = serialize_message(msg)?;

    stream.write_all(&framed).await.context("Failed to write message")?;

    // Flush to ensure message is sent immediately
    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}
