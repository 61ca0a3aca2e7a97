//! Collective operations over a rank-addressed transport
//!
//! A [`Transport`] only knows how to move a [`Message`] between the root
//! and one other participant. [`Communicator`] builds the three blocking
//! collectives on top of it, so every transport gets identical semantics.

use super::protocol::{decode_payload, encode_payload, Collective, Message};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Rank of the participant playing the coordinator role
pub const ROOT: usize = 0;

/// Point-to-point message transport between the root and each participant
///
/// Implementations connect rank 0 with every other rank (star topology).
/// Both calls block until the message is handed over or the peer is gone.
pub trait Transport {
    /// Rank of this participant in `[0, size)`
    fn rank(&self) -> usize;

    /// Number of participants in the group
    fn size(&self) -> usize;

    /// Send a message to participant `to`
    fn send(&mut self, to: usize, msg: Message) -> Result<()>;

    /// Receive the next message from participant `from`
    fn recv(&mut self, from: usize) -> Result<Message>;
}

/// Blocking collectives rooted at rank 0
#[derive(Debug)]
pub struct Communicator<T> {
    transport: T,
}

impl<T: Transport> Communicator<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn rank(&self) -> usize {
        self.transport.rank()
    }

    pub fn size(&self) -> usize {
        self.transport.size()
    }

    pub fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// One-to-all: every participant returns the root's value
    ///
    /// The root passes `Some(value)`; other participants pass `None`.
    pub fn broadcast<V>(&mut self, value: Option<V>) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
    {
        if self.is_root() {
            let value = value.context("Broadcast root must supply a value")?;
            let payload = encode_payload(&value)?;
            for to in self.peers() {
                self.transport
                    .send(to, Collective::Broadcast.message(payload.clone()))
                    .with_context(|| format!("Failed to broadcast to rank {}", to))?;
            }
            Ok(value)
        } else {
            self.receive_from_root(Collective::Broadcast)
        }
    }

    /// Distribution: participant `i` returns element `i` of the root's values
    ///
    /// The root passes `Some(values)` with exactly one entry per participant.
    pub fn scatter<V>(&mut self, values: Option<Vec<V>>) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
    {
        if self.is_root() {
            let values = values.context("Scatter root must supply values")?;
            if values.len() != self.size() {
                anyhow::bail!(
                    "Scatter needs one value per participant (group size {}, got {})",
                    self.size(),
                    values.len()
                );
            }
            let mut values = values.into_iter();
            let own = values.next().context("Scatter on an empty group")?;
            for (to, value) in (ROOT + 1..).zip(values) {
                let payload = encode_payload(&value)?;
                self.transport
                    .send(to, Collective::Scatter.message(payload))
                    .with_context(|| format!("Failed to scatter to rank {}", to))?;
            }
            Ok(own)
        } else {
            self.receive_from_root(Collective::Scatter)
        }
    }

    /// All-to-one: the root returns every contribution ordered by rank
    ///
    /// Other participants return `None` once their value is handed over.
    pub fn gather<V>(&mut self, value: V) -> Result<Option<Vec<V>>>
    where
        V: Serialize + DeserializeOwned,
    {
        if self.is_root() {
            let mut values = Vec::with_capacity(self.size());
            values.push(value);
            for from in self.peers() {
                let msg = self
                    .transport
                    .recv(from)
                    .with_context(|| format!("Failed to gather from rank {}", from))?;
                let payload = Collective::Gather.payload(msg)?;
                values.push(decode_payload(&payload)?);
            }
            Ok(Some(values))
        } else {
            let payload = encode_payload(&value)?;
            self.transport
                .send(ROOT, Collective::Gather.message(payload))
                .context("Failed to send gather contribution to the coordinator")?;
            Ok(None)
        }
    }

    fn peers(&self) -> std::ops::Range<usize> {
        ROOT + 1..self.size()
    }

    fn receive_from_root<V: DeserializeOwned>(&mut self, kind: Collective) -> Result<V> {
        let msg = self
            .transport
            .recv(ROOT)
            .with_context(|| format!("Failed to receive {:?} from the coordinator", kind))?;
        let payload = kind.payload(msg)?;
        decode_payload(&payload)
    }
}
