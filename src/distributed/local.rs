//! In-process participant group
//!
//! Runs a whole group inside one process with one thread per rank. Rank 0
//! holds a channel pair with every other rank; workers only talk to rank 0.
//! A dropped peer (for example a thread that panicked) turns into a
//! communication error rather than a hang.

use super::comm::{Transport, ROOT};
use super::protocol::Message;
use anyhow::{Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};

/// Factory for a connected set of [`LocalTransport`]s
pub struct LocalGroup;

impl LocalGroup {
    /// Create a group of `size` participants, indexed by rank
    pub fn new(size: usize) -> Vec<LocalTransport> {
        let mut transports: Vec<LocalTransport> = (0..size)
            .map(|rank| LocalTransport {
                rank,
                size,
                outgoing: (0..size).map(|_| None).collect(),
                incoming: (0..size).map(|_| None).collect(),
            })
            .collect();

        for worker in ROOT + 1..size {
            let (to_worker, from_root) = unbounded();
            let (to_root, from_worker) = unbounded();

            transports[ROOT].outgoing[worker] = Some(to_worker);
            transports[ROOT].incoming[worker] = Some(from_worker);
            transports[worker].outgoing[ROOT] = Some(to_root);
            transports[worker].incoming[ROOT] = Some(from_root);
        }

        transports
    }
}

/// One participant's end of a [`LocalGroup`]
#[derive(Debug)]
pub struct LocalTransport {
    rank: usize,
    size: usize,
    outgoing: Vec<Option<Sender<Message>>>,
    incoming: Vec<Option<Receiver<Message>>>,
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, to: usize, msg: Message) -> Result<()> {
        let sender = self
            .outgoing
            .get(to)
            .and_then(Option::as_ref)
            .with_context(|| format!("Rank {} has no channel to rank {}", self.rank, to))?;
        sender
            .send(msg)
            .map_err(|_| anyhow::anyhow!("Rank {} disconnected", to))
    }

    fn recv(&mut self, from: usize) -> Result<Message> {
        let receiver = self
            .incoming
            .get(from)
            .and_then(Option::as_ref)
            .with_context(|| format!("Rank {} has no channel from rank {}", self.rank, from))?;
        receiver
            .recv()
            .map_err(|_| anyhow::anyhow!("Rank {} disconnected", from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::comm::Communicator;
    use std::thread;

    #[test]
    fn test_group_shape() {
        let group = LocalGroup::new(3);
        assert_eq!(group.len(), 3);
        for (rank, transport) in group.iter().enumerate() {
            assert_eq!(transport.rank(), rank);
            assert_eq!(transport.size(), 3);
        }
    }

    #[test]
    fn test_workers_are_not_connected_to_each_other() {
        let mut group = LocalGroup::new(3);
        let err = group[1].send(2, Message::Gather(vec![])).unwrap_err();
        assert!(err.to_string().contains("no channel"));
    }

    #[test]
    fn test_collectives_across_threads() {
        let handles: Vec<_> = LocalGroup::new(4)
            .into_iter()
            .map(|transport| {
                thread::spawn(move || {
                    let mut comm = Communicator::new(transport);
                    let root = comm.is_root();
                    let greeting: String = comm
                        .broadcast(root.then(|| "hello".to_string()))
                        .unwrap();
                    let share: usize = comm
                        .scatter(root.then(|| vec![10, 11, 12, 13]))
                        .unwrap();
                    let gathered = comm.gather(share * 2).unwrap();
                    (comm.rank(), greeting, share, gathered)
                })
            })
            .collect();

        for handle in handles {
            let (rank, greeting, share, gathered) = handle.join().unwrap();
            assert_eq!(greeting, "hello");
            assert_eq!(share, 10 + rank);
            if rank == ROOT {
                assert_eq!(gathered, Some(vec![20, 22, 24, 26]));
            } else {
                assert_eq!(gathered, None);
            }
        }
    }

    #[test]
    fn test_dropped_peer_is_an_error() {
        let mut group = LocalGroup::new(2);
        let worker = group.pop().unwrap();
        drop(worker);

        let mut comm = Communicator::new(group.pop().unwrap());
        assert!(comm.gather(1u8).is_err());
    }
}
