//! Message passing between ranks.
//!
//! The [`Communicator`] trait is the only way ranks exchange data. Two backends
//! implement it: [`LocalComm`], which runs every rank as a thread of the current
//! process and passes messages over channels, and `MpiComm` (feature `mpi`).
//!
//! Point-to-point traffic is organised in shifts: every rank sends to the
//! neighbour on one side and receives from the neighbour on the other side in a
//! single call. Sends never wait for the matching receive, so a shift cannot
//! deadlock whatever the order of neighbours.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::CommError;
use crate::topology::Direction;

/// Identifier of a rank within the communicator.
pub type Rank = usize;

/// Rank that reads input and writes output.
pub const ROOT: Rank = 0;

/// Purpose of a message, checked on receipt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tag {
    /// Halo data travelling in the given direction.
    Halo(Direction),
    Gather,
    Scatter,
    Broadcast,
    Reduce,
}

impl Tag {
    /// Integer tag for backends that need one.
    pub fn id(self) -> i32 {
        match self {
            Tag::Halo(Direction::Left) => 10,
            Tag::Halo(Direction::Right) => 11,
            Tag::Halo(Direction::Down) => 12,
            Tag::Halo(Direction::Up) => 13,
            Tag::Gather => 20,
            Tag::Scatter => 21,
            Tag::Broadcast => 22,
            Tag::Reduce => 23,
        }
    }
}

/// Collective and point-to-point operations used by the model.
///
/// All collectives must be entered by every rank in the same order.
pub trait Communicator {
    /// This rank.
    fn rank(&self) -> Rank;

    /// Number of ranks.
    fn size(&self) -> usize;

    /// Send `send` to `dest` and receive `recv` from `source`.
    ///
    /// A missing peer turns the corresponding half into a no-op.
    fn shift(
        &self,
        tag: Tag,
        dest: Option<Rank>,
        send: &[f64],
        source: Option<Rank>,
        recv: &mut [f64],
    ) -> Result<(), CommError>;

    /// Gather blocks of varying length on `root`.
    ///
    /// Rank `r` contributes `counts[r]` values that land at `displs[r]` in `recv`.
    /// `recv` is only touched on `root`.
    fn gather_varcount(
        &self,
        root: Rank,
        send: &[f64],
        recv: &mut [f64],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<(), CommError>;

    /// Inverse of [`Communicator::gather_varcount`]; `send` is only read on `root`.
    fn scatter_varcount(
        &self,
        root: Rank,
        send: &[f64],
        counts: &[usize],
        displs: &[usize],
        recv: &mut [f64],
    ) -> Result<(), CommError>;

    /// Replace `buf` on every rank by the content of `buf` on `root`.
    fn broadcast(&self, root: Rank, buf: &mut Vec<f64>) -> Result<(), CommError>;

    /// Sum of `local` over all ranks, available on every rank.
    fn all_reduce_sum(&self, local: f64) -> Result<f64, CommError>;

    /// Block until every rank has reached the barrier.
    fn barrier(&self) -> Result<(), CommError> {
        self.all_reduce_sum(0.0).map(|_| ())
    }

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }
}

#[derive(Debug)]
struct Message {
    tag: Tag,
    data: Vec<f64>,
}

/// In-process backend: one thread per rank, one channel per ordered pair of ranks.
///
/// Channels are unbounded, hence sending never blocks. Messages between two ranks
/// arrive in the order they were sent. When a rank drops its communicator, e.g.
/// because it failed, every peer waiting on it receives [`CommError::Disconnected`].
#[derive(Debug)]
pub struct LocalComm {
    rank: Rank,
    outbox: Vec<Sender<Message>>,
    inbox: Vec<Receiver<Message>>,
}

impl LocalComm {
    /// Create the communicators of all `size` ranks.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let mut outboxes: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::new()).collect();
        let mut inboxes: Vec<Vec<Receiver<Message>>> = (0..size).map(|_| Vec::new()).collect();
        for outbox in outboxes.iter_mut() {
            for inbox in inboxes.iter_mut() {
                let (tx, rx) = unbounded();
                outbox.push(tx);
                inbox.push(rx);
            }
        }
        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| LocalComm {
                rank,
                outbox,
                inbox,
            })
            .collect()
    }

    fn send(&self, dest: Rank, tag: Tag, data: Vec<f64>) -> Result<(), CommError> {
        self.outbox[dest]
            .send(Message { tag, data })
            .map_err(|_| CommError::Disconnected { peer: dest })
    }

    fn receive(&self, source: Rank, tag: Tag) -> Result<Vec<f64>, CommError> {
        let msg = self.inbox[source]
            .recv()
            .map_err(|_| CommError::Disconnected { peer: source })?;
        if msg.tag != tag {
            return Err(CommError::TagMismatch {
                peer: source,
                expected: format!("{:?}", tag),
                got: format!("{:?}", msg.tag),
            });
        }
        Ok(msg.data)
    }

    fn receive_into(&self, source: Rank, tag: Tag, buf: &mut [f64]) -> Result<(), CommError> {
        let data = self.receive(source, tag)?;
        if data.len() != buf.len() {
            return Err(CommError::LengthMismatch {
                peer: source,
                expected: buf.len(),
                got: data.len(),
            });
        }
        buf.copy_from_slice(&data);
        Ok(())
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.outbox.len()
    }

    fn shift(
        &self,
        tag: Tag,
        dest: Option<Rank>,
        send: &[f64],
        source: Option<Rank>,
        recv: &mut [f64],
    ) -> Result<(), CommError> {
        if let Some(dest) = dest {
            self.send(dest, tag, send.to_vec())?;
        }
        if let Some(source) = source {
            self.receive_into(source, tag, recv)?;
        }
        Ok(())
    }

    fn gather_varcount(
        &self,
        root: Rank,
        send: &[f64],
        recv: &mut [f64],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<(), CommError> {
        if self.rank != root {
            return self.send(root, Tag::Gather, send.to_vec());
        }
        for rank in 0..self.size() {
            let block = &mut recv[displs[rank]..displs[rank] + counts[rank]];
            if rank == root {
                block.copy_from_slice(send);
            } else {
                self.receive_into(rank, Tag::Gather, block)?;
            }
        }
        Ok(())
    }

    fn scatter_varcount(
        &self,
        root: Rank,
        send: &[f64],
        counts: &[usize],
        displs: &[usize],
        recv: &mut [f64],
    ) -> Result<(), CommError> {
        if self.rank != root {
            return self.receive_into(root, Tag::Scatter, recv);
        }
        for rank in 0..self.size() {
            let block = &send[displs[rank]..displs[rank] + counts[rank]];
            if rank == root {
                recv.copy_from_slice(block);
            } else {
                self.send(rank, Tag::Scatter, block.to_vec())?;
            }
        }
        Ok(())
    }

    fn broadcast(&self, root: Rank, buf: &mut Vec<f64>) -> Result<(), CommError> {
        if self.rank != root {
            *buf = self.receive(root, Tag::Broadcast)?;
            return Ok(());
        }
        for rank in (0..self.size()).filter(|&r| r != root) {
            self.send(rank, Tag::Broadcast, buf.clone())?;
        }
        Ok(())
    }

    fn all_reduce_sum(&self, local: f64) -> Result<f64, CommError> {
        if self.rank != ROOT {
            self.send(ROOT, Tag::Reduce, vec![local])?;
            let total = self.receive(ROOT, Tag::Reduce)?;
            return total
                .first()
                .copied()
                .ok_or(CommError::LengthMismatch {
                    peer: ROOT,
                    expected: 1,
                    got: 0,
                });
        }
        // summed in rank order so that the result does not depend on timing
        let mut total = local;
        for rank in 1..self.size() {
            let mut val = [0.0];
            self.receive_into(rank, Tag::Reduce, &mut val)?;
            total += val[0];
        }
        for rank in 1..self.size() {
            self.send(rank, Tag::Reduce, vec![total])?;
        }
        Ok(total)
    }
}

/// Run `f` on `size` ranks, each on its own thread, and return the results in rank order.
///
/// A panic on any rank is propagated once all threads have finished.
pub fn launch<T, F>(size: usize, f: F) -> Vec<T>
where
    F: Fn(LocalComm) -> T + Sync,
    T: Send,
{
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = LocalComm::world(size)
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(res) => res,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}
