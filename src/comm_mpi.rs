//! MPI backend of the [`Communicator`] trait.
//!
//! Each rank is a separate process started by `mpirun`. MPI is initialised by
//! [`MpiComm::init`] and finalised when the communicator is dropped.

use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::point_to_point::send_receive_into_with_tags;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, CommunicatorCollectives, Destination, Root, Source};
use mpi::Count;

use crate::comm::{Communicator, Rank, Tag};
use crate::error::CommError;

/// World communicator of an MPI run.
pub struct MpiComm {
    world: SimpleCommunicator,
    // dropped last, finalises MPI
    _universe: Universe,
}

impl MpiComm {
    /// Initialise MPI. Returns `None` if MPI was already initialised.
    pub fn init() -> Option<Self> {
        let universe = mpi::initialize()?;
        let world = universe.world();
        Some(MpiComm {
            world,
            _universe: universe,
        })
    }

    /// Terminate all ranks of the run.
    pub fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }
}

fn to_counts(values: &[usize]) -> Vec<Count> {
    values.iter().map(|&v| v as Count).collect()
}

impl Communicator for MpiComm {
    fn rank(&self) -> Rank {
        self.world.rank() as Rank
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn shift(
        &self,
        tag: Tag,
        dest: Option<Rank>,
        send: &[f64],
        source: Option<Rank>,
        recv: &mut [f64],
    ) -> Result<(), CommError> {
        let tag = tag.id();
        match (dest, source) {
            (Some(dest), Some(source)) => {
                let dest = self.world.process_at_rank(dest as i32);
                let source = self.world.process_at_rank(source as i32);
                send_receive_into_with_tags(send, &dest, tag, recv, &source, tag);
            }
            (Some(dest), None) => {
                self.world
                    .process_at_rank(dest as i32)
                    .send_with_tag(send, tag);
            }
            (None, Some(source)) => {
                self.world
                    .process_at_rank(source as i32)
                    .receive_into_with_tag(recv, tag);
            }
            (None, None) => {}
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
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank() == root {
            let mut partition = PartitionMut::new(recv, to_counts(counts), to_counts(displs));
            root_process.gather_varcount_into_root(send, &mut partition);
        } else {
            root_process.gather_varcount_into(send);
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
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank() == root {
            let partition = Partition::new(send, to_counts(counts), to_counts(displs));
            root_process.scatter_varcount_into_root(&partition, recv);
        } else {
            root_process.scatter_varcount_into(recv);
        }
        Ok(())
    }

    fn broadcast(&self, root: Rank, buf: &mut Vec<f64>) -> Result<(), CommError> {
        let root_process = self.world.process_at_rank(root as i32);
        let mut len = buf.len() as u64;
        root_process.broadcast_into(&mut len);
        buf.resize(len as usize, 0.0);
        root_process.broadcast_into(&mut buf[..]);
        Ok(())
    }

    fn all_reduce_sum(&self, local: f64) -> Result<f64, CommError> {
        let mut total = 0.0f64;
        self.world
            .all_reduce_into(&local, &mut total, SystemOperation::sum());
        Ok(total)
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.world.barrier();
        Ok(())
    }
}
