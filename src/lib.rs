//! A distributed shallow water model on a staggered (Arakawa C) grid.
//!
//! The global domain is tiled into rectangular partitions, one per rank. Ranks
//! exchange one line of ghost cells per step with their neighbours and
//! collect their partitions on the root rank for output. The numerical result
//! is the same for any number of ranks.
//!
//! Ranks communicate through the [`comm::Communicator`] trait. By default all
//! ranks run as threads of one process ([`comm::launch`]); with the `mpi`
//! feature every rank is an MPI process.
//!
//! ```no_run
//! use seady_swm::comm::launch;
//! use seady_swm::config::Parameters;
//! use seady_swm::io::FileSink;
//!
//! let params = Parameters::from_file("params.json").unwrap();
//! let results = launch(4, |comm| {
//!     let mut sink = FileSink::new(&params.outputs());
//!     seady_swm::run(params.clone(), &comm, &mut sink)
//! });
//! assert!(results.iter().all(|res| res.is_ok()));
//! ```

pub mod boundary;
pub mod comm;
#[cfg(feature = "mpi")]
pub mod comm_mpi;
pub mod config;
pub mod error;
pub mod field;
pub mod gather;
pub mod grid;
pub mod halo;
pub mod interp;
pub mod io;
pub mod kernels;
pub mod partition;
pub mod simulation;
pub mod state;
pub mod topology;
pub mod variable;

pub use error::{Error, Result};
pub use simulation::{run, RunSummary, Simulation};
