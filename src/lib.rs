//! # ferrodm
//!
//! Distributed dense matrices with halo exchange over MPI one-sided
//! windows.
//!
//! A [`DistributedMatrix`] is split into contiguous row blocks, one per
//! process of an MPI communicator. Each process stores its block plus an
//! optional number of ghost ("halo") rows replicated from its neighbors:
//!
//! ```text
//! [ prev halo | owned rows | next halo ]
//! ```
//!
//! Every buffer is exposed through a [`MemoryWindow`] (`MPI_Win_create`); a
//! halo exchange is a pair of `MPI_Get`s from the neighbors followed by a
//! collective `MPI_Win_fence`. Rows are accessed through global-order views
//! that tell local, ghost and remote rows apart, and [`for_each()`] /
//! [`transform()`] apply computations to the rows the calling process owns.
//!
//! [`Runtime`] initializes MPI, owns the process-wide [`WindowRegistry`] and
//! hands out the world [`Communicator`].
//!
//! ## Supported Types
//!
//! All matrices are generic over [`Element`]:
//! `f32`, `f64`, `i32`, `i64`, `u8`, `u32`, `u64`
//!
//! ## Quick Start
//!
//! ```no_run
//! use ferrodm::{DistributedMatrix, GlobalShape, HaloDepth, Runtime};
//!
//! fn main() -> Result<(), ferrodm::Error> {
//!     let runtime = Runtime::init()?;
//!     let world = runtime.world();
//!
//!     // Run with: mpiexec -n 4
//!     let mut m = DistributedMatrix::<f64>::with_halo(
//!         &world,
//!         GlobalShape::new(8, 2),
//!         HaloDepth::symmetric(1),
//!     )?;
//!
//!     // Each process writes only the rows it owns
//!     m.rows_mut().for_each(|mut row| {
//!         let v = row.index() as f64;
//!         row.fill(v);
//!     });
//!
//!     // Refresh ghost rows from the neighbors
//!     m.halo().exchange()?;
//!
//!     let sum: f64 = m.rows().prev_halo().iter().sum();
//!     println!("rank {}: prev halo sums to {sum}", world.rank());
//!
//!     drop(m);
//!     runtime.finalize()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

mod comm;
mod datatype;
pub mod env;
mod error;
mod halo;
mod layout;
mod matrix;
mod mmio;
mod partition;
mod registry;
mod request;
mod row;
mod segment;
mod window;

pub use comm::Communicator;
pub use datatype::{DatatypeTag, Element};
pub use env::LaunchInfo;
pub use error::{Error, Result};
pub use halo::{Exchange, ExchangePlan, HaloExchanger, Transfer};
pub use layout::{GhostLayout, HaloDepth, Region};
pub use matrix::{DistributedMatrix, MatrixBuilder};
pub use mmio::{
    mmread, parse_matrix_market, read_matrix_market, CooMatrix, CsrMatrix, Header, MatrixEntry,
    Symmetry, ValueKind,
};
pub use partition::{partition_rows, GlobalShape, Partition, SegmentShape, ShapePartitioner};
pub use registry::{WindowId, WindowRegistry};
pub use request::GetRequest;
pub use row::{
    for_each, transform, DistributedIter, RowCursor, RowMut, RowSet, RowStorage, RowView, Rows,
    RowsMut, Subrange,
};
pub use segment::{RowKind, Segment};
pub use window::MemoryWindow;

use std::marker::PhantomData;

use mpi::environment::Universe;
use tracing::{info, warn};

/// MPI thread support levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadLevel {
    /// Only single-threaded execution
    Single,
    /// Multi-threaded, but MPI calls only from main thread
    Funneled,
    /// Multi-threaded, but MPI calls serialized by user
    Serialized,
    /// Full multi-threaded support
    Multiple,
}

impl From<ThreadLevel> for mpi::Threading {
    fn from(level: ThreadLevel) -> Self {
        match level {
            ThreadLevel::Single => mpi::Threading::Single,
            ThreadLevel::Funneled => mpi::Threading::Funneled,
            ThreadLevel::Serialized => mpi::Threading::Serialized,
            ThreadLevel::Multiple => mpi::Threading::Multiple,
        }
    }
}

impl From<mpi::Threading> for ThreadLevel {
    fn from(level: mpi::Threading) -> Self {
        match level {
            mpi::Threading::Single => ThreadLevel::Single,
            mpi::Threading::Funneled => ThreadLevel::Funneled,
            mpi::Threading::Serialized => ThreadLevel::Serialized,
            mpi::Threading::Multiple => ThreadLevel::Multiple,
        }
    }
}

/// MPI environment handle.
///
/// This type represents an initialized MPI environment. There can only be one
/// instance of this type per process. It owns the process-wide
/// [`WindowRegistry`] shared by every communicator derived from
/// [`world()`](Self::world). When dropped, it finalizes MPI.
///
/// # Example
///
/// ```no_run
/// use ferrodm::Runtime;
///
/// let runtime = Runtime::init().expect("Failed to initialize MPI");
/// let world = runtime.world();
/// println!("Running on {} processes", world.size());
/// // Checks that no window leaked, then finalizes MPI
/// runtime.finalize().expect("windows leaked");
/// ```
pub struct Runtime {
    universe: Universe,
    thread_level: ThreadLevel,
    registry: WindowRegistry,
    launch: LaunchInfo,
    /// Marker to make Runtime !Send and !Sync
    _marker: PhantomData<*const ()>,
}

impl Runtime {
    /// Initialize MPI with single-threaded support.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if MPI is already initialized.
    pub fn init() -> Result<Self> {
        Self::init_thread(ThreadLevel::Single)
    }

    /// Initialize MPI with the specified thread support level.
    ///
    /// The level actually provided can be queried with
    /// [`thread_level()`](Self::thread_level).
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if MPI is already initialized.
    pub fn init_thread(required: ThreadLevel) -> Result<Self> {
        let (universe, provided) =
            mpi::initialize_with_threading(required.into()).ok_or(Error::AlreadyInitialized)?;

        let launch = LaunchInfo::from_env();
        let world = universe.world();
        let (rank, size) = (
            mpi::topology::Communicator::rank(&world),
            mpi::topology::Communicator::size(&world),
        );
        info!(
            rank,
            size,
            slurm = launch.slurm_job,
            local_rank = ?launch.local_rank,
            "MPI initialized"
        );
        if let Some(expected) = launch.mismatch(size as usize) {
            warn!(expected, size, "group size differs from the launch environment");
        }

        Ok(Runtime {
            universe,
            thread_level: provided.into(),
            registry: WindowRegistry::new(),
            launch,
            _marker: PhantomData,
        })
    }

    /// Get the thread support level that was provided.
    pub fn thread_level(&self) -> ThreadLevel {
        self.thread_level
    }

    /// The launch context read at initialization.
    pub fn launch(&self) -> &LaunchInfo {
        &self.launch
    }

    /// The process-wide registry of live memory windows.
    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    /// Communicator over every process of the job.
    pub fn world(&self) -> Communicator {
        Communicator::new(self.universe.world(), self.registry.clone())
    }

    /// Teardown check, then finalize MPI.
    ///
    /// # Errors
    ///
    /// [`Error::Resource`] if a memory window is still registered. MPI is
    /// finalized either way.
    pub fn finalize(self) -> Result<()> {
        self.registry.check_empty()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            warn!(windows = ?self.registry.active(), "finalizing MPI with live windows");
        }
    }
}
