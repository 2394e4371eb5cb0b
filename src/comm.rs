//! Communicators: a process's handle on its MPI process group.

use std::rc::Rc;

use mpi::Count;
use mpi::collective::{CommunicatorCollectives, SystemOperation};
use mpi::datatype::PartitionMut;
use mpi::ffi::MPI_Comm;
use mpi::raw::AsRaw;
use mpi::topology::{Color, Communicator as MpiCommunicator, SimpleCommunicator};

use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::registry::WindowRegistry;

/// An MPI process group as seen from one rank.
///
/// Obtained from [`Runtime::world()`](crate::Runtime::world) or by
/// [`split()`](Self::split)ting another communicator. All methods documented
/// as *collective* must be called by every process of the group, in the same
/// order.
///
/// Cloning is cheap and yields another handle to the same MPI communicator.
/// The communicator is freed when the last handle is dropped (the world
/// communicator is never freed).
///
/// # Thread Safety
///
/// `Communicator` is **not** `Send` or `Sync`: collectives must be issued
/// from the thread that owns the process's MPI state.
///
/// # Example
///
/// ```no_run
/// use ferrodm::Runtime;
///
/// let runtime = Runtime::init()?;
/// let world = runtime.world();
/// world.barrier()?;
/// println!("rank {} of {}", world.rank(), world.size());
/// # Ok::<(), ferrodm::Error>(())
/// ```
#[derive(Clone)]
pub struct Communicator {
    inner: Rc<SimpleCommunicator>,
    registry: WindowRegistry,
}

impl Communicator {
    pub(crate) fn new(inner: SimpleCommunicator, registry: WindowRegistry) -> Self {
        Communicator {
            inner: Rc::new(inner),
            registry,
        }
    }

    /// Get the rank of the calling process in this communicator.
    pub fn rank(&self) -> usize {
        self.inner.rank() as usize
    }

    /// Get the number of processes in this communicator.
    pub fn size(&self) -> usize {
        self.inner.size() as usize
    }

    /// The process-wide registry of live memory windows.
    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    /// Raw MPI handle, for the FFI calls of the window layer.
    pub(crate) fn raw(&self) -> MPI_Comm {
        self.inner.as_raw()
    }

    /// Check that `rank` names a member of this group.
    pub fn check_rank(&self, rank: usize) -> Result<()> {
        if rank < self.size() {
            Ok(())
        } else {
            Err(Error::InvalidRank(rank))
        }
    }

    // ========================================================================
    // Communicator management
    // ========================================================================

    /// Split the group by `color` (collective).
    ///
    /// Processes passing the same `Some(color)` end up in one new group,
    /// ordered by their rank here. Processes passing `None` take part in
    /// the split but get no communicator back. The new communicator shares
    /// this one's window registry.
    pub fn split(&self, color: Option<u16>) -> Option<Communicator> {
        let color = match color {
            Some(c) => Color::with_value(i32::from(c)),
            None => Color::undefined(),
        };
        self.inner
            .split_by_color(color)
            .map(|inner| Communicator::new(inner, self.registry.clone()))
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Barrier synchronization.
    ///
    /// All processes in the communicator must call this function. No process
    /// will return until all processes have entered the barrier.
    pub fn barrier(&self) -> Result<()> {
        self.inner.barrier();
        Ok(())
    }

    // ========================================================================
    // Collectives
    // ========================================================================

    /// All-gather variable-length contributions (collective).
    ///
    /// Returns the concatenation of every rank's `send`, in rank order.
    pub fn allgatherv<T: Element>(&self, send: &[T]) -> Result<Vec<T>> {
        let count = Count::try_from(send.len()).map_err(|_| Error::InvalidBuffer)?;
        let mut counts: Vec<Count> = vec![0; self.size()];
        self.inner.all_gather_into(&count, &mut counts[..]);

        let mut displs = Vec::with_capacity(counts.len());
        let mut total: usize = 0;
        for &c in &counts {
            displs.push(Count::try_from(total).map_err(|_| Error::InvalidBuffer)?);
            total += c as usize;
        }

        let mut out = vec![T::ZERO; total];
        {
            let mut partition = PartitionMut::new(&mut out[..], &counts[..], &displs[..]);
            self.inner.all_gather_varcount_into(send, &mut partition);
        }
        Ok(out)
    }

    /// All-gather equal-length contributions (collective).
    ///
    /// `recv` must hold `send.len() * size()` elements.
    pub fn allgather<T: Element>(&self, send: &[T], recv: &mut [T]) -> Result<()> {
        if recv.len() != send.len() * self.size() {
            return Err(Error::InvalidBuffer);
        }
        self.inner.all_gather_into(send, recv);
        Ok(())
    }

    /// Check that every rank passed the same value (collective).
    pub fn all_equal<T: Element>(&self, value: T) -> Result<bool> {
        let all = self.allgatherv(&[value])?;
        Ok(all.iter().all(|v| *v == value))
    }

    /// Largest `value` over the group (collective).
    pub fn max_u64(&self, value: u64) -> u64 {
        let mut max = 0u64;
        self.inner
            .all_reduce_into(&value, &mut max, SystemOperation::max());
        max
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}
