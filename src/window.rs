//! One-sided memory windows.
//!
//! This module provides [`MemoryWindow<T>`], a safe Rust wrapper around
//! `MPI_Win_create` with RAII lifecycle management. Each process exposes one
//! contiguous buffer to one-sided remote reads by the rest of the group.
//!
//! # Synchronization
//!
//! Windows use active-target (fence) synchronization only:
//!
//! - [`MemoryWindow::get()`] *issues* an `MPI_Get` and returns a
//!   [`GetRequest`]; the data is not guaranteed to have arrived yet.
//! - [`MemoryWindow::fence()`] is collective (`MPI_Win_fence`). It completes
//!   every read issued by any process since the previous fence and opens
//!   the next access epoch.
//!
//! Reads observe the target's buffer as it was when the target entered the
//! fence. Local writes must be separated from remote reads of the same
//! region by a fence; `fence()` takes `&mut self`, so no local slice can be
//! held across it.
//!
//! # Lifecycle
//!
//! [`MemoryWindow::create()`] registers the window in the injected
//! [`WindowRegistry`] and opens the first access epoch.
//! [`MemoryWindow::free()`] (or drop) fences, removes the window from the
//! registry, calls `MPI_Win_free` and releases the buffer.
//!
//! # Example
//!
//! ```no_run
//! use ferrodm::{MemoryWindow, Runtime};
//!
//! let runtime = Runtime::init()?;
//! let world = runtime.world();
//! let buffer = vec![world.rank() as f64; 4].into_boxed_slice();
//! let mut win = MemoryWindow::create(&world, buffer, world.registry())?;
//!
//! // Read the first element of the next rank into our last slot
//! let next = (world.rank() + 1) % world.size();
//! win.get(next, 0..1, 3)?;
//! win.fence()?;
//! println!("rank {next} holds {}", win.local()[3]);
//! win.free()?;
//! # Ok::<(), ferrodm::Error>(())
//! ```

use std::ffi::{c_int, c_void};
use std::mem::{size_of, MaybeUninit};
use std::ops::Range;
use std::ptr::NonNull;

use mpi::datatype::Equivalence;
use mpi::ffi::{self, MPI_Aint, MPI_Win};
use mpi::raw::AsRaw;
use tracing::{debug, warn};

use crate::comm::Communicator;
use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::registry::{WindowId, WindowRegistry};
use crate::request::GetRequest;

/// Validate a get of `source` into `dest` on buffers of `len` elements.
///
/// Returns the element count.
fn check_get(len: usize, source: &Range<usize>, dest: usize) -> Result<usize> {
    if source.start > source.end || source.end > len {
        return Err(Error::InvalidBuffer);
    }
    let count = source.end - source.start;
    match dest.checked_add(count) {
        Some(end) if end <= len => Ok(count),
        _ => Err(Error::InvalidBuffer),
    }
}

/// A buffer exposed to one-sided reads by every process of a communicator.
///
/// Created collectively via [`MemoryWindow::create()`]. All processes must
/// pass buffers of the same element type and length; a disagreement is a
/// [`Error::Resource`] on every process and no MPI window is created.
///
/// # Thread Safety
///
/// `MemoryWindow` is intentionally **not** `Send` or `Sync`. MPI windows have
/// specific thread-safety rules that depend on the MPI thread level, and
/// fences must be issued from the thread that created the window.
pub struct MemoryWindow<T: Element> {
    id: WindowId,
    /// The MPI window handle.
    win: MPI_Win,
    /// Start of the exposed buffer, leaked from a `Box<[T]>` until drop.
    base: NonNull<T>,
    /// Number of `T` elements in the buffer.
    len: usize,
    /// Number of processes in the communicator that created this window.
    comm_size: usize,
    registry: WindowRegistry,
    pending: usize,
    issued: u64,
    epoch: u64,
    freed: bool,
}

impl<T: Element> MemoryWindow<T> {
    /// Expose `buffer` to the group (collective).
    ///
    /// The processes first agree on element type, buffer length and window
    /// id; the window is then created with `MPI_Win_create`, inserted into
    /// `registry` and fenced once, so reads can be issued right away.
    ///
    /// # Errors
    ///
    /// - [`Error::Resource`] if processes disagree on element type or buffer
    ///   length, or the agreed id is already registered here.
    /// - [`Error::InvalidBuffer`] if the buffer is too large for MPI.
    /// - [`Error::Mpi`] if window creation fails.
    pub fn create(comm: &Communicator, buffer: Box<[T]>, registry: &WindowRegistry) -> Result<Self> {
        let len = buffer.len();
        let mine = [T::TAG as i32 as u64, len as u64, registry.candidate()];
        let mut all = vec![0u64; 3 * comm.size()];
        comm.allgather(&mine, &mut all)?;

        // Every process runs the same check over the same values, so all of
        // them fail or none does.
        let first = &all[..3];
        if let Some((rank, bad)) = all
            .chunks_exact(3)
            .enumerate()
            .find(|(_, e)| e[0] != first[0] || e[1] != first[1])
        {
            return Err(Error::Resource(format!(
                "rank 0 exposes tag {} x {}, rank {rank} exposes tag {} x {}",
                first[0], first[1], bad[0], bad[1]
            )));
        }
        let id = WindowId(all.chunks_exact(3).map(|e| e[2]).max().unwrap_or(0));

        let bytes = len
            .checked_mul(size_of::<T>())
            .and_then(|b| MPI_Aint::try_from(b).ok())
            .ok_or(Error::InvalidBuffer)?;
        let disp_unit = size_of::<T>() as c_int;

        let raw = Box::into_raw(buffer);
        let base = NonNull::new(raw.cast::<T>())
            .ok_or_else(|| Error::Internal("boxed buffer returned null".into()))?;
        let mut win = MaybeUninit::<MPI_Win>::uninit();

        // SAFETY: `base` points to `len` initialized elements that stay at a
        // fixed address until `release()` reclaims the box after
        // MPI_Win_free. The communicator handle is valid for the call.
        let ret = unsafe {
            ffi::MPI_Win_create(
                base.as_ptr().cast::<c_void>(),
                bytes,
                disp_unit,
                ffi::RSMPI_INFO_NULL,
                comm.raw(),
                win.as_mut_ptr(),
            )
        };
        if let Err(e) = Error::check(ret) {
            // SAFETY: `raw` came from Box::into_raw above and MPI did not
            // keep it.
            drop(unsafe { Box::from_raw(raw) });
            return Err(e);
        }
        // SAFETY: MPI_Win_create succeeded and wrote the handle.
        let win = unsafe { win.assume_init() };

        let mut window = MemoryWindow {
            id,
            win,
            base,
            len,
            comm_size: comm.size(),
            registry: registry.clone(),
            pending: 0,
            issued: 0,
            epoch: 0,
            freed: false,
        };
        if !registry.insert(id) {
            window.freed = true;
            window.destroy();
            return Err(Error::Resource(format!("window {} is already registered", id.0)));
        }
        debug!(window = id.0, len, tag = ?T::TAG, "window created");

        window.fence()?;
        Ok(window)
    }

    /// The id this window is registered under.
    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Raw MPI window handle.
    pub fn raw_handle(&self) -> MPI_Win {
        self.win
    }

    /// Number of elements in each process's buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffers are empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the number of processes in the window's communicator.
    pub fn comm_size(&self) -> usize {
        self.comm_size
    }

    /// Number of fences completed so far, including the one in `create`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of reads issued since the last fence.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// This process's buffer.
    ///
    /// Regions targeted by an issued read hold unspecified data until the
    /// next fence.
    pub fn local(&self) -> &[T] {
        // SAFETY: `base` is valid for `len` elements for the lifetime of the
        // window (see `create`).
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    /// Mutable access to this process's buffer.
    ///
    /// Writes become visible to remote reads issued after the next fence.
    pub fn local_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `local`; `&mut self` ensures exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    /// Issue a one-sided read of `source` on `target` into this process's
    /// buffer starting at `dest`.
    ///
    /// The read completes at the next [`fence()`](Self::fence).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRank`] if `target` is outside the group.
    /// - [`Error::InvalidBuffer`] if either range falls outside the buffers.
    /// - [`Error::Mpi`] if `MPI_Get` fails.
    pub fn get(&mut self, target: usize, source: Range<usize>, dest: usize) -> Result<GetRequest> {
        if target >= self.comm_size {
            return Err(Error::InvalidRank(target));
        }
        let count = check_get(self.len, &source, dest)?;
        let count = c_int::try_from(count).map_err(|_| Error::InvalidBuffer)?;
        let target_disp = MPI_Aint::try_from(source.start).map_err(|_| Error::InvalidBuffer)?;
        let datatype = T::equivalent_datatype();

        // SAFETY: `dest + count <= len` was checked, so the origin range lies
        // inside our exposed buffer; the target range was checked against
        // the common buffer length agreed on at creation.
        let ret = unsafe {
            ffi::MPI_Get(
                self.base.as_ptr().add(dest).cast::<c_void>(),
                count,
                datatype.as_raw(),
                target as c_int,
                target_disp,
                count,
                datatype.as_raw(),
                self.win,
            )
        };
        Error::check(ret)?;

        let request = GetRequest {
            window: self.id,
            id: self.issued,
            epoch: self.epoch,
        };
        self.pending += 1;
        self.issued += 1;
        Ok(request)
    }

    /// Whether the read behind `request` has completed.
    pub fn is_complete(&self, request: &GetRequest) -> bool {
        request.window == self.id && request.epoch < self.epoch
    }

    /// Fence synchronization (collective).
    ///
    /// After `fence()` returns, every read issued by any process before the
    /// fence has completed, and local writes made before the fence are
    /// visible to reads issued after it.
    ///
    /// # Errors
    ///
    /// Returns an error if the MPI fence operation fails.
    pub fn fence(&mut self) -> Result<()> {
        // SAFETY: `win` is a live window handle until `destroy()`.
        let ret = unsafe { ffi::MPI_Win_fence(0, self.win) };
        Error::check(ret)?;
        self.pending = 0;
        self.epoch += 1;
        Ok(())
    }

    /// Fence, deregister and release the window (collective).
    pub fn free(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.freed {
            return Ok(());
        }
        self.freed = true;
        self.registry.remove(self.id);
        if mpi::environment::is_finalized() {
            // MPI released its side already; only our buffer is left
            warn!(window = self.id.0, "window outlived MPI_Finalize");
            self.reclaim();
            return Ok(());
        }
        let fenced = self.fence();
        self.destroy();
        debug!(window = self.id.0, "window freed");
        fenced
    }

    /// `MPI_Win_free`, then give the buffer back to the allocator.
    fn destroy(&mut self) {
        // SAFETY: `win` is live and no epoch is left open by our side.
        let ret = unsafe { ffi::MPI_Win_free(&mut self.win) };
        if let Err(e) = Error::check(ret) {
            warn!(window = self.id.0, error = %e, "MPI_Win_free failed");
        }
        self.reclaim();
    }

    fn reclaim(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len);
        // SAFETY: `base`/`len` describe the box leaked in `create`, and this
        // runs once: callers set `freed` first and never touch the buffer
        // afterwards.
        drop(unsafe { Box::from_raw(slice) });
        self.len = 0;
        self.base = NonNull::dangling();
    }
}

impl<T: Element> Drop for MemoryWindow<T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(window = self.id.0, error = %e, "fence failed while dropping window");
        }
    }
}

impl<T: Element> std::fmt::Debug for MemoryWindow<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWindow")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("comm_size", &self.comm_size)
            .field("epoch", &self.epoch)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_validates_arguments() {
        assert_eq!(check_get(4, &(0..2), 2).unwrap(), 2);
        assert_eq!(check_get(4, &(4..4), 4).unwrap(), 0);
        assert!(matches!(check_get(4, &(2..6), 0), Err(Error::InvalidBuffer)));
        assert!(matches!(check_get(4, &(0..3), 2), Err(Error::InvalidBuffer)));
        #[allow(clippy::reversed_empty_ranges)]
        let backwards = 3..1;
        assert!(matches!(check_get(4, &backwards, 0), Err(Error::InvalidBuffer)));
    }

    #[test]
    fn destination_near_usize_max_is_rejected() {
        assert!(matches!(check_get(4, &(0..1), usize::MAX), Err(Error::InvalidBuffer)));
        assert!(matches!(check_get(4, &(0..0), usize::MAX), Err(Error::InvalidBuffer)));
        assert!(matches!(
            check_get(usize::MAX, &(0..2), usize::MAX - 1),
            Err(Error::InvalidBuffer)
        ));
    }
}
