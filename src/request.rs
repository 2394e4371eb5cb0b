//! Request handles for one-sided operations.

use crate::registry::WindowId;

/// A handle to an issued one-sided read.
///
/// One-sided operations complete at the next fence of the window they were
/// issued on. The handle records which fence epoch it belongs to, so the
/// window can answer whether it has completed; the data it targets must not
/// be read before then.
///
/// # Example
///
/// ```no_run
/// use ferrodm::{MemoryWindow, Runtime};
///
/// let runtime = Runtime::init()?;
/// let world = runtime.world();
/// let buffer = vec![world.rank() as i64; 4].into_boxed_slice();
/// let mut win = MemoryWindow::create(&world, buffer, world.registry())?;
///
/// // Read the first two elements of the next rank into our tail
/// let next = (world.rank() + 1) % world.size();
/// let request = win.get(next, 0..2, 2)?;
/// assert!(!win.is_complete(&request));
///
/// win.fence()?;
/// assert!(win.is_complete(&request));
/// assert_eq!(win.local()[2], next as i64);
/// win.free()?;
/// # Ok::<(), ferrodm::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetRequest {
    pub(crate) window: WindowId,
    pub(crate) id: u64,
    pub(crate) epoch: u64,
}

impl GetRequest {
    /// The window this request was issued on.
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Per-window request number, in issue order.
    pub fn raw_handle(&self) -> u64 {
        self.id
    }

    /// The fence epoch this request completes at the end of.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
