//! Process-wide registry of active memory windows.
//!
//! Every [`MemoryWindow`](crate::MemoryWindow) inserts its id here when it is
//! created and removes it when it is freed. The [`Runtime`](crate::Runtime)
//! owns one registry per process and hands it to every communicator it
//! creates; [`Runtime::finalize()`](crate::Runtime::finalize) checks that it
//! is empty again.
//!
//! The registry is injected into window creation rather than reached
//! through a global, so it can be inspected in isolation.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Identifier of a memory window.
///
/// Ranks agree on the id when the window is created (the largest candidate
/// any rank proposes), so every rank records the same window under the same
/// id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub(crate) u64);

impl WindowId {
    /// The raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct State {
    active: BTreeSet<WindowId>,
    /// Lowest id never handed out by this registry.
    next: u64,
}

/// Set of windows that are currently live in this process.
///
/// Cloning yields another handle to the same set.
#[derive(Debug, Clone, Default)]
pub struct WindowRegistry {
    state: Arc<Mutex<State>>,
}

impl WindowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest id this registry could accept for a new window.
    pub(crate) fn candidate(&self) -> u64 {
        self.state.lock().next
    }

    /// Record a newly created window. Returns `false` if it was already present.
    pub(crate) fn insert(&self, id: WindowId) -> bool {
        let mut st = self.state.lock();
        st.next = st.next.max(id.0 + 1);
        st.active.insert(id)
    }

    /// Forget a freed window. Returns `false` if it was not registered.
    pub(crate) fn remove(&self, id: WindowId) -> bool {
        self.state.lock().active.remove(&id)
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: WindowId) -> bool {
        self.state.lock().active.contains(&id)
    }

    /// Number of live windows.
    pub fn len(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Whether no window is live.
    pub fn is_empty(&self) -> bool {
        self.state.lock().active.is_empty()
    }

    /// Snapshot of live window ids, in creation order.
    pub fn active(&self) -> Vec<WindowId> {
        self.state.lock().active.iter().copied().collect()
    }

    /// Teardown check: every window must have been freed.
    ///
    /// # Errors
    ///
    /// [`Error::Resource`] listing the windows still registered.
    pub fn check_empty(&self) -> Result<()> {
        let st = self.state.lock();
        if st.active.is_empty() {
            return Ok(());
        }
        Err(Error::Resource(format!(
            "{} window(s) still registered at finalize: {:?}",
            st.active.len(),
            st.active
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove() {
        let reg = WindowRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.insert(WindowId(3)));
        assert!(!reg.insert(WindowId(3)));
        assert!(reg.insert(WindowId(1)));
        assert_eq!(reg.active(), vec![WindowId(1), WindowId(3)]);
        assert!(reg.remove(WindowId(3)));
        assert!(!reg.remove(WindowId(3)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn candidates_never_repeat() {
        let reg = WindowRegistry::new();
        assert_eq!(reg.candidate(), 0);
        reg.insert(WindowId(0));
        assert_eq!(reg.candidate(), 1);
        // a larger id agreed with other ranks moves the counter past it
        reg.insert(WindowId(5));
        reg.remove(WindowId(5));
        assert_eq!(reg.candidate(), 6);
        // freed ids are not reused
        reg.remove(WindowId(0));
        assert_eq!(reg.candidate(), 6);
    }

    #[test]
    fn clones_share_state() {
        let reg = WindowRegistry::new();
        let other = reg.clone();
        reg.insert(WindowId(9));
        assert!(other.contains(WindowId(9)));
        assert_eq!(other.candidate(), 10);
    }

    #[test]
    fn teardown_check_reports_leaks() {
        let reg = WindowRegistry::new();
        assert!(reg.check_empty().is_ok());

        reg.insert(WindowId(2));
        match reg.check_empty() {
            Err(Error::Resource(msg)) => assert!(msg.contains("1 window(s)"), "{msg}"),
            other => panic!("expected a resource error, got {other:?}"),
        }

        reg.remove(WindowId(2));
        assert!(reg.check_empty().is_ok());
    }
}
