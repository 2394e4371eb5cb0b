//! Halo exchange: refreshing ghost rows from neighboring ranks.
//!
//! Every rank's whole buffer is exposed through its window, so there is no
//! publish step. An exchange issues at most two one-sided reads per rank:
//!
//! - the last `prev` owned rows of rank - 1 into the prev-halo region;
//! - the first `next` owned rows of rank + 1 into the next-halo region;
//!
//! between two fences. The opening fence completes every rank's local stores
//! to its owned rows, so the reads see them. Rank 0 has no prev neighbor and
//! the last rank no next neighbor; those regions keep whatever they held at
//! construction.
//!
//! After the closing fence the ghost rows equal the neighbors' owned rows as
//! of the opening fence. Writes to owned rows must therefore happen before
//! the exchange is started, never while it is open; the
//! [`Exchange`] epoch holds the matrix's window mutably so this is checked
//! at compile time.

use std::ops::Range;

use tracing::{debug, warn};

use crate::datatype::Element;
use crate::error::Result;
use crate::layout::{GhostLayout, HaloDepth};
use crate::request::GetRequest;
use crate::segment::Segment;
use crate::window::MemoryWindow;

/// One one-sided read of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Rank read from
    pub target: usize,
    /// Element range in the target's buffer
    pub source: Range<usize>,
    /// Element offset in the local buffer
    pub dest: usize,
}

/// The reads a rank issues on every exchange, computed once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangePlan {
    prev: Option<Transfer>,
    next: Option<Transfer>,
}

impl ExchangePlan {
    /// Plan for `rank` given the full segment table.
    ///
    /// The layout must come from a validated topology; a depth the
    /// neighbor's block cannot serve yields no read for that side.
    pub fn new(segments: &[Segment], layout: &GhostLayout, rank: usize) -> Self {
        let halo: HaloDepth = layout.halo();
        let cols = layout.cols();

        let prev = if rank > 0 && halo.prev > 0 {
            segments[rank - 1]
                .shape()
                .rows
                .checked_sub(halo.prev)
                .and_then(|tail| layout.owned_row(tail))
                .zip(layout.prev_halo_row(0))
                .map(|(start, dest)| Transfer {
                    target: rank - 1,
                    source: start..start + halo.prev * cols,
                    dest,
                })
        } else {
            None
        };

        let next = if rank + 1 < segments.len() && halo.next > 0 {
            layout
                .owned_row(0)
                .zip(layout.next_halo_row(0))
                .map(|(start, dest)| Transfer {
                    target: rank + 1,
                    source: start..start + halo.next * cols,
                    dest,
                })
        } else {
            None
        };

        ExchangePlan { prev, next }
    }

    /// Read filling the prev-halo region, if any.
    pub fn prev(&self) -> Option<&Transfer> {
        self.prev.as_ref()
    }

    /// Read filling the next-halo region, if any.
    pub fn next(&self) -> Option<&Transfer> {
        self.next.as_ref()
    }

    /// Whether this rank reads nothing.
    pub fn is_empty(&self) -> bool {
        self.prev.is_none() && self.next.is_none()
    }
}

/// Halo exchanger of one matrix, borrowed from it via
/// [`DistributedMatrix::halo()`](crate::DistributedMatrix::halo).
pub struct HaloExchanger<'m, T: Element> {
    plan: &'m ExchangePlan,
    window: &'m mut MemoryWindow<T>,
}

impl<'m, T: Element> HaloExchanger<'m, T> {
    pub(crate) fn new(plan: &'m ExchangePlan, window: &'m mut MemoryWindow<T>) -> Self {
        HaloExchanger { plan, window }
    }

    /// The reads this rank issues per exchange.
    pub fn plan(&self) -> &ExchangePlan {
        self.plan
    }

    /// Fence, then issue this rank's halo reads in the new epoch
    /// (collective with the matching [`Exchange::fence()`]).
    pub fn begin(&mut self) -> Result<Exchange<'_, T>> {
        self.window.fence()?;
        let mut requests = Vec::with_capacity(2);
        for t in [self.plan.prev(), self.plan.next()].into_iter().flatten() {
            requests.push(self.window.get(t.target, t.source.clone(), t.dest)?);
        }
        debug!(window = self.window.id().raw(), reads = requests.len(), "halo exchange issued");
        Ok(Exchange {
            window: &mut *self.window,
            requests,
            fenced: false,
        })
    }

    /// Refresh all ghost rows (collective): fence, issue reads, fence.
    pub fn exchange(&mut self) -> Result<()> {
        self.begin()?.fence()
    }

    /// Fence the underlying window without exchanging (collective).
    pub fn fence(&mut self) -> Result<()> {
        self.window.fence()
    }
}

/// An open exchange epoch.
///
/// The reads issued by [`HaloExchanger::begin()`] complete at
/// [`fence()`](Self::fence). Dropping an unfenced epoch fences it.
pub struct Exchange<'e, T: Element> {
    window: &'e mut MemoryWindow<T>,
    requests: Vec<GetRequest>,
    fenced: bool,
}

impl<T: Element> Exchange<'_, T> {
    /// The reads issued in this epoch.
    pub fn requests(&self) -> &[GetRequest] {
        &self.requests
    }

    /// Complete the epoch (collective).
    pub fn fence(mut self) -> Result<()> {
        self.fenced = true;
        self.window.fence()
    }
}

impl<T: Element> Drop for Exchange<'_, T> {
    fn drop(&mut self) {
        if !self.fenced {
            if let Err(e) = self.window.fence() {
                warn!(error = %e, "fence failed while dropping an open halo exchange");
            }
        }
    }
}
