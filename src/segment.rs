//! Segments and the row table derived from them.
//!
//! Both tables are computed once when a matrix is built and never resized.
//! Every rank holds the full segment table (shapes are known everywhere) and
//! a row table that says, for each global row, whether this rank owns it,
//! holds it as a ghost, or cannot see it at all.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::layout::{GhostLayout, HaloDepth};
use crate::partition::{GlobalShape, Partition, SegmentShape, ShapePartitioner};

/// The contiguous row block owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    rank: usize,
    shape: SegmentShape,
    first_row: usize,
    local: bool,
}

impl Segment {
    /// Rank that owns this block.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Shape of the block.
    pub fn shape(&self) -> SegmentShape {
        self.shape
    }

    /// Whether the calling rank owns this block.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Global index of the first row.
    pub fn first_row(&self) -> usize {
        self.first_row
    }

    /// Global row indices in the block.
    pub fn row_range(&self) -> Range<usize> {
        self.first_row..self.first_row + self.shape.rows
    }

    /// Number of cells.
    pub fn size(&self) -> usize {
        self.shape.size()
    }
}

/// Where a global row lives from the calling rank's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    /// Owned by this rank; readable and writable
    Local,
    /// Ghost copy of a row of rank - 1; read-only, refreshed by exchange
    PrevHalo,
    /// Ghost copy of a row of rank + 1; read-only, refreshed by exchange
    NextHalo,
    /// Owned elsewhere and not replicated here
    Remote,
}

impl RowKind {
    /// Whether the row is a ghost copy.
    pub fn is_halo(self) -> bool {
        matches!(self, RowKind::PrevHalo | RowKind::NextHalo)
    }

    /// Whether the row's data is present in this rank's buffer.
    pub fn is_readable(self) -> bool {
        !matches!(self, RowKind::Remote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowEntry {
    pub(crate) segment: usize,
    pub(crate) kind: RowKind,
    /// Element offset in the local buffer; `None` for remote rows.
    pub(crate) offset: Option<usize>,
}

/// Segment and row tables of one matrix on one rank.
#[derive(Debug, Clone)]
pub(crate) struct Topology {
    pub(crate) shape: GlobalShape,
    pub(crate) rank: usize,
    pub(crate) layout: GhostLayout,
    pub(crate) segments: Vec<Segment>,
    pub(crate) rows: Vec<RowEntry>,
    /// Inclusive `[first, last]` global indices owned by this rank.
    pub(crate) local: (usize, usize),
}

impl Topology {
    pub(crate) fn new(
        shape: GlobalShape,
        halo: HaloDepth,
        partition: Partition,
        rank: usize,
        nprocs: usize,
    ) -> Result<Self> {
        let shapes = ShapePartitioner::new(partition).segments(shape, nprocs)?;
        check_halo(&shapes, halo)?;
        if rank >= nprocs {
            return Err(Error::InvalidRank(rank));
        }

        let layout = GhostLayout::new(shapes[0], halo);

        let mut segments = Vec::with_capacity(nprocs);
        let mut first_row = 0;
        for (r, seg_shape) in shapes.iter().enumerate() {
            segments.push(Segment {
                rank: r,
                shape: *seg_shape,
                first_row,
                local: r == rank,
            });
            first_row += seg_shape.rows;
        }

        let own = segments[rank].row_range();
        let (first, last) = (own.start, own.end - 1);
        let prev_start = first.saturating_sub(halo.prev);

        let mut rows = Vec::with_capacity(shape.rows);
        for seg in &segments {
            for i in seg.row_range() {
                let (kind, offset) = if own.contains(&i) {
                    (RowKind::Local, layout.owned_row(i - first))
                } else if i >= prev_start && i < first {
                    (RowKind::PrevHalo, layout.prev_halo_row(i - prev_start))
                } else if i > last && i <= last + halo.next {
                    (RowKind::NextHalo, layout.next_halo_row(i - last - 1))
                } else {
                    (RowKind::Remote, None)
                };
                rows.push(RowEntry {
                    segment: seg.rank,
                    kind,
                    offset,
                });
            }
        }

        Ok(Topology {
            shape,
            rank,
            layout,
            segments,
            rows,
            local: (first, last),
        })
    }

    pub(crate) fn entry(&self, index: usize) -> Result<&RowEntry> {
        self.rows.get(index).ok_or(Error::RowOutOfRange(index))
    }

    pub(crate) fn local_segment(&self) -> &Segment {
        &self.segments[self.rank]
    }
}

/// Halo rows must come from the immediate neighbor only, so a depth may not
/// exceed the row count of any block it is copied from.
fn check_halo(shapes: &[SegmentShape], halo: HaloDepth) -> Result<()> {
    for (r, pair) in shapes.windows(2).enumerate() {
        let (lower, upper) = (pair[0], pair[1]);
        if halo.prev > lower.rows {
            return Err(Error::Configuration(format!(
                "prev halo depth {} exceeds the {} rows of rank {r}",
                halo.prev, lower.rows
            )));
        }
        if halo.next > upper.rows {
            return Err(Error::Configuration(format!(
                "next halo depth {} exceeds the {} rows of rank {}",
                halo.next,
                upper.rows,
                r + 1
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo(rows: usize, halo: HaloDepth, rank: usize, p: usize) -> Topology {
        Topology::new(GlobalShape::new(rows, 2), halo, Partition::RowBlock, rank, p).unwrap()
    }

    #[test]
    fn segments_cover_all_rows() {
        let t = topo(8, HaloDepth::default(), 1, 3);
        let ranges: Vec<_> = t.segments.iter().map(Segment::row_range).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..8]);
        assert!(t.segments[1].is_local());
        assert!(!t.segments[0].is_local());
        assert_eq!(t.local, (3, 5));
    }

    #[test]
    fn row_kinds_interior_rank() {
        let t = topo(8, HaloDepth::new(1, 1), 1, 4);
        let kinds: Vec<RowKind> = t.rows.iter().map(|r| r.kind).collect();
        use RowKind::*;
        assert_eq!(
            kinds,
            vec![Remote, PrevHalo, Local, Local, NextHalo, Remote, Remote, Remote]
        );
        // prev halo at the start of the buffer, owned rows after it
        assert_eq!(t.rows[1].offset, Some(0));
        assert_eq!(t.rows[2].offset, Some(2));
        assert_eq!(t.rows[3].offset, Some(4));
        assert_eq!(t.rows[4].offset, Some(6));
        assert_eq!(t.rows[4].segment, 2);
        assert_eq!(t.rows[0].offset, None);
    }

    #[test]
    fn edge_ranks_have_one_sided_halos() {
        let first = topo(8, HaloDepth::new(2, 2), 0, 4);
        assert!(first.rows.iter().all(|r| r.kind != RowKind::PrevHalo));
        assert_eq!(first.rows[2].kind, RowKind::NextHalo);
        assert_eq!(first.rows[3].kind, RowKind::NextHalo);

        let last = topo(8, HaloDepth::new(2, 2), 3, 4);
        assert!(last.rows.iter().all(|r| r.kind != RowKind::NextHalo));
        assert_eq!(last.rows[4].kind, RowKind::PrevHalo);
        assert_eq!(last.rows[5].kind, RowKind::PrevHalo);
    }

    #[test]
    fn next_halo_offset_follows_padded_owned_region() {
        // blocks of 3, 3, 1; the next halo starts after the full owned region
        let t = topo(7, HaloDepth::new(1, 1), 1, 3);
        assert_eq!(t.layout.segment_size(), 6);
        assert_eq!(t.rows[6].kind, RowKind::NextHalo);
        assert_eq!(t.rows[6].offset, Some(2 + 6));
    }

    #[test]
    fn halo_deeper_than_neighbor_rejected() {
        // blocks of 3, 3, 1: rank 1 would need 2 rows from the last rank
        let err = Topology::new(
            GlobalShape::new(7, 2),
            HaloDepth::new(0, 2),
            Partition::RowBlock,
            0,
            3,
        );
        assert!(matches!(err, Err(Error::Configuration(_))));

        let err = Topology::new(
            GlobalShape::new(4, 2),
            HaloDepth::new(3, 0),
            Partition::RowBlock,
            0,
            2,
        );
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn single_rank_allows_any_depth() {
        let t = topo(2, HaloDepth::new(5, 5), 0, 1);
        assert!(t.rows.iter().all(|r| r.kind == RowKind::Local));
        assert_eq!(t.layout.segment_size(), 10);
    }

    #[test]
    fn entry_out_of_range() {
        let t = topo(4, HaloDepth::default(), 0, 2);
        assert!(matches!(t.entry(4), Err(Error::RowOutOfRange(4))));
        assert_eq!(t.local_segment().rank(), 0);
    }
}
