//! Ghost-buffer layout: `[prev halo | owned rows | next halo]`.

use std::ops::Range;

use crate::partition::SegmentShape;

/// Number of ghost rows replicated from the previous and next rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HaloDepth {
    /// Rows copied from the tail of rank - 1
    pub prev: usize,
    /// Rows copied from the head of rank + 1
    pub next: usize,
}

impl HaloDepth {
    /// Depth with the given prev/next row counts.
    pub const fn new(prev: usize, next: usize) -> Self {
        HaloDepth { prev, next }
    }

    /// Same depth on both sides.
    pub const fn symmetric(depth: usize) -> Self {
        HaloDepth::new(depth, depth)
    }

    /// No halo at all.
    pub const fn is_empty(&self) -> bool {
        self.prev == 0 && self.next == 0
    }
}

/// One of the three regions of a ghost buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Ghost rows from the previous rank
    PrevHalo,
    /// Rows owned by this rank
    Owned,
    /// Ghost rows from the next rank
    NextHalo,
}

/// Element offsets of the three regions inside one contiguous buffer.
///
/// The owned region holds `max(segment_rows, prev, next)` rows so that the
/// halo regions are well-defined even when a depth exceeds the block size.
/// All ranks build their layout from the same segment shape, so offsets
/// computed on one rank are valid on every other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhostLayout {
    cols: usize,
    halo: HaloDepth,
    owned_rows: usize,
}

impl GhostLayout {
    /// Layout for `segment` rows with `halo` ghost rows.
    pub fn new(segment: SegmentShape, halo: HaloDepth) -> Self {
        GhostLayout {
            cols: segment.cols,
            halo,
            owned_rows: segment.rows.max(halo.prev).max(halo.next),
        }
    }

    /// Row length in elements.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The halo depth this layout was built for.
    pub fn halo(&self) -> HaloDepth {
        self.halo
    }

    /// Elements reserved for owned rows.
    pub fn segment_size(&self) -> usize {
        self.owned_rows * self.cols
    }

    /// Total elements in the buffer.
    pub fn buffer_size(&self) -> usize {
        self.segment_size() + (self.halo.prev + self.halo.next) * self.cols
    }

    /// Element range of `region`.
    pub fn range(&self, region: Region) -> Range<usize> {
        let prev_end = self.halo.prev * self.cols;
        let owned_end = prev_end + self.segment_size();
        match region {
            Region::PrevHalo => 0..prev_end,
            Region::Owned => prev_end..owned_end,
            Region::NextHalo => owned_end..self.buffer_size(),
        }
    }

    /// Byte range of `region` for elements of `elem_size` bytes.
    pub fn byte_range(&self, region: Region, elem_size: usize) -> Range<usize> {
        let r = self.range(region);
        r.start * elem_size..r.end * elem_size
    }

    /// Offset of the `i`-th row of `region`, or `None` past its end.
    pub fn row_offset(&self, region: Region, i: usize) -> Option<usize> {
        let r = self.range(region);
        let off = i.checked_mul(self.cols)?.checked_add(r.start)?;
        (off < r.end).then_some(off)
    }

    /// Offset of the `i`-th owned row.
    pub fn owned_row(&self, i: usize) -> Option<usize> {
        self.row_offset(Region::Owned, i)
    }

    /// Offset of the `i`-th prev-halo row.
    pub fn prev_halo_row(&self, i: usize) -> Option<usize> {
        self.row_offset(Region::PrevHalo, i)
    }

    /// Offset of the `i`-th next-halo row.
    pub fn next_halo_row(&self, i: usize) -> Option<usize> {
        self.row_offset(Region::NextHalo, i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(rows: usize, cols: usize) -> SegmentShape {
        SegmentShape { rows, cols }
    }

    #[test]
    fn regions_are_contiguous_and_disjoint() {
        let l = GhostLayout::new(seg(4, 3), HaloDepth::new(1, 2));
        assert_eq!(l.range(Region::PrevHalo), 0..3);
        assert_eq!(l.range(Region::Owned), 3..15);
        assert_eq!(l.range(Region::NextHalo), 15..21);
        assert_eq!(l.buffer_size(), 21);
        assert_eq!(l.segment_size(), 12);
    }

    #[test]
    fn byte_ranges_scale() {
        let l = GhostLayout::new(seg(2, 2), HaloDepth::symmetric(1));
        assert_eq!(l.byte_range(Region::Owned, 8), 16..48);
        assert_eq!(l.byte_range(Region::NextHalo, 8), 48..64);
    }

    #[test]
    fn deep_halo_widens_owned_region() {
        let l = GhostLayout::new(seg(1, 2), HaloDepth::new(3, 0));
        assert_eq!(l.segment_size(), 6);
        assert_eq!(l.buffer_size(), 12);
        assert!(l.range(Region::NextHalo).is_empty());
    }

    #[test]
    fn no_halo() {
        let l = GhostLayout::new(seg(3, 4), HaloDepth::default());
        assert!(l.halo().is_empty());
        assert!(l.range(Region::PrevHalo).is_empty());
        assert_eq!(l.range(Region::Owned), 0..12);
        assert_eq!(l.buffer_size(), 12);
    }

    #[test]
    fn row_offsets() {
        let l = GhostLayout::new(seg(3, 2), HaloDepth::new(2, 1));
        assert_eq!(l.prev_halo_row(1), Some(2));
        assert_eq!(l.owned_row(0), Some(4));
        assert_eq!(l.owned_row(2), Some(8));
        assert_eq!(l.next_halo_row(0), Some(10));
    }

    #[test]
    fn row_offsets_stay_inside_their_region() {
        let l = GhostLayout::new(seg(3, 2), HaloDepth::new(2, 1));
        assert_eq!(l.prev_halo_row(2), None);
        assert_eq!(l.owned_row(3), None);
        assert_eq!(l.owned_row(1000), None);
        assert_eq!(l.next_halo_row(1), None);
        assert_eq!(l.owned_row(usize::MAX), None);

        // no halo: the ghost regions have no rows at all
        let bare = GhostLayout::new(seg(3, 2), HaloDepth::default());
        assert_eq!(bare.prev_halo_row(0), None);
        assert_eq!(bare.next_halo_row(0), None);
        assert_eq!(bare.owned_row(2), Some(4));
    }
}
