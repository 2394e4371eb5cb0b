//! Row views, distributed iteration and the local-only algorithms.
//!
//! A matrix hands out its rows through two borrows:
//!
//! - [`Rows`] (shared) reads local rows and ghost rows;
//! - [`RowsMut`] (exclusive) additionally writes local rows.
//!
//! Both cover every global row in global order. Rows owned by other ranks
//! and not replicated here show up as [`RowKind::Remote`] views without
//! data. Algorithms check [`RowView::is_local()`] before writing, and may
//! read local + halo rows for neighbor-dependent computation.

use std::ops::{Deref, DerefMut, Range};

use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::layout::Region;
use crate::segment::{RowKind, Segment, Topology};

/// Storage behind a [`RowView`].
#[derive(Debug, Clone)]
pub enum RowStorage<'a, T> {
    /// Standalone row owning its elements; not part of any matrix
    Owned(Box<[T]>),
    /// Row of a matrix, addressed by its global index
    Borrowed {
        /// Global row index
        index: usize,
        /// Where the row lives on this rank
        kind: RowKind,
        /// Segment owning the row
        segment: &'a Segment,
        /// Elements, present for local and halo rows
        data: Option<&'a [T]>,
    },
}

/// One row of a matrix, or a standalone row.
#[derive(Debug, Clone)]
pub struct RowView<'a, T> {
    storage: RowStorage<'a, T>,
}

impl<'a, T: Element> RowView<'a, T> {
    /// Standalone row of `len` zeros.
    pub fn standalone(len: usize) -> Self {
        RowView {
            storage: RowStorage::Owned(vec![T::ZERO; len].into_boxed_slice()),
        }
    }

    /// Standalone row owning `values`.
    pub fn from_vec(values: Vec<T>) -> Self {
        RowView {
            storage: RowStorage::Owned(values.into_boxed_slice()),
        }
    }

    fn borrowed(index: usize, kind: RowKind, segment: &'a Segment, data: Option<&'a [T]>) -> Self {
        RowView {
            storage: RowStorage::Borrowed {
                index,
                kind,
                segment,
                data,
            },
        }
    }

    /// The storage behind this view.
    pub fn storage(&self) -> &RowStorage<'a, T> {
        &self.storage
    }

    /// Whether this row owns its elements.
    pub fn owns_storage(&self) -> bool {
        matches!(self.storage, RowStorage::Owned(_))
    }

    /// Global row index; `None` for standalone rows.
    pub fn index(&self) -> Option<usize> {
        match self.storage {
            RowStorage::Owned(_) => None,
            RowStorage::Borrowed { index, .. } => Some(index),
        }
    }

    /// Where the row lives; `None` for standalone rows.
    pub fn kind(&self) -> Option<RowKind> {
        match self.storage {
            RowStorage::Owned(_) => None,
            RowStorage::Borrowed { kind, .. } => Some(kind),
        }
    }

    /// Segment owning the row; `None` for standalone rows.
    pub fn segment(&self) -> Option<&'a Segment> {
        match self.storage {
            RowStorage::Owned(_) => None,
            RowStorage::Borrowed { segment, .. } => Some(segment),
        }
    }

    /// Whether the row is owned by the calling rank.
    pub fn is_local(&self) -> bool {
        self.kind() == Some(RowKind::Local)
    }

    /// Whether the row is a ghost copy of a neighbor's row.
    pub fn is_halo(&self) -> bool {
        self.kind().is_some_and(RowKind::is_halo)
    }

    /// The elements, if readable here.
    pub fn data(&self) -> Option<&[T]> {
        match &self.storage {
            RowStorage::Owned(values) => Some(values),
            RowStorage::Borrowed { data, .. } => *data,
        }
    }

    /// Row length in elements.
    pub fn len(&self) -> usize {
        match &self.storage {
            RowStorage::Owned(values) => values.len(),
            RowStorage::Borrowed { segment, .. } => segment.shape().cols,
        }
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `col`, if readable here.
    pub fn get(&self, col: usize) -> Option<T> {
        self.data().and_then(|d| d.get(col).copied())
    }

    /// Copy into a standalone row.
    ///
    /// # Errors
    ///
    /// [`Error::NotLocal`] if the row's data is not present on this rank.
    pub fn to_owned_row(&self) -> Result<RowView<'static, T>> {
        match self.data() {
            Some(values) => Ok(RowView::from_vec(values.to_vec())),
            None => Err(Error::NotLocal(self.index().unwrap_or_default())),
        }
    }
}

/// Plain read-only view over a matrix's row table and buffer.
#[derive(Debug, Clone, Copy)]
pub struct RowSet<'r, T> {
    topo: &'r Topology,
    data: &'r [T],
}

impl<'r, T: Element> RowSet<'r, T> {
    /// Number of global rows.
    pub fn len(&self) -> usize {
        self.topo.rows.len()
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View of global row `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<RowView<'r, T>> {
        let entry = self.topo.rows.get(index)?;
        let cols = self.topo.layout.cols();
        let data = entry.offset.map(|off| &self.data[off..off + cols]);
        Some(RowView::borrowed(
            index,
            entry.kind,
            &self.topo.segments[entry.segment],
            data,
        ))
    }

    /// All rows in global order.
    pub fn iter(&self) -> DistributedIter<'r, T> {
        DistributedIter {
            set: *self,
            front: 0,
            back: self.len(),
        }
    }

    /// Cursor positioned on global row `index`.
    pub fn cursor(&self, index: usize) -> Result<RowCursor<'r, T>> {
        self.topo.entry(index)?;
        Ok(RowCursor { set: *self, index })
    }

    /// Rows `range` for use with [`transform()`].
    pub fn subrange(&self, range: Range<usize>) -> Result<Subrange<'r, T>> {
        if range.start > range.end {
            return Err(Error::RowOutOfRange(range.start));
        }
        if range.end > self.len() {
            return Err(Error::RowOutOfRange(range.end));
        }
        Ok(Subrange { set: *self, range })
    }

    /// Row-major data of `segment` if it is the local one.
    pub fn segment_data(&self, segment: &Segment) -> Option<&'r [T]> {
        if !segment.is_local() {
            return None;
        }
        let start = self.topo.layout.range(Region::Owned).start;
        Some(&self.data[start..start + segment.size()])
    }

    /// The rows owned by this rank, row-major.
    pub fn local(&self) -> &'r [T] {
        let start = self.topo.layout.range(Region::Owned).start;
        &self.data[start..start + self.topo.local_segment().size()]
    }

    /// The whole prev-halo region.
    pub fn prev_halo(&self) -> &'r [T] {
        &self.data[self.topo.layout.range(Region::PrevHalo)]
    }

    /// The whole next-halo region.
    pub fn next_halo(&self) -> &'r [T] {
        &self.data[self.topo.layout.range(Region::NextHalo)]
    }
}

/// Iterator over all rows of a matrix in global order.
#[derive(Debug, Clone)]
pub struct DistributedIter<'r, T> {
    set: RowSet<'r, T>,
    front: usize,
    back: usize,
}

impl<'r, T: Element> DistributedIter<'r, T> {
    /// Only the rows owned by this rank.
    pub fn local(self) -> impl Iterator<Item = RowView<'r, T>> {
        self.filter(RowView::is_local)
    }

    /// Only rows readable here (local and halo).
    pub fn readable(self) -> impl Iterator<Item = RowView<'r, T>> {
        self.filter(|r| r.data().is_some())
    }
}

impl<'r, T: Element> Iterator for DistributedIter<'r, T> {
    type Item = RowView<'r, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let row = self.set.get(self.front);
        self.front += 1;
        row
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl<T: Element> DoubleEndedIterator for DistributedIter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.set.get(self.back)
    }
}

impl<T: Element> ExactSizeIterator for DistributedIter<'_, T> {}

/// A position in the row sequence with access to neighboring rows.
#[derive(Debug, Clone, Copy)]
pub struct RowCursor<'r, T> {
    set: RowSet<'r, T>,
    index: usize,
}

impl<'r, T: Element> RowCursor<'r, T> {
    /// Global index of the current row.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Where the current row lives.
    pub fn kind(&self) -> RowKind {
        self.set.topo.rows[self.index].kind
    }

    /// Whether the current row is owned by this rank.
    pub fn is_local(&self) -> bool {
        self.kind() == RowKind::Local
    }

    /// The current row.
    pub fn row(&self) -> RowView<'r, T> {
        self.neighbor(0).unwrap_or_else(|| RowView::standalone(0))
    }

    /// The row `delta` positions away, or `None` outside the matrix.
    pub fn neighbor(&self, delta: isize) -> Option<RowView<'r, T>> {
        let target = self.index.checked_add_signed(delta)?;
        self.set.get(target)
    }

    /// Element `col` of the row `delta` positions away, if readable here.
    pub fn value(&self, delta: isize, col: usize) -> Option<T> {
        self.neighbor(delta).and_then(|r| r.get(col))
    }
}

/// A contiguous range of input rows for [`transform()`].
#[derive(Debug, Clone)]
pub struct Subrange<'r, T> {
    set: RowSet<'r, T>,
    range: Range<usize>,
}

impl<'r, T: Element> Subrange<'r, T> {
    /// Global row indices covered.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Cursors over the range, in order.
    pub fn cursors(&self) -> impl Iterator<Item = RowCursor<'r, T>> + '_ {
        self.range.clone().map(|index| RowCursor {
            set: self.set,
            index,
        })
    }
}

/// Shared access to the rows of a matrix.
///
/// Borrows the matrix shared; the matrix cannot fence or exchange while a
/// `Rows` is alive.
pub struct Rows<'a, T: Element> {
    topo: &'a Topology,
    data: &'a [T],
}

impl<'a, T: Element> Rows<'a, T> {
    pub(crate) fn new(topo: &'a Topology, data: &'a [T]) -> Self {
        Rows { topo, data }
    }

    /// Plain view over the rows.
    pub fn set(&self) -> RowSet<'_, T> {
        RowSet {
            topo: self.topo,
            data: self.data,
        }
    }

    /// Number of global rows.
    pub fn len(&self) -> usize {
        self.topo.rows.len()
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View of global row `index`.
    pub fn get(&self, index: usize) -> Option<RowView<'_, T>> {
        self.set().get(index)
    }

    /// All rows in global order.
    pub fn iter(&self) -> DistributedIter<'_, T> {
        self.set().iter()
    }

    /// Cursor positioned on global row `index`.
    pub fn cursor(&self, index: usize) -> Result<RowCursor<'_, T>> {
        self.set().cursor(index)
    }

    /// Rows `range` for use with [`transform()`].
    pub fn subrange(&self, range: Range<usize>) -> Result<Subrange<'_, T>> {
        self.set().subrange(range)
    }

    /// The rows owned by this rank, row-major.
    pub fn local(&self) -> &[T] {
        self.set().local()
    }

    /// The whole prev-halo region.
    pub fn prev_halo(&self) -> &[T] {
        self.set().prev_halo()
    }

    /// The whole next-halo region.
    pub fn next_halo(&self) -> &[T] {
        self.set().next_halo()
    }
}

impl<'s, T: Element> IntoIterator for &'s Rows<'_, T> {
    type Item = RowView<'s, T>;
    type IntoIter = DistributedIter<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A mutable local row handed to [`for_each()`] callbacks.
#[derive(Debug)]
pub struct RowMut<'a, T> {
    index: usize,
    data: &'a mut [T],
}

impl<T> RowMut<'_, T> {
    /// Global row index.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Deref for RowMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

impl<T> DerefMut for RowMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data
    }
}

/// Exclusive access to the rows of a matrix.
///
/// Local rows are writable; halo rows stay read-only.
pub struct RowsMut<'a, T: Element> {
    topo: &'a Topology,
    data: &'a mut [T],
}

impl<'a, T: Element> RowsMut<'a, T> {
    pub(crate) fn new(topo: &'a Topology, data: &'a mut [T]) -> Self {
        RowsMut { topo, data }
    }

    /// Read-only view over the rows, including halos.
    pub fn set(&self) -> RowSet<'_, T> {
        RowSet {
            topo: self.topo,
            data: &*self.data,
        }
    }

    /// Number of global rows.
    pub fn len(&self) -> usize {
        self.topo.rows.len()
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View of global row `index`.
    pub fn get(&self, index: usize) -> Option<RowView<'_, T>> {
        self.set().get(index)
    }

    /// Mutable elements of local row `index`.
    ///
    /// # Errors
    ///
    /// [`Error::RowOutOfRange`] past the end, [`Error::NotLocal`] for halo
    /// and remote rows.
    pub fn row_mut(&mut self, index: usize) -> Result<&mut [T]> {
        let entry = self.topo.entry(index)?;
        match (entry.kind, entry.offset) {
            (RowKind::Local, Some(off)) => {
                let cols = self.topo.layout.cols();
                Ok(&mut self.data[off..off + cols])
            }
            _ => Err(Error::NotLocal(index)),
        }
    }

    /// Overwrite local row `index` with `values`.
    pub fn assign(&mut self, index: usize, values: &[T]) -> Result<()> {
        let row = self.row_mut(index)?;
        if row.len() != values.len() {
            return Err(Error::InvalidBuffer);
        }
        row.copy_from_slice(values);
        Ok(())
    }

    /// The rows owned by this rank, row-major.
    pub fn local_mut(&mut self) -> &mut [T] {
        let start = self.topo.layout.range(Region::Owned).start;
        let len = self.topo.local_segment().size();
        &mut self.data[start..start + len]
    }

    /// Call `op` on every row owned by this rank, in global order.
    pub fn for_each<F>(&mut self, mut op: F)
    where
        F: FnMut(RowMut<'_, T>),
    {
        let cols = self.topo.layout.cols();
        for (index, entry) in self.topo.rows.iter().enumerate() {
            if let (RowKind::Local, Some(off)) = (entry.kind, entry.offset) {
                op(RowMut {
                    index,
                    data: &mut self.data[off..off + cols],
                });
            }
        }
    }
}

/// Apply `op` to every row in `rows` that is local to the calling rank.
///
/// Rows owned by other ranks are skipped; each rank updates its own block.
///
/// ```no_run
/// use ferrodm::{for_each, DistributedMatrix, GlobalShape, Runtime};
///
/// let runtime = Runtime::init()?;
/// let world = runtime.world();
/// let mut m = DistributedMatrix::<i32>::new(&world, GlobalShape::new(4, 3))?;
/// for_each(&mut m.rows_mut(), |mut row| {
///     let i = row.index() as i32;
///     row.fill(i);
/// });
/// let rows = m.rows();
/// for row in rows.iter().local() {
///     assert!(row.data().unwrap().iter().all(|&v| v == row.index().unwrap() as i32));
/// }
/// # Ok::<(), ferrodm::Error>(())
/// ```
pub fn for_each<T, F>(rows: &mut RowsMut<'_, T>, op: F)
where
    T: Element,
    F: FnMut(RowMut<'_, T>),
{
    rows.for_each(op);
}

/// Compute output rows from input rows, skipping positions not local here.
///
/// Input position `k` of `input` is aligned with output row `out_start + k`.
/// Where the input row is local, `op` receives a cursor on it (so it can
/// read neighboring local and halo rows) and its result overwrites the
/// aligned output row. Non-local positions are skipped without breaking
/// the alignment.
///
/// # Errors
///
/// - [`Error::RowOutOfRange`] if the output range runs past the end.
/// - [`Error::NotLocal`] if an output row aligned with a local input row is
///   not local on the output matrix.
/// - [`Error::InvalidBuffer`] if `op` returns a row of the wrong length.
pub fn transform<T, U, F>(
    input: &Subrange<'_, T>,
    output: &mut RowsMut<'_, U>,
    out_start: usize,
    mut op: F,
) -> Result<()>
where
    T: Element,
    U: Element,
    F: FnMut(&RowCursor<'_, T>) -> Vec<U>,
{
    let out_end = out_start + input.len();
    if out_end > output.len() {
        return Err(Error::RowOutOfRange(out_end));
    }
    for (out, cursor) in (out_start..out_end).zip(input.cursors()) {
        if cursor.is_local() {
            let values = op(&cursor);
            output.assign(out, &values)?;
        }
    }
    Ok(())
}
