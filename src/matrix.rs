//! The distributed dense matrix: composition root of the crate.
//!
//! A [`DistributedMatrix`] owns one ghost buffer per process, the MPI window
//! exposing it, the halo exchange plan and the segment/row tables. It is
//! built collectively and torn down collectively:
//!
//! 1. partition the global shape and validate the halo depth (identically
//!    on every rank, so a bad configuration fails everywhere);
//! 2. allocate the `[prev halo | owned | next halo]` buffer;
//! 3. create and register the window (which opens the first epoch);
//! 4. on drop (or [`DistributedMatrix::free()`]): fence, deregister, free the
//!    window and release the buffer.

use std::fmt::Write as _;

use tracing::{debug, trace};

use crate::comm::Communicator;
use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::halo::{ExchangePlan, HaloExchanger};
use crate::layout::{GhostLayout, HaloDepth, Region};
use crate::mmio::CooMatrix;
use crate::partition::{GlobalShape, Partition, SegmentShape};
use crate::registry::{WindowId, WindowRegistry};
use crate::row::{Rows, RowsMut};
use crate::segment::{Segment, Topology};
use crate::window::MemoryWindow;

/// Construction parameters of a [`DistributedMatrix`].
///
/// ```no_run
/// use ferrodm::{DistributedMatrix, GlobalShape, HaloDepth, Runtime};
///
/// let runtime = Runtime::init()?;
/// let world = runtime.world();
/// let m = DistributedMatrix::<f64>::builder(GlobalShape::new(6, 4))
///     .halo(HaloDepth::symmetric(1))
///     .fill(1.5)
///     .build(&world)?;
/// println!("{} rows per block", m.segment_shape().rows);
/// # Ok::<(), ferrodm::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MatrixBuilder<T: Element> {
    shape: GlobalShape,
    halo: HaloDepth,
    partition: Partition,
    fill: T,
    registry: Option<WindowRegistry>,
}

impl<T: Element> MatrixBuilder<T> {
    fn new(shape: GlobalShape) -> Self {
        MatrixBuilder {
            shape,
            halo: HaloDepth::default(),
            partition: Partition::default(),
            fill: T::ZERO,
            registry: None,
        }
    }

    /// Ghost rows on each side (default none).
    pub fn halo(mut self, halo: HaloDepth) -> Self {
        self.halo = halo;
        self
    }

    /// Partition strategy (default row-block).
    pub fn partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    /// Initial value of every element, halo regions included (default zero).
    pub fn fill(mut self, value: T) -> Self {
        self.fill = value;
        self
    }

    /// Registry the window is recorded in (default: the communicator's).
    pub fn registry(mut self, registry: WindowRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the matrix (collective).
    pub fn build(self, comm: &Communicator) -> Result<DistributedMatrix<T>> {
        DistributedMatrix::construct(comm, self)
    }
}

/// A dense matrix partitioned into row blocks across the ranks of a group.
///
/// # Example
///
/// ```no_run
/// use ferrodm::{DistributedMatrix, GlobalShape, HaloDepth, Runtime};
///
/// // Run with: mpiexec -n 4
/// let runtime = Runtime::init()?;
/// let world = runtime.world();
/// let mut m = DistributedMatrix::<f64>::with_halo(
///     &world,
///     GlobalShape::new(8, 2),
///     HaloDepth::new(1, 1),
/// )?;
/// m.rows_mut().for_each(|mut row| {
///     let v = row.index() as f64;
///     row.fill(v);
/// });
/// m.halo().exchange()?;
///
/// if world.rank() == 1 {
///     let rows = m.rows();
///     assert_eq!(rows.prev_halo(), &[1.0, 1.0]);
///     assert_eq!(rows.next_halo(), &[4.0, 4.0]);
/// }
/// # Ok::<(), ferrodm::Error>(())
/// ```
pub struct DistributedMatrix<T: Element> {
    comm: Communicator,
    topo: Topology,
    plan: ExchangePlan,
    window: MemoryWindow<T>,
}

impl<T: Element> DistributedMatrix<T> {
    /// Builder for a matrix of `shape`.
    pub fn builder(shape: GlobalShape) -> MatrixBuilder<T> {
        MatrixBuilder::new(shape)
    }

    /// Zero-filled matrix without halo (collective).
    pub fn new(comm: &Communicator, shape: GlobalShape) -> Result<Self> {
        Self::builder(shape).build(comm)
    }

    /// Zero-filled matrix with `halo` ghost rows (collective).
    pub fn with_halo(comm: &Communicator, shape: GlobalShape, halo: HaloDepth) -> Result<Self> {
        Self::builder(shape).halo(halo).build(comm)
    }

    /// Dense matrix holding the entries of `coo` (collective).
    ///
    /// Every rank must pass the same matrix; each copies the entries that
    /// fall in its own rows. Cells without an entry are zero.
    pub fn from_coo(comm: &Communicator, coo: &CooMatrix<T>, halo: HaloDepth) -> Result<Self> {
        let mut m = Self::with_halo(comm, coo.shape(), halo)?;
        let cols = coo.shape().cols;
        let (first, last) = m.local_rows_indices();
        {
            let mut rows = m.rows_mut();
            let local = rows.local_mut();
            for e in coo.row_entries(first..last + 1) {
                local[(e.row - first) * cols + e.col] = e.value;
            }
        }
        m.fence()?;
        Ok(m)
    }

    fn construct(comm: &Communicator, b: MatrixBuilder<T>) -> Result<Self> {
        let topo = Topology::new(b.shape, b.halo, b.partition, comm.rank(), comm.size())?;
        let plan = ExchangePlan::new(&topo.segments, &topo.layout, topo.rank);

        let buffer = vec![b.fill; topo.layout.buffer_size()].into_boxed_slice();
        let registry = b.registry.unwrap_or_else(|| comm.registry().clone());
        let window = MemoryWindow::create(comm, buffer, &registry)?;

        debug!(
            window = window.id().raw(),
            rows = b.shape.rows,
            cols = b.shape.cols,
            first = topo.local.0,
            last = topo.local.1,
            halo_prev = b.halo.prev,
            halo_next = b.halo.next,
            "distributed matrix constructed"
        );

        Ok(DistributedMatrix {
            comm: comm.clone(),
            topo,
            plan,
            window,
        })
    }

    /// Global shape.
    pub fn shape(&self) -> GlobalShape {
        self.topo.shape
    }

    /// Number of cells in the global matrix.
    pub fn size(&self) -> usize {
        self.topo.shape.size()
    }

    /// Shape of a full (non-last) segment; every buffer is sized from it.
    pub fn segment_shape(&self) -> SegmentShape {
        self.topo.segments[0].shape()
    }

    /// All segments, in rank order.
    pub fn segments(&self) -> &[Segment] {
        &self.topo.segments
    }

    /// The segment owned by this rank.
    pub fn local_segment(&self) -> &Segment {
        self.topo.local_segment()
    }

    /// Elements reserved for owned rows in the buffer.
    pub fn segment_size(&self) -> usize {
        self.topo.layout.segment_size()
    }

    /// Total elements in the buffer, halos included.
    pub fn data_size(&self) -> usize {
        self.topo.layout.buffer_size()
    }

    /// Buffer layout.
    pub fn layout(&self) -> &GhostLayout {
        &self.topo.layout
    }

    /// Ghost rows on each side.
    pub fn halo_bounds(&self) -> HaloDepth {
        self.topo.layout.halo()
    }

    /// Inclusive `(first, last)` global indices of the rows owned here.
    pub fn local_rows_indices(&self) -> (usize, usize) {
        self.topo.local
    }

    /// Whether global row `index` is owned here.
    pub fn is_local_row(&self, index: usize) -> bool {
        let (first, last) = self.topo.local;
        index >= first && index <= last
    }

    /// Whether cell `index` of the row-major linear view is owned here.
    pub fn is_local_cell(&self, index: usize) -> bool {
        self.is_local_row(index / self.topo.shape.cols)
    }

    /// The communicator the matrix was built on.
    pub fn comm(&self) -> &Communicator {
        &self.comm
    }

    /// Id of the matrix's memory window.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Shared access to all rows.
    pub fn rows(&self) -> Rows<'_, T> {
        Rows::new(&self.topo, self.window.local())
    }

    /// Exclusive access to all rows; local rows are writable.
    pub fn rows_mut(&mut self) -> RowsMut<'_, T> {
        RowsMut::new(&self.topo, self.window.local_mut())
    }

    /// The halo exchanger.
    pub fn halo(&mut self) -> HaloExchanger<'_, T> {
        HaloExchanger::new(&self.plan, &mut self.window)
    }

    /// Fence the matrix's window (collective).
    pub fn fence(&mut self) -> Result<()> {
        self.window.fence()
    }

    /// Gather the whole matrix, row-major, on every rank (collective).
    pub fn to_dense(&self) -> Result<Vec<T>> {
        let dense = self.comm.allgatherv(self.rows().local())?;
        if dense.len() != self.size() {
            return Err(Error::Internal(format!(
                "gathered {} cells, expected {}",
                dense.len(),
                self.size()
            )));
        }
        Ok(dense)
    }

    /// Text rendering of this rank's buffer: prev halo, local rows, next halo.
    pub fn dump(&self) -> String {
        let rows = self.rows();
        let rank = self.topo.rank;
        let mut s = String::new();
        let _ = writeln!(
            s,
            "{rank}: shape [{}, {}] seg_size {} data_size {}",
            self.topo.shape.rows,
            self.topo.shape.cols,
            self.segment_size(),
            self.data_size()
        );
        let _ = writeln!(s, "{rank}: halo.prev {:?}", rows.prev_halo());
        for row in rows.iter().local() {
            if let (Some(i), Some(data)) = (row.index(), row.data()) {
                let _ = writeln!(s, "{rank}: row {i} {data:?}");
            }
        }
        let _ = writeln!(s, "{rank}: halo.next {:?}", rows.next_halo());
        s
    }

    /// Element range of `region` in this rank's buffer.
    pub fn region(&self, region: Region) -> std::ops::Range<usize> {
        self.topo.layout.range(region)
    }

    /// Tear the matrix down explicitly (collective): fence, deregister and
    /// free the window, release the buffer.
    ///
    /// Dropping the matrix does the same but can only log a failed fence.
    pub fn free(self) -> Result<()> {
        trace!(window = self.window.id().raw(), "{}", self.dump());
        self.window.free()
    }
}

impl<T: Element> std::fmt::Debug for DistributedMatrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedMatrix")
            .field("rank", &self.topo.rank)
            .field("shape", &self.topo.shape)
            .field("local_rows", &self.topo.local)
            .field("halo", &self.halo_bounds())
            .field("window", &self.window.id())
            .finish()
    }
}
