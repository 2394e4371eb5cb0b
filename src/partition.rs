//! Row-block partitioning of a global shape across ranks.

use crate::error::{Error, Result};

/// Global `(rows, cols)` of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalShape {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
}

impl GlobalShape {
    /// Shape with the given row and column counts.
    pub const fn new(rows: usize, cols: usize) -> Self {
        GlobalShape { rows, cols }
    }

    /// Number of cells.
    pub const fn size(&self) -> usize {
        self.rows * self.cols
    }
}

impl From<(usize, usize)> for GlobalShape {
    fn from((rows, cols): (usize, usize)) -> Self {
        GlobalShape::new(rows, cols)
    }
}

/// Shape of the row block owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentShape {
    /// Rows in the block
    pub rows: usize,
    /// Columns (always the global column count)
    pub cols: usize,
}

impl SegmentShape {
    /// Number of cells in the block.
    pub const fn size(&self) -> usize {
        self.rows * self.cols
    }
}

/// How a matrix is split across ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Partition {
    /// Contiguous blocks of whole rows, one per rank
    #[default]
    RowBlock,
    /// Contiguous blocks of whole columns (not supported)
    ColumnBlock,
}

/// Maps a global shape and a process count to per-rank segment shapes.
///
/// Ranks `0..P-1` get `ceil(rows / P)` rows each and the last rank gets the
/// remainder. The result is a pure function of its inputs, so every rank
/// computes the same table without communicating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShapePartitioner {
    partition: Partition,
}

impl ShapePartitioner {
    /// Partitioner for the given strategy.
    pub const fn new(partition: Partition) -> Self {
        ShapePartitioner { partition }
    }

    /// The strategy in use.
    pub const fn partition(&self) -> Partition {
        self.partition
    }

    /// Segment shapes for ranks `0..nprocs`, in rank order.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the strategy is not row-block, any extent
    /// is zero, or the last rank would end up with no rows.
    pub fn segments(&self, shape: GlobalShape, nprocs: usize) -> Result<Vec<SegmentShape>> {
        match self.partition {
            Partition::RowBlock => partition_rows(shape, nprocs),
            Partition::ColumnBlock => Err(Error::Configuration(
                "column-block partitioning is not supported; use Partition::RowBlock".into(),
            )),
        }
    }
}

/// Row-block partition of `shape` over `nprocs` ranks.
///
/// ```
/// use ferrodm::{partition_rows, GlobalShape};
///
/// let rows: Vec<usize> = partition_rows(GlobalShape::new(5, 3), 3)?
///     .iter()
///     .map(|s| s.rows)
///     .collect();
/// assert_eq!(rows, vec![2, 2, 1]);
/// assert!(partition_rows(GlobalShape::new(5, 3), 6).is_err());
/// # Ok::<(), ferrodm::Error>(())
/// ```
pub fn partition_rows(shape: GlobalShape, nprocs: usize) -> Result<Vec<SegmentShape>> {
    if nprocs == 0 {
        return Err(Error::Configuration("process count must be positive".into()));
    }
    if shape.rows == 0 || shape.cols == 0 {
        return Err(Error::Configuration(format!(
            "matrix shape must be non-empty, got {}x{}",
            shape.rows, shape.cols
        )));
    }
    if shape.rows < nprocs {
        return Err(Error::Configuration(format!(
            "rows ({}) < processes ({nprocs})",
            shape.rows
        )));
    }

    let block = shape.rows.div_ceil(nprocs);
    let head = (nprocs - 1) * block;
    if head >= shape.rows {
        return Err(Error::Configuration(format!(
            "{} rows in blocks of {block} leave no rows for rank {}",
            shape.rows,
            nprocs - 1
        )));
    }

    let mut segments = vec![
        SegmentShape {
            rows: block,
            cols: shape.cols,
        };
        nprocs - 1
    ];
    segments.push(SegmentShape {
        rows: shape.rows - head,
        cols: shape.cols,
    });
    Ok(segments)
}
