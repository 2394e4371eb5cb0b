//! Matrix Market coordinate files.
//!
//! Only the `coordinate` format is read:
//!
//! ```text
//! %%MatrixMarket matrix coordinate <real|integer|pattern> <general|symmetric>
//! % comments
//! rows cols nnz
//! row col [value]
//! ...
//! ```
//!
//! Indices are 1-based unless the caller says otherwise. `pattern` entries
//! carry no value and read as one. Symmetric files store one triangle; the
//! reader mirrors every off-diagonal entry. When a coordinate appears twice
//! the last value wins.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::partition::GlobalShape;

/// One stored entry of a sparse matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixEntry<T> {
    /// 0-based row index
    pub row: usize,
    /// 0-based column index
    pub col: usize,
    /// Stored value
    pub value: T,
}

/// Sparse matrix in coordinate form, entries kept sorted by `(row, col)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix<T> {
    shape: GlobalShape,
    entries: BTreeMap<(usize, usize), T>,
}

impl<T: Element> CooMatrix<T> {
    /// Empty matrix of `shape`.
    pub fn new(shape: GlobalShape) -> Self {
        CooMatrix {
            shape,
            entries: BTreeMap::new(),
        }
    }

    /// Global shape.
    pub fn shape(&self) -> GlobalShape {
        self.shape
    }

    /// Number of stored entries (mirrored entries included).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `value` at `(row, col)`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`Error::RowOutOfRange`] or [`Error::ColumnOutOfRange`] if the
    /// coordinate is outside the shape.
    pub fn insert(&mut self, row: usize, col: usize, value: T) -> Result<Option<T>> {
        if row >= self.shape.rows {
            return Err(Error::RowOutOfRange(row));
        }
        if col >= self.shape.cols {
            return Err(Error::ColumnOutOfRange(col));
        }
        Ok(self.entries.insert((row, col), value))
    }

    /// Value stored at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.entries.get(&(row, col)).copied()
    }

    /// Entries in `(row, col)` order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = MatrixEntry<T>> + '_ {
        self.entries.iter().map(|(&(row, col), &value)| MatrixEntry { row, col, value })
    }

    /// Entries of rows `rows`, in order.
    pub fn row_entries(
        &self,
        rows: std::ops::Range<usize>,
    ) -> impl Iterator<Item = MatrixEntry<T>> + '_ {
        self.entries
            .range((rows.start, 0)..(rows.end, 0))
            .map(|(&(row, col), &value)| MatrixEntry { row, col, value })
    }

    /// Compressed sparse row copy of the matrix.
    pub fn to_csr(&self) -> CsrMatrix<T> {
        let mut row_ptr = vec![0usize; self.shape.rows + 1];
        let mut col_idx = Vec::with_capacity(self.len());
        let mut values = Vec::with_capacity(self.len());
        for (&(row, col), &value) in &self.entries {
            row_ptr[row + 1] += 1;
            col_idx.push(col);
            values.push(value);
        }
        for i in 0..self.shape.rows {
            row_ptr[i + 1] += row_ptr[i];
        }
        CsrMatrix {
            shape: self.shape,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Dense row-major copy.
    pub fn to_dense(&self) -> Vec<T> {
        let mut dense = vec![T::ZERO; self.shape.size()];
        for (&(row, col), &value) in &self.entries {
            dense[row * self.shape.cols + col] = value;
        }
        dense
    }
}

/// Sparse matrix in compressed sparse row form.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T> {
    shape: GlobalShape,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
}

impl<T: Element> CsrMatrix<T> {
    /// Global shape.
    pub fn shape(&self) -> GlobalShape {
        self.shape
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// `rows + 1` offsets into the column/value arrays.
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    /// Column index of every stored entry.
    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    /// Value of every stored entry.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Column indices and values of row `i`.
    pub fn row(&self, i: usize) -> Option<(&[usize], &[T])> {
        let start = *self.row_ptr.get(i)?;
        let end = *self.row_ptr.get(i + 1)?;
        Some((&self.col_idx[start..end], &self.values[start..end]))
    }
}

/// Kind of value stored in a Matrix Market file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Floating-point values
    Real,
    /// Integer values
    Integer,
    /// No values; every entry is one
    Pattern,
}

/// Symmetry declared by a Matrix Market file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symmetry {
    /// Every entry is stored
    General,
    /// Only one triangle is stored; off-diagonal entries are mirrored
    Symmetric,
}

/// The `%%MatrixMarket` banner of a coordinate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Value kind
    pub value: ValueKind,
    /// Symmetry
    pub symmetry: Symmetry,
}

impl Header {
    /// Parse the banner line (line 1).
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<String> = line.split_whitespace().map(str::to_ascii_lowercase).collect();
        let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
        match tokens.as_slice() {
            ["%%matrixmarket", "matrix", "coordinate", value, symmetry] => {
                let value = match *value {
                    "real" => ValueKind::Real,
                    "integer" => ValueKind::Integer,
                    "pattern" => ValueKind::Pattern,
                    other => return Err(Error::parse(1, format!("unsupported value kind `{other}`"))),
                };
                let symmetry = match *symmetry {
                    "general" => Symmetry::General,
                    "symmetric" => Symmetry::Symmetric,
                    other => return Err(Error::parse(1, format!("unsupported symmetry `{other}`"))),
                };
                Ok(Header { value, symmetry })
            }
            ["%%matrixmarket", "matrix", format, ..] if *format != "coordinate" => {
                Err(Error::parse(1, format!("unsupported format `{format}`")))
            }
            _ => Err(Error::parse(1, "not a Matrix Market coordinate header")),
        }
    }
}

fn field<V: FromStr>(token: Option<&str>, line: usize, what: &str) -> Result<V> {
    let token = token.ok_or_else(|| Error::parse(line, format!("missing {what}")))?;
    token
        .parse()
        .map_err(|_| Error::parse(line, format!("invalid {what} `{token}`")))
}

fn index(token: Option<&str>, line: usize, what: &str, one_indexed: bool) -> Result<usize> {
    let raw: usize = field(token, line, what)?;
    if !one_indexed {
        return Ok(raw);
    }
    raw.checked_sub(1)
        .ok_or_else(|| Error::parse(line, format!("{what} 0 in a 1-indexed file")))
}

/// Read a coordinate file from `reader`.
///
/// # Errors
///
/// [`Error::Parse`] for a malformed header, dimensions line or entry, an
/// entry out of bounds, or an entry count different from the declared one;
/// [`Error::Io`] if reading fails.
pub fn parse_matrix_market<T, R>(reader: R, one_indexed: bool) -> Result<CooMatrix<T>>
where
    T: Element + FromStr,
    R: BufRead,
{
    let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));

    let header = match lines.next() {
        Some((_, line)) => Header::parse(&line?)?,
        None => return Err(Error::parse(0, "empty input")),
    };

    let mut dims = None;
    for (n, line) in lines.by_ref() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        dims = Some((n, trimmed.to_owned()));
        break;
    }
    let (dims_line, dims) = dims.ok_or_else(|| Error::parse(0, "missing dimensions line"))?;
    let mut tokens = dims.split_whitespace();
    let rows: usize = field(tokens.next(), dims_line, "row count")?;
    let cols: usize = field(tokens.next(), dims_line, "column count")?;
    let declared: usize = field(tokens.next(), dims_line, "entry count")?;
    if header.symmetry == Symmetry::Symmetric && rows != cols {
        return Err(Error::parse(dims_line, "symmetric matrix must be square"));
    }

    let mut matrix = CooMatrix::new(GlobalShape::new(rows, cols));
    let mut count = 0usize;
    for (n, line) in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        count += 1;
        if count > declared {
            return Err(Error::parse(n, format!("more than {declared} entries")));
        }

        let mut tokens = trimmed.split_whitespace();
        let i = index(tokens.next(), n, "row index", one_indexed)?;
        let j = index(tokens.next(), n, "column index", one_indexed)?;
        let value = match header.value {
            ValueKind::Pattern => T::ONE,
            ValueKind::Real | ValueKind::Integer => field(tokens.next(), n, "value")?,
        };
        if i >= rows || j >= cols {
            return Err(Error::parse(
                n,
                format!("entry ({i}, {j}) outside a {rows}x{cols} matrix"),
            ));
        }

        matrix.insert(i, j, value)?;
        if header.symmetry == Symmetry::Symmetric && i != j {
            matrix.insert(j, i, value)?;
        }
    }

    if count < declared {
        return Err(Error::parse(
            0,
            format!("input ended after {count} of {declared} entries"),
        ));
    }
    debug!(rows, cols, declared, stored = matrix.len(), "matrix market input parsed");
    Ok(matrix)
}

/// Read the coordinate file at `path`.
pub fn read_matrix_market<T, P>(path: P, one_indexed: bool) -> Result<CooMatrix<T>>
where
    T: Element + FromStr,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    parse_matrix_market(BufReader::new(file), one_indexed)
}

/// Read the 1-indexed coordinate file at `path`.
///
/// ```
/// use std::io::Write;
///
/// let mut file = tempfile::NamedTempFile::new()?;
/// writeln!(file, "%%MatrixMarket matrix coordinate real general")?;
/// writeln!(file, "2 2 1")?;
/// writeln!(file, "2 1 3.5")?;
///
/// let m = ferrodm::mmread::<f64, _>(file.path())?;
/// assert_eq!(m.get(1, 0), Some(3.5));
/// # Ok::<(), ferrodm::Error>(())
/// ```
pub fn mmread<T, P>(path: P) -> Result<CooMatrix<T>>
where
    T: Element + FromStr,
    P: AsRef<Path>,
{
    read_matrix_market(path, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: Element + FromStr>(text: &str) -> Result<CooMatrix<T>> {
        parse_matrix_market(text.as_bytes(), true)
    }

    #[test]
    fn symmetric_entries_are_mirrored() {
        let m: CooMatrix<f64> = parse(
            "%%MatrixMarket matrix coordinate real symmetric\n\
             % a comment\n\
             3 3 2\n\
             1 2 5.0\n\
             3 3 1.0\n",
        )
        .unwrap();
        let entries: Vec<_> = m.iter().map(|e| (e.row, e.col, e.value)).collect();
        assert_eq!(entries, vec![(0, 1, 5.0), (1, 0, 5.0), (2, 2, 1.0)]);
    }

    #[test]
    fn pattern_entries_read_as_one() {
        let m: CooMatrix<i32> = parse(
            "%%MatrixMarket matrix coordinate pattern general\n\
             2 3 2\n\
             1 3\n\
             2 1\n",
        )
        .unwrap();
        assert_eq!(m.get(0, 2), Some(1));
        assert_eq!(m.get(1, 0), Some(1));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn zero_indexed_input() {
        let m: CooMatrix<u32> = parse_matrix_market(
            "%%MatrixMarket matrix coordinate integer general\n2 2 1\n0 1 9\n".as_bytes(),
            false,
        )
        .unwrap();
        assert_eq!(m.get(0, 1), Some(9));
    }

    #[test]
    fn duplicate_keeps_last_value() {
        let m: CooMatrix<f32> = parse(
            "%%MatrixMarket matrix coordinate real general\n2 2 2\n1 1 1.0\n1 1 2.0\n",
        )
        .unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(0, 0), Some(2.0));
    }

    #[test]
    fn out_of_bounds_entry() {
        let err = parse::<f64>("%%MatrixMarket matrix coordinate real general\n2 2 1\n3 1 1.0\n")
            .unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }));
    }

    #[test]
    fn entry_count_must_match() {
        let more = parse::<f64>(
            "%%MatrixMarket matrix coordinate real general\n2 2 1\n1 1 1.0\n2 2 1.0\n",
        );
        assert!(matches!(more, Err(Error::Parse { line: 4, .. })));

        let fewer = parse::<f64>("%%MatrixMarket matrix coordinate real general\n2 2 2\n1 1 1.0\n");
        assert!(matches!(fewer, Err(Error::Parse { line: 0, .. })));
    }

    #[test]
    fn unsupported_headers() {
        for header in [
            "%%MatrixMarket matrix coordinate real skew-symmetric",
            "%%MatrixMarket matrix coordinate complex general",
            "%%MatrixMarket matrix array real general",
            "%%MatrixMarket vector coordinate real general",
            "hello",
        ] {
            let text = format!("{header}\n1 1 0\n");
            let err = parse::<f64>(&text).unwrap_err();
            assert!(matches!(err, Error::Parse { line: 1, .. }), "{header}");
        }
    }

    #[test]
    fn header_is_case_insensitive() {
        let h = Header::parse("%%MatrixMarket MATRIX Coordinate Real Symmetric").unwrap();
        assert_eq!(h.value, ValueKind::Real);
        assert_eq!(h.symmetry, Symmetry::Symmetric);
    }

    #[test]
    fn malformed_lines() {
        let missing_value =
            parse::<f64>("%%MatrixMarket matrix coordinate real general\n2 2 1\n1 1\n");
        assert!(matches!(missing_value, Err(Error::Parse { line: 3, .. })));

        let zero_index =
            parse::<f64>("%%MatrixMarket matrix coordinate real general\n2 2 1\n0 1 1.0\n");
        assert!(matches!(zero_index, Err(Error::Parse { line: 3, .. })));

        let bad_dims = parse::<f64>("%%MatrixMarket matrix coordinate real general\n2 x 1\n");
        assert!(matches!(bad_dims, Err(Error::Parse { line: 2, .. })));

        assert!(matches!(parse::<f64>(""), Err(Error::Parse { line: 0, .. })));
    }

    #[test]
    fn csr_conversion() {
        let mut m = CooMatrix::new(GlobalShape::new(3, 3));
        m.insert(2, 0, 4i64).unwrap();
        m.insert(0, 2, 1).unwrap();
        m.insert(0, 0, 2).unwrap();
        let csr = m.to_csr();
        assert_eq!(csr.row_ptr(), &[0, 2, 2, 3]);
        assert_eq!(csr.col_idx(), &[0, 2, 0]);
        assert_eq!(csr.values(), &[2, 1, 4]);
        assert_eq!(csr.nnz(), 3);
        assert_eq!(csr.row(1), Some((&[][..], &[][..])));
        assert_eq!(csr.row(3), None);
    }

    #[test]
    fn insert_checks_bounds() {
        let mut m = CooMatrix::<f64>::new(GlobalShape::new(2, 3));
        assert!(matches!(m.insert(2, 0, 1.0), Err(Error::RowOutOfRange(2))));
        assert!(matches!(m.insert(0, 3, 1.0), Err(Error::ColumnOutOfRange(3))));
        assert_eq!(m.insert(1, 2, 1.0).unwrap(), None);
        assert_eq!(m.insert(1, 2, 2.0).unwrap(), Some(1.0));
    }

    #[test]
    fn row_entries_and_dense() {
        let mut m = CooMatrix::new(GlobalShape::new(3, 2));
        m.insert(0, 1, 1u8).unwrap();
        m.insert(1, 0, 2).unwrap();
        m.insert(2, 1, 3).unwrap();
        let mid: Vec<_> = m.row_entries(1..3).map(|e| e.value).collect();
        assert_eq!(mid, vec![2, 3]);
        assert_eq!(m.to_dense(), vec![0, 1, 2, 0, 0, 3]);
    }

    #[test]
    fn reads_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "%%MatrixMarket matrix coordinate real general\n3 2 2\n1 1 1.5\n3 2 -2.0\n"
        )
        .unwrap();
        let m: CooMatrix<f64> = mmread(file.path()).unwrap();
        assert_eq!(m.shape(), GlobalShape::new(3, 2));
        assert_eq!(m.get(2, 1), Some(-2.0));

        let missing = mmread::<f64, _>(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}
