use crate::error::{PanelError, Result};
use crate::sparse::csr::CsrMatrix;

/// Column-major boolean pattern matrix.
///
/// Values are implicitly `true`; only the nonzero structure is stored.
/// Row indices are sorted ascending within each column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CscMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
}

impl CscMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            indptr: vec![0; cols + 1],
            indices: Vec::new(),
        }
    }

    pub(crate) fn new_unchecked(
        rows: usize,
        cols: usize,
        indptr: Vec<usize>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            rows,
            cols,
            indptr,
            indices,
        }
    }

    /// Build from dense bit rows. All rows must have the same width.
    pub fn from_rows(bits: &[Vec<bool>]) -> Result<Self> {
        let rows = bits.len();
        let cols = bits.first().map(Vec::len).unwrap_or(0);
        if bits.iter().any(|r| r.len() != cols) {
            return Err(PanelError::InvariantViolation(
                "ragged rows in dense input".into(),
            ));
        }
        if rows > u32::MAX as usize {
            return Err(PanelError::InvariantViolation(format!(
                "{rows} rows exceed the index width"
            )));
        }
        let mut indptr = Vec::with_capacity(cols + 1);
        let mut indices = Vec::new();
        indptr.push(0);
        for c in 0..cols {
            for (r, row) in bits.iter().enumerate() {
                if row[c] {
                    indices.push(r as u32);
                }
            }
            indptr.push(indices.len());
        }
        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
        })
    }

    /// Build from raw parts, validating the full structural contract.
    pub fn from_parts(
        rows: usize,
        cols: usize,
        indptr: Vec<usize>,
        indices: Vec<u32>,
    ) -> Result<Self> {
        if indptr.len() != cols + 1 || indptr.first() != Some(&0) {
            return Err(PanelError::InvariantViolation(
                "indptr length disagrees with column count".into(),
            ));
        }
        if indptr.windows(2).any(|w| w[0] > w[1]) || *indptr.last().unwrap_or(&0) != indices.len() {
            return Err(PanelError::InvariantViolation(
                "indptr is not a monotone prefix of the index array".into(),
            ));
        }
        for c in 0..cols {
            let col = &indices[indptr[c]..indptr[c + 1]];
            if col.iter().any(|&r| r as usize >= rows) {
                return Err(PanelError::InvariantViolation(
                    "row index out of bounds".into(),
                ));
            }
            if col.windows(2).any(|w| w[0] >= w[1]) {
                return Err(PanelError::InvariantViolation(
                    "row indices not strictly ascending within a column".into(),
                ));
            }
        }
        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Row indices of the nonzeros in column `c`.
    pub fn column(&self, c: usize) -> &[u32] {
        &self.indices[self.indptr[c]..self.indptr[c + 1]]
    }

    pub fn get(&self, r: usize, c: usize) -> bool {
        self.column(c).binary_search(&(r as u32)).is_ok()
    }

    /// Nonzero count per row.
    pub fn row_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.rows];
        for &r in &self.indices {
            counts[r as usize] += 1;
        }
        counts
    }

    /// Copy out the columns named in `keep`, in that order.
    pub fn select_columns(&self, keep: &[usize]) -> Result<CscMatrix> {
        let mut indptr = Vec::with_capacity(keep.len() + 1);
        let mut indices = Vec::new();
        indptr.push(0);
        for &c in keep {
            if c >= self.cols {
                return Err(PanelError::IndexOutOfRange(format!(
                    "column {c} out of range for {} columns",
                    self.cols
                )));
            }
            indices.extend_from_slice(self.column(c));
            indptr.push(indices.len());
        }
        Ok(Self {
            rows: self.rows,
            cols: keep.len(),
            indptr,
            indices,
        })
    }

    /// Stack matrices on top of each other. All parts must share a width.
    pub fn vstack(parts: &[&CscMatrix]) -> Result<CscMatrix> {
        let Some(first) = parts.first() else {
            return Ok(CscMatrix::zeros(0, 0));
        };
        let cols = first.cols;
        if parts.iter().any(|p| p.cols != cols) {
            return Err(PanelError::InvariantViolation(
                "vstack parts disagree on column count".into(),
            ));
        }
        let rows: usize = parts.iter().map(|p| p.rows).sum();
        let nnz: usize = parts.iter().map(|p| p.nnz()).sum();
        let mut indptr = Vec::with_capacity(cols + 1);
        let mut indices = Vec::with_capacity(nnz);
        indptr.push(0);
        for c in 0..cols {
            let mut base = 0u32;
            for p in parts {
                indices.extend(p.column(c).iter().map(|&r| r + base));
                base += p.rows as u32;
            }
            indptr.push(indices.len());
        }
        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
        })
    }

    /// Counting-sort conversion to the row-major form.
    pub fn to_csr(&self) -> CsrMatrix {
        let mut counts = vec![0usize; self.rows];
        for &r in &self.indices {
            counts[r as usize] += 1;
        }
        let mut indptr = Vec::with_capacity(self.rows + 1);
        indptr.push(0);
        for r in 0..self.rows {
            indptr.push(indptr[r] + counts[r]);
        }
        let mut next = indptr[..self.rows].to_vec();
        let mut indices = vec![0u32; self.nnz()];
        for c in 0..self.cols {
            for &r in self.column(c) {
                indices[next[r as usize]] = c as u32;
                next[r as usize] += 1;
            }
        }
        CsrMatrix::new_unchecked(self.rows, self.cols, indptr, indices)
    }

    pub fn to_dense(&self) -> Vec<Vec<bool>> {
        let mut out = vec![vec![false; self.cols]; self.rows];
        for c in 0..self.cols {
            for &r in self.column(c) {
                out[r as usize][c] = true;
            }
        }
        out
    }
}
