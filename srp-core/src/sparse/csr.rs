use crate::error::{PanelError, Result};
use crate::sparse::csc::CscMatrix;

/// Row-major boolean pattern matrix, the arbitrary-row-indexing twin of
/// [`CscMatrix`]. Column indices are sorted ascending within each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
}

impl CsrMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            indptr: vec![0; rows + 1],
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

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Column indices of the nonzeros in row `r`.
    pub fn row(&self, r: usize) -> &[u32] {
        &self.indices[self.indptr[r]..self.indptr[r + 1]]
    }

    /// Copy out the rows named in `take`, in that order. Duplicates are fine.
    pub fn select_rows(&self, take: &[usize]) -> Result<CsrMatrix> {
        let mut indptr = Vec::with_capacity(take.len() + 1);
        let mut indices = Vec::new();
        indptr.push(0);
        for &r in take {
            if r >= self.rows {
                return Err(PanelError::IndexOutOfRange(format!(
                    "row {r} out of range for {} rows",
                    self.rows
                )));
            }
            indices.extend_from_slice(self.row(r));
            indptr.push(indices.len());
        }
        Ok(Self {
            rows: take.len(),
            cols: self.cols,
            indptr,
            indices,
        })
    }

    /// Stack matrices on top of each other. All parts must share a width.
    pub fn vstack(parts: &[&CsrMatrix]) -> Result<CsrMatrix> {
        let Some(first) = parts.first() else {
            return Ok(CsrMatrix::zeros(0, 0));
        };
        let cols = first.cols;
        if parts.iter().any(|p| p.cols != cols) {
            return Err(PanelError::InvariantViolation(
                "vstack parts disagree on column count".into(),
            ));
        }
        let rows: usize = parts.iter().map(|p| p.rows).sum();
        let nnz: usize = parts.iter().map(|p| p.nnz()).sum();
        let mut indptr = Vec::with_capacity(rows + 1);
        let mut indices = Vec::with_capacity(nnz);
        indptr.push(0);
        for p in parts {
            for r in 0..p.rows {
                indices.extend_from_slice(p.row(r));
                indptr.push(indices.len());
            }
        }
        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
        })
    }

    /// Counting-sort conversion to the column-major form.
    pub fn to_csc(&self) -> CscMatrix {
        let mut counts = vec![0usize; self.cols];
        for &c in &self.indices {
            counts[c as usize] += 1;
        }
        let mut indptr = Vec::with_capacity(self.cols + 1);
        indptr.push(0);
        for c in 0..self.cols {
            indptr.push(indptr[c] + counts[c]);
        }
        let mut next = indptr[..self.cols].to_vec();
        let mut indices = vec![0u32; self.nnz()];
        for r in 0..self.rows {
            for &c in self.row(r) {
                indices[next[c as usize]] = r as u32;
                next[c as usize] += 1;
            }
        }
        CscMatrix::new_unchecked(self.rows, self.cols, indptr, indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CsrMatrix {
        CscMatrix::from_rows(&[
            vec![true, false, true],
            vec![false, true, false],
            vec![true, true, false],
        ])
        .unwrap()
        .to_csr()
    }

    #[test]
    fn select_rows_caller_order() {
        let picked = sample().select_rows(&[2, 0, 2]).unwrap();
        assert_eq!(
            picked.to_csc().to_dense(),
            vec![
                vec![true, true, false],
                vec![true, false, true],
                vec![true, true, false],
            ]
        );
    }

    #[test]
    fn select_rows_bounds() {
        assert!(matches!(
            sample().select_rows(&[3]),
            Err(PanelError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn vstack_concatenates() {
        let m = sample();
        let stacked = CsrMatrix::vstack(&[&m, &m]).unwrap();
        assert_eq!(stacked.rows(), 6);
        assert_eq!(stacked.nnz(), 2 * m.nnz());
        assert_eq!(stacked.row(3), m.row(0));
    }

    #[test]
    fn empty_vstack() {
        let stacked = CsrMatrix::vstack(&[]).unwrap();
        assert_eq!(stacked.rows(), 0);
        assert_eq!(stacked.cols(), 0);
    }
}
