use crate::error::{PanelError, Result};

/// Row (variant-axis) selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSelector {
    /// One row.
    Single(usize),
    /// `[start:stop:step]`; unbounded ends are `None`, `step` is nonzero.
    Slice {
        start: Option<usize>,
        stop: Option<usize>,
        step: isize,
    },
    /// Explicit rows, returned in exactly this order.
    Indices(Vec<usize>),
}

impl RowSelector {
    pub fn all() -> Self {
        Self::Slice {
            start: None,
            stop: None,
            step: 1,
        }
    }

    pub fn span(start: usize, stop: usize) -> Self {
        Self::Slice {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }
}

impl From<usize> for RowSelector {
    fn from(idx: usize) -> Self {
        Self::Single(idx)
    }
}

impl From<std::ops::Range<usize>> for RowSelector {
    fn from(r: std::ops::Range<usize>) -> Self {
        Self::span(r.start, r.end)
    }
}

impl From<Vec<usize>> for RowSelector {
    fn from(v: Vec<usize>) -> Self {
        Self::Indices(v)
    }
}

/// Column (haplotype-axis) selection, applied opaquely to the stacked
/// matrix after row resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColSelector {
    All,
    Single(usize),
    List(Vec<usize>),
    Slice {
        start: Option<usize>,
        stop: Option<usize>,
        step: isize,
    },
    Mask(Vec<bool>),
}

impl ColSelector {
    /// Resolve to an ordered column-id list against a matrix of width
    /// `cols`, validating the selector shape up-front.
    pub fn resolve(&self, cols: usize) -> Result<Vec<usize>> {
        match self {
            Self::All => Ok((0..cols).collect()),
            Self::Single(c) => {
                if *c >= cols {
                    return Err(out_of_range(*c, cols));
                }
                Ok(vec![*c])
            }
            Self::List(ids) => {
                if let Some(&bad) = ids.iter().find(|&&c| c >= cols) {
                    return Err(out_of_range(bad, cols));
                }
                Ok(ids.clone())
            }
            Self::Slice { start, stop, step } => stepped(cols, *start, *stop, *step),
            Self::Mask(mask) => {
                if mask.len() != cols {
                    return Err(PanelError::TypeMismatch(format!(
                        "boolean mask of length {} against {cols} columns",
                        mask.len()
                    )));
                }
                Ok(mask
                    .iter()
                    .enumerate()
                    .filter_map(|(c, &keep)| keep.then_some(c))
                    .collect())
            }
        }
    }
}

fn out_of_range(idx: usize, len: usize) -> PanelError {
    PanelError::IndexOutOfRange(format!("column {idx} out of range for {len} columns"))
}

/// Indices selected by `[start:stop:step]` over an axis of length `len`.
///
/// A negative step selects the same ascending index set with stride
/// `|step|` and reverses it, so `[a:b:-1]` is the exact reversal of
/// `[a:b:1]`.
pub fn stepped(
    len: usize,
    start: Option<usize>,
    stop: Option<usize>,
    step: isize,
) -> Result<Vec<usize>> {
    if step == 0 {
        return Err(PanelError::TypeMismatch("slice step must be nonzero".into()));
    }
    let lo = start.unwrap_or(0).min(len);
    let hi = stop.unwrap_or(len).min(len);
    let mut out: Vec<usize> = if lo < hi {
        (lo..hi).step_by(step.unsigned_abs()).collect()
    } else {
        Vec::new()
    };
    if step < 0 {
        out.reverse();
    }
    Ok(out)
}

/// Where a global exclusive `stop` lands inside its own chunk:
/// `stop % chunk_size`, with a full chunk when the remainder is zero.
pub(crate) fn chunk_local_stop(stop: usize, chunk_size: usize) -> usize {
    if stop == 0 {
        0
    } else if stop % chunk_size == 0 {
        chunk_size
    } else {
        stop % chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepped_defaults_cover_the_axis() {
        assert_eq!(stepped(4, None, None, 1).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(stepped(0, None, None, 1).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn stepped_strides() {
        assert_eq!(stepped(7, Some(1), None, 2).unwrap(), vec![1, 3, 5]);
        assert_eq!(stepped(7, None, Some(4), 3).unwrap(), vec![0, 3]);
    }

    #[test]
    fn stepped_negative_reverses() {
        assert_eq!(stepped(5, None, None, -1).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(stepped(7, Some(1), Some(6), -2).unwrap(), vec![5, 3, 1]);
    }

    #[test]
    fn stepped_clips_to_len() {
        assert_eq!(stepped(3, Some(1), Some(100), 1).unwrap(), vec![1, 2]);
        assert_eq!(stepped(3, Some(100), None, 1).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn stepped_empty_window() {
        assert_eq!(stepped(5, Some(3), Some(3), 1).unwrap(), Vec::<usize>::new());
        assert_eq!(stepped(5, Some(4), Some(2), 1).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn zero_step_is_a_type_error() {
        assert!(matches!(
            stepped(5, None, None, 0),
            Err(PanelError::TypeMismatch(_))
        ));
    }

    #[test]
    fn columns_resolve() {
        assert_eq!(ColSelector::All.resolve(3).unwrap(), vec![0, 1, 2]);
        assert_eq!(ColSelector::Single(2).resolve(3).unwrap(), vec![2]);
        assert_eq!(
            ColSelector::List(vec![2, 0, 2]).resolve(3).unwrap(),
            vec![2, 0, 2]
        );
        assert_eq!(
            ColSelector::Mask(vec![true, false, true]).resolve(3).unwrap(),
            vec![0, 2]
        );
        assert_eq!(
            ColSelector::Slice {
                start: None,
                stop: None,
                step: 2
            }
            .resolve(4)
            .unwrap(),
            vec![0, 2]
        );
    }

    #[test]
    fn column_validation() {
        assert!(matches!(
            ColSelector::Single(3).resolve(3),
            Err(PanelError::IndexOutOfRange(_))
        ));
        assert!(matches!(
            ColSelector::List(vec![0, 9]).resolve(3),
            Err(PanelError::IndexOutOfRange(_))
        ));
        assert!(matches!(
            ColSelector::Mask(vec![true]).resolve(3),
            Err(PanelError::TypeMismatch(_))
        ));
    }

    #[test]
    fn local_stop_folds_chunk_multiples() {
        assert_eq!(chunk_local_stop(0, 4), 0);
        assert_eq!(chunk_local_stop(3, 4), 3);
        assert_eq!(chunk_local_stop(4, 4), 4);
        assert_eq!(chunk_local_stop(9, 4), 1);
    }
}
