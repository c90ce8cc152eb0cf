//! Matrix storage for the distributed pipeline
//!
//! Provides the row-major `f64` matrix used for full operands at the
//! coordinator and for per-worker row-bands, plus the deterministic
//! generators the validation scheme is derived from.
//!
//! # Example
//!
//! ```
//! use tormenta::Matrix;
//!
//! let m = Matrix::zeroed(2, 3).unwrap();
//! assert_eq!(m.rows(), 2);
//! assert_eq!(m.cols(), 3);
//! ```

use crate::{Result, TormentaError};

/// A 2D matrix of `f64` with row-major storage
///
/// Data is stored in row-major format (C-style), where consecutive elements
/// in memory belong to the same row. A worker's row-band is simply a matrix
/// with `rows = n / p` and `cols = n`.
///
/// # Storage Layout
///
/// For a 2x3 matrix:
/// ```text
/// [[a, b, c],
///  [d, e, f]]
/// ```
/// Data is stored as: [a, b, c, d, e, f]
///
/// # Example
///
/// ```
/// use tormenta::Matrix;
///
/// let m = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// assert_eq!(m.get(0, 0), Some(&1.0));
/// assert_eq!(m.get(1, 0), Some(&3.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Elements at or above this count are filled in parallel
#[cfg(feature = "parallel")]
const PARALLEL_FILL_THRESHOLD: usize = 1 << 16;

impl Matrix {
    /// Creates a zero-filled matrix, failing fast if allocation is refused
    ///
    /// Every accumulation buffer in the pipeline starts from this
    /// constructor, so the zero-initialization invariant of the blocked
    /// kernel holds by construction.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailed` if the backing buffer cannot be reserved.
    ///
    /// # Example
    ///
    /// ```
    /// use tormenta::Matrix;
    ///
    /// let m = Matrix::zeroed(3, 3).unwrap();
    /// assert_eq!(m.get(1, 1), Some(&0.0));
    /// ```
    pub fn zeroed(rows: usize, cols: usize) -> Result<Self> {
        let len = rows * cols;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| TormentaError::AllocationFailed {
                elements: len,
                bytes: len * std::mem::size_of::<f64>(),
            })?;
        data.resize(len, 0.0);
        Ok(Matrix { rows, cols, data })
    }

    /// Creates a matrix from a vector of data
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `data.len() != rows * cols`
    ///
    /// # Example
    ///
    /// ```
    /// use tormenta::Matrix;
    ///
    /// let m = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// assert_eq!(m.rows(), 2);
    /// ```
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(TormentaError::InvalidInput(format!(
                "data length {} does not match matrix dimensions {}x{} (expected {})",
                data.len(),
                rows,
                cols,
                rows * cols
            )));
        }
        Ok(Matrix { rows, cols, data })
    }

    /// `n×n` matrix whose every row is the ramp `1, 2, ..., n`
    ///
    /// Element `(i, j) = j + 1`. This is the construction of the left
    /// operands `A` and `D`; it makes the global minimum `1` and the global
    /// maximum `n` analytically known.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailed` if the backing buffer cannot be reserved.
    ///
    /// # Example
    ///
    /// ```
    /// use tormenta::Matrix;
    ///
    /// let a = Matrix::row_ramp(3).unwrap();
    /// assert_eq!(a.get(0, 2), Some(&3.0));
    /// assert_eq!(a.get(2, 0), Some(&1.0));
    /// ```
    pub fn row_ramp(n: usize) -> Result<Self> {
        let mut m = Matrix::zeroed(n, n)?;
        fill_rows(&mut m.data, n, |_, j| (j + 1) as f64);
        Ok(m)
    }

    /// `n×n` matrix whose ramp runs down each column
    ///
    /// Element `(i, j) = i + 1`, i.e. storage row `i` is the constant
    /// `i + 1`. This is the transposed layout of the right operands `B` and
    /// `C`; the multiplication kernel reads them row-by-row, which is why
    /// it accumulates `Σ_k left[i,k]·right[j,k]`.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailed` if the backing buffer cannot be reserved.
    ///
    /// # Example
    ///
    /// ```
    /// use tormenta::Matrix;
    ///
    /// let b = Matrix::column_ramp(3).unwrap();
    /// assert_eq!(b.get(0, 2), Some(&1.0));
    /// assert_eq!(b.get(2, 0), Some(&3.0));
    /// ```
    pub fn column_ramp(n: usize) -> Result<Self> {
        let mut m = Matrix::zeroed(n, n)?;
        fill_rows(&mut m.data, n, |i, _| (i + 1) as f64);
        Ok(m)
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the matrix holds no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at `(row, col)`, or `None` when out of bounds
    pub fn get(&self, row: usize, col: usize) -> Option<&f64> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// The backing row-major storage
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable view of the backing row-major storage
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consumes the matrix, returning its storage
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Tab-separated grid rendering, one line per row
    ///
    /// Values print without a fractional part; the pipeline only ever holds
    /// integer-valued doubles. Intended for eyeballing small runs.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in self.data.chunks(self.cols) {
            let mut first = true;
            for v in row {
                if !first {
                    out.push('\t');
                }
                out.push_str(&format!("{v:.0}"));
                first = false;
            }
            out.push('\n');
        }
        out
    }
}

/// Fills `data` (row-major, `cols` wide) with `f(row, col)`
fn fill_rows(data: &mut [f64], cols: usize, f: impl Fn(usize, usize) -> f64 + Sync) {
    #[cfg(feature = "parallel")]
    {
        if data.len() >= PARALLEL_FILL_THRESHOLD {
            use rayon::prelude::*;
            data.par_chunks_mut(cols).enumerate().for_each(|(i, row)| {
                for (j, v) in row.iter_mut().enumerate() {
                    *v = f(i, j);
                }
            });
            return;
        }
    }
    for (i, row) in data.chunks_mut(cols).enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = f(i, j);
        }
    }
}
