//! Row-major coefficient matrices consumed and produced by the sweeps.
//!
//! Both matrices hold one row per tape variable. Entry `(var, k)` lives at
//! `data[var * cols + k]`, where `cols` is `J` for Taylor coefficients and
//! `K` for adjoints.

use crate::error::{Error, Result};
use crate::float::Float;
use crate::opcode::Addr;

/// Forward Taylor coefficients, `numvar × J`. Read-only during a sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct TaylorMatrix<F: Float> {
    data: Vec<F>,
    cols: usize,
}

impl<F: Float> TaylorMatrix<F> {
    /// Zero-filled matrix with `rows` variables and `cols` orders per row.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        TaylorMatrix {
            data: vec![F::zero(); rows * cols],
            cols,
        }
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(data: Vec<F>, cols: usize) -> Result<Self> {
        check_shape("Taylor matrix", data.len(), cols)?;
        Ok(TaylorMatrix { data, cols })
    }

    /// Number of coefficient columns (`J`).
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of variable rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.data.len().checked_div(self.cols).unwrap_or(0)
    }

    /// Coefficients of variable `var`.
    #[inline]
    pub fn row(&self, var: usize) -> &[F] {
        let start = var * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Mutable coefficients of variable `var` (used by whoever fills the matrix).
    #[inline]
    pub fn row_mut(&mut self, var: usize) -> &mut [F] {
        let start = var * self.cols;
        &mut self.data[start..start + self.cols]
    }

    #[inline]
    pub fn as_slice(&self) -> &[F] {
        &self.data
    }
}

/// Adjoints of Taylor coefficients, `numvar × K`.
///
/// Before a sweep, dependent rows hold their seeds and every other row must
/// be zero; [`zeros`](Self::zeros) followed by [`seed`](Self::seed) or
/// [`seed_dependents`](Self::seed_dependents) produces exactly that.
#[derive(Clone, Debug, PartialEq)]
pub struct AdjointMatrix<F: Float> {
    data: Vec<F>,
    cols: usize,
}

impl<F: Float> AdjointMatrix<F> {
    /// Zero-filled matrix with `rows` variables and `cols` orders per row.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        AdjointMatrix {
            data: vec![F::zero(); rows * cols],
            cols,
        }
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(data: Vec<F>, cols: usize) -> Result<Self> {
        check_shape("adjoint matrix", data.len(), cols)?;
        Ok(AdjointMatrix { data, cols })
    }

    /// Number of coefficient columns (`K`).
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of variable rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.data.len().checked_div(self.cols).unwrap_or(0)
    }

    /// Set every entry to zero, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|p| *p = F::zero());
    }

    /// Set the order-`order` seed of variable `var` to `weight`.
    #[inline]
    pub fn seed(&mut self, var: usize, order: usize, weight: F) {
        self.data[var * self.cols + order] = weight;
    }

    /// Seed each dependent variable at `order` with its weight.
    ///
    /// Weights for repeated dependents accumulate.
    pub fn seed_dependents(&mut self, dependents: &[Addr], order: usize, weights: &[F]) -> Result<()> {
        if weights.len() != dependents.len() {
            return Err(Error::SizeMismatch {
                what: "seed weights",
                expected: dependents.len(),
                found: weights.len(),
            });
        }
        for (&dep, &w) in dependents.iter().zip(weights) {
            let at = dep as usize * self.cols + order;
            self.data[at] = self.data[at] + w;
        }
        Ok(())
    }

    /// Adjoints of variable `var`.
    #[inline]
    pub fn row(&self, var: usize) -> &[F] {
        let start = var * self.cols;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, var: usize) -> &mut [F] {
        let start = var * self.cols;
        &mut self.data[start..start + self.cols]
    }

    /// Split into the rows strictly below `first` (operands) and the rows from
    /// `first` upward (a record's results).
    #[inline]
    pub(crate) fn split_at_row(&mut self, first: usize) -> (Operands<'_, F>, &mut [F]) {
        let cols = self.cols;
        let (lo, hi) = self.data.split_at_mut(first * cols);
        (Operands { data: lo, cols }, hi)
    }

    #[inline]
    pub fn as_slice(&self) -> &[F] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<F> {
        self.data
    }
}

/// Adjoint rows below a record's first result.
///
/// Operand rows are only ever accumulated into, never read, so two operand
/// slots naming the same variable (`x * x`) need no special handling.
pub(crate) struct Operands<'a, F> {
    data: &'a mut [F],
    cols: usize,
}

impl<F: Float> Operands<'_, F> {
    #[inline]
    pub(crate) fn add(&mut self, var: usize, k: usize, v: F) {
        let at = var * self.cols + k;
        self.data[at] = self.data[at] + v;
    }

    #[inline]
    pub(crate) fn row_mut(&mut self, var: usize) -> &mut [F] {
        let start = var * self.cols;
        &mut self.data[start..start + self.cols]
    }
}

fn check_shape(what: &'static str, len: usize, cols: usize) -> Result<()> {
    if cols == 0 || len % cols != 0 {
        return Err(Error::SizeMismatch {
            what,
            expected: len.next_multiple_of(cols.max(1)),
            found: len,
        });
    }
    Ok(())
}
