use rayon::prelude::*;

use crate::error::Result;
use crate::float::Float;
use crate::matrix::TaylorMatrix;

use super::ReverseSweep;

impl<F: Float> ReverseSweep<'_, F> {
    /// Parallel [`vjp`](Self::vjp): one sweep per weight vector.
    ///
    /// Every task owns its adjoint matrix and atomic scratch; the tape,
    /// Taylor matrix and registry are shared.
    pub fn vjp_par(
        &self,
        order: usize,
        taylor: &TaylorMatrix<F>,
        weight_sets: &[Vec<F>],
    ) -> Result<Vec<Vec<Vec<F>>>> {
        weight_sets
            .par_iter()
            .map(|weights| self.vjp(order, taylor, weights))
            .collect()
    }
}
