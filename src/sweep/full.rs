use std::borrow::Cow;

use crate::atomic::AtomicFrame;
use crate::bytecode_tape::Tape;
use crate::error::{Error, Result};
use crate::float::Float;
use crate::marked::atomic_spans;
use crate::matrix::{AdjointMatrix, TaylorMatrix};
use crate::opcode::OpCode;

use super::ReverseSweep;

impl<F: Float> ReverseSweep<'_, F> {
    /// Full reverse sweep of order `order`.
    ///
    /// `partial` must hold the seeds in the dependent rows and zero elsewhere.
    /// On success rows `1..=n` hold the partials of the seeded reduction with
    /// respect to the independent variables' Taylor coefficients `0..=order`;
    /// every other row is scratch.
    pub fn run(&self, order: usize, taylor: &TaylorMatrix<F>, partial: &mut AdjointMatrix<F>) -> Result<()> {
        let tape = self.tape;
        let span = tracing::debug_span!("reverse_sweep", mode = "full", order, records = tape.num_ops());
        let _guard = span.enter();

        self.check_inputs(order, taylor, partial, tape.dependents())?;
        let skip = match self.skip {
            Some(skip) if skip.len() != tape.num_ops() => {
                return Err(Error::SizeMismatch {
                    what: "skip mask",
                    expected: tape.num_ops(),
                    found: skip.len(),
                });
            }
            Some(skip) => whole_brackets(tape, skip),
            None => Cow::Borrowed(&[][..]),
        };
        let skipped = |op_index: usize| skip.get(op_index).copied().unwrap_or(false);
        self.check_atomics(tape.records().filter(|rec| !skipped(rec.op_index)))?;

        let mut frame = AtomicFrame::new();
        let mut cursor = tape.reverse_cursor();
        let (mut evaluated, mut stepped_over) = (0usize, 0usize);
        for rec in cursor.by_ref() {
            if rec.op == OpCode::Begin {
                break;
            }
            if skipped(rec.op_index) {
                stepped_over += 1;
                continue;
            }
            self.apply(&rec, order, taylor, partial, &mut frame)?;
            evaluated += 1;
        }
        // Begin exists only at record 0, variable 0.
        debug_assert_eq!(cursor.position(), (0, 0));
        frame.ensure_closed()?;

        tracing::debug!(evaluated, skipped = stepped_over, "reverse sweep complete");
        Ok(())
    }

    /// Vector-Jacobian product of order `order`.
    ///
    /// Seeds dependent `i` with `weights[i]` at `order`, runs [`run`](Self::run)
    /// on a fresh adjoint matrix and returns one row per independent variable,
    /// each holding orders `0..=order`.
    pub fn vjp(&self, order: usize, taylor: &TaylorMatrix<F>, weights: &[F]) -> Result<Vec<Vec<F>>> {
        let tape = self.tape;
        let mut partial = AdjointMatrix::zeros(tape.num_var(), order + 1);
        partial.seed_dependents(tape.dependents(), order, weights)?;
        self.run(order, taylor, &mut partial)?;
        Ok((1..=tape.num_independent())
            .map(|j| partial.row(j).to_vec())
            .collect())
    }
}

/// The skip mask with every partially masked atomic bracket unmasked.
///
/// A bracket is stepped over only when all of its records are masked.
fn whole_brackets<'s, F: Float>(tape: &Tape<F>, skip: &'s [bool]) -> Cow<'s, [bool]> {
    let mut mask = Cow::Borrowed(skip);
    for (open, close) in atomic_spans(tape) {
        let span = &skip[open..=close];
        if span.iter().any(|&s| s) && !span.iter().all(|&s| s) {
            mask.to_mut()[open..=close].fill(false);
        }
    }
    mask
}
