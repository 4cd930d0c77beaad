use crate::atomic::AtomicFrame;
use crate::error::Result;
use crate::float::Float;
use crate::marked::MarkedOperators;
use crate::matrix::{AdjointMatrix, TaylorMatrix};

use super::ReverseSweep;

impl<F: Float> ReverseSweep<'_, F> {
    /// Reverse sweep restricted to the records in `marked`.
    ///
    /// `partial` must be seeded in `marked.dependent()` only. The result
    /// equals what [`run`](Self::run) produces for the same seed. The skip
    /// mask is not consulted; the load-indirection map is. `marked` is checked
    /// against this sweep's tape first, so a list built for another tape is
    /// rejected with [`Error::InvalidMarkedList`](crate::Error::InvalidMarkedList).
    pub fn run_selective(
        &self,
        marked: &MarkedOperators,
        order: usize,
        taylor: &TaylorMatrix<F>,
        partial: &mut AdjointMatrix<F>,
    ) -> Result<()> {
        let tape = self.tape;
        let span = tracing::debug_span!("reverse_sweep", mode = "selective", order, records = marked.len());
        let _guard = span.enter();

        marked.check_tape(tape)?;
        self.check_inputs(order, taylor, partial, &[marked.dependent()])?;
        self.check_atomics(marked.records(tape))?;

        let mut frame = AtomicFrame::new();
        for rec in marked.records(tape) {
            self.apply(&rec, order, taylor, partial, &mut frame)?;
        }
        frame.ensure_closed()?;

        tracing::debug!(evaluated = marked.len(), "selective reverse sweep complete");
        Ok(())
    }
}
