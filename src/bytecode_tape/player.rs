//! Tape traversal cursors.

use crate::float::Float;

use super::{OpRecord, Tape};

/// Backward cursor over a tape.
///
/// Holds the traversal position explicitly: the next record to yield and the
/// number of variables defined before it. Each step moves both back by the
/// record's argument count (from the offset table) and result count, so
/// variable-arity records are stepped like any other.
pub struct ReverseCursor<'a, F: Float> {
    tape: &'a Tape<F>,
    /// Records not yet yielded: `0..op_end`.
    op_end: usize,
    /// Variables defined by records `0..op_end`.
    var_end: usize,
}

impl<'a, F: Float> ReverseCursor<'a, F> {
    pub(super) fn new(tape: &'a Tape<F>) -> Self {
        ReverseCursor {
            tape,
            op_end: tape.ops.len(),
            var_end: tape.num_var,
        }
    }

    /// `(records remaining, variables remaining)`; `(0, 0)` once `Begin`
    /// has been yielded from a consistent tape.
    #[inline]
    pub fn position(&self) -> (usize, usize) {
        (self.op_end, self.var_end)
    }
}

impl<'a, F: Float> Iterator for ReverseCursor<'a, F> {
    type Item = OpRecord<'a>;

    #[inline]
    fn next(&mut self) -> Option<OpRecord<'a>> {
        if self.op_end == 0 {
            return None;
        }
        self.op_end -= 1;
        let op_index = self.op_end;
        let op = self.tape.ops[op_index];
        let nres = op.num_res();
        let var_index = self.var_end.saturating_sub(1);
        self.var_end = self.var_end.saturating_sub(nres);
        Some(OpRecord {
            op_index,
            var_index,
            op,
            args: self.tape.op_args(op_index),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.op_end, Some(self.op_end))
    }
}

impl<F: Float> ExactSizeIterator for ReverseCursor<'_, F> {}

/// Forward iterator over a tape's records.
pub struct Records<'a, F: Float> {
    tape: &'a Tape<F>,
    op_index: usize,
    /// Variables defined by records before `op_index`.
    var_start: usize,
}

impl<'a, F: Float> Records<'a, F> {
    pub(super) fn new(tape: &'a Tape<F>) -> Self {
        Records {
            tape,
            op_index: 0,
            var_start: 0,
        }
    }
}

impl<'a, F: Float> Iterator for Records<'a, F> {
    type Item = OpRecord<'a>;

    #[inline]
    fn next(&mut self) -> Option<OpRecord<'a>> {
        if self.op_index == self.tape.ops.len() {
            return None;
        }
        let op_index = self.op_index;
        let op = self.tape.ops[op_index];
        self.var_start += op.num_res();
        self.op_index += 1;
        Some(OpRecord {
            op_index,
            var_index: self.var_start.saturating_sub(1),
            op,
            args: self.tape.op_args(op_index),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.tape.ops.len() - self.op_index;
        (rest, Some(rest))
    }
}

impl<F: Float> ExactSizeIterator for Records<'_, F> {}
