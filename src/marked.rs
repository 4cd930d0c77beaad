//! Marked-operator lists for selective reverse sweeps.
//!
//! A list names, in reverse tape order, only the records that can influence
//! one dependent variable. Deciding which records those are is the job of a
//! dependency-marking pass; this module validates its output against the
//! tape and turns it back into [`OpRecord`]s for the shared dispatcher.

use crate::bytecode_tape::{OpRecord, Tape};
use crate::error::{Error, Result};
use crate::float::Float;
use crate::opcode::{Addr, OpCode};

/// One record on a selective traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkedOperator {
    pub op_index: usize,
    pub var_index: usize,
    pub op: OpCode,
}

/// Validated marked-operator list for one dependent variable.
///
/// Entries are strictly descending in record index, agree with the tape on
/// opcode and variable index, and end with `Begin` at `(0, 0)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkedOperators {
    dependent: Addr,
    entries: Vec<MarkedOperator>,
}

impl MarkedOperators {
    /// Validate an explicit list against `tape`.
    pub fn new<F: Float>(tape: &Tape<F>, dependent: Addr, entries: Vec<MarkedOperator>) -> Result<Self> {
        validate(tape, dependent, &entries)?;
        Ok(MarkedOperators { dependent, entries })
    }

    /// Build a list from an unordered set of record indices.
    ///
    /// Indices are sorted descending and deduplicated, record 0 is added, and
    /// any record inside an atomic bracket pulls in the whole bracket.
    pub fn from_records<F: Float>(
        tape: &Tape<F>,
        dependent: Addr,
        records: impl IntoIterator<Item = usize>,
    ) -> Result<Self> {
        let var_of = variable_indices(tape);
        let spans = atomic_spans(tape);

        let mut indices: Vec<usize> = Vec::new();
        for i in records {
            if i >= tape.num_ops() {
                return Err(Error::InvalidMarkedList(format!(
                    "record {i} is past the end of the tape"
                )));
            }
            match enclosing_span(&spans, i).filter(|_| tape.op(i).is_atomic()) {
                Some((start, end)) => indices.extend(start..=end),
                None => indices.push(i),
            }
        }
        indices.push(0);
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();

        let entries = indices
            .into_iter()
            .map(|i| MarkedOperator {
                op_index: i,
                var_index: var_of[i],
                op: tape.op(i),
            })
            .collect();
        Self::new(tape, dependent, entries)
    }

    /// The dependent variable this list was marked for.
    #[inline]
    pub fn dependent(&self) -> Addr {
        self.dependent
    }

    #[inline]
    pub fn entries(&self) -> &[MarkedOperator] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the list against `tape`, which need not be the tape it was built from.
    ///
    /// Same checks as [`new`](Self::new); one forward pass over the tape's opcodes.
    pub(crate) fn check_tape<F: Float>(&self, tape: &Tape<F>) -> Result<()> {
        validate(tape, self.dependent, &self.entries)
    }

    /// Resolve entries into records, in traversal order.
    ///
    /// Only valid for a tape that passed [`check_tape`](Self::check_tape).
    pub(crate) fn records<'t, F: Float>(&'t self, tape: &'t Tape<F>) -> impl Iterator<Item = OpRecord<'t>> + 't {
        self.entries.iter().map(move |e| OpRecord {
            op_index: e.op_index,
            var_index: e.var_index,
            op: e.op,
            args: tape.op_args(e.op_index),
        })
    }
}

fn validate<F: Float>(tape: &Tape<F>, dependent: Addr, entries: &[MarkedOperator]) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidMarkedList(msg));

    if dependent == 0 || dependent as usize >= tape.num_var() {
        return invalid(format!("dependent {dependent} is not a variable of the tape"));
    }
    for pair in entries.windows(2) {
        if pair[0].op_index <= pair[1].op_index {
            return invalid(format!(
                "record {} follows record {}; entries must be strictly descending",
                pair[1].op_index, pair[0].op_index
            ));
        }
    }
    let var_of = variable_indices(tape);
    for e in entries {
        if e.op_index >= tape.num_ops() {
            return invalid(format!("record {} is past the end of the tape", e.op_index));
        }
        let op = tape.op(e.op_index);
        if op != e.op {
            return invalid(format!(
                "record {} is {op:?} on the tape, listed as {:?}",
                e.op_index, e.op
            ));
        }
        if var_of[e.op_index] != e.var_index {
            return invalid(format!(
                "record {} has variable index {}, listed as {}",
                e.op_index, var_of[e.op_index], e.var_index
            ));
        }
    }
    match entries.last() {
        Some(last) if last.op == OpCode::Begin && last.op_index == 0 && last.var_index == 0 => Ok(()),
        _ => invalid("list does not end with Begin at record 0".into()),
    }
}

fn variable_indices<F: Float>(tape: &Tape<F>) -> Vec<usize> {
    tape.records().map(|r| r.var_index).collect()
}

/// `(opening, closing)` record indices of every complete atomic bracket.
pub(crate) fn atomic_spans<F: Float>(tape: &Tape<F>) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open = None;
    for i in 0..tape.num_ops() {
        if tape.op(i) == OpCode::Atomic {
            match open.take() {
                None => open = Some(i),
                Some(start) => spans.push((start, i)),
            }
        }
    }
    spans
}

fn enclosing_span(spans: &[(usize, usize)], i: usize) -> Option<(usize, usize)> {
    let pos = spans.partition_point(|&(start, _)| start <= i);
    let span = *spans.get(pos.checked_sub(1)?)?;
    (i <= span.1).then_some(span)
}
