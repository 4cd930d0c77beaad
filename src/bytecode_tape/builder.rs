//! Structural tape recorder.
//!
//! The builder records *what* was computed, never the values: filling the
//! Taylor coefficient matrix is the forward pass's job. All structural
//! checks run once in [`TapeBuilder::finish`] through [`Tape::from_parts`].

use crate::error::Result;
use crate::float::Float;
use crate::opcode::{Addr, CompareOp, OpCode};

use super::Tape;

/// Argument of an atomic call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomicOperand {
    Parameter(Addr),
    Variable(Addr),
}

/// Result slot of an atomic call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomicResult {
    /// The result is a fresh variable.
    Variable,
    /// The result did not depend on any variable and was recorded as a parameter.
    Parameter(Addr),
}

/// Incremental tape recorder.
///
/// ```
/// use tapesweep::{OpCode, Tape};
///
/// let mut b = Tape::<f64>::builder();
/// let x = b.independent();
/// let y = b.independent();
/// let z = b.push(OpCode::MulVV, &[x, y]);
/// let tape = b.finish(&[z]).unwrap();
/// assert_eq!(tape.num_var(), 4);
/// ```
pub struct TapeBuilder<F: Float> {
    ops: Vec<OpCode>,
    arg_start: Vec<u32>,
    args: Vec<Addr>,
    parameters: Vec<F>,
    num_var: usize,
    num_load: usize,
}

impl<F: Float> TapeBuilder<F> {
    /// New recording containing only the `Begin` record.
    pub fn new() -> Self {
        let mut b = TapeBuilder {
            ops: Vec::new(),
            arg_start: vec![0],
            args: Vec::new(),
            parameters: Vec::new(),
            num_var: 0,
            num_load: 0,
        };
        b.push(OpCode::Begin, &[0]);
        b
    }

    /// Declare the next independent variable. Returns its variable index.
    ///
    /// Independent variables must be declared before any other record;
    /// [`finish`](Self::finish) rejects the tape otherwise.
    #[inline]
    pub fn independent(&mut self) -> Addr {
        self.push(OpCode::Inv, &[])
    }

    /// Append a constant to the parameter vector. Returns its parameter index.
    #[inline]
    pub fn parameter(&mut self, value: F) -> Addr {
        let idx = self.parameters.len() as Addr;
        self.parameters.push(value);
        idx
    }

    /// Record an operation with explicit argument slots.
    ///
    /// Returns the record's variable index: its primary result, or the last
    /// variable defined so far for records without results.
    #[inline]
    pub fn push(&mut self, op: OpCode, args: &[Addr]) -> Addr {
        self.ops.push(op);
        self.args.extend_from_slice(args);
        self.arg_start.push(self.args.len() as u32);
        self.num_var += op.num_res();
        self.num_var.saturating_sub(1) as Addr
    }

    /// Record `constant + Σ add - Σ sub`; `constant` is a parameter index.
    pub fn csum(&mut self, constant: Addr, add: &[Addr], sub: &[Addr]) -> Addr {
        let mut args = Vec::with_capacity(3 + add.len() + sub.len());
        args.extend_from_slice(&[add.len() as Addr, sub.len() as Addr, constant]);
        args.extend_from_slice(add);
        args.extend_from_slice(sub);
        self.push(OpCode::CSum, &args)
    }

    /// Record a conditional skip over the given record indices.
    pub fn cskip(
        &mut self,
        cmp: CompareOp,
        flags: Addr,
        left: Addr,
        right: Addr,
        skip_if_true: &[Addr],
        skip_if_false: &[Addr],
    ) {
        let mut args = Vec::with_capacity(6 + skip_if_true.len() + skip_if_false.len());
        args.extend_from_slice(&[
            cmp.to_addr(),
            flags,
            left,
            right,
            skip_if_true.len() as Addr,
            skip_if_false.len() as Addr,
        ]);
        args.extend_from_slice(skip_if_true);
        args.extend_from_slice(skip_if_false);
        self.push(OpCode::CSkip, &args);
    }

    /// Record `if left <cmp> right { if_true } else { if_false }`.
    ///
    /// `flags` marks which of the four operands are variables
    /// (see [`crate::opcode::FLAG_LEFT_VAR`] and friends).
    pub fn cond_exp(
        &mut self,
        cmp: CompareOp,
        flags: Addr,
        left: Addr,
        right: Addr,
        if_true: Addr,
        if_false: Addr,
    ) -> Addr {
        self.push(
            OpCode::CExp,
            &[cmp.to_addr(), flags, left, right, if_true, if_false],
        )
    }

    /// Record an indirect load (`Ldp` or `Ldv`), allocating the next load slot.
    ///
    /// Returns `(result variable, load slot)`.
    pub fn load(&mut self, op: OpCode, vector_offset: Addr, index: Addr) -> (Addr, usize) {
        assert!(
            matches!(op, OpCode::Ldp | OpCode::Ldv),
            "load() records Ldp or Ldv, got {op:?}"
        );
        let slot = self.num_load;
        self.num_load += 1;
        let var = self.push(op, &[vector_offset, index, slot as Addr]);
        (var, slot)
    }

    /// Record a complete atomic call bracket.
    ///
    /// Returns one entry per result slot: the new variable index for
    /// variable results, `None` for parameter results.
    pub fn atomic_call(
        &mut self,
        callback: Addr,
        instance: Addr,
        args: &[AtomicOperand],
        results: &[AtomicResult],
    ) -> Vec<Option<Addr>> {
        let bracket = [callback, instance, args.len() as Addr, results.len() as Addr];
        self.push(OpCode::Atomic, &bracket);
        for arg in args {
            match *arg {
                AtomicOperand::Parameter(p) => self.push(OpCode::AtomicArgPar, &[p]),
                AtomicOperand::Variable(v) => self.push(OpCode::AtomicArgVar, &[v]),
            };
        }
        let out = results
            .iter()
            .map(|res| match *res {
                AtomicResult::Parameter(p) => {
                    self.push(OpCode::AtomicResPar, &[p]);
                    None
                }
                AtomicResult::Variable => Some(self.push(OpCode::AtomicResVar, &[])),
            })
            .collect();
        self.push(OpCode::Atomic, &bracket);
        out
    }

    /// Number of variables recorded so far.
    #[inline]
    pub fn num_var(&self) -> usize {
        self.num_var
    }

    /// Number of records so far.
    #[inline]
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// Append `End`, mark the dependents and validate the recording.
    pub fn finish(mut self, dependents: &[Addr]) -> Result<Tape<F>> {
        self.push(OpCode::End, &[]);
        Tape::from_parts(
            self.ops,
            self.arg_start,
            self.args,
            self.parameters,
            self.num_load,
            dependents.to_vec(),
        )
    }
}

impl<F: Float> Default for TapeBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}
