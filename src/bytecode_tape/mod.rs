//! Recorded operation tapes.
//!
//! A [`Tape`] is the immutable output of a forward recording: a sequence of
//! operator records, each with an opcode, a slice of argument slots and an
//! implicit run of result variables. The reverse sweeps only read it.
//!
//! Arguments are stored in one flat vector delimited by a per-record offset
//! table, so variable-arity records ([`OpCode::CSum`], [`OpCode::CSkip`])
//! carry their own length and the backward cursor needs no special case.
//!
//! # Layout
//!
//! Record 0 is [`OpCode::Begin`] (defining the phantom variable 0), records
//! `1..=n` are [`OpCode::Inv`] (independent variables `1..=n`), and the last
//! record is [`OpCode::End`]. A record with `r` results owns variables
//! `first..first + r`; its *variable index* is the primary result
//! `first + r - 1`, with auxiliary results below it.

use crate::error::{Error, Result};
use crate::float::Float;
use crate::opcode::{self, Addr, CompareOp, OpCode};

mod builder;
mod player;
#[cfg(feature = "serde")]
mod serde_support;

pub use self::builder::{AtomicOperand, AtomicResult, TapeBuilder};
pub use self::player::{Records, ReverseCursor};

/// One operator record as seen by a traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpRecord<'a> {
    /// Position of the record in the tape.
    pub op_index: usize,
    /// Primary result variable (or the last variable defined before a
    /// record without results).
    pub var_index: usize,
    pub op: OpCode,
    pub args: &'a [Addr],
}

/// An immutable, validated recording.
#[derive(Clone, Debug, PartialEq)]
pub struct Tape<F: Float> {
    pub(crate) ops: Vec<OpCode>,
    /// `args[arg_start[i]..arg_start[i + 1]]` are the slots of record `i`.
    pub(crate) arg_start: Vec<u32>,
    pub(crate) args: Vec<Addr>,
    pub(crate) parameters: Vec<F>,
    pub(crate) num_var: usize,
    pub(crate) num_independent: usize,
    pub(crate) num_load: usize,
    pub(crate) dependents: Vec<Addr>,
    /// Distinct atomic callback ids referenced by the tape, ascending.
    pub(crate) atomic_ids: Vec<Addr>,
}

impl<F: Float> Tape<F> {
    /// Start recording a new tape.
    pub fn builder() -> TapeBuilder<F> {
        TapeBuilder::new()
    }

    /// Assemble and validate a tape from its raw parts.
    ///
    /// `arg_start` must have one more entry than `ops`; record `i` owns
    /// `args[arg_start[i]..arg_start[i + 1]]`.
    pub fn from_parts(
        ops: Vec<OpCode>,
        arg_start: Vec<u32>,
        args: Vec<Addr>,
        parameters: Vec<F>,
        num_load: usize,
        dependents: Vec<Addr>,
    ) -> Result<Self> {
        let malformed = |msg: String| Err(Error::MalformedTape(msg));

        if ops.is_empty() {
            return malformed("tape has no records".into());
        }
        if arg_start.len() != ops.len() + 1 {
            return Err(Error::SizeMismatch {
                what: "argument offset table",
                expected: ops.len() + 1,
                found: arg_start.len(),
            });
        }
        if arg_start[0] != 0 || *arg_start.last().unwrap_or(&0) as usize != args.len() {
            return malformed("argument offsets do not cover the argument vector".into());
        }
        if arg_start.windows(2).any(|w| w[0] > w[1]) {
            return malformed("argument offsets are not monotone".into());
        }
        if ops[0] != OpCode::Begin {
            return malformed(format!("record 0 is {:?}, expected Begin", ops[0]));
        }
        if ops[ops.len() - 1] != OpCode::End {
            return malformed("last record is not End".into());
        }

        let num_independent = ops[1..].iter().take_while(|&&op| op == OpCode::Inv).count();

        let mut num_var = 0usize;
        let mut atomic_ids = Vec::new();
        for (i, &op) in ops.iter().enumerate() {
            let rec = &args[arg_start[i] as usize..arg_start[i + 1] as usize];

            match op {
                OpCode::Begin if i != 0 => {
                    return malformed(format!("Begin at record {i}"));
                }
                OpCode::Inv if i > num_independent => {
                    return malformed(format!("independent variable at record {i} follows other records"));
                }
                OpCode::End if i != ops.len() - 1 => {
                    return malformed(format!("End at record {i}"));
                }
                _ => {}
            }

            check_arity(i, op, rec)?;

            let mut bad_var = None;
            opcode::for_each_variable_arg(op, rec, |v| {
                if v == 0 || v as usize >= num_var {
                    bad_var.get_or_insert(Error::UndefinedVariable {
                        op_index: i,
                        op,
                        var: v as usize,
                        defined: num_var,
                    });
                }
            });
            if let Some(e) = bad_var.take() {
                return Err(e);
            }

            let mut bad_par = None;
            opcode::for_each_parameter_arg(op, rec, |p| {
                if p as usize >= parameters.len() {
                    bad_par.get_or_insert(p);
                }
            });
            if let Some(p) = bad_par {
                return malformed(format!(
                    "record {i} ({op:?}) references parameter {p}, only {} exist",
                    parameters.len()
                ));
            }

            match op {
                OpCode::Ldp | OpCode::Ldv if rec[2] as usize >= num_load => {
                    return Err(Error::LoadSlot {
                        op_index: i,
                        slot: rec[2] as usize,
                        len: num_load,
                    });
                }
                OpCode::CExp | OpCode::Com | OpCode::CSkip if CompareOp::from_addr(rec[0]).is_none() => {
                    return Err(Error::InvalidCompare {
                        op_index: i,
                        code: rec[0],
                    });
                }
                OpCode::Atomic => {
                    if let Err(pos) = atomic_ids.binary_search(&rec[0]) {
                        atomic_ids.insert(pos, rec[0]);
                    }
                }
                _ => {}
            }

            num_var += op.num_res();
        }

        for &dep in &dependents {
            if dep == 0 || dep as usize >= num_var {
                return malformed(format!("dependent variable {dep} is not on the tape"));
            }
        }

        Ok(Tape {
            ops,
            arg_start,
            args,
            parameters,
            num_var,
            num_independent,
            num_load,
            dependents,
            atomic_ids,
        })
    }

    /// Number of operator records.
    #[inline]
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// Number of variables, including the phantom variable 0.
    #[inline]
    pub fn num_var(&self) -> usize {
        self.num_var
    }

    /// Number of independent variables (`n`).
    #[inline]
    pub fn num_independent(&self) -> usize {
        self.num_independent
    }

    /// Number of parameters.
    #[inline]
    pub fn num_par(&self) -> usize {
        self.parameters.len()
    }

    /// Number of indirect load instructions (length of the load map).
    #[inline]
    pub fn num_load(&self) -> usize {
        self.num_load
    }

    #[inline]
    pub fn parameters(&self) -> &[F] {
        &self.parameters
    }

    /// Dependent (output) variable indices, in output order.
    #[inline]
    pub fn dependents(&self) -> &[Addr] {
        &self.dependents
    }

    /// Atomic callback ids referenced anywhere on the tape.
    #[inline]
    pub fn atomic_ids(&self) -> &[Addr] {
        &self.atomic_ids
    }

    #[inline]
    pub fn op(&self, op_index: usize) -> OpCode {
        self.ops[op_index]
    }

    /// Argument slots of record `op_index`.
    #[inline]
    pub fn op_args(&self, op_index: usize) -> &[Addr] {
        &self.args[self.arg_start[op_index] as usize..self.arg_start[op_index + 1] as usize]
    }

    /// Backward traversal from the last record to `Begin`.
    pub fn reverse_cursor(&self) -> ReverseCursor<'_, F> {
        ReverseCursor::new(self)
    }

    /// Forward traversal from `Begin` to `End`.
    pub fn records(&self) -> Records<'_, F> {
        Records::new(self)
    }
}

fn check_arity(op_index: usize, op: OpCode, rec: &[Addr]) -> Result<()> {
    let expected = match op.num_args() {
        Some(n) => n,
        None => {
            let header = if op == OpCode::CSum { 3 } else { 6 };
            if rec.len() < header {
                header
            } else {
                let (a, b) = if op == OpCode::CSum {
                    (rec[0], rec[1])
                } else {
                    (rec[4], rec[5])
                };
                header + a as usize + b as usize
            }
        }
    };
    if rec.len() != expected {
        return Err(Error::MalformedTape(format!(
            "record {op_index} ({op:?}) has {} arguments, expected {expected}",
            rec.len()
        )));
    }
    Ok(())
}
