//! Reverse sweeps over a recorded tape.
//!
//! [`ReverseSweep`] borrows everything a sweep reads (tape, atomic registry,
//! skip mask, load-indirection map) and runs either over the whole tape
//! ([`run`](ReverseSweep::run)) or over a marked-operator list
//! ([`run_selective`](ReverseSweep::run_selective)). Both feed the same
//! per-record dispatcher, so they apply identical rules.

use crate::atomic::{AtomicFrame, AtomicRegistry, AtomicState};
use crate::bytecode_tape::{OpRecord, Tape};
use crate::error::{Error, Result};
use crate::float::Float;
use crate::matrix::{AdjointMatrix, TaylorMatrix};
use crate::opcode::{Addr, CompareOp, OpCode};
use crate::reverse_ops::*;

mod full;
#[cfg(feature = "parallel")]
mod parallel;
mod selective;

/// Per-sweep options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SweepConfig {
    /// Emit a `trace` event for every record the sweep evaluates.
    pub trace: bool,
    /// Reject dependent seed rows with nonzero coefficients below the sweep order.
    pub check_seeds: bool,
}

/// Reverse sweep over one tape.
///
/// ```
/// use tapesweep::{AdjointMatrix, OpCode, ReverseSweep, Tape, TaylorMatrix};
///
/// // z = x * y at x = 3, y = 4
/// let mut b = Tape::<f64>::builder();
/// let x = b.independent();
/// let y = b.independent();
/// let z = b.push(OpCode::MulVV, &[x, y]);
/// let tape = b.finish(&[z]).unwrap();
///
/// let mut taylor = TaylorMatrix::zeros(tape.num_var(), 1);
/// taylor.row_mut(1)[0] = 3.0;
/// taylor.row_mut(2)[0] = 4.0;
/// taylor.row_mut(3)[0] = 12.0;
///
/// let mut partial = AdjointMatrix::zeros(tape.num_var(), 1);
/// partial.seed(z as usize, 0, 1.0);
/// ReverseSweep::new(&tape).run(0, &taylor, &mut partial).unwrap();
/// assert_eq!(partial.row(1)[0], 4.0);
/// assert_eq!(partial.row(2)[0], 3.0);
/// ```
#[derive(Clone, Copy)]
pub struct ReverseSweep<'a, F: Float> {
    tape: &'a Tape<F>,
    registry: Option<&'a AtomicRegistry<F>>,
    skip: Option<&'a [bool]>,
    load_map: &'a [Addr],
    config: SweepConfig,
}

impl<'a, F: Float> ReverseSweep<'a, F> {
    pub fn new(tape: &'a Tape<F>) -> Self {
        ReverseSweep {
            tape,
            registry: None,
            skip: None,
            load_map: &[],
            config: SweepConfig::default(),
        }
    }

    /// Callbacks for the tape's atomic calls.
    pub fn with_registry(mut self, registry: &'a AtomicRegistry<F>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Dead-code skip mask, one flag per record; `true` records are stepped over.
    pub fn with_skip_mask(mut self, skip: &'a [bool]) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Variable read by each indirect load during the forward pass (0 for a parameter).
    pub fn with_load_map(mut self, load_map: &'a [Addr]) -> Self {
        self.load_map = load_map;
        self
    }

    pub fn with_config(mut self, config: SweepConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn tape(&self) -> &'a Tape<F> {
        self.tape
    }

    #[inline]
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Shape checks shared by both sweep modes.
    fn check_inputs(
        &self,
        order: usize,
        taylor: &TaylorMatrix<F>,
        partial: &AdjointMatrix<F>,
        seeded: &[Addr],
    ) -> Result<()> {
        let tape = self.tape;
        let num_var = tape.num_var();
        if taylor.rows() != num_var {
            return Err(Error::SizeMismatch {
                what: "Taylor matrix rows",
                expected: num_var,
                found: taylor.rows(),
            });
        }
        if taylor.cols() <= order {
            return Err(Error::OrderTooHigh {
                what: "Taylor matrix",
                order,
                needed: order + 1,
                found: taylor.cols(),
            });
        }
        if partial.rows() != num_var {
            return Err(Error::SizeMismatch {
                what: "adjoint matrix rows",
                expected: num_var,
                found: partial.rows(),
            });
        }
        if partial.cols() <= order {
            return Err(Error::OrderTooHigh {
                what: "adjoint matrix",
                order,
                needed: order + 1,
                found: partial.cols(),
            });
        }
        if self.load_map.len() != tape.num_load() {
            return Err(Error::SizeMismatch {
                what: "load-indirection map",
                expected: tape.num_load(),
                found: self.load_map.len(),
            });
        }
        if self.config.check_seeds {
            for &var in seeded {
                let row = partial.row(var as usize);
                if let Some(k) = row[..order].iter().position(|&p| p != F::zero()) {
                    return Err(Error::InvalidSeed {
                        var: var as usize,
                        order: k,
                        top: order,
                    });
                }
            }
        }
        Ok(())
    }

    /// Fail before traversal if a visited atomic call has no live callback.
    fn check_atomics<'r>(&self, records: impl Iterator<Item = OpRecord<'r>>) -> Result<()> {
        let mut ids = records
            .filter(|rec| rec.op == OpCode::Atomic)
            .map(|rec| rec.args[0]);
        let checked = match self.registry {
            Some(registry) => registry.check(ids),
            None => match ids.next() {
                Some(id) => Err(AtomicRegistry::<F>::new().missing(id)),
                None => Ok(()),
            },
        };
        checked.map_err(|e| {
            tracing::warn!(error = %e, "atomic callback check failed");
            e
        })
    }

    /// Apply the reverse rule of one record.
    fn apply(
        &self,
        rec: &OpRecord<'_>,
        order: usize,
        taylor: &TaylorMatrix<F>,
        partial: &mut AdjointMatrix<F>,
        frame: &mut AtomicFrame<F>,
    ) -> Result<()> {
        if self.config.trace {
            if rec.op.num_res() > 0 {
                tracing::trace!(
                    op_index = rec.op_index,
                    var_index = rec.var_index,
                    op = ?rec.op,
                    taylor = ?&taylor.row(rec.var_index)[..=order],
                    partial = ?&partial.row(rec.var_index)[..=order],
                    "reverse record"
                );
            } else {
                tracing::trace!(
                    op_index = rec.op_index,
                    var_index = rec.var_index,
                    op = ?rec.op,
                    "reverse record"
                );
            }
        }
        if !rec.op.is_atomic() && frame.state() != AtomicState::End {
            return Err(Error::AtomicBracket {
                op_index: rec.op_index,
                reason: format!("{:?} inside an atomic bracket", rec.op),
            });
        }

        let d = order;
        let i_z = rec.var_index;
        let a = rec.args;
        let var = |slot: usize| a[slot] as usize;
        let par = |slot: usize| self.tape.parameters()[a[slot] as usize];

        use OpCode::*;
        match rec.op {
            Begin | End | Inv | Par | Sign | Com | CSkip | Dis | Pri | Stpp | Stpv | Stvp | Stvv => {}

            AddVV => reverse_addvv(d, i_z, var(0), var(1), partial),
            AddPV => reverse_addpv(d, i_z, var(1), partial),
            SubVV => reverse_subvv(d, i_z, var(0), var(1), partial),
            SubPV => reverse_subpv(d, i_z, var(1), partial),
            SubVP => reverse_subvp(d, i_z, var(0), partial),
            MulVV => reverse_mulvv(d, i_z, var(0), var(1), taylor, partial),
            MulPV => reverse_mulpv(d, i_z, par(0), var(1), partial),
            DivVV => reverse_divvv(d, i_z, var(0), var(1), taylor, partial),
            DivPV => reverse_divpv(d, i_z, var(1), taylor, partial),
            DivVP => reverse_divvp(d, i_z, var(0), par(1), partial),
            PowVV => reverse_powvv(d, i_z, var(0), var(1), taylor, partial),
            PowPV => reverse_powpv(d, i_z, par(0), var(1), taylor, partial),
            PowVP => reverse_powvp(d, i_z, var(0), par(1), taylor, partial),

            Abs => reverse_abs(d, i_z, var(0), taylor, partial),
            Exp => reverse_exp(d, i_z, var(0), taylor, partial),
            Log => reverse_log(d, i_z, var(0), taylor, partial),
            Sqrt => reverse_sqrt(d, i_z, var(0), taylor, partial),
            Sin => reverse_sin(d, i_z, var(0), taylor, partial),
            Cos => reverse_cos(d, i_z, var(0), taylor, partial),
            Sinh => reverse_sinh(d, i_z, var(0), taylor, partial),
            Cosh => reverse_cosh(d, i_z, var(0), taylor, partial),
            Tan => reverse_tan(d, i_z, var(0), taylor, partial),
            Tanh => reverse_tanh(d, i_z, var(0), taylor, partial),
            Asin => reverse_asin(d, i_z, var(0), taylor, partial),
            Acos => reverse_acos(d, i_z, var(0), taylor, partial),
            Atan => reverse_atan(d, i_z, var(0), taylor, partial),

            CExp => {
                let cmp = CompareOp::from_addr(a[0]).ok_or(Error::InvalidCompare {
                    op_index: rec.op_index,
                    code: a[0],
                })?;
                reverse_cond(d, i_z, cmp, a, self.tape.parameters(), taylor, partial);
            }
            CSum => {
                let n_add = a[0] as usize;
                let n_sub = a[1] as usize;
                let terms = &a[3..3 + n_add + n_sub];
                reverse_csum(d, i_z, &terms[..n_add], &terms[n_add..], partial);
            }
            Ldp | Ldv => {
                let slot = a[2] as usize;
                let source = *self.load_map.get(slot).ok_or(Error::LoadSlot {
                    op_index: rec.op_index,
                    slot,
                    len: self.load_map.len(),
                })? as usize;
                if source >= i_z {
                    return Err(Error::UndefinedVariable {
                        op_index: rec.op_index,
                        op: rec.op,
                        var: source,
                        defined: i_z,
                    });
                }
                reverse_load(d, i_z, source, partial);
            }

            Atomic | AtomicArgPar | AtomicArgVar | AtomicResPar | AtomicResVar => {
                frame.step(rec, d, self.registry, self.tape.parameters(), taylor, partial)?;
            }
        }
        Ok(())
    }
}
