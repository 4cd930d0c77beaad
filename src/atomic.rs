//! User-supplied atomic operations and the bracket protocol that drives them.
//!
//! An atomic call is recorded as one bracketed group:
//!
//! ```text
//! Atomic(id, instance, n, m)
//! AtomicArgVar / AtomicArgPar   × n
//! AtomicResVar / AtomicResPar   × m
//! Atomic(id, instance, n, m)
//! ```
//!
//! A reverse traversal meets the group back to front. [`AtomicFrame`] walks
//! it as a state machine, buffering Taylor coefficients and adjoints, and
//! calls [`AtomicOp::reverse`] when it reaches the opening marker.

use std::fmt;
use std::sync::Arc;

use crate::bytecode_tape::OpRecord;
use crate::error::{Error, Result};
use crate::float::Float;
use crate::matrix::{AdjointMatrix, TaylorMatrix};
use crate::opcode::{Addr, OpCode};

/// A differentiable function evaluated outside the tape.
///
/// Buffers are laid out by operand: coefficient `ell` of argument `j` is
/// `tx[j * (order + 1) + ell]`, and likewise for `ty`, `px` and `py`.
///
/// # Example
///
/// ```ignore
/// struct Square;
///
/// impl AtomicOp<f64> for Square {
///     fn reverse(&self, _instance: u32, order: usize, tx: &[f64], _ty: &[f64],
///                px: &mut [f64], py: &[f64]) -> bool {
///         // y[k] = Σ x[i] x[k-i]
///         for k in 0..=order {
///             for i in 0..=k {
///                 px[i] += 2.0 * py[k] * tx[k - i];
///             }
///         }
///         true
///     }
/// }
/// ```
pub trait AtomicOp<F: Float>: Send + Sync {
    /// Reverse mode for Taylor coefficients up to `order`.
    ///
    /// `px` is zero on entry and must receive, for every argument coefficient,
    /// the derivative of `Σ py · y` with respect to it. `instance` is the
    /// value recorded with the call. Return `false` if the reverse pass
    /// cannot be computed.
    fn reverse(&self, instance: Addr, order: usize, tx: &[F], ty: &[F], px: &mut [F], py: &[F]) -> bool;
}

struct Entry<F> {
    name: String,
    op: Option<Arc<dyn AtomicOp<F>>>,
}

/// Callback table indexed by the id stored in `Atomic` records.
///
/// Ids are dense and never reused; removing an entry keeps its name so a
/// tape that still refers to it reports which operation is gone.
pub struct AtomicRegistry<F: Float> {
    entries: Vec<Entry<F>>,
}

impl<F: Float> AtomicRegistry<F> {
    pub fn new() -> Self {
        AtomicRegistry {
            entries: Vec::new(),
        }
    }

    /// Register an operation under `name`. Returns its id.
    pub fn register(&mut self, name: impl Into<String>, op: Arc<dyn AtomicOp<F>>) -> Addr {
        let id = self.entries.len() as Addr;
        self.entries.push(Entry {
            name: name.into(),
            op: Some(op),
        });
        id
    }

    /// Drop the callback registered under `id`, returning it.
    pub fn remove(&mut self, id: Addr) -> Option<Arc<dyn AtomicOp<F>>> {
        self.entries.get_mut(id as usize).and_then(|e| e.op.take())
    }

    #[inline]
    pub fn lookup(&self, id: Addr) -> Option<&Arc<dyn AtomicOp<F>>> {
        self.entries.get(id as usize).and_then(|e| e.op.as_ref())
    }

    /// Name given at registration, also for removed entries.
    pub fn name(&self, id: Addr) -> Option<&str> {
        self.entries.get(id as usize).map(|e| e.name.as_str())
    }

    /// Number of ids handed out so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail with [`Error::MissingAtomic`] for the first id without a live callback.
    pub fn check(&self, ids: impl IntoIterator<Item = Addr>) -> Result<()> {
        for id in ids {
            if self.lookup(id).is_none() {
                return Err(self.missing(id));
            }
        }
        Ok(())
    }

    pub(crate) fn missing(&self, id: Addr) -> Error {
        Error::MissingAtomic {
            id: id as usize,
            name: self.name(id).unwrap_or("<unregistered>").to_string(),
        }
    }
}

impl<F: Float> Default for AtomicRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> fmt::Debug for AtomicRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.name, e.op.is_some())))
            .finish()
    }
}

/// Position of the reverse traversal inside an atomic bracket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomicState {
    /// Outside any bracket.
    End,
    /// Closing marker seen; collecting results.
    Results,
    /// Collecting arguments.
    Arguments,
    /// All operands collected; the next record must be the opening marker.
    Ready,
}

/// Scratch state for the atomic call currently being reversed.
///
/// Buffers grow to the largest call seen and are reused for later calls.
pub(crate) struct AtomicFrame<F: Float> {
    state: AtomicState,
    /// `[callback id, instance id, n, m]` as recorded on the closing marker.
    header: [Addr; 4],
    order: usize,
    /// Arguments (results) still to be collected; the next one has index `left - 1`.
    left: usize,
    tx: Vec<F>,
    ty: Vec<F>,
    px: Vec<F>,
    py: Vec<F>,
    /// Variable behind each argument, 0 for parameters.
    arg_vars: Vec<usize>,
}

impl<F: Float> AtomicFrame<F> {
    pub(crate) fn new() -> Self {
        AtomicFrame {
            state: AtomicState::End,
            header: [0; 4],
            order: 0,
            left: 0,
            tx: Vec::new(),
            ty: Vec::new(),
            px: Vec::new(),
            py: Vec::new(),
            arg_vars: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> AtomicState {
        self.state
    }

    /// Advance over one atomic record.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn step(
        &mut self,
        rec: &OpRecord<'_>,
        order: usize,
        registry: Option<&AtomicRegistry<F>>,
        parameters: &[F],
        taylor: &TaylorMatrix<F>,
        partial: &mut AdjointMatrix<F>,
    ) -> Result<()> {
        match (self.state, rec.op) {
            (AtomicState::End, OpCode::Atomic) => {
                self.open(rec, order);
                Ok(())
            }
            (AtomicState::Results, OpCode::AtomicResVar) => {
                let var = rec.var_index;
                let j = self.next_slot();
                self.ty[j..j + order + 1].copy_from_slice(&taylor.row(var)[..=order]);
                self.py[j..j + order + 1].copy_from_slice(&partial.row(var)[..=order]);
                self.finish_result();
                Ok(())
            }
            (AtomicState::Results, OpCode::AtomicResPar) => {
                let j = self.next_slot();
                constant_row(&mut self.ty[j..j + order + 1], parameters[rec.args[0] as usize]);
                self.py[j..j + order + 1].fill(F::zero());
                self.finish_result();
                Ok(())
            }
            (AtomicState::Arguments, OpCode::AtomicArgVar) => {
                let var = rec.args[0] as usize;
                let j = self.next_slot();
                self.tx[j..j + order + 1].copy_from_slice(&taylor.row(var)[..=order]);
                self.arg_vars[self.left - 1] = var;
                self.finish_argument();
                Ok(())
            }
            (AtomicState::Arguments, OpCode::AtomicArgPar) => {
                let j = self.next_slot();
                constant_row(&mut self.tx[j..j + order + 1], parameters[rec.args[0] as usize]);
                self.arg_vars[self.left - 1] = 0;
                self.finish_argument();
                Ok(())
            }
            (AtomicState::Ready, OpCode::Atomic) => self.call(rec, registry, partial),
            (state, op) => Err(Error::AtomicBracket {
                op_index: rec.op_index,
                reason: format!("unexpected {op:?} in state {state:?}"),
            }),
        }
    }

    /// Error unless the traversal left every bracket it entered.
    pub(crate) fn ensure_closed(&self) -> Result<()> {
        if self.state != AtomicState::End {
            return Err(Error::AtomicBracket {
                op_index: 0,
                reason: format!("traversal ended in state {:?}", self.state),
            });
        }
        Ok(())
    }

    fn open(&mut self, rec: &OpRecord<'_>, order: usize) {
        self.header.copy_from_slice(rec.args);
        self.order = order;
        let (n, m) = (rec.args[2] as usize, rec.args[3] as usize);
        let k = order + 1;
        self.tx.resize(n * k, F::zero());
        self.px.resize(n * k, F::zero());
        self.ty.resize(m * k, F::zero());
        self.py.resize(m * k, F::zero());
        self.arg_vars.resize(n, 0);

        self.left = m;
        self.state = AtomicState::Results;
        if m == 0 {
            self.begin_arguments();
        }
    }

    /// Buffer offset of the operand about to be collected.
    #[inline]
    fn next_slot(&self) -> usize {
        (self.left - 1) * (self.order + 1)
    }

    fn finish_result(&mut self) {
        self.left -= 1;
        if self.left == 0 {
            self.begin_arguments();
        }
    }

    fn begin_arguments(&mut self) {
        self.left = self.header[2] as usize;
        self.state = if self.left == 0 {
            AtomicState::Ready
        } else {
            AtomicState::Arguments
        };
    }

    fn finish_argument(&mut self) {
        self.left -= 1;
        if self.left == 0 {
            self.state = AtomicState::Ready;
        }
    }

    fn call(
        &mut self,
        rec: &OpRecord<'_>,
        registry: Option<&AtomicRegistry<F>>,
        partial: &mut AdjointMatrix<F>,
    ) -> Result<()> {
        if rec.args != &self.header[..] {
            return Err(Error::AtomicBracket {
                op_index: rec.op_index,
                reason: format!(
                    "opening marker {:?} does not match closing marker {:?}",
                    rec.args, self.header
                ),
            });
        }
        let [id, instance, n, _] = self.header;
        let k = self.order + 1;
        let n = n as usize;

        let op = match registry.and_then(|r| r.lookup(id)) {
            Some(op) => op,
            None => {
                let err = match registry {
                    Some(r) => r.missing(id),
                    None => Error::MissingAtomic {
                        id: id as usize,
                        name: "<unregistered>".to_string(),
                    },
                };
                tracing::warn!(op_index = rec.op_index, id, "atomic callback missing");
                return Err(err);
            }
        };

        let px = &mut self.px[..n * k];
        px.fill(F::zero());
        let ok = op.reverse(
            instance,
            self.order,
            &self.tx[..n * k],
            &self.ty,
            px,
            &self.py,
        );
        if !ok {
            let name = registry
                .and_then(|r| r.name(id))
                .unwrap_or("<unregistered>")
                .to_string();
            tracing::warn!(op_index = rec.op_index, id, name = %name, "atomic reverse failed");
            return Err(Error::AtomicFailed { id: id as usize, name });
        }

        for (j, &var) in self.arg_vars[..n].iter().enumerate() {
            if var == 0 {
                continue;
            }
            let row = partial.row_mut(var);
            for (p, &dp) in row[..k].iter_mut().zip(&self.px[j * k..(j + 1) * k]) {
                *p = *p + dp;
            }
        }

        self.state = AtomicState::End;
        Ok(())
    }
}

/// Taylor row of a constant: value at order 0, zero above.
fn constant_row<F: Float>(row: &mut [F], value: F) {
    row.fill(F::zero());
    row[0] = value;
}
