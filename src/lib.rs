//! Higher-order reverse sweeps over recorded operation tapes.
//!
//! Given a [`Tape`], the forward Taylor coefficients of every variable and
//! seeds on the dependent variables, a [`ReverseSweep`] accumulates the
//! partials of the seeded reduction with respect to the Taylor coefficients
//! of the independent variables, for any order.

pub mod atomic;
pub mod bytecode_tape;
pub mod error;
pub mod float;
pub mod marked;
pub mod matrix;
pub mod opcode;
pub mod reverse_ops;
pub mod sweep;

pub use atomic::{AtomicOp, AtomicRegistry, AtomicState};
pub use bytecode_tape::{AtomicOperand, AtomicResult, OpRecord, Tape, TapeBuilder};
pub use error::{Error, Result};
pub use float::Float;
pub use marked::{MarkedOperator, MarkedOperators};
pub use matrix::{AdjointMatrix, TaylorMatrix};
pub use opcode::{Addr, CompareOp, OpCode};
pub use sweep::{ReverseSweep, SweepConfig};
