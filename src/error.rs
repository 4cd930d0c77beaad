//! Error type shared by tape validation and both reverse sweeps.
//!
//! Every variant is fatal for the call that produced it: a reverse sweep over
//! a fixed tape is deterministic, so nothing here is worth retrying.

use crate::opcode::OpCode;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The tape violates a structural invariant.
    #[error("malformed tape: {0}")]
    MalformedTape(String),

    /// A buffer does not have the size the tape requires.
    #[error("{what} has {found} entries, expected {expected}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A coefficient matrix has too few columns for the requested order.
    #[error("order {order} needs {needed} columns but {what} has {found}")]
    OrderTooHigh {
        what: &'static str,
        order: usize,
        needed: usize,
        found: usize,
    },

    /// A dependent seed row has a nonzero coefficient below the sweep order.
    #[error("seed row {var} has nonzero order {order} coefficient (only order {top} may be set)")]
    InvalidSeed { var: usize, order: usize, top: usize },

    /// A record refers to a variable that is not defined before it.
    #[error("record {op_index} ({op:?}) references variable {var}, only {defined} are defined")]
    UndefinedVariable {
        op_index: usize,
        op: OpCode,
        var: usize,
        defined: usize,
    },

    /// A load instruction names a slot outside the load-indirection map.
    #[error("record {op_index} uses load slot {slot}, the map has {len} entries")]
    LoadSlot {
        op_index: usize,
        slot: usize,
        len: usize,
    },

    /// A comparison code stored in a record is not a known comparison.
    #[error("record {op_index} stores unknown comparison code {code}")]
    InvalidCompare { op_index: usize, code: u32 },

    /// Atomic bracket records appeared out of order or disagree.
    #[error("atomic bracket at record {op_index}: {reason}")]
    AtomicBracket { op_index: usize, reason: String },

    /// No live callback is registered for a recorded atomic id.
    #[error("atomic operation `{name}` (id {id}) is not registered")]
    MissingAtomic { id: usize, name: String },

    /// The atomic callback reported that it could not compute the reverse pass.
    #[error("atomic operation `{name}` (id {id}) failed in reverse mode")]
    AtomicFailed { id: usize, name: String },

    /// A marked-operator list is not a valid reverse traversal of the tape.
    #[error("invalid marked-operator list: {0}")]
    InvalidMarkedList(String),
}
