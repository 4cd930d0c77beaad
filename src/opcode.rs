//! Opcodes for recorded tapes.
//!
//! Each opcode fixes the meaning of a record's argument slots and how many
//! result variables the record produces. Naming follows the operand kinds:
//! `V` is a variable slot, `P` a parameter slot, so [`OpCode::DivPV`] is
//! `parameter / variable`.

use crate::float::Float;

/// Index type for argument slots (variable, parameter, or immediate).
pub type Addr = u32;

// CExp / CSkip / Com flag bits marking which comparison operands are variables.
pub const FLAG_LEFT_VAR: Addr = 1;
pub const FLAG_RIGHT_VAR: Addr = 2;
/// `CExp` only: the `if_true` operand is a variable.
pub const FLAG_TRUE_VAR: Addr = 4;
/// `CExp` only: the `if_false` operand is a variable.
pub const FLAG_FALSE_VAR: Addr = 8;

/// Elementary operation codes.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpCode {
    // ── Structural ──
    /// First record of every tape; defines the phantom variable 0.
    Begin,
    /// Last record of every tape.
    End,
    /// Independent variable.
    Inv,
    /// Parameter promoted to a variable.
    Par,

    // ── Binary arithmetic ──
    AddVV,
    AddPV,
    SubVV,
    SubPV,
    SubVP,
    MulVV,
    MulPV,
    DivVV,
    DivPV,
    DivVP,
    /// Three results: `log(x)`, `y * log(x)`, `exp(y * log(x))`.
    PowVV,
    PowPV,
    PowVP,

    // ── Unary, one result ──
    Abs,
    Sign,
    Exp,
    Log,
    Sqrt,

    // ── Unary, two results (auxiliary one below the primary) ──
    /// Auxiliary: `cos(x)`.
    Sin,
    /// Auxiliary: `sin(x)`.
    Cos,
    /// Auxiliary: `cosh(x)`.
    Sinh,
    /// Auxiliary: `sinh(x)`.
    Cosh,
    /// Auxiliary: `tan(x)²`.
    Tan,
    /// Auxiliary: `tanh(x)²`.
    Tanh,
    /// Auxiliary: `sqrt(1 - x²)`.
    Asin,
    /// Auxiliary: `sqrt(1 - x²)`.
    Acos,
    /// Auxiliary: `1 + x²`.
    Atan,

    // ── Comparison and conditionals ──
    /// `[cmp, flags, left, right, if_true, if_false]`
    CExp,
    /// Recorded comparison, no result.
    Com,
    /// Conditional skip. Variable arity: `[cmp, flags, left, right, n_true, n_false, records…]`.
    CSkip,

    // ── Misc ──
    /// Cumulative sum. Variable arity: `[n_add, n_sub, param, add vars…, sub vars…]`.
    CSum,
    /// Discrete function: `[function id, var]`. Zero derivative.
    Dis,
    /// Print, no result.
    Pri,

    // ── Indirect addressing ──
    /// Load with a parameter index: `[vector offset, index, load slot]`.
    Ldp,
    /// Load with a variable index: `[vector offset, index, load slot]`.
    Ldv,
    Stpp,
    Stpv,
    Stvp,
    Stvv,

    // ── Atomic calls ──
    /// Opening and closing bracket: `[callback id, instance id, n, m]`.
    Atomic,
    AtomicArgPar,
    AtomicArgVar,
    AtomicResPar,
    /// Variable result of an atomic call; produces one variable.
    AtomicResVar,
}

impl OpCode {
    /// Number of argument slots, or `None` for variable-arity records
    /// ([`OpCode::CSum`], [`OpCode::CSkip`]).
    pub fn num_args(self) -> Option<usize> {
        use OpCode::*;
        let n = match self {
            End | Inv | AtomicResVar => 0,
            Begin | Par | Abs | Sign | Exp | Log | Sqrt | Sin | Cos | Sinh | Cosh | Tan | Tanh
            | Asin | Acos | Atan | AtomicArgPar | AtomicArgVar | AtomicResPar => 1,
            AddVV | AddPV | SubVV | SubPV | SubVP | MulVV | MulPV | DivVV | DivPV | DivVP
            | PowVV | PowPV | PowVP | Dis => 2,
            Ldp | Ldv | Stpp | Stpv | Stvp | Stvv => 3,
            Com | Atomic => 4,
            Pri => 5,
            CExp => 6,
            CSum | CSkip => return None,
        };
        Some(n)
    }

    /// Number of result variables the record produces.
    pub fn num_res(self) -> usize {
        use OpCode::*;
        match self {
            End | Com | CSkip | Pri | Stpp | Stpv | Stvp | Stvv | Atomic | AtomicArgPar
            | AtomicArgVar | AtomicResPar => 0,
            Sin | Cos | Sinh | Cosh | Tan | Tanh | Asin | Acos | Atan => 2,
            PowVV | PowPV | PowVP => 3,
            _ => 1,
        }
    }

    /// True for the records that make up an atomic call bracket.
    #[inline]
    pub fn is_atomic(self) -> bool {
        matches!(
            self,
            OpCode::Atomic
                | OpCode::AtomicArgPar
                | OpCode::AtomicArgVar
                | OpCode::AtomicResPar
                | OpCode::AtomicResVar
        )
    }
}

/// Comparison stored in `CExp`, `Com` and `CSkip` records.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ge = 3,
    Gt = 4,
    Ne = 5,
}

impl CompareOp {
    /// Decode the comparison stored in argument slot 0.
    pub fn from_addr(code: Addr) -> Option<Self> {
        Some(match code {
            0 => CompareOp::Lt,
            1 => CompareOp::Le,
            2 => CompareOp::Eq,
            3 => CompareOp::Ge,
            4 => CompareOp::Gt,
            5 => CompareOp::Ne,
            _ => return None,
        })
    }

    /// Code to store in argument slot 0.
    #[inline]
    pub fn to_addr(self) -> Addr {
        self as Addr
    }

    /// Evaluate `left <cmp> right`.
    #[inline]
    pub fn holds<F: Float>(self, left: F, right: F) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ge => left >= right,
            CompareOp::Gt => left > right,
            CompareOp::Ne => left != right,
        }
    }

    /// `if left <cmp> right { if_true } else { if_false }`.
    #[inline]
    pub fn select<F: Float>(self, left: F, right: F, if_true: F, if_false: F) -> F {
        if self.holds(left, right) {
            if_true
        } else {
            if_false
        }
    }
}

/// Call `f` with every argument slot of a record that holds a variable index.
///
/// Load records report only their index operand; the variable a load
/// actually reads lives in the load-indirection map.
pub fn for_each_variable_arg(op: OpCode, args: &[Addr], mut f: impl FnMut(Addr)) {
    use OpCode::*;
    match op {
        Begin | End | Inv | Par | Ldp | Stpp | AtomicArgPar | AtomicResPar | AtomicResVar
        | Atomic => {}
        Abs | Sign | Exp | Log | Sqrt | Sin | Cos | Sinh | Cosh | Tan | Tanh | Asin | Acos
        | Atan | AtomicArgVar => f(args[0]),
        AddVV | SubVV | MulVV | DivVV | PowVV => {
            f(args[0]);
            f(args[1]);
        }
        AddPV | SubPV | MulPV | DivPV | PowPV | Dis | Ldv | Stvp => f(args[1]),
        SubVP | DivVP | PowVP => f(args[0]),
        Stpv => f(args[2]),
        Stvv => {
            f(args[1]);
            f(args[2]);
        }
        CExp => {
            let flags = args[1];
            for (bit, slot) in [
                (FLAG_LEFT_VAR, 2),
                (FLAG_RIGHT_VAR, 3),
                (FLAG_TRUE_VAR, 4),
                (FLAG_FALSE_VAR, 5),
            ] {
                if flags & bit != 0 {
                    f(args[slot]);
                }
            }
        }
        Com | CSkip => {
            let flags = args[1];
            if flags & FLAG_LEFT_VAR != 0 {
                f(args[2]);
            }
            if flags & FLAG_RIGHT_VAR != 0 {
                f(args[3]);
            }
        }
        Pri => {
            // [flags, position, before, value, after]; bit 0 marks a variable
            // position, bit 1 a variable value.
            if args[0] & 1 != 0 {
                f(args[1]);
            }
            if args[0] & 2 != 0 {
                f(args[3]);
            }
        }
        CSum => {
            let terms = args[0] as usize + args[1] as usize;
            for &a in &args[3..3 + terms] {
                f(a);
            }
        }
    }
}

/// Call `f` with every argument slot of a record that holds a parameter index.
pub fn for_each_parameter_arg(op: OpCode, args: &[Addr], mut f: impl FnMut(Addr)) {
    use OpCode::*;
    match op {
        Par | AtomicArgPar | AtomicResPar => f(args[0]),
        AddPV | SubPV | MulPV | DivPV | PowPV => f(args[0]),
        SubVP | DivVP | PowVP => f(args[1]),
        Ldp | Stpv => f(args[1]),
        Stvp => f(args[2]),
        Stpp => {
            f(args[1]);
            f(args[2]);
        }
        Pri => {
            if args[0] & 1 == 0 {
                f(args[1]);
            }
            if args[0] & 2 == 0 {
                f(args[3]);
            }
        }
        CSum => f(args[2]),
        CExp => {
            let flags = args[1];
            for (bit, slot) in [
                (FLAG_LEFT_VAR, 2),
                (FLAG_RIGHT_VAR, 3),
                (FLAG_TRUE_VAR, 4),
                (FLAG_FALSE_VAR, 5),
            ] {
                if flags & bit == 0 {
                    f(args[slot]);
                }
            }
        }
        Com | CSkip => {
            let flags = args[1];
            if flags & FLAG_LEFT_VAR == 0 {
                f(args[2]);
            }
            if flags & FLAG_RIGHT_VAR == 0 {
                f(args[3]);
            }
        }
        _ => {}
    }
}
