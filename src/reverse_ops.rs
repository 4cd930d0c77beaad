//! Reverse-mode rules for Taylor coefficients, one per elementary operation.
//!
//! Convention: `z[k]` is the order-`k` Taylor coefficient of a record's
//! result, `pz[k]` the adjoint of the seeded reduction with respect to it.
//! Each rule walks orders `d, d-1, ..., 0`, pushing `pz[j]` back through the
//! forward recurrence that produced `z[j]`. When it finishes, the operand
//! adjoint rows have received their contribution for every order `0..=d`.
//!
//! Result and auxiliary adjoint rows are scratch: rules may rescale them in
//! place. Operand rows are only accumulated into. Every rule relies on
//! operand variables lying strictly below the record's first result, which
//! tape validation guarantees.
//!
//! Forward recurrences are the standard ones (Griewank & Walther, ch. 13),
//! written with the logarithmic-derivative form `z' = x' · g` where it
//! applies: `z[j] = (1/j) Σ_{k=1}^{j} k · x[k] · g[j-k]`.

use crate::float::Float;
use crate::matrix::{AdjointMatrix, TaylorMatrix};
use crate::opcode::{Addr, CompareOp, FLAG_FALSE_VAR, FLAG_LEFT_VAR, FLAG_RIGHT_VAR, FLAG_TRUE_VAR};

#[inline]
fn ord<F: Float>(k: usize) -> F {
    F::from_order(k)
}

// ══════════════════════════════════════════════
//  Addition and subtraction
// ══════════════════════════════════════════════

/// `z = x + y`
pub fn reverse_addvv<F: Float>(d: usize, i_z: usize, x: usize, y: usize, partial: &mut AdjointMatrix<F>) {
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(x, j, pz[j]);
        ops.add(y, j, pz[j]);
    }
}

/// `z = p + y` and `z = y + p` (the recorder normalizes to parameter first).
pub fn reverse_addpv<F: Float>(d: usize, i_z: usize, y: usize, partial: &mut AdjointMatrix<F>) {
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(y, j, pz[j]);
    }
}

/// `z = x - y`
pub fn reverse_subvv<F: Float>(d: usize, i_z: usize, x: usize, y: usize, partial: &mut AdjointMatrix<F>) {
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(x, j, pz[j]);
        ops.add(y, j, -pz[j]);
    }
}

/// `z = p - y`
pub fn reverse_subpv<F: Float>(d: usize, i_z: usize, y: usize, partial: &mut AdjointMatrix<F>) {
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(y, j, -pz[j]);
    }
}

/// `z = x - p`
pub fn reverse_subvp<F: Float>(d: usize, i_z: usize, x: usize, partial: &mut AdjointMatrix<F>) {
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(x, j, pz[j]);
    }
}

/// `z = c + Σ add - Σ sub` over an arbitrary number of terms.
pub fn reverse_csum<F: Float>(
    d: usize,
    i_z: usize,
    add: &[Addr],
    sub: &[Addr],
    partial: &mut AdjointMatrix<F>,
) {
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for &v in add {
        for j in 0..=d {
            ops.add(v as usize, j, pz[j]);
        }
    }
    for &v in sub {
        for j in 0..=d {
            ops.add(v as usize, j, -pz[j]);
        }
    }
}

// ══════════════════════════════════════════════
//  Multiplication and division
// ══════════════════════════════════════════════

/// `z = x * y`, forward `z[j] = Σ_{k=0}^{j} x[j-k] · y[k]`.
pub fn reverse_mulvv<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    y: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let tx = taylor.row(x);
    let ty = taylor.row(y);
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in (0..=d).rev() {
        for kk in 0..=j {
            ops.add(x, j - kk, pz[j] * ty[kk]);
            ops.add(y, kk, pz[j] * tx[j - kk]);
        }
    }
}

/// `z = p * y`
pub fn reverse_mulpv<F: Float>(d: usize, i_z: usize, p: F, y: usize, partial: &mut AdjointMatrix<F>) {
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(y, j, p * pz[j]);
    }
}

/// `z = x / y`, forward `z[j] = (x[j] - Σ_{k=1}^{j} z[j-k] · y[k]) / y[0]`.
pub fn reverse_divvv<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    y: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let ty = taylor.row(y);
    let tz = taylor.row(i_z);
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &mut res[..k];
    for j in (0..=d).rev() {
        let pzj = pz[j] / ty[0];
        pz[j] = pzj;
        ops.add(x, j, pzj);
        for kk in 1..=j {
            pz[j - kk] = pz[j - kk] - pzj * ty[kk];
            ops.add(y, kk, -pzj * tz[j - kk]);
        }
        ops.add(y, 0, -pzj * tz[j]);
    }
}

/// `z = p / y`
pub fn reverse_divpv<F: Float>(
    d: usize,
    i_z: usize,
    y: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let ty = taylor.row(y);
    let tz = taylor.row(i_z);
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &mut res[..k];
    for j in (0..=d).rev() {
        let pzj = pz[j] / ty[0];
        pz[j] = pzj;
        for kk in 1..=j {
            pz[j - kk] = pz[j - kk] - pzj * ty[kk];
            ops.add(y, kk, -pzj * tz[j - kk]);
        }
        ops.add(y, 0, -pzj * tz[j]);
    }
}

/// `z = x / p`
pub fn reverse_divvp<F: Float>(d: usize, i_z: usize, x: usize, p: F, partial: &mut AdjointMatrix<F>) {
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(x, j, pz[j] / p);
    }
}

// ══════════════════════════════════════════════
//  Exp / Log / Sqrt
// ══════════════════════════════════════════════

/// `z = exp(x)`, forward `z[j] = (1/j) Σ_{k=1}^{j} k · x[k] · z[j-k]`.
pub fn reverse_exp<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let tx = taylor.row(x);
    let tz = taylor.row(i_z);
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &mut res[..k];
    let px = ops.row_mut(x);
    for j in (1..=d).rev() {
        let pzj = pz[j] / ord(j);
        pz[j] = pzj;
        for kk in 1..=j {
            let kf: F = ord(kk);
            px[kk] = px[kk] + pzj * kf * tz[j - kk];
            pz[j - kk] = pz[j - kk] + pzj * kf * tx[kk];
        }
    }
    px[0] = px[0] + pz[0] * tz[0];
}

/// `z = log(x)`, forward `z[j] = (x[j] - (1/j) Σ_{k=1}^{j-1} k · z[k] · x[j-k]) / x[0]`.
pub fn reverse_log<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let tx = taylor.row(x);
    let tz = taylor.row(i_z);
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &mut res[..k];
    let px = ops.row_mut(x);
    for j in (1..=d).rev() {
        let scaled = pz[j] / tx[0];
        px[0] = px[0] - scaled * tz[j];
        px[j] = px[j] + scaled;
        let pzj = scaled / ord(j);
        pz[j] = pzj;
        for kk in 1..j {
            let kf: F = ord(kk);
            pz[kk] = pz[kk] - pzj * kf * tx[j - kk];
            px[j - kk] = px[j - kk] - pzj * kf * tz[kk];
        }
    }
    px[0] = px[0] + pz[0] / tx[0];
}

/// `z = sqrt(x)`, forward `z[j] = (x[j] - Σ_{k=1}^{j-1} z[k] · z[j-k]) / (2 z[0])`.
pub fn reverse_sqrt<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let tz = taylor.row(i_z);
    let two = F::one() + F::one();
    let inv_z0 = F::one() / tz[0];
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &mut res[..k];
    let px = ops.row_mut(x);
    for j in (1..=d).rev() {
        let pzj = pz[j] * inv_z0;
        pz[j] = pzj;
        pz[0] = pz[0] - pzj * tz[j];
        px[j] = px[j] + pzj / two;
        for kk in 1..j {
            pz[kk] = pz[kk] - pzj * tz[j - kk];
        }
    }
    px[0] = px[0] + pz[0] * inv_z0 / two;
}

// ══════════════════════════════════════════════
//  Trigonometric and hyperbolic pairs
// ══════════════════════════════════════════════

/// Shared reverse step for the coupled recurrences
///
/// `s[j] = (1/j) Σ k · x[k] · c[j-k]`, `c[j] = sign · (1/j) Σ k · x[k] · s[j-k]`,
///
/// with `sign = -1` for `sin`/`cos` and `+1` for `sinh`/`cosh`.
#[allow(clippy::too_many_arguments)]
fn reverse_coupled<F: Float>(
    d: usize,
    sign: F,
    tx: &[F],
    ts: &[F],
    tc: &[F],
    px: &mut [F],
    ps: &mut [F],
    pc: &mut [F],
) {
    for j in (1..=d).rev() {
        let psj = ps[j] / ord(j);
        let pcj = pc[j] / ord(j);
        ps[j] = psj;
        pc[j] = pcj;
        for kk in 1..=j {
            let kf: F = ord(kk);
            px[kk] = px[kk] + psj * kf * tc[j - kk] + sign * pcj * kf * ts[j - kk];
            ps[j - kk] = ps[j - kk] + sign * pcj * kf * tx[kk];
            pc[j - kk] = pc[j - kk] + psj * kf * tx[kk];
        }
    }
    px[0] = px[0] + ps[0] * tc[0] + sign * pc[0] * ts[0];
}

/// Rows of a two-result record: `(operands, auxiliary adjoint, primary adjoint)`.
macro_rules! pair_rows {
    ($partial:expr, $i_z:expr) => {{
        let k = $partial.cols();
        let (ops, res) = $partial.split_at_row($i_z - 1);
        let (aux, prim) = res.split_at_mut(k);
        (ops, aux, &mut prim[..k])
    }};
}

/// `z = sin(x)` with auxiliary `cos(x)` at `i_z - 1`.
pub fn reverse_sin<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let (tx, ts, tc) = (taylor.row(x), taylor.row(i_z), taylor.row(i_z - 1));
    let (mut ops, pc, ps) = pair_rows!(partial, i_z);
    reverse_coupled(d, -F::one(), tx, ts, tc, ops.row_mut(x), ps, pc);
}

/// `z = cos(x)` with auxiliary `sin(x)` at `i_z - 1`.
pub fn reverse_cos<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let (tx, tc, ts) = (taylor.row(x), taylor.row(i_z), taylor.row(i_z - 1));
    let (mut ops, ps, pc) = pair_rows!(partial, i_z);
    reverse_coupled(d, -F::one(), tx, ts, tc, ops.row_mut(x), ps, pc);
}

/// `z = sinh(x)` with auxiliary `cosh(x)` at `i_z - 1`.
pub fn reverse_sinh<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let (tx, ts, tc) = (taylor.row(x), taylor.row(i_z), taylor.row(i_z - 1));
    let (mut ops, pc, ps) = pair_rows!(partial, i_z);
    reverse_coupled(d, F::one(), tx, ts, tc, ops.row_mut(x), ps, pc);
}

/// `z = cosh(x)` with auxiliary `sinh(x)` at `i_z - 1`.
pub fn reverse_cosh<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let (tx, tc, ts) = (taylor.row(x), taylor.row(i_z), taylor.row(i_z - 1));
    let (mut ops, ps, pc) = pair_rows!(partial, i_z);
    reverse_coupled(d, F::one(), tx, ts, tc, ops.row_mut(x), ps, pc);
}

/// Shared body of `tan` (`sign = +1`) and `tanh` (`sign = -1`).
///
/// Forward: `z[j] = x[j] + sign · (1/j) Σ_{k=1}^{j} k · x[k] · y[j-k]` and
/// `y[j] = Σ_{k=0}^{j} z[k] · z[j-k]`, where `y = z²` is the auxiliary row.
fn reverse_tan_like<F: Float>(
    d: usize,
    sign: F,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let (tx, tz, ty) = (taylor.row(x), taylor.row(i_z), taylor.row(i_z - 1));
    let two = F::one() + F::one();
    let (mut ops, py, pz) = pair_rows!(partial, i_z);
    let px = ops.row_mut(x);
    for j in (1..=d).rev() {
        px[j] = px[j] + pz[j];
        let pzj = pz[j] / ord(j);
        pz[j] = pzj;
        for kk in 1..=j {
            let kf: F = ord(kk);
            px[kk] = px[kk] + sign * pzj * ty[j - kk] * kf;
            py[j - kk] = py[j - kk] + sign * pzj * tx[kk] * kf;
        }
        for kk in 0..j {
            pz[kk] = pz[kk] + py[j - 1] * tz[j - kk - 1] * two;
        }
    }
    px[0] = px[0] + pz[0] * (F::one() + sign * ty[0]);
}

/// `z = tan(x)` with auxiliary `tan(x)²` at `i_z - 1`.
pub fn reverse_tan<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    reverse_tan_like(d, F::one(), i_z, x, taylor, partial);
}

/// `z = tanh(x)` with auxiliary `tanh(x)²` at `i_z - 1`.
pub fn reverse_tanh<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    reverse_tan_like(d, -F::one(), i_z, x, taylor, partial);
}

// ══════════════════════════════════════════════
//  Inverse trigonometric
// ══════════════════════════════════════════════

/// Shared body of `asin` (`sign = +1`) and `acos` (`sign = -1`).
///
/// Auxiliary `b = sqrt(1 - x²)` at `i_z - 1`. Forward:
/// `b[j] = (q[j]/2 - (1/2) Σ_{k=1}^{j-1} b[k] · b[j-k]) / b[0]` with
/// `q = 1 - x²`, and `z[j] = (sign · x[j] - (1/j) Σ_{k=1}^{j-1} k · z[k] · b[j-k]) / b[0]`.
fn reverse_asin_like<F: Float>(
    d: usize,
    sign: F,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let (tx, tz, tb) = (taylor.row(x), taylor.row(i_z), taylor.row(i_z - 1));
    let (mut ops, pb, pz) = pair_rows!(partial, i_z);
    let px = ops.row_mut(x);
    for j in (1..=d).rev() {
        let pbj = pb[j] / tb[0];
        let mut pzj = pz[j] / tb[0];
        pb[j] = pbj;

        pb[0] = pb[0] - pzj * tz[j] - pbj * tb[j];
        px[0] = px[0] - pbj * tx[j];
        px[j] = px[j] + sign * pzj - pbj * tx[0];

        pzj = pzj / ord(j);
        pz[j] = pzj;
        for kk in 1..j {
            let kf: F = ord(kk);
            pb[j - kk] = pb[j - kk] - kf * pzj * tz[kk] - pbj * tb[kk];
            px[kk] = px[kk] - pbj * tx[j - kk];
            pz[kk] = pz[kk] - pzj * kf * tb[j - kk];
        }
    }
    px[0] = px[0] + (sign * pz[0] - pb[0] * tx[0]) / tb[0];
}

/// `z = asin(x)` with auxiliary `sqrt(1 - x²)` at `i_z - 1`.
pub fn reverse_asin<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    reverse_asin_like(d, F::one(), i_z, x, taylor, partial);
}

/// `z = acos(x)` with auxiliary `sqrt(1 - x²)` at `i_z - 1`.
pub fn reverse_acos<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    reverse_asin_like(d, -F::one(), i_z, x, taylor, partial);
}

/// `z = atan(x)` with auxiliary `b = 1 + x²` at `i_z - 1`.
///
/// Forward: `b[j] = Σ_{k=0}^{j} x[k] · x[j-k]` and
/// `z[j] = (x[j] - (1/j) Σ_{k=1}^{j-1} k · z[k] · b[j-k]) / b[0]`.
pub fn reverse_atan<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let (tx, tz, tb) = (taylor.row(x), taylor.row(i_z), taylor.row(i_z - 1));
    let two = F::one() + F::one();
    let (mut ops, pb, pz) = pair_rows!(partial, i_z);
    let px = ops.row_mut(x);
    for j in (1..=d).rev() {
        let mut pzj = pz[j] / tb[0];
        let pbj = pb[j] * two;
        pb[j] = pbj;

        pb[0] = pb[0] - pzj * tz[j];
        px[j] = px[j] + pzj + pbj * tx[0];
        px[0] = px[0] + pbj * tx[j];

        pzj = pzj / ord(j);
        pz[j] = pzj;
        for kk in 1..j {
            let kf: F = ord(kk);
            pb[j - kk] = pb[j - kk] - pzj * kf * tz[kk];
            pz[kk] = pz[kk] - pzj * kf * tb[j - kk];
            px[kk] = px[kk] + pbj * tx[j - kk];
        }
    }
    px[0] = px[0] + pz[0] / tb[0] + pb[0] * two * tx[0];
}

// ══════════════════════════════════════════════
//  Power
// ══════════════════════════════════════════════
//
// Power records own three results: `z0 = log(x)` at `i_z - 2`,
// `z1 = y · z0` at `i_z - 1` and `z2 = exp(z1)` at `i_z`.

/// `z = x ^ y`
pub fn reverse_powvv<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    y: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    reverse_exp(d, i_z, i_z - 1, taylor, partial);
    reverse_mulvv(d, i_z - 1, i_z - 2, y, taylor, partial);
    reverse_log(d, i_z - 2, x, taylor, partial);
}

/// `z = p ^ y`; `z0 = log(p)` is constant, so only `y` receives adjoints.
pub fn reverse_powpv<F: Float>(
    d: usize,
    i_z: usize,
    p: F,
    y: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    reverse_exp(d, i_z, i_z - 1, taylor, partial);
    reverse_mulpv(d, i_z - 1, p.ln(), y, partial);
}

/// `z = x ^ p`
pub fn reverse_powvp<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    p: F,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    reverse_exp(d, i_z, i_z - 1, taylor, partial);
    reverse_mulpv(d, i_z - 1, p, i_z - 2, partial);
    reverse_log(d, i_z - 2, x, taylor, partial);
}

// ══════════════════════════════════════════════
//  Nonsmooth, conditional and indirect
// ══════════════════════════════════════════════

/// `z = |x|`.
///
/// The first nonzero coefficient of `x` fixes the branch; if every
/// coefficient up to `d` is zero no adjoint passes through.
pub fn reverse_abs<F: Float>(
    d: usize,
    i_z: usize,
    x: usize,
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let tx = taylor.row(x);
    let mut first = 0;
    while first < d && tx[first] == F::zero() {
        first += 1;
    }
    let sign = if tx[first] > F::zero() {
        F::one()
    } else if tx[first] < F::zero() {
        -F::one()
    } else {
        return;
    };
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in first..=d {
        ops.add(x, j, sign * pz[j]);
    }
}

/// `z = if left <cmp> right { if_true } else { if_false }`.
///
/// The comparison is decided by order-0 coefficients, i.e. the branch taken
/// when the tape was evaluated forward. Only that branch, when it is a
/// variable, receives the result adjoint.
pub fn reverse_cond<F: Float>(
    d: usize,
    i_z: usize,
    cmp: CompareOp,
    args: &[Addr],
    parameters: &[F],
    taylor: &TaylorMatrix<F>,
    partial: &mut AdjointMatrix<F>,
) {
    let flags = args[1];
    let value = |bit: Addr, slot: usize| {
        let a = args[slot] as usize;
        if flags & bit != 0 {
            taylor.row(a)[0]
        } else {
            parameters[a]
        }
    };
    let left = value(FLAG_LEFT_VAR, 2);
    let right = value(FLAG_RIGHT_VAR, 3);
    let (bit, slot) = if cmp.holds(left, right) {
        (FLAG_TRUE_VAR, 4)
    } else {
        (FLAG_FALSE_VAR, 5)
    };
    if flags & bit == 0 {
        return;
    }
    let target = args[slot] as usize;
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(target, j, pz[j]);
    }
}

/// Indirect load that resolved to variable `source` (zero: a parameter).
pub fn reverse_load<F: Float>(d: usize, i_z: usize, source: usize, partial: &mut AdjointMatrix<F>) {
    if source == 0 {
        return;
    }
    let k = partial.cols();
    let (mut ops, res) = partial.split_at_row(i_z);
    let pz = &res[..k];
    for j in 0..=d {
        ops.add(source, j, pz[j]);
    }
}
