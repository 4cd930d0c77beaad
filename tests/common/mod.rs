//! Fixtures shared by the integration tests: a reference forward Taylor
//! evaluator, a dependency marker and finite-difference helpers.

#![allow(dead_code)]

use std::collections::HashMap;

use approx::assert_relative_eq;
use tapesweep::opcode::{for_each_variable_arg, FLAG_FALSE_VAR, FLAG_LEFT_VAR, FLAG_RIGHT_VAR, FLAG_TRUE_VAR};
use tapesweep::{Addr, AtomicOp, CompareOp, OpCode, Tape, TaylorMatrix};

/// Forward evaluation of an atomic call: `(id, tx, coefficients per operand, m) -> ty`.
pub type AtomicForward<'a> = &'a dyn Fn(Addr, &[f64], usize, usize) -> Vec<f64>;

pub fn no_atomics(_: Addr, _: &[f64], _: usize, _: usize) -> Vec<f64> {
    panic!("tape has no atomic calls")
}

/// Output of [`forward`].
pub struct Forward {
    pub taylor: TaylorMatrix<f64>,
    pub load_map: Vec<Addr>,
}

// ══════════════════════════════════════════════
//  Taylor recurrences
// ══════════════════════════════════════════════

fn constant(v: f64, cols: usize) -> Vec<f64> {
    let mut c = vec![0.0; cols];
    c[0] = v;
    c
}

fn mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    (0..a.len())
        .map(|j| (0..=j).map(|k| a[k] * b[j - k]).sum())
        .collect()
}

fn div(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut c = vec![0.0; a.len()];
    for j in 0..a.len() {
        let s: f64 = (1..=j).map(|k| c[j - k] * b[k]).sum();
        c[j] = (a[j] - s) / b[0];
    }
    c
}

fn exp(a: &[f64]) -> Vec<f64> {
    let mut c = vec![0.0; a.len()];
    c[0] = a[0].exp();
    for j in 1..a.len() {
        let s: f64 = (1..=j).map(|k| k as f64 * a[k] * c[j - k]).sum();
        c[j] = s / j as f64;
    }
    c
}

fn log(a: &[f64]) -> Vec<f64> {
    let mut c = vec![0.0; a.len()];
    c[0] = a[0].ln();
    for j in 1..a.len() {
        let s: f64 = (1..j).map(|k| k as f64 * c[k] * a[j - k]).sum();
        c[j] = (a[j] - s / j as f64) / a[0];
    }
    c
}

fn sqrt(a: &[f64]) -> Vec<f64> {
    let mut c = vec![0.0; a.len()];
    c[0] = a[0].sqrt();
    for j in 1..a.len() {
        let s: f64 = (1..j).map(|k| c[k] * c[j - k]).sum();
        c[j] = (a[j] - s) / (2.0 * c[0]);
    }
    c
}

/// `(s, c)` with `s' = c a'` and `c' = sign · s a'`.
fn coupled(a: &[f64], s0: f64, c0: f64, sign: f64) -> (Vec<f64>, Vec<f64>) {
    let n = a.len();
    let (mut s, mut c) = (vec![0.0; n], vec![0.0; n]);
    s[0] = s0;
    c[0] = c0;
    for j in 1..n {
        let jf = j as f64;
        s[j] = (1..=j).map(|k| k as f64 * a[k] * c[j - k]).sum::<f64>() / jf;
        c[j] = sign * (1..=j).map(|k| k as f64 * a[k] * s[j - k]).sum::<f64>() / jf;
    }
    (s, c)
}

/// `(z, z²)` with `z' = a' (1 + sign · z²)`.
fn tan_like(a: &[f64], z0: f64, sign: f64) -> (Vec<f64>, Vec<f64>) {
    let n = a.len();
    let (mut z, mut y) = (vec![0.0; n], vec![0.0; n]);
    z[0] = z0;
    y[0] = z0 * z0;
    for j in 1..n {
        let s: f64 = (1..=j).map(|k| k as f64 * a[k] * y[j - k]).sum();
        z[j] = a[j] + sign * s / j as f64;
        y[j] = (0..=j).map(|k| z[k] * z[j - k]).sum();
    }
    (z, y)
}

/// `(z, b)` with `b = sqrt(1 - a²)` and `z' = sign · a' / b`.
fn asin_like(a: &[f64], z0: f64, sign: f64) -> (Vec<f64>, Vec<f64>) {
    let n = a.len();
    let sq = mul(a, a);
    let q: Vec<f64> = (0..n).map(|j| if j == 0 { 1.0 - sq[0] } else { -sq[j] }).collect();
    let b = sqrt(&q);
    let mut z = vec![0.0; n];
    z[0] = z0;
    for j in 1..n {
        let s: f64 = (1..j).map(|k| k as f64 * z[k] * b[j - k]).sum();
        z[j] = (sign * a[j] - s / j as f64) / b[0];
    }
    (z, b)
}

/// `(atan(a), 1 + a²)`
fn atan(a: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = a.len();
    let mut b = mul(a, a);
    b[0] += 1.0;
    let mut z = vec![0.0; n];
    z[0] = a[0].atan();
    for j in 1..n {
        let s: f64 = (1..j).map(|k| k as f64 * z[k] * b[j - k]).sum();
        z[j] = (a[j] - s / j as f64) / b[0];
    }
    (z, b)
}

fn scale(a: &[f64], s: f64) -> Vec<f64> {
    a.iter().map(|&v| v * s).collect()
}

fn zip_with(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

// ══════════════════════════════════════════════
//  Reference forward pass
// ══════════════════════════════════════════════

#[derive(Clone, Copy)]
enum Cell {
    Par(f64),
    Var(usize),
}

struct Call {
    id: Addr,
    m: usize,
    tx: Vec<f64>,
    ty: Option<Vec<f64>>,
    next_result: usize,
}

/// Fill `cols` Taylor coefficients for every variable of `tape`.
///
/// `x[j]` holds the coefficients of independent variable `j + 1`.
pub fn forward(tape: &Tape<f64>, x: &[Vec<f64>], cols: usize, atomic: AtomicForward<'_>) -> Forward {
    assert_eq!(x.len(), tape.num_independent());
    let params = tape.parameters();
    let mut t = TaylorMatrix::zeros(tape.num_var(), cols);
    let mut load_map = vec![0; tape.num_load()];
    let mut memory: HashMap<usize, Cell> = HashMap::new();
    let mut call: Option<Call> = None;
    let mut next_inv = 0;

    for rec in tape.records() {
        let a = rec.args;
        let i_z = rec.var_index;
        let row = |t: &TaylorMatrix<f64>, slot: usize| t.row(a[slot] as usize).to_vec();
        let par = |slot: usize| params[a[slot] as usize];

        let single = match rec.op {
            OpCode::Begin | OpCode::End | OpCode::Com | OpCode::CSkip | OpCode::Pri => None,
            OpCode::Inv => {
                next_inv += 1;
                Some(x[next_inv - 1][..cols].to_vec())
            }
            OpCode::Par => Some(constant(par(0), cols)),
            OpCode::AddVV => Some(zip_with(&row(&t, 0), &row(&t, 1), |u, v| u + v)),
            OpCode::AddPV => {
                let mut z = row(&t, 1);
                z[0] += par(0);
                Some(z)
            }
            OpCode::SubVV => Some(zip_with(&row(&t, 0), &row(&t, 1), |u, v| u - v)),
            OpCode::SubPV => {
                let mut z = scale(&row(&t, 1), -1.0);
                z[0] += par(0);
                Some(z)
            }
            OpCode::SubVP => {
                let mut z = row(&t, 0);
                z[0] -= par(1);
                Some(z)
            }
            OpCode::MulVV => Some(mul(&row(&t, 0), &row(&t, 1))),
            OpCode::MulPV => Some(scale(&row(&t, 1), par(0))),
            OpCode::DivVV => Some(div(&row(&t, 0), &row(&t, 1))),
            OpCode::DivPV => Some(div(&constant(par(0), cols), &row(&t, 1))),
            OpCode::DivVP => Some(scale(&row(&t, 0), 1.0 / par(1))),
            OpCode::PowVV | OpCode::PowPV | OpCode::PowVP => {
                let z0 = match rec.op {
                    OpCode::PowPV => constant(par(0).ln(), cols),
                    _ => log(&row(&t, 0)),
                };
                let z1 = match rec.op {
                    OpCode::PowVV => mul(&z0, &row(&t, 1)),
                    OpCode::PowPV => scale(&row(&t, 1), z0[0]),
                    _ => scale(&z0, par(1)),
                };
                let z2 = exp(&z1);
                t.row_mut(i_z - 2).copy_from_slice(&z0);
                t.row_mut(i_z - 1).copy_from_slice(&z1);
                Some(z2)
            }
            OpCode::Abs => {
                let xr = row(&t, 0);
                let s = xr.iter().find(|&&v| v != 0.0).map_or(0.0, |v| v.signum());
                Some(scale(&xr, s))
            }
            OpCode::Sign => {
                let v = row(&t, 0)[0];
                let s = if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    -1.0
                } else {
                    0.0
                };
                Some(constant(s, cols))
            }
            OpCode::Exp => Some(exp(&row(&t, 0))),
            OpCode::Log => Some(log(&row(&t, 0))),
            OpCode::Sqrt => Some(sqrt(&row(&t, 0))),
            OpCode::Sin | OpCode::Cos | OpCode::Sinh | OpCode::Cosh | OpCode::Tan | OpCode::Tanh
            | OpCode::Asin | OpCode::Acos | OpCode::Atan => {
                let xr = row(&t, 0);
                let x0 = xr[0];
                let (prim, aux) = match rec.op {
                    OpCode::Sin => coupled(&xr, x0.sin(), x0.cos(), -1.0),
                    OpCode::Cos => {
                        let (s, c) = coupled(&xr, x0.sin(), x0.cos(), -1.0);
                        (c, s)
                    }
                    OpCode::Sinh => coupled(&xr, x0.sinh(), x0.cosh(), 1.0),
                    OpCode::Cosh => {
                        let (s, c) = coupled(&xr, x0.sinh(), x0.cosh(), 1.0);
                        (c, s)
                    }
                    OpCode::Tan => tan_like(&xr, x0.tan(), 1.0),
                    OpCode::Tanh => tan_like(&xr, x0.tanh(), -1.0),
                    OpCode::Asin => asin_like(&xr, x0.asin(), 1.0),
                    OpCode::Acos => asin_like(&xr, x0.acos(), -1.0),
                    _ => atan(&xr),
                };
                t.row_mut(i_z - 1).copy_from_slice(&aux);
                Some(prim)
            }
            OpCode::CExp => {
                let flags = a[1];
                let value = |t: &TaylorMatrix<f64>, bit: Addr, slot: usize| {
                    if flags & bit != 0 {
                        row(t, slot)
                    } else {
                        constant(par(slot), cols)
                    }
                };
                let cmp = CompareOp::from_addr(a[0]).expect("valid comparison");
                let left = value(&t, FLAG_LEFT_VAR, 2)[0];
                let right = value(&t, FLAG_RIGHT_VAR, 3)[0];
                if cmp.holds(left, right) {
                    Some(value(&t, FLAG_TRUE_VAR, 4))
                } else {
                    Some(value(&t, FLAG_FALSE_VAR, 5))
                }
            }
            OpCode::CSum => {
                let (n_add, n_sub) = (a[0] as usize, a[1] as usize);
                let mut z = constant(par(2), cols);
                for (i, &v) in a[3..3 + n_add + n_sub].iter().enumerate() {
                    let s = if i < n_add { 1.0 } else { -1.0 };
                    for (zk, &vk) in z.iter_mut().zip(t.row(v as usize)) {
                        *zk += s * vk;
                    }
                }
                Some(z)
            }
            OpCode::Dis => Some(constant(row(&t, 1)[0].floor(), cols)),
            OpCode::Stpp | OpCode::Stpv | OpCode::Stvp | OpCode::Stvv => {
                let index = match rec.op {
                    OpCode::Stpp | OpCode::Stpv => par(1),
                    _ => row(&t, 1)[0],
                };
                let cell = match rec.op {
                    OpCode::Stpp | OpCode::Stvp => Cell::Par(par(2)),
                    _ => Cell::Var(a[2] as usize),
                };
                memory.insert(a[0] as usize + index as usize, cell);
                None
            }
            OpCode::Ldp | OpCode::Ldv => {
                let index = match rec.op {
                    OpCode::Ldp => par(1),
                    _ => row(&t, 1)[0],
                };
                let slot = a[2] as usize;
                match memory.get(&(a[0] as usize + index as usize)) {
                    Some(&Cell::Var(v)) => {
                        load_map[slot] = v as Addr;
                        Some(t.row(v).to_vec())
                    }
                    Some(&Cell::Par(p)) => Some(constant(p, cols)),
                    None => Some(constant(0.0, cols)),
                }
            }
            OpCode::Atomic => {
                match call.take() {
                    None => {
                        call = Some(Call {
                            id: a[0],
                            m: a[3] as usize,
                            tx: Vec::new(),
                            ty: None,
                            next_result: 0,
                        })
                    }
                    Some(c) if c.ty.is_none() && c.m > 0 => panic!("atomic call closed before its results"),
                    Some(_) => {}
                }
                None
            }
            OpCode::AtomicArgVar | OpCode::AtomicArgPar => {
                let coeffs = if rec.op == OpCode::AtomicArgVar {
                    row(&t, 0)
                } else {
                    constant(par(0), cols)
                };
                call.as_mut().expect("argument outside atomic call").tx.extend(coeffs);
                None
            }
            OpCode::AtomicResVar | OpCode::AtomicResPar => {
                let c = call.as_mut().expect("result outside atomic call");
                if c.ty.is_none() {
                    c.ty = Some(atomic(c.id, &c.tx, cols, c.m));
                }
                let i = c.next_result;
                c.next_result += 1;
                let ty = c.ty.as_ref().expect("computed above");
                (rec.op == OpCode::AtomicResVar).then(|| ty[i * cols..(i + 1) * cols].to_vec())
            }
        };

        if let Some(z) = single {
            t.row_mut(i_z).copy_from_slice(&z);
        }
    }

    Forward { taylor: t, load_map }
}

// ══════════════════════════════════════════════
//  Dependency marking
// ══════════════════════════════════════════════

/// Records that can influence any of `dependents`.
///
/// Atomic brackets are kept or dropped as a whole; loads follow `load_map`.
pub fn mark(tape: &Tape<f64>, dependents: &[Addr], load_map: &[Addr]) -> Vec<usize> {
    let mut needed = vec![false; tape.num_var()];
    for &d in dependents {
        needed[d as usize] = true;
    }
    let mut marked = Vec::new();
    let mut bracket = Vec::new();
    let mut bracket_args = Vec::new();
    let mut open = false;
    let mut relevant = false;

    for rec in tape.reverse_cursor() {
        if rec.op.is_atomic() {
            bracket.push(rec.op_index);
            match rec.op {
                OpCode::Atomic if !open => {
                    open = true;
                    relevant = false;
                }
                OpCode::Atomic => {
                    open = false;
                    if relevant {
                        marked.append(&mut bracket);
                        for v in bracket_args.drain(..) {
                            needed[v] = true;
                        }
                    }
                    bracket.clear();
                    bracket_args.clear();
                }
                OpCode::AtomicResVar => relevant |= needed[rec.var_index],
                OpCode::AtomicArgVar => bracket_args.push(rec.args[0] as usize),
                _ => {}
            }
            continue;
        }

        let nres = rec.op.num_res();
        if nres == 0 || rec.op == OpCode::Begin {
            continue;
        }
        let first = rec.var_index + 1 - nres;
        if !(first..=rec.var_index).any(|v| needed[v]) {
            continue;
        }
        marked.push(rec.op_index);
        for_each_variable_arg(rec.op, rec.args, |v| needed[v as usize] = true);
        if matches!(rec.op, OpCode::Ldp | OpCode::Ldv) {
            let source = load_map[rec.args[2] as usize] as usize;
            if source > 0 {
                needed[source] = true;
            }
        }
    }
    marked
}

/// Dead-code skip mask for all dependents of `tape`.
pub fn skip_mask(tape: &Tape<f64>, load_map: &[Addr]) -> Vec<bool> {
    let mut skip = vec![true; tape.num_ops()];
    skip[0] = false;
    for i in mark(tape, tape.dependents(), load_map) {
        skip[i] = false;
    }
    skip
}

// ══════════════════════════════════════════════
//  Finite differences
// ══════════════════════════════════════════════

/// Deterministic input coefficients: `x_j[0] = base[j]`, small alternating higher orders.
pub fn taylor_inputs(base: &[f64], cols: usize) -> Vec<Vec<f64>> {
    base.iter()
        .enumerate()
        .map(|(j, &b)| {
            (0..cols)
                .map(|k| {
                    if k == 0 {
                        b
                    } else {
                        let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
                        sign * 0.4 / (k + j + 1) as f64
                    }
                })
                .collect()
        })
        .collect()
}

/// `Σ w_i · y_i[order]` at inputs `x`.
pub fn weighted_output(
    tape: &Tape<f64>,
    x: &[Vec<f64>],
    order: usize,
    weights: &[f64],
    atomic: AtomicForward<'_>,
) -> f64 {
    let f = forward(tape, x, order + 1, atomic);
    tape.dependents()
        .iter()
        .zip(weights)
        .map(|(&dep, &w)| w * f.taylor.row(dep as usize)[order])
        .sum()
}

/// Central differences of [`weighted_output`] with respect to every input coefficient.
pub fn fd_partials(
    tape: &Tape<f64>,
    x: &[Vec<f64>],
    order: usize,
    weights: &[f64],
    atomic: AtomicForward<'_>,
) -> Vec<Vec<f64>> {
    let h = 1e-6;
    (0..x.len())
        .map(|j| {
            (0..=order)
                .map(|k| {
                    let mut xp = x.to_vec();
                    let mut xm = x.to_vec();
                    xp[j][k] += h;
                    xm[j][k] -= h;
                    let fp = weighted_output(tape, &xp, order, weights, atomic);
                    let fm = weighted_output(tape, &xm, order, weights, atomic);
                    (fp - fm) / (2.0 * h)
                })
                .collect()
        })
        .collect()
}

pub fn assert_rows_close(actual: &[Vec<f64>], expected: &[Vec<f64>], tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (j, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a.len(), e.len(), "row {j}");
        for (k, (&av, &ev)) in a.iter().zip(e).enumerate() {
            assert!(
                (av - ev).abs() <= tol * (1.0 + ev.abs()),
                "row {j} order {k}: got {av}, expected {ev}"
            );
        }
    }
}

pub fn assert_slices_eq(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (&a, &e) in actual.iter().zip(expected) {
        assert_relative_eq!(a, e, epsilon = 1e-12, max_relative = 1e-12);
    }
}

// ══════════════════════════════════════════════
//  Mock atomic operations
// ══════════════════════════════════════════════

/// Forward pass of the element-wise square atomic: `y_i = x_i²`.
pub fn square_forward(_id: Addr, tx: &[f64], cols: usize, m: usize) -> Vec<f64> {
    (0..m)
        .flat_map(|i| mul(&tx[i * cols..(i + 1) * cols], &tx[i * cols..(i + 1) * cols]))
        .collect()
}

/// Element-wise square, reverse mode.
pub struct Square;

impl AtomicOp<f64> for Square {
    fn reverse(&self, _instance: Addr, order: usize, tx: &[f64], _ty: &[f64], px: &mut [f64], py: &[f64]) -> bool {
        let k1 = order + 1;
        for i in 0..tx.len() / k1 {
            let (x, p, w) = (&tx[i * k1..], &mut px[i * k1..(i + 1) * k1], &py[i * k1..]);
            for k in 0..=order {
                for l in 0..=k {
                    p[l] += 2.0 * w[k] * x[k - l];
                }
            }
        }
        true
    }
}

/// Atomic operation whose reverse pass always fails.
pub struct Failing;

impl AtomicOp<f64> for Failing {
    fn reverse(&self, _: Addr, _: usize, _: &[f64], _: &[f64], _: &mut [f64], _: &[f64]) -> bool {
        false
    }
}
