#![allow(dead_code)]

use tapesweep::{Addr, OpCode, Tape, TaylorMatrix};

// ─── Tape generators ───────────────────────────────────────────────────────

/// Extended Rosenbrock: one dependent per term, plus their sum as the last dependent.
pub fn rosenbrock_tape(n: usize) -> Tape<f64> {
    let mut b = Tape::<f64>::builder();
    let x: Vec<Addr> = (0..n).map(|_| b.independent()).collect();
    let one = b.parameter(1.0);
    let hundred = b.parameter(100.0);
    let zero = b.parameter(0.0);

    let mut terms = Vec::with_capacity(n - 1);
    for i in 0..n - 1 {
        let t1 = b.push(OpCode::SubPV, &[one, x[i]]);
        let sq = b.push(OpCode::MulVV, &[x[i], x[i]]);
        let t2 = b.push(OpCode::SubVV, &[x[i + 1], sq]);
        let a = b.push(OpCode::MulVV, &[t1, t1]);
        let c = b.push(OpCode::MulVV, &[t2, t2]);
        let c = b.push(OpCode::MulPV, &[hundred, c]);
        terms.push(b.push(OpCode::AddVV, &[a, c]));
    }
    let total = b.csum(zero, &terms, &[]);
    let mut deps = terms;
    deps.push(total);
    b.finish(&deps).expect("rosenbrock tape is well formed")
}

/// `exp(exp(...exp(x)...))` scaled down each step so values stay finite.
pub fn exp_chain_tape(depth: usize) -> Tape<f64> {
    let mut b = Tape::<f64>::builder();
    let x = b.independent();
    let scale = b.parameter(0.5);
    let mut v = x;
    for _ in 0..depth {
        let e = b.push(OpCode::Exp, &[v]);
        v = b.push(OpCode::MulPV, &[scale, e]);
    }
    b.finish(&[v]).expect("exp chain tape is well formed")
}

pub fn make_input(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.01 * i as f64).collect()
}

// ─── Forward fill ──────────────────────────────────────────────────────────

/// Taylor coefficients for the opcodes the generators above record.
///
/// Independent `j` gets `[x_j, 1, 0, ...]`.
pub fn forward_fill(tape: &Tape<f64>, x: &[f64], cols: usize) -> TaylorMatrix<f64> {
    let mut t = TaylorMatrix::zeros(tape.num_var(), cols);
    let par = tape.parameters();
    let mut next_inv = 0;

    for rec in tape.records() {
        let a = rec.args;
        let row = |t: &TaylorMatrix<f64>, v: Addr| t.row(v as usize).to_vec();
        let z: Vec<f64> = match rec.op {
            OpCode::Begin | OpCode::End => continue,
            OpCode::Inv => {
                let mut r = vec![0.0; cols];
                r[0] = x[next_inv];
                if cols > 1 {
                    r[1] = 1.0;
                }
                next_inv += 1;
                r
            }
            OpCode::AddVV => zip(&row(&t, a[0]), &row(&t, a[1]), |p, q| p + q),
            OpCode::SubVV => zip(&row(&t, a[0]), &row(&t, a[1]), |p, q| p - q),
            OpCode::SubPV => {
                let mut r: Vec<f64> = row(&t, a[1]).iter().map(|v| -v).collect();
                r[0] += par[a[0] as usize];
                r
            }
            OpCode::MulPV => row(&t, a[1]).iter().map(|v| par[a[0] as usize] * v).collect(),
            OpCode::MulVV => {
                let (p, q) = (row(&t, a[0]), row(&t, a[1]));
                (0..cols).map(|k| (0..=k).map(|j| p[j] * q[k - j]).sum()).collect()
            }
            OpCode::Exp => {
                let p = row(&t, a[0]);
                let mut r = vec![0.0; cols];
                r[0] = p[0].exp();
                for k in 1..cols {
                    r[k] = (1..=k).map(|j| j as f64 * p[j] * r[k - j]).sum::<f64>() / k as f64;
                }
                r
            }
            OpCode::CSum => {
                let (n_add, n_sub) = (a[0] as usize, a[1] as usize);
                let mut r = vec![0.0; cols];
                r[0] = par[a[2] as usize];
                for (i, &v) in a[3..3 + n_add + n_sub].iter().enumerate() {
                    let sign = if i < n_add { 1.0 } else { -1.0 };
                    for (rk, vk) in r.iter_mut().zip(t.row(v as usize)) {
                        *rk += sign * vk;
                    }
                }
                r
            }
            op => panic!("forward_fill does not handle {op:?}"),
        };
        t.row_mut(rec.var_index).copy_from_slice(&z);
    }
    t
}

fn zip(p: &[f64], q: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    p.iter().zip(q).map(|(&a, &b)| f(a, b)).collect()
}

/// Dead-code mask that keeps every record (for measuring mask overhead).
pub fn keep_all(tape: &Tape<f64>) -> Vec<bool> {
    vec![false; tape.num_ops()]
}
