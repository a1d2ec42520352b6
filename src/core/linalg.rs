//! core/linalg.rs - Dense symmetric solvers: Cholesky solve and Jacobi eigen-decomposition.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{CollusionError, Result};

/// Solve `a · x = rhs` for symmetric positive (semi-)definite `a`.
///
/// Near-zero pivots are floored so rank-deficient systems still yield a
/// finite solution.
pub fn cholesky_solve(a: ArrayView2<'_, f64>, rhs: ArrayView1<'_, f64>) -> Array1<f64> {
    let k = a.nrows();
    debug_assert_eq!(a.ncols(), k);
    debug_assert_eq!(rhs.len(), k);

    // a = L · L^T
    let mut l = Array2::<f64>::zeros((k, k));
    for i in 0..k {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for p in 0..j {
                sum -= l[[i, p]] * l[[j, p]];
            }
            if i == j {
                l[[i, j]] = if sum > 1e-12 { sum.sqrt() } else { 1e-6 };
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // L · y = rhs
    let mut y = Array1::<f64>::zeros(k);
    for i in 0..k {
        let mut sum = rhs[i];
        for j in 0..i {
            sum -= l[[i, j]] * y[j];
        }
        y[i] = sum / l[[i, i]];
    }

    // L^T · x = y
    let mut x = Array1::<f64>::zeros(k);
    for i in (0..k).rev() {
        let mut sum = y[i];
        for j in (i + 1)..k {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Eigen-decomposition of a symmetric matrix.
#[derive(Clone, Debug)]
pub struct SymmetricEigen {
    /// Eigenvalues, descending.
    pub values: Array1<f64>,
    /// Eigenvectors as columns, matching `values`.
    pub vectors: Array2<f64>,
    pub sweeps: usize,
}

/// Cyclic Jacobi rotation. Fails with `ConvergenceFailure` when the
/// off-diagonal mass is still above tolerance after `max_sweeps`.
pub fn symmetric_eigen(a: ArrayView2<'_, f64>, max_sweeps: usize) -> Result<SymmetricEigen> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(CollusionError::invalid(format!(
            "eigen-decomposition needs a square matrix, got {}x{}",
            n,
            a.ncols()
        )));
    }
    let mut m = a.to_owned();
    let mut v = Array2::<f64>::eye(n);

    let scale = m.iter().map(|x| x * x).sum::<f64>().sqrt().max(f64::MIN_POSITIVE);
    let tol = 1e-12 * scale;

    let mut sweeps = 0usize;
    let mut residual = off_diagonal_norm(&m);
    while residual > tol {
        if sweeps >= max_sweeps {
            return Err(CollusionError::ConvergenceFailure { sweeps, residual });
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[[p, q]];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                rotate(&mut m, &mut v, p, q, c, s);
            }
        }
        sweeps += 1;
        residual = off_diagonal_norm(&m);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[[j, j]].total_cmp(&m[[i, i]]));
    let values = Array1::from_iter(order.iter().map(|&i| m[[i, i]]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    Ok(SymmetricEigen {
        values,
        vectors,
        sweeps,
    })
}

fn rotate(m: &mut Array2<f64>, v: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    let n = m.nrows();
    for k in 0..n {
        let mkp = m[[k, p]];
        let mkq = m[[k, q]];
        m[[k, p]] = c * mkp - s * mkq;
        m[[k, q]] = s * mkp + c * mkq;
    }
    for k in 0..n {
        let mpk = m[[p, k]];
        let mqk = m[[q, k]];
        m[[p, k]] = c * mpk - s * mqk;
        m[[q, k]] = s * mpk + c * mqk;
    }
    for k in 0..n {
        let vkp = v[[k, p]];
        let vkq = v[[k, q]];
        v[[k, p]] = c * vkp - s * vkq;
        v[[k, q]] = s * vkp + c * vkq;
    }
}

fn off_diagonal_norm(m: &Array2<f64>) -> f64 {
    let n = m.nrows();
    let mut sum = 0.0f64;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                sum += m[[i, j]] * m[[i, j]];
            }
        }
    }
    sum.sqrt()
}
