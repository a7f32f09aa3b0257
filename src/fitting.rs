//! Bounded-iteration nonlinear least squares.
//!
//! Levenberg–Marquardt with Marquardt's diagonal scaling, for the small
//! (two to four parameter) models used by the pump-down and leak analyzers.
//! The iteration budget is fixed, so a call always terminates; running out
//! of budget is reported through [`FitOutcome::converged`], not as an error.
//!
//! # Algorithm
//!
//! Each iteration solves
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr
//! ```
//!
//! by Cholesky factorization and accepts `p + δ` if it lowers the residual
//! sum of squares, dividing λ by 10; otherwise λ is multiplied by 10 and the
//! step retried. When no damping yields a descent, the fit counts as
//! converged only if the residual is orthogonal to every Jacobian column,
//! or is negligible against the observations:
//!
//! ```text
//! max_a |J_aᵀr| / (‖J_a‖·‖r‖) ≤ √tolerance    or    ‖r‖² ≤ tolerance·‖y‖²
//! ```
//!
//! # References
//!
//! - Marquardt, D.W. (1963). "An Algorithm for Least-Squares Estimation of
//!   Nonlinear Parameters", *SIAM J. Appl. Math.* 11(2), pp. 431-441.
//! - Moré, J.J. (1978). "The Levenberg-Marquardt Algorithm: Implementation
//!   and Theory", *Numerical Analysis*, LNM 630, pp. 105-116.

use u_numflow::matrix::Matrix;
use u_numflow::stats;

/// Maximum Levenberg–Marquardt iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Relative tolerance on the parameter step and on the cost reduction.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;

/// A model `y = f(x; p)` with an analytic Jacobian.
pub trait Model {
    /// Number of parameters.
    fn n_params(&self) -> usize;

    /// Model value at `x`.
    fn eval(&self, x: f64, params: &[f64]) -> f64;

    /// Partial derivatives ∂f/∂pᵢ at `x`, written into `out`.
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]);
}

/// Iteration budget and stopping tolerance.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Outcome of a fit. Always populated, even when not converged.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Final parameters (the best found, not necessarily optimal).
    pub params: Vec<f64>,
    /// Residual sum of squares at `params`.
    pub sse: f64,
    /// Coefficient of determination against the observations, in [0, 1].
    pub r_squared: f64,
    /// Iterations used.
    pub iterations: usize,
    /// Whether a stopping criterion was met within the budget.
    pub converged: bool,
}

/// Fits `model` to `(x, y)` starting from `initial`.
///
/// Returns a non-converged outcome (carrying `initial`) when the inputs are
/// unusable: mismatched lengths, fewer points than parameters, or a
/// non-finite starting cost.
pub fn levenberg_marquardt<M: Model>(
    model: &M,
    x: &[f64],
    y: &[f64],
    initial: &[f64],
    options: FitOptions,
) -> FitOutcome {
    let k = model.n_params();
    let mut params = initial.to_vec();
    let mut cost = sse(model, x, y, &params);

    if x.len() != y.len() || x.len() < k || initial.len() != k || !cost.is_finite() {
        return outcome(y, params, cost, 0, false);
    }

    let mut lambda = LAMBDA_INIT;
    let mut grad = vec![0.0; k];
    let mut converged = false;
    let mut iterations = 0;

    while iterations < options.max_iterations {
        iterations += 1;

        // normal equations JᵀJ and Jᵀr
        let mut jtj = vec![0.0; k * k];
        let mut jtr = vec![0.0; k];
        for (&xi, &yi) in x.iter().zip(y) {
            model.gradient(xi, &params, &mut grad);
            let r = yi - model.eval(xi, &params);
            for a in 0..k {
                jtr[a] += grad[a] * r;
                for b in a..k {
                    jtj[a * k + b] += grad[a] * grad[b];
                }
            }
        }
        for a in 0..k {
            for b in 0..a {
                jtj[a * k + b] = jtj[b * k + a];
            }
        }

        if cost <= f64::MIN_POSITIVE {
            converged = true;
            break;
        }

        let mut accepted = None;
        while lambda <= LAMBDA_MAX {
            let mut damped = jtj.clone();
            for a in 0..k {
                let d = jtj[a * k + a].max(1e-300);
                damped[a * k + a] += lambda * d;
            }
            if let Some(step) = damped_step(damped, &jtr, k) {
                let trial: Vec<f64> = params.iter().zip(&step).map(|(p, s)| p + s).collect();
                let trial_cost = sse(model, x, y, &trial);
                if trial_cost.is_finite() && trial_cost < cost {
                    accepted = Some((trial, step, trial_cost));
                    lambda = (lambda / 10.0).max(1e-12);
                    break;
                }
            }
            lambda *= 10.0;
        }

        let Some((trial, step, trial_cost)) = accepted else {
            converged = cost <= options.tolerance * y.iter().map(|v| v * v).sum::<f64>()
                || gradient_cosine(&jtj, &jtr, cost, k) <= options.tolerance.sqrt();
            break;
        };

        let small_step = step
            .iter()
            .zip(&trial)
            .all(|(s, p)| s.abs() <= options.tolerance * (p.abs() + options.tolerance));
        let small_gain = (cost - trial_cost) <= options.tolerance * cost;

        params = trial;
        cost = trial_cost;

        if small_step || small_gain {
            converged = true;
            break;
        }
    }

    outcome(y, params, cost, iterations, converged)
}

fn sse<M: Model>(model: &M, x: &[f64], y: &[f64], params: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - model.eval(xi, params);
            r * r
        })
        .sum()
}

fn outcome(y: &[f64], params: Vec<f64>, sse: f64, iterations: usize, converged: bool) -> FitOutcome {
    FitOutcome {
        r_squared: r_squared(y, sse),
        params,
        sse,
        iterations,
        converged,
    }
}

/// R² = 1 − SSE/SST, clamped to [0, 1]; 0 when undefined.
pub(crate) fn r_squared(y: &[f64], sse: f64) -> f64 {
    let Some(mean) = stats::mean(y) else {
        return 0.0;
    };
    if !sse.is_finite() {
        return 0.0;
    }
    let sst: f64 = y.iter().map(|v| (v - mean) * (v - mean)).sum();
    if sst <= 1e-300 {
        return if sse <= 1e-300 { 1.0 } else { 0.0 };
    }
    (1.0 - sse / sst).clamp(0.0, 1.0)
}

/// Solves the damped normal equations. `None` if the system is not
/// positive definite or the step is not finite.
fn damped_step(damped: Vec<f64>, rhs: &[f64], k: usize) -> Option<Vec<f64>> {
    let step = Matrix::new(k, k, damped).ok()?.cholesky_solve(rhs).ok()?;
    step.iter().all(|v| v.is_finite()).then_some(step)
}

/// Largest cosine between the residual and a Jacobian column.
fn gradient_cosine(jtj: &[f64], jtr: &[f64], cost: f64, k: usize) -> f64 {
    let r_norm = cost.sqrt();
    (0..k)
        .map(|a| {
            let denom = jtj[a * k + a].sqrt() * r_norm;
            if denom > 0.0 {
                jtr[a].abs() / denom
            } else {
                0.0
            }
        })
        .fold(0.0, f64::max)
}
