//! Least-squares fitting: a bounded Levenberg-Marquardt solver for the
//! nonlinear tyre and fatigue curves, and an ordinary linear trend.

use linfa::prelude::*;
use linfa_linear::LinearRegression;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::FitError;
use crate::stats;

/// Residual-function evaluation budget, Jacobian columns included.
pub const MAX_EVALUATIONS: usize = 1000;

const COST_EPSILON: f64 = 1e-14;
const REL_TOLERANCE: f64 = 1e-10;
const MAX_LAMBDA: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    pub params: Vec<f64>,
    pub r_squared: Option<f64>,
    pub evaluations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: Option<f64>,
}

fn clamp_params(p: &mut DVector<f64>, lower: &[f64], upper: &[f64]) {
    for (i, v) in p.iter_mut().enumerate() {
        *v = v.clamp(lower[i], upper[i]);
    }
}

fn residuals<F>(model: &F, x: &[f64], y: &[f64], p: &[f64]) -> DVector<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    DVector::from_iterator(x.len(), x.iter().zip(y).map(|(xi, yi)| yi - model(*xi, p)))
}

/// Fits `model(x, params)` to `(x, y)` within the box `[lower, upper]`.
///
/// Each step solves the damped normal equations on a forward-difference
/// Jacobian and projects the trial point back into the box.
///
/// # Arguments
/// * `model` - Curve evaluated at one abscissa with the current parameters
/// * `p0` - Starting parameters (clamped into bounds first)
/// * `lower`, `upper` - Per-parameter bounds; use infinities for free parameters
///
/// # Returns
/// The fitted parameters with their R², or the reason the fit was abandoned
pub fn curve_fit<F>(
    model: F,
    x: &[f64],
    y: &[f64],
    p0: &[f64],
    lower: &[f64],
    upper: &[f64],
) -> Result<CurveFit, FitError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let m = p0.len();
    let n = x.len().min(y.len());
    if n < m.max(1) {
        return Err(FitError::InsufficientData { needed: m.max(1), got: n });
    }
    let (x, y) = (&x[..n], &y[..n]);

    let mut p = DVector::from_column_slice(p0);
    clamp_params(&mut p, lower, upper);

    let mut r = residuals(&model, x, y, p.as_slice());
    let mut cost = r.norm_squared();
    let mut evaluations = 1;
    if !cost.is_finite() {
        return Err(FitError::NonFinite);
    }

    let mut lambda = 1e-3;
    let mut converged = cost <= COST_EPSILON;

    while !converged {
        if evaluations + m + 1 > MAX_EVALUATIONS {
            debug!("curve_fit: budget exhausted at cost {:.3e}", cost);
            return Err(FitError::NonConvergence { evaluations });
        }

        // Forward differences, stepping inward at an upper bound.
        let mut jac = DMatrix::<f64>::zeros(n, m);
        for j in 0..m {
            let mut h = 1e-6 * p[j].abs().max(1e-3);
            if p[j] + h > upper[j] {
                h = -h;
            }
            let mut shifted = p.clone();
            shifted[j] += h;
            for (i, xi) in x.iter().enumerate() {
                let d = (model(*xi, shifted.as_slice()) - model(*xi, p.as_slice())) / h;
                jac[(i, j)] = d;
            }
        }
        evaluations += m;
        if jac.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }

        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let grad = &jt * &r;

        let mut accepted = false;
        while !accepted {
            let mut damped = jtj.clone();
            for k in 0..m {
                damped[(k, k)] += lambda * jtj[(k, k)].max(1e-9);
            }
            let step = match damped.lu().solve(&grad) {
                Some(s) => s,
                None => {
                    lambda *= 10.0;
                    if lambda > MAX_LAMBDA {
                        return Err(FitError::Singular);
                    }
                    continue;
                }
            };

            let mut trial = &p + &step;
            clamp_params(&mut trial, lower, upper);
            if (&trial - &p).norm() <= 1e-15 * (1.0 + p.norm()) {
                // Pinned against the bounds; nothing left to gain.
                converged = true;
                break;
            }

            let trial_r = residuals(&model, x, y, trial.as_slice());
            let trial_cost = trial_r.norm_squared();
            evaluations += 1;

            if trial_cost.is_finite() && trial_cost < cost {
                let improvement = cost - trial_cost;
                p = trial;
                r = trial_r;
                cost = trial_cost;
                lambda = (lambda / 10.0).max(1e-12);
                accepted = true;
                if cost <= COST_EPSILON || improvement <= REL_TOLERANCE * cost {
                    converged = true;
                }
            } else {
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    // No descent direction left: local minimum.
                    converged = true;
                    break;
                }
                if evaluations >= MAX_EVALUATIONS {
                    return Err(FitError::NonConvergence { evaluations });
                }
            }
        }
    }

    let params: Vec<f64> = p.iter().copied().collect();
    let predicted: Vec<f64> = x.iter().map(|xi| model(*xi, &params)).collect();
    Ok(CurveFit {
        r_squared: stats::r_squared(y, &predicted),
        params,
        evaluations,
    })
}

/// Ordinary least-squares line through `(x, y)`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Result<LinearFit, FitError> {
    let n = x.len().min(y.len());
    if n < 2 {
        return Err(FitError::InsufficientData { needed: 2, got: n });
    }
    if stats::variance(&x[..n]) <= 0.0 {
        return Err(FitError::Singular);
    }
    if x[..n].iter().chain(&y[..n]).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let features = Array2::from_shape_vec((n, 1), x[..n].to_vec()).map_err(|_| FitError::Singular)?;
    let targets = Array1::from_vec(y[..n].to_vec());
    let dataset = Dataset::new(features, targets);
    let fitted = LinearRegression::new().fit(&dataset).map_err(|e| {
        debug!("linear_fit: {}", e);
        FitError::Singular
    })?;

    let slope = fitted.params()[0];
    let intercept = fitted.intercept();
    let predicted: Vec<f64> = x[..n].iter().map(|xi| intercept + slope * xi).collect();
    Ok(LinearFit {
        slope,
        intercept,
        r_squared: stats::r_squared(&y[..n], &predicted),
    })
}
