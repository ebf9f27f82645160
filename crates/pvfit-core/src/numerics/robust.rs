//! Robust straight-line regression by iteratively reweighted least squares
//! with Huber weights.
//!
//! This is not a general regression facility: the estimation needs exactly
//! one robust fit, log(Io) against the inverse-temperature regressor, where
//! individual curves can carry gross dark-current outliers that an ordinary
//! fit would chase.

use crate::numerics::median;

const HUBER_TUNING: f64 = 1.345;
const MAD_TO_SIGMA: f64 = 0.674_489_750_196_081_7;
const IRLS_MAX_ITER: usize = 50;
const IRLS_COEFFICIENT_TOL: f64 = 1.0e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustLineFit {
    pub intercept: f64,
    pub slope: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RobustFitError {
    #[error("robust fit input length mismatch: x={x_len}, y={y_len}")]
    LengthMismatch { x_len: usize, y_len: usize },
    #[error("robust fit requires at least 2 points, got {actual}")]
    InsufficientPoints { actual: usize },
    #[error("robust fit design is degenerate (all abscissae equal)")]
    DegenerateDesign,
}

/// Fits y = intercept + slope * x, downweighting outliers with the Huber
/// psi function (tuning constant 1.345, MAD residual scale).
pub fn robust_line_fit(x: &[f64], y: &[f64]) -> Result<RobustLineFit, RobustFitError> {
    if x.len() != y.len() {
        return Err(RobustFitError::LengthMismatch {
            x_len: x.len(),
            y_len: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(RobustFitError::InsufficientPoints { actual: x.len() });
    }

    let mut weights = vec![1.0; x.len()];
    let (mut intercept, mut slope) = weighted_line(x, y, &weights)?;

    let mut iterations = 0;
    for iteration in 1..=IRLS_MAX_ITER {
        iterations = iteration;

        let residuals: Vec<f64> = x
            .iter()
            .zip(y)
            .map(|(&xi, &yi)| yi - intercept - slope * xi)
            .collect();
        let absolute: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let scale = median(&absolute) / MAD_TO_SIGMA;
        if !(scale > 0.0) {
            // Exact fit (or indeterminate residuals): nothing to reweight.
            break;
        }

        let threshold = HUBER_TUNING * scale;
        for (weight, residual) in weights.iter_mut().zip(&residuals) {
            let magnitude = residual.abs();
            *weight = if magnitude <= threshold {
                1.0
            } else {
                threshold / magnitude
            };
        }

        let (next_intercept, next_slope) = weighted_line(x, y, &weights)?;
        let moved = (next_intercept - intercept).abs().max((next_slope - slope).abs());
        intercept = next_intercept;
        slope = next_slope;
        if moved <= IRLS_COEFFICIENT_TOL * (1.0 + intercept.abs().max(slope.abs())) {
            break;
        }
    }

    Ok(RobustLineFit {
        intercept,
        slope,
        iterations,
    })
}

fn weighted_line(x: &[f64], y: &[f64], weights: &[f64]) -> Result<(f64, f64), RobustFitError> {
    let mut sw = 0.0;
    let mut swx = 0.0;
    let mut swy = 0.0;
    let mut swxx = 0.0;
    let mut swxy = 0.0;
    for ((&xi, &yi), &wi) in x.iter().zip(y).zip(weights) {
        sw += wi;
        swx += wi * xi;
        swy += wi * yi;
        swxx += wi * xi * xi;
        swxy += wi * xi * yi;
    }

    let determinant = sw * swxx - swx * swx;
    if !(determinant.abs() > 0.0) || !determinant.is_finite() {
        return Err(RobustFitError::DegenerateDesign);
    }

    let intercept = (swxx * swy - swx * swxy) / determinant;
    let slope = (sw * swxy - swx * swy) / determinant;
    Ok((intercept, slope))
}

#[cfg(test)]
mod tests {
    use super::{RobustFitError, robust_line_fit};

    #[test]
    fn exact_line_is_recovered_without_reweighting() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 1.5 - 0.25 * v).collect();
        let fit = robust_line_fit(&x, &y).expect("fit");
        assert!((fit.intercept - 1.5).abs() <= 1.0e-10);
        assert!((fit.slope + 0.25).abs() <= 1.0e-10);
    }

    #[test]
    fn gross_outliers_are_downweighted() {
        // y = 2 + x with two gross outliers; an ordinary fit would be pulled
        // far off the clean coefficients.
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let mut y: Vec<f64> = x.iter().map(|&v| 2.0 + v).collect();
        y[3] += 40.0;
        y[15] -= 60.0;

        let fit = robust_line_fit(&x, &y).expect("fit");
        assert!(
            (fit.intercept - 2.0).abs() <= 0.15,
            "intercept {} too far from 2",
            fit.intercept
        );
        assert!(
            (fit.slope - 1.0).abs() <= 0.05,
            "slope {} too far from 1",
            fit.slope
        );
    }

    #[test]
    fn shape_and_degeneracy_errors_are_structured() {
        assert_eq!(
            robust_line_fit(&[1.0], &[1.0, 2.0]).expect_err("length"),
            RobustFitError::LengthMismatch { x_len: 1, y_len: 2 }
        );
        assert_eq!(
            robust_line_fit(&[1.0], &[1.0]).expect_err("count"),
            RobustFitError::InsufficientPoints { actual: 1 }
        );
        assert_eq!(
            robust_line_fit(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).expect_err("degenerate"),
            RobustFitError::DegenerateDesign
        );
    }
}
