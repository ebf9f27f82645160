//! Initial single-diode parameters for one IV curve by the co-content
//! integral method.
//!
//! The co-content CC(V) = integral of (Isc - I) dV' from 0 to V of a
//! single-diode curve is an exact quadratic form in V and dI = I - Isc:
//!
//!   CC = b0*V + b1*dI + b2*V*dI + b3*V^2 + b4*dI^2
//!
//! with b2 = Gsh*Rs, b3 = Gsh/2, b4 = (Rs/2)*(1 + Gsh*Rs) and
//! b1 = Rs*b0 - a, a the modified ideality voltage. Regressing the
//! numerically integrated co-content on those five regressors therefore
//! recovers Rsh, Rs and a in closed form; Io and Iph follow from the diode
//! equation evaluated at Voc and Isc.

use crate::numerics::linalg::{DenseMatrix, solve_least_squares};

const REGRESSOR_COUNT: usize = 5;

/// Per-curve initial estimate. Any field can be NaN when the curve does not
/// support the regression (too few points, degenerate design); the driver's
/// quality filter is the containment mechanism.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleDiodeCurveEstimate {
    pub io: f64,
    pub iph: f64,
    pub rs: f64,
    pub rsh: f64,
    pub n: f64,
}

impl SingleDiodeCurveEstimate {
    fn indeterminate() -> Self {
        Self {
            io: f64::NAN,
            iph: f64::NAN,
            rs: f64::NAN,
            rsh: f64::NAN,
            n: f64::NAN,
        }
    }
}

/// Extracts (Io, Iph, Rs, Rsh, n) from one rectified curve.
///
/// Expects the rectified form produced upstream: voltage strictly
/// ascending, first point (0, Isc), last point (Voc, 0). `nsvth` is the
/// thermal voltage scaled by the series cell count; the returned `n` is the
/// ideality factor such that a = n * nsvth.
pub fn estimate_curve_parameters(
    current: &[f64],
    voltage: &[f64],
    nsvth: f64,
) -> SingleDiodeCurveEstimate {
    let n_points = current.len().min(voltage.len());
    if n_points < REGRESSOR_COUNT {
        return SingleDiodeCurveEstimate::indeterminate();
    }

    let isc = current[0];
    let voc = voltage[n_points - 1];
    let cocontent = cumulative_cocontent(&current[..n_points], &voltage[..n_points], isc);

    let mut design = DenseMatrix::zeros(n_points, REGRESSOR_COUNT);
    for row in 0..n_points {
        let v = voltage[row];
        let di = current[row] - isc;
        design[(row, 0)] = v;
        design[(row, 1)] = di;
        design[(row, 2)] = v * di;
        design[(row, 3)] = v * v;
        design[(row, 4)] = di * di;
    }

    let beta = match solve_least_squares(&design, &cocontent) {
        Ok(beta) => beta,
        Err(_) => return SingleDiodeCurveEstimate::indeterminate(),
    };

    let gsh = 2.0 * beta[3];
    let rsh = 1.0 / gsh;
    let rs = beta[2] / gsh;
    let a = rs * beta[0] - beta[1];
    let n = a / nsvth;

    let io = (isc - voc / rsh) * (-voc / a).exp();
    let iph = isc - io + io * (isc * rs / a).exp() + isc * rs / rsh;

    SingleDiodeCurveEstimate {
        io,
        iph,
        rs,
        rsh,
        n,
    }
}

fn cumulative_cocontent(current: &[f64], voltage: &[f64], isc: f64) -> Vec<f64> {
    let mut cocontent = vec![0.0; current.len()];
    let mut accumulated = 0.0;
    for index in 1..current.len() {
        let left = isc - current[index - 1];
        let right = isc - current[index];
        accumulated += 0.5 * (left + right) * (voltage[index] - voltage[index - 1]);
        cocontent[index] = accumulated;
    }
    cocontent
}
