//! Per-curve parameter quality filter.
//!
//! A curve is usable only while its fitted parameters stay physical:
//! non-negative shunt and series resistance, Rs not exceeding Rsh, positive
//! dark current, and a short-circuit current consistent (within 5%) with
//! the linear dependence of Isc on effective irradiance.
//!
//! The Isc-vs-Ee relation is fitted over every curve, including curves
//! already failed by the other checks; only the residual test is
//! curve-specific.

use crate::domain::{EstimationResult, ensure_aligned};

const ISC_RELATIVE_RESIDUAL_LIMIT: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterInput<'a> {
    pub io: &'a [f64],
    pub rsh: &'a [f64],
    pub rs: &'a [f64],
    pub ee: &'a [f64],
    pub isc: &'a [f64],
}

impl<'a> FilterInput<'a> {
    pub fn validate(&self) -> EstimationResult<usize> {
        let expected = self.io.len();
        ensure_aligned("rsh", expected, self.rsh.len())?;
        ensure_aligned("rs", expected, self.rs.len())?;
        ensure_aligned("ee", expected, self.ee.len())?;
        ensure_aligned("isc", expected, self.isc.len())?;
        Ok(expected)
    }
}

/// Recomputes the usability mask from the current parameter vectors.
pub fn filter_params(input: FilterInput<'_>) -> EstimationResult<Vec<bool>> {
    let count = input.validate()?;

    // No-intercept fit of Isc against Ee/1000 across all curves.
    let mut cross = 0.0;
    let mut square = 0.0;
    for j in 0..count {
        let x = input.ee[j] / 1_000.0;
        cross += x * input.isc[j];
        square += x * x;
    }
    let slope = cross / square;

    let mut usable = Vec::with_capacity(count);
    for j in 0..count {
        let rsh = input.rsh[j];
        let rs = input.rs[j];
        let io = input.io[j];

        let bad_rsh = rsh < 0.0 || rsh.is_nan();
        let bad_rs = rs < 0.0 || rs > rsh || rs.is_nan();
        let bad_io = !(io > 0.0);

        let predicted_isc = slope * input.ee[j] / 1_000.0;
        let residual = ((predicted_isc - input.isc[j]) / input.isc[j]).abs();
        let bad_isc = !(residual <= ISC_RELATIVE_RESIDUAL_LIMIT);

        usable.push(!bad_rsh && !bad_rs && !bad_io && !bad_isc);
    }

    Ok(usable)
}
