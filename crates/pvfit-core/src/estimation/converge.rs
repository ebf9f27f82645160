//! Convergence diagnostics of the refinement loop.
//!
//! Each iteration compares modeled and measured Imp, Vmp and Pmp over the
//! usable curves as percent errors, summarizes them, and measures how much
//! the spread statistics moved since the previous iteration. The loop stops
//! once every relative change falls below the tolerance.

use crate::domain::{EstimationResult, MaxPowerPrediction, ensure_aligned};
use crate::numerics::{mean, sample_std};

/// Summary of one percent-error vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorStats {
    pub max: f64,
    pub min: f64,
    pub abs_max: f64,
    pub mean: f64,
    pub std: f64,
}

impl ErrorStats {
    fn from_percent_errors(errors: &[f64]) -> Self {
        let mut max = f64::NAN;
        let mut min = f64::NAN;
        let mut abs_max = f64::NAN;
        for &error in errors {
            max = if max.is_nan() { error } else { max.max(error) };
            min = if min.is_nan() { error } else { min.min(error) };
            let magnitude = error.abs();
            abs_max = if abs_max.is_nan() {
                magnitude
            } else {
                abs_max.max(magnitude)
            };
        }

        Self {
            max,
            min,
            abs_max,
            mean: mean(errors),
            std: sample_std(errors),
        }
    }
}

/// Relative changes of the spread statistics versus the previous iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatChanges {
    pub std: f64,
    pub mean: f64,
    pub abs_max: f64,
}

impl StatChanges {
    const FIRST_ITERATION: Self = Self {
        std: f64::INFINITY,
        mean: f64::INFINITY,
        abs_max: f64::INFINITY,
    };

    fn between(previous: &ErrorStats, current: &ErrorStats) -> Self {
        Self {
            std: ((current.std - previous.std) / previous.std).abs(),
            mean: ((current.mean - previous.mean) / previous.mean).abs(),
            abs_max: ((current.abs_max - previous.abs_max) / previous.abs_max).abs(),
        }
    }
}

/// The per-iteration convergence record carried across the refinement loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceRecord {
    pub iteration: usize,
    pub imp: ErrorStats,
    pub vmp: ErrorStats,
    pub pmp: ErrorStats,
    pub imp_change: StatChanges,
    pub vmp_change: StatChanges,
    pub pmp_change: StatChanges,
}

impl ConvergenceRecord {
    /// The nine relative-change metrics of the stopping test.
    pub fn changes(&self) -> [f64; 9] {
        [
            self.imp_change.std,
            self.vmp_change.std,
            self.pmp_change.std,
            self.imp_change.mean,
            self.vmp_change.mean,
            self.pmp_change.mean,
            self.imp_change.abs_max,
            self.vmp_change.abs_max,
            self.pmp_change.abs_max,
        ]
    }

    /// True while any change metric still meets or exceeds the tolerance.
    pub fn still_moving(&self, tolerance: f64) -> bool {
        self.changes().iter().any(|&change| change >= tolerance)
    }
}

/// Computes the convergence record for the current iteration.
///
/// `previous` is None on the first iteration, which defines all nine
/// relative changes as +infinity so the loop can never stop there.
pub fn check_converge(
    previous: Option<&ConvergenceRecord>,
    prediction: &MaxPowerPrediction,
    vmp_measured: &[f64],
    imp_measured: &[f64],
    iteration: usize,
) -> EstimationResult<ConvergenceRecord> {
    let count = prediction.len();
    ensure_aligned("v_mp", count, prediction.v_mp.len())?;
    ensure_aligned("p_mp", count, prediction.p_mp.len())?;
    ensure_aligned("vmp measurements", count, vmp_measured.len())?;
    ensure_aligned("imp measurements", count, imp_measured.len())?;

    let mut imp_errors = Vec::with_capacity(count);
    let mut vmp_errors = Vec::with_capacity(count);
    let mut pmp_errors = Vec::with_capacity(count);
    for j in 0..count {
        let pmp_measured = imp_measured[j] * vmp_measured[j];
        imp_errors.push((prediction.i_mp[j] - imp_measured[j]) / imp_measured[j] * 100.0);
        vmp_errors.push((prediction.v_mp[j] - vmp_measured[j]) / vmp_measured[j] * 100.0);
        pmp_errors.push((prediction.p_mp[j] - pmp_measured) / pmp_measured * 100.0);
    }

    let imp = ErrorStats::from_percent_errors(&imp_errors);
    let vmp = ErrorStats::from_percent_errors(&vmp_errors);
    let pmp = ErrorStats::from_percent_errors(&pmp_errors);

    let (imp_change, vmp_change, pmp_change) = match previous {
        Some(previous) => (
            StatChanges::between(&previous.imp, &imp),
            StatChanges::between(&previous.vmp, &vmp),
            StatChanges::between(&previous.pmp, &pmp),
        ),
        None => (
            StatChanges::FIRST_ITERATION,
            StatChanges::FIRST_ITERATION,
            StatChanges::FIRST_ITERATION,
        ),
    };

    Ok(ConvergenceRecord {
        iteration,
        imp,
        vmp,
        pmp,
        imp_change,
        vmp_change,
        pmp_change,
    })
}
