//! Data model for the PVsyst parameter estimation: measured IV curves,
//! module specifications, tuning options and the fitted parameter set.

pub mod errors;

pub use errors::{EstimationError, EstimationResult, ensure_aligned};

use serde::{Deserialize, Serialize};

/// One measured IV curve with its scalar descriptors.
///
/// `current` and `voltage` are index-aligned raw samples; the curve is
/// cleaned by rectification before any fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvCurve {
    /// Measured current samples (A).
    pub current: Vec<f64>,
    /// Measured voltage samples (V).
    pub voltage: Vec<f64>,
    /// Short-circuit current (A).
    pub isc: f64,
    /// Open-circuit voltage (V).
    pub voc: f64,
    /// Current at the maximum-power point (A).
    pub imp: f64,
    /// Voltage at the maximum-power point (V).
    pub vmp: f64,
    /// Effective irradiance (W/m^2).
    pub ee: f64,
    /// Cell temperature (degrees C).
    pub tc: f64,
}

impl IvCurve {
    pub fn sample_count(&self) -> usize {
        self.current.len()
    }

    /// Measured maximum power (W).
    pub fn pmp(&self) -> f64 {
        self.imp * self.vmp
    }
}

/// The collection of measured curves, index-aligned with every per-curve
/// output array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IvCurveSet {
    pub curves: Vec<IvCurve>,
}

impl IvCurveSet {
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Validates the structural preconditions of the estimation entry
    /// point: a non-empty set and equal-length sample arrays per curve.
    pub fn validate_shape(&self) -> EstimationResult<()> {
        if self.curves.is_empty() {
            return Err(EstimationError::EmptyCurveSet);
        }
        for (index, curve) in self.curves.iter().enumerate() {
            if curve.current.len() != curve.voltage.len() {
                return Err(EstimationError::CurveLengthMismatch {
                    index,
                    current_len: curve.current.len(),
                    voltage_len: curve.voltage.len(),
                });
            }
        }
        Ok(())
    }
}

/// Module-level values constant across all curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpecs {
    /// Number of cells in series.
    pub ns: u32,
    /// Temperature coefficient of Isc (A/degree C).
    pub aisc: f64,
}

impl ModuleSpecs {
    pub fn validate(&self) -> EstimationResult<()> {
        if self.ns == 0 {
            return Err(EstimationError::InvalidSeriesCellCount { ns: self.ns });
        }
        Ok(())
    }
}

/// Tuning for the iterative refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimationOptions {
    /// Maximum number of refinement iterations.
    pub max_iterations: usize,
    /// Stop when the relative change of every convergence statistic falls
    /// below this tolerance.
    pub tolerance: f64,
}

impl Default for EstimationOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            tolerance: 1.0e-3,
        }
    }
}

/// Fitted PVsyst model parameters at standard test conditions, with the
/// per-curve parameter values the fit passed through.
///
/// When `success` is false (the diode-factor regression produced NaN), every
/// scalar is NaN and the per-curve arrays are NaN-filled vectors of the
/// input length with an all-false usability mask; `ns` is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvsystParameterSet {
    /// Light current at STC (A).
    pub il_ref: f64,
    /// Dark current at STC (A).
    pub io_ref: f64,
    /// Effective band gap at STC (eV).
    pub e_g: f64,
    /// Series resistance at STC (ohm).
    pub rs_ref: f64,
    /// Shunt resistance at STC (ohm).
    pub rsh_ref: f64,
    /// Shunt resistance at zero irradiance (ohm).
    pub rsh0: f64,
    /// Exponent of the shunt-resistance irradiance dependence.
    pub rsh_exp: f64,
    /// Diode ideality factor at STC.
    pub gamma_ref: f64,
    /// Temperature coefficient of the diode ideality factor (1/degree C).
    pub mu_gamma: f64,
    /// Number of cells in series.
    pub ns: u32,
    /// Per-curve light current (A).
    pub iph: Vec<f64>,
    /// Per-curve dark current (A).
    pub io: Vec<f64>,
    /// Per-curve series resistance (ohm).
    pub rs: Vec<f64>,
    /// Per-curve shunt resistance (ohm).
    pub rsh: Vec<f64>,
    /// Usability mask: true where the curve's parameters passed every
    /// quality check in the final iteration.
    pub usable: Vec<bool>,
    /// False when the diode-factor regression failed and the parameter set
    /// holds only NaN sentinels.
    pub success: bool,
}

impl PvsystParameterSet {
    /// The all-NaN sentinel returned on the diode-factor failure path.
    pub fn failed(curve_count: usize, ns: u32) -> Self {
        Self {
            il_ref: f64::NAN,
            io_ref: f64::NAN,
            e_g: f64::NAN,
            rs_ref: f64::NAN,
            rsh_ref: f64::NAN,
            rsh0: f64::NAN,
            rsh_exp: f64::NAN,
            gamma_ref: f64::NAN,
            mu_gamma: f64::NAN,
            ns,
            iph: vec![f64::NAN; curve_count],
            io: vec![f64::NAN; curve_count],
            rs: vec![f64::NAN; curve_count],
            rsh: vec![f64::NAN; curve_count],
            usable: vec![false; curve_count],
            success: false,
        }
    }
}

/// Vectorized single-diode model predictions, index-aligned with the curves
/// they were evaluated for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaxPowerPrediction {
    pub i_mp: Vec<f64>,
    pub v_mp: Vec<f64>,
    pub p_mp: Vec<f64>,
    pub v_oc: Vec<f64>,
}

impl MaxPowerPrediction {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            i_mp: Vec::with_capacity(capacity),
            v_mp: Vec::with_capacity(capacity),
            p_mp: Vec::with_capacity(capacity),
            v_oc: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.i_mp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i_mp.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{EstimationError, EstimationOptions, IvCurve, IvCurveSet, ModuleSpecs,
                PvsystParameterSet};

    fn curve(current: Vec<f64>, voltage: Vec<f64>) -> IvCurve {
        IvCurve {
            current,
            voltage,
            isc: 5.0,
            voc: 10.0,
            imp: 4.5,
            vmp: 8.0,
            ee: 1_000.0,
            tc: 25.0,
        }
    }

    #[test]
    fn curve_set_shape_validation_reports_offending_index() {
        let set = IvCurveSet {
            curves: vec![
                curve(vec![5.0, 0.0], vec![0.0, 10.0]),
                curve(vec![5.0, 0.0], vec![0.0]),
            ],
        };
        let error = set.validate_shape().expect_err("mismatch should fail");
        assert_eq!(
            error,
            EstimationError::CurveLengthMismatch {
                index: 1,
                current_len: 2,
                voltage_len: 1,
            }
        );
    }

    #[test]
    fn empty_curve_set_is_rejected() {
        let set = IvCurveSet::default();
        assert_eq!(
            set.validate_shape(),
            Err(EstimationError::EmptyCurveSet)
        );
    }

    #[test]
    fn specs_reject_zero_series_cells() {
        let specs = ModuleSpecs { ns: 0, aisc: 0.004 };
        assert_eq!(
            specs.validate(),
            Err(EstimationError::InvalidSeriesCellCount { ns: 0 })
        );
    }

    #[test]
    fn default_options_match_documented_tuning() {
        let options = EstimationOptions::default();
        assert_eq!(options.max_iterations, 5);
        assert_eq!(options.tolerance, 1.0e-3);
    }

    #[test]
    fn failed_parameter_set_is_nan_filled_with_full_length_arrays() {
        let failed = PvsystParameterSet::failed(3, 60);
        assert!(!failed.success);
        assert!(failed.il_ref.is_nan());
        assert!(failed.gamma_ref.is_nan());
        assert_eq!(failed.ns, 60);
        assert_eq!(failed.iph.len(), 3);
        assert!(failed.iph.iter().all(|value| value.is_nan()));
        assert_eq!(failed.usable, vec![false; 3]);
    }
}
