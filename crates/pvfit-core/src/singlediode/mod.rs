//! Single-diode model evaluators used by the estimation driver.
//!
//! The driver depends only on [`SingleDiodeSolverApi`]; the shipped
//! [`ReferenceSingleDiodeSolver`] implements the Lambert-W closed forms,
//! the co-content initial extraction and the Io/Rsh refinement updaters.

pub mod cocontent;
pub mod reference;
pub mod refine;

pub use cocontent::{SingleDiodeCurveEstimate, estimate_curve_parameters};
pub use reference::{current_at_voltage, max_power, open_circuit_voltage, voltage_at_current};
pub use refine::{calc_theta_phi_exact, update_io_known_n, update_rsh_fixed_pt};

use crate::domain::{EstimationResult, MaxPowerPrediction, ensure_aligned};

/// Vectorized single-diode parameters, one entry per curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiodeParameterVectors<'a> {
    pub iph: &'a [f64],
    pub io: &'a [f64],
    pub rs: &'a [f64],
    pub rsh: &'a [f64],
    pub nnsvth: &'a [f64],
}

impl<'a> DiodeParameterVectors<'a> {
    pub fn validate(&self) -> EstimationResult<usize> {
        let expected = self.iph.len();
        ensure_aligned("io", expected, self.io.len())?;
        ensure_aligned("rs", expected, self.rs.len())?;
        ensure_aligned("rsh", expected, self.rsh.len())?;
        ensure_aligned("nnsvth", expected, self.nnsvth.len())?;
        Ok(expected)
    }
}

/// Inputs of the dark-current refinement at open circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DarkCurrentUpdateInput<'a> {
    pub rsh: &'a [f64],
    pub rs: &'a [f64],
    pub nnsvth: &'a [f64],
    pub io: &'a [f64],
    pub iph: &'a [f64],
    pub voc: &'a [f64],
}

impl<'a> DarkCurrentUpdateInput<'a> {
    pub fn validate(&self) -> EstimationResult<usize> {
        let expected = self.rsh.len();
        ensure_aligned("rs", expected, self.rs.len())?;
        ensure_aligned("nnsvth", expected, self.nnsvth.len())?;
        ensure_aligned("io", expected, self.io.len())?;
        ensure_aligned("iph", expected, self.iph.len())?;
        ensure_aligned("voc", expected, self.voc.len())?;
        Ok(expected)
    }
}

/// Inputs of the shunt-resistance fixed-point refinement at the measured
/// maximum-power point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShuntUpdateInput<'a> {
    pub rsh: &'a [f64],
    pub rs: &'a [f64],
    pub io: &'a [f64],
    pub iph: &'a [f64],
    pub nnsvth: &'a [f64],
    pub imp: &'a [f64],
    pub vmp: &'a [f64],
}

impl<'a> ShuntUpdateInput<'a> {
    pub fn validate(&self) -> EstimationResult<usize> {
        let expected = self.rsh.len();
        ensure_aligned("rs", expected, self.rs.len())?;
        ensure_aligned("io", expected, self.io.len())?;
        ensure_aligned("iph", expected, self.iph.len())?;
        ensure_aligned("nnsvth", expected, self.nnsvth.len())?;
        ensure_aligned("imp", expected, self.imp.len())?;
        ensure_aligned("vmp", expected, self.vmp.len())?;
        Ok(expected)
    }
}

/// Inputs of the exact Lambert-W auxiliary variables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThetaPhiInput<'a> {
    pub imp: &'a [f64],
    pub iph: &'a [f64],
    pub vmp: &'a [f64],
    pub io: &'a [f64],
    pub nnsvth: &'a [f64],
    pub rs: &'a [f64],
    pub rsh: &'a [f64],
}

impl<'a> ThetaPhiInput<'a> {
    pub fn validate(&self) -> EstimationResult<usize> {
        let expected = self.imp.len();
        ensure_aligned("iph", expected, self.iph.len())?;
        ensure_aligned("vmp", expected, self.vmp.len())?;
        ensure_aligned("io", expected, self.io.len())?;
        ensure_aligned("nnsvth", expected, self.nnsvth.len())?;
        ensure_aligned("rs", expected, self.rs.len())?;
        ensure_aligned("rsh", expected, self.rsh.len())?;
        Ok(expected)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThetaPhi {
    pub theta: Vec<f64>,
    pub phi: Vec<f64>,
}

/// The collaborator seam of the estimation driver.
pub trait SingleDiodeSolverApi {
    /// Predicted maximum-power point (and open-circuit voltage) per curve.
    fn max_power(&self, params: DiodeParameterVectors<'_>)
    -> EstimationResult<MaxPowerPrediction>;

    /// Initial per-curve parameters by the co-content integral method.
    fn initial_curve_estimate(
        &self,
        current: &[f64],
        voltage: &[f64],
        nsvth: f64,
    ) -> SingleDiodeCurveEstimate;

    /// Dark current refined so the model reproduces the measured Voc.
    fn refine_dark_current(&self, input: DarkCurrentUpdateInput<'_>)
    -> EstimationResult<Vec<f64>>;

    /// Shunt resistance refined so the model reproduces the measured
    /// maximum-power point.
    fn refine_shunt_resistance(&self, input: ShuntUpdateInput<'_>) -> EstimationResult<Vec<f64>>;

    /// Exact (theta, phi) auxiliary variables of the Lambert-W solution.
    fn exact_theta_phi(&self, input: ThetaPhiInput<'_>) -> EstimationResult<ThetaPhi>;
}

/// The shipped implementation of the collaborator seam.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceSingleDiodeSolver;

impl SingleDiodeSolverApi for ReferenceSingleDiodeSolver {
    fn max_power(
        &self,
        params: DiodeParameterVectors<'_>,
    ) -> EstimationResult<MaxPowerPrediction> {
        max_power(params)
    }

    fn initial_curve_estimate(
        &self,
        current: &[f64],
        voltage: &[f64],
        nsvth: f64,
    ) -> SingleDiodeCurveEstimate {
        estimate_curve_parameters(current, voltage, nsvth)
    }

    fn refine_dark_current(
        &self,
        input: DarkCurrentUpdateInput<'_>,
    ) -> EstimationResult<Vec<f64>> {
        update_io_known_n(input)
    }

    fn refine_shunt_resistance(&self, input: ShuntUpdateInput<'_>) -> EstimationResult<Vec<f64>> {
        update_rsh_fixed_pt(input)
    }

    fn exact_theta_phi(&self, input: ThetaPhiInput<'_>) -> EstimationResult<ThetaPhi> {
        calc_theta_phi_exact(input)
    }
}

#[cfg(test)]
mod tests {
    use super::{DiodeParameterVectors, ThetaPhiInput};
    use crate::domain::EstimationError;

    #[test]
    fn parameter_vector_validation_names_the_offending_field() {
        let params = DiodeParameterVectors {
            iph: &[5.0, 5.0],
            io: &[1.0e-9, 1.0e-9],
            rs: &[0.2],
            rsh: &[300.0, 300.0],
            nnsvth: &[1.7, 1.7],
        };
        assert_eq!(
            params.validate(),
            Err(EstimationError::VectorLengthMismatch {
                context: "rs",
                expected: 2,
                actual: 1,
            })
        );
    }

    #[test]
    fn theta_phi_validation_accepts_aligned_vectors() {
        let input = ThetaPhiInput {
            imp: &[4.5],
            iph: &[5.0],
            vmp: &[30.0],
            io: &[1.0e-9],
            nnsvth: &[1.7],
            rs: &[0.2],
            rsh: &[300.0],
        };
        assert_eq!(input.validate(), Ok(1));
    }
}
