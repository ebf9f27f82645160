//! Irradiance dependence of the shunt resistance in the PVsyst model.
//!
//! The model decays from a low-irradiance asymptote Rsh0 to the reference
//! value Rshref at the reference irradiance, with curvature fixed by the
//! PVsyst exponent. Fitting happens on the log of the resistance because
//! Rsh spans orders of magnitude across an irradiance sweep.

/// Model shunt resistance at effective irradiance `ee`.
///
/// `params` is (Rsh0, Rshref). The baseline term
/// Rshb = max(0, (Rshref - Rsh0*exp(-rshexp)) / (1 - exp(-rshexp)))
/// anchors the decay so that the model evaluates to Rshref exactly at
/// `ee == e0`.
pub fn estrsh(params: (f64, f64), rshexp: f64, ee: f64, e0: f64) -> f64 {
    let (rsh0, rshref) = params;
    let decay = (-rshexp).exp();
    let baseline = ((rshref - rsh0 * decay) / (1.0 - decay)).max(0.0);
    baseline + (rsh0 - baseline) * (-rshexp * ee / e0).exp()
}

/// Log-scale residuals of the model against measured shunt resistances,
/// one entry per curve; the objective of the nonlinear least squares.
pub fn fun_rsh(params: (f64, f64), rshexp: f64, ee: &[f64], e0: f64, rsh: &[f64]) -> Vec<f64> {
    ee.iter()
        .zip(rsh)
        .map(|(&irradiance, &measured)| {
            estrsh(params, rshexp, irradiance, e0).log10() - measured.log10()
        })
        .collect()
}
