//! Closed-form single-diode evaluators.
//!
//! The implicit diode equation
//! `I = Iph - Io*(exp((V + I*Rs)/a) - 1) - (V + I*Rs)/Rsh`, a = nNsVth,
//! is solved explicitly in both directions with the principal Lambert W
//! branch. Arguments that overflow f64 are evaluated through the
//! log-argument form. Non-finite parameters propagate NaN predictions;
//! the usability filter downstream is the containment mechanism.

use super::DiodeParameterVectors;
use crate::domain::{EstimationResult, MaxPowerPrediction};
use crate::numerics::{lambert_w0, lambert_w0_from_log};

const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_894_8;
const GOLDEN_MAX_ITER: usize = 250;
const GOLDEN_REL_TOL: f64 = 1.0e-10;

/// Current at a terminal voltage.
pub fn current_at_voltage(v: f64, iph: f64, io: f64, rs: f64, rsh: f64, nnsvth: f64) -> f64 {
    if rs == 0.0 {
        return iph - io * (v / nnsvth).exp_m1() - v / rsh;
    }

    let gsh = 1.0 / rsh;
    let denominator = rs * gsh + 1.0;
    let exponent = (rs * (iph + io) + v) / (nnsvth * denominator);
    let prefactor = rs * io / (nnsvth * denominator);
    let argw = prefactor * exponent.exp();

    let w = if argw.is_infinite() {
        lambert_w0_from_log(prefactor.ln() + exponent)
    } else {
        lambert_w0(argw)
    };

    (iph + io - v * gsh) / denominator - (nnsvth / rs) * w
}

/// Terminal voltage at a current.
pub fn voltage_at_current(i: f64, iph: f64, io: f64, rs: f64, rsh: f64, nnsvth: f64) -> f64 {
    let exponent = rsh * (iph + io - i) / nnsvth;
    let prefactor = io * rsh / nnsvth;
    let argw = prefactor * exponent.exp();

    let w = if argw.is_infinite() {
        lambert_w0_from_log(prefactor.ln() + exponent)
    } else {
        lambert_w0(argw)
    };

    (iph + io - i) * rsh - i * rs - nnsvth * w
}

/// Open-circuit voltage, i.e. the terminal voltage at zero current.
pub fn open_circuit_voltage(iph: f64, io: f64, rs: f64, rsh: f64, nnsvth: f64) -> f64 {
    voltage_at_current(0.0, iph, io, rs, rsh, nnsvth)
}

/// Vectorized maximum-power evaluation, index-aligned with the input
/// parameter vectors.
pub fn max_power(params: DiodeParameterVectors<'_>) -> EstimationResult<MaxPowerPrediction> {
    let count = params.validate()?;
    let mut prediction = MaxPowerPrediction::with_capacity(count);

    for j in 0..count {
        let (i_mp, v_mp, p_mp, v_oc) = max_power_single(
            params.iph[j],
            params.io[j],
            params.rs[j],
            params.rsh[j],
            params.nnsvth[j],
        );
        prediction.i_mp.push(i_mp);
        prediction.v_mp.push(v_mp);
        prediction.p_mp.push(p_mp);
        prediction.v_oc.push(v_oc);
    }

    Ok(prediction)
}

fn max_power_single(iph: f64, io: f64, rs: f64, rsh: f64, nnsvth: f64) -> (f64, f64, f64, f64) {
    let v_oc = open_circuit_voltage(iph, io, rs, rsh, nnsvth);
    if !v_oc.is_finite() || v_oc <= 0.0 {
        return (f64::NAN, f64::NAN, f64::NAN, v_oc);
    }

    let power = |v: f64| v * current_at_voltage(v, iph, io, rs, rsh, nnsvth);
    let v_mp = golden_section_maximum(0.0, v_oc, power);
    let i_mp = current_at_voltage(v_mp, iph, io, rs, rsh, nnsvth);
    (i_mp, v_mp, v_mp * i_mp, v_oc)
}

fn golden_section_maximum(mut lower: f64, mut upper: f64, objective: impl Fn(f64) -> f64) -> f64 {
    let tolerance = GOLDEN_REL_TOL * upper.max(1.0);
    let mut inner_low = upper - GOLDEN_RATIO_CONJUGATE * (upper - lower);
    let mut inner_high = lower + GOLDEN_RATIO_CONJUGATE * (upper - lower);
    let mut value_low = objective(inner_low);
    let mut value_high = objective(inner_high);

    for _ in 0..GOLDEN_MAX_ITER {
        if upper - lower <= tolerance {
            break;
        }

        // NaN objective values collapse the bracket towards the lower end,
        // terminating rather than cycling.
        if value_low >= value_high || value_high.is_nan() {
            upper = inner_high;
            inner_high = inner_low;
            value_high = value_low;
            inner_low = upper - GOLDEN_RATIO_CONJUGATE * (upper - lower);
            value_low = objective(inner_low);
        } else {
            lower = inner_low;
            inner_low = inner_high;
            value_low = value_high;
            inner_high = lower + GOLDEN_RATIO_CONJUGATE * (upper - lower);
            value_high = objective(inner_high);
        }
    }

    0.5 * (lower + upper)
}
