//! Iterative refinement of per-curve single-diode parameters.
//!
//! `update_io_known_n` nudges the dark current until the modeled
//! open-circuit voltage matches the measurement; `update_rsh_fixed_pt`
//! sweeps a fixed-point map whose stationary point reproduces the measured
//! maximum-power point; `calc_theta_phi_exact` supplies the Lambert-W
//! auxiliary variables both of those and the series-resistance consistency
//! relation are built on.

use super::{DarkCurrentUpdateInput, ShuntUpdateInput, ThetaPhi, ThetaPhiInput};
use crate::domain::EstimationResult;
use crate::numerics::{lambert_w0, lambert_w0_from_log};
use crate::singlediode::reference::voltage_at_current;

const IO_UPDATE_MAX_ITER: usize = 10;
const IO_UPDATE_PERCENT_TOL: f64 = 1.0e-6;
const RSH_FIXED_POINT_SWEEPS: usize = 500;
const RSH_STALL_REL_TOL: f64 = 1.0e-12;

/// Refines the dark current so the single-diode model reproduces the
/// measured Voc for each curve.
pub fn update_io_known_n(input: DarkCurrentUpdateInput<'_>) -> EstimationResult<Vec<f64>> {
    let count = input.validate()?;
    let mut io: Vec<f64> = input.io.to_vec();

    let mut iteration = 1;
    let mut max_percent_error = f64::INFINITY;
    while max_percent_error > IO_UPDATE_PERCENT_TOL && iteration < IO_UPDATE_MAX_ITER {
        max_percent_error = 0.0;
        for j in 0..count {
            let predicted_voc = voltage_at_current(
                0.0,
                input.iph[j],
                io[j],
                input.rs[j],
                input.rsh[j],
                input.nnsvth[j],
            );
            let dvoc = predicted_voc - input.voc[j];
            let next = io[j] * (1.0 + (2.0 * dvoc) / (2.0 * input.nnsvth[j] - dvoc));
            let percent_error = ((next - io[j]) / io[j]).abs() * 100.0;
            if percent_error > max_percent_error {
                max_percent_error = percent_error;
            }
            io[j] = next;
        }
        iteration += 1;
    }

    Ok(io)
}

/// Exact Lambert-W auxiliary variables of the single-diode solution.
///
/// `phi` belongs to the V(I) closed form, `theta` to the I(V) closed form.
/// Non-positive or NaN arguments yield NaN; overflowing arguments are
/// evaluated from their logarithm.
pub fn calc_theta_phi_exact(input: ThetaPhiInput<'_>) -> EstimationResult<ThetaPhi> {
    let count = input.validate()?;
    let mut output = ThetaPhi {
        theta: Vec::with_capacity(count),
        phi: Vec::with_capacity(count),
    };

    for j in 0..count {
        output.phi.push(phi_single(
            input.imp[j],
            input.iph[j],
            input.io[j],
            input.nnsvth[j],
            input.rsh[j],
        ));
        output.theta.push(theta_single(
            input.vmp[j],
            input.iph[j],
            input.io[j],
            input.nnsvth[j],
            input.rs[j],
            input.rsh[j],
        ));
    }

    Ok(output)
}

/// Refines the shunt resistance so the model reproduces the measured
/// maximum-power point, by fixed-point sweeps.
pub fn update_rsh_fixed_pt(input: ShuntUpdateInput<'_>) -> EstimationResult<Vec<f64>> {
    let count = input.validate()?;
    let mut rsh: Vec<f64> = input.rsh.to_vec();

    for _ in 0..RSH_FIXED_POINT_SWEEPS {
        let mut max_relative_step = 0.0_f64;
        for j in 0..count {
            let z = phi_single(
                input.imp[j],
                input.iph[j],
                input.io[j],
                input.nnsvth[j],
                rsh[j],
            );
            let next = (1.0 + z) / z
                * ((input.iph[j] + input.io[j]) * rsh[j] / input.imp[j]
                    - input.nnsvth[j] * z / input.imp[j]
                    - 2.0 * input.vmp[j] / input.imp[j]);
            let relative_step = ((next - rsh[j]) / rsh[j]).abs();
            if relative_step > max_relative_step {
                max_relative_step = relative_step;
            }
            rsh[j] = next;
        }

        // Stationary (or fully NaN) sweeps cannot change further entries.
        if !(max_relative_step > RSH_STALL_REL_TOL) {
            break;
        }
    }

    Ok(rsh)
}

fn phi_single(imp: f64, iph: f64, io: f64, nnsvth: f64, rsh: f64) -> f64 {
    if nnsvth == 0.0 {
        return f64::NAN;
    }

    let exponent = rsh * (iph + io - imp) / nnsvth;
    let prefactor = rsh * io / nnsvth;
    let argw = prefactor * exponent.exp();
    if argw.is_infinite() {
        return lambert_w0_from_log(prefactor.ln() + exponent);
    }
    if argw > 0.0 { lambert_w0(argw) } else { f64::NAN }
}

fn theta_single(vmp: f64, iph: f64, io: f64, nnsvth: f64, rs: f64, rsh: f64) -> f64 {
    if rs == 0.0 || nnsvth == 0.0 {
        return f64::NAN;
    }

    let fraction = rsh / (rsh + rs);
    let exponent = fraction * (rs * (iph + io) + vmp) / nnsvth;
    let prefactor = fraction * rs * io / nnsvth;
    let argw = prefactor * exponent.exp();
    if argw.is_infinite() {
        return lambert_w0_from_log(prefactor.ln() + exponent);
    }
    if argw > 0.0 { lambert_w0(argw) } else { f64::NAN }
}
