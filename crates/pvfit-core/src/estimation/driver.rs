//! Outer PVsyst parameter-estimation driver.
//!
//! Pipeline: rectify every curve and extract initial per-curve parameters,
//! regress the diode ideality factor from Isc-Voc data across all curves,
//! refine the per-curve parameters against the measured maximum-power
//! points until the convergence diagnostics settle, then close with the
//! temperature and irradiance regressions that produce the STC parameter
//! set.
//!
//! A failed ideality-factor regression is unrecoverable and reported
//! through the `success` flag with NaN-filled outputs, never a panic. Bad
//! individual curves are excluded from fitting through the usability mask
//! but keep their last parameter values so the output arrays stay aligned
//! with the input curves.

use crate::common::constants::{PVSYST_RSH_EXPONENT, PhysicalConstants};
use crate::domain::{
    EstimationOptions, EstimationResult, IvCurveSet, ModuleSpecs, PvsystParameterSet,
};
use crate::estimation::converge::{ConvergenceRecord, check_converge};
use crate::estimation::filter::{FilterInput, filter_params};
use crate::estimation::rectify::{RectifiedCurve, rectify_iv_curve};
use crate::estimation::rsh_model::fun_rsh;
use crate::numerics::linalg::{DenseMatrix, solve_least_squares};
use crate::numerics::lsqnonlin::{BoundedLeastSquaresInput, solve_bounded_least_squares};
use crate::numerics::numdiff::numdiff;
use crate::numerics::robust::robust_line_fit;
use crate::numerics::{gather, mean, scatter};
use crate::singlediode::{
    DarkCurrentUpdateInput, DiodeParameterVectors, ReferenceSingleDiodeSolver,
    ShuntUpdateInput, SingleDiodeSolverApi, ThetaPhiInput,
};

const GAMMA_REGRESSOR_COUNT: usize = 5;
const RS_WINDOW_LOWER_FRACTION: f64 = 0.5;
const RS_WINDOW_UPPER_FRACTION: f64 = 0.9;
const RSH_IRRADIANCE_SPLIT: f64 = 400.0;
const RSH0_BOUNDS: (f64, f64) = (1.0, 1.0e7);
const RSHREF_BOUNDS: (f64, f64) = (1.0, 1.0e6);

/// Per-curve working state threaded through the refinement loop.
#[derive(Debug, Clone, PartialEq)]
struct RefineState {
    io: Vec<f64>,
    iph: Vec<f64>,
    rs: Vec<f64>,
    rsh: Vec<f64>,
    usable: Vec<bool>,
}

/// Measured quantities and derived values, fixed across iterations.
struct DriverContext {
    ee: Vec<f64>,
    tc: Vec<f64>,
    tck: Vec<f64>,
    isc: Vec<f64>,
    voc: Vec<f64>,
    imp: Vec<f64>,
    vmp: Vec<f64>,
    nnsvth: Vec<f64>,
    gamma: Vec<f64>,
    gamma_ref: f64,
    mu_gamma: f64,
}

/// Runs the estimation with the reference single-diode solver and default
/// constants and tuning.
pub fn estimate_pvsyst_parameters_default(
    curves: &IvCurveSet,
    specs: &ModuleSpecs,
) -> EstimationResult<PvsystParameterSet> {
    estimate_pvsyst_parameters(
        curves,
        specs,
        &PhysicalConstants::default(),
        &EstimationOptions::default(),
        &ReferenceSingleDiodeSolver,
    )
}

/// Runs the full estimation pipeline.
///
/// Returns `Err` only for structural precondition violations; algorithmic
/// failure is reported through `success == false` on the returned set.
pub fn estimate_pvsyst_parameters<S: SingleDiodeSolverApi>(
    curves: &IvCurveSet,
    specs: &ModuleSpecs,
    constants: &PhysicalConstants,
    options: &EstimationOptions,
    solver: &S,
) -> EstimationResult<PvsystParameterSet> {
    estimate_pvsyst_parameters_with_diagnostics(curves, specs, constants, options, solver)
        .map(|(parameters, _)| parameters)
}

/// Like [`estimate_pvsyst_parameters`], additionally returning the
/// convergence record of every refinement iteration so a reporting layer
/// can render the fit's trajectory without the core depending on any
/// graphics capability.
pub fn estimate_pvsyst_parameters_with_diagnostics<S: SingleDiodeSolverApi>(
    curves: &IvCurveSet,
    specs: &ModuleSpecs,
    constants: &PhysicalConstants,
    options: &EstimationOptions,
    solver: &S,
) -> EstimationResult<(PvsystParameterSet, Vec<ConvergenceRecord>)> {
    curves.validate_shape()?;
    specs.validate()?;

    let n = curves.len();
    let ns = f64::from(specs.ns);

    let ee: Vec<f64> = curves.curves.iter().map(|c| c.ee).collect();
    let tc: Vec<f64> = curves.curves.iter().map(|c| c.tc).collect();
    let tck: Vec<f64> = tc.iter().map(|&t| t + 273.15).collect();
    let isc: Vec<f64> = curves.curves.iter().map(|c| c.isc).collect();
    let voc: Vec<f64> = curves.curves.iter().map(|c| c.voc).collect();
    let imp: Vec<f64> = curves.curves.iter().map(|c| c.imp).collect();
    let vmp: Vec<f64> = curves.curves.iter().map(|c| c.vmp).collect();
    let vth: Vec<f64> = tc.iter().map(|&t| constants.thermal_voltage(t)).collect();

    // Rectified curves are reused by the initial Rsh extraction and the
    // series-resistance slope estimate.
    let rectified: Vec<RectifiedCurve> = curves
        .curves
        .iter()
        .map(|curve| rectify_iv_curve(&curve.current, &curve.voltage, curve.voc, curve.isc))
        .collect();

    // Initial shunt resistance per curve from the co-content method.
    let mut rsh = vec![f64::NAN; n];
    for j in 0..n {
        let estimate = solver.initial_curve_estimate(
            &rectified[j].current,
            &rectified[j].voltage,
            vth[j] * ns,
        );
        rsh[j] = estimate.rsh;
    }

    // Diode factor from Isc-Voc data across all curves.
    let Some((gamma_ref, mu_gamma)) =
        fit_gamma(&isc, &voc, &rsh, &tck, &vth, ns, constants)
    else {
        return Ok((PvsystParameterSet::failed(n, specs.ns), Vec::new()));
    };

    let gamma: Vec<f64> = tc
        .iter()
        .map(|&t| gamma_ref + mu_gamma * (t - constants.t0))
        .collect();
    let nnsvth: Vec<f64> = gamma
        .iter()
        .zip(&vth)
        .map(|(&g, &v)| g * v * ns)
        .collect();

    let context = DriverContext {
        ee,
        tc,
        tck,
        isc,
        voc,
        imp,
        vmp,
        nnsvth,
        gamma,
        gamma_ref,
        mu_gamma,
    };

    let mut state = initialize_state(&context, &rectified, rsh, solver)?;
    let mut history: Vec<ConvergenceRecord> = Vec::with_capacity(options.max_iterations);

    for iteration in 1..=options.max_iterations {
        let record =
            refine_iteration(&mut state, &context, solver, history.last(), iteration)?;
        let converged = !record.still_moving(options.tolerance);
        history.push(record);
        if converged {
            break;
        }
    }

    Ok((closing_regressions(state, &context, specs, constants), history))
}

fn fit_gamma(
    isc: &[f64],
    voc: &[f64],
    rsh: &[f64],
    tck: &[f64],
    vth: &[f64],
    ns: f64,
    constants: &PhysicalConstants,
) -> Option<(f64, f64)> {
    let n = isc.len();
    let t0k = constants.t0_kelvin();
    let q_over_k = constants.charge_over_boltzmann();

    let mut rows: Vec<[f64; GAMMA_REGRESSOR_COUNT]> = Vec::with_capacity(n);
    let mut rhs = Vec::with_capacity(n);
    for j in 0..n {
        let y = (isc[j] - voc[j] / rsh[j]).ln() - 3.0 * (tck[j] / t0k).ln();
        let x1 = q_over_k * (1.0 / t0k - 1.0 / tck[j]);
        let x2 = voc[j] / (vth[j] * ns);
        if y.is_nan() || x1.is_nan() || x2.is_nan() {
            continue;
        }
        let dt = tck[j] - t0k;
        rows.push([1.0, x1, -x1 * dt, x2, -x2 * dt]);
        rhs.push(y);
    }

    let mut design = DenseMatrix::zeros(rows.len(), GAMMA_REGRESSOR_COUNT);
    for (row_index, row) in rows.iter().enumerate() {
        for (col_index, value) in row.iter().enumerate() {
            design[(row_index, col_index)] = *value;
        }
    }

    let alpha = solve_least_squares(&design, &rhs).ok()?;
    let gamma_ref = 1.0 / alpha[3];
    let mu_gamma = alpha[4] / (alpha[3] * alpha[3]);
    if gamma_ref.is_nan() || mu_gamma.is_nan() {
        return None;
    }

    Some((gamma_ref, mu_gamma))
}

/// Sequential initial values for Io, Rs and Iph per curve, then the first
/// filter pass and dark-current refinement.
fn initialize_state<S: SingleDiodeSolverApi>(
    context: &DriverContext,
    rectified: &[RectifiedCurve],
    rsh: Vec<f64>,
    solver: &S,
) -> EstimationResult<RefineState> {
    let n = rsh.len();
    let mut io = vec![f64::NAN; n];
    let mut rs = vec![f64::NAN; n];
    let mut iph = vec![f64::NAN; n];

    for j in 0..n {
        if !(rsh[j] > 0.0) {
            continue;
        }

        // Dark current from the diode equation at Voc, with Iph + Io
        // approximated by Isc.
        io[j] = (context.isc[j] - context.voc[j] / rsh[j])
            * (-context.voc[j] / context.nnsvth[j]).exp();

        rs[j] = series_resistance_from_slope(
            &rectified[j],
            context.voc[j],
            context.isc[j],
            rsh[j],
            io[j],
            context.nnsvth[j],
        );

        iph[j] = light_current(
            context.isc[j],
            io[j],
            rs[j],
            rsh[j],
            context.nnsvth[j],
        );
    }

    let mut state = RefineState {
        io,
        iph,
        rs,
        rsh,
        usable: vec![false; n],
    };
    state.usable = current_mask(&state, context)?;

    // Refine Io to match Voc on the usable curves, then recompute Iph for
    // every curve from the consistency equation.
    let refined = solver.refine_dark_current(DarkCurrentUpdateInput {
        rsh: &gather(&state.rsh, &state.usable),
        rs: &gather(&state.rs, &state.usable),
        nnsvth: &gather(&context.nnsvth, &state.usable),
        io: &gather(&state.io, &state.usable),
        iph: &gather(&state.iph, &state.usable),
        voc: &gather(&context.voc, &state.usable),
    })?;
    scatter(&mut state.io, &state.usable, &refined);
    recompute_light_current(&mut state, context);

    Ok(state)
}

/// Initial series resistance from the IV slope near Voc.
///
/// Uses the five-point derivative over the window 0.5*Voc < V < 0.9*Voc,
/// keeps points where -Rsh*dI/dV - 1 > 0 whose derived candidate is
/// positive, and averages the survivors. No survivors means Rs = 0.
fn series_resistance_from_slope(
    rectified: &RectifiedCurve,
    voc: f64,
    isc: f64,
    rsh: f64,
    io: f64,
    nnsvth: f64,
) -> f64 {
    let derivatives = numdiff(&rectified.voltage, &rectified.current);

    let mut candidates = Vec::new();
    for (index, &didv) in derivatives.df.iter().enumerate() {
        let v = rectified.voltage[index];
        if v <= RS_WINDOW_LOWER_FRACTION * voc || v >= RS_WINDOW_UPPER_FRACTION * voc {
            continue;
        }
        let tmp = -rsh * didv - 1.0;
        if !(tmp > 0.0) {
            continue;
        }
        let candidate = nnsvth / isc * ((tmp * nnsvth / (rsh * io)).ln() - v / nnsvth);
        if candidate > 0.0 {
            candidates.push(candidate);
        }
    }

    if candidates.is_empty() {
        0.0
    } else {
        mean(&candidates)
    }
}

/// The Iph consistency equation at Isc.
fn light_current(isc: f64, io: f64, rs: f64, rsh: f64, nnsvth: f64) -> f64 {
    isc - io + io * (rs * isc / nnsvth).exp() + isc * rs / rsh
}

fn recompute_light_current(state: &mut RefineState, context: &DriverContext) {
    for j in 0..state.iph.len() {
        state.iph[j] = light_current(
            context.isc[j],
            state.io[j],
            state.rs[j],
            state.rsh[j],
            context.nnsvth[j],
        );
    }
}

fn current_mask(state: &RefineState, context: &DriverContext) -> EstimationResult<Vec<bool>> {
    filter_params(FilterInput {
        io: &state.io,
        rsh: &state.rsh,
        rs: &state.rs,
        ee: &context.ee,
        isc: &context.isc,
    })
}

/// One pass of the refinement loop: Rsh, Rs, Io and Iph in that order, with
/// the usability mask recomputed both after the series-resistance update and
/// after the light-current update.
fn refine_iteration<S: SingleDiodeSolverApi>(
    state: &mut RefineState,
    context: &DriverContext,
    solver: &S,
    previous: Option<&ConvergenceRecord>,
    iteration: usize,
) -> EstimationResult<ConvergenceRecord> {
    // Shunt resistance towards the measured maximum-power point.
    let refined_rsh = solver.refine_shunt_resistance(ShuntUpdateInput {
        rsh: &gather(&state.rsh, &state.usable),
        rs: &gather(&state.rs, &state.usable),
        io: &gather(&state.io, &state.usable),
        iph: &gather(&state.iph, &state.usable),
        nnsvth: &gather(&context.nnsvth, &state.usable),
        imp: &gather(&context.imp, &state.usable),
        vmp: &gather(&context.vmp, &state.usable),
    })?;
    scatter(&mut state.rsh, &state.usable, &refined_rsh);

    // Series resistance from the exact solution's phi variable.
    let theta_phi = solver.exact_theta_phi(ThetaPhiInput {
        imp: &gather(&context.imp, &state.usable),
        iph: &gather(&state.iph, &state.usable),
        vmp: &gather(&context.vmp, &state.usable),
        io: &gather(&state.io, &state.usable),
        nnsvth: &gather(&context.nnsvth, &state.usable),
        rs: &gather(&state.rs, &state.usable),
        rsh: &gather(&state.rsh, &state.usable),
    })?;
    let imp_u = gather(&context.imp, &state.usable);
    let vmp_u = gather(&context.vmp, &state.usable);
    let iph_u = gather(&state.iph, &state.usable);
    let io_u = gather(&state.io, &state.usable);
    let rsh_u = gather(&state.rsh, &state.usable);
    let nnsvth_u = gather(&context.nnsvth, &state.usable);
    let refined_rs: Vec<f64> = (0..imp_u.len())
        .map(|j| {
            (iph_u[j] + io_u[j] - imp_u[j]) * rsh_u[j] / imp_u[j]
                - nnsvth_u[j] * theta_phi.phi[j] / imp_u[j]
                - vmp_u[j] / imp_u[j]
        })
        .collect();
    scatter(&mut state.rs, &state.usable, &refined_rs);

    state.usable = current_mask(state, context)?;

    // Dark current towards the measured Voc on the refreshed mask.
    let refined_io = solver.refine_dark_current(DarkCurrentUpdateInput {
        rsh: &gather(&state.rsh, &state.usable),
        rs: &gather(&state.rs, &state.usable),
        nnsvth: &gather(&context.nnsvth, &state.usable),
        io: &gather(&state.io, &state.usable),
        iph: &gather(&state.iph, &state.usable),
        voc: &gather(&context.voc, &state.usable),
    })?;
    scatter(&mut state.io, &state.usable, &refined_io);

    recompute_light_current(state, context);
    state.usable = current_mask(state, context)?;

    // Model evaluation and convergence diagnostics on the final mask.
    let prediction = solver.max_power(DiodeParameterVectors {
        iph: &gather(&state.iph, &state.usable),
        io: &gather(&state.io, &state.usable),
        rs: &gather(&state.rs, &state.usable),
        rsh: &gather(&state.rsh, &state.usable),
        nnsvth: &gather(&context.nnsvth, &state.usable),
    })?;

    check_converge(
        previous,
        &prediction,
        &gather(&context.vmp, &state.usable),
        &gather(&context.imp, &state.usable),
        iteration,
    )
}

/// The closing regressions extracting the STC coefficients.
fn closing_regressions(
    state: RefineState,
    context: &DriverContext,
    specs: &ModuleSpecs,
    constants: &PhysicalConstants,
) -> PvsystParameterSet {
    let t0k = constants.t0_kelvin();
    let q_over_k = constants.charge_over_boltzmann();

    // Io0 and eG: robust fit of the dark-current temperature model.
    let x: Vec<f64> = context
        .tck
        .iter()
        .zip(&context.gamma)
        .zip(&state.usable)
        .filter_map(|((&t, &g), &keep)| {
            keep.then(|| q_over_k * (1.0 / t0k - 1.0 / t) / g)
        })
        .collect();
    let y: Vec<f64> = state
        .io
        .iter()
        .zip(&context.tck)
        .zip(&state.usable)
        .filter_map(|((&io, &t), &keep)| keep.then(|| io.ln() - 3.0 * (t / t0k).ln()))
        .collect();
    let (io_ref, e_g) = match robust_line_fit(&x, &y) {
        Ok(fit) => (fit.intercept.exp(), fit.slope),
        Err(_) => (f64::NAN, f64::NAN),
    };

    // Iph0: bias-corrected average of the irradiance-normalized light
    // current over usable curves.
    let iph_terms: Vec<f64> = (0..state.iph.len())
        .filter(|&j| state.usable[j])
        .map(|j| {
            state.iph[j] * (constants.e0 / context.ee[j])
                - specs.aisc * (context.tc[j] - constants.t0)
        })
        .filter(|value| !value.is_nan())
        .collect();
    let il_ref = mean(&iph_terms);

    // Rsh family: initial guesses split at 400 W/m^2 over all curves, then
    // the bounded log-residual fit over usable curves.
    let (rsh0, rsh_ref) = fit_rsh_family(&state, context, constants);

    // Rs0: plain average over usable high-irradiance curves.
    let rs_values: Vec<f64> = (0..state.rs.len())
        .filter(|&j| state.usable[j] && context.ee[j] > RSH_IRRADIANCE_SPLIT)
        .map(|j| state.rs[j])
        .collect();
    let rs_ref = mean(&rs_values);

    PvsystParameterSet {
        il_ref,
        io_ref,
        e_g,
        rs_ref,
        rsh_ref,
        rsh0,
        rsh_exp: PVSYST_RSH_EXPONENT,
        gamma_ref: context.gamma_ref,
        mu_gamma: context.mu_gamma,
        ns: specs.ns,
        iph: state.iph,
        io: state.io,
        rs: state.rs,
        rsh: state.rsh,
        usable: state.usable,
        success: true,
    }
}

fn fit_rsh_family(
    state: &RefineState,
    context: &DriverContext,
    constants: &PhysicalConstants,
) -> (f64, f64) {
    let rsh = &state.rsh;
    let ee = &context.ee;

    let low: Vec<f64> = rsh
        .iter()
        .zip(ee)
        .filter_map(|(&r, &e)| (!r.is_nan() && e < RSH_IRRADIANCE_SPLIT).then_some(r))
        .collect();
    let high: Vec<f64> = rsh
        .iter()
        .zip(ee)
        .filter_map(|(&r, &e)| (!r.is_nan() && e > RSH_IRRADIANCE_SPLIT).then_some(r))
        .collect();

    // Fallbacks when the irradiance sweep misses one side of the split:
    // the extreme observed Rsh stands in for the missing asymptote.
    let guess_rsh0 = if low.is_empty() {
        rsh.iter()
            .copied()
            .filter(|r| !r.is_nan())
            .fold(f64::NAN, f64::max)
    } else {
        mean(&low)
    };
    let guess_rshref = if high.is_empty() {
        rsh.iter()
            .copied()
            .filter(|r| !r.is_nan())
            .fold(f64::NAN, f64::min)
    } else {
        mean(&high)
    };

    let ee_usable = gather(ee, &state.usable);
    let rsh_usable = gather(rsh, &state.usable);
    let e0 = constants.e0;

    let fit = solve_bounded_least_squares(
        BoundedLeastSquaresInput::new(
            &[guess_rsh0, guess_rshref],
            &[RSH0_BOUNDS.0, RSHREF_BOUNDS.0],
            &[RSH0_BOUNDS.1, RSHREF_BOUNDS.1],
        ),
        |params| {
            fun_rsh(
                (params[0], params[1]),
                PVSYST_RSH_EXPONENT,
                &ee_usable,
                e0,
                &rsh_usable,
            )
        },
    );

    match fit {
        Ok(fit) => (fit.parameters[0], fit.parameters[1]),
        Err(_) => (f64::NAN, f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::estimate_pvsyst_parameters_default;
    use crate::domain::{EstimationError, IvCurve, IvCurveSet, ModuleSpecs};

    fn sparse_curve(ee: f64, tc: f64) -> IvCurve {
        IvCurve {
            current: vec![5.0, 3.0, 0.0],
            voltage: vec![0.0, 5.0, 10.0],
            isc: 5.0,
            voc: 10.0,
            imp: 4.0,
            vmp: 8.0,
            ee,
            tc,
        }
    }

    #[test]
    fn empty_curve_set_is_a_structural_error() {
        let specs = ModuleSpecs { ns: 60, aisc: 0.004 };
        let error = estimate_pvsyst_parameters_default(&IvCurveSet::default(), &specs)
            .expect_err("empty set should fail");
        assert_eq!(error, EstimationError::EmptyCurveSet);
    }

    #[test]
    fn mismatched_sample_arrays_are_a_structural_error() {
        let mut curve = sparse_curve(1_000.0, 25.0);
        curve.voltage.pop();
        let set = IvCurveSet { curves: vec![curve] };
        let specs = ModuleSpecs { ns: 60, aisc: 0.004 };
        let error = estimate_pvsyst_parameters_default(&set, &specs)
            .expect_err("length mismatch should fail");
        assert!(matches!(
            error,
            EstimationError::CurveLengthMismatch { index: 0, .. }
        ));
    }

    #[test]
    fn zero_series_cells_are_a_structural_error() {
        let set = IvCurveSet {
            curves: vec![sparse_curve(1_000.0, 25.0)],
        };
        let specs = ModuleSpecs { ns: 0, aisc: 0.004 };
        let error = estimate_pvsyst_parameters_default(&set, &specs)
            .expect_err("ns=0 should fail");
        assert_eq!(error, EstimationError::InvalidSeriesCellCount { ns: 0 });
    }

    #[test]
    fn unusable_gamma_regression_reports_failure_not_panic() {
        // Three-point curves cannot support the co-content regression, so
        // every initial Rsh is NaN and the diode-factor fit has no rows.
        let set = IvCurveSet {
            curves: vec![sparse_curve(1_000.0, 25.0), sparse_curve(800.0, 40.0)],
        };
        let specs = ModuleSpecs { ns: 60, aisc: 0.004 };
        let result = estimate_pvsyst_parameters_default(&set, &specs).expect("no panic");

        assert!(!result.success);
        assert!(result.gamma_ref.is_nan());
        assert!(result.il_ref.is_nan());
        assert!(result.rsh_ref.is_nan());
        assert_eq!(result.ns, 60);
        assert_eq!(result.iph.len(), 2);
        assert!(result.iph.iter().all(|v| v.is_nan()));
        assert_eq!(result.usable, vec![false, false]);
    }
}
