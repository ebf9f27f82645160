//! Principal-branch Lambert W for the non-negative real arguments produced
//! by the single-diode closed forms.
//!
//! Arguments grow like exp(V/nNsVth) and overflow f64 well inside the
//! operating range of real modules; `lambert_w0_from_log` evaluates W from
//! the logarithm of the argument for that regime.

const HALLEY_MAX_ITER: usize = 32;
const HALLEY_REL_TOL: f64 = 1.0e-14;
const LOG_FORM_REFINEMENTS: usize = 3;

/// W0(x) for x >= 0. Negative arguments and NaN yield NaN; +inf yields +inf
/// (callers switch to `lambert_w0_from_log` before that point).
pub fn lambert_w0(x: f64) -> f64 {
    if x.is_nan() || x < 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x.is_infinite() {
        return f64::INFINITY;
    }

    let mut w = initial_guess(x);
    for _ in 0..HALLEY_MAX_ITER {
        let exp_w = w.exp();
        let residual = w * exp_w - x;
        let denominator =
            exp_w * (w + 1.0) - (w + 2.0) * residual / (2.0 * w + 2.0);
        let step = residual / denominator;
        w -= step;
        if step.abs() <= HALLEY_REL_TOL * (1.0 + w.abs()) {
            break;
        }
    }

    w
}

/// W0(exp(log_x)) for large `log_x`, where exp(log_x) overflows.
///
/// Solves w + ln w = log_x with three multiplicative Newton refinements from
/// the starting point w = log_x; for the overflow regime (log_x > ~700) this
/// carries roughly eight significant digits, which is the same fallback the
/// reference algorithm uses.
pub fn lambert_w0_from_log(log_x: f64) -> f64 {
    if log_x.is_nan() || log_x <= 0.0 {
        return f64::NAN;
    }

    let mut w = log_x;
    for _ in 0..LOG_FORM_REFINEMENTS {
        w = w * (1.0 - w.ln() + log_x) / (1.0 + w);
    }
    w
}

fn initial_guess(x: f64) -> f64 {
    if x <= 1.0e-3 {
        // Series about zero: W(x) = x - x^2 + 3/2 x^3 + ...
        return x * (1.0 - x * (1.0 - 1.5 * x));
    }
    if x <= std::f64::consts::E {
        return (1.0 + x).ln();
    }

    // Asymptotic seed for large arguments.
    let l1 = x.ln();
    let l2 = l1.ln();
    l1 - l2 + l2 / l1
}

#[cfg(test)]
mod tests {
    use super::{lambert_w0, lambert_w0_from_log};

    fn assert_close(label: &str, expected: f64, actual: f64, rel_tol: f64) {
        let abs_diff = (actual - expected).abs();
        let rel_diff = abs_diff / expected.abs().max(1.0e-300);
        assert!(
            rel_diff <= rel_tol,
            "{label}: expected={expected:.16e} actual={actual:.16e} rel_diff={rel_diff:.3e}"
        );
    }

    #[test]
    fn known_values_match_reference() {
        assert_eq!(lambert_w0(0.0), 0.0);
        // Omega constant: W(1).
        assert_close("W(1)", 0.567_143_290_409_783_8, lambert_w0(1.0), 1.0e-13);
        assert_close("W(e)", 1.0, lambert_w0(std::f64::consts::E), 1.0e-13);
        assert_close(
            "W(10)",
            1.745_528_002_740_699,
            lambert_w0(10.0),
            1.0e-12,
        );
    }

    #[test]
    fn identity_w_exp_w_holds_over_wide_range() {
        for exponent in -12..=250 {
            let x = 10.0_f64.powi(exponent);
            let w = lambert_w0(x);
            let recomposed = w + w.ln();
            if x > 1.0 {
                // In log form the identity w + ln w = ln x avoids overflow.
                assert_close("w+ln w", x.ln(), recomposed, 1.0e-10);
            } else {
                assert_close("w e^w", x, w * w.exp(), 1.0e-10);
            }
        }
    }

    #[test]
    fn invalid_arguments_propagate_nan() {
        assert!(lambert_w0(-0.5).is_nan());
        assert!(lambert_w0(f64::NAN).is_nan());
        assert!(lambert_w0_from_log(f64::NAN).is_nan());
        assert!(lambert_w0_from_log(-1.0).is_nan());
    }

    #[test]
    fn log_form_agrees_with_direct_form_where_both_are_finite() {
        for &log_x in &[5.0f64, 50.0, 300.0, 700.0] {
            let direct = lambert_w0(log_x.exp());
            let from_log = lambert_w0_from_log(log_x);
            assert_close("log form", direct, from_log, 1.0e-7);
        }
    }

    #[test]
    fn log_form_handles_overflowing_arguments() {
        // exp(900) overflows f64 but the log form still solves w + ln w = 900.
        let w = lambert_w0_from_log(900.0);
        assert!(w.is_finite());
        assert_close("overflow identity", 900.0, w + w.ln(), 1.0e-8);
    }
}
