//! Box-bounded Levenberg-Marquardt least squares for the small nonlinear
//! fits of the estimation (two parameters, a handful of residuals).
//!
//! Forward-difference Jacobian, multiplicative damping adaptation, and
//! clamping of each trial step to the bounds. Iteration counts are hard
//! bounded so pathological residual surfaces cannot run away.

use crate::numerics::linalg::{DenseMatrix, LinalgError, lu_solve};

const DEFAULT_MAX_ITER: usize = 100;
const STEP_TOL: f64 = 1.0e-10;
const COST_TOL: f64 = 1.0e-10;
const INITIAL_DAMPING: f64 = 1.0e-3;
const DAMPING_INCREASE: f64 = 10.0;
const DAMPING_DECREASE: f64 = 0.1;
const MAX_DAMPING: f64 = 1.0e12;
const JACOBIAN_STEP_SCALE: f64 = 1.0e-7;

#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLeastSquaresInput<'a> {
    /// Starting point; clamped into the bounds before the first evaluation.
    pub initial: &'a [f64],
    pub lower: &'a [f64],
    pub upper: &'a [f64],
    pub max_iterations: usize,
}

impl<'a> BoundedLeastSquaresInput<'a> {
    pub fn new(initial: &'a [f64], lower: &'a [f64], upper: &'a [f64]) -> Self {
        Self {
            initial,
            lower,
            upper,
            max_iterations: DEFAULT_MAX_ITER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLeastSquaresFit {
    pub parameters: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LsqNonlinError {
    #[error("bound shape mismatch: parameters={parameters}, lower={lower}, upper={upper}")]
    BoundShapeMismatch {
        parameters: usize,
        lower: usize,
        upper: usize,
    },
    #[error("residual vector is empty")]
    EmptyResiduals,
    #[error("initial residuals are not finite")]
    NonFiniteStart,
}

/// Minimizes `sum(residuals(p)^2)` subject to `lower <= p <= upper`.
///
/// Residual entries that are NaN/Inf at a trial point cause the trial to be
/// rejected (damping grows); only a non-finite start is an error.
pub fn solve_bounded_least_squares<F>(
    input: BoundedLeastSquaresInput<'_>,
    mut residuals: F,
) -> Result<BoundedLeastSquaresFit, LsqNonlinError>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let parameter_count = input.initial.len();
    if input.lower.len() != parameter_count || input.upper.len() != parameter_count {
        return Err(LsqNonlinError::BoundShapeMismatch {
            parameters: parameter_count,
            lower: input.lower.len(),
            upper: input.upper.len(),
        });
    }

    let mut current: Vec<f64> = input
        .initial
        .iter()
        .zip(input.lower.iter().zip(input.upper))
        .map(|(&value, (&low, &high))| value.clamp(low, high))
        .collect();

    let mut current_residuals = residuals(&current);
    if current_residuals.is_empty() {
        return Err(LsqNonlinError::EmptyResiduals);
    }
    let mut current_cost = cost_of(&current_residuals);
    if !current_cost.is_finite() {
        return Err(LsqNonlinError::NonFiniteStart);
    }

    let mut damping = INITIAL_DAMPING;
    let mut iterations = 0;

    for iteration in 1..=input.max_iterations.max(1) {
        iterations = iteration;

        let jacobian = forward_difference_jacobian(
            &current,
            &current_residuals,
            input.lower,
            input.upper,
            &mut residuals,
        );
        let step = match damped_gauss_newton_step(&jacobian, &current_residuals, damping) {
            Ok(step) => step,
            Err(_) => {
                damping = (damping * DAMPING_INCREASE).min(MAX_DAMPING);
                continue;
            }
        };

        let candidate: Vec<f64> = current
            .iter()
            .zip(&step)
            .zip(input.lower.iter().zip(input.upper))
            .map(|((&value, &delta), (&low, &high))| (value + delta).clamp(low, high))
            .collect();
        let candidate_residuals = residuals(&candidate);
        let candidate_cost = cost_of(&candidate_residuals);

        if candidate_cost.is_finite() && candidate_cost < current_cost {
            let moved: f64 = current
                .iter()
                .zip(&candidate)
                .map(|(&before, &after)| (after - before).abs())
                .fold(0.0, f64::max);
            let improved = current_cost - candidate_cost;

            current = candidate;
            current_residuals = candidate_residuals;
            current_cost = candidate_cost;
            damping = (damping * DAMPING_DECREASE).max(f64::MIN_POSITIVE);

            if moved <= STEP_TOL || improved <= COST_TOL * current_cost.max(1.0) {
                break;
            }
        } else {
            damping *= DAMPING_INCREASE;
            if damping > MAX_DAMPING {
                break;
            }
        }
    }

    Ok(BoundedLeastSquaresFit {
        parameters: current,
        cost: current_cost,
        iterations,
    })
}

fn cost_of(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

fn forward_difference_jacobian<F>(
    point: &[f64],
    base_residuals: &[f64],
    lower: &[f64],
    upper: &[f64],
    residuals: &mut F,
) -> DenseMatrix
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let rows = base_residuals.len();
    let cols = point.len();
    let mut jacobian = DenseMatrix::zeros(rows, cols);
    let mut probe = point.to_vec();

    for col in 0..cols {
        let mut step = JACOBIAN_STEP_SCALE * point[col].abs().max(1.0);
        // Probe backwards when the forward step would leave the box.
        if point[col] + step > upper[col] && point[col] - step >= lower[col] {
            step = -step;
        }

        probe[col] = point[col] + step;
        let perturbed = residuals(&probe);
        probe[col] = point[col];

        if perturbed.len() != rows {
            continue;
        }
        for row in 0..rows {
            jacobian[(row, col)] = (perturbed[row] - base_residuals[row]) / step;
        }
    }

    jacobian
}

fn damped_gauss_newton_step(
    jacobian: &DenseMatrix,
    residuals: &[f64],
    damping: f64,
) -> Result<Vec<f64>, LinalgError> {
    let rows = jacobian.nrows();
    let cols = jacobian.ncols();
    let mut normal = DenseMatrix::zeros(cols, cols);
    let mut gradient = vec![0.0; cols];

    for lhs in 0..cols {
        for rhs in lhs..cols {
            let mut sum = 0.0;
            for row in 0..rows {
                sum += jacobian[(row, lhs)] * jacobian[(row, rhs)];
            }
            normal[(lhs, rhs)] = sum;
            normal[(rhs, lhs)] = sum;
        }

        let mut sum = 0.0;
        for row in 0..rows {
            sum += jacobian[(row, lhs)] * residuals[row];
        }
        gradient[lhs] = -sum;
    }

    for diagonal in 0..cols {
        normal[(diagonal, diagonal)] *= 1.0 + damping;
    }

    lu_solve(&normal, &gradient)
}

#[cfg(test)]
mod tests {
    use super::{BoundedLeastSquaresInput, LsqNonlinError, solve_bounded_least_squares};

    #[test]
    fn recovers_exponential_decay_parameters() {
        // r_i = a * exp(-b t_i) - y_i with a=3, b=0.7.
        let times: Vec<f64> = (0..12).map(|i| i as f64 * 0.4).collect();
        let observed: Vec<f64> = times.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();

        let fit = solve_bounded_least_squares(
            BoundedLeastSquaresInput::new(&[1.0, 0.1], &[0.01, 0.01], &[100.0, 10.0]),
            |p| {
                times
                    .iter()
                    .zip(&observed)
                    .map(|(&t, &y)| p[0] * (-p[1] * t).exp() - y)
                    .collect()
            },
        )
        .expect("fit");

        assert!((fit.parameters[0] - 3.0).abs() <= 1.0e-5, "a={}", fit.parameters[0]);
        assert!((fit.parameters[1] - 0.7).abs() <= 1.0e-5, "b={}", fit.parameters[1]);
        assert!(fit.cost <= 1.0e-10);
    }

    #[test]
    fn solution_respects_bounds() {
        // Unconstrained optimum is p = 5; the box caps it at 2.
        let fit = solve_bounded_least_squares(
            BoundedLeastSquaresInput::new(&[1.0], &[0.0], &[2.0]),
            |p| vec![p[0] - 5.0],
        )
        .expect("fit");
        assert!((fit.parameters[0] - 2.0).abs() <= 1.0e-9);
    }

    #[test]
    fn shape_errors_are_structured() {
        let error = solve_bounded_least_squares(
            BoundedLeastSquaresInput::new(&[1.0, 2.0], &[0.0], &[3.0]),
            |_| vec![0.0],
        )
        .expect_err("bound mismatch");
        assert_eq!(
            error,
            LsqNonlinError::BoundShapeMismatch {
                parameters: 2,
                lower: 1,
                upper: 2
            }
        );

        let error = solve_bounded_least_squares(
            BoundedLeastSquaresInput::new(&[1.0], &[0.0], &[2.0]),
            |_| Vec::new(),
        )
        .expect_err("empty residuals");
        assert_eq!(error, LsqNonlinError::EmptyResiduals);
    }
}
