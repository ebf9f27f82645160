pub mod lambertw;
pub mod linalg;
pub mod lsqnonlin;
pub mod numdiff;
pub mod robust;

pub use lambertw::{lambert_w0, lambert_w0_from_log};
pub use linalg::{
    DenseMatrix, LinalgError, LuDecomposition, lu_factorize, lu_solve, solve_least_squares,
};
pub use lsqnonlin::{BoundedLeastSquaresInput, LsqNonlinError, solve_bounded_least_squares};
pub use numdiff::{NumdiffOutput, numdiff};
pub use robust::{RobustFitError, RobustLineFit, robust_line_fit};

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value);
    }

    sum
}

/// Arithmetic mean; NaN for an empty slice, matching the propagate-as-NaN
/// contract of the estimation pipeline.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    stable_sum(values) / values.len() as f64
}

/// Sample standard deviation (n-1 denominator); NaN for fewer than two
/// values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }

    let center = mean(values);
    let mut sum = 0.0;
    let mut correction = 0.0;
    for &value in values {
        let deviation = value - center;
        kahan_add(&mut sum, &mut correction, deviation * deviation);
    }

    (sum / (values.len() - 1) as f64).sqrt()
}

/// Median by total order; NaN for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        0.5 * (sorted[mid - 1] + sorted[mid])
    }
}

pub fn deterministic_argsort(values: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_unstable_by(|lhs, rhs| {
        values[*lhs]
            .total_cmp(&values[*rhs])
            .then_with(|| lhs.cmp(rhs))
    });
    indices
}

/// Selects the entries of `values` where `mask` is true, preserving curve
/// index order.
pub fn gather(values: &[f64], mask: &[bool]) -> Vec<f64> {
    debug_assert_eq!(values.len(), mask.len());
    values
        .iter()
        .zip(mask)
        .filter_map(|(&value, &keep)| keep.then_some(value))
        .collect()
}

/// Writes `updates` back into the masked positions of `values`, in curve
/// index order. `updates` must have exactly one entry per true mask slot.
pub fn scatter(values: &mut [f64], mask: &[bool], updates: &[f64]) {
    debug_assert_eq!(values.len(), mask.len());
    let mut source = updates.iter();
    for (value, &keep) in values.iter_mut().zip(mask) {
        if keep {
            if let Some(&update) = source.next() {
                *value = update;
            }
        }
    }
    debug_assert!(source.next().is_none());
}

pub fn count_true(mask: &[bool]) -> usize {
    mask.iter().filter(|&&flag| flag).count()
}

#[cfg(test)]
mod tests {
    use super::{
        count_true, deterministic_argsort, gather, mean, median, sample_std, scatter, stable_sum,
    };

    #[test]
    fn stable_sum_reduces_order_loss_for_large_and_small_values() {
        let input = [1.0e16, 1.0, -1.0e16];
        assert_eq!(stable_sum(&input), 0.0);
    }

    #[test]
    fn mean_and_std_handle_degenerate_lengths_with_nan() {
        assert!(mean(&[]).is_nan());
        assert!(sample_std(&[]).is_nan());
        assert!(sample_std(&[3.0]).is_nan());
        assert!((mean(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1.0e-15);
        assert!((sample_std(&[1.0, 2.0, 3.0]) - 1.0).abs() < 1.0e-12);
    }

    #[test]
    fn median_splits_even_and_odd_lengths() {
        assert!(median(&[]).is_nan());
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn deterministic_argsort_orders_by_value_then_index() {
        let values = [2.0, 1.0, f64::NAN, 1.0, -0.0, 0.0];
        let order = deterministic_argsort(&values);
        assert_eq!(order, vec![4, 5, 1, 3, 0, 2]);
    }

    #[test]
    fn gather_and_scatter_round_trip_masked_entries() {
        let mask = [true, false, true, false, true];
        let values = [10.0, 20.0, 30.0, 40.0, 50.0];
        let selected = gather(&values, &mask);
        assert_eq!(selected, vec![10.0, 30.0, 50.0]);

        let mut target = values;
        scatter(&mut target, &mask, &[1.0, 3.0, 5.0]);
        assert_eq!(target, [1.0, 20.0, 3.0, 40.0, 5.0]);
        assert_eq!(count_true(&mask), 3);
    }
}
