//! First and second derivatives of sampled data on a possibly non-uniform
//! grid, using five-point Lagrange-derivative weights (the Bowen–Smith
//! unequal-spacing formulae).
//!
//! The first two and last two entries have no centered five-point window and
//! are always NaN. Fewer than five samples yield an all-NaN result rather
//! than an error. Coincident grid points produce NaN/Inf through the weight
//! denominators; duplicate removal is the caller's concern (curve
//! rectification upstream).

const WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct NumdiffOutput {
    /// First derivative, same length as the input.
    pub df: Vec<f64>,
    /// Second derivative, same length as the input.
    pub df2: Vec<f64>,
}

/// Computes df/dx and d2f/dx2 at each sample of `f` over `x`.
///
/// `x` and `f` must be index-aligned; the shorter of the two bounds the
/// output length, so callers should pass equal-length slices.
pub fn numdiff(x: &[f64], f: &[f64]) -> NumdiffOutput {
    let n = x.len().min(f.len());
    let mut df = vec![f64::NAN; n];
    let mut df2 = vec![f64::NAN; n];

    if n < WINDOW {
        return NumdiffOutput { df, df2 };
    }

    for center in 2..(n - 2) {
        // Displacements of the five-point window relative to the center.
        let mut a = [0.0_f64; WINDOW];
        for (offset, slot) in a.iter_mut().enumerate() {
            *slot = x[center - 2 + offset] - x[center];
        }

        let mut first = 0.0;
        let mut second = 0.0;
        for j in 0..WINDOW {
            let mut triple_sum = 0.0;
            let mut pair_sum = 0.0;
            let mut denominator = 1.0;
            for k in 0..WINDOW {
                if k == j {
                    continue;
                }
                denominator *= a[j] - a[k];
                for m in (k + 1)..WINDOW {
                    if m == j {
                        continue;
                    }
                    pair_sum += a[k] * a[m];
                    for p in (m + 1)..WINDOW {
                        if p == j {
                            continue;
                        }
                        triple_sum += a[k] * a[m] * a[p];
                    }
                }
            }

            let value = f[center - 2 + j];
            first += -(triple_sum / denominator) * value;
            second += 2.0 * (pair_sum / denominator) * value;
        }

        df[center] = first;
        df2[center] = second;
    }

    NumdiffOutput { df, df2 }
}
