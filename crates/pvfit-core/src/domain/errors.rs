use crate::numerics::linalg::LinalgError;

/// Structural failures of the estimation entry points.
///
/// These cover shape/length preconditions only. Numerically indeterminate
/// inputs never raise: they propagate as NaN and are contained by the
/// per-curve usability filter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimationError {
    #[error("estimation requires at least one IV curve")]
    EmptyCurveSet,
    #[error(
        "curve {index} has mismatched sample lengths: current={current_len}, voltage={voltage_len}"
    )]
    CurveLengthMismatch {
        index: usize,
        current_len: usize,
        voltage_len: usize,
    },
    #[error("module must have at least one cell in series, got ns={ns}")]
    InvalidSeriesCellCount { ns: u32 },
    #[error("{context} length mismatch: expected {expected}, got {actual}")]
    VectorLengthMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("linear algebra kernel failed: {0}")]
    Linalg(#[from] LinalgError),
}

pub type EstimationResult<T> = Result<T, EstimationError>;

/// Checks that a set of index-aligned vectors share one length.
pub fn ensure_aligned(
    context: &'static str,
    expected: usize,
    actual: usize,
) -> EstimationResult<()> {
    if actual != expected {
        return Err(EstimationError::VectorLengthMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{EstimationError, ensure_aligned};

    #[test]
    fn ensure_aligned_reports_context_and_lengths() {
        assert_eq!(ensure_aligned("io", 4, 4), Ok(()));
        let error = ensure_aligned("io", 4, 3).expect_err("mismatch should fail");
        assert_eq!(
            error,
            EstimationError::VectorLengthMismatch {
                context: "io",
                expected: 4,
                actual: 3,
            }
        );
        assert!(error.to_string().contains("io length mismatch"));
    }
}
