use faer::Mat;

pub type DenseMatrix = Mat<f64>;

const SINGULAR_PIVOT_EPSILON: f64 = 1.0e-15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinalgError {
    #[error("LU factorization requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("LU factorization requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot index {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
    #[error("least squares needs at least as many rows as columns, got {rows}x{cols}")]
    UnderdeterminedSystem { rows: usize, cols: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    lu: DenseMatrix,
    pivots: Vec<usize>,
}

impl LuDecomposition {
    pub fn dimension(&self) -> usize {
        self.lu.nrows()
    }

    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LinalgError> {
        let dimension = self.dimension();
        if rhs.len() != dimension {
            return Err(LinalgError::RhsLengthMismatch {
                expected: dimension,
                actual: rhs.len(),
            });
        }

        let mut forward = vec![0.0; dimension];
        for row in 0..dimension {
            let mut value = rhs[self.pivots[row]];
            for col in 0..row {
                value -= self.lu[(row, col)] * forward[col];
            }
            forward[row] = value;
        }

        let mut solution = vec![0.0; dimension];
        for row in (0..dimension).rev() {
            let mut value = forward[row];
            for col in (row + 1)..dimension {
                value -= self.lu[(row, col)] * solution[col];
            }

            let diagonal = self.lu[(row, row)];
            if diagonal.abs() <= SINGULAR_PIVOT_EPSILON {
                return Err(LinalgError::SingularMatrix { pivot_index: row });
            }

            solution[row] = value / diagonal;
        }

        Ok(solution)
    }
}

pub fn lu_factorize(matrix: &DenseMatrix) -> Result<LuDecomposition, LinalgError> {
    let dimension = validate_square_shape(matrix)?;
    let mut lu = matrix.clone();
    let mut pivots: Vec<usize> = (0..dimension).collect();

    for pivot_col in 0..dimension {
        let (pivot_row, pivot_magnitude) = select_pivot_row(&lu, pivot_col);
        if pivot_magnitude <= SINGULAR_PIVOT_EPSILON {
            return Err(LinalgError::SingularMatrix {
                pivot_index: pivot_col,
            });
        }

        if pivot_row != pivot_col {
            swap_rows(&mut lu, pivot_col, pivot_row);
            pivots.swap(pivot_col, pivot_row);
        }

        let pivot = lu[(pivot_col, pivot_col)];
        for row in (pivot_col + 1)..dimension {
            lu[(row, pivot_col)] /= pivot;
            let multiplier = lu[(row, pivot_col)];
            for col in (pivot_col + 1)..dimension {
                let updated = lu[(row, col)] - multiplier * lu[(pivot_col, col)];
                lu[(row, col)] = updated;
            }
        }
    }

    Ok(LuDecomposition { lu, pivots })
}

pub fn lu_solve(matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LinalgError> {
    lu_factorize(matrix)?.solve(rhs)
}

/// Solves the overdetermined system `design * x ~= rhs` in the least-squares
/// sense through the normal equations. The design matrices of this crate are
/// small (at most a handful of columns), where the normal-equation route is
/// adequate and keeps the kernel dependency-free beyond dense storage.
pub fn solve_least_squares(design: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LinalgError> {
    let rows = design.nrows();
    let cols = design.ncols();
    if rows == 0 || cols == 0 {
        return Err(LinalgError::EmptyMatrix);
    }
    if rows < cols {
        return Err(LinalgError::UnderdeterminedSystem { rows, cols });
    }
    if rhs.len() != rows {
        return Err(LinalgError::RhsLengthMismatch {
            expected: rows,
            actual: rhs.len(),
        });
    }

    let mut normal = DenseMatrix::zeros(cols, cols);
    let mut projected = vec![0.0; cols];
    for lhs_col in 0..cols {
        for rhs_col in lhs_col..cols {
            let mut sum = 0.0;
            for row in 0..rows {
                sum += design[(row, lhs_col)] * design[(row, rhs_col)];
            }
            normal[(lhs_col, rhs_col)] = sum;
            normal[(rhs_col, lhs_col)] = sum;
        }

        let mut sum = 0.0;
        for row in 0..rows {
            sum += design[(row, lhs_col)] * rhs[row];
        }
        projected[lhs_col] = sum;
    }

    lu_solve(&normal, &projected)
}

fn validate_square_shape(matrix: &DenseMatrix) -> Result<usize, LinalgError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(LinalgError::EmptyMatrix);
    }
    if rows != cols {
        return Err(LinalgError::NonSquareMatrix { rows, cols });
    }

    Ok(rows)
}

fn select_pivot_row(matrix: &DenseMatrix, pivot_col: usize) -> (usize, f64) {
    let dimension = matrix.nrows();
    let mut best_row = pivot_col;
    let mut best_magnitude = matrix[(pivot_col, pivot_col)].abs();

    for row in (pivot_col + 1)..dimension {
        let magnitude = matrix[(row, pivot_col)].abs();
        if magnitude > best_magnitude {
            best_magnitude = magnitude;
            best_row = row;
        }
    }

    (best_row, best_magnitude)
}

fn swap_rows(matrix: &mut DenseMatrix, lhs: usize, rhs: usize) {
    if lhs == rhs {
        return;
    }

    for col in 0..matrix.ncols() {
        let value = matrix[(lhs, col)];
        matrix[(lhs, col)] = matrix[(rhs, col)];
        matrix[(rhs, col)] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::{DenseMatrix, LinalgError, lu_solve, solve_least_squares};

    fn dense_matrix(rows: &[Vec<f64>]) -> DenseMatrix {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, |row| row.len());
        let mut matrix = DenseMatrix::zeros(nrows, ncols);
        for (row_index, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), ncols, "all matrix rows must share one width");
            for (col_index, value) in row.iter().enumerate() {
                matrix[(row_index, col_index)] = *value;
            }
        }
        matrix
    }

    #[test]
    fn lu_solve_recovers_known_solution_with_pivoting() {
        let matrix = dense_matrix(&[
            vec![0.0, 2.0, 1.0],
            vec![1.0, -2.0, -3.0],
            vec![2.0, 3.0, 1.0],
        ]);
        let expected = [1.0, 2.0, -0.5];
        let rhs: Vec<f64> = (0..3)
            .map(|row| (0..3).map(|col| matrix[(row, col)] * expected[col]).sum())
            .collect();

        let actual = lu_solve(&matrix, &rhs).expect("solve");
        for (index, value) in actual.iter().enumerate() {
            assert!(
                (value - expected[index]).abs() <= 1.0e-12,
                "entry {index}: {value} vs {}",
                expected[index]
            );
        }
    }

    #[test]
    fn lu_solve_rejects_singular_matrices() {
        let matrix = dense_matrix(&[vec![1.0, 2.0], vec![2.0, 4.0]]);
        let error = lu_solve(&matrix, &[1.0, 2.0]).expect_err("singular should fail");
        assert_eq!(error, LinalgError::SingularMatrix { pivot_index: 1 });
    }

    #[test]
    fn lu_solve_validates_rhs_dimension() {
        let matrix = dense_matrix(&[vec![3.0, 1.0], vec![1.0, 2.0]]);
        let error = lu_solve(&matrix, &[1.0]).expect_err("rhs mismatch should fail");
        assert_eq!(
            error,
            LinalgError::RhsLengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn least_squares_recovers_exact_coefficients_of_consistent_system() {
        // y = 2 + 3x sampled without noise: the least-squares solution is
        // the exact coefficient pair.
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let mut design = DenseMatrix::zeros(xs.len(), 2);
        let mut rhs = vec![0.0; xs.len()];
        for (row, &x) in xs.iter().enumerate() {
            design[(row, 0)] = 1.0;
            design[(row, 1)] = x;
            rhs[row] = 2.0 + 3.0 * x;
        }

        let solution = solve_least_squares(&design, &rhs).expect("least squares");
        assert!((solution[0] - 2.0).abs() <= 1.0e-10);
        assert!((solution[1] - 3.0).abs() <= 1.0e-10);
    }

    #[test]
    fn least_squares_minimizes_residual_for_inconsistent_system() {
        // Two unknowns, three equations; verify against the hand-computed
        // normal-equation solution for y = [0, 1, 3] on x = [0, 1, 2].
        let mut design = DenseMatrix::zeros(3, 2);
        for (row, x) in [0.0_f64, 1.0, 2.0].iter().enumerate() {
            design[(row, 0)] = 1.0;
            design[(row, 1)] = *x;
        }
        let solution = solve_least_squares(&design, &[0.0, 1.0, 3.0]).expect("least squares");
        assert!((solution[0] - (-1.0 / 6.0)).abs() <= 1.0e-12);
        assert!((solution[1] - 1.5).abs() <= 1.0e-12);
    }

    #[test]
    fn least_squares_rejects_underdetermined_and_mismatched_systems() {
        let design = dense_matrix(&[vec![1.0, 2.0, 3.0]]);
        assert_eq!(
            solve_least_squares(&design, &[1.0]).expect_err("wide should fail"),
            LinalgError::UnderdeterminedSystem { rows: 1, cols: 3 }
        );

        let design = dense_matrix(&[vec![1.0], vec![2.0]]);
        assert_eq!(
            solve_least_squares(&design, &[1.0]).expect_err("rhs mismatch should fail"),
            LinalgError::RhsLengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn least_squares_surfaces_collinear_designs_as_singular() {
        let mut design = DenseMatrix::zeros(4, 2);
        for row in 0..4 {
            design[(row, 0)] = row as f64;
            design[(row, 1)] = 2.0 * row as f64;
        }
        let error =
            solve_least_squares(&design, &[0.0, 1.0, 2.0, 3.0]).expect_err("collinear fails");
        assert!(matches!(error, LinalgError::SingularMatrix { .. }));
    }
}
