//! Maximum-weight bipartite assignment (Kuhn-Munkres).
//!
//! Used by the unordered matcher to pair the children of two nodes so that
//! the summed child scores are maximal. The weight matrix may be
//! rectangular; it is padded with zero rows or columns to a square problem.
//!
//! Time complexity: O(n³) where n = max(rows, columns).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("weight matrix rows have different lengths")]
    Ragged,
    #[error("weight {0} is too large for the solver")]
    Overflow(usize),
    #[error("solver produced an incomplete assignment")]
    Incomplete,
}

/// An optimal assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// `(row, column)` pairs within the input matrix, one per row that
    /// could be assigned to a real column, in row order.
    pub pairs: Vec<(usize, usize)>,
    /// Sum of the weights of `pairs`.
    pub objective: usize,
}

/// Finds an assignment of rows to columns maximizing the summed weight.
pub fn solve_max(weights: &[Vec<usize>]) -> Result<Assignment, AssignmentError> {
    let rows = weights.len();
    let cols = weights.first().map_or(0, Vec::len);

    if weights.iter().any(|row| row.len() != cols) {
        return Err(AssignmentError::Ragged);
    }
    if rows == 0 || cols == 0 {
        return Ok(Assignment {
            pairs: Vec::new(),
            objective: 0,
        });
    }

    let n = rows.max(cols);
    let max_w = weights.iter().flatten().copied().max().unwrap_or(0);
    // Potentials can accumulate up to n times the largest cost.
    let limit = i64::MAX as usize / (2 * (n + 1));
    if max_w > limit {
        return Err(AssignmentError::Overflow(max_w));
    }
    let max_w = max_w as i64;

    // Maximization as minimization over `max_w - w`; padding cells weigh 0.
    let mut cost = vec![vec![max_w; n]; n];
    for (i, row) in weights.iter().enumerate() {
        for (j, &w) in row.iter().enumerate() {
            cost[i][j] = max_w - w as i64;
        }
    }

    let mut u = vec![0i64; n + 1];
    let mut v = vec![0i64; n + 1];
    let mut p = vec![0usize; n + 1]; // p[j] = row assigned to col j
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![i64::MAX; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = i64::MAX;
            let mut j1 = 0usize;

            for j in 1..=n {
                if !used[j] {
                    let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }

            if j1 == 0 {
                return Err(AssignmentError::Incomplete);
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut column_of = vec![None; n];
    for j in 1..=n {
        if p[j] == 0 || column_of[p[j] - 1].is_some() {
            return Err(AssignmentError::Incomplete);
        }
        column_of[p[j] - 1] = Some(j - 1);
    }

    let mut pairs = Vec::new();
    let mut objective = 0;
    for (i, column) in column_of.into_iter().enumerate().take(rows) {
        let j = column.ok_or(AssignmentError::Incomplete)?;
        if j < cols {
            objective += weights[i][j];
            pairs.push((i, j));
        }
    }

    Ok(Assignment { pairs, objective })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng;

    fn brute_force(weights: &[Vec<usize>]) -> usize {
        fn go(weights: &[Vec<usize>], row: usize, used: &mut Vec<bool>) -> usize {
            if row == weights.len() {
                return 0;
            }
            // Leaving a row unassigned is allowed when there are more rows
            // than columns.
            let mut best = go(weights, row + 1, used);
            for j in 0..used.len() {
                if !used[j] {
                    used[j] = true;
                    best = best.max(weights[row][j] + go(weights, row + 1, used));
                    used[j] = false;
                }
            }
            best
        }
        let cols = weights.first().map_or(0, Vec::len);
        go(weights, 0, &mut vec![false; cols])
    }

    #[test]
    fn test_hungarian_simple() {
        let weights = vec![vec![3, 1], vec![1, 3]];
        let assignment = solve_max(&weights).unwrap();
        assert_eq!(assignment.pairs, vec![(0, 0), (1, 1)]);
        assert_eq!(assignment.objective, 6);
    }

    #[test]
    fn test_rectangular_matrices() {
        let wide = vec![vec![0, 5, 1]];
        let assignment = solve_max(&wide).unwrap();
        assert_eq!(assignment.pairs, vec![(0, 1)]);
        assert_eq!(assignment.objective, 5);

        let tall = vec![vec![1], vec![4], vec![2]];
        let assignment = solve_max(&tall).unwrap();
        assert_eq!(assignment.pairs, vec![(1, 0)]);
        assert_eq!(assignment.objective, 4);
    }

    #[test]
    fn test_matches_brute_force_on_random_matrices() {
        let mut rng = Rng::seed_from(1234);
        for _ in 0..200 {
            let rows = 1 + rng.below(4);
            let cols = 1 + rng.below(4);
            let weights: Vec<Vec<usize>> = (0..rows)
                .map(|_| (0..cols).map(|_| rng.below(6)).collect())
                .collect();

            let assignment = solve_max(&weights).unwrap();
            assert_eq!(assignment.objective, brute_force(&weights), "{weights:?}");

            let mut seen = vec![false; cols];
            for &(i, j) in &assignment.pairs {
                assert!(i < rows && !seen[j]);
                seen[j] = true;
            }
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(solve_max(&[]).unwrap().objective, 0);
        assert!(solve_max(&[vec![], vec![]]).unwrap().pairs.is_empty());
        assert_eq!(solve_max(&[vec![1, 2], vec![3]]), Err(AssignmentError::Ragged));
        assert!(matches!(solve_max(&[vec![usize::MAX]]), Err(AssignmentError::Overflow(_))));
    }
}
