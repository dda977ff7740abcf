use ndarray::Array2;

/// Solves the minimum-cost perfect matching on a square cost matrix.
///
/// Jonker-Volgenant shortest augmenting path with dual potentials, O(n^3).
/// Returns `result[row] = column` for the exact optimum. This is the
/// assignment underlying the permutation-invariant RMSD, so an approximation
/// is not acceptable here.
pub fn min_cost_assignment(cost: &Array2<f64>) -> Vec<usize> {
    let n = cost.nrows();
    debug_assert_eq!(n, cost.ncols(), "cost matrix must be square");
    if n == 0 {
        return Vec::new();
    }

    // 1-based internally; row/column 0 are the virtual free slots.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut matched_row = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        matched_row[0] = i;
        let mut j0 = 0_usize;
        let mut min_slack = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0_usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = cost[[i0 - 1, j - 1]] - u[i0] - v[j];
                if reduced < min_slack[j] {
                    min_slack[j] = reduced;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }

        // Augment along the alternating path back to the virtual column.
        while j0 != 0 {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
        }
    }

    let mut result = vec![0usize; n];
    for j in 1..=n {
        result[matched_row[j] - 1] = j - 1;
    }
    result
}
