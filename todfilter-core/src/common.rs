/// Arithmetic mean; 0 for an empty slice.
#[inline]
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation; 0 for an empty slice.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Largest absolute value; 0 for an empty slice.
#[inline]
pub fn max_abs(xs: &[f64]) -> f64 {
    xs.iter().fold(0.0f64, |acc, x| acc.max(x.abs()))
}

#[inline]
pub fn sum_squares(xs: &[f64]) -> f64 {
    xs.iter().map(|x| x * x).sum()
}

/// Inverse of a 1×1 or 2×2 matrix in closed form. `None` when singular,
/// not finite, or of any other size.
pub fn invert_small(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let inv = match a {
        [r0] if r0.len() == 1 => {
            let d = r0[0];
            if d == 0.0 {
                return None;
            }
            vec![vec![1.0 / d]]
        }
        [r0, r1] if r0.len() == 2 && r1.len() == 2 => {
            let det = r0[0] * r1[1] - r0[1] * r1[0];
            // Below rounding of the product terms the matrix is singular.
            let scale = (r0[0] * r1[1]).abs().max((r0[1] * r1[0]).abs());
            if !(det.abs() > f64::EPSILON * scale) {
                return None;
            }
            vec![
                vec![r1[1] / det, -r0[1] / det],
                vec![-r1[0] / det, r0[0] / det],
            ]
        }
        _ => return None,
    };
    inv.iter().flatten().all(|v| v.is_finite()).then_some(inv)
}

/// Solve `a x = b` for one or two unknowns via [`invert_small`].
pub fn solve_small(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    if a.len() != b.len() {
        return None;
    }
    let inv = invert_small(a)?;
    let x: Vec<f64> = inv
        .iter()
        .map(|row| row.iter().zip(b).map(|(m, v)| m * v).sum())
        .collect();
    x.iter().all(|v| v.is_finite()).then_some(x)
}
