use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use super::{Discretization, Spacing};
use crate::error::NumericsError;

// ---------------------------------------------------------------------------
// Collocation nodes on [0, 1]
// ---------------------------------------------------------------------------

/// Ascending collocation nodes on `[0, 1]`.
///
/// `Cosine` gives Chebyshev-Gauss-Lobatto points, clustered at both ends.
pub fn control_points(n: usize, spacing: Spacing) -> Result<DVector<f64>, NumericsError> {
    if n < 2 {
        return Err(NumericsError::TooFewControlPoints(n));
    }
    let last = (n - 1) as f64;
    let nodes = match spacing {
        Spacing::Cosine => DVector::from_fn(n, |i, _| 0.5 * (1.0 - (PI * i as f64 / last).cos())),
        Spacing::Linear => DVector::from_fn(n, |i, _| i as f64 / last),
    };
    Ok(nodes)
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Default discretization: nodes plus differentiation and integration
/// operators on normalized time.
///
/// `D @ f` is the derivative of the interpolating polynomial through `f`.
/// `I` inverts `D` on every node but the first, so `I @ (D @ f) = f - f[0]`.
pub fn chebyshev_data(
    n: usize,
    spacing: Spacing,
    integration: bool,
) -> Result<Discretization, NumericsError> {
    let nodes = control_points(n, spacing)?;
    let differentiate = differentiation_matrix(nodes.as_slice())?;
    let integrate = if integration {
        Some(integration_matrix(&differentiate)?)
    } else {
        None
    };
    Ok(Discretization {
        nodes,
        differentiate,
        integrate,
    })
}

/// Barycentric differentiation matrix for arbitrary distinct nodes.
pub fn differentiation_matrix(nodes: &[f64]) -> Result<DMatrix<f64>, NumericsError> {
    let n = nodes.len();
    if n < 2 {
        return Err(NumericsError::TooFewControlPoints(n));
    }

    // Work on [-1, 1] to keep the weight products well scaled.
    let lo = nodes.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = nodes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let half_span = 0.5 * (hi - lo);
    if half_span <= 0.0 {
        return Err(NumericsError::RepeatedNode(1));
    }
    let s: Vec<f64> = nodes.iter().map(|x| (x - lo) / half_span - 1.0).collect();
    let w = barycentric_weights(&s)?;

    let mut d = DMatrix::zeros(n, n);
    for i in 0..n {
        let mut diag = 0.0;
        for j in 0..n {
            if i != j {
                let dij = (w[j] / w[i]) / (s[i] - s[j]);
                d[(i, j)] = dij;
                diag -= dij;
            }
        }
        // negative sum trick: rows annihilate constants exactly
        d[(i, i)] = diag;
    }

    // chain rule back to the original interval
    Ok(d / half_span)
}

/// Antiderivative operator anchored at the first node.
pub fn integration_matrix(differentiate: &DMatrix<f64>) -> Result<DMatrix<f64>, NumericsError> {
    let n = differentiate.nrows();
    let interior = differentiate.view((1, 1), (n - 1, n - 1)).into_owned();
    let inverse = interior
        .try_inverse()
        .ok_or(NumericsError::SingularIntegration(n))?;

    let mut integrate = DMatrix::zeros(n, n);
    integrate.view_mut((1, 1), (n - 1, n - 1)).copy_from(&inverse);
    Ok(integrate)
}

fn barycentric_weights(s: &[f64]) -> Result<Vec<f64>, NumericsError> {
    let n = s.len();
    let mut w = vec![1.0; n];
    for j in 0..n {
        for k in 0..n {
            if j != k {
                let diff = s[j] - s[k];
                if diff == 0.0 {
                    return Err(NumericsError::RepeatedNode(j.max(k)));
                }
                w[j] /= diff;
            }
        }
    }
    let scale = w.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    Ok(w.into_iter().map(|v| v / scale).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
