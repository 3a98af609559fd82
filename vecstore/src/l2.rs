use crate::error::VecError;

/// Euclidean norm of `v`, accumulated in f64.
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
}

/// Return `v` divided by its Euclidean norm.
///
/// Fails for empty, all-zero and non-finite input: such a vector has no
/// direction and cannot take part in a unit-sphere comparison.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>, VecError> {
    if v.is_empty() {
        return Err(VecError::Empty);
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(VecError::NonFinite);
    }
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(VecError::ZeroNorm);
    }
    Ok(v.iter().map(|&x| (x as f64 / norm) as f32).collect())
}

/// Euclidean distance between two vectors of equal length.
///
/// Between unit vectors the result lies in `[0, 2]`.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Result<f32, VecError> {
    if a.len() != b.len() {
        return Err(VecError::DimensionMismatch {
            got: b.len(),
            want: a.len(),
        });
    }
    let mut sum: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let d = x as f64 - y as f64;
        sum += d * d;
    }
    Ok(sum.sqrt() as f32)
}
