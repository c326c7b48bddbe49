//! Distance and similarity between two descriptors.
//!
//! Every function requires equal-length inputs and always walks every dimension.

use crate::error::MatchError;

fn check_dims(a: &[f32], b: &[f32]) -> Result<(), MatchError> {
    if a.len() != b.len() {
        return Err(MatchError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

/// Square root of the summed squared differences.
pub fn euclidean(a: &[f32], b: &[f32]) -> Result<f32, MatchError> {
    check_dims(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt())
}

/// Sum of absolute differences.
pub fn manhattan(a: &[f32], b: &[f32]) -> Result<f32, MatchError> {
    check_dims(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum())
}

/// Cosine similarity in [-1, 1].
///
/// Returns 0.0 when either vector has zero magnitude, so a degenerate
/// all-zero descriptor scores as unrelated instead of producing NaN.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32, MatchError> {
    check_dims(a, b)?;

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    Ok(if denom > 0.0 { dot / denom } else { 0.0 })
}

/// Map a euclidean distance onto (0, 1]: `exp(-distance)`.
pub fn similarity_from_distance(distance: f32) -> f32 {
    (-distance).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_self_distance_is_zero() {
        let a = [0.3, -1.2, 4.5, 0.0];
        assert_eq!(euclidean(&a, &a).unwrap(), 0.0);
        assert_eq!(manhattan(&a, &a).unwrap(), 0.0);
        assert_relative_eq!(cosine(&a, &a).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_symmetry() {
        let a = [1.0, 2.0, 3.0];
        let b = [-0.5, 0.25, 7.0];
        assert_eq!(euclidean(&a, &b).unwrap(), euclidean(&b, &a).unwrap());
        assert_eq!(manhattan(&a, &b).unwrap(), manhattan(&b, &a).unwrap());
        assert_eq!(cosine(&a, &b).unwrap(), cosine(&b, &a).unwrap());
    }

    #[test]
    fn test_known_values() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_relative_eq!(euclidean(&a, &b).unwrap(), 5.0);
        assert_relative_eq!(manhattan(&a, &b).unwrap(), 7.0);
    }

    #[rstest]
    #[case::orthogonal([1.0, 0.0], [0.0, 1.0], 0.0)]
    #[case::opposite([1.0, 0.0], [-1.0, 0.0], -1.0)]
    #[case::scaled([1.0, 1.0], [2.0, 2.0], 1.0)]
    #[case::zero_vector([0.0, 0.0], [1.0, 0.0], 0.0)]
    #[case::both_zero([0.0, 0.0], [0.0, 0.0], 0.0)]
    fn test_cosine_cases(#[case] a: [f32; 2], #[case] b: [f32; 2], #[case] expected: f32) {
        assert_relative_eq!(cosine(&a, &b).unwrap(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_every_metric() {
        let a = vec![0.1f32; 128];
        let b = vec![0.1f32; 64];
        let expected = MatchError::DimensionMismatch { left: 128, right: 64 };
        assert_eq!(euclidean(&a, &b).unwrap_err(), expected);
        assert_eq!(manhattan(&a, &b).unwrap_err(), expected);
        assert_eq!(cosine(&a, &b).unwrap_err(), expected);
    }

    #[test]
    fn test_empty_vectors() {
        assert_eq!(euclidean(&[], &[]).unwrap(), 0.0);
        assert_eq!(cosine(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_similarity_from_distance_is_decreasing() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        let mut prev = similarity_from_distance(0.0);
        for step in 1..50 {
            let s = similarity_from_distance(step as f32 * 0.1);
            assert!(s < prev);
            assert!(s > 0.0);
            prev = s;
        }
    }
}
