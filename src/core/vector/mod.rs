// src/core/vector/mod.rs

//! Vector similarity metrics used by every retrieval mode.

use crate::core::common::{RagError, Result};

/// Calculates the dot product of two vectors.
///
/// Returns an error if the vectors have different dimensions.
pub fn dot_product(v1: &[f32], v2: &[f32]) -> Result<f32> {
    if v1.len() != v2.len() {
        return Err(RagError::DimensionMismatch { expected: v1.len(), actual: v2.len() });
    }

    Ok(v1.iter().zip(v2.iter()).map(|(a, b)| a * b).sum())
}

/// Calculates the cosine similarity of two vectors.
///
/// Returns an error if the vectors have different dimensions or if either
/// vector has a magnitude of zero.
pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> Result<f32> {
    if v1.len() != v2.len() {
        return Err(RagError::DimensionMismatch { expected: v1.len(), actual: v2.len() });
    }

    let dot_prod = dot_product(v1, v2)?;
    let magnitude_v1 = v1.iter().map(|x| x.powi(2)).sum::<f32>().sqrt();
    let magnitude_v2 = v2.iter().map(|x| x.powi(2)).sum::<f32>().sqrt();

    if magnitude_v1 == 0.0 || magnitude_v2 == 0.0 {
        return Err(RagError::ZeroMagnitude);
    }

    Ok(dot_prod / (magnitude_v1 * magnitude_v2))
}

/// Calculates the Euclidean distance between two vectors.
pub fn euclidean_distance(v1: &[f32], v2: &[f32]) -> Result<f32> {
    if v1.len() != v2.len() {
        return Err(RagError::DimensionMismatch { expected: v1.len(), actual: v2.len() });
    }

    let sum_sq_diff: f32 = v1.iter().zip(v2.iter()).map(|(a, b)| (a - b).powi(2)).sum();

    Ok(sum_sq_diff.sqrt())
}

/// Clamps a raw similarity into the `[0, 1]` score range every search
/// operation is required to return.
#[must_use]
pub fn unit_score(raw: f32) -> f32 {
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dot_product_success() {
        let v1 = [1.0, 2.0, 3.0];
        let v2 = [4.0, 5.0, 6.0];
        assert_relative_eq!(dot_product(&v1, &v2).unwrap(), 32.0, epsilon = 1e-6);
    }

    #[test]
    fn test_dot_product_dimension_mismatch() {
        let v1 = [1.0, 2.0];
        let v2 = [4.0, 5.0, 6.0];
        match dot_product(&v1, &v2) {
            Err(RagError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            _ => panic!("Expected DimensionMismatch"),
        }
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let v1 = [1.0, 0.0];
        let v2 = [0.0, 1.0];
        assert_relative_eq!(cosine_similarity(&v1, &v2).unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_similarity_collinear() {
        let v1 = [1.0, 2.0, 3.0];
        let v2 = [2.0, 4.0, 6.0];
        assert_relative_eq!(cosine_similarity(&v1, &v2).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_similarity_general_case() {
        let v1 = [1.0, 2.0];
        let v2 = [3.0, 4.0];
        // 11 / (sqrt(5) * 5)
        assert_relative_eq!(cosine_similarity(&v1, &v2).unwrap(), 0.98386991, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_magnitude() {
        let v1 = [0.0, 0.0];
        let v2 = [1.0, 2.0];
        assert!(matches!(cosine_similarity(&v1, &v2), Err(RagError::ZeroMagnitude)));
        assert!(matches!(cosine_similarity(&v2, &v1), Err(RagError::ZeroMagnitude)));
    }

    #[test]
    fn test_euclidean_distance() {
        let v1 = [0.0, 0.0];
        let v2 = [3.0, 4.0];
        assert_relative_eq!(euclidean_distance(&v1, &v2).unwrap(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_unit_score_bounds() {
        assert_eq!(unit_score(-0.3), 0.0);
        assert_eq!(unit_score(0.42), 0.42);
        assert_eq!(unit_score(1.7), 1.0);
    }
}
