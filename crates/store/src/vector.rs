//! Embedding blob codec and similarity math
//!
//! Embeddings are stored as little-endian f32 blobs in `records.embedding`.

/// Serialize embedding to bytes
pub fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|&f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from bytes
///
/// Trailing bytes that do not form a whole f32 are ignored.
pub fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity of two embeddings, clipped to [-1, 1]
///
/// Mismatched lengths, empty input and zero vectors all score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }

    (dot_product / denominator).clamp(-1.0, 1.0)
}

/// True when every component is zero (the "no usable signal" embedding)
pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let embedding = vec![0.1_f32, -2.5, 3.75, 0.0];
        let bytes = serialize_embedding(&embedding);
        assert_eq!(bytes.len(), 16);
        assert_eq!(deserialize_embedding(&bytes), embedding);
    }

    #[test]
    fn test_deserialize_ignores_partial_chunk() {
        let mut bytes = serialize_embedding(&[1.0]);
        bytes.push(0xff);
        assert_eq!(deserialize_embedding(&bytes), vec![1.0]);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let similarity = cosine_similarity(&a, &a);
        assert!((similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![10.0, 20.0, 30.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_is_zero_vector() {
        assert!(is_zero_vector(&[0.0; 8]));
        assert!(!is_zero_vector(&[0.0, 0.1]));
    }
}
