//! Vector math shared by the long-text embedder and callers comparing
//! embeddings.

/// Euclidean length of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length. A zero vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns 0.0 when the vectors differ in length or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Element-wise mean of equally sized vectors.
///
/// A single vector is returned as-is. `None` if `vectors` is empty or the
/// lengths disagree.
pub fn mean_pool(mut vectors: Vec<Vec<f32>>) -> Option<Vec<f32>> {
    let dim = vectors.first()?.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    if vectors.len() == 1 {
        return vectors.pop();
    }

    let count = vectors.len() as f32;
    let mut sum = vec![0.0f32; dim];
    for v in &vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }
    for x in sum.iter_mut() {
        *x /= count;
    }
    Some(sum)
}
