// Vector helpers shared by every clustering stage.
//
// All stages compare opinions by cosine similarity. Vectors are unit-normalized
// once at the start of a run, but the helpers here don't assume that so they
// stay safe to call on raw provider output in tests.

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f64]) -> Vec<f64> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm < f64::EPSILON {
        v.to_vec()
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

/// Cosine similarity in [-1, 1].
///
/// Unlike a clamped topic-overlap score, clustering needs the full range so
/// that opposite vectors end up at the maximum distance (2.0). Mismatched
/// dimensions and zero vectors compare as 0.0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    let denom = mag_a * mag_b;
    if denom < f64::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

/// Cosine distance (`1 - cosine_similarity`), in [0, 2].
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

/// Element-wise mean of the vectors at `indices`.
///
/// Returns an empty vector when `indices` is empty.
pub fn mean_of(vectors: &[Vec<f64>], indices: &[usize]) -> Vec<f64> {
    let Some(&first) = indices.first() else {
        return Vec::new();
    };

    let dim = vectors[first].len();
    let mut mean = vec![0.0_f64; dim];
    for &i in indices {
        for (m, &v) in mean.iter_mut().zip(vectors[i].iter()) {
            *m += v;
        }
    }

    let n = indices.len() as f64;
    for m in &mut mean {
        *m /= n;
    }
    mean
}

/// Centroid of a group: the mean of its member vectors, re-normalized to unit
/// length.
pub fn centroid(vectors: &[Vec<f64>], indices: &[usize]) -> Vec<f64> {
    normalize(&mean_of(vectors, indices))
}

/// Euclidean distance between two vectors of equal length.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Full pairwise cosine distance matrix.
pub fn distance_matrix(vectors: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut dist = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(&vectors[i], &vectors[j]).max(0.0);
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }
    dist
}
