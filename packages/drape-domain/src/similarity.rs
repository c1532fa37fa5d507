/// Returns a unit-length copy of `vec`, or `None` when it cannot be normalized.
pub fn normalize(vec: &[f32]) -> Option<Vec<f32>> {
	if vec.is_empty() || vec.iter().any(|value| !value.is_finite()) {
		return None;
	}

	let norm = vec.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm == 0.0 || !norm.is_finite() {
		return None;
	}

	Some(vec.iter().map(|value| value / norm).collect())
}

/// Dot product of two equal-length vectors. Equals cosine similarity for unit vectors.
pub fn dot(lhs: &[f32], rhs: &[f32]) -> f32 {
	lhs.iter().zip(rhs).map(|(a, b)| a * b).sum()
}

pub fn cosine(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.len() != rhs.len() {
		return None;
	}

	let lhs = normalize(lhs)?;
	let rhs = normalize(rhs)?;

	Some(dot(&lhs, &rhs).clamp(-1.0, 1.0))
}
