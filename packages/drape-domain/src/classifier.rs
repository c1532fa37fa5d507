use std::sync::Arc;

use serde::Serialize;

use crate::{Error, Result, reference::ReferenceStore, similarity};

/// Category assigned when the best match falls below the threshold.
pub const FALLBACK_CATEGORY: &str = "Others";
pub const MAX_RANKED: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCategory {
	pub category: String,
	/// Raw cosine similarity in [-1, 1].
	pub score: f32,
	/// Score clamped to [0, 1].
	pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
	pub record_id: String,
	pub top_category: String,
	pub top_confidence: f32,
	pub is_garment: bool,
	/// Best matches in descending order, at most [`MAX_RANKED`] entries.
	pub ranked: Vec<RankedCategory>,
}

/// Few-shot classifier over a shared, immutable reference store.
#[derive(Debug, Clone)]
pub struct Classifier {
	store: Arc<ReferenceStore>,
	threshold: f32,
	top_k: usize,
}
impl Classifier {
	pub fn new(store: Arc<ReferenceStore>, threshold: f32, top_k: usize) -> Self {
		Self { store, threshold, top_k: top_k.clamp(1, MAX_RANKED) }
	}

	pub fn store(&self) -> &ReferenceStore {
		&self.store
	}

	pub fn threshold(&self) -> f32 {
		self.threshold
	}

	/// Scores every category by its best-matching example and applies the threshold.
	///
	/// Ties keep first-loaded order. The result is a garment iff the reported top confidence is
	/// at least the threshold; otherwise the category becomes [`FALLBACK_CATEGORY`].
	pub fn classify(&self, record_id: &str, embedding: &[f32]) -> Result<ClassificationResult> {
		let expected = self.store.dimensions();

		if embedding.len() != expected {
			return Err(Error::DimensionMismatch { expected, actual: embedding.len() });
		}

		let query = similarity::normalize(embedding).ok_or(Error::DegenerateEmbedding)?;
		let mut scored = self
			.store
			.categories()
			.iter()
			.map(|category| {
				let score = category
					.embeddings()
					.iter()
					.map(|reference| similarity::dot(&query, reference))
					.fold(f32::NEG_INFINITY, f32::max);

				(category.name(), score.clamp(-1.0, 1.0))
			})
			.collect::<Vec<_>>();

		// Stable sort keeps first-loaded order for equal scores.
		scored.sort_by(|lhs, rhs| rhs.1.total_cmp(&lhs.1));

		let ranked = scored
			.iter()
			.take(self.top_k)
			.map(|(category, score)| RankedCategory {
				category: category.to_string(),
				score: *score,
				confidence: score.clamp(0.0, 1.0),
			})
			.collect::<Vec<_>>();
		let Some(best) = ranked.first() else {
			return Err(Error::EmptyCorpus);
		};
		let is_garment = best.confidence >= self.threshold;
		let top_category =
			if is_garment { best.category.clone() } else { FALLBACK_CATEGORY.to_string() };

		Ok(ClassificationResult {
			record_id: record_id.to_string(),
			top_category,
			top_confidence: best.confidence,
			is_garment,
			ranked,
		})
	}
}
