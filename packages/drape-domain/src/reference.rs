use std::collections::HashSet;

use crate::{Error, Result, similarity};

/// One labeled category and its unit-normalized example embeddings.
#[derive(Debug, Clone)]
pub struct ReferenceCategory {
	name: String,
	embeddings: Vec<Vec<f32>>,
}
impl ReferenceCategory {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn embeddings(&self) -> &[Vec<f32>] {
		&self.embeddings
	}
}

/// Immutable set of reference categories, kept in first-loaded order.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
	categories: Vec<ReferenceCategory>,
	dimensions: usize,
}
impl ReferenceStore {
	/// Builds the store from `(category, embeddings)` pairs.
	///
	/// Degenerate embeddings (zero magnitude, non-finite values) are dropped. Loading fails when
	/// the corpus is empty, a category name repeats, dimensions disagree, or a category is left
	/// with no usable embedding.
	pub fn load<I>(corpus: I) -> Result<Self>
	where
		I: IntoIterator<Item = (String, Vec<Vec<f32>>)>,
	{
		let mut categories = Vec::new();
		let mut seen = HashSet::new();
		let mut dimensions = None;

		for (name, raw) in corpus {
			if !seen.insert(name.clone()) {
				return Err(Error::DuplicateCategory { name });
			}

			let mut embeddings = Vec::with_capacity(raw.len());

			for vec in raw {
				let expected = *dimensions.get_or_insert(vec.len());

				if vec.len() != expected {
					return Err(Error::DimensionMismatch { expected, actual: vec.len() });
				}

				if let Some(unit) = similarity::normalize(&vec) {
					embeddings.push(unit);
				}
			}

			if embeddings.is_empty() {
				return Err(Error::EmptyCategory { name });
			}

			categories.push(ReferenceCategory { name, embeddings });
		}

		let Some(dimensions) = dimensions.filter(|_| !categories.is_empty()) else {
			return Err(Error::EmptyCorpus);
		};

		Ok(Self { categories, dimensions })
	}

	pub fn categories(&self) -> &[ReferenceCategory] {
		&self.categories
	}

	pub fn category_names(&self) -> Vec<&str> {
		self.categories.iter().map(ReferenceCategory::name).collect()
	}

	pub fn dimensions(&self) -> usize {
		self.dimensions
	}

	pub fn embedding_count(&self) -> usize {
		self.categories.iter().map(|category| category.embeddings.len()).sum()
	}
}
