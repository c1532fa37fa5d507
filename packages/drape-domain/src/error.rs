pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
	#[error("Reference corpus has no categories.")]
	EmptyCorpus,
	#[error("Reference category {name:?} has no usable embeddings.")]
	EmptyCategory { name: String },
	#[error("Reference category {name:?} is defined more than once.")]
	DuplicateCategory { name: String },
	#[error("Embedding dimension {actual} does not match expected dimension {expected}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Embedding has zero magnitude or non-finite values.")]
	DegenerateEmbedding,
}
