pub mod audit;
pub mod check;
pub mod corpus;
pub mod evaluate;
pub mod http;
pub mod pipeline;
pub mod postgres;
pub mod report;

mod error;
mod time_serde;

pub use error::{Error, Result};
pub use pipeline::{CancelToken, Pipeline, RunSettings};
pub use report::{BackupSnapshot, BatchSummary, RecordOutcome, RecordStatus, RunReport};

use std::{future::Future, pin::Pin, sync::Arc};

use drape_storage::{
	models::{GarmentRecord, RecordUpdate},
	queries::Selection,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Rows the pipeline may classify.
pub trait RecordSource
where
	Self: Send + Sync,
{
	/// Candidates in id order, capped by `max_records`.
	fn select<'a>(
		&'a self,
		selection: &'a Selection,
		max_records: Option<u64>,
	) -> BoxFuture<'a, Result<Vec<GarmentRecord>>>;

	/// Configured columns the table lacks. Empty when the layout matches.
	fn missing_columns(&self) -> BoxFuture<'_, Result<Vec<String>>>;
}

pub trait UpdateSink
where
	Self: Send + Sync,
{
	/// Applies all updates or none. Returns, per update, whether the row changed.
	fn apply<'a>(&'a self, updates: &'a [RecordUpdate]) -> BoxFuture<'a, Result<Vec<bool>>>;
}

pub trait BackupSink
where
	Self: Send + Sync,
{
	fn snapshot<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<BackupSnapshot>>;
}

pub trait ImageSource
where
	Self: Send + Sync,
{
	fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

pub trait Embedder
where
	Self: Send + Sync,
{
	/// One vector per image, in input order.
	fn embed<'a>(&'a self, images: &'a [Vec<u8>]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Ports {
	pub source: Arc<dyn RecordSource>,
	pub sink: Arc<dyn UpdateSink>,
	pub backup: Arc<dyn BackupSink>,
	pub images: Arc<dyn ImageSource>,
	pub embedder: Arc<dyn Embedder>,
}
impl Ports {
	/// Wires every Postgres-facing port to one store.
	pub fn from_store<S>(
		store: Arc<S>,
		images: Arc<dyn ImageSource>,
		embedder: Arc<dyn Embedder>,
	) -> Self
	where
		S: RecordSource + UpdateSink + BackupSink + 'static,
	{
		Self { source: store.clone(), sink: store.clone(), backup: store, images, embedder }
	}
}

/// Embeds a single image and checks that exactly one vector came back.
pub async fn embed_one(embedder: &dyn Embedder, image: Vec<u8>) -> Result<Vec<f32>> {
	let images = [image];
	let mut vectors = embedder.embed(&images).await?;

	if vectors.len() != 1 {
		return Err(Error::Encoding {
			message: format!("Embedding service returned {} vectors for 1 image.", vectors.len()),
		});
	}

	Ok(vectors.remove(0))
}
