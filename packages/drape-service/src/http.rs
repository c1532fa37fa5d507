use drape_providers::{embedding::EmbeddingClient, image::ImageFetcher};

use crate::{BoxFuture, Embedder, Error, ImageSource, Result};

impl ImageSource for ImageFetcher {
	fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			ImageFetcher::fetch(self, url)
				.await
				.map_err(|err| Error::Fetch { url: url.to_string(), message: err.to_string() })
		})
	}
}

impl Embedder for EmbeddingClient {
	fn embed<'a>(&'a self, images: &'a [Vec<u8>]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			EmbeddingClient::embed(self, images)
				.await
				.map_err(|err| Error::Encoding { message: err.to_string() })
		})
	}
}

/// Builds the HTTP image fetcher and embedding client from configuration.
pub fn build_clients(cfg: &drape_config::Config) -> Result<(ImageFetcher, EmbeddingClient)> {
	let fetcher = ImageFetcher::new(&cfg.fetch)
		.map_err(|err| Error::Configuration { message: err.to_string() })?;
	let embedder = EmbeddingClient::new(cfg.providers.embedding.clone())
		.map_err(|err| Error::Configuration { message: err.to_string() })?;

	Ok((fetcher, embedder))
}
