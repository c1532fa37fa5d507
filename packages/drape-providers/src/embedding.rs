use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};
use drape_config::EmbeddingProviderConfig;

/// HTTP client for an OpenAI-style image embedding endpoint.
pub struct EmbeddingClient {
	client: Client,
	cfg: EmbeddingProviderConfig,
}
impl EmbeddingClient {
	pub fn new(cfg: EmbeddingProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, cfg })
	}

	pub fn config(&self) -> &EmbeddingProviderConfig {
		&self.cfg
	}

	/// Encodes raw image payloads. Output order matches input order.
	pub async fn embed(&self, images: &[Vec<u8>]) -> Result<Vec<Vec<f32>>> {
		if images.is_empty() {
			return Ok(Vec::new());
		}

		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let input = images.iter().map(|bytes| STANDARD.encode(bytes)).collect::<Vec<_>>();
		let body = serde_json::json!({
			"model": self.cfg.model,
			"input": input,
			"input_type": "image",
			"encoding_format": "float",
			"dimensions": self.cfg.dimensions,
		});
		let res = self
			.client
			.post(&url)
			.headers(crate::auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(&body)
			.send()
			.await
			.map_err(|err| Error::from_send(&url, err))?;
		let status = res.status();

		if !status.is_success() {
			return Err(Error::Status { url, status: status.as_u16() });
		}

		let json: Value = res.json().await.map_err(|err| Error::from_send(&url, err))?;
		let vectors = parse_embedding_response(json)?;

		check_shape(&vectors, images.len(), self.cfg.dimensions as usize)?;

		Ok(vectors)
	}
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

fn check_shape(vectors: &[Vec<f32>], expected_count: usize, expected_dim: usize) -> Result<()> {
	if vectors.len() != expected_count {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response has {} vectors for {expected_count} inputs.",
				vectors.len()
			),
		});
	}

	if let Some(vec) = vectors.iter().find(|vec| vec.len() != expected_dim) {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding dimension {} does not match configured dimensions {expected_dim}.",
				vec.len()
			),
		});
	}

	Ok(())
}
