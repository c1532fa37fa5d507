use std::time::Duration;

use reqwest::{Client, Url, header::USER_AGENT};

use crate::{Error, Result};

/// Downloads image bytes under a fixed timeout and size cap.
pub struct ImageFetcher {
	client: Client,
	max_bytes: u64,
}
impl ImageFetcher {
	pub fn new(cfg: &drape_config::Fetch) -> Result<Self> {
		let mut headers = reqwest::header::HeaderMap::new();

		headers.insert(USER_AGENT, cfg.user_agent.parse()?);

		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.default_headers(headers)
			.build()?;

		Ok(Self { client, max_bytes: cfg.max_bytes })
	}

	pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
		let parsed = parse_image_url(url)?;
		let mut res =
			self.client.get(parsed).send().await.map_err(|err| Error::from_send(url, err))?;
		let status = res.status();

		if !status.is_success() {
			return Err(Error::Status { url: url.to_string(), status: status.as_u16() });
		}
		if res.content_length().map(|len| len > self.max_bytes).unwrap_or(false) {
			return Err(Error::TooLarge { url: url.to_string(), limit: self.max_bytes });
		}

		let mut bytes = Vec::new();

		while let Some(chunk) = res.chunk().await.map_err(|err| Error::from_send(url, err))? {
			if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
				return Err(Error::TooLarge { url: url.to_string(), limit: self.max_bytes });
			}

			bytes.extend_from_slice(&chunk);
		}

		if bytes.is_empty() {
			return Err(Error::InvalidResponse { message: format!("Image at {url} is empty.") });
		}

		tracing::debug!(url, bytes = bytes.len(), "Fetched image.");

		Ok(bytes)
	}
}

pub fn parse_image_url(url: &str) -> Result<Url> {
	let parsed = Url::parse(url.trim())
		.map_err(|err| Error::InvalidUrl { url: url.to_string(), message: err.to_string() })?;

	if !matches!(parsed.scheme(), "http" | "https") {
		return Err(Error::InvalidUrl {
			url: url.to_string(),
			message: format!("unsupported scheme {:?}", parsed.scheme()),
		});
	}

	Ok(parsed)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_http_and_https_only() {
		assert!(parse_image_url("https://cdn.example.com/a.jpg").is_ok());
		assert!(parse_image_url(" http://cdn.example.com/a.jpg ").is_ok());
		assert!(matches!(parse_image_url("ftp://example.com/a.jpg"), Err(Error::InvalidUrl { .. })));
		assert!(matches!(parse_image_url("not a url"), Err(Error::InvalidUrl { .. })));
	}
}
