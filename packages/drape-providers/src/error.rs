pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Request to {url} timed out.")]
	Timeout { url: String },
	#[error("Request to {url} failed with status {status}.")]
	Status { url: String, status: u16 },
	#[error("Payload from {url} exceeds {limit} bytes.")]
	TooLarge { url: String, limit: u64 },
	#[error("Invalid URL {url:?}: {message}")]
	InvalidUrl { url: String, message: String },
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	pub(crate) fn from_send(url: &str, err: reqwest::Error) -> Self {
		if err.is_timeout() {
			return Self::Timeout { url: url.to_string() };
		}

		Self::Reqwest(err)
	}
}
