pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure taxonomy of a run.
///
/// `Fetch` and `Encoding` are per-record and recoverable. `Apply` fails one batch. The rest abort
/// the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Connection error: {message}")]
	Connection { message: String },
	#[error("Snapshot error: {message}")]
	Snapshot { message: String },
	#[error("Fetch error for {url}: {message}")]
	Fetch { url: String, message: String },
	#[error("Encoding error: {message}")]
	Encoding { message: String },
	#[error("Apply error: {message}")]
	Apply { message: String },
	#[error("Load error: {message}")]
	Load { message: String },
	#[error("Audit error at {path}: {message}")]
	Audit { path: String, message: String },
}
impl Error {
	/// Classifies a storage failure, using `fallback` for statement-level errors.
	pub fn from_storage(err: drape_storage::Error, fallback: fn(String) -> Self) -> Self {
		if err.is_connection() {
			return Self::Connection { message: err.to_string() };
		}

		fallback(err.to_string())
	}

	pub fn configuration(message: String) -> Self {
		Self::Configuration { message }
	}

	pub fn snapshot(message: String) -> Self {
		Self::Snapshot { message }
	}
}

impl From<drape_config::Error> for Error {
	fn from(err: drape_config::Error) -> Self {
		Self::Configuration { message: err.to_string() }
	}
}

impl From<drape_domain::Error> for Error {
	fn from(err: drape_domain::Error) -> Self {
		match err {
			drape_domain::Error::DimensionMismatch { .. } | drape_domain::Error::DegenerateEmbedding =>
				Self::Encoding { message: err.to_string() },
			_ => Self::Load { message: err.to_string() },
		}
	}
}
