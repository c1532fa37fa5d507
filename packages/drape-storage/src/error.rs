#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
}
impl Error {
	/// True when the failure comes from reaching the database rather than from a statement.
	pub fn is_connection(&self) -> bool {
		matches!(
			self,
			Self::Sqlx(
				sqlx::Error::Io(_)
					| sqlx::Error::Tls(_)
					| sqlx::Error::Protocol(_)
					| sqlx::Error::PoolTimedOut
					| sqlx::Error::PoolClosed
					| sqlx::Error::WorkerCrashed
			)
		)
	}
}
