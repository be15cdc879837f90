pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Data integrity error: {message}")]
	Integrity { message: String },
	#[error("Timed out: {message}")]
	Timeout { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<pravo_storage::Error> for Error {
	fn from(err: pravo_storage::Error) -> Self {
		match err {
			pravo_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			pravo_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
		}
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<tantivy::TantivyError> for Error {
	fn from(err: tantivy::TantivyError) -> Self {
		Self::Storage { message: format!("Full-text index error: {err}") }
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		Self::Storage { message: format!("Corpus scan task failed: {err}") }
	}
}
