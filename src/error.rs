use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("Artifact not found: {0}")]
	NotFound(String),

	#[error("Registry unreachable: {0}")]
	Network(String),

	#[error("Filesystem error at {path:?}: {source}")]
	Filesystem {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Invalid input: {0}")]
	InvalidInput(String),

	#[error("Configuration error: {0}")]
	ConfigError(String),

	#[error("Failed to load bundle: {0}")]
	LoadFailed(String),

	#[error("Fetch task failed: {0}")]
	TaskFailed(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(String),
}

/// Coarse classification used when reporting failed fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NotFound,
	Network,
	Filesystem,
	Other,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ErrorKind::NotFound => "not-found",
			ErrorKind::Network => "network",
			ErrorKind::Filesystem => "filesystem",
			ErrorKind::Other => "other",
		};
		f.write_str(name)
	}
}

impl Error {
	pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		Error::Filesystem {
			path: path.into(),
			source,
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::NotFound(_) => ErrorKind::NotFound,
			Error::Network(_) => ErrorKind::Network,
			Error::Filesystem { .. } | Error::IoError(_) => ErrorKind::Filesystem,
			_ => ErrorKind::Other,
		}
	}

	/// Only network failures are worth retrying; a fetch overwrites its
	/// destination fully, so a retry is idempotent.
	pub fn is_retryable(&self) -> bool {
		self.kind() == ErrorKind::Network
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

impl From<toml::de::Error> for Error {
	fn from(err: toml::de::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

impl From<toml::ser::Error> for Error {
	fn from(err: toml::ser::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
