use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse retry classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
	Timeout,
	RateLimited,
	Server,
	Client,
	Other,
}
impl FailureClass {
	/// Timeouts, rate limits and server errors may succeed on a later attempt.
	pub fn is_transient(self) -> bool {
		matches!(self, Self::Timeout | Self::RateLimited | Self::Server)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider returned HTTP {status}.")]
	Status { status: u16, retry_after: Option<Duration>, body: String },
	#[error("Provider request timed out: {message}")]
	Timeout { message: String },
	#[error(transparent)]
	Reqwest(reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("Patent search response carried the error flag.")]
	ErrorFlag { body: String },
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	pub fn class(&self) -> FailureClass {
		match self {
			Self::Status { status: 429, .. } => FailureClass::RateLimited,
			Self::Status { status, .. } if *status >= 500 => FailureClass::Server,
			Self::Status { status, .. } if *status >= 400 => FailureClass::Client,
			Self::Timeout { .. } => FailureClass::Timeout,
			_ => FailureClass::Other,
		}
	}

	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			_ => None,
		}
	}

	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Status { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}
impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			return Self::Timeout { message: err.to_string() };
		}

		Self::Reqwest(err)
	}
}
