pub type Result<T, E = Violation> = std::result::Result<T, E>;

/// A structural defect in model-produced output. The message is fed back to the model verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
	#[error("{field} is shorter than {min} characters")]
	TooShort { field: String, min: usize },
	#[error("{field} must contain between {min} and {max} entries, got {actual}")]
	Count { field: String, min: usize, max: usize, actual: usize },
	#[error("{field} must be between 0.0 and 1.0")]
	OutOfRange { field: String },
	#[error("{message}")]
	Invalid { message: String },
}
impl Violation {
	pub(crate) fn count(field: impl Into<String>, min: usize, max: usize, actual: usize) -> Self {
		Self::Count { field: field.into(), min, max, actual }
	}

	pub(crate) fn too_short(field: impl Into<String>, min: usize) -> Self {
		Self::TooShort { field: field.into(), min }
	}

	pub(crate) fn invalid(message: impl Into<String>) -> Self {
		Self::Invalid { message: message.into() }
	}
}
