use crate::stage::StageName;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Run was cancelled.")]
	Cancelled,
	#[error("Patent search API authentication failed. Check the patent search api_key.")]
	AuthenticationFailed,
	#[error("{bad_requests} patent search queries were rejected as malformed; the query builder is likely defective.")]
	QueryBuilderDefect { bad_requests: u32 },
	#[error("Patent search API unavailable: all {failed} queries failed.")]
	ApiUnavailable { failed: usize },
	#[error("No valid patent queries generated.")]
	NoQueries,
	#[error("Provider error: {0}")]
	Provider(#[from] priorart_providers::Error),
	#[error("Content error: {message}")]
	Content { message: String },
	#[error("{stage} failed: {source}")]
	Stage {
		stage: StageName,
		#[source]
		source: Box<Error>,
	},
}
impl Error {
	/// Stage tag of a fatal pipeline error.
	pub fn stage(&self) -> Option<StageName> {
		match self {
			Self::Stage { stage, .. } => Some(*stage),
			_ => None,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		match self {
			Self::Cancelled => true,
			Self::Stage { source, .. } => source.is_cancelled(),
			_ => false,
		}
	}

	pub(crate) fn in_stage(self, stage: StageName) -> Self {
		if self.is_cancelled() {
			return Self::Cancelled;
		}

		Self::Stage { stage, source: Box::new(self) }
	}
}
