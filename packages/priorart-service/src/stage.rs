//! Reasoning-call executor with content re-prompting and transport retries.

use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, ReasoningProvider, Result, limiter};
use priorart_domain::Violation;
use priorart_providers::reasoning::strip_code_fences;

const EMPTY_FEEDBACK: &str = "Your previous response was empty. Return valid JSON only.";
const INVALID_JSON_FEEDBACK: &str =
	"Your previous response was not valid JSON. Return valid JSON only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
	Strategy,
	Search,
	Assessment,
	Landscape,
}
impl StageName {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Strategy => "strategy",
			Self::Search => "search",
			Self::Assessment => "assessment",
			Self::Landscape => "landscape",
		}
	}
}
impl fmt::Display for StageName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAttemptMetrics {
	pub attempts: u32,
	pub content_retries: u32,
	pub transport_retries: u32,
}

/// Outcome of one stage: the output or error, plus attempt metrics either way.
#[derive(Debug)]
pub struct StageRun<T> {
	pub output: Result<T>,
	pub metrics: StageAttemptMetrics,
	/// Counters gathered before the stage failed.
	pub partial: Option<T>,
}
impl<T> StageRun<T> {
	pub fn new(output: Result<T>, metrics: StageAttemptMetrics) -> Self {
		Self { output, metrics, partial: None }
	}

	pub fn with_partial(mut self, partial: T) -> Self {
		self.partial = Some(partial);

		self
	}
}

#[derive(Clone)]
pub struct StageExecutor {
	reasoner: Arc<dyn ReasoningProvider>,
	max_attempts: u32,
	backoff_base: Duration,
}
impl StageExecutor {
	pub fn new(reasoner: Arc<dyn ReasoningProvider>, max_attempts: u32, backoff_base: Duration) -> Self {
		Self { reasoner, max_attempts: max_attempts.max(1), backoff_base }
	}

	pub fn model_name(&self) -> &str {
		self.reasoner.model_name()
	}

	pub fn backoff_base(&self) -> Duration {
		self.backoff_base
	}

	/// One reasoning call, abandoned when `cancel` fires.
	pub async fn call(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(Error::Cancelled),
			res = self.reasoner.generate(prompt) => res.map_err(Error::from),
		}
	}

	/// Calls the reasoner until `accept` takes the parsed reply.
	///
	/// Empty replies, invalid JSON and [`Violation`]s are fed back into the next prompt. Transient
	/// transport failures are retried with backoff. Both share one attempt budget.
	pub async fn run<T, U, F>(
		&self,
		stage: StageName,
		prompt: &str,
		cancel: &CancellationToken,
		mut accept: F,
	) -> StageRun<U>
	where
		T: DeserializeOwned,
		F: FnMut(T) -> Result<U, Violation>,
	{
		let mut metrics = StageAttemptMetrics::default();
		let mut feedback: Option<String> = None;

		for attempt in 1..=self.max_attempts {
			metrics.attempts = attempt;

			let last = attempt == self.max_attempts;
			let full_prompt = match &feedback {
				Some(feedback) => format!("{prompt}\n\n{feedback}"),
				None => prompt.to_string(),
			};
			let started = Instant::now();

			tracing::info!(%stage, attempt, "Reasoning attempt started.");

			let raw = match self.call(&full_prompt, cancel).await {
				Ok(raw) => raw,
				Err(Error::Provider(err)) => {
					let class = err.class();

					tracing::warn!(
						%stage,
						attempt,
						?class,
						elapsed_ms = started.elapsed().as_millis() as u64,
						error = %err,
						"Reasoning attempt transport failure."
					);

					if class.is_transient() && !last {
						metrics.transport_retries += 1;

						if let Err(err) = limiter::sleep_or_cancel(
							limiter::backoff_delay(self.backoff_base, attempt),
							cancel,
						)
						.await
						{
							return StageRun::new(Err(err), metrics);
						}

						continue;
					}

					return StageRun::new(Err(Error::Provider(err)), metrics);
				},
				Err(err) => return StageRun::new(Err(err), metrics),
			};
			let clean = strip_code_fences(&raw);

			if clean.is_empty() {
				tracing::warn!(%stage, attempt, "Reasoning attempt returned an empty response.");

				if last {
					return StageRun::new(
						Err(Error::Content { message: format!("{stage} returned an empty response.") }),
						metrics,
					);
				}

				metrics.content_retries += 1;
				feedback = Some(EMPTY_FEEDBACK.to_string());

				continue;
			}

			let parsed = match serde_json::from_str::<T>(clean) {
				Ok(parsed) => parsed,
				Err(err) => {
					tracing::warn!(%stage, attempt, error = %err, "Reasoning attempt returned invalid JSON.");

					if last {
						return StageRun::new(
							Err(Error::Content { message: format!("{stage} returned invalid JSON: {err}") }),
							metrics,
						);
					}

					metrics.content_retries += 1;
					feedback = Some(INVALID_JSON_FEEDBACK.to_string());

					continue;
				},
			};

			match accept(parsed) {
				Ok(output) => {
					tracing::info!(
						%stage,
						attempt,
						elapsed_ms = started.elapsed().as_millis() as u64,
						response_chars = clean.chars().count(),
						"Reasoning attempt succeeded."
					);

					return StageRun::new(Ok(output), metrics);
				},
				Err(violation) => {
					tracing::warn!(%stage, attempt, violation = %violation, "Reasoning attempt failed validation.");

					if last {
						return StageRun::new(
							Err(Error::Content {
								message: format!("{stage} failed validation: {violation}"),
							}),
							metrics,
						);
					}

					metrics.content_retries += 1;
					feedback = Some(format!(
						"Your response failed validation: {violation}. Fix and return valid JSON only."
					));
				},
			}
		}

		StageRun::new(
			Err(Error::Content { message: format!("{stage} failed after retries.") }),
			metrics,
		)
	}
}
