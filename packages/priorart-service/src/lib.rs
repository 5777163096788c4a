pub mod assess;
pub mod landscape;
pub mod limiter;
pub mod pipeline;
pub mod request;
pub mod runner;
pub mod search;
pub mod stage;
pub mod strategy;

mod error;

use std::{future::Future, pin::Pin};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use assess::{AssessmentOutcome, RelevanceAssessor};
pub use error::{Error, Result};
pub use landscape::{LandscapeAnalysis, LandscapeAnalyzer};
pub use pipeline::{
	Pipeline, PipelineResult, ProgressFn, ReportLayout, RunMetadata, TraceEntry,
};
pub use request::{PriorContext, RequestEnvelope, ScreenConcerns, ScreenExtraction};
pub use runner::LlmStageRunner;
pub use search::{SearchExecutor, SearchOutcome};
pub use stage::{StageAttemptMetrics, StageExecutor, StageName, StageRun};

use priorart_domain::{
	landscape::LandscapeStats,
	patent::{PatentRecord, RelevanceAssessment},
	strategy::StrategyDocument,
};
use priorart_providers::{
	patents::{PatentSearchClient, SearchResponse},
	reasoning::ReasoningClient,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Structured-reasoning capability: prompt in, raw reply text out.
pub trait ReasoningProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, priorart_providers::Result<String>>;

	fn model_name(&self) -> &str;
}

/// One POST against the patent-search API.
pub trait SearchTransport
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		body: &'a Value,
	) -> BoxFuture<'a, priorart_providers::Result<SearchResponse>>;
}

/// The three reasoning-backed stages of a run.
pub trait StageRunner
where
	Self: Send + Sync,
{
	fn extract_strategy<'a>(
		&'a self,
		request: &'a RequestEnvelope,
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, StageRun<StrategyDocument>>;

	fn assess<'a>(
		&'a self,
		strategy: &'a StrategyDocument,
		patents: &'a [PatentRecord],
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, StageRun<AssessmentOutcome>>;

	fn analyze_landscape<'a>(
		&'a self,
		strategy: &'a StrategyDocument,
		stats: &'a LandscapeStats,
		assessments: &'a [RelevanceAssessment],
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, StageRun<LandscapeAnalysis>>;

	fn model_name(&self) -> &str;
}

pub trait SearchRunner
where
	Self: Send + Sync,
{
	fn run<'a>(
		&'a self,
		strategy: &'a StrategyDocument,
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, Result<SearchOutcome>>;
}

impl ReasoningProvider for ReasoningClient {
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, priorart_providers::Result<String>> {
		Box::pin(ReasoningClient::generate(self, prompt))
	}

	fn model_name(&self) -> &str {
		self.model()
	}
}

impl SearchTransport for PatentSearchClient {
	fn search<'a>(
		&'a self,
		body: &'a Value,
	) -> BoxFuture<'a, priorart_providers::Result<SearchResponse>> {
		Box::pin(PatentSearchClient::search(self, body))
	}
}
