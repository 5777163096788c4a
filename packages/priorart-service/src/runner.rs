use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
	AssessmentOutcome, BoxFuture, LandscapeAnalysis, LandscapeAnalyzer, ReasoningProvider,
	RelevanceAssessor, RequestEnvelope, StageExecutor, StageRun, StageRunner, strategy,
};
use priorart_config::Config;
use priorart_domain::{
	landscape::LandscapeStats,
	patent::{PatentRecord, RelevanceAssessment},
	strategy::StrategyDocument,
};

/// [`StageRunner`] backed by a reasoning provider.
#[derive(Clone)]
pub struct LlmStageRunner {
	executor: StageExecutor,
	assessor: RelevanceAssessor,
	analyzer: LandscapeAnalyzer,
}
impl LlmStageRunner {
	pub fn new(reasoner: Arc<dyn ReasoningProvider>, cfg: &Config) -> Self {
		let executor = StageExecutor::new(
			reasoner,
			cfg.pipeline.max_stage_attempts,
			Duration::from_millis(cfg.pipeline.backoff_base_ms),
		);
		let assessor = RelevanceAssessor::new(executor.clone(), cfg.assessment.clone());
		let analyzer = LandscapeAnalyzer::new(executor.clone());

		Self { executor, assessor, analyzer }
	}
}

impl StageRunner for LlmStageRunner {
	fn extract_strategy<'a>(
		&'a self,
		request: &'a RequestEnvelope,
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, StageRun<StrategyDocument>> {
		Box::pin(strategy::extract_strategy(&self.executor, request, cancel))
	}

	fn assess<'a>(
		&'a self,
		strategy: &'a StrategyDocument,
		patents: &'a [PatentRecord],
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, StageRun<AssessmentOutcome>> {
		Box::pin(self.assessor.assess(strategy, patents, cancel))
	}

	fn analyze_landscape<'a>(
		&'a self,
		strategy: &'a StrategyDocument,
		stats: &'a LandscapeStats,
		assessments: &'a [RelevanceAssessment],
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, StageRun<LandscapeAnalysis>> {
		Box::pin(self.analyzer.analyze(strategy, stats, assessments, cancel))
	}

	fn model_name(&self) -> &str {
		self.executor.model_name()
	}
}
