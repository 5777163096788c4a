//! Run orchestration: stage sequencing, input limits, degradation and run metadata.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
	AssessmentOutcome, Error, LlmStageRunner, RequestEnvelope, Result, SearchExecutor,
	SearchOutcome, SearchRunner, StageAttemptMetrics, StageName, StageRunner,
};
use priorart_config::Config;
use priorart_domain::{
	landscape::{self, Determination, LandscapeNarrative, LandscapeStats, NarrativeCorrection},
	strategy::StrategyDocument,
	text,
};
use priorart_providers::{patents::PatentSearchClient, reasoning::ReasoningClient};

/// Progress sink invoked synchronously before and after each stage.
pub type ProgressFn<'a> = dyn Fn(StageName, &str) + Send + Sync + 'a;

/// Which report presentation the result supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLayout {
	Full,
	/// Assessment failed; only raw search results and statistics exist.
	UnscoredResults,
	/// Landscape narrative failed; assessments and statistics exist.
	StatisticsOnly,
}

/// One decision the run made on its own, recorded for auditing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEntry {
	InputTruncated { original_chars: usize, kept_chars: usize },
	PatentCapReached { strategy_id: String, max_patents: usize },
	AssessmentTruncated { max_assessed: usize },
	ForeignAssessmentsDropped { count: u32 },
	FallbackAssessments { count: u32 },
	StageDegraded { stage: StageName, layout: ReportLayout, error: String },
	NarrativeCorrected { correction: NarrativeCorrection },
	FallbackDetermination { determination: Determination },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
	pub run_id: Uuid,
	pub model: String,
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub completed_at: OffsetDateTime,
	pub duration_ms: u64,
	pub input_truncated: bool,
	pub degraded: bool,
	pub degraded_reason: Option<String>,
	pub stages_executed: Vec<StageName>,
	pub stages_failed: Vec<StageName>,
	pub stage_attempts: BTreeMap<StageName, StageAttemptMetrics>,
	pub api_calls: u32,
	pub patents_retrieved: u32,
	pub patents_assessed: u32,
	pub abstracts_missing: u32,
	pub assessment_truncated: bool,
	pub assessed_none: u32,
	pub fallback_assessments: u32,
	pub foreign_assessments_dropped: u32,
}
impl RunMetadata {
	fn start(model: &str) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			run_id: Uuid::new_v4(),
			model: model.to_string(),
			started_at: now,
			completed_at: now,
			duration_ms: 0,
			input_truncated: false,
			degraded: false,
			degraded_reason: None,
			stages_executed: Vec::new(),
			stages_failed: Vec::new(),
			stage_attempts: BTreeMap::new(),
			api_calls: 0,
			patents_retrieved: 0,
			patents_assessed: 0,
			abstracts_missing: 0,
			assessment_truncated: false,
			assessed_none: 0,
			fallback_assessments: 0,
			foreign_assessments_dropped: 0,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
	pub request: RequestEnvelope,
	pub strategy: StrategyDocument,
	pub search: SearchOutcome,
	pub assessment: Option<AssessmentOutcome>,
	pub landscape: Option<LandscapeNarrative>,
	pub stats: LandscapeStats,
	pub determination: Determination,
	pub layout: ReportLayout,
	pub metadata: RunMetadata,
	pub trace: Vec<TraceEntry>,
}

pub struct Pipeline {
	runner: Arc<dyn StageRunner>,
	searcher: Arc<dyn SearchRunner>,
	settings: priorart_config::Pipeline,
	max_patents: usize,
	max_assessed: usize,
}
impl Pipeline {
	pub fn new(
		runner: Arc<dyn StageRunner>,
		searcher: Arc<dyn SearchRunner>,
		cfg: &Config,
	) -> Self {
		Self {
			runner,
			searcher,
			settings: cfg.pipeline.clone(),
			max_patents: cfg.search.max_patents as usize,
			max_assessed: cfg.assessment.max_assessed as usize,
		}
	}

	/// Wires the live reasoning and patent-search clients.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let reasoner = Arc::new(ReasoningClient::new(&cfg.providers.reasoning)?);
		let transport = Arc::new(PatentSearchClient::new(&cfg.providers.patent_search)?);
		let runner = Arc::new(LlmStageRunner::new(reasoner, cfg));
		let searcher = Arc::new(SearchExecutor::new(transport, cfg.search.clone()));

		Ok(Self::new(runner, searcher, cfg))
	}

	pub async fn run(
		&self,
		request: RequestEnvelope,
		cancel: &CancellationToken,
	) -> Result<PipelineResult> {
		self.run_with_progress(request, cancel, &|_: StageName, _: &str| {}).await
	}

	pub async fn run_with_progress(
		&self,
		mut request: RequestEnvelope,
		cancel: &CancellationToken,
		progress: &ProgressFn<'_>,
	) -> Result<PipelineResult> {
		let started = Instant::now();
		let mut metadata = RunMetadata::start(self.runner.model_name());
		let mut trace = Vec::new();

		self.validate(&request)?;

		let max_chars = self.settings.max_disclosure_chars as usize;

		if let Some((cut, _)) = request.disclosure_text.char_indices().nth(max_chars) {
			let original_chars = request.disclosure_text.chars().count();

			tracing::warn!(
				case_id = %request.case_id,
				original_chars,
				kept_chars = max_chars,
				"Disclosure exceeds the input limit and was truncated."
			);

			request.disclosure_text.truncate(cut);

			metadata.input_truncated = true;

			trace.push(TraceEntry::InputTruncated { original_chars, kept_chars: max_chars });
		}

		tracing::info!(
			run_id = %metadata.run_id,
			case_id = %request.case_id,
			model = %metadata.model,
			"Prior-art run started."
		);

		progress(StageName::Strategy, "Building search strategy.");

		let strategy_run = self.runner.extract_strategy(&request, cancel).await;

		metadata.stage_attempts.insert(StageName::Strategy, strategy_run.metrics);

		let strategy = strategy_run.output.map_err(|err| err.in_stage(StageName::Strategy))?;

		metadata.stages_executed.push(StageName::Strategy);
		progress(StageName::Strategy, "Search strategy ready.");
		progress(StageName::Search, "Executing patent search.");

		let search =
			self.searcher.run(&strategy, cancel).await.map_err(|err| err.in_stage(StageName::Search))?;

		metadata.stages_executed.push(StageName::Search);
		metadata.stage_attempts.insert(
			StageName::Search,
			StageAttemptMetrics {
				attempts: search.total_api_calls,
				content_retries: 0,
				transport_retries: search.retries,
			},
		);
		metadata.api_calls = search.total_api_calls;
		metadata.patents_retrieved = search.patents.len() as u32;

		if let Some(strategy_id) = &search.cap_reached_by {
			trace.push(TraceEntry::PatentCapReached {
				strategy_id: strategy_id.clone(),
				max_patents: self.max_patents,
			});
		}

		progress(
			StageName::Search,
			&format!("Patent search returned {} patents.", search.patents.len()),
		);
		progress(StageName::Assessment, "Assessing relevance.");

		let assessment_run = self.runner.assess(&strategy, &search.patents, cancel).await;

		metadata.stage_attempts.insert(StageName::Assessment, assessment_run.metrics);
		metadata.stages_executed.push(StageName::Assessment);

		let assessment = match assessment_run.output {
			Ok(assessment) => assessment,
			Err(err) if err.is_cancelled() => return Err(Error::Cancelled),
			Err(err) => {
				if let Some(partial) = &assessment_run.partial {
					self.record_assessment(&mut metadata, &mut trace, partial);
				}

				let stats = landscape::compute_landscape_stats(
					&strategy.novel_elements,
					&search.patents,
					&[],
				);
				let determination = landscape::fallback_determination(&[], search.patents.len());

				self.degrade(
					&mut metadata,
					&mut trace,
					StageName::Assessment,
					ReportLayout::UnscoredResults,
					&err,
				);
				trace.push(TraceEntry::FallbackDetermination { determination });
				progress(StageName::Assessment, "Relevance assessment failed; continuing degraded.");

				return Ok(self.finish(PipelineFinish {
					request,
					strategy,
					search,
					assessment: None,
					landscape: None,
					stats,
					determination,
					layout: ReportLayout::UnscoredResults,
					metadata,
					trace,
					started,
				}));
			},
		};

		self.record_assessment(&mut metadata, &mut trace, &assessment);

		progress(
			StageName::Assessment,
			&format!("Relevance assessment kept {} patents.", assessment.assessments.len()),
		);

		let stats = landscape::compute_landscape_stats(
			&strategy.novel_elements,
			&search.patents,
			&assessment.assessments,
		);

		progress(StageName::Landscape, "Building landscape analysis.");

		let landscape_run = self
			.runner
			.analyze_landscape(&strategy, &stats, &assessment.assessments, cancel)
			.await;

		metadata.stage_attempts.insert(StageName::Landscape, landscape_run.metrics);
		metadata.stages_executed.push(StageName::Landscape);

		let (landscape, determination, layout) = match landscape_run.output {
			Ok(analysis) => {
				trace.extend(
					analysis
						.corrections
						.into_iter()
						.map(|correction| TraceEntry::NarrativeCorrected { correction }),
				);
				progress(StageName::Landscape, "Landscape analysis ready.");

				let determination = analysis.narrative.determination;

				(Some(analysis.narrative), determination, ReportLayout::Full)
			},
			Err(err) if err.is_cancelled() => return Err(Error::Cancelled),
			Err(err) => {
				let determination = landscape::fallback_determination(
					&assessment.assessments,
					search.patents.len(),
				);

				self.degrade(
					&mut metadata,
					&mut trace,
					StageName::Landscape,
					ReportLayout::StatisticsOnly,
					&err,
				);
				trace.push(TraceEntry::FallbackDetermination { determination });
				progress(StageName::Landscape, "Landscape analysis failed; continuing degraded.");

				(None, determination, ReportLayout::StatisticsOnly)
			},
		};

		Ok(self.finish(PipelineFinish {
			request,
			strategy,
			search,
			assessment: Some(assessment),
			landscape,
			stats,
			determination,
			layout,
			metadata,
			trace,
			started,
		}))
	}

	fn validate(&self, request: &RequestEnvelope) -> Result<()> {
		if request.case_id.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "case_id is required.".to_string() });
		}

		let min_chars = self.settings.min_disclosure_chars as usize;

		if text::char_len(&request.disclosure_text) < min_chars {
			return Err(Error::InvalidRequest {
				message: format!(
					"disclosure_text is insufficient for analysis; at least {min_chars} characters are required."
				),
			});
		}

		Ok(())
	}

	/// Copies assessment counters into the metadata, whether or not the stage completed.
	fn record_assessment(
		&self,
		metadata: &mut RunMetadata,
		trace: &mut Vec<TraceEntry>,
		assessment: &AssessmentOutcome,
	) {
		metadata.patents_assessed = assessment.assessments.len() as u32;
		metadata.abstracts_missing = assessment.abstracts_missing;
		metadata.assessment_truncated = assessment.truncated;
		metadata.assessed_none = assessment.assessed_none;
		metadata.fallback_assessments = assessment.fallbacks;
		metadata.foreign_assessments_dropped = assessment.foreign_dropped;

		if assessment.truncated {
			trace.push(TraceEntry::AssessmentTruncated { max_assessed: self.max_assessed });
		}
		if assessment.foreign_dropped > 0 {
			trace.push(TraceEntry::ForeignAssessmentsDropped { count: assessment.foreign_dropped });
		}
		if assessment.fallbacks > 0 {
			trace.push(TraceEntry::FallbackAssessments { count: assessment.fallbacks });
		}
	}

	fn degrade(
		&self,
		metadata: &mut RunMetadata,
		trace: &mut Vec<TraceEntry>,
		stage: StageName,
		layout: ReportLayout,
		err: &Error,
	) {
		let reason = if layout == ReportLayout::UnscoredResults {
			"Relevance assessment failed. Results are unscored search results only."
		} else {
			"Landscape analysis failed. Results carry computed statistics without narrative."
		};

		tracing::warn!(%stage, ?layout, error = %err, "Stage failed; run continues degraded.");

		metadata.degraded = true;
		metadata.degraded_reason = Some(reason.to_string());
		metadata.stages_failed.push(stage);

		trace.push(TraceEntry::StageDegraded { stage, layout, error: err.to_string() });
	}

	fn finish(&self, parts: PipelineFinish) -> PipelineResult {
		let PipelineFinish {
			request,
			strategy,
			search,
			assessment,
			landscape,
			stats,
			determination,
			layout,
			mut metadata,
			trace,
			started,
		} = parts;
		let elapsed: Duration = started.elapsed();

		metadata.completed_at = OffsetDateTime::now_utc();
		metadata.duration_ms = elapsed.as_millis() as u64;

		tracing::info!(
			run_id = %metadata.run_id,
			?determination,
			?layout,
			degraded = metadata.degraded,
			duration_ms = metadata.duration_ms,
			"Prior-art run finished."
		);

		PipelineResult {
			request,
			strategy,
			search,
			assessment,
			landscape,
			stats,
			determination,
			layout,
			metadata,
			trace,
		}
	}
}

struct PipelineFinish {
	request: RequestEnvelope,
	strategy: StrategyDocument,
	search: SearchOutcome,
	assessment: Option<AssessmentOutcome>,
	landscape: Option<LandscapeNarrative>,
	stats: LandscapeStats,
	determination: Determination,
	layout: ReportLayout,
	metadata: RunMetadata,
	trace: Vec<TraceEntry>,
	started: Instant,
}
