//! Batched relevance assessment of retrieved patents.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result, StageAttemptMetrics, StageExecutor, StageName, StageRun, limiter};
use priorart_domain::{
	patent::{self, PatentRecord, Relevance, RelevanceAssessment},
	strategy::StrategyDocument,
	text,
};
use priorart_providers::reasoning::strip_code_fences;

const PROMPT_ABSTRACT_CHARS: usize = 600;

const ASSESSMENT_INSTRUCTIONS: &str = r#"For each patent, provide:
1. RELEVANCE:
   - HIGH: Same problem, same or very similar approach. Potential anticipation or obviousness.
   - MEDIUM: Related problem or overlapping techniques. Possibly obvious when combined.
     Worth reviewing.
   - LOW: Same domain, different problem or approach. Unlikely to be cited.
   - NONE: Not relevant.
   Default to MEDIUM if unsure between HIGH and MEDIUM. Default to LOW if unsure between
   MEDIUM and LOW.

2. OVERLAP DESCRIPTION: 1-3 sentences on what overlaps (or does not).

3. NOVEL ELEMENTS COVERED: Which elements does this patent address? Use IDs (NE1, NE2, ...).
   Empty array if none.

4. CONFIDENCE: float between 0.0 and 1.0.

Required output schema:
{
  "assessments": [
    {
      "patent_id": "string",
      "relevance": "HIGH | MEDIUM | LOW | NONE",
      "overlap_description": "string",
      "novel_elements_covered": ["NE1"],
      "confidence": 0.0
    }
  ]
}

Return one assessment per patent, in the same order as input."#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssessmentOutcome {
	/// Sorted; NONE assessments are excluded.
	pub assessments: Vec<RelevanceAssessment>,
	pub abstracts_missing: u32,
	pub truncated: bool,
	pub assessed_none: u32,
	pub foreign_dropped: u32,
	pub fallbacks: u32,
	pub batches: u32,
}

#[derive(Deserialize)]
struct BatchReply {
	#[serde(default)]
	assessments: Vec<RelevanceAssessment>,
}

#[derive(Clone)]
pub struct RelevanceAssessor {
	executor: StageExecutor,
	settings: priorart_config::Assessment,
}
impl RelevanceAssessor {
	pub fn new(executor: StageExecutor, settings: priorart_config::Assessment) -> Self {
		Self { executor, settings }
	}

	pub async fn assess(
		&self,
		strategy: &StrategyDocument,
		patents: &[PatentRecord],
		cancel: &CancellationToken,
	) -> StageRun<AssessmentOutcome> {
		let mut metrics = StageAttemptMetrics::default();
		let mut outcome = AssessmentOutcome::default();
		let mut candidates = Vec::with_capacity(patents.len());

		for patent in patents {
			if patent.has_abstract() {
				candidates.push(patent.clone());
			} else {
				outcome.abstracts_missing += 1;
			}
		}

		patent::sort_for_assessment(&mut candidates);

		let max_assessed = self.settings.max_assessed as usize;

		if candidates.len() > max_assessed {
			tracing::info!(
				candidates = candidates.len(),
				max_assessed,
				"Truncating assessment candidates."
			);

			candidates.truncate(max_assessed);

			outcome.truncated = true;
		}

		let known = strategy.novel_element_ids();
		let mut collected = Vec::with_capacity(candidates.len());

		for batch in candidates.chunks(self.settings.batch_size.max(1) as usize) {
			outcome.batches += 1;

			match self.assess_batch(strategy, batch, &known, cancel, &mut metrics, &mut outcome).await
			{
				Ok(assessments) => collected.extend(assessments),
				Err(err) => return StageRun::new(Err(err), metrics).with_partial(outcome),
			}
		}

		let before = collected.len();

		collected.retain(|assessment| assessment.relevance != Relevance::None);

		outcome.assessed_none = (before - collected.len()) as u32;

		let grant_dates = candidates
			.iter()
			.map(|p| (p.patent_id.as_str(), p.grant_date.as_str()))
			.collect::<HashMap<_, _>>();

		patent::sort_assessments(&mut collected, &grant_dates);

		outcome.assessments = collected;

		tracing::info!(
			batches = outcome.batches,
			kept = outcome.assessments.len(),
			assessed_none = outcome.assessed_none,
			fallbacks = outcome.fallbacks,
			"Relevance assessment finished."
		);

		StageRun::new(Ok(outcome), metrics)
	}

	/// Assesses one batch, re-issuing it while any member is missing and attempts remain.
	async fn assess_batch(
		&self,
		strategy: &StrategyDocument,
		batch: &[PatentRecord],
		known: &HashSet<&str>,
		cancel: &CancellationToken,
		metrics: &mut StageAttemptMetrics,
		outcome: &mut AssessmentOutcome,
	) -> Result<Vec<RelevanceAssessment>> {
		let stage = StageName::Assessment;
		let max_attempts = self.settings.max_attempts.max(1);
		let members = batch.iter().map(|p| p.patent_id.as_str()).collect::<HashSet<_>>();
		let prompt = build_assessment_prompt(strategy, batch);
		let mut feedback: Option<String> = None;

		for attempt in 1..=max_attempts {
			metrics.attempts += 1;

			let last = attempt == max_attempts;
			let full_prompt = match &feedback {
				Some(feedback) => format!("{prompt}\n\n{feedback}"),
				None => prompt.clone(),
			};
			let raw = match self.executor.call(&full_prompt, cancel).await {
				Ok(raw) => raw,
				Err(Error::Provider(err)) if err.class().is_transient() && !last => {
					tracing::warn!(%stage, attempt, error = %err, "Assessment batch transport failure.");

					metrics.transport_retries += 1;

					limiter::sleep_or_cancel(
						limiter::backoff_delay(self.executor.backoff_base(), attempt),
						cancel,
					)
					.await?;

					continue;
				},
				Err(err) => return Err(err),
			};
			let reply = match serde_json::from_str::<BatchReply>(strip_code_fences(&raw)) {
				Ok(reply) => reply,
				Err(err) => {
					tracing::warn!(%stage, attempt, error = %err, "Assessment batch returned invalid JSON.");

					if last {
						return Err(Error::Content {
							message: format!("{stage} returned invalid JSON: {err}"),
						});
					}

					metrics.content_retries += 1;
					feedback =
						Some("Your previous response was not valid JSON. Return valid JSON only.".to_string());

					continue;
				},
			};
			let mut accepted = HashMap::new();

			for assessment in reply.assessments {
				let id = assessment.patent_id.trim();

				if !members.contains(id) {
					tracing::warn!(patent_id = %id, "Dropping assessment for a patent outside the batch.");

					outcome.foreign_dropped += 1;

					continue;
				}

				accepted.insert(id.to_string(), patent::sanitize_assessment(assessment, known));
			}

			let missing = batch
				.iter()
				.map(|p| p.patent_id.as_str())
				.filter(|id| !accepted.contains_key(*id))
				.collect::<Vec<_>>();

			if !missing.is_empty() && !last {
				tracing::warn!(%stage, attempt, missing = missing.len(), "Assessment batch is incomplete.");

				metrics.content_retries += 1;
				feedback = Some(format!(
					"Your previous response omitted assessments for: {}. Return one assessment for every patent.",
					missing.join(", ")
				));

				continue;
			}

			let assessments = batch
				.iter()
				.map(|p| {
					accepted.remove(&p.patent_id).unwrap_or_else(|| {
						tracing::warn!(patent_id = %p.patent_id, "Synthesizing fallback assessment.");

						outcome.fallbacks += 1;

						RelevanceAssessment::fallback(p.patent_id.clone())
					})
				})
				.collect();

			return Ok(assessments);
		}

		Err(Error::Content { message: format!("{stage} batch failed after retries.") })
	}
}

pub fn build_assessment_prompt(strategy: &StrategyDocument, batch: &[PatentRecord]) -> String {
	let mut prompt = String::with_capacity(2_048 + batch.len() * 1_024);

	prompt.push_str("Return valid JSON only. No markdown fences, no commentary.\n\n");
	prompt.push_str("You are a patent analyst assessing prior art relevance.\n\n");
	prompt.push_str("INVENTION SUMMARY:\n");
	prompt.push_str(&strategy.invention_summary);
	prompt.push_str("\n\nNOVEL ELEMENTS:\n");

	for element in &strategy.novel_elements {
		prompt.push_str(&format!("{}: {}\n", element.id, element.description));
	}

	prompt.push_str("\nPATENTS TO ASSESS (assess each one):\n");

	for (idx, patent) in batch.iter().enumerate() {
		prompt.push_str(&format!(
			"INDEX: {idx}\nPATENT_ID: {}\nTITLE: {}\nABSTRACT: {}\nGRANT_DATE: {}\nASSIGNEE: {}\n\n",
			patent.patent_id,
			patent.title,
			text::clamp_text(&patent.abstract_text, PROMPT_ABSTRACT_CHARS),
			patent.grant_date,
			patent.primary_assignee(),
		));
	}

	prompt.push_str(ASSESSMENT_INSTRUCTIONS);

	prompt
}
