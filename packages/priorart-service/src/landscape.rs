
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{StageExecutor, StageName, StageRun};
use priorart_domain::{
	landscape::{self, LandscapeNarrative, LandscapeStats, NarrativeCorrection, RawLandscapeNarrative},
	patent::RelevanceAssessment,
	strategy::StrategyDocument,
	text,
};

const PRIOR_ART_ABSTRACT_CHARS: usize = 200;

const LANDSCAPE_INSTRUCTIONS: &str = r#"Analyze:

1. LANDSCAPE DENSITY: DENSE, MODERATE, or SPARSE?

2. KEY PLAYERS: Using the assignee frequency above, identify the top 3-5 and explain why they
   matter. Do NOT invent patent counts; use the numbers provided above. Copy each name EXACTLY
   as it appears in ASSIGNEE FREQUENCY.

3. BLOCKING RISK: Are there patents that directly anticipate or render obvious the core
   invention? Cite specific patent IDs from the TOP PRIOR ART list above. Only cite patents
   that appear in that list.

4. DESIGN-AROUND POTENTIAL: Are existing patents narrow or broad?

5. WHITE SPACE: Using novel element coverage, which aspects have the least coverage? These
   are the strongest claim candidates. Provide 1-5 entries.

6. DETERMINATION: CLEAR_FIELD, CROWDED_FIELD, BLOCKING_ART_FOUND, or INCONCLUSIVE.

Required output schema:
{
  "density": "DENSE | MODERATE | SPARSE",
  "density_reasoning": "string",
  "key_players": [
    { "name": "string", "patent_count": 0, "relevance_note": "string" }
  ],
  "blocking_risk": {
    "level": "HIGH | MEDIUM | LOW | NONE",
    "blocking_patent_ids": ["string"],
    "reasoning": "string"
  },
  "design_around": { "level": "EASY | MODERATE | DIFFICULT", "reasoning": "string" },
  "white_space": ["string"],
  "determination": "CLEAR_FIELD | CROWDED_FIELD | BLOCKING_ART_FOUND | INCONCLUSIVE",
  "determination_reasoning": "string",
  "confidence": 0.0,
  "confidence_reason": "string (min 10 chars)"
}"#;

/// Reconciled narrative plus every correction applied to the model's reply.
#[derive(Debug, Clone, Serialize)]
pub struct LandscapeAnalysis {
	pub narrative: LandscapeNarrative,
	pub corrections: Vec<NarrativeCorrection>,
}

#[derive(Clone)]
pub struct LandscapeAnalyzer {
	executor: StageExecutor,
}
impl LandscapeAnalyzer {
	pub fn new(executor: StageExecutor) -> Self {
		Self { executor }
	}

	pub async fn analyze(
		&self,
		strategy: &StrategyDocument,
		stats: &LandscapeStats,
		assessments: &[RelevanceAssessment],
		cancel: &CancellationToken,
	) -> StageRun<LandscapeAnalysis> {
		let prompt = build_landscape_prompt(strategy, stats);

		self.executor
			.run(StageName::Landscape, &prompt, cancel, |raw: RawLandscapeNarrative| {
				let (narrative, corrections) = landscape::reconcile_narrative(raw, stats, assessments)?;

				Ok(LandscapeAnalysis { narrative, corrections })
			})
			.await
	}
}

pub fn build_landscape_prompt(strategy: &StrategyDocument, stats: &LandscapeStats) -> String {
	let mut prompt = String::with_capacity(8_192);

	prompt.push_str("Return valid JSON only. No markdown fences, no commentary.\n\n");
	prompt.push_str(
		"You are a patent landscape analyst preparing a summary for a technology transfer officer.\n\n",
	);
	prompt.push_str("INVENTION SUMMARY:\n");
	prompt.push_str(&strategy.invention_summary);
	prompt.push_str("\n\nNOVEL ELEMENTS:\n");

	for element in &strategy.novel_elements {
		prompt.push_str(&format!("{}: {}\n", element.id, element.description));
	}

	prompt.push_str("\nASSIGNEE FREQUENCY (computed, accurate):\n");

	for row in &stats.assignee_frequency {
		prompt.push_str(&format!("{}: {} patents\n", row.name, row.count));
	}

	prompt.push_str("\nCPC DISTRIBUTION (computed, accurate):\n");

	for row in &stats.cpc_histogram {
		prompt.push_str(&format!("{}: {} patents\n", row.subclass, row.count));
	}

	prompt.push_str("\nNOVEL ELEMENT COVERAGE (computed, accurate):\n");

	for row in &stats.element_coverage {
		prompt.push_str(&format!(
			"{}: {} patents ({} HIGH, {} MEDIUM)\n",
			row.id, row.total_count, row.high_count, row.medium_count
		));
	}

	prompt.push_str(&format!(
		"\nSEARCH STATISTICS:\nTotal patents retrieved: {}\nTotal assessed: {}\nHIGH relevance: {}\nMEDIUM relevance: {}\n\n",
		stats.total_retrieved, stats.total_assessed, stats.high_count, stats.medium_count,
	));

	prompt.push_str("TOP PRIOR ART (up to 20, HIGH and MEDIUM only):\n");

	for entry in &stats.top_prior_art {
		prompt.push_str(&format!(
			"PATENT_ID: {}\nTITLE: {}\nABSTRACT: {}\nGRANT_DATE: {}\nASSIGNEE: {}\nRELEVANCE: {}\nOVERLAP: {}\nELEMENTS COVERED: {}\n\n",
			entry.patent_id,
			entry.title,
			text::clamp_text(&entry.abstract_text, PRIOR_ART_ABSTRACT_CHARS),
			entry.grant_date,
			entry.primary_assignee,
			entry.relevance.as_str(),
			entry.overlap_description,
			entry.novel_elements_covered.join(", "),
		));
	}

	prompt.push_str(LANDSCAPE_INSTRUCTIONS);

	prompt
}
