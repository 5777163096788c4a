use tokio_util::sync::CancellationToken;

use crate::{RequestEnvelope, StageExecutor, StageName, StageRun};
use priorart_domain::strategy::{self, StrategyDocument};

const STRATEGY_INSTRUCTIONS: &str = r#"You are a patent search strategist. Given an invention disclosure, produce
a search plan for a patent full-text search API and extract key invention
metadata.

IMPORTANT: Return valid JSON only. No markdown fences, no commentary, no
preamble. Your entire response must be a single JSON object matching the
schema below.

PART 1: INVENTION EXTRACTION

Extract from the disclosure:
- A concise title for the invention (10-200 chars)
- A one-paragraph summary (50-500 chars)
- The 3-10 novel elements that distinguish this invention from prior work.
  Assign each a stable ID (NE1, NE2, ... NE10).
- The broad technology domains (1-5)

PART 2: SEARCH PLAN

Cover the invention from multiple angles:
1. DIRECT MATCH: Terms describing the core mechanism or method.
2. COMPONENT MATCH: Terms for individual components or subsystems.
3. PROBLEM-SOLUTION MATCH: Terms for the problem and general solution category.

For each query strategy, provide TERM FAMILIES. Patent literature uses
different vocabulary than disclosures. For each core concept, provide the
canonical term, single-word synonyms, abbreviations and acronyms, and common
patent-language variants.

Multi-word terms belong in PHRASES, not in the synonyms list. The search
system tokenizes synonyms on whitespace.

For CPC codes provide SUBCLASS-level codes only (4 characters, e.g. "G06N",
"A61K", "H04L"). Do NOT provide group-level codes such as "G06N3/08".

List items most-important-first within all arrays.

Generate between 3 and 5 query strategies."#;

const STRATEGY_SCHEMA: &str = r#"{
  "invention_title": "string (10-200 chars)",
  "invention_summary": "string (50-500 chars)",
  "novel_elements": [
    { "id": "string (NE1, NE2, ... NE10)", "description": "string (20-300 chars)" }
  ],
  "technology_domains": ["string (1-5 entries)"],
  "query_strategies": [
    {
      "id": "string (Q1, Q2, ...)",
      "description": "string (20-200 chars)",
      "term_families": [
        {
          "canonical": "string",
          "synonyms": ["string (0-8 entries)"],
          "acronyms": ["string (0-4 entries)"],
          "patent_variants": ["string (0-4 entries)"]
        }
      ],
      "phrases": ["string (multi-word exact phrases, 0-5 entries)"],
      "cpc_subclasses": ["string (0-5 entries)"],
      "priority": "PRIMARY | SECONDARY | TERTIARY"
    }
  ],
  "confidence_score": "float (0.0-1.0)",
  "confidence_reason": "string (min 10 chars)"
}"#;

pub fn build_strategy_prompt(request: &RequestEnvelope) -> String {
	let mut prompt = String::with_capacity(request.disclosure_text.len() + 4_096);

	prompt.push_str("Return valid JSON only. No markdown fences, no commentary.\n\n");
	prompt.push_str(STRATEGY_INSTRUCTIONS);

	if let Some(concerns) = request.prior_context.as_ref().and_then(|ctx| ctx.concerns.as_ref()) {
		prompt.push_str(&format!(
			"\n\nAn earlier eligibility screen identified these concerns:\n\n\
			Novelty concerns: [{}]\n\
			Non-obviousness concerns: [{}]\n\
			Search priority: [{}]\n\n\
			Use these to sharpen your search. Novelty concerns indicate where prior art is most likely.\n",
			concerns.novelty_concerns.join("; "),
			concerns.non_obviousness_concerns.join("; "),
			concerns.search_priority,
		));
	}
	if let Some(extraction) = request.prior_context.as_ref().and_then(|ctx| ctx.extraction.as_ref())
	{
		prompt.push_str(&format!(
			"\nAn earlier eligibility screen extracted:\n\n\
			Title: [{}]\n\
			Technology area: [{}]\n\
			Novel elements: [{}]\n\
			Description: [{}]\n\n\
			Use this to inform your term families and CPC classification. You may adopt the title and novel elements directly or refine them.\n",
			extraction.invention_title,
			extraction.technology_area,
			extraction.novel_elements.join("; "),
			extraction.invention_description,
		));
	}

	prompt.push_str("\nRequired output schema:\n");
	prompt.push_str(STRATEGY_SCHEMA);
	prompt.push_str("\n\nDISCLOSURE:\n");
	prompt.push_str(&request.disclosure_text);

	prompt
}

pub async fn extract_strategy(
	executor: &StageExecutor,
	request: &RequestEnvelope,
	cancel: &CancellationToken,
) -> StageRun<StrategyDocument> {
	let prompt = build_strategy_prompt(request);

	executor
		.run(StageName::Strategy, &prompt, cancel, |mut doc: StrategyDocument| {
			strategy::normalize_strategy_document(&mut doc)?;

			Ok(doc)
		})
		.await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{PriorContext, ScreenConcerns};

	#[test]
	fn prompt_weaves_in_prior_concerns() {
		let request = RequestEnvelope {
			case_id: "case-1".to_string(),
			disclosure_text: "DISCLOSURE BODY".to_string(),
			prior_context: Some(PriorContext {
				concerns: Some(ScreenConcerns {
					novelty_concerns: vec!["crack healing".to_string(), "dendrites".to_string()],
					non_obviousness_concerns: Vec::new(),
					search_priority: "HIGH".to_string(),
				}),
				extraction: None,
			}),
		};
		let prompt = build_strategy_prompt(&request);

		assert!(prompt.contains("Novelty concerns: [crack healing; dendrites]"));
		assert!(prompt.contains("Search priority: [HIGH]"));
		assert!(!prompt.contains("An earlier eligibility screen extracted"));
		assert!(prompt.ends_with("DISCLOSURE:\nDISCLOSURE BODY"));
	}
}
