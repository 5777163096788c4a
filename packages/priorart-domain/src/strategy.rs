//! Search-strategy document produced by the strategy-extraction call, and its normalizer.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
	Result, Violation,
	text::{char_len, clamp_text},
};

pub const MIN_NOVEL_ELEMENTS: usize = 3;
pub const MAX_NOVEL_ELEMENTS: usize = 10;
pub const MIN_STRATEGIES: usize = 3;
pub const MAX_STRATEGIES: usize = 5;
pub const MAX_TERM_FAMILIES: usize = 8;
pub const MAX_PHRASES: usize = 5;
pub const MAX_CPC_SUBCLASSES: usize = 5;
pub const MAX_SYNONYMS: usize = 8;
pub const MAX_ACRONYMS: usize = 4;
pub const MAX_PATENT_VARIANTS: usize = 4;
pub const MAX_TECHNOLOGY_DOMAINS: usize = 5;

const TITLE_CHARS: (usize, usize) = (10, 200);
const SUMMARY_CHARS: (usize, usize) = (50, 500);
const NOVEL_ELEMENT_CHARS: (usize, usize) = (20, 300);
const STRATEGY_DESCRIPTION_CHARS: (usize, usize) = (20, 200);
const MIN_CONFIDENCE_REASON_CHARS: usize = 10;

static CPC_SUBCLASS: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^[A-HY][0-9]{2}[A-Z]$").expect("CPC subclass pattern must compile.")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum StrategyPriority {
	Primary,
	Secondary,
	#[default]
	Tertiary,
}
impl StrategyPriority {
	/// Execution order: lower runs first.
	pub fn rank(self) -> u8 {
		match self {
			Self::Primary => 0,
			Self::Secondary => 1,
			Self::Tertiary => 2,
		}
	}
}
impl From<String> for StrategyPriority {
	fn from(raw: String) -> Self {
		match raw.trim().to_ascii_uppercase().as_str() {
			"PRIMARY" => Self::Primary,
			"SECONDARY" => Self::Secondary,
			_ => Self::Tertiary,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelElement {
	pub id: String,
	pub description: String,
}

/// Vocabulary bridge between disclosure language and patent language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermFamily {
	pub canonical: String,
	#[serde(default)]
	pub synonyms: Vec<String>,
	#[serde(default)]
	pub acronyms: Vec<String>,
	#[serde(default)]
	pub patent_variants: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStrategy {
	pub id: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub priority: StrategyPriority,
	#[serde(default)]
	pub term_families: Vec<TermFamily>,
	#[serde(default)]
	pub phrases: Vec<String>,
	#[serde(default)]
	pub cpc_subclasses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyDocument {
	pub invention_title: String,
	pub invention_summary: String,
	pub novel_elements: Vec<NovelElement>,
	#[serde(default)]
	pub technology_domains: Vec<String>,
	#[serde(alias = "strategies")]
	pub query_strategies: Vec<SearchStrategy>,
	#[serde(alias = "confidence")]
	pub confidence_score: f64,
	#[serde(default)]
	pub confidence_reason: String,
}
impl StrategyDocument {
	pub fn novel_element_ids(&self) -> HashSet<&str> {
		self.novel_elements.iter().map(|ne| ne.id.as_str()).collect()
	}
}

/// Clamps and validates a strategy document in place.
///
/// Overlong text is truncated, invalid CPC codes are dropped, and everything else that breaks
/// the document's structure is returned as a [`Violation`] so the caller can re-prompt.
pub fn normalize_strategy_document(doc: &mut StrategyDocument) -> Result<()> {
	doc.invention_title = clamp_text(&doc.invention_title, TITLE_CHARS.1);
	doc.invention_summary = clamp_text(&doc.invention_summary, SUMMARY_CHARS.1);
	doc.confidence_reason = doc.confidence_reason.trim().to_string();

	if char_len(&doc.invention_title) < TITLE_CHARS.0 {
		return Err(Violation::too_short("invention_title", TITLE_CHARS.0));
	}
	if char_len(&doc.invention_summary) < SUMMARY_CHARS.0 {
		return Err(Violation::too_short("invention_summary", SUMMARY_CHARS.0));
	}
	if !doc.confidence_score.is_finite() || !(0.0..=1.0).contains(&doc.confidence_score) {
		return Err(Violation::OutOfRange { field: "confidence_score".to_string() });
	}
	if char_len(&doc.confidence_reason) < MIN_CONFIDENCE_REASON_CHARS {
		return Err(Violation::too_short("confidence_reason", MIN_CONFIDENCE_REASON_CHARS));
	}

	let domains = doc.technology_domains.len();

	if !(1..=MAX_TECHNOLOGY_DOMAINS).contains(&domains) {
		return Err(Violation::count("technology_domains", 1, MAX_TECHNOLOGY_DOMAINS, domains));
	}

	for domain in &mut doc.technology_domains {
		*domain = domain.trim().to_string();

		if domain.is_empty() {
			return Err(Violation::invalid("technology_domains entries must be non-empty"));
		}
	}

	normalize_novel_elements(&mut doc.novel_elements)?;
	normalize_strategies(&mut doc.query_strategies)
}

fn normalize_novel_elements(elements: &mut [NovelElement]) -> Result<()> {
	if !(MIN_NOVEL_ELEMENTS..=MAX_NOVEL_ELEMENTS).contains(&elements.len()) {
		return Err(Violation::count(
			"novel_elements",
			MIN_NOVEL_ELEMENTS,
			MAX_NOVEL_ELEMENTS,
			elements.len(),
		));
	}

	let mut seen = HashSet::new();

	for (idx, element) in elements.iter_mut().enumerate() {
		element.id = element.id.trim().to_ascii_uppercase();
		element.description = clamp_text(&element.description, NOVEL_ELEMENT_CHARS.1);

		if !seen.insert(element.id.clone()) {
			return Err(Violation::invalid(format!("duplicate novel element id {}", element.id)));
		}

		let expected = format!("NE{}", idx + 1);

		if element.id != expected {
			return Err(Violation::invalid(format!(
				"novel element ids must be sequential starting at NE1; expected {expected}, got {:?}",
				element.id
			)));
		}
		if char_len(&element.description) < NOVEL_ELEMENT_CHARS.0 {
			return Err(Violation::too_short(
				format!("novel_elements[{}].description", element.id),
				NOVEL_ELEMENT_CHARS.0,
			));
		}
	}

	Ok(())
}

fn normalize_strategies(strategies: &mut [SearchStrategy]) -> Result<()> {
	if !(MIN_STRATEGIES..=MAX_STRATEGIES).contains(&strategies.len()) {
		return Err(Violation::count(
			"query_strategies",
			MIN_STRATEGIES,
			MAX_STRATEGIES,
			strategies.len(),
		));
	}

	for strategy in strategies.iter_mut() {
		normalize_strategy(strategy)?;
	}

	if !strategies.iter().any(|strategy| strategy.priority == StrategyPriority::Primary) {
		return Err(Violation::invalid("at least one PRIMARY strategy is required"));
	}

	Ok(())
}

fn normalize_strategy(strategy: &mut SearchStrategy) -> Result<()> {
	strategy.id = strategy.id.trim().to_string();
	strategy.description = clamp_text(&strategy.description, STRATEGY_DESCRIPTION_CHARS.1);

	if strategy.id.is_empty() {
		return Err(Violation::invalid("every query strategy requires an id"));
	}

	let id = strategy.id.clone();

	if char_len(&strategy.description) < STRATEGY_DESCRIPTION_CHARS.0 {
		return Err(Violation::too_short(
			format!("query_strategies[{id}].description"),
			STRATEGY_DESCRIPTION_CHARS.0,
		));
	}
	if !(1..=MAX_TERM_FAMILIES).contains(&strategy.term_families.len()) {
		return Err(Violation::count(
			format!("query_strategies[{id}].term_families"),
			1,
			MAX_TERM_FAMILIES,
			strategy.term_families.len(),
		));
	}
	if strategy.phrases.len() > MAX_PHRASES {
		return Err(Violation::count(
			format!("query_strategies[{id}].phrases"),
			0,
			MAX_PHRASES,
			strategy.phrases.len(),
		));
	}
	if strategy.cpc_subclasses.len() > MAX_CPC_SUBCLASSES {
		return Err(Violation::count(
			format!("query_strategies[{id}].cpc_subclasses"),
			0,
			MAX_CPC_SUBCLASSES,
			strategy.cpc_subclasses.len(),
		));
	}

	for family in &mut strategy.term_families {
		family.canonical = family.canonical.trim().to_string();

		if family.canonical.is_empty() {
			return Err(Violation::invalid(format!(
				"query_strategies[{id}] has a term family without a canonical term"
			)));
		}

		for (field, len, max) in [
			("synonyms", family.synonyms.len(), MAX_SYNONYMS),
			("acronyms", family.acronyms.len(), MAX_ACRONYMS),
			("patent_variants", family.patent_variants.len(), MAX_PATENT_VARIANTS),
		] {
			if len > max {
				return Err(Violation::count(
					format!("query_strategies[{id}].term_families[{}].{field}", family.canonical),
					0,
					max,
					len,
				));
			}
		}
	}

	strategy.phrases =
		strategy.phrases.iter().map(|phrase| phrase.trim().to_string()).collect::<Vec<_>>();
	strategy.cpc_subclasses = normalize_cpcs(&strategy.cpc_subclasses);

	Ok(())
}

/// Uppercases CPC codes and keeps only unique 4-character subclass codes, in input order.
pub fn normalize_cpcs(codes: &[String]) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut out = Vec::with_capacity(codes.len());

	for raw in codes {
		let code = raw.trim().to_ascii_uppercase();

		if code.is_empty() {
			continue;
		}
		if !CPC_SUBCLASS.is_match(&code) {
			tracing::warn!(cpc_subclass = %raw, "Dropping invalid CPC subclass.");

			continue;
		}
		if seen.insert(code.clone()) {
			out.push(code);
		}
	}

	out
}
