//! Deterministic compilation of normalized strategies into patent-search queries.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::strategy::{SearchStrategy, TermFamily, normalize_cpcs};

pub const RESULT_PAGE_SIZE: u32 = 200;
pub const MAX_BROAD_TOKENS: usize = 30;
pub const MAX_PHRASE_QUERIES: usize = 3;

const NARROW_ALL_TERMS: usize = 2;
const BROAD_ALL_TERMS: usize = 3;
const MIN_TOKEN_CHARS: usize = 3;

const RESULT_FIELDS: [&str; 9] = [
	"patent_id",
	"patent_title",
	"patent_abstract",
	"patent_date",
	"application.filing_date",
	"assignees.assignee_organization",
	"cpc_at_issue.cpc_subclass_id",
	"inventors.inventor_name_first",
	"inventors.inventor_name_last",
];

const STOPWORDS: &[&str] = &[
	"and", "any", "are", "based", "between", "but", "can", "each", "for", "from", "has", "have",
	"into", "its", "method", "methods", "more", "not", "one", "or", "other", "such", "system",
	"systems", "that", "the", "their", "then", "these", "this", "thereof", "those", "through",
	"use", "used", "using", "via", "was", "when", "where", "which", "while", "with", "within",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
	NarrowPhrase,
	NarrowAllTerms,
	Broad,
}
impl QueryKind {
	pub fn is_broad(self) -> bool {
		matches!(self, Self::Broad)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlanItem {
	pub id: String,
	pub strategy_id: String,
	pub kind: QueryKind,
	pub body: Value,
}

enum TextOperator {
	Phrase,
	Any,
	All,
}
impl TextOperator {
	fn as_str(&self) -> &'static str {
		match self {
			Self::Phrase => "_text_phrase",
			Self::Any => "_text_any",
			Self::All => "_text_all",
		}
	}
}

/// Builds the ordered query plan. Strategies run in priority order; ties keep input order.
pub fn build_query_plan(strategies: &[SearchStrategy]) -> Vec<QueryPlanItem> {
	let mut ordered = strategies.iter().collect::<Vec<_>>();

	ordered.sort_by_key(|strategy| strategy.priority.rank());

	let mut plan = Vec::with_capacity(ordered.len() * 4);

	for strategy in ordered {
		let sid = strategy.id.trim();

		if sid.is_empty() {
			continue;
		}

		let cpcs = normalize_cpcs(&strategy.cpc_subclasses);
		let phrases = first_non_empty(&strategy.phrases, MAX_PHRASE_QUERIES);

		if phrases.is_empty() {
			let terms = top_canonical_terms(&strategy.term_families, NARROW_ALL_TERMS);

			if terms.is_empty() {
				continue;
			}

			plan.push(QueryPlanItem {
				id: format!("{sid}_narrow_all"),
				strategy_id: sid.to_string(),
				kind: QueryKind::NarrowAllTerms,
				body: query_body(TextOperator::All, &terms.join(" "), &cpcs),
			});
		} else {
			for (idx, phrase) in phrases.iter().enumerate() {
				plan.push(QueryPlanItem {
					id: format!("{sid}_narrow_p{}", idx + 1),
					strategy_id: sid.to_string(),
					kind: QueryKind::NarrowPhrase,
					body: query_body(TextOperator::Phrase, phrase, &cpcs),
				});
			}
		}

		let broad = if cpcs.is_empty() {
			let terms = top_canonical_terms(&strategy.term_families, BROAD_ALL_TERMS);

			(!terms.is_empty()).then(|| query_body(TextOperator::All, &terms.join(" "), &[]))
		} else {
			let tokens = normalize_tokens(&strategy.term_families);

			(!tokens.is_empty()).then(|| query_body(TextOperator::Any, &tokens.join(" "), &cpcs))
		};

		if let Some(body) = broad {
			plan.push(QueryPlanItem {
				id: format!("{sid}_broad"),
				strategy_id: sid.to_string(),
				kind: QueryKind::Broad,
				body,
			});
		}
	}

	plan
}

/// Lowercased, de-duplicated search tokens drawn from canonical terms, then synonyms, then
/// acronyms, in family declaration order.
///
/// Tokens shorter than three characters survive only when they come from an acronym.
pub fn normalize_tokens(families: &[TermFamily]) -> Vec<String> {
	let acronyms = families
		.iter()
		.flat_map(|family| family.acronyms.iter())
		.flat_map(|acronym| split_tokens(acronym))
		.map(|token| token.to_lowercase())
		.collect::<HashSet<_>>();
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for family in families {
		let sources =
			[family.canonical.clone(), family.synonyms.join(" "), family.acronyms.join(" ")];

		for source in &sources {
			for raw in split_tokens(source) {
				let token = raw.to_lowercase();

				if token.chars().count() < MIN_TOKEN_CHARS && !acronyms.contains(&token) {
					continue;
				}
				if STOPWORDS.contains(&token.as_str()) || seen.contains(&token) {
					continue;
				}

				seen.insert(token.clone());
				out.push(token);

				if out.len() >= MAX_BROAD_TOKENS {
					return out;
				}
			}
		}
	}

	out
}

fn split_tokens(value: &str) -> impl Iterator<Item = &str> {
	value.split(|c: char| c == '-' || c.is_whitespace()).filter(|token| !token.is_empty())
}

fn top_canonical_terms(families: &[TermFamily], limit: usize) -> Vec<&str> {
	families
		.iter()
		.map(|family| family.canonical.trim())
		.filter(|term| !term.is_empty())
		.take(limit)
		.collect()
}

fn first_non_empty(items: &[String], limit: usize) -> Vec<&str> {
	items.iter().map(|item| item.trim()).filter(|item| !item.is_empty()).take(limit).collect()
}

fn query_body(operator: TextOperator, text: &str, cpcs: &[String]) -> Value {
	let op = operator.as_str();
	let text_clause = json!({
		"_or": [
			{ op: { "patent_title": text } },
			{ op: { "patent_abstract": text } },
		]
	});
	let q = if cpcs.is_empty() {
		text_clause
	} else {
		json!({ "_and": [text_clause, { "cpc_at_issue.cpc_subclass_id": cpcs }] })
	};

	json!({
		"q": q,
		"f": RESULT_FIELDS,
		"s": [{ "patent_date": "desc" }, { "patent_id": "asc" }],
		"o": { "size": RESULT_PAGE_SIZE },
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn family(canonical: &str, synonyms: &[&str], acronyms: &[&str]) -> TermFamily {
		TermFamily {
			canonical: canonical.to_string(),
			synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
			acronyms: acronyms.iter().map(|s| s.to_string()).collect(),
			patent_variants: Vec::new(),
		}
	}

	#[test]
	fn tokens_keep_short_acronyms_and_drop_stopwords() {
		let families = vec![
			family("machine-learning method", &["neural network", "ML model"], &["AI", "ML"]),
			family("edge device", &["IoT node"], &[]),
		];
		let tokens = normalize_tokens(&families);

		assert_eq!(
			tokens,
			vec!["machine", "learning", "neural", "network", "ml", "model", "ai", "edge", "device", "iot", "node"]
		);
		assert!(!tokens.contains(&"method".to_string()));
	}

	#[test]
	fn tokens_are_capped() {
		let many = (0..40).map(|idx| format!("term{idx:02}")).collect::<Vec<_>>();
		let families = vec![TermFamily {
			canonical: "anchor".to_string(),
			synonyms: many,
			acronyms: Vec::new(),
			patent_variants: Vec::new(),
		}];

		assert_eq!(normalize_tokens(&families).len(), MAX_BROAD_TOKENS);
	}

	#[test]
	fn query_body_ands_cpc_filter() {
		let body = query_body(TextOperator::Phrase, "solid state battery", &["H01M".to_string()]);

		assert_eq!(
			body["q"]["_and"][0]["_or"][1]["_text_phrase"]["patent_abstract"],
			"solid state battery"
		);
		assert_eq!(body["q"]["_and"][1]["cpc_at_issue.cpc_subclass_id"][0], "H01M");
		assert_eq!(body["o"]["size"], 200);
		assert_eq!(body["s"][0]["patent_date"], "desc");
	}
}
