use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::text::clamp_text;

pub const MAX_OVERLAP_CHARS: usize = 500;
pub const FALLBACK_OVERLAP: &str = "Assessment not returned";
pub const UNKNOWN_ASSIGNEE: &str = "Unknown";

const SHORT_OVERLAP_CHARS: usize = 20;

/// One retrieved patent, merged across every query that returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatentRecord {
	pub patent_id: String,
	pub title: String,
	#[serde(rename = "abstract")]
	pub abstract_text: String,
	/// `YYYY-MM-DD`; lexicographic order is chronological order.
	pub grant_date: String,
	pub filing_date: Option<String>,
	pub assignees: Vec<String>,
	pub cpc_subclasses: Vec<String>,
	pub inventors: Vec<String>,
	pub matched_query_ids: Vec<String>,
	pub strategy_count: u32,
}
impl PatentRecord {
	pub fn primary_assignee(&self) -> &str {
		self.assignees
			.first()
			.map(|name| name.trim())
			.filter(|name| !name.is_empty())
			.unwrap_or(UNKNOWN_ASSIGNEE)
	}

	pub fn has_abstract(&self) -> bool {
		!self.abstract_text.trim().is_empty()
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum Relevance {
	High,
	Medium,
	Low,
	#[default]
	None,
}
impl Relevance {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::High => "HIGH",
			Self::Medium => "MEDIUM",
			Self::Low => "LOW",
			Self::None => "NONE",
		}
	}

	pub fn rank(self) -> u8 {
		match self {
			Self::High => 0,
			Self::Medium => 1,
			Self::Low => 2,
			Self::None => 3,
		}
	}

	/// HIGH or MEDIUM.
	pub fn is_material(self) -> bool {
		matches!(self, Self::High | Self::Medium)
	}
}
impl From<String> for Relevance {
	fn from(raw: String) -> Self {
		match raw.trim().to_ascii_uppercase().as_str() {
			"HIGH" => Self::High,
			"MEDIUM" => Self::Medium,
			"LOW" => Self::Low,
			_ => Self::None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceAssessment {
	pub patent_id: String,
	#[serde(default)]
	pub relevance: Relevance,
	#[serde(default)]
	pub overlap_description: String,
	#[serde(default)]
	pub novel_elements_covered: Vec<String>,
	#[serde(default, alias = "confidence_score")]
	pub confidence: f64,
}
impl RelevanceAssessment {
	pub fn fallback(patent_id: impl Into<String>) -> Self {
		Self {
			patent_id: patent_id.into(),
			relevance: Relevance::None,
			overlap_description: FALLBACK_OVERLAP.to_string(),
			novel_elements_covered: Vec::new(),
			confidence: 0.0,
		}
	}
}

/// Clamps free text and confidence and restricts covered elements to `known_elements`.
pub fn sanitize_assessment(
	mut assessment: RelevanceAssessment,
	known_elements: &HashSet<&str>,
) -> RelevanceAssessment {
	assessment.patent_id = assessment.patent_id.trim().to_string();
	assessment.overlap_description =
		clamp_text(&assessment.overlap_description, MAX_OVERLAP_CHARS);

	if assessment.overlap_description.chars().count() < SHORT_OVERLAP_CHARS {
		tracing::debug!(patent_id = %assessment.patent_id, "Assessment overlap description is short.");
	}

	assessment.confidence =
		if assessment.confidence.is_finite() { assessment.confidence.clamp(0.0, 1.0) } else { 0.0 };

	let mut seen = HashSet::new();

	assessment.novel_elements_covered = assessment
		.novel_elements_covered
		.iter()
		.map(|id| id.trim().to_ascii_uppercase())
		.filter(|id| known_elements.contains(id.as_str()))
		.filter(|id| seen.insert(id.clone()))
		.collect();

	assessment
}

/// Final search order: grant date descending, then patent id ascending.
pub fn sort_by_grant_date(patents: &mut [PatentRecord]) {
	patents.sort_by(|a, b| {
		b.grant_date.cmp(&a.grant_date).then_with(|| a.patent_id.cmp(&b.patent_id))
	});
}

/// Assessment order: patents matched by more strategies first.
pub fn sort_for_assessment(patents: &mut [PatentRecord]) {
	patents.sort_by(|a, b| {
		b.strategy_count
			.cmp(&a.strategy_count)
			.then_with(|| b.grant_date.cmp(&a.grant_date))
			.then_with(|| a.patent_id.cmp(&b.patent_id))
	});
}

/// Output order: relevance, then breadth of element coverage, then recency.
pub fn sort_assessments(assessments: &mut [RelevanceAssessment], grant_dates: &HashMap<&str, &str>) {
	assessments.sort_by(|a, b| {
		a.relevance
			.rank()
			.cmp(&b.relevance.rank())
			.then_with(|| b.novel_elements_covered.len().cmp(&a.novel_elements_covered.len()))
			.then_with(|| {
				grant_date_of(grant_dates, &b.patent_id).cmp(grant_date_of(grant_dates, &a.patent_id))
			})
			.then_with(|| a.patent_id.cmp(&b.patent_id))
	});
}

fn grant_date_of<'a>(grant_dates: &HashMap<&str, &'a str>, patent_id: &str) -> &'a str {
	grant_dates.get(patent_id).copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn relevance_parsing_defaults_to_none() {
		assert_eq!(Relevance::from("high".to_string()), Relevance::High);
		assert_eq!(Relevance::from(" Medium ".to_string()), Relevance::Medium);
		assert_eq!(Relevance::from("critical".to_string()), Relevance::None);
	}

	#[test]
	fn sanitize_restricts_and_dedups_elements() {
		let known = ["NE1", "NE2"].into_iter().collect::<HashSet<_>>();
		let raw = RelevanceAssessment {
			patent_id: " 11223344 ".to_string(),
			relevance: Relevance::High,
			overlap_description: "x".repeat(700),
			novel_elements_covered: vec!["ne1".into(), "NE1".into(), "NE7".into(), " ne2".into()],
			confidence: 1.7,
		};
		let clean = sanitize_assessment(raw, &known);

		assert_eq!(clean.patent_id, "11223344");
		assert_eq!(clean.overlap_description.chars().count(), MAX_OVERLAP_CHARS);
		assert_eq!(clean.novel_elements_covered, vec!["NE1", "NE2"]);
		assert_eq!(clean.confidence, 1.0);
	}

	#[test]
	fn primary_assignee_falls_back_to_unknown() {
		let mut patent = PatentRecord::default();

		assert_eq!(patent.primary_assignee(), UNKNOWN_ASSIGNEE);

		patent.assignees = vec!["Acme Corp".to_string()];

		assert_eq!(patent.primary_assignee(), "Acme Corp");
	}
}
