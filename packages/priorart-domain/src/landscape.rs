//! Landscape statistics and reconciliation of the model's landscape narrative against them.
//!
//! Statistics are pure functions of the retrieved patents and their assessments. The narrative
//! is model output; every field it shares with the statistics is overwritten or filtered here,
//! and each change is reported as a [`NarrativeCorrection`].

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
	Result, Violation,
	patent::{PatentRecord, Relevance, RelevanceAssessment},
	strategy::NovelElement,
	text::{char_len, clamp_text, collapse_whitespace},
};

pub const MAX_FREQUENCY_ROWS: usize = 10;
pub const MAX_TOP_PRIOR_ART: usize = 20;
pub const MAX_KEY_PLAYERS: usize = 5;
pub const MAX_WHITE_SPACE: usize = 5;
pub const CROWDED_MEDIUM_THRESHOLD: usize = 5;

const DENSITY_REASONING_CHARS: usize = 500;
const BLOCKING_REASONING_CHARS: usize = 1_000;
const DESIGN_AROUND_REASONING_CHARS: usize = 500;
const DETERMINATION_REASONING_CHARS: usize = 1_000;
const WHITE_SPACE_CHARS: usize = 200;
const RELEVANCE_NOTE_CHARS: usize = 200;
const CONFIDENCE_REASON_CHARS: usize = 500;
const MIN_CONFIDENCE_REASON_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeCount {
	pub name: String,
	pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpcCount {
	pub subclass: String,
	pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCoverage {
	pub id: String,
	pub description: String,
	pub high_count: u32,
	pub medium_count: u32,
	pub total_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorArtEntry {
	pub patent_id: String,
	pub title: String,
	#[serde(rename = "abstract")]
	pub abstract_text: String,
	pub grant_date: String,
	pub primary_assignee: String,
	pub relevance: Relevance,
	pub overlap_description: String,
	pub novel_elements_covered: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandscapeStats {
	/// Top assignees among HIGH/MEDIUM patents, by first-listed assignee.
	pub assignee_frequency: Vec<AssigneeCount>,
	/// Top CPC subclasses across every retrieved patent.
	pub cpc_histogram: Vec<CpcCount>,
	pub element_coverage: Vec<ElementCoverage>,
	pub high_count: u32,
	pub medium_count: u32,
	pub top_prior_art: Vec<PriorArtEntry>,
	pub total_retrieved: u32,
	pub total_assessed: u32,
	/// Uncapped assignee counts keyed by lowercased name.
	#[serde(skip)]
	assignee_lookup: HashMap<String, u32>,
}
impl LandscapeStats {
	pub fn assignee_count(&self, name: &str) -> u32 {
		self.assignee_lookup.get(&lookup_key(name)).copied().unwrap_or(0)
	}
}

pub fn compute_landscape_stats(
	novel_elements: &[NovelElement],
	patents: &[PatentRecord],
	assessments: &[RelevanceAssessment],
) -> LandscapeStats {
	let by_id = patents.iter().map(|p| (p.patent_id.as_str(), p)).collect::<HashMap<_, _>>();
	let mut assignees = BTreeMap::<String, u32>::new();
	let mut cpcs = BTreeMap::<&str, u32>::new();
	let mut element_high = HashMap::<&str, u32>::new();
	let mut element_medium = HashMap::<&str, u32>::new();
	let mut stats = LandscapeStats {
		total_retrieved: patents.len() as u32,
		total_assessed: assessments.len() as u32,
		..Default::default()
	};

	for patent in patents {
		for code in &patent.cpc_subclasses {
			*cpcs.entry(code.as_str()).or_default() += 1;
		}
	}

	for assessment in assessments.iter().filter(|a| a.relevance.is_material()) {
		let Some(patent) = by_id.get(assessment.patent_id.as_str()) else {
			continue;
		};

		if let Some(first) = patent.assignees.first() {
			let name = collapse_whitespace(first);

			if !name.is_empty() {
				*assignees.entry(name).or_default() += 1;
			}
		}

		let per_element =
			if assessment.relevance == Relevance::High { &mut element_high } else { &mut element_medium };

		for id in &assessment.novel_elements_covered {
			*per_element.entry(id.as_str()).or_default() += 1;
		}

		if assessment.relevance == Relevance::High {
			stats.high_count += 1;
		} else {
			stats.medium_count += 1;
		}

		stats.top_prior_art.push(PriorArtEntry {
			patent_id: assessment.patent_id.clone(),
			title: patent.title.clone(),
			abstract_text: patent.abstract_text.clone(),
			grant_date: patent.grant_date.clone(),
			primary_assignee: patent.primary_assignee().to_string(),
			relevance: assessment.relevance,
			overlap_description: assessment.overlap_description.clone(),
			novel_elements_covered: assessment.novel_elements_covered.clone(),
		});
	}

	stats.top_prior_art.sort_by(|a, b| {
		a.relevance.rank().cmp(&b.relevance.rank()).then_with(|| b.grant_date.cmp(&a.grant_date))
	});
	stats.top_prior_art.truncate(MAX_TOP_PRIOR_ART);

	for (name, count) in &assignees {
		*stats.assignee_lookup.entry(lookup_key(name)).or_default() += count;
	}

	stats.assignee_frequency = top_counts(assignees.iter().map(|(name, count)| (name.as_str(), *count)))
		.into_iter()
		.map(|(name, count)| AssigneeCount { name, count })
		.collect();
	stats.cpc_histogram = top_counts(cpcs.into_iter())
		.into_iter()
		.map(|(subclass, count)| CpcCount { subclass, count })
		.collect();
	stats.element_coverage = novel_elements
		.iter()
		.map(|element| {
			let high = element_high.get(element.id.as_str()).copied().unwrap_or(0);
			let medium = element_medium.get(element.id.as_str()).copied().unwrap_or(0);

			ElementCoverage {
				id: element.id.clone(),
				description: element.description.clone(),
				high_count: high,
				medium_count: medium,
				total_count: high + medium,
			}
		})
		.collect();

	stats
}

/// Count descending, then name ascending, capped at [`MAX_FREQUENCY_ROWS`].
fn top_counts<'a>(counts: impl Iterator<Item = (&'a str, u32)>) -> Vec<(String, u32)> {
	let mut rows = counts.map(|(key, count)| (key.to_string(), count)).collect::<Vec<_>>();

	rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
	rows.truncate(MAX_FREQUENCY_ROWS);

	rows
}

fn lookup_key(name: &str) -> String {
	collapse_whitespace(name).to_lowercase()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LandscapeDensity {
	#[default]
	Dense,
	Moderate,
	Sparse,
}
impl LandscapeDensity {
	fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_uppercase().as_str() {
			"DENSE" | "CROWDED" => Some(Self::Dense),
			"MODERATE" => Some(Self::Moderate),
			"SPARSE" => Some(Self::Sparse),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockingRiskLevel {
	High,
	Medium,
	Low,
	#[default]
	None,
}
impl BlockingRiskLevel {
	fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_uppercase().as_str() {
			"HIGH" => Some(Self::High),
			"MEDIUM" => Some(Self::Medium),
			"LOW" => Some(Self::Low),
			"NONE" => Some(Self::None),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesignAroundLevel {
	Easy,
	Moderate,
	#[default]
	Difficult,
}
impl DesignAroundLevel {
	fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_uppercase().as_str() {
			"EASY" => Some(Self::Easy),
			"MODERATE" => Some(Self::Moderate),
			"DIFFICULT" => Some(Self::Difficult),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Determination {
	ClearField,
	CrowdedField,
	BlockingArtFound,
	#[default]
	Inconclusive,
}
impl Determination {
	fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_uppercase().as_str() {
			"CLEAR_FIELD" => Some(Self::ClearField),
			"CROWDED_FIELD" => Some(Self::CrowdedField),
			"BLOCKING_ART_FOUND" | "BLOCKING_ART" => Some(Self::BlockingArtFound),
			"INCONCLUSIVE" => Some(Self::Inconclusive),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPlayer {
	pub name: String,
	#[serde(default, deserialize_with = "lenient_count")]
	pub patent_count: u32,
	#[serde(default)]
	pub relevance_note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockingRisk {
	pub level: BlockingRiskLevel,
	pub blocking_patent_ids: Vec<String>,
	pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesignAround {
	pub level: DesignAroundLevel,
	pub reasoning: String,
}

/// Reconciled landscape narrative.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LandscapeNarrative {
	pub density: LandscapeDensity,
	pub density_reasoning: String,
	pub key_players: Vec<KeyPlayer>,
	pub blocking_risk: BlockingRisk,
	pub design_around: DesignAround,
	pub white_space: Vec<String>,
	pub determination: Determination,
	pub determination_reasoning: String,
	pub confidence: f64,
	pub confidence_reason: String,
}

/// Narrative exactly as the model returned it, enum levels still raw text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLandscapeNarrative {
	#[serde(default, alias = "landscape_density")]
	pub density: String,
	#[serde(default, alias = "landscape_density_reasoning")]
	pub density_reasoning: String,
	#[serde(default)]
	pub key_players: Vec<KeyPlayer>,
	#[serde(default)]
	pub blocking_risk: RawBlockingRisk,
	#[serde(default, alias = "design_around_potential")]
	pub design_around: RawDesignAround,
	#[serde(default)]
	pub white_space: Vec<String>,
	#[serde(default)]
	pub determination: String,
	#[serde(default)]
	pub determination_reasoning: String,
	#[serde(default, alias = "confidence_score")]
	pub confidence: f64,
	#[serde(default)]
	pub confidence_reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBlockingRisk {
	#[serde(default)]
	pub level: String,
	#[serde(default, alias = "blocking_patents")]
	pub blocking_patent_ids: Vec<String>,
	#[serde(default)]
	pub reasoning: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDesignAround {
	#[serde(default)]
	pub level: String,
	#[serde(default)]
	pub reasoning: String,
}

/// One change made to the model's narrative while reconciling it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NarrativeCorrection {
	EnumDefaulted { field: &'static str, raw: String, applied: String },
	KeyPlayerCount { name: String, reported: u32, computed: u32 },
	BlockingIdDropped { patent_id: String },
	BlockingRiskDowngraded { from: BlockingRiskLevel, to: BlockingRiskLevel },
	BlockingIdsCleared { count: usize },
	DeterminationForced { from: Determination, to: Determination },
	ConfidenceClamped { reported: f64, applied: f64 },
	Truncated { field: &'static str, kept: usize, dropped: usize },
	InconsistentClearField { determination: Determination },
	ShortConfidenceReason { chars: usize },
}

/// Turns a raw narrative into a [`LandscapeNarrative`] consistent with `stats` and
/// `assessments`.
///
/// Structural defects the model can fix on a re-prompt come back as a [`Violation`].
pub fn reconcile_narrative(
	raw: RawLandscapeNarrative,
	stats: &LandscapeStats,
	assessments: &[RelevanceAssessment],
) -> Result<(LandscapeNarrative, Vec<NarrativeCorrection>)> {
	let mut corrections = Vec::new();
	let density = parse_level(&raw.density, "density", LandscapeDensity::parse, &mut corrections);
	let blocking_level = parse_level(
		&raw.blocking_risk.level,
		"blocking_risk.level",
		BlockingRiskLevel::parse,
		&mut corrections,
	);
	let design_level = parse_level(
		&raw.design_around.level,
		"design_around.level",
		DesignAroundLevel::parse,
		&mut corrections,
	);
	let determination =
		parse_level(&raw.determination, "determination", Determination::parse, &mut corrections);
	let mut white_space = raw
		.white_space
		.iter()
		.map(|entry| clamp_text(entry, WHITE_SPACE_CHARS))
		.filter(|entry| !entry.is_empty())
		.collect::<Vec<_>>();

	if white_space.is_empty() {
		return Err(Violation::count("white_space", 1, MAX_WHITE_SPACE, 0));
	}

	let confidence_reason = clamp_text(&raw.confidence_reason, CONFIDENCE_REASON_CHARS);
	let reason_chars = char_len(&confidence_reason);

	if reason_chars < MIN_CONFIDENCE_REASON_CHARS {
		tracing::warn!(chars = reason_chars, "Landscape confidence reason is shorter than requested.");
		corrections.push(NarrativeCorrection::ShortConfidenceReason { chars: reason_chars });
	}

	truncate_recorded(&mut white_space, "white_space", MAX_WHITE_SPACE, &mut corrections);

	let mut key_players = raw.key_players;

	truncate_recorded(&mut key_players, "key_players", MAX_KEY_PLAYERS, &mut corrections);

	for player in &mut key_players {
		player.name = player.name.trim().to_string();
		player.relevance_note = clamp_text(&player.relevance_note, RELEVANCE_NOTE_CHARS);

		if player.name.is_empty() {
			continue;
		}

		let computed = stats.assignee_count(&player.name);

		if player.patent_count != computed {
			corrections.push(NarrativeCorrection::KeyPlayerCount {
				name: player.name.clone(),
				reported: player.patent_count,
				computed,
			});

			player.patent_count = computed;
		}
	}

	let confidence = if raw.confidence.is_finite() { raw.confidence.clamp(0.0, 1.0) } else { 0.0 };

	if confidence != raw.confidence {
		corrections
			.push(NarrativeCorrection::ConfidenceClamped { reported: raw.confidence, applied: confidence });
	}

	let material = assessments
		.iter()
		.filter(|a| a.relevance.is_material())
		.map(|a| a.patent_id.as_str())
		.collect::<HashSet<_>>();
	let mut blocking = BlockingRisk {
		level: blocking_level,
		blocking_patent_ids: Vec::new(),
		reasoning: clamp_text(&raw.blocking_risk.reasoning, BLOCKING_REASONING_CHARS),
	};

	for id in raw.blocking_risk.blocking_patent_ids {
		let id = id.trim();

		if material.contains(id) {
			blocking.blocking_patent_ids.push(id.to_string());
		} else {
			tracing::warn!(patent_id = %id, "Dropping blocking patent outside HIGH/MEDIUM assessments.");
			corrections.push(NarrativeCorrection::BlockingIdDropped { patent_id: id.to_string() });
		}
	}

	if blocking.level == BlockingRiskLevel::High && blocking.blocking_patent_ids.is_empty() {
		corrections.push(NarrativeCorrection::BlockingRiskDowngraded {
			from: BlockingRiskLevel::High,
			to: BlockingRiskLevel::Medium,
		});

		blocking.level = BlockingRiskLevel::Medium;
	}
	if blocking.level == BlockingRiskLevel::None && !blocking.blocking_patent_ids.is_empty() {
		corrections.push(NarrativeCorrection::BlockingIdsCleared {
			count: blocking.blocking_patent_ids.len(),
		});
		blocking.blocking_patent_ids.clear();
	}

	let mut narrative = LandscapeNarrative {
		density,
		density_reasoning: clamp_text(&raw.density_reasoning, DENSITY_REASONING_CHARS),
		key_players,
		blocking_risk: blocking,
		design_around: DesignAround {
			level: design_level,
			reasoning: clamp_text(&raw.design_around.reasoning, DESIGN_AROUND_REASONING_CHARS),
		},
		white_space,
		determination,
		determination_reasoning: clamp_text(
			&raw.determination_reasoning,
			DETERMINATION_REASONING_CHARS,
		),
		confidence,
		confidence_reason,
	};

	if narrative.blocking_risk.level == BlockingRiskLevel::High
		&& narrative.determination != Determination::BlockingArtFound
	{
		corrections.push(NarrativeCorrection::DeterminationForced {
			from: narrative.determination,
			to: Determination::BlockingArtFound,
		});

		narrative.determination = Determination::BlockingArtFound;
	}
	if narrative.blocking_risk.level == BlockingRiskLevel::None
		&& narrative.density == LandscapeDensity::Sparse
		&& narrative.determination != Determination::ClearField
	{
		tracing::warn!(
			determination = ?narrative.determination,
			"Sparse landscape with no blocking risk was not determined a clear field."
		);
		corrections.push(NarrativeCorrection::InconsistentClearField {
			determination: narrative.determination,
		});
	}

	Ok((narrative, corrections))
}

/// Heuristic used when no reconciled narrative is available.
pub fn fallback_determination(assessments: &[RelevanceAssessment], total_retrieved: usize) -> Determination {
	let high = assessments.iter().filter(|a| a.relevance == Relevance::High).count();
	let medium = assessments.iter().filter(|a| a.relevance == Relevance::Medium).count();

	if high > 0 {
		Determination::BlockingArtFound
	} else if medium >= CROWDED_MEDIUM_THRESHOLD {
		Determination::CrowdedField
	} else if total_retrieved == 0 {
		Determination::Inconclusive
	} else {
		Determination::ClearField
	}
}

fn parse_level<T>(
	raw: &str,
	field: &'static str,
	parse: fn(&str) -> Option<T>,
	corrections: &mut Vec<NarrativeCorrection>,
) -> T
where
	T: Default + Serialize,
{
	if let Some(level) = parse(raw) {
		return level;
	}

	let applied = T::default();
	let applied_name = serde_json::to_value(&applied)
		.ok()
		.and_then(|value| value.as_str().map(str::to_string))
		.unwrap_or_default();

	tracing::warn!(field, raw = %raw, applied = %applied_name, "Defaulting unrecognized narrative level.");
	corrections.push(NarrativeCorrection::EnumDefaulted {
		field,
		raw: raw.to_string(),
		applied: applied_name,
	});

	applied
}

fn truncate_recorded<T>(
	items: &mut Vec<T>,
	field: &'static str,
	max: usize,
	corrections: &mut Vec<NarrativeCorrection>,
) {
	if items.len() > max {
		corrections.push(NarrativeCorrection::Truncated { field, kept: max, dropped: items.len() - max });
		items.truncate(max);
	}
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
	D: Deserializer<'de>,
{
	let count = match Value::deserialize(deserializer)? {
		Value::Number(number) =>
			number.as_u64().or_else(|| number.as_f64().filter(|f| *f > 0.0).map(|f| f as u64)),
		Value::String(text) => text.trim().parse::<u64>().ok(),
		_ => None,
	};

	Ok(count.unwrap_or(0).min(u64::from(u32::MAX)) as u32)
}
