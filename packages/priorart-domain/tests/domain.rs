use std::collections::HashMap;

use priorart_domain::{
	Violation,
	landscape::{
		self, BlockingRiskLevel, Determination, LandscapeDensity, NarrativeCorrection,
		RawLandscapeNarrative,
	},
	patent::{self, PatentRecord, Relevance, RelevanceAssessment},
	query_plan::{self, QueryKind},
	strategy::{
		self, NovelElement, SearchStrategy, StrategyDocument, StrategyPriority, TermFamily,
	},
};

fn term_family(canonical: &str, synonyms: &[&str], acronyms: &[&str]) -> TermFamily {
	TermFamily {
		canonical: canonical.to_string(),
		synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
		acronyms: acronyms.iter().map(|s| s.to_string()).collect(),
		patent_variants: Vec::new(),
	}
}

fn search_strategy(
	id: &str,
	priority: StrategyPriority,
	phrases: &[&str],
	cpcs: &[&str],
) -> SearchStrategy {
	SearchStrategy {
		id: id.to_string(),
		description: format!("Strategy {id} targets the core battery chemistry."),
		priority,
		term_families: vec![
			term_family("solid electrolyte", &["ceramic separator"], &["SSE"]),
			term_family("lithium anode", &["Li metal electrode"], &["Li"]),
			term_family("thermal runaway", &[], &[]),
		],
		phrases: phrases.iter().map(|s| s.to_string()).collect(),
		cpc_subclasses: cpcs.iter().map(|s| s.to_string()).collect(),
	}
}

fn strategy_document() -> StrategyDocument {
	StrategyDocument {
		invention_title: "Self-healing solid electrolyte".to_string(),
		invention_summary:
			"A ceramic electrolyte layer that closes micro-cracks during charging to stop dendrites."
				.to_string(),
		novel_elements: (1..=3)
			.map(|idx| NovelElement {
				id: format!("ne{idx}"),
				description: format!("Novel element number {idx} of the electrolyte layer."),
			})
			.collect(),
		technology_domains: vec!["energy storage".to_string()],
		query_strategies: vec![
			search_strategy("Q1", StrategyPriority::Secondary, &[], &["H01M"]),
			search_strategy("Q2", StrategyPriority::Primary, &["self healing electrolyte"], &[]),
			search_strategy("Q3", StrategyPriority::Tertiary, &[], &[]),
		],
		confidence_score: 0.8,
		confidence_reason: "Disclosure is specific about the chemistry.".to_string(),
	}
}

fn patent_record(id: &str, grant_date: &str, assignee: &str, cpcs: &[&str]) -> PatentRecord {
	PatentRecord {
		patent_id: id.to_string(),
		title: format!("Patent {id}"),
		abstract_text: format!("Abstract for {id}."),
		grant_date: grant_date.to_string(),
		assignees: vec![assignee.to_string()],
		cpc_subclasses: cpcs.iter().map(|s| s.to_string()).collect(),
		strategy_count: 1,
		..Default::default()
	}
}

fn assessment(id: &str, relevance: Relevance, elements: &[&str]) -> RelevanceAssessment {
	RelevanceAssessment {
		patent_id: id.to_string(),
		relevance,
		overlap_description: format!("Overlap description for {id}."),
		novel_elements_covered: elements.iter().map(|s| s.to_string()).collect(),
		confidence: 0.7,
	}
}

fn raw_narrative(json: serde_json::Value) -> RawLandscapeNarrative {
	serde_json::from_value(json).expect("Failed to parse narrative.")
}

#[test]
fn normalizes_valid_strategy_document() {
	let mut doc = strategy_document();

	doc.query_strategies[0].cpc_subclasses = vec!["h01m".into(), "H01M10/05".into(), "H01M".into()];

	strategy::normalize_strategy_document(&mut doc).expect("Document should be valid.");

	assert_eq!(
		doc.novel_elements.iter().map(|ne| ne.id.as_str()).collect::<Vec<_>>(),
		vec!["NE1", "NE2", "NE3"]
	);
	assert_eq!(doc.query_strategies[0].cpc_subclasses, vec!["H01M"]);
}

#[test]
fn rejects_non_sequential_element_ids() {
	let mut doc = strategy_document();

	doc.novel_elements[1].id = "NE3".to_string();
	doc.novel_elements[2].id = "NE2".to_string();

	let err = strategy::normalize_strategy_document(&mut doc).expect_err("Expected violation.");

	assert!(matches!(err, Violation::Invalid { .. }), "Unexpected violation: {err}");
}

#[test]
fn rejects_missing_primary_strategy() {
	let mut doc = strategy_document();

	doc.query_strategies[1].priority = StrategyPriority::Secondary;

	let err = strategy::normalize_strategy_document(&mut doc).expect_err("Expected violation.");

	assert!(err.to_string().contains("PRIMARY"));
}

#[test]
fn rejects_strategy_count_out_of_bounds() {
	let mut doc = strategy_document();

	doc.query_strategies.truncate(2);

	let err = strategy::normalize_strategy_document(&mut doc).expect_err("Expected violation.");

	assert_eq!(
		err,
		Violation::Count { field: "query_strategies".to_string(), min: 3, max: 5, actual: 2 }
	);
}

#[test]
fn clamps_overlong_title_instead_of_rejecting() {
	let mut doc = strategy_document();

	doc.invention_title = "T".repeat(450);

	strategy::normalize_strategy_document(&mut doc).expect("Document should be valid.");

	assert_eq!(doc.invention_title.chars().count(), 200);
}

#[test]
fn rejects_out_of_range_confidence() {
	let mut doc = strategy_document();

	doc.confidence_score = 1.4;

	assert!(matches!(
		strategy::normalize_strategy_document(&mut doc),
		Err(Violation::OutOfRange { .. })
	));
}

#[test]
fn plans_queries_in_priority_order() {
	let doc = strategy_document();
	let plan = query_plan::build_query_plan(&doc.query_strategies);
	let ids = plan.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();

	assert_eq!(
		ids,
		vec!["Q2_narrow_p1", "Q2_broad", "Q1_narrow_all", "Q1_broad", "Q3_narrow_all", "Q3_broad"]
	);
	assert_eq!(plan[0].kind, QueryKind::NarrowPhrase);
	assert_eq!(plan[3].kind, QueryKind::Broad);
	assert_eq!(plan[2].strategy_id, "Q1");
}

#[test]
fn broad_query_uses_tokens_with_cpcs_and_terms_without() {
	let doc = strategy_document();
	let plan = query_plan::build_query_plan(&doc.query_strategies);
	let with_cpc = plan.iter().find(|item| item.id == "Q1_broad").expect("Missing Q1_broad.");
	let without_cpc = plan.iter().find(|item| item.id == "Q3_broad").expect("Missing Q3_broad.");

	assert_eq!(
		with_cpc.body["q"]["_and"][0]["_or"][0]["_text_any"]["patent_title"],
		"solid electrolyte ceramic separator sse lithium anode li metal electrode thermal runaway"
	);
	assert_eq!(with_cpc.body["q"]["_and"][1]["cpc_at_issue.cpc_subclass_id"][0], "H01M");
	assert_eq!(
		without_cpc.body["q"]["_or"][1]["_text_all"]["patent_abstract"],
		"solid electrolyte lithium anode thermal runaway"
	);
}

#[test]
fn query_plan_is_deterministic() {
	let doc = strategy_document();
	let first = serde_json::to_string(&query_plan::build_query_plan(&doc.query_strategies))
		.expect("Failed to serialize plan.");
	let second = serde_json::to_string(&query_plan::build_query_plan(&doc.query_strategies))
		.expect("Failed to serialize plan.");

	assert_eq!(first, second);
}

#[test]
fn skips_strategies_without_ids_or_terms() {
	let blank = search_strategy(" ", StrategyPriority::Primary, &["phrase"], &[]);
	let mut empty = search_strategy("Q9", StrategyPriority::Primary, &[], &[]);

	empty.term_families.clear();

	assert!(query_plan::build_query_plan(&[blank, empty]).is_empty());
}

#[test]
fn sorts_assessments_by_relevance_then_coverage() {
	let mut assessments = vec![
		assessment("A", Relevance::Medium, &["NE1"]),
		assessment("B", Relevance::High, &["NE1"]),
		assessment("C", Relevance::Medium, &["NE1", "NE2"]),
		assessment("D", Relevance::Medium, &["NE2"]),
	];
	let grant_dates = HashMap::from([
		("A", "2020-01-01"),
		("B", "2019-01-01"),
		("C", "2018-01-01"),
		("D", "2021-01-01"),
	]);

	patent::sort_assessments(&mut assessments, &grant_dates);

	assert_eq!(
		assessments.iter().map(|a| a.patent_id.as_str()).collect::<Vec<_>>(),
		vec!["B", "C", "D", "A"]
	);
}

#[test]
fn computes_landscape_statistics() {
	let doc = strategy_document();
	let mut elements = doc.novel_elements.clone();

	for (idx, element) in elements.iter_mut().enumerate() {
		element.id = format!("NE{}", idx + 1);
	}

	let patents = vec![
		patent_record("P1", "2022-05-01", "Acme  Corp", &["H01M", "H01B"]),
		patent_record("P2", "2021-05-01", "Acme Corp", &["H01M"]),
		patent_record("P3", "2020-05-01", "Beta Labs", &["Y02E"]),
		patent_record("P4", "2023-05-01", "Gamma Inc", &["H01M"]),
	];
	let assessments = vec![
		assessment("P1", Relevance::High, &["NE1", "NE2"]),
		assessment("P2", Relevance::Medium, &["NE1"]),
		assessment("P3", Relevance::Medium, &[]),
		assessment("P4", Relevance::Low, &["NE3"]),
	];
	let stats = landscape::compute_landscape_stats(&elements, &patents, &assessments);

	assert_eq!(stats.assignee_frequency[0].name, "Acme Corp");
	assert_eq!(stats.assignee_frequency[0].count, 2);
	assert_eq!(stats.assignee_frequency[1].name, "Beta Labs");
	assert_eq!(stats.cpc_histogram[0].subclass, "H01M");
	assert_eq!(stats.cpc_histogram[0].count, 3);
	assert_eq!(stats.cpc_histogram[1].subclass, "H01B");
	assert_eq!(stats.element_coverage[0].total_count, 2);
	assert_eq!(stats.element_coverage[0].high_count, 1);
	assert_eq!(stats.element_coverage[2].total_count, 0);
	assert_eq!(stats.high_count, 1);
	assert_eq!(stats.medium_count, 2);
	assert_eq!(
		stats.top_prior_art.iter().map(|p| p.patent_id.as_str()).collect::<Vec<_>>(),
		vec!["P1", "P2", "P3"]
	);
	assert_eq!(stats.assignee_count("ACME CORP"), 2);
}

#[test]
fn reconciles_key_players_and_blocking_risk() {
	let patents = vec![
		patent_record("P1", "2022-05-01", "Acme Corp", &[]),
		patent_record("P2", "2021-05-01", "Acme Corp", &[]),
	];
	let assessments = vec![
		assessment("P1", Relevance::Medium, &[]),
		assessment("P2", Relevance::Medium, &[]),
	];
	let stats = landscape::compute_landscape_stats(&[], &patents, &assessments);
	let raw = raw_narrative(serde_json::json!({
		"density": "moderate",
		"key_players": [{ "name": "acme corp", "patent_count": 40 }],
		"blocking_risk": { "level": "HIGH", "blocking_patent_ids": ["P9"], "reasoning": "x" },
		"design_around": { "level": "easy", "reasoning": "narrow claims" },
		"white_space": ["NE3 is uncovered"],
		"determination": "CLEAR_FIELD",
		"confidence": 1.5,
		"confidence_reason": "Clear statistics support this."
	}));
	let (narrative, corrections) =
		landscape::reconcile_narrative(raw, &stats, &assessments).expect("Expected narrative.");

	assert_eq!(narrative.key_players[0].patent_count, 2);
	assert!(narrative.blocking_risk.blocking_patent_ids.is_empty());
	assert_eq!(narrative.blocking_risk.level, BlockingRiskLevel::Medium);
	assert_eq!(narrative.determination, Determination::ClearField);
	assert_eq!(narrative.density, LandscapeDensity::Moderate);
	assert_eq!(narrative.confidence, 1.0);
	assert!(corrections.contains(&NarrativeCorrection::BlockingIdDropped {
		patent_id: "P9".to_string()
	}));
	assert!(corrections.contains(&NarrativeCorrection::KeyPlayerCount {
		name: "acme corp".to_string(),
		reported: 40,
		computed: 2,
	}));
}

#[test]
fn high_blocking_risk_forces_blocking_determination() {
	let patents = vec![patent_record("P1", "2022-05-01", "Acme Corp", &[])];
	let assessments = vec![assessment("P1", Relevance::High, &[])];
	let stats = landscape::compute_landscape_stats(&[], &patents, &assessments);
	let raw = raw_narrative(serde_json::json!({
		"density": "SPARSE",
		"blocking_risk": { "level": "HIGH", "blocking_patent_ids": [" P1 "] },
		"white_space": ["a", "b", "c", "d", "e", "f", "g"],
		"determination": "CLEAR_FIELD",
		"confidence": 0.6,
		"confidence_reason": "One anticipating reference."
	}));
	let (narrative, corrections) =
		landscape::reconcile_narrative(raw, &stats, &assessments).expect("Expected narrative.");

	assert_eq!(narrative.determination, Determination::BlockingArtFound);
	assert_eq!(narrative.blocking_risk.blocking_patent_ids, vec!["P1"]);
	assert_eq!(narrative.white_space.len(), 5);
	assert!(corrections.contains(&NarrativeCorrection::Truncated {
		field: "white_space",
		kept: 5,
		dropped: 2,
	}));
}

#[test]
fn unknown_levels_fall_back_to_documented_defaults() {
	let stats = landscape::compute_landscape_stats(&[], &[], &[]);
	let raw = raw_narrative(serde_json::json!({
		"density": "packed",
		"blocking_risk": { "level": "severe", "blocking_patent_ids": [] },
		"design_around": { "level": "trivial" },
		"white_space": ["everything"],
		"determination": "maybe",
		"confidence": 0.3,
		"confidence_reason": "Sparse evidence overall."
	}));
	let (narrative, corrections) =
		landscape::reconcile_narrative(raw, &stats, &[]).expect("Expected narrative.");

	assert_eq!(narrative.density, LandscapeDensity::Dense);
	assert_eq!(narrative.blocking_risk.level, BlockingRiskLevel::None);
	assert_eq!(narrative.determination, Determination::Inconclusive);
	assert_eq!(
		corrections
			.iter()
			.filter(|c| matches!(c, NarrativeCorrection::EnumDefaulted { .. }))
			.count(),
		4
	);
}

#[test]
fn empty_white_space_is_a_violation() {
	let stats = landscape::compute_landscape_stats(&[], &[], &[]);
	let raw = raw_narrative(serde_json::json!({
		"density": "SPARSE",
		"white_space": ["   "],
		"determination": "CLEAR_FIELD",
		"confidence": 0.3,
		"confidence_reason": "Nothing found in the field."
	}));

	assert!(matches!(
		landscape::reconcile_narrative(raw, &stats, &[]),
		Err(Violation::Count { .. })
	));
}

#[test]
fn short_confidence_reason_is_kept_and_recorded() {
	let stats = landscape::compute_landscape_stats(&[], &[], &[]);
	let raw = raw_narrative(serde_json::json!({
		"density": "SPARSE",
		"white_space": ["Thermal healing is uncovered"],
		"determination": "CLEAR_FIELD",
		"confidence": 0.4,
		"confidence_reason": "  ok  "
	}));
	let (narrative, corrections) =
		landscape::reconcile_narrative(raw, &stats, &[]).expect("Short reason must not be rejected.");

	assert_eq!(narrative.confidence_reason, "ok");
	assert!(corrections.contains(&NarrativeCorrection::ShortConfidenceReason { chars: 2 }));
}
