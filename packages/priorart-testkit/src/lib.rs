//! Deterministic stand-ins for the reasoning and patent-search capabilities, plus fixtures.

mod error;

pub use error::{Error, Result};

use std::{
	collections::VecDeque,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::{Value, json};

use priorart_config::Config;
use priorart_domain::{
	patent::PatentRecord,
	strategy::{NovelElement, SearchStrategy, StrategyDocument, StrategyPriority, TermFamily},
};
use priorart_providers::patents::{RawAssignee, RawCpc, RawPatent, SearchResponse};
use priorart_service::{BoxFuture, ReasoningProvider, RequestEnvelope, SearchTransport};

pub const TEST_MODEL: &str = "scripted-model";

const TEST_CONFIG_TOML: &str = r#"
[service]
log_level = "debug"

[providers.patent_search]
api_base   = "http://127.0.0.1:9"
api_key    = "test-search-key"
timeout_ms = 1000

[providers.reasoning]
provider_id = "test"
api_base    = "http://127.0.0.1:9"
api_key     = "test-reasoning-key"
path        = "/v1/chat/completions"
model       = "scripted-model"
temperature = 0.0
timeout_ms  = 1000

[search]
max_patents         = 200
requests_per_minute = 600
max_attempts        = 4
backoff_base_ms     = 1000
max_bad_requests    = 3

[assessment]
max_assessed = 100
batch_size   = 10
max_attempts = 3

[pipeline]
max_disclosure_chars = 100000
min_disclosure_chars = 100
max_stage_attempts   = 3
backoff_base_ms      = 1000
"#;

/// Replays queued replies in order, recording every prompt it receives.
pub struct ScriptedReasoner {
	replies: Mutex<VecDeque<priorart_providers::Result<String>>>,
	prompts: Mutex<Vec<String>>,
}
impl ScriptedReasoner {
	pub fn new(replies: impl IntoIterator<Item = priorart_providers::Result<String>>) -> Self {
		Self { replies: Mutex::new(replies.into_iter().collect()), prompts: Mutex::new(Vec::new()) }
	}

	pub fn replying<S>(replies: impl IntoIterator<Item = S>) -> Self
	where
		S: Into<String>,
	{
		Self::new(replies.into_iter().map(|reply| Ok(reply.into())))
	}

	pub fn calls(&self) -> usize {
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn prompts(&self) -> Vec<String> {
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl ReasoningProvider for ScriptedReasoner {
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, priorart_providers::Result<String>> {
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).push(prompt.to_string());

		let reply = self.replies.lock().unwrap_or_else(|err| err.into_inner()).pop_front();

		Box::pin(async move {
			reply.unwrap_or_else(|| {
				Err(priorart_providers::Error::InvalidResponse {
					message: "Reasoning script exhausted.".to_string(),
				})
			})
		})
	}

	fn model_name(&self) -> &str {
		TEST_MODEL
	}
}

/// Answers every prompt through a closure, so replies can depend on the prompt.
pub struct FnReasoner<F> {
	handler: F,
	calls: AtomicUsize,
}
impl<F> FnReasoner<F>
where
	F: Fn(&str) -> priorart_providers::Result<String> + Send + Sync,
{
	pub fn new(handler: F) -> Self {
		Self { handler, calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl<F> ReasoningProvider for FnReasoner<F>
where
	F: Fn(&str) -> priorart_providers::Result<String> + Send + Sync,
{
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, priorart_providers::Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let reply = (self.handler)(prompt);

		Box::pin(async move { reply })
	}

	fn model_name(&self) -> &str {
		TEST_MODEL
	}
}

/// Patent-search transport answering every POST through a closure.
pub struct ScriptedTransport<F> {
	handler: F,
	bodies: Mutex<Vec<Value>>,
}
impl<F> ScriptedTransport<F>
where
	F: Fn(&Value) -> priorart_providers::Result<SearchResponse> + Send + Sync,
{
	pub fn new(handler: F) -> Self {
		Self { handler, bodies: Mutex::new(Vec::new()) }
	}

	pub fn calls(&self) -> usize {
		self.bodies.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn bodies(&self) -> Vec<Value> {
		self.bodies.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl<F> SearchTransport for ScriptedTransport<F>
where
	F: Fn(&Value) -> priorart_providers::Result<SearchResponse> + Send + Sync,
{
	fn search<'a>(
		&'a self,
		body: &'a Value,
	) -> BoxFuture<'a, priorart_providers::Result<SearchResponse>> {
		self.bodies.lock().unwrap_or_else(|err| err.into_inner()).push(body.clone());

		let reply = (self.handler)(body);

		Box::pin(async move { reply })
	}
}

pub fn test_config() -> Result<Config> {
	let cfg: Config = toml::from_str(TEST_CONFIG_TOML)?;

	priorart_config::validate(&cfg)?;

	Ok(cfg)
}

pub fn status_error(status: u16) -> priorart_providers::Error {
	priorart_providers::Error::Status { status, retry_after: None, body: String::new() }
}

pub fn rate_limited(retry_after: Option<Duration>) -> priorart_providers::Error {
	priorart_providers::Error::Status { status: 429, retry_after, body: String::new() }
}

pub fn timeout_error() -> priorart_providers::Error {
	priorart_providers::Error::Timeout { message: "operation timed out".to_string() }
}

pub fn disclosure_text() -> String {
	"A lithium-metal battery separator made from a ceramic-polymer composite that closes its own \
	 micro-cracks when heated by the cell, restoring ionic isolation and suppressing dendrite \
	 growth without an external controller."
		.to_string()
}

pub fn request(case_id: &str) -> RequestEnvelope {
	RequestEnvelope {
		case_id: case_id.to_string(),
		disclosure_text: disclosure_text(),
		prior_context: None,
	}
}

/// A strategy document that passes normalization unchanged.
///
/// Q1 plans two queries (one phrase, one broad), Q2 and Q3 plan two each (all-terms, broad).
pub fn strategy_document() -> StrategyDocument {
	StrategyDocument {
		invention_title: "Self-healing ceramic separator".to_string(),
		invention_summary: "A ceramic-polymer separator for lithium-metal cells that heals its own \
		                    micro-cracks when warmed by normal cell operation."
			.to_string(),
		novel_elements: vec![
			novel_element("NE1", "Thermally activated crack healing in the separator"),
			novel_element("NE2", "Ceramic-polymer composite separator microstructure"),
			novel_element("NE3", "Dendrite suppression without an external controller"),
		],
		technology_domains: vec!["Batteries".to_string(), "Materials".to_string()],
		query_strategies: vec![
			SearchStrategy {
				id: "Q1".to_string(),
				description: "Direct match on the self-healing separator mechanism".to_string(),
				priority: StrategyPriority::Primary,
				term_families: vec![family("separator", &["membrane"], &[])],
				phrases: vec!["self healing separator".to_string()],
				cpc_subclasses: vec!["H01M".to_string()],
			},
			SearchStrategy {
				id: "Q2".to_string(),
				description: "Component match on ceramic-polymer composites".to_string(),
				priority: StrategyPriority::Secondary,
				term_families: vec![family("ceramic", &[], &[]), family("polymer", &[], &[])],
				phrases: Vec::new(),
				cpc_subclasses: Vec::new(),
			},
			SearchStrategy {
				id: "Q3".to_string(),
				description: "Problem match on dendrite suppression in lithium cells".to_string(),
				priority: StrategyPriority::Tertiary,
				term_families: vec![family("dendrite", &[], &[]), family("lithium", &[], &["Li"])],
				phrases: Vec::new(),
				cpc_subclasses: Vec::new(),
			},
		],
		confidence_score: 0.8,
		confidence_reason: "Disclosure names concrete materials and mechanism.".to_string(),
	}
}

pub fn strategy_json() -> String {
	serde_json::to_string(&strategy_document()).unwrap_or_default()
}

pub fn raw_patent(patent_id: &str, grant_date: &str, assignee: &str) -> RawPatent {
	RawPatent {
		patent_id: patent_id.to_string(),
		patent_title: format!("Patent {patent_id}"),
		patent_abstract: format!("Abstract describing the subject matter of patent {patent_id}."),
		patent_date: grant_date.to_string(),
		assignees: vec![RawAssignee { assignee_organization: assignee.to_string() }],
		cpc_at_issue: vec![RawCpc { cpc_subclass_id: "H01M".to_string() }],
		..Default::default()
	}
}

pub fn search_response(patents: Vec<RawPatent>) -> SearchResponse {
	SearchResponse {
		error: false,
		count: patents.len() as u64,
		total_hits: patents.len() as u64,
		patents,
	}
}

pub fn patent_record(patent_id: &str, grant_date: &str, assignee: &str) -> PatentRecord {
	PatentRecord {
		patent_id: patent_id.to_string(),
		title: format!("Patent {patent_id}"),
		abstract_text: format!("Abstract describing the subject matter of patent {patent_id}."),
		grant_date: grant_date.to_string(),
		assignees: vec![assignee.to_string()],
		cpc_subclasses: vec!["H01M".to_string()],
		matched_query_ids: vec!["Q1_broad".to_string()],
		strategy_count: 1,
		..Default::default()
	}
}

/// `{"assessments": [...]}` reply; each entry is `(patent_id, relevance, covered elements)`.
pub fn assessment_reply(entries: &[(&str, &str, &[&str])]) -> String {
	let assessments = entries
		.iter()
		.map(|(patent_id, relevance, covered)| {
			json!({
				"patent_id": patent_id,
				"relevance": relevance,
				"overlap_description": "Both describe a ceramic separator that recovers after damage.",
				"novel_elements_covered": covered,
				"confidence": 0.7,
			})
		})
		.collect::<Vec<_>>();

	json!({ "assessments": assessments }).to_string()
}

/// A well-formed landscape narrative reply that tests can edit before serializing.
pub fn narrative_value() -> Value {
	json!({
		"density": "MODERATE",
		"density_reasoning": "A handful of assignees hold most of the relevant art.",
		"key_players": [
			{ "name": "Acme Energy Inc.", "patent_count": 1, "relevance_note": "Holds the closest art." }
		],
		"blocking_risk": {
			"level": "LOW",
			"blocking_patent_ids": [],
			"reasoning": "No single patent discloses thermally triggered healing."
		},
		"design_around": { "level": "EASY", "reasoning": "Existing claims are narrow." },
		"white_space": ["Thermally activated crack healing"],
		"determination": "CLEAR_FIELD",
		"determination_reasoning": "The healing mechanism is not disclosed in retrieved art.",
		"confidence": 0.6,
		"confidence_reason": "Assessments cover every novel element."
	})
}

fn novel_element(id: &str, description: &str) -> NovelElement {
	NovelElement { id: id.to_string(), description: description.to_string() }
}

fn family(canonical: &str, synonyms: &[&str], acronyms: &[&str]) -> TermFamily {
	TermFamily {
		canonical: canonical.to_string(),
		synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
		acronyms: acronyms.iter().map(|s| s.to_string()).collect(),
		patent_variants: Vec::new(),
	}
}
