use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub assessment: Assessment,
	#[serde(default)]
	pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub patent_search: PatentSearchProviderConfig,
	pub reasoning: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatentSearchProviderConfig {
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_patent_search_path")]
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Search executor limits.
#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	/// Distinct-patent cap. Reaching it stops new strategies, never the one in progress.
	#[serde(default = "default_max_patents")]
	pub max_patents: u32,
	#[serde(default = "default_requests_per_minute")]
	pub requests_per_minute: u32,
	#[serde(default = "default_search_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_backoff_base_ms")]
	pub backoff_base_ms: u64,
	/// Cumulative HTTP 400 responses across a run before it is aborted.
	#[serde(default = "default_max_bad_requests")]
	pub max_bad_requests: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assessment {
	#[serde(default = "default_max_assessed")]
	pub max_assessed: u32,
	#[serde(default = "default_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_stage_max_attempts")]
	pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
	#[serde(default = "default_max_disclosure_chars")]
	pub max_disclosure_chars: u32,
	#[serde(default = "default_min_disclosure_chars")]
	pub min_disclosure_chars: u32,
	#[serde(default = "default_stage_max_attempts")]
	pub max_stage_attempts: u32,
	#[serde(default = "default_backoff_base_ms")]
	pub backoff_base_ms: u64,
}

impl Default for Search {
	fn default() -> Self {
		Self {
			max_patents: default_max_patents(),
			requests_per_minute: default_requests_per_minute(),
			max_attempts: default_search_max_attempts(),
			backoff_base_ms: default_backoff_base_ms(),
			max_bad_requests: default_max_bad_requests(),
		}
	}
}

impl Default for Assessment {
	fn default() -> Self {
		Self {
			max_assessed: default_max_assessed(),
			batch_size: default_batch_size(),
			max_attempts: default_stage_max_attempts(),
		}
	}
}

impl Default for Pipeline {
	fn default() -> Self {
		Self {
			max_disclosure_chars: default_max_disclosure_chars(),
			min_disclosure_chars: default_min_disclosure_chars(),
			max_stage_attempts: default_stage_max_attempts(),
			backoff_base_ms: default_backoff_base_ms(),
		}
	}
}

fn default_patent_search_path() -> String {
	"/api/v1/patent/".to_string()
}

fn default_max_tokens() -> u32 {
	4_096
}

fn default_max_patents() -> u32 {
	200
}

fn default_requests_per_minute() -> u32 {
	45
}

fn default_search_max_attempts() -> u32 {
	4
}

fn default_backoff_base_ms() -> u64 {
	1_000
}

fn default_max_bad_requests() -> u32 {
	3
}

fn default_max_assessed() -> u32 {
	100
}

fn default_batch_size() -> u32 {
	10
}

fn default_stage_max_attempts() -> u32 {
	3
}

fn default_max_disclosure_chars() -> u32 {
	100_000
}

fn default_min_disclosure_chars() -> u32 {
	100
}
