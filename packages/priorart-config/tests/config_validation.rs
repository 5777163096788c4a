use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use priorart_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn sample_toml_without(section: &str) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");

	root.as_table_mut().expect("Template config must be a table.").remove(section);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be after UNIX epoch.")
		.as_nanos();
	let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
	let mut path = env::temp_dir();

	path.push(format!("priorart_config_test_{}_{nanos}_{seq}.toml", std::process::id()));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load(payload: String) -> priorart_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = priorart_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation(result: priorart_config::Result<Config>, needle: &str) {
	match result {
		Err(Error::Validation { message }) => {
			assert!(message.contains(needle), "Unexpected validation message: {message}");
		},
		Err(err) => panic!("Expected validation error, got {err:?}."),
		Ok(_) => panic!("Expected validation error containing {needle:?}."),
	}
}

#[test]
fn loads_sample_config() {
	let cfg = load(SAMPLE_CONFIG_TEMPLATE_TOML.to_string()).expect("Failed to load config.");

	assert_eq!(cfg.search.max_patents, 200);
	assert_eq!(cfg.search.requests_per_minute, 45);
	assert_eq!(cfg.assessment.batch_size, 10);
	assert_eq!(cfg.pipeline.max_disclosure_chars, 100_000);
	assert_eq!(cfg.providers.reasoning.model, "claude-sonnet-4-5");
}

#[test]
fn missing_tuning_sections_fall_back_to_defaults() {
	let payload = sample_toml_without("search");
	let cfg = load(payload).expect("Failed to load config.");

	assert_eq!(cfg.search.max_patents, 200);
	assert_eq!(cfg.search.max_attempts, 4);
	assert_eq!(cfg.search.backoff_base_ms, 1_000);
	assert_eq!(cfg.search.max_bad_requests, 3);
}

#[test]
fn trims_trailing_slash_from_api_base() {
	let payload = sample_toml_with(
		"providers.patent_search",
		"api_base",
		Value::String("https://search.patentsview.org/".to_string()),
	);
	let cfg = load(payload).expect("Failed to load config.");

	assert_eq!(cfg.providers.patent_search.api_base, "https://search.patentsview.org");
}

#[test]
fn rejects_blank_api_key() {
	let payload =
		sample_toml_with("providers.reasoning", "api_key", Value::String("   ".to_string()));

	expect_validation(load(payload), "reasoning api_key");
}

#[test]
fn rejects_zero_rate_limit() {
	let payload = sample_toml_with("search", "requests_per_minute", Value::Integer(0));

	expect_validation(load(payload), "search.requests_per_minute");
}

#[test]
fn rejects_zero_stage_backoff() {
	let payload = sample_toml_with("pipeline", "backoff_base_ms", Value::Integer(0));

	expect_validation(load(payload), "pipeline.backoff_base_ms");
}

#[test]
fn rejects_zero_batch_size() {
	let payload = sample_toml_with("assessment", "batch_size", Value::Integer(0));

	expect_validation(load(payload), "assessment.batch_size");
}

#[test]
fn rejects_inverted_disclosure_bounds() {
	let payload = sample_toml_with("pipeline", "min_disclosure_chars", Value::Integer(200_000));

	expect_validation(load(payload), "pipeline.min_disclosure_chars");
}

#[test]
fn rejects_out_of_range_temperature() {
	let payload = sample_toml_with("providers.reasoning", "temperature", Value::Float(3.5));

	expect_validation(load(payload), "temperature");
}

#[test]
fn rejects_non_string_default_header() {
	let payload = sample_toml_with(
		"providers.reasoning.default_headers",
		"x-retries",
		Value::Integer(3),
	);

	expect_validation(load(payload), "default_headers");
}

#[test]
fn reports_missing_file() {
	let path = env::temp_dir().join("priorart_config_missing_does_not_exist.toml");

	assert!(matches!(priorart_config::load(&path), Err(Error::ReadConfig { .. })));
}
