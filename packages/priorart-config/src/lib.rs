mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Assessment, Config, LlmProviderConfig, PatentSearchProviderConfig, Pipeline, Providers, Search,
	Service,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	for (label, key) in [
		("patent_search", &cfg.providers.patent_search.api_key),
		("reasoning", &cfg.providers.reasoning.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	for (label, base) in [
		("patent_search", &cfg.providers.patent_search.api_base),
		("reasoning", &cfg.providers.reasoning.api_base),
	] {
		if !(base.starts_with("http://") || base.starts_with("https://")) {
			return Err(Error::Validation {
				message: format!("Provider {label} api_base must be an http(s) URL."),
			});
		}
	}

	if cfg.providers.reasoning.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.reasoning.model must be non-empty.".to_string(),
		});
	}
	if !cfg.providers.reasoning.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.reasoning.temperature must be a finite number.".to_string(),
		});
	}
	if !(0.0..=2.0).contains(&cfg.providers.reasoning.temperature) {
		return Err(Error::Validation {
			message: "providers.reasoning.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}

	for (label, value) in [
		("providers.patent_search.timeout_ms", cfg.providers.patent_search.timeout_ms),
		("providers.reasoning.timeout_ms", cfg.providers.reasoning.timeout_ms),
		("search.backoff_base_ms", cfg.search.backoff_base_ms),
		("pipeline.backoff_base_ms", cfg.pipeline.backoff_base_ms),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}
	for (label, value) in [
		("search.max_patents", cfg.search.max_patents),
		("search.requests_per_minute", cfg.search.requests_per_minute),
		("search.max_attempts", cfg.search.max_attempts),
		("search.max_bad_requests", cfg.search.max_bad_requests),
		("assessment.max_assessed", cfg.assessment.max_assessed),
		("assessment.batch_size", cfg.assessment.batch_size),
		("assessment.max_attempts", cfg.assessment.max_attempts),
		("pipeline.max_stage_attempts", cfg.pipeline.max_stage_attempts),
		("providers.reasoning.max_tokens", cfg.providers.reasoning.max_tokens),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	if cfg.search.requests_per_minute > 60_000 {
		return Err(Error::Validation {
			message: "search.requests_per_minute must be 60000 or less.".to_string(),
		});
	}
	if cfg.pipeline.min_disclosure_chars >= cfg.pipeline.max_disclosure_chars {
		return Err(Error::Validation {
			message:
				"pipeline.min_disclosure_chars must be less than pipeline.max_disclosure_chars."
					.to_string(),
		});
	}

	for (label, headers) in [
		("providers.patent_search.default_headers", &cfg.providers.patent_search.default_headers),
		("providers.reasoning.default_headers", &cfg.providers.reasoning.default_headers),
	] {
		if headers.values().any(|value| !value.is_string()) {
			return Err(Error::Validation {
				message: format!("{label} values must be strings."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();
	cfg.providers.patent_search.api_key = cfg.providers.patent_search.api_key.trim().to_string();
	cfg.providers.reasoning.api_key = cfg.providers.reasoning.api_key.trim().to_string();
	cfg.providers.reasoning.model = cfg.providers.reasoning.model.trim().to_string();

	for base in
		[&mut cfg.providers.patent_search.api_base, &mut cfg.providers.reasoning.api_base]
	{
		*base = base.trim().trim_end_matches('/').to_string();
	}
}
