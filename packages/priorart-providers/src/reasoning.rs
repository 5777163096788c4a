use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde_json::Value;

use crate::{Error, Result};

pub const SYSTEM_PROMPT: &str = "You are a patent search strategist and analyst for a university technology transfer office. You produce conservative, structured outputs and do not invent facts. Return strict JSON only.";

/// Chat-completions client for the structured-reasoning service.
pub struct ReasoningClient {
	client: Client,
	provider_id: String,
	url: String,
	headers: HeaderMap,
	model: String,
	temperature: f32,
	max_tokens: u32,
}
impl ReasoningClient {
	pub fn new(cfg: &priorart_config::LlmProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;

		Ok(Self {
			client,
			provider_id: cfg.provider_id.clone(),
			url: format!("{}{}", cfg.api_base, cfg.path),
			headers,
			model: cfg.model.clone(),
			temperature: cfg.temperature,
			max_tokens: cfg.max_tokens,
		})
	}

	pub fn model(&self) -> &str {
		&self.model
	}

	pub fn provider_id(&self) -> &str {
		&self.provider_id
	}

	/// Sends one prompt and returns the raw text of the reply.
	pub async fn generate(&self, prompt: &str) -> Result<String> {
		let body = serde_json::json!({
			"model": self.model,
			"temperature": self.temperature,
			"max_tokens": self.max_tokens,
			"messages": [
				{ "role": "system", "content": SYSTEM_PROMPT },
				{ "role": "user", "content": prompt },
			],
		});
		tracing::debug!(
			provider_id = %self.provider_id,
			model = %self.model,
			prompt_chars = prompt.chars().count(),
			"Sending reasoning request."
		);

		let res = self.client.post(&self.url).headers(self.headers.clone()).json(&body).send().await?;
		let json: Value = crate::read_json(res).await?;
		let text = parse_completion_text(&json)?;

		tracing::debug!(
			provider_id = %self.provider_id,
			reply_chars = text.chars().count(),
			"Reasoning reply received."
		);

		Ok(text)
	}
}

/// Accepts both `choices[0].message.content` and Anthropic-style `content` text blocks.
fn parse_completion_text(json: &Value) -> Result<String> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		return Ok(content.to_string());
	}

	if let Some(blocks) = json.get("content").and_then(|v| v.as_array()) {
		let text = blocks
			.iter()
			.filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
			.filter_map(|block| block.get("text").and_then(|t| t.as_str()))
			.collect::<String>();

		return Ok(text);
	}

	Err(Error::InvalidResponse { message: "Reasoning response is missing text content.".to_string() })
}

/// Removes a surrounding Markdown code fence, with or without a `json` tag.
pub fn strip_code_fences(raw: &str) -> &str {
	let trimmed = raw.trim();

	if !trimmed.starts_with("```") {
		return trimmed;
	}

	let body = match trimmed.split_once('\n') {
		Some((_, rest)) => rest,
		None => trimmed.trim_start_matches("```").trim_start_matches("json"),
	};

	body.trim().trim_end_matches("```").trim()
}
