use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
	#[serde(default)]
	pub error: bool,
	#[serde(default)]
	pub count: u64,
	#[serde(default)]
	pub total_hits: u64,
	#[serde(default, deserialize_with = "nullable")]
	pub patents: Vec<RawPatent>,
}

/// Patent row as the search API returns it, before flattening.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPatent {
	#[serde(default, deserialize_with = "nullable")]
	pub patent_id: String,
	#[serde(default, deserialize_with = "nullable")]
	pub patent_title: String,
	#[serde(default, deserialize_with = "nullable")]
	pub patent_abstract: String,
	#[serde(default, deserialize_with = "nullable")]
	pub patent_date: String,
	/// Object or single-element array, depending on API version.
	#[serde(default)]
	pub application: Value,
	#[serde(default, deserialize_with = "nullable")]
	pub assignees: Vec<RawAssignee>,
	#[serde(default, deserialize_with = "nullable")]
	pub cpc_at_issue: Vec<RawCpc>,
	#[serde(default, deserialize_with = "nullable")]
	pub inventors: Vec<RawInventor>,
}
impl RawPatent {
	pub fn filing_date(&self) -> Option<&str> {
		let application = match &self.application {
			Value::Array(items) => items.first()?,
			other => other,
		};

		application.get("filing_date")?.as_str().map(str::trim).filter(|date| !date.is_empty())
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAssignee {
	#[serde(default, deserialize_with = "nullable")]
	pub assignee_organization: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCpc {
	#[serde(default, deserialize_with = "nullable")]
	pub cpc_subclass_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInventor {
	#[serde(default, deserialize_with = "nullable")]
	pub inventor_name_first: String,
	#[serde(default, deserialize_with = "nullable")]
	pub inventor_name_last: String,
}

pub struct PatentSearchClient {
	client: Client,
	url: String,
	headers: HeaderMap,
}
impl PatentSearchClient {
	pub fn new(cfg: &priorart_config::PatentSearchProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let headers = crate::api_key_headers(&cfg.api_key, &cfg.default_headers)?;

		Ok(Self { client, url: format!("{}{}", cfg.api_base, cfg.path), headers })
	}

	/// One POST against the search endpoint. Retrying is the caller's concern.
	pub async fn search(&self, body: &Value) -> Result<SearchResponse> {
		let res = self.client.post(&self.url).headers(self.headers.clone()).json(body).send().await?;
		let parsed: SearchResponse = crate::read_json(res).await?;

		if parsed.error {
			return Err(Error::ErrorFlag {
				body: serde_json::to_string(&parsed).unwrap_or_default(),
			});
		}

		Ok(parsed)
	}
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
