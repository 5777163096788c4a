pub mod patents;
pub mod reasoning;

mod error;

pub use error::{Error, FailureClass, Result};

use std::time::Duration;

use reqwest::{
	Response,
	header::{AUTHORIZATION, HeaderMap, HeaderName, RETRY_AFTER},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

const API_KEY_HEADER: &str = "x-api-key";

/// `Authorization: Bearer` plus configured extras.
pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	extend_headers(headers, default_headers)
}

/// `X-Api-Key` plus configured extras.
pub fn api_key_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key.parse()?);

	extend_headers(headers, default_headers)
}

/// Integer seconds only; HTTP dates are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
	let secs = raw.parse::<u64>().ok()?;

	Some(Duration::from_secs(secs))
}

fn extend_headers(mut headers: HeaderMap, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Maps HTTP failures to [`Error::Status`] and decodes a successful body.
pub(crate) async fn read_json<T>(res: Response) -> Result<T>
where
	T: DeserializeOwned,
{
	let status = res.status();
	let retry_after = parse_retry_after(res.headers());
	let body = res.text().await?;

	if status.is_client_error() || status.is_server_error() {
		return Err(Error::Status { status: status.as_u16(), retry_after, body });
	}

	Ok(serde_json::from_str(&body)?)
}
