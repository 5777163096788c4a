use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestEnvelope {
	pub case_id: String,
	pub disclosure_text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prior_context: Option<PriorContext>,
}

/// Findings from an earlier eligibility screen of the same disclosure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorContext {
	#[serde(default)]
	pub concerns: Option<ScreenConcerns>,
	#[serde(default)]
	pub extraction: Option<ScreenExtraction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenConcerns {
	#[serde(default)]
	pub novelty_concerns: Vec<String>,
	#[serde(default)]
	pub non_obviousness_concerns: Vec<String>,
	#[serde(default)]
	pub search_priority: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenExtraction {
	#[serde(default)]
	pub invention_title: String,
	#[serde(default)]
	pub technology_area: String,
	#[serde(default)]
	pub novel_elements: Vec<String>,
	#[serde(default)]
	pub invention_description: String,
}
