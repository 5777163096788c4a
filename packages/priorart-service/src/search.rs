//! Rate-limited, retrying, deduplicating execution of the query plan.

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	sync::Arc,
	time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
	BoxFuture, Error, Result, SearchRunner, SearchTransport,
	limiter::{self, RateLimiter},
};
use priorart_domain::{
	patent::{self, PatentRecord},
	query_plan::{self, QueryPlanItem},
	strategy::StrategyDocument,
	text,
};
use priorart_providers::{
	FailureClass,
	patents::{RawPatent, SearchResponse},
};

const BROAD_HIT_WARNING: u64 = 10_000;
const MAX_INVENTORS: usize = 10;
const STATUS_BAD_REQUEST: u16 = 400;
const STATUS_FORBIDDEN: u16 = 403;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
	pub queries: Vec<QueryPlanItem>,
	pub patents: Vec<PatentRecord>,
	pub total_hits_by_query: BTreeMap<String, u64>,
	pub queries_planned: usize,
	pub queries_executed: usize,
	pub queries_failed: usize,
	pub total_api_calls: u32,
	pub retries: u32,
	/// Strategy whose query first filled the distinct-patent cap.
	pub cap_reached_by: Option<String>,
}

struct QueryAttempts {
	result: priorart_providers::Result<SearchResponse>,
	attempts: u32,
}

#[derive(Clone)]
pub struct SearchExecutor {
	transport: Arc<dyn SearchTransport>,
	settings: priorart_config::Search,
}
impl SearchExecutor {
	pub fn new(transport: Arc<dyn SearchTransport>, settings: priorart_config::Search) -> Self {
		Self { transport, settings }
	}

	pub async fn execute(
		&self,
		strategy: &StrategyDocument,
		cancel: &CancellationToken,
	) -> Result<SearchOutcome> {
		let plan = query_plan::build_query_plan(&strategy.query_strategies);

		if plan.is_empty() {
			return Err(Error::NoQueries);
		}

		let owners = plan
			.iter()
			.map(|item| (item.id.as_str(), item.strategy_id.as_str()))
			.collect::<HashMap<_, _>>();
		let max_patents = self.settings.max_patents as usize;
		// The first query goes out without waiting; later ones are spaced one period apart.
		let mut limiter = RateLimiter::new(self.settings.requests_per_minute);
		let mut outcome = SearchOutcome { queries_planned: plan.len(), ..Default::default() };
		let mut patents: Vec<PatentRecord> = Vec::new();
		let mut index: HashMap<String, usize> = HashMap::new();
		let mut bad_requests = 0_u32;

		tracing::info!(
			queries = plan.len(),
			max_patents,
			period_ms = limiter.period().as_millis() as u64,
			"Patent search started."
		);

		for item in &plan {
			if outcome.cap_reached_by.as_ref().is_some_and(|owner| owner != &item.strategy_id) {
				break;
			}

			limiter.acquire(cancel).await?;

			let QueryAttempts { result, attempts } = self.execute_with_retry(&item.body, cancel).await?;

			outcome.total_api_calls += attempts;
			outcome.retries += attempts.saturating_sub(1);

			let response = match result {
				Ok(response) => response,
				Err(err) => {
					outcome.queries_failed += 1;

					match err.status() {
						Some(STATUS_FORBIDDEN) => return Err(Error::AuthenticationFailed),
						Some(STATUS_BAD_REQUEST) => {
							bad_requests += 1;

							if bad_requests >= self.settings.max_bad_requests {
								return Err(Error::QueryBuilderDefect { bad_requests });
							}
						},
						_ => {},
					}

					tracing::warn!(
						query_id = %item.id,
						status = ?err.status(),
						attempts,
						error = %err,
						"Patent query failed."
					);

					continue;
				},
			};

			outcome.queries_executed += 1;
			outcome.total_hits_by_query.insert(item.id.clone(), response.total_hits);

			if item.kind.is_broad() && response.total_hits > BROAD_HIT_WARNING {
				tracing::warn!(
					query_id = %item.id,
					total_hits = response.total_hits,
					"Broad patent query matched an unusually large result set."
				);
			}
			if !item.kind.is_broad() && response.total_hits == 0 {
				tracing::info!(query_id = %item.id, "Narrow patent query returned no hits.");
			}

			for raw in response.patents {
				let record = flatten_patent(raw);

				if record.patent_id.is_empty() {
					continue;
				}
				if let Some(&pos) = index.get(&record.patent_id) {
					let existing = &mut patents[pos];

					if !existing.matched_query_ids.contains(&item.id) {
						existing.matched_query_ids.push(item.id.clone());
					}

					continue;
				}
				if patents.len() >= max_patents {
					continue;
				}

				index.insert(record.patent_id.clone(), patents.len());
				patents.push(PatentRecord { matched_query_ids: vec![item.id.clone()], ..record });
			}

			if outcome.cap_reached_by.is_none() && patents.len() >= max_patents {
				tracing::info!(
					query_id = %item.id,
					strategy_id = %item.strategy_id,
					patents = patents.len(),
					"Distinct patent cap reached; finishing the current strategy."
				);

				outcome.cap_reached_by = Some(item.strategy_id.clone());
			}
		}

		if outcome.queries_failed == plan.len() {
			return Err(Error::ApiUnavailable { failed: outcome.queries_failed });
		}

		for record in &mut patents {
			record.strategy_count = strategy_count(&record.matched_query_ids, &owners);
		}

		patent::sort_by_grant_date(&mut patents);

		tracing::info!(
			executed = outcome.queries_executed,
			failed = outcome.queries_failed,
			api_calls = outcome.total_api_calls,
			patents = patents.len(),
			"Patent search finished."
		);

		outcome.patents = patents;
		outcome.queries = plan;

		Ok(outcome)
	}

	/// Runs one query until it succeeds or its failure is final.
	///
	/// The outer error is reserved for cancellation.
	async fn execute_with_retry(
		&self,
		body: &Value,
		cancel: &CancellationToken,
	) -> Result<QueryAttempts> {
		let max_attempts = self.settings.max_attempts.max(1);
		let base = Duration::from_millis(self.settings.backoff_base_ms);
		let mut timeout_retried = false;
		let mut attempt = 0;

		loop {
			attempt += 1;

			let err = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled),
				res = self.transport.search(body) => match res {
					Ok(response) => return Ok(QueryAttempts { result: Ok(response), attempts: attempt }),
					Err(err) => err,
				},
			};
			let delay = match err.class() {
				FailureClass::RateLimited => Some(
					err.retry_after()
						.filter(|wait| !wait.is_zero())
						.unwrap_or_else(|| limiter::backoff_delay(base, attempt)),
				),
				FailureClass::Server => Some(limiter::backoff_delay(base, attempt)),
				FailureClass::Timeout if !timeout_retried => {
					timeout_retried = true;

					Some(limiter::backoff_delay(base, attempt))
				},
				_ => None,
			};

			match delay {
				Some(delay) if attempt < max_attempts => {
					tracing::debug!(
						attempt,
						class = ?err.class(),
						delay_ms = delay.as_millis() as u64,
						"Retrying patent query."
					);

					limiter::sleep_or_cancel(delay, cancel).await?;
				},
				_ => return Ok(QueryAttempts { result: Err(err), attempts: attempt }),
			}
		}
	}
}

impl SearchRunner for SearchExecutor {
	fn run<'a>(
		&'a self,
		strategy: &'a StrategyDocument,
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, Result<SearchOutcome>> {
		Box::pin(self.execute(strategy, cancel))
	}
}

pub fn flatten_patent(raw: RawPatent) -> PatentRecord {
	let filing_date = raw.filing_date().map(str::to_string);
	let assignees = raw
		.assignees
		.iter()
		.map(|assignee| text::collapse_whitespace(&assignee.assignee_organization))
		.filter(|name| !name.is_empty())
		.collect();
	let mut seen = HashSet::new();
	let cpc_subclasses = raw
		.cpc_at_issue
		.iter()
		.map(|cpc| cpc.cpc_subclass_id.trim().to_string())
		.filter(|code| !code.is_empty() && seen.insert(code.clone()))
		.collect();
	let inventors = raw
		.inventors
		.iter()
		.map(|inventor| {
			format!("{} {}", inventor.inventor_name_first.trim(), inventor.inventor_name_last.trim())
				.trim()
				.to_string()
		})
		.filter(|name| !name.is_empty())
		.take(MAX_INVENTORS)
		.collect();

	PatentRecord {
		patent_id: raw.patent_id.trim().to_string(),
		title: raw.patent_title.trim().to_string(),
		abstract_text: raw.patent_abstract.trim().to_string(),
		grant_date: raw.patent_date.trim().to_string(),
		filing_date,
		assignees,
		cpc_subclasses,
		inventors,
		matched_query_ids: Vec::new(),
		strategy_count: 0,
	}
}

fn strategy_count(query_ids: &[String], owners: &HashMap<&str, &str>) -> u32 {
	query_ids
		.iter()
		.map(|id| owners.get(id.as_str()).copied().unwrap_or(id.as_str()))
		.collect::<HashSet<_>>()
		.len() as u32
}

#[cfg(test)]
mod tests {
	use super::*;
	use priorart_providers::patents::{RawAssignee, RawCpc, RawInventor};

	#[test]
	fn flattening_trims_and_dedups() {
		let raw = RawPatent {
			patent_id: " 11000001 ".to_string(),
			patent_title: " Self-healing separator ".to_string(),
			patent_date: "2023-05-02".to_string(),
			assignees: vec![
				RawAssignee { assignee_organization: "  Acme   Energy\tInc. ".to_string() },
				RawAssignee { assignee_organization: "   ".to_string() },
			],
			cpc_at_issue: vec![
				RawCpc { cpc_subclass_id: "H01M".to_string() },
				RawCpc { cpc_subclass_id: " H01M ".to_string() },
				RawCpc { cpc_subclass_id: "C08L".to_string() },
			],
			inventors: (0..12)
				.map(|n| RawInventor {
					inventor_name_first: format!("First{n}"),
					inventor_name_last: "Last".to_string(),
				})
				.collect(),
			..Default::default()
		};
		let record = flatten_patent(raw);

		assert_eq!(record.patent_id, "11000001");
		assert_eq!(record.title, "Self-healing separator");
		assert_eq!(record.assignees, vec!["Acme Energy Inc.".to_string()]);
		assert_eq!(record.cpc_subclasses, vec!["H01M".to_string(), "C08L".to_string()]);
		assert_eq!(record.inventors.len(), MAX_INVENTORS);
		assert_eq!(record.inventors[0], "First0 Last");
		assert_eq!(record.filing_date, None);
	}

	#[test]
	fn strategy_count_uses_plan_owners() {
		let owners = HashMap::from([("Q1_narrow_p1", "Q1"), ("Q1_broad", "Q1"), ("Q2_broad", "Q2")]);
		let ids = ["Q1_narrow_p1", "Q1_broad", "Q2_broad"].map(str::to_string);

		assert_eq!(strategy_count(&ids, &owners), 2);
	}
}
