use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use priorart_domain::strategy::StrategyDocument;
use priorart_service::{Error, SearchExecutor};
use priorart_testkit::{self as testkit, ScriptedTransport};

fn settings() -> priorart_config::Search {
	testkit::test_config().expect("Failed to build test config.").search
}

#[tokio::test(start_paused = true)]
async fn merges_repeat_patents_and_orders_by_grant_date() {
	let transport = Arc::new(ScriptedTransport::new(|_| {
		Ok(testkit::search_response(vec![
			testkit::raw_patent("10000001", "2021-06-01", "Acme Energy Inc."),
			testkit::raw_patent("10000002", "2023-02-14", "Volta Labs"),
		]))
	}));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let outcome = executor
		.execute(&testkit::strategy_document(), &CancellationToken::new())
		.await
		.expect("Search failed.");

	assert_eq!(outcome.queries_planned, 6);
	assert_eq!(outcome.queries_executed, 6);
	assert_eq!(outcome.queries_failed, 0);
	assert_eq!(outcome.total_api_calls, 6);
	assert_eq!(transport.calls(), 6);
	assert_eq!(outcome.patents.len(), 2);
	assert_eq!(outcome.patents[0].patent_id, "10000002");
	assert_eq!(outcome.patents[1].patent_id, "10000001");
	assert_eq!(outcome.patents[0].matched_query_ids.len(), 6);
	assert_eq!(outcome.patents[0].strategy_count, 3);
	assert_eq!(outcome.total_hits_by_query.get("Q1_narrow_p1"), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn patent_cap_lets_the_current_strategy_finish() {
	let transport = Arc::new(ScriptedTransport::new(|_| {
		Ok(testkit::search_response(vec![
			testkit::raw_patent("10000001", "2021-06-01", "Acme Energy Inc."),
			testkit::raw_patent("10000002", "2023-02-14", "Volta Labs"),
		]))
	}));
	let mut settings = settings();

	settings.max_patents = 1;

	let executor = SearchExecutor::new(transport.clone(), settings);
	let outcome = executor
		.execute(&testkit::strategy_document(), &CancellationToken::new())
		.await
		.expect("Search failed.");

	assert_eq!(transport.calls(), 2);
	assert_eq!(outcome.cap_reached_by.as_deref(), Some("Q1"));
	assert_eq!(outcome.patents.len(), 1);
	assert_eq!(outcome.patents[0].patent_id, "10000001");
	assert_eq!(outcome.patents[0].matched_query_ids, vec!["Q1_narrow_p1", "Q1_broad"]);
}

#[tokio::test(start_paused = true)]
async fn forbidden_aborts_without_retrying() {
	let transport = Arc::new(ScriptedTransport::new(|_| Err(testkit::status_error(403))));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let err = executor
		.execute(&testkit::strategy_document(), &CancellationToken::new())
		.await
		.expect_err("Expected an authentication failure.");

	assert!(matches!(err, Error::AuthenticationFailed));
	assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_bad_requests_trip_the_breaker() {
	let transport = Arc::new(ScriptedTransport::new(|_| Err(testkit::status_error(400))));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let err = executor
		.execute(&testkit::strategy_document(), &CancellationToken::new())
		.await
		.expect_err("Expected a query builder defect.");

	assert!(matches!(err, Error::QueryBuilderDefect { bad_requests: 3 }));
	assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn server_outage_exhausts_retries_then_reports_unavailable() {
	let transport = Arc::new(ScriptedTransport::new(|_| Err(testkit::status_error(503))));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let err = executor
		.execute(&testkit::strategy_document(), &CancellationToken::new())
		.await
		.expect_err("Expected the API to be unavailable.");

	assert!(matches!(err, Error::ApiUnavailable { failed: 6 }));
	assert_eq!(transport.calls(), 6 * 4);
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_retried_once() {
	let transport = Arc::new(ScriptedTransport::new(|_| Err(testkit::timeout_error())));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let err = executor
		.execute(&testkit::strategy_document(), &CancellationToken::new())
		.await
		.expect_err("Expected the API to be unavailable.");

	assert!(matches!(err, Error::ApiUnavailable { .. }));
	assert_eq!(transport.calls(), 6 * 2);
}

#[tokio::test(start_paused = true)]
async fn error_flag_is_not_retried() {
	let transport = Arc::new(ScriptedTransport::new(|_| {
		Err(priorart_providers::Error::ErrorFlag { body: "{\"error\":true}".to_string() })
	}));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let err = executor
		.execute(&testkit::strategy_document(), &CancellationToken::new())
		.await
		.expect_err("Expected the API to be unavailable.");

	assert!(matches!(err, Error::ApiUnavailable { failed: 6 }));
	assert_eq!(transport.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_query_waits_for_retry_after() {
	let seen = AtomicUsize::new(0);
	let transport = Arc::new(ScriptedTransport::new(move |_| {
		if seen.fetch_add(1, Ordering::SeqCst) == 0 {
			return Err(testkit::rate_limited(Some(Duration::from_secs(7))));
		}

		Ok(testkit::search_response(vec![testkit::raw_patent(
			"10000001",
			"2021-06-01",
			"Acme Energy Inc.",
		)]))
	}));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let started = Instant::now();
	let outcome = executor
		.execute(&testkit::strategy_document(), &CancellationToken::new())
		.await
		.expect("Search failed.");

	assert!(started.elapsed() >= Duration::from_secs(7));
	assert_eq!(outcome.retries, 1);
	assert_eq!(outcome.total_api_calls, 7);
	assert_eq!(outcome.queries_failed, 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_stops_before_any_request() {
	let transport = Arc::new(ScriptedTransport::new(|_| Ok(testkit::search_response(Vec::new()))));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let cancel = CancellationToken::new();

	cancel.cancel();

	let err = executor
		.execute(&testkit::strategy_document(), &cancel)
		.await
		.expect_err("Expected cancellation.");

	assert!(err.is_cancelled());
	assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_plan_is_rejected() {
	let transport = Arc::new(ScriptedTransport::new(|_| Ok(testkit::search_response(Vec::new()))));
	let executor = SearchExecutor::new(transport.clone(), settings());
	let err = executor
		.execute(&StrategyDocument::default(), &CancellationToken::new())
		.await
		.expect_err("Expected an empty plan error.");

	assert!(matches!(err, Error::NoQueries));
	assert_eq!(transport.calls(), 0);
}
