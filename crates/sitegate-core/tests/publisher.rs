// crates/sitegate-core/tests/publisher.rs
// ============================================================================
// Module: Publisher Tests
// Description: End-to-end dispatch, retry, and HTTP status mapping.
// Purpose: Validate one response and one log event per published request.
// ============================================================================

//! ## Overview
//! Runs [`sitegate_core::Publisher::publish`] against scripted views that
//! render, fail, retry, or doom their transaction.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]
#![allow(dead_code, reason = "Common module may have unused helpers.")]

mod common;

use common::API_HOST;
use common::MAIN_HOST;
use common::SUSPENDED_TOKEN_KEY;
use common::Step;
use common::TOKEN_KEY;
use common::harness;
use common::oauth_header;
use common::render;
use common::render_writing;
use sitegate_core::RequestMetadata;
use sitegate_core::TelemetryValue;
use sitegate_core::TransactionError;
use sitegate_core::ViewError;

fn main_request(method: &str, path: &str) -> RequestMetadata {
    RequestMetadata::new(method, path).with_header("Host", MAIN_HOST).with_server_port(8085)
}

/// Tests that a successful GET renders and logs one ok event.
#[test]
fn successful_get_logs_one_event() {
    let harness = harness(vec![render("hello")]);
    let response = harness.publisher.publish(&main_request("GET", "/~mark"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"hello");
    let events = harness.log.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.outcome, "ok");
    assert_eq!(event.site.as_deref(), Some("mainsite"));
    assert_eq!(event.attempts, 1);
    assert_eq!(event.telemetry.get("pageid"), Some(&TelemetryValue::Text("Person:PersonIndexView".to_string())));
    assert_eq!(event.telemetry.get("traversal_duration_ms"), Some(&TelemetryValue::Millis(3)));
    assert_eq!(event.telemetry.get("publication_duration_ms"), Some(&TelemetryValue::Millis(5)));
}

/// Tests that repeated GETs that write leave persisted state unchanged.
#[test]
fn get_writes_are_never_committed() {
    let harness = harness(vec![render_writing("ok", "karma", "10")]);
    for _ in 0..2 {
        assert_eq!(harness.publisher.publish(&main_request("GET", "/~mark")).status, 200);
    }
    assert!(harness.transactions.committed().is_empty());
    let post = harness.publisher.publish(&main_request("POST", "/~mark"));
    assert_eq!(post.status, 200);
    assert_eq!(harness.transactions.committed().get("karma").map(String::as_str), Some("10"));
}

/// Tests that a doomed POST commits nothing.
#[test]
fn doomed_post_commits_nothing() {
    let harness = harness(vec![Step::Doom]);
    let response = harness.publisher.publish(&main_request("POST", "/~mark"));
    assert_eq!(response.status, 200);
    assert!(harness.transactions.committed().is_empty());
    assert_eq!(harness.transactions.commit_count(), 0);
}

/// Tests that a retried attempt reports only the successful attempt's timings.
#[test]
fn retry_then_success_reports_final_attempt_only() {
    let harness = harness(vec![Step::Fail(ViewError::Retry("conflict".to_string())), render("second")]);
    let response = harness.publisher.publish(&main_request("POST", "/~mark"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"second");
    assert_eq!(*harness.view.calls.lock().unwrap(), 2);
    let events = harness.log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].attempts, 2);
    assert_eq!(events[0].telemetry.get("publication_duration_ms"), Some(&TelemetryValue::Millis(5)));
    assert_eq!(events[0].telemetry.get("traversal_duration_ms"), Some(&TelemetryValue::Millis(3)));
}

/// Tests that a commit conflict is retried.
#[test]
fn commit_conflict_is_retried() {
    let harness = harness(vec![render_writing("ok", "bug", "1")]);
    harness.transactions.fail_next_commit(TransactionError::Conflict("serialization".to_string()));
    let response = harness.publisher.publish(&main_request("POST", "/bugs/+filebug"));
    assert_eq!(response.status, 200);
    assert_eq!(harness.transactions.commit_count(), 1);
    assert_eq!(harness.transactions.committed().get("bug").map(String::as_str), Some("1"));
}

/// Tests that exhausted retries surface as 503 with telemetry kept.
#[test]
fn exhausted_retries_yield_service_unavailable() {
    let harness = harness(vec![Step::Fail(ViewError::ConnectionLost("reset".to_string()))]);
    let response = harness.publisher.publish(&main_request("GET", "/~mark"));
    assert_eq!(response.status, 503);
    assert_eq!(*harness.view.calls.lock().unwrap(), 4);
    let event = &harness.log.events()[0];
    assert_eq!(event.outcome, "error");
    assert_eq!(event.attempts, 4);
    assert!(event.telemetry.contains_key("pageid"));
}

/// Tests that non-transient view failures map to 500 without retry.
#[test]
fn view_failure_is_internal_error() {
    let harness = harness(vec![Step::Fail(ViewError::Failed("boom".to_string()))]);
    let response = harness.publisher.publish(&main_request("GET", "/~mark"));
    assert_eq!(response.status, 500);
    assert_eq!(*harness.view.calls.lock().unwrap(), 1);
}

/// Tests that a traversal miss maps to 404.
#[test]
fn traversal_miss_is_not_found() {
    let harness = harness(vec![render("unused")]);
    let response = harness.publisher.publish(&main_request("GET", "/missing"));
    assert_eq!(response.status, 404);
    assert_eq!(*harness.view.calls.lock().unwrap(), 0);
}

/// Tests that HEAD responses carry no body.
#[test]
fn head_publication_has_empty_body() {
    let harness = harness(vec![render("body")]);
    let response = harness.publisher.publish(&main_request("HEAD", "/~mark"));
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert_eq!(response.header("x-resource"), Some("person"));
}

/// Tests that an unknown host is 404 even with valid credentials.
#[test]
fn unknown_host_ignores_credentials() {
    let harness = harness(vec![render("unused")]);
    let metadata = RequestMetadata::new("GET", "/")
        .with_header("Host", "evil.example")
        .with_header("Authorization", "Basic bWFyazp0ZXN0");
    let response = harness.publisher.publish(&metadata);
    assert_eq!(response.status, 404);
    let events = harness.log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, "protocol_error");
    assert_eq!(events[0].site, None);
}

/// Tests that 405 responses list the accepted methods.
#[test]
fn method_not_allowed_sets_allow_header() {
    let harness = harness(vec![render("unused")]);
    let metadata = main_request("DELETE", "/~mark");
    let response = harness.publisher.publish(&metadata);
    assert_eq!(response.status, 405);
    let mut allow: Vec<&str> = response.header("Allow").unwrap().split(", ").collect();
    allow.sort_unstable();
    assert_eq!(allow, vec!["GET", "HEAD", "POST"]);
}

/// Tests authentication status and challenge mapping.
#[test]
fn authentication_failures_map_to_challenges() {
    let harness = harness(vec![render("unused")]);
    let basic = main_request("GET", "/~mark").with_header("Authorization", "Basic bWFyazp3cm9uZw==");
    let response = harness.publisher.publish(&basic);
    assert_eq!(response.status, 401);
    assert_eq!(response.header("WWW-Authenticate"), Some("Basic realm=\"mainsite\""));

    let api = RequestMetadata::new("GET", "/1.0/people")
        .with_header("Host", API_HOST)
        .with_header("Authorization", &oauth_header(TOKEN_KEY, "&wrong", "n1"));
    let response = harness.publisher.publish(&api);
    assert_eq!(response.status, 401);
    assert_eq!(response.header("WWW-Authenticate"), Some("OAuth realm=\"http://api.launchpad.test/\""));
    assert_eq!(harness.log.events()[1].outcome, "auth_error");

    let inactive = main_request("GET", "/~gone").with_header("Authorization", "Basic Z29uZTp0ZXN0");
    let response = harness.publisher.publish(&inactive);
    assert_eq!(response.status, 403);
    assert_eq!(response.header("WWW-Authenticate"), None);
    assert_eq!(*harness.view.calls.lock().unwrap(), 0);
}

/// Tests that the logged principal is the authenticated user.
#[test]
fn log_event_records_principal() {
    let harness = harness(vec![render("hi")]);
    let metadata = main_request("GET", "/~mark").with_header("Authorization", "Basic bWFyazp0ZXN0");
    assert_eq!(harness.publisher.publish(&metadata).status, 200);
    assert_eq!(harness.log.events()[0].principal, "mark");
}

fn api_request(token_key: &str, nonce: &str) -> RequestMetadata {
    RequestMetadata::new("GET", "/1.0/people")
        .with_header("Host", API_HOST)
        .with_header("Authorization", &oauth_header(token_key, "&secret", nonce))
}

/// Tests that an access-token request survives a retried attempt.
#[test]
fn access_token_request_retries_without_replay_failure() {
    let harness = harness(vec![Step::Fail(ViewError::Retry("conflict".to_string())), render("people")]);
    let response = harness.publisher.publish(&api_request(TOKEN_KEY, "nonce-1"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"people");
    assert_eq!(*harness.view.calls.lock().unwrap(), 2);
    let event = &harness.log.events()[0];
    assert_eq!(event.outcome, "ok");
    assert_eq!(event.attempts, 2);
    assert_eq!(event.principal, "salgado");
}

/// Tests that a commit conflict on an access-token POST is retried.
#[test]
fn access_token_commit_conflict_is_retried() {
    let harness = harness(vec![render_writing("ok", "bug", "7")]);
    harness.transactions.fail_next_commit(TransactionError::Conflict("serialization".to_string()));
    let metadata = RequestMetadata::new("POST", "/1.0/bugs")
        .with_header("Host", API_HOST)
        .with_header("Content-Type", "application/json")
        .with_header("Authorization", &oauth_header(TOKEN_KEY, "&secret", "nonce-commit"))
        .with_body(b"{}".to_vec());
    let response = harness.publisher.publish(&metadata);
    assert_eq!(response.status, 200);
    assert_eq!(harness.transactions.committed().get("bug").map(String::as_str), Some("7"));
    assert_eq!(harness.log.events()[0].attempts, 2);
}

/// Tests that a second request reusing a nonce is still rejected.
#[test]
fn separate_request_reusing_nonce_is_rejected() {
    let harness = harness(vec![render("people")]);
    assert_eq!(harness.publisher.publish(&api_request(TOKEN_KEY, "nonce-2")).status, 200);
    let replay = harness.publisher.publish(&api_request(TOKEN_KEY, "nonce-2"));
    assert_eq!(replay.status, 401);
    assert_eq!(replay.body, b"replayed_nonce");
    assert_eq!(harness.log.events()[1].attempts, 1);
}

/// Tests that a rejected owner does not consume the nonce for its token.
#[test]
fn inactive_owner_is_rejected_before_nonce_check() {
    let harness = harness(vec![render("unused")]);
    for _ in 0..2 {
        let response = harness.publisher.publish(&api_request(SUSPENDED_TOKEN_KEY, "nonce-3"));
        assert_eq!(response.status, 403);
        assert_eq!(response.body, b"inactive_account");
    }
}

/// Tests that Basic credentials survive a retried attempt.
#[test]
fn basic_request_retries_with_same_principal() {
    let harness =
        harness(vec![Step::Fail(ViewError::ConnectionLost("reset".to_string())), render_writing("ok", "karma", "1")]);
    let metadata = main_request("POST", "/~mark/+edit").with_header("Authorization", "Basic bWFyazp0ZXN0");
    let response = harness.publisher.publish(&metadata);
    assert_eq!(response.status, 200);
    let event = &harness.log.events()[0];
    assert_eq!(event.attempts, 2);
    assert_eq!(event.principal, "mark");
    assert_eq!(harness.transactions.last_user().as_deref(), Some("mark"));
    assert_eq!(harness.transactions.committed().get("karma").map(String::as_str), Some("1"));
}

/// Tests that an abort failure is reported next to the attempt's error.
#[test]
fn abort_failure_is_reported_in_log_event() {
    let harness = harness(vec![Step::Fail(ViewError::Failed("boom".to_string()))]);
    harness.transactions.fail_next_abort(TransactionError::Failed("disk".to_string()));
    let response = harness.publisher.publish(&main_request("GET", "/~mark"));
    assert_eq!(response.status, 500);
    let error = harness.log.events()[0].error.clone().unwrap();
    assert!(error.contains("boom"), "{error}");
    assert!(error.contains("abort failed: transaction failed: disk"), "{error}");
}
