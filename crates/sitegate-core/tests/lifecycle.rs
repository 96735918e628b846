// crates/sitegate-core/tests/lifecycle.rs
// ============================================================================
// Module: Publication Lifecycle Tests
// Description: State ordering, transaction disposition, and retry rollback.
// Purpose: Validate read-only aborts, HEAD suppression, and telemetry resets.
// ============================================================================

//! ## Overview
//! Drives [`PublicationLifecycle`] phase by phase against in-memory
//! transactions and a manual clock.

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

use std::sync::Arc;
use std::time::Duration;

use common::MAIN_HOST;
use common::START;
use common::classifier;
use common::resolver;
use sitegate_core::AbortReason;
use sitegate_core::AuthFailureKind;
use sitegate_core::BaseUrlBinder;
use sitegate_core::ExceptionOutcome;
use sitegate_core::InMemoryTransactionManager;
use sitegate_core::LifecycleState;
use sitegate_core::LifecycleViolation;
use sitegate_core::ManualClock;
use sitegate_core::PublicationError;
use sitegate_core::PublicationLifecycle;
use sitegate_core::PublicationRequest;
use sitegate_core::PublicationResponse;
use sitegate_core::RequestMetadata;
use sitegate_core::TelemetryKey;
use sitegate_core::TelemetryValue;
use sitegate_core::TransactionDisposition;
use sitegate_core::TransactionError;
use sitegate_core::TransactionManager;
use sitegate_core::View;
use sitegate_core::ViewError;
use sitegate_core::ViewIdentity;
use sitegate_core::ViewInvoker;

type TestResult = Result<(), String>;

// ============================================================================
// SECTION: Helpers
// ============================================================================

struct WritingView {
    transactions: InMemoryTransactionManager,
    clock: Arc<ManualClock>,
}

impl View for WritingView {
    fn render(&self, request: &PublicationRequest) -> Result<PublicationResponse, ViewError> {
        self.clock.advance(Duration::from_millis(7));
        self.transactions.stage_write("karma", request.method());
        Ok(PublicationResponse::new(200, "<html>person</html>").with_header("ETag", "\"v1\""))
    }
}

struct Fixture {
    clock: Arc<ManualClock>,
    transactions: InMemoryTransactionManager,
    invoker: ViewInvoker,
}

fn fixture(clock: ManualClock) -> Fixture {
    let clock = Arc::new(clock);
    let transactions = InMemoryTransactionManager::new();
    let view = WritingView {
        transactions: transactions.clone(),
        clock: Arc::clone(&clock),
    };
    let invoker = ViewInvoker::standard(ViewIdentity::new("Person", "PersonIndexView"), Arc::new(view));
    Fixture {
        clock,
        transactions,
        invoker,
    }
}

fn request(metadata: RequestMetadata, retries: u32) -> PublicationRequest {
    let matched = classifier().classify_request(&metadata).as_match().cloned().unwrap();
    PublicationRequest::new(BaseUrlBinder::bind(matched, metadata), retries)
}

fn main_request(method: &str) -> RequestMetadata {
    RequestMetadata::new(method, "/~mark").with_header("Host", MAIN_HOST)
}

/// Runs every phase and returns the response and disposition.
fn run(
    fixture: &Fixture,
    request: &mut PublicationRequest,
) -> Result<(PublicationResponse, TransactionDisposition), PublicationError> {
    let mut lifecycle = PublicationLifecycle::new(resolver(Arc::clone(&fixture.clock)), fixture.clock.clone());
    let mut transaction = fixture.transactions.begin()?;
    lifecycle.before_traversal(request)?;
    fixture.clock.advance(Duration::from_millis(3));
    lifecycle.after_traversal(request, &fixture.invoker)?;
    let mut response = lifecycle.call_object(request, &fixture.invoker)?;
    let disposition = lifecycle.after_call(request, &mut response, transaction.as_mut())?;
    if disposition == TransactionDisposition::PendingCommit {
        transaction.commit()?;
    }
    lifecycle.end_request();
    Ok((response, disposition))
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Tests that before_traversal cannot run twice.
#[test]
fn before_traversal_twice_is_a_contract_violation() {
    let clock = Arc::new(ManualClock::new(START));
    let mut lifecycle = PublicationLifecycle::new(resolver(Arc::clone(&clock)), clock);
    let mut request = request(main_request("GET"), 0);
    lifecycle.before_traversal(&mut request).unwrap();
    let err = lifecycle.before_traversal(&mut request).unwrap_err();
    assert!(matches!(
        err,
        PublicationError::Contract(LifecycleViolation::OutOfOrder {
            operation: "before_traversal",
            ..
        })
    ));
}

/// Tests that calling the view before traversal finishes is rejected.
#[test]
fn call_object_before_traversal_done_is_rejected() {
    let fixture = fixture(ManualClock::new(START));
    let mut lifecycle = PublicationLifecycle::new(resolver(Arc::clone(&fixture.clock)), fixture.clock.clone());
    let mut request = request(main_request("GET"), 0);
    lifecycle.before_traversal(&mut request).unwrap();
    let err = lifecycle.call_object(&request, &fixture.invoker).unwrap_err();
    assert!(matches!(err, PublicationError::Contract(_)));
}

/// Tests that authentication failure fails the attempt without a principal.
#[test]
fn authentication_failure_fails_attempt() {
    let clock = Arc::new(ManualClock::new(START));
    let mut lifecycle = PublicationLifecycle::new(resolver(Arc::clone(&clock)), clock);
    let mut request = request(main_request("GET").with_header("Authorization", "Basic bm9wZQ=="), 0);
    match lifecycle.before_traversal(&mut request) {
        Err(PublicationError::Authentication(err)) => {
            assert_eq!(err.kind, AuthFailureKind::InvalidBasicCredential);
        }
        other => panic!("expected authentication failure, got {other:?}"),
    }
    assert_eq!(lifecycle.state(), LifecycleState::Failed);
    assert!(request.principal().is_none());
}

// ============================================================================
// SECTION: Transaction Disposition
// ============================================================================

/// Tests that GET writes are never committed, even across repeated runs.
#[test]
fn get_attempts_leave_no_writes() -> TestResult {
    let fixture = fixture(ManualClock::new(START));
    for _ in 0..2 {
        let mut request = request(main_request("GET"), 0);
        let (_, disposition) = run(&fixture, &mut request).map_err(|err| err.to_string())?;
        assert_eq!(
            disposition,
            TransactionDisposition::Aborted {
                reason: AbortReason::ReadOnlyMethod
            }
        );
    }
    assert!(fixture.transactions.committed().is_empty());
    assert_eq!(fixture.transactions.commit_count(), 0);
    assert_eq!(fixture.transactions.abort_count(), 2);
    Ok(())
}

/// Tests that POST writes are left pending and committed by the caller.
#[test]
fn post_attempt_commits() -> TestResult {
    let fixture = fixture(ManualClock::new(START));
    let mut request = request(main_request("POST"), 0);
    let (_, disposition) = run(&fixture, &mut request).map_err(|err| err.to_string())?;
    assert_eq!(disposition, TransactionDisposition::PendingCommit);
    assert_eq!(fixture.transactions.committed().get("karma").map(String::as_str), Some("POST"));
    assert_eq!(fixture.transactions.last_user().as_deref(), Some(""));
    Ok(())
}

/// Tests that a doomed transaction is aborted even for POST.
#[test]
fn doom_wins_over_mutating_method() -> TestResult {
    let fixture = fixture(ManualClock::new(START));
    let mut lifecycle = PublicationLifecycle::new(resolver(Arc::clone(&fixture.clock)), fixture.clock.clone());
    let mut request = request(main_request("POST"), 0);
    let mut transaction = fixture.transactions.begin().map_err(|err| err.to_string())?;
    lifecycle.before_traversal(&mut request).map_err(|err| err.to_string())?;
    lifecycle.after_traversal(&mut request, &fixture.invoker).map_err(|err| err.to_string())?;
    let mut response = lifecycle.call_object(&request, &fixture.invoker).map_err(|err| err.to_string())?;
    transaction.doom();
    let disposition =
        lifecycle.after_call(&mut request, &mut response, transaction.as_mut()).map_err(|err| err.to_string())?;
    assert_eq!(
        disposition,
        TransactionDisposition::Aborted {
            reason: AbortReason::Doomed
        }
    );
    assert!(fixture.transactions.committed().is_empty());
    Ok(())
}

/// Tests that HEAD bodies are dropped while headers and status survive.
#[test]
fn head_response_body_is_empty() -> TestResult {
    let fixture = fixture(ManualClock::new(START));
    let mut get = request(main_request("GET"), 0);
    let (get_response, _) = run(&fixture, &mut get).map_err(|err| err.to_string())?;
    let mut head = request(main_request("HEAD"), 0);
    let (head_response, disposition) = run(&fixture, &mut head).map_err(|err| err.to_string())?;
    assert!(head_response.body.is_empty());
    assert!(!get_response.body.is_empty());
    assert_eq!(head_response.headers, get_response.headers);
    assert_eq!(head_response.status, get_response.status);
    assert!(matches!(disposition, TransactionDisposition::Aborted { .. }));
    Ok(())
}

/// Tests that the audit user is the authenticated principal.
#[test]
fn audit_user_is_set_from_principal() -> TestResult {
    let fixture = fixture(ManualClock::new(START));
    let metadata = main_request("POST").with_header("Authorization", "Basic bWFyazp0ZXN0");
    let mut request = request(metadata, 0);
    run(&fixture, &mut request).map_err(|err| err.to_string())?;
    assert_eq!(fixture.transactions.last_user().as_deref(), Some("mark"));
    Ok(())
}

// ============================================================================
// SECTION: Telemetry
// ============================================================================

/// Tests that traversal and publication timings are pushed.
#[test]
fn phases_push_page_id_and_durations() -> TestResult {
    let fixture = fixture(ManualClock::new(START));
    let mut request = request(main_request("GET"), 0);
    run(&fixture, &mut request).map_err(|err| err.to_string())?;
    let telemetry = request.telemetry();
    assert_eq!(
        telemetry.get(TelemetryKey::PageId),
        Some(&TelemetryValue::Text("Person:PersonIndexView".to_string()))
    );
    assert_eq!(telemetry.get(TelemetryKey::TraversalDurationMs), Some(&TelemetryValue::Millis(3)));
    assert_eq!(telemetry.get(TelemetryKey::PublicationDurationMs), Some(&TelemetryValue::Millis(7)));
    assert_eq!(telemetry.get(TelemetryKey::TraversalThreadDurationMs), None);
    Ok(())
}

/// Tests that thread durations appear when the clock reports CPU time.
#[test]
fn thread_durations_follow_clock_support() -> TestResult {
    let fixture = fixture(ManualClock::new(START).with_thread_cpu());
    let mut request = request(main_request("GET"), 0);
    run(&fixture, &mut request).map_err(|err| err.to_string())?;
    let telemetry = request.telemetry();
    assert_eq!(telemetry.get(TelemetryKey::TraversalThreadDurationMs), Some(&TelemetryValue::Millis(3)));
    assert_eq!(telemetry.get(TelemetryKey::PublicationThreadDurationMs), Some(&TelemetryValue::Millis(7)));
    Ok(())
}

/// Tests that a raw invoker is called without the request.
#[test]
fn raw_invoker_is_called_directly() -> TestResult {
    let clock = Arc::new(ManualClock::new(START));
    let mut lifecycle = PublicationLifecycle::new(resolver(Arc::clone(&clock)), clock);
    let invoker = ViewInvoker::raw(ViewIdentity::new("Root", "native_method"), || {
        Ok(PublicationResponse::new(200, "raw"))
    });
    let mut request = request(main_request("GET"), 0);
    lifecycle.before_traversal(&mut request).map_err(|err| err.to_string())?;
    lifecycle.after_traversal(&mut request, &invoker).map_err(|err| err.to_string())?;
    let response = lifecycle.call_object(&request, &invoker).map_err(|err| err.to_string())?;
    assert_eq!(response.body, b"raw");
    Ok(())
}

// ============================================================================
// SECTION: Exceptions
// ============================================================================

fn traversed(fixture: &Fixture, retries: u32) -> (PublicationLifecycle, PublicationRequest) {
    let mut lifecycle = PublicationLifecycle::new(resolver(Arc::clone(&fixture.clock)), fixture.clock.clone());
    let mut request = request(main_request("POST"), retries);
    lifecycle.before_traversal(&mut request).unwrap();
    fixture.clock.advance(Duration::from_millis(2));
    lifecycle.after_traversal(&mut request, &fixture.invoker).unwrap();
    (lifecycle, request)
}

/// Tests that a retryable error clears the attempt's telemetry.
#[test]
fn retry_clears_telemetry() {
    let fixture = fixture(ManualClock::new(START));
    let (mut lifecycle, mut request) = traversed(&fixture, 0);
    assert!(!request.telemetry().is_empty());
    let error = PublicationError::View(ViewError::Retry("conflict".to_string()));
    assert_eq!(lifecycle.handle_exception(&mut request, error, true), ExceptionOutcome::RetryRequested);
    assert!(request.telemetry().is_empty());
    assert_eq!(lifecycle.state(), LifecycleState::Failed);
}

/// Tests that commit conflicts are treated as retry signals.
#[test]
fn commit_conflict_is_retryable() {
    let fixture = fixture(ManualClock::new(START));
    let (mut lifecycle, mut request) = traversed(&fixture, 1);
    let error = PublicationError::Transaction(TransactionError::Conflict("serialization failure".to_string()));
    assert_eq!(lifecycle.handle_exception(&mut request, error, true), ExceptionOutcome::RetryRequested);
}

/// Tests that non-retryable errors keep the partial telemetry.
#[test]
fn terminal_error_keeps_telemetry() {
    let fixture = fixture(ManualClock::new(START));
    let (mut lifecycle, mut request) = traversed(&fixture, 0);
    let error = PublicationError::View(ViewError::Failed("boom".to_string()));
    let outcome = lifecycle.handle_exception(&mut request, error.clone(), true);
    assert_eq!(outcome, ExceptionOutcome::Terminal(error));
    assert_eq!(request.telemetry().get(TelemetryKey::TraversalDurationMs), Some(&TelemetryValue::Millis(2)));
}

/// Tests that exhausted or disallowed retries are terminal.
#[test]
fn exhausted_retries_are_terminal() {
    let fixture = fixture(ManualClock::new(START));
    let (mut lifecycle, mut request) = traversed(&fixture, 3);
    assert!(!request.supports_retry());
    let error = PublicationError::View(ViewError::ConnectionLost("reset".to_string()));
    let outcome = lifecycle.handle_exception(&mut request, error, true);
    assert!(matches!(outcome, ExceptionOutcome::Terminal(_)));
    assert!(request.telemetry().get(TelemetryKey::PageId).is_some());

    let (mut lifecycle, mut request) = traversed(&fixture, 0);
    let error = PublicationError::View(ViewError::Retry("conflict".to_string()));
    assert!(matches!(lifecycle.handle_exception(&mut request, error, false), ExceptionOutcome::Terminal(_)));
}
