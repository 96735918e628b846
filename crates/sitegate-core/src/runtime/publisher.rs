// crates/sitegate-core/src/runtime/publisher.rs
// ============================================================================
// Module: Publisher
// Description: Dispatch driver running classification and lifecycle attempts.
// Purpose: Turn request metadata into one response and one log event.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! [`Publisher::publish`] classifies a request once, then runs dispatch
//! attempts through [`PublicationLifecycle`]. A retry re-binds a fresh clone
//! of the original metadata, so no per-attempt state leaks between attempts.
//! The retry budget is the matched rule's `max_retries`.
//!
//! Exactly one [`PublicationLogEvent`] is recorded per call, after the final
//! attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::ClassificationResult;
use crate::core::DispatchMatch;
use crate::core::ProtocolError;
use crate::core::PublicationKind;
use crate::core::PublicationLogEvent;
use crate::core::PublicationRequest;
use crate::core::PublicationResponse;
use crate::core::RequestMetadata;
use crate::interfaces::Clock;
use crate::interfaces::PublicationLogSink;
use crate::interfaces::Transaction;
use crate::interfaces::TransactionError;
use crate::interfaces::TransactionManager;
use crate::interfaces::Traverser;
use crate::interfaces::ViewError;
use crate::runtime::binder::BaseUrlBinder;
use crate::runtime::classifier::RequestClassifier;
use crate::runtime::credentials::CredentialResolver;
use crate::runtime::lifecycle::ExceptionOutcome;
use crate::runtime::lifecycle::PublicationError;
use crate::runtime::lifecycle::PublicationLifecycle;
use crate::runtime::lifecycle::TransactionDisposition;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Log event name.
const PUBLICATION_EVENT: &str = "publication";
/// Content type for generated error bodies.
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ============================================================================
// SECTION: Publisher
// ============================================================================

/// Shared dispatch driver.
pub struct Publisher {
    /// Request classifier.
    classifier: Arc<RequestClassifier>,
    /// Credential resolver.
    resolver: Arc<CredentialResolver>,
    /// Traversal collaborator.
    traverser: Arc<dyn Traverser>,
    /// Transaction factory.
    transactions: Arc<dyn TransactionManager>,
    /// Clock for timers and log timestamps.
    clock: Arc<dyn Clock>,
    /// Publication log sink.
    log: Arc<dyn PublicationLogSink>,
}

impl Publisher {
    /// Builds a publisher from its collaborators.
    #[must_use]
    pub fn new(
        classifier: Arc<RequestClassifier>,
        resolver: Arc<CredentialResolver>,
        traverser: Arc<dyn Traverser>,
        transactions: Arc<dyn TransactionManager>,
        clock: Arc<dyn Clock>,
        log: Arc<dyn PublicationLogSink>,
    ) -> Self {
        Self {
            classifier,
            resolver,
            traverser,
            transactions,
            clock,
            log,
        }
    }

    /// Returns the classifier.
    #[must_use]
    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    /// Publishes one request and returns the final response.
    #[must_use]
    pub fn publish(&self, metadata: &RequestMetadata) -> PublicationResponse {
        match self.classifier.classify_request(metadata) {
            ClassificationResult::ProtocolError(error) => {
                let mut response = protocol_response(&error);
                if metadata.method == "HEAD" {
                    response.body.clear();
                }
                let mut event = self.event(metadata, None, response.status, "protocol_error", 0);
                event.error = Some(error.status.reason().to_string());
                self.log.record(&event);
                response
            }
            ClassificationResult::Matched(matched) => self.publish_matched(&matched, metadata),
        }
    }

    /// Runs dispatch attempts for a matched request.
    fn publish_matched(&self, matched: &DispatchMatch, metadata: &RequestMetadata) -> PublicationResponse {
        let mut retries = 0;
        let mut abort_failures = Vec::new();
        loop {
            let bound = BaseUrlBinder::bind(matched.clone(), metadata.clone());
            let mut request = PublicationRequest::new(bound, retries);
            let mut lifecycle = PublicationLifecycle::new(Arc::clone(&self.resolver), Arc::clone(&self.clock));
            let result = self.run_attempt(&mut lifecycle, &mut request);
            let attempts = retries + 1;
            let error = match result {
                Ok(response) => {
                    lifecycle.end_request();
                    let mut event =
                        self.event(metadata, Some(matched), response.status, "ok", attempts);
                    finish_event(&mut event, &request, &abort_failures);
                    self.log.record(&event);
                    return response;
                }
                Err(AttemptFailure {
                    error,
                    abort,
                }) => {
                    abort_failures.extend(abort);
                    error
                }
            };
            match lifecycle.handle_exception(&mut request, error, true) {
                ExceptionOutcome::RetryRequested => {
                    retries += 1;
                }
                ExceptionOutcome::Terminal(error) => {
                    lifecycle.end_request();
                    let mut response = error_response(matched, &error);
                    if request.is_head() {
                        response.body.clear();
                    }
                    let outcome = if matches!(error, PublicationError::Authentication(_)) {
                        "auth_error"
                    } else {
                        "error"
                    };
                    let mut event = self.event(metadata, Some(matched), response.status, outcome, attempts);
                    event.error = Some(error.to_string());
                    finish_event(&mut event, &request, &abort_failures);
                    self.log.record(&event);
                    return response;
                }
            }
        }
    }

    /// Runs one attempt, aborting its transaction on failure.
    fn run_attempt(
        &self,
        lifecycle: &mut PublicationLifecycle,
        request: &mut PublicationRequest,
    ) -> Result<PublicationResponse, AttemptFailure> {
        let mut transaction = self.transactions.begin().map_err(|err| AttemptFailure {
            error: err.into(),
            abort: None,
        })?;
        self.run_phases(lifecycle, request, transaction.as_mut()).map_err(|error| AttemptFailure {
            error,
            abort: transaction.abort().err(),
        })
    }

    /// Drives the lifecycle phases and commits pending writes.
    fn run_phases(
        &self,
        lifecycle: &mut PublicationLifecycle,
        request: &mut PublicationRequest,
        transaction: &mut dyn Transaction,
    ) -> Result<PublicationResponse, PublicationError> {
        lifecycle.before_traversal(request)?;
        let invoker = self.traverser.traverse(request)?;
        lifecycle.after_traversal(request, &invoker)?;
        let mut response = lifecycle.call_object(request, &invoker)?;
        let disposition = lifecycle.after_call(request, &mut response, transaction)?;
        if disposition == TransactionDisposition::PendingCommit {
            transaction.commit()?;
        }
        Ok(response)
    }

    /// Builds the common log event fields.
    fn event(
        &self,
        metadata: &RequestMetadata,
        matched: Option<&DispatchMatch>,
        status: u16,
        outcome: &'static str,
        attempts: u32,
    ) -> PublicationLogEvent {
        PublicationLogEvent {
            event: PUBLICATION_EVENT,
            timestamp_ms: self.clock.now().unix_timestamp_nanos() / 1_000_000,
            site: matched.map(|matched| matched.site.name().to_string()),
            method: metadata.method.clone(),
            host: metadata.host().map(str::to_string),
            path: metadata.path.clone(),
            status,
            outcome,
            attempts,
            principal: String::new(),
            error: None,
            telemetry: BTreeMap::new(),
        }
    }
}

/// Failed attempt with the abort failure that followed it, if any.
struct AttemptFailure {
    /// Error that ended the attempt.
    error: PublicationError,
    /// Error returned while aborting the attempt's transaction.
    abort: Option<TransactionError>,
}

/// Copies the final attempt's principal and telemetry into the event and
/// appends any abort failures to its error.
fn finish_event(
    event: &mut PublicationLogEvent,
    request: &PublicationRequest,
    abort_failures: &[TransactionError],
) {
    event.principal =
        request.principal().map(|principal| principal.audit_user().to_string()).unwrap_or_default();
    event.telemetry = request.telemetry().fields();
    for failure in abort_failures {
        let note = format!("abort failed: {failure}");
        event.error = Some(match event.error.take() {
            Some(primary) => format!("{primary}; {note}"),
            None => note,
        });
    }
}

// ============================================================================
// SECTION: Response Mapping
// ============================================================================

/// Maps a protocol error to its wire response.
fn protocol_response(error: &ProtocolError) -> PublicationResponse {
    let mut response = PublicationResponse::new(error.status.code(), error.status.reason())
        .with_header("Content-Type", TEXT_PLAIN);
    if let Some(allow) = &error.allow {
        response = response.with_header("Allow", &allow.join(", "));
    }
    response
}

/// Maps a terminal publication error to its wire response.
fn error_response(matched: &DispatchMatch, error: &PublicationError) -> PublicationResponse {
    match error {
        PublicationError::Authentication(err) => {
            let status = err.kind.status();
            let mut response =
                PublicationResponse::new(status, err.kind.as_str()).with_header("Content-Type", TEXT_PLAIN);
            if status == 401 {
                let challenge = if matched.publication_kind == PublicationKind::WebService {
                    format!("OAuth realm=\"{}\"", matched.site.root_url())
                } else {
                    format!("Basic realm=\"{}\"", matched.site.name())
                };
                response = response.with_header("WWW-Authenticate", &challenge);
            }
            response
        }
        PublicationError::View(ViewError::NotFound(_)) => {
            PublicationResponse::new(404, "Not Found").with_header("Content-Type", TEXT_PLAIN)
        }
        err if err.is_transient() => {
            PublicationResponse::new(503, "Service Unavailable").with_header("Content-Type", TEXT_PLAIN)
        }
        _ => PublicationResponse::new(500, "Internal Server Error").with_header("Content-Type", TEXT_PLAIN),
    }
}
