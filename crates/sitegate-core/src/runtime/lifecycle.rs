// crates/sitegate-core/src/runtime/lifecycle.rs
// ============================================================================
// Module: Publication Lifecycle
// Description: Per-attempt state machine for traversal, invocation, and commit.
// Purpose: Enforce read-only aborts, HEAD body suppression, and retry rollback.
// Dependencies: crate::core, crate::interfaces, crate::runtime::credentials
// ============================================================================

//! ## Overview
//! One [`PublicationLifecycle`] exists per dispatch attempt and walks
//! `NotStarted -> TraversalStarted -> TraversalDone -> PublicationStarted ->
//! PublicationDone -> Ended`. Any phase may fail into `Failed`. Calls made out
//! of order are rejected as contract violations.
//!
//! Security posture: a `GET` or `HEAD` attempt never leaves a pending
//! transaction behind, and a doomed transaction is always aborted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::ClockReading;
use crate::core::PublicationRequest;
use crate::core::PublicationResponse;
use crate::core::RequestTelemetry;
use crate::core::TelemetryKey;
use crate::core::TelemetryValue;
use crate::interfaces::Clock;
use crate::interfaces::StoreError;
use crate::interfaces::Transaction;
use crate::interfaces::TransactionError;
use crate::interfaces::ViewError;
use crate::interfaces::ViewInvoker;
use crate::runtime::credentials::AuthenticationError;
use crate::runtime::credentials::CredentialResolver;
use crate::runtime::credentials::ResolveError;

// ============================================================================
// SECTION: States and Errors
// ============================================================================

/// Lifecycle state of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing has run yet.
    NotStarted,
    /// Credentials resolved; traversal in progress.
    TraversalStarted,
    /// A view invoker was selected.
    TraversalDone,
    /// The view invoker is running.
    PublicationStarted,
    /// The response is final and the transaction disposition is decided.
    PublicationDone,
    /// Per-attempt resources were released.
    Ended,
    /// The attempt failed.
    Failed,
}

impl LifecycleState {
    /// Returns a stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::TraversalStarted => "traversal_started",
            Self::TraversalDone => "traversal_done",
            Self::PublicationStarted => "publication_started",
            Self::PublicationDone => "publication_done",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Programming-contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleViolation {
    /// A phase was invoked from the wrong state.
    #[error("{operation} called in state {state}")]
    OutOfOrder {
        /// Offending operation.
        operation: &'static str,
        /// State at the time of the call.
        state: LifecycleState,
    },
    /// A principal was already attached to the request.
    #[error("principal already attached to request")]
    PrincipalAlreadyAttached,
}

/// Errors raised while publishing one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublicationError {
    /// Credentials were rejected; terminal for the attempt.
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    /// A credential or session store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Traversal or the view invoker failed.
    #[error(transparent)]
    View(#[from] ViewError),
    /// The persistence transaction failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    /// The lifecycle was driven out of order.
    #[error(transparent)]
    Contract(#[from] LifecycleViolation),
}

impl PublicationError {
    /// Returns true when the failure is a retry signal.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::View(err) => err.is_transient(),
            Self::Transaction(err) => err.is_transient(),
            Self::Authentication(_) | Self::Contract(_) => false,
        }
    }
}

impl From<ResolveError> for PublicationError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Authentication(err) => Self::Authentication(err),
            ResolveError::Store(err) => Self::Store(err),
        }
    }
}

/// Why a transaction was aborted after the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The transaction was doomed.
    Doomed,
    /// The request method is read-only.
    ReadOnlyMethod,
}

/// Transaction outcome decided by [`PublicationLifecycle::after_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionDisposition {
    /// The transaction was aborted.
    Aborted {
        /// Abort reason.
        reason: AbortReason,
    },
    /// The caller must commit the transaction.
    PendingCommit,
}

/// Result of [`PublicationLifecycle::handle_exception`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionOutcome {
    /// Re-dispatch with a fresh copy of the request metadata.
    RetryRequested,
    /// The error is final.
    Terminal(PublicationError),
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// State machine for one dispatch attempt.
pub struct PublicationLifecycle {
    /// Resolver consulted before traversal.
    resolver: Arc<CredentialResolver>,
    /// Clock for phase timers.
    clock: Arc<dyn Clock>,
    /// Current state.
    state: LifecycleState,
    /// Phase timestamps.
    timings: RequestTelemetry,
}

impl PublicationLifecycle {
    /// Creates a lifecycle in the `NotStarted` state.
    #[must_use]
    pub fn new(resolver: Arc<CredentialResolver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver,
            clock,
            state: LifecycleState::NotStarted,
            timings: RequestTelemetry::default(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns the phase timestamps recorded so far.
    #[must_use]
    pub const fn timings(&self) -> &RequestTelemetry {
        &self.timings
    }

    /// Starts traversal and attaches the resolved principal.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError::Authentication`] or
    /// [`PublicationError::Store`] when credential resolution fails, and
    /// [`PublicationError::Contract`] when called twice.
    pub fn before_traversal(&mut self, request: &mut PublicationRequest) -> Result<(), PublicationError> {
        self.expect_state("before_traversal", LifecycleState::NotStarted)?;
        self.timings.traversal_started_at = Some(self.reading());
        self.state = LifecycleState::TraversalStarted;
        let principal = match self.resolver.authenticate_attempt(request.bound(), request.retries()) {
            Ok(principal) => principal,
            Err(err) => {
                self.state = LifecycleState::Failed;
                return Err(err.into());
            }
        };
        request.attach_principal(principal).map_err(|_| {
            self.state = LifecycleState::Failed;
            LifecycleViolation::PrincipalAlreadyAttached
        })?;
        Ok(())
    }

    /// Finishes traversal and pushes the page id and traversal durations.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError::Contract`] when traversal has not started.
    pub fn after_traversal(
        &mut self,
        request: &mut PublicationRequest,
        invoker: &ViewInvoker,
    ) -> Result<(), PublicationError> {
        self.expect_state("after_traversal", LifecycleState::TraversalStarted)?;
        let ended = self.reading();
        self.timings.traversal_ended_at = Some(ended);
        let page_id = invoker.identity().page_id();
        self.timings.page_id = Some(page_id.clone());
        let telemetry = request.telemetry_mut();
        telemetry.push(TelemetryKey::PageId, TelemetryValue::Text(page_id));
        if let Some(started) = self.timings.traversal_started_at {
            let (wall, cpu) = ended.since(&started);
            telemetry.push(TelemetryKey::TraversalDurationMs, TelemetryValue::millis(wall));
            if let Some(cpu) = cpu {
                telemetry.push(TelemetryKey::TraversalThreadDurationMs, TelemetryValue::millis(cpu));
            }
        }
        self.state = LifecycleState::TraversalDone;
        Ok(())
    }

    /// Invokes the selected view and returns its result unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError::View`] when the view fails and
    /// [`PublicationError::Contract`] when traversal is not done.
    pub fn call_object(
        &mut self,
        request: &PublicationRequest,
        invoker: &ViewInvoker,
    ) -> Result<PublicationResponse, PublicationError> {
        self.expect_state("call_object", LifecycleState::TraversalDone)?;
        self.timings.publication_started_at = Some(self.reading());
        self.state = LifecycleState::PublicationStarted;
        let result = match invoker {
            ViewInvoker::Standard {
                view, ..
            } => view.render(request),
            ViewInvoker::Raw {
                call, ..
            } => call(),
        };
        result.map_err(|err| {
            self.state = LifecycleState::Failed;
            PublicationError::View(err)
        })
    }

    /// Decides the transaction disposition and finalizes the response.
    ///
    /// Doom wins over everything; read-only methods always abort; mutating
    /// methods are left for the caller to commit. The audit user is set and
    /// `HEAD` bodies are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError::Transaction`] when the abort fails and
    /// [`PublicationError::Contract`] when no call is in progress.
    pub fn after_call(
        &mut self,
        request: &mut PublicationRequest,
        response: &mut PublicationResponse,
        transaction: &mut dyn Transaction,
    ) -> Result<TransactionDisposition, PublicationError> {
        self.expect_state("after_call", LifecycleState::PublicationStarted)?;
        let ended = self.reading();
        self.timings.publication_ended_at = Some(ended);
        if let Some(started) = self.timings.publication_started_at {
            let (wall, cpu) = ended.since(&started);
            let telemetry = request.telemetry_mut();
            telemetry.push(TelemetryKey::PublicationDurationMs, TelemetryValue::millis(wall));
            if let Some(cpu) = cpu {
                telemetry.push(TelemetryKey::PublicationThreadDurationMs, TelemetryValue::millis(cpu));
            }
        }

        let disposition = if transaction.is_doomed() {
            TransactionDisposition::Aborted {
                reason: AbortReason::Doomed,
            }
        } else if request.is_read_only() {
            TransactionDisposition::Aborted {
                reason: AbortReason::ReadOnlyMethod,
            }
        } else {
            TransactionDisposition::PendingCommit
        };
        if matches!(disposition, TransactionDisposition::Aborted { .. })
            && let Err(err) = transaction.abort()
        {
            self.state = LifecycleState::Failed;
            return Err(err.into());
        }
        let user = request.principal().map(|principal| principal.audit_user().to_string());
        transaction.set_user(user.as_deref().unwrap_or_default());
        if request.is_head() {
            response.body.clear();
        }
        self.state = LifecycleState::PublicationDone;
        Ok(disposition)
    }

    /// Classifies a failure as retryable or final.
    ///
    /// A retry clears every telemetry key pushed by this attempt; a final
    /// error leaves the partial timings in place for diagnosis.
    pub fn handle_exception(
        &mut self,
        request: &mut PublicationRequest,
        error: PublicationError,
        retry_allowed: bool,
    ) -> ExceptionOutcome {
        self.state = LifecycleState::Failed;
        if error.is_transient() && retry_allowed && request.supports_retry() {
            request.telemetry_mut().clear_attempt();
            return ExceptionOutcome::RetryRequested;
        }
        ExceptionOutcome::Terminal(error)
    }

    /// Releases per-attempt state and returns the recorded timings.
    pub fn end_request(&mut self) -> RequestTelemetry {
        self.state = LifecycleState::Ended;
        std::mem::take(&mut self.timings)
    }

    /// Rejects calls made outside the expected state.
    fn expect_state(
        &self,
        operation: &'static str,
        expected: LifecycleState,
    ) -> Result<(), LifecycleViolation> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LifecycleViolation::OutOfOrder {
                operation,
                state: self.state,
            })
        }
    }

    /// Reads the clock for phase timers.
    fn reading(&self) -> ClockReading {
        ClockReading {
            wall: self.clock.monotonic(),
            thread_cpu: self.clock.thread_cpu_time(),
        }
    }
}
