// crates/sitegate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Sitegate Interfaces
// Description: Collaborator contracts for stores, transactions, views, and logs.
// Purpose: Define the seams the pipeline coordinates but does not implement.
// Dependencies: crate::core, time, thiserror
// ============================================================================

//! ## Overview
//! The pipeline reaches everything outside its own state machine through these
//! traits: credential and token stores, the persistence transaction, the
//! traversal step that selects a view, the view invoker itself, the clock, and
//! the publication log sink. Implementations must be safe to share across
//! worker threads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::AccessScope;
use crate::core::AccountStatus;
use crate::core::PublicationLogEvent;
use crate::core::PublicationRequest;
use crate::core::PublicationResponse;

// ============================================================================
// SECTION: Store Records
// ============================================================================

/// Account record returned by credential lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Stable user identifier.
    pub user_id: String,
    /// Account status.
    pub status: AccountStatus,
}

/// Registered access-token consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    /// Consumer key.
    pub key: String,
}

/// Delegated access token (collaborator-owned, read-only here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Token key.
    pub key: String,
    /// Token secret.
    pub secret: String,
    /// Consumer the token was issued to.
    pub consumer_key: String,
    /// Expiry instant; `None` never expires.
    pub date_expires: Option<OffsetDateTime>,
    /// Reviewed access scope.
    pub reviewed_scope: AccessScope,
    /// Owning account.
    pub owner: Account,
}

// ============================================================================
// SECTION: Stores
// ============================================================================

/// Credential, session, and token store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend connection was lost; the attempt may be retried.
    #[error("store connection lost: {0}")]
    ConnectionLost(String),
    /// Backend reported a failure.
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true when the failure is transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

/// Session store resolving browser session tokens.
pub trait SessionStore: Send + Sync {
    /// Returns the user id for a valid session token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be queried.
    fn resolve_session(&self, token: &str) -> Result<Option<String>, StoreError>;
}

/// Credential store validating HTTP Basic credentials.
pub trait CredentialStore: Send + Sync {
    /// Returns the account when the login/password pair is valid.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be queried.
    fn verify_password(&self, login: &str, password: &str) -> Result<Option<Account>, StoreError>;
}

/// Registry of access-token consumers.
pub trait ConsumerStore: Send + Sync {
    /// Looks up a consumer by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be queried.
    fn lookup_consumer(&self, key: &str) -> Result<Option<Consumer>, StoreError>;
}

/// Access-token lookup.
pub trait AccessTokenStore: Send + Sync {
    /// Looks up a token issued to a consumer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be queried.
    fn lookup_token(
        &self,
        consumer_key: &str,
        token_key: &str,
    ) -> Result<Option<AccessToken>, StoreError>;
}

/// Replay protection for access-token nonces.
pub trait NonceStore: Send + Sync {
    /// Records a nonce; returns false when it was already seen.
    ///
    /// Timestamps earlier than `not_before` (unix seconds) are outside the
    /// accepted window, so entries recorded for them may be discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be updated.
    fn record_nonce(
        &self,
        consumer_key: &str,
        token_key: &str,
        timestamp: i64,
        nonce: &str,
        not_before: i64,
    ) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Persistence transaction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// Optimistic-concurrency conflict; the attempt may be retried.
    #[error("transaction conflict: {0}")]
    Conflict(String),
    /// Connection lost; the attempt may be retried.
    #[error("transaction connection lost: {0}")]
    ConnectionLost(String),
    /// Non-transient failure.
    #[error("transaction failed: {0}")]
    Failed(String),
}

impl TransactionError {
    /// Returns true when the failure is transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::ConnectionLost(_))
    }
}

/// Persistence transaction exclusively owned by one dispatch attempt.
pub trait Transaction: Send {
    /// Discards every pending write.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError`] when the abort fails.
    fn abort(&mut self) -> Result<(), TransactionError>;

    /// Makes pending writes durable.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError`] when the commit fails.
    fn commit(&mut self) -> Result<(), TransactionError>;

    /// Marks the transaction for guaranteed abort.
    fn doom(&mut self);

    /// Returns true when the transaction is doomed.
    fn is_doomed(&self) -> bool;

    /// Sets the user recorded in the transaction audit field.
    fn set_user(&mut self, user: &str);
}

/// Factory for per-attempt transactions.
pub trait TransactionManager: Send + Sync {
    /// Begins a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError`] when no transaction can be started.
    fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError>;
}

// ============================================================================
// SECTION: Views
// ============================================================================

/// View and traversal errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    /// Nothing was found to publish.
    #[error("not found: {0}")]
    NotFound(String),
    /// Declared retry signal.
    #[error("retry requested: {0}")]
    Retry(String),
    /// Lower-level connection loss, treated as a retry signal.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// Non-transient view failure.
    #[error("view failed: {0}")]
    Failed(String),
}

impl ViewError {
    /// Returns true for retry signals.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Retry(_) | Self::ConnectionLost(_))
    }
}

/// Declared context/view identity used for the page identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewIdentity {
    /// Context type name.
    pub context_type: String,
    /// View type name.
    pub view_type: String,
}

impl ViewIdentity {
    /// Builds a view identity.
    #[must_use]
    pub fn new(context_type: impl Into<String>, view_type: impl Into<String>) -> Self {
        Self {
            context_type: context_type.into(),
            view_type: view_type.into(),
        }
    }

    /// Returns `<context>:<view>`.
    #[must_use]
    pub fn page_id(&self) -> String {
        format!("{}:{}", self.context_type, self.view_type)
    }
}

/// Application view invoked with the request.
pub trait View: Send + Sync {
    /// Renders a response for the request.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError`] when rendering fails.
    fn render(&self, request: &PublicationRequest) -> Result<PublicationResponse, ViewError>;
}

/// Zero-argument callable for views without the request-mapping convention.
pub type RawViewFn = dyn Fn() -> Result<PublicationResponse, ViewError> + Send + Sync;

/// View selected by traversal.
#[derive(Clone)]
pub enum ViewInvoker {
    /// View called with the request.
    Standard {
        /// Declared identity.
        identity: ViewIdentity,
        /// View implementation.
        view: Arc<dyn View>,
    },
    /// Bare callable invoked with no arguments.
    Raw {
        /// Declared identity.
        identity: ViewIdentity,
        /// Callable.
        call: Arc<RawViewFn>,
    },
}

impl ViewInvoker {
    /// Builds a standard invoker.
    #[must_use]
    pub fn standard(identity: ViewIdentity, view: Arc<dyn View>) -> Self {
        Self::Standard {
            identity,
            view,
        }
    }

    /// Builds a raw invoker.
    #[must_use]
    pub fn raw<F>(identity: ViewIdentity, call: F) -> Self
    where
        F: Fn() -> Result<PublicationResponse, ViewError> + Send + Sync + 'static,
    {
        Self::Raw {
            identity,
            call: Arc::new(call),
        }
    }

    /// Returns the declared identity.
    #[must_use]
    pub const fn identity(&self) -> &ViewIdentity {
        match self {
            Self::Standard {
                identity, ..
            }
            | Self::Raw {
                identity, ..
            } => identity,
        }
    }
}

impl fmt::Debug for ViewInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::Standard {
                ..
            } => "Standard",
            Self::Raw {
                ..
            } => "Raw",
        };
        f.debug_struct("ViewInvoker")
            .field("variant", &variant)
            .field("identity", self.identity())
            .finish()
    }
}

/// Traversal step selecting the view for a request.
pub trait Traverser: Send + Sync {
    /// Resolves the request path to a view invoker.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError`] when nothing can be published at the path.
    fn traverse(&self, request: &PublicationRequest) -> Result<ViewInvoker, ViewError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source for expiry checks and phase timers.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time.
    fn now(&self) -> OffsetDateTime;

    /// Returns a monotonic offset from an arbitrary origin.
    fn monotonic(&self) -> Duration;

    /// Returns the current thread's CPU time, when available.
    fn thread_cpu_time(&self) -> Option<Duration> {
        None
    }
}

// ============================================================================
// SECTION: Log Sink
// ============================================================================

/// Sink for per-request publication log events.
pub trait PublicationLogSink: Send + Sync {
    /// Records a publication event.
    fn record(&self, event: &PublicationLogEvent);
}
