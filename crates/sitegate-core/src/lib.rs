// crates/sitegate-core/src/lib.rs
// ============================================================================
// Module: Sitegate Core Library
// Description: Public API surface for the Sitegate request pipeline.
// Purpose: Expose core types, collaborator interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Sitegate core classifies inbound HTTP requests onto virtual-host sites,
//! authenticates callers, and drives the multi-phase publication lifecycle
//! with read-only, retry, and transaction-abort guarantees. Views and the
//! persistence layer are external collaborators reached only through
//! [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AccessToken;
pub use interfaces::AccessTokenStore;
pub use interfaces::Account;
pub use interfaces::Clock;
pub use interfaces::Consumer;
pub use interfaces::ConsumerStore;
pub use interfaces::CredentialStore;
pub use interfaces::NonceStore;
pub use interfaces::PublicationLogSink;
pub use interfaces::SessionStore;
pub use interfaces::StoreError;
pub use interfaces::Transaction;
pub use interfaces::TransactionError;
pub use interfaces::TransactionManager;
pub use interfaces::Traverser;
pub use interfaces::View;
pub use interfaces::ViewError;
pub use interfaces::ViewIdentity;
pub use interfaces::ViewInvoker;
pub use runtime::AbortReason;
pub use runtime::AuthFailureKind;
pub use runtime::AuthenticationError;
pub use runtime::BaseUrlBinder;
pub use runtime::CredentialResolver;
pub use runtime::CredentialSettings;
pub use runtime::CredentialStores;
pub use runtime::ExceptionOutcome;
pub use runtime::FileLogSink;
pub use runtime::InMemoryAccessTokenStore;
pub use runtime::InMemoryConsumerStore;
pub use runtime::InMemoryCredentialStore;
pub use runtime::InMemoryNonceStore;
pub use runtime::InMemorySessionStore;
pub use runtime::InMemoryTransactionManager;
pub use runtime::LifecycleState;
pub use runtime::LifecycleViolation;
pub use runtime::ManualClock;
pub use runtime::NoopLogSink;
pub use runtime::PublicationError;
pub use runtime::PublicationLifecycle;
pub use runtime::Publisher;
pub use runtime::RegistryError;
pub use runtime::RequestClassifier;
pub use runtime::ResolveError;
pub use runtime::StderrLogSink;
pub use runtime::SystemClock;
pub use runtime::TransactionDisposition;
pub use runtime::VirtualHostRegistry;
