// crates/sitegate-core/src/runtime/mod.rs
// ============================================================================
// Module: Sitegate Runtime
// Description: Registry, classifier, binder, resolver, lifecycle, and publisher.
// Purpose: Implement the request classification and publication pipeline.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime components are built once at startup from immutable configuration
//! and shared read-only across workers. Per-request state lives in
//! [`crate::core::PublicationRequest`] and [`PublicationLifecycle`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod binder;
pub mod classifier;
pub mod clock;
pub mod credentials;
pub mod lifecycle;
pub mod log_sink;
pub mod memory;
pub mod publisher;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use binder::BaseUrlBinder;
pub use classifier::RequestClassifier;
pub use clock::SystemClock;
pub use credentials::AuthFailureKind;
pub use credentials::AuthenticationError;
pub use credentials::CredentialResolver;
pub use credentials::CredentialSettings;
pub use credentials::CredentialStores;
pub use credentials::ResolveError;
pub use lifecycle::AbortReason;
pub use lifecycle::ExceptionOutcome;
pub use lifecycle::LifecycleState;
pub use lifecycle::LifecycleViolation;
pub use lifecycle::PublicationError;
pub use lifecycle::PublicationLifecycle;
pub use lifecycle::TransactionDisposition;
pub use log_sink::FileLogSink;
pub use log_sink::NoopLogSink;
pub use log_sink::StderrLogSink;
pub use memory::InMemoryAccessTokenStore;
pub use memory::InMemoryConsumerStore;
pub use memory::InMemoryCredentialStore;
pub use memory::InMemoryNonceStore;
pub use memory::InMemorySessionStore;
pub use memory::InMemoryTransactionManager;
pub use memory::ManualClock;
pub use publisher::Publisher;
pub use registry::RegistryError;
pub use registry::VirtualHostRegistry;
