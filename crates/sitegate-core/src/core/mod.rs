// crates/sitegate-core/src/core/mod.rs
// ============================================================================
// Module: Sitegate Core Types
// Description: Canonical site, dispatch, principal, request, and telemetry types.
// Purpose: Provide stable types shared by the classifier, resolver, and lifecycle.
// Dependencies: serde, url, time
// ============================================================================

//! ## Overview
//! Core types describe the static virtual-host configuration, the outcome of
//! request classification, the resolved caller identity, and the per-request
//! telemetry slot. Configuration types are immutable once constructed; request
//! types live for exactly one dispatch attempt.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod dispatch;
pub mod principal;
pub mod request;
pub mod response;
pub mod site;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dispatch::BODY_METHODS;
pub use dispatch::ClassificationResult;
pub use dispatch::DispatchMatch;
pub use dispatch::DispatchRule;
pub use dispatch::ProtocolError;
pub use dispatch::ProtocolStatus;
pub use dispatch::PublicationKind;
pub use dispatch::RequestKind;
pub use principal::AccessLevel;
pub use principal::AccessScope;
pub use principal::AccountStatus;
pub use principal::AuthMethod;
pub use principal::Identity;
pub use principal::Principal;
pub use request::BoundRequest;
pub use request::PublicationRequest;
pub use request::READ_ONLY_METHODS;
pub use request::RequestMetadata;
pub use request::base_media_type;
pub use response::PublicationResponse;
pub use site::HostHeader;
pub use site::SiteDefinition;
pub use site::SiteError;
pub use site::normalize_hostname;
pub use site::parse_alt_hostnames;
pub use telemetry::ClockReading;
pub use telemetry::PublicationLogEvent;
pub use telemetry::RequestTelemetry;
pub use telemetry::TelemetryContext;
pub use telemetry::TelemetryKey;
pub use telemetry::TelemetryValue;
