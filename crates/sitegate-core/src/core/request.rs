// crates/sitegate-core/src/core/request.rs
// ============================================================================
// Module: Request Types
// Description: Wire-level request metadata and per-attempt request state.
// Purpose: Carry the inbound request from classification through publication.
// Dependencies: crate::core::{dispatch, principal, telemetry}, url
// ============================================================================

//! ## Overview
//! [`RequestMetadata`] is the transport-level snapshot of a request and is
//! cloned for every dispatch attempt. [`BoundRequest`] pairs it with the
//! classification outcome and the canonical application URL.
//! [`PublicationRequest`] adds the per-attempt principal and telemetry slot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;
use url::Url;

use crate::core::dispatch::DispatchMatch;
use crate::core::principal::Principal;
use crate::core::telemetry::TelemetryContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Methods whose transactions are never committed.
pub const READ_ONLY_METHODS: [&str; 2] = ["GET", "HEAD"];

// ============================================================================
// SECTION: Request Metadata
// ============================================================================

/// Transport-level request snapshot.
///
/// # Invariants
/// - Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestMetadata {
    /// Request method (uppercase token).
    pub method: String,
    /// Request path.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Destination port reported by the transport.
    pub server_port: Option<u16>,
    /// Local address the request arrived on (`host:port`).
    pub server_addr: Option<String>,
    /// Request headers keyed by lowercase name.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Vec<u8>,
}

impl RequestMetadata {
    /// Builds request metadata for a method and path.
    #[must_use]
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.trim().to_ascii_uppercase(),
            path: path.to_string(),
            ..Self::default()
        }
    }

    /// Returns a copy with a header set (name is lowercased).
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Returns a copy with the transport port set.
    #[must_use]
    pub const fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    /// Returns a copy with the query string set.
    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    /// Returns a copy with the body set.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns the raw `Host` header.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    /// Returns the raw `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the base media type of the `Content-Type` header.
    #[must_use]
    pub fn base_content_type(&self) -> Option<String> {
        self.content_type().map(base_media_type).filter(|value| !value.is_empty())
    }

    /// Returns true for methods whose writes are never committed.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        READ_ONLY_METHODS.contains(&self.method.as_str())
    }
}

/// Returns the lowercase base media type, dropping any parameters.
#[must_use]
pub fn base_media_type(value: &str) -> String {
    value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

// ============================================================================
// SECTION: Bound Request
// ============================================================================

/// Classified request bound to its site's canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundRequest {
    /// Wire-level metadata for this attempt.
    metadata: RequestMetadata,
    /// Classification outcome.
    dispatch: DispatchMatch,
    /// Base URL for canonical URL generation, when known.
    application_url: Option<Url>,
}

impl BoundRequest {
    /// Builds a bound request.
    #[must_use]
    pub(crate) const fn new(
        metadata: RequestMetadata,
        dispatch: DispatchMatch,
        application_url: Option<Url>,
    ) -> Self {
        Self {
            metadata,
            dispatch,
            application_url,
        }
    }

    /// Returns the wire-level metadata.
    #[must_use]
    pub const fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    /// Returns the classification outcome.
    #[must_use]
    pub const fn dispatch(&self) -> &DispatchMatch {
        &self.dispatch
    }

    /// Returns the application base URL.
    #[must_use]
    pub const fn application_url(&self) -> Option<&Url> {
        self.application_url.as_ref()
    }

    /// Builds a canonical URL for a path.
    ///
    /// Falls back to the bare path when no application URL is known.
    #[must_use]
    pub fn canonical_url(&self, path: &str) -> String {
        let relative = path.trim_start_matches('/');
        self.application_url
            .as_ref()
            .and_then(|base| base.join(relative).ok())
            .map_or_else(|| format!("/{relative}"), |url| url.to_string())
    }
}

// ============================================================================
// SECTION: Publication Request
// ============================================================================

/// A principal was attached twice within one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("principal already attached to request")]
pub struct PrincipalAlreadyAttached;

/// Per-attempt request state owned by the lifecycle.
#[derive(Debug, Clone)]
pub struct PublicationRequest {
    /// Bound request.
    bound: BoundRequest,
    /// Principal attached during `before_traversal`.
    principal: Option<Principal>,
    /// Telemetry slot for this attempt.
    telemetry: TelemetryContext,
    /// Retries already performed before this attempt.
    retries: u32,
}

impl PublicationRequest {
    /// Wraps a bound request for one attempt.
    #[must_use]
    pub fn new(bound: BoundRequest, retries: u32) -> Self {
        Self {
            bound,
            principal: None,
            telemetry: TelemetryContext::new(),
            retries,
        }
    }

    /// Returns the bound request.
    #[must_use]
    pub const fn bound(&self) -> &BoundRequest {
        &self.bound
    }

    /// Returns the wire-level metadata.
    #[must_use]
    pub const fn metadata(&self) -> &RequestMetadata {
        self.bound.metadata()
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.bound.metadata().method
    }

    /// Returns the classification outcome.
    #[must_use]
    pub const fn dispatch(&self) -> &DispatchMatch {
        self.bound.dispatch()
    }

    /// Returns the attached principal.
    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Attaches the resolved principal.
    ///
    /// # Errors
    ///
    /// Returns [`PrincipalAlreadyAttached`] when a principal is already set.
    pub fn attach_principal(&mut self, principal: Principal) -> Result<(), PrincipalAlreadyAttached> {
        if self.principal.is_some() {
            return Err(PrincipalAlreadyAttached);
        }
        self.principal = Some(principal);
        Ok(())
    }

    /// Returns the telemetry slot.
    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryContext {
        &self.telemetry
    }

    /// Returns the mutable telemetry slot.
    pub const fn telemetry_mut(&mut self) -> &mut TelemetryContext {
        &mut self.telemetry
    }

    /// Returns the number of retries performed before this attempt.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Returns true while the retry budget is not exhausted.
    #[must_use]
    pub const fn supports_retry(&self) -> bool {
        self.retries < self.bound.dispatch().max_retries
    }

    /// Returns true for read-only methods.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.bound.metadata().is_read_only()
    }

    /// Returns true for HEAD requests.
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.method() == "HEAD"
    }
}
