// crates/sitegate-core/src/core/dispatch.rs
// ============================================================================
// Module: Dispatch Rules
// Description: Request/publication kinds, dispatch rules, and classification results.
// Purpose: Describe how a site accepts requests and what classification yields.
// Dependencies: crate::core::site, serde
// ============================================================================

//! ## Overview
//! A [`DispatchRule`] binds a site to a request kind and publication kind and
//! limits the accepted methods and content types. Classification produces
//! exactly one [`ClassificationResult`]: a [`DispatchMatch`] or a
//! [`ProtocolError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::request::base_media_type;
use crate::core::site::SiteDefinition;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Methods whose requests carry a body subject to content-type restrictions.
pub const BODY_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

/// Default retry budget for a dispatch rule.
const DEFAULT_MAX_RETRIES: u32 = 3;

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Behavioral contract associated with a matched site.
///
/// # Invariants
/// - Variants are stable for configuration and telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationKind {
    /// Browser HTML site.
    Browser,
    /// Syndication feeds (always anonymous).
    Feeds,
    /// JSON web-service API.
    WebService,
    /// Public XML-RPC endpoint.
    #[serde(rename = "public_xmlrpc")]
    PublicXmlRpc,
    /// Private XML-RPC endpoint (port-restricted).
    #[serde(rename = "private_xmlrpc")]
    PrivateXmlRpc,
}

impl PublicationKind {
    /// Returns a stable label for the publication kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Feeds => "feeds",
            Self::WebService => "web_service",
            Self::PublicXmlRpc => "public_xmlrpc",
            Self::PrivateXmlRpc => "private_xmlrpc",
        }
    }

    /// Returns the request kind constructed for this publication kind.
    #[must_use]
    pub const fn request_kind(self) -> RequestKind {
        match self {
            Self::Browser => RequestKind::Browser,
            Self::Feeds => RequestKind::Feeds,
            Self::WebService => RequestKind::WebService,
            Self::PublicXmlRpc => RequestKind::PublicXmlRpc,
            Self::PrivateXmlRpc => RequestKind::PrivateXmlRpc,
        }
    }

    /// Returns true when every caller resolves to the anonymous principal.
    #[must_use]
    pub const fn always_anonymous(self) -> bool {
        matches!(self, Self::Feeds)
    }

    /// Returns true when access-token credentials are honored.
    #[must_use]
    pub const fn accepts_access_tokens(self) -> bool {
        matches!(self, Self::WebService)
    }

    /// Returns the default accepted methods.
    #[must_use]
    pub fn default_methods(self) -> BTreeSet<String> {
        let methods: &[&str] = match self {
            Self::Browser | Self::Feeds => &["GET", "HEAD", "POST"],
            Self::WebService => &["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS"],
            Self::PublicXmlRpc | Self::PrivateXmlRpc => &["POST"],
        };
        methods.iter().map(|method| (*method).to_string()).collect()
    }

    /// Returns the default accepted content types, if restricted.
    #[must_use]
    pub fn default_content_types(self) -> Option<BTreeSet<String>> {
        match self {
            Self::Browser | Self::Feeds => None,
            Self::WebService => Some(BTreeSet::from(["application/json".to_string()])),
            Self::PublicXmlRpc | Self::PrivateXmlRpc => {
                Some(BTreeSet::from(["text/xml".to_string()]))
            }
        }
    }
}

impl fmt::Display for PublicationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the request object built for a matched site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Browser request.
    Browser,
    /// Feeds request.
    Feeds,
    /// Web-service client request.
    WebService,
    /// Public XML-RPC request.
    #[serde(rename = "public_xmlrpc")]
    PublicXmlRpc,
    /// Private XML-RPC request.
    #[serde(rename = "private_xmlrpc")]
    PrivateXmlRpc,
}

impl RequestKind {
    /// Returns a stable label for the request kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser_request",
            Self::Feeds => "feeds_request",
            Self::WebService => "web_service_request",
            Self::PublicXmlRpc => "public_xmlrpc_request",
            Self::PrivateXmlRpc => "private_xmlrpc_request",
        }
    }
}

// ============================================================================
// SECTION: Dispatch Rule
// ============================================================================

/// Rule binding a site to request/publication behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRule {
    /// Site served by this rule.
    pub site: Arc<SiteDefinition>,
    /// Request kind produced on match.
    pub request_kind: RequestKind,
    /// Publication kind produced on match.
    pub publication_kind: PublicationKind,
    /// Accepted methods.
    pub allowed_methods: BTreeSet<String>,
    /// Accepted base content types for body-carrying methods.
    pub allowed_content_types: Option<BTreeSet<String>>,
    /// Whether the rule answers requests that carry no hostname.
    pub handles_unmatched_host: bool,
    /// Retry budget for requests matched by this rule; zero disables retry.
    pub max_retries: u32,
}

impl DispatchRule {
    /// Builds a rule with the defaults for the publication kind.
    #[must_use]
    pub fn for_site(site: Arc<SiteDefinition>, publication_kind: PublicationKind) -> Self {
        Self {
            site,
            request_kind: publication_kind.request_kind(),
            publication_kind,
            allowed_methods: publication_kind.default_methods(),
            allowed_content_types: publication_kind.default_content_types(),
            handles_unmatched_host: false,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Returns a copy with the accepted methods replaced.
    #[must_use]
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_methods =
            methods.into_iter().map(|method| method.as_ref().trim().to_ascii_uppercase()).collect();
        self
    }

    /// Returns a copy with the accepted content types replaced.
    #[must_use]
    pub fn with_content_types<I, S>(mut self, content_types: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_content_types = content_types
            .map(|types| types.into_iter().map(|value| base_media_type(value.as_ref())).collect());
        self
    }

    /// Returns a copy that answers requests without a hostname.
    #[must_use]
    pub const fn handling_unmatched_host(mut self) -> Self {
        self.handles_unmatched_host = true;
        self
    }

    /// Returns a copy with the retry budget replaced.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns the port this rule is restricted to, if any.
    #[must_use]
    pub fn restricted_port(&self) -> Option<u16> {
        self.site.restricted_port()
    }

    /// Returns true when the rule accepts the effective port.
    #[must_use]
    pub fn accepts_port(&self, port: Option<u16>) -> bool {
        self.restricted_port().is_none_or(|restricted| port == Some(restricted))
    }

    /// Returns true when the method is accepted.
    #[must_use]
    pub fn accepts_method(&self, method: &str) -> bool {
        self.allowed_methods.contains(method)
    }

    /// Returns true when the content type is acceptable for the method.
    #[must_use]
    pub fn accepts_content_type(&self, method: &str, base_content_type: Option<&str>) -> bool {
        let Some(allowed) = &self.allowed_content_types else {
            return true;
        };
        if !BODY_METHODS.contains(&method) {
            return true;
        }
        base_content_type.is_some_and(|value| allowed.contains(value))
    }
}

// ============================================================================
// SECTION: Classification Result
// ============================================================================

/// Successful classification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchMatch {
    /// Matched site.
    pub site: Arc<SiteDefinition>,
    /// Request kind to construct.
    pub request_kind: RequestKind,
    /// Publication behavior to apply.
    pub publication_kind: PublicationKind,
    /// True when the match came through the unmatched-host fallback.
    pub via_fallback: bool,
    /// Retry budget for the request.
    pub max_retries: u32,
}

/// Protocol error status produced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStatus {
    /// No site answers for the host/port.
    UnknownHost,
    /// Site matched but the method is not accepted.
    MethodNotAllowed,
    /// Method accepted but the content type is not.
    UnsupportedMediaType,
}

impl ProtocolStatus {
    /// Returns the HTTP status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::UnknownHost => 404,
            Self::MethodNotAllowed => 405,
            Self::UnsupportedMediaType => 415,
        }
    }

    /// Returns the HTTP reason phrase.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::UnknownHost => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::UnsupportedMediaType => "Unsupported Media Type",
        }
    }
}

/// Protocol-level classification failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    /// Failure status.
    pub status: ProtocolStatus,
    /// Sorted `Allow` header values for 405 responses.
    pub allow: Option<Vec<String>>,
}

impl ProtocolError {
    /// Builds a 404 protocol error.
    #[must_use]
    pub const fn unknown_host() -> Self {
        Self {
            status: ProtocolStatus::UnknownHost,
            allow: None,
        }
    }

    /// Builds a 405 protocol error listing the accepted methods.
    #[must_use]
    pub fn method_not_allowed(allowed: &BTreeSet<String>) -> Self {
        Self {
            status: ProtocolStatus::MethodNotAllowed,
            allow: Some(allowed.iter().cloned().collect()),
        }
    }

    /// Builds a 415 protocol error.
    #[must_use]
    pub const fn unsupported_media_type() -> Self {
        Self {
            status: ProtocolStatus::UnsupportedMediaType,
            allow: None,
        }
    }
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationResult {
    /// Request belongs to a site.
    Matched(DispatchMatch),
    /// Request is rejected at the protocol level.
    ProtocolError(ProtocolError),
}

impl ClassificationResult {
    /// Returns the match payload, if any.
    #[must_use]
    pub const fn as_match(&self) -> Option<&DispatchMatch> {
        match self {
            Self::Matched(matched) => Some(matched),
            Self::ProtocolError(_) => None,
        }
    }

    /// Returns the protocol error, if any.
    #[must_use]
    pub const fn as_protocol_error(&self) -> Option<&ProtocolError> {
        match self {
            Self::Matched(_) => None,
            Self::ProtocolError(error) => Some(error),
        }
    }
}
