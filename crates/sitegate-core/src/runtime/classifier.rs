// crates/sitegate-core/src/runtime/classifier.rs
// ============================================================================
// Module: Request Classifier
// Description: Host/port/method/content-type matching over dispatch rules.
// Purpose: Map each inbound request to one site or one protocol error.
// Dependencies: crate::core::dispatch, crate::runtime::registry
// ============================================================================

//! ## Overview
//! Classification is a pure function of the request inputs and the static
//! rule set. Host/port affinity and method/content-type admissibility are
//! independent failure axes: a request first selects at most one rule by
//! host and port, then that rule decides between a match, 405, and 415.
//!
//! Rules that could both answer the same (site, port) are rejected when the
//! classifier is built, so selection never depends on registration order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::ClassificationResult;
use crate::core::DispatchMatch;
use crate::core::DispatchRule;
use crate::core::HostHeader;
use crate::core::ProtocolError;
use crate::core::RequestMetadata;
use crate::core::base_media_type;
use crate::runtime::registry::RegistryError;
use crate::runtime::registry::VirtualHostRegistry;

// ============================================================================
// SECTION: Classifier
// ============================================================================

/// Request classifier over an immutable rule set.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    /// Site registry.
    registry: Arc<VirtualHostRegistry>,
    /// Dispatch rules.
    rules: Vec<DispatchRule>,
}

impl RequestClassifier {
    /// Builds a classifier, validating the rule set.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when a rule references an unregistered site,
    /// accepts no methods, or overlaps another rule.
    pub fn new(
        registry: Arc<VirtualHostRegistry>,
        rules: Vec<DispatchRule>,
    ) -> Result<Self, RegistryError> {
        for rule in &rules {
            if !registry.contains(&rule.site) {
                return Err(RegistryError::UnknownSite(rule.site.name().to_string()));
            }
            if rule.allowed_methods.is_empty() {
                return Err(RegistryError::NoMethods(rule.site.name().to_string()));
            }
        }
        for (index, first) in rules.iter().enumerate() {
            for second in &rules[index + 1..] {
                if rules_overlap(first, second) {
                    return Err(RegistryError::OverlappingRules {
                        first: rule_label(first),
                        second: rule_label(second),
                    });
                }
            }
        }
        Ok(Self {
            registry,
            rules,
        })
    }

    /// Returns the site registry.
    #[must_use]
    pub fn registry(&self) -> &VirtualHostRegistry {
        &self.registry
    }

    /// Returns the dispatch rules.
    #[must_use]
    pub fn rules(&self) -> &[DispatchRule] {
        &self.rules
    }

    /// Classifies a request from its raw transport inputs.
    #[must_use]
    pub fn classify(
        &self,
        method: &str,
        host_header: Option<&str>,
        server_port: Option<u16>,
        content_type: Option<&str>,
    ) -> ClassificationResult {
        let host = HostHeader::parse(host_header);
        // Transport port wins over the Host header suffix (reverse proxies rewrite it).
        let port = server_port.or(host.port);
        let Some(rule) = self.select_rule(&host, port) else {
            return ClassificationResult::ProtocolError(ProtocolError::unknown_host());
        };
        let method = method.trim().to_ascii_uppercase();
        if !rule.accepts_method(&method) {
            return ClassificationResult::ProtocolError(ProtocolError::method_not_allowed(
                &rule.allowed_methods,
            ));
        }
        let base_type = content_type.map(base_media_type).filter(|value| !value.is_empty());
        if !rule.accepts_content_type(&method, base_type.as_deref()) {
            return ClassificationResult::ProtocolError(ProtocolError::unsupported_media_type());
        }
        ClassificationResult::Matched(DispatchMatch {
            site: Arc::clone(&rule.site),
            request_kind: rule.request_kind,
            publication_kind: rule.publication_kind,
            via_fallback: host.is_empty(),
            max_retries: rule.max_retries,
        })
    }

    /// Classifies a request from its metadata.
    #[must_use]
    pub fn classify_request(&self, metadata: &RequestMetadata) -> ClassificationResult {
        self.classify(&metadata.method, metadata.host(), metadata.server_port, metadata.content_type())
    }

    /// Returns true when some rule answers the host/port, ignoring method.
    #[must_use]
    pub fn can_handle(&self, host_header: Option<&str>, server_port: Option<u16>) -> bool {
        let host = HostHeader::parse(host_header);
        self.select_rule(&host, server_port.or(host.port)).is_some()
    }

    /// Selects the rule answering a host and effective port.
    fn select_rule(&self, host: &HostHeader, port: Option<u16>) -> Option<&DispatchRule> {
        self.rules.iter().find(|rule| {
            let host_matches = if host.is_empty() {
                rule.handles_unmatched_host
            } else {
                rule.site.matches_host(&host.hostname)
            };
            host_matches && rule.accepts_port(port)
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when two rules could answer the same request.
fn rules_overlap(first: &DispatchRule, second: &DispatchRule) -> bool {
    let hosts_overlap = first.site.name() == second.site.name()
        || (first.handles_unmatched_host && second.handles_unmatched_host);
    let ports_overlap = match (first.restricted_port(), second.restricted_port()) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    hosts_overlap && ports_overlap
}

/// Returns a diagnostic label for a rule.
fn rule_label(rule: &DispatchRule) -> String {
    rule.restricted_port().map_or_else(
        || format!("{}/{}", rule.site.name(), rule.publication_kind),
        |port| format!("{}/{}:{port}", rule.site.name(), rule.publication_kind),
    )
}
