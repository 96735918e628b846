// crates/sitegate-server/src/traverser.rs
// ============================================================================
// Module: Site Info Traverser
// Description: Built-in traverser for the standalone binary.
// Purpose: Answer every path with a JSON description of the bound request.
// Dependencies: sitegate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The standalone binary has no application views. [`SiteInfoTraverser`]
//! publishes a JSON document naming the matched site, the canonical URL for
//! the request path, and the resolved principal, which is enough to exercise
//! classification and authentication end to end.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use sitegate_core::AuthMethod;
use sitegate_core::Principal;
use sitegate_core::PublicationRequest;
use sitegate_core::PublicationResponse;
use sitegate_core::Traverser;
use sitegate_core::View;
use sitegate_core::ViewError;
use sitegate_core::ViewIdentity;
use sitegate_core::ViewInvoker;

// ============================================================================
// SECTION: Traverser
// ============================================================================

/// Context type reported in the page identifier.
const CONTEXT_TYPE: &str = "Site";
/// View type reported in the page identifier.
const VIEW_TYPE: &str = "SiteInfoView";

/// Traverser answering every path with [`SiteInfoView`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SiteInfoTraverser;

impl SiteInfoTraverser {
    /// Builds the traverser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Traverser for SiteInfoTraverser {
    fn traverse(&self, _request: &PublicationRequest) -> Result<ViewInvoker, ViewError> {
        Ok(ViewInvoker::standard(ViewIdentity::new(CONTEXT_TYPE, VIEW_TYPE), Arc::new(SiteInfoView)))
    }
}

// ============================================================================
// SECTION: View
// ============================================================================

/// View rendering the site info document.
struct SiteInfoView;

/// JSON body returned by [`SiteInfoView`].
#[derive(Debug, Serialize)]
struct SiteInfo<'a> {
    /// Matched site name.
    site: &'a str,
    /// Request kind label.
    request_kind: &'static str,
    /// Canonical URL of the request path.
    canonical_url: String,
    /// Authenticated user id, absent for anonymous callers.
    user: Option<&'a str>,
    /// Credential scheme.
    auth_method: AuthMethod,
}

impl View for SiteInfoView {
    fn render(&self, request: &PublicationRequest) -> Result<PublicationResponse, ViewError> {
        let anonymous = Principal::anonymous();
        let principal = request.principal().unwrap_or(&anonymous);
        let info = SiteInfo {
            site: request.dispatch().site.name(),
            request_kind: request.dispatch().request_kind.as_str(),
            canonical_url: request.bound().canonical_url(&request.metadata().path),
            user: (!principal.is_anonymous()).then(|| principal.audit_user()),
            auth_method: principal.method,
        };
        let body = serde_json::to_vec(&info).map_err(|err| ViewError::Failed(err.to_string()))?;
        Ok(PublicationResponse::new(200, body).with_header("Content-Type", "application/json"))
    }
}
