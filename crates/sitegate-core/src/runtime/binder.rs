// crates/sitegate-core/src/runtime/binder.rs
// ============================================================================
// Module: Base-URL Binder
// Description: Binds classified requests to their site's canonical root URL.
// Purpose: Keep client-supplied Host headers out of generated links.
// Dependencies: crate::core, url
// ============================================================================

//! ## Overview
//! A matched request is bound to the site's configured root URL so canonical
//! URL generation never echoes a spoofed `Host` header. Requests matched
//! through the unmatched-host fallback are not rewritten; they use the
//! address they actually arrived on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use url::Url;

use crate::core::BoundRequest;
use crate::core::DispatchMatch;
use crate::core::RequestMetadata;

// ============================================================================
// SECTION: Binder
// ============================================================================

/// Constructs bound requests for matched classifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseUrlBinder;

impl BaseUrlBinder {
    /// Binds request metadata to a classification match.
    #[must_use]
    pub fn bind(matched: DispatchMatch, metadata: RequestMetadata) -> BoundRequest {
        let application_url = if matched.via_fallback {
            arrival_url(&metadata, matched.site.use_https())
        } else {
            Some(matched.site.root_url().clone())
        };
        BoundRequest::new(metadata, matched, application_url)
    }
}

/// Builds a base URL from the host/port the request arrived on.
fn arrival_url(metadata: &RequestMetadata, use_https: bool) -> Option<Url> {
    let authority = metadata
        .host()
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .or(metadata.server_addr.as_deref())?;
    let scheme = if use_https { "https" } else { "http" };
    Url::parse(&format!("{scheme}://{authority}/")).ok()
}
