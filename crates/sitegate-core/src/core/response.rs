// crates/sitegate-core/src/core/response.rs
// ============================================================================
// Module: Publication Responses
// Description: Transport-neutral HTTP response produced by publication.
// Purpose: Carry status, headers, and body back to the transport layer.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Views and the publisher produce a [`PublicationResponse`]; the transport
//! layer turns it into a wire response.

/// Transport-neutral HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublicationResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in emission order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl PublicationResponse {
    /// Builds a response with a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Returns a copy with a header appended.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Returns the first header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
