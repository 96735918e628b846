// crates/sitegate-server/src/lib.rs
// ============================================================================
// Module: Sitegate Server Library
// Description: HTTP front end for the Sitegate publication pipeline.
// Purpose: Bind listeners and hand each request to the core publisher.
// Dependencies: sitegate-core, sitegate-config, axum, tokio
// ============================================================================

//! ## Overview
//! The server binds one listener per configured port, converts each HTTP
//! request into [`sitegate_core::RequestMetadata`], and publishes it on a
//! blocking worker thread. Security posture: request inputs are untrusted and
//! bodies are capped before conversion.

pub mod server;
pub mod tracing_sink;
pub mod traverser;

pub use server::BoundServer;
pub use server::ServerError;
pub use server::SitegateServer;
pub use tracing_sink::TracingLogSink;
pub use traverser::SiteInfoTraverser;
