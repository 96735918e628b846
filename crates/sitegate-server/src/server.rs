// crates/sitegate-server/src/server.rs
// ============================================================================
// Module: Sitegate Server
// Description: axum listeners feeding the Sitegate publisher.
// Purpose: Convert HTTP requests to request metadata and publish them.
// Dependencies: sitegate-core, sitegate-config, axum, tokio, tracing
// ============================================================================

//! ## Overview
//! [`SitegateServer`] is built from a validated [`SitegateConfig`]. Binding
//! produces a [`BoundServer`] holding one TCP listener per distinct port; each
//! listener passes its own port as the transport-layer port so restricted
//! sites only answer on theirs. Publication is synchronous and runs on
//! `spawn_blocking`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::response::Response;
use bytes::Bytes;
use sitegate_config::LogSinkKind;
use sitegate_config::SitegateConfig;
use sitegate_core::Clock;
use sitegate_core::CredentialResolver;
use sitegate_core::FileLogSink;
use sitegate_core::InMemoryTransactionManager;
use sitegate_core::NoopLogSink;
use sitegate_core::PublicationLogSink;
use sitegate_core::PublicationResponse;
use sitegate_core::Publisher;
use sitegate_core::RequestMetadata;
use sitegate_core::StderrLogSink;
use sitegate_core::SystemClock;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::tracing_sink::TracingLogSink;
use crate::traverser::SiteInfoTraverser;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Sitegate HTTP server.
pub struct SitegateServer {
    /// Listener addresses.
    addrs: Vec<SocketAddr>,
    /// Maximum accepted request body size.
    max_body_bytes: usize,
    /// Shared publisher.
    publisher: Arc<Publisher>,
}

impl SitegateServer {
    /// Builds a server with the built-in traverser and in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid or the log sink
    /// cannot be opened.
    pub fn from_config(config: &SitegateConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let classifier = config.classifier().map_err(|err| ServerError::Config(err.to_string()))?;
        let stores = config.credential_stores().map_err(|err| ServerError::Config(err.to_string()))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let resolver = CredentialResolver::new(stores, Arc::clone(&clock), config.credential_settings());
        let publisher = Publisher::new(
            Arc::new(classifier),
            Arc::new(resolver),
            Arc::new(SiteInfoTraverser::new()),
            Arc::new(InMemoryTransactionManager::new()),
            clock,
            build_log_sink(config)?,
        );
        Self::with_publisher(config, Arc::new(publisher))
    }

    /// Builds a server around an embedder-supplied publisher.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when listener addresses are invalid.
    pub fn with_publisher(config: &SitegateConfig, publisher: Arc<Publisher>) -> Result<Self, ServerError> {
        let addrs = config.listener_addrs().map_err(|err| ServerError::Config(err.to_string()))?;
        Ok(Self {
            addrs: addrs.into_iter().collect(),
            max_body_bytes: config.server.max_body_bytes,
            publisher,
        })
    }

    /// Returns the shared publisher.
    #[must_use]
    pub const fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Binds every listener without serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when a listener cannot bind.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let mut listeners = Vec::with_capacity(self.addrs.len());
        for addr in &self.addrs {
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|err| ServerError::Transport(format!("bind {addr} failed: {err}")))?;
            let local = listener
                .local_addr()
                .map_err(|err| ServerError::Transport(format!("local address for {addr}: {err}")))?;
            tracing::info!(addr = %local, "listener bound");
            listeners.push(listener);
        }
        Ok(BoundServer {
            listeners,
            max_body_bytes: self.max_body_bytes,
            publisher: self.publisher,
        })
    }

    /// Binds and serves until a listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.bind().await?.serve().await
    }
}

/// Server with bound listeners.
pub struct BoundServer {
    /// Bound listeners, one per port.
    listeners: Vec<TcpListener>,
    /// Maximum accepted request body size.
    max_body_bytes: usize,
    /// Shared publisher.
    publisher: Arc<Publisher>,
}

impl BoundServer {
    /// Returns the local address of every listener.
    #[must_use]
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().filter_map(|listener| listener.local_addr().ok()).collect()
    }

    /// Serves all listeners until one fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when a listener stops with an error.
    pub async fn serve(self) -> Result<(), ServerError> {
        let mut tasks = JoinSet::new();
        for listener in self.listeners {
            let addr = listener
                .local_addr()
                .map_err(|err| ServerError::Transport(format!("listener address: {err}")))?;
            let app = router(Arc::clone(&self.publisher), addr, self.max_body_bytes);
            tasks.spawn(async move {
                axum::serve(listener, app)
                    .await
                    .map_err(|err| ServerError::Transport(format!("listener {addr} failed: {err}")))
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|err| ServerError::Transport(format!("listener task: {err}")))?;
            if let Err(err) = result {
                tracing::error!(error = %err, "listener stopped");
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Builds the publication log sink selected by configuration.
fn build_log_sink(config: &SitegateConfig) -> Result<Arc<dyn PublicationLogSink>, ServerError> {
    let sink: Arc<dyn PublicationLogSink> = match config.server.log {
        LogSinkKind::Stderr => Arc::new(StderrLogSink),
        LogSinkKind::Tracing => Arc::new(TracingLogSink),
        LogSinkKind::None => Arc::new(NoopLogSink),
        LogSinkKind::File => {
            let path = config
                .server
                .log_path
                .as_deref()
                .ok_or_else(|| ServerError::Config("server.log_path is required for file logging".to_string()))?;
            let sink = FileLogSink::new(std::path::Path::new(path))
                .map_err(|err| ServerError::Init(format!("open {path}: {err}")))?;
            Arc::new(sink)
        }
    };
    Ok(sink)
}

// ============================================================================
// SECTION: HTTP Handling
// ============================================================================

/// Per-listener handler state.
#[derive(Clone)]
struct ListenerState {
    /// Shared publisher.
    publisher: Arc<Publisher>,
    /// Local address the listener is bound to.
    local_addr: SocketAddr,
}

/// Builds the router for one listener.
fn router(publisher: Arc<Publisher>, local_addr: SocketAddr, max_body_bytes: usize) -> Router {
    let state = ListenerState {
        publisher,
        local_addr,
    };
    Router::new()
        .fallback(handle_request)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Publishes one HTTP request.
async fn handle_request(
    State(state): State<ListenerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let metadata = request_metadata(&method, &uri, &headers, body, state.local_addr);
    let publisher = Arc::clone(&state.publisher);
    match tokio::task::spawn_blocking(move || publisher.publish(&metadata)).await {
        Ok(response) => into_http_response(response),
        Err(err) => {
            tracing::error!(error = %err, "publication worker failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Converts HTTP request parts into request metadata.
pub(crate) fn request_metadata(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
    local_addr: SocketAddr,
) -> RequestMetadata {
    let mut metadata = RequestMetadata::new(method.as_str(), uri.path()).with_server_port(local_addr.port());
    metadata.server_addr = Some(local_addr.to_string());
    if let Some(query) = uri.query() {
        metadata = metadata.with_query(query);
    }
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            let entry = metadata.headers.entry(name.as_str().to_string()).or_default();
            if entry.is_empty() {
                value.clone_into(entry);
            } else {
                // Repeated headers fold into one comma-separated value.
                entry.push_str(", ");
                entry.push_str(value);
            }
        }
    }
    if !metadata.headers.contains_key("host")
        && let Some(authority) = uri.authority()
    {
        metadata.headers.insert("host".to_string(), authority.as_str().to_string());
    }
    metadata.body = body.to_vec();
    metadata
}

/// Converts a publication response into an HTTP response.
pub(crate) fn into_http_response(response: PublicationResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            http.headers_mut().append(name, value);
        }
    }
    http
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sitegate server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
