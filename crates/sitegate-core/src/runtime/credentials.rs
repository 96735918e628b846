// crates/sitegate-core/src/runtime/credentials.rs
// ============================================================================
// Module: Credential Resolver
// Description: Session, HTTP Basic, and delegated access-token authentication.
// Purpose: Resolve exactly one principal per dispatch attempt, failing closed.
// Dependencies: crate::core, crate::interfaces, base64, subtle, url
// ============================================================================

//! ## Overview
//! Resolution order, first match wins: session token, HTTP Basic, then (for
//! the web-service publication only) an OAuth-1.0-style `PLAINTEXT` access
//! token. Everything else is anonymous. The feeds publication is always
//! anonymous regardless of supplied credentials.
//!
//! Authentication failures are terminal for the attempt. Store failures are
//! reported separately so connection loss can be retried.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;
use thiserror::Error;
use url::form_urlencoded;

use crate::core::AuthMethod;
use crate::core::BoundRequest;
use crate::core::Identity;
use crate::core::Principal;
use crate::core::PublicationKind;
use crate::core::RequestMetadata;
use crate::interfaces::AccessTokenStore;
use crate::interfaces::Clock;
use crate::interfaces::ConsumerStore;
use crate::interfaces::CredentialStore;
use crate::interfaces::NonceStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted `Authorization` header length.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;
/// The only accepted access-token signature method.
const PLAINTEXT: &str = "PLAINTEXT";
/// Form content type whose fields may carry access-token parameters.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
/// Default session cookie name.
const DEFAULT_SESSION_COOKIE: &str = "sitegate_session";
/// Default accepted clock skew for access-token timestamps.
const DEFAULT_TIMESTAMP_SKEW: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication failure sub-kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    /// Consumer key is not registered.
    UnknownConsumer,
    /// Signature method or value is wrong.
    InvalidSignature,
    /// Token key does not resolve to an access token.
    UnknownToken,
    /// Access token has expired.
    ExpiredToken,
    /// Owning account is not active.
    InactiveAccount,
    /// Basic credentials are malformed or wrong.
    InvalidBasicCredential,
    /// Timestamp missing, malformed, or outside the skew window.
    StaleTimestamp,
    /// Nonce missing or already used.
    ReplayedNonce,
}

impl AuthFailureKind {
    /// Returns a stable label for the failure.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownConsumer => "unknown_consumer",
            Self::InvalidSignature => "invalid_signature",
            Self::UnknownToken => "unknown_token",
            Self::ExpiredToken => "expired_token",
            Self::InactiveAccount => "inactive_account",
            Self::InvalidBasicCredential => "invalid_basic_credential",
            Self::StaleTimestamp => "stale_timestamp",
            Self::ReplayedNonce => "replayed_nonce",
        }
    }

    /// Returns the HTTP status reported for the failure.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::InactiveAccount => 403,
            _ => 401,
        }
    }
}

impl fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed ({kind}): {detail}")]
pub struct AuthenticationError {
    /// Failure sub-kind.
    pub kind: AuthFailureKind,
    /// Human-readable detail (never contains secrets).
    pub detail: String,
}

impl AuthenticationError {
    /// Builds an authentication error.
    #[must_use]
    pub fn new(kind: AuthFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Credential resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Credentials were rejected.
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    /// A collaborator store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Collaborator stores consulted during resolution.
#[derive(Clone)]
pub struct CredentialStores {
    /// Browser session store.
    pub sessions: Arc<dyn SessionStore>,
    /// Basic credential store.
    pub credentials: Arc<dyn CredentialStore>,
    /// Access-token consumer registry.
    pub consumers: Arc<dyn ConsumerStore>,
    /// Access-token store.
    pub tokens: Arc<dyn AccessTokenStore>,
    /// Nonce replay store.
    pub nonces: Arc<dyn NonceStore>,
}

/// Resolver tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSettings {
    /// Cookie carrying the session token.
    pub session_cookie: String,
    /// Accepted distance between token timestamps and the clock.
    pub timestamp_skew: Duration,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            timestamp_skew: DEFAULT_TIMESTAMP_SKEW,
        }
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Credential resolver shared across workers.
pub struct CredentialResolver {
    /// Collaborator stores.
    stores: CredentialStores,
    /// Clock for expiry and timestamp checks.
    clock: Arc<dyn Clock>,
    /// Resolver settings.
    settings: CredentialSettings,
}

impl CredentialResolver {
    /// Builds a resolver.
    #[must_use]
    pub fn new(stores: CredentialStores, clock: Arc<dyn Clock>, settings: CredentialSettings) -> Self {
        Self {
            stores,
            clock,
            settings,
        }
    }

    /// Returns the resolver settings.
    #[must_use]
    pub const fn settings(&self) -> &CredentialSettings {
        &self.settings
    }

    /// Resolves the principal for a bound request.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Authentication`] when supplied credentials are
    /// rejected and [`ResolveError::Store`] when a store lookup fails.
    pub fn authenticate(&self, request: &BoundRequest) -> Result<Principal, ResolveError> {
        self.authenticate_attempt(request, 0)
    }

    /// Resolves the principal for one dispatch attempt of a bound request.
    ///
    /// `retries` counts the attempts already made for the same wire request.
    /// A retried attempt reuses the nonce its first attempt recorded, so an
    /// already-seen nonce is accepted once `retries` is non-zero.
    ///
    /// # Errors
    ///
    /// See [`Self::authenticate`].
    pub fn authenticate_attempt(
        &self,
        request: &BoundRequest,
        retries: u32,
    ) -> Result<Principal, ResolveError> {
        self.resolve(request.metadata(), request.dispatch().publication_kind, retries)
    }

    /// Resolves the principal for raw metadata under a publication kind.
    ///
    /// # Errors
    ///
    /// See [`Self::authenticate`].
    pub fn authenticate_metadata(
        &self,
        metadata: &RequestMetadata,
        kind: PublicationKind,
    ) -> Result<Principal, ResolveError> {
        self.resolve(metadata, kind, 0)
    }

    /// Applies the resolution order for one attempt.
    fn resolve(
        &self,
        metadata: &RequestMetadata,
        kind: PublicationKind,
        retries: u32,
    ) -> Result<Principal, ResolveError> {
        if kind.always_anonymous() {
            return Ok(Principal::anonymous());
        }
        if let Some(token) = session_token(metadata, &self.settings.session_cookie)
            && let Some(user_id) = self.stores.sessions.resolve_session(&token)?
        {
            return Ok(Principal::user(user_id, AuthMethod::Session));
        }
        let authorization = authorization_header(metadata)?;
        if let Some(Authorization::Basic(encoded)) = &authorization {
            return self.authenticate_basic(encoded);
        }
        if kind.accepts_access_tokens() {
            let oauth_header = match authorization {
                Some(Authorization::OAuth(params)) => Some(params),
                _ => None,
            };
            if let Some(credential) = AccessTokenCredential::extract(metadata, oauth_header) {
                return self.authenticate_access_token(&credential, retries);
            }
        }
        Ok(Principal::anonymous())
    }

    /// Validates HTTP Basic credentials.
    fn authenticate_basic(&self, encoded: &str) -> Result<Principal, ResolveError> {
        let (login, password) = decode_basic(encoded)?;
        let account = self.stores.credentials.verify_password(&login, &password)?.ok_or_else(|| {
            AuthenticationError::new(AuthFailureKind::InvalidBasicCredential, "invalid login or password")
        })?;
        if !account.status.is_active() {
            return Err(
                AuthenticationError::new(AuthFailureKind::InactiveAccount, "account is not active").into()
            );
        }
        Ok(Principal::user(account.user_id, AuthMethod::Basic))
    }

    /// Validates a delegated access-token credential.
    fn authenticate_access_token(
        &self,
        credential: &AccessTokenCredential,
        retries: u32,
    ) -> Result<Principal, ResolveError> {
        let consumer = self.stores.consumers.lookup_consumer(&credential.consumer_key)?.ok_or_else(|| {
            AuthenticationError::new(AuthFailureKind::UnknownConsumer, "unknown consumer")
        })?;
        if credential.token_key.is_empty() {
            // Anonymous access through a registered consumer: empty token secret.
            verify_signature(credential, "")?;
            return Ok(Principal {
                identity: Identity::Anonymous,
                access_scope: None,
                method: AuthMethod::AccessToken,
            });
        }
        let token = self
            .stores
            .tokens
            .lookup_token(&consumer.key, &credential.token_key)?
            .ok_or_else(|| AuthenticationError::new(AuthFailureKind::UnknownToken, "unknown access token"))?;
        let now = self.clock.now();
        if token.date_expires.is_some_and(|expires| expires <= now) {
            return Err(
                AuthenticationError::new(AuthFailureKind::ExpiredToken, "access token has expired").into()
            );
        }
        verify_signature(credential, &token.secret)?;
        let timestamp = self.verify_timestamp(credential.timestamp.as_deref())?;
        let nonce = credential
            .nonce
            .as_deref()
            .filter(|nonce| !nonce.is_empty())
            .ok_or_else(|| AuthenticationError::new(AuthFailureKind::ReplayedNonce, "missing nonce"))?;
        if !token.owner.status.is_active() {
            return Err(AuthenticationError::new(
                AuthFailureKind::InactiveAccount,
                "token owner account is not active",
            )
            .into());
        }
        let not_before = self.clock.now().unix_timestamp().saturating_sub(self.skew_secs());
        let fresh =
            self.stores.nonces.record_nonce(&consumer.key, &token.key, timestamp, nonce, not_before)?;
        if !fresh && retries == 0 {
            return Err(
                AuthenticationError::new(AuthFailureKind::ReplayedNonce, "nonce already used").into()
            );
        }
        Ok(Principal {
            identity: Identity::User(token.owner.user_id),
            access_scope: Some(token.reviewed_scope),
            method: AuthMethod::AccessToken,
        })
    }

    /// Returns the skew window in whole seconds.
    fn skew_secs(&self) -> i64 {
        i64::try_from(self.settings.timestamp_skew.as_secs()).unwrap_or(i64::MAX)
    }

    /// Checks a token timestamp against the clock and skew window.
    fn verify_timestamp(&self, raw: Option<&str>) -> Result<i64, AuthenticationError> {
        let timestamp = raw
            .and_then(|value| value.trim().parse::<i64>().ok())
            .ok_or_else(|| AuthenticationError::new(AuthFailureKind::StaleTimestamp, "malformed timestamp"))?;
        let now = self.clock.now().unix_timestamp();
        if now.abs_diff(timestamp) > self.settings.timestamp_skew.as_secs() {
            return Err(AuthenticationError::new(
                AuthFailureKind::StaleTimestamp,
                "timestamp outside accepted window",
            ));
        }
        Ok(timestamp)
    }
}

// ============================================================================
// SECTION: Credential Extraction
// ============================================================================

/// Parsed `Authorization` header.
enum Authorization {
    /// `Basic <base64>` payload.
    Basic(String),
    /// `OAuth k="v", ...` parameters.
    OAuth(BTreeMap<String, String>),
}

/// Access-token credential parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AccessTokenCredential {
    /// Consumer key.
    consumer_key: String,
    /// Token key (empty for anonymous access).
    token_key: String,
    /// Signature method.
    signature_method: String,
    /// Signature value.
    signature: String,
    /// Timestamp in seconds since epoch.
    timestamp: Option<String>,
    /// Nonce.
    nonce: Option<String>,
}

impl AccessTokenCredential {
    /// Extracts credential parameters from header, query, then form fields.
    fn extract(metadata: &RequestMetadata, header: Option<BTreeMap<String, String>>) -> Option<Self> {
        let mut sources = Vec::new();
        if let Some(params) = header {
            sources.push(params);
        }
        if let Some(query) = metadata.query.as_deref() {
            sources.push(parse_form(query.as_bytes()));
        }
        if metadata.base_content_type().as_deref() == Some(FORM_CONTENT_TYPE) {
            sources.push(parse_form(&metadata.body));
        }
        let params = sources.into_iter().find(|params| oauth_param(params, "consumer_key").is_some())?;
        let get = |name: &str| oauth_param(&params, name).map(str::to_string);
        Some(Self {
            consumer_key: get("consumer_key")?,
            token_key: get("token").unwrap_or_default(),
            signature_method: get("signature_method").unwrap_or_default(),
            signature: get("signature").unwrap_or_default(),
            timestamp: get("timestamp"),
            nonce: get("nonce"),
        })
    }
}

/// Returns an OAuth parameter, accepting the bare alias.
fn oauth_param<'a>(params: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(&format!("oauth_{name}"))
        .or_else(|| params.get(name))
        .map(String::as_str)
}

/// Parses form-urlencoded pairs; later duplicates are ignored.
fn parse_form(input: &[u8]) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(input) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    params
}

/// Reads the session token from the `Cookie` header.
fn session_token(metadata: &RequestMetadata, cookie_name: &str) -> Option<String> {
    metadata.header("cookie")?.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name.trim() == cookie_name && !value.trim().is_empty()).then(|| value.trim().to_string())
    })
}

/// Parses the `Authorization` header into a supported scheme.
fn authorization_header(metadata: &RequestMetadata) -> Result<Option<Authorization>, AuthenticationError> {
    let Some(header) = metadata.header("authorization") else {
        return Ok(None);
    };
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthenticationError::new(
            AuthFailureKind::InvalidBasicCredential,
            "authorization header too large",
        ));
    }
    let (scheme, rest) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    if scheme.eq_ignore_ascii_case("basic") {
        return Ok(Some(Authorization::Basic(rest.trim().to_string())));
    }
    if scheme.eq_ignore_ascii_case("oauth") {
        return Ok(Some(Authorization::OAuth(parse_oauth_header(rest))));
    }
    Ok(None)
}

/// Parses `k="v", k2="v2"` OAuth header parameters, percent-decoding values.
fn parse_oauth_header(rest: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for item in rest.split(',') {
        let Some((key, value)) = item.trim().split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("realm") {
            continue;
        }
        let value = value.trim().trim_matches('"');
        // Header values are percent-encoded; keep '+' and '&' literal.
        let escaped = value.replace('+', "%2B").replace('&', "%26");
        let decoded = form_urlencoded::parse(format!("v={escaped}").as_bytes())
            .next()
            .map(|(_, decoded)| decoded.into_owned())
            .unwrap_or_default();
        params.entry(key.to_string()).or_insert(decoded);
    }
    params
}

/// Decodes a Basic credential payload into login and password.
fn decode_basic(encoded: &str) -> Result<(String, String), AuthenticationError> {
    let invalid =
        |detail: &str| AuthenticationError::new(AuthFailureKind::InvalidBasicCredential, detail);
    let bytes = STANDARD.decode(encoded.trim()).map_err(|_| invalid("malformed base64 credentials"))?;
    let text = String::from_utf8(bytes).map_err(|_| invalid("credentials are not utf-8"))?;
    let (login, password) = text.split_once(':').ok_or_else(|| invalid("credentials lack a colon"))?;
    if login.is_empty() {
        return Err(invalid("empty login"));
    }
    Ok((login.to_string(), password.to_string()))
}

/// Requires the `PLAINTEXT` method and compares the signature in constant time.
fn verify_signature(
    credential: &AccessTokenCredential,
    token_secret: &str,
) -> Result<(), AuthenticationError> {
    if credential.signature_method != PLAINTEXT {
        return Err(AuthenticationError::new(
            AuthFailureKind::InvalidSignature,
            "signature method must be PLAINTEXT",
        ));
    }
    signature_matches(&credential.signature, token_secret)
}

/// Compares a signature against `&<secret>` in constant time.
fn signature_matches(signature: &str, token_secret: &str) -> Result<(), AuthenticationError> {
    let expected = format!("&{token_secret}");
    let matches = signature.len() == expected.len()
        && bool::from(signature.as_bytes().ct_eq(expected.as_bytes()));
    if matches {
        Ok(())
    } else {
        Err(AuthenticationError::new(AuthFailureKind::InvalidSignature, "invalid signature"))
    }
}
