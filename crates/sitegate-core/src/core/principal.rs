// crates/sitegate-core/src/core/principal.rs
// ============================================================================
// Module: Principals
// Description: Resolved caller identity and delegated access scope.
// Purpose: Carry the authenticated identity for one dispatch attempt.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Principal`] is produced once per dispatch attempt by the credential
//! resolver and read by downstream authorization and the transaction audit
//! log. Access scope is present only for delegated access-token callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Identity {
    /// Unauthenticated caller.
    Anonymous,
    /// Authenticated user.
    User(String),
}

/// Delegated access level granted to an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    /// Read public data.
    ReadPublic,
    /// Read public and private data.
    ReadPrivate,
    /// Read and change public data.
    WritePublic,
    /// Read and change public and private data.
    WritePrivate,
    /// Full desktop-integration access.
    DesktopIntegration,
}

impl AccessLevel {
    /// Returns the stable label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadPublic => "READ_PUBLIC",
            Self::ReadPrivate => "READ_PRIVATE",
            Self::WritePublic => "WRITE_PUBLIC",
            Self::WritePrivate => "WRITE_PRIVATE",
            Self::DesktopIntegration => "DESKTOP_INTEGRATION",
        }
    }
}

/// Reviewed access scope: a level, optionally limited to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    /// Granted level.
    pub level: AccessLevel,
    /// Optional target the grant is limited to.
    pub target: Option<String>,
}

/// Account status owned by the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Account may authenticate.
    Active,
    /// Account is suspended by an administrator.
    Suspended,
    /// Account was deactivated by its owner.
    Deactivated,
    /// Account has not been activated yet.
    NotActivated,
}

impl AccountStatus {
    /// Returns true when the account may authenticate.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Credential scheme that produced the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No credentials considered.
    Anonymous,
    /// Existing session token.
    Session,
    /// HTTP Basic credentials.
    Basic,
    /// Delegated access token.
    AccessToken,
}

// ============================================================================
// SECTION: Principal
// ============================================================================

/// Resolved identity and access scope for one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Caller identity.
    pub identity: Identity,
    /// Delegated scope, for access-token callers.
    pub access_scope: Option<AccessScope>,
    /// Credential scheme used.
    pub method: AuthMethod,
}

impl Principal {
    /// Builds the anonymous principal.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            identity: Identity::Anonymous,
            access_scope: None,
            method: AuthMethod::Anonymous,
        }
    }

    /// Builds an authenticated principal without delegated scope.
    #[must_use]
    pub fn user(user_id: impl Into<String>, method: AuthMethod) -> Self {
        Self {
            identity: Identity::User(user_id.into()),
            access_scope: None,
            method,
        }
    }

    /// Returns true for the anonymous identity.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self.identity, Identity::Anonymous)
    }

    /// Returns the user id recorded in the transaction audit field.
    #[must_use]
    pub fn audit_user(&self) -> &str {
        match &self.identity {
            Identity::Anonymous => "",
            Identity::User(user_id) => user_id,
        }
    }
}
