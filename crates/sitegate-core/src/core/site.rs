// crates/sitegate-core/src/core/site.rs
// ============================================================================
// Module: Site Definitions
// Description: Immutable virtual-host site definitions and host parsing.
// Purpose: Describe each logical site and normalize inbound host values.
// Dependencies: url, thiserror
// ============================================================================

//! ## Overview
//! A [`SiteDefinition`] names one logical endpoint: its canonical hostname,
//! alternate hostnames, root URL, TLS flag, and an optional restricted port.
//! Hostnames are compared ASCII case-insensitively with a single trailing dot
//! ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Site definition construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiteError {
    /// Site name is empty or contains whitespace.
    #[error("invalid site name: {0:?}")]
    InvalidName(String),
    /// Canonical hostname is empty or malformed.
    #[error("site {site} has an invalid hostname: {hostname:?}")]
    InvalidHostname {
        /// Site name.
        site: String,
        /// Offending hostname.
        hostname: String,
    },
    /// Root URL is not an absolute http(s) URL with a host.
    #[error("site {site} has an invalid root url: {reason}")]
    InvalidRootUrl {
        /// Site name.
        site: String,
        /// Failure reason.
        reason: String,
    },
    /// Restricted port is zero.
    #[error("site {0} declares port 0")]
    InvalidPort(String),
}

// ============================================================================
// SECTION: Site Definition
// ============================================================================

/// Immutable definition of one virtual-host site.
///
/// # Invariants
/// - `hostname` and every alternate hostname are normalized.
/// - `root_url` is an absolute http(s) URL with a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDefinition {
    /// Site name (e.g. `mainsite`, `api`).
    name: String,
    /// Canonical hostname.
    hostname: String,
    /// Alternate hostnames served by this site.
    alt_hostnames: BTreeSet<String>,
    /// Root URL used for canonical URL generation.
    root_url: Url,
    /// Whether generated URLs use TLS.
    use_https: bool,
    /// Optional dedicated port.
    restricted_port: Option<u16>,
}

impl SiteDefinition {
    /// Builds a site definition.
    ///
    /// When `root_url` is `None` the root URL is derived from the canonical
    /// hostname and the `use_https` flag.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] when any field is invalid.
    pub fn new<I, S>(
        name: &str,
        hostname: &str,
        alt_hostnames: I,
        root_url: Option<&str>,
        use_https: bool,
        restricted_port: Option<u16>,
    ) -> Result<Self, SiteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(SiteError::InvalidName(name.to_string()));
        }
        let canonical = normalize_hostname(hostname);
        if !is_valid_hostname(&canonical) {
            return Err(SiteError::InvalidHostname {
                site: name.to_string(),
                hostname: hostname.to_string(),
            });
        }
        let mut alternates = BTreeSet::new();
        for alt in alt_hostnames {
            let normalized = normalize_hostname(alt.as_ref());
            if normalized.is_empty() {
                continue;
            }
            if !is_valid_hostname(&normalized) {
                return Err(SiteError::InvalidHostname {
                    site: name.to_string(),
                    hostname: alt.as_ref().to_string(),
                });
            }
            if normalized != canonical {
                alternates.insert(normalized);
            }
        }
        if restricted_port == Some(0) {
            return Err(SiteError::InvalidPort(name.to_string()));
        }
        let scheme = if use_https { "https" } else { "http" };
        let raw_root = root_url.map_or_else(|| format!("{scheme}://{canonical}/"), str::to_string);
        let root_url = parse_root_url(name, &raw_root)?;
        Ok(Self {
            name: name.to_string(),
            hostname: canonical,
            alt_hostnames: alternates,
            root_url,
            use_https,
            restricted_port,
        })
    }

    /// Returns the site name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the canonical hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the alternate hostnames.
    #[must_use]
    pub const fn alt_hostnames(&self) -> &BTreeSet<String> {
        &self.alt_hostnames
    }

    /// Returns the root URL.
    #[must_use]
    pub const fn root_url(&self) -> &Url {
        &self.root_url
    }

    /// Returns whether the site is served over TLS.
    #[must_use]
    pub const fn use_https(&self) -> bool {
        self.use_https
    }

    /// Returns the restricted port, if any.
    #[must_use]
    pub const fn restricted_port(&self) -> Option<u16> {
        self.restricted_port
    }

    /// Returns every hostname this site answers to.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hostname.as_str()).chain(self.alt_hostnames.iter().map(String::as_str))
    }

    /// Returns true when the normalized hostname belongs to this site.
    #[must_use]
    pub fn matches_host(&self, hostname: &str) -> bool {
        self.hostname == hostname || self.alt_hostnames.contains(hostname)
    }
}

// ============================================================================
// SECTION: Host Header
// ============================================================================

/// Parsed `Host` header value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostHeader {
    /// Normalized hostname; empty when no host was supplied.
    pub hostname: String,
    /// Port suffix, when present and numeric.
    pub port: Option<u16>,
}

impl HostHeader {
    /// Parses a raw `Host` header value.
    ///
    /// Bracketed IPv6 literals are unwrapped. A non-numeric port suffix is
    /// dropped rather than rejected.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::default();
        };
        if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').unwrap_or((rest, ""));
            let port = tail.strip_prefix(':').and_then(|port| port.parse().ok());
            return Self {
                hostname: normalize_hostname(host),
                port,
            };
        }
        match raw.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => Self {
                hostname: normalize_hostname(host),
                port: port.parse().ok(),
            },
            _ => Self {
                hostname: normalize_hostname(raw),
                port: None,
            },
        }
    }

    /// Returns true when no hostname was supplied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.hostname.is_empty()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Normalizes a hostname for comparison.
#[must_use]
pub fn normalize_hostname(value: &str) -> String {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

/// Splits a space and/or comma separated alternate hostname list.
#[must_use]
pub fn parse_alt_hostnames(value: &str) -> Vec<String> {
    value
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns true for a plausible DNS name or IP literal.
fn is_valid_hostname(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 253
        && value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.' | ':' | '_'))
}

/// Parses and checks a root URL.
fn parse_root_url(site: &str, raw: &str) -> Result<Url, SiteError> {
    let url = Url::parse(raw).map_err(|err| SiteError::InvalidRootUrl {
        site: site.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SiteError::InvalidRootUrl {
            site: site.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(SiteError::InvalidRootUrl {
            site: site.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}
