// crates/sitegate-core/src/runtime/registry.rs
// ============================================================================
// Module: Virtual Host Registry
// Description: Immutable table of sites keyed by name and hostname.
// Purpose: Resolve hostnames to sites and reject conflicting configuration.
// Dependencies: crate::core::site, thiserror
// ============================================================================

//! ## Overview
//! The registry is loaded once at startup and never mutated. Duplicate site
//! names and hostnames claimed by two sites are startup failures; lookups are
//! pure reads and may be shared across workers without locking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::core::HostHeader;
use crate::core::SiteDefinition;
use crate::core::SiteError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry and dispatch-rule configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Invalid site definition.
    #[error(transparent)]
    Site(#[from] SiteError),
    /// No sites were configured.
    #[error("registry requires at least one site")]
    Empty,
    /// Two sites share a name.
    #[error("duplicate site name: {0}")]
    DuplicateSiteName(String),
    /// Two sites claim the same hostname.
    #[error("hostname {hostname} claimed by both {first} and {second}")]
    DuplicateHostname {
        /// Conflicting hostname.
        hostname: String,
        /// First site claiming it.
        first: String,
        /// Second site claiming it.
        second: String,
    },
    /// A rule references a site missing from the registry.
    #[error("dispatch rule references unregistered site {0}")]
    UnknownSite(String),
    /// Two rules could match the same site and port.
    #[error("dispatch rules {first} and {second} overlap")]
    OverlappingRules {
        /// First rule label.
        first: String,
        /// Second rule label.
        second: String,
    },
    /// A rule accepts no methods.
    #[error("dispatch rule for {0} accepts no methods")]
    NoMethods(String),
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Immutable virtual-host registry.
#[derive(Debug, Clone)]
pub struct VirtualHostRegistry {
    /// Sites in registration order.
    sites: Vec<Arc<SiteDefinition>>,
    /// Site index by name.
    by_name: BTreeMap<String, usize>,
    /// Site index by normalized hostname.
    by_host: BTreeMap<String, usize>,
}

impl VirtualHostRegistry {
    /// Builds a registry from site definitions.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on duplicate names or hostnames.
    pub fn new(sites: impl IntoIterator<Item = SiteDefinition>) -> Result<Self, RegistryError> {
        let mut registry = Self {
            sites: Vec::new(),
            by_name: BTreeMap::new(),
            by_host: BTreeMap::new(),
        };
        for site in sites {
            registry.insert(site)?;
        }
        if registry.sites.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(registry)
    }

    /// Inserts one site during construction.
    fn insert(&mut self, site: SiteDefinition) -> Result<(), RegistryError> {
        if self.by_name.contains_key(site.name()) {
            return Err(RegistryError::DuplicateSiteName(site.name().to_string()));
        }
        let index = self.sites.len();
        for hostname in site.hostnames() {
            if let Some(existing) = self.by_host.get(hostname) {
                return Err(RegistryError::DuplicateHostname {
                    hostname: hostname.to_string(),
                    first: self.sites[*existing].name().to_string(),
                    second: site.name().to_string(),
                });
            }
        }
        for hostname in site.hostnames() {
            self.by_host.insert(hostname.to_string(), index);
        }
        self.by_name.insert(site.name().to_string(), index);
        self.sites.push(Arc::new(site));
        Ok(())
    }

    /// Looks up the site serving a hostname (any port suffix is ignored).
    #[must_use]
    pub fn lookup(&self, hostname: &str) -> Option<&Arc<SiteDefinition>> {
        let parsed = HostHeader::parse(Some(hostname));
        self.by_host.get(&parsed.hostname).map(|index| &self.sites[*index])
    }

    /// Looks up a site by name.
    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<&Arc<SiteDefinition>> {
        self.by_name.get(name.trim()).map(|index| &self.sites[*index])
    }

    /// Returns the union of every site's hostnames.
    #[must_use]
    pub fn all_hostnames(&self) -> BTreeSet<String> {
        self.by_host.keys().cloned().collect()
    }

    /// Returns true when the host belongs to any registered site.
    #[must_use]
    pub fn is_official_host(&self, host: &str) -> bool {
        self.lookup(host).is_some()
    }

    /// Returns the sites in registration order.
    #[must_use]
    pub fn sites(&self) -> &[Arc<SiteDefinition>] {
        &self.sites
    }

    /// Returns true when the site instance is registered.
    #[must_use]
    pub fn contains(&self, site: &SiteDefinition) -> bool {
        self.lookup_by_name(site.name()).is_some_and(|registered| registered.as_ref() == site)
    }
}
