// crates/sitegate-config/src/build.rs
// ============================================================================
// Module: Runtime Construction
// Description: Builds the registry, dispatch rules, and credential stores.
// Purpose: Turn validated configuration into immutable runtime components.
// Dependencies: sitegate-core
// ============================================================================

//! ## Overview
//! Everything built here is immutable after startup and shared read-only
//! across workers. Registry and rule errors surface as
//! [`ConfigError::Invalid`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sitegate_core::AccessScope;
use sitegate_core::AccessToken;
use sitegate_core::Account;
use sitegate_core::CredentialSettings;
use sitegate_core::CredentialStores;
use sitegate_core::DispatchRule;
use sitegate_core::InMemoryAccessTokenStore;
use sitegate_core::InMemoryConsumerStore;
use sitegate_core::InMemoryCredentialStore;
use sitegate_core::InMemoryNonceStore;
use sitegate_core::InMemorySessionStore;
use sitegate_core::RequestClassifier;
use sitegate_core::SiteDefinition;
use sitegate_core::VirtualHostRegistry;
use sitegate_core::parse_alt_hostnames;

use crate::config::ConfigError;
use crate::config::SitegateConfig;

// ============================================================================
// SECTION: Virtual Hosts
// ============================================================================

impl SitegateConfig {
    /// Builds the site definitions in configuration order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a site definition is invalid.
    pub fn site_definitions(&self) -> Result<Vec<SiteDefinition>, ConfigError> {
        self.vhosts
            .sites
            .iter()
            .map(|site| {
                let alternates = site.althostnames.as_deref().map(parse_alt_hostnames).unwrap_or_default();
                SiteDefinition::new(
                    &site.name,
                    &site.hostname,
                    alternates,
                    site.rooturl.as_deref(),
                    self.vhosts.use_https,
                    site.private_port,
                )
                .map_err(|err| ConfigError::Invalid(err.to_string()))
            })
            .collect()
    }

    /// Builds the virtual-host registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when sites are invalid or claim the same host.
    pub fn registry(&self) -> Result<Arc<VirtualHostRegistry>, ConfigError> {
        VirtualHostRegistry::new(self.site_definitions()?)
            .map(Arc::new)
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Builds one dispatch rule per configured site.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a site is missing from the registry.
    pub fn dispatch_rules(&self, registry: &VirtualHostRegistry) -> Result<Vec<DispatchRule>, ConfigError> {
        self.vhosts
            .sites
            .iter()
            .map(|site| {
                let definition = registry.lookup_by_name(site.name.trim()).ok_or_else(|| {
                    ConfigError::Invalid(format!("site {} missing from registry", site.name))
                })?;
                let mut rule = DispatchRule::for_site(Arc::clone(definition), site.kind)
                    .with_max_retries(site.max_retries.unwrap_or(self.server.max_retries));
                if let Some(methods) = &site.methods {
                    rule = rule.with_methods(methods);
                }
                if let Some(content_types) = &site.content_types {
                    rule = rule.with_content_types(Some(content_types));
                }
                if site.handles_unmatched_host {
                    rule = rule.handling_unmatched_host();
                }
                Ok(rule)
            })
            .collect()
    }

    /// Builds the request classifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the registry or rule set is invalid.
    pub fn classifier(&self) -> Result<RequestClassifier, ConfigError> {
        let registry = self.registry()?;
        let rules = self.dispatch_rules(&registry)?;
        RequestClassifier::new(registry, rules).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Returns every listener address: the main bind plus each private port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bind address is invalid.
    pub fn listener_addrs(&self) -> Result<BTreeSet<SocketAddr>, ConfigError> {
        let main = self.server.bind_addr()?;
        let mut addrs = BTreeSet::from([main]);
        for port in self.vhosts.sites.iter().filter_map(|site| site.private_port) {
            addrs.insert(SocketAddr::new(main.ip(), port));
        }
        Ok(addrs)
    }
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

impl SitegateConfig {
    /// Returns the credential resolver settings.
    #[must_use]
    pub fn credential_settings(&self) -> CredentialSettings {
        CredentialSettings {
            session_cookie: self.server.session_cookie.clone(),
            timestamp_skew: Duration::from_secs(self.auth.timestamp_skew_secs),
        }
    }

    /// Builds in-memory credential stores seeded from `[auth]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a token references unknown seed data.
    pub fn credential_stores(&self) -> Result<CredentialStores, ConfigError> {
        let auth = &self.auth;
        let accounts: BTreeMap<&str, Account> = auth
            .accounts
            .iter()
            .map(|account| {
                (account.user_id.as_str(), Account {
                    user_id: account.user_id.clone(),
                    status: account.status,
                })
            })
            .collect();

        let sessions = auth
            .sessions
            .iter()
            .fold(InMemorySessionStore::new(), |store, session| {
                store.with_session(&session.token, &session.user_id)
            });
        let credentials = auth.accounts.iter().fold(InMemoryCredentialStore::new(), |store, account| {
            store.with_account(&account.user_id, &account.password, account.status)
        });
        let consumers = auth
            .consumers
            .iter()
            .fold(InMemoryConsumerStore::new(), |store, consumer| store.with_consumer(&consumer.key));
        let mut tokens = InMemoryAccessTokenStore::new();
        for token in &auth.tokens {
            let owner = accounts.get(token.owner.as_str()).cloned().ok_or_else(|| {
                ConfigError::Invalid(format!("auth.tokens[{}] references unknown owner {}", token.key, token.owner))
            })?;
            tokens = tokens.with_token(AccessToken {
                key: token.key.clone(),
                secret: token.secret.clone(),
                consumer_key: token.consumer.clone(),
                date_expires: token.expires_at()?,
                reviewed_scope: AccessScope {
                    level: token.level,
                    target: token.target.clone(),
                },
                owner,
            });
        }
        Ok(CredentialStores {
            sessions: Arc::new(sessions),
            credentials: Arc::new(credentials),
            consumers: Arc::new(consumers),
            tokens: Arc::new(tokens),
            nonces: Arc::new(InMemoryNonceStore::new()),
        })
    }
}
