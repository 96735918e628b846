// crates/sitegate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared site fixtures, collaborators, and harness builders.
// Purpose: Provide reusable builders for sitegate-core integration tests.
// Dependencies: sitegate-core, time
// ============================================================================

//! ## Overview
//! Builds the five-site Launchpad-style fixture (browser, web service, feeds,
//! public and private XML-RPC), a credential resolver seeded with accounts and
//! tokens, and a publisher harness with a recording log sink.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]
#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use sitegate_core::AccessLevel;
use sitegate_core::AccessScope;
use sitegate_core::AccessToken;
use sitegate_core::Account;
use sitegate_core::AccountStatus;
use sitegate_core::Clock;
use sitegate_core::CredentialResolver;
use sitegate_core::CredentialSettings;
use sitegate_core::CredentialStores;
use sitegate_core::DispatchRule;
use sitegate_core::InMemoryAccessTokenStore;
use sitegate_core::InMemoryConsumerStore;
use sitegate_core::InMemoryCredentialStore;
use sitegate_core::InMemoryNonceStore;
use sitegate_core::InMemorySessionStore;
use sitegate_core::InMemoryTransactionManager;
use sitegate_core::ManualClock;
use sitegate_core::PublicationKind;
use sitegate_core::PublicationLogEvent;
use sitegate_core::PublicationLogSink;
use sitegate_core::PublicationRequest;
use sitegate_core::PublicationResponse;
use sitegate_core::Publisher;
use sitegate_core::RequestClassifier;
use sitegate_core::SiteDefinition;
use sitegate_core::Traverser;
use sitegate_core::View;
use sitegate_core::ViewError;
use sitegate_core::ViewIdentity;
use sitegate_core::ViewInvoker;
use sitegate_core::VirtualHostRegistry;
use time::OffsetDateTime;
use time::macros::datetime;

// ============================================================================
// SECTION: Constants
// ============================================================================

pub const MAIN_HOST: &str = "launchpad.test";
pub const API_HOST: &str = "api.launchpad.test";
pub const FEEDS_HOST: &str = "feeds.launchpad.test";
pub const XMLRPC_HOST: &str = "xmlrpc.launchpad.test";
pub const PRIVATE_XMLRPC_HOST: &str = "xmlrpc-private.launchpad.test";
pub const PRIVATE_PORT: u16 = 8087;

pub const CONSUMER_KEY: &str = "foobar123451432";
pub const TOKEN_KEY: &str = "salgado-read-nonprivate";
pub const TOKEN_SECRET: &str = "secret";
pub const EXPIRED_TOKEN_KEY: &str = "salgado-expired";
pub const SUSPENDED_TOKEN_KEY: &str = "suspended-owner";
pub const WRITE_TOKEN_KEY: &str = "name12-write-public";
pub const SESSION_TOKEN: &str = "session-abc";

/// Fixed start time for deterministic clocks.
pub const START: OffsetDateTime = datetime!(2026-06-01 12:00 UTC);

// ============================================================================
// SECTION: Sites and Rules
// ============================================================================

pub fn site(name: &str, hostname: &str, alts: &[&str], port: Option<u16>) -> SiteDefinition {
    SiteDefinition::new(name, hostname, alts.iter().copied(), None, false, port).unwrap()
}

pub fn registry() -> Arc<VirtualHostRegistry> {
    Arc::new(
        VirtualHostRegistry::new([
            site("mainsite", MAIN_HOST, &["localhost", "www.launchpad.test"], None),
            site("api", API_HOST, &[], None),
            site("feeds", FEEDS_HOST, &[], None),
            site("xmlrpc", XMLRPC_HOST, &[], None),
            site("xmlrpc_private", PRIVATE_XMLRPC_HOST, &[], Some(PRIVATE_PORT)),
        ])
        .unwrap(),
    )
}

pub fn rules(registry: &VirtualHostRegistry) -> Vec<DispatchRule> {
    let lookup = |name: &str| Arc::clone(registry.lookup_by_name(name).unwrap());
    vec![
        DispatchRule::for_site(lookup("mainsite"), PublicationKind::Browser).handling_unmatched_host(),
        DispatchRule::for_site(lookup("api"), PublicationKind::WebService),
        DispatchRule::for_site(lookup("feeds"), PublicationKind::Feeds),
        DispatchRule::for_site(lookup("xmlrpc"), PublicationKind::PublicXmlRpc),
        DispatchRule::for_site(lookup("xmlrpc_private"), PublicationKind::PrivateXmlRpc),
    ]
}

pub fn classifier() -> Arc<RequestClassifier> {
    let registry = registry();
    let rules = rules(&registry);
    Arc::new(RequestClassifier::new(registry, rules).unwrap())
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

pub fn account(user_id: &str, status: AccountStatus) -> Account {
    Account {
        user_id: user_id.to_string(),
        status,
    }
}

pub fn token(key: &str, owner: Account, level: AccessLevel, target: Option<&str>) -> AccessToken {
    AccessToken {
        key: key.to_string(),
        secret: TOKEN_SECRET.to_string(),
        consumer_key: CONSUMER_KEY.to_string(),
        date_expires: None,
        reviewed_scope: AccessScope {
            level,
            target: target.map(str::to_string),
        },
        owner,
    }
}

pub fn stores() -> CredentialStores {
    let salgado = account("salgado", AccountStatus::Active);
    let mut expired = token(EXPIRED_TOKEN_KEY, salgado.clone(), AccessLevel::ReadPublic, None);
    expired.date_expires = Some(START - Duration::from_secs(60));
    CredentialStores {
        sessions: Arc::new(InMemorySessionStore::new().with_session(SESSION_TOKEN, "mark")),
        credentials: Arc::new(
            InMemoryCredentialStore::new()
                .with_account("mark", "test", AccountStatus::Active)
                .with_account("gone", "test", AccountStatus::Suspended),
        ),
        consumers: Arc::new(InMemoryConsumerStore::new().with_consumer(CONSUMER_KEY)),
        tokens: Arc::new(
            InMemoryAccessTokenStore::new()
                .with_token(token(TOKEN_KEY, salgado.clone(), AccessLevel::ReadPublic, None))
                .with_token(token(
                    WRITE_TOKEN_KEY,
                    account("name12", AccountStatus::Active),
                    AccessLevel::WritePublic,
                    Some("firefox"),
                ))
                .with_token(expired)
                .with_token(token(
                    SUSPENDED_TOKEN_KEY,
                    account("gone", AccountStatus::Suspended),
                    AccessLevel::ReadPublic,
                    None,
                )),
        ),
        nonces: Arc::new(InMemoryNonceStore::new()),
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(START))
}

pub fn resolver(clock: Arc<ManualClock>) -> Arc<CredentialResolver> {
    Arc::new(CredentialResolver::new(stores(), clock, CredentialSettings::default()))
}

/// Builds an `Authorization: OAuth` header value for a token key.
pub fn oauth_header(token_key: &str, signature: &str, nonce: &str) -> String {
    format!(
        "OAuth realm=\"https://api.launchpad.test/\", oauth_consumer_key=\"{CONSUMER_KEY}\", \
         oauth_token=\"{token_key}\", oauth_signature_method=\"PLAINTEXT\", \
         oauth_signature=\"{}\", oauth_timestamp=\"{}\", oauth_nonce=\"{nonce}\"",
        signature.replace('&', "%26"),
        START.unix_timestamp()
    )
}

// ============================================================================
// SECTION: Views and Traversal
// ============================================================================

/// View behavior scripted per attempt.
#[derive(Clone)]
pub enum Step {
    /// Render a body, optionally staging a write.
    Render {
        /// Response body.
        body: &'static str,
        /// Write staged in the transaction.
        write: Option<(&'static str, &'static str)>,
    },
    /// Fail with an error.
    Fail(ViewError),
    /// Doom the transaction, then render.
    Doom,
}

/// Scripted view sharing the transaction manager and clock.
pub struct ScriptedView {
    pub steps: Mutex<Vec<Step>>,
    pub transactions: InMemoryTransactionManager,
    pub clock: Arc<ManualClock>,
    pub calls: Mutex<usize>,
}

impl View for ScriptedView {
    fn render(&self, _request: &PublicationRequest) -> Result<PublicationResponse, ViewError> {
        *self.calls.lock().unwrap() += 1;
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 { steps.remove(0) } else { steps[0].clone() }
        };
        self.clock.advance(Duration::from_millis(5));
        match step {
            Step::Render {
                body,
                write,
            } => {
                if let Some((key, value)) = write {
                    self.transactions.stage_write(key, value);
                }
                Ok(PublicationResponse::new(200, body).with_header("X-Resource", "person"))
            }
            Step::Fail(err) => Err(err),
            Step::Doom => {
                self.transactions.stage_write("doomed", "write");
                self.transactions.doom_current();
                Ok(PublicationResponse::new(200, "doomed"))
            }
        }
    }
}

/// Traverser handing out the scripted view, or failing for `/missing`.
pub struct ScriptedTraverser {
    pub view: Arc<ScriptedView>,
    pub clock: Arc<ManualClock>,
}

impl Traverser for ScriptedTraverser {
    fn traverse(&self, request: &PublicationRequest) -> Result<ViewInvoker, ViewError> {
        self.clock.advance(Duration::from_millis(3));
        if request.metadata().path == "/missing" {
            return Err(ViewError::NotFound("/missing".to_string()));
        }
        Ok(ViewInvoker::standard(
            ViewIdentity::new("Person", "PersonIndexView"),
            Arc::clone(&self.view) as Arc<dyn View>,
        ))
    }
}

// ============================================================================
// SECTION: Log Sink
// ============================================================================

/// Log sink retaining every event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<PublicationLogEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PublicationLogEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl PublicationLogSink for RecordingSink {
    fn record(&self, event: &PublicationLogEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

pub struct Harness {
    pub publisher: Publisher,
    pub transactions: InMemoryTransactionManager,
    pub view: Arc<ScriptedView>,
    pub clock: Arc<ManualClock>,
    pub log: Arc<RecordingSink>,
}

pub fn harness(steps: Vec<Step>) -> Harness {
    let clock = clock();
    let transactions = InMemoryTransactionManager::new();
    let view = Arc::new(ScriptedView {
        steps: Mutex::new(steps),
        transactions: transactions.clone(),
        clock: Arc::clone(&clock),
        calls: Mutex::new(0),
    });
    let traverser = Arc::new(ScriptedTraverser {
        view: Arc::clone(&view),
        clock: Arc::clone(&clock),
    });
    let log = Arc::new(RecordingSink::default());
    let publisher = Publisher::new(
        classifier(),
        resolver(Arc::clone(&clock)),
        traverser,
        Arc::new(transactions.clone()),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&log) as Arc<dyn PublicationLogSink>,
    );
    Harness {
        publisher,
        transactions,
        view,
        clock,
        log,
    }
}

pub fn render(body: &'static str) -> Step {
    Step::Render {
        body,
        write: None,
    }
}

pub fn render_writing(body: &'static str, key: &'static str, value: &'static str) -> Step {
    Step::Render {
        body,
        write: Some((key, value)),
    }
}
