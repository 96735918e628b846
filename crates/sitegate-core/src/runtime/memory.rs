// crates/sitegate-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Collaborators
// Description: In-memory stores, transaction manager, and manual clock.
// Purpose: Back the standalone server and deterministic tests.
// Dependencies: crate::core, crate::interfaces, subtle, time
// ============================================================================

//! ## Overview
//! These implementations are built once from configuration and are safe to
//! share across workers. They are intended for the standalone binary and for
//! tests; embedders supply database-backed collaborators instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::core::AccountStatus;
use crate::interfaces::AccessToken;
use crate::interfaces::AccessTokenStore;
use crate::interfaces::Account;
use crate::interfaces::Clock;
use crate::interfaces::Consumer;
use crate::interfaces::ConsumerStore;
use crate::interfaces::CredentialStore;
use crate::interfaces::NonceStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;
use crate::interfaces::Transaction;
use crate::interfaces::TransactionError;
use crate::interfaces::TransactionManager;

// ============================================================================
// SECTION: Credential Stores
// ============================================================================

/// Session tokens mapped to user ids.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    /// Token to user id.
    sessions: BTreeMap<String, String>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session.
    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.sessions.insert(token.into(), user_id.into());
        self
    }
}

impl SessionStore for InMemorySessionStore {
    fn resolve_session(&self, token: &str) -> Result<Option<String>, StoreError> {
        Ok(self.sessions.get(token).cloned())
    }
}

/// Login/password pairs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    /// Login to (password, account).
    accounts: BTreeMap<String, (String, Account)>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account whose login is its user id.
    #[must_use]
    pub fn with_account(
        mut self,
        user_id: impl Into<String>,
        password: impl Into<String>,
        status: AccountStatus,
    ) -> Self {
        let user_id = user_id.into();
        let account = Account {
            user_id: user_id.clone(),
            status,
        };
        self.accounts.insert(user_id, (password.into(), account));
        self
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn verify_password(&self, login: &str, password: &str) -> Result<Option<Account>, StoreError> {
        let Some((expected, account)) = self.accounts.get(login) else {
            return Ok(None);
        };
        let matches = expected.len() == password.len()
            && bool::from(expected.as_bytes().ct_eq(password.as_bytes()));
        Ok(matches.then(|| account.clone()))
    }
}

/// Registered consumer keys.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConsumerStore {
    /// Consumer keys.
    keys: BTreeSet<String>,
}

impl InMemoryConsumerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer key.
    #[must_use]
    pub fn with_consumer(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }
}

impl ConsumerStore for InMemoryConsumerStore {
    fn lookup_consumer(&self, key: &str) -> Result<Option<Consumer>, StoreError> {
        Ok(self.keys.get(key).map(|key| Consumer {
            key: key.clone(),
        }))
    }
}

/// Access tokens keyed by (consumer, token key).
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccessTokenStore {
    /// Tokens.
    tokens: BTreeMap<(String, String), AccessToken>,
}

impl InMemoryAccessTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token.
    #[must_use]
    pub fn with_token(mut self, token: AccessToken) -> Self {
        self.tokens.insert((token.consumer_key.clone(), token.key.clone()), token);
        self
    }
}

impl AccessTokenStore for InMemoryAccessTokenStore {
    fn lookup_token(
        &self,
        consumer_key: &str,
        token_key: &str,
    ) -> Result<Option<AccessToken>, StoreError> {
        Ok(self.tokens.get(&(consumer_key.to_string(), token_key.to_string())).cloned())
    }
}

/// Nonce entry: (consumer, token, nonce).
type NonceEntry = (String, String, String);

/// Recorded nonces, pruned as their timestamps leave the accepted window.
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    /// Seen entries grouped by timestamp.
    seen: Mutex<BTreeMap<i64, BTreeSet<NonceEntry>>>,
}

impl InMemoryNonceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of retained nonces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().map_or(0, |seen| seen.values().map(BTreeSet::len).sum())
    }

    /// Returns true when no nonce is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NonceStore for InMemoryNonceStore {
    fn record_nonce(
        &self,
        consumer_key: &str,
        token_key: &str,
        timestamp: i64,
        nonce: &str,
        not_before: i64,
    ) -> Result<bool, StoreError> {
        let mut seen =
            self.seen.lock().map_err(|_| StoreError::Backend("nonce store poisoned".to_string()))?;
        let retained = seen.split_off(&not_before);
        *seen = retained;
        let entry = (consumer_key.to_string(), token_key.to_string(), nonce.to_string());
        Ok(seen.entry(timestamp).or_default().insert(entry))
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Writes and doom flag owned by one transaction.
#[derive(Debug, Default)]
struct TransactionState {
    /// Writes staged by this transaction.
    staged: BTreeMap<String, String>,
    /// Doom flag.
    doomed: bool,
}

/// Shared per-transaction state handle.
type SharedState = Arc<Mutex<TransactionState>>;

/// Shared state behind [`InMemoryTransactionManager`].
#[derive(Debug, Default)]
struct TransactionLedger {
    /// Durable writes.
    committed: BTreeMap<String, String>,
    /// Successful commits.
    commits: usize,
    /// Aborts.
    aborts: usize,
    /// Last audit user set on any transaction.
    last_user: Option<String>,
    /// State of the most recently begun transaction.
    current: Option<SharedState>,
    /// Failures returned by upcoming commits.
    commit_failures: VecDeque<TransactionError>,
    /// Failures returned by upcoming aborts.
    abort_failures: VecDeque<TransactionError>,
}

/// Key-value transaction manager with fault injection.
///
/// Every transaction owns its staged writes and doom flag; only a commit
/// touches the shared durable map. [`Self::stage_write`] and
/// [`Self::doom_current`] act on the most recently begun transaction for
/// views that have no handle of their own.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionManager {
    /// Shared ledger.
    ledger: Arc<Mutex<TransactionLedger>>,
}

impl InMemoryTransactionManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the ledger, recovering from poisoning.
    fn ledger(&self) -> MutexGuard<'_, TransactionLedger> {
        lock(&self.ledger)
    }

    /// Returns the most recently begun transaction's state.
    fn current(&self) -> Option<SharedState> {
        self.ledger().current.clone()
    }

    /// Stages a write in the most recently begun transaction.
    pub fn stage_write(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(state) = self.current() {
            lock(&state).staged.insert(key.into(), value.into());
        }
    }

    /// Dooms the most recently begun transaction.
    pub fn doom_current(&self) {
        if let Some(state) = self.current() {
            lock(&state).doomed = true;
        }
    }

    /// Makes the next commit fail with `error`.
    pub fn fail_next_commit(&self, error: TransactionError) {
        self.ledger().commit_failures.push_back(error);
    }

    /// Makes the next abort fail with `error`.
    pub fn fail_next_abort(&self, error: TransactionError) {
        self.ledger().abort_failures.push_back(error);
    }

    /// Returns the durable writes.
    #[must_use]
    pub fn committed(&self) -> BTreeMap<String, String> {
        self.ledger().committed.clone()
    }

    /// Returns the number of successful commits.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.ledger().commits
    }

    /// Returns the number of aborts.
    #[must_use]
    pub fn abort_count(&self) -> usize {
        self.ledger().aborts
    }

    /// Returns the last audit user.
    #[must_use]
    pub fn last_user(&self) -> Option<String> {
        self.ledger().last_user.clone()
    }
}

impl TransactionManager for InMemoryTransactionManager {
    fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError> {
        let state = SharedState::default();
        self.ledger().current = Some(Arc::clone(&state));
        Ok(Box::new(InMemoryTransaction {
            ledger: Arc::clone(&self.ledger),
            state,
            finished: false,
        }))
    }
}

/// Transaction handed out by [`InMemoryTransactionManager`].
#[derive(Debug)]
struct InMemoryTransaction {
    /// Shared ledger.
    ledger: Arc<Mutex<TransactionLedger>>,
    /// This transaction's writes and doom flag.
    state: SharedState,
    /// True once committed or aborted.
    finished: bool,
}

impl Transaction for InMemoryTransaction {
    fn abort(&mut self) -> Result<(), TransactionError> {
        if self.finished {
            return Ok(());
        }
        let mut ledger = lock(&self.ledger);
        if let Some(err) = ledger.abort_failures.pop_front() {
            return Err(err);
        }
        lock(&self.state).staged.clear();
        ledger.aborts += 1;
        self.finished = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        if self.finished {
            return Err(TransactionError::Failed("transaction already finished".to_string()));
        }
        let mut ledger = lock(&self.ledger);
        let mut state = lock(&self.state);
        if state.doomed {
            return Err(TransactionError::Failed("transaction is doomed".to_string()));
        }
        if let Some(err) = ledger.commit_failures.pop_front() {
            return Err(err);
        }
        let staged = std::mem::take(&mut state.staged);
        ledger.committed.extend(staged);
        ledger.commits += 1;
        self.finished = true;
        Ok(())
    }

    fn doom(&mut self) {
        lock(&self.state).doomed = true;
    }

    fn is_doomed(&self) -> bool {
        lock(&self.state).doomed
    }

    fn set_user(&mut self, user: &str) {
        lock(&self.ledger).last_user = Some(user.to_string());
    }
}

/// Locks a mutex, recovering the guard from poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ============================================================================
// SECTION: Manual Clock
// ============================================================================

/// Deterministic clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock {
    /// Current wall-clock time and monotonic offset.
    state: Mutex<(OffsetDateTime, Duration)>,
    /// Whether thread-CPU time is reported (mirrors the monotonic offset).
    thread_cpu: bool,
}

impl ManualClock {
    /// Creates a clock at `now` with a zero monotonic offset.
    #[must_use]
    pub const fn new(now: OffsetDateTime) -> Self {
        Self {
            state: Mutex::new((now, Duration::ZERO)),
            thread_cpu: false,
        }
    }

    /// Reports thread-CPU time equal to the monotonic offset.
    #[must_use]
    pub const fn with_thread_cpu(mut self) -> Self {
        self.thread_cpu = true;
        self
    }

    /// Advances wall-clock and monotonic time.
    pub fn advance(&self, by: Duration) {
        let mut state = lock(&self.state);
        state.0 += by;
        state.1 += by;
    }

    /// Reads the current state.
    fn read(&self) -> (OffsetDateTime, Duration) {
        *lock(&self.state)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        self.read().0
    }

    fn monotonic(&self) -> Duration {
        self.read().1
    }

    fn thread_cpu_time(&self) -> Option<Duration> {
        self.thread_cpu.then(|| self.read().1)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for transaction isolation and nonce retention.
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    #[test]
    fn transactions_keep_their_own_doom_and_writes() {
        let manager = InMemoryTransactionManager::new();
        let mut first = manager.begin().unwrap();
        first.doom();
        let mut second = manager.begin().unwrap();
        manager.stage_write("bug", "1");
        assert!(first.is_doomed());
        assert!(!second.is_doomed());
        first.abort().unwrap();
        second.commit().unwrap();
        assert_eq!(manager.committed().get("bug").map(String::as_str), Some("1"));
        assert_eq!(manager.abort_count(), 1);
        assert_eq!(manager.commit_count(), 1);
    }

    #[test]
    fn aborted_writes_stay_out_of_committed_state() {
        let manager = InMemoryTransactionManager::new();
        let mut writer = manager.begin().unwrap();
        manager.stage_write("karma", "10");
        let mut other = manager.begin().unwrap();
        writer.abort().unwrap();
        other.commit().unwrap();
        assert!(manager.committed().is_empty());
    }

    #[test]
    fn injected_abort_failure_is_returned_once() {
        let manager = InMemoryTransactionManager::new();
        manager.fail_next_abort(TransactionError::Failed("disk".to_string()));
        let mut transaction = manager.begin().unwrap();
        assert_eq!(transaction.abort(), Err(TransactionError::Failed("disk".to_string())));
        assert!(transaction.abort().is_ok());
        assert_eq!(manager.abort_count(), 1);
    }

    #[test]
    fn nonces_outside_the_window_are_pruned() {
        let store = InMemoryNonceStore::new();
        assert!(store.record_nonce("c", "t", 100, "a", 0).unwrap());
        assert!(store.record_nonce("c", "t", 200, "b", 0).unwrap());
        assert!(!store.record_nonce("c", "t", 100, "a", 0).unwrap());
        assert_eq!(store.len(), 2);
        assert!(store.record_nonce("c", "t", 300, "c", 150).unwrap());
        assert_eq!(store.len(), 2);
        assert!(store.record_nonce("c", "t", 400, "d", 301).unwrap());
        assert_eq!(store.len(), 1);
    }
}
