//! In-memory implementations of the collaborator traits.
//!
//! Used by unit and integration tests across the workspace. Each store can
//! be told to fail its next operations so error paths are testable without
//! a database.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::availability::AvailabilityMatrix;
use crate::error::{Error, Result};
use crate::models::{CounterKey, ExternalUserId, InterviewPairing, MemberId};
use crate::traits::*;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Decrement `counter` if positive and report whether a failure is due.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// =============================================================================
// MESSAGE COUNTERS
// =============================================================================

#[derive(Debug, Default)]
struct CounterShared {
    rows: Mutex<HashMap<CounterKey, u64>>,
    fail_begins: AtomicUsize,
    fail_commits: AtomicUsize,
    commits: AtomicUsize,
    commit_delay: Mutex<Option<Duration>>,
}

/// Counter store backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    shared: Arc<CounterShared>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `begin()` fail.
    pub fn fail_next_begins(&self, n: usize) {
        self.shared.fail_begins.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail, discarding their writes.
    pub fn fail_next_commits(&self, n: usize) {
        self.shared.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Sleep this long inside every commit, before applying it.
    pub fn set_commit_delay(&self, delay: Option<Duration>) {
        *lock(&self.shared.commit_delay) = delay;
    }

    /// Successful commits so far.
    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    /// Count for one row, 0 if the row does not exist.
    pub fn get(&self, member_id: i64, channel_id: u64) -> u64 {
        let key = CounterKey::new(MemberId(member_id), crate::models::ChannelId(channel_id));
        lock(&self.shared.rows).get(&key).copied().unwrap_or(0)
    }

    /// Copy of every row.
    pub fn rows(&self) -> HashMap<CounterKey, u64> {
        lock(&self.shared.rows).clone()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>> {
        if take_failure(&self.shared.fail_begins) {
            return Err(Error::Transaction("injected begin failure".to_string()));
        }
        Ok(Box::new(InMemoryCounterTransaction {
            shared: Arc::clone(&self.shared),
            upserts: Vec::new(),
            increments: Vec::new(),
        }))
    }

    async fn count(&self, key: CounterKey) -> Result<Option<u64>> {
        Ok(lock(&self.shared.rows).get(&key).copied())
    }
}

struct InMemoryCounterTransaction {
    shared: Arc<CounterShared>,
    upserts: Vec<CounterKey>,
    increments: Vec<(CounterKey, u64)>,
}

#[async_trait]
impl CounterTransaction for InMemoryCounterTransaction {
    async fn upsert_zero(&mut self, keys: &[CounterKey]) -> Result<()> {
        self.upserts.extend_from_slice(keys);
        Ok(())
    }

    async fn increment(&mut self, deltas: &HashMap<CounterKey, u64>) -> Result<()> {
        self.increments
            .extend(deltas.iter().map(|(key, delta)| (*key, *delta)));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let delay = *lock(&self.shared.commit_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if take_failure(&self.shared.fail_commits) {
            return Err(Error::Transaction("injected commit failure".to_string()));
        }

        let mut rows = lock(&self.shared.rows);
        for key in &self.upserts {
            rows.entry(*key).or_insert(0);
        }
        // Like an UPDATE, an increment only touches rows that exist.
        for (key, delta) in &self.increments {
            if let Some(count) = rows.get_mut(key) {
                *count += delta;
            }
        }
        drop(rows);
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// USER LOOKUP
// =============================================================================

/// Fixed external id → member mapping.
#[derive(Debug, Clone, Default)]
pub struct StaticUserLookup {
    mapping: Arc<Mutex<HashMap<ExternalUserId, MemberId>>>,
    fail_next: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl StaticUserLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(self, external_id: u64, member_id: i64) -> Self {
        self.insert(external_id, member_id);
        self
    }

    pub fn insert(&self, external_id: u64, member_id: i64) {
        lock(&self.mapping).insert(ExternalUserId(external_id), MemberId(member_id));
    }

    /// Make the next `n` lookups fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Lookups performed, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserLookup for StaticUserLookup {
    async fn resolve(&self, ids: &[ExternalUserId]) -> Result<HashMap<ExternalUserId, MemberId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_next) {
            return Err(Error::Internal("injected lookup failure".to_string()));
        }
        let mapping = lock(&self.mapping);
        Ok(ids
            .iter()
            .filter_map(|id| mapping.get(id).map(|member| (*id, *member)))
            .collect())
    }
}

// =============================================================================
// INTERVIEW POOL
// =============================================================================

#[derive(Debug, Default)]
struct PoolShared {
    pool: Mutex<BTreeSet<MemberId>>,
    pairings: Mutex<Vec<InterviewPairing>>,
    fail_commits: AtomicUsize,
}

/// Interview pool and pairing records held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPoolStore {
    shared: Arc<PoolShared>,
}

impl InMemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given members in the pool.
    pub fn with_members<I: IntoIterator<Item = i64>>(members: I) -> Self {
        let store = Self::default();
        for id in members {
            store.add(MemberId(id));
        }
        store
    }

    pub fn add(&self, member_id: MemberId) {
        lock(&self.shared.pool).insert(member_id);
    }

    /// Pool contents, ascending.
    pub fn members(&self) -> Vec<MemberId> {
        lock(&self.shared.pool).iter().copied().collect()
    }

    /// Every pairing record committed so far.
    pub fn pairings(&self) -> Vec<InterviewPairing> {
        lock(&self.shared.pairings).clone()
    }

    /// Make the next `n` commits fail, discarding their writes.
    pub fn fail_next_commits(&self, n: usize) {
        self.shared.fail_commits.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl PoolStore for InMemoryPoolStore {
    async fn snapshot(&self) -> Result<Vec<MemberId>> {
        Ok(self.members())
    }

    async fn begin(&self) -> Result<Box<dyn PoolTransaction>> {
        Ok(Box::new(InMemoryPoolTransaction {
            shared: Arc::clone(&self.shared),
            created: Vec::new(),
            removed: Vec::new(),
        }))
    }
}

struct InMemoryPoolTransaction {
    shared: Arc<PoolShared>,
    created: Vec<InterviewPairing>,
    removed: Vec<MemberId>,
}

#[async_trait]
impl PoolTransaction for InMemoryPoolTransaction {
    async fn create_pairings(&mut self, records: &[InterviewPairing]) -> Result<()> {
        self.created.extend_from_slice(records);
        Ok(())
    }

    async fn remove_all(&mut self, ids: &[MemberId]) -> Result<()> {
        self.removed.extend_from_slice(ids);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if take_failure(&self.shared.fail_commits) {
            return Err(Error::Transaction("injected commit failure".to_string()));
        }
        let this = *self;
        lock(&this.shared.pairings).extend(this.created);
        let mut pool = lock(&this.shared.pool);
        for id in &this.removed {
            pool.remove(id);
        }
        Ok(())
    }
}

// =============================================================================
// AVAILABILITY
// =============================================================================

/// Availability per member held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAvailabilityStore {
    matrices: Arc<Mutex<HashMap<MemberId, AvailabilityMatrix>>>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, member_id: MemberId, matrix: AvailabilityMatrix) {
        lock(&self.matrices).insert(member_id, matrix);
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn availability_for(
        &self,
        ids: &[MemberId],
    ) -> Result<HashMap<MemberId, AvailabilityMatrix>> {
        let matrices = lock(&self.matrices);
        Ok(ids
            .iter()
            .filter_map(|id| matrices.get(id).map(|m| (*id, *m)))
            .collect())
    }
}
