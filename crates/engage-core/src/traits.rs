//! Collaborator traits consumed by the message buffer and the pairing
//! coordinator.
//!
//! The PostgreSQL implementations live in `engage-db`; in-memory versions in
//! [`crate::memory`] back the tests. Writes happen through transaction
//! objects obtained from `begin()`: nothing is visible until `commit()`, and a
//! transaction dropped without committing is rolled back.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::availability::AvailabilityMatrix;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// MESSAGE COUNTERS
// =============================================================================

/// Durable `(member, channel) → count` storage.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Open a transaction for one flush.
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>>;

    /// Current count for one row, if it exists.
    async fn count(&self, key: CounterKey) -> Result<Option<u64>>;
}

/// Writes of a single flush, applied atomically on commit.
#[async_trait]
pub trait CounterTransaction: Send {
    /// Insert missing rows with count 0. Existing rows are untouched.
    async fn upsert_zero(&mut self, keys: &[CounterKey]) -> Result<()>;

    /// Add each delta to its row's count, computed by the store itself.
    async fn increment(&mut self, deltas: &HashMap<CounterKey, u64>) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Bulk, read-only external id → member mapping.
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Resolve the given ids. Ids without a member are omitted, not errors.
    async fn resolve(&self, ids: &[ExternalUserId]) -> Result<HashMap<ExternalUserId, MemberId>>;
}

// =============================================================================
// INTERVIEW PAIRING
// =============================================================================

/// The interview pool and the pairing records it feeds.
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Members currently in the pool, in no particular order.
    async fn snapshot(&self) -> Result<Vec<MemberId>>;

    /// Open a transaction for one pairing batch.
    async fn begin(&self) -> Result<Box<dyn PoolTransaction>>;
}

/// Writes of a single pairing batch, applied atomically on commit.
#[async_trait]
pub trait PoolTransaction: Send {
    async fn create_pairings(&mut self, records: &[InterviewPairing]) -> Result<()>;

    /// Remove the given members from the pool.
    async fn remove_all(&mut self, ids: &[MemberId]) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Weekly availability per member.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Availability of the given members. Members who never set one are
    /// omitted; callers treat them as never available.
    async fn availability_for(
        &self,
        ids: &[MemberId],
    ) -> Result<HashMap<MemberId, AvailabilityMatrix>>;
}
