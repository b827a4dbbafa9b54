//! Interview pairing batches.
//!
//! A batch snapshots the interview pool, drops one member at random if the
//! pool is odd, pairs the rest by common availability, and then writes the
//! pairing records and empties the matched members' pool entries in one
//! transaction. Everything before that transaction is side-effect free, so a
//! failed batch leaves the pool exactly as it was.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use engage_core::pairing::match_members_with;
use engage_core::{
    AvailabilityStore, BatchOutcome, BatchReport, Clock, Error, InterviewPairing, MemberId,
    PoolStore, Result, StableMatcher,
};

/// Chooses which member sits out of an odd pool.
pub trait ExclusionPicker: Send {
    /// Index in `0..len` of the member to exclude. `len` is at least 1.
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniform random picker.
pub struct RandomPicker<R = StdRng> {
    rng: R,
}

impl RandomPicker<StdRng> {
    /// Reproducible picker.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl<R: Rng + Send> ExclusionPicker for RandomPicker<R> {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len.max(1))
    }
}

/// Runs pairing batches. At most one batch runs at a time.
pub struct PairingCoordinator {
    pool: Arc<dyn PoolStore>,
    availability: Arc<dyn AvailabilityStore>,
    clock: Arc<dyn Clock>,
    picker: Mutex<Box<dyn ExclusionPicker>>,
    matcher: StableMatcher,
    batch_lock: tokio::sync::Mutex<()>,
}

impl PairingCoordinator {
    pub fn new(
        pool: Arc<dyn PoolStore>,
        availability: Arc<dyn AvailabilityStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            availability,
            clock,
            picker: Mutex::new(Box::new(RandomPicker::from_entropy())),
            matcher: StableMatcher::default(),
            batch_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the odd-pool exclusion picker.
    pub fn with_picker(mut self, picker: impl ExclusionPicker + 'static) -> Self {
        self.picker = Mutex::new(Box::new(picker));
        self
    }

    pub fn with_matcher(mut self, matcher: StableMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Pair the current pool and persist the result.
    pub async fn run_batch(&self) -> Result<BatchReport> {
        self.execute(false).await
    }

    /// Compute the pairing for the current pool without writing anything.
    pub async fn plan_batch(&self) -> Result<BatchReport> {
        self.execute(true).await
    }

    async fn execute(&self, dry_run: bool) -> Result<BatchReport> {
        let _batch_guard = self.batch_lock.lock().await;
        let start = Instant::now();

        let mut members = self.pool.snapshot().await?;
        members.sort();
        members.dedup();

        if members.len() < 2 {
            info!(
                subsystem = "pairing",
                component = "coordinator",
                op = "batch",
                pool_size = members.len(),
                dry_run,
                "Not enough members in pool, skipping batch"
            );
            return Ok(BatchReport::not_enough_members(dry_run));
        }

        let excluded = if members.len() % 2 == 1 {
            let index = self.pick_excluded(members.len());
            let member = members.remove(index);
            warn!(
                subsystem = "pairing",
                component = "coordinator",
                op = "exclude",
                member_id = %member,
                pool_size = members.len() + 1,
                "Odd pool, member sits out this batch"
            );
            Some(member)
        } else {
            None
        };

        let availability = self.availability.availability_for(&members).await?;
        debug!(
            subsystem = "pairing",
            component = "coordinator",
            members = members.len(),
            with_availability = availability.len(),
            "Loaded availability"
        );

        let result = match_members_with(&self.matcher, &members, |id| {
            availability.get(&id).copied()
        })?;

        let mut report = BatchReport {
            outcome: BatchOutcome::Paired,
            pairs: result.pairs,
            excluded,
            created: 0,
            dry_run,
        };

        if !dry_run {
            let effective_at = self.clock.now();
            let records: Vec<InterviewPairing> = report
                .pairs
                .iter()
                .flat_map(|p| InterviewPairing::symmetric(p.a, p.b, effective_at))
                .collect();
            self.persist(&records, &report.matched_members()).await?;
            report.created = records.len();
        }

        info!(
            subsystem = "pairing",
            component = "coordinator",
            op = "batch",
            pairs = report.pairs.len(),
            created = report.created,
            excluded = ?report.excluded,
            converged = result.converged,
            proposals = result.proposals,
            dry_run,
            duration_ms = start.elapsed().as_millis() as u64,
            "Pairing batch complete"
        );
        Ok(report)
    }

    async fn persist(&self, records: &[InterviewPairing], matched: &[MemberId]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(as_transaction_failure)?;
        tx.create_pairings(records)
            .await
            .map_err(as_transaction_failure)?;
        tx.remove_all(matched).await.map_err(as_transaction_failure)?;
        tx.commit().await.map_err(as_transaction_failure)
    }

    fn pick_excluded(&self, len: usize) -> usize {
        let mut picker = self.picker.lock().unwrap_or_else(|e| e.into_inner());
        picker.pick(len).min(len - 1)
    }
}

fn as_transaction_failure(e: Error) -> Error {
    match e {
        Error::Transaction(_) => e,
        other => Error::Transaction(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_picker_is_reproducible() {
        let mut a = RandomPicker::seeded(11);
        let mut b = RandomPicker::seeded(11);
        let first: Vec<usize> = (0..20).map(|_| a.pick(5)).collect();
        let second: Vec<usize> = (0..20).map(|_| b.pick(5)).collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|&i| i < 5));
    }

    #[test]
    fn test_random_picker_covers_every_index() {
        let mut picker = RandomPicker::seeded(3);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[picker.pick(3)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_transaction_errors_are_normalized() {
        let wrapped = as_transaction_failure(Error::Internal("boom".into()));
        assert!(matches!(wrapped, Error::Transaction(msg) if msg.contains("boom")));

        let kept = as_transaction_failure(Error::Transaction("rollback".into()));
        assert!(matches!(kept, Error::Transaction(msg) if msg == "rollback"));
    }
}
