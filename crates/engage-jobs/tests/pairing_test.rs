//! Pairing coordinator behavior against the in-memory stores.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use engage_jobs::{
    AvailabilityMatrix, BatchOutcome, Clock, Error, ExclusionPicker, InMemoryAvailabilityStore,
    InMemoryPoolStore, InterviewStatus, ManualClock, MemberId, PairingCoordinator, RandomPicker,
};

// ============================================================================
// HELPERS
// ============================================================================

/// Always excludes the last member of the sorted pool.
struct LastPicker;

impl ExclusionPicker for LastPicker {
    fn pick(&mut self, len: usize) -> usize {
        len - 1
    }
}

/// Matrix with slots `range` set, counting across days.
fn slots(range: std::ops::Range<usize>) -> AvailabilityMatrix {
    let mut matrix = AvailabilityMatrix::empty();
    for index in range {
        matrix.set(index / 48, index % 48).unwrap();
    }
    matrix
}

struct Harness {
    pool: InMemoryPoolStore,
    availability: InMemoryAvailabilityStore,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(members: impl IntoIterator<Item = i64>) -> Self {
        Self {
            pool: InMemoryPoolStore::with_members(members),
            availability: InMemoryAvailabilityStore::new(),
            clock: Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2026, 10, 5, 9, 0, 0).unwrap(),
            )),
        }
    }

    fn coordinator(&self) -> PairingCoordinator {
        PairingCoordinator::new(
            Arc::new(self.pool.clone()),
            Arc::new(self.availability.clone()),
            self.clock.clone(),
        )
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_odd_pool_excludes_one_and_pairs_best_overlap() {
    let (a, b, c) = (MemberId(1), MemberId(2), MemberId(3));
    let h = Harness::new([1, 2, 3]);
    h.availability.set(a, slots(0..210));
    h.availability.set(b, slots(0..200));
    h.availability.set(c, slots(160..210));

    let report = h
        .coordinator()
        .with_picker(LastPicker)
        .run_batch()
        .await
        .unwrap();

    assert_eq!(report.outcome, BatchOutcome::Paired);
    assert_eq!(report.excluded, Some(c));
    assert_eq!(report.pairs.len(), 1);
    assert_eq!((report.pairs[0].a, report.pairs[0].b), (a, b));
    assert_eq!(report.pairs[0].common_slots, 200);
    assert_eq!(report.created, 2);
    assert_eq!(h.pool.members(), vec![c]);

    let records = h.pool.pairings();
    assert_eq!(records.len(), 2);
    let directed: HashSet<(MemberId, MemberId)> = records
        .iter()
        .map(|r| (r.interviewer_id, r.interviewee_id))
        .collect();
    assert_eq!(directed, HashSet::from([(a, b), (b, a)]));
    assert!(records.iter().all(|r| r.status == InterviewStatus::Pending));
    assert!(records.iter().all(|r| r.effective_at == h.clock.now()));
}

#[tokio::test]
async fn test_four_members_pair_by_overlap() {
    let h = Harness::new([10, 20, 30, 40]);
    h.availability.set(MemberId(10), slots(0..100));
    h.availability.set(MemberId(20), slots(200..300));
    h.availability.set(MemberId(30), slots(0..90));
    h.availability.set(MemberId(40), slots(210..300));

    let report = h.coordinator().run_batch().await.unwrap();

    assert_eq!(report.excluded, None);
    let pairs: Vec<(MemberId, MemberId)> = report.pairs.iter().map(|p| (p.a, p.b)).collect();
    assert_eq!(
        pairs,
        vec![(MemberId(10), MemberId(30)), (MemberId(20), MemberId(40))]
    );
    assert_eq!(report.created, 4);
    assert!(h.pool.members().is_empty());
}

#[tokio::test]
async fn test_empty_pool_is_noop() {
    let h = Harness::new(Vec::new());
    let report = h.coordinator().run_batch().await.unwrap();

    assert_eq!(report.outcome, BatchOutcome::NotEnoughMembers);
    assert_eq!(report.created, 0);
    assert!(h.pool.pairings().is_empty());
}

#[tokio::test]
async fn test_single_member_stays_in_pool() {
    let h = Harness::new([5]);
    let report = h.coordinator().run_batch().await.unwrap();

    assert_eq!(report.outcome, BatchOutcome::NotEnoughMembers);
    assert_eq!(h.pool.members(), vec![MemberId(5)]);
}

#[tokio::test]
async fn test_plan_batch_writes_nothing() {
    let h = Harness::new([1, 2, 3, 4]);
    let report = h.coordinator().plan_batch().await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.pairs.len(), 2);
    assert_eq!(report.created, 0);
    assert_eq!(h.pool.members().len(), 4);
    assert!(h.pool.pairings().is_empty());
}

#[tokio::test]
async fn test_failed_commit_leaves_pool_untouched() {
    let h = Harness::new([1, 2]);
    h.pool.fail_next_commits(1);

    let err = h.coordinator().run_batch().await.unwrap_err();

    assert!(matches!(err, Error::Transaction(_)));
    assert_eq!(h.pool.members(), vec![MemberId(1), MemberId(2)]);
    assert!(h.pool.pairings().is_empty());
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[tokio::test]
async fn test_seeded_batches_are_deterministic() {
    let run = || async {
        let h = Harness::new(1..=21);
        for id in 1..=21i64 {
            let start = (id as usize * 13) % 300;
            h.availability.set(MemberId(id), slots(start..start + 30));
        }
        let report = h
            .coordinator()
            .with_picker(RandomPicker::seeded(99))
            .run_batch()
            .await
            .unwrap();
        (report.excluded, report.pairs)
    };

    let first = run().await;
    let second = run().await;
    assert_eq!(first, second);
    assert!(first.0.is_some());
    assert_eq!(first.1.len(), 10);
}

#[tokio::test]
async fn test_every_member_paired_exactly_once() {
    let h = Harness::new(1..=60);
    for id in 1..=60i64 {
        let start = (id as usize * 7) % 250;
        h.availability.set(MemberId(id), slots(start..start + 80));
    }

    let report = h.coordinator().run_batch().await.unwrap();

    let matched = report.matched_members();
    let unique: HashSet<MemberId> = matched.iter().copied().collect();
    assert_eq!(matched.len(), 60);
    assert_eq!(unique.len(), 60);
    assert!(report.pairs.iter().all(|p| p.a != p.b));
    assert_eq!(h.pool.pairings().len(), 60);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_batches_are_serialized() {
    let h = Harness::new(1..=8);
    let coordinator = Arc::new(h.coordinator());

    let first = tokio::spawn({
        let c = coordinator.clone();
        async move { c.run_batch().await }
    });
    let second = tokio::spawn({
        let c = coordinator.clone();
        async move { c.run_batch().await }
    });

    let mut outcomes = vec![
        first.await.unwrap().unwrap().outcome,
        second.await.unwrap().unwrap().outcome,
    ];
    outcomes.sort_by_key(|o| *o == BatchOutcome::NotEnoughMembers);

    assert_eq!(
        outcomes,
        vec![BatchOutcome::Paired, BatchOutcome::NotEnoughMembers]
    );
    assert_eq!(h.pool.pairings().len(), 8);
}
