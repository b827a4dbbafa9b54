//! Subcommand implementations.
//!
//! Each command prints a JSON document on stdout; logs go elsewhere.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

use engage_db::Database;
use engage_jobs::{
    spawn_flusher, submit_json_event, AvailabilityMatrix, BufferConfig, BufferMetricsSnapshot,
    ExternalUserId, MemberId, MessageBuffer, PairingCoordinator, RandomPicker, SubmitOutcome,
    SystemClock,
};

/// Per-outcome counts for an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestTally {
    pub lines: u64,
    pub accepted: u64,
    pub invalid_format: u64,
    pub dropped_overflow: u64,
    pub dropped_closed: u64,
}

impl IngestTally {
    fn record(&mut self, outcome: SubmitOutcome) {
        self.lines += 1;
        match outcome {
            SubmitOutcome::Accepted => self.accepted += 1,
            SubmitOutcome::InvalidFormat => self.invalid_format += 1,
            SubmitOutcome::DroppedOverflow => self.dropped_overflow += 1,
            SubmitOutcome::DroppedClosed => self.dropped_closed += 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub tally: IngestTally,
    pub metrics: BufferMetricsSnapshot,
}

/// Submit one JSON event per non-blank line.
pub async fn ingest_lines<R>(buffer: &MessageBuffer, reader: R) -> anyhow::Result<IngestTally>
where
    R: AsyncBufRead + Unpin,
{
    let mut tally = IngestTally::default();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("reading event stream")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tally.record(submit_json_event(buffer, line));
    }
    Ok(tally)
}

/// Stream events from stdin into the counter table.
pub async fn ingest(db: &Database, config: BufferConfig) -> anyhow::Result<IngestSummary> {
    let buffer = Arc::new(MessageBuffer::new(
        config,
        Arc::new(db.counters.clone()),
        Arc::new(db.members.clone()),
        Arc::new(SystemClock::new()),
    )?);
    let flusher = spawn_flusher(buffer.clone());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let tally = ingest_lines(&buffer, stdin).await;

    // Flush what was accepted even if reading failed part way.
    flusher.shutdown().await?;
    let tally = tally?;
    let metrics = buffer.metrics();

    info!(
        subsystem = "cli",
        component = "ingest",
        lines = tally.lines,
        accepted = tally.accepted,
        flushed_events = metrics.flushed_events,
        "Ingestion finished"
    );
    Ok(IngestSummary { tally, metrics })
}

/// Run (or plan) a pairing batch.
pub async fn pair(
    db: &Database,
    dry_run: bool,
    seed: Option<u64>,
) -> anyhow::Result<engage_jobs::BatchReport> {
    let mut coordinator = PairingCoordinator::new(
        Arc::new(db.interview_pool.clone()),
        Arc::new(db.availability.clone()),
        Arc::new(SystemClock::new()),
    );
    if let Some(seed) = seed {
        coordinator = coordinator.with_picker(RandomPicker::seeded(seed));
    }

    let report = if dry_run {
        coordinator.plan_batch().await?
    } else {
        coordinator.run_batch().await?
    };
    Ok(report)
}

/// Read a 7×48 boolean grid from a JSON file.
pub fn read_grid(path: &Path) -> anyhow::Result<AvailabilityMatrix> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading availability grid {}", path.display()))?;
    parse_grid(&raw)
}

pub fn parse_grid(raw: &str) -> anyhow::Result<AvailabilityMatrix> {
    let grid: Vec<Vec<bool>> = serde_json::from_str(raw).context("grid must be [[bool; 48]; 7]")?;
    Ok(AvailabilityMatrix::from_grid(&grid)?)
}

pub async fn register_member(
    db: &Database,
    external_id: u64,
    username: &str,
) -> anyhow::Result<MemberId> {
    Ok(db.members.ensure(ExternalUserId(external_id), username).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_jobs::{InMemoryCounterStore, StaticUserLookup};

    fn buffer(store: &InMemoryCounterStore) -> MessageBuffer {
        MessageBuffer::new(
            BufferConfig::default().with_batch_size(100).with_max_size(3),
            Arc::new(store.clone()),
            Arc::new(StaticUserLookup::new().with(10, 1)),
            Arc::new(SystemClock::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_lines_tallies_outcomes() {
        let store = InMemoryCounterStore::new();
        let buffer = buffer(&store);
        let input = concat!(
            "{\"discord_id\": 10, \"channel_id\": 5}\n",
            "\n",
            "not json\n",
            "{\"discord_id\": \"10\", \"channel_id\": \"5\"}\n",
            "{\"discord_id\": 10, \"channel_id\": 6}\n",
            "{\"discord_id\": 10, \"channel_id\": 7}\n",
        );

        let tally = ingest_lines(&buffer, input.as_bytes()).await.unwrap();

        assert_eq!(tally.lines, 5);
        assert_eq!(tally.accepted, 3);
        assert_eq!(tally.invalid_format, 1);
        assert_eq!(tally.dropped_overflow, 1);

        let report = buffer.close().await.unwrap();
        assert_eq!(report.events, 3);
        assert_eq!(store.get(1, 5), 2);
        assert_eq!(store.get(1, 6), 1);
    }

    #[tokio::test]
    async fn test_ingest_after_close_counts_closed() {
        let store = InMemoryCounterStore::new();
        let buffer = buffer(&store);
        buffer.close().await.unwrap();

        let input = "{\"discord_id\": 10, \"channel_id\": 5}\n";
        let tally = ingest_lines(&buffer, input.as_bytes()).await.unwrap();

        assert_eq!(tally.dropped_closed, 1);
        assert_eq!(tally.accepted, 0);
    }

    #[test]
    fn test_parse_grid() {
        let mut grid = vec![vec![false; 48]; 7];
        grid[2][10] = true;
        grid[6][47] = true;
        let matrix = parse_grid(&serde_json::to_string(&grid).unwrap()).unwrap();
        assert_eq!(matrix.slot_count(), 2);
        assert!(matrix.is_available(2, 10));

        assert!(parse_grid("[[true]]").is_err());
        assert!(parse_grid("nope").is_err());
    }
}
