//! In-memory message aggregation buffer.
//!
//! Chat handlers call [`MessageBuffer::submit`] for every message; it never
//! blocks on I/O and never fails the caller. Accumulated events are written
//! as one counter transaction per flush. Flushes are triggered by batch
//! size or elapsed time and executed by the background flusher
//! ([`crate::flusher::spawn_flusher`]), or forced with
//! [`MessageBuffer::flush`].
//!
//! Two locks are involved. The admission lock (`std::sync::Mutex`) guards
//! the pending slice and is never held across an `.await`. The flush lock
//! (`tokio::sync::Mutex`) serializes flushes so at most one batch is in
//! flight; new events keep arriving into a fresh slice meanwhile.

pub mod config;
pub mod metrics;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info, warn};

use engage_core::defaults::{BUFFER_EVENT_CAPACITY, OVERFLOW_LOG_EVERY, UNKNOWN_USER_LOG_SAMPLE};
use engage_core::{
    AggregatedCounts, Clock, CounterStore, Error, Event, ResolvedCounts, Result, UserLookup,
};

pub use config::BufferConfig;
pub use metrics::{BufferMetrics, BufferMetricsSnapshot};

/// Lifecycle of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferPhase {
    /// Admitting events, no flush pending.
    Accepting,
    /// A flush was requested or is running. Still admitting.
    Draining,
    /// Closed; admissions are rejected.
    Closed,
}

/// Result of [`MessageBuffer::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Buffer full; the event was dropped.
    Overflow,
    /// Buffer closed; the event was dropped.
    Closed,
}

/// Summary of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Events taken from the buffer.
    pub events: usize,
    /// Events counted into storage.
    pub written_events: u64,
    /// Counter rows touched.
    pub rows: usize,
    /// Distinct external ids without a member.
    pub unknown_users: usize,
    /// Events dropped because their user is unknown.
    pub unknown_events: u64,
    pub duration_ms: u64,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

/// Event emitted by the buffer.
#[derive(Debug, Clone)]
pub enum BufferEvent {
    /// A non-empty flush committed.
    Flushed(FlushReport),
    /// A flush failed; its events were re-enqueued or dropped.
    FlushFailed { events: usize, error: String },
    /// The buffer was closed.
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    event: Event,
    /// Times this event has been re-enqueued after a failed flush.
    attempts: u32,
}

#[derive(Debug)]
struct BufferState {
    pending: Vec<PendingEvent>,
    last_flush_at: DateTime<Utc>,
    phase: BufferPhase,
}

/// Bounded, concurrent message event buffer.
pub struct MessageBuffer {
    config: BufferConfig,
    state: Mutex<BufferState>,
    flush_lock: tokio::sync::Mutex<()>,
    flush_signal: Notify,
    store: Arc<dyn CounterStore>,
    lookup: Arc<dyn UserLookup>,
    clock: Arc<dyn Clock>,
    metrics: BufferMetrics,
    event_tx: broadcast::Sender<BufferEvent>,
}

impl MessageBuffer {
    /// Create a buffer. Fails on zero sizes or durations in `config`.
    pub fn new(
        config: BufferConfig,
        store: Arc<dyn CounterStore>,
        lookup: Arc<dyn UserLookup>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate_nonzero()?;
        if config.max_size < config.batch_size {
            warn!(
                subsystem = "buffer",
                component = "config",
                batch_size = config.batch_size,
                max_size = config.max_size,
                "max_size below batch_size, only the interval triggers flushes"
            );
        }
        let (event_tx, _) = broadcast::channel(BUFFER_EVENT_CAPACITY);
        let now = clock.now();
        Ok(Self {
            state: Mutex::new(BufferState {
                pending: Vec::with_capacity(config.batch_size.min(config.max_size)),
                last_flush_at: now,
                phase: BufferPhase::Accepting,
            }),
            config,
            flush_lock: tokio::sync::Mutex::new(()),
            flush_signal: Notify::new(),
            store,
            lookup,
            clock,
            metrics: BufferMetrics::default(),
            event_tx,
        })
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Events currently waiting for a flush.
    pub fn len(&self) -> usize {
        self.lock_state().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn phase(&self) -> BufferPhase {
        self.lock_state().phase
    }

    pub fn metrics(&self) -> BufferMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Subscribe to buffer events.
    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.event_tx.subscribe()
    }

    /// Admit one event. Never blocks on I/O.
    ///
    /// Requests a background flush when the buffer reaches the batch size or
    /// the flush interval has elapsed.
    pub fn submit(&self, event: Event) -> Admission {
        let now = self.clock.now();
        let mut state = self.lock_state();

        if state.phase == BufferPhase::Closed {
            drop(state);
            debug!(
                subsystem = "buffer",
                component = "admission",
                user_id = %event.external_user_id,
                channel_id = %event.channel_id,
                "Rejected event, buffer closed"
            );
            return Admission::Closed;
        }

        if state.pending.len() >= self.config.max_size {
            drop(state);
            let dropped = BufferMetrics::add(&self.metrics.overflow, 1);
            if dropped == 1 || dropped % OVERFLOW_LOG_EVERY == 0 {
                warn!(
                    subsystem = "buffer",
                    component = "admission",
                    op = "overflow",
                    user_id = %event.external_user_id,
                    channel_id = %event.channel_id,
                    max_size = self.config.max_size,
                    dropped_total = dropped,
                    "Buffer full, dropping message event"
                );
            }
            return Admission::Overflow;
        }

        state.pending.push(PendingEvent { event, attempts: 0 });
        let due = self.is_due(&state, now);
        if due {
            state.phase = BufferPhase::Draining;
        }
        drop(state);

        BufferMetrics::add(&self.metrics.accepted, 1);
        if due {
            self.flush_signal.notify_one();
        }
        Admission::Accepted
    }

    /// Ask the background flusher for a flush without waiting for it.
    pub fn request_flush(&self) {
        self.flush_signal.notify_one();
    }

    /// Whether a size- or time-triggered flush is due now.
    pub fn flush_due(&self) -> bool {
        let now = self.clock.now();
        let state = self.lock_state();
        state.phase != BufferPhase::Closed && self.is_due(&state, now)
    }

    /// Time left until the flush interval elapses. A full interval while
    /// the buffer is empty.
    pub fn until_due(&self) -> Duration {
        let now = self.clock.now();
        let state = self.lock_state();
        if state.pending.is_empty() {
            return Duration::from_millis(self.config.flush_interval_ms);
        }
        let elapsed = elapsed_ms(state.last_flush_at, now);
        Duration::from_millis(self.config.flush_interval_ms.saturating_sub(elapsed))
    }

    /// Force a flush with the configured deadline.
    pub async fn flush(&self) -> Result<FlushReport> {
        self.flush_with_deadline(self.config.flush_timeout()).await
    }

    /// Force a flush, giving the write at most `deadline`.
    ///
    /// Returns once the batch is committed or has failed. On failure the
    /// batch is re-enqueued (bounded by the admission cap and each event's
    /// retry budget) and the error is returned. A flush that misses its
    /// deadline is rolled back and treated as failed.
    pub async fn flush_with_deadline(&self, deadline: Duration) -> Result<FlushReport> {
        let _flush_guard = self.flush_lock.lock().await;
        self.flush_locked(deadline).await
    }

    /// Flush body. Callers hold `flush_lock`.
    async fn flush_locked(&self, deadline: Duration) -> Result<FlushReport> {
        let batch = {
            let mut state = self.lock_state();
            state.last_flush_at = self.clock.now();
            std::mem::take(&mut state.pending)
        };

        if batch.is_empty() {
            self.settle(true);
            return Ok(FlushReport::default());
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(deadline, self.write_batch(&batch)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "flush of {} events exceeded {} ms",
                batch.len(),
                deadline.as_millis()
            ))),
        };

        match result {
            Ok(resolved) => {
                let report = FlushReport {
                    events: batch.len(),
                    written_events: resolved.total(),
                    rows: resolved.deltas.len(),
                    unknown_users: resolved.unknown_users.len(),
                    unknown_events: resolved.unknown_events,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                BufferMetrics::add(&self.metrics.flushes, 1);
                BufferMetrics::add(&self.metrics.flushed_events, report.written_events);
                BufferMetrics::add(&self.metrics.unknown_user, report.unknown_events);

                info!(
                    subsystem = "buffer",
                    component = "flush",
                    op = "commit",
                    event_count = report.events,
                    written_events = report.written_events,
                    row_count = report.rows,
                    unknown_events = report.unknown_events,
                    duration_ms = report.duration_ms,
                    "Flushed message counters"
                );

                self.settle(true);
                let _ = self.event_tx.send(BufferEvent::Flushed(report.clone()));
                Ok(report)
            }
            Err(e) => {
                BufferMetrics::add(&self.metrics.flush_failures, 1);
                let events = batch.len();
                self.requeue(batch, &e);
                // No immediate retry; the next trigger picks the batch up.
                self.settle(false);
                let _ = self.event_tx.send(BufferEvent::FlushFailed {
                    events,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stop admitting and attempt one final flush. Idempotent.
    ///
    /// Waits for an in-flight flush first, so a batch that fails there is
    /// re-enqueued and included in the final flush. Events that the final
    /// flush cannot write are lost and logged at error level.
    pub async fn close(&self) -> Result<FlushReport> {
        let _flush_guard = self.flush_lock.lock().await;
        let already_closed = {
            let mut state = self.lock_state();
            let was = state.phase == BufferPhase::Closed;
            state.phase = BufferPhase::Closed;
            was
        };
        if already_closed {
            return Ok(FlushReport::default());
        }

        info!(
            subsystem = "buffer",
            component = "lifecycle",
            op = "close",
            pending = self.len(),
            "Closing message buffer"
        );
        let result = self.flush_locked(self.config.flush_timeout()).await;
        let _ = self.event_tx.send(BufferEvent::Closed);
        result
    }

    pub(crate) fn flush_signal(&self) -> &Notify {
        &self.flush_signal
    }

    async fn write_batch(&self, batch: &[PendingEvent]) -> Result<ResolvedCounts> {
        let counts = AggregatedCounts::from_events(batch.iter().map(|p| &p.event));
        let external_ids = counts.external_ids();
        let mapping = self.lookup.resolve(&external_ids).await?;
        let resolved = counts.resolve(&mapping);

        if !resolved.unknown_users.is_empty() {
            let sample_len = resolved.unknown_users.len().min(UNKNOWN_USER_LOG_SAMPLE);
            let sample = &resolved.unknown_users[..sample_len];
            warn!(
                subsystem = "buffer",
                component = "flush",
                op = "resolve",
                unknown_users = resolved.unknown_users.len(),
                unknown_events = resolved.unknown_events,
                sample = ?sample,
                "Dropping events from users without a member record"
            );
        }

        if resolved.deltas.is_empty() {
            return Ok(resolved);
        }

        let keys = resolved.keys();
        let mut tx = self.store.begin().await?;
        tx.upsert_zero(&keys).await?;
        tx.increment(&resolved.deltas).await?;
        tx.commit().await?;
        Ok(resolved)
    }

    fn requeue(&self, batch: Vec<PendingEvent>, cause: &Error) {
        let mut state = self.lock_state();

        if state.phase == BufferPhase::Closed {
            drop(state);
            let lost = batch.len() as u64;
            BufferMetrics::add(&self.metrics.lost_on_close, lost);
            error!(
                subsystem = "buffer",
                component = "flush",
                op = "close",
                lost_events = lost,
                error = %cause,
                "Final flush failed, message events lost"
            );
            return;
        }

        let mut requeued = 0u64;
        let mut fatal = 0u64;
        let mut overflow = 0u64;
        for mut pending in batch {
            if pending.attempts >= self.config.retry_budget {
                fatal += 1;
            } else if state.pending.len() >= self.config.max_size {
                overflow += 1;
            } else {
                pending.attempts += 1;
                state.pending.push(pending);
                requeued += 1;
            }
        }
        drop(state);

        warn!(
            subsystem = "buffer",
            component = "flush",
            op = "requeue",
            requeued,
            error = %cause,
            "Flush failed, re-enqueued events"
        );
        if overflow > 0 {
            BufferMetrics::add(&self.metrics.requeue_overflow, overflow);
            warn!(
                subsystem = "buffer",
                component = "flush",
                op = "requeue",
                dropped_events = overflow,
                max_size = self.config.max_size,
                "Buffer full, dropping re-enqueued events"
            );
        }
        if fatal > 0 {
            BufferMetrics::add(&self.metrics.fatal_dropped, fatal);
            error!(
                subsystem = "buffer",
                component = "flush",
                op = "requeue",
                dropped_events = fatal,
                retry_budget = self.config.retry_budget,
                error = %cause,
                "Retry budget exhausted, message events dropped"
            );
        }
    }

    /// Leave `Draining` after a flush. With `request_more`, ask for another
    /// flush right away if one is already due.
    fn settle(&self, request_more: bool) {
        let now = self.clock.now();
        let mut state = self.lock_state();
        if state.phase == BufferPhase::Closed {
            return;
        }
        let again = request_more && self.is_due(&state, now);
        state.phase = if again {
            BufferPhase::Draining
        } else {
            BufferPhase::Accepting
        };
        drop(state);
        if again {
            self.flush_signal.notify_one();
        }
    }

    fn is_due(&self, state: &BufferState, now: DateTime<Utc>) -> bool {
        if state.pending.is_empty() {
            return false;
        }
        state.pending.len() >= self.config.batch_size
            || elapsed_ms(state.last_flush_at, now) >= self.config.flush_interval_ms
    }

    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for MessageBuffer {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if !state.pending.is_empty() {
            warn!(
                subsystem = "buffer",
                component = "lifecycle",
                pending = state.pending.len(),
                "Message buffer dropped with unflushed events"
            );
        }
    }
}

fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - since).num_milliseconds()).unwrap_or(0)
}
