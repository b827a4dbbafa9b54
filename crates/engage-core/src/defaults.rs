//! Centralized default constants for engage.
//!
//! Every crate reads its defaults from here instead of defining its own
//! magic numbers. Grouped by subsystem.

// =============================================================================
// MESSAGE BUFFER
// =============================================================================

/// Buffer length that triggers a flush.
pub const MESSAGE_BATCH_SIZE: usize = 200;

/// Hard admission cap. Events beyond this are dropped, never blocked.
pub const MESSAGE_MAX_SIZE: usize = 1000;

/// Time since the last flush that triggers a flush (2 minutes).
pub const MESSAGE_FLUSH_INTERVAL_MS: u64 = 120_000;

/// How many times an event may be re-enqueued after a failed flush.
pub const MESSAGE_RETRY_BUDGET: u32 = 1;

/// Deadline for one flush (lookup + counter transaction).
pub const MESSAGE_FLUSH_TIMEOUT_MS: u64 = 30_000;

/// Number of unknown external ids included in the warning sample.
pub const UNKNOWN_USER_LOG_SAMPLE: usize = 10;

/// Overflow drops are logged on the first drop and then every Nth.
pub const OVERFLOW_LOG_EVERY: u64 = 100;

/// Capacity of the buffer event broadcast channel.
pub const BUFFER_EVENT_CAPACITY: usize = 256;

/// Longest the background flusher sleeps before re-checking the interval.
pub const FLUSHER_MAX_IDLE_MS: u64 = 60_000;

// =============================================================================
// AVAILABILITY
// =============================================================================

/// Days in an availability week.
pub const AVAILABILITY_DAYS: usize = 7;

/// Half-hour slots per day.
pub const AVAILABILITY_SLOTS_PER_DAY: usize = 48;

/// Total slots in an availability week.
pub const AVAILABILITY_SLOTS: usize = AVAILABILITY_DAYS * AVAILABILITY_SLOTS_PER_DAY;

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum number of pooled connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default connection acquire timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds (30 minutes).
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;
