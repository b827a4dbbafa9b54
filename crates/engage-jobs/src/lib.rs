//! # engage-jobs
//!
//! Runtime pieces of engage that own state or tasks.
//!
//! This crate provides:
//! - The message aggregation buffer and its background flusher
//! - The ingress adapter that validates raw message events
//! - The interview pairing coordinator
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use engage_jobs::{spawn_flusher, BufferConfig, Event, MessageBuffer, SystemClock};
//!
//! let buffer = Arc::new(MessageBuffer::new(
//!     BufferConfig::from_env(),
//!     Arc::new(db.counters.clone()),
//!     Arc::new(db.members.clone()),
//!     Arc::new(SystemClock::new()),
//! )?);
//! let flusher = spawn_flusher(buffer.clone());
//!
//! buffer.submit(Event::new(user_id, channel_id));
//!
//! // Graceful shutdown: final flush, then stop.
//! flusher.shutdown().await?;
//! ```

pub mod buffer;
pub mod flusher;
pub mod ingress;
pub mod pairing;

// Re-export core types
pub use engage_core::*;

pub use buffer::{
    Admission, BufferConfig, BufferEvent, BufferMetrics, BufferMetricsSnapshot, BufferPhase,
    FlushReport, MessageBuffer,
};
pub use flusher::{spawn_flusher, FlusherHandle};
pub use ingress::{
    parse_event, parse_event_json, parse_platform_id, submit_json_event, submit_message_event,
    SubmitOutcome, MAX_PLATFORM_ID,
};
pub use pairing::{ExclusionPicker, PairingCoordinator, RandomPicker};
