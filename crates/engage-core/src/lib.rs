//! # engage-core
//!
//! Core types, traits, and pure algorithms for the engage backend.
//!
//! This crate provides the identifier newtypes and domain records, the
//! collaborator traits that the persistence layer implements, and the
//! side-effect-free pieces of both core subsystems: message aggregation for
//! the message buffer, and the availability / preference / matching pipeline
//! for interview pairing.

pub mod aggregate;
pub mod availability;
pub mod clock;
pub mod defaults;
pub mod error;
pub mod memory;
pub mod models;
pub mod pairing;
pub mod traits;

// Re-export commonly used types at crate root
pub use aggregate::{AggregatedCounts, ResolvedCounts};
pub use availability::AvailabilityMatrix;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use memory::{
    InMemoryAvailabilityStore, InMemoryCounterStore, InMemoryPoolStore, StaticUserLookup,
};
pub use models::*;
pub use pairing::{
    CommonSlots, MatchingResult, PreferenceBuilder, PreferenceEntry, Preferences, StableMatcher,
};
pub use traits::*;
