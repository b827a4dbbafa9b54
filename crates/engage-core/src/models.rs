//! Core data models for engage.
//!
//! These types are shared across all engage crates. Member ids and chat
//! platform ids live in distinct newtypes so they cannot be mixed up at a
//! call site.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Internal member identifier (primary key of the `member` table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub i64);

/// Chat-platform-assigned user identifier (a Discord snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalUserId(pub u64);

/// Chat-platform channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ExternalUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// MESSAGE COUNTING
// =============================================================================

/// One chat message observed by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub external_user_id: ExternalUserId,
    pub channel_id: ChannelId,
}

impl Event {
    pub fn new(external_user_id: u64, channel_id: u64) -> Self {
        Self {
            external_user_id: ExternalUserId(external_user_id),
            channel_id: ChannelId(channel_id),
        }
    }
}

/// Composite key of the `message_counter` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CounterKey {
    pub member_id: MemberId,
    pub channel_id: ChannelId,
}

impl CounterKey {
    pub fn new(member_id: MemberId, channel_id: ChannelId) -> Self {
        Self {
            member_id,
            channel_id,
        }
    }
}

// =============================================================================
// INTERVIEW PAIRING
// =============================================================================

/// Lifecycle status of an interview record.
///
/// The pairing engine only ever writes `Pending`; the other states are set by
/// the member-facing flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewStatus {
    Pending,
    Active,
    Inactive,
}

impl InterviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStatus::Pending => "pending",
            InterviewStatus::Active => "active",
            InterviewStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for InterviewStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(InterviewStatus::Pending),
            "active" => Ok(InterviewStatus::Active),
            "inactive" => Ok(InterviewStatus::Inactive),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown interview status '{}'",
                other
            ))),
        }
    }
}

/// One directed interview record: `interviewer_id` interviews `interviewee_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewPairing {
    pub id: Uuid,
    pub interviewer_id: MemberId,
    pub interviewee_id: MemberId,
    pub status: InterviewStatus,
    pub effective_at: DateTime<Utc>,
}

impl InterviewPairing {
    /// Build both directed records for the unordered pair `{a, b}`.
    pub fn symmetric(a: MemberId, b: MemberId, effective_at: DateTime<Utc>) -> [Self; 2] {
        [
            Self {
                id: Uuid::now_v7(),
                interviewer_id: a,
                interviewee_id: b,
                status: InterviewStatus::Pending,
                effective_at,
            },
            Self {
                id: Uuid::now_v7(),
                interviewer_id: b,
                interviewee_id: a,
                status: InterviewStatus::Pending,
                effective_at,
            },
        ]
    }
}

/// An unordered pair produced by a pairing batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedMembers {
    pub a: MemberId,
    pub b: MemberId,
    /// Number of half-hour slots both members are available.
    pub common_slots: u32,
}

/// How a pairing batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Pairs were computed (and committed unless this was a dry run).
    Paired,
    /// Fewer than two members were in the pool; nothing happened.
    NotEnoughMembers,
}

/// Result of one pairing batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub pairs: Vec<PairedMembers>,
    /// Member left out to make the pool even. Stays in the pool.
    pub excluded: Option<MemberId>,
    /// Interview records written (two per pair, zero for a dry run).
    pub created: usize,
    pub dry_run: bool,
}

impl BatchReport {
    pub fn not_enough_members(dry_run: bool) -> Self {
        Self {
            outcome: BatchOutcome::NotEnoughMembers,
            pairs: Vec::new(),
            excluded: None,
            created: 0,
            dry_run,
        }
    }

    /// Every member id that was matched in this batch.
    pub fn matched_members(&self) -> Vec<MemberId> {
        self.pairs.iter().flat_map(|p| [p.a, p.b]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_id_serializes_transparently() {
        let json = serde_json::to_string(&MemberId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::new(10, 100);
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["external_user_id"], 10);
        assert_eq!(json["channel_id"], 100);
    }

    #[test]
    fn test_interview_status_round_trip_str() {
        for status in [
            InterviewStatus::Pending,
            InterviewStatus::Active,
            InterviewStatus::Inactive,
        ] {
            let parsed: InterviewStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("cancelled".parse::<InterviewStatus>().is_err());
    }

    #[test]
    fn test_symmetric_pairing_records() {
        let now = Utc::now();
        let [ab, ba] = InterviewPairing::symmetric(MemberId(1), MemberId(2), now);

        assert_eq!(ab.interviewer_id, MemberId(1));
        assert_eq!(ab.interviewee_id, MemberId(2));
        assert_eq!(ba.interviewer_id, MemberId(2));
        assert_eq!(ba.interviewee_id, MemberId(1));
        assert_eq!(ab.status, InterviewStatus::Pending);
        assert_eq!(ba.status, InterviewStatus::Pending);
        assert_eq!(ab.effective_at, ba.effective_at);
        assert_ne!(ab.id, ba.id);
    }

    #[test]
    fn test_batch_report_matched_members() {
        let report = BatchReport {
            outcome: BatchOutcome::Paired,
            pairs: vec![
                PairedMembers {
                    a: MemberId(1),
                    b: MemberId(2),
                    common_slots: 5,
                },
                PairedMembers {
                    a: MemberId(3),
                    b: MemberId(4),
                    common_slots: 0,
                },
            ],
            excluded: Some(MemberId(5)),
            created: 4,
            dry_run: false,
        };
        assert_eq!(
            report.matched_members(),
            vec![MemberId(1), MemberId(2), MemberId(3), MemberId(4)]
        );
    }

    #[test]
    fn test_not_enough_members_report_serializes_outcome() {
        let json = serde_json::to_value(BatchReport::not_enough_members(false)).unwrap();
        assert_eq!(json["outcome"], "not_enough_members");
        assert_eq!(json["created"], 0);
    }
}
