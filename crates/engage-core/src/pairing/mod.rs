//! Interview pairing: availability → preferences → matching.
//!
//! [`match_members`] runs the whole pipeline for an even member list and
//! hands back the pairs together with the intermediate tables, which the
//! coordinator logs and the dry run prints.

pub mod matcher;
pub mod preferences;

pub use matcher::{Matching, StableMatcher, PROPOSAL_BUDGET_FACTOR};
pub use preferences::{CommonSlots, PreferenceBuilder, PreferenceEntry, Preferences};

use crate::availability::AvailabilityMatrix;
use crate::error::Result;
use crate::models::{MemberId, PairedMembers};

/// Output of one matching run over a member list.
#[derive(Debug, Clone)]
pub struct MatchingResult {
    /// Unordered pairs, ordered by the lower index of each pair.
    pub pairs: Vec<PairedMembers>,
    pub common_slots: CommonSlots,
    pub preferences: Preferences,
    pub proposals: usize,
    pub converged: bool,
}

/// Pair `members` by common availability with the default matcher.
pub fn match_members<F>(members: &[MemberId], availability_of: F) -> Result<MatchingResult>
where
    F: Fn(MemberId) -> Option<AvailabilityMatrix>,
{
    match_members_with(&StableMatcher::default(), members, availability_of)
}

/// Pair `members` with an explicitly configured matcher.
pub fn match_members_with<F>(
    matcher: &StableMatcher,
    members: &[MemberId],
    availability_of: F,
) -> Result<MatchingResult>
where
    F: Fn(MemberId) -> Option<AvailabilityMatrix>,
{
    let (common_slots, preferences) = PreferenceBuilder::build(members, availability_of)?;
    let matching = matcher.run(&preferences)?;

    let pairs = matching
        .pairs()
        .into_iter()
        .map(|(i, j)| PairedMembers {
            a: members[i],
            b: members[j],
            common_slots: common_slots.get(i, j),
        })
        .collect();

    Ok(MatchingResult {
        pairs,
        common_slots,
        preferences,
        proposals: matching.proposals,
        converged: matching.converged,
    })
}
