//! Proposer-side Gale–Shapley over a single population.
//!
//! Interview pairing is a roommates problem (anyone can pair with anyone),
//! but this matcher uses the one-sided Gale–Shapley mechanics: a free member
//! walks its list and a taken candidate switches partners only when it
//! strictly prefers the proposer.
//!
//! # Limitation
//!
//! These mechanics are not provably stable for roommates, and some inputs
//! make proposals cycle. The result is stable with respect to the supplied
//! preferences only when the process settles on its own. Proposals are capped
//! at `4 * n²`; past the cap nobody is displaced any more and each remaining
//! free member takes the first still-free candidate on its list. Irving's
//! algorithm would be exact, but the goal here is good pairings quickly.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pairing::preferences::Preferences;

/// Proposal budget per `n²`.
pub const PROPOSAL_BUDGET_FACTOR: usize = 4;

/// A complete pairing of `0..n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matching {
    /// `partners[i] == j` if and only if `partners[j] == i`.
    pub partners: Vec<usize>,
    /// Candidate evaluations performed.
    pub proposals: usize,
    /// False when the proposal budget ran out and the greedy fallback
    /// finished the pairing.
    pub converged: bool,
}

impl Matching {
    /// Each pair once, as `(i, partner)` with `i < partner`.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        self.partners
            .iter()
            .enumerate()
            .filter(|(i, p)| i < *p)
            .map(|(i, p)| (i, *p))
            .collect()
    }
}

/// Configurable matcher. `StableMatcher::default()` uses the standard budget.
#[derive(Debug, Clone, Default)]
pub struct StableMatcher {
    max_proposals: Option<usize>,
}

impl StableMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the proposal budget.
    pub fn with_max_proposals(mut self, max: usize) -> Self {
        self.max_proposals = Some(max);
        self
    }

    /// Pair every member.
    ///
    /// Fails with [`Error::InsufficientMembers`] below two members and with
    /// [`Error::DegeneratePreferences`] for an odd population, an empty or
    /// malformed list, or lists that admit no complete pairing.
    pub fn run(&self, preferences: &Preferences) -> Result<Matching> {
        let n = preferences.len();
        validate(preferences)?;

        // rank[c][m]: position of m on c's list, usize::MAX if absent.
        let mut rank = vec![vec![usize::MAX; n]; n];
        for (c, list) in preferences.lists().iter().enumerate() {
            for (pos, entry) in list.iter().enumerate() {
                if rank[c][entry.partner] == usize::MAX {
                    rank[c][entry.partner] = pos;
                }
            }
        }

        let budget = self
            .max_proposals
            .unwrap_or_else(|| PROPOSAL_BUDGET_FACTOR.saturating_mul(n).saturating_mul(n));
        let mut partner: Vec<Option<usize>> = vec![None; n];
        let mut free: VecDeque<usize> = (0..n).collect();
        let mut proposals = 0usize;
        let mut converged = true;

        while let Some(m) = free.pop_front() {
            // Picked up by someone else while waiting in the queue.
            if partner[m].is_some() {
                continue;
            }
            if proposals >= budget {
                converged = false;
                break;
            }

            let mut placed = false;
            for entry in preferences.list(m) {
                let c = entry.partner;
                proposals += 1;
                match partner[c] {
                    None => {
                        partner[m] = Some(c);
                        partner[c] = Some(m);
                        placed = true;
                    }
                    Some(current) if rank[c][m] < rank[c][current] => {
                        partner[current] = None;
                        free.push_back(current);
                        partner[m] = Some(c);
                        partner[c] = Some(m);
                        placed = true;
                    }
                    Some(_) => {}
                }
                if placed {
                    break;
                }
            }

            if !placed {
                free.push_back(m);
            }
        }

        if !converged {
            warn!(
                subsystem = "pairing",
                component = "matcher",
                members = n,
                proposals,
                budget,
                "Proposal budget exhausted, finishing pairing greedily"
            );
            for m in 0..n {
                if partner[m].is_some() {
                    continue;
                }
                let choice = preferences
                    .list(m)
                    .iter()
                    .map(|e| e.partner)
                    .find(|&c| partner[c].is_none());
                if let Some(c) = choice {
                    partner[m] = Some(c);
                    partner[c] = Some(m);
                }
            }
        }

        let partners = partner
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.ok_or_else(|| {
                    Error::DegeneratePreferences(format!(
                        "member {} could not be paired with anyone on its list",
                        i
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        debug!(
            subsystem = "pairing",
            component = "matcher",
            members = n,
            proposals,
            converged,
            "Matching complete"
        );

        Ok(Matching {
            partners,
            proposals,
            converged,
        })
    }
}

fn validate(preferences: &Preferences) -> Result<()> {
    let n = preferences.len();
    if n < 2 {
        return Err(Error::InsufficientMembers(n));
    }
    if n % 2 != 0 {
        return Err(Error::DegeneratePreferences(format!(
            "cannot pair an odd number of members ({})",
            n
        )));
    }
    for (i, list) in preferences.lists().iter().enumerate() {
        if list.is_empty() {
            return Err(Error::DegeneratePreferences(format!(
                "member {} has no candidates",
                i
            )));
        }
        if let Some(bad) = list.iter().find(|e| e.partner >= n || e.partner == i) {
            return Err(Error::DegeneratePreferences(format!(
                "member {} lists invalid candidate {}",
                i, bad.partner
            )));
        }
    }
    Ok(())
}
